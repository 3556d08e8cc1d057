//! Worker runner lifecycle tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use tessera_core::JobRequest;
use tessera_worker::{JobContext, JobHandler, JobResult, Worker, WorkerConfig, WorkerEvent};

struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(50, Some("halfway"));
        JobResult::Success(json!({
            "status": "done",
            "new_entity_ids": [format!("echo-{}", ctx.request.target_entity)],
        }))
    }
}

struct FailingHandler;

#[async_trait]
impl JobHandler for FailingHandler {
    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Failed {
            code: "invalid_input".into(),
            message: "nothing to do".into(),
        }
    }
}

fn request(target: &str) -> JobRequest {
    JobRequest {
        job_id: Uuid::new_v4(),
        job_collection: "jobs".into(),
        target_entity: target.into(),
        target_collection: "extracted".into(),
        api_base: "http://graph.invalid".into(),
        network: "testnet".into(),
        rhiza: None,
    }
}

async fn next_event(
    events: &mut tokio::sync::broadcast::Receiver<WorkerEvent>,
) -> WorkerEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for worker event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_job_lifecycle_events_and_handoff() {
    let worker = Worker::new(Arc::new(EchoHandler), WorkerConfig::default());
    let handle = worker.start();
    let mut events = handle.events();

    let job = request("chunk-1");
    let job_id = job.job_id;
    handle.submit(job).await.unwrap();

    let mut started = false;
    let mut progressed = false;
    loop {
        match next_event(&mut events).await {
            WorkerEvent::WorkerStarted => {}
            WorkerEvent::JobStarted { job_id: id } => {
                assert_eq!(id, job_id);
                started = true;
            }
            WorkerEvent::JobProgress { percent, .. } => {
                assert_eq!(percent, 50);
                progressed = true;
            }
            WorkerEvent::JobCompleted { job_id: id, entry } => {
                assert_eq!(id, job_id);
                assert_eq!(entry["status"], "done");
                assert_eq!(entry["new_entity_ids"], json!(["echo-chunk-1"]));
                break;
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert!(started);
    assert!(progressed);

    handle.shutdown().await.unwrap();
    loop {
        if matches!(next_event(&mut events).await, WorkerEvent::WorkerStopped) {
            break;
        }
    }
}

#[tokio::test]
async fn test_failed_job_emits_error_entry() {
    let worker = Worker::new(Arc::new(FailingHandler), WorkerConfig::default());
    let handle = worker.start();
    let mut events = handle.events();

    handle.submit(request("chunk-1")).await.unwrap();

    loop {
        match next_event(&mut events).await {
            WorkerEvent::JobFailed { entry, .. } => {
                assert_eq!(entry["status"], "error");
                assert_eq!(entry["error"]["code"], "invalid_input");
                assert_eq!(entry["error"]["message"], "nothing to do");
                break;
            }
            WorkerEvent::JobCompleted { .. } => panic!("job must fail"),
            _ => {}
        }
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_multiple_jobs_all_complete() {
    let worker = Worker::new(
        Arc::new(EchoHandler),
        WorkerConfig::default().with_max_concurrent(2),
    );
    let handle = worker.start();
    let mut events = handle.events();

    for i in 0..5 {
        handle.submit(request(&format!("chunk-{}", i))).await.unwrap();
    }

    let mut completed = 0;
    while completed < 5 {
        if let WorkerEvent::JobCompleted { .. } = next_event(&mut events).await {
            completed += 1;
        }
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disabled_worker_processes_nothing() {
    let worker = Worker::new(
        Arc::new(EchoHandler),
        WorkerConfig::default().with_enabled(false),
    );
    let handle = worker.start();
    let mut events = handle.events();

    // Submission succeeds (the queue exists) but nothing ever runs: either
    // the channel stays silent or it closes as the disabled worker exits.
    handle.submit(request("chunk-1")).await.unwrap();
    match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
        Err(_) | Ok(Err(_)) => {}
        Ok(Ok(event)) => panic!("disabled worker emitted {:?}", event),
    }
}
