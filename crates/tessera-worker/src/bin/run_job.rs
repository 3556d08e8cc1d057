//! One-shot job runner: the process-level entrypoint for hosts that deliver
//! jobs by spawning a process per request.
//!
//! Reads a JSON job request from the path given as the first argument (or
//! stdin when absent), runs the extraction pipeline once, and prints the
//! host-log entry to stdout. Exits non-zero on job failure.

use std::io::Read;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use tessera_core::JobRequest;
use tessera_llm::GeminiBackend;
use tessera_worker::{ExtractHandler, JobContext, JobHandler, JobResult};

fn read_request() -> Result<JobRequest, String> {
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {}", path, e))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("failed to read stdin: {}", e))?;
            buffer
        }
    };
    serde_json::from_str(&raw).map_err(|e| format!("invalid job request: {}", e))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let request = match read_request() {
        Ok(request) => request,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(2);
        }
    };

    let llm = match GeminiBackend::from_env() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("failed to initialize LLM backend: {}", e);
            std::process::exit(2);
        }
    };

    let handler = ExtractHandler::new(llm);
    let result = handler.execute(JobContext::new(request)).await;
    println!("{}", result.host_entry());

    if matches!(result, JobResult::Failed { .. }) {
        std::process::exit(1);
    }
}
