//! Example: watching retries, timeouts and restarts against a scripted backend.
//!
//! Run with: `RUST_LOG=llm_resilience=debug cargo run --example mock_retry`

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use llm_resilience::backend::{MockAttempt, MockError, MockStep};
use llm_resilience::{
    CancellationToken, GenerateRequest, GenerationBuffer, MockBackend, RetryPolicy,
    StreamingClient, TimeoutPolicy,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn chunk(text: &str, thought: bool) -> MockStep {
    MockStep::Fragment(json!({
        "candidates": [{"content": {"parts": [{"text": text, "thought": thought}]}}]
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("llm_resilience=info")),
        )
        .init();

    // Overloaded, then a stream that drops halfway, then a clean run.
    let mock = Arc::new(MockBackend::new(vec![
        MockAttempt::status(503),
        MockAttempt::Stream(vec![
            chunk("Planning\nMatch the job post keywords", true),
            chunk("# Jane Doe\n", false),
            MockStep::Error(MockError::Network("connection reset by peer".into())),
        ]),
        MockAttempt::Stream(vec![
            chunk("Planning\nMatch the job post keywords", true),
            MockStep::Delay(Duration::from_millis(300)),
            chunk("# Jane Doe\n", false),
            chunk("Senior Rust Engineer", false),
        ]),
    ]));

    let client = StreamingClient::builder(mock.clone())
        .retry(RetryPolicy::new(3, Duration::from_millis(200), Duration::from_secs(2))?)
        .timeouts(TimeoutPolicy::new(
            Duration::from_secs(2),
            Duration::from_secs(10),
            Duration::from_secs(5),
            Duration::from_millis(100),
        )?)
        .context("Resume generation")
        .build();

    let request = GenerateRequest::new("mock-model", "Tailor my resume");
    let mut stream = client.stream(request, CancellationToken::new());
    let mut buffer = GenerationBuffer::new();

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if buffer.push(&fragment) {
            println!("-- attempt {} started over, buffer reset", fragment.attempt);
        }
    }

    println!("Connections: {}", mock.connections());
    for step in buffer.thoughts() {
        println!("Thought: {} ({})", step.title, step.content);
    }
    println!("Output:\n{}", buffer.text());
    Ok(())
}
