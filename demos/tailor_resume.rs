//! Example: stream a resume rewrite from Gemini, with Ctrl-C cancellation.
//!
//! Reads settings from the environment (or a `.env` file), e.g.
//! `GEMINI_API_KEY=... cargo run --example tailor_resume -- "Senior Rust Engineer"`

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use llm_resilience::{
    CancellationToken, ClientConfig, GeminiBackend, GenerationBuffer, InferenceConfig,
    StreamError, StreamingClient,
};
use tracing_subscriber::EnvFilter;

const SYSTEM_PROMPT: &str = "You are an expert resume writer. Rewrite the resume \
in Markdown so it targets the given role. Keep every fact truthful.";

const RESUME: &str = "Jane Doe\nBackend engineer, 6 years.\n- Built a Go payment service\n\
- Maintained PostgreSQL clusters\n- Mentored two junior engineers";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("llm_resilience=info")),
        )
        .init();

    let config = ClientConfig::from_env();
    if !config.has_api_key() {
        anyhow::bail!("set GEMINI_API_KEY (or API_KEY) to run this example");
    }
    let role = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Senior Rust Engineer".to_string());

    let backend = Arc::new(GeminiBackend::from_config(&config));
    let client = StreamingClient::builder(backend)
        .retry(config.retry.clone())
        .timeouts(config.timeouts.clone())
        .context("Resume generation")
        .build();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let request = config
        .request(format!("Target role: {}\n\nResume:\n{}", role, RESUME))
        .with_system(SYSTEM_PROMPT)
        .with_config(InferenceConfig {
            include_thoughts: true,
            ..config.inference.clone()
        });

    let mut stream = client.stream(request, cancel);
    let mut buffer = GenerationBuffer::new();
    let mut printed = 0;
    let mut thoughts_seen = 0;

    while let Some(item) = stream.next().await {
        let fragment = match item {
            Ok(fragment) => fragment,
            Err(StreamError::Cancelled) => {
                eprintln!("\nCancelled.");
                return Ok(());
            }
            Err(e) => {
                eprintln!("\n{}", e.user_message());
                return Err(e.into());
            }
        };

        if buffer.push(&fragment) {
            eprintln!("\n[retrying from scratch]");
            printed = 0;
            thoughts_seen = 0;
        }
        for step in &buffer.thoughts()[thoughts_seen..] {
            eprintln!("  thinking: {}", step.title);
        }
        thoughts_seen = buffer.thoughts().len();

        let text = buffer.text();
        print!("{}", &text[printed..]);
        std::io::stdout().flush()?;
        printed = text.len();
    }
    println!();
    Ok(())
}
