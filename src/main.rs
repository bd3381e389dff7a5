use anyhow::{Context, Result};
use companion::backend::ScriptedBackend;
use companion::integration::{CompanionConfig, OrchestratorBuilder};
use companion::stream::{PresentationEvent, SessionOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_TURNS: &[&str] = &["こんにちは！", "今日はどんな一日だった？"];

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "companion=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => CompanionConfig::load(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => CompanionConfig::default(),
    };

    info!("Starting companion against the scripted backend");

    let (orchestrator, handle) = OrchestratorBuilder::new()
        .with_config(config.clone())
        .build()?;
    let backend = Arc::new(ScriptedBackend::new(&config, handle.inbound_sender()));
    let driver = orchestrator.start(backend)?;

    let events = handle.presentation_receiver();
    for text in DEMO_TURNS {
        println!("> {}", text);
        handle.begin_turn(*text)?;

        loop {
            let event = events
                .recv_timeout(Duration::from_secs(30))
                .context("timed out waiting for the reply")?;
            match event {
                PresentationEvent::ExpressionChanged(emotion) => println!("  [{}]", emotion),
                PresentationEvent::CaptionUpdated(caption) => println!("  {}", caption),
                PresentationEvent::AmplitudeSample(_) => {}
                PresentationEvent::SessionClosed(outcome) => {
                    match outcome {
                        SessionOutcome::Completed { transcript } => println!("< {}", transcript),
                        SessionOutcome::Cancelled { partial_transcript } => {
                            println!("< (cancelled) {}", partial_transcript)
                        }
                        SessionOutcome::Failed { error } => println!("< (failed) {}", error),
                    }
                    break;
                }
            }
        }
    }

    handle.shutdown()?;
    driver
        .join()
        .map_err(|_| anyhow::anyhow!("driver thread panicked"))?;

    for turn in handle.history() {
        info!("{:?}: {}", turn.role, turn.text);
    }
    Ok(())
}
