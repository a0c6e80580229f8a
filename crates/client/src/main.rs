//! daydream-watch - follow a stream's prompt queue from the terminal
//!
//! Usage: `daydream-watch <stream-id> [prompt text...]` or
//! `daydream-watch <stream-id> --random`

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daydream_client::{App, ClientConfig, QueueSnapshot, QueueStatus, StreamId};

const USAGE: &str = "usage: daydream-watch <stream-id> [prompt text... | --random]";

enum Action {
    Watch,
    Submit(String),
    Random,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daydream_client=debug,daydream_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (stream_id, action) = parse_args(std::env::args().skip(1).collect())?;
    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    let app = App::from_config(&config);

    let queue = app.prompt_queue();
    queue.watch(Some(stream_id.clone()));
    let mut updates = queue.updates();

    match action {
        Action::Watch => {}
        Action::Submit(text) => {
            let outcome = queue.submit_prompt(&text).await;
            if outcome.success {
                tracing::info!(
                    prompt_id = outcome.prompt_id.as_deref().unwrap_or_default(),
                    queue_position = outcome.queue_position.unwrap_or_default(),
                    "Prompt submitted"
                );
                if outcome.was_censored {
                    println!("Your prompt was flagged by moderation and replaced.");
                }
            } else {
                tracing::warn!("Prompt submission failed");
            }
        }
        Action::Random => {
            if !queue.add_random_prompt().await {
                tracing::warn!("Random prompt request failed");
            }
        }
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(stream_id = %stream_id, "Shutting down");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    print_snapshot(&snapshot);
                }
                if let Some(status) = queue.my_status() {
                    print_status(status);
                }
            }
        }
    }

    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<(StreamId, Action)> {
    let Some((stream_arg, rest)) = args.split_first() else {
        bail!(USAGE);
    };
    let stream_id = StreamId::new(stream_arg.as_str());
    if !stream_id.is_present() {
        bail!(USAGE);
    }

    let action = if rest.iter().any(|arg| arg == "--random") {
        Action::Random
    } else if rest.is_empty() {
        Action::Watch
    } else {
        Action::Submit(rest.join(" "))
    };
    Ok((stream_id, action))
}

fn print_snapshot(snapshot: &QueueSnapshot) {
    let connection = if snapshot.is_connected {
        "connected"
    } else {
        "reconnecting"
    };
    println!("[{}] {}", snapshot.stream_id, connection);

    match &snapshot.active_prompt {
        Some(active) => println!("  now playing: {}", active.prompt.text),
        None => println!("  now playing: -"),
    }

    let highlighted = snapshot.highlighted_index();
    for (index, prompt) in snapshot.recent_prompts.iter().enumerate() {
        let marker = if Some(index) == highlighted { ">" } else { " " };
        println!("  {marker} {:>2}. {}", index + 1, prompt.text);
    }
}

fn print_status(status: QueueStatus) {
    match status {
        QueueStatus::Live => println!("  your prompt is live"),
        QueueStatus::Queued { position } => println!("  your prompt is #{position} in the queue"),
        QueueStatus::Untracked => {}
    }
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
