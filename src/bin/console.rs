//! Minimal interactive console for the selkie pipeline.
//!
//! Reads lines from stdin and runs them as text turns; `/voice` runs a
//! spoken turn. Streamed reply fragments are printed as they arrive.
//! Ctrl-C cancels the active turn rather than exiting.

use anyhow::Context;
use selkie::character::CharacterLibrary;
use selkie::config::AppConfig;
use selkie::pipeline::coordinator::{InteractionCoordinator, TurnEvent};
use selkie::stt::ParakeetStt;
use selkie::tts::{KokoroTts, TextToSpeech};
use std::io::Write;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging()?;

    let config_path = std::env::args()
        .nth(1)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let mut characters =
        CharacterLibrary::load(&config.characters.dir, &config.characters.default_character);

    let stt = Box::new(ParakeetStt::new(&config.stt, &config.models)?);
    let tts: Option<Box<dyn TextToSpeech>> = if config.tts.speak_replies {
        let models = selkie::models::ModelManager::new(&config.models)?;
        Some(Box::new(KokoroTts::new(&config.tts, &models)?))
    } else {
        None
    };

    let (coordinator, mut events) = InteractionCoordinator::new(config, stt, tts)?;

    // Ctrl-C interrupts the active turn instead of killing the session.
    let controller = coordinator.controller();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            controller.cancel();
        }
    });

    // Render turn progress as it arrives.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TurnEvent::Transcript(text) => println!("you said: {text}"),
                TurnEvent::ReplyFragment(text) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                TurnEvent::ReplyFinished { complete, .. } => {
                    if complete {
                        println!();
                    } else {
                        println!("  [incomplete]");
                    }
                }
                TurnEvent::Notice(notice) => println!("! {notice}"),
                TurnEvent::Phase(_) => {}
            }
        }
    });

    let (llm_up, memory_up) = coordinator.check_services().await;
    if !llm_up {
        println!("! generation endpoint unreachable — turns will fail until it is up");
    }
    if !memory_up {
        println!("! memory service unreachable — continuing without long-term memory");
    }

    println!(
        "chatting as '{}' — /voice, /characters, /character <id>, /export <path>, /quit",
        characters.active().name
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_owned();
        match line.as_str() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/voice" => {
                println!("listening...");
                let outcome = coordinator.voice_turn(characters.active()).await;
                if let Err(e) = outcome {
                    println!("! {e}");
                }
            }
            "/characters" => {
                for character in characters.all() {
                    println!("  {} — {}", character.id, character.name);
                }
            }
            _ if line.starts_with("/character ") => {
                let id = line.trim_start_matches("/character ").trim();
                match characters.set_active(id) {
                    Ok(character) => println!("now chatting as '{}'", character.name),
                    Err(e) => println!("! {e}"),
                }
            }
            _ if line.starts_with("/export ") => {
                let path = line.trim_start_matches("/export ").trim();
                match coordinator.export_transcript(std::path::Path::new(path)) {
                    Ok(()) => println!("exported to {path}"),
                    Err(e) => println!("! export failed: {e}"),
                }
            }
            _ if line.starts_with('/') => {
                println!("! unknown command: {line}");
            }
            _ => {
                if let Err(e) = coordinator.text_turn(&line, characters.active()).await {
                    println!("! {e}");
                }
            }
        }
    }

    Ok(())
}

/// Log to a daily-rolled file so output never interleaves with the
/// conversation on stdout.
fn init_logging() -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("selkie")
        .join("logs");
    std::fs::create_dir_all(&log_dir).context("creating log directory")?;

    let appender = tracing_appender::rolling::daily(&log_dir, "selkie.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
