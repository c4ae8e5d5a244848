//! Terminal client for the voice relay.
//!
//! Captures the default microphone, plays agent audio on the default output
//! device, and drives one `SessionController` from single-letter commands
//! read on stdin.

mod args;
mod audio;

use anyhow::Context;
use args::Args;
use audio::{CpalMicrophone, CpalOutput};
use clap::Parser;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, watch},
};
use tracing::{debug, info, warn};
use voxbridge_core::{
    SessionController, SessionDeps, SessionSnapshot, SessionUpdate,
    credentials::HttpCredentialSource,
    relay::WsConnector,
    session::Speaker,
};

const HELP: &str = "Commands: c = connect, d = disconnect, s = statistics, h = help, q = quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let config = args.session_config()?;
    info!(
        credential_endpoint = %config.credential_endpoint,
        agent_id = config.agent_id.as_deref().unwrap_or("<lookup>"),
        "Client configured."
    );

    let output = tokio::task::spawn_blocking(CpalOutput::open)
        .await
        .context("Playback setup panicked")?
        .context("Failed to open audio output")?;

    let deps = SessionDeps {
        credentials: Arc::new(HttpCredentialSource::new(
            config.credential_endpoint.clone(),
            config.agent_endpoint.clone(),
        )),
        connector: Arc::new(WsConnector),
        microphone: Arc::new(CpalMicrophone),
        output: Box::new(output),
    };
    let (controller, updates) = SessionController::new(config, deps);
    let handle = controller.handle();
    let snapshots = controller.subscribe();

    let controller_task = tokio::spawn(controller.run());
    let printer_task = tokio::spawn(print_updates(updates));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "c" => { handle.connect(); }
                    "d" => { handle.disconnect(); }
                    "s" => print_snapshot(&snapshots),
                    "h" => println!("{HELP}"),
                    "q" => break,
                    "" => {}
                    other => println!("Unknown command '{other}'. {HELP}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C.");
                break;
            }
        }
    }

    handle.shutdown();
    if let Err(e) = controller_task.await {
        warn!("Session controller ended abnormally: {}", e);
    }
    printer_task.abort();
    Ok(())
}

async fn print_updates(mut updates: mpsc::UnboundedReceiver<SessionUpdate>) {
    while let Some(update) = updates.recv().await {
        match update {
            SessionUpdate::StateChanged(state) => println!("[{state}]"),
            SessionUpdate::Transcript { speaker, text } => {
                let who = match speaker {
                    Speaker::User => "you",
                    Speaker::Agent => "agent",
                    Speaker::AgentCorrection => "agent (corrected)",
                };
                println!("{who}: {text}");
            }
            SessionUpdate::Notice(message) => println!("! {message}"),
            SessionUpdate::Volume(_) => {}
            SessionUpdate::VoiceActivity(score) => {
                let filled = (score * 10.0).round() as usize;
                debug!("voice activity [{:<10}] {:.2}", "#".repeat(filled), score);
            }
        }
    }
}

fn print_snapshot(snapshots: &watch::Receiver<SessionSnapshot>) {
    let s = snapshots.borrow().clone();
    println!("state:             {}", s.state);
    println!("agent:             {}", s.agent_id.as_deref().unwrap_or("-"));
    println!("conversation:      {}", s.conversation_id.as_deref().unwrap_or("-"));
    println!("agent speaking:    {}", s.agent_speaking);
    println!(
        "relay url:         {}",
        s.url_kind.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("messages sent:     {}", s.messages_sent);
    println!("frames sent:       {}", s.frames_sent);
    println!("frames suppressed: {}", s.frames_suppressed);
    println!("chunks received:   {}", s.chunks_received);
    println!("last error:        {}", s.last_error.as_deref().unwrap_or("-"));
}
