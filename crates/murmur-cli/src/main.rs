//! Murmur binary: a voice conversation with the remote model from the
//! terminal.
//!
//! Opens the default (or configured) microphone and speaker, connects a
//! live session with the demo workspace as its tool host, logs transcripts
//! and records finished ones in the workspace history, and shuts down on
//! SIGTERM/SIGINT or when the remote ends the session.

mod config;

use std::sync::Arc;

use murmur_audio::CpalBackend;
use murmur_session::{ChannelObserver, GeminiConnector, SessionEvent, VoiceSession};
use murmur_tools::InMemoryWorkspace;
use murmur_types::{SessionState, TranscriptUpdate};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("MURMUR_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("murmur.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, murmur cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    if config.session.api_key.is_empty() {
        tracing::warn!("no API key configured, set MURMUR_API_KEY or session.api_key");
    }
    match CpalBackend::input_device_names() {
        Ok(names) => tracing::debug!(?names, "available input devices"),
        Err(e) => tracing::debug!(error = %e, "could not enumerate input devices"),
    }

    let backend = CpalBackend::with_devices(
        config.audio.input_device.clone(),
        config.audio.output_device.clone(),
    );
    let connector = GeminiConnector::new(config.session.api_key.clone())
        .with_endpoint(config.session.endpoint.clone())
        .with_handshake_timeout(config.session.handshake_timeout());
    let (observer, mut events) = ChannelObserver::new();
    let workspace = Arc::new(InMemoryWorkspace::demo());
    let session = VoiceSession::new(
        Arc::new(backend),
        Arc::new(connector),
        workspace.clone(),
        Arc::new(observer),
    );

    if let Err(e) = session.connect(config.session_config()).await {
        tracing::error!(error = %e, "could not start voice session");
        std::process::exit(1);
    }
    tracing::info!(voice = %config.session.voice, "listening, press Ctrl+C to stop");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            event = events.recv() => match event {
                Some(SessionEvent::Transcript(update)) if update.is_final => {
                    tracing::info!(speaker = %update.speaker, text = %update.text, "transcript");
                    remember(&workspace, &update);
                }
                Some(SessionEvent::Transcript(update)) => {
                    tracing::debug!(speaker = %update.speaker, text = %update.text, "partial transcript");
                }
                Some(SessionEvent::ToolStart(name)) => {
                    tracing::info!(tool = %name, "running tool");
                }
                Some(SessionEvent::State(SessionState::Closed)) | None => {
                    tracing::info!("session ended by remote");
                    break;
                }
                Some(SessionEvent::State(state)) => tracing::debug!(%state, "session state"),
                Some(SessionEvent::Volume(_)) => {}
            },
        }
    }

    session.stop();
    tracing::info!("murmur shut down");
}

/// Makes a finished utterance visible to `searchHistory`.
fn remember(workspace: &InMemoryWorkspace, update: &TranscriptUpdate) {
    workspace.push_history(format!("{}: {}", update.speaker, update.text));
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, stopping session"); }
        () = terminate => { tracing::info!("received SIGTERM, stopping session"); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_tools::Capabilities;
    use murmur_types::Speaker;

    #[test]
    fn finished_transcripts_are_searchable() {
        let workspace = InMemoryWorkspace::new();
        remember(
            &workspace,
            &TranscriptUpdate::final_text(Speaker::User, "book the dentist on friday"),
        );
        remember(
            &workspace,
            &TranscriptUpdate::final_text(Speaker::Model, "Booked for Friday at ten"),
        );

        let found = workspace.search_history("dentist").unwrap();
        assert!(found.contains("book the dentist on friday"), "{found}");
        assert!(!found.contains("Booked"), "{found}");
    }
}
