//! The streaming voice session.
//!
//! `VoiceSession` owns everything a live conversation needs: the capture
//! unit, the playback scheduler, the tool bridge, and the connection. It is
//! the only place session state changes.
//!
//! The outbound sender sits in an `RwLock<Option<_>>` slot. The capture
//! callback takes the read side with `try_read` (never blocking the device
//! thread) and `stop` takes the write side to empty the slot. Once `stop`
//! has the write lock no capture callback is mid-send, and once the slot is
//! empty no later callback can send.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use murmur_audio::{codec, AudioBackend, CaptureUnit, PlaybackScheduler};
use murmur_tools::{Capabilities, ToolBridge, ToolError};
use murmur_types::{
    AudioFrame, SessionState, ToolResult, TranscriptUpdate, PLAYBACK_SAMPLE_RATE_HZ,
};
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::observer::SessionObserver;
use crate::protocol::{ClientMessage, InboundEvent};
use crate::transcript::TranscriptAggregator;
use crate::transport::{Connector, Inbound};

/// Something the host (or the session itself) sends to the remote model.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    Audio(AudioFrame),
    ToolResult(ToolResult),
}

impl OutboundEvent {
    fn into_message(self) -> ClientMessage {
        match self {
            OutboundEvent::Audio(frame) => {
                ClientMessage::audio(codec::to_transport_text(&codec::frame_to_bytes(&frame)))
            }
            OutboundEvent::ToolResult(result) => ClientMessage::tool_result(result),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Resources {
    capture: Option<CaptureUnit>,
    playback: Option<Arc<PlaybackScheduler>>,
    bridge: Option<Arc<ToolBridge>>,
    closer: Option<oneshot::Sender<()>>,
    inbound_task: Option<JoinHandle<()>>,
}

struct Inner {
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn Connector>,
    capabilities: Arc<dyn Capabilities>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<SessionState>,
    // Bumped by every connect so a stale attempt can tell it lost.
    attempt: AtomicU64,
    outbound: RwLock<Option<mpsc::UnboundedSender<ClientMessage>>>,
    resources: Mutex<Resources>,
    transcripts: Mutex<TranscriptAggregator>,
}

/// A voice conversation with the remote model.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct VoiceSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSession")
            .field("state", &self.state())
            .finish()
    }
}

impl VoiceSession {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        connector: Arc<dyn Connector>,
        capabilities: Arc<dyn Capabilities>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                connector,
                capabilities,
                observer,
                state: Mutex::new(SessionState::Idle),
                attempt: AtomicU64::new(0),
                outbound: RwLock::new(None),
                resources: Mutex::new(Resources::default()),
                transcripts: Mutex::new(TranscriptAggregator::new()),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.inner.state)
    }

    /// Acquires the speaker and microphone, opens the remote session, and
    /// starts streaming.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `AlreadyActive` if a session is connecting or open.
    /// - `DeviceUnavailable` if either audio device cannot be opened.
    /// - `ConnectionFailed` if the remote session cannot be established.
    /// - `Aborted` if `stop` was called before the connection came up.
    ///
    /// Whatever was acquired before a failure is released again.
    pub async fn connect(&self, config: SessionConfig) -> Result<(), SessionError> {
        let attempt = {
            let mut state = lock(&self.inner.state);
            if state.is_live() {
                return Err(SessionError::AlreadyActive);
            }
            *state = SessionState::Connecting;
            self.inner.attempt.fetch_add(1, Ordering::AcqRel) + 1
        };
        lock(&self.inner.transcripts).clear();
        self.inner.observer.on_state(SessionState::Connecting);
        info!(attempt, model = %config.model, "voice session connecting");

        if let Err(e) = self.acquire_devices(attempt, &config) {
            warn!(error = %e, "audio devices unavailable");
            return Err(self.inner.fail_attempt(attempt, e));
        }

        let connection = match self.inner.connector.connect(&config).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "voice session connect failed");
                return Err(self.inner.fail_attempt(attempt, e));
            }
        };

        {
            let mut state = lock(&self.inner.state);
            if !self.inner.is_current(*state, attempt) {
                info!(attempt, "connect finished after stop, closing connection");
                let _ = connection.closer.send(());
                return Err(SessionError::Aborted);
            }

            let bridge = Arc::new(self.tool_bridge());
            let inbound_task = tokio::spawn(run_inbound(
                Arc::downgrade(&self.inner),
                attempt,
                connection.inbound,
                bridge.clone(),
            ));
            {
                let mut resources = lock(&self.inner.resources);
                resources.bridge = Some(bridge);
                resources.closer = Some(connection.closer);
                resources.inbound_task = Some(inbound_task);
            }
            *self
                .inner
                .outbound
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(connection.outbound);
            *state = SessionState::Open;
        }

        self.inner.observer.on_state(SessionState::Open);
        info!(attempt, "voice session open");
        Ok(())
    }

    /// Output first, then input. Each is stored as soon as it exists so a
    /// concurrent `stop` can release it; if `stop` already ran, the device is
    /// released here instead.
    fn acquire_devices(&self, attempt: u64, config: &SessionConfig) -> Result<(), SessionError> {
        let output = self.inner.backend.open_output(PLAYBACK_SAMPLE_RATE_HZ)?;
        let idle_observer = self.inner.observer.clone();
        let playback = Arc::new(PlaybackScheduler::new(output, move || {
            idle_observer.on_volume(0.0);
        }));
        {
            let state = lock(&self.inner.state);
            if !self.inner.is_current(*state, attempt) {
                drop(state);
                playback.shutdown();
                return Err(SessionError::Aborted);
            }
            lock(&self.inner.resources).playback = Some(playback);
        }

        let volume_observer = self.inner.observer.clone();
        let weak = Arc::downgrade(&self.inner);
        let capture = CaptureUnit::start(
            self.inner.backend.as_ref(),
            config.capture,
            move |volume| volume_observer.on_volume(volume.value()),
            move |frame| {
                if let Some(inner) = weak.upgrade() {
                    inner.forward_frame(frame);
                }
            },
        )?;
        let state = lock(&self.inner.state);
        if !self.inner.is_current(*state, attempt) {
            drop(state);
            capture.stop();
            return Err(SessionError::Aborted);
        }
        lock(&self.inner.resources).capture = Some(capture);
        Ok(())
    }

    fn tool_bridge(&self) -> ToolBridge {
        let weak = Arc::downgrade(&self.inner);
        let sink = move |result: ToolResult| -> Result<(), ToolError> {
            let inner = weak
                .upgrade()
                .ok_or_else(|| ToolError::Undeliverable("session dropped".into()))?;
            inner
                .send(OutboundEvent::ToolResult(result))
                .map_err(|e| ToolError::Undeliverable(e.to_string()))
        };
        let observer = self.inner.observer.clone();
        ToolBridge::new(self.inner.capabilities.clone(), Arc::new(sink))
            .with_start_hook(move |name| observer.on_tool_start(name))
    }

    /// Sends an event to the remote model.
    ///
    /// # Errors
    ///
    /// `NotConnected` unless the session is open.
    pub fn send(&self, event: OutboundEvent) -> Result<(), SessionError> {
        self.inner.send(event)
    }

    /// Ends the session and releases every resource. Idempotent, never
    /// blocks on the network, and safe to call from any callback. After it
    /// returns no audio is sent, no playback is scheduled, and no tool
    /// dispatch starts.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl Inner {
    fn send(&self, event: OutboundEvent) -> Result<(), SessionError> {
        let slot = self.outbound.read().unwrap_or_else(PoisonError::into_inner);
        let tx = slot.as_ref().ok_or(SessionError::NotConnected)?;
        tx.send(event.into_message())
            .map_err(|_| SessionError::NotConnected)
    }

    /// Capture-path send. Never blocks: a contended slot means `stop` is
    /// running, and the frame is dropped.
    fn forward_frame(&self, frame: AudioFrame) {
        let Ok(slot) = self.outbound.try_read() else {
            return;
        };
        if let Some(tx) = slot.as_ref() {
            let text = codec::to_transport_text(&codec::frame_to_bytes(&frame));
            let _ = tx.send(ClientMessage::audio(text));
        }
    }

    fn stop(&self) {
        {
            let mut state = lock(&self.state);
            if !state.is_live() || *state == SessionState::Closing {
                return;
            }
            *state = SessionState::Closing;
        }
        self.observer.on_state(SessionState::Closing);
        info!("voice session stopping");
        self.release();
        *lock(&self.state) = SessionState::Closed;
        self.observer.on_state(SessionState::Closed);
        info!("voice session closed");
    }

    fn is_current(&self, state: SessionState, attempt: u64) -> bool {
        state == SessionState::Connecting && self.attempt.load(Ordering::Acquire) == attempt
    }

    /// Fails a connect attempt with `error`, or with `Aborted` if a `stop`
    /// already took it over.
    fn fail_attempt(&self, attempt: u64, error: SessionError) -> SessionError {
        {
            let mut state = lock(&self.state);
            if !self.is_current(*state, attempt) {
                return SessionError::Aborted;
            }
            *state = SessionState::Closing;
        }
        self.release();
        *lock(&self.state) = SessionState::Closed;
        self.observer.on_state(SessionState::Closed);
        error
    }

    /// Whether inbound events of `attempt` may still be routed.
    fn is_routing(&self, attempt: u64) -> bool {
        *lock(&self.state) == SessionState::Open && self.attempt.load(Ordering::Acquire) == attempt
    }

    /// Stops the session only if it is still the one started by `attempt`.
    fn stop_attempt(&self, attempt: u64) {
        if self.attempt.load(Ordering::Acquire) == attempt {
            self.stop();
        }
    }

    /// Each step runs regardless of the others.
    fn release(&self) {
        let sender = self
            .outbound
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let resources = std::mem::take(&mut *lock(&self.resources));
        if let Some(capture) = resources.capture {
            capture.stop();
        }
        if let Some(playback) = resources.playback {
            playback.shutdown();
        }
        if let Some(bridge) = resources.bridge {
            bridge.shutdown();
        }
        if let Some(closer) = resources.closer {
            let _ = closer.send(());
        }
        drop(sender);
        if let Some(task) = resources.inbound_task {
            task.abort();
        }
        lock(&self.transcripts).clear();
        debug!("session resources released");
    }

    fn emit_transcripts(&self, updates: impl IntoIterator<Item = TranscriptUpdate>) {
        for update in updates {
            if *lock(&self.state) != SessionState::Open {
                break;
            }
            self.observer.on_transcript(update);
        }
    }

    fn route(&self, event: InboundEvent, bridge: &ToolBridge) {
        match event {
            InboundEvent::SetupComplete => debug!("late setupComplete ignored"),
            InboundEvent::Audio { data, sample_rate } => {
                let level = 0.3 + rand::thread_rng().gen::<f32>() * 0.4;
                self.observer.on_volume(level);
                self.play(&data, sample_rate);
            }
            InboundEvent::Interrupted => {
                info!("model interrupted, dropping queued speech");
                if let Some(playback) = self.playback() {
                    playback.reset();
                }
            }
            InboundEvent::Transcript { speaker, text } => {
                let update = lock(&self.transcripts).append_fragment(speaker, &text);
                self.emit_transcripts(update);
            }
            InboundEvent::TurnComplete => {
                let finals = lock(&self.transcripts).finalize_turn();
                self.emit_transcripts(finals);
            }
            InboundEvent::ToolCall(invocation) => {
                bridge.dispatch(invocation);
            }
            InboundEvent::ToolCallCancellation(ids) => {
                info!(?ids, "server cancelled tool calls");
            }
            InboundEvent::GoAway { time_left } => {
                warn!(time_left = time_left.as_deref().unwrap_or("unknown"), "server going away");
            }
        }
    }

    fn playback(&self) -> Option<Arc<PlaybackScheduler>> {
        lock(&self.resources).playback.clone()
    }

    fn play(&self, data: &str, sample_rate: u32) {
        let bytes = match codec::from_transport_text(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %SessionError::from(e), "dropping undecodable audio chunk");
                return;
            }
        };
        let Some(playback) = self.playback() else {
            return;
        };
        if let Err(e) = playback.enqueue(&bytes, sample_rate) {
            debug!(error = %e, "audio chunk not scheduled");
        }
    }
}

async fn run_inbound(
    inner: Weak<Inner>,
    attempt: u64,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    bridge: Arc<ToolBridge>,
) {
    let mut reason = None;
    while let Some(item) = inbound.recv().await {
        let Some(session) = inner.upgrade() else {
            return;
        };
        match item {
            Inbound::Message(message) => {
                for event in message.into_events() {
                    // Observers may stop the session while a frame is routed.
                    if !session.is_routing(attempt) {
                        debug!(attempt, "session no longer open, dropping inbound events");
                        return;
                    }
                    session.route(event, &bridge);
                }
            }
            Inbound::Malformed(e) => {
                warn!(error = %SessionError::Protocol(e), "ignoring malformed server frame");
            }
            Inbound::Closed(why) => {
                reason = why;
                break;
            }
        }
    }

    info!(reason = reason.as_deref().unwrap_or("none"), "remote session ended");
    if let Some(session) = inner.upgrade() {
        session.stop_attempt(attempt);
    }
}
