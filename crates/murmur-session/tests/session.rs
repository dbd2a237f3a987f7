use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures_util::future::BoxFuture;
use murmur_audio::codec::{encode_frame, to_transport_text};
use murmur_audio::testing::ScriptedBackend;
use murmur_audio::CaptureConfig;
use murmur_session::{
    ChannelObserver, ClientMessage, Connection, Connector, OutboundEvent, RemoteEnd,
    SessionConfig, SessionError, SessionEvent, SessionObserver, VoiceSession,
};
use murmur_tools::InMemoryWorkspace;
use murmur_types::{AudioFrame, SessionState, Speaker, ToolInvocation, ToolResult, TranscriptUpdate};
use tokio::sync::{mpsc, Notify};

const FRAME: usize = 256;

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Accept,
    Fail,
    Hold,
}

/// Hands each in-memory remote end to the test.
struct FakeConnector {
    mode: Mutex<Mode>,
    release: Notify,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
}

impl FakeConnector {
    fn new(mode: Mode) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            mode: Mutex::new(mode),
            release: Notify::new(),
            remotes,
        });
        (connector, rx)
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }
}

impl Connector for FakeConnector {
    fn connect<'a>(
        &'a self,
        _config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Connection, SessionError>> {
        Box::pin(async move {
            let mode = *self.mode.lock().unwrap();
            match mode {
                Mode::Fail => return Err(SessionError::ConnectionFailed("refused".into())),
                Mode::Hold => self.release.notified().await,
                Mode::Accept => {}
            }
            let (connection, remote) = Connection::in_memory();
            let _ = self.remotes.send(remote);
            Ok(connection)
        })
    }
}

struct Harness {
    session: VoiceSession,
    backend: ScriptedBackend,
    connector: Arc<FakeConnector>,
    remotes: mpsc::UnboundedReceiver<RemoteEnd>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

fn harness(mode: Mode) -> Harness {
    let backend = ScriptedBackend::new(16_000, 1);
    let (connector, remotes) = FakeConnector::new(mode);
    let (observer, events) = ChannelObserver::new();
    let session = VoiceSession::new(
        Arc::new(backend.clone()),
        connector.clone(),
        Arc::new(InMemoryWorkspace::demo()),
        Arc::new(observer),
    );
    Harness {
        session,
        backend,
        connector,
        remotes,
        events,
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        capture: CaptureConfig {
            sample_rate: 16_000,
            frame_size: FRAME,
        },
        ..SessionConfig::default()
    }
}

async fn open(h: &mut Harness) -> RemoteEnd {
    h.session.connect(config()).await.unwrap();
    h.remotes.recv().await.unwrap()
}

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn next_sent(remote: &mut RemoteEnd) -> ClientMessage {
    tokio::time::timeout(Duration::from_secs(5), remote.sent.recv())
        .await
        .expect("timed out waiting for client frame")
        .expect("outbound channel closed")
}

fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn states(events: &[SessionEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::State(s) => Some(*s),
            _ => None,
        })
        .collect()
}

fn speech_chunk(samples: usize) -> String {
    to_transport_text(&encode_frame(&vec![0.25; samples]))
}

#[tokio::test]
async fn microphone_frames_stream_while_open() {
    let mut h = harness(Mode::Accept);
    let mut remote = open(&mut h).await;
    assert_eq!(h.session.state(), SessionState::Open);
    assert_eq!(h.backend.open_inputs(), 1);
    assert_eq!(h.backend.open_outputs(), 1);

    h.backend.push_block(&vec![0.5; FRAME]);

    match next_sent(&mut remote).await {
        ClientMessage::RealtimeInput(input) => {
            assert_eq!(input.audio.mime_type, "audio/pcm;rate=16000");
            let bytes = murmur_audio::codec::from_transport_text(&input.audio.data).unwrap();
            assert_eq!(bytes.len(), FRAME * 2);
        }
        other => panic!("expected audio, got {other:?}"),
    }

    let volumes: Vec<f32> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Volume(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(volumes.len(), 1);
    assert!((volumes[0] - 0.5).abs() < 1e-3);
}

#[tokio::test]
async fn stop_releases_everything_and_is_idempotent() {
    let mut h = harness(Mode::Accept);
    let mut remote = open(&mut h).await;

    h.session.stop();
    h.session.stop();

    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.backend.open_inputs(), 0);
    assert_eq!(h.backend.open_outputs(), 0);
    assert!(remote.is_closed());
    assert_eq!(
        states(&drain(&mut h.events)),
        vec![
            SessionState::Connecting,
            SessionState::Open,
            SessionState::Closing,
            SessionState::Closed,
        ]
    );
}

#[tokio::test]
async fn stop_before_connect_is_a_no_op() {
    let mut h = harness(Mode::Accept);
    h.session.stop();
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn no_audio_is_sent_after_stop_returns() {
    let mut h = harness(Mode::Accept);
    let mut remote = open(&mut h).await;

    let running = Arc::new(AtomicBool::new(true));
    let pusher = {
        let backend = h.backend.clone();
        let running = running.clone();
        std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                backend.push_block(&vec![0.1; FRAME]);
                std::thread::yield_now();
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    h.session.stop();

    // Every frame sent happened before stop returned, so the channel must
    // already be drained down to disconnection.
    loop {
        match remote.sent.try_recv() {
            Ok(ClientMessage::RealtimeInput(_)) => continue,
            Ok(other) => panic!("unexpected frame {other:?}"),
            Err(mpsc::error::TryRecvError::Disconnected) => break,
            Err(mpsc::error::TryRecvError::Empty) => panic!("sender still alive after stop"),
        }
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    running.store(false, Ordering::Release);
    pusher.join().unwrap();
    assert_eq!(h.backend.open_inputs(), 0);
}

#[tokio::test]
async fn second_connect_is_rejected() {
    let mut h = harness(Mode::Accept);
    let _remote = open(&mut h).await;

    let err = h.session.connect(config()).await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyActive));
    assert_eq!(h.session.state(), SessionState::Open);
    assert_eq!(h.backend.open_inputs(), 1);
}

#[tokio::test]
async fn failed_connect_releases_devices_and_allows_retry() {
    let mut h = harness(Mode::Fail);

    let err = h.session.connect(config()).await.unwrap_err();
    assert!(matches!(err, SessionError::ConnectionFailed(_)));
    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.backend.open_inputs(), 0);
    assert_eq!(h.backend.open_outputs(), 0);

    h.connector.set_mode(Mode::Accept);
    let _remote = open(&mut h).await;
    assert_eq!(h.session.state(), SessionState::Open);
}

#[tokio::test]
async fn missing_microphone_is_device_unavailable() {
    let mut h = harness(Mode::Accept);
    h.backend.fail_input("no microphone");

    let err = h.session.connect(config()).await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceUnavailable(_)));
    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.backend.open_outputs(), 0);
    assert!(h.remotes.try_recv().is_err(), "network must not be touched");
}

#[tokio::test]
async fn missing_speaker_is_device_unavailable() {
    let h = harness(Mode::Accept);
    h.backend.fail_output("no speaker");

    let err = h.session.connect(config()).await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceUnavailable(_)));
    assert_eq!(h.backend.open_inputs(), 0);
}

#[tokio::test]
async fn stop_during_connect_aborts_it() {
    let mut h = harness(Mode::Hold);
    let connecting = {
        let session = h.session.clone();
        tokio::spawn(async move { session.connect(config()).await })
    };

    let session = h.session.clone();
    wait_for("connecting", || session.state() == SessionState::Connecting).await;
    wait_for("devices", || h.backend.open_inputs() == 1).await;

    h.session.stop();
    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.backend.open_inputs(), 0);
    assert_eq!(h.backend.open_outputs(), 0);

    h.connector.release.notify_one();
    let err = connecting.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Aborted));
    assert_eq!(h.session.state(), SessionState::Closed);

    let mut remote = h.remotes.recv().await.unwrap();
    assert!(remote.is_closed());
    assert!(matches!(
        h.session.send(OutboundEvent::Audio(AudioFrame::new(vec![0i16; 4], 16_000))),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn send_requires_an_open_session() {
    let mut h = harness(Mode::Accept);
    let frame = AudioFrame::new(vec![1i16, 2, 3], 16_000);
    assert!(matches!(
        h.session.send(OutboundEvent::Audio(frame.clone())),
        Err(SessionError::NotConnected)
    ));

    let mut remote = open(&mut h).await;
    let invocation = ToolInvocation::new("t1", "getCurrentTime");
    h.session
        .send(OutboundEvent::ToolResult(ToolResult::new(
            &invocation,
            serde_json::json!({"ok": true}),
        )))
        .unwrap();
    match next_sent(&mut remote).await {
        ClientMessage::ToolResponse(response) => {
            assert_eq!(response.function_responses[0].id, "t1");
            assert_eq!(
                response.function_responses[0].response,
                serde_json::json!({"result": {"ok": true}})
            );
        }
        other => panic!("expected tool response, got {other:?}"),
    }

    h.session.stop();
    assert!(matches!(
        h.session.send(OutboundEvent::Audio(frame)),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn one_frame_feeds_playback_transcripts_and_tools() {
    let mut h = harness(Mode::Accept);
    let mut remote = open(&mut h).await;
    drain(&mut h.events);

    let frame = serde_json::json!({
        "serverContent": {
            "modelTurn": {"parts": [{"inlineData": {
                "mimeType": "audio/pcm;rate=24000",
                "data": speech_chunk(2400),
            }}]},
            "inputTranscription": {"text": "what time"},
            "outputTranscription": {"text": "Checking"},
            "turnComplete": true
        },
        "toolCall": {"functionCalls": [
            {"id": "call-1", "name": "getCurrentTime", "args": {}}
        ]}
    });
    assert!(remote.push_json(&frame.to_string()));

    match next_sent(&mut remote).await {
        ClientMessage::ToolResponse(response) => {
            let reply = &response.function_responses[0];
            assert_eq!(reply.id, "call-1");
            assert_eq!(reply.name, "getCurrentTime");
            assert!(reply.response["result"]["date"].is_string());
        }
        other => panic!("expected tool response, got {other:?}"),
    }

    let output = h.backend.last_output().unwrap();
    let history = output.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].samples.len(), 2400);
    assert_eq!(history[0].sample_rate, 24_000);

    let events = drain(&mut h.events);
    let transcripts: Vec<TranscriptUpdate> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Transcript(t) => Some(t.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        transcripts,
        vec![
            TranscriptUpdate::partial(Speaker::User, "what time"),
            TranscriptUpdate::partial(Speaker::Model, "Checking"),
            TranscriptUpdate::final_text(Speaker::Model, "Checking"),
            TranscriptUpdate::final_text(Speaker::User, "what time"),
        ]
    );
    assert!(events.contains(&SessionEvent::ToolStart("getCurrentTime".into())));
    let speaking = events.iter().find_map(|e| match e {
        SessionEvent::Volume(v) => Some(*v),
        _ => None,
    });
    let level = speaking.expect("model speech reports a level");
    assert!((0.3..=0.7).contains(&level));
}

#[tokio::test]
async fn transcript_fragments_accumulate_across_frames() {
    let mut h = harness(Mode::Accept);
    let remote = open(&mut h).await;
    drain(&mut h.events);

    remote.push_json(r#"{"serverContent":{"outputTranscription":{"text":"Hel"}}}"#);
    remote.push_json(r#"{"serverContent":{"outputTranscription":{"text":"lo"}}}"#);
    remote.push_json(r#"{"serverContent":{"turnComplete":true}}"#);

    let mut updates = Vec::new();
    while updates.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(5), h.events.recv())
            .await
            .unwrap()
            .unwrap();
        if let SessionEvent::Transcript(t) = event {
            updates.push(t);
        }
    }
    assert_eq!(updates[0].text, "Hel");
    assert_eq!(updates[1].text, "Hello");
    assert_eq!(updates[2], TranscriptUpdate::final_text(Speaker::Model, "Hello"));
}

#[tokio::test]
async fn interruption_drops_queued_speech() {
    let mut h = harness(Mode::Accept);
    let remote = open(&mut h).await;
    let output = h.backend.last_output().unwrap();
    let audio = |samples: usize| {
        serde_json::json!({"serverContent": {"modelTurn": {"parts": [{"inlineData": {
            "mimeType": "audio/pcm;rate=24000",
            "data": speech_chunk(samples),
        }}]}}})
        .to_string()
    };

    remote.push_json(&audio(24_000));
    remote.push_json(&audio(24_000));
    wait_for("queued speech", || output.pending() == 2).await;

    output.set_time(0.5);
    remote.push_json(r#"{"serverContent":{"interrupted":true}}"#);
    wait_for("queue cleared", || output.pending() == 0).await;

    remote.push_json(&audio(480));
    wait_for("new speech", || output.history().len() == 3).await;
    let history = output.history();
    assert!((history[2].start - 0.5).abs() < 1e-9);
    assert_eq!(h.session.state(), SessionState::Open);
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let mut h = harness(Mode::Accept);
    let mut remote = open(&mut h).await;

    remote.push_json("{not json");
    remote.push_json(r#"{"toolCall":{"functionCalls":[{"id":"x","name":"getCurrentTime"}]}}"#);

    assert!(matches!(next_sent(&mut remote).await, ClientMessage::ToolResponse(_)));
    assert_eq!(h.session.state(), SessionState::Open);
}

#[tokio::test]
async fn remote_close_ends_the_session() {
    let mut h = harness(Mode::Accept);
    let remote = open(&mut h).await;

    remote.hang_up(Some("1011 internal error"));

    let session = h.session.clone();
    wait_for("closed", || session.state() == SessionState::Closed).await;
    assert_eq!(h.backend.open_inputs(), 0);
    assert_eq!(h.backend.open_outputs(), 0);

    // The session can be reopened afterwards.
    let _next = open(&mut h).await;
    assert_eq!(h.session.state(), SessionState::Open);
}

#[tokio::test]
async fn null_tool_arguments_still_get_one_result() {
    let mut h = harness(Mode::Accept);
    let mut remote = open(&mut h).await;

    remote.push_json(r#"{"toolCall":{"functionCalls":[{"id":"x","name":"sendEmail","args":null}]}}"#);

    match next_sent(&mut remote).await {
        ClientMessage::ToolResponse(response) => {
            let reply = &response.function_responses[0];
            assert_eq!(reply.id, "x");
            let error = reply.response["result"]["error"].as_str().unwrap();
            assert!(error.contains("invalid arguments"), "{error}");
        }
        other => panic!("expected tool response, got {other:?}"),
    }
}

#[tokio::test]
async fn non_object_tool_arguments_keep_the_rest_of_the_frame() {
    let mut h = harness(Mode::Accept);
    let mut remote = open(&mut h).await;
    drain(&mut h.events);

    let frame = serde_json::json!({
        "serverContent": {"outputTranscription": {"text": "Sending"}},
        "toolCall": {"functionCalls": [
            {"id": "s1", "name": "sendEmail", "args": "to=bob"}
        ]}
    });
    remote.push_json(&frame.to_string());

    match next_sent(&mut remote).await {
        ClientMessage::ToolResponse(response) => {
            let reply = &response.function_responses[0];
            assert_eq!(reply.id, "s1");
            assert!(reply.response["result"]["error"].is_string());
        }
        other => panic!("expected tool response, got {other:?}"),
    }
    assert!(drain(&mut h.events)
        .contains(&SessionEvent::Transcript(TranscriptUpdate::partial(Speaker::Model, "Sending"))));
}

type Trigger = Box<dyn Fn(&SessionEvent) -> bool + Send + Sync>;

/// Calls `stop` from inside the first observer callback matching `trigger`
/// and keeps every event seen after `stop` returned.
struct StopOnEvent {
    session: OnceLock<VoiceSession>,
    trigger: Trigger,
    stopped: AtomicBool,
    after: Mutex<Vec<SessionEvent>>,
}

impl StopOnEvent {
    fn record(&self, event: SessionEvent) {
        if self.stopped.load(Ordering::Acquire) {
            self.after.lock().unwrap().push(event);
            return;
        }
        if (self.trigger)(&event) {
            if let Some(session) = self.session.get() {
                session.stop();
            }
            self.stopped.store(true, Ordering::Release);
        }
    }

    fn after(&self) -> Vec<SessionEvent> {
        self.after.lock().unwrap().clone()
    }
}

impl SessionObserver for StopOnEvent {
    fn on_volume(&self, level: f32) {
        self.record(SessionEvent::Volume(level));
    }

    fn on_transcript(&self, update: TranscriptUpdate) {
        self.record(SessionEvent::Transcript(update));
    }

    fn on_tool_start(&self, name: &str) {
        self.record(SessionEvent::ToolStart(name.to_string()));
    }

    fn on_state(&self, state: SessionState) {
        self.record(SessionEvent::State(state));
    }
}

struct Reentrant {
    session: VoiceSession,
    backend: ScriptedBackend,
    workspace: Arc<InMemoryWorkspace>,
    observer: Arc<StopOnEvent>,
    remotes: mpsc::UnboundedReceiver<RemoteEnd>,
}

fn stopping_on(trigger: impl Fn(&SessionEvent) -> bool + Send + Sync + 'static) -> Reentrant {
    let backend = ScriptedBackend::new(16_000, 1);
    let (connector, remotes) = FakeConnector::new(Mode::Accept);
    let workspace = Arc::new(InMemoryWorkspace::new());
    let observer = Arc::new(StopOnEvent {
        session: OnceLock::new(),
        trigger: Box::new(trigger),
        stopped: AtomicBool::new(false),
        after: Mutex::new(Vec::new()),
    });
    let session = VoiceSession::new(
        Arc::new(backend.clone()),
        connector,
        workspace.clone(),
        observer.clone(),
    );
    assert!(observer.session.set(session.clone()).is_ok());
    Reentrant {
        session,
        backend,
        workspace,
        observer,
        remotes,
    }
}

impl Reentrant {
    async fn open(&mut self) -> RemoteEnd {
        self.session.connect(config()).await.unwrap();
        self.remotes.recv().await.unwrap()
    }

    async fn assert_stopped_cleanly(&self, remote: &mut RemoteEnd) {
        let session = self.session.clone();
        wait_for("closed", || session.state() == SessionState::Closed).await;
        assert!(self.observer.stopped.load(Ordering::Acquire));
        assert_eq!(self.backend.open_inputs(), 0);
        assert_eq!(self.backend.open_outputs(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(self.observer.after(), Vec::new());
        assert!(self.workspace.sent().is_empty(), "no tool may run after stop");
        loop {
            match remote.sent.try_recv() {
                Ok(ClientMessage::ToolResponse(r)) => panic!("tool result after stop: {r:?}"),
                Ok(_) => continue,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
                Err(mpsc::error::TryRecvError::Empty) => panic!("sender still alive after stop"),
            }
        }
    }
}

fn email_call(id: &str) -> serde_json::Value {
    serde_json::json!({"id": id, "name": "sendEmail", "args": {
        "to": "a@example.com", "subject": "hi", "body": "there"
    }})
}

fn finals(events: &[SessionEvent]) -> Vec<TranscriptUpdate> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Transcript(t) if t.is_final => Some(t.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn stop_from_transcript_callback_drops_the_rest_of_the_frame() {
    let mut h = stopping_on(|e| {
        matches!(e, SessionEvent::Transcript(t) if t.speaker == Speaker::User && t.text == "bye")
    });
    let mut remote = h.open().await;

    let frame = serde_json::json!({
        "serverContent": {
            "inputTranscription": {"text": "bye"},
            "outputTranscription": {"text": "Goodbye"},
            "turnComplete": true
        },
        "toolCall": {"functionCalls": [email_call("late")]}
    });
    remote.push_json(&frame.to_string());
    h.assert_stopped_cleanly(&mut remote).await;

    // The next session starts with empty transcript buffers.
    let next = h.open().await;
    next.push_json(r#"{"serverContent":{"outputTranscription":{"text":"Hi"},"turnComplete":true}}"#);
    let observer = h.observer.clone();
    wait_for("final", || !finals(&observer.after()).is_empty()).await;
    assert_eq!(
        finals(&h.observer.after()),
        vec![TranscriptUpdate::final_text(Speaker::Model, "Hi")]
    );
}

#[tokio::test]
async fn stop_from_tool_start_callback_skips_the_tool() {
    let mut h = stopping_on(|e| matches!(e, SessionEvent::ToolStart(_)));
    let mut remote = h.open().await;

    let frame = serde_json::json!({
        "toolCall": {"functionCalls": [email_call("first"), email_call("second")]}
    });
    remote.push_json(&frame.to_string());
    h.assert_stopped_cleanly(&mut remote).await;
}

#[tokio::test]
async fn stop_from_microphone_volume_callback() {
    let mut h = stopping_on(|e| matches!(e, SessionEvent::Volume(v) if *v > 0.0));
    let mut remote = h.open().await;

    // Four frames in one block; the first volume reading stops the session.
    h.backend.push_block(&vec![0.5; FRAME * 4]);

    assert_eq!(h.session.state(), SessionState::Closed);
    h.assert_stopped_cleanly(&mut remote).await;
}

#[tokio::test]
async fn stop_from_playback_idle_callback() {
    let mut h = stopping_on(|e| matches!(e, SessionEvent::Volume(v) if *v == 0.0));
    let mut remote = h.open().await;
    let output = h.backend.last_output().unwrap();

    let frame = serde_json::json!({"serverContent": {"modelTurn": {"parts": [{"inlineData": {
        "mimeType": "audio/pcm;rate=24000",
        "data": speech_chunk(2400),
    }}]}}});
    remote.push_json(&frame.to_string());
    wait_for("speech scheduled", || output.history().len() == 1).await;

    output.set_time(1.0);
    output.finish_due();

    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(output.is_closed());
    h.assert_stopped_cleanly(&mut remote).await;
}
