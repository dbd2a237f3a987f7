//! Scripted devices for driving the pipeline without hardware.
//!
//! `ScriptedBackend` hands out inputs fed by `push_block` and
//! `ManualOutput` devices whose clock only moves when a test says so.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::device::{
    AudioBackend, EndedCallback, InputCallback, InputFormat, InputStream, OutputDevice,
};
use crate::error::AudioError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type SharedCallback = Arc<Mutex<InputCallback>>;

#[derive(Default)]
struct BackendState {
    next_input_id: u64,
    inputs: Vec<(u64, SharedCallback)>,
    outputs: Vec<Arc<ManualOutput>>,
    input_failure: Option<String>,
    output_failure: Option<String>,
}

/// Audio backend whose microphone is fed by the test.
#[derive(Clone)]
pub struct ScriptedBackend {
    format: InputFormat,
    state: Arc<Mutex<BackendState>>,
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("format", &self.format)
            .field("open_inputs", &self.open_inputs())
            .finish()
    }
}

impl ScriptedBackend {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            format: InputFormat {
                sample_rate,
                channels,
            },
            state: Arc::default(),
        }
    }

    /// Delivers one interleaved block to every open input.
    pub fn push_block(&self, block: &[f32]) {
        let callbacks: Vec<SharedCallback> = lock(&self.state)
            .inputs
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in callbacks {
            let mut on_block = lock(&cb);
            (*on_block)(block);
        }
    }

    /// Makes the next input negotiation fail as if no microphone existed.
    pub fn fail_input(&self, reason: &str) {
        lock(&self.state).input_failure = Some(reason.to_string());
    }

    /// Makes the next output open fail.
    pub fn fail_output(&self, reason: &str) {
        lock(&self.state).output_failure = Some(reason.to_string());
    }

    /// Number of inputs opened and not yet closed.
    pub fn open_inputs(&self) -> usize {
        lock(&self.state).inputs.len()
    }

    /// Number of outputs opened and not yet closed.
    pub fn open_outputs(&self) -> usize {
        lock(&self.state)
            .outputs
            .iter()
            .filter(|o| !o.is_closed())
            .count()
    }

    /// The most recently opened output device.
    pub fn last_output(&self) -> Option<Arc<ManualOutput>> {
        lock(&self.state).outputs.last().cloned()
    }
}

impl AudioBackend for ScriptedBackend {
    fn input_format(&self, _preferred_rate: u32) -> Result<InputFormat, AudioError> {
        match lock(&self.state).input_failure.take() {
            Some(reason) => Err(AudioError::DeviceUnavailable(reason)),
            None => Ok(self.format),
        }
    }

    fn open_input(
        &self,
        _format: InputFormat,
        on_block: InputCallback,
    ) -> Result<Box<dyn InputStream>, AudioError> {
        let mut state = lock(&self.state);
        if let Some(reason) = state.input_failure.take() {
            return Err(AudioError::DeviceUnavailable(reason));
        }
        let id = state.next_input_id;
        state.next_input_id += 1;
        state.inputs.push((id, Arc::new(Mutex::new(on_block))));
        Ok(Box::new(ScriptedInput {
            id,
            state: self.state.clone(),
        }))
    }

    fn open_output(&self, _sample_rate: u32) -> Result<Arc<dyn OutputDevice>, AudioError> {
        let mut state = lock(&self.state);
        if let Some(reason) = state.output_failure.take() {
            return Err(AudioError::DeviceUnavailable(reason));
        }
        let output = ManualOutput::new();
        state.outputs.push(output.clone());
        Ok(output)
    }
}

struct ScriptedInput {
    id: u64,
    state: Arc<Mutex<BackendState>>,
}

impl InputStream for ScriptedInput {
    fn close(&mut self) {
        lock(&self.state).inputs.retain(|(id, _)| *id != self.id);
    }
}

impl Drop for ScriptedInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// One buffer handed to a `ManualOutput`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedBuffer {
    pub start: f64,
    pub duration: f64,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

struct Pending {
    end: f64,
    on_ended: EndedCallback,
}

#[derive(Default)]
struct OutputState {
    now: f64,
    pending: Vec<Pending>,
    history: Vec<PlayedBuffer>,
    closed: bool,
}

/// Output device with a hand-driven clock.
#[derive(Default)]
pub struct ManualOutput {
    state: Mutex<OutputState>,
}

impl std::fmt::Debug for ManualOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ManualOutput")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl ManualOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_time(&self, secs: f64) {
        lock(&self.state).now = secs;
    }

    pub fn advance(&self, secs: f64) {
        lock(&self.state).now += secs;
    }

    /// Fires the ended callback of every buffer whose end time has passed.
    pub fn finish_due(&self) {
        let due: Vec<EndedCallback> = {
            let mut state = lock(&self.state);
            let now = state.now;
            let (done, rest): (Vec<Pending>, Vec<Pending>) = state
                .pending
                .drain(..)
                .partition(|p| p.end <= now + 1e-9);
            state.pending = rest;
            let mut done = done;
            done.sort_by(|a, b| a.end.total_cmp(&b.end));
            done.into_iter().map(|p| p.on_ended).collect()
        };
        for cb in due {
            cb();
        }
    }

    /// Buffers scheduled and not yet finished or cleared.
    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Every buffer ever scheduled, in scheduling order.
    pub fn history(&self) -> Vec<PlayedBuffer> {
        lock(&self.state).history.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl OutputDevice for ManualOutput {
    fn current_time(&self) -> f64 {
        lock(&self.state).now
    }

    fn schedule(
        &self,
        start_at: f64,
        samples: Vec<f32>,
        sample_rate: u32,
        on_ended: EndedCallback,
    ) -> Result<(), AudioError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(AudioError::Stopped);
        }
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / f64::from(sample_rate)
        };
        state.pending.push(Pending {
            end: start_at + duration,
            on_ended,
        });
        state.history.push(PlayedBuffer {
            start: start_at,
            duration,
            sample_rate,
            samples,
        });
        Ok(())
    }

    fn clear(&self) {
        lock(&self.state).pending.clear();
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        state.pending.clear();
        state.closed = true;
    }
}
