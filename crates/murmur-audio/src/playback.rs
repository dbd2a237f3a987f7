//! Gap-free playback of inbound speech.
//!
//! The scheduler keeps a cursor on the output device timeline: the time at
//! which the next buffer may start. Each buffer starts at
//! `max(cursor, now)` and pushes the cursor forward by its duration, so
//! consecutive buffers play back-to-back and a late buffer plays immediately
//! instead of in the past.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace, warn};

use crate::codec;
use crate::device::OutputDevice;
use crate::error::AudioError;

/// How close the device clock must be to the cursor for playback to count
/// as drained.
pub const IDLE_TOLERANCE_SECS: f64 = 0.1;

/// Where a buffer landed on the device timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    /// Start time in device seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

impl Scheduled {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug)]
struct Timeline {
    cursor: f64,
    // Bumped on every reset so completions of cleared buffers are ignored.
    generation: u64,
    shut_down: bool,
}

/// Schedules decoded PCM buffers on an output device.
pub struct PlaybackScheduler {
    output: Arc<dyn OutputDevice>,
    timeline: Arc<Mutex<Timeline>>,
    on_idle: Arc<dyn Fn() + Send + Sync>,
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("timeline", &*lock(&self.timeline))
            .finish()
    }
}

fn lock(timeline: &Mutex<Timeline>) -> MutexGuard<'_, Timeline> {
    timeline.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PlaybackScheduler {
    /// Creates a scheduler on `output`. `on_idle` fires when the last
    /// scheduled buffer finishes and nothing else is queued.
    pub fn new(output: Arc<dyn OutputDevice>, on_idle: impl Fn() + Send + Sync + 'static) -> Self {
        let cursor = output.current_time();
        Self {
            output,
            timeline: Arc::new(Mutex::new(Timeline {
                cursor,
                generation: 0,
                shut_down: false,
            })),
            on_idle: Arc::new(on_idle),
        }
    }

    /// Next available start time on the device timeline.
    pub fn cursor(&self) -> f64 {
        lock(&self.timeline).cursor
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.timeline).shut_down
    }

    /// Decodes `bytes` and schedules them right after everything already
    /// queued.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Decode` for malformed PCM (the cursor is left
    /// untouched), `AudioError::Stopped` after `shutdown`, or the device's
    /// error if scheduling fails.
    pub fn enqueue(&self, bytes: &[u8], sample_rate: u32) -> Result<Scheduled, AudioError> {
        let samples = codec::decode_frame(bytes, sample_rate).inspect_err(|e| {
            warn!(error = %e, "skipping undecodable playback buffer");
        })?;
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / f64::from(sample_rate)
        };

        let mut timeline = lock(&self.timeline);
        if timeline.shut_down {
            return Err(AudioError::Stopped);
        }

        let now = self.output.current_time();
        let start = timeline.cursor.max(now);
        if samples.is_empty() {
            return Ok(Scheduled { start, duration });
        }

        let generation = timeline.generation;
        let on_ended = {
            let timeline = Arc::downgrade(&self.timeline);
            let output = Arc::downgrade(&self.output);
            let on_idle = self.on_idle.clone();
            Box::new(move || buffer_ended(&timeline, &output, on_idle.as_ref(), generation))
        };

        self.output
            .schedule(start, samples, sample_rate, on_ended)
            .inspect_err(|e| warn!(error = %e, "output device rejected buffer"))?;
        timeline.cursor = start + duration;

        trace!(start, duration, cursor = timeline.cursor, "scheduled playback buffer");
        Ok(Scheduled { start, duration })
    }

    /// Drops pending buffers and pulls the cursor back to the device clock.
    pub fn reset(&self) {
        let mut timeline = lock(&self.timeline);
        timeline.generation += 1;
        self.output.clear();
        timeline.cursor = self.output.current_time();
        debug!(cursor = timeline.cursor, "playback reset");
    }

    /// Resets, refuses further buffers, and releases the output device.
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut timeline = lock(&self.timeline);
        if timeline.shut_down {
            return;
        }
        timeline.shut_down = true;
        timeline.generation += 1;
        self.output.clear();
        self.output.close();
        debug!("playback shut down");
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn buffer_ended(
    timeline: &Weak<Mutex<Timeline>>,
    output: &Weak<dyn OutputDevice>,
    on_idle: &(dyn Fn() + Send + Sync),
    generation: u64,
) {
    let (Some(timeline), Some(output)) = (timeline.upgrade(), output.upgrade()) else {
        return;
    };
    let cursor = {
        let t = lock(&timeline);
        if t.shut_down || t.generation != generation {
            return;
        }
        t.cursor
    };
    if output.current_time() >= cursor - IDLE_TOLERANCE_SECS {
        on_idle();
    }
}
