//! `AudioBackend` on top of the host's audio system via cpal.
//!
//! cpal streams are not `Send` on every platform, so each stream is built,
//! played, and dropped on a dedicated thread. The handle returned to the
//! caller only holds the channel that tells that thread to let go.
//!
//! Output is a small mixer: scheduled buffers are resampled to the device
//! rate once, placed on a frame timeline, and summed in the render
//! callback. The device clock is the number of frames rendered so far.

use std::fmt::Display;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use tracing::{debug, error, info};

use crate::device::{
    AudioBackend, EndedCallback, InputCallback, InputFormat, InputStream, OutputDevice,
};
use crate::error::AudioError;
use crate::resample::resample_linear;

fn unavailable(e: impl Display) -> AudioError {
    AudioError::DeviceUnavailable(e.to_string())
}

fn stream_error(e: impl Display) -> AudioError {
    AudioError::Stream(e.to_string())
}

/// Audio backend for the default (or a named) host device.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the named devices instead of the host defaults.
    pub fn with_devices(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
        }
    }

    /// Names of the input devices the host reports.
    pub fn input_device_names() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        Ok(host
            .input_devices()
            .map_err(unavailable)?
            .filter_map(|d| d.name().ok())
            .collect())
    }
}

fn find_device(name: Option<&str>, input: bool) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    let kind = if input { "input" } else { "output" };
    match name {
        None => {
            let device = if input {
                host.default_input_device()
            } else {
                host.default_output_device()
            };
            device.ok_or_else(|| AudioError::DeviceUnavailable(format!("no default {kind} device")))
        }
        Some(name) => {
            let mut devices = if input {
                host.input_devices().map_err(unavailable)?
            } else {
                host.output_devices().map_err(unavailable)?
            };
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceUnavailable(format!("{kind} device '{name}' not found")))
        }
    }
}

/// Picks the default input config, switched to `preferred_rate` when the
/// device supports it natively.
fn input_config(
    device: &cpal::Device,
    preferred_rate: u32,
) -> Result<cpal::SupportedStreamConfig, AudioError> {
    let default = device.default_input_config().map_err(unavailable)?;
    let exact = device.supported_input_configs().ok().and_then(|mut ranges| {
        ranges
            .find(|r| {
                r.channels() == default.channels()
                    && r.sample_format() == default.sample_format()
                    && r.min_sample_rate().0 <= preferred_rate
                    && preferred_rate <= r.max_sample_rate().0
            })
            .map(|r| r.with_sample_rate(cpal::SampleRate(preferred_rate)))
    });
    Ok(exact.unwrap_or(default))
}

/// Keeps a stream thread alive until released.
struct StreamGuard {
    stop: Option<Sender<()>>,
}

impl StreamGuard {
    fn release(&mut self) {
        // Dropping the sender wakes the stream thread, which drops the stream.
        self.stop.take();
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn spawn_stream<B>(name: &str, build: B) -> Result<StreamGuard, AudioError>
where
    B: FnOnce() -> Result<cpal::Stream, AudioError> + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), AudioError>>(1);
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let stream = match build().and_then(|s| s.play().map(|()| s).map_err(unavailable)) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
            debug!("audio stream released");
        })
        .map_err(stream_error)?;

    ready_rx
        .recv()
        .map_err(|_| AudioError::Stream("audio thread exited before the stream started".into()))??;
    Ok(StreamGuard {
        stop: Some(stop_tx),
    })
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut on_block: InputCallback,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut block = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            block.clear();
            block.extend(data.iter().map(|&s| f32::from_sample(s)));
            on_block(&block);
        },
        |err| error!(error = %err, "audio input stream error"),
        None,
    )
}

impl AudioBackend for CpalBackend {
    fn input_format(&self, preferred_rate: u32) -> Result<InputFormat, AudioError> {
        let device = find_device(self.input_device.as_deref(), true)?;
        let config = input_config(&device, preferred_rate)?;
        Ok(InputFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        })
    }

    fn open_input(
        &self,
        format: InputFormat,
        on_block: InputCallback,
    ) -> Result<Box<dyn InputStream>, AudioError> {
        let name = self.input_device.clone();
        let guard = spawn_stream("murmur-capture", move || {
            let device = find_device(name.as_deref(), true)?;
            let supported = input_config(&device, format.sample_rate)?;
            if supported.channels() != format.channels
                || supported.sample_rate().0 != format.sample_rate
            {
                return Err(AudioError::Stream("input device format changed".into()));
            }
            let config: cpal::StreamConfig = supported.config();
            info!(
                device = %device.name().unwrap_or_default(),
                sample_rate = format.sample_rate,
                channels = format.channels,
                format = ?supported.sample_format(),
                "opened input device"
            );
            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, on_block),
                cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, on_block),
                cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, on_block),
                cpal::SampleFormat::I32 => build_input::<i32>(&device, &config, on_block),
                other => {
                    return Err(AudioError::DeviceUnavailable(format!(
                        "unsupported input sample format: {other:?}"
                    )))
                }
            };
            stream.map_err(unavailable)
        })?;
        Ok(Box::new(CpalInput { guard }))
    }

    fn open_output(&self, _sample_rate: u32) -> Result<Arc<dyn OutputDevice>, AudioError> {
        // Negotiate on this thread so the rate is known before the stream runs.
        let (device_rate, channels) = {
            let device = find_device(self.output_device.as_deref(), false)?;
            let config = device.default_output_config().map_err(unavailable)?;
            (config.sample_rate().0, config.channels())
        };

        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let (ended_tx, ended_rx) = mpsc::channel::<EndedCallback>();
        thread::Builder::new()
            .name("murmur-playback-events".into())
            .spawn(move || {
                while let Ok(on_ended) = ended_rx.recv() {
                    on_ended();
                }
            })
            .map_err(stream_error)?;

        let name = self.output_device.clone();
        let render_mixer = mixer.clone();
        let guard = spawn_stream("murmur-playback", move || {
            let device = find_device(name.as_deref(), false)?;
            let supported = device.default_output_config().map_err(unavailable)?;
            let config: cpal::StreamConfig = supported.config();
            info!(
                device = %device.name().unwrap_or_default(),
                sample_rate = config.sample_rate.0,
                channels = config.channels,
                "opened output device"
            );
            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => {
                    build_output::<f32>(&device, &config, render_mixer, ended_tx)
                }
                cpal::SampleFormat::I16 => {
                    build_output::<i16>(&device, &config, render_mixer, ended_tx)
                }
                cpal::SampleFormat::U16 => {
                    build_output::<u16>(&device, &config, render_mixer, ended_tx)
                }
                cpal::SampleFormat::I32 => {
                    build_output::<i32>(&device, &config, render_mixer, ended_tx)
                }
                other => {
                    return Err(AudioError::DeviceUnavailable(format!(
                        "unsupported output sample format: {other:?}"
                    )))
                }
            };
            stream.map_err(unavailable)
        })?;

        debug!(device_rate, channels, "playback timeline ready");
        Ok(Arc::new(CpalOutput {
            device_rate,
            mixer,
            guard: Mutex::new(Some(guard)),
        }))
    }
}

struct CpalInput {
    guard: StreamGuard,
}

impl InputStream for CpalInput {
    fn close(&mut self) {
        self.guard.release();
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    ended_tx: Sender<EndedCallback>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono = Vec::new();
    let mut finished = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            mono.resize(data.len() / channels, 0.0);
            lock(&mixer).render(&mut mono, &mut finished);
            for (frame, &s) in data.chunks_mut(channels).zip(mono.iter()) {
                for out in frame {
                    *out = T::from_sample(s);
                }
            }
            for on_ended in finished.drain(..) {
                let _ = ended_tx.send(on_ended);
            }
        },
        |err| error!(error = %err, "audio output stream error"),
        None,
    )
}

fn lock(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Voice {
    start: u64,
    samples: Vec<f32>,
    on_ended: Option<EndedCallback>,
}

impl Voice {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Frame timeline shared between the render callback and the scheduler.
#[derive(Default)]
struct Mixer {
    rendered: u64,
    voices: Vec<Voice>,
    closed: bool,
}

impl Mixer {
    /// Renders the next `mono.len()` frames and collects the ended
    /// callbacks of voices that finished inside them.
    fn render(&mut self, mono: &mut [f32], finished: &mut Vec<EndedCallback>) {
        mono.fill(0.0);
        let begin = self.rendered;
        let end = begin + mono.len() as u64;

        if !self.closed {
            for voice in &self.voices {
                let from = voice.start.max(begin);
                let to = voice.end().min(end);
                for t in from..to {
                    mono[(t - begin) as usize] += voice.samples[(t - voice.start) as usize];
                }
            }
        }
        self.rendered = end;

        self.voices.retain_mut(|voice| {
            if voice.end() > end {
                return true;
            }
            if let Some(on_ended) = voice.on_ended.take() {
                finished.push(on_ended);
            }
            false
        });
    }
}

struct CpalOutput {
    device_rate: u32,
    mixer: Arc<Mutex<Mixer>>,
    guard: Mutex<Option<StreamGuard>>,
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        lock(&self.mixer).rendered as f64 / f64::from(self.device_rate)
    }

    fn schedule(
        &self,
        start_at: f64,
        samples: Vec<f32>,
        sample_rate: u32,
        on_ended: EndedCallback,
    ) -> Result<(), AudioError> {
        let samples = resample_linear(&samples, sample_rate, self.device_rate);
        let start = (start_at.max(0.0) * f64::from(self.device_rate)).round() as u64;
        let mut mixer = lock(&self.mixer);
        if mixer.closed {
            return Err(AudioError::Stopped);
        }
        mixer.voices.push(Voice {
            start,
            samples,
            on_ended: Some(on_ended),
        });
        Ok(())
    }

    fn clear(&self) {
        lock(&self.mixer).voices.clear();
    }

    fn close(&self) {
        {
            let mut mixer = lock(&self.mixer);
            mixer.closed = true;
            mixer.voices.clear();
        }
        if let Some(mut guard) = self
            .guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            guard.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn voice(start: u64, samples: Vec<f32>, ended: &Arc<AtomicUsize>) -> Voice {
        let ended = ended.clone();
        Voice {
            start,
            samples,
            on_ended: Some(Box::new(move || {
                ended.fetch_add(1, Ordering::SeqCst);
            })),
        }
    }

    #[test]
    fn mixer_places_voices_on_the_timeline() {
        let ended = Arc::new(AtomicUsize::new(0));
        let mut mixer = Mixer::default();
        mixer.voices.push(voice(2, vec![0.5; 3], &ended));

        let mut mono = vec![0.0; 4];
        let mut finished = Vec::new();
        mixer.render(&mut mono, &mut finished);
        assert_eq!(mono, vec![0.0, 0.0, 0.5, 0.5]);
        assert!(finished.is_empty());

        mixer.render(&mut mono, &mut finished);
        assert_eq!(mono, vec![0.5, 0.0, 0.0, 0.0]);
        assert_eq!(finished.len(), 1);
        assert_eq!(mixer.rendered, 8);
        assert!(mixer.voices.is_empty());

        for on_ended in finished.drain(..) {
            on_ended();
        }
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overlapping_voices_are_summed() {
        let ended = Arc::new(AtomicUsize::new(0));
        let mut mixer = Mixer::default();
        mixer.voices.push(voice(0, vec![0.25; 2], &ended));
        mixer.voices.push(voice(1, vec![0.25; 2], &ended));

        let mut mono = vec![0.0; 3];
        let mut finished = Vec::new();
        mixer.render(&mut mono, &mut finished);
        assert_eq!(mono, vec![0.25, 0.5, 0.25]);
        assert_eq!(finished.len(), 2);
    }

    #[test]
    fn closed_mixer_renders_silence_but_keeps_time() {
        let ended = Arc::new(AtomicUsize::new(0));
        let mut mixer = Mixer::default();
        mixer.voices.push(voice(0, vec![0.9; 2], &ended));
        mixer.closed = true;

        let mut mono = vec![1.0; 2];
        let mut finished = Vec::new();
        mixer.render(&mut mono, &mut finished);
        assert_eq!(mono, vec![0.0, 0.0]);
        assert_eq!(mixer.rendered, 2);
    }
}
