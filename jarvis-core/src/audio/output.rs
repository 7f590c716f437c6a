//! cpal output device implementing [`PlaybackSink`].
//!
//! The output clock is the number of frames the device callback has
//! rendered, so `now()` advances exactly as fast as audio leaves the
//! speaker. Units arrive at the stream's native rate (resampled on the
//! engine side) and are mixed mono-to-all-channels.
//!
//! ```text
//! schedule() ──Start──▶ callback mixes voices ──Finished──▶ owner thread
//!   stop()   ──Stop───▶                                     └─▶ EventSender::unit_ended
//! ```
//!
//! Finished voices travel back to the owner thread so their buffers are
//! freed off the audio thread. At most [`MAX_VOICES`] play at once; a unit
//! arriving beyond that is handed back unplayed and still reported as ended
//! so the engine's live set drains.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc, Arc,
};
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error, info, warn};

use super::resample::resample_block;
use crate::{
    engine::events::EventSender,
    error::{JarvisError, Result},
    playback::{PlaybackSink, UnitKey},
};

const COMMAND_CAPACITY: usize = 256;
const MAX_VOICES: usize = 128;
/// Every voice the mixer holds plus every queued start fits.
const DONE_CAPACITY: usize = MAX_VOICES + COMMAND_CAPACITY;

struct Voice {
    key: UnitKey,
    samples: Vec<f32>,
    start_frame: u64,
    pos: usize,
}

enum Command {
    Start(Voice),
    Stop(UnitKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Played,
    Stopped,
    /// Mixer was at [`MAX_VOICES`]; nothing was rendered.
    Rejected,
}

struct Finished {
    voice: Voice,
    outcome: Outcome,
}

pub struct CpalPlayback {
    commands: Sender<Command>,
    frames_rendered: Arc<AtomicU64>,
    device_rate: u32,
    running: Arc<AtomicBool>,
}

impl CpalPlayback {
    /// Open the preferred (or default) output device.
    ///
    /// Blocks until the owner thread has the stream playing.
    ///
    /// # Errors
    /// `JarvisError::NoDefaultOutputDevice` or a device/stream error.
    pub fn open(preferred_device: Option<String>, events: EventSender) -> Result<Self> {
        let (cmd_tx, cmd_rx) = bounded::<Command>(COMMAND_CAPACITY);
        let (done_tx, done_rx) = bounded::<Finished>(DONE_CAPACITY);
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let undelivered = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let (open_tx, open_rx) = mpsc::channel::<Result<u32>>();

        let thread_frames = Arc::clone(&frames_rendered);
        let thread_undelivered = Arc::clone(&undelivered);
        let thread_running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("jarvis-playback".into())
            .spawn(move || {
                let stream = match open_stream(
                    preferred_device.as_deref(),
                    cmd_rx,
                    done_tx,
                    thread_frames,
                    Arc::clone(&thread_undelivered),
                ) {
                    Ok((stream, rate)) => {
                        let _ = open_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                forward_completions(&done_rx, &thread_undelivered, &thread_running, &events);
                drop(stream);
                info!("output device released");
            })?;

        let device_rate = match open_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(JarvisError::AudioStream(
                    "playback thread exited before reporting".into(),
                ))
            }
        };

        Ok(Self {
            commands: cmd_tx,
            frames_rendered,
            device_rate,
            running,
        })
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl PlaybackSink for CpalPlayback {
    fn now(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn schedule(
        &mut self,
        key: UnitKey,
        samples: Vec<f32>,
        sample_rate: u32,
        start_at: f64,
    ) -> Result<()> {
        let samples = if sample_rate == self.device_rate {
            samples
        } else {
            resample_block(&samples, sample_rate, self.device_rate)?
        };
        let start_frame = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        self.commands
            .try_send(Command::Start(Voice {
                key,
                samples,
                start_frame,
                pos: 0,
            }))
            .map_err(|_| JarvisError::AudioStream("playback command queue full".into()))
    }

    fn stop(&mut self, key: UnitKey) {
        if self.commands.try_send(Command::Stop(key)).is_err() {
            warn!(unit = key.id, "playback stop dropped: command queue full");
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

fn forward_completions(
    done_rx: &Receiver<Finished>,
    undelivered: &AtomicU64,
    running: &AtomicBool,
    events: &EventSender,
) {
    let mut reported = 0;
    while running.load(Ordering::Acquire) {
        match done_rx.recv_timeout(Duration::from_millis(20)) {
            Ok(Finished { voice, outcome }) => {
                let key = voice.key;
                drop(voice);
                let ended = match outcome {
                    Outcome::Played => true,
                    Outcome::Rejected => {
                        warn!(unit = key.id, max = MAX_VOICES, "playback unit skipped: mixer full");
                        true
                    }
                    Outcome::Stopped => false,
                };
                if ended && !events.unit_ended(key) {
                    debug!("engine gone; stopping playback completions");
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }

        let lost = undelivered.load(Ordering::Relaxed);
        if lost != reported {
            warn!(total = lost, "playback completions lost: completion queue full");
            reported = lost;
        }
    }
}

fn open_stream(
    preferred: Option<&str>,
    commands: Receiver<Command>,
    done: Sender<Finished>,
    frames_rendered: Arc<AtomicU64>,
    undelivered: Arc<AtomicU64>,
) -> Result<(Stream, u32)> {
    let host = cpal::default_host();

    let mut selected = None;
    if let Some(name) = preferred {
        match host.output_devices() {
            Ok(mut devices) => {
                selected = devices.find(|d| d.name().map(|n| n == name).unwrap_or(false));
                if selected.is_none() {
                    warn!(device = name, "preferred output device not found, using default");
                }
            }
            Err(e) => warn!("failed to list output devices: {e}"),
        }
    }
    let device = match selected.or_else(|| host.default_output_device()) {
        Some(d) => d,
        None => return Err(JarvisError::NoDefaultOutputDevice),
    };

    let supported = device
        .default_output_config()
        .map_err(|e| JarvisError::AudioDevice(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    info!(
        device = device.name().unwrap_or_default().as_str(),
        sample_rate, channels, "opening output device"
    );

    let config = StreamConfig {
        channels,
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let mixer = Mixer {
        channels: channels.max(1) as usize,
        voices: Vec::with_capacity(MAX_VOICES),
        scratch: Vec::new(),
        commands,
        done,
        frames_rendered,
        undelivered,
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build::<f32>(&device, &config, mixer),
        SampleFormat::I16 => build::<i16>(&device, &config, mixer),
        SampleFormat::U16 => build::<u16>(&device, &config, mixer),
        fmt => {
            return Err(JarvisError::AudioStream(format!(
                "unsupported output sample format: {fmt:?}"
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| JarvisError::AudioStream(e.to_string()))?;
    Ok((stream, sample_rate))
}

fn build<T>(device: &cpal::Device, config: &StreamConfig, mut mixer: Mixer) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info| {
                mixer.render(data.len());
                for (out, s) in data.iter_mut().zip(mixer.scratch.iter()) {
                    *out = T::from_sample(*s);
                }
            },
            |err| error!("output stream error: {err}"),
            None,
        )
        .map_err(|e| JarvisError::AudioStream(e.to_string()))
}

/// Callback-side state. Lives entirely on the audio thread.
struct Mixer {
    channels: usize,
    voices: Vec<Voice>,
    scratch: Vec<f32>,
    commands: Receiver<Command>,
    done: Sender<Finished>,
    frames_rendered: Arc<AtomicU64>,
    /// Completions the owner thread never saw because `done` was full.
    undelivered: Arc<AtomicU64>,
}

impl Mixer {
    /// Mix `len` interleaved samples into `scratch` and advance the clock.
    fn render(&mut self, len: usize) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Start(voice) if self.voices.len() >= MAX_VOICES => {
                    self.hand_back(voice, Outcome::Rejected);
                }
                Command::Start(voice) => self.voices.push(voice),
                Command::Stop(key) => {
                    if let Some(i) = self.voices.iter().position(|v| v.key == key) {
                        let voice = self.voices.swap_remove(i);
                        self.hand_back(voice, Outcome::Stopped);
                    }
                }
            }
        }

        self.scratch.clear();
        self.scratch.resize(len, 0.0);
        let ch = self.channels;
        let frames = len / ch;
        let base = self.frames_rendered.load(Ordering::Relaxed);

        for voice in self.voices.iter_mut() {
            let offset = voice.start_frame.saturating_sub(base) as usize;
            if offset >= frames {
                continue;
            }
            for f in offset..frames {
                let Some(&s) = voice.samples.get(voice.pos) else {
                    break;
                };
                voice.pos += 1;
                for c in 0..ch {
                    self.scratch[f * ch + c] += s;
                }
            }
        }
        for s in self.scratch.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }

        // A played-out voice stays (silent) until the owner thread has room
        // for its completion.
        let mut i = 0;
        while i < self.voices.len() && !self.done.is_full() {
            if self.voices[i].pos >= self.voices[i].samples.len() {
                let voice = self.voices.swap_remove(i);
                self.hand_back(voice, Outcome::Played);
            } else {
                i += 1;
            }
        }

        self.frames_rendered
            .fetch_add(frames as u64, Ordering::Release);
    }

    fn hand_back(&mut self, voice: Voice, outcome: Outcome) {
        if let Err(TrySendError::Full(_)) = self.done.try_send(Finished { voice, outcome }) {
            self.undelivered.fetch_add(1, Ordering::Relaxed);
        }
    }
}
