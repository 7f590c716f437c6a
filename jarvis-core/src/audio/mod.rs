//! Audio devices: microphone acquisition and the playback output.
//!
//! # Callback constraints
//!
//! cpal callbacks run on OS audio threads at elevated priority and must not
//! block, perform I/O or (after the first callback) allocate. Capture writes
//! straight into an SPSC ring producer; playback pulls commands from a
//! bounded crossbeam channel with `try_recv`.
//!
//! # Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS. Each device is therefore
//! opened on a dedicated owner thread that holds the stream until the
//! shared `running` flag drops; the `Send` handles returned here only talk
//! to that thread through atomics, the ring buffer and channels.

#[cfg(feature = "audio-cpal")]
pub mod output;
pub mod resample;

#[cfg(feature = "audio-cpal")]
pub use output::CpalPlayback;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{buffering::MicConsumer, error::Result};

/// Microphone capability.
pub trait AudioInput: Send + Sync + 'static {
    /// Acquire the microphone (permission + device open).
    ///
    /// Blocking; the engine calls it from `spawn_blocking`.
    ///
    /// # Errors
    /// Any device or permission failure. The engine reports it as an
    /// acquisition failure.
    fn open(&self) -> Result<MicStream>;
}

/// An open microphone: mono f32 samples arrive in `consumer`.
///
/// Dropping the stream releases the device.
pub struct MicStream {
    pub consumer: MicConsumer,
    /// Native capture rate reported by the device (Hz).
    pub sample_rate: u32,
    running: Arc<AtomicBool>,
}

impl MicStream {
    pub fn new(consumer: MicConsumer, sample_rate: u32, running: Arc<AtomicBool>) -> Self {
        Self {
            consumer,
            sample_rate,
            running,
        }
    }

    /// Signal the device callback to no-op and the owner thread to exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for MicStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MicStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicStream")
            .field("sample_rate", &self.sample_rate)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "audio-cpal")]
pub use self::cpal_input::CpalMicrophone;

#[cfg(feature = "audio-cpal")]
mod cpal_input {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    };
    use std::time::Duration;

    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
    };
    use tracing::{error, info, warn};

    use super::{AudioInput, MicStream};
    use crate::{
        buffering::{create_mic_ring, MicProducer, Producer},
        error::{JarvisError, Result},
    };

    /// Default (or preferred) system microphone via cpal.
    #[derive(Debug, Clone, Default)]
    pub struct CpalMicrophone {
        preferred_device: Option<String>,
    }

    impl CpalMicrophone {
        pub fn new(preferred_device: Option<String>) -> Self {
            Self { preferred_device }
        }
    }

    impl AudioInput for CpalMicrophone {
        fn open(&self) -> Result<MicStream> {
            let (producer, consumer) = create_mic_ring();
            let running = Arc::new(AtomicBool::new(true));
            let (open_tx, open_rx) = mpsc::channel::<Result<u32>>();

            let preferred = self.preferred_device.clone();
            let thread_running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("jarvis-mic".into())
                .spawn(move || {
                    let stream = match open_stream(producer, &thread_running, preferred.as_deref())
                    {
                        Ok((stream, rate)) => {
                            let _ = open_tx.send(Ok(rate));
                            stream
                        }
                        Err(e) => {
                            let _ = open_tx.send(Err(e));
                            return;
                        }
                    };
                    while thread_running.load(Ordering::Acquire) {
                        std::thread::park_timeout(Duration::from_millis(50));
                    }
                    // Stream drops here, releasing the device on its owner thread.
                    drop(stream);
                    info!("microphone released");
                })?;

            match open_rx.recv() {
                Ok(Ok(rate)) => Ok(MicStream::new(consumer, rate, running)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(JarvisError::AudioStream(
                    "microphone thread exited before reporting".into(),
                )),
            }
        }
    }

    fn open_stream(
        producer: MicProducer,
        running: &Arc<AtomicBool>,
        preferred: Option<&str>,
    ) -> Result<(Stream, u32)> {
        let host = cpal::default_host();

        let mut selected = None;
        if let Some(name) = preferred {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices.find(|d| d.name().map(|n| n == name).unwrap_or(false));
                    if selected.is_none() {
                        warn!(device = name, "preferred input device not found, using default");
                    }
                }
                Err(e) => warn!("failed to list input devices: {e}"),
            }
        }
        let device = match selected.or_else(|| host.default_input_device()) {
            Some(d) => d,
            None => return Err(JarvisError::NoDefaultInputDevice),
        };

        let supported = device
            .default_input_config()
            .map_err(|e| JarvisError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate, channels, "opening input device"
        );

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build::<f32>(&device, &config, producer, running),
            SampleFormat::I16 => build::<i16>(&device, &config, producer, running),
            SampleFormat::U16 => build::<u16>(&device, &config, producer, running),
            SampleFormat::U8 => build::<u8>(&device, &config, producer, running),
            fmt => {
                return Err(JarvisError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| JarvisError::AudioStream(e.to_string()))?;
        Ok((stream, sample_rate))
    }

    /// Downmix interleaved frames to mono f32 and push to the ring.
    fn build<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut producer: MicProducer,
        running: &Arc<AtomicBool>,
    ) -> Result<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let ch = config.channels.max(1) as usize;
        let running = Arc::clone(running);
        let mut mono: Vec<f32> = Vec::new();

        device
            .build_input_stream(
                config,
                move |data: &[T], _info| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    let frames = data.len() / ch;
                    mono.resize(frames, 0.0);
                    for (f, out) in mono.iter_mut().enumerate() {
                        let base = f * ch;
                        let sum: f32 = data[base..base + ch]
                            .iter()
                            .map(|s| s.to_sample::<f32>())
                            .sum();
                        *out = sum / ch as f32;
                    }
                    let written = producer.push_slice(&mono);
                    if written < mono.len() {
                        warn!("mic ring full: dropped {} frames", mono.len() - written);
                    }
                },
                |err| error!("input stream error: {err}"),
                None,
            )
            .map_err(|e| JarvisError::AudioStream(e.to_string()))
    }
}
