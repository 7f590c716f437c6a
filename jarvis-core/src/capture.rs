//! Blocking capture loop: microphone ring → fixed frames → live link.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → Vec<f32>
//! 2. Resample device rate → 16 kHz (passthrough when equal)
//! 3. Re-block into 4096-sample frames
//! 4. Encode each frame (PCM16 LE, base64, audio/pcm;rate=16000)
//! 5. LiveLink::send, fire-and-forget
//! ```
//!
//! The loop runs in `spawn_blocking`; the engine holds a [`CaptureHandle`]
//! and flips its `running` flag to stop. A frame assembled after `stop()`
//! is never sent because the flag is checked between frames. Samples the
//! device buffered before the session opened are discarded at start.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{
    audio::{resample::StreamResampler, MicStream},
    buffering::{frame::FrameAssembler, Consumer, Observer},
    codec::{ChunkTag, EncodedChunk},
    transport::{LiveLink, Outbound},
};

/// Samples drained from the ring per iteration.
const DRAIN_CHUNK: usize = 1024;
const SLEEP_EMPTY_MS: u64 = 5;

#[derive(Debug, Default)]
pub struct CaptureDiagnostics {
    pub samples_in: AtomicUsize,
    pub frames_sent: AtomicUsize,
    pub frames_dropped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSnapshot {
    pub samples_in: usize,
    pub frames_sent: usize,
    pub frames_dropped: usize,
}

impl CaptureDiagnostics {
    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            samples_in: self.samples_in.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct CaptureContext {
    pub mic: MicStream,
    pub target_rate: u32,
    pub frame_len: usize,
    pub link: Arc<dyn LiveLink>,
    pub running: Arc<AtomicBool>,
    pub diagnostics: Arc<CaptureDiagnostics>,
}

/// Run until `ctx.running` becomes false. Releases the microphone on exit.
pub fn run(mut ctx: CaptureContext) {
    let capture_rate = ctx.mic.sample_rate;
    info!(capture_rate, target_rate = ctx.target_rate, "capture started");

    let mut resampler = match StreamResampler::new(capture_rate, ctx.target_rate, DRAIN_CHUNK) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create capture resampler: {e}");
            ctx.mic.stop();
            return;
        }
    };
    let mut assembler = FrameAssembler::new(ctx.frame_len, ctx.target_rate);
    let tag = ChunkTag::pcm16(ctx.target_rate, 1);
    let mut raw = vec![0f32; DRAIN_CHUNK];

    'capture: while ctx.running.load(Ordering::Acquire) {
        let n = ctx.mic.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }
        ctx.diagnostics.samples_in.fetch_add(n, Ordering::Relaxed);

        let resampled = resampler.process(&raw[..n]);
        if resampled.is_empty() {
            continue;
        }

        for frame in assembler.push(&resampled) {
            if !ctx.running.load(Ordering::Acquire) {
                break 'capture;
            }
            let chunk = EncodedChunk::from_samples(&frame.samples, tag);
            match ctx.link.send(Outbound::Audio(chunk)) {
                Ok(()) => {
                    ctx.diagnostics.frames_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    ctx.diagnostics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("capture frame dropped: {e}");
                }
            }
        }
    }

    ctx.mic.stop();
    let stats = ctx.diagnostics.snapshot();
    info!(
        samples_in = stats.samples_in,
        frames_sent = stats.frames_sent,
        frames_dropped = stats.frames_dropped,
        pending = assembler.pending_len(),
        "capture stopped"
    );
}

/// Owner of a running capture loop.
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    diagnostics: Arc<CaptureDiagnostics>,
    task: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Start streaming `mic` into `link`. Must be called inside a Tokio
    /// runtime. Whatever the ring already holds is dropped first.
    pub fn start(
        mut mic: MicStream,
        link: Arc<dyn LiveLink>,
        target_rate: u32,
        frame_len: usize,
    ) -> Self {
        let stale = mic.consumer.occupied_len();
        if stale > 0 {
            mic.consumer.skip(stale);
            debug!(stale, "discarded samples captured before open");
        }

        let running = Arc::new(AtomicBool::new(true));
        let diagnostics = Arc::new(CaptureDiagnostics::default());
        let ctx = CaptureContext {
            mic,
            target_rate,
            frame_len,
            link,
            running: Arc::clone(&running),
            diagnostics: Arc::clone(&diagnostics),
        };
        let task = tokio::task::spawn_blocking(move || run(ctx));
        Self {
            running,
            diagnostics,
            task: Some(task),
        }
    }

    /// Stop forwarding frames. Takes effect before the next frame is sent;
    /// the loop exits and releases the microphone on its own.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.task.take();
    }

    pub fn diagnostics(&self) -> CaptureSnapshot {
        self.diagnostics.snapshot()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
