//! Fixed-length capture frames.

/// A fixed-length block of mono samples in [-1.0, 1.0] at a known rate.
///
/// Produced by [`FrameAssembler`], consumed immediately by the codec.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Re-blocks an arbitrary sample stream into frames of exactly `frame_len`.
///
/// Leftover samples are carried to the next `push`; nothing is emitted
/// until a full frame is available.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_len: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            sample_rate,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Append samples and return every frame completed by them, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.frame_len;
        if complete == 0 {
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(complete);
        for block in self.pending.chunks_exact(self.frame_len) {
            frames.push(AudioFrame {
                samples: block.to_vec(),
                sample_rate: self.sample_rate,
            });
        }
        self.pending.drain(..complete * self.frame_len);
        frames
    }

    /// Samples held back waiting for a full frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
