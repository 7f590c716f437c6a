//! Sample-rate conversion with rubato's polynomial `FastFixedIn`.
//!
//! Two shapes are needed:
//!
//! - [`StreamResampler`]: continuous capture stream, device rate → 16 kHz.
//!   Input is accumulated until a full rubato block is available; the
//!   remainder is carried to the next call.
//! - [`resample_block`]: one self-contained playback unit, 24 kHz → device
//!   rate. The converter is flushed with silence and its output delay is
//!   trimmed, so a unit of `n` input samples always yields exactly
//!   `round(n × to / from)` samples aligned to its first input sample.
//!   Back-to-back units therefore tile the device timeline without gaps.
//!
//! Both are passthrough when the rates already match.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{info, warn};

use crate::error::{JarvisError, Result};

fn build(from_rate: u32, to_rate: u32, block: usize) -> Result<FastFixedIn<f32>> {
    FastFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        block,
        1,
    )
    .map_err(|e| JarvisError::AudioDevice(format!("resampler init: {e}")))
}

/// Streaming mono converter for the capture path.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    block: usize,
    carry: Vec<f32>,
    scratch: Vec<Vec<f32>>,
}

impl StreamResampler {
    /// # Errors
    /// `JarvisError::AudioDevice` if rubato rejects the ratio or block size.
    pub fn new(from_rate: u32, to_rate: u32, block: usize) -> Result<Self> {
        if from_rate == to_rate {
            return Ok(Self {
                inner: None,
                block,
                carry: Vec::new(),
                scratch: Vec::new(),
            });
        }

        let inner = build(from_rate, to_rate, block)?;
        let scratch = vec![vec![0f32; inner.output_frames_max()]; 1];
        info!(from_rate, to_rate, block, "capture resampling enabled");

        Ok(Self {
            inner: Some(inner),
            block,
            carry: Vec::with_capacity(block * 2),
            scratch,
        })
    }

    /// Convert `samples`, returning whatever output is ready (possibly empty).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(inner) = self.inner.as_mut() else {
            return samples.to_vec();
        };

        self.carry.extend_from_slice(samples);
        let mut out = Vec::new();
        let mut consumed_total = 0;

        while self.carry.len() - consumed_total >= self.block {
            let input = &self.carry[consumed_total..consumed_total + self.block];
            match inner.process_into_buffer(&[input], &mut self.scratch, None) {
                Ok((_, produced)) => out.extend_from_slice(&self.scratch[0][..produced]),
                Err(e) => warn!("capture resampler dropped a block: {e}"),
            }
            consumed_total += self.block;
        }

        self.carry.drain(..consumed_total);
        out
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }
}

/// Input block for [`resample_block`].
const UNIT_BLOCK: usize = 1024;

/// Convert one complete mono buffer from `from_rate` to `to_rate`.
///
/// # Errors
/// `JarvisError::AudioDevice` if rubato fails to initialise or process.
pub fn resample_block(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let expected =
        (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let mut inner = build(from_rate, to_rate, UNIT_BLOCK)?;
    // The frame interpolated at the first input sample is one ahead of the
    // reported delay.
    let delay = inner.output_delay().saturating_sub(1);
    let wanted = delay + expected;
    let mut out = Vec::with_capacity(wanted + inner.output_frames_max());
    let fail = |e: rubato::ResampleError| JarvisError::AudioDevice(format!("resample: {e}"));

    for block in samples.chunks(UNIT_BLOCK) {
        let input = std::slice::from_ref(&block);
        let produced = if block.len() == UNIT_BLOCK {
            inner.process(input, None)
        } else {
            inner.process_partial(Some(input), None)
        }
        .map_err(fail)?;
        out.extend_from_slice(&produced[0]);
    }

    // Push the delayed tail out with silence.
    while out.len() < wanted {
        let produced = inner.process_partial(None::<&[&[f32]]>, None).map_err(fail)?;
        if produced[0].is_empty() {
            break;
        }
        out.extend_from_slice(&produced[0]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(expected, 0.0);
    Ok(out)
}
