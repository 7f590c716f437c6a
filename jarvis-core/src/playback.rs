//! Gapless playback scheduling on a virtual output timeline.
//!
//! Each inbound speech chunk becomes one playback unit. Units are laid end
//! to end on the sink's clock:
//!
//! ```text
//! start_at   = max(next_start, sink.now())
//! next_start = start_at + duration
//! ```
//!
//! so consecutive units neither overlap nor leave a gap, and a stalled
//! delivery resumes at "now" instead of in the past.
//!
//! Live units are kept in an arena keyed by a monotonically increasing id.
//! Cancellation bumps a generation counter; completion notices carrying an
//! older generation (or an id no longer live) are ignored.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::{codec::EncodedChunk, error::Result};

/// Identity of one scheduled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub generation: u64,
    pub id: u64,
}

/// Output device capability.
///
/// The sink reports each unit's *natural* completion by sending
/// `EngineEvent::UnitEnded(key)` through the engine's `EventSender`.
pub trait PlaybackSink: Send {
    /// Present time on the output clock in seconds.
    fn now(&self) -> f64;

    /// Play mono `samples` at `sample_rate`, starting at `start_at` seconds.
    ///
    /// A `start_at` already in the past starts immediately.
    fn schedule(&mut self, key: UnitKey, samples: Vec<f32>, sample_rate: u32, start_at: f64)
        -> Result<()>;

    /// Best-effort stop. A unit that already finished is simply absent.
    fn stop(&mut self, key: UnitKey);
}

#[derive(Debug, Clone, Copy)]
struct LiveUnit {
    start_at: f64,
    duration: f64,
}

/// What a completion notice meant for the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEnd {
    /// Unknown or cancelled unit; nothing changed.
    Stale,
    /// Removed, other units are still scheduled or playing.
    Remaining(usize),
    /// Removed, the live set is now empty.
    Drained,
}

/// A unit accepted by [`PlaybackScheduler::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub key: UnitKey,
    pub start_at: f64,
    pub duration: f64,
}

pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    /// Rate assumed when a chunk's tag carries none.
    default_rate: u32,
    next_start: f64,
    generation: u64,
    next_id: u64,
    live: BTreeMap<u64, LiveUnit>,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>, default_rate: u32) -> Self {
        Self {
            sink,
            default_rate,
            next_start: 0.0,
            generation: 0,
            next_id: 0,
            live: BTreeMap::new(),
        }
    }

    /// Decode `chunk` and schedule it right after the previous unit.
    ///
    /// Returns `Ok(None)` for a chunk that decodes to no samples.
    ///
    /// # Errors
    /// `JarvisError::MalformedAudio` if the chunk does not decode; the
    /// timeline and live set are untouched. Sink failures are propagated
    /// the same way.
    pub fn enqueue(&mut self, chunk: &EncodedChunk) -> Result<Option<Scheduled>> {
        let channels = chunk.decode()?;
        let samples = downmix(channels);
        if samples.is_empty() {
            return Ok(None);
        }

        let rate = if chunk.tag.sample_rate == 0 {
            self.default_rate
        } else {
            chunk.tag.sample_rate
        };
        let duration = samples.len() as f64 / rate as f64;
        let start_at = self.next_start.max(self.sink.now());

        let key = UnitKey {
            generation: self.generation,
            id: self.next_id,
        };
        self.sink.schedule(key, samples, rate, start_at)?;

        self.next_id += 1;
        self.next_start = start_at + duration;
        self.live.insert(key.id, LiveUnit { start_at, duration });
        debug!(
            unit = key.id,
            start_at,
            duration,
            live = self.live.len(),
            "playback unit scheduled"
        );

        Ok(Some(Scheduled {
            key,
            start_at,
            duration,
        }))
    }

    /// Apply a completion notice. The live-set size is read here, at
    /// completion time.
    pub fn on_unit_ended(&mut self, key: UnitKey) -> UnitEnd {
        if key.generation != self.generation {
            debug!(unit = key.id, generation = key.generation, "stale completion ignored");
            return UnitEnd::Stale;
        }
        let Some(unit) = self.live.remove(&key.id) else {
            warn!(unit = key.id, "completion for unknown unit ignored");
            return UnitEnd::Stale;
        };
        debug!(
            unit = key.id,
            ended_at = unit.start_at + unit.duration,
            live = self.live.len(),
            "playback unit finished"
        );
        if self.live.is_empty() {
            UnitEnd::Drained
        } else {
            UnitEnd::Remaining(self.live.len())
        }
    }

    /// Stop every live unit, clear the set and rewind the timeline to 0.
    ///
    /// Returns how many units were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let generation = self.generation;
        let cancelled = self.live.len();
        for id in self.live.keys() {
            self.sink.stop(UnitKey { generation, id: *id });
        }
        self.live.clear();
        self.next_start = 0.0;
        self.generation += 1;
        if cancelled > 0 {
            debug!(cancelled, "playback flushed");
        }
        cancelled
    }

    /// `true` while any unit is scheduled or playing.
    pub fn is_active(&self) -> bool {
        !self.live.is_empty()
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }
}

fn downmix(mut channels: Vec<Vec<f32>>) -> Vec<f32> {
    match channels.len() {
        0 => Vec::new(),
        1 => channels.pop().unwrap_or_default(),
        n => {
            let frames = channels[0].len();
            (0..frames)
                .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect()
        }
    }
}
