//! Serde types shared with the presentation layer.
//!
//! Everything here is plain data: the engine writes it, subscribers read it.

pub mod events;
