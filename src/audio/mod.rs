//! Audio engine for MIDI synthesis and playback.
//!
//! This module provides real-time MIDI synthesis using rustysynth
//! and audio output via rodio. It supports:
//! - Loading several SoundFonts at once, from files or bytes
//! - Routing each channel to the SoundFont holding its current preset
//! - Channel tuning and bend range through registered parameters

pub mod bank;
pub mod engine;

pub use bank::SAMPLE_RATE;
pub use engine::{AudioEngine, AudioOutput};
