//! tunemix - A terminal mixer for SoundFont playback of MIDI files.
//!
//! This library provides the SysEx encoders, the mixer (operation resolver,
//! per-channel broadcasts, bank loader, row table and effects form), the
//! rustysynth-backed audio engine and the MIDI file player.

pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod files;
pub mod midi;
pub mod mixer;
pub mod synth;
pub mod ui;

// Re-export commonly used types
pub use audio::{AudioEngine, AudioOutput};
pub use error::{Error, Result};
pub use midi::player::MidiPlayer;
pub use midi::ChannelTarget;
pub use mixer::{BankLoader, EffectsForm, MixerResolver, MixerTable, Operation};
pub use synth::Synthesizer;
