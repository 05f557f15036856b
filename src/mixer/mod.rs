//! Mixer controls and the calls they turn into.
//!
//! - [`broadcast`] fans SysEx messages and controller calls out over channels.
//! - [`operation`] and [`resolver`] map a mixer row to synthesizer calls.
//! - [`program`] loads SoundFonts on demand before program changes.
//! - [`rows`] is the editable mixer table.
//! - [`effects`] is the effects panel (reverb/chorus, scale tuning, destinations).

pub mod broadcast;
pub mod effects;
pub mod operation;
pub mod program;
pub mod resolver;
pub mod rows;

pub use effects::{EffectChange, EffectField, EffectsForm};
pub use operation::Operation;
pub use program::BankLoader;
pub use resolver::{MixerResolver, Resolution};
pub use rows::{MixerRow, MixerTable};
