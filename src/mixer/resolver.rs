//! Turns a mixer row into synthesizer calls.

use super::broadcast::{broadcast_control_change, for_each_channel};
use super::operation::{
    coarse_tuning_cents, fine_tuning_cents, pitch_bend_range_cents, GlobalControl, MixerEvent,
    Operation,
};
use super::program::BankLoader;
use crate::error::Result;
use crate::midi::{normalize_value, scale_to_data_byte, ChannelTarget};
use crate::synth::Synthesizer;
use std::sync::Arc;

/// What [`MixerResolver::dispatch`] did with a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// The calls were made; the count is the number of synthesizer calls.
    Applied(usize),
    /// A program change that must go through the bank loader.
    ProgramChange { target: ChannelTarget, program: u8 },
}

pub struct MixerResolver<S> {
    synth: Arc<S>,
    loader: Arc<BankLoader<S>>,
}

impl<S: Synthesizer + 'static> MixerResolver<S> {
    pub fn new(synth: Arc<S>, loader: Arc<BankLoader<S>>) -> Self {
        Self { synth, loader }
    }

    pub fn loader(&self) -> &Arc<BankLoader<S>> {
        &self.loader
    }

    /// Applies every synchronous part of a mixer change.
    ///
    /// Program changes are returned as [`Resolution::ProgramChange`] for the
    /// caller to run on the bank loader; everything else is sent before this
    /// returns.
    pub fn dispatch(
        &self,
        target: ChannelTarget,
        operation: Operation,
        value: f64,
        time: f64,
    ) -> Result<Resolution> {
        let target = target.validate()?;
        let value = normalize_value(value)?;
        let synth = self.synth.as_ref();

        let sent = match operation {
            Operation::ControlChange(controller) => {
                broadcast_control_change(synth, target, controller, scale_to_data_byte(value), time)?
            }
            Operation::Event(MixerEvent::ProgramChange) => {
                return Ok(Resolution::ProgramChange {
                    target,
                    program: scale_to_data_byte(value),
                });
            }
            Operation::Event(MixerEvent::Channel(event)) => {
                let value = scale_to_data_byte(value);
                for_each_channel(target, |ch| synth.set_channel_event(ch, event, value, time))?
            }
            Operation::FineTuning => {
                let cents = fine_tuning_cents(value);
                match target {
                    ChannelTarget::All => {
                        synth.set_master_fine_tuning(cents, time);
                        1
                    }
                    ChannelTarget::Single(ch) => {
                        synth.set_fine_tuning(ch, cents, time);
                        1
                    }
                }
            }
            Operation::CoarseTuning => {
                let cents = coarse_tuning_cents(value);
                match target {
                    ChannelTarget::All => {
                        synth.set_master_coarse_tuning(cents, time);
                        1
                    }
                    ChannelTarget::Single(ch) => {
                        synth.set_coarse_tuning(ch, cents, time);
                        1
                    }
                }
            }
            Operation::PitchBendRange => {
                let cents = pitch_bend_range_cents(value);
                for_each_channel(target, |ch| synth.set_pitch_bend_range(ch, cents, time))?
            }
            Operation::Global(control) => {
                let value = scale_to_data_byte(value);
                match control {
                    GlobalControl::MasterVolume => synth.set_master_volume(value, time),
                    GlobalControl::ReverbType => synth.set_reverb_type(value),
                    GlobalControl::ChorusType => synth.set_chorus_type(value, time),
                }
                1
            }
        };

        tracing::debug!(%operation, %target, value, sent, "mixer dispatch");
        Ok(Resolution::Applied(sent))
    }

    /// Applies a mixer change, awaiting any bank loads it needs.
    pub async fn apply(
        &self,
        target: ChannelTarget,
        operation: Operation,
        value: f64,
        time: f64,
    ) -> Result<()> {
        match self.dispatch(target, operation, value, time)? {
            Resolution::Applied(_) => Ok(()),
            Resolution::ProgramChange { target, program } => {
                self.loader.program_change_on(target, program, time).await
            }
        }
    }

    /// Parses `operation` and applies it.
    ///
    /// Unknown names fail with [`crate::Error::UnsupportedOperation`].
    pub async fn apply_named(
        &self,
        target: ChannelTarget,
        operation: &str,
        value: f64,
        time: f64,
    ) -> Result<()> {
        let operation: Operation = operation.parse()?;
        self.apply(target, operation, value, time).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::synth::testing::{Call, RecordingSynth};
    use crate::synth::ChannelEvent;

    fn resolver() -> (Arc<RecordingSynth>, MixerResolver<RecordingSynth>) {
        let synth = Arc::new(RecordingSynth::new());
        let loader = Arc::new(BankLoader::new(Arc::clone(&synth), "banks", "sf2"));
        (Arc::clone(&synth), MixerResolver::new(synth, loader))
    }

    #[test]
    fn test_fine_tuning_scaling() {
        let (synth, resolver) = resolver();
        for (value, cents) in [(0.5, 0.0), (1.0, 100.0), (0.0, -100.0)] {
            resolver
                .dispatch(ChannelTarget::Single(1), Operation::FineTuning, value, 0.0)
                .unwrap();
            assert_eq!(
                synth.calls().last(),
                Some(&Call::FineTuning { channel: 1, cents })
            );
        }
    }

    #[test]
    fn test_tuning_on_all_goes_to_master() {
        let (synth, resolver) = resolver();
        resolver
            .dispatch(ChannelTarget::All, Operation::FineTuning, 1.0, 0.0)
            .unwrap();
        resolver
            .dispatch(ChannelTarget::All, Operation::CoarseTuning, 0.0, 0.0)
            .unwrap();
        resolver
            .dispatch(ChannelTarget::Single(4), Operation::CoarseTuning, 1.0, 0.0)
            .unwrap();
        assert_eq!(
            synth.calls(),
            vec![
                Call::MasterFineTuning(100.0),
                Call::MasterCoarseTuning(-6400.0),
                Call::CoarseTuning { channel: 4, cents: 6300.0 },
            ]
        );
    }

    #[test]
    fn test_cc7_full_scale() {
        let (synth, resolver) = resolver();
        let op: Operation = "CC7".parse().unwrap();

        let res = resolver.dispatch(ChannelTarget::Single(2), op, 1.0, 4.5).unwrap();
        assert_eq!(res, Resolution::Applied(1));
        assert_eq!(
            synth.calls(),
            vec![Call::ControlChange { channel: 2, controller: 7, value: 127, time: 4.5 }]
        );

        synth.clear();
        let res = resolver.dispatch(ChannelTarget::All, op, 1.0, 4.5).unwrap();
        assert_eq!(res, Resolution::Applied(16));
        let calls = synth.calls();
        assert_eq!(calls.len(), 16);
        for (i, call) in calls.iter().enumerate() {
            assert_eq!(
                call,
                &Call::ControlChange { channel: i as u8, controller: 7, value: 127, time: 4.5 }
            );
        }
    }

    #[test]
    fn test_pitch_bend_range_single_channel() {
        let (synth, resolver) = resolver();
        resolver
            .dispatch(ChannelTarget::Single(6), Operation::PitchBendRange, 0.25, 0.0)
            .unwrap();
        assert_eq!(
            synth.calls(),
            vec![Call::PitchBendRange { channel: 6, cents: 3200.0 }]
        );

        synth.clear();
        resolver
            .dispatch(ChannelTarget::All, Operation::PitchBendRange, 1.0, 0.0)
            .unwrap();
        assert_eq!(synth.calls().len(), 16);
    }

    #[test]
    fn test_channel_event_and_globals() {
        let (synth, resolver) = resolver();
        resolver
            .dispatch(
                ChannelTarget::Single(0),
                "EventChannelPressure".parse().unwrap(),
                0.5,
                0.0,
            )
            .unwrap();
        resolver
            .dispatch(ChannelTarget::Single(3), "MasterVolume".parse().unwrap(), 1.0, 0.0)
            .unwrap();
        resolver
            .dispatch(ChannelTarget::All, "ReverbType".parse().unwrap(), 0.0, 0.0)
            .unwrap();
        assert_eq!(
            synth.calls(),
            vec![
                Call::ChannelEvent {
                    channel: 0,
                    event: ChannelEvent::ChannelPressure,
                    value: 64
                },
                Call::MasterVolume(127),
                Call::ReverbType(0),
            ]
        );
    }

    #[test]
    fn test_program_change_is_deferred() {
        let (synth, resolver) = resolver();
        let res = resolver
            .dispatch(ChannelTarget::All, "EventProgramChange".parse().unwrap(), 1.0, 0.0)
            .unwrap();
        assert_eq!(
            res,
            Resolution::ProgramChange { target: ChannelTarget::All, program: 127 }
        );
        assert!(synth.calls().is_empty());
    }

    #[test]
    fn test_invalid_inputs() {
        let (synth, resolver) = resolver();
        assert!(matches!(
            resolver.dispatch(ChannelTarget::Single(16), Operation::FineTuning, 0.5, 0.0),
            Err(Error::InvalidChannel(16))
        ));
        assert!(matches!(
            resolver.dispatch(ChannelTarget::All, Operation::FineTuning, f64::NAN, 0.0),
            Err(Error::InvalidValue(_))
        ));
        assert!(synth.calls().is_empty());
    }

    #[tokio::test]
    async fn test_apply_named_program_change() {
        let (synth, resolver) = resolver();
        synth.add_preset(0, 0);
        resolver
            .apply_named(ChannelTarget::Single(0), "EventProgramChange", 0.0, 1.0)
            .await
            .unwrap();
        assert_eq!(synth.program_changes(), vec![(0, 0)]);
    }

    #[tokio::test]
    async fn test_apply_named_unsupported() {
        let (synth, resolver) = resolver();
        let err = resolver
            .apply_named(ChannelTarget::All, "Warp", 0.5, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(name) if name == "Warp"));
        assert!(synth.calls().is_empty());
    }
}
