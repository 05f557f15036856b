//! Per-channel broadcast of SysEx messages and controller calls.
//!
//! Dispatch order is always ascending channel, then ascending controller
//! type or key number. Every loop runs to completion without yielding, so the
//! synthesizer sees the messages in exactly this order.

use crate::error::Result;
use crate::midi::sysex::{
    encode_control_change_effect, encode_key_based_instrument_control, encode_pressure_effect,
    PressureKind,
};
use crate::midi::ChannelTarget;
use crate::synth::{PressureTable, Synthesizer};
use std::ops::RangeInclusive;

/// Controller bands shaped by a control-change effect broadcast.
///
/// 1-15 and 64-95 are the continuous and switch controllers; bank select,
/// data entry, the LSB block and the mode/RPN controllers are left alone.
pub const CONTROLLER_BANDS: [RangeInclusive<u8>; 2] = [1..=15, 64..=95];

/// Key numbers visited by a key-based instrument control broadcast.
pub const KEY_RANGE: RangeInclusive<u8> = 0..=127;

/// Sends a channel or polyphonic key pressure destination message to every
/// channel in `target`. Returns the number of messages sent.
pub fn broadcast_pressure_effect<S: Synthesizer + ?Sized>(
    synth: &S,
    target: ChannelTarget,
    kind: PressureKind,
    parameter: u8,
    value: u8,
    time: f64,
) -> Result<usize> {
    let table = match kind {
        PressureKind::Channel => PressureTable::ChannelPressure,
        PressureKind::PolyphonicKey => PressureTable::PolyphonicKeyPressure,
    };

    let mut sent = 0;
    for channel in target.validate()?.channels() {
        let data = encode_pressure_effect(kind, channel, parameter, value)?;
        synth.handle_pressure_sysex(&data, table, time);
        sent += 1;
    }
    tracing::debug!(?target, ?kind, parameter, value, sent, "pressure effect broadcast");
    Ok(sent)
}

/// Sends a control-change destination message for every controller in
/// [`CONTROLLER_BANDS`] on every channel in `target`.
pub fn broadcast_control_change_effect<S: Synthesizer + ?Sized>(
    synth: &S,
    target: ChannelTarget,
    parameter: u8,
    value: u8,
    time: f64,
) -> Result<usize> {
    let mut sent = 0;
    for channel in target.validate()?.channels() {
        for controller in CONTROLLER_BANDS.iter().cloned().flatten() {
            let data = encode_control_change_effect(channel, controller, parameter, value)?;
            synth.handle_control_change_sysex(&data, time);
            sent += 1;
        }
    }
    tracing::debug!(?target, parameter, value, sent, "control change effect broadcast");
    Ok(sent)
}

/// Sends a key-based instrument control message for all 128 keys on every
/// channel in `target`.
pub fn broadcast_key_based_instrument_control<S: Synthesizer + ?Sized>(
    synth: &S,
    target: ChannelTarget,
    parameter: u8,
    value: u8,
    time: f64,
) -> Result<usize> {
    let mut sent = 0;
    for channel in target.validate()?.channels() {
        for key in KEY_RANGE {
            let data = encode_key_based_instrument_control(channel, key, parameter, value)?;
            synth.handle_key_based_instrument_control_sysex(&data, time);
            sent += 1;
        }
    }
    tracing::debug!(?target, parameter, value, sent, "key-based control broadcast");
    Ok(sent)
}

/// Sends a plain control change to every channel in `target`.
pub fn broadcast_control_change<S: Synthesizer + ?Sized>(
    synth: &S,
    target: ChannelTarget,
    controller: u8,
    value: u8,
    time: f64,
) -> Result<usize> {
    let mut sent = 0;
    for channel in target.validate()?.channels() {
        synth.set_control_change(channel, controller, value, time);
        sent += 1;
    }
    Ok(sent)
}

/// Calls `apply` once per channel in `target`, in ascending order.
pub fn for_each_channel(target: ChannelTarget, mut apply: impl FnMut(u8)) -> Result<usize> {
    let mut sent = 0;
    for channel in target.validate()?.channels() {
        apply(channel);
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::testing::{Call, RecordingSynth};

    #[test]
    fn test_control_change_effect_all_channels() {
        let synth = RecordingSynth::new();
        let sent = broadcast_control_change_effect(&synth, ChannelTarget::All, 2, 99, 0.5).unwrap();
        assert_eq!(sent, 16 * (15 + 32));
        assert_eq!(sent, 752);

        let calls = synth.calls();
        assert_eq!(calls.len(), 752);

        let mut expected = Vec::new();
        for channel in 0..16u8 {
            for controller in (1..=15u8).chain(64..=95u8) {
                expected.push((channel, controller));
            }
        }
        let actual: Vec<(u8, u8)> = calls
            .iter()
            .map(|call| match call {
                Call::ControlChangeSysEx { data, time } => {
                    assert_eq!(data[6], 2);
                    assert_eq!(data[7], 99);
                    assert_eq!(*time, 0.5);
                    (data[4], data[5])
                }
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_control_change_effect_single_channel() {
        let synth = RecordingSynth::new();
        let sent =
            broadcast_control_change_effect(&synth, ChannelTarget::Single(5), 0, 64, 0.0).unwrap();
        assert_eq!(sent, 47);
        assert!(synth.calls().iter().all(|c| matches!(
            c,
            Call::ControlChangeSysEx { data, .. } if data[4] == 5
        )));
    }

    #[test]
    fn test_key_based_all_channels() {
        let synth = RecordingSynth::new();
        let sent =
            broadcast_key_based_instrument_control(&synth, ChannelTarget::All, 7, 100, 2.0).unwrap();
        assert_eq!(sent, 2048);

        let calls = synth.calls();
        assert_eq!(calls.len(), 2048);
        // Last call is channel 15, key 127.
        match calls.last() {
            Some(Call::KeyBasedSysEx { data, .. }) => {
                assert_eq!(data.as_slice(), &[127, 127, 10, 1, 15, 127, 7, 100]);
            }
            other => panic!("unexpected call {:?}", other),
        }
        // Keys ascend within channel 0.
        match (&calls[0], &calls[1]) {
            (Call::KeyBasedSysEx { data: a, .. }, Call::KeyBasedSysEx { data: b, .. }) => {
                assert_eq!((a[4], a[5]), (0, 0));
                assert_eq!((b[4], b[5]), (0, 1));
            }
            other => panic!("unexpected calls {:?}", other),
        }
    }

    #[test]
    fn test_pressure_effect_tables() {
        let synth = RecordingSynth::new();
        broadcast_pressure_effect(&synth, ChannelTarget::All, PressureKind::Channel, 0, 10, 0.0)
            .unwrap();
        broadcast_pressure_effect(
            &synth,
            ChannelTarget::Single(2),
            PressureKind::PolyphonicKey,
            1,
            20,
            0.0,
        )
        .unwrap();

        let calls = synth.calls();
        assert_eq!(calls.len(), 17);
        for (i, call) in calls[..16].iter().enumerate() {
            match call {
                Call::Pressure { data, table, .. } => {
                    assert_eq!(*table, PressureTable::ChannelPressure);
                    assert_eq!(data.as_slice(), &[127, 127, 9, 1, i as u8, 0, 10]);
                }
                other => panic!("unexpected call {:?}", other),
            }
        }
        assert!(matches!(
            &calls[16],
            Call::Pressure { data, table: PressureTable::PolyphonicKeyPressure, .. }
                if data.as_slice() == [127, 127, 9, 2, 2, 1, 20]
        ));
    }

    #[test]
    fn test_invalid_values_send_nothing() {
        let synth = RecordingSynth::new();
        assert!(broadcast_control_change_effect(&synth, ChannelTarget::All, 0, 128, 0.0).is_err());
        assert!(broadcast_control_change(&synth, ChannelTarget::Single(16), 7, 1, 0.0).is_err());
        assert!(synth.calls().is_empty());
    }

    #[test]
    fn test_plain_control_change_order() {
        let synth = RecordingSynth::new();
        broadcast_control_change(&synth, ChannelTarget::All, 7, 127, 3.0).unwrap();
        let channels: Vec<u8> = synth
            .calls()
            .iter()
            .map(|c| match c {
                Call::ControlChange { channel, controller: 7, value: 127, time } => {
                    assert_eq!(*time, 3.0);
                    *channel
                }
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(channels, (0..16).collect::<Vec<u8>>());
    }
}
