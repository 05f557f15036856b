//! Program changes that wait for their SoundFont.
//!
//! A program change is only sent once the synthesizer has a preset for the
//! channel's (program, bank) pair. Missing banks are loaded from
//! `<bank_dir>/<name>.<ext>`, where `name` is `128` for drum kits and the
//! zero-padded program number otherwise (`000` .. `127`).
//!
//! Concurrent requests for the same file share one in-flight load. Broadcasts
//! to every channel fan out on a [`JoinSet`] and collect every outcome before
//! returning.

use crate::error::{Error, Result};
use crate::midi::{check_channel, check_data_byte, ChannelTarget, DRUM_BANK};
use crate::synth::{SoundFontSource, Synthesizer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

/// Outcome of a shared load. Errors are kept as their reason text so every
/// waiter can rebuild its own [`Error`].
type LoadSlot = Arc<OnceCell<std::result::Result<(), String>>>;

/// File stem holding the presets for `program` in `bank`.
///
/// # Examples
///
/// ```
/// use tunemix::mixer::program::bank_file_stem;
///
/// assert_eq!(bank_file_stem(7, 0), "007");
/// assert_eq!(bank_file_stem(7, 128), "128");
/// ```
pub fn bank_file_stem(program: u8, bank: u16) -> String {
    if bank == DRUM_BANK {
        DRUM_BANK.to_string()
    } else {
        format!("{:03}", program)
    }
}

pub struct BankLoader<S> {
    synth: Arc<S>,
    bank_dir: PathBuf,
    extension: String,
    in_flight: Mutex<HashMap<PathBuf, LoadSlot>>,
}

impl<S: Synthesizer + 'static> BankLoader<S> {
    pub fn new(synth: Arc<S>, bank_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            synth,
            bank_dir: bank_dir.into(),
            extension: extension.into(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn bank_dir(&self) -> &Path {
        &self.bank_dir
    }

    /// Path of the SoundFont that provides `program` in `bank`.
    pub fn bank_path(&self, program: u8, bank: u16) -> PathBuf {
        self.bank_dir
            .join(bank_file_stem(program, bank))
            .with_extension(&self.extension)
    }

    /// Makes sure a preset for (`program`, `bank`) is available, loading its
    /// SoundFont if needed.
    pub async fn ensure_loaded(&self, program: u8, bank: u16) -> Result<()> {
        if self.synth.has_preset(program, bank) {
            return Ok(());
        }

        let path = self.bank_path(program, bank);
        let slot = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(in_flight.entry(path.clone()).or_default())
        };

        let outcome = slot
            .get_or_init(|| async {
                tracing::info!("Loading bank {} for program {} bank {}", path.display(), program, bank);
                self.synth
                    .load_soundfont(SoundFontSource::Path(path.clone()))
                    .await
                    .map_err(|e| match e {
                        Error::SoundFontLoad { reason, .. } => reason,
                        other => other.to_string(),
                    })
            })
            .await
            .clone();

        // Finished loads leave the table so a later request can try again.
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if in_flight.get(&path).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                in_flight.remove(&path);
            }
        }

        outcome.map_err(|reason| Error::SoundFontLoad { path, reason })
    }

    /// Makes every (program, bank) pair available, loading concurrently.
    ///
    /// Every load runs to completion. Returns the pairs that failed, in the
    /// order they were requested.
    pub async fn ensure_all(self: &Arc<Self>, pairs: &[(u8, u16)]) -> Vec<((u8, u16), Error)> {
        let mut tasks = JoinSet::new();
        for &pair in pairs {
            let loader = Arc::clone(self);
            tasks.spawn(async move { (pair, loader.ensure_loaded(pair.0, pair.1).await) });
        }

        let mut unreported: Vec<(u8, u16)> = pairs.to_vec();
        let mut failures = Vec::new();
        let mut join_errors: Vec<String> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pair, outcome)) => {
                    unreported.retain(|p| *p != pair);
                    if let Err(e) = outcome {
                        failures.push((pair, e));
                    }
                }
                Err(e) => join_errors.push(e.to_string()),
            }
        }
        if !join_errors.is_empty() {
            let reason = join_errors.join("; ");
            failures.extend(
                unreported
                    .into_iter()
                    .map(|pair| (pair, Error::TaskFailed(reason.clone()))),
            );
        }

        failures.sort_by_key(|(pair, _)| pairs.iter().position(|p| p == pair));
        for ((program, bank), e) in &failures {
            tracing::warn!("Bank for program {} bank {} unavailable: {}", program, bank, e);
        }
        failures
    }

    /// Loads the channel's bank if necessary, then switches its program.
    ///
    /// The program change is not sent if the load fails.
    pub async fn program_change(&self, channel: u8, program: u8, time: f64) -> Result<()> {
        check_channel(channel)?;
        check_data_byte("program", program)?;

        let bank = self.synth.channel_state(channel).target_bank();
        self.ensure_loaded(program, bank).await?;
        self.synth.set_program_change(channel, program, time);
        tracing::debug!(channel, program, bank, "program change");
        Ok(())
    }

    /// Program change on every channel in `target`.
    ///
    /// For [`ChannelTarget::All`] the 16 load-then-switch operations run
    /// concurrently and all of them finish before this returns. Channels whose
    /// load succeeded are switched even if others failed; any failure yields
    /// [`Error::ProgramChangeFailed`] listing the failed channels in ascending
    /// order, with the lowest one's error as the source.
    pub async fn program_change_on(
        self: &Arc<Self>,
        target: ChannelTarget,
        program: u8,
        time: f64,
    ) -> Result<()> {
        if let ChannelTarget::Single(channel) = target.validate()? {
            return self.program_change(channel, program, time).await;
        }

        let mut tasks = JoinSet::new();
        for channel in target.channels() {
            let loader = Arc::clone(self);
            tasks.spawn(async move { (channel, loader.program_change(channel, program, time).await) });
        }

        // A task that panics never reports its channel; whatever is left here
        // after draining belongs to those tasks.
        let mut unreported: Vec<u8> = target.channels().collect();
        let mut failures: Vec<(u8, Error)> = Vec::new();
        let mut join_errors: Vec<String> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((channel, outcome)) => {
                    unreported.retain(|ch| *ch != channel);
                    if let Err(e) = outcome {
                        failures.push((channel, e));
                    }
                }
                Err(e) => join_errors.push(e.to_string()),
            }
        }
        if !join_errors.is_empty() {
            let reason = join_errors.join("; ");
            failures.extend(
                unreported
                    .into_iter()
                    .map(|channel| (channel, Error::TaskFailed(reason.clone()))),
            );
        }

        if failures.is_empty() {
            return Ok(());
        }

        failures.sort_by_key(|(channel, _)| *channel);
        let channels: Vec<u8> = failures.iter().map(|(channel, _)| *channel).collect();
        for (channel, e) in &failures {
            tracing::warn!("Program change on channel {} failed: {}", channel, e);
        }
        let (_, first) = failures.swap_remove(0);
        Err(Error::ProgramChangeFailed {
            channels,
            source: Box::new(first),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::testing::RecordingSynth;
    use crate::synth::ChannelState;

    fn loader(synth: &Arc<RecordingSynth>) -> Arc<BankLoader<RecordingSynth>> {
        Arc::new(BankLoader::new(Arc::clone(synth), "banks", "sf3"))
    }

    #[test]
    fn test_bank_path() {
        let synth = Arc::new(RecordingSynth::new());
        let loader = loader(&synth);
        assert_eq!(loader.bank_path(0, 0), PathBuf::from("banks/000.sf3"));
        assert_eq!(loader.bank_path(42, 3), PathBuf::from("banks/042.sf3"));
        assert_eq!(loader.bank_path(42, 128), PathBuf::from("banks/128.sf3"));
    }

    #[tokio::test]
    async fn test_resolved_bank_skips_load() {
        let synth = Arc::new(RecordingSynth::new());
        synth.add_preset(5, 0);
        loader(&synth).program_change(0, 5, 2.0).await.unwrap();

        assert!(synth.loads().is_empty());
        assert_eq!(synth.program_changes(), vec![(0, 5)]);
    }

    #[tokio::test]
    async fn test_unresolved_bank_loads_before_switching() {
        let synth = Arc::new(RecordingSynth::new());
        loader(&synth).program_change(9, 0, 2.0).await.unwrap();

        let calls = synth.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(synth.loads(), vec!["banks/128.sf3".to_string()]);
        assert!(matches!(
            calls[1],
            crate::synth::testing::Call::ProgramChange { channel: 9, program: 0, time } if time == 2.0
        ));
    }

    #[tokio::test]
    async fn test_bank_lsb_selects_bank() {
        let synth = Arc::new(RecordingSynth::new());
        synth.set_channel(
            2,
            ChannelState {
                is_drum: false,
                bank_msb: 0,
                bank_lsb: 8,
            },
        );
        synth.add_preset(30, 8);
        loader(&synth).program_change(2, 30, 0.0).await.unwrap();
        assert!(synth.loads().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_loads_each_bank_once() {
        let synth = Arc::new(RecordingSynth::new());
        loader(&synth)
            .program_change_on(ChannelTarget::All, 7, 1.0)
            .await
            .unwrap();

        let mut loads = synth.loads();
        loads.sort();
        assert_eq!(loads, vec!["banks/007.sf3".to_string(), "banks/128.sf3".to_string()]);

        let mut switched: Vec<u8> = synth.program_changes().iter().map(|(ch, _)| *ch).collect();
        switched.sort();
        assert_eq!(switched, (0..16).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_broadcast_reports_failed_channel() {
        let synth = Arc::new(RecordingSynth::new());
        synth.set_channel(
            3,
            ChannelState {
                is_drum: true,
                bank_msb: 0,
                bank_lsb: 0,
            },
        );
        synth.set_channel(9, ChannelState::initial(0));
        synth.fail_loads_of("128");

        let result = loader(&synth)
            .program_change_on(ChannelTarget::All, 7, 1.0)
            .await;

        match result {
            Err(Error::ProgramChangeFailed { channels, source }) => {
                assert_eq!(channels, vec![3]);
                assert!(matches!(*source, Error::SoundFontLoad { .. }));
            }
            other => panic!("expected ProgramChangeFailed, got {:?}", other),
        }

        // Collect-all: every other channel still switched, channel 3 did not.
        let switched: Vec<u8> = synth.program_changes().iter().map(|(ch, _)| *ch).collect();
        assert_eq!(switched.len(), 15);
        assert!(!switched.contains(&3));
    }

    #[tokio::test]
    async fn test_broadcast_keeps_draining_after_a_task_panics() {
        let synth = Arc::new(RecordingSynth::new());
        synth.panic_on_program_change(4);

        let result = loader(&synth)
            .program_change_on(ChannelTarget::All, 7, 1.0)
            .await;

        match result {
            Err(Error::ProgramChangeFailed { channels, source }) => {
                assert_eq!(channels, vec![4]);
                assert!(matches!(*source, Error::TaskFailed(_)));
            }
            other => panic!("expected ProgramChangeFailed, got {:?}", other),
        }

        let mut switched: Vec<u8> = synth.program_changes().iter().map(|(ch, _)| *ch).collect();
        switched.sort();
        let expected: Vec<u8> = (0..16).filter(|ch| *ch != 4).collect();
        assert_eq!(switched, expected);
    }

    #[tokio::test]
    async fn test_failed_load_can_be_retried_later() {
        let synth = Arc::new(RecordingSynth::new());
        synth.fail_loads_of("012");
        let loader = loader(&synth);

        assert!(loader.program_change(0, 12, 0.0).await.is_err());
        assert!(loader.program_change(0, 12, 0.0).await.is_err());
        assert_eq!(synth.loads().len(), 2);
        assert!(synth.program_changes().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_all_loads_each_pair_and_reports_failures() {
        let synth = Arc::new(RecordingSynth::new());
        synth.add_preset(1, 0);
        synth.fail_loads_of("030");

        let failures = loader(&synth)
            .ensure_all(&[(5, 0), (1, 0), (30, 8), (25, 128)])
            .await;

        let mut loads = synth.loads();
        loads.sort();
        assert_eq!(
            loads,
            vec![
                "banks/005.sf3".to_string(),
                "banks/030.sf3".to_string(),
                "banks/128.sf3".to_string()
            ]
        );
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, (30, 8));
        assert!(matches!(failures[0].1, Error::SoundFontLoad { .. }));
        assert!(synth.has_preset(5, 0));
        assert!(synth.has_preset(25, 128));
        // Loading never switches programs by itself.
        assert!(synth.program_changes().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_program_rejected() {
        let synth = Arc::new(RecordingSynth::new());
        assert!(loader(&synth).program_change(0, 128, 0.0).await.is_err());
        assert!(synth.calls().is_empty());
    }
}
