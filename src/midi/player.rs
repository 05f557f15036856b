//! MIDI file playback.
//!
//! A Standard MIDI File is flattened into one list of channel and SysEx
//! events stamped in seconds, using the file's tempo map (or its SMPTE frame
//! rate). [`MidiPlayer`] walks that list in real time and sends due events to
//! an [`EventSink`], normally the [`AudioEngine`].

use crate::audio::AudioEngine;
use crate::error::{Error, Result};
use crate::midi::{BANK_SELECT_LSB, BANK_SELECT_MSB, CHANNEL_COUNT};
use crate::synth::ChannelState;
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::time::Instant;

/// Tempo assumed until the first tempo event (120 BPM).
const DEFAULT_TEMPO_US: u32 = 500_000;

/// Represents the current playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Not playing, position reset to start.
    Stopped,
    Playing,
    /// Paused at current position.
    Paused,
}

/// A playable event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    /// 14-bit value, 8192 is centre.
    PitchBend(u16),
    ChannelPressure(u8),
    /// SysEx payload without the leading `F0`.
    SysEx(Vec<u8>),
}

impl PlayerEvent {
    /// Events that set channel state rather than sound a note; these are
    /// replayed when seeking.
    fn is_state(&self) -> bool {
        matches!(
            self,
            PlayerEvent::ControlChange { .. }
                | PlayerEvent::ProgramChange { .. }
                | PlayerEvent::PitchBend(_)
                | PlayerEvent::SysEx(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    /// Seconds from the start of the song.
    pub time: f64,
    pub channel: u8,
    pub event: PlayerEvent,
}

/// Receives events from the player.
pub trait EventSink {
    fn send(&self, channel: u8, event: &PlayerEvent);

    /// Silences everything. `immediate` skips the release phase.
    fn all_notes_off(&self, immediate: bool);
}

impl EventSink for AudioEngine {
    fn send(&self, channel: u8, event: &PlayerEvent) {
        use crate::synth::Synthesizer;

        let now = self.current_time();
        match *event {
            PlayerEvent::NoteOn { key, velocity } => self.note_on(channel, key, velocity),
            PlayerEvent::NoteOff { key } => self.note_off(channel, key),
            PlayerEvent::ControlChange { controller, value } => {
                self.set_control_change(channel, controller, value, now)
            }
            PlayerEvent::ProgramChange { program } => self.set_program_change(channel, program, now),
            PlayerEvent::PitchBend(value) => self.pitch_bend(channel, value),
            PlayerEvent::ChannelPressure(value) => self.channel_pressure(channel, value),
            PlayerEvent::SysEx(ref data) => self.handle_sysex(data),
        }
    }

    fn all_notes_off(&self, immediate: bool) {
        AudioEngine::all_notes_off(self, immediate);
    }
}

/// A parsed MIDI file.
#[derive(Debug, Clone, Default)]
pub struct Song {
    events: Vec<TimedEvent>,
    duration: f64,
}

impl Song {
    /// Parses an SMF. Format 0 and 1 files with metrical or SMPTE timing are
    /// accepted; format 2 is rejected.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data)?;
        if smf.header.format == Format::Sequential {
            return Err(Error::MidiParse(
                "format 2 (sequential) files are not supported".to_string(),
            ));
        }

        // Merge every track on absolute ticks, keeping track order for ties.
        let mut merged: Vec<(u64, usize, TrackEventKind)> = Vec::new();
        for (track_idx, track) in smf.tracks.iter().enumerate() {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                merged.push((tick, track_idx, event.kind));
            }
        }
        merged.sort_by_key(|(tick, track_idx, _)| (*tick, *track_idx));

        let mut events = Vec::new();
        let mut clock = TickClock::new(smf.header.timing);
        let mut end = 0.0f64;
        for (tick, _, kind) in merged {
            let time = clock.seconds_at(tick);
            end = end.max(time);
            match kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    clock.set_tempo(tick, tempo.as_int())
                }
                TrackEventKind::Midi { channel, message } => {
                    if let Some(event) = convert_message(message) {
                        events.push(TimedEvent {
                            time,
                            channel: channel.as_int(),
                            event,
                        });
                    }
                }
                TrackEventKind::SysEx(data) => events.push(TimedEvent {
                    time,
                    channel: 0,
                    event: PlayerEvent::SysEx(data.to_vec()),
                }),
                _ => {}
            }
        }

        tracing::debug!(
            "Parsed MIDI file: {} tracks, {} events, {:.2}s",
            smf.tracks.len(),
            events.len(),
            end
        );
        Ok(Self {
            events,
            duration: end,
        })
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The (program, bank) pairs the song selects, in order of first use.
    ///
    /// Bank select is tracked per channel the same way the engine tracks it.
    /// A channel that plays a note before any program change uses program 0.
    pub fn bank_requests(&self) -> Vec<(u8, u16)> {
        let mut states: [ChannelState; CHANNEL_COUNT as usize] =
            std::array::from_fn(|ch| ChannelState::initial(ch as u8));
        let mut has_program = [false; CHANNEL_COUNT as usize];
        let mut requests = Vec::new();

        for event in &self.events {
            let ch = event.channel as usize % CHANNEL_COUNT as usize;
            let program = match event.event {
                PlayerEvent::ControlChange {
                    controller: BANK_SELECT_MSB,
                    value,
                } => {
                    states[ch].bank_msb = value;
                    continue;
                }
                PlayerEvent::ControlChange {
                    controller: BANK_SELECT_LSB,
                    value,
                } => {
                    states[ch].bank_lsb = value;
                    continue;
                }
                PlayerEvent::ProgramChange { program } => program,
                PlayerEvent::NoteOn { .. } if !has_program[ch] => 0,
                _ => continue,
            };
            has_program[ch] = true;
            let pair = (program, states[ch].target_bank());
            if !requests.contains(&pair) {
                requests.push(pair);
            }
        }
        requests
    }
}

fn convert_message(message: MidiMessage) -> Option<PlayerEvent> {
    Some(match message {
        // Velocity 0 is a note off.
        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => PlayerEvent::NoteOff {
            key: key.as_int(),
        },
        MidiMessage::NoteOn { key, vel } => PlayerEvent::NoteOn {
            key: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::NoteOff { key, .. } => PlayerEvent::NoteOff { key: key.as_int() },
        MidiMessage::Controller { controller, value } => PlayerEvent::ControlChange {
            controller: controller.as_int(),
            value: value.as_int(),
        },
        MidiMessage::ProgramChange { program } => PlayerEvent::ProgramChange {
            program: program.as_int(),
        },
        MidiMessage::PitchBend { bend } => PlayerEvent::PitchBend(bend.0.as_int()),
        MidiMessage::ChannelAftertouch { vel } => PlayerEvent::ChannelPressure(vel.as_int()),
        MidiMessage::Aftertouch { .. } => return None,
    })
}

/// Converts absolute ticks to seconds across tempo changes.
struct TickClock {
    timing: Timing,
    tempo_us: u32,
    /// Tick and time of the last tempo change.
    anchor_tick: u64,
    anchor_seconds: f64,
}

impl TickClock {
    fn new(timing: Timing) -> Self {
        Self {
            timing,
            tempo_us: DEFAULT_TEMPO_US,
            anchor_tick: 0,
            anchor_seconds: 0.0,
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        let ticks = (tick - self.anchor_tick) as f64;
        let elapsed = match self.timing {
            Timing::Metrical(tpb) => {
                ticks * self.tempo_us as f64 / (tpb.as_int().max(1) as f64 * 1_000_000.0)
            }
            // SMPTE timing ignores tempo events.
            Timing::Timecode(fps, subframes) => {
                ticks / (fps.as_f32() as f64 * subframes.max(1) as f64)
            }
        };
        self.anchor_seconds + elapsed
    }

    /// Changes tempo from `tick` on. Ticks are visited in order, so the
    /// anchor only moves forward.
    fn set_tempo(&mut self, tick: u64, tempo_us: u32) {
        if tempo_us == 0 {
            return;
        }
        self.anchor_seconds = self.seconds_at(tick);
        self.anchor_tick = tick;
        self.tempo_us = tempo_us;
    }
}

/// Transport over a loaded [`Song`].
#[derive(Debug)]
pub struct MidiPlayer {
    song: Option<Song>,
    name: Option<String>,
    state: PlaybackState,
    position: f64,
    /// Index of the next event to send.
    cursor: usize,
    last_update: Option<Instant>,
}

impl Default for MidiPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiPlayer {
    pub fn new() -> Self {
        Self {
            song: None,
            name: None,
            state: PlaybackState::Stopped,
            position: 0.0,
            cursor: 0,
            last_update: None,
        }
    }

    /// Stops playback, then parses `data` and makes it the current song.
    ///
    /// If parsing fails the previous song stays loaded (stopped).
    pub fn load_midi(&mut self, sink: &impl EventSink, name: &str, data: &[u8]) -> Result<()> {
        self.handle_stop(sink);
        let song = Song::parse(data)?;
        tracing::info!(
            "Loaded MIDI file {} ({} events, {:.1}s)",
            name,
            song.events.len(),
            song.duration
        );
        self.song = Some(song);
        self.name = Some(name.to_string());
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.song.is_some()
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn song_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Starts or resumes playback. Does nothing without a song.
    pub fn play(&mut self) {
        if self.song.is_none() {
            return;
        }
        self.state = PlaybackState::Playing;
        self.last_update = None;
    }

    /// Pauses at the current position and releases sounding notes.
    pub fn pause(&mut self, sink: &impl EventSink) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            sink.all_notes_off(false);
        }
    }

    pub fn toggle(&mut self, sink: &impl EventSink) {
        if self.is_playing() {
            self.pause(sink);
        } else {
            self.play();
        }
    }

    /// Stops playback, silences every note and rewinds to the start.
    pub fn handle_stop(&mut self, sink: &impl EventSink) {
        self.state = PlaybackState::Stopped;
        self.position = 0.0;
        self.cursor = 0;
        self.last_update = None;
        sink.all_notes_off(true);
    }

    /// Moves to `seconds`, replaying controller, program and SysEx events
    /// before that point so channels sound as they would there.
    pub fn seek(&mut self, sink: &impl EventSink, seconds: f64) {
        let Some(song) = &self.song else {
            return;
        };
        sink.all_notes_off(true);

        let position = seconds.clamp(0.0, song.duration);
        let cursor = song.events.partition_point(|e| e.time < position);
        for event in song.events[..cursor].iter().filter(|e| e.event.is_state()) {
            sink.send(event.channel, &event.event);
        }

        self.position = position;
        self.cursor = cursor;
        self.last_update = None;
    }

    /// Advances the clock and sends every event that has come due.
    /// Called once per frame.
    pub fn update(&mut self, sink: &impl EventSink) -> usize {
        self.update_at(sink, Instant::now())
    }

    /// [`MidiPlayer::update`] with an explicit clock reading.
    pub fn update_at(&mut self, sink: &impl EventSink, now: Instant) -> usize {
        if self.state != PlaybackState::Playing {
            return 0;
        }
        let Some(song) = &self.song else {
            return 0;
        };

        if let Some(previous) = self.last_update {
            self.position += now.saturating_duration_since(previous).as_secs_f64();
        }
        self.last_update = Some(now);

        let mut sent = 0;
        while let Some(event) = song.events.get(self.cursor) {
            if event.time > self.position {
                break;
            }
            sink.send(event.channel, &event.event);
            self.cursor += 1;
            sent += 1;
        }

        if self.position >= song.duration && self.cursor >= song.events.len() {
            tracing::debug!("Reached end of song");
            self.handle_stop(sink);
        }
        sent
    }

    pub fn position_seconds(&self) -> f64 {
        self.position
    }

    pub fn duration_seconds(&self) -> f64 {
        self.song.as_ref().map(Song::duration).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u24, u28, u4, u7};
    use midly::{Fps, Header, TrackEvent};
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<(u8, PlayerEvent)>>,
        silenced: RefCell<usize>,
    }

    impl EventSink for Recorder {
        fn send(&self, channel: u8, event: &PlayerEvent) {
            self.events.borrow_mut().push((channel, event.clone()));
        }

        fn all_notes_off(&self, _immediate: bool) {
            *self.silenced.borrow_mut() += 1;
        }
    }

    fn midi(channel: u8, delta: u32, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message,
            },
        }
    }

    fn meta(delta: u32, message: MetaMessage<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Meta(message),
        }
    }

    fn note_on(key: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(100),
        }
    }

    fn note_off(key: u8) -> MidiMessage {
        MidiMessage::NoteOff {
            key: u7::new(key),
            vel: u7::new(0),
        }
    }

    fn write(format: Format, timing: Timing, tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let smf = Smf {
            header: Header::new(format, timing),
            tracks,
        };
        let mut out = Vec::new();
        smf.write_std(&mut out).unwrap();
        out
    }

    /// Format 1: a tempo track (120 BPM, then 60 BPM at beat 1) and one note
    /// track with a note at beats 0 and 2, at 480 ticks per beat.
    fn two_tempo_song() -> Vec<u8> {
        let tempo_track = vec![
            meta(0, MetaMessage::Tempo(u24::new(500_000))),
            meta(480, MetaMessage::Tempo(u24::new(1_000_000))),
            meta(0, MetaMessage::EndOfTrack),
        ];
        let notes = vec![
            midi(0, 0, MidiMessage::ProgramChange { program: u7::new(5) }),
            midi(0, 0, note_on(60)),
            midi(0, 240, note_off(60)),
            midi(0, 720, note_on(64)),
            midi(0, 480, note_off(64)),
            meta(0, MetaMessage::EndOfTrack),
        ];
        write(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
            vec![tempo_track, notes],
        )
    }

    #[test]
    fn test_tempo_map_in_seconds() {
        let song = Song::parse(&two_tempo_song()).unwrap();
        let times: Vec<(f64, &PlayerEvent)> =
            song.events().iter().map(|e| (e.time, &e.event)).collect();

        // Beat 0.5 at 120 BPM = 0.25s; beat 2 = 0.5s + 1s at 60 BPM = 1.5s; beat 3 = 2.5s.
        assert_eq!(times[0], (0.0, &PlayerEvent::ProgramChange { program: 5 }));
        assert_eq!(times[1], (0.0, &PlayerEvent::NoteOn { key: 60, velocity: 100 }));
        assert_eq!(times[2], (0.25, &PlayerEvent::NoteOff { key: 60 }));
        assert_eq!(times[3], (1.5, &PlayerEvent::NoteOn { key: 64, velocity: 100 }));
        assert_eq!(times[4], (2.5, &PlayerEvent::NoteOff { key: 64 }));
        assert_eq!(song.duration(), 2.5);
    }

    #[test]
    fn test_bank_requests_follow_bank_select() {
        let cc = |controller: u8, value: u8| MidiMessage::Controller {
            controller: u7::new(controller),
            value: u7::new(value),
        };
        let pc = |program: u8| MidiMessage::ProgramChange {
            program: u7::new(program),
        };
        let track = vec![
            midi(0, 0, pc(5)),
            midi(1, 0, cc(32, 8)),
            midi(1, 0, pc(30)),
            // Drum channel always resolves to the drum bank.
            midi(9, 0, cc(32, 3)),
            midi(9, 0, pc(25)),
            // No program change on channel 2 before its first note.
            midi(2, 10, note_on(60)),
            midi(2, 10, note_off(60)),
            midi(0, 0, pc(5)),
            midi(3, 0, pc(5)),
            meta(0, MetaMessage::EndOfTrack),
        ];
        let data = write(Format::SingleTrack, Timing::Metrical(u15::new(96)), vec![track]);
        let song = Song::parse(&data).unwrap();

        assert_eq!(
            song.bank_requests(),
            vec![(5, 0), (30, 8), (25, 128), (0, 0)]
        );
    }

    #[test]
    fn test_smpte_timing() {
        let track = vec![
            midi(1, 0, note_on(60)),
            midi(1, 250, note_off(60)),
            meta(0, MetaMessage::EndOfTrack),
        ];
        let data = write(
            Format::SingleTrack,
            Timing::Timecode(Fps::Fps25, 10),
            vec![track],
        );
        let song = Song::parse(&data).unwrap();
        assert_eq!(song.events()[1].time, 1.0);
        assert_eq!(song.events()[1].channel, 1);
    }

    #[test]
    fn test_format_2_rejected() {
        let data = write(
            Format::Sequential,
            Timing::Metrical(u15::new(96)),
            vec![vec![meta(0, MetaMessage::EndOfTrack)]],
        );
        assert!(matches!(Song::parse(&data), Err(Error::MidiParse(_))));
        assert!(Song::parse(b"not a midi file").is_err());
    }

    #[test]
    fn test_zero_velocity_is_note_off() {
        let track = vec![
            midi(0, 0, note_on(60)),
            midi(
                0,
                10,
                MidiMessage::NoteOn {
                    key: u7::new(60),
                    vel: u7::new(0),
                },
            ),
            meta(0, MetaMessage::EndOfTrack),
        ];
        let data = write(Format::SingleTrack, Timing::Metrical(u15::new(96)), vec![track]);
        let song = Song::parse(&data).unwrap();
        assert_eq!(song.events()[1].event, PlayerEvent::NoteOff { key: 60 });
    }

    #[test]
    fn test_playback_sends_due_events() {
        let sink = Recorder::default();
        let mut player = MidiPlayer::new();
        player.load_midi(&sink, "song.mid", &two_tempo_song()).unwrap();
        assert_eq!(player.duration_seconds(), 2.5);

        let t0 = Instant::now();
        player.play();
        assert_eq!(player.update_at(&sink, t0), 2);
        assert_eq!(player.update_at(&sink, t0 + Duration::from_millis(1000)), 1);
        assert_eq!(player.position_seconds(), 1.0);

        player.pause(&sink);
        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.update_at(&sink, t0 + Duration::from_secs(5)), 0);

        player.toggle(&sink);
        player.update_at(&sink, t0 + Duration::from_secs(6));
        player.update_at(&sink, t0 + Duration::from_secs(8));
        // Past the end: everything sent, transport rewound.
        assert_eq!(sink.events.borrow().len(), 5);
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.position_seconds(), 0.0);
    }

    #[test]
    fn test_seek_replays_state_events() {
        let sink = Recorder::default();
        let mut player = MidiPlayer::new();
        player.load_midi(&sink, "song.mid", &two_tempo_song()).unwrap();

        player.seek(&sink, 1.0);
        assert_eq!(
            *sink.events.borrow(),
            vec![(0, PlayerEvent::ProgramChange { program: 5 })]
        );
        assert_eq!(player.position_seconds(), 1.0);

        player.play();
        assert_eq!(player.update_at(&sink, Instant::now()), 0);
    }

    #[test]
    fn test_load_stops_previous_song() {
        let sink = Recorder::default();
        let mut player = MidiPlayer::new();
        player.load_midi(&sink, "a.mid", &two_tempo_song()).unwrap();
        player.play();
        player.update_at(&sink, Instant::now());

        let before = *sink.silenced.borrow();
        assert!(player.load_midi(&sink, "b.mid", b"garbage").is_err());
        assert_eq!(*sink.silenced.borrow(), before + 1);
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.song_name(), Some("a.mid"));
    }

    #[test]
    fn test_play_without_song_is_ignored() {
        let mut player = MidiPlayer::new();
        player.play();
        assert_eq!(player.state(), PlaybackState::Stopped);
    }
}
