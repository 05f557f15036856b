//! Error types shared by the SysEx, mixer, synth and player layers.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("scale/octave tuning needs exactly 12 values, got {0}")]
    InvalidTuningLength(usize),

    #[error("{field} must be a 7-bit data byte (0-127), got {value}")]
    DataByteOutOfRange { field: &'static str, value: u8 },

    #[error("MIDI channel must be 0-15, got {0}")]
    InvalidChannel(u8),

    #[error("mixer value must be a number in [0, 1], got {0}")]
    InvalidValue(f64),

    #[error("malformed SysEx message: {0}")]
    MalformedSysEx(String),

    #[error("unsupported mixer operation: {0:?}")]
    UnsupportedOperation(String),

    #[error("unknown effects field: {0:?}")]
    UnknownField(String),

    #[error("failed to load SoundFont {}: {reason}", path.display())]
    SoundFontLoad { path: PathBuf, reason: String },

    #[error("program change failed on channel(s) {channels:?}: {source}")]
    ProgramChangeFailed {
        channels: Vec<u8>,
        #[source]
        source: Box<Error>,
    },

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFile(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Config(String),
}

impl From<midly::Error> for Error {
    fn from(e: midly::Error) -> Self {
        Error::MidiParse(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
