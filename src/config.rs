//! Settings: the persisted preference file and the runtime options from the
//! command line.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = ".tunemix.json";

/// SoundFont extension used for bank lookups when `--bank-ext` is not given.
pub const DEFAULT_BANK_EXTENSION: &str = "sf2";

/// Preferences persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dark_mode: bool,
}

impl Settings {
    /// Reads settings from `path`. A missing file gives the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`Settings::load`], but a corrupt or unreadable file is logged and
    /// replaced by defaults (it gets overwritten on the next save).
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring settings file {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Flips dark mode and returns the new value.
    pub fn toggle_dark_mode(&mut self) -> bool {
        self.dark_mode = !self.dark_mode;
        self.dark_mode
    }
}

/// Runtime configuration assembled from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the per-program bank files (`000.sf2` .. `128.sf2`).
    pub bank_dir: PathBuf,
    pub bank_extension: String,
    pub settings_path: PathBuf,
    /// MIDI files and SoundFonts to load at startup.
    pub files: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bank_dir: PathBuf::from("."),
            bank_extension: DEFAULT_BANK_EXTENSION.to_string(),
            settings_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            files: Vec::new(),
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Config),
    Help,
}

impl Config {
    /// Parses arguments (without the program name).
    ///
    /// Supports:
    /// - `--bank-dir PATH` / `-b PATH`: directory of per-program bank files
    /// - `--bank-ext EXT`: bank file extension (default `sf2`)
    /// - `--config PATH` / `-c PATH`: settings file
    /// - `--help` / `-h`
    /// - positional `.mid`, `.midi`, `.sf2` or `.sf3` files
    pub fn from_args<I, S>(args: I) -> Result<Command>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| Error::Config(format!("{} requires a value", flag)))
            };
            match arg.as_str() {
                "--bank-dir" | "-b" => config.bank_dir = PathBuf::from(value(&arg)?),
                "--bank-ext" => {
                    config.bank_extension = value(&arg)?.trim_start_matches('.').to_string()
                }
                "--config" | "-c" => config.settings_path = PathBuf::from(value(&arg)?),
                "--help" | "-h" => return Ok(Command::Help),
                other if other.starts_with('-') => {
                    return Err(Error::Config(format!("unknown option: {}", other)))
                }
                file => config.files.push(PathBuf::from(file)),
            }
        }

        if config.bank_extension.is_empty() {
            return Err(Error::Config("--bank-ext must not be empty".to_string()));
        }
        Ok(Command::Run(config))
    }
}

/// Usage text for `--help`.
pub fn usage(program: &str) -> String {
    format!(
        "tunemix - SoundFont mixer for MIDI files

Usage: {program} [OPTIONS] [FILES...]

Options:
  -b, --bank-dir PATH   Directory with per-program banks (000.sf2 .. 127.sf2, 128.sf2 for drums)
      --bank-ext EXT    Bank file extension (default: {ext})
  -c, --config PATH     Settings file (default: {config})
  -h, --help            Print this help message

FILES may be .mid/.midi songs or .sf2/.sf3 SoundFonts; they are loaded at startup.",
        program = program,
        ext = DEFAULT_BANK_EXTENSION,
        config = DEFAULT_CONFIG_PATH,
    )
}
