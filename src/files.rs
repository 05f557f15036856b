//! Recognising and picking the files the app can open.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Entries visible in the browser list at once.
pub const BROWSER_PAGE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.mid` / `.midi`
    Midi,
    /// `.sf2` / `.sf3`
    SoundFont,
}

impl FileKind {
    /// Classifies a file by extension, ignoring case.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("mid" | "midi") => Ok(FileKind::Midi),
            Some("sf2" | "sf3") => Ok(FileKind::SoundFont),
            _ => Err(Error::UnsupportedFile(path.to_path_buf())),
        }
    }

    pub fn is_supported(path: &Path) -> bool {
        Self::from_path(path).is_ok()
    }
}

/// File name for status messages.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// Turns pasted text into a path. Terminals deliver drag-and-drop as a paste,
/// sometimes quoted, with escaped spaces, or as a `file://` URL.
pub fn parse_pasted_path(text: &str) -> Option<PathBuf> {
    let text = text.trim();
    let text = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .or_else(|| text.strip_prefix('"').and_then(|t| t.strip_suffix('"')))
        .unwrap_or(text);
    let text = text.strip_prefix("file://").unwrap_or(text);
    let text = text.replace("\\ ", " ");
    if text.is_empty() || text.contains('\n') {
        return None;
    }
    Some(PathBuf::from(text))
}

/// What selecting a browser entry did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserAction {
    /// Moved into a directory.
    Navigated,
    /// A file was picked; the browser has closed.
    Chosen(PathBuf),
    Nothing,
}

/// State for the file browser dialog. Lists directories and the MIDI and
/// SoundFont files in the current directory.
#[derive(Debug, Clone)]
pub struct FileBrowser {
    pub open: bool,
    pub current_dir: PathBuf,
    pub entries: Vec<PathBuf>,
    pub selected: usize,
    /// Scroll offset for long lists.
    pub scroll: usize,
}

impl Default for FileBrowser {
    fn default() -> Self {
        Self {
            open: false,
            current_dir: std::env::current_dir().unwrap_or_default(),
            entries: Vec::new(),
            selected: 0,
            scroll: 0,
        }
    }
}

impl FileBrowser {
    pub fn open_at(&mut self, dir: PathBuf) {
        self.open = true;
        self.current_dir = dir;
        self.selected = 0;
        self.scroll = 0;
        self.refresh();
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Re-reads the current directory: `..` first, then directories, then
    /// supported files, each sorted by name.
    pub fn refresh(&mut self) {
        self.entries.clear();

        if self.current_dir.parent().is_some() {
            self.entries.push(PathBuf::from(".."));
        }

        match std::fs::read_dir(&self.current_dir) {
            Ok(entries) => {
                let mut dirs: Vec<PathBuf> = Vec::new();
                let mut files: Vec<PathBuf> = Vec::new();

                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        dirs.push(path);
                    } else if FileKind::is_supported(&path) {
                        files.push(path);
                    }
                }

                dirs.sort();
                files.sort();
                self.entries.extend(dirs);
                self.entries.extend(files);
            }
            Err(e) => tracing::warn!("Cannot list {}: {}", self.current_dir.display(), e),
        }

        if self.selected >= self.entries.len() {
            self.selected = 0;
        }
    }

    pub fn up(&mut self) {
        if self.open && self.selected > 0 {
            self.selected -= 1;
            if self.selected < self.scroll {
                self.scroll = self.selected;
            }
        }
    }

    pub fn down(&mut self) {
        if self.open && self.selected + 1 < self.entries.len() {
            self.selected += 1;
            if self.selected >= self.scroll + BROWSER_PAGE {
                self.scroll = self.selected + 1 - BROWSER_PAGE;
            }
        }
    }

    /// Enters the selected directory or picks the selected file.
    pub fn select(&mut self) -> BrowserAction {
        let Some(selected) = self.entries.get(self.selected).cloned() else {
            return BrowserAction::Nothing;
        };
        if !self.open {
            return BrowserAction::Nothing;
        }

        if selected == Path::new("..") {
            match self.current_dir.parent() {
                Some(parent) => {
                    let parent = parent.to_path_buf();
                    self.open_at(parent);
                    BrowserAction::Navigated
                }
                None => BrowserAction::Nothing,
            }
        } else if selected.is_dir() {
            self.open_at(selected);
            BrowserAction::Navigated
        } else {
            self.open = false;
            BrowserAction::Chosen(selected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_path(Path::new("a.mid")).unwrap(), FileKind::Midi);
        assert_eq!(FileKind::from_path(Path::new("b.MIDI")).unwrap(), FileKind::Midi);
        assert_eq!(FileKind::from_path(Path::new("c.sf2")).unwrap(), FileKind::SoundFont);
        assert_eq!(FileKind::from_path(Path::new("d.SF3")).unwrap(), FileKind::SoundFont);
        assert!(matches!(
            FileKind::from_path(Path::new("e.wav")),
            Err(Error::UnsupportedFile(_))
        ));
        assert!(FileKind::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_parse_pasted_path() {
        assert_eq!(
            parse_pasted_path("  '/tmp/my song.mid'\n"),
            Some(PathBuf::from("/tmp/my song.mid"))
        );
        assert_eq!(
            parse_pasted_path("/tmp/my\\ font.sf2"),
            Some(PathBuf::from("/tmp/my font.sf2"))
        );
        assert_eq!(
            parse_pasted_path("file:///tmp/a.mid"),
            Some(PathBuf::from("/tmp/a.mid"))
        );
        assert_eq!(parse_pasted_path("   "), None);
        assert_eq!(parse_pasted_path("a\nb"), None);
    }

    #[test]
    fn test_browser_lists_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("banks")).unwrap();
        for name in ["b.mid", "a.sf2", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let mut browser = FileBrowser::default();
        browser.open_at(dir.path().to_path_buf());
        let names: Vec<String> = browser.entries.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, vec!["..", "banks", "a.sf2", "b.mid"]);

        browser.down();
        assert_eq!(browser.select(), BrowserAction::Navigated);
        assert!(browser.current_dir.ends_with("banks"));
        assert_eq!(browser.entries, vec![PathBuf::from("..")]);

        assert_eq!(browser.select(), BrowserAction::Navigated);
        browser.down();
        browser.down();
        assert_eq!(
            browser.select(),
            BrowserAction::Chosen(dir.path().join("a.sf2"))
        );
        assert!(!browser.open);
    }
}
