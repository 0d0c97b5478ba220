use std::fs;
use std::path::{Path, PathBuf};

/// What the menu filter needs to know about the current Finder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionContext {
    pub selected_count: usize,
    pub is_single_folder: bool,
    pub is_single_file: bool,
}

impl SelectionContext {
    /// Used when the selection API is unavailable.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Snapshot of the live Finder selection handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinderSelection {
    pub selected: Vec<PathBuf>,
    /// Folder shown in the window the menu was opened from.
    pub targeted: Option<PathBuf>,
}

impl FinderSelection {
    pub fn new(selected: Vec<PathBuf>, targeted: Option<PathBuf>) -> Self {
        Self { selected, targeted }
    }

    /// Stats the sole selected item once; a failed stat counts as neither folder nor file.
    pub fn context(&self) -> SelectionContext {
        let selected_count = self.selected.len();
        let (is_single_folder, is_single_file) = match self.selected.as_slice() {
            [only] => match fs::metadata(only) {
                Ok(meta) => (meta.is_dir(), !meta.is_dir()),
                Err(_) => (false, false),
            },
            _ => (false, false),
        };
        SelectionContext { selected_count, is_single_folder, is_single_file }
    }

    /// The folder the user is working in: the first selected item if it is a
    /// directory, otherwise its parent; the targeted folder when nothing is selected.
    pub fn current_folder(&self) -> Option<PathBuf> {
        match self.selected.first() {
            Some(first) if first.is_dir() => Some(first.clone()),
            Some(first) => first.parent().map(Path::to_path_buf),
            None => self.targeted.clone(),
        }
    }

    /// Selected paths, or the targeted folder when nothing is selected.
    pub fn items(&self) -> Vec<PathBuf> {
        if !self.selected.is_empty() {
            return self.selected.clone();
        }
        self.targeted.iter().cloned().collect()
    }
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
