//! Discovery of installed applications.

pub mod bundle;

use crate::config::Config;
use crate::model::InstalledApp;
use log::{debug, info};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone)]
pub struct AppCatalog {
    roots: Vec<PathBuf>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_app_bundle(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("app"))
        .unwrap_or(false)
}

/// Orders by display name ignoring case. Comparison is by Unicode lowercase
/// code points, not the user's locale collation, so accented names sort
/// after plain ASCII ones. Equal keys keep scan order.
pub fn sort_by_name(apps: &mut [InstalledApp]) {
    apps.sort_by_cached_key(|a| a.name.to_lowercase());
}

impl AppCatalog {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.catalog_roots())
    }

    /// Full walk of every root. Duplicates (same canonical path) keep the
    /// first occurrence in root order; the result is sorted by name.
    pub fn scan(&self) -> Vec<InstalledApp> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut apps = Vec::new();

        for root in &self.roots {
            if !root.exists() {
                debug!("AppCatalog: {:?} does not exist, skipping", root);
                continue;
            }
            debug!("AppCatalog: scanning {:?}", root);

            let mut walker = WalkDir::new(root).min_depth(1).into_iter();
            while let Some(entry) = walker.next() {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        debug!("AppCatalog: {}", e);
                        continue;
                    }
                };
                let is_dir = entry.file_type().is_dir();
                if is_hidden(&entry) {
                    if is_dir {
                        walker.skip_current_dir();
                    }
                    continue;
                }
                if !is_app_bundle(entry.path()) {
                    continue;
                }
                // Never look inside a package.
                if is_dir {
                    walker.skip_current_dir();
                }

                let Ok(real) = fs::canonicalize(entry.path()) else {
                    debug!("AppCatalog: cannot resolve {:?}", entry.path());
                    continue;
                };
                if seen.contains(&real) {
                    continue;
                }
                if let Some(app) = bundle::read_bundle(&real) {
                    seen.insert(real);
                    apps.push(app);
                }
            }
        }

        sort_by_name(&mut apps);
        info!("AppCatalog: found {} applications", apps.len());
        apps
    }

    /// Runs `scan` on a worker thread; the result arrives once on the receiver.
    pub fn scan_in_background(&self) -> Receiver<Vec<InstalledApp>> {
        let (tx, rx) = mpsc::channel();
        let catalog = self.clone();
        thread::spawn(move || {
            let _ = tx.send(catalog.scan());
        });
        rx
    }
}
