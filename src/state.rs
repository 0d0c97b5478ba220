use crate::matcher::FuzzyMatcher;
use crate::model::{AppCategory, InstalledApp};
use crate::settings::CategoryAssignment;
use std::sync::mpsc::{Receiver, TryRecvError};

/// View state behind the settings app's application picker.
pub struct AppListState {
    pub apps: Vec<InstalledApp>,
    pub filtered_indices: Vec<usize>,
    pub query: String,
    pub categories: CategoryAssignment,
    matcher: FuzzyMatcher,
    loading: bool,
}

impl AppListState {
    pub fn new(categories: CategoryAssignment) -> Self {
        Self {
            apps: Vec::new(),
            filtered_indices: Vec::new(),
            query: String::new(),
            categories,
            matcher: FuzzyMatcher::new(),
            loading: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn begin_loading(&mut self) {
        self.loading = true;
    }

    /// Non-blocking check for a finished background scan. Returns true when
    /// new results were applied.
    pub fn poll_scan(&mut self, rx: &Receiver<Vec<InstalledApp>>) -> bool {
        match rx.try_recv() {
            Ok(apps) => {
                self.set_apps(apps);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.loading = false;
                false
            }
        }
    }

    pub fn set_apps(&mut self, apps: Vec<InstalledApp>) {
        self.apps = apps;
        self.loading = false;
        self.update_filter();
    }

    pub fn set_categories(&mut self, categories: CategoryAssignment) {
        self.categories = categories;
        self.update_filter();
    }

    pub fn update_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.update_filter();
    }

    /// Apps not yet in any category that match the query.
    pub fn update_filter(&mut self) {
        let unassigned: Vec<usize> = (0..self.apps.len())
            .filter(|&i| !self.categories.contains(&self.apps[i].bundle_id))
            .collect();

        self.filtered_indices = if self.query.is_empty() {
            unassigned
        } else {
            self.matcher
                .match_apps(&self.query, &self.apps)
                .into_iter()
                .map(|(i, _)| i)
                .filter(|i| unassigned.contains(i))
                .collect()
        };

        log::debug!("AppListState: query='{}', filtered_count={}", self.query, self.filtered_indices.len());
    }

    pub fn visible(&self) -> Vec<&InstalledApp> {
        self.filtered_indices.iter().map(|&i| &self.apps[i]).collect()
    }

    /// Installed apps assigned to `category`, in assignment order.
    pub fn apps_in(&self, category: AppCategory) -> Vec<&InstalledApp> {
        self.categories
            .bundle_ids(category)
            .iter()
            .filter_map(|id| self.apps.iter().find(|a| &a.bundle_id == id))
            .collect()
    }

    pub fn find(&self, bundle_id: &str) -> Option<&InstalledApp> {
        self.apps.iter().find(|a| a.bundle_id == bundle_id)
    }
}
