use crate::error::Result;
use crate::model::{AppCategory, MenuItem};
use crate::store::{ConfigStore, SubscriptionId};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MENU_ITEMS_KEY: &str = "menuItems";
pub const SUPPORTED_APPS_KEY: &str = "supportedAppList";

/// Category name to the ordered bundle ids assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment(BTreeMap<AppCategory, Vec<String>>);

impl Default for CategoryAssignment {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            AppCategory::Editor,
            vec!["dev.zed.Zed".to_string(), "com.microsoft.VSCode".to_string()],
        );
        map.insert(
            AppCategory::Terminal,
            vec!["com.apple.Terminal".to_string(), "com.googlecode.iterm2".to_string()],
        );
        Self(map)
    }
}

impl CategoryAssignment {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn bundle_ids(&self, category: AppCategory) -> &[String] {
        self.0.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn category_of(&self, bundle_id: &str) -> Option<AppCategory> {
        self.0
            .iter()
            .find(|(_, ids)| ids.iter().any(|id| id == bundle_id))
            .map(|(category, _)| *category)
    }

    pub fn contains(&self, bundle_id: &str) -> bool {
        self.category_of(bundle_id).is_some()
    }

    /// Puts `bundle_id` in `category`, taking it out of any other category first.
    pub fn assign(&mut self, bundle_id: &str, category: AppCategory) {
        self.unassign(bundle_id);
        self.0.entry(category).or_default().push(bundle_id.to_string());
    }

    pub fn unassign(&mut self, bundle_id: &str) -> bool {
        let mut removed = false;
        for ids in self.0.values_mut() {
            let before = ids.len();
            ids.retain(|id| id != bundle_id);
            removed |= ids.len() != before;
        }
        removed
    }
}

/// Typed view over the shared store used by all three processes.
#[derive(Clone)]
pub struct Settings {
    store: ConfigStore,
}

impl Settings {
    pub fn new(store: ConfigStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn menu_items(&self) -> Vec<MenuItem> {
        match self.store.get::<Vec<MenuItem>>(MENU_ITEMS_KEY) {
            Ok(Some(items)) => items,
            Ok(None) => MenuItem::defaults(),
            Err(e) => {
                warn!("Settings: unreadable {}: {}, using defaults", MENU_ITEMS_KEY, e);
                MenuItem::defaults()
            }
        }
    }

    pub fn set_menu_items(&self, items: &[MenuItem]) -> Result<()> {
        self.store.set(MENU_ITEMS_KEY, &items)
    }

    /// Read-modify-write of the menu sequence. Not isolated from other writers.
    pub fn update_menu_items<R>(&self, f: impl FnOnce(&mut Vec<MenuItem>) -> R) -> Result<R> {
        let mut items = self.menu_items();
        let out = f(&mut items);
        self.set_menu_items(&items)?;
        Ok(out)
    }

    pub fn reset_menu_items(&self) -> Result<()> {
        info!("Settings: resetting menu items to defaults");
        self.set_menu_items(&MenuItem::defaults())
    }

    pub fn on_menu_items_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.store.subscribe(MENU_ITEMS_KEY, callback)
    }

    pub fn categories(&self) -> CategoryAssignment {
        match self.store.get::<CategoryAssignment>(SUPPORTED_APPS_KEY) {
            Ok(Some(c)) => c,
            Ok(None) => CategoryAssignment::default(),
            Err(e) => {
                warn!("Settings: unreadable {}: {}, using defaults", SUPPORTED_APPS_KEY, e);
                CategoryAssignment::default()
            }
        }
    }

    pub fn set_categories(&self, categories: &CategoryAssignment) -> Result<()> {
        self.store.set(SUPPORTED_APPS_KEY, categories)
    }

    pub fn assign_category(&self, bundle_id: &str, category: AppCategory) -> Result<()> {
        let mut categories = self.categories();
        categories.assign(bundle_id, category);
        self.set_categories(&categories)
    }

    pub fn unassign(&self, bundle_id: &str) -> Result<bool> {
        let mut categories = self.categories();
        let removed = categories.unassign(bundle_id);
        if removed {
            self.set_categories(&categories)?;
        }
        Ok(removed)
    }
}
