use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// The closed set of things a menu entry can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Search,
    Open,
    New,
    Show,
    #[serde(rename = "copypath")]
    CopyPath,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::Open => "open",
            Action::New => "new",
            Action::Show => "show",
            Action::CopyPath => "copypath",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Action::Search),
            "open" => Ok(Action::Open),
            "new" => Ok(Action::New),
            "show" => Ok(Action::Show),
            "copypath" => Ok(Action::CopyPath),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Visibility predicates, ANDed together on context menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    SingleOnly,
    MultipleOnly,
    SingleOrBlankOnly,
    FolderOnly,
    FileOnly,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::SingleOnly => "singleOnly",
            Condition::MultipleOnly => "multipleOnly",
            Condition::SingleOrBlankOnly => "singleOrBlankOnly",
            Condition::FolderOnly => "folderOnly",
            Condition::FileOnly => "fileOnly",
        }
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "singleOnly" => Ok(Condition::SingleOnly),
            "multipleOnly" => Ok(Condition::MultipleOnly),
            "singleOrBlankOnly" => Ok(Condition::SingleOrBlankOnly),
            "folderOnly" => Ok(Condition::FolderOnly),
            "fileOnly" => Ok(Condition::FileOnly),
            other => Err(format!("unknown condition: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppCategory {
    Editor,
    Terminal,
}

impl AppCategory {
    pub const ALL: [AppCategory; 2] = [AppCategory::Editor, AppCategory::Terminal];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppCategory::Editor => "editor",
            AppCategory::Terminal => "terminal",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AppCategory::Editor => "Editor",
            AppCategory::Terminal => "Terminal",
        }
    }
}

impl fmt::Display for AppCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "editor" => Ok(AppCategory::Editor),
            "terminal" => Ok(AppCategory::Terminal),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: Uuid,
    pub title: String,
    pub icon: String,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    pub action: Action,
    #[serde(default = "default_true")]
    pub is_toolbar_enabled: bool,
    #[serde(default = "default_true")]
    pub is_context_enabled: bool,
    #[serde(default)]
    pub conditions: BTreeSet<Condition>,
    #[serde(default, rename = "appBundleID", skip_serializing_if = "Option::is_none")]
    pub app_bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_category: Option<AppCategory>,
}

fn default_true() -> bool { true }

/// Per-entry switches that the settings UI toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Enabled,
    Toolbar,
    Context,
}

impl FromStr for Flag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(Flag::Enabled),
            "toolbar" => Ok(Flag::Toolbar),
            "context" => Ok(Flag::Context),
            other => Err(format!("unknown flag: {other}")),
        }
    }
}

impl MenuItem {
    pub fn new(title: &str, icon: &str, action: Action) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            icon: icon.to_string(),
            is_enabled: true,
            action,
            is_toolbar_enabled: true,
            is_context_enabled: true,
            conditions: BTreeSet::new(),
            app_bundle_id: None,
            app_name: None,
            app_category: None,
        }
    }

    pub fn with_conditions(mut self, conditions: &[Condition]) -> Self {
        self.conditions = conditions.iter().copied().collect();
        self
    }

    pub fn about() -> Self {
        MenuItem::new("FinderPlus", "info.circle", Action::Show)
    }

    /// The sequence restored by a reset. Never empty.
    pub fn defaults() -> Vec<MenuItem> {
        vec![MenuItem::about()]
    }

    /// Entries the settings app offers in its "add" menu.
    pub fn templates() -> Vec<MenuItem> {
        vec![
            MenuItem::new("Search Files", "magnifyingglass", Action::Search)
                .with_conditions(&[Condition::FolderOnly, Condition::SingleOnly]),
            MenuItem::new("Copy Path", "document.on.document", Action::CopyPath),
            MenuItem::new("Open with Application", "square.grid.2x2", Action::Open),
            MenuItem::new("New File", "doc.badge.plus", Action::New),
            MenuItem::about(),
        ]
    }

    pub fn template(action: Action) -> MenuItem {
        MenuItem::templates()
            .into_iter()
            .find(|t| t.action == action)
            .unwrap_or_else(MenuItem::about)
    }

    /// Fresh copy of `template` with a new id, bound to `app` for open entries.
    pub fn from_template(template: &MenuItem, app: Option<(&InstalledApp, AppCategory)>) -> Self {
        let mut item = template.clone();
        item.id = Uuid::new_v4();
        if let Some((app, category)) = app {
            item.app_name = Some(app.name.clone());
            item.app_bundle_id = Some(app.bundle_id.clone());
            item.app_category = Some(category);
        }
        item
    }

    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        match flag {
            Flag::Enabled => self.is_enabled = value,
            Flag::Toolbar => self.is_toolbar_enabled = value,
            Flag::Context => self.is_context_enabled = value,
        }
    }
}

/// Inserts after the selected entry; otherwise just before the last entry so
/// the about entry stays at the bottom; otherwise appends.
pub fn insert_after(items: &mut Vec<MenuItem>, selected: Option<Uuid>, item: MenuItem) {
    let position = selected.and_then(|id| items.iter().position(|i| i.id == id));
    match position {
        Some(index) => items.insert(index + 1, item),
        None if !items.is_empty() => items.insert(items.len() - 1, item),
        None => items.push(item),
    }
}

/// Removes the entry with `id` and returns the id that should become selected.
pub fn remove(items: &mut Vec<MenuItem>, id: Uuid) -> Option<Uuid> {
    let index = items.iter().position(|i| i.id == id)?;
    items.remove(index);
    if items.is_empty() {
        None
    } else if index == 0 {
        Some(items[0].id)
    } else {
        Some(items[index - 1].id)
    }
}

/// Moves the element at `from` so it ends up at index `to`; everything else
/// keeps its relative order. Out-of-range indices leave the sequence untouched.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= items.len() || to >= items.len() {
        return false;
    }
    if from != to {
        let item = items.remove(from);
        items.insert(to, item);
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    pub bundle_id: String,
    pub name: String,
    pub version: String,
    pub install_path: PathBuf,
    pub icon: Option<PathBuf>,
}

impl InstalledApp {
    pub fn keywords(&self) -> String {
        format!("{} {} {}", self.name, self.bundle_id, self.version)
    }
}
