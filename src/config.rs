use serde::Deserialize;
use std::path::{Path, PathBuf};
use directories::{BaseDirs, ProjectDirs};
use anyhow::{Context, Result};
use std::fs;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub helper: HelperConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_bundle_id")]
    pub bundle_id: String,
    #[serde(default = "default_extension_suffix")]
    pub extension_suffix: String,
    #[serde(default = "default_helper_suffix")]
    pub helper_suffix: String,
    #[serde(default = "default_app_group")]
    pub app_group: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_bundle_id() -> String { "com.0x401.FinderPlus".to_string() }
fn default_extension_suffix() -> String { ".FinderPlusExt".to_string() }
fn default_helper_suffix() -> String { ".FinderPlusHelper".to_string() }
fn default_app_group() -> String { "group.com.0x401.FinderPlus".to_string() }
fn default_key_prefix() -> String { "finderplus_".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bundle_id: default_bundle_id(),
            extension_suffix: default_extension_suffix(),
            helper_suffix: default_helper_suffix(),
            app_group: default_app_group(),
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

fn default_scheme() -> String { "hapigo".to_string() }

impl Default for SearchConfig {
    fn default() -> Self {
        Self { scheme: default_scheme() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct HelperConfig {
    #[serde(default = "default_open_command")]
    pub open_command: String,
    #[serde(default = "default_open_args")]
    pub open_args: Vec<String>,
    #[serde(default = "default_true")]
    pub require_full_disk_access: bool,
    #[serde(default)]
    pub disk_access_probe: Option<PathBuf>,
}

fn default_open_command() -> String { "/usr/bin/open".to_string() }
fn default_open_args() -> Vec<String> { vec!["-b".to_string()] }
fn default_true() -> bool { true }

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            open_command: default_open_command(),
            open_args: default_open_args(),
            require_full_disk_access: true,
            disk_access_probe: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub roots: Option<Vec<PathBuf>>,
}

impl Config {
    pub fn extension_bundle_id(&self) -> String {
        format!("{}{}", self.general.bundle_id, self.general.extension_suffix)
    }

    pub fn helper_bundle_id(&self) -> String {
        format!("{}{}", self.general.bundle_id, self.general.helper_suffix)
    }

    /// Bundle id of the settings app, derived from the extension's own id.
    pub fn main_app_bundle_id(&self, extension_id: &str) -> String {
        extension_id.replace(&self.general.extension_suffix, "")
    }

    pub fn store_dir(&self) -> PathBuf {
        if let Some(dir) = &self.store.dir {
            return dir.clone();
        }
        if cfg!(target_os = "macos") {
            if let Some(base) = BaseDirs::new() {
                return base
                    .home_dir()
                    .join("Library/Group Containers")
                    .join(&self.general.app_group);
            }
        }
        match ProjectDirs::from("com", "0x401", "FinderPlus") {
            Some(dirs) => dirs.data_dir().join("shared"),
            None => PathBuf::from(".finderplus"),
        }
    }

    /// Search roots in priority order; the first occurrence of an app wins.
    pub fn catalog_roots(&self) -> Vec<PathBuf> {
        if let Some(roots) = &self.catalog.roots {
            return roots.clone();
        }
        let mut roots = vec![
            PathBuf::from("/Applications"),
            PathBuf::from("/System/Applications"),
        ];
        if let Some(base) = BaseDirs::new() {
            roots.push(base.home_dir().join("Applications"));
        }
        roots
    }

    pub fn disk_access_probe(&self) -> Option<PathBuf> {
        self.helper.disk_access_probe.clone().or_else(|| {
            BaseDirs::new().map(|b| b.home_dir().join("Library/Containers/com.apple.news"))
        })
    }
}

pub fn default_config_path() -> PathBuf {
    match ProjectDirs::from("com", "0x401", "FinderPlus") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("parsing {}", config_path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [search]
            scheme = "raycast"

            [store]
            dir = "/tmp/fp-store"
            "#,
        )
        .unwrap();

        assert_eq!(config.search.scheme, "raycast");
        assert_eq!(config.store_dir(), PathBuf::from("/tmp/fp-store"));
        assert_eq!(config.general.key_prefix, "finderplus_");
        assert_eq!(config.helper.open_args, vec!["-b".to_string()]);
        assert!(config.helper.require_full_disk_access);
    }

    #[test]
    fn bundle_ids_derive_from_the_main_id() {
        let config = Config::default();
        let ext = config.extension_bundle_id();
        assert_eq!(ext, "com.0x401.FinderPlus.FinderPlusExt");
        assert_eq!(config.helper_bundle_id(), "com.0x401.FinderPlus.FinderPlusHelper");
        assert_eq!(config.main_app_bundle_id(&ext), "com.0x401.FinderPlus");
    }

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.general.bundle_id, "com.0x401.FinderPlus");
    }

    #[test]
    fn catalog_root_override() {
        let config: Config = toml::from_str("[catalog]\nroots = [\"/a\", \"/b\"]").unwrap();
        assert_eq!(config.catalog_roots(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
