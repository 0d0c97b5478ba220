//! Read-only status probes for the pieces FinderPlus depends on, plus the
//! toggles the settings app exposes for them.

use crate::config::Config;
use crate::error::Result;
use crate::executor;
use directories::BaseDirs;
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const PLUGINKIT: &str = "/usr/bin/pluginkit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderSyncStatus {
    Enabled,
    Disabled,
    /// Another copy of the extension with the same id is registered.
    RegisteredSameName,
    Unregistered,
}

/// Interprets `pluginkit -mvi <id>` output. The first column is `+` when the
/// extension is enabled and `-` when it is disabled.
pub fn parse_pluginkit_output(output: &str, extension_path: &str) -> FinderSyncStatus {
    let output = output.trim_start();
    if output.is_empty() {
        return FinderSyncStatus::Unregistered;
    }
    if !output.contains(extension_path) {
        return FinderSyncStatus::RegisteredSameName;
    }
    if output.starts_with('+') {
        FinderSyncStatus::Enabled
    } else if output.starts_with('-') {
        FinderSyncStatus::Disabled
    } else {
        FinderSyncStatus::Unregistered
    }
}

pub fn extension_path(app_bundle: &Path) -> String {
    app_bundle
        .join("Contents/PlugIns/FinderPlusExt.appex")
        .to_string_lossy()
        .into_owned()
}

pub fn finder_sync_status(extension_id: &str, extension_path: &str) -> FinderSyncStatus {
    match executor::capture_output(PLUGINKIT, &["-mvi".to_string(), extension_id.to_string()]) {
        Ok(out) => parse_pluginkit_output(&out, extension_path),
        Err(_) => FinderSyncStatus::Unregistered,
    }
}

pub fn set_extension_enabled(extension_id: &str, enabled: bool) -> Result<()> {
    let election = if enabled { "use" } else { "ignore" };
    let args = ["-e", election, "-i", extension_id].map(String::from);
    executor::run_and_wait(PLUGINKIT, &args).inspect_err(|e| {
        error!("permissions: pluginkit -e {} failed: {}", election, e);
    })
}

/// Full disk access is inferred from being able to list a protected directory.
pub fn full_disk_access_granted(probe: &Path) -> bool {
    fs::read_dir(probe).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperStatus {
    Enabled,
    NotRegistered,
}

/// Login item for the helper, installed as a per-user LaunchAgent.
pub struct LoginItem {
    label: String,
    plist: PathBuf,
}

impl LoginItem {
    pub fn new(label: &str, launch_agents_dir: &Path) -> Self {
        Self {
            label: label.to_string(),
            plist: launch_agents_dir.join(format!("{label}.plist")),
        }
    }

    pub fn for_config(config: &Config) -> Option<Self> {
        let base = BaseDirs::new()?;
        Some(Self::new(&config.helper_bundle_id(), &base.home_dir().join("Library/LaunchAgents")))
    }

    pub fn status(&self) -> HelperStatus {
        if self.plist.exists() {
            HelperStatus::Enabled
        } else {
            HelperStatus::NotRegistered
        }
    }

    pub fn register(&self, program: &Path) -> Result<()> {
        let plist = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
        <string>helper</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
</dict>
</plist>"#,
            self.label,
            program.display()
        );
        if let Some(parent) = self.plist.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.plist, plist)?;
        info!("permissions: registered login item {}", self.label);
        Ok(())
    }

    pub fn unregister(&self) -> Result<()> {
        match fs::remove_file(&self.plist) {
            Ok(()) => {
                info!("permissions: unregistered login item {}", self.label);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSnapshot {
    pub extension: FinderSyncStatus,
    pub full_disk_access: bool,
    pub helper: HelperStatus,
}

/// The three probes a status refresh runs.
pub trait StatusProbe: Sync {
    fn extension(&self) -> FinderSyncStatus;
    fn full_disk_access(&self) -> bool;
    fn helper(&self) -> HelperStatus;
}

pub struct SystemProbe {
    pub extension_id: String,
    pub extension_path: String,
    pub disk_probe: Option<PathBuf>,
    pub login_item: Option<LoginItem>,
}

impl SystemProbe {
    pub fn from_config(config: &Config, app_bundle: &Path) -> Self {
        Self {
            extension_id: config.extension_bundle_id(),
            extension_path: extension_path(app_bundle),
            disk_probe: config.disk_access_probe(),
            login_item: LoginItem::for_config(config),
        }
    }
}

impl StatusProbe for SystemProbe {
    fn extension(&self) -> FinderSyncStatus {
        finder_sync_status(&self.extension_id, &self.extension_path)
    }

    fn full_disk_access(&self) -> bool {
        self.disk_probe.as_deref().map(full_disk_access_granted).unwrap_or(false)
    }

    fn helper(&self) -> HelperStatus {
        self.login_item
            .as_ref()
            .map(LoginItem::status)
            .unwrap_or(HelperStatus::NotRegistered)
    }
}

pub struct PermissionMonitor<P> {
    probe: P,
    refreshing: AtomicBool,
}

impl<P: StatusProbe> PermissionMonitor<P> {
    pub fn new(probe: P) -> Self {
        Self { probe, refreshing: AtomicBool::new(false) }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Runs the probes concurrently. A refresh requested while one is in
    /// flight is dropped and returns `None`.
    pub fn refresh(&self) -> Option<PermissionSnapshot> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let probe = &self.probe;
        let snapshot = thread::scope(|s| {
            let extension = s.spawn(|| probe.extension());
            let disk = s.spawn(|| probe.full_disk_access());
            let helper = probe.helper();
            PermissionSnapshot {
                extension: extension.join().unwrap_or(FinderSyncStatus::Unregistered),
                full_disk_access: disk.join().unwrap_or(false),
                helper,
            }
        });

        self.refreshing.store(false, Ordering::Release);
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    const EXT: &str = "/Applications/FinderPlus.app/Contents/PlugIns/FinderPlusExt.appex";

    #[test]
    fn pluginkit_output_states() {
        let line = format!("+    com.0x401.FinderPlus.FinderPlusExt(0.9)\tC330\t2025-12-31\t{EXT}\n");
        assert_eq!(parse_pluginkit_output(&line, EXT), FinderSyncStatus::Enabled);
        assert_eq!(parse_pluginkit_output(&line.replacen('+', "-", 1), EXT), FinderSyncStatus::Disabled);
        assert_eq!(
            parse_pluginkit_output(&line, "/Users/me/Build/FinderPlus.app/Contents/PlugIns/FinderPlusExt.appex"),
            FinderSyncStatus::RegisteredSameName
        );
        assert_eq!(parse_pluginkit_output("", EXT), FinderSyncStatus::Unregistered);
        assert_eq!(extension_path(Path::new("/Applications/FinderPlus.app")), EXT);
    }

    #[test]
    fn login_item_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let item = LoginItem::new("com.0x401.FinderPlus.FinderPlusHelper", &dir.path().join("LaunchAgents"));
        assert_eq!(item.status(), HelperStatus::NotRegistered);

        item.register(Path::new("/Applications/FinderPlus.app/Contents/MacOS/finderplus")).unwrap();
        assert_eq!(item.status(), HelperStatus::Enabled);
        let written = fs::read_to_string(dir.path().join("LaunchAgents/com.0x401.FinderPlus.FinderPlusHelper.plist")).unwrap();
        assert!(written.contains("<string>helper</string>"));

        item.unregister().unwrap();
        item.unregister().unwrap();
        assert_eq!(item.status(), HelperStatus::NotRegistered);
    }

    #[test]
    fn disk_access_probe() {
        let dir = tempfile::tempdir().unwrap();
        assert!(full_disk_access_granted(dir.path()));
        assert!(!full_disk_access_granted(&dir.path().join("missing")));
    }

    struct FixedProbe;

    impl StatusProbe for FixedProbe {
        fn extension(&self) -> FinderSyncStatus { FinderSyncStatus::Disabled }
        fn full_disk_access(&self) -> bool { true }
        fn helper(&self) -> HelperStatus { HelperStatus::Enabled }
    }

    #[test]
    fn refresh_collects_all_probes() {
        let monitor = PermissionMonitor::new(FixedProbe);
        let snapshot = monitor.refresh().unwrap();
        assert_eq!(
            snapshot,
            PermissionSnapshot {
                extension: FinderSyncStatus::Disabled,
                full_disk_access: true,
                helper: HelperStatus::Enabled,
            }
        );
        assert!(!monitor.is_refreshing());
    }

    struct BlockingProbe {
        entered: Arc<Barrier>,
        release: Arc<Barrier>,
    }

    impl StatusProbe for BlockingProbe {
        fn extension(&self) -> FinderSyncStatus {
            self.entered.wait();
            self.release.wait();
            FinderSyncStatus::Enabled
        }
        fn full_disk_access(&self) -> bool { false }
        fn helper(&self) -> HelperStatus { HelperStatus::NotRegistered }
    }

    #[test]
    fn overlapping_refresh_is_dropped() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let monitor = Arc::new(PermissionMonitor::new(BlockingProbe {
            entered: entered.clone(),
            release: release.clone(),
        }));

        let m = monitor.clone();
        let first = thread::spawn(move || m.refresh());
        entered.wait();
        assert!(monitor.is_refreshing());
        assert!(monitor.refresh().is_none());
        release.wait();

        assert_eq!(first.join().unwrap().unwrap().extension, FinderSyncStatus::Enabled);
        assert!(!monitor.is_refreshing());
    }
}
