//! Background helper that performs the privileged half of a command.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor;
use crate::permissions;
use crate::protocol::{HelperEvent, MailboxReader, Notification, SignalListener};
use crate::store::ConfigStore;
use calloop::EventLoop;
use chrono::Utc;
use log::{error, info, warn};
use std::borrow::Cow;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct Helper {
    config: Config,
    mailbox: MailboxReader,
    pub should_exit: bool,
}

pub fn new_file_name(epoch_secs: i64) -> String {
    format!("helper_created_{epoch_secs}.txt")
}

fn is_external_volume(path: &Path) -> bool {
    path.starts_with("/Volumes/")
}

/// Creates an empty file named after the current second inside `folder`.
/// A second call within the same second overwrites the first file.
pub fn create_file_in(folder: &str) -> Result<PathBuf> {
    let decoded = urlencoding::decode(folder).unwrap_or(Cow::Borrowed(folder));
    let folder = PathBuf::from(decoded.as_ref());
    let path = folder.join(new_file_name(Utc::now().timestamp()));

    match File::create(&path) {
        Ok(_) => Ok(path),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(Error::PermissionDenied {
            external_volume: is_external_volume(&folder),
            path,
        }),
        Err(e) => Err(e.into()),
    }
}

impl Helper {
    pub fn new(config: Config, store: ConfigStore) -> Self {
        Self {
            config,
            mailbox: MailboxReader::new(store),
            should_exit: false,
        }
    }

    pub fn handle(&mut self, event: HelperEvent) {
        match event {
            HelperEvent::Notification(Notification::OpenWithRequested) => self.open_with(),
            HelperEvent::Notification(Notification::CreateFileRequested) => {
                self.create_file();
            }
            HelperEvent::Shutdown => {
                info!("helper: shutting down");
                self.should_exit = true;
            }
        }
    }

    fn open_with(&mut self) {
        let args: Vec<String> = match self.mailbox.take(Notification::OpenWithRequested) {
            Ok(Some(args)) => args,
            Ok(None) => return,
            Err(e) => {
                error!("helper: reading open-with payload: {}", e);
                return;
            }
        };
        if args.is_empty() {
            warn!("helper: empty open-with payload");
            return;
        }

        let mut full = self.config.helper.open_args.clone();
        full.extend(args);
        info!("helper: {} {:?}", self.config.helper.open_command, full);
        if let Err(e) = executor::run_and_wait(&self.config.helper.open_command, &full) {
            error!("helper: open failed: {}", e);
        }
    }

    /// Returns the created path, or `None` when nothing was written.
    pub fn create_file(&mut self) -> Option<PathBuf> {
        if self.config.helper.require_full_disk_access {
            let granted = self
                .config
                .disk_access_probe()
                .map(|probe| permissions::full_disk_access_granted(&probe))
                .unwrap_or(false);
            if !granted {
                warn!("helper: full disk access not granted, not creating file");
                return None;
            }
        }

        let folder: String = match self.mailbox.take(Notification::CreateFileRequested) {
            Ok(Some(folder)) => folder,
            Ok(None) => return None,
            Err(e) => {
                error!("helper: reading target payload: {}", e);
                return None;
            }
        };

        match create_file_in(&folder) {
            Ok(path) => {
                info!("helper: created {:?}", path);
                Some(path)
            }
            Err(Error::PermissionDenied { path, external_volume: true }) => {
                error!("helper: insufficient permission on external volume for {:?}", path);
                None
            }
            Err(e) => {
                error!("helper: create failed in {}: {}", folder, e);
                None
            }
        }
    }
}

/// Runs the helper until SIGTERM/SIGINT.
pub fn run(config: Config, store: ConfigStore) -> anyhow::Result<()> {
    let mut event_loop: EventLoop<Helper> = EventLoop::try_new()?;
    let (tx, rx) = calloop::channel::channel::<HelperEvent>();
    let _listener = SignalListener::install(store.dir(), tx)?;

    event_loop
        .handle()
        .insert_source(rx, |event, _, helper: &mut Helper| match event {
            calloop::channel::Event::Msg(event) => helper.handle(event),
            calloop::channel::Event::Closed => helper.should_exit = true,
        })
        .map_err(|e| anyhow::anyhow!("inserting signal source: {}", e.error))?;

    let mut helper = Helper::new(config, store);
    info!("helper: ready");
    loop {
        if helper.should_exit {
            break;
        }
        event_loop.dispatch(None, &mut helper)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::RecordingNotifier;
    use crate::protocol::CommandChannel;
    use std::fs;

    fn setup(require_access: bool) -> (tempfile::TempDir, ConfigStore, Helper) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("shared"), "finderplus_").unwrap();
        let mut config = Config::default();
        config.helper.require_full_disk_access = require_access;
        config.helper.disk_access_probe = Some(dir.path().join("no-such-probe"));
        let helper = Helper::new(config, store.clone());
        (dir, store, helper)
    }

    #[test]
    fn file_name_uses_epoch_seconds() {
        assert_eq!(new_file_name(1_700_000_000), "helper_created_1700000000.txt");
    }

    #[test]
    fn creates_an_empty_file_in_the_target() {
        let (dir, store, mut helper) = setup(false);
        let target = dir.path().join("my folder");
        fs::create_dir(&target).unwrap();
        let encoded = target.to_string_lossy().replace(' ', "%20");

        CommandChannel::new(store, RecordingNotifier::default())
            .request_create_file(&encoded)
            .unwrap();
        let created = helper.create_file().unwrap();

        assert_eq!(created.parent(), Some(target.as_path()));
        let name = created.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("helper_created_") && name.ends_with(".txt"));
        assert_eq!(fs::metadata(&created).unwrap().len(), 0);

        // Same payload again is not executed twice.
        assert!(helper.create_file().is_none());
    }

    #[test]
    fn refuses_without_full_disk_access() {
        let (dir, store, mut helper) = setup(true);
        CommandChannel::new(store, RecordingNotifier::default())
            .request_create_file(&dir.path().to_string_lossy())
            .unwrap();
        assert!(helper.create_file().is_none());
    }

    #[test]
    fn missing_folder_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(matches!(create_file_in(&missing.to_string_lossy()), Err(Error::Io(_))));
        assert!(is_external_volume(Path::new("/Volumes/USB/dir")));
        assert!(!is_external_volume(Path::new("/Users/me")));
    }

    /// Points the open command at `sh -c <script>`, keeping `-b` as the
    /// first argument the script sees.
    fn record_with(helper: &mut Helper, script: String) {
        helper.config.helper.open_command = "sh".to_string();
        helper.config.helper.open_args = vec!["-c".to_string(), script, "sh".to_string(), "-b".to_string()];
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn open_with_passes_bundle_then_paths() {
        let (dir, store, mut helper) = setup(false);
        let log = dir.path().join("argv");
        record_with(&mut helper, format!("printf '%s\\n' \"$@\" > '{}'", log.display()));
        let channel = CommandChannel::new(store, RecordingNotifier::default());

        channel
            .request_open_with(&strings(&["dev.zed.Zed", "/tmp/proj", "/tmp/proj/main.rs"]))
            .unwrap();
        helper.handle(HelperEvent::Notification(Notification::OpenWithRequested));
        assert_eq!(
            fs::read_to_string(&log).unwrap(),
            "-b\ndev.zed.Zed\n/tmp/proj\n/tmp/proj/main.rs\n"
        );

        channel.request_open_with(&strings(&["com.apple.Terminal", "/tmp/proj"])).unwrap();
        helper.handle(HelperEvent::Notification(Notification::OpenWithRequested));
        assert_eq!(fs::read_to_string(&log).unwrap(), "-b\ncom.apple.Terminal\n/tmp/proj\n");
    }

    #[test]
    fn failed_open_is_not_retried() {
        let (dir, store, mut helper) = setup(false);
        let log = dir.path().join("runs");
        record_with(&mut helper, format!("echo run >> '{}'; exit 1", log.display()));
        CommandChannel::new(store, RecordingNotifier::default())
            .request_open_with(&strings(&["com.apple.Terminal", "/tmp"]))
            .unwrap();

        helper.handle(HelperEvent::Notification(Notification::OpenWithRequested));
        helper.handle(HelperEvent::Notification(Notification::OpenWithRequested));
        assert_eq!(fs::read_to_string(&log).unwrap(), "run\n");
        assert!(!helper.should_exit);
    }

    #[test]
    fn shutdown_event_stops_the_loop() {
        let (_dir, _store, mut helper) = setup(false);
        helper.handle(HelperEvent::Shutdown);
        assert!(helper.should_exit);
    }
}
