use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor;
use crate::model::{Action, AppCategory, MenuItem};
use crate::protocol::{CommandChannel, Notifier};
use crate::selection::{path_string, FinderSelection};
use log::{error, info, warn};

/// What a menu activation resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenUrl(String),
    /// `[bundleID, paths...]`, executed by the helper.
    OpenWith(Vec<String>),
    /// Folder the helper creates a file in.
    CreateFile(String),
    ShowApp(String),
    CopyPath(String),
}

/// OS services the extension may call directly.
pub trait Platform {
    fn open_url(&self, url: &str) -> Result<()>;
    fn launch_application(&self, bundle_id: &str) -> Result<()>;
    fn set_clipboard_text(&self, text: &str) -> Result<()>;
}

pub struct SystemPlatform;

fn opener() -> &'static str {
    if cfg!(target_os = "macos") { "/usr/bin/open" } else { "xdg-open" }
}

impl Platform for SystemPlatform {
    fn open_url(&self, url: &str) -> Result<()> {
        executor::spawn_detached(opener(), &[url.to_string()])
    }

    fn launch_application(&self, bundle_id: &str) -> Result<()> {
        if !cfg!(target_os = "macos") {
            return Err(Error::AppNotFound(bundle_id.to_string()));
        }
        executor::run_and_wait("/usr/bin/open", &["-b".to_string(), bundle_id.to_string()])
            .map_err(|_| Error::AppNotFound(bundle_id.to_string()))
    }

    fn set_clipboard_text(&self, text: &str) -> Result<()> {
        let mut clipboard = arboard::Clipboard::new()?;
        clipboard.set_text(text.to_string())?;
        Ok(())
    }
}

pub fn url_for(scheme: &str, path: &str) -> String {
    match scheme {
        "hapigo" => format!("hapigo://open?extensionID=FILE&query={path}"),
        _ => format!("{scheme}://file{path}"),
    }
}

fn target_folder(selection: &FinderSelection) -> Result<String> {
    selection
        .targeted
        .clone()
        .or_else(|| selection.current_folder())
        .map(|p| path_string(&p))
        .ok_or(Error::NoTargetFolder)
}

/// Resolves `entry` against `selection` without side effects.
pub fn plan(entry: &MenuItem, selection: &FinderSelection, config: &Config) -> Result<Command> {
    match entry.action {
        Action::Search => Ok(Command::OpenUrl(url_for(&config.search.scheme, &target_folder(selection)?))),
        Action::Open => {
            let bundle_id = entry.app_bundle_id.clone().ok_or(Error::Unbound(entry.id))?;
            let folder = selection.current_folder().ok_or(Error::NoTargetFolder)?;
            let mut args = vec![bundle_id, path_string(&folder)];
            // Editors open the folder as a workspace plus every selected item;
            // everything else only gets the working directory.
            if entry.app_category == Some(AppCategory::Editor) {
                args.extend(
                    selection
                        .items()
                        .iter()
                        .filter(|p| **p != folder)
                        .map(|p| path_string(p)),
                );
            }
            Ok(Command::OpenWith(args))
        }
        Action::New => Ok(Command::CreateFile(target_folder(selection)?)),
        Action::Show => Ok(Command::ShowApp(config.main_app_bundle_id(&config.extension_bundle_id()))),
        Action::CopyPath => {
            let items = selection.items();
            if items.is_empty() {
                return Err(Error::NoSelection);
            }
            let joined = items.iter().map(|p| path_string(p)).collect::<Vec<_>>().join("\n");
            Ok(Command::CopyPath(joined))
        }
    }
}

pub struct CommandDispatcher<P, N> {
    config: Config,
    channel: CommandChannel<N>,
    platform: P,
}

impl<P: Platform, N: Notifier> CommandDispatcher<P, N> {
    pub fn new(config: Config, channel: CommandChannel<N>, platform: P) -> Self {
        Self { config, channel, platform }
    }

    /// Routes a menu activation by tag. Unknown tags are logged and ignored.
    pub fn activate(&self, entries: &[MenuItem], tag: usize, selection: &FinderSelection) {
        match entries.get(tag) {
            Some(entry) => self.dispatch(entry, selection),
            None => warn!("dispatch: {}", Error::InvalidTag { tag, len: entries.len() }),
        }
    }

    /// Runs `entry`; failures are logged, never raised to the host.
    pub fn dispatch(&self, entry: &MenuItem, selection: &FinderSelection) {
        if let Err(e) = self.try_dispatch(entry, selection) {
            match e {
                Error::NoTargetFolder | Error::NoSelection | Error::Unbound(_) | Error::NoListener(_) => {
                    warn!("dispatch: {} skipped: {}", entry.action.as_str(), e)
                }
                _ => error!("dispatch: {} failed: {}", entry.action.as_str(), e),
            }
        }
    }

    pub fn try_dispatch(&self, entry: &MenuItem, selection: &FinderSelection) -> Result<()> {
        let command = plan(entry, selection, &self.config)?;
        info!("dispatch: {} -> {:?}", entry.action.as_str(), command);
        self.execute(command)
    }

    pub fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::OpenUrl(url) => self.platform.open_url(&url),
            Command::OpenWith(args) => self.channel.request_open_with(&args).map(|_| ()),
            Command::CreateFile(folder) => self.channel.request_create_file(&folder).map(|_| ()),
            Command::ShowApp(bundle_id) => self.platform.launch_application(&bundle_id),
            Command::CopyPath(text) => self.platform.set_clipboard_text(&text),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn channel(&self) -> &CommandChannel<N> {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::RecordingNotifier;
    use crate::protocol::{Envelope, Notification};
    use crate::store::ConfigStore;
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;

    #[derive(Default)]
    struct RecordingPlatform {
        calls: RefCell<Vec<String>>,
    }

    impl Platform for RecordingPlatform {
        fn open_url(&self, url: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("url {url}"));
            Ok(())
        }

        fn launch_application(&self, bundle_id: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("launch {bundle_id}"));
            Ok(())
        }

        fn set_clipboard_text(&self, text: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("clip {text}"));
            Ok(())
        }
    }

    struct Fixture {
        _store_dir: tempfile::TempDir,
        store: ConfigStore,
        dispatcher: CommandDispatcher<RecordingPlatform, RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let store_dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(store_dir.path(), "finderplus_").unwrap();
        let channel = CommandChannel::new(store.clone(), RecordingNotifier::default());
        let dispatcher = CommandDispatcher::new(Config::default(), channel, RecordingPlatform::default());
        Fixture { _store_dir: store_dir, store, dispatcher }
    }

    fn open_entry(category: AppCategory) -> MenuItem {
        let mut entry = MenuItem::new("Open with Application", "square.grid.2x2", Action::Open);
        entry.app_bundle_id = Some("dev.zed.Zed".into());
        entry.app_name = Some("Zed".into());
        entry.app_category = Some(category);
        entry
    }

    fn three_files() -> (tempfile::TempDir, PathBuf, FinderSelection) {
        let dir = tempfile::tempdir().unwrap();
        let x = dir.path().join("x");
        fs::create_dir(&x).unwrap();
        let items: Vec<PathBuf> = ["a", "b", "c"].iter().map(|n| x.join(n)).collect();
        for item in &items {
            fs::write(item, b"").unwrap();
        }
        (dir, x, FinderSelection::new(items, None))
    }

    fn s(p: &std::path::Path) -> String {
        p.to_string_lossy().into_owned()
    }

    #[test]
    fn editor_gets_folder_and_every_item() {
        let f = fixture();
        let (_dir, x, selection) = three_files();
        f.dispatcher.dispatch(&open_entry(AppCategory::Editor), &selection);

        let payload: Envelope<Vec<String>> = f.store.get("openTarget").unwrap().unwrap();
        assert_eq!(
            payload.value,
            vec![
                "dev.zed.Zed".to_string(),
                s(&x),
                s(&x.join("a")),
                s(&x.join("b")),
                s(&x.join("c"))
            ]
        );
        assert_eq!(
            *f.dispatcher.channel().notifier().posted.borrow(),
            vec![Notification::OpenWithRequested]
        );
    }

    #[test]
    fn terminal_gets_only_the_folder() {
        let f = fixture();
        let (_dir, x, selection) = three_files();
        f.dispatcher.dispatch(&open_entry(AppCategory::Terminal), &selection);

        let payload: Envelope<Vec<String>> = f.store.get("openTarget").unwrap().unwrap();
        assert_eq!(payload.value, vec!["dev.zed.Zed".to_string(), s(&x)]);
    }

    #[test]
    fn new_file_without_folder_writes_nothing() {
        let f = fixture();
        let entry = MenuItem::template(Action::New);
        f.dispatcher.dispatch(&entry, &FinderSelection::default());

        assert!(f.store.get::<Envelope<String>>("target").unwrap().is_none());
        assert!(f.dispatcher.channel().notifier().posted.borrow().is_empty());
        assert!(matches!(
            f.dispatcher.try_dispatch(&entry, &FinderSelection::default()),
            Err(Error::NoTargetFolder)
        ));
    }

    #[test]
    fn new_file_targets_the_window_folder() {
        let f = fixture();
        let selection = FinderSelection::new(vec![], Some(PathBuf::from("/Users/me/Desktop")));
        f.dispatcher.dispatch(&MenuItem::template(Action::New), &selection);

        let payload: Envelope<String> = f.store.get("target").unwrap().unwrap();
        assert_eq!(payload.value, "/Users/me/Desktop");
        assert_eq!(
            *f.dispatcher.channel().notifier().posted.borrow(),
            vec![Notification::CreateFileRequested]
        );
    }

    #[test]
    fn search_uses_only_the_current_folder() {
        let f = fixture();
        let selection = FinderSelection::new(
            vec![PathBuf::from("/tmp/x/a"), PathBuf::from("/tmp/x/b")],
            Some(PathBuf::from("/tmp/x")),
        );
        f.dispatcher.dispatch(&MenuItem::template(Action::Search), &selection);
        assert_eq!(
            *f.dispatcher.platform().calls.borrow(),
            vec!["url hapigo://open?extensionID=FILE&query=/tmp/x".to_string()]
        );
        assert_eq!(url_for("raycast", "/tmp/x"), "raycast://file/tmp/x");
    }

    #[test]
    fn copy_path_joins_with_newlines() {
        let f = fixture();
        let selection = FinderSelection::new(vec![PathBuf::from("/a b/c"), PathBuf::from("/d")], None);
        f.dispatcher.dispatch(&MenuItem::template(Action::CopyPath), &selection);
        assert_eq!(*f.dispatcher.platform().calls.borrow(), vec!["clip /a b/c\n/d".to_string()]);
    }

    #[test]
    fn show_launches_the_sibling_app() {
        let f = fixture();
        f.dispatcher.dispatch(&MenuItem::about(), &FinderSelection::default());
        assert_eq!(
            *f.dispatcher.platform().calls.borrow(),
            vec!["launch com.0x401.FinderPlus".to_string()]
        );
    }

    #[test]
    fn unbound_open_and_bad_tags_are_no_ops() {
        let f = fixture();
        let (_dir, _x, selection) = three_files();
        let unbound = MenuItem::template(Action::Open);
        f.dispatcher.dispatch(&unbound, &selection);
        f.dispatcher.activate(&[unbound], 7, &selection);

        assert!(f.store.get::<Envelope<Vec<String>>>("openTarget").unwrap().is_none());
        assert!(f.dispatcher.platform().calls.borrow().is_empty());
        assert!(f.dispatcher.channel().notifier().posted.borrow().is_empty());
    }

    #[test]
    fn activate_routes_by_tag() {
        let f = fixture();
        let entries = vec![MenuItem::template(Action::CopyPath), MenuItem::about()];
        f.dispatcher.activate(&entries, 1, &FinderSelection::default());
        assert_eq!(
            *f.dispatcher.platform().calls.borrow(),
            vec!["launch com.0x401.FinderPlus".to_string()]
        );
    }
}
