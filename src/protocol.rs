//! Extension → helper command protocol.
//!
//! A command is a payload written to a single-slot mailbox key in the shared
//! store followed by a content-free signal to the helper. Signals carry no
//! data and are only seen by a helper that is already running. Each mailbox
//! record carries a sequence number so the helper can tell a payload it has
//! already executed from a fresh one; a payload overwritten before the helper
//! reads it is still lost.
//!
//! The helper holds an exclusive lock on its pidfile for as long as it runs.
//! A pidfile nobody has locked was left behind by a helper that died, and its
//! pid may already belong to an unrelated process, so it is never signalled.

use crate::error::{Error, Result};
use crate::store::ConfigStore;
use chrono::Utc;
use fs2::FileExt;
use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, SigSet, Signal};
use nix::unistd::Pid;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;

pub const PIDFILE_NAME: &str = "helper.pid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notification {
    OpenWithRequested,
    CreateFileRequested,
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::OpenWithRequested => "FinderPlusOpenWithT",
            Notification::CreateFileRequested => "FinderPlusCreateNewFile",
        }
    }

    pub fn mailbox_key(&self) -> &'static str {
        match self {
            Notification::OpenWithRequested => "openTarget",
            Notification::CreateFileRequested => "target",
        }
    }

    fn signal(&self) -> Signal {
        match self {
            Notification::OpenWithRequested => Signal::SIGUSR1,
            Notification::CreateFileRequested => Signal::SIGUSR2,
        }
    }

    fn from_signal(signal: Signal) -> Option<Self> {
        match signal {
            Signal::SIGUSR1 => Some(Notification::OpenWithRequested),
            Signal::SIGUSR2 => Some(Notification::CreateFileRequested),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub seq: u64,
    /// Milliseconds since the epoch.
    pub issued_at: i64,
    pub value: T,
}

pub trait Notifier {
    fn post(&self, notification: Notification) -> Result<()>;
}

/// Delivers notifications as signals to the pid the helper published.
pub struct SignalNotifier {
    pidfile: PathBuf,
}

impl SignalNotifier {
    pub fn new(store_dir: &Path) -> Self {
        Self { pidfile: store_dir.join(PIDFILE_NAME) }
    }
}

/// Pid of the running helper, if the pidfile is locked by one.
fn live_pid(pidfile: &Path) -> Option<i32> {
    let file = File::open(pidfile).ok()?;
    match FileExt::try_lock_shared(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            debug!("protocol: {:?} is not locked, helper is gone", pidfile);
            return None;
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => {}
        Err(e) => {
            warn!("protocol: cannot check lock on {:?}: {}", pidfile, e);
            return None;
        }
    }
    let pid: i32 = fs::read_to_string(pidfile).ok()?.trim().parse().ok()?;
    // 0 and negative pids address process groups.
    (pid > 0).then_some(pid)
}

impl Notifier for SignalNotifier {
    fn post(&self, notification: Notification) -> Result<()> {
        let pid = live_pid(&self.pidfile).ok_or(Error::NoListener(notification.name()))?;
        match kill(Pid::from_raw(pid), notification.signal()) {
            Ok(()) => {
                debug!("protocol: posted {} to {}", notification.name(), pid);
                Ok(())
            }
            Err(Errno::ESRCH) => Err(Error::NoListener(notification.name())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Sending half, used by the extension.
pub struct CommandChannel<N> {
    store: ConfigStore,
    notifier: N,
}

impl<N: Notifier> CommandChannel<N> {
    pub fn new(store: ConfigStore, notifier: N) -> Self {
        Self { store, notifier }
    }

    fn write<T: Serialize>(&self, notification: Notification, value: &T) -> Result<u64> {
        let key = notification.mailbox_key();
        let previous = match self.store.get::<Envelope<serde_json::Value>>(key) {
            Ok(envelope) => envelope.map(|e| e.seq).unwrap_or(0),
            Err(e) => {
                warn!("protocol: unreadable mailbox {}, restarting at seq 1: {}", key, e);
                0
            }
        };
        let seq = previous + 1;
        let envelope = Envelope { seq, issued_at: Utc::now().timestamp_millis(), value };
        self.store.set(key, &envelope)?;
        Ok(seq)
    }

    /// `args` is `[bundleID, paths...]`.
    pub fn request_open_with(&self, args: &[String]) -> Result<u64> {
        let seq = self.write(Notification::OpenWithRequested, &args)?;
        self.notifier.post(Notification::OpenWithRequested)?;
        Ok(seq)
    }

    pub fn request_create_file(&self, folder: &str) -> Result<u64> {
        let seq = self.write(Notification::CreateFileRequested, &folder)?;
        self.notifier.post(Notification::CreateFileRequested)?;
        Ok(seq)
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

/// Receiving half, owned by the helper.
pub struct MailboxReader {
    store: ConfigStore,
    /// `(seq, issued_at)` of the last executed payload per mailbox.
    last_seen: HashMap<Notification, (u64, i64)>,
}

impl MailboxReader {
    pub fn new(store: ConfigStore) -> Self {
        Self { store, last_seen: HashMap::new() }
    }

    /// Reads the mailbox for `notification`. Returns `None` if it is empty or
    /// holds a payload that was already executed.
    pub fn take<T: DeserializeOwned>(&mut self, notification: Notification) -> Result<Option<T>> {
        let key = notification.mailbox_key();
        let Some(envelope) = self.store.get::<Envelope<T>>(key)? else {
            warn!("protocol: {} received but mailbox {} is empty", notification.name(), key);
            return Ok(None);
        };

        if let Some(&(last, last_issued)) = self.last_seen.get(&notification) {
            if envelope.seq <= last {
                if envelope.issued_at <= last_issued {
                    warn!("protocol: {} seq {} already handled, skipping", notification.name(), envelope.seq);
                    return Ok(None);
                }
                info!("protocol: mailbox {} restarted at seq {}", key, envelope.seq);
            } else if envelope.seq > last + 1 {
                warn!(
                    "protocol: {} skipped {} superseded command(s)",
                    notification.name(),
                    envelope.seq - last - 1
                );
            }
        }

        self.last_seen.insert(notification, (envelope.seq, envelope.issued_at));
        Ok(Some(envelope.value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperEvent {
    Notification(Notification),
    Shutdown,
}

/// Exclusive lock on the pidfile, held for the helper's lifetime.
pub struct PidLock {
    path: PathBuf,
    file: File,
}

impl PidLock {
    pub fn acquire(store_dir: &Path) -> Result<Self> {
        let path = store_dir.join(PIDFILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(Error::AlreadyRunning(path));
        }
        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Self { path, file })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        let _ = FileExt::unlock(&self.file);
    }
}

/// Standing subscription to both notifications. Blocks the signals on the
/// calling thread (call before spawning other threads), publishes the pid and
/// forwards every delivery into `tx`.
pub struct SignalListener {
    _pid: PidLock,
}

impl SignalListener {
    pub fn install(store_dir: &Path, tx: calloop::channel::Sender<HelperEvent>) -> Result<Self> {
        let mut mask = SigSet::empty();
        for signal in [Signal::SIGUSR1, Signal::SIGUSR2, Signal::SIGTERM, Signal::SIGINT] {
            mask.add(signal);
        }
        mask.thread_block()?;

        let pid = PidLock::acquire(store_dir)?;
        info!("protocol: listening as pid {} ({:?})", std::process::id(), pid.path);

        thread::spawn(move || loop {
            let signal = match mask.wait() {
                Ok(s) => s,
                Err(e) => {
                    error!("protocol: sigwait failed: {}", e);
                    let _ = tx.send(HelperEvent::Shutdown);
                    break;
                }
            };
            let event = match Notification::from_signal(signal) {
                Some(n) => HelperEvent::Notification(n),
                None => HelperEvent::Shutdown,
            };
            if tx.send(event).is_err() || event == HelperEvent::Shutdown {
                break;
            }
        });

        Ok(Self { _pid: pid })
    }
}
