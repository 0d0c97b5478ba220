//! Shared key/value store visible to every FinderPlus process.
//!
//! Each key lives in its own JSON file under the shared directory, so a
//! single-key write is atomic (temp file + rename) while writes to different
//! keys never clobber each other. There is no cross-key transaction: the last
//! writer of a key wins.
//!
//! Subscriptions only observe writes made through this process's handles.
//! Another process learns about a change by reading the key again.

use crate::error::Result;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(&str) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    key: String,
    callback: Callback,
}

struct Inner {
    dir: PathBuf,
    prefix: String,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<Inner>,
}

impl ConfigStore {
    pub fn open(dir: impl Into<PathBuf>, prefix: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!("ConfigStore: opened {:?} with prefix {}", dir, prefix);
        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                prefix: prefix.to_string(),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.inner.dir.join(format!("{}{}.json", self.inner.prefix, key))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let content = match fs::read_to_string(self.key_path(key)) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.key_path(key);
        let tmp = self.inner.dir.join(format!(
            ".{}{}.{}.tmp",
            self.inner.prefix,
            key,
            std::process::id()
        ));
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        self.notify(key);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.notify(key);
        Ok(())
    }

    /// Registers `callback` to run after every in-process write of `key`.
    /// Callbacks run without the subscriber list locked, so they may write to
    /// the store or change subscriptions themselves.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subs) = self.inner.subscribers.lock() {
            subs.push(Subscriber {
                id,
                key: key.to_string(),
                callback: Arc::new(callback),
            });
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut subs) = self.inner.subscribers.lock() {
            subs.retain(|s| s.id != id);
        }
    }

    fn notify(&self, key: &str) {
        let callbacks: Vec<Callback> = match self.inner.subscribers.lock() {
            Ok(subs) => subs
                .iter()
                .filter(|s| s.key == key)
                .map(|s| s.callback.clone())
                .collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(key);
        }
    }
}
