use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use indexmap::IndexMap;
use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;
use worldsync_element_core::{codec, json, CodecError, Element, MapType};

/// Called with `(section, key, value)` when a watched item changes.
pub type SettingChanged = Arc<dyn Fn(&str, &str, &Element) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode config {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("invalid JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: json::JsonError,
    },
    #[error("config root must be a map of sections, found {found}")]
    NotAMap { found: &'static str },
}

struct Subscription {
    section: String,
    key: String,
    on_changed: SettingChanged,
}

#[derive(Default)]
struct Inner {
    sections: Mutex<IndexMap<String, MapType>>,
    listeners: Mutex<HashMap<u64, Subscription>>,
    next_listener: AtomicU64,
}

/// Shared configuration store. Clones are handles to the same store.
#[derive(Clone, Default)]
pub struct ConfigService {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigService")
            .field("sections", &self.inner.sections.lock().len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_value(&self, section: &str, key: &str) -> Option<Element> {
        self.inner
            .sections
            .lock()
            .get(section)
            .and_then(|s| s.get(key))
            .cloned()
    }

    pub fn item_exists(&self, section: &str, key: &str) -> bool {
        self.inner
            .sections
            .lock()
            .get(section)
            .is_some_and(|s| s.contains_key(key))
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.inner.sections.lock().contains_key(section)
    }

    /// Store `value` and notify listeners on `section.key`.
    /// Returns the value it replaced.
    pub fn set_value(
        &self,
        section: &str,
        key: &str,
        value: impl Into<Element>,
    ) -> Option<Element> {
        let value = value.into();
        let previous = self
            .inner
            .sections
            .lock()
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        self.notify(section, key, &value);
        previous
    }

    /// Remove `section.key` without notifying anyone.
    pub fn remove_value(&self, section: &str, key: &str) -> Option<Element> {
        let mut sections = self.inner.sections.lock();
        let removed = sections.get_mut(section)?.shift_remove(key);
        if sections.get(section).is_some_and(MapType::is_empty) {
            sections.shift_remove(section);
        }
        removed
    }

    /// Load a `section -> key -> value` map, notifying as each item is set.
    /// Sections that are not maps are skipped. Returns how many items were set.
    pub fn apply(&self, values: &MapType) -> usize {
        let mut applied = 0;
        for (section, items) in values {
            let Some(items) = items.as_map() else {
                warn!(
                    "config section {section} is a {}, not a map; skipping",
                    items.kind().as_str()
                );
                continue;
            };
            for (key, value) in items {
                self.set_value(section, key, value.clone());
                applied += 1;
            }
        }
        applied
    }

    /// Read a config file (JSON for `.json`, the tagged text format otherwise)
    /// and [`apply`](Self::apply) it.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let root = if is_json {
            let text = fs::read_to_string(path).map_err(io_err)?;
            json::parse_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            let file = File::open(path).map_err(io_err)?;
            codec::decode_reader(BufReader::new(file))
                .map_err(|source| ConfigError::Codec {
                    path: path.to_path_buf(),
                    source,
                })?
                .unwrap_or_default()
        };
        let values = root.as_map().ok_or(ConfigError::NotAMap {
            found: root.kind().as_str(),
        })?;
        let applied = self.apply(values);
        debug!("loaded {applied} config items from {}", path.display());
        Ok(applied)
    }

    /// Every section as one map element.
    pub fn to_element(&self) -> Element {
        self.inner
            .sections
            .lock()
            .iter()
            .map(|(name, items)| (name.clone(), Element::Map(items.clone())))
            .collect()
    }

    /// Watch `section.key`. The subscription ends when the returned listener
    /// is dropped.
    pub fn register<F>(&self, section: &str, key: &str, on_changed: F) -> ConfigListener
    where
        F: Fn(&str, &str, &Element) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(
            id,
            Subscription {
                section: section.to_string(),
                key: key.to_string(),
                on_changed: Arc::new(on_changed),
            },
        );
        ConfigListener {
            id,
            section: section.to_string(),
            key: key.to_string(),
            service: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn notify(&self, section: &str, key: &str, value: &Element) {
        // Callbacks run unlocked so they may read or set values themselves.
        let mut matching: Vec<(u64, SettingChanged)> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|(_, s)| s.section == section && s.key == key)
            .map(|(id, s)| (*id, s.on_changed.clone()))
            .collect();
        matching.sort_by_key(|(id, _)| *id);
        for (_, on_changed) in matching {
            on_changed(section, key, value);
        }
    }
}

/// Subscription to one config item. Dropping it unsubscribes.
pub struct ConfigListener {
    id: u64,
    section: String,
    key: String,
    service: Weak<Inner>,
}

impl fmt::Debug for ConfigListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigListener")
            .field("section", &self.section)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ConfigListener {
    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fire the callback now if the item has a value. Returns whether it fired.
    pub fn evaluate(&self) -> bool {
        let Some(inner) = self.service.upgrade() else {
            return false;
        };
        let value = inner
            .sections
            .lock()
            .get(&self.section)
            .and_then(|s| s.get(&self.key))
            .cloned();
        let Some(value) = value else {
            return false;
        };
        let on_changed = inner
            .listeners
            .lock()
            .get(&self.id)
            .map(|s| s.on_changed.clone());
        match on_changed {
            Some(on_changed) => {
                on_changed(&self.section, &self.key, &value);
                true
            }
            None => false,
        }
    }
}

impl Drop for ConfigListener {
    fn drop(&mut self) {
        if let Some(inner) = self.service.upgrade() {
            inner.listeners.lock().remove(&self.id);
        }
    }
}
