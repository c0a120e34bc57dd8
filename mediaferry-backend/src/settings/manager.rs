//! Settings persistence and dotted-key access
//!
//! The current settings live in a `tokio::sync::watch` channel. Every
//! successful change is published to subscribers, which is how the program
//! knows to rebuild its services.

use super::models::AppSettings;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct SettingsManager {
    path: PathBuf,
    tx: watch::Sender<AppSettings>,
}

impl SettingsManager {
    /// Create a manager holding defaults; call [`load`](Self::load) to read the file
    pub fn new(path: PathBuf) -> Self {
        let (tx, _) = watch::channel(AppSettings::default());
        Self { path, tx }
    }

    /// Create a manager and load the file, writing defaults if it is missing
    pub fn open(path: PathBuf) -> Result<Self, SettingsError> {
        let manager = Self::new(path);
        manager.load()?;
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload settings from disk
    ///
    /// A missing file is created with defaults. An unparsable file is an
    /// error and leaves the current settings untouched.
    pub fn load(&self) -> Result<(), SettingsError> {
        if !self.path.exists() {
            info!("Settings file not found, writing defaults to {}", self.path.display());
            return self.save();
        }

        let content = std::fs::read_to_string(&self.path)?;
        let settings: AppSettings =
            serde_json::from_str(&content).map_err(|e| SettingsError::Parse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        self.tx.send_replace(settings);
        info!("Loaded settings from {}", self.path.display());
        Ok(())
    }

    /// Write the current settings to disk
    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*self.tx.borrow())?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Snapshot of the current settings
    pub fn current(&self) -> AppSettings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppSettings> {
        self.tx.subscribe()
    }

    fn as_value(&self) -> Value {
        // AppSettings only holds strings, numbers, bools and vectors of those
        serde_json::to_value(&*self.tx.borrow()).unwrap_or(Value::Null)
    }

    /// Value at a dotted key such as `scraping.torrentio.enabled`
    ///
    /// `all` or an empty key returns the whole tree.
    pub fn get(&self, key: &str) -> Option<Value> {
        let root = self.as_value();
        let key = key.trim();
        if key.is_empty() || key == "all" {
            return Some(root);
        }
        key.split('.')
            .try_fold(&root, |value, segment| value.get(segment))
            .cloned()
    }

    /// Several comma separated keys, returned as an object keyed by top-level key
    ///
    /// A dotted key keeps its nesting: `plex.url` yields `{"plex": {"url": ..}}`.
    pub fn get_many(&self, keys: &str) -> Result<Value, SettingsError> {
        let keys: Vec<&str> = keys.split(',').map(str::trim).filter(|k| !k.is_empty()).collect();
        if keys.is_empty() || keys.contains(&"all") {
            return Ok(self.as_value());
        }

        let mut result = Value::Object(Map::new());
        for key in keys {
            let value = self
                .get(key)
                .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
            insert_nested(&mut result, key, value);
        }
        Ok(result)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.set_many(vec![(key.to_string(), value)])
    }

    /// Apply several changes atomically
    ///
    /// Every key must already exist and the resulting tree must still
    /// deserialize into [`AppSettings`]; otherwise nothing changes.
    pub fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), SettingsError> {
        let mut tree = self.as_value();
        let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();

        for (key, value) in entries {
            set_path(&mut tree, &key, value)?;
        }

        let updated: AppSettings =
            serde_json::from_value(tree).map_err(|e| SettingsError::InvalidValue {
                key: keys.join(","),
                message: e.to_string(),
            })?;

        if updated == *self.tx.borrow() {
            return Ok(());
        }

        self.tx.send_replace(updated);
        info!(keys = ?keys, "Settings updated");
        Ok(())
    }
}

fn set_path(tree: &mut Value, key: &str, value: Value) -> Result<(), SettingsError> {
    let segments: Vec<&str> = key.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;

    let mut current = tree;
    for segment in parents {
        current = current
            .get_mut(*segment)
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
    }

    match current.as_object_mut() {
        Some(object) if object.contains_key(*last) => {
            object.insert(last.to_string(), value);
            Ok(())
        }
        _ => Err(SettingsError::UnknownKey(key.to_string())),
    }
}

fn insert_nested(tree: &mut Value, key: &str, value: Value) {
    let mut segments: Vec<&str> = key.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut node = tree;
    for segment in segments {
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Value::Object(map) = node {
        map.insert(last.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> (tempfile::TempDir, SettingsManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::open(dir.path().join("settings.json")).unwrap();
        (dir, manager)
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let (dir, manager) = manager();
        assert!(dir.path().join("settings.json").exists());
        assert_eq!(manager.current(), AppSettings::default());
    }

    #[test]
    fn test_get_dotted_key() {
        let (_dir, manager) = manager();
        assert_eq!(
            manager.get("plex.url"),
            Some(json!("http://localhost:32400"))
        );
        assert_eq!(manager.get("scraping.after_2"), Some(json!(0.5)));
        assert_eq!(manager.get("plex.nope"), None);
        assert!(manager.get("all").unwrap().get("parser").is_some());
    }

    #[test]
    fn test_get_many() {
        let (_dir, manager) = manager();
        let value = manager.get_many("plex, real_debrid").unwrap();
        assert!(value.get("plex").is_some());
        assert!(value.get("real_debrid").is_some());
        assert!(value.get("symlink").is_none());

        let value = manager.get_many("debug,plex.url,plex.token").unwrap();
        assert_eq!(value["debug"], json!(false));
        assert_eq!(value["plex"]["url"], json!("http://localhost:32400"));
        assert!(value["plex"]["token"].is_string());
        assert!(value.get("plex.url").is_none());

        assert!(matches!(
            manager.get_many("plex,bogus"),
            Err(SettingsError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_notifies_subscribers() {
        let (_dir, manager) = manager();
        let mut rx = manager.subscribe();

        manager
            .set("scraping.torrentio.enabled", json!(true))
            .unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().scraping.torrentio.enabled);
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let (_dir, manager) = manager();
        let before = manager.current();
        assert!(matches!(
            manager.set("plex.nope", json!("x")),
            Err(SettingsError::UnknownKey(_))
        ));
        assert_eq!(manager.current(), before);
    }

    #[test]
    fn test_set_rejects_type_mismatch_atomically() {
        let (_dir, manager) = manager();
        let result = manager.set_many(vec![
            ("plex.token".to_string(), json!("abc")),
            ("scraping.after_2".to_string(), json!("soon")),
        ]);
        assert!(matches!(result, Err(SettingsError::InvalidValue { .. })));
        assert_eq!(manager.current().plex.token, "");
    }

    #[test]
    fn test_save_and_reload() {
        let (dir, manager) = manager();
        manager.set("symlink.library_path", json!("/mnt/library")).unwrap();
        manager.save().unwrap();

        let reopened = SettingsManager::open(dir.path().join("settings.json")).unwrap();
        assert_eq!(reopened.current().symlink.library_path, "/mnt/library");
    }

    #[test]
    fn test_invalid_file_keeps_current_settings() {
        let (dir, manager) = manager();
        manager.set("debug", json!(true)).unwrap();
        std::fs::write(dir.path().join("settings.json"), "{ not json").unwrap();

        assert!(matches!(manager.load(), Err(SettingsError::Parse { .. })));
        assert!(manager.current().debug);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"plex": {"token": "t0k3n"}, "legacy": 1}"#).unwrap();

        let manager = SettingsManager::open(path).unwrap();
        let settings = manager.current();
        assert_eq!(settings.plex.token, "t0k3n");
        assert_eq!(settings.plex.url, "http://localhost:32400");
        assert_eq!(settings.parser.language, vec!["English".to_string()]);
    }
}
