use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::kind::TestKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub user_id: String,
    pub blob_base_url: Option<String>,
    /// Last pool size picked per test kind, keyed by `TestKind::key`
    pub default_counts: BTreeMap<String, usize>,
    pub oir_minutes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: uuid::Uuid::new_v4().to_string(),
            blob_base_url: None,
            default_counts: BTreeMap::new(),
            oir_minutes: 40,
        }
    }
}

impl Config {
    pub fn default_count(&self, kind: TestKind) -> Option<usize> {
        self.default_counts.get(kind.key()).copied()
    }

    pub fn remember_count(&mut self, kind: TestKind, count: usize) {
        self.default_counts.insert(kind.key().to_string(), count);
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "parade") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("parade_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "unreadable config; using defaults")
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let mut cfg = Config {
            user_id: "cadet-7".into(),
            blob_base_url: Some("https://cdn.example.org/ssb".into()),
            default_counts: BTreeMap::new(),
            oir_minutes: 30,
        };
        cfg.remember_count(TestKind::Wat, 60);
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
        assert_eq!(loaded.default_count(TestKind::Wat), Some(60));
        assert_eq!(loaded.default_count(TestKind::Srt), None);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "user_id": "cadet-9" }"#).unwrap();
        let loaded = FileConfigStore::with_path(&path).load();
        assert_eq!(loaded.user_id, "cadet-9");
        assert_eq!(loaded.oir_minutes, 40);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"not json").unwrap();
        let loaded = FileConfigStore::with_path(&path).load();
        assert_eq!(loaded.oir_minutes, 40);
        assert!(!loaded.user_id.is_empty());
    }
}
