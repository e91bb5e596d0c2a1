use std::path::{Path, PathBuf};

use salesmind_core::config::AppConfig;

use crate::files::{read_json, write_json_atomic};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defaults when the file does not exist yet.
    pub fn load(&self) -> anyhow::Result<AppConfig> {
        match read_json::<AppConfig>(&self.path)? {
            Some(cfg) => Ok(cfg),
            None => {
                log::info!("no config at {}; using defaults", self.path.display());
                Ok(AppConfig::default())
            }
        }
    }

    pub fn save(&self, cfg: &AppConfig) -> anyhow::Result<()> {
        write_json_atomic(&self.path, cfg)
    }

    /// Where the knowledge and call collections live. Relative paths resolve against the
    /// config file's directory.
    pub fn storage_dir(&self, cfg: &AppConfig) -> PathBuf {
        match cfg.storage_dir.as_deref() {
            Some(dir) => self.resolve(dir),
            None => self.base_dir(),
        }
    }

    pub fn cue_dir(&self, cfg: &AppConfig) -> Option<PathBuf> {
        cfg.cue_dir.as_deref().map(|dir| self.resolve(dir))
    }

    fn resolve(&self, dir: &str) -> PathBuf {
        let dir = Path::new(dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.base_dir().join(dir)
        }
    }

    fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
