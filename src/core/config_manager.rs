use crate::app::config::CircecoConfig;
use anyhow::{Context, Error, bail};
use parking_lot::{RwLock, RwLockReadGuard};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Owns the loaded config file. Loaded once at startup, reads hand
/// out guards so a later reload can swap the contents in place.
pub struct ConfigManager {
    path: PathBuf,
    cfg: RwLock<CircecoConfig>,
    started: AtomicBool,
}

impl ConfigManager {
    pub fn new(cfg_path: PathBuf) -> ConfigManager {
        ConfigManager {
            path: cfg_path,
            cfg: RwLock::new(CircecoConfig::default()),
            started: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reload(&self) -> Result<(), Error> {
        let cfg = CircecoConfig::load(&self.path)
            .with_context(|| format!("loading config from {}", self.path.display()))?;
        *self.cfg.write() = cfg;

        Ok(())
    }

    pub fn start(&self) -> Result<(), Error> {
        self.reload()?;
        self.started.store(true, Ordering::Release);

        Ok(())
    }

    /// Read access to the current config, errors before [`Self::start`]
    pub fn get(&self) -> Result<RwLockReadGuard<'_, CircecoConfig>, Error> {
        if !self.started.load(Ordering::Acquire) {
            bail!("Config read before it was loaded");
        }

        Ok(self.cfg.read())
    }
}
