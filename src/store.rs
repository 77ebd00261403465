use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};
use crate::model::DailyBaseline;

/// Typed get/set over the single persisted baseline record.
pub trait BaselineStore: Send + Sync {
    /// `None` when nothing usable is stored.
    fn load(&self) -> Option<DailyBaseline>;
    fn save(&self, baseline: &DailyBaseline) -> Result<()>;
}

/// One JSON record on disk.
pub struct FileBaselineStore {
    path: PathBuf,
}

impl FileBaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BaselineStore for FileBaselineStore {
    fn load(&self) -> Option<DailyBaseline> {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "cannot read baseline: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(b) => Some(b),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "ignoring malformed baseline: {}", e);
                None
            }
        }
    }

    fn save(&self, baseline: &DailyBaseline) -> Result<()> {
        let json = serde_json::to_vec_pretty(baseline)
            .map_err(|e| MonitorError::Store(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| MonitorError::Store(e.to_string()))?;
        }
        // write-then-rename so a crash never leaves a half-written record
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| MonitorError::Store(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| MonitorError::Store(e.to_string()))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBaselineStore {
    slot: Mutex<Option<DailyBaseline>>,
}

impl MemoryBaselineStore {
    pub fn with(baseline: DailyBaseline) -> Self {
        Self {
            slot: Mutex::new(Some(baseline)),
        }
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn load(&self) -> Option<DailyBaseline> {
        *self.slot.lock()
    }

    fn save(&self, baseline: &DailyBaseline) -> Result<()> {
        *self.slot.lock() = Some(*baseline);
        Ok(())
    }
}

impl<T: BaselineStore + ?Sized> BaselineStore for std::sync::Arc<T> {
    fn load(&self) -> Option<DailyBaseline> {
        (**self).load()
    }

    fn save(&self, baseline: &DailyBaseline) -> Result<()> {
        (**self).save(baseline)
    }
}
