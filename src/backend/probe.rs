//! # Free-Space Oracle
//!
//! Storages derive their availability from this probe. Probing is read-only
//! and must not be serialized behind storage locks.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Remaining capacity of the medium backing `path`.
///
/// `None` or a negative value means the path is not monitored.
pub trait FreeSpaceProbe: Send + Sync + fmt::Debug {
    fn free_space(&self, path: &Path) -> Option<i64>;
}

/// Probe that monitors nothing. Storages fall back to the optimistic default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnmonitoredFreeSpace;

impl FreeSpaceProbe for UnmonitoredFreeSpace {
    fn free_space(&self, _path: &Path) -> Option<i64> {
        None
    }
}

/// Probe answering from a settable table, used by operators that feed
/// capacity from an external monitor and by tests.
#[derive(Debug, Default)]
pub struct FixedFreeSpace {
    values: RwLock<HashMap<PathBuf, i64>>,
}

impl FixedFreeSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the free space of `path`
    pub fn set(&self, path: impl Into<PathBuf>, bytes: i64) {
        if let Ok(mut values) = self.values.write() {
            values.insert(path.into(), bytes);
        }
    }

    /// Stop monitoring `path`
    pub fn clear(&self, path: &Path) {
        if let Ok(mut values) = self.values.write() {
            values.remove(path);
        }
    }
}

impl FreeSpaceProbe for FixedFreeSpace {
    fn free_space(&self, path: &Path) -> Option<i64> {
        self.values.read().ok()?.get(path).copied()
    }
}
