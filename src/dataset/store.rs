// src/dataset/store.rs
use anyhow::{anyhow, Result};
use std::sync::{Arc, RwLock};
use tracing::info;

use super::{load_source, Dataset, LoadOptions};

/// Holds the current dataset. Readers take an `Arc` snapshot; `reload` parses
/// the source again and swaps the snapshot in one step.
pub struct DatasetStore {
    source: String,
    opts: LoadOptions,
    current: RwLock<Arc<Dataset>>,
}

impl DatasetStore {
    /// Load `source` once and keep it.
    pub fn open(source: impl Into<String>, opts: LoadOptions) -> Result<Self> {
        let source = source.into();
        let dataset = load_source(&source, &opts)?;
        Ok(Self {
            source,
            opts,
            current: RwLock::new(Arc::new(dataset)),
        })
    }

    /// Wrap an already built dataset; `reload` will read `source`.
    pub fn with_dataset(source: impl Into<String>, opts: LoadOptions, dataset: Dataset) -> Self {
        Self {
            source: source.into(),
            opts,
            current: RwLock::new(Arc::new(dataset)),
        }
    }

    pub fn snapshot(&self) -> Arc<Dataset> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read the source. On failure the previous dataset stays in place.
    pub fn reload(&self) -> Result<Arc<Dataset>> {
        let fresh = Arc::new(load_source(&self.source, &self.opts)?);
        let mut guard = self
            .current
            .write()
            .map_err(|_| anyhow!("dataset lock poisoned"))?;
        *guard = Arc::clone(&fresh);
        info!(
            records = fresh.len(),
            fields = fresh.fields().len(),
            "dataset reloaded"
        );
        Ok(fresh)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}
