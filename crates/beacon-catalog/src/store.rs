use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use beacon_types::{Bindings, ComparisonDefinition, WidgetDefinition, WidgetError, WidgetResult};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::entry::{CatalogDefinition, CatalogEntry, ResolvedEntry};

const WIDGETS_DIR: &str = "widgets";
const COMPARISONS_DIR: &str = "comparisons";

/// Errors raised while reading catalogue files.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalogue path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalogue file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("widget id '{widget_id}' in '{path}' is already defined")]
    DuplicateId { widget_id: String, path: PathBuf },
    #[error("catalogue file '{path}' is invalid: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: WidgetError,
    },
    #[error("definition store was not loaded from a directory")]
    NoSourceDirectory,
}

/// Counts reported after a (re)load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub widget_ids: usize,
    pub comparison_ids: usize,
    pub definitions: usize,
}

/// Immutable catalogue contents.
#[derive(Debug, Clone, Default)]
pub struct DefinitionSnapshot {
    widgets: BTreeMap<String, ResolvedEntry<WidgetDefinition>>,
    comparisons: BTreeMap<String, ResolvedEntry<ComparisonDefinition>>,
}

impl DefinitionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a widget entry, stamping its id and validating it.
    pub fn insert_widget(
        &mut self,
        widget_id: impl Into<String>,
        entry: CatalogEntry<WidgetDefinition>,
    ) -> WidgetResult<()> {
        let widget_id = widget_id.into();
        let resolved = ResolvedEntry::from_entry(&widget_id, entry)?;
        self.widgets.insert(widget_id, resolved);
        Ok(())
    }

    pub fn insert_comparison(
        &mut self,
        widget_id: impl Into<String>,
        entry: CatalogEntry<ComparisonDefinition>,
    ) -> WidgetResult<()> {
        let widget_id = widget_id.into();
        let resolved = ResolvedEntry::from_entry(&widget_id, entry)?;
        self.comparisons.insert(widget_id, resolved);
        Ok(())
    }

    pub fn widget(&self, widget_id: &str, bindings: &Bindings) -> WidgetResult<Arc<WidgetDefinition>> {
        self.widgets
            .get(widget_id)
            .ok_or_else(|| not_found(widget_id))?
            .select(widget_id, bindings)
    }

    pub fn comparison(
        &self,
        widget_id: &str,
        bindings: &Bindings,
    ) -> WidgetResult<Arc<ComparisonDefinition>> {
        self.comparisons
            .get(widget_id)
            .ok_or_else(|| not_found(widget_id))?
            .select(widget_id, bindings)
    }

    pub fn widget_ids(&self) -> impl Iterator<Item = &String> {
        self.widgets.keys()
    }

    pub fn comparison_ids(&self) -> impl Iterator<Item = &String> {
        self.comparisons.keys()
    }

    pub fn report(&self) -> ReloadReport {
        ReloadReport {
            widget_ids: self.widgets.len(),
            comparison_ids: self.comparisons.len(),
            definitions: self
                .widgets
                .values()
                .map(ResolvedEntry::definition_count)
                .sum::<usize>()
                + self
                    .comparisons
                    .values()
                    .map(ResolvedEntry::definition_count)
                    .sum::<usize>(),
        }
    }

    /// Reads `<root>/widgets/*.json` and `<root>/comparisons/*.json`.
    pub fn read_dir(root: &Path) -> Result<Self, CatalogError> {
        let mut snapshot = Self::default();
        read_entries(&root.join(WIDGETS_DIR), &mut snapshot.widgets)?;
        read_entries(&root.join(COMPARISONS_DIR), &mut snapshot.comparisons)?;
        Ok(snapshot)
    }
}

fn not_found(widget_id: &str) -> WidgetError {
    WidgetError::DefinitionNotFound {
        widget_id: widget_id.to_string(),
    }
}

fn read_entries<T>(
    dir: &Path,
    into: &mut BTreeMap<String, ResolvedEntry<T>>,
) -> Result<(), CatalogError>
where
    T: CatalogDefinition + DeserializeOwned,
{
    if !dir.exists() {
        return Ok(());
    }
    let mut files = Vec::new();
    let listing = std::fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for item in listing {
        let item = item.map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = item.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        let payload = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
            path: path.clone(),
            source,
        })?;
        let entries: BTreeMap<String, CatalogEntry<T>> =
            serde_json::from_str(&payload).map_err(|source| CatalogError::Parse {
                path: path.clone(),
                source,
            })?;
        for (widget_id, entry) in entries {
            if into.contains_key(&widget_id) {
                return Err(CatalogError::DuplicateId { widget_id, path });
            }
            let resolved =
                ResolvedEntry::from_entry(&widget_id, entry).map_err(|source| {
                    CatalogError::Invalid {
                        path: path.clone(),
                        source,
                    }
                })?;
            into.insert(widget_id, resolved);
        }
    }
    Ok(())
}

/// Process-wide, read-mostly definition store.
#[derive(Debug)]
pub struct DefinitionStore {
    snapshot: ArcSwap<DefinitionSnapshot>,
    source_dir: Option<PathBuf>,
}

impl DefinitionStore {
    pub fn from_snapshot(snapshot: DefinitionSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            source_dir: None,
        }
    }

    /// Loads the catalogue rooted at `dir`; `reload` re-reads the same path.
    pub fn load_from_dir(dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let dir = dir.into();
        let snapshot = DefinitionSnapshot::read_dir(&dir)?;
        let report = snapshot.report();
        tracing::info!(
            catalog_dir = %dir.display(),
            widget_ids = report.widget_ids,
            comparison_ids = report.comparison_ids,
            definitions = report.definitions,
            "loaded widget catalogue"
        );
        Ok(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            source_dir: Some(dir),
        })
    }

    /// Re-reads the source directory. On failure the previous snapshot stays
    /// published.
    pub fn reload(&self) -> Result<ReloadReport, CatalogError> {
        let dir = self
            .source_dir
            .as_ref()
            .ok_or(CatalogError::NoSourceDirectory)?;
        let snapshot = match DefinitionSnapshot::read_dir(dir) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(
                    catalog_dir = %dir.display(),
                    error = %error,
                    "catalogue reload failed; keeping previous snapshot"
                );
                return Err(error);
            }
        };
        let report = snapshot.report();
        self.snapshot.store(Arc::new(snapshot));
        tracing::info!(
            catalog_dir = %dir.display(),
            widget_ids = report.widget_ids,
            comparison_ids = report.comparison_ids,
            "reloaded widget catalogue"
        );
        Ok(report)
    }

    /// Publishes `snapshot` in place of the current one.
    pub fn replace(&self, snapshot: DefinitionSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn snapshot(&self) -> Arc<DefinitionSnapshot> {
        self.snapshot.load_full()
    }

    /// Resolves `widget_id` to its definition, applying variant selection.
    pub fn load(&self, widget_id: &str, bindings: &Bindings) -> WidgetResult<Arc<WidgetDefinition>> {
        self.snapshot.load().widget(widget_id, bindings)
    }

    pub fn load_comparison(
        &self,
        widget_id: &str,
        bindings: &Bindings,
    ) -> WidgetResult<Arc<ComparisonDefinition>> {
        self.snapshot.load().comparison(widget_id, bindings)
    }
}
