//! Table specifications and table-set resolution

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

static RE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)*$").expect("Invalid regex")
});

/// Check that `name` can be interpolated into SQL as a table or column name
pub fn validate_identifier(name: &str) -> bool {
    RE_IDENTIFIER.is_match(name)
}

/// Load strategy of a table set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    /// Full refresh of reference data
    Dimension,
    /// Date-windowed load of event data
    Fact,
}

impl std::str::FromStr for LoadKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dimension" => Ok(LoadKind::Dimension),
            "fact" => Ok(LoadKind::Fact),
            other => Err(PipelineError::config(format!(
                "Unknown load kind '{}'. Use 'dimension' or 'fact'.",
                other
            ))),
        }
    }
}

impl std::fmt::Display for LoadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadKind::Dimension => write!(f, "dimension"),
            LoadKind::Fact => write!(f, "fact"),
        }
    }
}

/// How a table is extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    /// Explicit query, or `SELECT * FROM <name>` when absent
    Dimension { query: Option<String> },
    /// Query template carrying date placeholders
    Fact { query_template: String },
}

/// One table of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Source table name, also used as the target table name
    pub name: String,
    pub kind: TableKind,
}

impl TableSpec {
    /// A dimension table, optionally with its own extraction query
    pub fn dimension(name: impl Into<String>, query: Option<String>) -> PipelineResult<Self> {
        let name = checked_name(name.into())?;
        let query = query.filter(|q| !q.trim().is_empty());
        Ok(Self {
            name,
            kind: TableKind::Dimension { query },
        })
    }

    /// A fact table; the query template is mandatory
    pub fn fact(name: impl Into<String>, query_template: impl Into<String>) -> PipelineResult<Self> {
        let name = checked_name(name.into())?;
        let query_template = query_template.into();
        if query_template.trim().is_empty() {
            return Err(PipelineError::config(format!(
                "Fact table '{}' requires a query",
                name
            )));
        }
        Ok(Self {
            name,
            kind: TableKind::Fact { query_template },
        })
    }

    /// Load kind this spec belongs to
    pub fn load_kind(&self) -> LoadKind {
        match self.kind {
            TableKind::Dimension { .. } => LoadKind::Dimension,
            TableKind::Fact { .. } => LoadKind::Fact,
        }
    }
}

fn checked_name(name: String) -> PipelineResult<String> {
    let name = name.trim().to_string();
    if !validate_identifier(&name) {
        return Err(PipelineError::config(format!(
            "Invalid table name '{}'",
            name
        )));
    }
    Ok(name)
}

/// Where the table set of a run comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    /// Explicit table names, with optional per-table queries
    Names {
        names: Vec<String>,
        queries: BTreeMap<String, String>,
    },
    /// A directory holding one `<table>.sql` file per table
    Directory(PathBuf),
}

/// Resolve the table specs of a run, in order
///
/// Directory entries are sorted by file name. An empty `.sql` file stands
/// for the default select-all query, which is only valid for dimensions.
pub fn resolve_tables(kind: LoadKind, source: &TableSource) -> PipelineResult<Vec<TableSpec>> {
    let pairs = match source {
        TableSource::Names { names, queries } => {
            for key in queries.keys() {
                if !names.contains(key) {
                    warn!(table = %key, "Query configured for a table that is not listed");
                }
            }
            names
                .iter()
                .map(|name| (name.clone(), queries.get(name).cloned()))
                .collect()
        }
        TableSource::Directory(dir) => read_query_dir(dir)?,
    };

    let specs = pairs
        .into_iter()
        .map(|(name, query)| match kind {
            LoadKind::Dimension => TableSpec::dimension(name, query),
            LoadKind::Fact => TableSpec::fact(name, query.unwrap_or_default()),
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    debug!(kind = %kind, tables = specs.len(), "Resolved table set");
    Ok(specs)
}

fn read_query_dir(dir: &Path) -> PipelineResult<Vec<(String, Option<String>)>> {
    if !dir.is_dir() {
        return Err(PipelineError::config(format!(
            "Query directory not found: {}",
            dir.display()
        )));
    }

    let pattern = dir.join("*.sql");
    let pattern = pattern.to_string_lossy();
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| PipelineError::config(format!("Invalid query directory: {}", e)))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut pairs = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "Skipping query file with a non UTF-8 name");
            continue;
        };
        let body = std::fs::read_to_string(&path).map_err(|e| {
            PipelineError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let body = body.trim();
        let query = (!body.is_empty()).then(|| body.to_string());
        pairs.push((name.to_string(), query));
    }
    Ok(pairs)
}
