//! View materializer: (re)creates the derived analytics views.
//!
//! The built-in definitions ship in `sql/views/` and are compiled into the
//! binary. A directory of `*.sql` files can replace them; each file's stem
//! becomes the view name.

use std::fs;
use std::path::Path;

use duckdb::Connection;
use tracing::{info, warn};

use crate::error::{PipelineError, ViewError};
use crate::loader::{CommitHook, LoadSummary};
use crate::schema::SCHEMA_NAME;

const BUILTIN_VIEWS: &[(&str, &str)] = &[
    ("top_customers", include_str!("../../sql/views/top_customers.sql")),
    ("top_spenders", include_str!("../../sql/views/top_spenders.sql")),
    ("top_weeks_revenue", include_str!("../../sql/views/top_weeks_revenue.sql")),
    ("top_weeks_orders", include_str!("../../sql/views/top_weeks_orders.sql")),
    ("top_fuel_revenue", include_str!("../../sql/views/top_fuel_revenue.sql")),
];

/// A named `SELECT` to expose as `analytics.<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    pub name: String,
    pub query: String,
}

impl ViewDefinition {
    /// Trims the query and strips one trailing `;`. Empty queries give `None`.
    pub fn new(name: impl Into<String>, query: &str) -> Option<Self> {
        let trimmed = query.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            name: name.into(),
            query: trimmed.to_string(),
        })
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.\"{}\"", SCHEMA_NAME, self.name.replace('"', "\"\""))
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP VIEW IF EXISTS {}", self.qualified_name())
    }

    pub fn create_sql(&self) -> String {
        format!("CREATE VIEW {} AS\n{}", self.qualified_name(), self.query)
    }
}

pub fn builtin_views() -> Vec<ViewDefinition> {
    BUILTIN_VIEWS
        .iter()
        .filter_map(|(name, sql)| ViewDefinition::new(*name, sql))
        .collect()
}

/// Every non-empty `*.sql` file in `dir`, sorted by name
pub fn load_view_dir(dir: &Path) -> Result<Vec<ViewDefinition>, ViewError> {
    let pattern = format!("{}/*.sql", glob::Pattern::escape(&dir.to_string_lossy()));

    let mut views = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry.map_err(|e| ViewError::Read {
            path: e.path().to_path_buf(),
            source: std::io::Error::from(e),
        })?;
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let sql = fs::read_to_string(&path).map_err(|source| ViewError::Read {
            path: path.clone(),
            source,
        })?;
        match ViewDefinition::new(name, &sql) {
            Some(view) => views.push(view),
            None => warn!(file = %path.display(), "skipping empty view definition"),
        }
    }

    if views.is_empty() {
        return Err(ViewError::Empty(dir.to_path_buf()));
    }
    views.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(views)
}

/// Creates or replaces a fixed set of views
#[derive(Debug, Clone)]
pub struct ViewMaterializer {
    views: Vec<ViewDefinition>,
}

impl ViewMaterializer {
    pub fn new(views: Vec<ViewDefinition>) -> Self {
        Self { views }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_views())
    }

    /// Definitions from `dir` when given, the built-ins otherwise
    pub fn from_dir(dir: Option<&Path>) -> Result<Self, ViewError> {
        match dir {
            Some(dir) => Ok(Self::new(load_view_dir(dir)?)),
            None => Ok(Self::builtin()),
        }
    }

    pub fn view_names(&self) -> Vec<String> {
        self.views.iter().map(|v| v.name.clone()).collect()
    }

    /// Drop and recreate every view in one transaction.
    ///
    /// The first failing view aborts the whole set; previously existing
    /// views are left as they were.
    pub fn materialize(&self, conn: &mut Connection) -> Result<Vec<String>, ViewError> {
        let tx = conn.transaction().map_err(|source| ViewError::Engine {
            context: "failed to begin view transaction".to_string(),
            source,
        })?;

        tx.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA_NAME))
            .map_err(|source| ViewError::Engine {
                context: "failed to create analytics schema".to_string(),
                source,
            })?;

        for view in &self.views {
            tx.execute_batch(&view.drop_sql())
                .and_then(|_| tx.execute_batch(&view.create_sql()))
                .map_err(|source| ViewError::Create {
                    name: view.qualified_name(),
                    source,
                })?;
        }

        tx.commit().map_err(|source| ViewError::Engine {
            context: "failed to commit views".to_string(),
            source,
        })?;

        let names = self.view_names();
        info!(count = names.len(), "materialized views");
        Ok(names)
    }
}

impl CommitHook for ViewMaterializer {
    fn name(&self) -> &str {
        "views"
    }

    fn on_commit(&self, conn: &mut Connection, _summary: &LoadSummary) -> Result<(), PipelineError> {
        self.materialize(conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::loader::LoadCoordinator;
    use crate::store::Store;
    use chrono::NaiveDate;
    use station_datagen::{DateWindow, EntityCounts, GenerationConfig, Generator, KeyOffsets};
    use tempfile::TempDir;

    fn loaded_store() -> Store {
        let config = GenerationConfig::new(
            EntityCounts {
                customers: 20,
                fuel_types: 3,
                stations: 2,
                products: 4,
                trailers: 2,
                orders: 150,
            },
            DateWindow {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            },
            Some(8),
        );
        let data = Generator::new(config).unwrap().generate(8, KeyOffsets::default()).unwrap();
        let mut store = Store::open_in_memory().unwrap();
        LoadCoordinator::new(&mut store).load(&data, RunMode::Replace).unwrap();
        store
    }

    #[test]
    fn test_definition_normalization() {
        let view = ViewDefinition::new("v", "  SELECT 1;\n").unwrap();
        assert_eq!(view.query, "SELECT 1");
        assert_eq!(view.create_sql(), "CREATE VIEW analytics.\"v\" AS\nSELECT 1");
        assert!(ViewDefinition::new("empty", " ;\n").is_none());
    }

    #[test]
    fn test_builtin_views_present() {
        let names = ViewMaterializer::builtin().view_names();
        assert_eq!(
            names,
            vec![
                "top_customers",
                "top_spenders",
                "top_weeks_revenue",
                "top_weeks_orders",
                "top_fuel_revenue"
            ]
        );
    }

    #[test]
    fn test_builtin_views_query_loaded_data() {
        let mut store = loaded_store();
        ViewMaterializer::builtin()
            .materialize(store.connection_mut())
            .unwrap();

        for name in ViewMaterializer::builtin().view_names() {
            let result = store
                .query(&format!("SELECT * FROM analytics.{}", name))
                .unwrap();
            assert!(!result.is_empty(), "{} is empty", name);
        }
        assert_eq!(store.view_names().unwrap().len(), 5);
    }

    #[test]
    fn test_materialize_is_repeatable() {
        let mut store = loaded_store();
        let views = ViewMaterializer::builtin();
        views.materialize(store.connection_mut()).unwrap();
        views.materialize(store.connection_mut()).unwrap();
        assert_eq!(store.view_names().unwrap().len(), 5);
    }

    #[test]
    fn test_view_dir_override() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b_orders.sql"), "SELECT COUNT(*) AS n FROM analytics.fct_orders;").unwrap();
        fs::write(dir.path().join("a_blank.sql"), "\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not sql").unwrap();

        let views = load_view_dir(dir.path()).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "b_orders");

        let empty = TempDir::new().unwrap();
        assert!(matches!(load_view_dir(empty.path()), Err(ViewError::Empty(_))));
    }

    #[test]
    fn test_unreadable_view_file_names_its_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a_orders.sql"), "SELECT 1").unwrap();
        // Matches the pattern but cannot be read as a file
        fs::create_dir(dir.path().join("b_nested.sql")).unwrap();

        let err = load_view_dir(dir.path()).unwrap_err();
        assert!(
            matches!(err, ViewError::Read { ref path, .. } if path.ends_with("b_nested.sql")),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("b_nested.sql"));
    }

    #[test]
    fn test_broken_view_names_itself_and_keeps_old_views() {
        let mut store = loaded_store();
        ViewMaterializer::builtin()
            .materialize(store.connection_mut())
            .unwrap();

        let broken = ViewMaterializer::new(vec![
            ViewDefinition::new("top_customers", "SELECT 1 AS x").unwrap(),
            ViewDefinition::new("broken", "SELECT nope FROM analytics.missing_table").unwrap(),
        ]);
        let err = broken.materialize(store.connection_mut()).unwrap_err();
        assert!(matches!(err, ViewError::Create { ref name, .. } if name.contains("broken")));

        let result = store.query("SELECT * FROM analytics.top_customers").unwrap();
        assert!(result.columns.contains(&"full_name".to_string()));
    }
}
