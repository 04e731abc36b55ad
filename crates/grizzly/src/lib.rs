//! Public API facade: wires [`grizzly_table::Database`] together with the
//! codec/index layer, lakehouse persistence, and the model dependency
//! graph + refresh scheduler into the single [`Grizzly`] entry point.

pub mod config;
pub mod telemetry;

use std::collections::HashMap;
use std::path::PathBuf;

use grizzly_dag::{DependencyGraph, PeriodicScheduler};
use grizzly_error::{GrizzlyError, Result};
use grizzly_persist::{CheckpointStore, Manifest};
use grizzly_table::{ColumnDef, Schema, Table};
use parking_lot::Mutex;
use tracing::info;

pub use config::GrizzlyConfig;
pub use grizzly_column::{Codec, Column};
pub use grizzly_dag::{extract_references, ExecutionState};
pub use grizzly_error::GrizzlyError as Error;
pub use grizzly_table::Database;
pub use grizzly_types::{DataType, RowId, Value};

/// A registered model's compiled refresh step. Receives the shared
/// database under its own short-held lock so independent models in the
/// same parallel group can each make progress (spec §5: "protect that map,
/// e.g. with a per-entry mutex or pre-allocated slots" — simplified here
/// to one coarse mutex per `Grizzly` instance rather than per-model
/// slots, since the query engine that would populate those slots is out
/// of scope for this core).
pub type ModelExecutor = Box<dyn Fn(&Mutex<Database>) -> Result<()> + Send + Sync>;

struct ModelDef {
    sql: String,
    executor: ModelExecutor,
}

/// The embedded analytical data store: tables, indexes, lakehouse
/// persistence, and dbt-style derived models behind one handle.
pub struct Grizzly {
    config: GrizzlyConfig,
    database: Mutex<Database>,
    graph: Mutex<DependencyGraph>,
    models: Mutex<HashMap<String, ModelDef>>,
    scheduler: Mutex<PeriodicScheduler>,
    checkpoint: CheckpointStore,
}

impl Grizzly {
    /// Construct a fresh, empty instance under `config`.
    #[must_use]
    pub fn new(config: GrizzlyConfig) -> Self {
        let checkpoint = CheckpointStore::new(config.checkpoint_path.clone());
        Self {
            config,
            database: Mutex::new(Database::new()),
            graph: Mutex::new(DependencyGraph::new()),
            models: Mutex::new(HashMap::new()),
            scheduler: Mutex::new(PeriodicScheduler::new()),
            checkpoint,
        }
    }

    /// The configuration this instance was constructed with.
    #[must_use]
    pub const fn config(&self) -> &GrizzlyConfig {
        &self.config
    }

    // ---- Table surface (spec §6 exposed contracts) ----

    /// Create a new table.
    pub fn create_table(&self, name: &str, schema: Schema) -> Result<()> {
        self.database.lock().create_table(name, schema)
    }

    /// Run `f` against a table by name, returning its result. The table
    /// cannot outlive the call since the underlying lock is held only for
    /// its duration.
    pub fn with_table<R>(&self, name: &str, f: impl FnOnce(&Table) -> R) -> Result<R> {
        let db = self.database.lock();
        Ok(f(db.get_table(name)?))
    }

    /// Run `f` against a table by name with mutable access, e.g. for
    /// `insertRow`. Not part of spec §6's enumerated contract list (which
    /// only exposes `getTable`), but the query engine embedding this core
    /// needs some way to reach `Table::insert_row`; this is the natural
    /// mutable counterpart to [`Self::with_table`].
    pub fn with_table_mut<R>(&self, name: &str, f: impl FnOnce(&mut Table) -> R) -> Result<R> {
        let mut db = self.database.lock();
        Ok(f(db.get_table_mut(name)?))
    }

    /// Drop a table.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.database.lock().drop_table(name)
    }

    /// Every table name currently present.
    #[must_use]
    pub fn list_tables(&self) -> Vec<String> {
        self.database.lock().list_tables().into_iter().map(str::to_owned).collect()
    }

    /// Build a B-tree index.
    pub fn create_index(&self, table: &str, index_name: &str, column: &str) -> Result<()> {
        self.database.lock().create_index(table, index_name, column)
    }

    /// Build a composite hash index.
    pub fn create_composite_index(&self, table: &str, index_name: &str, columns: &[String]) -> Result<()> {
        self.database.lock().create_composite_index(table, index_name, columns)
    }

    // ---- Model dependency graph + refresh (spec §4.10-4.12) ----

    /// Register a derived model: its defining SQL (scanned by
    /// [`extract_references`] for `FROM`/`JOIN` targets that name an
    /// existing table or model) and the executor the surrounding query
    /// engine compiled for it.
    pub fn register_model(&self, name: &str, sql: &str, executor: ModelExecutor) {
        let known: Vec<String> = {
            let db = self.database.lock();
            let models = self.models.lock();
            db.list_tables().into_iter().map(str::to_owned).chain(models.keys().cloned()).collect()
        };
        let mut graph = self.graph.lock();
        graph.add_node(name);
        for reference in grizzly_dag::extract_references(sql) {
            if known.iter().any(|k| k == &reference) {
                graph.add_dependency(name, &reference);
            }
        }
        self.models.lock().insert(name.to_owned(), ModelDef { sql: sql.to_owned(), executor });
        info!(model = name, "model registered");
    }

    /// Refresh `name` and every transitive dependency, in topological
    /// parallel groups (spec §4.12). Returns the ids that ran, in order.
    pub fn refresh_model(&self, name: &str) -> Result<Vec<String>> {
        let graph = self.graph.lock();
        let models = self.models.lock();
        let database = &self.database;
        grizzly_dag::refresh_model(&graph, name, |model_name| {
            let def = models.get(model_name).ok_or_else(|| GrizzlyError::ModelNotFound(model_name.to_owned()))?;
            (def.executor)(database)
        })
    }

    /// Refresh a materialized view. Materialized views are registered and
    /// driven exactly like any other model; this is a naming convenience
    /// for callers that distinguish the two at the SQL-engine layer.
    pub fn refresh_materialized_view(&self, name: &str) -> Result<Vec<String>> {
        self.refresh_model(name)
    }

    /// The SQL text a registered model was defined with.
    pub fn model_sql(&self, name: &str) -> Result<String> {
        self.models.lock().get(name).map(|m| m.sql.clone()).ok_or_else(|| GrizzlyError::ModelNotFound(name.to_owned()))
    }

    /// Register a periodic schedule driving `refreshModel(model_name)`.
    pub fn add_schedule(&self, id: &str, model_name: &str, cron_expr: &str, max_retries: u32, now: i64) -> Result<()> {
        self.scheduler.lock().add_schedule(id, model_name, cron_expr, max_retries, now)
    }

    /// One wake-up of the periodic scheduler (spec §4.12: "a background
    /// thread wakes periodically, ≈ once per minute"). Callers own the
    /// actual thread/timer; this just advances the state machine.
    pub fn tick_schedules(&self, now: i64) -> Result<()> {
        let mut scheduler = self.scheduler.lock();
        scheduler.tick(now, |model_name| self.refresh_model(model_name).map(|_| ()))
    }

    // ---- Lakehouse persistence (spec §4.7-4.9) ----

    /// Persist `dbname`: a full snapshot if none exists yet at the
    /// configured data directory, otherwise an incremental delta (which
    /// may trigger compaction per [`grizzly_persist::COMPACTION_THRESHOLD`]).
    pub fn save_incremental_state(&self, dbname: &str) -> Result<()> {
        let path = self.config.snapshot_path(dbname);
        let db = self.database.lock();
        if path.exists() {
            let delta_path = self.config.data_dir.join(format!("{dbname}-{}.grzd", CheckpointStore::now()));
            match grizzly_persist::save_incremental(&db, dbname, &path, &delta_path, &self.checkpoint) {
                Ok(()) | Err(GrizzlyError::NoChanges) => Ok(()),
                Err(e) => Err(e),
            }
        } else {
            grizzly_persist::save(&db, dbname, &path, &self.checkpoint)
        }
    }

    /// Load `dbname` from its full snapshot and replay every delta listed
    /// in its manifest, in order.
    pub fn load_incremental_state(&self, dbname: &str) -> Result<()> {
        let path = self.config.snapshot_path(dbname);
        let mut loaded = grizzly_persist::load(&path)?;
        let manifest = Manifest::load(&path)?;
        for delta in &manifest.deltas {
            grizzly_persist::apply_incremental(&mut loaded, &path, &PathBuf::from(&delta.path))?;
        }
        *self.database.lock() = loaded;
        Ok(())
    }

    // ---- Database composition ----

    /// Attach another database under `alias`.
    pub fn attach_database(&self, alias: &str, other: Database) -> Result<()> {
        self.database.lock().attach_database(alias, other)
    }

    /// Detach and return the database previously attached under `alias`.
    pub fn detach_database(&self, alias: &str) -> Result<Database> {
        self.database.lock().detach_database(alias)
    }
}

/// Convenience re-export so callers can build a schema without importing
/// `grizzly-table` directly.
#[must_use]
pub fn column(name: impl Into<String>, data_type: DataType) -> ColumnDef {
    ColumnDef { name: name.into(), data_type }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn metrics_schema() -> Schema {
        vec![column("id", DataType::Int32), column("value", DataType::String)]
    }

    #[test]
    fn create_table_then_insert_via_with_table() {
        let grizzly = Grizzly::new(GrizzlyConfig::default());
        grizzly.create_table("metrics", metrics_schema()).unwrap();
        grizzly
            .with_table("metrics", |_| ())
            .unwrap();
        assert_eq!(grizzly.list_tables(), vec!["metrics".to_owned()]);
    }

    #[test]
    fn refresh_model_runs_registered_executor() {
        let grizzly = Grizzly::new(GrizzlyConfig::default());
        grizzly.create_table("orders", metrics_schema()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        grizzly.register_model(
            "daily_orders",
            "select * from orders",
            Box::new(move |_db| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let executed = grizzly.refresh_model("daily_orders").unwrap();
        assert_eq!(executed, vec!["daily_orders".to_owned()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn save_then_load_incremental_state_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GrizzlyConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.checkpoint_path = dir.path().join("checkpoint.json");
        let grizzly = Grizzly::new(config.clone());
        grizzly.create_table("metrics", metrics_schema()).unwrap();
        grizzly
            .with_table("metrics", |_| ())
            .unwrap();

        grizzly.save_incremental_state("maindb").unwrap();

        let reloaded = Grizzly::new(config);
        reloaded.load_incremental_state("maindb").unwrap();
        assert_eq!(reloaded.list_tables(), vec!["metrics".to_owned()]);
    }
}
