//! Store access for store-backed rules.
//!
//! A [`StoreBackend`] answers two questions about a table: which of a set of
//! candidate values occur in a column (under some extra conditions), and how
//! many rows match. [`DataFusionStore`] answers them with DataFusion
//! DataFrames over registered tables, one [`SessionContext`] per named
//! connection.

use crate::core::{Value, ValueSet};
use crate::error::{BatchError, Result};
use crate::security::SqlSecurity;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::common::{ScalarValue, TableReference};
use datafusion::dataframe::DataFrame;
use datafusion::datasource::TableProvider;
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::execution::memory_pool::{FairSpillPool, MemoryPool};
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use datafusion::logical_expr::ident;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::condition::ConditionSet;

/// One store lookup: `SELECT DISTINCT column FROM table WHERE column IN (values) AND conditions`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    /// Named connection, or `None` for the default one
    pub connection: Option<String>,
    pub table: String,
    pub column: String,
    /// Candidate values; never queried when empty
    pub values: ValueSet,
    pub conditions: ConditionSet,
}

impl StoreQuery {
    /// Creates a query on the default connection with no extra conditions.
    pub fn new(table: impl Into<String>, column: impl Into<String>, values: ValueSet) -> Self {
        Self {
            connection: None,
            table: table.into(),
            column: column.into(),
            values,
            conditions: ConditionSet::new(),
        }
    }

    /// Targets a named connection.
    pub fn on_connection(mut self, connection: Option<String>) -> Self {
        self.connection = connection;
        self
    }

    /// Replaces the extra conditions.
    pub fn with_conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = conditions;
        self
    }

    /// The same query restricted to a single candidate.
    pub fn scoped_to(&self, value: &Value) -> Self {
        Self {
            values: std::iter::once(value.clone()).collect(),
            ..self.clone()
        }
    }

    /// Checks table, column and condition identifiers.
    pub fn validate(&self) -> Result<()> {
        SqlSecurity::validate_identifier(&self.table)?;
        SqlSecurity::validate_identifier(&self.column)?;
        if let Some(connection) = &self.connection {
            SqlSecurity::validate_identifier(connection)?;
        }
        self.conditions.validate()
    }
}

impl fmt::Display for StoreQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(connection) = &self.connection {
            write!(f, "{connection}.")?;
        }
        write!(
            f,
            "{}.{} [{} candidates, {} conditions]",
            self.table,
            self.column,
            self.values.len(),
            self.conditions.len()
        )
    }
}

/// The storage seam used by rule evaluators.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Returns the candidates from `query.values` present in the store.
    async fn fetch_matching(&self, query: &StoreQuery) -> Result<ValueSet>;

    /// Counts rows matching the query.
    async fn count_matching(&self, query: &StoreQuery) -> Result<usize>;
}

/// Configuration for a [`DataFusionStore`] session.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Target number of partitions for parallel execution
    pub target_partitions: usize,
    /// Maximum memory for query execution (in bytes)
    pub max_memory: usize,
    /// Memory fraction to use before spilling (0.0 to 1.0)
    pub memory_fraction: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            target_partitions: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4),
            max_memory: 512 * 1024 * 1024, // 512MB
            memory_fraction: 0.9,
        }
    }
}

impl StoreConfig {
    /// Builds a session context with these settings.
    pub fn build_context(&self) -> Result<SessionContext> {
        let session_config = SessionConfig::new()
            .with_target_partitions(self.target_partitions)
            .with_information_schema(false);

        let pool_size = (self.max_memory as f64 * self.memory_fraction.clamp(0.0, 1.0)) as usize;
        let memory_pool = Arc::new(FairSpillPool::new(pool_size)) as Arc<dyn MemoryPool>;

        let runtime_env = RuntimeEnvBuilder::new()
            .with_memory_pool(memory_pool)
            .build()
            .map(Arc::new)?;

        Ok(SessionContext::new_with_config_rt(session_config, runtime_env))
    }
}

/// A [`StoreBackend`] over DataFusion tables.
///
/// Tables are registered on the default connection or on a named one; a rule
/// addresses a named connection with a `connection.table` prefix.
///
/// ```rust,ignore
/// use batch_guard::query::DataFusionStore;
///
/// let store = DataFusionStore::new()?;
/// store.register_json_rows(None, "contacts", &rows)?;
/// ```
pub struct DataFusionStore {
    default: SessionContext,
    connections: HashMap<String, SessionContext>,
    config: StoreConfig,
}

impl DataFusionStore {
    /// Creates a store with default settings.
    #[instrument]
    pub fn new() -> Result<Self> {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with custom settings.
    #[instrument(skip(config))]
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        Ok(Self {
            default: config.build_context()?,
            connections: HashMap::new(),
            config,
        })
    }

    /// Wraps an existing session as the default connection.
    pub fn from_context(ctx: SessionContext) -> Self {
        Self {
            default: ctx,
            connections: HashMap::new(),
            config: StoreConfig::default(),
        }
    }

    /// Adds (or replaces) a named connection with a fresh session.
    pub fn add_connection(&mut self, name: impl Into<String>) -> Result<&SessionContext> {
        let name = name.into();
        SqlSecurity::validate_identifier(&name)?;
        let ctx = self.config.build_context()?;
        self.connections.insert(name.clone(), ctx);
        self.context(Some(&name))
    }

    /// Adds a named connection backed by an existing session.
    pub fn with_connection(mut self, name: impl Into<String>, ctx: SessionContext) -> Self {
        self.connections.insert(name.into(), ctx);
        self
    }

    /// Names of the registered connections, excluding the default one.
    pub fn connection_names(&self) -> Vec<&str> {
        self.connections.keys().map(String::as_str).collect()
    }

    /// The session behind `connection` (`None` for the default).
    pub fn context(&self, connection: Option<&str>) -> Result<&SessionContext> {
        match connection {
            None => Ok(&self.default),
            Some(name) => self
                .connections
                .get(name)
                .ok_or_else(|| BatchError::ConnectionNotFound(name.to_string())),
        }
    }

    /// Registers an Arrow batch as a table.
    pub fn register_batch(
        &self,
        connection: Option<&str>,
        table: &str,
        batch: RecordBatch,
    ) -> Result<()> {
        SqlSecurity::validate_identifier(table)?;
        self.context(connection)?.register_batch(table, batch)?;
        debug!(table, connection = ?connection, "Registered table");
        Ok(())
    }

    /// Registers any table provider.
    pub fn register_table(
        &self,
        connection: Option<&str>,
        table: &str,
        provider: Arc<dyn TableProvider>,
    ) -> Result<()> {
        SqlSecurity::validate_identifier(table)?;
        self.context(connection)?.register_table(table, provider)?;
        debug!(table, connection = ?connection, "Registered table");
        Ok(())
    }

    /// Registers JSON objects as a table, inferring the schema from the rows.
    pub fn register_json_rows(
        &self,
        connection: Option<&str>,
        table: &str,
        rows: &[serde_json::Value],
    ) -> Result<()> {
        let batch = json_rows_to_batch(rows)?;
        self.register_batch(connection, table, batch)
    }

    async fn frame(&self, query: &StoreQuery) -> Result<DataFrame> {
        query.validate()?;
        let ctx = self.context(query.connection.as_deref())?;
        let df = ctx.table(TableReference::bare(query.table.as_str())).await?;

        let mut predicate = ident(&query.column).in_list(query.values.to_literals(), false);
        if let Some(conditions) = query.conditions.to_expr() {
            predicate = predicate.and(conditions);
        }
        Ok(df.filter(predicate)?)
    }
}

impl fmt::Debug for DataFusionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFusionStore")
            .field("connections", &self.connection_names())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl StoreBackend for DataFusionStore {
    #[instrument(skip(self, query), fields(query = %query))]
    async fn fetch_matching(&self, query: &StoreQuery) -> Result<ValueSet> {
        if query.values.is_empty() {
            return Ok(ValueSet::new());
        }

        let df = self
            .frame(query)
            .await?
            .select(vec![ident(&query.column)])?
            .distinct()?;
        let batches = df.collect().await?;

        let mut found = ValueSet::new();
        for batch in &batches {
            let column = batch.column(0);
            for row in 0..batch.num_rows() {
                let value = Value::from_scalar(&ScalarValue::try_from_array(column.as_ref(), row)?);
                if !value.is_null() {
                    found.insert(value);
                }
            }
        }
        debug!(found = found.len(), "Store lookup complete");
        Ok(found)
    }

    #[instrument(skip(self, query), fields(query = %query))]
    async fn count_matching(&self, query: &StoreQuery) -> Result<usize> {
        if query.values.is_empty() {
            return Ok(0);
        }
        Ok(self.frame(query).await?.count().await?)
    }
}

/// Converts JSON objects into a single Arrow batch, inferring the schema.
pub fn json_rows_to_batch(rows: &[serde_json::Value]) -> Result<RecordBatch> {
    use arrow::json::reader::{infer_json_schema_from_iterator, ReaderBuilder};

    let schema = infer_json_schema_from_iterator(rows.iter().map(Ok))?;
    let mut decoder = ReaderBuilder::new(Arc::new(schema.clone())).build_decoder()?;
    decoder.serialize(rows)?;
    Ok(decoder
        .flush()?
        .unwrap_or_else(|| RecordBatch::new_empty(Arc::new(schema))))
}
