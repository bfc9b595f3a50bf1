//! Query Service: the three analytics questions plus a health check.
//!
//! Every operation opens its own session, runs one fixed query, and releases
//! the session on every exit path. Rows are adapted into the typed records in
//! [`crate::types`] here, so nothing loosely typed leaves this module.

use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::config::GraphConfig;
use crate::errors::{CodeAnalysisError, Result};
use crate::graph::{GraphQuery, GraphSession, GraphStore, Neo4jStore};
use crate::types::{CodeSummary, ComplexityMetric, ComponentDetail, Liveness};

/// Read-only analytics over a graph store.
pub struct QueryService<S: GraphStore> {
    store: S,
}

impl QueryService<Neo4jStore> {
    /// Creates a service backed by the Neo4j server in `config`.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        Ok(Self::new(Neo4jStore::connect(config).await?))
    }
}

impl<S: GraphStore> QueryService<S> {
    /// Wraps an existing store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Runs the liveness query. Never fails: any error is logged and
    /// reported as `false`.
    pub async fn verify_connection(&self) -> bool {
        match self.fetch::<Liveness>(GraphQuery::Ping).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "graph connection check failed");
                false
            }
        }
    }

    /// Counts distinct components, files, classes and methods.
    pub async fn get_code_summary(&self) -> Result<CodeSummary> {
        self.fetch::<CodeSummary>(GraphQuery::CodeSummary)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CodeAnalysisError::graph(GraphQuery::CodeSummary.as_str(), "query returned no rows")
            })
    }

    /// Returns one entry per component, including empty ones.
    pub async fn get_component_details(&self) -> Result<Vec<ComponentDetail>> {
        self.fetch(GraphQuery::ComponentDetails).await
    }

    /// Returns up to ten methods with positive complexity, highest first.
    pub async fn get_complexity_metrics(&self) -> Result<Vec<ComplexityMetric>> {
        self.fetch(GraphQuery::ComplexityMetrics).await
    }

    /// Releases the connection handle.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }

    /// Runs `query` in a fresh session and always closes it afterwards.
    ///
    /// A query error takes precedence over a close error; a close error
    /// after a successful query is logged and the rows are still returned.
    async fn fetch<T>(&self, query: GraphQuery) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut session = self.store.session().await?;
        let result: Result<Vec<T>> = session.run(query).await;
        let closed = session.close().await;

        if let Err(e) = &closed {
            warn!(query = query.as_str(), error = %e, "failed to close graph session");
        }
        let rows = result?;
        debug!(query = query.as_str(), rows = rows.len(), "graph query complete");
        Ok(rows)
    }
}
