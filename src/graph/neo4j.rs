use std::sync::Mutex;

use async_trait::async_trait;
use neo4rs::{query, Graph, Row, Txn};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::GraphConfig;
use crate::errors::{CodeAnalysisError, Result};

use super::store::{GraphQuery, GraphSession, GraphStore};

/// Graph store backed by a Neo4j server.
///
/// Holds the single pooled connection handle for the process. `close` drops
/// the pool; any session requested afterwards fails.
pub struct Neo4jStore {
    graph: Mutex<Option<Graph>>,
}

impl Neo4jStore {
    /// Connects to the server described by `config`.
    ///
    /// The driver connects lazily, so reachability is only known after a
    /// query has run.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        debug!(uri = %config.uri, user = %config.user, "creating neo4j driver");
        let graph = Graph::new(&config.uri, &config.user, &config.password).await?;
        Ok(Self {
            graph: Mutex::new(Some(graph)),
        })
    }

    fn handle(&self, operation: &str) -> Result<Graph> {
        let guard = self
            .graph
            .lock()
            .map_err(|_| CodeAnalysisError::graph(operation, "connection lock poisoned"))?;
        guard
            .clone()
            .ok_or_else(|| CodeAnalysisError::graph(operation, "connection is closed"))
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    type Session = Neo4jSession;

    async fn session(&self) -> Result<Neo4jSession> {
        let graph = self.handle("session")?;
        let txn = graph.start_txn().await?;
        Ok(Neo4jSession { txn })
    }

    async fn close(&self) -> Result<()> {
        let taken = self
            .graph
            .lock()
            .map_err(|_| CodeAnalysisError::graph("close", "connection lock poisoned"))?
            .take();
        if taken.is_some() {
            debug!("neo4j connection released");
        }
        Ok(())
    }
}

/// A transaction used as a single-query session.
///
/// Only the fixed read queries run on it, and closing rolls it back.
pub struct Neo4jSession {
    txn: Txn,
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn run<T>(&mut self, q: GraphQuery) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut stream = self.txn.execute(query(q.cypher())).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await? {
            rows.push(decode_row(&row, q)?);
        }
        Ok(rows)
    }

    async fn close(self) -> Result<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

/// Decodes one result row into the record type of `q`.
fn decode_row<T: DeserializeOwned>(row: &Row, q: GraphQuery) -> Result<T> {
    row.to::<T>()
        .map_err(|e| CodeAnalysisError::graph(q.as_str(), format!("bad row: {e}")))
}
