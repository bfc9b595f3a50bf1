use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::errors::Result;

/// The fixed queries this server knows how to run.
///
/// Each query returns flat columns whose aliases match the field names of
/// the record type it is deserialized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphQuery {
    /// Trivial liveness check.
    Ping,
    /// Distinct counts over the whole containment hierarchy.
    CodeSummary,
    /// One row per component with file and class counts.
    ComponentDetails,
    /// Top methods by positive complexity.
    ComplexityMetrics,
}

impl GraphQuery {
    /// Returns the operation name used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            GraphQuery::Ping => "ping",
            GraphQuery::CodeSummary => "code_summary",
            GraphQuery::ComponentDetails => "component_details",
            GraphQuery::ComplexityMetrics => "complexity_metrics",
        }
    }

    /// Returns the Cypher text for this query.
    ///
    /// The OPTIONAL MATCH chains keep components without files (and files
    /// without classes) in the result, and every count is over DISTINCT nodes
    /// rather than paths.
    pub fn cypher(self) -> &'static str {
        match self {
            GraphQuery::Ping => "RETURN 1 AS ok",
            GraphQuery::CodeSummary => {
                "MATCH (c:Component)
                 OPTIONAL MATCH (c)-[:CONTAINS]->(f:File)
                 OPTIONAL MATCH (f)-[:CONTAINS]->(cls:Class)
                 OPTIONAL MATCH (cls)-[:CONTAINS]->(m:Method)
                 RETURN
                     count(DISTINCT c) AS components,
                     count(DISTINCT f) AS files,
                     count(DISTINCT cls) AS classes,
                     count(DISTINCT m) AS methods"
            }
            GraphQuery::ComponentDetails => {
                "MATCH (c:Component)
                 OPTIONAL MATCH (c)-[:CONTAINS]->(f:File)
                 OPTIONAL MATCH (f)-[:CONTAINS]->(cls:Class)
                 WITH c, collect(DISTINCT f) AS files, collect(DISTINCT cls) AS classes
                 RETURN
                     c.name AS name,
                     c.cohesion AS cohesion,
                     c.coupling AS coupling,
                     size(files) AS fileCount,
                     size(classes) AS classCount"
            }
            GraphQuery::ComplexityMetrics => {
                "MATCH (m:Method)
                 WHERE m.complexity > 0
                 RETURN m.fullSignature AS method, m.complexity AS complexity
                 ORDER BY m.complexity DESC
                 LIMIT 10"
            }
        }
    }
}

/// A handle to the graph database shared by every request.
///
/// Implementations must be safe to share across tasks; each request opens
/// its own session and nothing else is shared.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    /// Session type handed out by [`GraphStore::session`].
    type Session: GraphSession;

    /// Opens a fresh session for a single query.
    async fn session(&self) -> Result<Self::Session>;

    /// Releases the connection handle.
    ///
    /// Safe to call more than once and with no query in flight. Sessions
    /// requested afterwards fail.
    async fn close(&self) -> Result<()>;
}

/// A short-lived session used for exactly one query.
#[async_trait]
pub trait GraphSession: Send {
    /// Runs `query` and deserializes every returned row into `T`.
    async fn run<T>(&mut self, query: GraphQuery) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send;

    /// Releases the session. Consumes it, so it can only happen once.
    async fn close(self) -> Result<()>;
}
