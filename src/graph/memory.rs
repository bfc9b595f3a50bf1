use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::errors::{CodeAnalysisError, Result};
use crate::types::COMPLEXITY_LIMIT;

use super::store::{GraphQuery, GraphSession, GraphStore};

/// Node labels of the containment hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Component,
    File,
    Class,
    Method,
}

/// Index of a node inside a [`MemoryGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct MemoryNode {
    label: Label,
    props: Map<String, Value>,
}

#[derive(Debug, Default)]
struct GraphData {
    nodes: Vec<MemoryNode>,
    /// `(parent, child)` CONTAINS relationships.
    contains: Vec<(usize, usize)>,
}

impl GraphData {
    fn prop(&self, node: usize, key: &str) -> Value {
        self.nodes[node].props.get(key).cloned().unwrap_or(Value::Null)
    }

    fn nodes_with(&self, label: Label) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.label == label)
            .map(|(i, _)| i)
    }

    /// Distinct `label` children of any node in `parents`.
    fn children(&self, parents: &BTreeSet<usize>, label: Label) -> BTreeSet<usize> {
        self.contains
            .iter()
            .filter(|(p, c)| parents.contains(p) && self.nodes[*c].label == label)
            .map(|(_, c)| *c)
            .collect()
    }

    fn code_summary(&self) -> Vec<Value> {
        let components: BTreeSet<usize> = self.nodes_with(Label::Component).collect();
        let files = self.children(&components, Label::File);
        let classes = self.children(&files, Label::Class);
        let methods = self.children(&classes, Label::Method);

        vec![json!({
            "components": components.len(),
            "files": files.len(),
            "classes": classes.len(),
            "methods": methods.len(),
        })]
    }

    fn component_details(&self) -> Vec<Value> {
        self.nodes_with(Label::Component)
            .map(|c| {
                let files = self.children(&BTreeSet::from([c]), Label::File);
                let classes = self.children(&files, Label::Class);
                json!({
                    "name": self.prop(c, "name"),
                    "cohesion": self.prop(c, "cohesion"),
                    "coupling": self.prop(c, "coupling"),
                    "fileCount": files.len(),
                    "classCount": classes.len(),
                })
            })
            .collect()
    }

    fn complexity_metrics(&self) -> Vec<Value> {
        // Any positive number passes the filter, floats included; the raw
        // value is returned so decoding decides what is acceptable.
        let mut ranked: Vec<(usize, f64, Value)> = self
            .nodes_with(Label::Method)
            .filter_map(|m| {
                let raw = self.prop(m, "complexity");
                raw.as_f64().map(|c| (m, c, raw))
            })
            .filter(|(_, c, _)| *c > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(COMPLEXITY_LIMIT);

        ranked
            .into_iter()
            .map(|(m, _, complexity)| {
                json!({
                    "method": self.prop(m, "fullSignature"),
                    "complexity": complexity,
                })
            })
            .collect()
    }

    fn evaluate(&self, query: GraphQuery) -> Vec<Value> {
        match query {
            GraphQuery::Ping => vec![json!({ "ok": 1 })],
            GraphQuery::CodeSummary => self.code_summary(),
            GraphQuery::ComponentDetails => self.component_details(),
            GraphQuery::ComplexityMetrics => self.complexity_metrics(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    data: RwLock<GraphData>,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    closed: AtomicBool,
    unreachable: AtomicBool,
    query_failure: Mutex<Option<String>>,
}

/// In-process graph store that answers the fixed queries directly.
///
/// Mirrors the Cypher semantics (outer joins, distinct counts, complexity
/// filter and ranking) over a small labelled graph, and keeps session
/// counters so callers can check that every session was released.
/// Property values are returned as stored, so a float `complexity` ranks
/// like any other positive number and then fails to decode, as it does
/// against Neo4j. Clones share the same graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    inner: Arc<Inner>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with arbitrary properties and no relationships.
    pub fn add_node(&self, label: Label, props: Value) -> NodeId {
        let props = match props {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut data = self.write();
        data.nodes.push(MemoryNode { label, props });
        NodeId(data.nodes.len() - 1)
    }

    /// Adds a `CONTAINS` relationship from `parent` to `child`.
    pub fn link(&self, parent: NodeId, child: NodeId) {
        self.write().contains.push((parent.0, child.0));
    }

    /// Adds a component carrying optional quality scores.
    pub fn add_component(
        &self,
        name: &str,
        cohesion: Option<f64>,
        coupling: Option<f64>,
    ) -> NodeId {
        self.add_node(
            Label::Component,
            json!({ "name": name, "cohesion": cohesion, "coupling": coupling }),
        )
    }

    /// Adds a file contained in `component`.
    pub fn add_file(&self, component: NodeId, path: &str) -> NodeId {
        let file = self.add_node(Label::File, json!({ "path": path }));
        self.link(component, file);
        file
    }

    /// Adds a class contained in `file`.
    pub fn add_class(&self, file: NodeId, name: &str) -> NodeId {
        let class = self.add_node(Label::Class, json!({ "name": name }));
        self.link(file, class);
        class
    }

    /// Adds a method contained in `class`. `None` leaves complexity unset.
    pub fn add_method(&self, class: NodeId, signature: &str, complexity: Option<i64>) -> NodeId {
        let method = self.add_node(
            Label::Method,
            json!({ "fullSignature": signature, "complexity": complexity }),
        );
        self.link(class, method);
        method
    }

    /// Makes new sessions fail as if the server could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Makes every query fail with `message`, or clears the failure with `None`.
    pub fn fail_queries(&self, message: Option<&str>) {
        let mut failure = self
            .inner
            .query_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *failure = message.map(str::to_string);
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    /// Number of sessions released so far.
    pub fn sessions_closed(&self) -> usize {
        self.inner.sessions_closed.load(Ordering::SeqCst)
    }

    /// Whether [`GraphStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, GraphData> {
        self.inner.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    type Session = MemorySession;

    async fn session(&self) -> Result<MemorySession> {
        if self.is_closed() {
            return Err(CodeAnalysisError::graph("session", "connection is closed"));
        }
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(CodeAnalysisError::graph("session", "graph store unreachable"));
        }
        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            inner: Arc::clone(&self.inner),
        })
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Session over a [`MemoryGraph`].
#[derive(Debug)]
pub struct MemorySession {
    inner: Arc<Inner>,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn run<T>(&mut self, query: GraphQuery) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let failure = self
            .inner
            .query_failure
            .lock()
            .map_err(|_| CodeAnalysisError::graph(query.as_str(), "failure lock poisoned"))?
            .clone();
        if let Some(message) = failure {
            return Err(CodeAnalysisError::graph(query.as_str(), message));
        }

        let rows = {
            let data = self
                .inner
                .data
                .read()
                .map_err(|_| CodeAnalysisError::graph(query.as_str(), "graph lock poisoned"))?;
            data.evaluate(query)
        };

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(CodeAnalysisError::from))
            .collect()
    }

    async fn close(self) -> Result<()> {
        self.inner.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
