use crate::errors::EntriesError;
use crate::metrics_defs::REPLICA_LINK_FAILED;
use crate::replica::Replica;
use crate::types::{ResourceKind, Shape};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::{Map, Value};
use shared::counter;

/// A resolved value together with every entry and asset expanded from a link
/// while resolving it.
///
/// The included lists are append-only: the same linked entry reached through
/// two branches is listed twice.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedGraph {
    pub content: Value,
    pub included_entries: Vec<Value>,
    pub included_assets: Vec<Value>,
}

impl ResolvedGraph {
    pub fn leaf(content: Value) -> Self {
        ResolvedGraph {
            content,
            included_entries: Vec::new(),
            included_assets: Vec::new(),
        }
    }

    /// Appends the includes of `other` and hands back its content.
    pub fn absorb(&mut self, other: ResolvedGraph) -> Value {
        self.included_entries.extend(other.included_entries);
        self.included_assets.extend(other.included_assets);
        other.content
    }
}

/// Expands links in CMS values against the replica, up to a depth budget.
///
/// Depth is the only guard against cycles in the link graph. Siblings (array
/// elements, fields of an entry) are resolved concurrently and joined in
/// input order.
#[derive(Clone)]
pub struct LinkResolver {
    replica: Replica,
}

impl LinkResolver {
    pub fn new(replica: Replica) -> Self {
        LinkResolver { replica }
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Replaces links inside `value` with the entries and assets they point to.
    ///
    /// A depth of zero or less returns `value` untouched. A link that cannot
    /// be fetched is logged and replaced with `null`.
    pub fn resolve(&self, value: Value, depth: i64) -> BoxFuture<'_, ResolvedGraph> {
        async move {
            if depth <= 0 {
                return ResolvedGraph::leaf(value);
            }

            match Shape::of(&value) {
                Shape::Array => self.resolve_array(value, depth).await,
                Shape::Resource => self.resolve_fields(value, depth).await,
                Shape::Link { kind, id } => self.resolve_link(kind, id, depth).await,
                Shape::Scalar => ResolvedGraph::leaf(value),
            }
        }
        .boxed()
    }

    /// Fetches an entry or asset by id and resolves it with `depth` levels of links.
    ///
    /// A negative `depth` is treated as 1. A missing or empty id, or an id
    /// absent from the replica, yields `null` content. With `include` set the
    /// fetched value is listed ahead of anything found beneath it.
    pub async fn get_by_sys_id(
        &self,
        kind: ResourceKind,
        sys_id: Option<&str>,
        depth: i64,
        include: bool,
    ) -> Result<ResolvedGraph, EntriesError> {
        let depth = if depth < 0 { 1 } else { depth };

        let Some(sys_id) = sys_id.filter(|id| !id.is_empty()) else {
            return Ok(ResolvedGraph::leaf(Value::Null));
        };

        let Some(raw) = self.replica.fetch(kind, sys_id).await? else {
            return Ok(ResolvedGraph::leaf(Value::Null));
        };

        let mut graph = if depth > 0 {
            self.resolve(raw, depth).await
        } else {
            ResolvedGraph::leaf(raw)
        };

        if !include {
            return Ok(graph);
        }

        // The fetched value is listed ahead of everything found beneath it
        let mut listed = ResolvedGraph::default();
        match kind {
            ResourceKind::Entry => listed.included_entries.push(graph.content.clone()),
            ResourceKind::Asset => listed.included_assets.push(graph.content.clone()),
        }
        listed.content = listed.absorb(graph);
        Ok(listed)
    }

    async fn resolve_array(&self, value: Value, depth: i64) -> ResolvedGraph {
        let Value::Array(items) = value else {
            return ResolvedGraph::leaf(value);
        };

        let resolved = join_all(items.into_iter().map(|item| self.resolve(item, depth))).await;

        let mut graph = ResolvedGraph::default();
        let items = resolved.into_iter().map(|r| graph.absorb(r)).collect();
        graph.content = Value::Array(items);
        graph
    }

    async fn resolve_fields(&self, mut resource: Value, depth: i64) -> ResolvedGraph {
        let fields = match resource.get_mut("fields") {
            Some(Value::Object(fields)) => std::mem::take(fields),
            // Nothing to walk
            _ => return ResolvedGraph::leaf(resource),
        };

        let (names, values): (Vec<String>, Vec<Value>) = fields.into_iter().unzip();
        let resolved = join_all(values.into_iter().map(|v| self.resolve(v, depth))).await;

        let mut graph = ResolvedGraph::default();
        let fields: Map<String, Value> = names
            .into_iter()
            .zip(resolved)
            .map(|(name, r)| (name, graph.absorb(r)))
            .collect();
        resource["fields"] = Value::Object(fields);
        graph.content = resource;
        graph
    }

    async fn resolve_link(
        &self,
        kind: ResourceKind,
        id: Option<String>,
        depth: i64,
    ) -> ResolvedGraph {
        match self.get_by_sys_id(kind, id.as_deref(), depth - 1, true).await {
            Ok(graph) => graph,
            Err(err) => {
                counter!(REPLICA_LINK_FAILED).increment(1);
                tracing::error!(
                    link_type = kind.as_str(),
                    sys_id = ?id,
                    depth,
                    error = %err,
                    "Error resolving link"
                );
                ResolvedGraph::leaf(Value::Null)
            }
        }
    }
}
