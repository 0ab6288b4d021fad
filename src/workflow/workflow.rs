//! Validated, immutable workflow used by runs.
//!
//! This module wraps a validated graph in a directed graph structure (using
//! petgraph) for dependency queries during scheduling. A `Workflow` can only
//! be obtained through [`validate`](crate::workflow::validate), so every
//! instance is known to be free of dangling references, arity violations and
//! cycles. Runs share it behind an `Arc`; it is never mutated after
//! construction, which is what makes later edits to the authored graph
//! invisible to in-flight runs.

use std::collections::{HashMap, VecDeque};

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::workflow::{
    ValidationWarning,
    edge::Connection,
    node::{NodeId, NodeSpec},
};

/// Runtime workflow representation as a directed graph.
///
/// Node indices follow the order in which nodes were authored, which is the
/// tie-break order used everywhere a choice between unrelated nodes is made.
#[derive(Debug, Clone)]
pub struct Workflow {
    id: String,
    name: String,
    graph: DiGraph<NodeSpec, Connection>,
    index: HashMap<NodeId, NodeIndex>,
    order: Vec<NodeIndex>,
    warnings: Vec<ValidationWarning>,
}

impl Workflow {
    pub(crate) fn from_parts(
        id: String,
        name: String,
        specs: Vec<NodeSpec>,
        connections: Vec<(usize, usize, Connection)>,
        order: Vec<usize>,
        warnings: Vec<ValidationWarning>,
    ) -> Self {
        let mut graph = DiGraph::with_capacity(specs.len(), connections.len());
        let mut index = HashMap::with_capacity(specs.len());
        for spec in specs {
            let nid = spec.id.clone();
            let idx = graph.add_node(spec);
            index.insert(nid, idx);
        }
        for (source, target, conn) in connections {
            graph.add_edge(NodeIndex::new(source), NodeIndex::new(target), conn);
        }

        Self {
            id,
            name,
            graph,
            index,
            order: order.into_iter().map(NodeIndex::new).collect(),
            warnings,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// all nodes in authoring order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.graph.node_weights()
    }

    /// get node by id
    pub fn node(
        &self,
        id: &str,
    ) -> Option<&NodeSpec> {
        self.index_of(id).map(|idx| &self.graph[idx])
    }

    pub(crate) fn node_at(
        &self,
        idx: NodeIndex,
    ) -> &NodeSpec {
        &self.graph[idx]
    }

    pub(crate) fn index_of(
        &self,
        id: &str,
    ) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// get all node ids in authoring order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.node_weights().map(|n| n.id.clone()).collect()
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Node ids ordered so that each node follows all of its dependencies.
    pub fn topological_order(&self) -> Vec<NodeId> {
        self.order.iter().map(|idx| self.graph[*idx].id.clone()).collect()
    }

    /// Distinct upstream nodes of `idx`, in authoring order.
    pub(crate) fn dependencies(
        &self,
        idx: NodeIndex,
    ) -> Vec<NodeIndex> {
        self.neighbors(idx, Direction::Incoming)
    }

    /// Distinct downstream nodes of `idx`, in authoring order.
    pub(crate) fn dependents(
        &self,
        idx: NodeIndex,
    ) -> Vec<NodeIndex> {
        self.neighbors(idx, Direction::Outgoing)
    }

    /// Incoming connections of `idx` with their source node, ordered by the target's input port declaration.
    pub(crate) fn incoming(
        &self,
        idx: NodeIndex,
    ) -> Vec<(NodeIndex, &Connection)> {
        let ports = &self.graph[idx].inputs;
        let mut incoming: Vec<(NodeIndex, &Connection)> = self.graph.edges_directed(idx, Direction::Incoming).map(|e| (e.source(), e.weight())).collect();
        incoming.sort_by_key(|(_, conn)| ports.iter().position(|p| *p == conn.target.port).unwrap_or(usize::MAX));
        incoming
    }

    /// Every node that transitively depends on `idx`, in authoring order.
    pub(crate) fn descendants(
        &self,
        idx: NodeIndex,
    ) -> Vec<NodeIndex> {
        let mut seen = vec![false; self.graph.node_count()];
        let mut queue = VecDeque::from([idx]);
        let mut found = Vec::new();
        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if !seen[next.index()] {
                    seen[next.index()] = true;
                    found.push(next);
                    queue.push_back(next);
                }
            }
        }
        found.sort();
        found
    }

    fn neighbors(
        &self,
        idx: NodeIndex,
        dir: Direction,
    ) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /// Output a human-readable representation of the workflow graph
    pub fn schema(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("=== Workflow {} ===", if self.name.is_empty() { &self.id } else { &self.name }));
        lines.push(format!("Nodes: {}, Connections: {}", self.graph.node_count(), self.graph.edge_count()));
        lines.push(String::new());

        lines.push("--- Nodes ---".to_string());
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            lines.push(format!(
                "[{}] {} (type: {}, inputs: [{}], outputs: [{}])",
                node.id,
                node.label(),
                node.node_type,
                node.inputs.join(", "),
                node.outputs.join(", ")
            ));
        }
        lines.push(String::new());

        lines.push("--- Connections ---".to_string());
        let mut edges: Vec<_> = self.graph.edge_references().collect();
        edges.sort_by_key(|e| e.id());
        for edge in edges {
            let conn = edge.weight();
            lines.push(format!("{}.{} --> {}.{} (id: {})", conn.source.node, conn.source.port, conn.target.node, conn.target.port, conn.id));
        }
        lines.push(String::new());

        lines.push("--- Execution Order ---".to_string());
        for (position, idx) in self.order.iter().enumerate() {
            let deps: Vec<&str> = self.dependencies(*idx).into_iter().map(|d| self.graph[d].id.as_str()).collect();
            if deps.is_empty() {
                lines.push(format!("{}. {}", position + 1, self.graph[*idx].id));
            } else {
                lines.push(format!("{}. {} (after {})", position + 1, self.graph[*idx].id, deps.join(", ")));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{model::GraphModel, workflow::validate};

    fn diamond() -> crate::Workflow {
        let model: GraphModel = serde_json::from_value(json!({
            "id": "wf",
            "nodes": [
                {"id": "fetch", "type": "Data Source", "inputs": []},
                {"id": "left", "type": "JSON Parser"},
                {"id": "right", "type": "JSON Parser"},
                {"id": "merge", "type": "Data Aggregator", "inputs": ["a", "b"]},
                {"id": "store", "type": "Output Handler", "outputs": []}
            ],
            "connections": [
                {"source": "fetch", "target": "right"},
                {"source": "fetch", "target": "left"},
                {"source": "right", "target": "merge", "targetHandle": "b"},
                {"source": "left", "target": "merge", "targetHandle": "a"},
                {"source": "merge", "target": "store"}
            ]
        }))
        .unwrap();
        validate(&model).unwrap()
    }

    #[test]
    fn test_dependency_queries() {
        let wf = diamond();
        let fetch = wf.index_of("fetch").unwrap();
        let merge = wf.index_of("merge").unwrap();

        let dependents: Vec<&str> = wf.dependents(fetch).into_iter().map(|i| wf.node_at(i).id.as_str()).collect();
        assert_eq!(dependents, vec!["left", "right"]);

        let deps: Vec<&str> = wf.dependencies(merge).into_iter().map(|i| wf.node_at(i).id.as_str()).collect();
        assert_eq!(deps, vec!["left", "right"]);

        let ports: Vec<&str> = wf.incoming(merge).into_iter().map(|(_, c)| c.target.port.as_str()).collect();
        assert_eq!(ports, vec!["a", "b"]);

        let below: Vec<&str> = wf.descendants(fetch).into_iter().map(|i| wf.node_at(i).id.as_str()).collect();
        assert_eq!(below, vec!["left", "right", "merge", "store"]);
    }

    #[test]
    fn test_topological_order_and_schema() {
        let wf = diamond();
        assert_eq!(wf.topological_order(), vec!["fetch", "left", "right", "merge", "store"]);
        assert_eq!(wf.node_count(), 5);
        assert_eq!(wf.connection_count(), 5);

        let schema = wf.schema();
        assert!(schema.contains("=== Workflow wf ==="));
        assert!(schema.contains("fetch.output --> right.input"));
        assert!(schema.contains("4. merge (after left, right)"));
    }
}
