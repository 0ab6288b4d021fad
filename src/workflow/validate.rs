//! Graph validation and ordering.
//!
//! Validation collects every problem it can find instead of stopping at the
//! first one, so the editor can highlight all of them at once. Ordering is
//! deterministic: among nodes with no constraint between them, the one that
//! was defined first comes first.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    error::{PortDirection, ValidationError},
    model::GraphModel,
    workflow::{
        Workflow,
        edge::{Connection, PortRef},
        node::{NodeId, NodeSpec},
    },
};

/// A non-fatal finding reported alongside a valid graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// No path leads to the node from a node without input ports. It still
    /// runs once its own dependencies succeed; a node with nothing connected
    /// runs as soon as the run starts, with an empty input envelope.
    Orphan {
        node_id: NodeId,
    },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ValidationWarning::Orphan {
                node_id,
            } => write!(f, "node '{}' is not reachable from any source node", node_id),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates an authored graph and builds the immutable [`Workflow`] a run executes.
pub fn validate(model: &GraphModel) -> Result<Workflow, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut specs: Vec<NodeSpec> = Vec::with_capacity(model.nodes.len());
    let mut positions: HashMap<NodeId, usize> = HashMap::new();

    for (position, node) in model.nodes.iter().enumerate() {
        if node.id.is_empty() {
            errors.push(ValidationError::EmptyNodeId {
                position,
            });
            continue;
        }
        if positions.contains_key(&node.id) {
            errors.push(ValidationError::DuplicateNode {
                node_id: node.id.clone(),
            });
            continue;
        }
        check_ports(&node.id, &node.inputs, PortDirection::Input, &mut errors);
        check_ports(&node.id, &node.outputs, PortDirection::Output, &mut errors);

        positions.insert(node.id.clone(), specs.len());
        specs.push(NodeSpec::from(node));
    }

    let mut connections: Vec<(usize, usize, Connection)> = Vec::new();
    let mut occupied: HashMap<(usize, String), Vec<String>> = HashMap::new();

    for conn in &model.connections {
        let connection_id = conn.effective_id();

        let source = positions.get(&conn.source).copied();
        let target = positions.get(&conn.target).copied();
        if source.is_none() {
            errors.push(ValidationError::DanglingNode {
                connection_id: connection_id.clone(),
                node_id: conn.source.clone(),
            });
        }
        if target.is_none() {
            errors.push(ValidationError::DanglingNode {
                connection_id: connection_id.clone(),
                node_id: conn.target.clone(),
            });
        }
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };

        let mut ports_ok = true;
        if !specs[source].outputs.contains(&conn.source_handle) {
            errors.push(ValidationError::DanglingPort {
                connection_id: connection_id.clone(),
                node_id: conn.source.clone(),
                port: conn.source_handle.clone(),
                direction: PortDirection::Output,
            });
            ports_ok = false;
        }
        if !specs[target].inputs.contains(&conn.target_handle) {
            errors.push(ValidationError::DanglingPort {
                connection_id: connection_id.clone(),
                node_id: conn.target.clone(),
                port: conn.target_handle.clone(),
                direction: PortDirection::Input,
            });
            ports_ok = false;
        }
        if !ports_ok {
            continue;
        }

        occupied.entry((target, conn.target_handle.clone())).or_default().push(connection_id.clone());
        connections.push((
            source,
            target,
            Connection {
                id: connection_id,
                source: PortRef {
                    node: conn.source.clone(),
                    port: conn.source_handle.clone(),
                },
                target: PortRef {
                    node: conn.target.clone(),
                    port: conn.target_handle.clone(),
                },
            },
        ));
    }

    // report arity violations in node/port declaration order
    for (idx, spec) in specs.iter().enumerate() {
        for port in &spec.inputs {
            if let Some(ids) = occupied.get(&(idx, port.clone())) {
                if ids.len() > 1 {
                    errors.push(ValidationError::PortArity {
                        node_id: spec.id.clone(),
                        port: port.clone(),
                        connections: ids.clone(),
                    });
                }
            }
        }
    }

    let successors = adjacency(specs.len(), connections.iter().map(|(s, t, _)| (*s, *t)));
    for cycle in find_cycles(&successors) {
        errors.push(ValidationError::Cycle {
            path: cycle.into_iter().map(|idx| specs[idx].id.clone()).collect(),
        });
    }

    if !errors.is_empty() {
        trace!("validate: {} error(s)", errors.len());
        return Err(errors);
    }

    let order = match stable_order(&successors) {
        Some(order) => order,
        // find_cycles reported nothing, so every node is orderable
        None => unreachable!("acyclic graph without topological order"),
    };

    let reachable = reachable_from_sources(&specs, &successors);
    let warnings = specs
        .iter()
        .zip(reachable)
        .filter(|(_, reached)| !reached)
        .map(|(spec, _)| ValidationWarning::Orphan {
            node_id: spec.id.clone(),
        })
        .collect();

    Ok(Workflow::from_parts(model.id.clone(), model.name.clone(), specs, connections, order, warnings))
}

/// Orders the graph's nodes so that every node comes after all of its dependencies.
///
/// Only node references are considered; port problems are left to [`validate`].
/// Connections that reference missing nodes are ignored.
pub fn topological_order(model: &GraphModel) -> Result<Vec<NodeId>, ValidationError> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut ids: Vec<&str> = Vec::new();
    for node in &model.nodes {
        if !positions.contains_key(node.id.as_str()) {
            positions.insert(node.id.as_str(), ids.len());
            ids.push(node.id.as_str());
        }
    }

    let edges = model.connections.iter().filter_map(|c| Some((*positions.get(c.source.as_str())?, *positions.get(c.target.as_str())?)));
    let successors = adjacency(ids.len(), edges);

    match stable_order(&successors) {
        Some(order) => Ok(order.into_iter().map(|idx| ids[idx].to_string()).collect()),
        None => {
            let path = find_cycles(&successors).into_iter().next().unwrap_or_default();
            Err(ValidationError::Cycle {
                path: path.into_iter().map(|idx| ids[idx].to_string()).collect(),
            })
        }
    }
}

fn check_ports(
    node_id: &str,
    ports: &[String],
    direction: PortDirection,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for port in ports {
        if !seen.insert(port.as_str()) {
            errors.push(ValidationError::DuplicatePort {
                node_id: node_id.to_string(),
                port: port.clone(),
                direction,
            });
        }
    }
}

/// Deduplicated successor lists, each in the order the connections were authored.
fn adjacency(
    n: usize,
    edges: impl Iterator<Item = (usize, usize)>,
) -> Vec<Vec<usize>> {
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (source, target) in edges {
        if !successors[source].contains(&target) {
            successors[source].push(target);
        }
    }
    successors
}

/// Marks every node reachable from a node without input ports.
fn reachable_from_sources(
    specs: &[NodeSpec],
    successors: &[Vec<usize>],
) -> Vec<bool> {
    let mut reached = vec![false; specs.len()];
    let mut stack: Vec<usize> = specs.iter().enumerate().filter(|(_, spec)| spec.is_source()).map(|(idx, _)| idx).collect();
    for idx in &stack {
        reached[*idx] = true;
    }
    while let Some(idx) = stack.pop() {
        for next in &successors[idx] {
            if !reached[*next] {
                reached[*next] = true;
                stack.push(*next);
            }
        }
    }
    reached
}

/// Kahn's algorithm with a min-heap on insertion index. `None` when a cycle remains.
pub(crate) fn stable_order(successors: &[Vec<usize>]) -> Option<Vec<usize>> {
    let n = successors.len();
    let mut in_degree = vec![0usize; n];
    for targets in successors {
        for &t in targets {
            in_degree[t] += 1;
        }
    }

    let mut heap: BinaryHeap<Reverse<usize>> = (0..n).filter(|&i| in_degree[i] == 0).map(Reverse).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(idx)) = heap.pop() {
        order.push(idx);
        for &t in &successors[idx] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                heap.push(Reverse(t));
            }
        }
    }

    (order.len() == n).then_some(order)
}

/// Depth-first search with white/gray/black coloring.
///
/// Every back edge closes a cycle; the returned path runs from the node the
/// back edge points to, along the current DFS stack, and repeats that node at
/// the end (`a -> b -> c -> a`).
fn find_cycles(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = successors.len();
    let mut color = vec![Color::White; n];
    let mut cycles = Vec::new();

    for root in 0..n {
        if color[root] != Color::White {
            continue;
        }

        // (node, index of the next successor to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        color[root] = Color::Gray;

        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            if let Some(&succ) = successors[node].get(next) {
                top.1 += 1;
                match color[succ] {
                    Color::White => {
                        color[succ] = Color::Gray;
                        stack.push((succ, 0));
                    }
                    Color::Gray => {
                        let start = stack.iter().position(|(n, _)| *n == succ).unwrap_or(0);
                        let mut path: Vec<usize> = stack[start..].iter().map(|(n, _)| *n).collect();
                        path.push(succ);
                        cycles.push(path);
                    }
                    Color::Black => {}
                }
            } else {
                color[node] = Color::Black;
                stack.pop();
            }
        }
    }

    cycles
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn graph(value: serde_json::Value) -> GraphModel {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_find_cycles_reports_path() {
        // 0 -> 1 -> 2 -> 0, 2 -> 3
        let successors = vec![vec![1], vec![2], vec![0, 3], vec![]];
        assert_eq!(find_cycles(&successors), vec![vec![0, 1, 2, 0]]);
    }

    #[test]
    fn test_find_cycles_self_loop() {
        let successors = vec![vec![0]];
        assert_eq!(find_cycles(&successors), vec![vec![0, 0]]);
    }

    #[test]
    fn test_stable_order_prefers_insertion_order() {
        // 2 -> 0, nodes 1 and 3 unconstrained
        let successors = vec![vec![], vec![], vec![0], vec![]];
        assert_eq!(stable_order(&successors), Some(vec![1, 2, 0, 3]));
    }

    #[test]
    fn test_topological_order_ignores_ports() {
        let model = graph(json!({
            "nodes": [{"id": "c", "type": "t"}, {"id": "a", "type": "t"}, {"id": "b", "type": "t"}],
            "connections": [
                {"source": "a", "target": "b"},
                {"source": "b", "target": "c", "targetHandle": "nope"}
            ]
        }));
        assert_eq!(topological_order(&model).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_topological_order_cycle() {
        let model = graph(json!({
            "nodes": [{"id": "a", "type": "t"}, {"id": "b", "type": "t"}],
            "connections": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]
        }));
        assert_eq!(
            topological_order(&model).unwrap_err(),
            ValidationError::Cycle {
                path: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let model = graph(json!({
            "nodes": [
                {"id": "a", "type": "t", "inputs": []},
                {"id": "a", "type": "t"},
                {"id": "b", "type": "t", "outputs": ["out", "out"]},
                {"id": "", "type": "t"}
            ],
            "connections": [
                {"id": "c1", "source": "a", "target": "ghost"},
                {"id": "c2", "source": "a", "sourceHandle": "missing", "target": "b"},
                {"id": "c3", "source": "a", "target": "b"},
                {"id": "c4", "source": "a", "target": "b"}
            ]
        }));
        let errors = validate(&model).unwrap_err();

        assert!(errors.contains(&ValidationError::DuplicateNode {
            node_id: "a".into()
        }));
        assert!(errors.contains(&ValidationError::EmptyNodeId {
            position: 3
        }));
        assert!(errors.contains(&ValidationError::DuplicatePort {
            node_id: "b".into(),
            port: "out".into(),
            direction: PortDirection::Output,
        }));
        assert!(errors.contains(&ValidationError::DanglingNode {
            connection_id: "c1".into(),
            node_id: "ghost".into(),
        }));
        assert!(errors.contains(&ValidationError::DanglingPort {
            connection_id: "c2".into(),
            node_id: "a".into(),
            port: "missing".into(),
            direction: PortDirection::Output,
        }));
        assert!(errors.contains(&ValidationError::PortArity {
            node_id: "b".into(),
            port: "input".into(),
            connections: vec!["c3".into(), "c4".into()],
        }));
    }

    #[test]
    fn test_validate_cycle_with_entry() {
        let model = graph(json!({
            "nodes": [
                {"id": "src", "type": "t", "inputs": []},
                {"id": "agg", "type": "t", "inputs": ["left", "right"]},
                {"id": "x", "type": "t"},
                {"id": "y", "type": "t"}
            ],
            "connections": [
                {"source": "src", "target": "agg", "targetHandle": "left"},
                {"source": "agg", "target": "x"},
                {"source": "x", "target": "y"},
                {"source": "y", "target": "agg", "targetHandle": "right"}
            ]
        }));
        let errors = validate(&model).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Cycle {
                path: vec!["agg".into(), "x".into(), "y".into(), "agg".into()]
            }]
        );
    }

    #[test]
    fn test_validate_orphan_warning() {
        let model = graph(json!({
            "nodes": [
                {"id": "src", "type": "t", "inputs": []},
                {"id": "lonely", "type": "t"},
                {"id": "b", "type": "t"},
                {"id": "c", "type": "t"},
                {"id": "fed", "type": "t"}
            ],
            "connections": [
                {"source": "b", "target": "c"},
                {"source": "src", "target": "fed"}
            ]
        }));
        let workflow = validate(&model).unwrap();
        // c has an incoming connection but hangs off the unreachable b
        let orphans: Vec<&str> = workflow
            .warnings()
            .iter()
            .map(|w| match w {
                ValidationWarning::Orphan {
                    node_id,
                } => node_id.as_str(),
            })
            .collect();
        assert_eq!(orphans, vec!["lonely", "b", "c"]);
    }
}
