//! Pre-execution graph validation
//!
//! The validator is the sole guard against malformed inputs: once a run
//! starts, the scheduler assumes the graph is well-formed and never
//! re-checks topology. A failed validation surfaces as one
//! `swarm_error` before any node runs.
//!
//! Checks, in order:
//!
//! 1. **Dangling references**: every edge endpoint and conditional
//!    target must name a node in the graph.
//! 2. **Orphans**: every non-dynamic node must be schedulable. Either
//!    it starts the run (no incoming regular edge, not a conditional
//!    target) or it is reachable from a starting node through regular
//!    or conditional edges.
//! 3. **Unbounded cycles**: any cycle in the regular-edge subgraph
//!    must consist entirely of feedback edges (`max_cycles` present).
//!    Detection is a three-color depth-first search; every edge on the
//!    recovered cycle path is inspected.
//! 4. **Provider references**: when a registry is supplied, every
//!    `providerId` on a node or LLM evaluator must resolve.
//!
//! The validator also reports a coarse cost estimate (half a cent per
//! node). The estimate is advisory and never fails validation.

use crate::graph::{Evaluator, NodeId, SwarmGraph};
use crate::error::{Result, SwarmError};
use crate::provider::ProviderRegistry;
use std::collections::{HashMap, HashSet};

/// Advisory output of a successful validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    /// Coarse cost estimate in cents (~0.5¢ per node, rounded up)
    pub estimated_cost_cents: u64,
}

/// Validate a graph before execution
pub fn validate(graph: &SwarmGraph, registry: Option<&ProviderRegistry>) -> Result<ValidationReport> {
    check_references(graph)?;
    check_orphans(graph)?;
    check_cycles(graph)?;
    if let Some(registry) = registry {
        check_providers(graph, registry)?;
    }

    Ok(ValidationReport {
        estimated_cost_cents: (graph.node_count() as u64).div_ceil(2),
    })
}

fn check_references(graph: &SwarmGraph) -> Result<()> {
    for edge in graph.edges() {
        if graph.get_node(&edge.from).is_none() {
            return Err(SwarmError::Validation(format!(
                "edge source '{}' does not exist",
                edge.from
            )));
        }
        if graph.get_node(&edge.to).is_none() {
            return Err(SwarmError::Validation(format!(
                "edge target '{}' does not exist",
                edge.to
            )));
        }
    }

    for cond in graph.conditional_edges() {
        if graph.get_node(&cond.from).is_none() {
            return Err(SwarmError::Validation(format!(
                "conditional edge source '{}' does not exist",
                cond.from
            )));
        }
        for (label, target) in &cond.targets {
            if graph.get_node(target).is_none() {
                return Err(SwarmError::Validation(format!(
                    "conditional target '{}' (label '{}') does not exist",
                    target, label
                )));
            }
        }
    }

    Ok(())
}

fn check_orphans(graph: &SwarmGraph) -> Result<()> {
    let conditional_targets = graph.conditional_targets();

    // Starting nodes: nothing gates them, so the scheduler picks them
    // in the first wave.
    let starts: Vec<NodeId> = graph
        .node_ids()
        .into_iter()
        .filter(|id| {
            graph.incoming_edges(id).is_empty() && !conditional_targets.contains(id)
        })
        .collect();

    // Walk regular and conditional edges from the starting set.
    let mut reachable: HashSet<NodeId> = HashSet::new();
    let mut stack = starts;
    while let Some(id) = stack.pop() {
        if !reachable.insert(id.clone()) {
            continue;
        }
        for edge in graph.outgoing_edges(&id) {
            stack.push(edge.to.clone());
        }
        for cond in graph.conditional_edges_from(&id) {
            for target in cond.targets.values() {
                stack.push(target.clone());
            }
        }
    }

    for id in graph.node_ids() {
        if !reachable.contains(&id) && !graph.dynamic_nodes().contains(&id) {
            return Err(SwarmError::Validation(format!(
                "node '{}' is an orphan: it has no path from any starting node",
                id
            )));
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

fn check_cycles(graph: &SwarmGraph) -> Result<()> {
    // A (from, to) pair is bounded only when every parallel edge over
    // it carries max_cycles; one unbounded edge is enough to make a
    // cycle through the pair unbounded.
    let mut bounded: HashMap<(NodeId, NodeId), bool> = HashMap::new();
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in graph.edges() {
        let key = (edge.from.clone(), edge.to.clone());
        let entry = bounded.entry(key).or_insert(true);
        *entry = *entry && edge.max_cycles.is_some();
        adjacency
            .entry(edge.from.clone())
            .or_default()
            .push(edge.to.clone());
    }

    let mut colors: HashMap<NodeId, Color> = graph
        .node_ids()
        .into_iter()
        .map(|id| (id, Color::White))
        .collect();

    for id in graph.node_ids() {
        if colors[&id] == Color::White {
            dfs(&id, &adjacency, &mut colors, &mut Vec::new(), &bounded)?;
        }
    }

    Ok(())
}

fn dfs(
    node: &NodeId,
    adjacency: &HashMap<NodeId, Vec<NodeId>>,
    colors: &mut HashMap<NodeId, Color>,
    path: &mut Vec<NodeId>,
    bounded: &HashMap<(NodeId, NodeId), bool>,
) -> Result<()> {
    colors.insert(node.clone(), Color::Gray);
    path.push(node.clone());

    if let Some(neighbors) = adjacency.get(node) {
        for next in neighbors {
            match colors.get(next).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    // Back edge: recover the cycle path and inspect
                    // every edge on it.
                    let start = path.iter().position(|n| n == next).unwrap_or(0);
                    let mut cycle: Vec<NodeId> = path[start..].to_vec();
                    cycle.push(next.clone());

                    for pair in cycle.windows(2) {
                        let key = (pair[0].clone(), pair[1].clone());
                        if !bounded.get(&key).copied().unwrap_or(false) {
                            return Err(SwarmError::Validation(format!(
                                "cycle through '{}' contains edge '{}' -> '{}' without maxCycles",
                                next, pair[0], pair[1]
                            )));
                        }
                    }
                }
                Color::White => dfs(next, adjacency, colors, path, bounded)?,
                Color::Black => {}
            }
        }
    }

    path.pop();
    colors.insert(node.clone(), Color::Black);
    Ok(())
}

fn check_providers(graph: &SwarmGraph, registry: &ProviderRegistry) -> Result<()> {
    for id in graph.node_ids() {
        let node = graph.get_node(&id).expect("node_ids yields existing nodes");
        if let Some(provider_id) = &node.agent.provider_id {
            if !registry.contains(provider_id) {
                return Err(SwarmError::Validation(format!(
                    "node '{}' references unknown provider '{}'",
                    id, provider_id
                )));
            }
        }
    }

    for cond in graph.conditional_edges() {
        if let Evaluator::Llm {
            provider_id: Some(provider_id),
            ..
        } = &cond.evaluate
        {
            if !registry.contains(provider_id) {
                return Err(SwarmError::Validation(format!(
                    "evaluator on '{}' references unknown provider '{}'",
                    cond.from, provider_id
                )));
            }
        }
    }

    Ok(())
}
