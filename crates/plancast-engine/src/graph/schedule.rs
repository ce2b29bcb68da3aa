use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use plancast_core::error::{PlancastError, Result};
use plancast_core::types::{Graph, ScheduleResult, Step};

/// Accumulated hours are snapped to a 1e-9 h grid so that sums of fractional
/// durations compare equal when their real values are equal.
const HOURS_GRID: f64 = 1e9;
const HOURS_EPSILON: f64 = 1e-9;

fn snap(hours: f64) -> f64 {
    (hours * HOURS_GRID).round() / HOURS_GRID
}

/// `a` is longer than `b` by more than rounding noise.
fn longer(a: f64, b: f64) -> bool {
    a - b > HOURS_EPSILON / 2.0
}

fn same_length(a: f64, b: f64) -> bool {
    !longer(a, b) && !longer(b, a)
}

/// Per-node bookkeeping for the longest-path pass.
#[derive(Debug, Clone, Copy)]
struct PathState<'a> {
    /// Longest duration-weighted path ending at this node.
    accum: f64,
    /// Number of steps on that path.
    hops: usize,
    /// Predecessor on that path.
    back: Option<&'a str>,
    level: usize,
}

/// Compute the critical path and the parallel-step partition.
///
/// Missing durations count as zero. A cycle here means the graph did not come
/// from [`build_graph`](super::build_graph) and is reported as a
/// `GraphInvariant` error.
pub fn analyze_schedule(graph: &Graph, steps: &[Step]) -> Result<ScheduleResult> {
    let durations: HashMap<&str, f64> = steps
        .iter()
        .map(|s| (s.id.as_str(), s.duration()))
        .collect();

    let mut predecessors: BTreeMap<&str, BTreeSet<&str>> = graph
        .nodes
        .iter()
        .map(|n| (n.as_str(), BTreeSet::new()))
        .collect();
    let mut successors: BTreeMap<&str, BTreeSet<&str>> = predecessors.clone();

    for edge in &graph.edges {
        if !predecessors.contains_key(edge.from.as_str())
            || !predecessors.contains_key(edge.to.as_str())
        {
            return Err(PlancastError::GraphInvariant(format!(
                "edge {} -> {} references a node outside the graph",
                edge.from, edge.to
            )));
        }
        predecessors
            .entry(edge.to.as_str())
            .or_default()
            .insert(edge.from.as_str());
        successors
            .entry(edge.from.as_str())
            .or_default()
            .insert(edge.to.as_str());
    }

    let order = topological_order(&predecessors, &successors)?;

    let mut states: HashMap<&str, PathState> = HashMap::with_capacity(order.len());
    for &node in &order {
        let mut best: Option<(&str, PathState)> = None;
        let mut level = 0;
        for &pred in &predecessors[node] {
            let state = states[pred];
            level = level.max(state.level + 1);
            // Ascending iteration: only a strictly longer path replaces the
            // current choice, so ties keep the smaller id.
            if best.map_or(true, |(_, b)| longer(state.accum, b.accum)) {
                best = Some((pred, state));
            }
        }

        let duration = durations.get(node).copied().unwrap_or(0.0);
        let state = match best {
            Some((pred, b)) => PathState {
                accum: snap(b.accum + duration),
                hops: b.hops + 1,
                back: Some(pred),
                level,
            },
            None => PathState {
                accum: snap(duration),
                hops: 1,
                back: None,
                level: 0,
            },
        };
        states.insert(node, state);
    }

    // End of the critical path: longest duration, then most steps, then
    // smallest id.
    let mut end: Option<(&str, PathState)> = None;
    for &node in predecessors.keys() {
        let state = states[node];
        let better = match end {
            None => true,
            Some((_, e)) => {
                longer(state.accum, e.accum)
                    || (same_length(state.accum, e.accum) && state.hops > e.hops)
            }
        };
        if better {
            end = Some((node, state));
        }
    }

    let mut critical_path = Vec::new();
    let mut critical_path_hours = 0.0;
    if let Some((node, state)) = end {
        critical_path_hours = state.accum;
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            critical_path.push(id.to_string());
            cursor = states[id].back;
        }
        critical_path.reverse();
    }

    let mut levels: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for &node in predecessors.keys() {
        levels
            .entry(states[node].level)
            .or_default()
            .push(node.to_string());
    }
    let parallel_groups: Vec<Vec<String>> = levels.into_values().collect();

    debug!(
        critical_path = ?critical_path,
        critical_path_hours,
        groups = parallel_groups.len(),
        "Schedule analyzed"
    );

    Ok(ScheduleResult {
        critical_path,
        critical_path_hours,
        parallel_groups,
        topological_order: order.iter().map(|n| n.to_string()).collect(),
    })
}

/// Kahn's algorithm with an ordered ready set (smallest id first).
fn topological_order<'a>(
    predecessors: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    successors: &BTreeMap<&'a str, BTreeSet<&'a str>>,
) -> Result<Vec<&'a str>> {
    let mut in_degree: HashMap<&str, usize> = predecessors
        .iter()
        .map(|(node, preds)| (*node, preds.len()))
        .collect();
    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();

    let mut order = Vec::with_capacity(predecessors.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &successors[node] {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(next);
                }
            }
        }
    }

    if order.len() != predecessors.len() {
        return Err(PlancastError::GraphInvariant(format!(
            "cycle among {} nodes reached the schedule analyzer",
            predecessors.len() - order.len()
        )));
    }
    Ok(order)
}
