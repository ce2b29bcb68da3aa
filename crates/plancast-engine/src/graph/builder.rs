use std::collections::{btree_set, BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use plancast_core::error::{PlancastError, Result};
use plancast_core::types::{Edge, Graph, Step};

/// A validated graph together with the steps it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltGraph {
    pub graph: Graph,
    /// Steps with duplicate dependency entries collapsed.
    pub steps: Vec<Step>,
}

/// Build a DAG from step declarations.
///
/// Fails with `DuplicateStepId`, `InvalidDuration`, `UnknownDependency` or
/// `CyclicDependency`; no partial graph is returned.
pub fn build_graph(steps: &[Step]) -> Result<BuiltGraph> {
    let mut registered: HashSet<&str> = HashSet::with_capacity(steps.len());
    for step in steps {
        if !registered.insert(step.id.as_str()) {
            return Err(PlancastError::DuplicateStepId(step.id.clone()));
        }
        if let Some(hours) = step.estimated_time_hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(PlancastError::InvalidDuration {
                    step: step.id.clone(),
                    value: hours,
                });
            }
        }
    }

    let mut edges = Vec::new();
    let mut rebuilt = Vec::with_capacity(steps.len());
    for step in steps {
        let mut seen = HashSet::new();
        let mut dependencies = Vec::with_capacity(step.dependencies.len());
        for dep in &step.dependencies {
            if !registered.contains(dep.as_str()) {
                return Err(PlancastError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
            if seen.insert(dep.as_str()) {
                dependencies.push(dep.clone());
                edges.push(Edge::new(dep.clone(), step.id.clone()));
            }
        }
        rebuilt.push(Step {
            dependencies,
            ..step.clone()
        });
    }

    let graph = Graph {
        nodes: steps.iter().map(|s| s.id.clone()).collect(),
        edges,
    };

    if let Some(cycle) = find_cycle(&graph) {
        return Err(PlancastError::CyclicDependency { cycle });
    }

    debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "Dependency graph built"
    );
    Ok(BuiltGraph {
        graph,
        steps: rebuilt,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search for a cycle. Returns the node sequence of the first
/// cycle found, starting and ending at the re-visited node.
pub(crate) fn find_cycle(graph: &Graph) -> Option<Vec<String>> {
    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = graph
        .nodes
        .iter()
        .map(|n| (n.as_str(), BTreeSet::new()))
        .collect();
    for edge in &graph.edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .insert(edge.to.as_str());
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    for &start in adjacency.keys() {
        if marks.contains_key(start) {
            continue;
        }
        if let Some(cycle) = visit(start, &adjacency, &mut marks) {
            return Some(cycle);
        }
    }
    None
}

/// Iterative DFS from `start`. Each frame holds a node and the successors it
/// has yet to explore; the frames double as the current path.
fn visit<'a>(
    start: &'a str,
    adjacency: &'a BTreeMap<&'a str, BTreeSet<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
) -> Option<Vec<String>> {
    let successors_of = |node: &str| adjacency.get(node).map(|s| s.iter()).unwrap_or_default();
    let mut stack: Vec<(&'a str, btree_set::Iter<'a, &'a str>)> = vec![(start, successors_of(start))];
    marks.insert(start, Mark::Visiting);

    while let Some((_, pending)) = stack.last_mut() {
        let Some(&next) = pending.next() else {
            if let Some((done, _)) = stack.pop() {
                marks.insert(done, Mark::Done);
            }
            continue;
        };
        match marks.get(next).copied() {
            Some(Mark::Visiting) => {
                let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[from..].iter().map(|(n, _)| n.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                marks.insert(next, Mark::Visiting);
                stack.push((next, successors_of(next)));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(graph: &Graph) -> BTreeSet<String> {
        graph.nodes.iter().cloned().collect()
    }

    #[test]
    fn builds_edges_dependency_to_dependent() {
        let steps = vec![
            Step::new("a", "Design schema"),
            Step::new("b", "Build API").depends_on("a"),
            Step::new("c", "Write docs").depends_on("a").depends_on("b"),
        ];
        let built = build_graph(&steps).unwrap();
        assert_eq!(built.graph.nodes, vec!["a", "b", "c"]);
        assert_eq!(
            built.graph.edges,
            vec![Edge::new("a", "b"), Edge::new("a", "c"), Edge::new("b", "c")]
        );
        assert_eq!(built.steps.len(), 3);
    }

    #[test]
    fn node_set_equals_step_ids() {
        let steps = vec![
            Step::new("z", "last"),
            Step::new("m", "middle").depends_on("z"),
            Step::new("a", "alone"),
        ];
        let built = build_graph(&steps).unwrap();
        let expected: BTreeSet<String> = steps.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids(&built.graph), expected);
    }

    #[test]
    fn empty_plan_builds_empty_graph() {
        let built = build_graph(&[]).unwrap();
        assert!(built.graph.is_empty());
        assert!(built.graph.edges.is_empty());
    }

    #[test]
    fn duplicate_id_rejected() {
        let steps = vec![Step::new("a", "one"), Step::new("a", "two")];
        match build_graph(&steps) {
            Err(PlancastError::DuplicateStepId(id)) => assert_eq!(id, "a"),
            other => panic!("expected DuplicateStepId, got {:?}", other),
        }
    }

    #[test]
    fn unknown_dependency_rejected() {
        let steps = vec![Step::new("a", "one").depends_on("ghost")];
        match build_graph(&steps) {
            Err(PlancastError::UnknownDependency { step, dependency }) => {
                assert_eq!(step, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected UnknownDependency, got {:?}", other),
        }
    }

    #[test]
    fn forward_references_are_allowed() {
        let steps = vec![Step::new("b", "second").depends_on("a"), Step::new("a", "first")];
        let built = build_graph(&steps).unwrap();
        assert_eq!(built.graph.edges, vec![Edge::new("a", "b")]);
    }

    #[test]
    fn duplicate_dependencies_collapsed() {
        let steps = vec![
            Step::new("a", "one"),
            Step::new("b", "two").depends_on("a").depends_on("a"),
        ];
        let built = build_graph(&steps).unwrap();
        assert_eq!(built.steps[1].dependencies, vec!["a"]);
        assert_eq!(built.graph.edges.len(), 1);
    }

    #[test]
    fn negative_duration_rejected() {
        let steps = vec![Step::new("a", "one").with_hours(-1.0)];
        assert!(matches!(
            build_graph(&steps),
            Err(PlancastError::InvalidDuration { .. })
        ));
        let steps = vec![Step::new("a", "one").with_hours(f64::NAN)];
        assert!(matches!(
            build_graph(&steps),
            Err(PlancastError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn three_cycle_detected() {
        let steps = vec![
            Step::new("a", "one").depends_on("c"),
            Step::new("b", "two").depends_on("a"),
            Step::new("c", "three").depends_on("b"),
        ];
        match build_graph(&steps) {
            Err(PlancastError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn cycle_report_independent_of_declaration_order() {
        let forward = vec![
            Step::new("a", "one").depends_on("c"),
            Step::new("b", "two").depends_on("a"),
            Step::new("c", "three").depends_on("b"),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        let rotated = vec![forward[1].clone(), forward[2].clone(), forward[0].clone()];

        let cycle_of = |steps: &[Step]| match build_graph(steps) {
            Err(PlancastError::CyclicDependency { cycle }) => cycle,
            other => panic!("expected CyclicDependency, got {:?}", other),
        };
        let expected = cycle_of(&forward);
        assert_eq!(cycle_of(&reversed), expected);
        assert_eq!(cycle_of(&rotated), expected);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let steps = vec![Step::new("a", "loop").depends_on("a")];
        match build_graph(&steps) {
            Err(PlancastError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["a", "a"]),
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn long_chain_does_not_exhaust_the_stack() {
        let id = |i: usize| format!("s{:06}", i);
        let mut steps = vec![Step::new(id(0), "start")];
        for i in 1..200_000 {
            steps.push(Step::new(id(i), "next").depends_on(id(i - 1)));
        }
        let built = build_graph(&steps).unwrap();
        assert_eq!(built.graph.edges.len(), 199_999);

        steps[0] = Step::new(id(0), "start").depends_on(id(199_999));
        match build_graph(&steps) {
            Err(PlancastError::CyclicDependency { cycle }) => assert_eq!(cycle.len(), 200_001),
            other => panic!("expected CyclicDependency, got {:?}", other.map(|b| b.graph.edges.len())),
        }
    }

    #[test]
    fn cycle_behind_acyclic_prefix() {
        let steps = vec![
            Step::new("root", "start"),
            Step::new("x", "x").depends_on("root").depends_on("y"),
            Step::new("y", "y").depends_on("x"),
        ];
        match build_graph(&steps) {
            Err(PlancastError::CyclicDependency { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(!cycle.contains(&"root".to_string()));
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }
}
