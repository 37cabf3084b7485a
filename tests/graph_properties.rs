// tests/graph_properties.rs

use std::collections::{HashMap, HashSet};
use std::error::Error;

use pipedag::dag::DependencyGraph;
use pipedag::errors::PipelineError;
use proptest::prelude::*;

type TestResult = Result<(), Box<dyn Error>>;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Tasks named `task_0..task_n`; task `i` may only depend on tasks `< i`,
/// which keeps every generated graph acyclic.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let deps: HashSet<usize> = if i == 0 {
                        HashSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    let mut deps: Vec<String> =
                        deps.into_iter().map(|d| format!("task_{d}")).collect();
                    deps.sort();
                    (format!("task_{i}"), deps)
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn topological_order_puts_prerequisites_first(tasks in dag_strategy(12)) {
        let mut graph = DependencyGraph::new();
        for (name, deps) in &tasks {
            graph.add_task_with_dependencies(name, deps).unwrap();
        }

        let order = graph.topological_order().unwrap();
        prop_assert_eq!(order.len(), tasks.len());

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        for (name, deps) in &tasks {
            for dep in deps {
                prop_assert!(
                    position[dep.as_str()] < position[name.as_str()],
                    "{} must come before {}", dep, name
                );
            }
        }
    }

    #[test]
    fn rejected_back_edge_leaves_graph_unchanged(
        tasks in dag_strategy(10),
        pick in any::<usize>(),
    ) {
        let mut graph = DependencyGraph::new();
        for (name, deps) in &tasks {
            graph.add_task_with_dependencies(name, deps).unwrap();
        }

        // Re-declaring an existing task as depending on the last task closes
        // a cycle whenever the last task transitively depends on it.
        let last = tasks.len() - 1;
        let target = pick % tasks.len();
        let nodes_before = graph.node_count();
        let edges_before = graph.edge_count();
        let order_before = graph.topological_order().unwrap();

        let result = graph.add_task_with_dependencies(
            &format!("task_{target}"),
            &[format!("task_{last}")],
        );

        if target == last {
            prop_assert!(matches!(result, Err(PipelineError::CycleDetected(_))));
        }
        if result.is_err() {
            prop_assert_eq!(graph.node_count(), nodes_before);
            prop_assert_eq!(graph.edge_count(), edges_before);
            prop_assert_eq!(graph.topological_order().unwrap(), order_before);
        }
    }
}

#[test]
fn cycle_is_rejected_and_rolled_back() -> TestResult {
    let mut graph = DependencyGraph::new();
    graph.add_task_with_dependencies("A", &[])?;
    graph.add_task_with_dependencies("B", &names(&["A"]))?;
    graph.add_task_with_dependencies("C", &names(&["B"]))?;

    let (nodes, edges) = (graph.node_count(), graph.edge_count());

    // A already exists; making it depend on C closes A -> B -> C -> A.
    let err = graph
        .add_task_with_dependencies("A", &names(&["C"]))
        .expect_err("cycle must be rejected");
    assert!(matches!(err, PipelineError::CycleDetected(_)), "got {err:?}");

    assert_eq!(graph.node_count(), nodes);
    assert_eq!(graph.edge_count(), edges);
    assert!(graph.is_acyclic());
    assert_eq!(graph.topological_order()?, names(&["A", "B", "C"]));
    Ok(())
}

#[test]
fn unknown_dependency_adds_nothing() -> TestResult {
    let mut graph = DependencyGraph::new();
    graph.add_task_with_dependencies("A", &[])?;

    let err = graph
        .add_task_with_dependencies("B", &names(&["A", "ghost"]))
        .expect_err("unknown dependency must be rejected");

    match err {
        PipelineError::UnknownDependency { task, dependency } => {
            assert_eq!(task, "B");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }

    assert!(!graph.contains("B"));
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0, "edge A -> B must be rolled back");
    Ok(())
}

#[test]
fn self_dependency_is_a_cycle() -> TestResult {
    let mut graph = DependencyGraph::new();
    graph.add_task_with_dependencies("A", &[])?;

    graph.add_node("D");
    let err = graph
        .add_task_with_dependencies("D", &names(&["D"]))
        .expect_err("self dependency must be rejected");
    assert!(matches!(err, PipelineError::CycleDetected(_)), "got {err:?}");

    // D existed before the call, so only its self loop is removed.
    assert!(graph.contains("D"));
    assert_eq!(graph.edge_count(), 0);
    assert!(graph.is_acyclic());
    Ok(())
}

#[test]
fn ties_are_broken_by_insertion_order() -> TestResult {
    let mut graph = DependencyGraph::new();
    graph.add_task_with_dependencies("zeta", &[])?;
    graph.add_task_with_dependencies("alpha", &[])?;
    graph.add_task_with_dependencies("mid", &names(&["zeta", "alpha"]))?;
    graph.add_task_with_dependencies("beta", &[])?;

    assert_eq!(
        graph.topological_order()?,
        names(&["zeta", "alpha", "mid", "beta"])
    );
    assert_eq!(graph.roots(), names(&["zeta", "alpha", "beta"]));
    assert_eq!(graph.dependencies_of("mid"), names(&["zeta", "alpha"]));
    assert_eq!(graph.dependents_of("alpha"), names(&["mid"]));
    Ok(())
}

#[test]
fn add_edge_rejects_cycles_and_duplicate_edges_are_ignored() -> TestResult {
    let mut graph = DependencyGraph::new();
    graph.add_node("A");
    graph.add_node("B");

    graph.add_edge("A", "B")?;
    graph.add_edge("A", "B")?;
    assert_eq!(graph.edge_count(), 1);

    let err = graph.add_edge("B", "A").expect_err("B -> A closes a cycle");
    assert!(matches!(err, PipelineError::CycleDetected(_)));
    assert_eq!(graph.edge_count(), 1);

    let err = graph.add_edge("A", "missing").expect_err("unknown node");
    assert!(matches!(err, PipelineError::UnknownDependency { .. }));
    Ok(())
}
