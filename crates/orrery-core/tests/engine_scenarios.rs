//! End-to-end scenarios for the reactive engine: planning, invariants, and
//! the execution semantics of the in-process kernel.
//!
//! Scenarios that need the isolated worker subprocess (timeouts, interrupt
//! self-healing) live in worker_channel.rs.

use orrery_core::engine::{CellStatus, ReactiveEngine};
use orrery_core::graph::{CellGraph, CellId};
use orrery_core::interp::Session;

fn ids(plan: &[CellId]) -> Vec<&str> {
    plan.iter().map(CellId::as_str).collect()
}

fn engine_with(cells: &[(&str, &str)]) -> ReactiveEngine {
    let mut engine = ReactiveEngine::new();
    for (id, code) in cells {
        engine.add_cell(Some((*id).into()), code, None);
    }
    engine
}

/// S1: edit a producer, its consumer re-runs after it.
#[test]
fn scenario_simple_chain() {
    let mut engine = engine_with(&[("A", "x = 10"), ("B", "y = x + 1")]);
    let plan = engine.on_cell_changed(&"A".into(), "x = 10").unwrap();
    assert_eq!(ids(&plan), vec!["A", "B"]);

    // Kernel half: running the plan leaves x=10, y=11 in the namespace.
    let mut kernel = Session::new();
    for id in &plan {
        let cell = engine.get_cell(id).unwrap();
        let out = kernel.execute(&cell.code);
        assert!(out.success, "{}", out.error);
    }
    assert_eq!(kernel.get_var("x").unwrap(), serde_json::json!(10));
    assert_eq!(kernel.get_var("y").unwrap(), serde_json::json!(11));
}

/// S2: a cell above depends on cells below it; over the full notebook the
/// producers run first and the consumer sees their values.
#[test]
fn scenario_consumers_above_producers() {
    let engine = engine_with(&[("A", "result = x + y"), ("B", "x = 10"), ("C", "y = 20")]);
    let plan = engine.build_graph().unwrap().plan_all();
    assert_eq!(ids(&plan), vec!["B", "C", "A"]);

    let mut kernel = Session::new();
    for id in &plan {
        let out = kernel.execute(&engine.get_cell(id).unwrap().code);
        assert!(out.success, "{}", out.error);
    }
    assert_eq!(kernel.get_var("result").unwrap(), serde_json::json!(30));

    // Editing a producer below re-runs the consumer above it.
    let mut engine = engine;
    let plan = engine.on_cell_changed(&"B".into(), "x = 10").unwrap();
    assert_eq!(ids(&plan), vec!["B", "A"]);
}

/// S3: a two-cell cycle is reported with display positions.
#[test]
fn scenario_circular_dependency() {
    let mut engine = engine_with(&[("A", "a = b"), ("B", "b = a")]);
    let err = engine.on_cell_changed(&"A".into(), "a = b").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Circular dependency"), "{message}");
    assert!(message.contains("cell 1"), "{message}");
    assert!(message.contains("cell 2"), "{message}");
}

/// S4: a duplicate definition is reported with every offending cell.
#[test]
fn scenario_duplicate_definition() {
    let mut engine = engine_with(&[("A", "x = 10"), ("B", "")]);
    let err = engine.on_cell_changed(&"B".into(), "x = 20").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Variable 'x' is defined in multiple cells: cell 1, cell 2"
    );
}

/// S6: two consecutive edits; the second plan recomputes downstream values.
#[test]
fn scenario_edit_producer_twice() {
    let mut engine = engine_with(&[("A", "result = x * 2"), ("B", "x = 5")]);
    let mut kernel = Session::new();

    let plan = engine.on_cell_changed(&"B".into(), "x = 5").unwrap();
    assert_eq!(ids(&plan), vec!["B", "A"]);
    for id in &plan {
        kernel.execute(&engine.get_cell(id).unwrap().code);
    }
    assert_eq!(kernel.get_var("result").unwrap(), serde_json::json!(10));

    let plan = engine.on_cell_changed(&"B".into(), "x = 10").unwrap();
    assert_eq!(ids(&plan), vec!["B", "A"]);
    for id in &plan {
        kernel.execute(&engine.get_cell(id).unwrap().code);
    }
    assert_eq!(kernel.get_var("result").unwrap(), serde_json::json!(20));
}

/// S7: diamond dependencies execute each cell exactly once, in order.
#[test]
fn scenario_diamond() {
    let mut engine = engine_with(&[
        ("A", "a = 1"),
        ("B", "b = a * 2"),
        ("C", "c = a * 3"),
        ("D", "d = b + c"),
    ]);
    let plan = engine.on_cell_changed(&"A".into(), "a = 10").unwrap();
    assert_eq!(ids(&plan), vec!["A", "B", "C", "D"]);

    let mut kernel = Session::new();
    for id in &plan {
        kernel.execute(&engine.get_cell(id).unwrap().code);
    }
    assert_eq!(kernel.get_var("d").unwrap(), serde_json::json!(50));
}

// ---- universally quantified invariants -----------------------------------

/// Invariant 1: no cell ever depends on itself.
#[test]
fn invariant_no_self_loops() {
    let cells: Vec<(CellId, &str)> = vec![
        ("a".into(), "x = x + 1"),
        ("b".into(), "y = x"),
        ("c".into(), "z = z if z else 0"),
    ];
    // a and c read their own symbol; with unique definers this builds.
    let graph = CellGraph::build(&cells).unwrap();
    for (id, _) in &cells {
        assert!(!graph.deps(id).contains(id), "self-loop on {id}");
    }
}

/// Invariant 2: exactly the definer→user edges exist.
#[test]
fn invariant_edges_match_symbols() {
    let cells: Vec<(CellId, &str)> = vec![
        ("a".into(), "x = 1"),
        ("b".into(), "y = x + unrelated_free_var"),
        ("c".into(), "z = 3"),
    ];
    let graph = CellGraph::build(&cells).unwrap();
    assert_eq!(graph.deps(&"b".into()), vec![CellId::from("a")]);
    assert!(graph.deps(&"a".into()).is_empty());
    assert!(graph.deps(&"c".into()).is_empty());
    assert!(graph.dependents(&"c".into()).is_empty());
}

/// Invariant 3/idempotence: planning twice over an unchanged graph gives
/// the same plan.
#[test]
fn invariant_planning_is_idempotent() {
    let mut engine = engine_with(&[
        ("a", "base = 1"),
        ("b", "mid = base * 2"),
        ("c", "top = mid + base"),
    ]);
    let first = engine.on_cell_changed(&"a".into(), "base = 1").unwrap();
    let second = engine.on_cell_changed(&"a".into(), "base = 1").unwrap();
    assert_eq!(first, second);
}

/// Invariant 4: the dirty set is exactly {x} ∪ transitive dependents.
#[test]
fn invariant_dirty_set_is_reverse_closure() {
    let cells: Vec<(CellId, &str)> = vec![
        ("a".into(), "x = 1"),
        ("b".into(), "y = x"),
        ("c".into(), "z = y"),
        ("d".into(), "w = 1000"),
    ];
    let graph = CellGraph::build(&cells).unwrap();
    let dirty = graph.dirty_set(&"b".into());
    assert!(dirty.contains(&"b".into()));
    assert!(dirty.contains(&"c".into()));
    assert!(!dirty.contains(&"a".into()));
    assert!(!dirty.contains(&"d".into()));
}

/// Invariant 5: builtins and `_`-prefixed names never induce edges.
#[test]
fn invariant_builtins_and_private_names_never_link() {
    let cells: Vec<(CellId, &str)> = vec![
        ("a".into(), "print = 1"),
        ("b".into(), "data = [1, 2]\n_scratch = len(data)"),
        ("c".into(), "n = len([3])\nm = _scratch if False else 0"),
    ];
    // Cell a defines `print` (allowed: definitions are not filtered), but
    // b/c's calls to len() and reads of _scratch produce no edges.
    let graph = CellGraph::build(&cells).unwrap();
    assert!(graph.deps(&"b".into()).is_empty());
    assert!(graph.deps(&"c".into()).is_empty());
}

/// Boundary: empty source has empty symbol sets and an empty-output run.
#[test]
fn boundary_empty_cell() {
    let symbols = orrery_core::extract("");
    assert!(symbols.defined.is_empty());
    assert!(symbols.used.is_empty());

    let mut kernel = Session::new();
    let out = kernel.execute("");
    assert!(out.success);
    assert_eq!(out.output, "");
    assert_eq!(out.error, "");
}

/// Boundary: syntactically broken source induces no edges and plans alone.
#[test]
fn boundary_broken_cell_is_isolated() {
    let mut engine = engine_with(&[("a", "x = 1"), ("b", "y = x")]);
    let plan = engine.on_cell_changed(&"b".into(), "y = x +").unwrap();
    assert_eq!(ids(&plan), vec!["b"]);

    // Fixing the cell restores the edge.
    let plan = engine.on_cell_changed(&"b".into(), "y = x + 1").unwrap();
    assert_eq!(ids(&plan), vec!["b"]);
    let plan = engine.on_cell_changed(&"a".into(), "x = 2").unwrap();
    assert_eq!(ids(&plan), vec!["a", "b"]);
}

/// Deleting a cell mid-notebook keeps planning consistent.
#[test]
fn delete_then_plan() {
    let mut engine = engine_with(&[("a", "x = 1"), ("b", "y = x"), ("c", "z = y")]);
    assert!(engine.delete_cell(&"b".into()));
    // y is now undefined; c has no producer and plans alone.
    let plan = engine.on_cell_changed(&"c".into(), "z = y").unwrap();
    assert_eq!(ids(&plan), vec!["c"]);
}

/// execute_all refuses to run while the notebook has a graph error.
#[test]
fn execute_all_checks_invariants_first() {
    let mut engine = engine_with(&[("a", "x = 1"), ("b", "x = 2")]);
    assert!(engine.execute_all().is_err());
}

/// Status stamping on graph errors touches only the edited cell.
#[test]
fn graph_error_leaves_other_cells_untouched() {
    let mut engine = engine_with(&[("a", "x = 1"), ("b", "y = 2")]);
    engine.on_cell_changed(&"b".into(), "x = 2").unwrap_err();

    assert_eq!(engine.get_cell(&"a".into()).unwrap().status, CellStatus::Idle);
    assert_eq!(engine.get_cell(&"b".into()).unwrap().status, CellStatus::Error);

    // Repairing the edit clears the way for a normal plan again.
    let plan = engine.on_cell_changed(&"b".into(), "y = x + 1").unwrap();
    assert_eq!(ids(&plan), vec!["b"]);
}
