//! Cell dependency graph: symbol maps, duplicate detection, cycle
//! detection, and execution planning.
//!
//! Edges derive purely from symbol sets — a cell may depend on any other
//! cell regardless of display position (spreadsheet semantics). Display
//! order is used exactly once: as the tiebreaker that makes plans
//! deterministic when several cells are ready at the same time.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::analyze::{SymbolSet, extract};

/// Stable opaque identifier for a cell.
///
/// Auto-generated ids are `cell-` plus 8 hex characters; client-supplied
/// ids are accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("cell-{}", &hex[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CellId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CellId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Graph invariant violations. Positions are 1-indexed display positions,
/// which is how users see cells.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Variable '{symbol}' is defined in multiple cells: {}", position_list(positions))]
    DuplicateDefinition {
        symbol: String,
        positions: Vec<usize>,
    },

    #[error("Circular dependency detected: {}", cycle_trace(trace))]
    CircularDependency { trace: Vec<usize> },
}

fn position_list(positions: &[usize]) -> String {
    positions
        .iter()
        .map(|p| format!("cell {p}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn cycle_trace(trace: &[usize]) -> String {
    trace
        .iter()
        .map(|p| format!("cell {p}"))
        .collect::<Vec<_>>()
        .join(" → ")
}

/// The dependency graph over one snapshot of the cell collection.
#[derive(Debug)]
pub struct CellGraph {
    /// Edges run producer → consumer.
    graph: DiGraph<CellId, ()>,
    node_indices: FxHashMap<CellId, NodeIndex>,
    order: Vec<CellId>,
    position: FxHashMap<CellId, usize>,
    symbols: FxHashMap<CellId, SymbolSet>,
    definers: FxHashMap<String, CellId>,
}

impl CellGraph {
    /// Build the graph for an ordered cell snapshot.
    ///
    /// Duplicate definitions are rejected before cycle detection: with two
    /// definers, "the defining cell" of a symbol is ill-defined and any
    /// cycle trace through it would be meaningless.
    pub fn build(cells: &[(CellId, &str)]) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut node_indices = FxHashMap::default();
        let mut order = Vec::with_capacity(cells.len());
        let mut position = FxHashMap::default();
        let mut symbols = FxHashMap::default();

        for (idx, (id, source)) in cells.iter().enumerate() {
            let node = graph.add_node(id.clone());
            node_indices.insert(id.clone(), node);
            order.push(id.clone());
            position.insert(id.clone(), idx);
            symbols.insert(id.clone(), extract(source));
        }

        // Step 2: duplicate detection over all defined sets.
        let mut definer_positions: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
        for (idx, (id, _)) in cells.iter().enumerate() {
            for symbol in &symbols[id].defined {
                definer_positions.entry(symbol).or_default().push(idx);
            }
        }
        let mut duplicates: Vec<(&str, &Vec<usize>)> = definer_positions
            .iter()
            .filter(|(_, positions)| positions.len() >= 2)
            .map(|(symbol, positions)| (*symbol, positions))
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort_by_key(|(symbol, positions)| (positions[0], *symbol));
            let (symbol, positions) = duplicates[0];
            let mut positions: Vec<usize> = positions.iter().map(|p| p + 1).collect();
            positions.sort_unstable();
            return Err(GraphError::DuplicateDefinition {
                symbol: symbol.to_string(),
                positions,
            });
        }

        // Step 3: the definer map is single-valued once duplicates are out.
        let mut definers = FxHashMap::default();
        for (id, _) in cells {
            for symbol in &symbols[id].defined {
                definers.insert(symbol.clone(), id.clone());
            }
        }

        // Step 4: edges from each used symbol to its definer.
        for (id, _) in cells {
            let mut used: Vec<&String> = symbols[id].used.iter().collect();
            used.sort();
            for symbol in used {
                if let Some(producer) = definers.get(symbol) {
                    if producer != id {
                        let from = node_indices[producer];
                        let to = node_indices[id];
                        graph.update_edge(from, to, ());
                    }
                }
            }
        }

        let built = Self {
            graph,
            node_indices,
            order,
            position,
            symbols,
            definers,
        };

        // Step 5: cycle detection with a trace for the error message.
        built.detect_cycles()?;

        Ok(built)
    }

    /// Three-colour DFS over the dependency direction; an on-stack hit
    /// yields the cycle trace from the repeated cell back to itself.
    fn detect_cycles(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Colour {
            White,
            Grey,
            Black,
        }

        let mut colours: FxHashMap<&CellId, Colour> =
            self.order.iter().map(|id| (id, Colour::White)).collect();

        fn dfs<'a>(
            graph: &'a CellGraph,
            node: &'a CellId,
            colours: &mut FxHashMap<&'a CellId, Colour>,
            path: &mut Vec<&'a CellId>,
        ) -> Option<Vec<&'a CellId>> {
            colours.insert(node, Colour::Grey);
            path.push(node);

            for dep in graph.deps(node) {
                let dep = graph.resolve(&dep);
                match colours[&dep] {
                    Colour::Grey => {
                        let start = path.iter().position(|c| *c == dep).expect("on stack");
                        let mut cycle: Vec<&CellId> = path[start..].to_vec();
                        cycle.push(dep);
                        return Some(cycle);
                    }
                    Colour::White => {
                        if let Some(cycle) = dfs(graph, dep, colours, path) {
                            return Some(cycle);
                        }
                    }
                    Colour::Black => {}
                }
            }

            path.pop();
            colours.insert(node, Colour::Black);
            None
        }

        for id in &self.order {
            if colours[id] == Colour::White {
                let mut path = Vec::new();
                if let Some(cycle) = dfs(self, id, &mut colours, &mut path) {
                    let trace = cycle.iter().map(|id| self.position[*id] + 1).collect();
                    return Err(GraphError::CircularDependency { trace });
                }
            }
        }
        Ok(())
    }

    /// Map an owned id back to its interned reference in `order`.
    fn resolve(&self, id: &CellId) -> &CellId {
        let idx = self.position[id];
        &self.order[idx]
    }

    /// Direct dependencies of a cell (cells it reads from).
    pub fn deps(&self, id: &CellId) -> Vec<CellId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct dependents of a cell (cells that read from it).
    pub fn dependents(&self, id: &CellId) -> Vec<CellId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &CellId, direction: Direction) -> Vec<CellId> {
        self.node_indices
            .get(id)
            .map(|&node| {
                self.graph
                    .neighbors_directed(node, direction)
                    .map(|n| self.graph[n].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The dirty set for an edit: the changed cell plus its transitive
    /// dependents, by breadth-first traversal.
    pub fn dirty_set(&self, changed: &CellId) -> FxHashSet<CellId> {
        let mut dirty = FxHashSet::default();
        if !self.node_indices.contains_key(changed) {
            return dirty;
        }
        dirty.insert(changed.clone());
        let mut queue = VecDeque::from([changed.clone()]);
        while let Some(id) = queue.pop_front() {
            for dependent in self.dependents(&id) {
                if dirty.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        dirty
    }

    /// The execution plan for an edit: the dirty set in topological order,
    /// ties broken by display position.
    pub fn plan_for(&self, changed: &CellId) -> Vec<CellId> {
        self.toposort(&self.dirty_set(changed))
    }

    /// A plan over every cell in the notebook.
    pub fn plan_all(&self) -> Vec<CellId> {
        let all: FxHashSet<CellId> = self.order.iter().cloned().collect();
        self.toposort(&all)
    }

    /// Kahn's algorithm restricted to `subset`. The ready queue is
    /// re-sorted by display index before every pop, so when several cells
    /// are simultaneously ready the topmost runs first.
    fn toposort(&self, subset: &FxHashSet<CellId>) -> Vec<CellId> {
        if subset.is_empty() {
            return Vec::new();
        }

        let mut in_degree: FxHashMap<&CellId, usize> = FxHashMap::default();
        for id in subset {
            let id = self.resolve(id);
            let degree = self
                .deps(id)
                .iter()
                .filter(|dep| subset.contains(dep))
                .count();
            in_degree.insert(id, degree);
        }

        let mut ready: Vec<&CellId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut plan = Vec::with_capacity(subset.len());
        while !ready.is_empty() {
            ready.sort_by_key(|id| self.position[*id]);
            let current = ready.remove(0);
            plan.push(current.clone());

            for dependent in self.dependents(current) {
                if !subset.contains(&dependent) {
                    continue;
                }
                let dependent = self.resolve(&dependent);
                let degree = in_degree.get_mut(&dependent).expect("subset member");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(dependent);
                }
            }
        }

        plan
    }

    /// Symbol sets extracted for a cell.
    pub fn symbols(&self, id: &CellId) -> Option<&SymbolSet> {
        self.symbols.get(id)
    }

    /// The cell that defines a symbol.
    pub fn definer(&self, symbol: &str) -> Option<&CellId> {
        self.definers.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(cells: &[(&str, &str)]) -> Result<CellGraph, GraphError> {
        let owned: Vec<(CellId, &str)> = cells
            .iter()
            .map(|(id, code)| (CellId::from(*id), *code))
            .collect();
        CellGraph::build(&owned)
    }

    fn ids(plan: &[CellId]) -> Vec<&str> {
        plan.iter().map(CellId::as_str).collect()
    }

    #[test]
    fn test_simple_chain() {
        let graph = build(&[("cell1", "x = 10"), ("cell2", "y = x + 1")]).unwrap();
        assert!(graph.deps(&"cell1".into()).is_empty());
        assert_eq!(graph.deps(&"cell2".into()), vec![CellId::from("cell1")]);
    }

    #[test]
    fn test_reverse_order_dependency() {
        // Spreadsheet semantics: a cell may depend on a cell below it.
        let graph = build(&[("cell1", "y = x + 1"), ("cell2", "x = 10")]).unwrap();
        assert_eq!(graph.deps(&"cell1".into()), vec![CellId::from("cell2")]);
        assert!(graph.deps(&"cell2".into()).is_empty());
    }

    #[test]
    fn test_diamond_dependency() {
        let graph = build(&[
            ("cell1", "a = 1"),
            ("cell2", "b = a"),
            ("cell3", "c = a"),
            ("cell4", "d = b + c"),
        ])
        .unwrap();
        let mut deps4 = graph.deps(&"cell4".into());
        deps4.sort();
        assert_eq!(deps4, vec![CellId::from("cell2"), CellId::from("cell3")]);
    }

    #[test]
    fn test_no_self_loop() {
        // A cell that reads and defines the same symbol does not depend on
        // itself.
        let graph = build(&[("cell1", "x = 10"), ("cell2", "x = x + 1")]);
        // Two definers of x: duplicate error, not a self-loop.
        assert!(matches!(
            graph,
            Err(GraphError::DuplicateDefinition { .. })
        ));

        let graph = build(&[("only", "x = x + 1")]).unwrap();
        assert!(graph.deps(&"only".into()).is_empty());
    }

    #[test]
    fn test_duplicate_definition_message() {
        let err = build(&[("a", "x = 10"), ("b", "x = 20")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Variable 'x' is defined in multiple cells: cell 1, cell 2"
        );
    }

    #[test]
    fn test_duplicate_checked_before_cycle() {
        // x is defined twice AND the cells form what would look like a
        // cycle; the duplicate must win.
        let err = build(&[("a", "x = y"), ("b", "y = x"), ("c", "x = 1")]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateDefinition { .. }));
    }

    #[test]
    fn test_direct_cycle() {
        let err = build(&[("a", "x = y"), ("b", "y = x")]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Circular dependency"), "{message}");
        assert!(message.contains("cell 1"), "{message}");
        assert!(message.contains("cell 2"), "{message}");
    }

    #[test]
    fn test_indirect_cycle() {
        let err = build(&[("a", "a = c"), ("b", "b = a"), ("c", "c = b")]).unwrap_err();
        assert!(matches!(err, GraphError::CircularDependency { .. }));
    }

    #[test]
    fn test_cycle_trace_closes_on_start() {
        let err = build(&[("a", "x = y"), ("b", "y = x")]).unwrap_err();
        let GraphError::CircularDependency { trace } = err else {
            panic!("expected cycle");
        };
        assert_eq!(trace.first(), trace.last());
        assert!(trace.len() >= 3);
    }

    #[test]
    fn test_dirty_set() {
        let graph = build(&[
            ("cell1", "x = 10"),
            ("cell2", "y = x + 1"),
            ("cell3", "z = y + 1"),
            ("cell4", "w = 5"),
        ])
        .unwrap();
        let dirty = graph.dirty_set(&"cell1".into());
        assert_eq!(dirty.len(), 3);
        assert!(dirty.contains(&"cell1".into()));
        assert!(dirty.contains(&"cell2".into()));
        assert!(dirty.contains(&"cell3".into()));
        assert!(!dirty.contains(&"cell4".into()));
    }

    #[test]
    fn test_downstream_can_be_above() {
        let graph = build(&[
            ("cell1", "result = x + y"),
            ("cell2", "x = 10"),
            ("cell3", "y = 20"),
        ])
        .unwrap();
        let dirty = graph.dirty_set(&"cell3".into());
        assert!(dirty.contains(&"cell1".into()));
        assert!(!dirty.contains(&"cell2".into()));
    }

    #[test]
    fn test_upstream_not_dirtied() {
        let graph = build(&[("cell1", "y = x + 1"), ("cell2", "x = 10")]).unwrap();
        let dirty = graph.dirty_set(&"cell1".into());
        assert_eq!(dirty.len(), 1);
    }

    #[test]
    fn test_plan_orders_producers_first() {
        let graph = build(&[
            ("cell1", "result = x + y"),
            ("cell2", "x = 10"),
            ("cell3", "y = 20"),
        ])
        .unwrap();
        assert_eq!(ids(&graph.plan_all()), vec!["cell2", "cell3", "cell1"]);
    }

    #[test]
    fn test_independent_cells_use_display_order() {
        let graph = build(&[("cell1", "x = 10"), ("cell2", "y = 20"), ("cell3", "z = 30")])
            .unwrap();
        assert_eq!(ids(&graph.plan_all()), vec!["cell1", "cell2", "cell3"]);
    }

    #[test]
    fn test_plan_for_subset_only() {
        let graph = build(&[
            ("cell1", "x = 10"),
            ("cell2", "y = x + 1"),
            ("cell3", "z = y + 1"),
        ])
        .unwrap();
        let plan = graph.plan_for(&"cell2".into());
        assert_eq!(ids(&plan), vec!["cell2", "cell3"]);
    }

    #[test]
    fn test_diamond_plan() {
        let graph = build(&[
            ("a", "a = 1"),
            ("b", "b = a * 2"),
            ("c", "c = a * 3"),
            ("d", "d = b + c"),
        ])
        .unwrap();
        let plan_all = graph.plan_all();
        let plan = ids(&plan_all);
        assert_eq!(plan, vec!["a", "b", "c", "d"]);

        let plan = graph.plan_for(&"a".into());
        assert_eq!(ids(&plan), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_empty_subset_empty_plan() {
        let graph = build(&[("cell1", "x = 10")]).unwrap();
        assert!(graph.plan_for(&"nonexistent".into()).is_empty());
    }

    #[test]
    fn test_broken_cell_has_no_edges() {
        let graph = build(&[("cell1", "x = 10"), ("cell2", "y = x +")]).unwrap();
        assert!(graph.deps(&"cell2".into()).is_empty());
        assert_eq!(ids(&graph.plan_for(&"cell1".into())), vec!["cell1"]);
    }

    #[test]
    fn test_definer_map() {
        let graph = build(&[("cell1", "x = 10")]).unwrap();
        assert_eq!(graph.definer("x"), Some(&"cell1".into()));
        assert_eq!(graph.definer("y"), None);
    }
}
