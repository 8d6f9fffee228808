//! Per-pipeline component graph
//!
//! Built from the explicit edge list the loader resolved, so cycle
//! detection and "upstream of" queries are O(components) graph walks
//! rather than document re-parsing.

use crate::model::Pipeline;
use std::collections::VecDeque;

/// Adjacency structure over one pipeline's components, indexed by position
#[derive(Debug, Clone)]
pub struct ComponentGraph {
    /// parents[i] = indices of components feeding component i
    parents: Vec<Vec<usize>>,

    /// children[i] = indices of components fed by component i
    children: Vec<Vec<usize>>,
}

impl ComponentGraph {
    /// Build the graph from a pipeline's components and edges
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let n = pipeline.components.len();
        let mut parents = vec![Vec::new(); n];
        let mut children = vec![Vec::new(); n];

        for &(from, to) in &pipeline.edges {
            if from < n && to < n {
                children[from].push(to);
                parents[to].push(from);
            }
        }

        Self { parents, children }
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Immediate parents of a component
    pub fn parents(&self, idx: usize) -> &[usize] {
        &self.parents[idx]
    }

    /// Immediate children of a component
    pub fn children(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }

    /// All components upstream of `idx` (transitive closure of parents), BFS order
    pub fn upstream(&self, idx: usize) -> Vec<usize> {
        let mut visited = vec![false; self.parents.len()];
        let mut queue = VecDeque::new();
        let mut result = Vec::new();

        for &parent in &self.parents[idx] {
            queue.push_back(parent);
        }

        while let Some(current) = queue.pop_front() {
            if visited[current] {
                continue;
            }
            visited[current] = true;
            result.push(current);

            for &parent in &self.parents[current] {
                if !visited[parent] {
                    queue.push_back(parent);
                }
            }
        }

        result
    }

    /// Kahn's algorithm; `None` means the edges contain a cycle
    pub fn topological_sort(&self) -> Option<Vec<usize>> {
        let n = self.parents.len();
        let mut in_degree: Vec<usize> = self.parents.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for &child in &self.children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    queue.push_back(child);
                }
            }
        }

        if result.len() == n {
            Some(result)
        } else {
            None // a cycle keeps some in-degree above zero
        }
    }

    /// Whether the edges form a DAG
    pub fn is_acyclic(&self) -> bool {
        self.topological_sort().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentKind, DataflowComponent, PipelineRole};
    use std::collections::BTreeMap;

    fn component(name: &str) -> DataflowComponent {
        DataflowComponent {
            name: name.to_string(),
            raw_type: "Test".to_string(),
            type_tag: "test".to_string(),
            kind: ComponentKind::Transform,
            properties: BTreeMap::new(),
            command_text: None,
            connection: None,
            input_columns: Vec::new(),
            output_columns: Vec::new(),
            external_columns: Vec::new(),
        }
    }

    fn pipeline(names: &[&str], edges: Vec<(usize, usize)>) -> Pipeline {
        Pipeline {
            name: "test".to_string(),
            container: None,
            components: names.iter().map(|n| component(n)).collect(),
            edges,
            role: PipelineRole::Unclassified,
        }
    }

    #[test]
    fn linear_chain_sorts_in_order() {
        let p = pipeline(&["a", "b", "c"], vec![(0, 1), (1, 2)]);
        let graph = ComponentGraph::from_pipeline(&p);

        assert_eq!(graph.topological_sort(), Some(vec![0, 1, 2]));
        assert!(graph.is_acyclic());
    }

    #[test]
    fn cycle_is_detected() {
        let p = pipeline(&["a", "b", "c"], vec![(0, 1), (1, 2), (2, 0)]);
        let graph = ComponentGraph::from_pipeline(&p);

        assert_eq!(graph.topological_sort(), None);
        assert!(!graph.is_acyclic());
    }

    #[test]
    fn upstream_is_transitive() {
        // a -> b -> d, c -> d
        let p = pipeline(&["a", "b", "c", "d"], vec![(0, 1), (1, 3), (2, 3)]);
        let graph = ComponentGraph::from_pipeline(&p);

        let mut upstream = graph.upstream(3);
        upstream.sort_unstable();
        assert_eq!(upstream, vec![0, 1, 2]);
        assert!(graph.upstream(0).is_empty());
    }

    #[test]
    fn out_of_range_edges_are_dropped() {
        let p = pipeline(&["a", "b"], vec![(0, 1), (0, 9)]);
        let graph = ComponentGraph::from_pipeline(&p);

        assert_eq!(graph.children(0), &[1]);
        assert!(graph.is_acyclic());
    }
}
