//! Kahn's algorithm over the constraint graph.
//!
//! Constraints become directed edges (`after X` draws an edge from every
//! node matching `X` to the declaring node, `before X` the opposite way).
//! The bootstrap node additionally precedes every node that would otherwise
//! have no predecessor, so unconstrained contributors still run after
//! pipeline startup. Nodes left with incoming edges after the ready set
//! drains form a cycle.

use std::collections::BTreeSet;

use crate::error::{PipelineError, PipelineResult};

use super::{bootstrap_index, check_references, matches, CallGraphGenerator};
use crate::pipeline::{ContributorCall, ContributorNotification, Relation};

/// Orders calls by a deterministic topological sort, draining the ready set
/// in registration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopologicalCallGraphGenerator;

impl CallGraphGenerator for TopologicalCallGraphGenerator {
    fn generate(
        &self,
        notifications: Vec<ContributorNotification>,
    ) -> PipelineResult<Vec<ContributorCall>> {
        check_references(&notifications)?;

        if notifications.is_empty() {
            return Ok(Vec::new());
        }

        let n = notifications.len();
        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();

        for i in 0..n {
            for constraint in &notifications[i].constraints {
                for j in 0..n {
                    if i == j || !matches(&constraint.target, &notifications[j]) {
                        continue;
                    }
                    match constraint.relation {
                        Relation::After => edges.insert((j, i)),
                        Relation::Before => edges.insert((i, j)),
                    };
                }
            }
        }

        // Anchor: anything with no predecessor of its own runs after the
        // bootstrap node.
        let boot = bootstrap_index(&notifications);
        let orphans: Vec<usize> = (0..n)
            .filter(|&i| i != boot && !edges.iter().any(|&(_, to)| to == i))
            .collect();
        for i in orphans {
            edges.insert((boot, i));
        }

        let mut indegree = vec![0usize; n];
        for &(_, to) in &edges {
            indegree[to] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for &(from, to) in &edges {
                if from == next {
                    indegree[to] -= 1;
                    if indegree[to] == 0 {
                        ready.insert(to);
                    }
                }
            }
        }

        if order.len() < n {
            let names: Vec<&'static str> = (0..n)
                .filter(|i| !order.contains(i))
                .map(|i| notifications[i].contributor.name())
                .collect();
            return Err(PipelineError::Recursion(names));
        }

        let mut by_index: Vec<Option<ContributorNotification>> =
            notifications.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| by_index[i].take())
            .map(ContributorNotification::into_call)
            .collect())
    }
}
