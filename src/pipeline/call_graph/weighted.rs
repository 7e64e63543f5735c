//! Weight-propagation ordering.
//!
//! Each constraint pushes weight through the graph: `after X` lifts the
//! declaring node above every node matching `X`, `before X` lifts the
//! matched nodes above the declaring one. Weights reach a fixed point in at
//! most `n` passes on an acyclic constraint set, so a node still moving
//! after `n` passes sits on a cycle.

use std::collections::BTreeSet;

use crate::error::{PipelineError, PipelineResult};

use super::{bootstrap_index, check_references, matches, CallGraphGenerator};
use crate::pipeline::{ContributorCall, ContributorNotification, Relation};

/// Orders calls by propagated weight, registration order breaking ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedCallGraphGenerator;

impl CallGraphGenerator for WeightedCallGraphGenerator {
    fn generate(
        &self,
        notifications: Vec<ContributorNotification>,
    ) -> PipelineResult<Vec<ContributorCall>> {
        check_references(&notifications)?;

        if notifications.is_empty() {
            return Ok(Vec::new());
        }

        let n = notifications.len();
        let mut weights = vec![0u64; n];

        // A fixed point is reached within n passes unless the constraints
        // cycle; the extra pass detects the cycle.
        let mut moved: BTreeSet<usize> = BTreeSet::new();
        for pass in 0..=n {
            moved.clear();
            for i in 0..n {
                for constraint in &notifications[i].constraints {
                    for j in 0..n {
                        if i == j || !matches(&constraint.target, &notifications[j]) {
                            continue;
                        }
                        let (raised, floor) = match constraint.relation {
                            Relation::After => (i, weights[j] + 1),
                            Relation::Before => (j, weights[i] + 1),
                        };
                        if weights[raised] < floor {
                            weights[raised] = floor;
                            moved.insert(raised);
                        }
                    }
                }
            }
            if moved.is_empty() {
                break;
            }
            if pass == n {
                let names: Vec<&'static str> = moved
                    .iter()
                    .map(|&i| notifications[i].contributor.name())
                    .collect();
                return Err(PipelineError::Recursion(names));
            }
        }

        // A constraint lifting the bootstrap node's weight would order
        // something ahead of it, which the anchor invariant forbids. Report
        // it with the same error shape the topological strategy produces
        // for the equivalent boot-edge cycle.
        let boot = bootstrap_index(&notifications);
        if weights[boot] > 0 {
            let mut offenders: BTreeSet<&'static str> = BTreeSet::new();
            for (i, node) in notifications.iter().enumerate() {
                if i == boot {
                    continue;
                }
                for constraint in &node.constraints {
                    if constraint.relation == Relation::Before
                        && matches(&constraint.target, &notifications[boot])
                    {
                        offenders.insert(node.contributor.name());
                    }
                }
            }
            let mut names = vec![notifications[boot].contributor.name()];
            names.extend(offenders);
            return Err(PipelineError::Recursion(names));
        }

        // The bootstrap node goes first; the rest sort by
        // (weight, registration order).
        let mut order: Vec<usize> = (0..n).filter(|&i| i != boot).collect();
        order.sort_by_key(|&i| (weights[i], notifications[i].seq));
        order.insert(0, boot);

        let mut by_index: Vec<Option<ContributorNotification>> =
            notifications.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| by_index[i].take())
            .map(ContributorNotification::into_call)
            .collect())
    }
}
