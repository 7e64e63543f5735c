//! Call-graph generation: partial order in, total order out.
//!
//! Two interchangeable strategies produce a single execution sequence from
//! the contributors' Before/After constraints. Both anchor the bootstrap
//! node first, break ties by registration order, and diagnose constraint
//! cycles with a [`PipelineError::Recursion`] naming the contributors
//! involved - never a hang or a stack overflow.

use std::collections::BTreeSet;

use crate::error::{PipelineError, PipelineResult};
use crate::key::ServiceKey;

use super::{stages, ContributorCall, ContributorNotification};

mod topological;
mod weighted;

pub use topological::TopologicalCallGraphGenerator;
pub use weighted::WeightedCallGraphGenerator;

/// An ordering strategy. Registered with the resolver as
/// `dyn CallGraphGenerator`, hosts can swap implementations without touching
/// the runner.
pub trait CallGraphGenerator: Send + Sync {
    /// Produces the total order. Input nodes arrive in registration order;
    /// the output must be a linear extension of the declared constraints
    /// with the bootstrap node first.
    fn generate(
        &self,
        notifications: Vec<ContributorNotification>,
    ) -> PipelineResult<Vec<ContributorCall>>;
}

/// Whether `target` binds to `node`: either the node's own identity or one
/// of its stage-marker tags.
pub(crate) fn matches(target: &ServiceKey, node: &ContributorNotification) -> bool {
    node.contributor == *target || node.stages.contains(target)
}

/// Index of the bootstrap node: the first node satisfying
/// [`stages::Begin`].
pub(crate) fn bootstrap_index(nodes: &[ContributorNotification]) -> usize {
    let begin = ServiceKey::of::<stages::Begin>();
    nodes
        .iter()
        .position(|node| node.stages.contains(&begin))
        .unwrap_or(0)
}

/// Checks every constraint target for a matching contributor before any
/// graph is built. Targets naming one of the built-in stage markers are
/// always legal; everything else must be satisfied by at least one node
/// belonging to a *different* contributor.
pub(crate) fn check_references(nodes: &[ContributorNotification]) -> PipelineResult<()> {
    let built_in = stages::built_in();
    let mut missing = BTreeSet::new();

    for node in nodes {
        for constraint in &node.constraints {
            if built_in.contains(&constraint.target) {
                continue;
            }
            let satisfied = nodes
                .iter()
                .filter(|other| other.contributor != node.contributor)
                .any(|other| matches(&constraint.target, other));
            if !satisfied {
                missing.insert(constraint.target.name());
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingContributors(
            missing.into_iter().collect(),
        ))
    }
}

/// Full pipeline validation: every built-in stage marker must be satisfied
/// by some contributor. Enabled through `StartupOptions::validate_pipeline`.
pub(crate) fn check_stages(nodes: &[ContributorNotification]) -> PipelineResult<()> {
    let missing: Vec<&'static str> = stages::built_in()
        .into_iter()
        .filter(|stage| !nodes.iter().any(|node| node.stages.contains(stage)))
        .map(|stage| stage.name())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingContributors(missing))
    }
}
