//! Built-in phase actions
//!
//! | phase            | action                                        |
//! |------------------|-----------------------------------------------|
//! | `create`         | traces every node with its path               |
//! | `owner`          | resolves owner fields, runs owner hooks       |
//! | `default`        | fills falsy fields from declared defaults     |
//! | `early_validate` | runs early class validators                   |
//! | `apply`          | runs post-apply hooks                         |
//! | `validate`       | validates the tree, children first            |
//! | `verify`         | raises once the failure threshold is met      |
//! | `post_tree`      | runs post-tree hooks                          |

mod checks;
mod defaults;
mod lifecycle;
mod owner;

pub use checks::{EarlyValidate, ValidateTree, Verify};
pub use defaults::fill_defaults;
pub use lifecycle::{register, run_post_apply, run_post_tree};
pub use owner::resolve_owners;

use crate::driver::{NodeAction, NodePhase, PhaseAction};
use arbor_model::PhaseId;
use std::sync::Arc;

/// Actions bound to the built-in phases
pub(crate) fn built_in() -> Vec<(PhaseId, Arc<dyn PhaseAction>)> {
    vec![
        (PhaseId::CREATE, per_node(register)),
        (PhaseId::OWNER, per_node(resolve_owners)),
        (PhaseId::DEFAULT, per_node(fill_defaults)),
        (PhaseId::EARLY_VALIDATE, whole(EarlyValidate)),
        (PhaseId::APPLY, per_node(run_post_apply)),
        (PhaseId::VALIDATE, whole(ValidateTree)),
        (PhaseId::VERIFY, whole(Verify)),
        (PhaseId::POST_TREE, per_node(run_post_tree)),
    ]
}

fn whole<A: PhaseAction + 'static>(action: A) -> Arc<dyn PhaseAction> {
    Arc::new(action)
}

fn per_node<A: NodeAction + 'static>(action: A) -> Arc<dyn PhaseAction> {
    Arc::new(NodePhase::new(action))
}
