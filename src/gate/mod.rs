//! PR gate for the promotion branch
//!
//! Two-phase pattern:
//! 1. Select - pick eligible PRs from a fresh listing (pure, testable)
//! 2. Execute - approve then complete each eligible PR (effectful, concurrent)

mod eligibility;
mod execute;

pub use eligibility::{is_allowed, is_eligible, select_eligible};
pub use execute::{ApproveMergeOptions, approve_and_merge};
