//! Logical rewrite rules and the executor running them in batches.
//!
//! Both the analyzer and the optimizer are a [`RuleExecutor`] over a fixed list of batches. Each
//! rule is a substitution rule: it takes a plan and returns an equivalent plan, or the same plan
//! when it does not apply.

use enum_dispatch::enum_dispatch;

use crate::analysis::{EliminateSubqueries, ResolveReferences, ResolveRelations};
use crate::error::QueryResult;
use crate::optimizer::{CombineFilters, CombineLimits, PruneFilters, PushFilterThroughProject};
use crate::plan::LogicalPlanRef;

mod executor;
pub use executor::*;

#[enum_dispatch]
pub trait Rule {
    fn name(&self) -> &'static str;

    /// Rewrites `plan`. Returning the input [`Arc`](std::sync::Arc) unchanged signals a no-op.
    fn apply(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef>;
}

#[enum_dispatch(Rule)]
#[derive(Clone, Debug)]
pub enum RuleImpl {
    ResolveRelations,
    ResolveReferences,
    EliminateSubqueries,
    CombineFilters,
    CombineLimits,
    PruneFilters,
    PushFilterThroughProject,
}
