//! Seams between the compiled plan and the engine running it.
//!
//! A [`Preparation`] pass runs once on the selected physical plan, then the prepared plan is
//! handed to an [`ExecutionEngine`]. The crate ships [`EnsureRequirements`] as the default
//! preparation; engines are always supplied by the embedding application.

use futures::stream::BoxStream;

use crate::error::QueryResult;
use crate::expr::Row;
use crate::plan::PhysicalPlanRef;

mod exchange;
pub use exchange::*;

/// Rows produced by an execution, pulled lazily.
pub type RowStream = BoxStream<'static, anyhow::Result<Row>>;

/// Rewrite applied to the selected physical plan before execution.
pub trait Preparation: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(&self, plan: &PhysicalPlanRef) -> QueryResult<PhysicalPlanRef>;
}

/// Runs prepared physical plans.
///
/// Every call starts a new run. Failures are opaque to the compiler and surface unchanged.
pub trait ExecutionEngine: Send + Sync {
    fn execute(&self, plan: &PhysicalPlanRef) -> anyhow::Result<RowStream>;
}
