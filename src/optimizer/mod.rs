//! Logical optimizer.
//!
//! Rewrites an analyzed plan into an equivalent one that is cheaper to run. The default
//! [`RuleBasedOptimizer`] only knows a handful of heuristic rewrites and keeps applying them until
//! the plan stops changing; there is no cost model.

use crate::error::QueryResult;
use crate::plan::LogicalPlanRef;
use crate::rules::{Batch, BatchStrategy, RuleExecutor};

mod rules;
pub use rules::*;

pub trait Optimizer: Send + Sync {
    fn optimize(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef>;
}

pub struct RuleBasedOptimizer {
    executor: RuleExecutor,
}

impl RuleBasedOptimizer {
    pub fn new(max_iterations: usize) -> Self {
        let executor = RuleExecutor::new(vec![
            Batch::new(
                "Combine Limits",
                BatchStrategy::FixedPoint(max_iterations),
                vec![CombineLimits.into()],
            ),
            Batch::new(
                "Filter Pushdown",
                BatchStrategy::FixedPoint(max_iterations),
                vec![
                    CombineFilters.into(),
                    PushFilterThroughProject.into(),
                    PruneFilters.into(),
                ],
            ),
        ]);
        Self { executor }
    }
}

impl Optimizer for RuleBasedOptimizer {
    fn optimize(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        self.executor.execute(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, AttributeReference, DataType, Expr};
    use crate::operator::OperatorTrait;
    use crate::plan::LogicalPlanBuilder;

    #[test]
    fn test_filters_end_up_on_the_scan() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let plan = LogicalPlanBuilder::scan("t", vec![a.clone()])
            .project(vec![Expr::from(a.clone())])
            .filter(Expr::from(a.clone()).gt(lit(1)))
            .filter(lit(true))
            .limit(10)
            .limit(20)
            .build();

        let optimized = RuleBasedOptimizer::new(100).optimize(&plan).unwrap();
        let names = optimized
            .pre_order()
            .into_iter()
            .map(|(_, node)| node.operator().name())
            .collect::<Vec<_>>();
        assert_eq!(vec!["Limit", "Project", "Filter", "TableScan"], names);
        assert_eq!(
            10,
            optimized.operator().as_logical_limit().unwrap().n()
        );
    }

    #[test]
    fn test_optimized_plan_is_a_fixed_point() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let plan = LogicalPlanBuilder::scan("t", vec![a.clone()])
            .filter(Expr::from(a).gt(lit(1)))
            .build();
        let optimizer = RuleBasedOptimizer::new(100);
        let once = optimizer.optimize(&plan).unwrap();
        assert!(std::sync::Arc::ptr_eq(&plan, &once));
    }
}
