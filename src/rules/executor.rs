use std::sync::Arc;

use log::{debug, trace, warn};

use crate::error::QueryResult;
use crate::plan::LogicalPlanRef;
use crate::rules::{Rule, RuleImpl};

/// How often a batch runs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BatchStrategy {
    Once,
    /// Until the plan stops changing, at most this many iterations.
    FixedPoint(usize),
}

impl BatchStrategy {
    fn max_iterations(&self) -> usize {
        match self {
            BatchStrategy::Once => 1,
            BatchStrategy::FixedPoint(n) => *n,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Batch {
    name: &'static str,
    strategy: BatchStrategy,
    rules: Vec<RuleImpl>,
}

impl Batch {
    pub fn new(name: &'static str, strategy: BatchStrategy, rules: Vec<RuleImpl>) -> Self {
        Self {
            name,
            strategy,
            rules,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Runs batches of rules in order.
///
/// Within a batch every rule is applied in turn, and the whole rule list is repeated until an
/// iteration leaves the plan structurally unchanged or the batch's iteration limit is reached.
#[derive(Clone, Debug, Default)]
pub struct RuleExecutor {
    batches: Vec<Batch>,
}

impl RuleExecutor {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn execute(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        let mut cur_plan = plan.clone();

        for batch in &self.batches {
            let max_iterations = batch.strategy.max_iterations();
            let batch_start = cur_plan.clone();
            let mut iteration = 0;

            loop {
                iteration += 1;
                let last_plan = cur_plan.clone();
                for rule in &batch.rules {
                    let result = rule.apply(&cur_plan)?;
                    if !Arc::ptr_eq(&result, &cur_plan) && *result != *cur_plan {
                        trace!(
                            "Rule {} changed plan:\n{}\nto\n{}",
                            rule.name(),
                            cur_plan.tree_string(),
                            result.tree_string()
                        );
                    }
                    cur_plan = result;
                }

                // The plan no longer changes after iteration
                if *cur_plan == *last_plan {
                    trace!(
                        "Fixed point reached for batch {} after {} iterations",
                        batch.name,
                        iteration
                    );
                    break;
                }

                if iteration >= max_iterations {
                    if max_iterations > 1 {
                        warn!(
                            "Max iterations ({}) reached for batch {}",
                            max_iterations, batch.name
                        );
                    }
                    break;
                }
            }

            if *batch_start != *cur_plan {
                debug!(
                    "Batch {} rewrote plan to:\n{}",
                    batch.name,
                    cur_plan.tree_string()
                );
            }
        }

        Ok(cur_plan)
    }
}
