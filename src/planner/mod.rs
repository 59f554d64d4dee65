//! Physical planning.
//!
//! # Background
//!
//! A [`Strategy`] looks at one logical node and proposes zero or more physical subtrees for it,
//! planning the node's children through [`PhysicalPlanner::plan_later`]. The planner tries its
//! strategies in order and yields their candidates lazily, so nothing past the first usable
//! candidate is ever built.
//!
//! # Design
//!
//! There is no cost model: [`PhysicalPlanner::plan_first`] takes the first candidate. Custom
//! strategies are fixed when the planner is built and are tried before the built-in ones.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use enum_dispatch::enum_dispatch;
use itertools::Either;
use log::debug;
use smallvec::SmallVec;

use crate::config::SqlConf;
use crate::error::{QueryError, QueryResult};
use crate::operator::{CodegenMode, OperatorTrait};
use crate::plan::{LogicalPlanRef, PhysicalPlanRef};

mod pruning;
pub use pruning::*;
mod strategies;
pub use strategies::*;

/// Physical candidates one strategy proposes for a node, usually one.
pub type Candidates = SmallVec<[PhysicalPlanRef; 1]>;

#[enum_dispatch]
pub trait Strategy {
    fn name(&self) -> &'static str;

    /// Candidates for `plan`, empty when this strategy does not apply.
    fn apply(&self, plan: &LogicalPlanRef, planner: &PhysicalPlanner) -> QueryResult<Candidates>;
}

/// Strategy supplied from outside the crate.
#[derive(Clone)]
pub struct CustomStrategy(Arc<dyn Strategy + Send + Sync>);

impl CustomStrategy {
    pub fn new<S: Strategy + Send + Sync + 'static>(strategy: S) -> Self {
        Self(Arc::new(strategy))
    }
}

impl Strategy for CustomStrategy {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn apply(&self, plan: &LogicalPlanRef, planner: &PhysicalPlanner) -> QueryResult<Candidates> {
        self.0.apply(plan, planner)
    }
}

impl Debug for CustomStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CustomStrategy({})", self.0.name())
    }
}

#[enum_dispatch(Strategy)]
#[derive(Clone, Debug)]
pub enum StrategyImpl {
    DataSourceScans,
    InMemoryScans,
    HashJoinStrategy,
    NestedLoopJoinStrategy,
    HashAggregation,
    BasicOperators,
    CustomStrategy,
}

fn builtin_strategies() -> Vec<StrategyImpl> {
    vec![
        DataSourceScans.into(),
        InMemoryScans.into(),
        HashJoinStrategy.into(),
        NestedLoopJoinStrategy.into(),
        HashAggregation.into(),
        BasicOperators.into(),
    ]
}

pub struct PhysicalPlanner {
    conf: Arc<SqlConf>,
    strategies: Vec<StrategyImpl>,
}

impl PhysicalPlanner {
    /// Planner trying `extra_strategies` first, then the built-in ones.
    pub fn new(conf: Arc<SqlConf>, extra_strategies: Vec<StrategyImpl>) -> Self {
        let mut strategies = extra_strategies;
        strategies.extend(builtin_strategies());
        Self { conf, strategies }
    }

    pub fn strategies(&self) -> &[StrategyImpl] {
        &self.strategies
    }

    pub fn codegen_mode(&self) -> QueryResult<CodegenMode> {
        Ok(self.conf.codegen_enabled()?.into())
    }

    /// Lazily yields every candidate of every strategy, in strategy order.
    ///
    /// Each call starts over from the first strategy.
    pub fn plan<'a>(
        &'a self,
        plan: &'a LogicalPlanRef,
    ) -> impl Iterator<Item = QueryResult<PhysicalPlanRef>> + 'a {
        self.strategies
            .iter()
            .flat_map(move |strategy| match strategy.apply(plan, self) {
                Ok(candidates) => {
                    if !candidates.is_empty() {
                        debug!(
                            "Strategy {} planned {}",
                            strategy.name(),
                            plan.operator().name()
                        );
                    }
                    Either::Left(candidates.into_iter().map(Ok))
                }
                Err(e) => Either::Right(std::iter::once(Err(e))),
            })
    }

    /// First candidate for `plan`, failing when no strategy applies.
    pub fn plan_first(&self, plan: &LogicalPlanRef) -> QueryResult<PhysicalPlanRef> {
        self.plan(plan).next().unwrap_or_else(|| {
            Err(QueryError::planning(format!(
                "no strategy can plan {}",
                plan.operator()
            )))
        })
    }

    /// Plans a child of the node currently being planned.
    pub fn plan_later(&self, plan: &LogicalPlanRef) -> QueryResult<PhysicalPlanRef> {
        self.plan_first(plan)
    }
}
