use std::sync::Arc;

use log::trace;
use smallvec::smallvec;

use crate::error::QueryResult;
use crate::expr::{
    conjunction, split_conjunctive_predicates, AggregateFunc, AttributeSet, BinaryOperator, Expr,
};
use crate::operator::LogicalOperator::{
    LogicalAggregate, LogicalFilter, LogicalInMemoryRelation, LogicalJoin, LogicalLimit,
    LogicalLocalRelation, LogicalProjection, LogicalScan,
};
use crate::operator::PhysicalOperator::{
    PhysicalFilter, PhysicalHashAggregate, PhysicalHashJoin, PhysicalInMemoryScan,
    PhysicalLimit, PhysicalLocalTableScan, PhysicalNestedLoopJoin, PhysicalProject,
    PhysicalTableScan,
};
use crate::operator::{
    AggregateMode, EquiJoin, FilterPushdown, HashAggregate, InMemoryScan, PhysicalOperator,
};
use crate::plan::{LogicalPlan, LogicalPlanRef, PhysicalPlanRef, PlanNode};
use crate::planner::{
    prune_filter_project, Candidates, PhysicalOperation, PhysicalPlanner, Strategy,
};

fn physical(operator: PhysicalOperator, inputs: Vec<PhysicalPlanRef>) -> PhysicalPlanRef {
    Arc::new(PlanNode::new(operator, inputs))
}

/// Plans projections and filters over a table scan, pushing filters into the source as far as
/// it supports them.
#[derive(Clone, Debug)]
pub struct DataSourceScans;

impl Strategy for DataSourceScans {
    fn name(&self) -> &'static str {
        "DataSourceScans"
    }

    fn apply(&self, plan: &LogicalPlanRef, planner: &PhysicalPlanner) -> QueryResult<Candidates> {
        let operation = PhysicalOperation::extract(plan)?;
        let scan = match operation.leaf.operator() {
            LogicalScan(scan) => scan,
            _ => return Ok(Candidates::new()),
        };

        let predicates = operation.predicates;
        let pushed = match scan.pushdown() {
            FilterPushdown::Unsupported => vec![],
            FilterPushdown::Inexact | FilterPushdown::Exact => predicates.clone(),
        };
        trace!(
            "Scanning {} with {} pushed filters",
            scan.table_name(),
            pushed.len()
        );

        let planned = prune_filter_project(
            &operation.project_list,
            &predicates,
            |filters| match scan.pushdown() {
                FilterPushdown::Exact => vec![],
                FilterPushdown::Unsupported | FilterPushdown::Inexact => filters.to_vec(),
            },
            |attributes| {
                Ok(physical(
                    PhysicalTableScan(scan.with_output(attributes).with_filters(pushed)),
                    vec![],
                ))
            },
            planner.codegen_mode()?,
        )?;
        Ok(smallvec![planned])
    }
}

/// Plans projections and filters over cached data. Predicates are also handed to the scan so
/// the engine can skip batches, and evaluated again above it.
#[derive(Clone, Debug)]
pub struct InMemoryScans;

impl Strategy for InMemoryScans {
    fn name(&self) -> &'static str {
        "InMemoryScans"
    }

    fn apply(&self, plan: &LogicalPlanRef, planner: &PhysicalPlanner) -> QueryResult<Candidates> {
        let operation = PhysicalOperation::extract(plan)?;
        let relation = match operation.leaf.operator() {
            LogicalInMemoryRelation(relation) => relation,
            _ => return Ok(Candidates::new()),
        };

        let predicates = operation.predicates;
        let planned = prune_filter_project(
            &operation.project_list,
            &predicates,
            |filters| filters.to_vec(),
            |attributes| {
                Ok(physical(
                    PhysicalInMemoryScan(InMemoryScan::new(
                        attributes,
                        predicates.clone(),
                        relation.clone(),
                    )),
                    vec![],
                ))
            },
            planner.codegen_mode()?,
        )?;
        Ok(smallvec![planned])
    }
}

/// Splits a join condition into equality keys between the two sides and the remaining
/// predicates. Returns `None` when there is no such equality.
fn extract_equi_join_keys(
    condition: &Expr,
    left: &LogicalPlan,
    right: &LogicalPlan,
) -> Option<(Vec<Expr>, Vec<Expr>, Option<Expr>)> {
    let (left_set, right_set) = (left.output_set(), right.output_set());
    let evaluable = |e: &Expr, side: &AttributeSet| {
        let refs = e.references();
        !refs.is_empty() && refs.subset_of(side)
    };

    let mut keys = vec![];
    let mut residual = vec![];
    for predicate in split_conjunctive_predicates(condition) {
        match &predicate {
            Expr::Binary {
                left: l,
                op: BinaryOperator::Eq,
                right: r,
            } if evaluable(l, &left_set) && evaluable(r, &right_set) => {
                keys.push((l.as_ref().clone(), r.as_ref().clone()))
            }
            Expr::Binary {
                left: l,
                op: BinaryOperator::Eq,
                right: r,
            } if evaluable(r, &left_set) && evaluable(l, &right_set) => {
                keys.push((r.as_ref().clone(), l.as_ref().clone()))
            }
            _ => residual.push(predicate),
        }
    }

    if keys.is_empty() {
        return None;
    }
    let (left_keys, right_keys) = keys.into_iter().unzip();
    Some((left_keys, right_keys, conjunction(residual)))
}

/// Joins on at least one equality between the two sides run as hash joins.
#[derive(Clone, Debug)]
pub struct HashJoinStrategy;

impl Strategy for HashJoinStrategy {
    fn name(&self) -> &'static str {
        "HashJoinStrategy"
    }

    fn apply(&self, plan: &LogicalPlanRef, planner: &PhysicalPlanner) -> QueryResult<Candidates> {
        let join = match plan.operator() {
            LogicalJoin(join) => join,
            _ => return Ok(Candidates::new()),
        };
        let (left, right) = (&plan.inputs()[0], &plan.inputs()[1]);
        let keys = join
            .condition()
            .and_then(|c| extract_equi_join_keys(c, left, right));

        match keys {
            Some((left_keys, right_keys, residual)) => Ok(smallvec![physical(
                PhysicalHashJoin(EquiJoin::new(
                    join.join_type(),
                    left_keys,
                    right_keys,
                    residual
                )),
                vec![planner.plan_later(left)?, planner.plan_later(right)?],
            )]),
            None => Ok(Candidates::new()),
        }
    }
}

/// Fallback for every join, evaluates the condition on each pair of rows.
#[derive(Clone, Debug)]
pub struct NestedLoopJoinStrategy;

impl Strategy for NestedLoopJoinStrategy {
    fn name(&self) -> &'static str {
        "NestedLoopJoinStrategy"
    }

    fn apply(&self, plan: &LogicalPlanRef, planner: &PhysicalPlanner) -> QueryResult<Candidates> {
        match plan.operator() {
            LogicalJoin(join) => Ok(smallvec![physical(
                PhysicalNestedLoopJoin(join.clone()),
                plan.inputs()
                    .iter()
                    .map(|input| planner.plan_later(input))
                    .collect::<QueryResult<Vec<_>>>()?,
            )]),
            _ => Ok(Candidates::new()),
        }
    }
}

/// Aggregates whose functions can be merged run in two phases, a partial aggregate on every
/// partition followed by a final one over the clustered partial results. Everything else runs
/// as a single complete aggregate.
#[derive(Clone, Debug)]
pub struct HashAggregation;

fn can_be_split(aggregates: &[Expr]) -> bool {
    !aggregates.iter().any(|e| {
        e.exists(|e| {
            matches!(
                e,
                Expr::AggregateFunction { distinct: true, .. }
                    | Expr::AggregateFunction {
                        func: AggregateFunc::Avg,
                        ..
                    }
            )
        })
    })
}

impl Strategy for HashAggregation {
    fn name(&self) -> &'static str {
        "HashAggregation"
    }

    fn apply(&self, plan: &LogicalPlanRef, planner: &PhysicalPlanner) -> QueryResult<Candidates> {
        let aggregate = match plan.operator() {
            LogicalAggregate(aggregate) => aggregate,
            _ => return Ok(Candidates::new()),
        };
        let codegen = planner.codegen_mode()?;
        let child = planner.plan_later(&plan.inputs()[0])?;

        let planned = if can_be_split(aggregate.aggregates()) {
            let partial = physical(
                PhysicalHashAggregate(
                    HashAggregate::new(AggregateMode::Partial, aggregate.clone()),
                    codegen,
                ),
                vec![child],
            );
            physical(
                PhysicalHashAggregate(
                    HashAggregate::new(AggregateMode::Final, aggregate.clone()),
                    codegen,
                ),
                vec![partial],
            )
        } else {
            physical(
                PhysicalHashAggregate(
                    HashAggregate::new(AggregateMode::Complete, aggregate.clone()),
                    codegen,
                ),
                vec![child],
            )
        };
        Ok(smallvec![planned])
    }
}

/// One to one mapping of the remaining operators.
#[derive(Clone, Debug)]
pub struct BasicOperators;

impl Strategy for BasicOperators {
    fn name(&self) -> &'static str {
        "BasicOperators"
    }

    fn apply(&self, plan: &LogicalPlanRef, planner: &PhysicalPlanner) -> QueryResult<Candidates> {
        let operator = match plan.operator() {
            LogicalProjection(projection) => {
                PhysicalProject(projection.clone(), planner.codegen_mode()?)
            }
            LogicalFilter(filter) => PhysicalFilter(filter.clone(), planner.codegen_mode()?),
            LogicalLimit(limit) => PhysicalLimit(limit.clone()),
            LogicalLocalRelation(relation) => PhysicalLocalTableScan(relation.clone()),
            _ => return Ok(Candidates::new()),
        };
        let inputs = plan
            .inputs()
            .iter()
            .map(|input| planner.plan_later(input))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(smallvec![physical(operator, inputs)])
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::config::{ConfKey, SqlConf};
    use crate::expr::{aggregate, lit, AttributeReference, DataType, Row};
    use crate::operator::{JoinType, OperatorTrait, TableScan};
    use crate::plan::LogicalPlanBuilder;

    fn planner() -> PhysicalPlanner {
        PhysicalPlanner::new(Arc::new(SqlConf::new()), vec![])
    }

    fn names(plan: &PhysicalPlanRef) -> Vec<&'static str> {
        plan.pre_order()
            .into_iter()
            .map(|(_, node)| node.operator().name())
            .collect()
    }

    fn table(name: &str, columns: &[&str]) -> (LogicalPlanBuilder, Vec<AttributeReference>) {
        let attrs = columns
            .iter()
            .map(|c| AttributeReference::new(*c, DataType::Int32, false))
            .collect_vec();
        (LogicalPlanBuilder::scan(name, attrs.clone()), attrs)
    }

    #[test]
    fn test_exact_pushdown_drops_filter() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let scan = TableScan::new("t", vec![a.clone()]).with_pushdown(FilterPushdown::Exact);
        let plan = LogicalPlanBuilder::scan_with(scan)
            .filter(Expr::from(a.clone()).gt(lit(1)))
            .build();

        let physical = planner().plan_first(&plan).unwrap();
        assert_eq!(vec!["TableScan"], names(&physical));
        assert_eq!(
            &[Expr::from(a).gt(lit(1))],
            physical.operator().as_physical_table_scan().unwrap().filters()
        );
    }

    #[test]
    fn test_inexact_pushdown_keeps_filter() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let scan = TableScan::new("t", vec![a.clone()]).with_pushdown(FilterPushdown::Inexact);
        let plan = LogicalPlanBuilder::scan_with(scan)
            .filter(Expr::from(a.clone()).gt(lit(1)))
            .build();

        let physical = planner().plan_first(&plan).unwrap();
        assert_eq!(vec!["Filter", "TableScan"], names(&physical));
        assert_eq!(
            1,
            physical.inputs()[0]
                .operator()
                .as_physical_table_scan()
                .unwrap()
                .filters()
                .len()
        );
    }

    #[test]
    fn test_unsupported_pushdown_prunes_columns() {
        let (builder, attrs) = table("t", &["a", "b", "c"]);
        let plan = builder
            .filter(Expr::from(attrs[1].clone()).gt(lit(1)))
            .project(vec![attrs[0].clone().into()])
            .build();

        let physical = planner().plan_first(&plan).unwrap();
        assert_eq!(vec!["Project", "Filter", "TableScan"], names(&physical));
        let scan = physical.inputs()[0].inputs()[0].clone();
        assert_eq!(attrs[..2].to_vec(), scan.output());
        assert!(scan.operator().as_physical_table_scan().unwrap().filters().is_empty());
    }

    #[test]
    fn test_equi_join_uses_hash_join() {
        let (left, l) = table("l", &["id", "x"]);
        let (right, r) = table("r", &["id", "y"]);
        let condition = Expr::from(r[0].clone())
            .eq(Expr::from(l[0].clone()))
            .and(Expr::from(l[1].clone()).lt(Expr::from(r[1].clone())));
        let plan = left
            .join(right.build(), JoinType::Inner, Some(condition))
            .build();

        let physical = planner().plan_first(&plan).unwrap();
        let join = physical.operator().as_physical_hash_join().unwrap();
        assert_eq!(&[Expr::from(l[0].clone())], join.left_keys());
        assert_eq!(&[Expr::from(r[0].clone())], join.right_keys());
        assert_eq!(
            Some(&Expr::from(l[1].clone()).lt(Expr::from(r[1].clone()))),
            join.residual()
        );
        assert_eq!(vec!["HashJoin", "TableScan", "TableScan"], names(&physical));
    }

    #[test]
    fn test_non_equi_join_falls_back_to_nested_loop() {
        let (left, l) = table("l", &["x"]);
        let (right, r) = table("r", &["y"]);
        let plan = left
            .join(
                right.build(),
                JoinType::LeftOuter,
                Some(Expr::from(l[0].clone()).lt(Expr::from(r[0].clone()))),
            )
            .build();

        let planner = planner();
        let physical = planner.plan_first(&plan).unwrap();
        assert_eq!("NestedLoopJoin", physical.operator().name());
        assert_eq!(1, planner.plan(&plan).count());
    }

    #[test]
    fn test_aggregation_phases() {
        let (builder, attrs) = table("t", &["k", "v"]);
        let key: Expr = attrs[0].clone().into();
        let split = builder
            .aggregate(
                vec![key.clone()],
                vec![
                    key.clone(),
                    aggregate(AggregateFunc::Sum, attrs[1].clone().into()).alias("s"),
                ],
            )
            .build();
        let physical = planner().plan_first(&split).unwrap();
        assert_eq!(
            vec!["HashAggregate", "HashAggregate", "TableScan"],
            names(&physical)
        );

        let (builder, attrs) = table("t", &["k", "v"]);
        let single = builder
            .aggregate(
                vec![],
                vec![aggregate(AggregateFunc::Avg, attrs[1].clone().into()).alias("a")],
            )
            .build();
        let physical = planner().plan_first(&single).unwrap();
        assert_eq!(vec!["HashAggregate", "TableScan"], names(&physical));
        assert_eq!(
            AggregateMode::Complete,
            physical
                .operator()
                .as_physical_hash_aggregate()
                .unwrap()
                .0
                .mode()
        );
    }

    #[test]
    fn test_basic_operators_follow_codegen_setting() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let rows = vec![Row::new(vec![1.into()])];
        let plan = LogicalPlanBuilder::local_relation(vec![a.clone()], rows)
            .filter(Expr::from(a).gt(lit(0)))
            .limit(1)
            .build();

        let conf = SqlConf::new();
        conf.set_conf(ConfKey::CodegenEnabled, true);
        let physical = PhysicalPlanner::new(Arc::new(conf), vec![])
            .plan_first(&plan)
            .unwrap();
        assert_eq!(vec!["Limit", "Filter", "LocalTableScan"], names(&physical));
        assert!(physical.inputs()[0].requires_codegen());
    }
}
