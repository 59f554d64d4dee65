use std::collections::HashMap;
use std::sync::Arc;

use crate::error::QueryResult;
use crate::expr::{conjunction, split_conjunctive_predicates, Expr, ExprId, ScalarValue};
use crate::operator::LogicalOperator::{LogicalFilter, LogicalLimit, LogicalProjection};
use crate::operator::{Filter, Limit};
use crate::plan::{LogicalPlanRef, PlanNode, TreeNode};
use crate::rules::Rule;

/// Merges two adjacent filters into one conjunction.
#[derive(Clone, Debug)]
pub struct CombineFilters;

impl Rule for CombineFilters {
    fn name(&self) -> &'static str {
        "CombineFilters"
    }

    fn apply(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        plan.transform_up(&mut |node| {
            let outer = match node.operator() {
                LogicalFilter(filter) => filter,
                _ => return Ok(None),
            };
            let child = &node.inputs()[0];
            match child.operator() {
                LogicalFilter(inner) => {
                    let condition = inner.condition().clone().and(outer.condition().clone());
                    Ok(Some(Arc::new(PlanNode::new(
                        LogicalFilter(Filter::new(condition)),
                        child.inputs().to_vec(),
                    ))))
                }
                _ => Ok(None),
            }
        })
    }
}

/// Collapses `Limit(n, Limit(m, x))` into `Limit(min(n, m), x)`.
#[derive(Clone, Debug)]
pub struct CombineLimits;

impl Rule for CombineLimits {
    fn name(&self) -> &'static str {
        "CombineLimits"
    }

    fn apply(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        plan.transform_up(&mut |node| {
            let outer = match node.operator() {
                LogicalLimit(limit) => limit,
                _ => return Ok(None),
            };
            let child = &node.inputs()[0];
            match child.operator() {
                LogicalLimit(inner) => Ok(Some(Arc::new(PlanNode::new(
                    LogicalLimit(Limit::new(outer.n().min(inner.n()))),
                    child.inputs().to_vec(),
                )))),
                _ => Ok(None),
            }
        })
    }
}

/// Drops conjuncts that are literally `true`, and the filter itself once nothing is left.
#[derive(Clone, Debug)]
pub struct PruneFilters;

fn is_true(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(ScalarValue::Boolean(true)))
}

impl Rule for PruneFilters {
    fn name(&self) -> &'static str {
        "PruneFilters"
    }

    fn apply(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        plan.transform_up(&mut |node| {
            let filter = match node.operator() {
                LogicalFilter(filter) => filter,
                _ => return Ok(None),
            };
            let predicates = split_conjunctive_predicates(filter.condition());
            if !predicates.iter().any(is_true) {
                return Ok(None);
            }

            Ok(Some(
                match conjunction(predicates.into_iter().filter(|p| !is_true(p))) {
                    Some(condition) => Arc::new(PlanNode::new(
                        LogicalFilter(Filter::new(condition)),
                        node.inputs().to_vec(),
                    )),
                    None => node.inputs()[0].clone(),
                },
            ))
        })
    }
}

/// Moves a filter below the projection it sits on.
///
/// References to aliases defined by the projection are replaced by the aliased expression, so
/// the pushed filter only refers to the projection's input.
#[derive(Clone, Debug)]
pub struct PushFilterThroughProject;

fn substitute_aliases(condition: &Expr, aliases: &HashMap<ExprId, Expr>) -> QueryResult<Expr> {
    condition.transform_up(&mut |e| match e {
        Expr::Attribute(attr) => Ok(aliases.get(&attr.expr_id()).cloned()),
        _ => Ok(None),
    })
}

impl Rule for PushFilterThroughProject {
    fn name(&self) -> &'static str {
        "PushFilterThroughProject"
    }

    fn apply(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        plan.transform_down(&mut |node| {
            let filter = match node.operator() {
                LogicalFilter(filter) => filter,
                _ => return Ok(None),
            };
            let project = &node.inputs()[0];
            let projection = match project.operator() {
                LogicalProjection(projection) => projection,
                _ => return Ok(None),
            };
            if projection.project_list().iter().any(Expr::contains_aggregate) {
                return Ok(None);
            }

            let aliases = projection
                .project_list()
                .iter()
                .filter_map(|e| match e {
                    Expr::Alias { child, expr_id, .. } => Some((*expr_id, child.as_ref().clone())),
                    _ => None,
                })
                .collect::<HashMap<_, _>>();
            let pushed = Arc::new(PlanNode::new(
                LogicalFilter(Filter::new(substitute_aliases(
                    filter.condition(),
                    &aliases,
                )?)),
                project.inputs().to_vec(),
            ));
            Ok(Some(Arc::new(project.with_new_inputs(vec![pushed]))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, AttributeReference, DataType};
    use crate::operator::OperatorTrait;
    use crate::plan::LogicalPlanBuilder;

    fn scan() -> (LogicalPlanBuilder, AttributeReference, AttributeReference) {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let b = AttributeReference::new("b", DataType::Int32, false);
        (
            LogicalPlanBuilder::scan("t", vec![a.clone(), b.clone()]),
            a,
            b,
        )
    }

    #[test]
    fn test_combine_filters() {
        let (builder, a, b) = scan();
        let plan = builder
            .filter(Expr::from(a.clone()).gt(lit(1)))
            .filter(Expr::from(b.clone()).lt(lit(2)))
            .build();

        let combined = CombineFilters.apply(&plan).unwrap();
        assert_eq!("Filter", combined.operator().name());
        assert_eq!("TableScan", combined.inputs()[0].operator().name());
        assert_eq!(
            &Expr::from(a).gt(lit(1)).and(Expr::from(b).lt(lit(2))),
            combined.operator().as_logical_filter().unwrap().condition()
        );
    }

    #[test]
    fn test_combine_limits() {
        let (builder, _, _) = scan();
        let plan = builder.limit(10).limit(3).limit(5).build();
        let combined = CombineLimits.apply(&plan).unwrap();
        assert_eq!(
            3,
            combined.operator().as_logical_limit().unwrap().n()
        );
        assert!(combined.inputs()[0].is_leaf());
    }

    #[test]
    fn test_prune_filters() {
        let (builder, a, _) = scan();
        let only_true = builder.filter(lit(true)).build();
        assert!(PruneFilters.apply(&only_true).unwrap().is_leaf());

        let (builder, _, _) = scan();
        let mixed = builder
            .filter(lit(true).and(Expr::from(a.clone()).gt(lit(1))))
            .build();
        let pruned = PruneFilters.apply(&mixed).unwrap();
        assert_eq!(
            &Expr::from(a).gt(lit(1)),
            pruned.operator().as_logical_filter().unwrap().condition()
        );

        let untouched = PruneFilters.apply(&pruned).unwrap();
        assert!(Arc::ptr_eq(&pruned, &untouched));
    }

    #[test]
    fn test_push_filter_through_project() {
        let (builder, a, b) = scan();
        let doubled = Expr::from(a.clone()).plus(Expr::from(a.clone()));
        let project = builder
            .project(vec![doubled.clone().alias("d"), Expr::from(b.clone())])
            .build();
        let d = project.output()[0].clone();
        let plan = LogicalPlanBuilder::from(project)
            .filter(Expr::from(d).gt(lit(4)).and(Expr::from(b.clone()).lt(lit(0))))
            .build();

        let pushed = PushFilterThroughProject.apply(&plan).unwrap();
        assert_eq!("Project", pushed.operator().name());
        let filter = &pushed.inputs()[0];
        assert_eq!(
            &doubled.gt(lit(4)).and(Expr::from(b).lt(lit(0))),
            filter.operator().as_logical_filter().unwrap().condition()
        );
        assert_eq!(plan.output(), pushed.output());
    }
}
