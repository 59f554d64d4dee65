//! Semantic analysis of logical plans.
//!
//! The analyzer binds table references to catalog entries and column names to attributes, then
//! validates the result. The [`Analyzer`] trait is the seam other analyzers plug in through; the
//! default [`RuleBasedAnalyzer`] runs a [`RuleExecutor`] followed by [`check_analysis`].

use std::sync::Arc;

use itertools::Itertools;
use log::warn;

use crate::catalog::Catalog;
use crate::error::{QueryError, QueryResult};
use crate::expr::{DataType, Expr};
use crate::operator::{LogicalOperator, OperatorTrait};
use crate::plan::{LogicalPlan, LogicalPlanRef, TreeNode};
use crate::rules::{Batch, BatchStrategy, RuleExecutor};

mod resolve;
pub use resolve::*;

pub trait Analyzer: Send + Sync {
    /// Resolves `plan`, failing with [`QueryError::Analysis`] when it cannot be fully resolved or
    /// does not type check. Analyzing an analyzed plan returns it unchanged.
    fn analyze(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef>;
}

pub struct RuleBasedAnalyzer {
    executor: RuleExecutor,
}

impl RuleBasedAnalyzer {
    pub fn new(catalog: Arc<dyn Catalog>, max_iterations: usize) -> Self {
        let case_sensitive = catalog.case_sensitive();
        let executor = RuleExecutor::new(vec![
            Batch::new(
                "Resolution",
                BatchStrategy::FixedPoint(max_iterations),
                vec![
                    ResolveRelations::new(catalog).into(),
                    ResolveReferences::new(case_sensitive).into(),
                ],
            ),
            Batch::new(
                "AnalysisOperators",
                BatchStrategy::Once,
                vec![EliminateSubqueries.into()],
            ),
        ]);
        Self { executor }
    }
}

impl Analyzer for RuleBasedAnalyzer {
    fn analyze(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        let analyzed = self.executor.execute(plan)?;
        check_analysis(&analyzed)?;
        Ok(analyzed)
    }
}

/// Removes markers of constructs the engine does not support, logging each one dropped.
pub fn remove_hints(plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
    plan.transform_up(&mut |node| match node.operator() {
        LogicalOperator::LogicalHint(hint) => {
            warn!("Ignoring unsupported hint {}", hint.name());
            Ok(node.inputs().first().cloned())
        }
        _ => Ok(None),
    })
}

fn first_unresolved(expr: &Expr) -> Option<&[String]> {
    match expr {
        Expr::UnresolvedAttribute(parts) => Some(parts),
        other => other.children().into_iter().find_map(first_unresolved),
    }
}

fn check_boolean(kind: &str, condition: &Expr) -> QueryResult<()> {
    match condition.data_type()? {
        DataType::Boolean => Ok(()),
        other => Err(QueryError::analysis(format!(
            "{} expression '{}' of type {} is not a boolean",
            kind, condition, other
        ))),
    }
}

fn check_aggregate(node: &LogicalPlan, grouping: &[Expr], aggregates: &[Expr]) -> QueryResult<()> {
    let grouping_refs = grouping
        .iter()
        .flat_map(|g| g.references().to_vec())
        .collect::<crate::expr::AttributeSet>();

    for expr in aggregates {
        let inner = match expr {
            Expr::Alias { child, .. } => child.as_ref(),
            other => other,
        };
        let valid = inner.contains_aggregate()
            || grouping.contains(inner)
            || inner.references().subset_of(&grouping_refs);
        if !valid {
            return Err(QueryError::analysis(format!(
                "expression '{}' is neither present in the group by, nor is it an aggregate \
                 function in {}",
                inner,
                node.operator().name()
            )));
        }
    }
    Ok(())
}

/// Validates a plan the analyzer rules are done with.
///
/// Nodes are checked children first, so the innermost problem is reported.
pub fn check_analysis(plan: &LogicalPlan) -> QueryResult<()> {
    for (_, node) in plan.pre_order().into_iter().rev() {
        if let LogicalOperator::LogicalUnresolvedRelation(relation) = node.operator() {
            return Err(QueryError::TableNotFound(relation.table_name().to_string()));
        }

        for expr in node.operator().expressions() {
            if let Some(parts) = first_unresolved(expr) {
                return Err(QueryError::analysis(format!(
                    "cannot resolve '{}' given input columns {}",
                    parts.join("."),
                    node.input_set().iter().map(|a| a.name()).join(", ")
                )));
            }
            expr.data_type()?;
        }

        match node.operator() {
            LogicalOperator::LogicalFilter(filter) => check_boolean("filter", filter.condition())?,
            LogicalOperator::LogicalJoin(join) => {
                if let Some(condition) = join.condition() {
                    check_boolean("join condition", condition)?;
                }
            }
            LogicalOperator::LogicalAggregate(agg) => {
                check_aggregate(node, agg.grouping(), agg.aggregates())?
            }
            _ => {}
        }
    }
    Ok(())
}
