use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use log::{debug, trace};

use crate::catalog::Catalog;
use crate::error::{QueryError, QueryResult};
use crate::expr::{AttributeReference, Expr, ExprId};
use crate::operator::LogicalOperator::{
    LogicalAggregate, LogicalFilter, LogicalJoin, LogicalLocalRelation, LogicalProjection,
    LogicalScan, LogicalSubquery, LogicalUnresolvedRelation,
};
use crate::operator::{Aggregate, Filter, Join, Projection};
use crate::plan::{LogicalPlan, LogicalPlanRef, PlanNode, TreeNode};
use crate::rules::Rule;

/// Replaces table references with the plans registered in the catalog.
///
/// A table referenced more than once would produce the same attributes at every reference. Any
/// lookup whose attributes are already produced elsewhere in the plan is re-instanced with fresh
/// ids, so both sides of a self join stay distinguishable.
#[derive(Clone)]
pub struct ResolveRelations {
    catalog: Arc<dyn Catalog>,
}

impl ResolveRelations {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

impl Debug for ResolveRelations {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResolveRelations")
    }
}

impl Rule for ResolveRelations {
    fn name(&self) -> &'static str {
        "ResolveRelations"
    }

    fn apply(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        let mut produced = produced_ids(plan);
        plan.transform_up(&mut |node| match node.operator() {
            LogicalUnresolvedRelation(relation) => {
                trace!("Resolving relation {}", relation.table_name());
                let mut resolved = self
                    .catalog
                    .lookup_relation(relation.table_name(), relation.alias())?;
                if !produced.is_disjoint(&produced_ids(&resolved)) {
                    debug!("Re-instancing relation {}", relation.table_name());
                    resolved = new_instance(&resolved)?;
                }
                produced.extend(produced_ids(&resolved));
                Ok(Some(resolved))
            }
            _ => Ok(None),
        })
    }
}

/// Ids of every attribute some node of `plan` outputs.
fn produced_ids(plan: &LogicalPlan) -> HashSet<ExprId> {
    plan.pre_order()
        .into_iter()
        .flat_map(|(_, node)| node.output())
        .map(|attr| attr.expr_id())
        .collect()
}

/// Copy of `plan` whose relations and aliases carry fresh ids, with every reference to them
/// rewritten.
fn new_instance(plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
    let mut rewrites: HashMap<ExprId, AttributeReference> = HashMap::new();
    plan.transform_up(&mut |node| {
        let operator = match node.operator() {
            LogicalScan(scan) => LogicalScan(scan.new_instance()),
            LogicalLocalRelation(relation) => LogicalLocalRelation(relation.new_instance()),
            _ if rewrites.is_empty() => return Ok(None),
            other => other.map_expressions(|e| {
                let rewritten = rewrite_attributes(e, &rewrites)?;
                Ok(match rewritten {
                    Expr::Alias { child, name, .. } => Expr::Alias {
                        child,
                        name,
                        expr_id: ExprId::next(),
                    },
                    e => e,
                })
            })?,
        };

        let fresh = Arc::new(PlanNode::new(operator, node.inputs().to_vec()));
        for (old, new) in node.output().iter().zip(fresh.output()) {
            if old.expr_id() != new.expr_id() {
                rewrites.insert(old.expr_id(), new.with_qualifier(None));
            }
        }
        Ok(Some(fresh))
    })
}

fn rewrite_attributes(
    expr: &Expr,
    rewrites: &HashMap<ExprId, AttributeReference>,
) -> QueryResult<Expr> {
    expr.transform_up(&mut |e| match e {
        Expr::Attribute(attr) => Ok(rewrites.get(&attr.expr_id()).map(|fresh| {
            Expr::Attribute(
                fresh
                    .clone()
                    .with_qualifier(attr.qualifier().map(str::to_string)),
            )
        })),
        _ => Ok(None),
    })
}

/// Binds column names to the attributes produced by an operator's inputs.
///
/// Projected or aggregated expressions without a name get one (`_c0`, `_c1`, ...) once resolved,
/// so every output column is a named attribute.
#[derive(Clone, Debug)]
pub struct ResolveReferences {
    case_sensitive: bool,
}

impl ResolveReferences {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    fn name_matches(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    fn resolve_name(
        &self,
        parts: &[String],
        input: &[AttributeReference],
    ) -> QueryResult<Option<AttributeReference>> {
        let candidates = input
            .iter()
            .filter(|attr| match parts {
                [name] => self.name_matches(attr.name(), name),
                [qualifier, name] => {
                    attr.qualifier()
                        .map_or(false, |q| self.name_matches(q, qualifier))
                        && self.name_matches(attr.name(), name)
                }
                _ => false,
            })
            .unique_by(|attr| attr.expr_id())
            .collect_vec();

        match candidates.as_slice() {
            [] => Ok(None),
            [attr] => Ok(Some((*attr).clone())),
            _ => Err(QueryError::analysis(format!(
                "reference '{}' is ambiguous, could be: {}",
                parts.join("."),
                candidates.iter().join(", ")
            ))),
        }
    }

    fn resolve(&self, expr: &Expr, input: &[AttributeReference]) -> QueryResult<Expr> {
        expr.transform_up(&mut |e| match e {
            Expr::UnresolvedAttribute(parts) => {
                Ok(self.resolve_name(parts, input)?.map(Expr::Attribute))
            }
            _ => Ok(None),
        })
    }

    fn resolve_named(&self, exprs: &[Expr], input: &[AttributeReference]) -> QueryResult<Vec<Expr>> {
        exprs
            .iter()
            .enumerate()
            .map(|(idx, e)| {
                let resolved = self.resolve(e, input)?;
                if resolved.resolved() && resolved.name().is_none() {
                    Ok(resolved.alias(format!("_c{}", idx)))
                } else {
                    Ok(resolved)
                }
            })
            .collect()
    }
}

impl Rule for ResolveReferences {
    fn name(&self) -> &'static str {
        "ResolveReferences"
    }

    fn apply(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        plan.transform_up(&mut |node| {
            if !node.children_resolved() {
                return Ok(None);
            }

            let input = node.input_set().to_vec();
            let new_operator = match node.operator() {
                LogicalFilter(filter) => {
                    LogicalFilter(Filter::new(self.resolve(filter.condition(), &input)?))
                }
                LogicalProjection(projection) => LogicalProjection(Projection::new(
                    self.resolve_named(projection.project_list(), &input)?,
                )),
                LogicalJoin(join) => LogicalJoin(Join::new(
                    join.join_type(),
                    join.condition()
                        .map(|c| self.resolve(c, &input))
                        .transpose()?,
                )),
                LogicalAggregate(agg) => LogicalAggregate(Aggregate::new(
                    agg.grouping()
                        .iter()
                        .map(|e| self.resolve(e, &input))
                        .collect::<QueryResult<Vec<_>>>()?,
                    self.resolve_named(agg.aggregates(), &input)?,
                )),
                _ => return Ok(None),
            };

            if &new_operator == node.operator() {
                Ok(None)
            } else {
                Ok(Some(Arc::new(PlanNode::new(
                    new_operator,
                    node.inputs().to_vec(),
                ))))
            }
        })
    }
}

/// Drops [`Subquery`](crate::operator::Subquery) wrappers once names are resolved.
#[derive(Clone, Debug)]
pub struct EliminateSubqueries;

impl Rule for EliminateSubqueries {
    fn name(&self) -> &'static str {
        "EliminateSubqueries"
    }

    fn apply(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        plan.transform_up(&mut |node| match node.operator() {
            LogicalSubquery(_) => Ok(node.inputs().first().cloned()),
            _ => Ok(None),
        })
    }
}
