use std::fmt::{Display, Formatter};

use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use strum_macros::IntoStaticStr;

use crate::error::QueryResult;
use crate::expr::{format_exprs, AttributeReference, AttributeSet, Expr};
use crate::operator::{
    Aggregate, Filter, Hint, InMemoryRelation, Join, JoinType, Limit, LocalRelation,
    OperatorTrait, Projection, Subquery, TableScan, UnresolvedRelation,
};
use crate::plan::LogicalPlan;

/// Logical relational operator.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner, IntoStaticStr)]
pub enum LogicalOperator {
    #[strum(serialize = "TableScan")]
    LogicalScan(TableScan),
    #[strum(serialize = "LocalRelation")]
    LogicalLocalRelation(LocalRelation),
    #[strum(serialize = "UnresolvedRelation")]
    LogicalUnresolvedRelation(UnresolvedRelation),
    #[strum(serialize = "Subquery")]
    LogicalSubquery(Subquery),
    #[strum(serialize = "Filter")]
    LogicalFilter(Filter),
    #[strum(serialize = "Project")]
    LogicalProjection(Projection),
    #[strum(serialize = "Join")]
    LogicalJoin(Join),
    #[strum(serialize = "Aggregate")]
    LogicalAggregate(Aggregate),
    #[strum(serialize = "Limit")]
    LogicalLimit(Limit),
    #[strum(serialize = "InMemoryRelation")]
    LogicalInMemoryRelation(InMemoryRelation),
    #[strum(serialize = "Hint")]
    LogicalHint(Hint),
}

impl OperatorTrait for LogicalOperator {
    fn name(&self) -> &'static str {
        self.into()
    }

    fn expressions(&self) -> Vec<&Expr> {
        use LogicalOperator::*;
        match self {
            LogicalFilter(filter) => vec![filter.condition()],
            LogicalProjection(projection) => projection.project_list().iter().collect(),
            LogicalJoin(join) => join.condition().into_iter().collect(),
            LogicalAggregate(agg) => agg.grouping().iter().chain(agg.aggregates()).collect(),
            LogicalScan(_)
            | LogicalLocalRelation(_)
            | LogicalUnresolvedRelation(_)
            | LogicalSubquery(_)
            | LogicalLimit(_)
            | LogicalInMemoryRelation(_)
            | LogicalHint(_) => vec![],
        }
    }
}

impl LogicalOperator {
    /// Same operator with every expression it holds passed through `f`.
    pub fn map_expressions<F>(&self, mut f: F) -> QueryResult<LogicalOperator>
    where
        F: FnMut(&Expr) -> QueryResult<Expr>,
    {
        use LogicalOperator::*;
        Ok(match self {
            LogicalFilter(filter) => LogicalFilter(Filter::new(f(filter.condition())?)),
            LogicalProjection(projection) => LogicalProjection(Projection::new(
                projection
                    .project_list()
                    .iter()
                    .map(&mut f)
                    .collect::<QueryResult<_>>()?,
            )),
            LogicalJoin(join) => LogicalJoin(Join::new(
                join.join_type(),
                join.condition().map(&mut f).transpose()?,
            )),
            LogicalAggregate(agg) => LogicalAggregate(Aggregate::new(
                agg.grouping().iter().map(&mut f).collect::<QueryResult<_>>()?,
                agg.aggregates().iter().map(&mut f).collect::<QueryResult<_>>()?,
            )),
            other => other.clone(),
        })
    }
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use LogicalOperator::*;
        write!(f, "{} ", self.name())?;
        match self {
            LogicalScan(scan) => write!(f, "{}", scan),
            LogicalLocalRelation(relation) => write!(f, "{}", relation),
            LogicalUnresolvedRelation(relation) => match relation.alias() {
                Some(alias) => write!(f, "[{}], {}", relation.table_name(), alias),
                None => write!(f, "[{}]", relation.table_name()),
            },
            LogicalSubquery(subquery) => write!(f, "{}", subquery.alias()),
            LogicalFilter(filter) => write!(f, "{}", filter.condition()),
            LogicalProjection(projection) => {
                write!(f, "[{}]", format_exprs(projection.project_list()))
            }
            LogicalJoin(join) => write!(f, "{}", join),
            LogicalAggregate(agg) => write!(f, "{}", agg),
            LogicalLimit(limit) => write!(f, "{}", limit.n()),
            LogicalInMemoryRelation(relation) => write!(f, "{}", relation),
            LogicalHint(hint) => write!(f, "{}", hint.name()),
        }
    }
}

impl LogicalPlan {
    /// Attributes this plan produces, in order.
    ///
    /// Named expressions that are not resolved yet contribute nothing.
    pub fn output(&self) -> Vec<AttributeReference> {
        use LogicalOperator::*;
        match self.operator() {
            LogicalScan(scan) => scan.output().to_vec(),
            LogicalLocalRelation(relation) => relation.output().to_vec(),
            LogicalInMemoryRelation(relation) => relation.output().to_vec(),
            LogicalUnresolvedRelation(_) => vec![],
            LogicalSubquery(subquery) => self
                .input_output(0)
                .into_iter()
                .map(|a| a.with_qualifier(Some(subquery.alias().to_string())))
                .collect(),
            LogicalFilter(_) | LogicalLimit(_) | LogicalHint(_) => self.input_output(0),
            LogicalProjection(projection) => projection
                .project_list()
                .iter()
                .filter_map(Expr::to_attribute)
                .collect(),
            LogicalAggregate(agg) => agg
                .aggregates()
                .iter()
                .filter_map(Expr::to_attribute)
                .collect(),
            LogicalJoin(join) => {
                let (left, right) = (self.input_output(0), self.input_output(1));
                let nullable = |attrs: Vec<AttributeReference>| {
                    attrs
                        .into_iter()
                        .map(|a| a.with_nullability(true))
                        .collect_vec()
                };
                match join.join_type() {
                    JoinType::Inner => left.into_iter().chain(right).collect(),
                    JoinType::LeftSemi => left,
                    JoinType::LeftOuter => left.into_iter().chain(nullable(right)).collect(),
                    JoinType::RightOuter => nullable(left).into_iter().chain(right).collect(),
                    JoinType::FullOuter => {
                        nullable(left).into_iter().chain(nullable(right)).collect()
                    }
                }
            }
        }
    }

    fn input_output(&self, idx: usize) -> Vec<AttributeReference> {
        self.inputs()
            .get(idx)
            .map(|input| input.output())
            .unwrap_or_default()
    }

    pub fn output_set(&self) -> AttributeSet {
        self.output().into_iter().collect()
    }

    /// Union of the outputs of all inputs.
    pub fn input_set(&self) -> AttributeSet {
        self.inputs()
            .iter()
            .flat_map(|input| input.output())
            .collect()
    }

    /// Attributes referenced by this operator's own expressions.
    pub fn references(&self) -> AttributeSet {
        self.operator()
            .expressions()
            .into_iter()
            .flat_map(|e| e.references().to_vec())
            .collect()
    }

    pub fn children_resolved(&self) -> bool {
        self.inputs().iter().all(|input| input.resolved())
    }

    /// Whether every relation and expression in this tree is bound.
    pub fn resolved(&self) -> bool {
        let self_resolved = match self.operator() {
            LogicalOperator::LogicalUnresolvedRelation(_) => false,
            op => op.expressions().into_iter().all(Expr::resolved),
        };
        self_resolved && self.children_resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, DataType};
    use crate::plan::LogicalPlanBuilder;

    #[test]
    fn test_join_output_nullability() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let b = AttributeReference::new("b", DataType::Int32, false);
        let right = LogicalPlanBuilder::scan("r", vec![b.clone()]).build();
        let plan = LogicalPlanBuilder::scan("l", vec![a.clone()])
            .join(right, JoinType::LeftOuter, None)
            .build();

        let output = plan.output();
        assert_eq!(2, output.len());
        assert!(!output[0].nullable());
        assert!(output[1].nullable());
        assert_eq!(b.expr_id(), output[1].expr_id());
    }

    #[test]
    fn test_subquery_qualifies_output() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let plan = LogicalPlanBuilder::scan("t", vec![a.clone()])
            .subquery("x")
            .build();
        let output = plan.output();
        assert_eq!(Some("x"), output[0].qualifier());
        assert_eq!(a.expr_id(), output[0].expr_id());
    }

    #[test]
    fn test_project_output_and_resolution() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let resolved = LogicalPlanBuilder::scan("t", vec![a.clone()])
            .project(vec![Expr::from(a.clone()).plus(lit(1)).alias("a1")])
            .build();
        assert!(resolved.resolved());
        assert_eq!(vec!["a1"], resolved.output().iter().map(|a| a.name()).collect_vec());
        assert_eq!(a.expr_id(), resolved.references().to_vec()[0].expr_id());

        let unresolved = LogicalPlanBuilder::table("t")
            .filter(crate::expr::col("a").gt(lit(1)))
            .build();
        assert!(!unresolved.resolved());
        assert!(unresolved.output().is_empty());
    }
}
