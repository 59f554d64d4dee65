use std::fmt::{Display, Formatter};

use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use strum_macros::{Display as StrumDisplay, IntoStaticStr};

use crate::expr::{format_exprs, AttributeReference, Expr};
use crate::operator::{
    AggregateMode, EquiJoin, Exchange, Filter, HashAggregate, InMemoryScan, Join, JoinType, Limit,
    LocalRelation, OperatorTrait, Projection, TableScan,
};
use crate::plan::PhysicalPlan;
use crate::properties::{Distribution, Partitioning};

/// Whether an expression-evaluating operator runs generated code or interprets expressions.
///
/// Fixed when the operator is planned, from the `sql.codegen` setting.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum CodegenMode {
    Interpreted,
    Generated,
}

impl From<bool> for CodegenMode {
    fn from(codegen_enabled: bool) -> Self {
        if codegen_enabled {
            CodegenMode::Generated
        } else {
            CodegenMode::Interpreted
        }
    }
}

/// Executable operator.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner, IntoStaticStr)]
pub enum PhysicalOperator {
    #[strum(serialize = "TableScan")]
    PhysicalTableScan(TableScan),
    #[strum(serialize = "LocalTableScan")]
    PhysicalLocalTableScan(LocalRelation),
    #[strum(serialize = "InMemoryColumnarTableScan")]
    PhysicalInMemoryScan(InMemoryScan),
    #[strum(serialize = "Filter")]
    PhysicalFilter(Filter, CodegenMode),
    #[strum(serialize = "Project")]
    PhysicalProject(Projection, CodegenMode),
    #[strum(serialize = "HashJoin")]
    PhysicalHashJoin(EquiJoin),
    #[strum(serialize = "NestedLoopJoin")]
    PhysicalNestedLoopJoin(Join),
    #[strum(serialize = "HashAggregate")]
    PhysicalHashAggregate(HashAggregate, CodegenMode),
    #[strum(serialize = "Limit")]
    PhysicalLimit(Limit),
    #[strum(serialize = "Exchange")]
    PhysicalExchange(Exchange),
}

impl OperatorTrait for PhysicalOperator {
    fn name(&self) -> &'static str {
        self.into()
    }

    fn expressions(&self) -> Vec<&Expr> {
        use PhysicalOperator::*;
        match self {
            PhysicalTableScan(scan) => scan.filters().iter().collect(),
            PhysicalInMemoryScan(scan) => scan.predicates().iter().collect(),
            PhysicalFilter(filter, _) => vec![filter.condition()],
            PhysicalProject(projection, _) => projection.project_list().iter().collect(),
            PhysicalHashJoin(join) => join
                .left_keys()
                .iter()
                .chain(join.right_keys())
                .chain(join.residual())
                .collect(),
            PhysicalNestedLoopJoin(join) => join.condition().into_iter().collect(),
            PhysicalHashAggregate(agg, _) => {
                agg.grouping().iter().chain(agg.aggregates()).collect()
            }
            PhysicalLocalTableScan(_) | PhysicalLimit(_) | PhysicalExchange(_) => vec![],
        }
    }
}

impl PhysicalOperator {
    pub fn codegen_mode(&self) -> Option<CodegenMode> {
        match self {
            PhysicalOperator::PhysicalFilter(_, mode)
            | PhysicalOperator::PhysicalProject(_, mode)
            | PhysicalOperator::PhysicalHashAggregate(_, mode) => Some(*mode),
            _ => None,
        }
    }
}

impl Display for PhysicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use PhysicalOperator::*;
        write!(f, "{} ", self.name())?;
        match self {
            PhysicalTableScan(scan) => write!(f, "{}", scan),
            PhysicalLocalTableScan(relation) => write!(f, "{}", relation),
            PhysicalInMemoryScan(scan) => write!(f, "{}", scan),
            PhysicalFilter(filter, _) => write!(f, "{}", filter.condition()),
            PhysicalProject(projection, _) => {
                write!(f, "[{}]", format_exprs(projection.project_list()))
            }
            PhysicalHashJoin(join) => write!(f, "{}", join),
            PhysicalNestedLoopJoin(join) => write!(f, "{}", join),
            PhysicalHashAggregate(agg, _) => write!(f, "{}", agg),
            PhysicalLimit(limit) => write!(f, "{}", limit.n()),
            PhysicalExchange(exchange) => write!(f, "({})", exchange.partitioning()),
        }
    }
}

impl PhysicalPlan {
    pub fn output(&self) -> Vec<AttributeReference> {
        use PhysicalOperator::*;
        match self.operator() {
            PhysicalTableScan(scan) => scan.output().to_vec(),
            PhysicalLocalTableScan(relation) => relation.output().to_vec(),
            PhysicalInMemoryScan(scan) => scan.attributes().to_vec(),
            PhysicalFilter(..) | PhysicalLimit(_) | PhysicalExchange(_) => self.input_output(0),
            PhysicalProject(projection, _) => projection
                .project_list()
                .iter()
                .filter_map(Expr::to_attribute)
                .collect(),
            PhysicalHashAggregate(agg, _) => agg
                .aggregates()
                .iter()
                .filter_map(Expr::to_attribute)
                .collect(),
            PhysicalHashJoin(join) => self.join_output(join.join_type()),
            PhysicalNestedLoopJoin(join) => self.join_output(join.join_type()),
        }
    }

    fn input_output(&self, idx: usize) -> Vec<AttributeReference> {
        self.inputs()
            .get(idx)
            .map(|input| input.output())
            .unwrap_or_default()
    }

    fn join_output(&self, join_type: JoinType) -> Vec<AttributeReference> {
        let (left, right) = (self.input_output(0), self.input_output(1));
        let nullable = |attrs: Vec<AttributeReference>| {
            attrs
                .into_iter()
                .map(|a| a.with_nullability(true))
                .collect_vec()
        };
        match join_type {
            JoinType::Inner => left.into_iter().chain(right).collect(),
            JoinType::LeftSemi => left,
            JoinType::LeftOuter => left.into_iter().chain(nullable(right)).collect(),
            JoinType::RightOuter => nullable(left).into_iter().chain(right).collect(),
            JoinType::FullOuter => nullable(left).into_iter().chain(nullable(right)).collect(),
        }
    }

    /// Whether this node evaluates its expressions through generated code.
    pub fn requires_codegen(&self) -> bool {
        self.operator().codegen_mode() == Some(CodegenMode::Generated)
    }

    /// Partitioning of the rows this node produces.
    pub fn output_partitioning(&self) -> Partitioning {
        use PhysicalOperator::*;
        let input_partitioning = |idx: usize| {
            self.inputs()
                .get(idx)
                .map(|input| input.output_partitioning())
                .unwrap_or(Partitioning::Unknown(0))
        };
        match self.operator() {
            PhysicalTableScan(_) | PhysicalLocalTableScan(_) | PhysicalInMemoryScan(_) => {
                Partitioning::Unknown(0)
            }
            PhysicalLimit(_) => Partitioning::Single,
            PhysicalExchange(exchange) => exchange.partitioning().clone(),
            PhysicalFilter(..)
            | PhysicalProject(..)
            | PhysicalHashAggregate(..)
            | PhysicalHashJoin(_)
            | PhysicalNestedLoopJoin(_) => input_partitioning(0),
        }
    }

    /// Distribution each input has to satisfy, one entry per input.
    pub fn required_child_distribution(&self) -> Vec<Distribution> {
        use PhysicalOperator::*;
        match self.operator() {
            PhysicalHashJoin(join) => vec![
                Distribution::Clustered(join.left_keys().to_vec()),
                Distribution::Clustered(join.right_keys().to_vec()),
            ],
            PhysicalHashAggregate(agg, _) => match agg.mode() {
                AggregateMode::Partial => vec![Distribution::Unspecified],
                AggregateMode::Final | AggregateMode::Complete if agg.grouping().is_empty() => {
                    vec![Distribution::AllTuples]
                }
                AggregateMode::Final | AggregateMode::Complete => {
                    vec![Distribution::Clustered(agg.grouping().to_vec())]
                }
            },
            _ => vec![Distribution::Unspecified; self.inputs().len()],
        }
    }

    /// Renders this node and its inputs, flagging operators running generated code.
    pub fn simple_string(&self) -> String {
        let mut out = String::new();
        for (depth, node) in self.pre_order() {
            out.push_str(&" ".repeat(depth));
            out.push_str(&node.operator().to_string());
            if node.requires_codegen() {
                out.push_str(" [codegen]");
            }
            out.push('\n');
        }
        out
    }
}
