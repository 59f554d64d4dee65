use std::fmt::{Display, Formatter};

use strum_macros::Display as StrumDisplay;

use crate::expr::{format_exprs, Expr};

/// Grouped aggregation. `aggregates` is the full output list and may contain grouping columns.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Aggregate {
    grouping: Vec<Expr>,
    aggregates: Vec<Expr>,
}

impl Aggregate {
    pub fn new(grouping: Vec<Expr>, aggregates: Vec<Expr>) -> Self {
        Self {
            grouping,
            aggregates,
        }
    }

    pub fn grouping(&self) -> &[Expr] {
        &self.grouping
    }

    pub fn aggregates(&self) -> &[Expr] {
        &self.aggregates
    }
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}], [{}]",
            format_exprs(&self.grouping),
            format_exprs(&self.aggregates)
        )
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum AggregateMode {
    /// Pre-aggregates each input partition, no distribution requirement.
    Partial,
    /// Merges partial results, needs rows clustered by the grouping keys.
    Final,
    /// Aggregates raw input in one step, same requirement as `Final`.
    Complete,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct HashAggregate {
    mode: AggregateMode,
    aggregate: Aggregate,
}

impl HashAggregate {
    pub fn new(mode: AggregateMode, aggregate: Aggregate) -> Self {
        Self { mode, aggregate }
    }

    pub fn mode(&self) -> AggregateMode {
        self.mode
    }

    pub fn grouping(&self) -> &[Expr] {
        self.aggregate.grouping()
    }

    pub fn aggregates(&self) -> &[Expr] {
        self.aggregate.aggregates()
    }
}

impl Display for HashAggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.mode, self.aggregate)
    }
}
