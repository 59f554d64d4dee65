//! Relational operators.
//!
//! Operator payload structs are shared between the logical and the physical world where the
//! payload is the same, e.g. a [`Join`] appears both in [`LogicalOperator::LogicalJoin`] and in
//! [`PhysicalOperator::PhysicalNestedLoopJoin`].

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::expr::Expr;

mod aggregate;
pub use aggregate::*;
mod basic;
pub use basic::*;
mod exchange;
pub use exchange::*;
mod in_memory;
pub use in_memory::*;
mod join;
pub use join::*;
mod local_relation;
pub use local_relation::*;
mod logical;
pub use logical::*;
mod physical;
pub use physical::*;
mod relation;
pub use relation::*;
mod table_scan;
pub use table_scan::*;

pub trait OperatorTrait: Clone + Debug + Hash + Eq + Display {
    /// Operator name used in tree strings and error messages.
    fn name(&self) -> &'static str;

    /// Expressions held directly by this operator.
    fn expressions(&self) -> Vec<&Expr>;
}
