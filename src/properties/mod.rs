//! Properties of physical operators.

mod distribution;

use std::fmt::Debug;
use std::hash::Hash;

pub use distribution::*;

pub trait PhysicalProp: Debug + Hash {
    type Requirement;

    /// Tests whether this property meets `required`.
    fn satisfies(&self, required: &Self::Requirement) -> bool;
}
