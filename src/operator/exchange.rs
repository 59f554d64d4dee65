use crate::properties::Partitioning;

/// Redistributes input rows into `partitioning`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Exchange {
    partitioning: Partitioning,
}

impl Exchange {
    pub fn new(partitioning: Partitioning) -> Self {
        Self { partitioning }
    }

    pub fn partitioning(&self) -> &Partitioning {
        &self.partitioning
    }
}
