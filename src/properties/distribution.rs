use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use crate::expr::{format_exprs, Expr};
use crate::properties::PhysicalProp;

/// How rows produced by an operator are spread across partitions.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Partitioning {
    Unknown(usize),
    Single,
    RoundRobin(usize),
    Hash(Vec<Expr>, usize),
}

/// What a parent requires from the partitioning of one of its inputs.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Distribution {
    Unspecified,
    /// Every row in one partition.
    AllTuples,
    /// Rows agreeing on these expressions land in the same partition.
    Clustered(Vec<Expr>),
}

impl Partitioning {
    pub fn num_partitions(&self) -> usize {
        match self {
            Partitioning::Single => 1,
            Partitioning::Unknown(n) | Partitioning::RoundRobin(n) | Partitioning::Hash(_, n) => *n,
        }
    }

    /// Whether inputs partitioned as `partitionings` can be matched partition by partition, input
    /// `i` being clustered on `required[i]`.
    ///
    /// Hash partitionings qualify only when every input hashes on exactly its own clustering
    /// expressions, in the same order, into the same number of partitions.
    pub fn co_partitioned(partitionings: &[Partitioning], required: &[Distribution]) -> bool {
        if partitionings.iter().all(|p| *p == Partitioning::Single) {
            return true;
        }
        let num_partitions = match partitionings.first() {
            Some(p) => p.num_partitions(),
            None => return true,
        };
        partitionings.len() == required.len()
            && partitionings
                .iter()
                .zip(required)
                .all(|(partitioning, distribution)| match (partitioning, distribution) {
                    (Partitioning::Hash(exprs, n), Distribution::Clustered(clustering)) => {
                        exprs == clustering && *n == num_partitions
                    }
                    _ => false,
                })
    }
}

impl PhysicalProp for Partitioning {
    type Requirement = Distribution;

    fn satisfies(&self, required: &Distribution) -> bool {
        match (self, required) {
            (_, Distribution::Unspecified) => true,
            (Partitioning::Single, _) => true,
            (p, Distribution::AllTuples) => p.num_partitions() == 1,
            (Partitioning::Hash(exprs, _), Distribution::Clustered(clustering)) => {
                let clustering: HashSet<&Expr> = clustering.iter().collect();
                exprs.iter().all(|e| clustering.contains(e))
            }
            _ => false,
        }
    }
}

impl Distribution {
    /// Partitioning an exchange produces to satisfy this distribution.
    pub fn create_partitioning(&self, num_partitions: usize) -> Partitioning {
        match self {
            Distribution::Unspecified => Partitioning::Unknown(num_partitions),
            Distribution::AllTuples => Partitioning::Single,
            Distribution::Clustered(exprs) => Partitioning::Hash(exprs.clone(), num_partitions),
        }
    }
}

impl Display for Partitioning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Partitioning::Unknown(n) => write!(f, "UnknownPartitioning {}", n),
            Partitioning::Single => write!(f, "SinglePartition"),
            Partitioning::RoundRobin(n) => write!(f, "RoundRobinPartitioning {}", n),
            Partitioning::Hash(exprs, n) => {
                write!(f, "HashPartitioning [{}], {}", format_exprs(exprs), n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{AttributeReference, DataType};

    #[test]
    fn test_satisfies() {
        let a: Expr = AttributeReference::new("a", DataType::Int32, false).into();
        let b: Expr = AttributeReference::new("b", DataType::Int32, false).into();
        let clustered_ab = Distribution::Clustered(vec![a.clone(), b.clone()]);

        assert!(Partitioning::Unknown(4).satisfies(&Distribution::Unspecified));
        assert!(!Partitioning::Unknown(4).satisfies(&Distribution::AllTuples));
        assert!(Partitioning::Unknown(1).satisfies(&Distribution::AllTuples));
        assert!(Partitioning::Single.satisfies(&clustered_ab));
        assert!(Partitioning::Hash(vec![a.clone()], 8).satisfies(&clustered_ab));
        assert!(!Partitioning::Hash(vec![a.clone()], 8)
            .satisfies(&Distribution::Clustered(vec![b.clone()])));
        assert!(!Partitioning::RoundRobin(8).satisfies(&clustered_ab));
    }

    #[test]
    fn test_co_partitioning() {
        let attr = |name: &str| -> Expr {
            AttributeReference::new(name, DataType::Int32, false).into()
        };
        let (x, s, t, c) = (attr("x"), attr("s"), attr("t"), attr("c"));
        let required = [
            Distribution::Clustered(vec![x.clone(), s.clone()]),
            Distribution::Clustered(vec![t.clone(), c.clone()]),
        ];
        let hash = |exprs: Vec<&Expr>, n: usize| {
            Partitioning::Hash(exprs.into_iter().cloned().collect(), n)
        };

        assert!(Partitioning::co_partitioned(
            &[hash(vec![&x, &s], 8), hash(vec![&t, &c], 8)],
            &required
        ));
        // Each side satisfies its clustering, but rows with equal keys are hashed differently.
        assert!(!Partitioning::co_partitioned(
            &[hash(vec![&x], 8), hash(vec![&c], 8)],
            &required
        ));
        assert!(!Partitioning::co_partitioned(
            &[hash(vec![&s, &x], 8), hash(vec![&t, &c], 8)],
            &required
        ));
        assert!(!Partitioning::co_partitioned(
            &[hash(vec![&x, &s], 8), hash(vec![&t, &c], 4)],
            &required
        ));
        assert!(Partitioning::co_partitioned(
            &[Partitioning::Single, Partitioning::Single],
            &required
        ));
        assert!(!Partitioning::co_partitioned(
            &[Partitioning::Unknown(8), Partitioning::Unknown(8)],
            &required
        ));
    }

    #[test]
    fn test_create_partitioning() {
        let a: Expr = AttributeReference::new("a", DataType::Int32, false).into();
        let clustered = Distribution::Clustered(vec![a.clone()]);
        let partitioning = clustered.create_partitioning(16);
        assert_eq!(Partitioning::Hash(vec![a], 16), partitioning);
        assert!(partitioning.satisfies(&clustered));
        assert_eq!(
            Partitioning::Single,
            Distribution::AllTuples.create_partitioning(16)
        );
    }
}
