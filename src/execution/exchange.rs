use std::sync::Arc;

use log::debug;

use crate::error::QueryResult;
use crate::execution::Preparation;
use crate::operator::{Exchange, PhysicalOperator};
use crate::plan::{PhysicalPlanRef, PlanNode, TreeNode};
use crate::properties::{Distribution, Partitioning, PhysicalProp};

/// Inserts exchanges wherever an input is not partitioned the way its parent needs.
///
/// Inputs of a node requiring clustered data must in addition be co-partitioned: each hashed on
/// exactly its own clustering expressions into the same number of partitions.
/// If any input fails either check, every input of that node is redistributed into
/// `num_shuffle_partitions` partitions.
#[derive(Clone, Debug)]
pub struct EnsureRequirements {
    num_shuffle_partitions: usize,
}

impl EnsureRequirements {
    pub fn new(num_shuffle_partitions: usize) -> Self {
        Self {
            num_shuffle_partitions,
        }
    }

    fn ensure(&self, node: &PhysicalPlanRef) -> Option<PhysicalPlanRef> {
        let required = node.required_child_distribution();
        let partitionings = node
            .inputs()
            .iter()
            .map(|input| input.output_partitioning())
            .collect::<Vec<_>>();

        let meets_requirements = partitionings
            .iter()
            .zip(&required)
            .all(|(partitioning, distribution)| partitioning.satisfies(distribution));
        let needs_co_partitioning = partitionings.len() > 1
            && required
                .iter()
                .any(|d| matches!(d, Distribution::Clustered(_)));
        let compatible =
            !needs_co_partitioning || Partitioning::co_partitioned(&partitionings, &required);

        if meets_requirements && compatible {
            return None;
        }

        let inputs = node
            .inputs()
            .iter()
            .zip(&required)
            .map(|(input, distribution)| {
                let partitioning = distribution.create_partitioning(self.num_shuffle_partitions);
                if !needs_co_partitioning && input.output_partitioning().satisfies(distribution) {
                    return input.clone();
                }
                debug!(
                    "Adding exchange ({}) below {}",
                    partitioning,
                    node.operator()
                );
                Arc::new(PlanNode::new(
                    PhysicalOperator::PhysicalExchange(Exchange::new(partitioning)),
                    vec![input.clone()],
                ))
            })
            .collect();
        Some(Arc::new(node.with_new_inputs(inputs)))
    }
}

impl Preparation for EnsureRequirements {
    fn name(&self) -> &'static str {
        "EnsureRequirements"
    }

    fn prepare(&self, plan: &PhysicalPlanRef) -> QueryResult<PhysicalPlanRef> {
        plan.transform_up(&mut |node| Ok(self.ensure(node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{aggregate, AggregateFunc, AttributeReference, DataType, Expr};
    use crate::operator::{
        Aggregate, AggregateMode, CodegenMode, EquiJoin, HashAggregate, JoinType, Limit,
        OperatorTrait, TableScan,
    };

    fn scan(attrs: Vec<AttributeReference>) -> PhysicalPlanRef {
        Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalTableScan(TableScan::new("t", attrs)),
            vec![],
        ))
    }

    fn names(plan: &PhysicalPlanRef) -> Vec<&'static str> {
        plan.pre_order()
            .into_iter()
            .map(|(_, node)| node.operator().name())
            .collect()
    }

    #[test]
    fn test_hash_join_gets_both_sides_shuffled() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let b = AttributeReference::new("b", DataType::Int32, false);
        let join = Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalHashJoin(EquiJoin::new(
                JoinType::Inner,
                vec![a.clone().into()],
                vec![b.clone().into()],
                None,
            )),
            vec![scan(vec![a.clone()]), scan(vec![b.clone()])],
        ));

        let prepared = EnsureRequirements::new(10).prepare(&join).unwrap();
        assert_eq!(
            vec!["HashJoin", "Exchange", "TableScan", "Exchange", "TableScan"],
            names(&prepared)
        );
        assert_eq!(
            &Partitioning::Hash(vec![Expr::from(a)], 10),
            prepared.inputs()[0]
                .operator()
                .as_physical_exchange()
                .unwrap()
                .partitioning()
        );
    }

    fn exchange(partitioning: Partitioning, input: PhysicalPlanRef) -> PhysicalPlanRef {
        Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalExchange(Exchange::new(partitioning)),
            vec![input],
        ))
    }

    fn hash_join(
        left_keys: Vec<Expr>,
        right_keys: Vec<Expr>,
        left: PhysicalPlanRef,
        right: PhysicalPlanRef,
    ) -> PhysicalPlanRef {
        Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalHashJoin(EquiJoin::new(
                JoinType::Inner,
                left_keys,
                right_keys,
                None,
            )),
            vec![left, right],
        ))
    }

    #[test]
    fn test_hash_join_inputs_hashed_on_unpaired_keys() {
        let attrs = ["x", "s", "t", "c"]
            .map(|name| AttributeReference::new(name, DataType::Int32, false));
        let [x, s, t, c] = attrs.clone().map(Expr::from);
        let left_keys = vec![x.clone(), s.clone()];
        let right_keys = vec![t.clone(), c.clone()];

        // Both sides satisfy their own clustering, yet `x` is paired with `t`, not `c`.
        let join = hash_join(
            left_keys.clone(),
            right_keys.clone(),
            exchange(
                Partitioning::Hash(vec![x], 10),
                scan(vec![attrs[0].clone(), attrs[1].clone()]),
            ),
            exchange(
                Partitioning::Hash(vec![c], 10),
                scan(vec![attrs[2].clone(), attrs[3].clone()]),
            ),
        );

        let prepared = EnsureRequirements::new(10).prepare(&join).unwrap();
        assert!(!Arc::ptr_eq(&join, &prepared));
        let partitioning_of = |idx: usize| {
            prepared.inputs()[idx]
                .operator()
                .as_physical_exchange()
                .unwrap()
                .partitioning()
                .clone()
        };
        assert_eq!(Partitioning::Hash(left_keys.clone(), 10), partitioning_of(0));
        assert_eq!(Partitioning::Hash(right_keys.clone(), 10), partitioning_of(1));

        // Inputs hashed on their paired keys are left alone.
        let co_partitioned = hash_join(
            left_keys.clone(),
            right_keys.clone(),
            exchange(
                Partitioning::Hash(left_keys, 10),
                scan(vec![attrs[0].clone(), attrs[1].clone()]),
            ),
            exchange(
                Partitioning::Hash(right_keys, 10),
                scan(vec![attrs[2].clone(), attrs[3].clone()]),
            ),
        );
        let again = EnsureRequirements::new(10).prepare(&co_partitioned).unwrap();
        assert!(Arc::ptr_eq(&co_partitioned, &again));
    }

    #[test]
    fn test_satisfied_plan_is_untouched() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let plan = Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalLimit(Limit::new(1)),
            vec![scan(vec![a])],
        ));
        let prepared = EnsureRequirements::new(10).prepare(&plan).unwrap();
        assert!(Arc::ptr_eq(&plan, &prepared));
    }

    #[test]
    fn test_two_phase_aggregate() {
        let k = AttributeReference::new("k", DataType::Int32, false);
        let agg = Aggregate::new(
            vec![k.clone().into()],
            vec![
                k.clone().into(),
                aggregate(AggregateFunc::Count, k.clone().into()).alias("c"),
            ],
        );
        let partial = Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalHashAggregate(
                HashAggregate::new(AggregateMode::Partial, agg.clone()),
                CodegenMode::Interpreted,
            ),
            vec![scan(vec![k.clone()])],
        ));
        let plan = Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalHashAggregate(
                HashAggregate::new(AggregateMode::Final, agg),
                CodegenMode::Interpreted,
            ),
            vec![partial],
        ));

        let prepared = EnsureRequirements::new(4).prepare(&plan).unwrap();
        assert_eq!(
            vec!["HashAggregate", "Exchange", "HashAggregate", "TableScan"],
            names(&prepared)
        );

        // Running the pass again finds nothing left to fix.
        let again = EnsureRequirements::new(4).prepare(&prepared).unwrap();
        assert!(Arc::ptr_eq(&prepared, &again));
    }
}
