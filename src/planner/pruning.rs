use std::collections::HashMap;
use std::sync::Arc;

use crate::error::QueryResult;
use crate::expr::{split_conjunctive_predicates, AttributeReference, AttributeSet, Expr, ExprId};
use crate::operator::LogicalOperator::{LogicalFilter, LogicalProjection};
use crate::operator::{CodegenMode, Filter, PhysicalOperator, Projection};
use crate::plan::{LogicalPlanRef, PhysicalPlanRef, PlanNode};

/// A chain of projections and filters sitting directly on top of `leaf`, flattened into one
/// project list and one list of conjuncts, both expressed over the leaf's output.
#[derive(Clone, Debug)]
pub struct PhysicalOperation {
    pub project_list: Vec<Expr>,
    pub predicates: Vec<Expr>,
    pub leaf: LogicalPlanRef,
}

impl PhysicalOperation {
    /// Always matches; a plan without projections or filters yields the leaf's full output and
    /// no predicates.
    pub fn extract(plan: &LogicalPlanRef) -> QueryResult<Self> {
        let (fields, predicates, leaf, _) = collect_projects_and_filters(plan)?;
        let project_list = match fields {
            Some(fields) => fields,
            None => leaf.output().into_iter().map(Expr::Attribute).collect(),
        };
        Ok(Self {
            project_list,
            predicates,
            leaf,
        })
    }
}

type Collected = (
    Option<Vec<Expr>>,
    Vec<Expr>,
    LogicalPlanRef,
    HashMap<ExprId, Expr>,
);

fn collect_projects_and_filters(plan: &LogicalPlanRef) -> QueryResult<Collected> {
    match plan.operator() {
        LogicalProjection(projection) => {
            let (_, predicates, leaf, aliases) = collect_projects_and_filters(&plan.inputs()[0])?;
            let fields = projection
                .project_list()
                .iter()
                .map(|e| substitute_field(e, &aliases))
                .collect::<QueryResult<Vec<_>>>()?;
            let aliases = collect_aliases(&fields);
            Ok((Some(fields), predicates, leaf, aliases))
        }
        LogicalFilter(filter) => {
            let (fields, mut predicates, leaf, aliases) =
                collect_projects_and_filters(&plan.inputs()[0])?;
            let condition = substitute(filter.condition(), &aliases)?;
            predicates.extend(split_conjunctive_predicates(&condition));
            Ok((fields, predicates, leaf, aliases))
        }
        _ => Ok((None, vec![], plan.clone(), HashMap::new())),
    }
}

fn collect_aliases(fields: &[Expr]) -> HashMap<ExprId, Expr> {
    fields
        .iter()
        .filter_map(|e| match e {
            Expr::Alias { child, expr_id, .. } => Some((*expr_id, child.as_ref().clone())),
            _ => None,
        })
        .collect()
}

fn substitute(expr: &Expr, aliases: &HashMap<ExprId, Expr>) -> QueryResult<Expr> {
    expr.transform_up(&mut |e| match e {
        Expr::Attribute(attr) => Ok(aliases.get(&attr.expr_id()).cloned()),
        _ => Ok(None),
    })
}

/// Like [`substitute`], but a top level attribute keeps its name and id by becoming an alias.
fn substitute_field(field: &Expr, aliases: &HashMap<ExprId, Expr>) -> QueryResult<Expr> {
    match field {
        Expr::Attribute(attr) => Ok(match aliases.get(&attr.expr_id()) {
            Some(child) => Expr::Alias {
                child: Box::new(child.clone()),
                name: attr.name().to_string(),
                expr_id: attr.expr_id(),
            },
            None => field.clone(),
        }),
        other => substitute(other, aliases),
    }
}

/// Plans a scan with the least amount of work above it.
///
/// `prune_pushed_down_filters` drops the predicates the scan evaluates itself, and
/// `scan_builder` creates the scan producing exactly the given attributes. When `project_list`
/// only selects columns and the filters only look at those columns, no projection is needed on
/// top of the scan. Otherwise the scan produces every column referenced by either list and a
/// projection computes the final output.
pub fn prune_filter_project<P, S>(
    project_list: &[Expr],
    filter_predicates: &[Expr],
    prune_pushed_down_filters: P,
    scan_builder: S,
    codegen: CodegenMode,
) -> QueryResult<PhysicalPlanRef>
where
    P: FnOnce(&[Expr]) -> Vec<Expr>,
    S: FnOnce(Vec<AttributeReference>) -> QueryResult<PhysicalPlanRef>,
{
    let project_set: AttributeSet = project_list
        .iter()
        .flat_map(|e| e.references().to_vec())
        .collect();
    let filter_set: AttributeSet = filter_predicates
        .iter()
        .flat_map(|e| e.references().to_vec())
        .collect();
    let remaining_filter = prune_pushed_down_filters(filter_predicates)
        .into_iter()
        .reduce(Expr::and);

    let with_filter = |scan: PhysicalPlanRef| match &remaining_filter {
        Some(condition) => Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalFilter(Filter::new(condition.clone()), codegen),
            vec![scan],
        )),
        None => scan,
    };

    let project_attributes = project_list
        .iter()
        .map(|e| e.as_attribute().cloned())
        .collect::<Option<Vec<_>>>();

    match project_attributes {
        Some(attributes)
            if attributes.iter().cloned().collect::<AttributeSet>() == project_set
                && filter_set.subset_of(&project_set) =>
        {
            Ok(with_filter(scan_builder(attributes)?))
        }
        _ => {
            let scan = scan_builder(project_set.union(&filter_set).to_vec())?;
            Ok(Arc::new(PlanNode::new(
                PhysicalOperator::PhysicalProject(Projection::new(project_list.to_vec()), codegen),
                vec![with_filter(scan)],
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, DataType};
    use crate::operator::{OperatorTrait, TableScan};
    use crate::plan::LogicalPlanBuilder;

    fn scan_builder(attrs: Vec<AttributeReference>) -> QueryResult<PhysicalPlanRef> {
        Ok(Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalTableScan(TableScan::new("t", attrs)),
            vec![],
        )))
    }

    fn columns() -> (AttributeReference, AttributeReference) {
        (
            AttributeReference::new("a", DataType::Int32, false),
            AttributeReference::new("b", DataType::Int32, false),
        )
    }

    #[test]
    fn test_no_pruning_needed() {
        let (a, b) = columns();
        let plan = prune_filter_project(
            &[a.clone().into(), b.clone().into()],
            &[],
            |filters| filters.to_vec(),
            scan_builder,
            CodegenMode::Interpreted,
        )
        .unwrap();

        assert_eq!(scan_builder(vec![a, b]).unwrap(), plan);
    }

    #[test]
    fn test_projection_required() {
        let (a, b) = columns();
        let predicate = Expr::from(b.clone()).gt(lit(0));
        let plan = prune_filter_project(
            &[a.clone().into()],
            &[predicate.clone()],
            |filters| filters.to_vec(),
            scan_builder,
            CodegenMode::Interpreted,
        )
        .unwrap();

        let expected = Arc::new(PlanNode::new(
            PhysicalOperator::PhysicalProject(
                Projection::new(vec![a.clone().into()]),
                CodegenMode::Interpreted,
            ),
            vec![Arc::new(PlanNode::new(
                PhysicalOperator::PhysicalFilter(Filter::new(predicate), CodegenMode::Interpreted),
                vec![scan_builder(vec![a, b]).unwrap()],
            ))],
        ));
        assert_eq!(expected, plan);
    }

    #[test]
    fn test_filter_on_projected_columns() {
        let (a, b) = columns();
        let predicate = Expr::from(a.clone()).gt(lit(0));
        let plan = prune_filter_project(
            &[a.clone().into()],
            &[predicate],
            |filters| filters.to_vec(),
            scan_builder,
            CodegenMode::Generated,
        )
        .unwrap();

        assert_eq!("Filter", plan.operator().name());
        assert!(plan.requires_codegen());
        assert_eq!(vec![a.clone()], plan.inputs()[0].output());

        let computed = prune_filter_project(
            &[Expr::from(a.clone()).plus(Expr::from(b.clone())).alias("s")],
            &[],
            |filters| filters.to_vec(),
            scan_builder,
            CodegenMode::Interpreted,
        )
        .unwrap();
        assert_eq!("Project", computed.operator().name());
        assert_eq!(vec![a, b], computed.inputs()[0].output());
    }

    #[test]
    fn test_pushed_down_filters_are_pruned() {
        let (a, b) = columns();
        let plan = prune_filter_project(
            &[a.clone().into()],
            &[Expr::from(b.clone()).gt(lit(0))],
            |_| vec![],
            scan_builder,
            CodegenMode::Interpreted,
        )
        .unwrap();
        assert_eq!("Project", plan.operator().name());
        assert_eq!("TableScan", plan.inputs()[0].operator().name());
        assert_eq!(vec![a, b], plan.inputs()[0].output());
    }

    #[test]
    fn test_extract_physical_operation() {
        let (a, b) = columns();
        let project = LogicalPlanBuilder::scan("t", vec![a.clone(), b.clone()])
            .filter(Expr::from(b.clone()).gt(lit(0)))
            .project(vec![Expr::from(a.clone()).plus(lit(1)).alias("a1")])
            .build();
        let a1 = project.output()[0].clone();
        let plan = LogicalPlanBuilder::from(project)
            .filter(Expr::from(a1.clone()).lt(lit(10)))
            .build();

        let operation = PhysicalOperation::extract(&plan).unwrap();
        assert_eq!("TableScan", operation.leaf.operator().name());
        assert_eq!(
            vec![
                Expr::from(b).gt(lit(0)),
                Expr::from(a.clone()).plus(lit(1)).lt(lit(10)),
            ],
            operation.predicates
        );
        assert_eq!(
            vec![a1.expr_id()],
            operation
                .project_list
                .iter()
                .filter_map(Expr::to_attribute)
                .map(|attr| attr.expr_id())
                .collect::<Vec<_>>()
        );

        let bare = LogicalPlanBuilder::scan("t", vec![a.clone()]).build();
        let operation = PhysicalOperation::extract(&bare).unwrap();
        assert_eq!(vec![Expr::from(a)], operation.project_list);
        assert!(operation.predicates.is_empty());
    }
}
