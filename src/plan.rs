use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::mem::swap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::QueryResult;
use crate::expr::{AttributeReference, Expr, Row};
use crate::operator::LogicalOperator::{
    LogicalAggregate, LogicalFilter, LogicalHint, LogicalJoin, LogicalLimit,
    LogicalLocalRelation, LogicalProjection, LogicalScan, LogicalSubquery,
    LogicalUnresolvedRelation,
};
use crate::operator::{
    Aggregate, Filter, Hint, Join, JoinType, Limit, LocalRelation, LogicalOperator,
    OperatorTrait, PhysicalOperator, Projection, Subquery, TableScan, UnresolvedRelation,
};

pub type PlanNodeId = u32;

static NEXT_PLAN_NODE_ID: AtomicU32 = AtomicU32::new(0);

fn next_plan_node_id() -> PlanNodeId {
    NEXT_PLAN_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// One node in a plan.
///
/// Logical and physical plans share this structure and differ in their operator type. Nodes are
/// immutable and shared through [`Arc`], rewrites build new nodes for changed paths only.
///
/// Every node carries an `id` that is unique within the process, so one particular subtree
/// instance can be told apart from a structurally equal one. Equality and hashing ignore it.
#[derive(Debug)]
pub struct PlanNode<O> {
    id: PlanNodeId,
    operator: O,
    inputs: Vec<Arc<PlanNode<O>>>,
}

pub type LogicalPlan = PlanNode<LogicalOperator>;
pub type LogicalPlanRef = Arc<LogicalPlan>;
pub type PhysicalPlan = PlanNode<PhysicalOperator>;
pub type PhysicalPlanRef = Arc<PhysicalPlan>;

/// The `eq` should ignore `id`.
impl<O: PartialEq> PartialEq for PlanNode<O> {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator && self.inputs == other.inputs
    }
}

impl<O: Eq> Eq for PlanNode<O> {}

impl<O: Hash> Hash for PlanNode<O> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.operator.hash(state);
        self.inputs.hash(state);
    }
}

/// Breath first iterator of a plan.
struct BFSPlanNodeIter<O> {
    visited: HashSet<PlanNodeId>,
    cur_level: Vec<Arc<PlanNode<O>>>,
    next_level: Vec<Arc<PlanNode<O>>>,
}

impl<O> Iterator for BFSPlanNodeIter<O> {
    type Item = Arc<PlanNode<O>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur_level.is_empty() {
            swap(&mut self.cur_level, &mut self.next_level);
            self.cur_level.reverse();
        }

        if let Some(p) = self.cur_level.pop() {
            for input in &p.inputs {
                if self.visited.insert(input.id) {
                    self.next_level.push(input.clone());
                }
            }

            Some(p)
        } else {
            None
        }
    }
}

impl<O: OperatorTrait> PlanNode<O> {
    pub fn new(operator: O, inputs: Vec<Arc<PlanNode<O>>>) -> Self {
        Self {
            id: next_plan_node_id(),
            operator,
            inputs,
        }
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    pub fn inputs(&self) -> &[Arc<PlanNode<O>>] {
        &self.inputs
    }

    pub fn is_leaf(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Copy of this node over different inputs. The copy gets a new id.
    pub fn with_new_inputs(&self, inputs: Vec<Arc<PlanNode<O>>>) -> Self {
        Self::new(self.operator.clone(), inputs)
    }

    /// Nodes of this plan paired with their depth, parents before children.
    pub fn pre_order(&self) -> Vec<(usize, &PlanNode<O>)> {
        let mut nodes = vec![];
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            nodes.push((depth, node));
            for input in node.inputs.iter().rev() {
                stack.push((depth + 1, input.as_ref()));
            }
        }
        nodes
    }

    pub fn exists<F: Fn(&PlanNode<O>) -> bool>(&self, predicate: F) -> bool {
        self.pre_order().into_iter().any(|(_, node)| predicate(node))
    }

    /// Indented multi-line rendering, one node per line.
    pub fn tree_string(&self) -> String {
        let mut out = String::new();
        for (depth, node) in self.pre_order() {
            out.push_str(&" ".repeat(depth));
            out.push_str(&node.operator.to_string());
            out.push('\n');
        }
        out
    }
}

/// Tree rewrites over shared plan nodes.
///
/// A rule returns `Ok(None)` to leave a node unchanged. Unchanged subtrees keep their identity, so
/// callers can detect a no-op rewrite with [`Arc::ptr_eq`].
pub trait TreeNode: Sized {
    fn transform_up<F>(&self, rule: &mut F) -> QueryResult<Self>
    where
        F: FnMut(&Self) -> QueryResult<Option<Self>>;

    fn transform_down<F>(&self, rule: &mut F) -> QueryResult<Self>
    where
        F: FnMut(&Self) -> QueryResult<Option<Self>>;

    fn bfs_iterator(&self) -> Box<dyn Iterator<Item = Self>>;
}

impl<O: OperatorTrait + 'static> TreeNode for Arc<PlanNode<O>> {
    fn transform_up<F>(&self, rule: &mut F) -> QueryResult<Self>
    where
        F: FnMut(&Self) -> QueryResult<Option<Self>>,
    {
        let node = map_inputs(self, |input| input.transform_up(rule))?;
        Ok(rule(&node)?.unwrap_or(node))
    }

    fn transform_down<F>(&self, rule: &mut F) -> QueryResult<Self>
    where
        F: FnMut(&Self) -> QueryResult<Option<Self>>,
    {
        let node = rule(self)?.unwrap_or_else(|| self.clone());
        map_inputs(&node, |input| input.transform_down(rule))
    }

    fn bfs_iterator(&self) -> Box<dyn Iterator<Item = Self>> {
        let mut visited = HashSet::new();
        visited.insert(self.id);

        Box::new(BFSPlanNodeIter {
            cur_level: vec![self.clone()],
            next_level: vec![],
            visited,
        })
    }
}

fn map_inputs<O, F>(node: &Arc<PlanNode<O>>, mut f: F) -> QueryResult<Arc<PlanNode<O>>>
where
    O: OperatorTrait,
    F: FnMut(&Arc<PlanNode<O>>) -> QueryResult<Arc<PlanNode<O>>>,
{
    let mut changed = false;
    let mut new_inputs = Vec::with_capacity(node.inputs.len());
    for input in &node.inputs {
        let new_input = f(input)?;
        changed |= !Arc::ptr_eq(&new_input, input);
        new_inputs.push(new_input);
    }

    if changed {
        Ok(Arc::new(node.with_new_inputs(new_inputs)))
    } else {
        Ok(node.clone())
    }
}

/// Builds logical plans bottom up.
///
/// ```
/// use query_pipeline::expr::{col, lit};
/// use query_pipeline::plan::LogicalPlanBuilder;
///
/// let plan = LogicalPlanBuilder::table("people")
///     .filter(col("age").gt(lit(21)))
///     .project(vec![col("name")])
///     .build();
/// assert_eq!("Project", plan.operator().to_string().split(' ').next().unwrap());
/// ```
pub struct LogicalPlanBuilder {
    root: LogicalPlanRef,
}

impl From<LogicalPlanRef> for LogicalPlanBuilder {
    fn from(root: LogicalPlanRef) -> Self {
        Self { root }
    }
}

impl LogicalPlanBuilder {
    fn leaf(operator: LogicalOperator) -> Self {
        Self {
            root: Arc::new(PlanNode::new(operator, vec![])),
        }
    }

    fn reset_root(mut self, operator: LogicalOperator, extra_inputs: Vec<LogicalPlanRef>) -> Self {
        let mut inputs = vec![self.root];
        inputs.extend(extra_inputs);
        self.root = Arc::new(PlanNode::new(operator, inputs));
        self
    }

    /// Reference to a registered table, resolved during analysis.
    pub fn table<S: Into<String>>(table_name: S) -> Self {
        Self::leaf(LogicalUnresolvedRelation(UnresolvedRelation::new(
            table_name, None,
        )))
    }

    pub fn table_with_alias<S: Into<String>, A: Into<String>>(table_name: S, alias: A) -> Self {
        Self::leaf(LogicalUnresolvedRelation(UnresolvedRelation::new(
            table_name,
            Some(alias.into()),
        )))
    }

    pub fn scan<S: Into<String>>(table_name: S, output: Vec<AttributeReference>) -> Self {
        Self::leaf(LogicalScan(TableScan::new(table_name, output)))
    }

    pub fn scan_with(table_scan: TableScan) -> Self {
        Self::leaf(LogicalScan(table_scan))
    }

    pub fn local_relation(output: Vec<AttributeReference>, rows: Vec<Row>) -> Self {
        Self::leaf(LogicalLocalRelation(LocalRelation::new(output, rows)))
    }

    pub fn filter(self, condition: Expr) -> Self {
        self.reset_root(LogicalFilter(Filter::new(condition)), vec![])
    }

    pub fn project(self, project_list: Vec<Expr>) -> Self {
        self.reset_root(LogicalProjection(Projection::new(project_list)), vec![])
    }

    pub fn join(self, right: LogicalPlanRef, join_type: JoinType, condition: Option<Expr>) -> Self {
        self.reset_root(LogicalJoin(Join::new(join_type, condition)), vec![right])
    }

    pub fn aggregate(self, grouping: Vec<Expr>, aggregates: Vec<Expr>) -> Self {
        self.reset_root(
            LogicalAggregate(Aggregate::new(grouping, aggregates)),
            vec![],
        )
    }

    pub fn limit(self, n: usize) -> Self {
        self.reset_root(LogicalLimit(Limit::new(n)), vec![])
    }

    pub fn subquery<S: Into<String>>(self, alias: S) -> Self {
        self.reset_root(LogicalSubquery(Subquery::new(alias)), vec![])
    }

    pub fn hint<S: Into<String>>(self, name: S) -> Self {
        self.reset_root(LogicalHint(Hint::new(name)), vec![])
    }

    pub fn build(self) -> LogicalPlanRef {
        self.root
    }
}
