use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use itertools::Itertools;
use once_cell::sync::OnceCell;

use crate::expr::{format_exprs, AttributeReference, Expr, Row};
use crate::plan::PhysicalPlanRef;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(0);

/// Materialization slot of one cached query.
///
/// Holds the physical plan that produces the cached rows. The rows themselves are computed by the
/// execution engine the first time a scan of the cache runs, and shared by every later scan.
/// Equality and hashing use the slot identity only.
#[derive(Clone)]
pub struct CachedBatches {
    id: u64,
    child: PhysicalPlanRef,
    slot: Arc<OnceCell<Arc<Vec<Row>>>>,
}

impl CachedBatches {
    pub fn new(child: PhysicalPlanRef) -> Self {
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            child,
            slot: Arc::new(OnceCell::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Plan whose result gets materialized.
    pub fn child(&self) -> &PhysicalPlanRef {
        &self.child
    }

    pub fn is_materialized(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn get(&self) -> Option<Arc<Vec<Row>>> {
        self.slot.get().cloned()
    }

    /// Returns the cached rows, running `materialize` if nobody filled the slot yet.
    ///
    /// Concurrent callers block until the first one finishes, `materialize` runs at most once per
    /// successful fill.
    pub fn get_or_materialize<F>(&self, materialize: F) -> anyhow::Result<Arc<Vec<Row>>>
    where
        F: FnOnce() -> anyhow::Result<Vec<Row>>,
    {
        self.slot
            .get_or_try_init(|| materialize().map(Arc::new))
            .map(Arc::clone)
    }
}

impl PartialEq for CachedBatches {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CachedBatches {}

impl Hash for CachedBatches {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for CachedBatches {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedBatches")
            .field("id", &self.id)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// Logical marker standing in for data kept by the cache manager.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct InMemoryRelation {
    output: Vec<AttributeReference>,
    table_name: Option<String>,
    batches: CachedBatches,
}

impl InMemoryRelation {
    pub fn new(
        output: Vec<AttributeReference>,
        table_name: Option<String>,
        batches: CachedBatches,
    ) -> Self {
        Self {
            output,
            table_name,
            batches,
        }
    }

    pub fn output(&self) -> &[AttributeReference] {
        &self.output
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn batches(&self) -> &CachedBatches {
        &self.batches
    }

    /// Same cached data exposed under the attributes of the subtree it replaces.
    pub fn with_output(&self, output: Vec<AttributeReference>) -> Self {
        Self {
            output,
            ..self.clone()
        }
    }
}

impl Display for InMemoryRelation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.output.iter().join(","))?;
        if let Some(name) = &self.table_name {
            write!(f, ", {}", name)?;
        }
        Ok(())
    }
}

/// Physical scan of cached data. `predicates` may be used by the engine to skip batches.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct InMemoryScan {
    attributes: Vec<AttributeReference>,
    predicates: Vec<Expr>,
    relation: InMemoryRelation,
}

impl InMemoryScan {
    pub fn new(
        attributes: Vec<AttributeReference>,
        predicates: Vec<Expr>,
        relation: InMemoryRelation,
    ) -> Self {
        Self {
            attributes,
            predicates,
            relation,
        }
    }

    pub fn attributes(&self) -> &[AttributeReference] {
        &self.attributes
    }

    pub fn predicates(&self) -> &[Expr] {
        &self.predicates
    }

    pub fn relation(&self) -> &InMemoryRelation {
        &self.relation
    }
}

impl Display for InMemoryScan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}], [{}], (InMemoryRelation {})",
            self.attributes.iter().join(","),
            format_exprs(&self.predicates),
            self.relation
        )
    }
}
