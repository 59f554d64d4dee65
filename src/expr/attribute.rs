use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display as DeriveDisplay;

use crate::expr::DataType;

static NEXT_EXPR_ID: AtomicU64 = AtomicU64::new(0);

/// Process unique identity of a named expression.
///
/// Two columns sharing a name but coming from different relations carry different ids.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, DeriveDisplay)]
#[display(fmt = "{}", _0)]
pub struct ExprId(u64);

impl ExprId {
    pub fn next() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A resolved reference to a column produced by some operator.
///
/// The qualifier only takes part in name resolution, equality and hashing ignore it.
#[derive(Clone, Debug)]
pub struct AttributeReference {
    name: String,
    data_type: DataType,
    nullable: bool,
    expr_id: ExprId,
    qualifier: Option<String>,
}

impl AttributeReference {
    /// Creates an attribute with a fresh [`ExprId`].
    pub fn new<S: Into<String>>(name: S, data_type: DataType, nullable: bool) -> Self {
        Self::with_id(name, data_type, nullable, ExprId::next())
    }

    pub fn with_id<S: Into<String>>(
        name: S,
        data_type: DataType,
        nullable: bool,
        expr_id: ExprId,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            expr_id,
            qualifier: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn expr_id(&self) -> ExprId {
        self.expr_id
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn with_qualifier(mut self, qualifier: Option<String>) -> Self {
        self.qualifier = qualifier;
        self
    }

    pub fn with_nullability(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Same column under a new identity, used when a relation is instantiated twice.
    pub fn new_instance(&self) -> Self {
        Self {
            expr_id: ExprId::next(),
            ..self.clone()
        }
    }
}

impl PartialEq for AttributeReference {
    fn eq(&self, other: &Self) -> bool {
        self.expr_id == other.expr_id
            && self.name == other.name
            && self.data_type == other.data_type
            && self.nullable == other.nullable
    }
}

impl Eq for AttributeReference {}

impl Hash for AttributeReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.expr_id.hash(state);
        self.name.hash(state);
        self.data_type.hash(state);
        self.nullable.hash(state);
    }
}

impl Display for AttributeReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.expr_id)
    }
}

/// Set of attributes keyed by [`ExprId`], not by name. Iteration follows insertion order.
#[derive(Clone, Debug, Default)]
pub struct AttributeSet {
    attrs: Vec<AttributeReference>,
    ids: HashSet<ExprId>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attr: AttributeReference) -> bool {
        if self.ids.insert(attr.expr_id()) {
            self.attrs.push(attr);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, attr: &AttributeReference) -> bool {
        self.ids.contains(&attr.expr_id())
    }

    pub fn contains_id(&self, expr_id: ExprId) -> bool {
        self.ids.contains(&expr_id)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn subset_of(&self, other: &AttributeSet) -> bool {
        self.ids.is_subset(&other.ids)
    }

    pub fn union(&self, other: &AttributeSet) -> AttributeSet {
        let mut result = self.clone();
        result.extend(other.iter().cloned());
        result
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeReference> {
        self.attrs.iter()
    }

    pub fn to_vec(&self) -> Vec<AttributeReference> {
        self.attrs.clone()
    }
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl Eq for AttributeSet {}

impl Extend<AttributeReference> for AttributeSet {
    fn extend<T: IntoIterator<Item = AttributeReference>>(&mut self, iter: T) {
        for attr in iter {
            self.insert(attr);
        }
    }
}

impl FromIterator<AttributeReference> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = AttributeReference>>(iter: T) -> Self {
        let mut set = AttributeSet::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_ids_are_unique() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let b = AttributeReference::new("a", DataType::Int32, false);
        assert_eq!(a.name(), b.name());
        assert_ne!(a.expr_id(), b.expr_id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_set_keyed_by_id() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let same_name = AttributeReference::new("a", DataType::Int32, false);
        let renamed = AttributeReference::with_id("renamed", DataType::Int32, true, a.expr_id());

        let set: AttributeSet = vec![a.clone(), same_name.clone(), renamed.clone()]
            .into_iter()
            .collect();
        assert_eq!(2, set.len());
        assert!(set.contains(&renamed));
        assert_eq!(vec![a, same_name], set.to_vec());
    }

    #[test]
    fn test_subset_and_union() {
        let a = AttributeReference::new("a", DataType::Int32, false);
        let b = AttributeReference::new("b", DataType::Utf8, true);
        let only_a: AttributeSet = vec![a.clone()].into_iter().collect();
        let only_b: AttributeSet = vec![b.clone()].into_iter().collect();

        assert!(only_a.subset_of(&only_a.union(&only_b)));
        assert!(!only_b.subset_of(&only_a));
        assert_eq!(
            only_a.union(&only_b),
            vec![b, a].into_iter().collect::<AttributeSet>()
        );
    }
}
