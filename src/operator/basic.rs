use crate::expr::Expr;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Filter {
    condition: Expr,
}

impl Filter {
    pub fn new(condition: Expr) -> Self {
        Self { condition }
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Projection {
    project_list: Vec<Expr>,
}

impl Projection {
    pub fn new(project_list: Vec<Expr>) -> Self {
        Self { project_list }
    }

    pub fn project_list(&self) -> &[Expr] {
        &self.project_list
    }

    /// True when every projected expression is a bare attribute.
    pub fn is_attribute_only(&self) -> bool {
        self.project_list
            .iter()
            .all(|e| matches!(e, Expr::Attribute(_)))
    }
}

/// Keeps the first `n` rows.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Limit {
    n: usize,
}

impl Limit {
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    pub fn n(&self) -> usize {
        self.n
    }
}
