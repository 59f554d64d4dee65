use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;

use crate::expr::{AttributeReference, Row};

/// Relation whose rows are held inline in the plan.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct LocalRelation {
    output: Vec<AttributeReference>,
    rows: Arc<Vec<Row>>,
}

impl LocalRelation {
    pub fn new(output: Vec<AttributeReference>, rows: Vec<Row>) -> Self {
        Self {
            output,
            rows: Arc::new(rows),
        }
    }

    pub fn output(&self) -> &[AttributeReference] {
        &self.output
    }

    pub fn rows(&self) -> &Arc<Vec<Row>> {
        &self.rows
    }

    /// Same data under fresh attribute ids.
    pub fn new_instance(&self) -> Self {
        Self {
            output: self.output.iter().map(|a| a.new_instance()).collect(),
            rows: self.rows.clone(),
        }
    }
}

impl Display for LocalRelation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}], {} rows",
            self.output.iter().join(","),
            self.rows.len()
        )
    }
}
