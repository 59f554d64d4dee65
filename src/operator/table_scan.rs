use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strum_macros::Display as StrumDisplay;

use crate::expr::{format_exprs, AttributeReference, Expr};

/// How much of a pushed down filter an external source evaluates itself.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum FilterPushdown {
    /// Filters are not handed to the source.
    Unsupported,
    /// The source may skip some non-matching rows, filters still need to run above the scan.
    Inexact,
    /// The source returns exactly the matching rows.
    Exact,
}

/// Scan of an external data source with a fixed output.
///
/// In a logical plan `output` is the full schema of the source. In a physical plan it is the
/// pruned column list the scan has to produce, and `filters` holds the predicates pushed into
/// the source.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TableScan {
    table_name: String,
    output: Vec<AttributeReference>,
    pushdown: FilterPushdown,
    filters: Vec<Expr>,
}

impl TableScan {
    pub fn new<S: Into<String>>(table_name: S, output: Vec<AttributeReference>) -> Self {
        Self {
            table_name: table_name.into(),
            output,
            pushdown: FilterPushdown::Unsupported,
            filters: vec![],
        }
    }

    pub fn with_pushdown(mut self, pushdown: FilterPushdown) -> Self {
        self.pushdown = pushdown;
        self
    }

    pub fn with_output(&self, output: Vec<AttributeReference>) -> Self {
        Self {
            output,
            ..self.clone()
        }
    }

    /// Same source under fresh attribute ids.
    pub fn new_instance(&self) -> Self {
        self.with_output(self.output.iter().map(|a| a.new_instance()).collect())
    }

    pub fn with_filters(&self, filters: Vec<Expr>) -> Self {
        Self {
            filters,
            ..self.clone()
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn output(&self) -> &[AttributeReference] {
        &self.output
    }

    pub fn pushdown(&self) -> FilterPushdown {
        self.pushdown
    }

    pub fn filters(&self) -> &[Expr] {
        &self.filters
    }
}

impl Display for TableScan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]",
            self.table_name,
            self.output.iter().join(",")
        )?;
        if !self.filters.is_empty() {
            write!(f, " PushedFilters: [{}]", format_exprs(&self.filters))?;
        }
        Ok(())
    }
}
