//! Table registry.
//!
//! Maps table names to the logical plans producing them. Temporary tables live only as long as
//! the owning [`SqlContext`](crate::context::SqlContext); persistent catalogs plug in through the
//! [`Catalog`] trait.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::error::{QueryError, QueryResult};
use crate::operator::{LogicalOperator, Subquery};
use crate::plan::{LogicalPlanRef, PlanNode};

pub trait Catalog: Send + Sync {
    fn case_sensitive(&self) -> bool;

    fn table_exists(&self, table_name: &str) -> bool;

    /// Plan registered under `table_name`, wrapped in a [`Subquery`] named after the table, and
    /// in a second one named `alias` when given.
    fn lookup_relation(
        &self,
        table_name: &str,
        alias: Option<&str>,
    ) -> QueryResult<LogicalPlanRef>;

    /// Associates `table_name` with `plan`, replacing any previous association.
    fn register_table(&self, table_name: &str, plan: LogicalPlanRef);

    /// Removes `table_name`. Unknown names are ignored.
    fn unregister_table(&self, table_name: &str);

    fn unregister_all_tables(&self);

    fn table_names(&self) -> Vec<String>;
}

/// In-memory catalog guarded by one lock for the whole map.
///
/// Lookups clone the stored [`Arc`] under the read lock and do everything else after releasing it,
/// so a lookup only ever waits for concurrent registrations.
#[derive(Debug)]
pub struct SimpleCatalog {
    case_sensitive: bool,
    tables: RwLock<HashMap<String, LogicalPlanRef>>,
}

impl SimpleCatalog {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn normalize(&self, table_name: &str) -> String {
        if self.case_sensitive {
            table_name.to_string()
        } else {
            table_name.to_lowercase()
        }
    }
}

fn subquery(alias: &str, plan: LogicalPlanRef) -> LogicalPlanRef {
    Arc::new(PlanNode::new(
        LogicalOperator::LogicalSubquery(Subquery::new(alias)),
        vec![plan],
    ))
}

impl Catalog for SimpleCatalog {
    fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn table_exists(&self, table_name: &str) -> bool {
        self.tables.read().contains_key(&self.normalize(table_name))
    }

    fn lookup_relation(
        &self,
        table_name: &str,
        alias: Option<&str>,
    ) -> QueryResult<LogicalPlanRef> {
        let name = self.normalize(table_name);
        let table = self
            .tables
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| QueryError::TableNotFound(table_name.to_string()))?;

        let with_qualifiers = subquery(&name, table);
        Ok(match alias {
            Some(alias) => subquery(alias, with_qualifiers),
            None => with_qualifiers,
        })
    }

    fn register_table(&self, table_name: &str, plan: LogicalPlanRef) {
        let name = self.normalize(table_name);
        debug!("Registering table {}", name);
        self.tables.write().insert(name, plan);
    }

    fn unregister_table(&self, table_name: &str) {
        let name = self.normalize(table_name);
        if self.tables.write().remove(&name).is_some() {
            debug!("Unregistered table {}", name);
        }
    }

    fn unregister_all_tables(&self) {
        self.tables.write().clear();
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}
