//! Entry point owning everything shared by the queries compiled in one session.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, info};

use crate::analysis::{Analyzer, RuleBasedAnalyzer};
use crate::cache::CacheManager;
use crate::catalog::{Catalog, SimpleCatalog};
use crate::config::{Dialect, SqlConf};
use crate::error::{QueryError, QueryResult};
use crate::execution::{EnsureRequirements, ExecutionEngine, Preparation};
use crate::optimizer::{Optimizer, RuleBasedOptimizer};
use crate::plan::LogicalPlanRef;
use crate::planner::{PhysicalPlanner, StrategyImpl};
use crate::query_execution::QueryExecution;

/// Front-end turning query text into an unresolved logical plan.
pub trait Parser: Send + Sync {
    fn parse(&self, text: &str) -> QueryResult<LogicalPlanRef>;
}

pub struct SqlContext {
    conf: Arc<SqlConf>,
    catalog: Arc<dyn Catalog>,
    cache_manager: CacheManager,
    analyzer: Box<dyn Analyzer>,
    optimizer: Box<dyn Optimizer>,
    planner: PhysicalPlanner,
    preparation: Box<dyn Preparation>,
    engine: Option<Arc<dyn ExecutionEngine>>,
    parsers: HashMap<Dialect, Box<dyn Parser>>,
}

/// Collaborators left unset are built from the configuration when [`SqlContextBuilder::build`]
/// runs.
#[derive(Default)]
pub struct SqlContextBuilder {
    conf: Option<SqlConf>,
    catalog: Option<Arc<dyn Catalog>>,
    analyzer: Option<Box<dyn Analyzer>>,
    optimizer: Option<Box<dyn Optimizer>>,
    strategies: Vec<StrategyImpl>,
    preparation: Option<Box<dyn Preparation>>,
    engine: Option<Arc<dyn ExecutionEngine>>,
    parsers: HashMap<Dialect, Box<dyn Parser>>,
}

impl SqlContextBuilder {
    pub fn with_conf(mut self, conf: SqlConf) -> Self {
        self.conf = Some(conf);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_analyzer<A: Analyzer + 'static>(mut self, analyzer: A) -> Self {
        self.analyzer = Some(Box::new(analyzer));
        self
    }

    pub fn with_optimizer<O: Optimizer + 'static>(mut self, optimizer: O) -> Self {
        self.optimizer = Some(Box::new(optimizer));
        self
    }

    /// Adds a strategy tried before the built-in ones. Strategies added earlier are tried first.
    pub fn with_strategy<S: Into<StrategyImpl>>(mut self, strategy: S) -> Self {
        self.strategies.push(strategy.into());
        self
    }

    pub fn with_preparation<P: Preparation + 'static>(mut self, preparation: P) -> Self {
        self.preparation = Some(Box::new(preparation));
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_parser<P: Parser + 'static>(mut self, dialect: Dialect, parser: P) -> Self {
        self.parsers.insert(dialect, Box::new(parser));
        self
    }

    pub fn build(self) -> QueryResult<SqlContext> {
        let conf = Arc::new(self.conf.unwrap_or_default());
        let max_iterations = conf.optimizer_max_iterations()?;

        let catalog: Arc<dyn Catalog> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(SimpleCatalog::new(conf.case_sensitive()?)),
        };
        let analyzer: Box<dyn Analyzer> = match self.analyzer {
            Some(analyzer) => analyzer,
            None => Box::new(RuleBasedAnalyzer::new(catalog.clone(), max_iterations)),
        };
        let optimizer: Box<dyn Optimizer> = match self.optimizer {
            Some(optimizer) => optimizer,
            None => Box::new(RuleBasedOptimizer::new(max_iterations)),
        };
        let preparation: Box<dyn Preparation> = match self.preparation {
            Some(preparation) => preparation,
            None => Box::new(EnsureRequirements::new(conf.num_shuffle_partitions()?)),
        };
        let planner = PhysicalPlanner::new(conf.clone(), self.strategies);

        debug!(
            "Built context with {} strategies and {} parsers",
            planner.strategies().len(),
            self.parsers.len()
        );

        Ok(SqlContext {
            conf,
            catalog,
            cache_manager: CacheManager::new(),
            analyzer,
            optimizer,
            planner,
            preparation,
            engine: self.engine,
            parsers: self.parsers,
        })
    }
}

impl SqlContext {
    pub fn builder() -> SqlContextBuilder {
        SqlContextBuilder::default()
    }

    pub fn conf(&self) -> &SqlConf {
        &self.conf
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn cache_manager(&self) -> &CacheManager {
        &self.cache_manager
    }

    pub fn analyzer(&self) -> &dyn Analyzer {
        self.analyzer.as_ref()
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    pub fn planner(&self) -> &PhysicalPlanner {
        &self.planner
    }

    pub fn preparation(&self) -> &dyn Preparation {
        self.preparation.as_ref()
    }

    pub fn engine(&self) -> QueryResult<&Arc<dyn ExecutionEngine>> {
        self.engine
            .as_ref()
            .ok_or_else(|| QueryError::Execution(anyhow!("no execution engine configured")))
    }

    /// Parses `text` with the parser of the configured dialect.
    pub fn sql(&self, text: &str) -> QueryResult<QueryExecution<'_>> {
        let name = self.conf.dialect();
        let parser = Dialect::from_str(&name)
            .ok()
            .and_then(|dialect| self.parsers.get(&dialect))
            .ok_or(QueryError::UnsupportedDialect(name))?;
        Ok(self.execute_plan(parser.parse(text)?))
    }

    pub fn execute_plan(&self, plan: LogicalPlanRef) -> QueryExecution<'_> {
        QueryExecution::new(self, plan)
    }

    /// Query reading the whole registered table.
    pub fn table(&self, table_name: &str) -> QueryResult<QueryExecution<'_>> {
        Ok(self.execute_plan(self.catalog.lookup_relation(table_name, None)?))
    }

    pub fn register_table(&self, table_name: &str, plan: LogicalPlanRef) {
        self.catalog.register_table(table_name, plan);
    }

    /// Unregisters `table_name`, dropping its cached data first.
    pub fn drop_temp_table(&self, table_name: &str) -> QueryResult<()> {
        if self.catalog.table_exists(table_name) {
            self.cache_manager.try_uncache_query(&self.table(table_name)?)?;
            self.catalog.unregister_table(table_name);
            info!("Dropped temporary table {}", table_name);
        }
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    pub fn cache_table(&self, table_name: &str) -> QueryResult<()> {
        self.cache_manager.cache_table(self, table_name)
    }

    pub fn uncache_table(&self, table_name: &str) -> QueryResult<()> {
        self.cache_manager.uncache_table(self, table_name)
    }

    pub fn is_cached(&self, table_name: &str) -> QueryResult<bool> {
        self.cache_manager.is_cached(self, table_name)
    }

    pub fn clear_cache(&self) {
        self.cache_manager.clear_cache()
    }
}

impl Debug for SqlContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlContext")
            .field("conf", &self.conf)
            .field("tables", &self.catalog.table_names())
            .field("cache_manager", &self.cache_manager)
            .field("dialects", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfKey;
    use crate::expr::{AttributeReference, DataType};
    use crate::plan::LogicalPlanBuilder;

    /// Treats the whole text as a table name.
    struct TableNameParser;

    impl Parser for TableNameParser {
        fn parse(&self, text: &str) -> QueryResult<LogicalPlanRef> {
            let name = text.trim();
            if name.is_empty() || name.contains(' ') {
                return Err(QueryError::Syntax(format!("unexpected input '{}'", text)));
            }
            Ok(LogicalPlanBuilder::table(name).build())
        }
    }

    fn people() -> LogicalPlanRef {
        LogicalPlanBuilder::scan(
            "people",
            vec![AttributeReference::new("name", DataType::Utf8, true)],
        )
        .build()
    }

    #[test]
    fn test_sql_dispatches_on_dialect() {
        let ctx = SqlContext::builder()
            .with_parser(Dialect::Sql, TableNameParser)
            .build()
            .unwrap();
        ctx.register_table("people", people());

        let query = ctx.sql("people").unwrap();
        assert_eq!(1, query.analyzed().unwrap().output().len());
        assert!(matches!(ctx.sql("select *"), Err(QueryError::Syntax(_))));

        ctx.conf().set_conf(ConfKey::Dialect, Dialect::Hiveql);
        assert!(matches!(
            ctx.sql("people"),
            Err(QueryError::UnsupportedDialect(d)) if d == "hiveql"
        ));
        ctx.conf().set_conf(ConfKey::Dialect, "klingon");
        assert!(matches!(
            ctx.sql("people"),
            Err(QueryError::UnsupportedDialect(_))
        ));
    }

    #[test]
    fn test_build_rejects_invalid_conf() {
        let conf = SqlConf::new();
        conf.set_conf(ConfKey::NumShufflePartitions, "lots");
        assert!(matches!(
            SqlContext::builder().with_conf(conf).build(),
            Err(QueryError::InvalidConfig(_))
        ));

        let conf = SqlConf::new();
        conf.set_conf(ConfKey::NumShufflePartitions, 0);
        assert!(matches!(
            SqlContext::builder().with_conf(conf).build(),
            Err(QueryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_engine() {
        let ctx = SqlContext::builder().build().unwrap();
        assert!(matches!(ctx.engine(), Err(QueryError::Execution(_))));
    }

    #[test]
    fn test_drop_temp_table_uncaches() {
        let ctx = SqlContext::builder().build().unwrap();
        ctx.register_table("people", people());
        ctx.cache_table("people").unwrap();
        assert_eq!(vec!["people".to_string()], ctx.table_names());

        ctx.drop_temp_table("people").unwrap();
        assert!(ctx.table_names().is_empty());
        assert!(ctx.cache_manager().is_empty());
        assert!(matches!(
            ctx.table("people"),
            Err(QueryError::TableNotFound(_))
        ));
        // Dropping an unknown table is a no-op.
        ctx.drop_temp_table("people").unwrap();
    }
}
