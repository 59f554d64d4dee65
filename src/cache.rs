//! Registry of cached query results.
//!
//! Caching a query records its analyzed plan together with an [`InMemoryRelation`] standing in for
//! the materialized rows. Nothing is computed when a query is cached; the execution engine fills
//! the relation's slot the first time a plan scanning it runs. Later queries containing a subtree
//! equal to a cached plan read the cached data instead, see [`CacheManager::use_cached_data`].

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::context::SqlContext;
use crate::error::QueryResult;
use crate::operator::{CachedBatches, InMemoryRelation, LogicalOperator};
use crate::plan::{LogicalPlan, LogicalPlanRef, PlanNode, TreeNode};
use crate::query_execution::QueryExecution;

#[derive(Clone, Debug)]
struct CachedData {
    plan: LogicalPlanRef,
    relation: InMemoryRelation,
}

/// Cached queries of one [`SqlContext`].
///
/// All entries sit behind a single lock. Analysis and planning of a query being cached happen
/// before the lock is taken, so the lock is only ever held for list operations.
#[derive(Debug, Default)]
pub struct CacheManager {
    cached_data: RwLock<Vec<CachedData>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cached_data.read().is_empty()
    }

    /// Caches the result of `query`. Caching a query that is already cached only logs a warning.
    pub fn cache_query(
        &self,
        query: &QueryExecution<'_>,
        table_name: Option<&str>,
    ) -> QueryResult<()> {
        let analyzed = query.analyzed()?;
        if self.lookup_cached_data(analyzed).is_some() {
            warn!("Asked to cache already cached data");
            return Ok(());
        }

        let relation = InMemoryRelation::new(
            analyzed.output(),
            table_name.map(str::to_string),
            CachedBatches::new(query.executed_plan()?.clone()),
        );

        let mut cached_data = self.cached_data.write();
        if cached_data.iter().any(|cd| *cd.plan == **analyzed) {
            warn!("Asked to cache already cached data");
            return Ok(());
        }
        info!("Caching {}", table_name.unwrap_or("query"));
        cached_data.push(CachedData {
            plan: analyzed.clone(),
            relation,
        });
        Ok(())
    }

    /// Removes the cache entry of `query` if there is one, returning whether it existed.
    pub fn try_uncache_query(&self, query: &QueryExecution<'_>) -> QueryResult<bool> {
        let analyzed = query.analyzed()?;
        let mut cached_data = self.cached_data.write();
        match cached_data.iter().position(|cd| *cd.plan == **analyzed) {
            Some(idx) => {
                let removed = cached_data.remove(idx);
                info!(
                    "Uncached {}",
                    removed.relation.table_name().unwrap_or("query")
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn cache_table(&self, ctx: &SqlContext, table_name: &str) -> QueryResult<()> {
        self.cache_query(&ctx.table(table_name)?, Some(table_name))
    }

    /// Drops the cached data of `table_name`. Tables that are not cached, or do not exist, are
    /// ignored.
    pub fn uncache_table(&self, ctx: &SqlContext, table_name: &str) -> QueryResult<()> {
        if !ctx.catalog().table_exists(table_name) {
            return Ok(());
        }
        self.try_uncache_query(&ctx.table(table_name)?)?;
        Ok(())
    }

    pub fn is_cached(&self, ctx: &SqlContext, table_name: &str) -> QueryResult<bool> {
        let query = ctx.table(table_name)?;
        Ok(self.lookup_cached_data(query.analyzed()?).is_some())
    }

    /// The cached relation for a plan structurally equal to `plan`, if any.
    pub fn lookup_cached_data(&self, plan: &LogicalPlan) -> Option<InMemoryRelation> {
        self.cached_data
            .read()
            .iter()
            .find(|cd| *cd.plan == *plan)
            .map(|cd| cd.relation.clone())
    }

    /// Replaces every subtree of `plan` that equals a cached plan with a scan of the cached data.
    ///
    /// The replacement produces the same attributes as the subtree it replaces.
    pub fn use_cached_data(&self, plan: &LogicalPlanRef) -> QueryResult<LogicalPlanRef> {
        let cached_data = self.cached_data.read().clone();
        if cached_data.is_empty() {
            return Ok(plan.clone());
        }

        plan.transform_down(&mut |fragment| {
            Ok(cached_data
                .iter()
                .find(|cd| *cd.plan == **fragment)
                .map(|cd| {
                    debug!("Using cached data for {}", fragment.operator());
                    Arc::new(PlanNode::new(
                        LogicalOperator::LogicalInMemoryRelation(
                            cd.relation.with_output(fragment.output()),
                        ),
                        vec![],
                    ))
                }))
        })
    }

    pub fn clear_cache(&self) {
        let mut cached_data = self.cached_data.write();
        if !cached_data.is_empty() {
            info!("Clearing {} cached queries", cached_data.len());
        }
        cached_data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit, AttributeReference, DataType};
    use crate::operator::OperatorTrait;
    use crate::plan::LogicalPlanBuilder;

    fn context() -> SqlContext {
        let ctx = SqlContext::builder().build().unwrap();
        let people = LogicalPlanBuilder::scan(
            "people",
            vec![
                AttributeReference::new("name", DataType::Utf8, true),
                AttributeReference::new("age", DataType::Int32, true),
            ],
        )
        .build();
        ctx.register_table("people", people);
        ctx
    }

    #[test]
    fn test_cache_and_uncache_table() {
        let ctx = context();
        let cache = ctx.cache_manager();
        assert!(!cache.is_cached(&ctx, "people").unwrap());

        cache.cache_table(&ctx, "people").unwrap();
        assert!(cache.is_cached(&ctx, "people").unwrap());
        // Caching twice keeps a single entry.
        cache.cache_table(&ctx, "people").unwrap();
        assert_eq!(1, cache.cached_data.read().len());

        cache.uncache_table(&ctx, "people").unwrap();
        assert!(!cache.is_cached(&ctx, "people").unwrap());
        assert!(cache.is_empty());

        // Uncaching is idempotent, unknown tables are ignored.
        cache.uncache_table(&ctx, "people").unwrap();
        cache.uncache_table(&ctx, "nope").unwrap();
    }

    #[test]
    fn test_use_cached_data_preserves_output() {
        let ctx = context();
        ctx.cache_table("people").unwrap();

        let query = ctx.execute_plan(
            LogicalPlanBuilder::table_with_alias("people", "p")
                .filter(col("age").gt(lit(18)))
                .project(vec![col("p.name")])
                .build(),
        );
        let analyzed = query.analyzed().unwrap();
        let substituted = ctx.cache_manager().use_cached_data(analyzed).unwrap();

        assert_eq!(analyzed.output(), substituted.output());
        let leaf = substituted.inputs()[0].inputs()[0].clone();
        assert_eq!("InMemoryRelation", leaf.operator().name());
        assert_eq!(
            analyzed.inputs()[0].inputs()[0].output(),
            leaf.output()
        );
    }

    #[test]
    fn test_use_cached_data_without_cache_is_identity() {
        let ctx = context();
        let query = ctx.table("people").unwrap();
        let analyzed = query.analyzed().unwrap();
        let substituted = ctx.cache_manager().use_cached_data(analyzed).unwrap();
        assert!(Arc::ptr_eq(analyzed, &substituted));
    }

    #[test]
    fn test_clear_cache() {
        let ctx = context();
        ctx.cache_table("people").unwrap();
        assert!(!ctx.cache_manager().is_empty());
        ctx.clear_cache();
        assert!(ctx.cache_manager().is_empty());
    }

    #[test]
    fn test_concurrent_cache_and_uncache() {
        let ctx = SqlContext::builder().build().unwrap();
        let names = (0..8).map(|i| format!("t{}", i)).collect::<Vec<_>>();
        for name in &names {
            ctx.register_table(
                name,
                LogicalPlanBuilder::scan(
                    name.as_str(),
                    vec![AttributeReference::new("a", DataType::Int32, false)],
                )
                .build(),
            );
        }

        std::thread::scope(|s| {
            for (i, name) in names.iter().enumerate() {
                let ctx = &ctx;
                s.spawn(move || {
                    for _ in 0..10 {
                        ctx.cache_table(name).unwrap();
                        ctx.uncache_table(name).unwrap();
                    }
                    if i % 2 == 0 {
                        ctx.cache_table(name).unwrap();
                    }
                });
            }
        });

        for (i, name) in names.iter().enumerate() {
            assert_eq!(i % 2 == 0, ctx.is_cached(name).unwrap());
        }
        assert_eq!(4, ctx.cache_manager().cached_data.read().len());
    }
}
