//! ## Background
//!
//! A query goes through a fixed pipeline before it runs. The parsed plan still names tables and
//! columns as plain strings; analysis binds them against the catalog and checks types. Subtrees
//! that match a cached query are then replaced by a scan of the cached data, the rule based
//! optimizer rewrites the result, and physical planning picks concrete operators for it. A last
//! preparation pass inserts the exchanges the chosen operators need, and the prepared plan is
//! handed to an execution engine supplied by the application.
//!
//! ## Design
//!
//! ### Plans
//!
//! Logical and physical plans share one immutable tree type, [`plan::PlanNode`]. Rewrites build
//! new nodes only where something changed, so an untouched subtree keeps its identity across a
//! rule or a whole batch of rules.
//!
//! ### Rules and strategies
//!
//! Analysis and optimization run batches of [`rules::Rule`]s, either once or until a fix point.
//! Physical planning tries a list of [`planner::Strategy`]s and takes the first candidate any of
//! them proposes; there is no cost model.
//!
//! ### Sessions
//!
//! A [`context::SqlContext`] owns the configuration, the catalog, the cache and every pipeline
//! component. Each [`query_execution::QueryExecution`] borrows its context and computes every
//! stage at most once.

#[macro_use]
extern crate prettytable;
#[macro_use]
extern crate lazy_static;

pub mod analysis;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod expr;
pub mod operator;
pub mod optimizer;
pub mod plan;
pub mod planner;
pub mod properties;
pub mod query_execution;
pub mod rules;
