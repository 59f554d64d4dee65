//! The pipeline compiling one logical plan into an executable physical plan.
//!
//! Stages run in a fixed order: hint removal and analysis, cache substitution, optimization,
//! physical planning, preparation. Each stage is computed on first access and kept; concurrent
//! first accesses wait for a single computation. A stage that fails is not kept, so accessing it
//! again retries it.

use std::fmt::{Display, Formatter};

use enumset::{EnumSet, EnumSetType};
use futures::TryStreamExt;
use log::debug;
use once_cell::sync::OnceCell;
use prettytable::{format, Table};

use crate::analysis::remove_hints;
use crate::context::SqlContext;
use crate::error::QueryResult;
use crate::execution::RowStream;
use crate::expr::Row;
use crate::plan::{LogicalPlanRef, PhysicalPlanRef};

/// Sections of [`QueryExecution::explain_string`].
#[derive(EnumSetType, Debug)]
pub enum PlanStage {
    Parsed,
    /// Analyzed plan together with its output schema.
    Analyzed,
    Optimized,
    /// Prepared physical plan and whether it uses generated code.
    Physical,
}

pub struct QueryExecution<'a> {
    ctx: &'a SqlContext,
    logical: LogicalPlanRef,
    analyzed: OnceCell<LogicalPlanRef>,
    with_cached_data: OnceCell<LogicalPlanRef>,
    optimized_plan: OnceCell<LogicalPlanRef>,
    physical_plan: OnceCell<PhysicalPlanRef>,
    executed_plan: OnceCell<PhysicalPlanRef>,
}

impl<'a> QueryExecution<'a> {
    pub fn new(ctx: &'a SqlContext, logical: LogicalPlanRef) -> Self {
        Self {
            ctx,
            logical,
            analyzed: OnceCell::new(),
            with_cached_data: OnceCell::new(),
            optimized_plan: OnceCell::new(),
            physical_plan: OnceCell::new(),
            executed_plan: OnceCell::new(),
        }
    }

    pub fn logical(&self) -> &LogicalPlanRef {
        &self.logical
    }

    pub fn analyzed(&self) -> QueryResult<&LogicalPlanRef> {
        self.analyzed.get_or_try_init(|| {
            let without_hints = remove_hints(&self.logical)?;
            self.ctx.analyzer().analyze(&without_hints)
        })
    }

    pub fn with_cached_data(&self) -> QueryResult<&LogicalPlanRef> {
        self.with_cached_data
            .get_or_try_init(|| self.ctx.cache_manager().use_cached_data(self.analyzed()?))
    }

    pub fn optimized_plan(&self) -> QueryResult<&LogicalPlanRef> {
        self.optimized_plan
            .get_or_try_init(|| self.ctx.optimizer().optimize(self.with_cached_data()?))
    }

    /// The first physical plan the planner produces for the optimized plan.
    pub fn physical_plan(&self) -> QueryResult<&PhysicalPlanRef> {
        self.physical_plan.get_or_try_init(|| {
            let optimized = self.optimized_plan()?;
            self.ctx.planner().plan_first(optimized)
        })
    }

    /// The physical plan after preparation, ready to be handed to the execution engine.
    pub fn executed_plan(&self) -> QueryResult<&PhysicalPlanRef> {
        self.executed_plan.get_or_try_init(|| {
            let preparation = self.ctx.preparation();
            let prepared = preparation.prepare(self.physical_plan()?)?;
            debug!(
                "{} prepared plan:\n{}",
                preparation.name(),
                prepared.simple_string()
            );
            Ok(prepared)
        })
    }

    /// Starts a run of the prepared plan. Every call runs it again.
    pub fn execute(&self) -> QueryResult<RowStream> {
        let plan = self.executed_plan()?;
        Ok(self.ctx.engine()?.execute(plan)?)
    }

    /// Runs the query and gathers all rows.
    pub async fn collect(&self) -> QueryResult<Vec<Row>> {
        let rows = self.execute()?.try_collect::<Vec<_>>().await?;
        Ok(rows)
    }

    /// Diagnostic dump of the selected stages. A stage that fails shows its error instead of a
    /// plan, the other stages are still rendered.
    pub fn explain_string(&self, stages: EnumSet<PlanStage>) -> String {
        let mut out = String::new();
        for stage in stages {
            match stage {
                PlanStage::Parsed => {
                    out.push_str("== Parsed Logical Plan ==\n");
                    out.push_str(&self.logical.tree_string());
                }
                PlanStage::Analyzed => {
                    out.push_str("== Analyzed Logical Plan ==\n");
                    out.push_str(&string_or_error(self.analyzed().map(|plan| {
                        format!("{}{}", schema_table(plan), plan.tree_string())
                    })));
                }
                PlanStage::Optimized => {
                    out.push_str("== Optimized Logical Plan ==\n");
                    out.push_str(&string_or_error(
                        self.optimized_plan().map(|plan| plan.tree_string()),
                    ));
                }
                PlanStage::Physical => {
                    out.push_str("== Physical Plan ==\n");
                    out.push_str(&string_or_error(
                        self.executed_plan().map(|plan| plan.simple_string()),
                    ));
                    out.push_str(&format!(
                        "Code Generation: {}\n",
                        string_or_error(
                            self.executed_plan()
                                .map(|plan| plan.exists(|node| node.requires_codegen()).to_string())
                        )
                        .trim_end()
                    ));
                }
            }
        }
        out
    }
}

fn string_or_error(result: QueryResult<String>) -> String {
    match result {
        Ok(s) => s,
        Err(e) => format!("{}\n", e),
    }
}

fn schema_table(plan: &LogicalPlanRef) -> String {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["name", "type", "nullable"]);
    for attr in plan.output() {
        table.add_row(row![attr.name(), attr.data_type(), attr.nullable()]);
    }
    table.to_string()
}

impl<'a> Display for QueryExecution<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.explain_string(EnumSet::all()))
    }
}

impl<'a> std::fmt::Debug for QueryExecution<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecution")
            .field("logical", &self.logical)
            .field("analyzed", &self.analyzed.get().is_some())
            .field("executed", &self.executed_plan.get().is_some())
            .finish()
    }
}
