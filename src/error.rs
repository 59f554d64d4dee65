use thiserror::Error;

/// Errors raised while compiling or running a query.
///
/// Compile-time failures are fatal to the query that raised them and never touch shared state
/// of other queries. Failures coming out of the execution engine are kept opaque.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Query text could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// No parser is registered for the configured dialect.
    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),

    /// Unresolved, ambiguous or type-mismatched references.
    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    /// No strategy produced a physical candidate for some logical subtree.
    #[error("planning error: {0}")]
    Planning(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure reported by the execution engine, propagated unchanged.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

impl QueryError {
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        QueryError::Analysis(msg.into())
    }

    pub fn planning<S: Into<String>>(msg: S) -> Self {
        QueryError::Planning(msg.into())
    }
}
