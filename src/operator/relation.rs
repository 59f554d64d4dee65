/// Reference to a table by name, bound by the analyzer.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct UnresolvedRelation {
    table_name: String,
    alias: Option<String>,
}

impl UnresolvedRelation {
    pub fn new<S: Into<String>>(table_name: S, alias: Option<String>) -> Self {
        Self {
            table_name: table_name.into(),
            alias,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

/// Names the output of its input, so `alias.column` resolves against it.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Subquery {
    alias: String,
}

impl Subquery {
    pub fn new<S: Into<String>>(alias: S) -> Self {
        Self {
            alias: alias.into(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Marker for a construct the engine does not support, dropped before analysis.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Hint {
    name: String,
}

impl Hint {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
