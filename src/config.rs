//! Engine configuration.
//!
//! [`SqlConf`] is a string key/value store shared by every query compiled in one
//! [`SqlContext`](crate::context::SqlContext). Recognized keys are listed in [`ConfKey`] and come
//! with typed getters; any other key is kept verbatim so that collaborators can read their own
//! settings from the same store.

use std::collections::HashMap;
use std::str::FromStr;

use log::debug;
use parking_lot::RwLock;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{QueryError, QueryResult};

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display, AsRefStr, EnumIter, IntoStaticStr)]
pub enum ConfKey {
    /// Which parser front-end `sql()` dispatches to.
    #[strum(serialize = "sql.dialect")]
    Dialect,
    /// Whether expression-evaluating physical operators may use generated code.
    #[strum(serialize = "sql.codegen")]
    CodegenEnabled,
    /// Default partition count for exchanges.
    #[strum(serialize = "sql.shuffle.partitions")]
    NumShufflePartitions,
    /// Name of the placeholder column schema-inferring loaders use for malformed input.
    #[strum(serialize = "sql.columnNameOfCorruptRecord")]
    ColumnNameOfCorruptRecord,
    #[strum(serialize = "sql.caseSensitive")]
    CaseSensitive,
    #[strum(serialize = "sql.optimizer.maxIterations")]
    OptimizerMaxIterations,
}

/// Parser front-ends known to the engine.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Dialect {
    Sql,
    Hiveql,
}

lazy_static! {
    static ref DEFAULTS: HashMap<ConfKey, &'static str> = {
        let mut m = HashMap::new();
        m.insert(ConfKey::Dialect, "sql");
        m.insert(ConfKey::CodegenEnabled, "false");
        m.insert(ConfKey::NumShufflePartitions, "200");
        m.insert(ConfKey::ColumnNameOfCorruptRecord, "_corrupt_record");
        m.insert(ConfKey::CaseSensitive, "true");
        m.insert(ConfKey::OptimizerMaxIterations, "100");
        m
    };
}

#[derive(Debug, Default)]
pub struct SqlConf {
    settings: RwLock<HashMap<String, String>>,
}

impl SqlConf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a flat JSON object, e.g. `{"sql.shuffle.partitions": "8"}`.
    ///
    /// Non-string values are stored using their JSON text.
    pub fn from_json(json: &str) -> QueryResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| QueryError::InvalidConfig(e.to_string()))?;
        let object = value.as_object().ok_or_else(|| {
            QueryError::InvalidConfig("configuration must be a JSON object".to_string())
        })?;

        let conf = Self::new();
        for (key, value) in object {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            conf.set(key.as_str(), value);
        }
        Ok(conf)
    }

    pub fn set<K: Into<String>, V: Into<String>>(&self, key: K, value: V) {
        let (key, value) = (key.into(), value.into());
        debug!("Setting configuration {} = {}", key, value);
        self.settings.write().insert(key, value);
    }

    pub fn set_conf(&self, key: ConfKey, value: impl ToString) {
        self.set(key.as_ref(), value.to_string());
    }

    pub fn unset(&self, key: &str) {
        self.settings.write().remove(key);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.settings.read().get(key).cloned()
    }

    /// Explicitly set value of a recognized key, falling back to its default.
    pub fn get_conf(&self, key: ConfKey) -> String {
        self.get(key.as_ref())
            .unwrap_or_else(|| DEFAULTS[&key].to_string())
    }

    pub fn get_all(&self) -> HashMap<String, String> {
        self.settings.read().clone()
    }

    /// Explicit settings plus the default of every recognized key left unset.
    pub fn effective_settings(&self) -> HashMap<String, String> {
        let mut settings = self.get_all();
        for key in ConfKey::iter() {
            settings
                .entry(key.as_ref().to_string())
                .or_insert_with(|| DEFAULTS[&key].to_string());
        }
        settings
    }

    fn parse_conf<T: FromStr>(&self, key: ConfKey) -> QueryResult<T> {
        let raw = self.get_conf(key);
        raw.trim().parse::<T>().map_err(|_| {
            QueryError::InvalidConfig(format!("invalid value for {}: {:?}", key, raw))
        })
    }

    pub fn dialect(&self) -> String {
        self.get_conf(ConfKey::Dialect)
    }

    pub fn codegen_enabled(&self) -> QueryResult<bool> {
        self.parse_conf(ConfKey::CodegenEnabled)
    }

    pub fn num_shuffle_partitions(&self) -> QueryResult<usize> {
        let n: usize = self.parse_conf(ConfKey::NumShufflePartitions)?;
        if n == 0 {
            return Err(QueryError::InvalidConfig(format!(
                "{} must be positive",
                ConfKey::NumShufflePartitions
            )));
        }
        Ok(n)
    }

    pub fn column_name_of_corrupt_record(&self) -> String {
        self.get_conf(ConfKey::ColumnNameOfCorruptRecord)
    }

    pub fn case_sensitive(&self) -> QueryResult<bool> {
        self.parse_conf(ConfKey::CaseSensitive)
    }

    pub fn optimizer_max_iterations(&self) -> QueryResult<usize> {
        self.parse_conf(ConfKey::OptimizerMaxIterations)
    }
}

impl Clone for SqlConf {
    fn clone(&self) -> Self {
        Self {
            settings: RwLock::new(self.get_all()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let conf = SqlConf::new();
        assert_eq!("sql", conf.dialect());
        assert!(!conf.codegen_enabled().unwrap());
        assert_eq!(200, conf.num_shuffle_partitions().unwrap());
        assert_eq!("_corrupt_record", conf.column_name_of_corrupt_record());
        assert!(conf.case_sensitive().unwrap());
    }

    #[test]
    fn test_set_and_unset() {
        let conf = SqlConf::new();
        conf.set_conf(ConfKey::NumShufflePartitions, 8);
        conf.set("my.custom.key", "x");
        assert_eq!(8, conf.num_shuffle_partitions().unwrap());
        assert_eq!(Some("x".to_string()), conf.get("my.custom.key"));

        conf.unset("sql.shuffle.partitions");
        assert_eq!(200, conf.num_shuffle_partitions().unwrap());
    }

    #[test]
    fn test_invalid_value() {
        let conf = SqlConf::new();
        conf.set_conf(ConfKey::CodegenEnabled, "maybe");
        assert!(matches!(
            conf.codegen_enabled(),
            Err(QueryError::InvalidConfig(_))
        ));

        conf.set_conf(ConfKey::NumShufflePartitions, 0);
        assert!(conf.num_shuffle_partitions().is_err());
    }

    #[test]
    fn test_from_json() {
        let conf = SqlConf::from_json(
            r#"{"sql.shuffle.partitions": 4, "sql.codegen": "true", "sql.dialect": "hiveql"}"#,
        )
        .unwrap();
        assert_eq!(4, conf.num_shuffle_partitions().unwrap());
        assert!(conf.codegen_enabled().unwrap());
        assert_eq!(Dialect::Hiveql, conf.dialect().parse().unwrap());

        assert!(SqlConf::from_json("[1, 2]").is_err());
        assert!(SqlConf::from_json("{").is_err());
    }

    #[test]
    fn test_effective_settings() {
        let conf = SqlConf::new();
        conf.set_conf(ConfKey::NumShufflePartitions, 8);
        conf.set("engine.custom", "x");

        let settings = conf.effective_settings();
        assert_eq!("8", settings["sql.shuffle.partitions"]);
        assert_eq!("false", settings["sql.codegen"]);
        assert_eq!("x", settings["engine.custom"]);
        assert_eq!(2, conf.get_all().len());
    }
}
