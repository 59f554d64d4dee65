use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use derive_more::From;
use itertools::Itertools;
use strum_macros::Display as StrumDisplay;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    Null,
    Boolean,
    Int32,
    Int64,
    Float64,
    Utf8,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }

    /// Common type two operands can be compared or combined in, if any.
    pub fn common_type(&self, other: &DataType) -> Option<DataType> {
        use DataType::*;
        match (self, other) {
            (a, b) if a == b => Some(*a),
            (Null, t) | (t, Null) => Some(*t),
            (Float64, t) | (t, Float64) if t.is_numeric() => Some(Float64),
            (Int64, t) | (t, Int64) if t.is_numeric() => Some(Int64),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, From)]
pub enum ScalarValue {
    #[from(ignore)]
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::Utf8(s.to_string())
    }
}

/// Floats compare by bit pattern so that plans holding literals stay `Eq + Hash`.
impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        use ScalarValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            (Utf8(a), Utf8(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ScalarValue::Null => {}
            ScalarValue::Boolean(v) => v.hash(state),
            ScalarValue::Int32(v) => v.hash(state),
            ScalarValue::Int64(v) => v.hash(state),
            ScalarValue::Float64(v) => v.to_bits().hash(state),
            ScalarValue::Utf8(v) => v.hash(state),
        }
    }
}

impl Display for ScalarValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Int32(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}L", v),
            ScalarValue::Float64(v) => write!(f, "{:?}", v),
            ScalarValue::Utf8(v) => write!(f, "{:?}", v),
        }
    }
}

/// One output row, values ordered like the producing plan's output attributes.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Default, From)]
pub struct Row(Vec<ScalarValue>);

impl Row {
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.0
    }

    pub fn get(&self, idx: usize) -> Option<&ScalarValue> {
        self.0.get(idx)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_values(self) -> Vec<ScalarValue> {
        self.0
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(","))
    }
}
