//! Scalar expressions appearing inside plan operators.
//!
//! Expressions are plain immutable trees. Evaluation is not part of this crate; the planner only
//! needs to know which attributes an expression references, its result type, and how to print it.

use std::fmt::{Display, Formatter};

use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use strum_macros::Display as StrumDisplay;

use crate::error::{QueryError, QueryResult};

mod attribute;
pub use attribute::*;
mod scalar;
pub use scalar::*;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum BinaryOperator {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | NotEq | Lt | LtEq | Gt | GtEq)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum Expr {
    Attribute(AttributeReference),
    /// Name parts of a column not yet bound to an attribute, e.g. `["t", "a"]` for `t.a`.
    UnresolvedAttribute(Vec<String>),
    Literal(ScalarValue),
    Alias {
        child: Box<Expr>,
        name: String,
        expr_id: ExprId,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    AggregateFunction {
        func: AggregateFunc,
        arg: Box<Expr>,
        distinct: bool,
    },
}

/// Unresolved column reference, `"t.a"` qualifies `a` with `t`.
pub fn col(name: &str) -> Expr {
    Expr::UnresolvedAttribute(name.split('.').map(str::to_string).collect())
}

pub fn lit<V: Into<ScalarValue>>(value: V) -> Expr {
    Expr::Literal(value.into())
}

pub fn aggregate(func: AggregateFunc, arg: Expr) -> Expr {
    Expr::AggregateFunction {
        func,
        arg: Box::new(arg),
        distinct: false,
    }
}

impl From<AttributeReference> for Expr {
    fn from(attr: AttributeReference) -> Self {
        Expr::Attribute(attr)
    }
}

impl Expr {
    fn binary(self, op: BinaryOperator, other: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Or, other)
    }

    pub fn plus(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Plus, other)
    }

    pub fn alias<S: Into<String>>(self, name: S) -> Expr {
        Expr::Alias {
            child: Box::new(self),
            name: name.into(),
            expr_id: ExprId::next(),
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Attribute(_) | Expr::UnresolvedAttribute(_) | Expr::Literal(_) => vec![],
            Expr::Alias { child, .. } => vec![child],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) => vec![e],
            Expr::AggregateFunction { arg, .. } => vec![arg],
        }
    }

    /// Rebuilds this node with every direct child passed through `f`.
    pub fn map_children<F>(&self, mut f: F) -> QueryResult<Expr>
    where
        F: FnMut(&Expr) -> QueryResult<Expr>,
    {
        Ok(match self {
            Expr::Attribute(_) | Expr::UnresolvedAttribute(_) | Expr::Literal(_) => self.clone(),
            Expr::Alias {
                child,
                name,
                expr_id,
            } => Expr::Alias {
                child: Box::new(f(child)?),
                name: name.clone(),
                expr_id: *expr_id,
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(f(left)?),
                op: *op,
                right: Box::new(f(right)?),
            },
            Expr::Not(e) => Expr::Not(Box::new(f(e)?)),
            Expr::IsNull(e) => Expr::IsNull(Box::new(f(e)?)),
            Expr::IsNotNull(e) => Expr::IsNotNull(Box::new(f(e)?)),
            Expr::AggregateFunction {
                func,
                arg,
                distinct,
            } => Expr::AggregateFunction {
                func: *func,
                arg: Box::new(f(arg)?),
                distinct: *distinct,
            },
        })
    }

    /// Post-order rewrite. `rule` returns `None` to keep a node as is.
    pub fn transform_up<F>(&self, rule: &mut F) -> QueryResult<Expr>
    where
        F: FnMut(&Expr) -> QueryResult<Option<Expr>>,
    {
        let with_new_children = self.map_children(|c| c.transform_up(rule))?;
        Ok(rule(&with_new_children)?.unwrap_or(with_new_children))
    }

    /// Pre-order visit of this expression tree.
    pub fn exists<F: Fn(&Expr) -> bool + Copy>(&self, predicate: F) -> bool {
        predicate(self) || self.children().into_iter().any(|c| c.exists(predicate))
    }

    /// Attributes referenced anywhere in this expression.
    pub fn references(&self) -> AttributeSet {
        let mut set = AttributeSet::new();
        self.collect_references(&mut set);
        set
    }

    fn collect_references(&self, set: &mut AttributeSet) {
        match self {
            Expr::Attribute(attr) => {
                set.insert(attr.clone());
            }
            other => other
                .children()
                .into_iter()
                .for_each(|c| c.collect_references(set)),
        }
    }

    pub fn resolved(&self) -> bool {
        !self.exists(|e| matches!(e, Expr::UnresolvedAttribute(_)))
    }

    pub fn contains_aggregate(&self) -> bool {
        self.exists(|e| matches!(e, Expr::AggregateFunction { .. }))
    }

    pub fn data_type(&self) -> QueryResult<DataType> {
        match self {
            Expr::Attribute(attr) => Ok(attr.data_type()),
            Expr::UnresolvedAttribute(parts) => Err(QueryError::analysis(format!(
                "invalid call to data_type on unresolved attribute '{}",
                parts.join(".")
            ))),
            Expr::Literal(v) => Ok(v.data_type()),
            Expr::Alias { child, .. } => child.data_type(),
            Expr::Binary { left, op, right } => {
                let (l, r) = (left.data_type()?, right.data_type()?);
                if op.is_comparison() || op.is_logical() {
                    return Ok(DataType::Boolean);
                }
                match l.common_type(&r) {
                    Some(t) if t.is_numeric() || t == DataType::Null => Ok(t),
                    _ => Err(QueryError::analysis(format!(
                        "cannot apply {} to {} and {} in {}",
                        op, l, r, self
                    ))),
                }
            }
            Expr::Not(_) | Expr::IsNull(_) | Expr::IsNotNull(_) => Ok(DataType::Boolean),
            Expr::AggregateFunction { func, arg, .. } => match func {
                AggregateFunc::Count => Ok(DataType::Int64),
                AggregateFunc::Avg => Ok(DataType::Float64),
                AggregateFunc::Sum => match arg.data_type()? {
                    DataType::Int32 => Ok(DataType::Int64),
                    t => Ok(t),
                },
                AggregateFunc::Min | AggregateFunc::Max => arg.data_type(),
            },
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            Expr::Attribute(attr) => attr.nullable(),
            Expr::UnresolvedAttribute(_) => true,
            Expr::Literal(v) => v.is_null(),
            Expr::IsNull(_) | Expr::IsNotNull(_) => false,
            Expr::AggregateFunction {
                func: AggregateFunc::Count,
                ..
            } => false,
            Expr::AggregateFunction { .. } => true,
            other => other.children().into_iter().any(Expr::nullable),
        }
    }

    /// Output name of a named expression.
    pub fn name(&self) -> Option<&str> {
        match self {
            Expr::Attribute(attr) => Some(attr.name()),
            Expr::Alias { name, .. } => Some(name),
            Expr::UnresolvedAttribute(parts) => parts.last().map(String::as_str),
            _ => None,
        }
    }

    /// The attribute a resolved named expression produces, `None` for anything else.
    pub fn to_attribute(&self) -> Option<AttributeReference> {
        match self {
            Expr::Attribute(attr) => Some(attr.clone()),
            Expr::Alias {
                child,
                name,
                expr_id,
            } => {
                let data_type = child.data_type().ok()?;
                Some(AttributeReference::with_id(
                    name.clone(),
                    data_type,
                    child.nullable(),
                    *expr_id,
                ))
            }
            _ => None,
        }
    }
}

/// Splits `a AND (b AND c)` into `[a, b, c]`.
pub fn split_conjunctive_predicates(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Binary {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut result = split_conjunctive_predicates(left);
            result.extend(split_conjunctive_predicates(right));
            result
        }
        other => vec![other.clone()],
    }
}

/// Folds predicates back with `AND`, `None` when there is nothing to apply.
pub fn conjunction<I: IntoIterator<Item = Expr>>(predicates: I) -> Option<Expr> {
    predicates.into_iter().reduce(Expr::and)
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Attribute(attr) => write!(f, "{}", attr),
            Expr::UnresolvedAttribute(parts) => write!(f, "'{}", parts.join(".")),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Alias {
                child,
                name,
                expr_id,
            } => write!(f, "{} AS {}#{}", child, name, expr_id),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Not(e) => write!(f, "NOT {}", e),
            Expr::IsNull(e) => write!(f, "isnull({})", e),
            Expr::IsNotNull(e) => write!(f, "isnotnull({})", e),
            Expr::AggregateFunction {
                func,
                arg,
                distinct,
            } => {
                if *distinct {
                    write!(f, "{}(DISTINCT {})", func, arg)
                } else {
                    write!(f, "{}({})", func, arg)
                }
            }
        }
    }
}

/// Comma separated rendering of an expression list.
pub fn format_exprs(exprs: &[Expr]) -> String {
    exprs.iter().join(",")
}
