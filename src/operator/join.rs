use std::fmt::{Display, Formatter};

use strum_macros::Display as StrumDisplay;

use crate::expr::{format_exprs, Expr};

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    LeftSemi,
}

/// Join of two inputs, also used by nested loop joins which evaluate `condition` per row pair.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Join {
    join_type: JoinType,
    condition: Option<Expr>,
}

impl Join {
    pub fn new(join_type: JoinType, condition: Option<Expr>) -> Self {
        Self {
            join_type,
            condition,
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn condition(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }
}

impl Display for Join {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.condition {
            Some(c) => write!(f, "{}, {}", self.join_type, c),
            None => write!(f, "{}, None", self.join_type),
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, StrumDisplay)]
pub enum BuildSide {
    BuildLeft,
    BuildRight,
}

/// Join whose condition contains equalities between the two sides.
///
/// `left_keys[i] = right_keys[i]` for every `i`, `residual` holds what remains of the condition.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct EquiJoin {
    join_type: JoinType,
    left_keys: Vec<Expr>,
    right_keys: Vec<Expr>,
    residual: Option<Expr>,
    build_side: BuildSide,
}

impl EquiJoin {
    pub fn new(
        join_type: JoinType,
        left_keys: Vec<Expr>,
        right_keys: Vec<Expr>,
        residual: Option<Expr>,
    ) -> Self {
        let build_side = match join_type {
            JoinType::RightOuter => BuildSide::BuildLeft,
            _ => BuildSide::BuildRight,
        };
        Self {
            join_type,
            left_keys,
            right_keys,
            residual,
            build_side,
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn left_keys(&self) -> &[Expr] {
        &self.left_keys
    }

    pub fn right_keys(&self) -> &[Expr] {
        &self.right_keys
    }

    pub fn residual(&self) -> Option<&Expr> {
        self.residual.as_ref()
    }

    pub fn build_side(&self) -> BuildSide {
        self.build_side
    }
}

impl Display for EquiJoin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}], [{}], {}, {}",
            format_exprs(&self.left_keys),
            format_exprs(&self.right_keys),
            self.join_type,
            self.build_side
        )?;
        if let Some(residual) = &self.residual {
            write!(f, ", {}", residual)?;
        }
        Ok(())
    }
}
