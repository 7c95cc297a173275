//! Tail sides and the two-slot container that holds per-side state.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// One tail of the distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Right tail: large readings are extreme.
    Upper,
    /// Left tail: small readings are extreme.
    Lower,
}

impl Side {
    /// Both sides, in processing order.
    pub const ALL: [Side; 2] = [Side::Upper, Side::Lower];

    /// Whether `value` lies strictly beyond `bound` in this side's direction.
    pub fn beyond(self, value: f64, bound: f64) -> bool {
        match self {
            Side::Upper => value > bound,
            Side::Lower => value < bound,
        }
    }

    /// Positive distance of `level` past `threshold` in this side's direction.
    pub fn excess(self, level: f64, threshold: f64) -> f64 {
        match self {
            Side::Upper => level - threshold,
            Side::Lower => -(level - threshold),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Upper => write!(f, "upper"),
            Side::Lower => write!(f, "lower"),
        }
    }
}

/// A value for each side, indexed by [`Side`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerSide<T> {
    pub upper: T,
    pub lower: T,
}

impl<T> PerSide<T> {
    pub fn new(upper: T, lower: T) -> Self {
        Self { upper, lower }
    }

    /// Build both slots from a per-side constructor.
    pub fn from_fn(mut f: impl FnMut(Side) -> T) -> Self {
        let upper = f(Side::Upper);
        let lower = f(Side::Lower);
        Self { upper, lower }
    }

    /// Fallible variant of [`PerSide::from_fn`]; the upper side is built first.
    pub fn try_from_fn<E>(mut f: impl FnMut(Side) -> Result<T, E>) -> Result<Self, E> {
        let upper = f(Side::Upper)?;
        let lower = f(Side::Lower)?;
        Ok(Self { upper, lower })
    }

    pub fn map<U>(self, mut f: impl FnMut(Side, T) -> U) -> PerSide<U> {
        PerSide {
            upper: f(Side::Upper, self.upper),
            lower: f(Side::Lower, self.lower),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Side, &T)> {
        [(Side::Upper, &self.upper), (Side::Lower, &self.lower)].into_iter()
    }
}

impl<T> Index<Side> for PerSide<T> {
    type Output = T;

    fn index(&self, side: Side) -> &T {
        match side {
            Side::Upper => &self.upper,
            Side::Lower => &self.lower,
        }
    }
}

impl<T> IndexMut<Side> for PerSide<T> {
    fn index_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Upper => &mut self.upper,
            Side::Lower => &mut self.lower,
        }
    }
}
