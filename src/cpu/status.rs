//! The status (flag) register and jump conditions.

use serde::{Serialize, Deserialize};

/// The four CPU flags.
///
/// A plain value type: flag-preserving instructions can be checked by
/// comparing a before/after copy for equality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Status {
    pub zero: bool,
    pub sign: bool,
    pub carry: bool,
    pub overflow: bool,
}

impl Status {
    /// Flags for a result with explicit carry and overflow.
    #[inline]
    pub fn from_result(result: u16, carry: bool, overflow: bool) -> Self {
        Self {
            zero: result == 0,
            sign: result & 0x8000 != 0,
            carry,
            overflow,
        }
    }

    /// Flags for a logic result: carry and overflow cleared.
    #[inline]
    pub fn logic(result: u16) -> Self {
        Self::from_result(result, false, false)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            flag(self.zero, 'Z'),
            flag(self.sign, 'S'),
            flag(self.carry, 'C'),
            flag(self.overflow, 'O'),
        )
    }
}

/// Branch condition, evaluated purely from the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// zero
    Zero,
    /// !zero
    NotZero,
    /// signed >: sign == overflow && !zero
    Greater,
    /// signed >=: sign == overflow
    GreaterEqual,
    /// signed <: sign != overflow
    Less,
    /// signed <=: sign != overflow || zero
    LessEqual,
    /// unsigned >: !carry && !zero
    Above,
    /// unsigned >=: !carry
    AboveEqual,
    /// unsigned <: carry
    Below,
    /// unsigned <=: carry || zero
    BelowEqual,
    Sign,
    NotSign,
    Overflow,
    NotOverflow,
}

impl Condition {
    /// Whether a jump on this condition is taken.
    pub fn holds(self, s: Status) -> bool {
        match self {
            Condition::Zero => s.zero,
            Condition::NotZero => !s.zero,
            Condition::Greater => s.sign == s.overflow && !s.zero,
            Condition::GreaterEqual => s.sign == s.overflow,
            Condition::Less => s.sign != s.overflow,
            Condition::LessEqual => s.sign != s.overflow || s.zero,
            Condition::Above => !s.carry && !s.zero,
            Condition::AboveEqual => !s.carry,
            Condition::Below => s.carry,
            Condition::BelowEqual => s.carry || s.zero,
            Condition::Sign => s.sign,
            Condition::NotSign => !s.sign,
            Condition::Overflow => s.overflow,
            Condition::NotOverflow => !s.overflow,
        }
    }
}
