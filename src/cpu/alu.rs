//! 16-bit two's-complement arithmetic with flag computation.
//!
//! Every function is pure: it takes operand words and returns the result
//! together with the flags it produces. Instructions decide whether to
//! write the result back.

use super::status::Status;

/// Shift counts are taken modulo the word width.
pub const SHIFT_MASK: u16 = 0x0F;

/// a + b
pub fn add(a: u16, b: u16) -> (u16, Status) {
    let (result, carry) = a.overflowing_add(b);
    let (_, overflow) = (a as i16).overflowing_add(b as i16);
    (result, Status::from_result(result, carry, overflow))
}

/// a - b. Carry is the unsigned borrow.
pub fn sub(a: u16, b: u16) -> (u16, Status) {
    let (result, carry) = a.overflowing_sub(b);
    let (_, overflow) = (a as i16).overflowing_sub(b as i16);
    (result, Status::from_result(result, carry, overflow))
}

/// Low word of a * b.
///
/// Carry is set when the unsigned product needs more than 16 bits,
/// overflow when the signed product does not fit in an `i16`.
pub fn mul(a: u16, b: u16) -> (u16, Status) {
    let wide = a as u32 * b as u32;
    let result = wide as u16;
    let signed = (a as i16 as i32) * (b as i16 as i32);
    let overflow = signed < i16::MIN as i32 || signed > i16::MAX as i32;
    (result, Status::from_result(result, wide > 0xFFFF, overflow))
}

/// Unsigned quotient, `None` on division by zero.
pub fn div(a: u16, b: u16) -> Option<(u16, Status)> {
    let result = a.checked_div(b)?;
    Some((result, Status::logic(result)))
}

/// Unsigned remainder, `None` on division by zero.
pub fn rem(a: u16, b: u16) -> Option<(u16, Status)> {
    let result = a.checked_rem(b)?;
    Some((result, Status::logic(result)))
}

pub fn and(a: u16, b: u16) -> (u16, Status) {
    let result = a & b;
    (result, Status::logic(result))
}

pub fn or(a: u16, b: u16) -> (u16, Status) {
    let result = a | b;
    (result, Status::logic(result))
}

pub fn xor(a: u16, b: u16) -> (u16, Status) {
    let result = a ^ b;
    (result, Status::logic(result))
}

pub fn not(a: u16) -> (u16, Status) {
    let result = !a;
    (result, Status::logic(result))
}

/// 0 - a
pub fn neg(a: u16) -> (u16, Status) {
    sub(0, a)
}

/// Logical shift left. Carry holds the last bit shifted out, overflow is
/// set when the sign bit changed.
pub fn shl(a: u16, count: u16) -> (u16, Status) {
    let count = count & SHIFT_MASK;
    if count == 0 {
        return (a, Status::logic(a));
    }
    let result = a << count;
    let carry = (a >> (16 - count)) & 1 != 0;
    let overflow = (a ^ result) & 0x8000 != 0;
    (result, Status::from_result(result, carry, overflow))
}

/// Logical shift right. Overflow holds the original sign bit.
pub fn shr(a: u16, count: u16) -> (u16, Status) {
    let count = count & SHIFT_MASK;
    if count == 0 {
        return (a, Status::logic(a));
    }
    let result = a >> count;
    let carry = (a >> (count - 1)) & 1 != 0;
    let overflow = a & 0x8000 != 0;
    (result, Status::from_result(result, carry, overflow))
}

/// Arithmetic shift right. Never overflows.
pub fn sar(a: u16, count: u16) -> (u16, Status) {
    let count = count & SHIFT_MASK;
    if count == 0 {
        return (a, Status::logic(a));
    }
    let result = ((a as i16) >> count) as u16;
    let carry = (a >> (count - 1)) & 1 != 0;
    (result, Status::from_result(result, carry, false))
}
