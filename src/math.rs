//! Checked integer math for share and payout accounting.
//!
//! All helpers floor and map overflow onto `MarketError::Overflow`. Products
//! go through a 256-bit intermediate so `amount * supply / balance` is exact
//! for any pair of `u128` operands whose quotient fits.

use crate::types::{Amount, MarketError, MarketResult, BPS_DENOMINATOR};

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two `u128`s as `(hi, lo)`.
fn full_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_MASK);
    let (b1, b0) = (b >> 64, b & LOW_MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);
    let lo = (p00 & LOW_MASK) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// `floor(a * b / d)`.
pub fn mul_div(a: u128, b: u128, d: u128) -> MarketResult<u128> {
    if d == 0 {
        return Err(MarketError::Overflow);
    }
    let (hi, lo) = full_mul(a, b);
    if hi == 0 {
        return Ok(lo / d);
    }
    // Quotient must fit in 128 bits.
    if hi >= d {
        return Err(MarketError::Overflow);
    }

    let mut rem = hi;
    let mut quot: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quot <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1;
        }
    }
    Ok(quot)
}

/// `floor(amount * bps / 10_000)`.
pub fn apply_bps(amount: Amount, bps: u16) -> MarketResult<Amount> {
    mul_div(amount, u128::from(bps), BPS_DENOMINATOR)
}

pub fn add(a: u128, b: u128) -> MarketResult<u128> {
    a.checked_add(b).ok_or(MarketError::Overflow)
}

pub fn sub(a: u128, b: u128) -> MarketResult<u128> {
    a.checked_sub(b).ok_or(MarketError::Overflow)
}
