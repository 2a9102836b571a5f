//! Lamport/SOL conversions.

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Deserializer};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Converts lamports to SOL, rounded half-to-even to `digits` decimal places.
pub fn lamports_to_sol(lamports: u64, digits: u32) -> Decimal {
    (Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL)).round_dp(digits)
}

/// Exact lamports to SOL conversion.
pub fn lamports_as_sol(lamports: u64) -> Decimal {
    Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL)
}

/// Converts SOL to lamports, dropping any fraction below one lamport.
///
/// Returns `None` for negative or out-of-range amounts.
pub fn sol_to_lamports(sol: Decimal) -> Option<u64> {
    if sol.is_sign_negative() {
        return None;
    }
    sol.checked_mul(Decimal::from(LAMPORTS_PER_SOL))?
        .trunc()
        .to_u64()
}

/// Serde adapter for lamport fields exposed in SOL.
pub(crate) fn de_sol<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(lamports_as_sol)
}

pub(crate) fn de_opt_sol<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(lamports_as_sol))
}
