//! Credit limit checks
//!
//! Pure comparison of a user's headroom against the price of a tool. Nothing
//! here touches storage; the ledger performs the authoritative conditional
//! update when credits are actually consumed.

use nerbixa_shared::{PriceTable, Tool, UserBalance};

use crate::error::{BillingError, BillingResult};

/// Whether `balance` can pay `price`.
///
/// A zero price always passes, even with an empty or overdrawn balance.
/// Otherwise the user must have `used < available` and at least `price`
/// credits of headroom.
pub fn has_sufficient_credits(balance: &UserBalance, price: u32) -> bool {
    if price == 0 {
        return true;
    }
    let used = i64::from(balance.used_generations);
    let available = i64::from(balance.available_generations);
    used < available && available - used >= i64::from(price)
}

/// Limit check for a possibly anonymous caller. No balance means no
/// authenticated user, which never passes.
pub fn check_api_limit(balance: Option<&UserBalance>, price: u32) -> bool {
    match balance {
        Some(balance) => has_sufficient_credits(balance, price),
        None => false,
    }
}

/// Resolve the price of `tool`, rejecting tools without a configured price
pub fn price_for(prices: &PriceTable, tool: Tool) -> BillingResult<u32> {
    prices
        .price(tool)
        .ok_or_else(|| BillingError::UnpricedTool(tool.to_string()))
}
