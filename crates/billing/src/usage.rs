//! Usage metering service
//!
//! Gates metered generation calls on the caller's credit balance. A call
//! reserves its price up front with a conditional update and hands the
//! reservation back if the generation fails, so only successful generations
//! consume credits.

use std::sync::Arc;

use nerbixa_shared::{PriceTable, Tool, UserBalance};

use crate::error::{BillingError, BillingResult};
use crate::ledger::CreditLedger;
use crate::limit::{check_api_limit, price_for};

/// Credits held for one in-flight generation
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a reservation must be released if the generation fails"]
pub struct CreditReservation {
    pub clerk_id: String,
    pub tool: Tool,
    pub price: u32,
    /// Balance right after the reservation; `None` for free tools
    pub balance: Option<UserBalance>,
}

/// Usage metering service
#[derive(Clone)]
pub struct UsageMeter {
    ledger: Arc<dyn CreditLedger>,
    prices: PriceTable,
}

impl UsageMeter {
    pub fn new(ledger: Arc<dyn CreditLedger>, prices: PriceTable) -> Self {
        Self { ledger, prices }
    }

    /// Check and take the price of `tool` from the caller's balance.
    ///
    /// The advisory limit check runs first; the ledger's conditional update
    /// then increments usage. A free tool never touches the ledger.
    pub async fn reserve(&self, clerk_id: &str, tool: Tool) -> BillingResult<CreditReservation> {
        let price = price_for(&self.prices, tool).inspect_err(|_| {
            tracing::error!(tool = %tool, "No price configured for tool");
        })?;

        if price == 0 {
            return Ok(CreditReservation {
                clerk_id: clerk_id.to_string(),
                tool,
                price,
                balance: None,
            });
        }

        let current = self.ledger.balance(clerk_id).await?;
        let insufficient = |balance: Option<UserBalance>| BillingError::InsufficientCredits {
            tool: tool.to_string(),
            price,
            remaining: balance.map(|b| b.remaining()).unwrap_or(0),
        };

        if !check_api_limit(current.as_ref(), price) {
            tracing::info!(clerk_id = %clerk_id, tool = %tool, price = price, "Generation limit reached");
            return Err(insufficient(current));
        }

        // The advisory check can race; the conditional update is authoritative
        match self.ledger.reserve(clerk_id, price).await? {
            Some(balance) => {
                tracing::debug!(
                    clerk_id = %clerk_id,
                    tool = %tool,
                    price = price,
                    used = balance.used_generations,
                    available = balance.available_generations,
                    "Credits reserved"
                );
                Ok(CreditReservation {
                    clerk_id: clerk_id.to_string(),
                    tool,
                    price,
                    balance: Some(balance),
                })
            }
            None => {
                tracing::info!(clerk_id = %clerk_id, tool = %tool, "Lost reservation race");
                Err(insufficient(self.ledger.balance(clerk_id).await?))
            }
        }
    }

    /// Return the credits of a failed generation
    pub async fn release(&self, reservation: CreditReservation) -> BillingResult<()> {
        if reservation.price == 0 {
            return Ok(());
        }
        self.ledger
            .release(&reservation.clerk_id, reservation.price)
            .await?;
        tracing::debug!(
            clerk_id = %reservation.clerk_id,
            tool = %reservation.tool,
            price = reservation.price,
            "Credits released"
        );
        Ok(())
    }
}
