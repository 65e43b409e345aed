//! Common types used across Nerbixa

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::SharedError;

// =============================================================================
// Constants
// =============================================================================

/// Balance granted to a freshly provisioned account
pub const DEFAULT_AVAILABLE_GENERATIONS: i32 = 20;

// =============================================================================
// Tools
// =============================================================================

/// A metered generation tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Conversation,
    Image,
    StyleTransfer,
    Music,
    Speech,
    Video,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Conversation,
        Tool::Image,
        Tool::StyleTransfer,
        Tool::Music,
        Tool::Speech,
        Tool::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Image => "image",
            Self::StyleTransfer => "style_transfer",
            Self::Music => "music",
            Self::Speech => "speech",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "conversation" => Ok(Self::Conversation),
            "image" => Ok(Self::Image),
            "style_transfer" => Ok(Self::StyleTransfer),
            "music" => Ok(Self::Music),
            "speech" => Ok(Self::Speech),
            "video" => Ok(Self::Video),
            other => Err(SharedError::UnknownTool(other.to_string())),
        }
    }
}

// =============================================================================
// Price Table
// =============================================================================

/// Credit price per tool.
///
/// A lookup returns `None` for a tool without a configured price. Callers must
/// reject such requests rather than treat the price as zero; `Some(0)` is the
/// only way to mark a tool as free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTable {
    prices: HashMap<Tool, u32>,
}

impl PriceTable {
    /// Empty table: every tool is unpriced
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    pub fn price(&self, tool: Tool) -> Option<u32> {
        self.prices.get(&tool).copied()
    }

    pub fn set(&mut self, tool: Tool, price: u32) {
        self.prices.insert(tool, price);
    }

    pub fn remove(&mut self, tool: Tool) {
        self.prices.remove(&tool);
    }

    /// Apply overrides of the form `video=30,conversation=0`
    pub fn with_overrides(mut self, overrides: &str) -> Result<Self, SharedError> {
        for entry in overrides.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (tool, price) = entry
                .split_once('=')
                .ok_or_else(|| SharedError::InvalidPriceEntry(entry.to_string()))?;
            let tool: Tool = tool.parse()?;
            let price: u32 = price
                .trim()
                .parse()
                .map_err(|_| SharedError::InvalidPriceEntry(entry.to_string()))?;
            self.set(tool, price);
        }
        Ok(self)
    }
}

/// Video has no default price and stays refused until `TOOL_PRICES` sets one
impl Default for PriceTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.set(Tool::Conversation, 1);
        table.set(Tool::Image, 14);
        table.set(Tool::StyleTransfer, 16);
        table.set(Tool::Music, 11);
        table.set(Tool::Speech, 13);
        table
    }
}

// =============================================================================
// Balances and Accounts
// =============================================================================

/// Credit counters of a single user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserBalance {
    pub used_generations: i32,
    pub available_generations: i32,
}

impl UserBalance {
    pub fn new(used_generations: i32, available_generations: i32) -> Self {
        Self {
            used_generations,
            available_generations,
        }
    }

    /// Credits still spendable, never negative
    pub fn remaining(&self) -> i32 {
        (self.available_generations - self.used_generations).max(0)
    }
}

/// Persisted user account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAccount {
    pub id: Uuid,
    pub clerk_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo: Option<String>,
    pub used_generations: i32,
    pub available_generations: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UserAccount {
    pub fn balance(&self) -> UserBalance {
        UserBalance::new(self.used_generations, self.available_generations)
    }
}

/// Profile fields supplied when an account is provisioned
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo: Option<String>,
}

// =============================================================================
// Payment Transactions
// =============================================================================

/// Append-only record of a processed payment
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub tracking_id: String,
    pub processor_uid: String,
    pub user_id: String,
    pub status: String,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub description: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: Option<String>,
    pub payment_method_type: Option<String>,
    pub message: Option<String>,
    pub paid_at: Option<String>,
    pub receipt_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields of a transaction about to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentTransaction {
    pub tracking_id: String,
    pub processor_uid: String,
    pub user_id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub kind: Option<String>,
    pub payment_method_type: Option<String>,
    pub message: Option<String>,
    pub paid_at: Option<String>,
    pub receipt_url: Option<String>,
}
