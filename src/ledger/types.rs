//! Ledger entry types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which sub-ledger an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerType {
    Escrow,
    Subscription,
    Distribution,
    Fee,
    Tax,
    Tranche,
}

impl LedgerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerType::Escrow => "escrow",
            LedgerType::Subscription => "subscription",
            LedgerType::Distribution => "distribution",
            LedgerType::Fee => "fee",
            LedgerType::Tax => "tax",
            LedgerType::Tranche => "tranche",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "escrow" => Some(LedgerType::Escrow),
            "subscription" => Some(LedgerType::Subscription),
            "distribution" => Some(LedgerType::Distribution),
            "fee" => Some(LedgerType::Fee),
            "tax" => Some(LedgerType::Tax),
            "tranche" => Some(LedgerType::Tranche),
            _ => None,
        }
    }
}

impl fmt::Display for LedgerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry direction. Balance = Σcredits − Σdebits per account ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Direction::Credit),
            "debit" => Some(Direction::Debit),
            _ => None,
        }
    }

    /// Signed contribution of an amount in this direction
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entry about to be posted
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub ledger_type: LedgerType,
    /// Logical account, e.g. "escrow:offering:off-1" or "investor:inv-9"
    pub account_ref: String,
    pub direction: Direction,
    /// Nonnegative exact decimal; the direction carries the sign
    pub amount: Decimal,
    pub currency: String,
    /// Domain event that produced the entry
    pub entity_type: String,
    pub entity_id: String,
    /// Correlates escrow entries to an external payment receipt
    pub external_ref: Option<String>,
    pub idempotency_key: Option<String>,
    pub metadata: serde_json::Value,
}

/// A posted, immutable entry
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: i64,
    pub ledger_type: LedgerType,
    pub account_ref: String,
    pub direction: Direction,
    pub amount: Decimal,
    pub currency: String,
    pub entity_type: String,
    pub entity_id: String,
    pub external_ref: Option<String>,
    pub idempotency_key: Option<String>,
    pub metadata: serde_json::Value,
    pub posted_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed amount (credits positive, debits negative)
    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount)
    }
}
