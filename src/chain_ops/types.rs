//! Chain-op queue types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Queue row id - ULID-based unique identifier
///
/// Monotonic and sortable, generated without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainOpId(ulid::Ulid);

impl ChainOpId {
    /// Generate a new unique ChainOpId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for ChainOpId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainOpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainOpId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Queue row lifecycle
///
/// pending → submitted → confirmed, pending → dead_letter once the retry
/// budget is spent. Confirmed and dead_letter are terminal; dead letters
/// only move again through an explicit operator re-enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOpStatus {
    Pending,
    Submitted,
    Confirmed,
    DeadLetter,
}

impl ChainOpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainOpStatus::Pending => "pending",
            ChainOpStatus::Submitted => "submitted",
            ChainOpStatus::Confirmed => "confirmed",
            ChainOpStatus::DeadLetter => "dead_letter",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChainOpStatus::Pending),
            "submitted" => Some(ChainOpStatus::Submitted),
            "confirmed" => Some(ChainOpStatus::Confirmed),
            "dead_letter" => Some(ChainOpStatus::DeadLetter),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainOpStatus::Confirmed | ChainOpStatus::DeadLetter)
    }
}

impl fmt::Display for ChainOpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One payout leg of a batch distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutItem {
    pub wallet: String,
    pub amount: Decimal,
}

/// Closed set of chain operations
///
/// The tag set is closed so the worker's dispatch is exhaustive at compile
/// time; payload shapes are per-tag instead of free-form maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpPayload {
    DeployToken {
        name: String,
        symbol: String,
        decimals: u8,
    },
    Mint {
        token: String,
        to_wallet: String,
        amount: Decimal,
        /// A lockup enqueues a follow-on lock_tokens op after confirmation
        lockup_days: Option<u32>,
    },
    LockTokens {
        token: String,
        wallet: String,
        amount: Decimal,
        until: DateTime<Utc>,
    },
    Burn {
        token: String,
        wallet: String,
        amount: Decimal,
    },
    Freeze {
        token: String,
        wallet: String,
    },
    BatchPayout {
        token: String,
        payouts: Vec<PayoutItem>,
    },
    WhitelistInvestor {
        registry: String,
        wallet: String,
    },
    DeclareDistribution {
        token: String,
        distribution_id: String,
        total_amount: Decimal,
        record_date: DateTime<Utc>,
    },
    IssueKycClaim {
        registry: String,
        wallet: String,
        claim_topic: u32,
    },
}

impl OpPayload {
    /// Stable tag for indexing and logs
    pub fn op_type(&self) -> &'static str {
        match self {
            OpPayload::DeployToken { .. } => "deploy_token",
            OpPayload::Mint { .. } => "mint",
            OpPayload::LockTokens { .. } => "lock_tokens",
            OpPayload::Burn { .. } => "burn",
            OpPayload::Freeze { .. } => "freeze",
            OpPayload::BatchPayout { .. } => "batch_payout",
            OpPayload::WhitelistInvestor { .. } => "whitelist_investor",
            OpPayload::DeclareDistribution { .. } => "declare_distribution",
            OpPayload::IssueKycClaim { .. } => "issue_kyc_claim",
        }
    }
}

/// Enqueue request from a command handler
#[derive(Debug, Clone)]
pub struct NewChainOp {
    pub entity_type: String,
    pub entity_id: String,
    pub payload: OpPayload,
}

/// Queue row
#[derive(Debug, Clone)]
pub struct ChainOp {
    pub id: ChainOpId,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: OpPayload,
    pub status: ChainOpStatus,
    pub tx_hash: Option<String>,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for ChainOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChainOp[{}] {} {}:{} status={} retries={}",
            self.id,
            self.payload.op_type(),
            self.entity_type,
            self.entity_id,
            self.status,
            self.retry_count
        )
    }
}
