//! Quote types for proposal generation and client acceptance
//!
//! Every quote is a numbered version tied to a lead. Each version carries an
//! opaque acceptance hash that the client uses to accept without logging in.

use crate::{LeadId, QuoteId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A versioned, priced proposal for a lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteVersion {
    pub id: QuoteId,
    pub lead_id: LeadId,

    /// 1-based version number, increasing per lead
    pub version: u32,

    pub line_items: Vec<LineItem>,

    /// Sum of all line totals, in minor currency units
    pub total_minor: i64,

    /// ISO 4217 currency code
    pub currency: String,

    pub status: QuoteStatus,

    /// Client-facing acceptance token
    pub acceptance_hash: AcceptanceHash,

    /// Acceptance is refused from this instant on
    pub hash_expires_at: DateTime<Utc>,

    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_by_email: Option<String>,
    #[serde(default)]
    pub accepted_ip: Option<String>,
    #[serde(default)]
    pub accepted_user_agent: Option<String>,
    #[serde(default)]
    pub acceptance_note: Option<String>,
    #[serde(default)]
    pub terms_accepted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuoteVersion {
    /// Build a new `sent` version with a fresh acceptance hash.
    ///
    /// Returns `None` when the line totals overflow.
    pub fn issue(
        lead_id: LeadId,
        version: u32,
        line_items: Vec<LineItem>,
        currency: impl Into<String>,
        hash_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let total_minor = LineItem::sum(&line_items)?;
        let id = QuoteId::generate();
        Some(Self {
            acceptance_hash: AcceptanceHash::generate(&id),
            id,
            lead_id,
            version,
            line_items,
            total_minor,
            currency: currency.into(),
            status: QuoteStatus::Sent,
            hash_expires_at,
            accepted_at: None,
            accepted_by_email: None,
            accepted_ip: None,
            accepted_user_agent: None,
            acceptance_note: None,
            terms_accepted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Classify whether the acceptance link may still be used at `now`.
    ///
    /// An existing acceptance wins over expiry.
    pub fn acceptance_check(&self, now: DateTime<Utc>) -> AcceptanceCheck {
        if self.accepted_at.is_some() {
            AcceptanceCheck::AlreadyAccepted
        } else if !self.status.is_open() || now >= self.hash_expires_at {
            AcceptanceCheck::Expired
        } else {
            AcceptanceCheck::Open
        }
    }

    /// Total formatted for humans, e.g. `EUR 2550.00`
    pub fn display_total(&self) -> String {
        format_minor(self.total_minor, &self.currency)
    }

    pub fn is_acceptable_at(&self, now: DateTime<Utc>) -> bool {
        self.acceptance_check(now) == AcceptanceCheck::Open
    }

    /// Status as seen at `now`: an open version whose link has lapsed reads
    /// as `expired`. Stored rows keep their last written status.
    pub fn effective_status(&self, now: DateTime<Utc>) -> QuoteStatus {
        if self.status.is_open() && self.accepted_at.is_none() && now >= self.hash_expires_at {
            QuoteStatus::Expired
        } else {
            self.status
        }
    }

    /// Copy of this version with `status` replaced by [`Self::effective_status`]
    pub fn as_seen_at(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }

    /// Retire this version in favour of a newer one.
    ///
    /// The acceptance link expires immediately so the old hash answers `Gone`.
    pub fn supersede(&mut self, now: DateTime<Utc>) {
        self.status = QuoteStatus::Superseded;
        self.hash_expires_at = self.hash_expires_at.min(now);
        self.updated_at = now;
    }
}

/// Format an amount in minor units with two decimals
pub fn format_minor(amount_minor: i64, currency: &str) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{} {}{}.{:02}", currency, sign, abs / 100, abs % 100)
}

/// Outcome of checking an acceptance link against the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceCheck {
    Open,
    AlreadyAccepted,
    Expired,
}

/// One priced line on a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    /// Price per unit in minor currency units
    pub unit_price_minor: i64,
}

impl LineItem {
    pub fn total_minor(&self) -> Option<i64> {
        self.unit_price_minor.checked_mul(i64::from(self.quantity))
    }

    /// Checked sum of all line totals
    pub fn sum(items: &[LineItem]) -> Option<i64> {
        items
            .iter()
            .try_fold(0_i64, |acc, item| acc.checked_add(item.total_minor()?))
    }
}

/// Lifecycle status of a quote version
///
/// New versions are issued as `sent`. `expired` is reported on read once the
/// link lapses (see [`QuoteVersion::effective_status`]). `draft` is accepted
/// from stored or imported rows and is treated like `sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Superseded,
    Expired,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Superseded => "superseded",
            QuoteStatus::Expired => "expired",
        }
    }

    /// Draft and sent versions can still be accepted or superseded
    pub fn is_open(&self) -> bool {
        matches!(self, QuoteStatus::Draft | QuoteStatus::Sent)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(QuoteStatus::Draft),
            "sent" => Some(QuoteStatus::Sent),
            "accepted" => Some(QuoteStatus::Accepted),
            "superseded" => Some(QuoteStatus::Superseded),
            "expired" => Some(QuoteStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque client-facing acceptance token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcceptanceHash(String);

impl AcceptanceHash {
    /// Hex-encoded BLAKE3 digest over the quote id and 32 random bytes
    pub fn generate(quote_id: &QuoteId) -> Self {
        let nonce: [u8; 32] = rand::random();
        let mut hasher = blake3::Hasher::new();
        hasher.update(quote_id.as_uuid().as_bytes());
        hasher.update(&nonce);
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Wrap a token received from a URL; no format check is applied
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AcceptanceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
