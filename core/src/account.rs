//! Account tiers: the fixed table of sizes a trader can hold.
//!
//! These are externally defined business constants. The evaluator
//! consumes a row; it never recomputes one.

use crate::{
    error::{DeskError, DeskResult},
    types::Money,
};
use serde::{Deserialize, Serialize};

/// Buffer above starting balance that both the drawdown allowance and
/// the trailing floor are measured against.
pub const TRAILING_BUFFER: Money = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountSize {
    #[serde(rename = "25k")]
    K25,
    #[serde(rename = "50k")]
    K50,
    #[serde(rename = "100k")]
    K100,
    #[serde(rename = "150k")]
    K150,
    #[serde(rename = "250k")]
    K250,
    #[serde(rename = "300k")]
    K300,
    #[serde(rename = "100kStatic")]
    K100Static,
}

impl AccountSize {
    pub const ALL: [AccountSize; 7] = [
        AccountSize::K25,
        AccountSize::K50,
        AccountSize::K100,
        AccountSize::K150,
        AccountSize::K250,
        AccountSize::K300,
        AccountSize::K100Static,
    ];

    /// Stable identifier, e.g. "100kStatic".
    pub fn id(self) -> &'static str {
        match self {
            AccountSize::K25        => "25k",
            AccountSize::K50        => "50k",
            AccountSize::K100       => "100k",
            AccountSize::K150       => "150k",
            AccountSize::K250       => "250k",
            AccountSize::K300       => "300k",
            AccountSize::K100Static => "100kStatic",
        }
    }

    /// Label shown on the form, e.g. "100K Static".
    pub fn label(self) -> &'static str {
        match self {
            AccountSize::K25        => "25K",
            AccountSize::K50        => "50K",
            AccountSize::K100       => "100K",
            AccountSize::K150       => "150K",
            AccountSize::K250       => "250K",
            AccountSize::K300       => "300K",
            AccountSize::K100Static => "100K Static",
        }
    }

    /// Accepts either the id or the label, ignoring case and spaces.
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|size| size.id().to_ascii_lowercase() == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub size_id: AccountSize,
    pub starting_balance: Money,
    pub min_required_balance_first_three: Money,
    pub max_payout_cap_first_five: Money,
}

impl AccountProfile {
    /// The published row for `size`.
    pub fn standard(size: AccountSize) -> Self {
        let (start, min_required, cap) = match size {
            AccountSize::K25        => (25_000.0, 26_600.0, 1_500.0),
            AccountSize::K50        => (50_000.0, 52_600.0, 2_000.0),
            AccountSize::K100       => (100_000.0, 103_100.0, 2_500.0),
            AccountSize::K150       => (150_000.0, 155_100.0, 2_750.0),
            AccountSize::K250       => (250_000.0, 256_600.0, 3_000.0),
            AccountSize::K300       => (300_000.0, 307_600.0, 3_500.0),
            AccountSize::K100Static => (100_000.0, 102_600.0, 1_000.0),
        };
        Self {
            size_id: size,
            starting_balance: start,
            min_required_balance_first_three: min_required,
            max_payout_cap_first_five: cap,
        }
    }

    /// Trailing drawdown implied by the minimum-balance table.
    pub fn drawdown_allowance(&self) -> Money {
        self.min_required_balance_first_three - self.starting_balance - TRAILING_BUFFER
    }

    /// Cushion enforced during the first three payouts (drawdown + $100).
    pub fn safety_net_amount(&self) -> Money {
        self.min_required_balance_first_three - self.starting_balance
    }

    /// Checks the row invariants. Returns a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_required_balance_first_three <= self.starting_balance {
            return Err(format!(
                "{}: minimum required balance ${:.2} must exceed starting balance ${:.2}",
                self.size_id.id(),
                self.min_required_balance_first_three,
                self.starting_balance
            ));
        }
        if self.drawdown_allowance() < 0.0 {
            return Err(format!(
                "{}: drawdown allowance ${:.2} is negative",
                self.size_id.id(),
                self.drawdown_allowance()
            ));
        }
        if self.max_payout_cap_first_five <= 0.0 {
            return Err(format!(
                "{}: payout cap must be positive",
                self.size_id.id()
            ));
        }
        Ok(())
    }
}

/// Lookup table of account tiers, in display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountTable {
    profiles: Vec<AccountProfile>,
}

impl AccountTable {
    pub fn standard() -> Self {
        Self {
            profiles: AccountSize::ALL
                .into_iter()
                .map(AccountProfile::standard)
                .collect(),
        }
    }

    pub fn from_profiles(profiles: Vec<AccountProfile>) -> Self {
        Self { profiles }
    }

    /// Resolve a size id or label. Unknown sizes are a caller-side error.
    pub fn get(&self, size_id: &str) -> DeskResult<&AccountProfile> {
        AccountSize::parse(size_id)
            .and_then(|size| self.profiles.iter().find(|p| p.size_id == size))
            .ok_or_else(|| DeskError::UnknownAccount {
                size_id: size_id.to_string(),
            })
    }

    pub fn profiles(&self) -> &[AccountProfile] {
        &self.profiles
    }
}
