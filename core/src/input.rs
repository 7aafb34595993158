//! Request boundary: turns the loose form payload into an
//! `EvaluationInput` the rules can trust.
//!
//! Defaults:
//!   - money fields missing or non-finite → 0
//!   - negative counts → 0
//!   - payout number missing → 1
//!   - live program missing → false
//!   - reference balance stays optional
//!
//! Form inputs arrive as strings as often as numbers; both are accepted,
//! and a blank string counts as missing.

use crate::{
    account::{AccountProfile, AccountTable},
    eligibility::{EvaluationInput, PaStatus},
    error::{DeskError, DeskResult},
    types::Money,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    #[serde(default)]
    pub account_size: Option<String>,
    /// Yes/no toggle from the form. Ignored when `pa_status` is given.
    #[serde(default)]
    pub has_active_pa: Option<bool>,
    #[serde(default)]
    pub pa_status: Option<PaStatus>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub payout_number: Option<i64>,
    #[serde(default)]
    pub is_live_program: Option<bool>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub current_balance: Option<f64>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub highest_single_day_profit: Option<f64>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub trading_days: Option<i64>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub profit_days_over_50: Option<i64>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub requested_payout: Option<f64>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub reference_balance: Option<f64>,
}

impl EvaluationRequest {
    /// Validate against `table` and return the tier with the sanitized input.
    pub fn into_input(self, table: &AccountTable) -> DeskResult<(AccountProfile, EvaluationInput)> {
        let size_id = self
            .account_size
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(DeskError::MissingField { field: "accountSize" })?;
        let profile = table.get(size_id)?.clone();

        let pa_status = match (self.pa_status, self.has_active_pa) {
            (Some(status), _) => status,
            (None, Some(true)) => PaStatus::Active,
            (None, Some(false)) => PaStatus::UserCancelled,
            (None, None) => return Err(DeskError::MissingField { field: "paStatus" }),
        };

        let input = EvaluationInput {
            pa_status,
            account: profile.size_id,
            payout_number: count_or(self.payout_number, 1).max(1),
            is_live_program: self.is_live_program.unwrap_or(false),
            current_balance: money(self.current_balance),
            highest_single_day_profit_since_reference: money(self.highest_single_day_profit),
            trading_days_since_reference: count_or(self.trading_days, 0),
            profitable_days_over_50_since_reference: count_or(self.profit_days_over_50, 0),
            requested_payout_amount: money(self.requested_payout),
            reference_balance: self.reference_balance.filter(|v| v.is_finite()),
        };

        log::debug!(
            "input: {} payout #{} balance=${:.2} requested=${:.2}",
            profile.size_id.id(),
            input.payout_number,
            input.current_balance,
            input.requested_payout_amount
        );

        Ok((profile, input))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText<T> {
    Number(T),
    Text(String),
}

fn number_or_text<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
{
    match Option::<NumberOrText<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(v)) => Ok(Some(v)),
        Some(NumberOrText::Text(raw)) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(None);
            }
            raw.parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("expected a number, got \"{raw}\"")))
        }
    }
}

fn money(raw: Option<f64>) -> Money {
    raw.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn count_or(raw: Option<i64>, default: u32) -> u32 {
    match raw {
        Some(v) => v.clamp(0, u32::MAX as i64) as u32,
        None => default,
    }
}
