use crate::{
    account::{AccountProfile, AccountSize, AccountTable, TRAILING_BUFFER},
    eligibility::{evaluate_with_policy, EvaluationInput, Verdict},
    error::DeskResult,
    types::Money,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Thresholds for the payout rules. `Default` is the published policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutPolicy {
    /// Smallest payout that may be requested, all tiers, all payouts.
    pub min_payout: Money,
    pub min_trading_days: u32,
    pub min_profit_days: u32,
    /// A day counts as a profit day at or above this gain.
    pub profit_day_threshold: Money,
    /// Largest single day as a share of total profit.
    pub consistency_ratio: f64,
    /// Last payout number covered by the safety net.
    pub safety_net_last_payout: u32,
    /// Last payout number covered by the consistency rule.
    pub consistency_last_payout: u32,
    /// Last payout number covered by the per-tier cap.
    pub cap_last_payout: u32,
    /// Trailing floor above starting balance once the safety net lifts.
    pub trailing_buffer: Money,
    pub max_payout_number: u32,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            min_payout:              500.0,
            min_trading_days:        8,
            min_profit_days:         5,
            profit_day_threshold:    50.0,
            consistency_ratio:       0.30,
            safety_net_last_payout:  3,
            consistency_last_payout: 5,
            cap_last_payout:         5,
            trailing_buffer:         TRAILING_BUFFER,
            max_payout_number:       99,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AccountTiersFile {
    accounts: Vec<AccountProfile>,
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub accounts: AccountTable,
    pub policy: PayoutPolicy,
}

impl PolicyConfig {
    /// Load from the data/ directory.
    /// In tests, use PolicyConfig::standard().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let tiers_path = format!("{data_dir}/accounts/account_tiers.json");
        let tiers_content = std::fs::read_to_string(&tiers_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {tiers_path}: {e}"))?;
        let tiers: AccountTiersFile = serde_json::from_str(&tiers_content)?;

        let policy_path = format!("{data_dir}/policy/payout_policy.json");
        let policy_content = std::fs::read_to_string(&policy_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {policy_path}: {e}"))?;
        let policy: PayoutPolicy = serde_json::from_str(&policy_content)?;

        let mut seen = HashSet::new();
        for profile in &tiers.accounts {
            profile.validate().map_err(|e| anyhow::anyhow!("{tiers_path}: {e}"))?;
            if !seen.insert(profile.size_id) {
                anyhow::bail!("{tiers_path}: duplicate tier {}", profile.size_id.id());
            }
        }
        let missing: Vec<&str> = AccountSize::ALL
            .into_iter()
            .filter(|size| !seen.contains(size))
            .map(AccountSize::id)
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("{tiers_path}: missing tiers {}", missing.join(", "));
        }

        if policy.min_payout <= 0.0 {
            anyhow::bail!("{policy_path}: min_payout must be positive");
        }
        if !(policy.consistency_ratio > 0.0 && policy.consistency_ratio <= 1.0) {
            anyhow::bail!("{policy_path}: consistency_ratio must be in (0, 1]");
        }
        if policy.max_payout_number == 0 {
            anyhow::bail!("{policy_path}: max_payout_number must be at least 1");
        }

        log::info!(
            "config: loaded {} account tiers from {data_dir}",
            tiers.accounts.len()
        );

        Ok(Self {
            accounts: AccountTable::from_profiles(tiers.accounts),
            policy,
        })
    }

    /// Built-in tiers and policy.
    pub fn standard() -> Self {
        Self {
            accounts: AccountTable::standard(),
            policy: PayoutPolicy::default(),
        }
    }

    /// Look up the input's tier and run the rules under this policy.
    pub fn evaluate(&self, input: &EvaluationInput) -> DeskResult<Verdict> {
        let profile = self.accounts.get(input.account.id())?;
        Ok(evaluate_with_policy(&self.policy, profile, input))
    }
}
