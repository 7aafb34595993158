//! Payout eligibility: the checklist a support agent runs before
//! approving a payout request.
//!
//! `evaluate` is total and pure: every rule is checked and reported,
//! in a fixed order, whatever the outcome of the others. A failing
//! request is not an error; it is a verdict with `eligible = false`.
//!
//! RULE ORDER (part of the output contract, never reordered):
//!   1. Account active
//!   2. Minimum trading days
//!   3. Minimum profit days
//!   4. 30% consistency
//!   5. Minimum balance
//!   6. Minimum request size
//!   7. Maximum cap
//!   8. Balance after payout (safety net / trailing floor)

use crate::{
    account::{AccountProfile, AccountSize},
    config::PayoutPolicy,
    types::Money,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PaStatus {
    Active,
    AccountBlown,
    FailedRebill,
    UserCancelled,
}

impl PaStatus {
    pub fn label(self) -> &'static str {
        match self {
            PaStatus::Active        => "Active",
            PaStatus::AccountBlown  => "Account Blown",
            PaStatus::FailedRebill  => "Failed Rebill",
            PaStatus::UserCancelled => "User Cancelled",
        }
    }
}

/// One payout request, already sanitized: money fields finite,
/// counts non-negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInput {
    pub pa_status: PaStatus,
    pub account: AccountSize,
    /// 1-based ordinal of this request for the account.
    pub payout_number: u32,
    /// Live-program accounts are exempt from the safety net and the 30% rule.
    pub is_live_program: bool,
    pub current_balance: Money,
    pub highest_single_day_profit_since_reference: Money,
    pub trading_days_since_reference: u32,
    pub profitable_days_over_50_since_reference: u32,
    pub requested_payout_amount: Money,
    /// Balance right after the last approved payout. Defaults to the
    /// account's starting balance.
    #[serde(default)]
    pub reference_balance: Option<Money>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    AccountActive,
    TradingDays,
    ProfitDays,
    Consistency,
    MinimumBalance,
    MinimumRequest,
    PayoutCap,
    BalanceAfterPayout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleCheck {
    pub rule: RuleId,
    pub pass: bool,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PayoutRange {
    pub min: Money,
    pub max: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Computed {
    pub safety_net_required: bool,
    pub safety_net_amount: Money,
    pub min_balance_to_request: Money,
    pub min_payout: Money,
    pub max_payout_cap: Option<Money>,
    pub allowed_payout_range: Option<PayoutRange>,
    pub total_profit: Money,
    pub consistency_rule_applies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub account: AccountSize,
    pub eligible: bool,
    pub reasons: Vec<RuleCheck>,
    pub advice: Vec<String>,
    pub computed: Computed,
}

impl Verdict {
    pub fn failed_rules(&self) -> impl Iterator<Item = &RuleCheck> {
        self.reasons.iter().filter(|r| !r.pass)
    }

    pub fn check(&self, rule: RuleId) -> Option<&RuleCheck> {
        self.reasons.iter().find(|r| r.rule == rule)
    }

    /// Decision block as shown to the agent.
    pub fn summary_lines(&self) -> Vec<String> {
        if self.eligible {
            return vec!["Should user get a payout? → YES".to_string()];
        }
        let mut lines = vec!["Should user get a payout? → NO".to_string()];
        lines.extend(self.failed_rules().map(|r| {
            format!("• {}", r.detail.as_deref().unwrap_or(&r.label))
        }));
        lines
    }
}

/// Evaluate against the published policy.
pub fn evaluate(profile: &AccountProfile, input: &EvaluationInput) -> Verdict {
    evaluate_with_policy(&PayoutPolicy::default(), profile, input)
}

pub fn evaluate_with_policy(
    policy: &PayoutPolicy,
    profile: &AccountProfile,
    input: &EvaluationInput,
) -> Verdict {
    // ── Derived quantities ─────────────────────────
    let payout_number = input
        .payout_number
        .clamp(1, policy.max_payout_number.max(1));
    let min_payout = policy.min_payout;
    let safety_net_required =
        !input.is_live_program && payout_number <= policy.safety_net_last_payout;
    let safety_net_amount = profile.safety_net_amount();
    let min_balance_to_request = if safety_net_required {
        profile.min_required_balance_first_three
    } else {
        profile.starting_balance + policy.trailing_buffer
    };
    let consistency_applies =
        !input.is_live_program && payout_number <= policy.consistency_last_payout;
    let baseline = input.reference_balance.unwrap_or(profile.starting_balance);
    let total_profit = (input.current_balance - baseline).max(0.0);
    let max_payout_cap = (payout_number <= policy.cap_last_payout)
        .then_some(profile.max_payout_cap_first_five);

    let balance = input.current_balance;
    let requested = input.requested_payout_amount;
    let highest_day = input.highest_single_day_profit_since_reference;

    let mut reasons = Vec::with_capacity(8);
    let mut advice = Vec::new();

    // 1. Account active
    let active = input.pa_status == PaStatus::Active;
    reasons.push(RuleCheck {
        rule: RuleId::AccountActive,
        pass: active,
        label: "Active PA(s) present".to_string(),
        detail: (!active)
            .then(|| format!("No active PAs (Reason: {}).", input.pa_status.label())),
    });

    // 2. Minimum trading days
    let days = input.trading_days_since_reference;
    let days_ok = days >= policy.min_trading_days;
    reasons.push(RuleCheck {
        rule: RuleId::TradingDays,
        pass: days_ok,
        label: format!("At least {} trading days", policy.min_trading_days),
        detail: (!days_ok).then(|| {
            format!(
                "Must have at least {} trading days (has {days}).",
                policy.min_trading_days
            )
        }),
    });
    if !days_ok {
        let short = policy.min_trading_days - days;
        advice.push(format!(
            "Trade {short} more day(s) before requesting; {} trading days are required since the last approved payout.",
            policy.min_trading_days
        ));
    }

    // 3. Minimum profit days
    let profit_days = input.profitable_days_over_50_since_reference;
    let profit_days_ok = profit_days >= policy.min_profit_days;
    reasons.push(RuleCheck {
        rule: RuleId::ProfitDays,
        pass: profit_days_ok,
        label: format!(
            "At least {} profit days over ${:.0}",
            policy.min_profit_days, policy.profit_day_threshold
        ),
        detail: (!profit_days_ok).then(|| {
            format!(
                "Needs {} profit days over ${:.0} (has {profit_days}).",
                policy.min_profit_days, policy.profit_day_threshold
            )
        }),
    });
    if !profit_days_ok {
        let short = policy.min_profit_days - profit_days;
        advice.push(format!(
            "Record {short} more day(s) with at least ${:.0} profit; {} are required.",
            policy.profit_day_threshold, policy.min_profit_days
        ));
    }

    // 4. 30% consistency
    let percent = policy.consistency_ratio * 100.0;
    let consistency_ok = if !consistency_applies {
        true
    } else if total_profit <= 0.0 {
        false
    } else {
        highest_day / total_profit <= policy.consistency_ratio
    };
    let needed_profit = (highest_day / policy.consistency_ratio).ceil();
    reasons.push(RuleCheck {
        rule: RuleId::Consistency,
        pass: consistency_ok,
        label: if consistency_applies {
            format!("{percent:.0}% consistency: largest day within {percent:.0}% of profit")
        } else {
            format!("{percent:.0}% rule not required")
        },
        detail: if !consistency_applies {
            Some(format!(
                "Not applied from payout {} onward or on the live program.",
                policy.consistency_last_payout + 1
            ))
        } else if consistency_ok {
            None
        } else if total_profit <= 0.0 {
            Some("No profit since the reference point, so the consistency rule cannot be met.".to_string())
        } else {
            Some(format!(
                "{percent:.0}% consistency: need at least ${needed_profit:.2} total profit given a ${highest_day:.2} max day (have ${total_profit:.2})."
            ))
        },
    });
    if !consistency_ok {
        if total_profit <= 0.0 && needed_profit <= 0.0 {
            advice.push(format!(
                "No profit since the reference point. Build some profit first; the {percent:.0}% rule needs a positive total before requesting."
            ));
        } else if total_profit <= 0.0 {
            advice.push(format!(
                "No profit since the reference point. With a ${highest_day:.2} best day, total profit must reach ${needed_profit:.0} before requesting."
            ));
        } else {
            advice.push(format!(
                "Total profit must reach ${needed_profit:.0} given a ${highest_day:.2} best day (currently ${total_profit:.2}); keep trading until the best day is within {percent:.0}%."
            ));
        }
    }

    // 5. Minimum balance
    let balance_ok = balance >= min_balance_to_request;
    reasons.push(RuleCheck {
        rule: RuleId::MinimumBalance,
        pass: balance_ok,
        label: "Meets required minimum balance".to_string(),
        detail: (!balance_ok).then(|| {
            format!(
                "Current balance ${balance:.2} is below the required ${min_balance_to_request:.2} for {}.",
                profile.size_id.label()
            )
        }),
    });
    if !balance_ok {
        advice.push(format!(
            "Balance must reach ${min_balance_to_request:.2} before requesting (short by ${:.2}).",
            min_balance_to_request - balance
        ));
    }

    // 6. Minimum request size
    let request_ok = requested >= min_payout;
    reasons.push(RuleCheck {
        rule: RuleId::MinimumRequest,
        pass: request_ok,
        label: format!("Minimum request ${min_payout:.0}"),
        detail: (!request_ok)
            .then(|| format!("Minimum payout request is ${min_payout:.0}.")),
    });

    // 7. Maximum cap
    let cap_ok = max_payout_cap.map_or(true, |cap| requested <= cap);
    reasons.push(RuleCheck {
        rule: RuleId::PayoutCap,
        pass: cap_ok,
        label: "Within payout cap".to_string(),
        detail: match max_payout_cap {
            None => Some(format!(
                "No cap from payout {} onward.",
                policy.cap_last_payout + 1
            )),
            Some(cap) if !cap_ok => Some(format!(
                "Max payout for {} (first {}) is ${cap:.0}.",
                profile.size_id.label(),
                policy.cap_last_payout
            )),
            Some(_) => None,
        },
    });
    if let Some(cap) = max_payout_cap.filter(|_| !cap_ok) {
        advice.push(format!(
            "Lower the request to ${cap:.2} or less; the cap applies through payout {}.",
            policy.cap_last_payout
        ));
    }

    // 8. Balance after payout
    let (after_ok, after_label, after_detail) = if safety_net_required {
        let overage = (requested - min_payout).max(0.0);
        let required = profile.min_required_balance_first_three + overage;
        let ok = balance >= required;
        let detail = (!ok).then(|| {
            if overage > 0.0 {
                format!(
                    "For the first {} payouts, requesting ${requested:.2} requires balance ≥ ${required:.2} (safety net + amount over ${min_payout:.0}).",
                    policy.safety_net_last_payout
                )
            } else {
                format!(
                    "For the first {} payouts, a ${min_payout:.0} request still requires balance ≥ ${required:.2}.",
                    policy.safety_net_last_payout
                )
            }
        });
        (ok, "Safety net preserved after payout", detail)
    } else {
        let remaining = balance - requested;
        let ok = remaining >= min_balance_to_request;
        let detail = (!ok).then(|| {
            format!(
                "Balance after payout ${remaining:.2} would fall below the trailing floor ${min_balance_to_request:.2}."
            )
        });
        (ok, "Trailing floor preserved after payout", detail)
    };
    reasons.push(RuleCheck {
        rule: RuleId::BalanceAfterPayout,
        pass: after_ok,
        label: after_label.to_string(),
        detail: after_detail,
    });

    let eligible = reasons.iter().all(|r| r.pass);

    let allowed_payout_range = if eligible {
        let headroom = balance - min_balance_to_request;
        let by_balance = if safety_net_required {
            (min_payout + headroom.max(0.0)).max(min_payout)
        } else {
            headroom
        };
        let mut max = by_balance.floor();
        if let Some(cap) = max_payout_cap {
            max = max.min(cap);
        }
        (max >= min_payout).then_some(PayoutRange { min: min_payout, max })
    } else {
        None
    };

    Verdict {
        account: profile.size_id,
        eligible,
        reasons,
        advice,
        computed: Computed {
            safety_net_required,
            safety_net_amount,
            min_balance_to_request,
            min_payout,
            max_payout_cap,
            allowed_payout_range,
            total_profit,
            consistency_rule_applies: consistency_applies,
        },
    }
}

/// One-line reminder of which rules apply at this payout number.
/// The live program never carries the safety net.
pub fn payout_stage_note(policy: &PayoutPolicy, payout_number: u32, is_live_program: bool) -> String {
    let n = payout_number.max(1);
    if is_live_program && n <= policy.cap_last_payout {
        format!(
            "Live program payout {n}: no safety net or {:.0}% rule, but caps still apply by account size through payout {}.",
            policy.consistency_ratio * 100.0,
            policy.cap_last_payout
        )
    } else if n <= policy.safety_net_last_payout {
        format!(
            "First {} payouts: safety net applies (drawdown + ${:.0}). The ${:.0} minimum can encroach the safety net by up to ${:.0}.",
            policy.safety_net_last_payout,
            policy.trailing_buffer,
            policy.min_payout,
            policy.min_payout
        )
    } else if n <= policy.cap_last_payout {
        format!(
            "Payouts {}–{}: no safety net requirement, but caps still apply by account size.",
            policy.safety_net_last_payout + 1,
            policy.cap_last_payout
        )
    } else {
        format!(
            "Payout {} and beyond: no cap; 100% of profits may be withdrawn as long as the minimum balance remains after payout.",
            policy.cap_last_payout + 1
        )
    }
}
