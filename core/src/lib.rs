//! payout-core: account tiers, the payout-eligibility rules, and the
//! small pieces of visitor analytics and trade-import plumbing that sit
//! around them.

pub mod account;
pub mod analytics;
pub mod clock;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod import;
pub mod input;
pub mod types;
pub mod visitor;
