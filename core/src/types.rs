//! Shared primitive types used across the payout desk.

/// A dollar amount. Inputs are validated finite before reaching the rules.
pub type Money = f64;

/// Wall-clock time in milliseconds since the Unix epoch.
pub type Millis = u64;

/// A browser session identifier, as sent by the tracking script.
pub type SessionId = String;
