//! Core types for the engine.
//!
//! Entities reference each other by integer id only; trees are assembled
//! explicitly by the store when a caller needs them.

mod capsule;
mod coach;
mod content_type;
mod plan;
mod progress;
mod user;
mod vector;

pub use capsule::*;
pub use coach::*;
pub use content_type::*;
pub use plan::*;
pub use progress::*;
pub use user::*;
pub use vector::*;

use chrono::{DateTime, TimeZone, Utc};

/// Row identifier allocated by the store.
pub type Id = i64;

/// Milliseconds since the epoch, the on-disk time format.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Inverse of [`to_millis`]; out-of-range values clamp to the epoch.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_roundtrip() {
        let now = from_millis(to_millis(Utc::now()));
        assert_eq!(from_millis(to_millis(now)), now);
    }
}
