//! DThrottle Engine - Collective leaky bucket throttling
//!
//! The engine answers one question: "may this request proceed?". Clients are
//! tracked by an opaque string tag; each tag owns a token bucket that drains
//! one token per admitted request and refills continuously at a configured
//! rate. Rules are keyed by tag *prefix* and resolved by longest-prefix match,
//! so a single rule can cover an entire address block or tenant namespace.
//!
//! The "collective" part: instances serving the same resource periodically
//! exchange reports of locally admitted hits. [`Throttle::make_report`]
//! produces the outbound map and [`Throttle::receive_report`] debits local
//! buckets by what the peers admitted, so the aggregate rate across the fleet
//! converges on the configured bound rather than `rate * instances`.
//!
//! # Design
//!
//! - **Time as an argument**: every mutating call takes `t` (seconds as
//!   `f64`). Production wires in [`Clock`]; tests drive `t` directly.
//! - **No interior locking**: the engine is plain mutable state. Callers
//!   serialize access (the server crate owns one engine per task).
//! - **Lazy records**: buckets are created on first touch and reclaimed by
//!   [`Throttle::make_report`] once full, bounding memory under tag churn.
//!
//! # Example
//!
//! ```
//! use dthrottle_engine::{Parameters, Throttle};
//!
//! let mut throttle = Throttle::new(1, 1.0);
//! throttle.add_rule("10.", Parameters::new(100, 50.0));
//!
//! assert!(throttle.check_request("172.16.0.9", 1_700_000_000.0));
//! assert!(!throttle.check_request("172.16.0.9", 1_700_000_000.0));
//! ```

mod clock;
mod record;
mod throttle;
mod trie;

pub use clock::Clock;
pub use record::UsageRecord;
pub use throttle::{Parameters, Report, Throttle};
pub use trie::Trie;
