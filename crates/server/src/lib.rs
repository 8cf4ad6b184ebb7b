//! DThrottle Server - query dispatch and gossip glue
//!
//! Everything between the sockets and the engine:
//!
//! - [`actor`] - the task that owns the [`Throttle`](dthrottle_engine::Throttle)
//!   and serializes every touch of its state
//! - [`framing`] - newline framing over partial reads
//! - [`listener`] - TCP + Unix-domain listeners and per-connection dispatch
//! - [`heartbeat`] - timer-driven report publishing and inbound application
//! - [`switches`] - the `never_throttle` / `radio_silence` operator switches
//!
//! # Architecture
//!
//! ```text
//! client ──lines──► connection task ──Check──► engine actor (owns Throttle)
//!                        │                        ▲    ▲
//!                        ◄──── OK\n / NO\n ───────┘    │
//!                                                      │
//! interval timer ──MakeReport──► heartbeat ──publish──► UdpGossip ──► peers
//! peers ──deliveries──────────► heartbeat ──Ingest────► engine actor
//! ```
//!
//! There is exactly one engine actor per process. Connection tasks await each
//! reply before consuming the next line, so replies stay in query order per
//! connection; across connections nothing is promised.

pub mod actor;
mod error;
pub mod framing;
pub mod heartbeat;
pub mod listener;
pub mod switches;

pub use actor::{ThrottleHandle, spawn_engine};
pub use error::{Result, ServerError};
pub use framing::LineFramer;
pub use heartbeat::run_heartbeat;
pub use listener::{QueryServer, ServerConfig};
pub use switches::Switches;
