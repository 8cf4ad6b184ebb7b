//! DThrottle Gossip - moving hit reports between instances
//!
//! The engine only needs a narrow transport: publish a keyed integer map
//! under a named subject, and deliver such maps arriving from peers. This
//! crate provides that surface over UDP:
//!
//! - [`codec`] - the length-checked binary wire format for reports
//! - [`UdpGossip`] - one socket that publishes to a configured peer list and
//!   feeds inbound datagrams to a delivery channel
//!
//! Every datagram carries the publishing instance's id so a peer list that
//! loops back to this process can be recognized: deliveries are flagged
//! [`Delivery::local`] and the consumer drops them, because an instance must
//! not debit itself with its own report.

pub mod codec;
mod error;
pub mod udp;

pub use codec::{Delivery, HEARTBEAT_SUBJECT};
pub use error::{GossipError, Result};
pub use udp::{GossipConfig, UdpGossip};
