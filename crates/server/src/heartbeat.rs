//! Heartbeat loop: publish our hits, apply theirs
//!
//! A repeating timer drives [`make_report`](crate::actor::ThrottleHandle::make_report);
//! the result goes out to the peer group unless `radio_silence` is set. The
//! same loop applies inbound deliveries, skipping ones flagged as our own
//! (an instance must not debit itself from its own published report) and
//! everything while `radio_silence` is set.
//!
//! The report is made on every tick regardless of switches, so unreported
//! counters never accumulate across a silence window. If a tick's work
//! overruns the interval, the next tick fires immediately after completion;
//! there is no backpressure on ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use dthrottle_gossip::{Delivery, HEARTBEAT_SUBJECT, UdpGossip};

use crate::actor::ThrottleHandle;
use crate::error::Result;
use crate::switches::Switches;

/// Run the heartbeat until cancelled.
///
/// `interval` arrives already clamped by the configuration layer.
pub async fn run_heartbeat(
    engine: ThrottleHandle,
    gossip: Arc<UdpGossip>,
    switches: Arc<Switches>,
    interval: Duration,
    mut deliveries: mpsc::Receiver<Delivery>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    // the interval's first tick completes immediately; skip it so the first
    // report covers a full period
    ticker.tick().await;

    let mut deliveries_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                let report = engine.make_report().await?;

                if switches.radio_silence() {
                    continue;
                }
                if let Err(e) = gossip.publish(HEARTBEAT_SUBJECT, &report).await {
                    tracing::warn!(error = %e, "failed to publish report");
                }
            }

            delivery = deliveries.recv(), if deliveries_open => match delivery {
                Some(delivery) => {
                    if delivery.local || switches.radio_silence() {
                        continue;
                    }
                    if delivery.subject != HEARTBEAT_SUBJECT {
                        tracing::debug!(subject = %delivery.subject, "ignoring foreign subject");
                        continue;
                    }
                    engine.ingest(delivery.report).await;
                }
                None => {
                    tracing::warn!("gossip delivery channel closed");
                    deliveries_open = false;
                }
            },
        }
    }

    tracing::info!("heartbeat stopped");
    Ok(())
}

#[cfg(test)]
#[path = "heartbeat_test.rs"]
mod tests;
