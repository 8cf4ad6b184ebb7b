//! The engine actor
//!
//! All engine state lives in a single task; everyone else talks to it through
//! a [`ThrottleHandle`]. This buys the invariants the engine relies on
//! without a lock in sight: admission decisions, report construction and
//! report ingestion each run to completion before the next command is taken,
//! so `unreported_hits` is observed and zeroed atomically relative to
//! admissions, and `make_report` is serialized with `check_request`.
//!
//! Timestamps are taken inside the actor, in command order, so the engine
//! never sees time run backwards.

use tokio::sync::{mpsc, oneshot};

use dthrottle_engine::{Clock, Report, Throttle};

use crate::error::{Result, ServerError};

/// Bound on queued commands; backpressure lands on connection tasks.
const COMMAND_QUEUE: usize = 1024;

enum Command {
    Check {
        tag: String,
        reply: oneshot::Sender<bool>,
    },
    Ingest {
        report: Report,
    },
    MakeReport {
        reply: oneshot::Sender<Report>,
    },
    DumpState {
        reply: oneshot::Sender<String>,
    },
}

/// Cloneable handle to the engine actor.
#[derive(Clone)]
pub struct ThrottleHandle {
    tx: mpsc::Sender<Command>,
}

impl ThrottleHandle {
    /// Ask whether a request for `tag` may proceed.
    pub async fn check(&self, tag: String) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Check { tag, reply })
            .await
            .map_err(|_| ServerError::EngineGone)?;
        rx.await.map_err(|_| ServerError::EngineGone)
    }

    /// Apply a peer report. Fire-and-forget; a stopped engine is logged by
    /// the caller's next round trip.
    pub async fn ingest(&self, report: Report) {
        let _ = self.tx.send(Command::Ingest { report }).await;
    }

    /// Collect the outbound report of hits since the last call.
    pub async fn make_report(&self) -> Result<Report> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::MakeReport { reply })
            .await
            .map_err(|_| ServerError::EngineGone)?;
        rx.await.map_err(|_| ServerError::EngineGone)
    }

    /// Dump the engine's record table, for debugging.
    pub async fn dump_state(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::DumpState { reply })
            .await
            .map_err(|_| ServerError::EngineGone)?;
        rx.await.map_err(|_| ServerError::EngineGone)
    }
}

/// Spawn the engine actor and return its handle.
///
/// The task runs until every handle is dropped.
pub fn spawn_engine(mut throttle: Throttle, clock: Clock) -> ThrottleHandle {
    let (tx, mut rx) = mpsc::channel(COMMAND_QUEUE);

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Check { tag, reply } => {
                    let permitted = throttle.check_request(&tag, clock.now());
                    let _ = reply.send(permitted);
                }
                Command::Ingest { report } => {
                    throttle.receive_report(&report, clock.now());
                }
                Command::MakeReport { reply } => {
                    let _ = reply.send(throttle.make_report(clock.now()));
                }
                Command::DumpState { reply } => {
                    let mut out = String::new();
                    let _ = throttle.dump_state(&mut out);
                    let _ = reply.send(out);
                }
            }
        }
        tracing::debug!("engine actor stopped");
    });

    ThrottleHandle { tx }
}
