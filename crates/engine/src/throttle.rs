//! The throttle engine
//!
//! Owns the rule trie and the per-tag usage records, and implements the four
//! operations the rest of the system is built from: admission checks, rule
//! installation, report construction, and report ingestion.

use std::collections::HashMap;
use std::fmt;

use crate::record::UsageRecord;
use crate::trie::Trie;

/// A report of locally admitted hits since the previous report: tag to count.
pub type Report = HashMap<String, u64>;

/// Throttling parameters resolved for a tag.
///
/// `burst` is the bucket capacity in tokens, `rate` the refill rate in tokens
/// per second. A whitelisted rule admits unconditionally; its `burst` and
/// `rate` are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub burst: u32,
    pub rate: f64,
    pub whitelisted: bool,
}

impl Parameters {
    /// Throttling parameters for a normal (non-whitelisted) rule.
    pub fn new(burst: u32, rate: f64) -> Self {
        Self {
            burst,
            rate,
            whitelisted: false,
        }
    }

    /// Parameters that admit every request.
    pub fn whitelisted() -> Self {
        Self {
            burst: 0,
            rate: 0.0,
            whitelisted: true,
        }
    }
}

/// The collective leaky-bucket engine.
///
/// Tags are matched against installed rule prefixes; the most specific rule
/// applies. For example:
///
/// ```
/// use dthrottle_engine::{Parameters, Throttle};
///
/// let mut throttle = Throttle::new(10, 1.0);
/// throttle.add_rule("1-", Parameters::new(10, 5.0));
/// throttle.add_rule("1-206-", Parameters::new(10, 50.0));
///
/// // tag "1-206-456-1234" is throttled at 50/s
/// // tag "1-415-789-0123" is throttled at 5/s
/// // tag "44-20-7946-0958" falls back to the default 1/s
/// # let _ = throttle.check_request("1-206-456-1234", 1.0);
/// ```
pub struct Throttle {
    records: HashMap<String, UsageRecord>,
    rules: Trie<Parameters>,
}

impl Throttle {
    /// Create an engine whose default rule (empty prefix) carries the given
    /// burst and rate.
    pub fn new(default_burst: u32, default_rate: f64) -> Self {
        Self {
            records: HashMap::new(),
            rules: Trie::new(Parameters::new(default_burst, default_rate)),
        }
    }

    /// Install a rule for tags matching `prefix`. Replaces any existing rule
    /// at the same prefix.
    pub fn add_rule(&mut self, prefix: &str, params: Parameters) {
        self.rules.insert(prefix, params);
    }

    /// Never throttle tags matching `prefix`.
    pub fn whitelist(&mut self, prefix: &str) {
        self.rules.insert(prefix, Parameters::whitelisted());
    }

    /// Register a request for `tag` at time `t`. Returns false iff the
    /// request should be throttled.
    ///
    /// Whitelisted tags are admitted without touching any record: they cost
    /// nothing and never appear in reports.
    pub fn check_request(&mut self, tag: &str, t: f64) -> bool {
        let params = *self.rules.lookup(tag);

        if params.whitelisted {
            tracing::debug!(tag, "permitted: whitelisted");
            return true;
        }

        let record = self
            .records
            .entry(tag.to_owned())
            .or_insert_with(|| UsageRecord::new(params.burst));

        let permitted = record.check_request(params.burst, params.rate, t);
        tracing::debug!(tag, tokens = record.tokens(), permitted, "admission");
        permitted
    }

    /// Apply a report received from a peer instance at time `t`.
    ///
    /// Every reported hit is debited from the local bucket with no refill and
    /// no clamp, so externally observed traffic subtracts faithfully no
    /// matter how much time has passed. Records are created as needed, seeded
    /// from the tag's matched rule.
    pub fn receive_report(&mut self, report: &Report, t: f64) {
        for (tag, &count) in report {
            let params = *self.rules.lookup(tag);
            let record = self
                .records
                .entry(tag.clone())
                .or_insert_with(|| UsageRecord::new(params.burst));
            record.record_external(count);
        }
        tracing::debug!(entries = report.len(), t, "applied peer report");
    }

    /// Produce the outbound report at time `t`: every tag with hits admitted
    /// since the previous report, with its count.
    ///
    /// This pass doubles as the reclaim sweep: each record is refilled to `t`
    /// and dropped if its bucket is full, since recreating a full bucket later
    /// reproduces the same state. Every live tag is visited exactly once.
    pub fn make_report(&mut self, t: f64) -> Report {
        let mut report = Report::new();
        let rules = &self.rules;

        self.records.retain(|tag, record| {
            let hits = record.take_unreported();
            if hits > 0 {
                report.insert(tag.clone(), hits);
            }

            let params = rules.lookup(tag);
            record.refill(params.burst, params.rate, t) < f64::from(params.burst)
        });

        report
    }

    /// Number of live usage records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Write a human-readable listing of all records, for debugging.
    pub fn dump_state(&self, out: &mut impl fmt::Write) -> fmt::Result {
        for (tag, record) in &self.records {
            writeln!(
                out,
                "{}\t\t{} tokens, last updated: {}, {} unreported hits.",
                tag,
                record.tokens(),
                record.last_update(),
                record.unreported_hits()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "throttle_test.rs"]
mod tests;
