//! Randomised planning: interval picks for the random-mode driver and target
//! selection for file sharing.

use std::net::Ipv4Addr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Pause between two sessions of a day, in minutes.
pub const SESSION_BREAK_MINUTES: Span = Span(30, 120);
/// Sleep after the last session of a day, in hours.
pub const DAILY_SLEEP_HOURS: Span = Span(5, 8);
/// Backoff between send attempts, in seconds.
pub const SEND_BACKOFF_SECS: Span = Span(2, 5);
/// Pause between two share targets, in seconds.
pub const TARGET_GAP_SECS: Span = Span(1, 3);
/// Pause between two pinged addresses, in seconds.
pub const PING_GAP_SECS: Span = Span(5, 15);
/// Pause between two generated documents, in seconds.
pub const DOCUMENT_GAP_SECS: Span = Span(10, 30);

/// Inclusive `[min, max]` interval, configured as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span(pub u64, pub u64);

impl Span {
    /// Uniform pick in `[min, max]`. A reversed span is read as `[max, min]`.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let (lo, hi) = if self.0 <= self.1 {
            (self.0, self.1)
        } else {
            (self.1, self.0)
        };
        rng.gen_range(lo..=hi)
    }
}

/// Limits applied by the file-share activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharePolicy {
    /// Addresses probed from an enabled range before sharing.
    pub probe_sample: usize,
    /// Candidate targets tried per round.
    pub max_targets: usize,
    /// Stop the round after this many successful sends.
    pub enough: usize,
    /// Configured targets tried when the round had no success.
    pub fallback_targets: usize,
}

impl Default for SharePolicy {
    fn default() -> Self {
        Self {
            probe_sample: 10,
            max_targets: 5,
            enough: 2,
            fallback_targets: 2,
        }
    }
}

/// Random subset of at most `limit` candidates, without repetition.
pub fn sample_targets<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &[Ipv4Addr],
    limit: usize,
) -> Vec<Ipv4Addr> {
    candidates
        .choose_multiple(rng, limit.min(candidates.len()))
        .copied()
        .collect()
}

/// First `limit` configured targets that were not already tried this round.
pub fn fallback_targets(configured: &[Ipv4Addr], tried: &[Ipv4Addr], limit: usize) -> Vec<Ipv4Addr> {
    configured
        .iter()
        .filter(|ip| !tried.contains(ip))
        .take(limit)
        .copied()
        .collect()
}
