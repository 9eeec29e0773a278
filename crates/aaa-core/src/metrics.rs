//! Lifecycle counters
//!
//! [`AaaMetrics`] counts authentication outcomes and session lifecycle
//! events. Counters are plain atomics so the hot path never locks;
//! [`AaaMetrics::render_prometheus`] produces the text exposition format for
//! whatever HTTP layer scrapes it.

use crate::profile_cache::ProfileCacheStats;
use std::fmt::{Display, Write};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AaaMetrics {
    accept: AtomicU64,
    reject: AtomicU64,
    drop: AtomicU64,
    online: AtomicU64,
    offline: AtomicU64,
    acct_errors: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub accept: u64,
    pub reject: u64,
    pub drop: u64,
    pub online: u64,
    pub offline: u64,
    pub acct_errors: u64,
}

impl AaaMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_accept(&self) {
        self.accept.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject(&self) {
        self.reject.fetch_add(1, Ordering::Relaxed);
    }

    /// Request discarded without a response
    pub fn inc_drop(&self) {
        self.drop.fetch_add(1, Ordering::Relaxed);
    }

    /// Accounting Start processed
    pub fn inc_online(&self) {
        self.online.fetch_add(1, Ordering::Relaxed);
    }

    /// Accounting Stop processed
    pub fn inc_offline(&self) {
        self.offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_acct_errors(&self) {
        self.acct_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accept: self.accept.load(Ordering::Relaxed),
            reject: self.reject.load(Ordering::Relaxed),
            drop: self.drop.load(Ordering::Relaxed),
            online: self.online.load(Ordering::Relaxed),
            offline: self.offline.load(Ordering::Relaxed),
            acct_errors: self.acct_errors.load(Ordering::Relaxed),
        }
    }

    /// Render counters in Prometheus text format.
    pub fn render_prometheus(&self) -> String {
        self.render_with_cache(None)
    }

    /// Render counters plus profile cache gauges.
    pub fn render_with_cache(&self, cache: Option<&ProfileCacheStats>) -> String {
        let s = self.snapshot();
        let mut out = PrometheusText::default();

        out.counter("aaa_auth_accept_total", s.accept, "Access-Accept responses");
        out.counter("aaa_auth_reject_total", s.reject, "Access-Reject responses");
        out.counter("aaa_auth_drop_total", s.drop, "Requests dropped without response");
        out.counter("aaa_acct_online_total", s.online, "Accounting Start events processed");
        out.counter("aaa_acct_offline_total", s.offline, "Accounting Stop events processed");
        out.counter(
            "aaa_acct_errors_total",
            s.acct_errors,
            "Accounting requests that failed",
        );

        if let Some(stats) = cache {
            out.gauge("aaa_profile_cache_entries", stats.entries, "Profiles held in cache");
            out.counter("aaa_profile_cache_hits_total", stats.hits, "Profile cache hits");
            out.counter("aaa_profile_cache_misses_total", stats.misses, "Profile cache misses");
        }

        out.content
    }
}

#[derive(Default)]
struct PrometheusText {
    content: String,
}

impl PrometheusText {
    fn counter(&mut self, name: &str, value: impl Display, help: &str) {
        self.metric(name, "counter", value, help);
    }

    fn gauge(&mut self, name: &str, value: impl Display, help: &str) {
        self.metric(name, "gauge", value, help);
    }

    fn metric(&mut self, name: &str, kind: &str, value: impl Display, help: &str) {
        // Writing into a String cannot fail
        let _ = writeln!(self.content, "# HELP {} {}", name, help);
        let _ = writeln!(self.content, "# TYPE {} {}", name, kind);
        let _ = writeln!(self.content, "{} {}", name, value);
    }
}
