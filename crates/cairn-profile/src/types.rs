use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono_tz::Tz;

/// Cadence and content settings for the profile synthesizer.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub refresh_interval_hours: i64,
    pub disclaimer: String,
    pub profile_budget_chars: usize,
    pub system_id: String,
    pub model_identifier: String,
    pub timezone: Tz,
    pub max_response_tokens: u32,
}

/// `interval_hours == 0` disables auto-posting entirely.
#[derive(Debug, Clone)]
pub struct AutoPostConfig {
    pub interval_hours: i64,
    pub visibility: String,
    pub bot_tag: String,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub interval_minutes: i64,
    pub log_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub trigger: String,
    pub thread_window_minutes: i64,
}

/// Process-wide counters, incremented from wherever the event occurs and
/// read back by the metrics timer. `Ordering::Relaxed` throughout: these
/// are independent counters with no cross-field invariant to preserve.
#[derive(Debug, Default)]
pub struct Metrics {
    pub mentions_handled: AtomicU64,
    pub facts_collected: AtomicU64,
    pub llm_calls: AtomicU64,
    pub errors: AtomicU64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub mentions_handled: u64,
    pub facts_collected: u64,
    pub llm_calls: u64,
    pub errors: u64,
}

impl Metrics {
    pub fn record_mention(&self) {
        self.mentions_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fact(&self) {
        self.facts_collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_call(&self) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            mentions_handled: self.mentions_handled.load(Ordering::Relaxed),
            facts_collected: self.facts_collected.load(Ordering::Relaxed),
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
