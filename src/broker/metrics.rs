use std::sync::atomic::{AtomicI64, Ordering};

/// The fixed set of counters the broker maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    Topics,
    StaticTopics,
    ActiveTopics,
    Subscribers,
    ActiveSubscribers,
    MessageReceived,
    MessageSent,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Topics,
        Metric::StaticTopics,
        Metric::ActiveTopics,
        Metric::Subscribers,
        Metric::ActiveSubscribers,
        Metric::MessageReceived,
        Metric::MessageSent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Topics => "topics",
            Metric::StaticTopics => "static_topics",
            Metric::ActiveTopics => "active_topics",
            Metric::Subscribers => "subscribers",
            Metric::ActiveSubscribers => "active_subscribers",
            Metric::MessageReceived => "message_received",
            Metric::MessageSent => "message_sent",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Atomic 64-bit counters, one per [`Metric`]. All counters start at zero;
/// reads never block writers.
#[derive(Debug, Default)]
pub struct Counters {
    vals: [AtomicI64; 7],
}

impl Counters {
    pub fn inc(&self, k: Metric) {
        self.vals[k.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, k: Metric, val: i64) {
        self.vals[k.index()].fetch_add(val, Ordering::Relaxed);
    }

    pub fn dec(&self, k: Metric) {
        self.vals[k.index()].fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self, k: Metric) -> i64 {
        self.vals[k.index()].load(Ordering::Relaxed)
    }
}
