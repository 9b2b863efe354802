use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SessionStats {
    signals_received: AtomicU64,
    malformed_signals: AtomicU64,
    protocol_violations: AtomicU64,
    candidates_sent: AtomicU64,
    candidates_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatsSnapshot {
    pub signals_received: u64,
    pub malformed_signals: u64,
    pub protocol_violations: u64,
    pub candidates_sent: u64,
    pub candidates_dropped: u64,
}

impl SessionStats {
    pub(crate) fn signal_received(&self) {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed_signal(&self) {
        self.malformed_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn candidate_sent(&self) {
        self.candidates_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn candidate_dropped(&self) {
        self.candidates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            signals_received: self.signals_received.load(Ordering::Relaxed),
            malformed_signals: self.malformed_signals.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            candidates_sent: self.candidates_sent.load(Ordering::Relaxed),
            candidates_dropped: self.candidates_dropped.load(Ordering::Relaxed),
        }
    }
}
