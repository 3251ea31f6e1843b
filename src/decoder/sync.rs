//! Cross-crate TI timestamp synchronization

use super::header::TiEntry;
use super::state::UNSYNCED_TIMESTAMP;
use crate::common::DecodeError;

/// Log output produced for one out-of-tolerance crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesyncLog {
    /// Mismatch logged as a warning
    Warned,
    /// Warning cap reached, suppression notice logged instead
    CapReached,
    /// Past the cap, nothing logged
    Silent,
}

/// Result of reconciling one event's TI entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Event timestamp, -1 when crates disagree
    pub timestamp: i64,
    /// One entry per crate outside tolerance, in crate order
    pub log: Vec<DesyncLog>,
}

/// Reconciles the TI timestamps reported by all crates of one event
#[derive(Debug, Clone)]
pub struct TimestampSync {
    tolerance: u64,
    max_warnings: u32,
}

impl TimestampSync {
    pub fn new(tolerance: u64, max_warnings: u32) -> Self {
        Self {
            tolerance,
            max_warnings,
        }
    }

    /// What to log for a mismatch given the errors counted before it
    pub fn log_action(&self, error_count: u32) -> DesyncLog {
        if error_count < self.max_warnings {
            DesyncLog::Warned
        } else if error_count == self.max_warnings {
            DesyncLog::CapReached
        } else {
            DesyncLog::Silent
        }
    }

    /// Event timestamp from the crate entries, or -1 when they disagree
    ///
    /// The reference is the first crate that is not the TI master (or the
    /// first crate when all are the master). The master may deviate by one
    /// extra tick. Every crate outside tolerance increments `error_count`
    /// and is reported in `diagnostics`; warnings stop after
    /// `max_warnings` with a single suppression notice.
    pub fn resolve(
        &self,
        entries: &[TiEntry],
        master: Option<u16>,
        error_count: &mut u32,
        diagnostics: &mut Vec<DecodeError>,
    ) -> SyncOutcome {
        let Some(reference) = entries
            .iter()
            .find(|e| Some(e.crate_id) != master)
            .or_else(|| entries.first())
        else {
            return SyncOutcome {
                timestamp: UNSYNCED_TIMESTAMP,
                log: Vec::new(),
            };
        };

        let mut log = Vec::new();
        for entry in entries {
            let allowed = if Some(entry.crate_id) == master {
                self.tolerance + 1
            } else {
                self.tolerance
            };
            if entry.timestamp.abs_diff(reference.timestamp) <= allowed {
                continue;
            }
            let err = DecodeError::DesyncTimestamp {
                crate_id: entry.crate_id as i32,
                reported: entry.timestamp,
                reference: reference.timestamp,
                reference_crate: reference.crate_id as i32,
            };
            let action = self.log_action(*error_count);
            match action {
                DesyncLog::Warned => tracing::warn!("{}", err),
                DesyncLog::CapReached => tracing::warn!(
                    max = self.max_warnings,
                    "Reached the maximum number of timestamp errors, suppressing future warnings"
                ),
                DesyncLog::Silent => {}
            }
            log.push(action);
            *error_count = error_count.saturating_add(1);
            diagnostics.push(err);
        }

        let timestamp = if log.is_empty() {
            reference.timestamp as i64
        } else {
            UNSYNCED_TIMESTAMP
        };
        SyncOutcome { timestamp, log }
    }
}

impl Default for TimestampSync {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(stamps: &[(u16, u64)]) -> Vec<TiEntry> {
        stamps
            .iter()
            .map(|&(crate_id, timestamp)| TiEntry {
                crate_id,
                timestamp,
            })
            .collect()
    }

    #[test]
    fn agreeing_crates_sync() {
        let sync = TimestampSync::default();
        let mut errors = 0;
        let mut diag = Vec::new();
        let ts = sync.resolve(&entries(&[(1, 100), (2, 100), (3, 100)]), None, &mut errors, &mut diag).timestamp;
        assert_eq!(ts, 100);
        assert_eq!(errors, 0);
        assert!(diag.is_empty());
    }

    #[test]
    fn disagreeing_crate_desyncs() {
        let sync = TimestampSync::default();
        let mut errors = 0;
        let mut diag = Vec::new();
        let ts = sync.resolve(&entries(&[(1, 100), (2, 100), (3, 150)]), None, &mut errors, &mut diag).timestamp;
        assert_eq!(ts, -1);
        assert_eq!(errors, 1);
        assert!(matches!(
            diag[0],
            DecodeError::DesyncTimestamp {
                crate_id: 3,
                reported: 150,
                reference: 100,
                reference_crate: 1
            }
        ));
    }

    #[test]
    fn master_gets_one_extra_tick() {
        let sync = TimestampSync::default();
        let mut errors = 0;
        let mut diag = Vec::new();
        // Master first: the reference is taken from crate 2
        let ts = sync.resolve(&entries(&[(1, 101), (2, 100)]), Some(1), &mut errors, &mut diag).timestamp;
        assert_eq!(ts, 100);
        assert_eq!(errors, 0);

        let ts = sync.resolve(&entries(&[(1, 102), (2, 100)]), Some(1), &mut errors, &mut diag).timestamp;
        assert_eq!(ts, -1);
        assert_eq!(errors, 1);

        // Non-master crates get no extra tick
        let ts = sync.resolve(&entries(&[(2, 100), (3, 101)]), Some(1), &mut errors, &mut diag).timestamp;
        assert_eq!(ts, -1);
    }

    #[test]
    fn only_master_crates_reference_first() {
        let sync = TimestampSync::default();
        let mut errors = 0;
        let mut diag = Vec::new();
        let ts = sync.resolve(&entries(&[(1, 55)]), Some(1), &mut errors, &mut diag).timestamp;
        assert_eq!(ts, 55);
    }

    #[test]
    fn no_entries_is_unsynced() {
        let sync = TimestampSync::default();
        let mut errors = 0;
        let mut diag = Vec::new();
        assert_eq!(sync.resolve(&[], None, &mut errors, &mut diag).timestamp, -1);
        assert_eq!(errors, 0);
    }

    #[test]
    fn tolerance_widens_window() {
        let sync = TimestampSync::new(5, 100);
        let mut errors = 0;
        let mut diag = Vec::new();
        let ts = sync.resolve(&entries(&[(1, 100), (2, 105)]), None, &mut errors, &mut diag).timestamp;
        assert_eq!(ts, 100);
    }

    #[test]
    fn error_count_keeps_growing_past_cap() {
        let sync = TimestampSync::new(0, 2);
        let mut errors = 0;
        let mut diag = Vec::new();
        let mut log = Vec::new();
        for _ in 0..5 {
            log.extend(sync.resolve(&entries(&[(1, 100), (2, 200)]), None, &mut errors, &mut diag).log);
        }
        assert_eq!(errors, 5);
        assert_eq!(diag.len(), 5);
        assert_eq!(
            log,
            vec![
                DesyncLog::Warned,
                DesyncLog::Warned,
                DesyncLog::CapReached,
                DesyncLog::Silent,
                DesyncLog::Silent,
            ]
        );
    }

    #[test]
    fn cap_applies_per_crate_within_one_event() {
        let sync = TimestampSync::new(0, 1);
        let mut errors = 0;
        let mut diag = Vec::new();
        let outcome = sync.resolve(&entries(&[(1, 100), (2, 200), (3, 300), (4, 400)]), None, &mut errors, &mut diag);
        assert_eq!(outcome.timestamp, -1);
        assert_eq!(outcome.log, vec![DesyncLog::Warned, DesyncLog::CapReached, DesyncLog::Silent]);
        assert_eq!(errors, 3);
    }

    #[test]
    fn zero_cap_only_prints_notice() {
        let sync = TimestampSync::new(0, 0);
        assert_eq!(sync.log_action(0), DesyncLog::CapReached);
        assert_eq!(sync.log_action(1), DesyncLog::Silent);
    }
}
