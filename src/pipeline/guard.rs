//! Snapshot guard.
//!
//! Keeps a degraded fetch from replacing a good snapshot: when the fresh
//! report lost too many subjects compared to the stored one, the cycle for
//! that user is skipped and the old snapshot stays in place.
//!
//! The guard is off unless `[guard] enabled = true`, so by default every
//! successful fetch replaces the snapshot.

use crate::error::{AppError, Result};
use crate::models::{GuardConfig, Report};

/// Snapshot guard over subject counts.
#[derive(Debug, Clone)]
pub struct SnapshotGuard {
    config: GuardConfig,
}

/// Result of a guard check.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardResult {
    /// Guard switched off
    Disabled,
    /// Safe to replace the snapshot
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// Stored snapshot below the baseline, nothing to compare against
    ColdStart { current_count: usize },
    /// Too many subjects disappeared
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
    /// Fresh report has no subjects at all
    EmptyResult { previous_count: usize },
}

impl SnapshotGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Compare the fresh report against the stored one.
    pub fn check(&self, current: &Report, previous: &Report) -> GuardResult {
        if !self.config.enabled {
            return GuardResult::Disabled;
        }

        let current_count = current.subject_count();
        let previous_count = previous.subject_count();

        if previous_count == 0 || previous_count < self.config.min_baseline {
            return GuardResult::ColdStart { current_count };
        }
        if current_count == 0 {
            return GuardResult::EmptyResult { previous_count };
        }

        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;
            if drop_percent > f64::from(self.config.max_drop_percent) {
                return GuardResult::Triggered {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        GuardResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Ok if the fresh report may replace the stored one.
    pub fn validate(&self, user: &str, current: &Report, previous: &Report) -> Result<()> {
        match self.check(current, previous) {
            GuardResult::Disabled => Ok(()),
            GuardResult::Safe {
                current_count,
                previous_count,
            } => {
                log::debug!(
                    "Snapshot guard [{user}]: SAFE ({current_count} subjects, was {previous_count})"
                );
                Ok(())
            }
            GuardResult::ColdStart { current_count } => {
                log::info!(
                    "Snapshot guard [{user}]: COLD START ({current_count} subjects, no baseline)"
                );
                Ok(())
            }
            GuardResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "Snapshot guard [{user}]: TRIGGERED! {previous_count} → {current_count} subjects ({drop_percent:.1}% drop > {}% threshold)",
                    self.config.max_drop_percent
                );
                Err(AppError::SnapshotGuard {
                    current_count,
                    previous_count,
                    drop_percent,
                    threshold_percent: self.config.max_drop_percent,
                })
            }
            GuardResult::EmptyResult { previous_count } => {
                log::error!("Snapshot guard [{user}]: EMPTY RESULT, keeping {previous_count} subjects");
                Err(AppError::SnapshotGuard {
                    current_count: 0,
                    previous_count,
                    drop_percent: 100.0,
                    threshold_percent: self.config.max_drop_percent,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectRecord;

    fn make_report(count: usize) -> Report {
        let mut report = Report::default();
        for i in 0..count {
            report
                .subjects
                .insert(format!("Fach {i}"), SubjectRecord::default());
        }
        report
    }

    fn enabled() -> SnapshotGuard {
        SnapshotGuard::new(&GuardConfig {
            enabled: true,
            max_drop_percent: 50,
            min_baseline: 4,
        })
    }

    #[test]
    fn test_disabled_by_default() {
        let guard = SnapshotGuard::new(&GuardConfig::default());
        assert_eq!(guard.check(&make_report(0), &make_report(12)), GuardResult::Disabled);
        assert!(guard.validate("Anna", &make_report(0), &make_report(12)).is_ok());
    }

    #[test]
    fn test_safe_small_drop() {
        let result = enabled().check(&make_report(9), &make_report(12));
        assert!(matches!(result, GuardResult::Safe { .. }));
    }

    #[test]
    fn test_triggered_large_drop() {
        let guard = enabled();
        assert!(matches!(
            guard.check(&make_report(5), &make_report(12)),
            GuardResult::Triggered { .. }
        ));
        let err = guard
            .validate("Anna", &make_report(5), &make_report(12))
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::SnapshotGuard {
                current_count: 5,
                previous_count: 12,
                ..
            }
        ));
    }

    #[test]
    fn test_cold_start() {
        let guard = enabled();
        assert!(matches!(
            guard.check(&make_report(10), &make_report(0)),
            GuardResult::ColdStart { .. }
        ));
        assert!(matches!(
            guard.check(&make_report(0), &make_report(3)),
            GuardResult::ColdStart { .. }
        ));
    }

    #[test]
    fn test_empty_result() {
        let guard = enabled();
        assert_eq!(
            guard.check(&make_report(0), &make_report(12)),
            GuardResult::EmptyResult { previous_count: 12 }
        );
        assert!(guard.validate("Anna", &make_report(0), &make_report(12)).is_err());
    }

    #[test]
    fn test_increase_is_safe() {
        let result = enabled().check(&make_report(14), &make_report(12));
        assert!(matches!(result, GuardResult::Safe { .. }));
    }
}
