// src/models/mod.rs

//! Domain models for the grade notifier.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod report;

// Re-export all public types
pub use config::{
    Account, Config, GuardConfig, LoggingConfig, NotifierConfig, PollingConfig, PortalConfig,
    StorageConfig,
};
pub use report::{
    PeriodGrades, PeriodRecord, Report, SubjectRecord, label_index, period_label, sort_labels,
};
