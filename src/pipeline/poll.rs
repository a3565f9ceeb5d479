// src/pipeline/poll.rs

//! Polling driver.
//!
//! One cycle walks the configured accounts in order. For each account it
//! fetches the grade page, parses it, diffs it against the stored snapshot,
//! sends the resulting messages and stores the fresh report. A failure only
//! ends the current account's turn; the cycle always goes on.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Account, Config};
use crate::pipeline::diff::DiffCalculator;
use crate::pipeline::guard::SnapshotGuard;
use crate::services::{Notifier, PortalClient, ReportParser};
use crate::storage::SnapshotStore;

/// What happened to one account in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    /// Report diffed and stored
    Updated { messages: usize, delivered: usize },
    /// Portal fetch failed, snapshot untouched
    FetchFailed,
    /// Stored snapshot unreadable, left untouched
    LoadFailed,
    /// Snapshot guard rejected the fresh report
    Guarded,
    /// Messages went out but the snapshot could not be written
    SaveFailed { messages: usize, delivered: usize },
}

/// Statistics of one polling cycle.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub account_count: usize,
    pub updated: usize,
    pub skipped: usize,
    pub messages: usize,
    pub delivered: usize,
}

impl CycleStats {
    fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: start_time,
            account_count: 0,
            updated: 0,
            skipped: 0,
            messages: 0,
            delivered: 0,
        }
    }

    fn record(&mut self, outcome: &AccountOutcome) {
        self.account_count += 1;
        match outcome {
            AccountOutcome::Updated {
                messages,
                delivered,
            } => {
                self.updated += 1;
                self.messages += messages;
                self.delivered += delivered;
            }
            AccountOutcome::SaveFailed {
                messages,
                delivered,
            } => {
                self.skipped += 1;
                self.messages += messages;
                self.delivered += delivered;
            }
            AccountOutcome::FetchFailed | AccountOutcome::LoadFailed | AccountOutcome::Guarded => {
                self.skipped += 1
            }
        }
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds()
    }
}

/// Ties portal, parser, differ, notifier and snapshot store together.
pub struct Poller<'a> {
    config: &'a Config,
    portal: &'a dyn PortalClient,
    notifier: &'a dyn Notifier,
    store: &'a dyn SnapshotStore,
    parser: ReportParser,
    differ: DiffCalculator,
    guard: SnapshotGuard,
}

impl<'a> Poller<'a> {
    pub fn new(
        config: &'a Config,
        portal: &'a dyn PortalClient,
        notifier: &'a dyn Notifier,
        store: &'a dyn SnapshotStore,
    ) -> Result<Self> {
        let differ = if config.polling.show_year_average {
            DiffCalculator::new()
        } else {
            DiffCalculator::without_year_average()
        };
        Ok(Self {
            config,
            portal,
            notifier,
            store,
            parser: ReportParser::new()?,
            differ,
            guard: SnapshotGuard::new(&config.guard),
        })
    }

    /// Run one full cycle over every configured account.
    pub async fn run_cycle(&self) -> CycleStats {
        let mut stats = CycleStats::new(Utc::now());

        for account in &self.config.accounts {
            let outcome = self.process_account(account).await;
            log::debug!("{}: {outcome:?}", account.name);
            stats.record(&outcome);
        }

        stats.end_time = Utc::now();
        log::info!(
            "Cycle finished: {}/{} accounts updated, {}/{} messages delivered ({}s)",
            stats.updated,
            stats.account_count,
            stats.delivered,
            stats.messages,
            stats.duration_secs()
        );
        stats
    }

    /// Poll forever, sleeping the configured interval between cycles.
    pub async fn run_forever(&self) {
        let interval = Duration::from_secs(self.config.polling.interval_minutes.max(1) * 60);
        log::info!(
            "Watching {} account(s), polling every {} minute(s)",
            self.config.accounts.len(),
            interval.as_secs() / 60
        );
        loop {
            self.run_cycle().await;
            tokio::time::sleep(interval).await;
        }
    }

    /// Process one account. Never fails; problems end up in the outcome.
    pub async fn process_account(&self, account: &Account) -> AccountOutcome {
        let user = account.name.as_str();

        let html = match self.portal.fetch_report(account).await {
            Ok(html) => html,
            Err(e) => {
                log::error!("Fetching grades for {user} failed: {e}");
                return AccountOutcome::FetchFailed;
            }
        };
        let current = self.parser.parse(&html);

        let previous = match self.store.load(user).await {
            Ok(report) => report,
            Err(e) => {
                log::error!("Loading snapshot of {user} failed: {e}");
                return AccountOutcome::LoadFailed;
            }
        };

        if self.guard.validate(user, &current, &previous).is_err() {
            return AccountOutcome::Guarded;
        }

        let diff = self.differ.calculate(&previous, &current);
        let messages = diff.messages(user, self.differ.show_year_average());
        if messages.is_empty() {
            log::info!("No new grades for {user}");
        }
        let delivered = self.deliver(&messages).await;

        match self.store.save(user, &current).await {
            Ok(meta) => {
                log::debug!("Stored {} subjects for {user} in {}", meta.subject_count, meta.key);
                AccountOutcome::Updated {
                    messages: messages.len(),
                    delivered,
                }
            }
            Err(e) => {
                log::error!("Saving snapshot of {user} failed: {e}");
                AccountOutcome::SaveFailed {
                    messages: messages.len(),
                    delivered,
                }
            }
        }
    }

    /// Send messages in order with the configured pause between them.
    /// Returns how many were delivered.
    async fn deliver(&self, messages: &[String]) -> usize {
        let delay = Duration::from_millis(self.config.notifier.message_delay_ms);
        let mut delivered = 0;

        for (idx, message) in messages.iter().enumerate() {
            if idx > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.notifier.send(message).await {
                Ok(()) => delivered += 1,
                Err(e) => log::error!("Sending message failed: {e}"),
            }
        }
        delivered
    }
}
