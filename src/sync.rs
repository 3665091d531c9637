//! The reconciliation loop and its hand-off points with the rest of the process.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::console::RateLimitedConsole;
use crate::errors::SyncError;
use crate::executor::{self, ApplyReport};
use crate::groups::directory::DirectoryProvider;
use crate::groups::{GroupTree, LookupError};
use crate::limiter::Limiter;
use crate::plan::{self, Plan, PlanPolicy};
use crate::settings::{DryRun, SyncConfig, SyncSettings};

const TICK_POLL: Duration = Duration::from_millis(500);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-entry mailbox for a validated configuration waiting to go live.
///
/// Writers overwrite any candidate not yet picked up; the loop takes it at the
/// start of a cycle.
#[derive(Debug, Default)]
pub struct ConfigSlot {
    pending: Mutex<Option<Arc<SyncConfig>>>,
}

impl ConfigSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, config: Arc<SyncConfig>) {
        *lock(&self.pending) = Some(config);
    }

    pub fn take(&self) -> Option<Arc<SyncConfig>> {
        lock(&self.pending).take()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }
}

/// Progress counters shared with the admin endpoints.
#[derive(Debug, Default)]
pub struct SyncStatus {
    ready: AtomicBool,
    plans_created: AtomicU64,
    last_plan_at: Mutex<Option<DateTime<Utc>>>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_plan(&self) {
        self.plans_created.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_plan_at) = Some(Utc::now());
        self.ready.store(true, Ordering::Relaxed);
    }

    /// Used when planning is disabled, so the process still reports ready.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn plans_created(&self) -> u64 {
        self.plans_created.load(Ordering::Relaxed)
    }

    pub fn last_plan_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_plan_at)
    }
}

/// What a single cycle ended up doing.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Planning disabled by `dry_run = "no_plan"`
    Skipped,
    NoChanges,
    /// Plan built and logged but not applied
    Planned(Plan),
    Applied(ApplyReport),
}

struct Limiters {
    apply: Limiter,
    groups: Limiter,
    quiet: Limiter,
}

impl Limiters {
    fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            // cycles never run closer together than the tick poll
            apply: Limiter::every(settings.apply_interval().max(TICK_POLL)),
            groups: Limiter::every(settings.groups_fetch_interval()),
            quiet: Limiter::every(settings.no_changes_log_interval()),
        }
    }
}

pub struct SyncLoop {
    console: RateLimitedConsole,
    tree: GroupTree,
    config: Arc<SyncConfig>,
    slot: Arc<ConfigSlot>,
    status: Arc<SyncStatus>,
    limiters: Limiters,
}

impl SyncLoop {
    pub fn new(
        console: RateLimitedConsole,
        directory: Arc<dyn DirectoryProvider>,
        config: Arc<SyncConfig>,
        slot: Arc<ConfigSlot>,
        status: Arc<SyncStatus>,
    ) -> Self {
        let tree = GroupTree::new(directory, config.group_blacklist.clone());
        let limiters = Limiters::from_settings(&config.settings);
        Self {
            console,
            tree,
            config,
            slot,
            status,
            limiters,
        }
    }

    pub fn config(&self) -> &Arc<SyncConfig> {
        &self.config
    }

    /// Run cycles forever.
    pub async fn run(mut self) {
        tracing::info!(
            rules = self.config.rules.len(),
            apply_interval_secs = self.config.settings.apply_interval_secs,
            dry_run = ?self.config.settings.dry_run,
            "Starting sync loop"
        );

        loop {
            self.wait_for_tick().await;
            self.maybe_swap_config();
            if let Err(err) = self.run_cycle().await {
                tracing::error!("Sync cycle aborted: {err}");
            }
        }
    }

    /// Wait until the apply cadence allows a cycle or a new config is pending.
    pub async fn wait_for_tick(&self) {
        loop {
            if self.slot.is_pending() || self.limiters.apply.try_acquire() {
                return;
            }
            tokio::time::sleep(TICK_POLL).await;
        }
    }

    /// Swap in a pending config. Returns whether a swap happened.
    pub fn maybe_swap_config(&mut self) -> bool {
        let Some(config) = self.slot.take() else {
            return false;
        };

        self.limiters = Limiters::from_settings(&config.settings);
        // the cycle about to run counts as the first tick of the new cadence
        self.limiters.apply.try_acquire();
        self.tree.set_blacklist(config.group_blacklist.clone());
        self.tree.clear();
        self.config = config;

        tracing::info!(
            rules = self.config.rules.len(),
            blacklist = self.config.group_blacklist.len(),
            "Applied new configuration"
        );
        true
    }

    /// One fetch, plan, execute pass.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, SyncError> {
        let dry_run = self.config.settings.dry_run;
        let policy = PlanPolicy::from(&self.config.settings);
        if dry_run == DryRun::NoPlan {
            tracing::debug!("Planning disabled, skipping cycle");
            self.status.mark_ready();
            return Ok(CycleOutcome::Skipped);
        }

        let snapshot = plan::fetch_snapshot(&self.console).await?;

        if self.limiters.groups.try_acquire() {
            self.refresh_groups().await?;
        }

        let plan = plan::build_plan(&snapshot, &mut self.tree, &self.config.rules, policy).await?;
        self.status.record_plan();

        if plan.is_empty() {
            if self.limiters.quiet.try_acquire() {
                tracing::info!("No changes to apply");
            }
            return Ok(CycleOutcome::NoChanges);
        }

        plan.log();

        if dry_run == DryRun::NoExec {
            tracing::info!("Dry run, plan not applied");
            return Ok(CycleOutcome::Planned(plan));
        }

        let report = executor::apply(&plan, &self.console).await;
        Ok(CycleOutcome::Applied(report))
    }

    async fn refresh_groups(&mut self) -> Result<(), LookupError> {
        self.tree.clear();
        for key in self.config.rules.all_groups() {
            if let Err(err) = self.tree.resolve_group(&key).await {
                if err.is_fatal() {
                    return Err(err);
                }
                tracing::warn!(group = %key, "Failed to prefetch group: {err}");
            }
        }
        tracing::info!(
            groups = self.tree.cached_group_count(),
            users = self.tree.cached_user_count(),
            "Refreshed group cache"
        );
        Ok(())
    }
}
