use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::SyncConfig;
use crate::db::RankStore;
use crate::error::{StoreError, SyncError};
use crate::models::{
    BELT_DAN_LEVELS, CompletionRecord, RankProgress, RankUpdate, UserRankState, Versioned,
};
use crate::rank::calculator::compute_for_state;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Re-run the whole cycle once when the conditional write loses a race.
    pub retry_on_stale: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            retry_on_stale: true,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            retry_on_stale: config.retry_on_stale,
        }
    }
}

/// What one synchronizer pass would change, computed without touching the store.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub update: RankUpdate,
    pub next_state: UserRankState,
    pub newly_completed: Option<CompletionRecord>,
    pub belt_changed: bool,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub state: UserRankState,
    pub version: u64,
    pub progress: RankProgress,
    pub newly_completed: Option<CompletionRecord>,
    pub belt_changed: bool,
    pub wrote: bool,
}

pub fn plan_sync(state: &UserRankState, now: DateTime<Utc>) -> SyncPlan {
    let mut update = RankUpdate::default();
    let mut belt_changed = false;

    match state.previous_belt {
        Some(prev) if prev != state.belt => {
            update.previous_belt = Some(state.belt);
            update.completions = Some(vec![]);
            belt_changed = true;
        }
        None => update.previous_belt = Some(state.belt),
        Some(_) => {}
    }

    let mut next = state.clone();
    next.apply(&update);

    // Group 0 is the first, unfinished group and never yields a completion.
    // Every Dan up to the reached group is backfilled; only the highest new
    // one is signalled.
    let progress = compute_for_state(&next);
    let mut newly_completed = None;
    if (1..=BELT_DAN_LEVELS as u64).contains(&progress.group_index) {
        let reached = progress.group_index as u8;
        for dan in 1..=reached {
            let record = CompletionRecord::new(dan, progress.group_size, now);
            if next.push_completion(record.clone()) {
                newly_completed = Some(record);
            }
        }
        if newly_completed.is_some() {
            update.completions = Some(next.completions.clone());
        }
    }

    SyncPlan {
        update,
        next_state: next,
        newly_completed,
        belt_changed,
    }
}

/// Run one Dan-completion synchronization for `user_id`.
///
/// All changes go out in a single conditional write. The returned state is
/// only produced once that write has been accepted.
pub fn synchronize<S: RankStore + ?Sized>(
    store: &S,
    user_id: &str,
    options: &SyncOptions,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, SyncError> {
    let attempts = if options.retry_on_stale { 2 } else { 1 };
    let mut attempt = 1;
    loop {
        match sync_once(store, user_id, now) {
            Err(StoreError::Stale { expected, found }) if attempt < attempts => {
                warn!(
                    "Stale write for {} (expected v{}, found v{}), retrying",
                    user_id, expected, found
                );
                attempt += 1;
            }
            result => return result.map_err(SyncError::from),
        }
    }
}

fn sync_once<S: RankStore + ?Sized>(
    store: &S,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, StoreError> {
    let Versioned { value, version } = store.read_user_rank_state(user_id)?;
    let plan = plan_sync(&value, now);
    let progress = compute_for_state(&plan.next_state);

    if plan.update.is_empty() {
        debug!("No rank changes for {} at v{}", user_id, version);
        return Ok(SyncOutcome {
            state: plan.next_state,
            version,
            progress,
            newly_completed: None,
            belt_changed: false,
            wrote: false,
        });
    }

    let new_version = store.write_user_rank_state(user_id, &plan.update, version)?;

    if plan.belt_changed {
        info!(
            "Belt change for {}: completions reset under {}",
            user_id, plan.next_state.belt
        );
    }
    if let Some(record) = &plan.newly_completed {
        info!(
            "{} completed Dan {} ({} check-ins per group)",
            user_id, record.dan_number, record.group_size
        );
    }

    Ok(SyncOutcome {
        state: plan.next_state,
        version: new_version,
        progress,
        newly_completed: plan.newly_completed,
        belt_changed: plan.belt_changed,
        wrote: true,
    })
}
