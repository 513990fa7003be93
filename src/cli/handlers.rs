use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use log::warn;
use rusqlite::Connection;
use serde::Serialize;
use std::str::FromStr;

use crate::config::AppConfig;
use crate::db::repository::MemberRepo;
use crate::db::RankStore;
use crate::models::{dan_name, BeltColor, RankProgress, UserRankState};
use crate::rank::{compute_for_state, synchronize, SyncOptions};
use crate::utils::format::{dan_pips, format_date, format_timestamp, ratio_bar};

// ─── ANSI helpers ────────────────────────────────────────────────────────────

macro_rules! println_colored {
    ($color:expr, $($arg:tt)*) => {{
        print!("{}", $color);
        print!($($arg)*);
        println!("\x1b[0m");
    }};
}

const GREEN: &str = "\x1b[32m";
const AMBER: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const GOLD: &str = "\x1b[38;2;196;160;68m";

fn parse_belt(s: &str) -> Result<BeltColor> {
    BeltColor::from_str(s).map_err(|_| {
        let names: Vec<&str> = BeltColor::all().iter().map(|b| b.as_str()).collect();
        anyhow!("Unknown belt '{}'. Use: {}", s, names.join(", "))
    })
}

// ─── Register ────────────────────────────────────────────────────────────────

pub fn handle_register(conn: &Connection, user: &str, belt: &str) -> Result<()> {
    let belt = parse_belt(belt)?;
    MemberRepo::new(conn).register(user, belt)?;
    println_colored!(GREEN, "  ✓ Registered {} — {} belt", user, belt);
    Ok(())
}

// ─── Check-in ────────────────────────────────────────────────────────────────

pub fn handle_checkin(conn: &Connection, user: &str, times: u32) -> Result<()> {
    if times == 0 {
        bail!("--times must be at least 1");
    }
    let repo = MemberRepo::new(conn);
    let mut total = 0;
    for _ in 0..times {
        total = repo
            .record_check_in(user, Utc::now())
            .with_context(|| format!("Recording check-in for {}", user))?;
    }
    println_colored!(
        GREEN,
        "  ✓ {} check-in(s) recorded for {} — {} total",
        times,
        user,
        total
    );
    Ok(())
}

pub fn handle_set_checkins(conn: &Connection, user: &str, count: u32) -> Result<()> {
    MemberRepo::new(conn).override_check_ins(user, count as i64)?;
    println_colored!(AMBER, "  Check-ins for {} set to {}", user, count);
    Ok(())
}

// ─── Promote ─────────────────────────────────────────────────────────────────

pub fn handle_promote(conn: &Connection, user: &str, belt: &str) -> Result<()> {
    let belt = parse_belt(belt)?;
    let old = MemberRepo::new(conn).change_belt(user, belt)?;
    if old == belt {
        println_colored!(DIM, "  {} is already {} belt", user, belt);
    } else {
        println_colored!(GOLD, "  {} → {} belt for {}", old, belt, user);
        println_colored!(DIM, "  Dan history resets on the next sync");
    }
    Ok(())
}

// ─── Progress / sync ─────────────────────────────────────────────────────────

pub fn handle_progress(conn: &Connection, config: &AppConfig, user: &str) -> Result<()> {
    let repo = MemberRepo::new(conn);
    match synchronize(&repo, user, &SyncOptions::from(&config.sync), Utc::now()) {
        Ok(outcome) => {
            print_progress(user, &outcome.state, &outcome.progress, config);
            if let Some(record) = &outcome.newly_completed {
                if config.display.celebrate {
                    println_colored!(
                        GOLD,
                        "  ★ {} complete! {} check-ins in the group.",
                        dan_name(record.dan_number),
                        record.count
                    );
                    println!();
                }
            }
        }
        Err(e) => {
            // Sync failures never hide progress; only the announcement waits.
            warn!("Sync for {} failed: {}", user, e);
            let last_known = repo
                .read_user_rank_state(user)
                .with_context(|| format!("Reading {} after failed sync", user))?
                .value;
            println_colored!(AMBER, "  ! Sync failed ({}), showing last known progress", e);
            let progress = compute_for_state(&last_known);
            print_progress(user, &last_known, &progress, config);
        }
    }
    Ok(())
}

pub fn handle_sync(conn: &Connection, config: &AppConfig, user: &str) -> Result<()> {
    let repo = MemberRepo::new(conn);
    let outcome = synchronize(&repo, user, &SyncOptions::from(&config.sync), Utc::now())
        .with_context(|| format!("Syncing {}", user))?;

    if !outcome.wrote {
        println_colored!(DIM, "  {} is up to date", user);
        return Ok(());
    }
    if outcome.belt_changed {
        println_colored!(AMBER, "  Belt change detected — Dan history cleared");
    }
    match &outcome.newly_completed {
        Some(record) => println_colored!(GREEN, "  ✓ Recorded {}", dan_name(record.dan_number)),
        None => println_colored!(GREEN, "  ✓ Synced {} (v{})", user, outcome.version),
    }
    Ok(())
}

fn print_progress(user: &str, state: &UserRankState, progress: &RankProgress, config: &AppConfig) {
    println!();
    println_colored!(GOLD, "  {} — {} belt", user, state.belt);
    println!();
    println_colored!(
        BOLD,
        "  {:<12}  {}",
        progress.dan_name(),
        dan_pips(progress.current_dan)
    );
    println!(
        "  {}  {}/{}",
        ratio_bar(progress.ratio(), config.display.bar_width),
        progress.count_in_group,
        progress.group_size
    );
    println_colored!(
        DIM,
        "  {} check-ins total",
        state.cumulative_check_ins
    );

    let earned = state.completions_for_current_belt();
    if !earned.is_empty() {
        println!();
        for c in earned {
            println_colored!(
                GREEN,
                "  ✓ {:<12}  {}",
                dan_name(c.dan_number),
                format_date(c.completed_on)
            );
        }
    }
    println!();
}

// ─── History ─────────────────────────────────────────────────────────────────

pub fn handle_history(conn: &Connection, user: &str, limit: usize) -> Result<()> {
    let repo = MemberRepo::new(conn);
    let state = repo.read_user_rank_state(user)?.value;
    let recent = repo.recent_check_ins(user, limit)?;

    println!();
    println_colored!(GOLD, "  {} — {} belt", user, state.belt);
    println!();
    if state.completions.is_empty() {
        println_colored!(DIM, "  No Dans completed on this belt yet");
    } else {
        for c in &state.completions {
            println!(
                "  {:<12}  {}/{}  {}",
                dan_name(c.dan_number),
                c.count,
                c.group_size,
                format_timestamp(c.completed_on)
            );
        }
    }

    println!();
    println_colored!(DIM, "  Recent check-ins");
    if recent.is_empty() {
        println_colored!(DIM, "  none recorded");
    }
    for at in &recent {
        println!("  {}", format_timestamp(*at));
    }
    println!();
    Ok(())
}

// ─── Members ─────────────────────────────────────────────────────────────────

pub fn handle_members(conn: &Connection) -> Result<()> {
    let repo = MemberRepo::new(conn);
    let ids = repo.member_ids()?;

    println!();
    if ids.is_empty() {
        println_colored!(DIM, "  No members registered");
        println!();
        return Ok(());
    }
    println_colored!(GOLD, "  Members ({})", ids.len());
    println!();
    for id in &ids {
        let state = repo.read_user_rank_state(id)?.value;
        let progress = compute_for_state(&state);
        println!(
            "  {:<20}  {:<7}  {:<11}  {:>3}/{}",
            id,
            state.belt.display_name(),
            progress.dan_name(),
            progress.count_in_group,
            progress.group_size
        );
    }
    println!();
    Ok(())
}

// ─── Export ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MemberExport<'a> {
    user_id: &'a str,
    version: u64,
    state: &'a UserRankState,
    progress: RankProgress,
}

pub fn handle_export(conn: &Connection, user: &str) -> Result<()> {
    let read = MemberRepo::new(conn).read_user_rank_state(user)?;
    let export = MemberExport {
        user_id: user,
        version: read.version,
        state: &read.value,
        progress: compute_for_state(&read.value),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&export).context("Serializing export")?
    );
    Ok(())
}

// ─── Config ──────────────────────────────────────────────────────────────────

pub fn handle_init_config(config: &AppConfig) -> Result<()> {
    let path = AppConfig::config_path()?;
    if path.exists() {
        println_colored!(DIM, "  Config already exists at {:?}", path);
        return Ok(());
    }
    config.save()?;
    println_colored!(GREEN, "  ✓ Wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn checkin_rejects_zero_times() {
        let conn = memory_db();
        handle_register(&conn, "aiko", "white").unwrap();

        assert!(handle_checkin(&conn, "aiko", 0).is_err());
        let read = MemberRepo::new(&conn).read_user_rank_state("aiko").unwrap();
        assert_eq!(read.value.cumulative_check_ins, 0);
        assert_eq!(read.version, 0);

        handle_checkin(&conn, "aiko", 2).unwrap();
        let read = MemberRepo::new(&conn).read_user_rank_state("aiko").unwrap();
        assert_eq!(read.value.cumulative_check_ins, 2);
    }

    #[test]
    fn progress_syncs_before_display() {
        let conn = memory_db();
        handle_register(&conn, "aiko", "white").unwrap();
        MemberRepo::new(&conn).override_check_ins("aiko", 40).unwrap();

        handle_progress(&conn, &AppConfig::default(), "aiko").unwrap();
        let stored = MemberRepo::new(&conn).read_user_rank_state("aiko").unwrap();
        assert!(stored.value.has_completion(1));
        assert_eq!(stored.value.previous_belt, Some(BeltColor::White));
    }

    #[test]
    fn progress_for_unknown_member_fails() {
        let conn = memory_db();
        assert!(handle_progress(&conn, &AppConfig::default(), "ghost").is_err());
    }
}
