use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::db::RankStore;
use crate::error::StoreError;
use crate::models::{BeltColor, CompletionRecord, RankUpdate, UserRankState, Versioned};

/// Coerce a stored check-in count to a non-negative integer. Anything that is
/// not a number reads as zero.
pub fn coerce_check_ins(raw: Value) -> i64 {
    match raw {
        Value::Integer(n) => n.max(0),
        Value::Real(f) if f.is_finite() => (f as i64).max(0),
        Value::Text(s) => match s.trim().parse::<i64>() {
            Ok(n) => n.max(0),
            Err(_) => {
                warn!("Non-numeric check-in count {:?}, treating as 0", s);
                0
            }
        },
        other => {
            warn!("Unexpected check-in count {:?}, treating as 0", other);
            0
        }
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", s, e)))
}

fn read_completions(conn: &Connection, user_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT dan_number, group_size, count, completed_on
         FROM dan_completions WHERE user_id = ?1 ORDER BY dan_number",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut result = Vec::with_capacity(rows.len());
    for (dan_number, group_size, count, completed_on) in rows {
        result.push(CompletionRecord {
            dan_number: dan_number as u8,
            group_size: group_size as u32,
            count: count as u32,
            completed_on: parse_timestamp(&completed_on)?,
        });
    }
    Ok(result)
}

// ─── Member repo ─────────────────────────────────────────────────────────────

pub struct MemberRepo<'c> {
    conn: &'c Connection,
}

impl<'c> MemberRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn register(&self, user_id: &str, belt: BeltColor) -> Result<()> {
        let state = UserRankState::new(belt);
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO members (user_id, belt, cumulative_check_ins, version)
             VALUES (?1, ?2, ?3, 0)",
            params![user_id, state.belt.as_str(), state.cumulative_check_ins],
        )?;
        if inserted == 0 {
            bail!("Member '{}' is already registered", user_id);
        }
        Ok(())
    }

    /// Log one attendance event and bump the lifetime count. Returns the new count.
    pub fn record_check_in(&self, user_id: &str, at: DateTime<Utc>) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE members
             SET cumulative_check_ins = MAX(cumulative_check_ins, 0) + 1, version = version + 1
             WHERE user_id = ?1",
            params![user_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(user_id.to_string()).into());
        }
        tx.execute(
            "INSERT INTO check_ins (user_id, checked_in_at) VALUES (?1, ?2)",
            params![user_id, at.to_rfc3339()],
        )?;
        let total: i64 = tx.query_row(
            "SELECT cumulative_check_ins FROM members WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(total)
    }

    /// Administrative override of the lifetime count.
    pub fn override_check_ins(&self, user_id: &str, count: i64) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE members SET cumulative_check_ins = ?1, version = version + 1
             WHERE user_id = ?2",
            params![count.max(0), user_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(user_id.to_string()).into());
        }
        Ok(())
    }

    /// Set a new belt and return the one it replaced. Completions are left for
    /// the synchronizer to reset.
    pub fn change_belt(&self, user_id: &str, belt: BeltColor) -> Result<BeltColor> {
        let old: Option<String> = self
            .conn
            .query_row(
                "SELECT belt FROM members WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let old = old.ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        self.conn.execute(
            "UPDATE members SET belt = ?1, version = version + 1 WHERE user_id = ?2",
            params![belt.as_str(), user_id],
        )?;
        Ok(BeltColor::normalize(&old))
    }

    pub fn member_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM members ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    pub fn recent_check_ins(&self, user_id: &str, limit: usize) -> Result<Vec<DateTime<Utc>>> {
        let mut stmt = self.conn.prepare(
            "SELECT checked_in_at FROM check_ins WHERE user_id = ?1
             ORDER BY checked_in_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for r in rows {
            result.push(parse_timestamp(&r)?);
        }
        Ok(result)
    }
}

impl RankStore for MemberRepo<'_> {
    fn read_user_rank_state(&self, user_id: &str) -> Result<Versioned<UserRankState>, StoreError> {
        // Member row and completions come from one snapshot.
        let tx = self.conn.unchecked_transaction()?;
        let row = tx
            .query_row(
                "SELECT belt, previous_belt, cumulative_check_ins, version
                 FROM members WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Value>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let (belt, previous_belt, check_ins, version) =
            row.ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;

        let state = UserRankState {
            belt: BeltColor::normalize(belt.as_deref().unwrap_or("")),
            previous_belt: previous_belt
                .filter(|b| !b.trim().is_empty())
                .map(|b| BeltColor::normalize(&b)),
            cumulative_check_ins: coerce_check_ins(check_ins),
            completions: read_completions(&tx, user_id)?,
        };
        tx.commit()?;
        Ok(Versioned {
            value: state,
            version: version.max(0) as u64,
        })
    }

    fn write_user_rank_state(
        &self,
        user_id: &str,
        update: &RankUpdate,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let tx = rusqlite::Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let found: Option<i64> = tx
            .query_row(
                "SELECT version FROM members WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let found = found.ok_or_else(|| StoreError::NotFound(user_id.to_string()))? as u64;
        if found != expected_version {
            return Err(StoreError::Stale {
                expected: expected_version,
                found,
            });
        }

        tx.execute(
            "UPDATE members SET
                belt = COALESCE(?1, belt),
                previous_belt = COALESCE(?2, previous_belt),
                cumulative_check_ins = COALESCE(?3, cumulative_check_ins),
                version = version + 1
             WHERE user_id = ?4 AND version = ?5",
            params![
                update.belt.map(|b| b.as_str()),
                update.previous_belt.map(|b| b.as_str()),
                update.cumulative_check_ins,
                user_id,
                expected_version as i64,
            ],
        )?;

        if let Some(completions) = &update.completions {
            tx.execute(
                "DELETE FROM dan_completions WHERE user_id = ?1",
                params![user_id],
            )?;
            for c in completions {
                tx.execute(
                    "INSERT INTO dan_completions (user_id, dan_number, group_size, count, completed_on)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        user_id,
                        c.dan_number,
                        c.group_size,
                        c.count,
                        c.completed_on.to_rfc3339(),
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(expected_version + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrations::run_migrations, open};
    use crate::rank::{synchronize, SyncOptions};
    use std::time::Duration;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn register_then_read() {
        let conn = memory_db();
        let repo = MemberRepo::new(&conn);
        repo.register("aiko", BeltColor::Blue).unwrap();

        let read = repo.read_user_rank_state("aiko").unwrap();
        assert_eq!(read.version, 0);
        assert_eq!(read.value, UserRankState::new(BeltColor::Blue));
        assert!(repo.register("aiko", BeltColor::White).is_err());
    }

    #[test]
    fn unknown_member_is_not_found() {
        let conn = memory_db();
        let repo = MemberRepo::new(&conn);
        assert!(matches!(
            repo.read_user_rank_state("ghost"),
            Err(StoreError::NotFound(_))
        ));
        assert!(repo.record_check_in("ghost", Utc::now()).is_err());
    }

    #[test]
    fn check_ins_accumulate_and_bump_version() {
        let conn = memory_db();
        let repo = MemberRepo::new(&conn);
        repo.register("aiko", BeltColor::White).unwrap();
        for _ in 0..3 {
            repo.record_check_in("aiko", Utc::now()).unwrap();
        }
        let read = repo.read_user_rank_state("aiko").unwrap();
        assert_eq!(read.value.cumulative_check_ins, 3);
        assert_eq!(read.version, 3);
        assert_eq!(repo.recent_check_ins("aiko", 2).unwrap().len(), 2);
    }

    #[test]
    fn stored_belt_and_count_are_normalized() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO members (user_id, belt, previous_belt, cumulative_check_ins)
             VALUES ('rin', 'BLUE', '', 'lots')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO members (user_id, belt, cumulative_check_ins) VALUES ('sora', 'green', -4)",
            [],
        )
        .unwrap();
        let repo = MemberRepo::new(&conn);

        let rin = repo.read_user_rank_state("rin").unwrap().value;
        assert_eq!(rin.belt, BeltColor::Blue);
        assert_eq!(rin.previous_belt, None);
        assert_eq!(rin.cumulative_check_ins, 0);

        let sora = repo.read_user_rank_state("sora").unwrap().value;
        assert_eq!(sora.belt, BeltColor::White);
        assert_eq!(sora.cumulative_check_ins, 0);
    }

    #[test]
    fn conditional_write_replaces_completions() {
        let conn = memory_db();
        let repo = MemberRepo::new(&conn);
        repo.register("aiko", BeltColor::White).unwrap();

        let record = CompletionRecord::new(1, 40, Utc::now());
        let update = RankUpdate {
            previous_belt: Some(BeltColor::White),
            completions: Some(vec![record.clone()]),
            ..Default::default()
        };
        assert_eq!(repo.write_user_rank_state("aiko", &update, 0).unwrap(), 1);

        let read = repo.read_user_rank_state("aiko").unwrap();
        assert_eq!(read.version, 1);
        assert_eq!(read.value.previous_belt, Some(BeltColor::White));
        assert_eq!(read.value.completions.len(), 1);
        assert_eq!(read.value.completions[0].dan_number, 1);
        assert_eq!(read.value.completions[0].count, 40);

        let clear = RankUpdate {
            completions: Some(vec![]),
            ..Default::default()
        };
        repo.write_user_rank_state("aiko", &clear, 1).unwrap();
        assert!(repo.read_user_rank_state("aiko").unwrap().value.completions.is_empty());
    }

    #[test]
    fn write_at_old_version_is_stale() {
        let conn = memory_db();
        let repo = MemberRepo::new(&conn);
        repo.register("aiko", BeltColor::White).unwrap();
        repo.record_check_in("aiko", Utc::now()).unwrap();

        let update = RankUpdate {
            previous_belt: Some(BeltColor::White),
            ..Default::default()
        };
        let err = repo.write_user_rank_state("aiko", &update, 0).unwrap_err();
        assert!(matches!(err, StoreError::Stale { expected: 0, found: 1 }));
        assert_eq!(repo.read_user_rank_state("aiko").unwrap().value.previous_belt, None);
    }

    #[test]
    fn two_connections_race_on_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dojo.db");
        let phone = open(&path, Duration::from_millis(500)).unwrap();
        let tablet = open(&path, Duration::from_millis(500)).unwrap();
        let phone_repo = MemberRepo::new(&phone);
        let tablet_repo = MemberRepo::new(&tablet);

        phone_repo.register("aiko", BeltColor::White).unwrap();
        phone_repo.override_check_ins("aiko", 39).unwrap();
        let seen = phone_repo.read_user_rank_state("aiko").unwrap();

        tablet_repo.record_check_in("aiko", Utc::now()).unwrap();

        let update = RankUpdate {
            previous_belt: Some(BeltColor::White),
            ..Default::default()
        };
        assert!(matches!(
            phone_repo.write_user_rank_state("aiko", &update, seen.version),
            Err(StoreError::Stale { .. })
        ));

        let outcome =
            synchronize(&phone_repo, "aiko", &SyncOptions::default(), Utc::now()).unwrap();
        assert_eq!(outcome.newly_completed.map(|r| r.dan_number), Some(1));
        let stored = tablet_repo.read_user_rank_state("aiko").unwrap();
        assert_eq!(stored.value.completions.len(), 1);
        assert_eq!(stored.version, outcome.version);
    }

    #[test]
    fn promotion_then_sync_resets_history() {
        let conn = memory_db();
        let repo = MemberRepo::new(&conn);
        repo.register("aiko", BeltColor::White).unwrap();
        repo.override_check_ins("aiko", 45).unwrap();
        synchronize(&repo, "aiko", &SyncOptions::default(), Utc::now()).unwrap();
        assert!(repo.read_user_rank_state("aiko").unwrap().value.has_completion(1));

        assert_eq!(repo.change_belt("aiko", BeltColor::Blue).unwrap(), BeltColor::White);
        repo.override_check_ins("aiko", 0).unwrap();
        let outcome = synchronize(&repo, "aiko", &SyncOptions::default(), Utc::now()).unwrap();
        assert!(outcome.belt_changed);
        assert!(outcome.newly_completed.is_none());

        let stored = repo.read_user_rank_state("aiko").unwrap().value;
        assert!(stored.completions.is_empty());
        assert_eq!(stored.previous_belt, Some(BeltColor::Blue));
    }

    #[test]
    fn override_past_two_groups_records_both_dans() {
        let conn = memory_db();
        let repo = MemberRepo::new(&conn);
        repo.register("aiko", BeltColor::Blue).unwrap();
        repo.override_check_ins("aiko", 125).unwrap();

        let outcome = synchronize(&repo, "aiko", &SyncOptions::default(), Utc::now()).unwrap();
        assert_eq!(outcome.newly_completed.map(|r| r.dan_number), Some(2));

        let stored = repo.read_user_rank_state("aiko").unwrap().value;
        assert!(stored.has_completion(1));
        assert!(stored.has_completion(2));
        assert!(!stored.has_completion(3));
        assert!(stored.completions.iter().all(|c| c.group_size == 60));
    }

    #[test]
    fn mixed_case_previous_belt_is_not_a_belt_change() {
        let conn = memory_db();
        let earned = "2026-01-05T10:00:00+00:00";
        conn.execute(
            "INSERT INTO members (user_id, belt, previous_belt, cumulative_check_ins, version)
             VALUES ('ren', 'white', 'WHITE', 45, 3)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO dan_completions (user_id, dan_number, group_size, count, completed_on)
             VALUES ('ren', 1, 40, 40, ?1)",
            params![earned],
        )
        .unwrap();
        let repo = MemberRepo::new(&conn);

        let outcome = synchronize(&repo, "ren", &SyncOptions::default(), Utc::now()).unwrap();
        assert!(!outcome.wrote);
        assert!(!outcome.belt_changed);
        assert!(outcome.newly_completed.is_none());

        let stored = repo.read_user_rank_state("ren").unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(stored.value.completions.len(), 1);
        assert_eq!(
            stored.value.completions[0].completed_on,
            parse_timestamp(earned).unwrap()
        );
    }

    #[test]
    fn read_sees_row_and_completions_from_one_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dojo.db");
        let phone = open(&path, Duration::from_millis(500)).unwrap();
        let tablet = open(&path, Duration::from_millis(500)).unwrap();
        let phone_repo = MemberRepo::new(&phone);

        phone_repo.register("aiko", BeltColor::White).unwrap();
        phone_repo.override_check_ins("aiko", 40).unwrap();
        let before = phone_repo.read_user_rank_state("aiko").unwrap();

        let tx = rusqlite::Transaction::new_unchecked(&tablet, TransactionBehavior::Immediate)
            .unwrap();
        tx.execute(
            "UPDATE members SET previous_belt = 'white', version = version + 1
             WHERE user_id = 'aiko'",
            [],
        )
        .unwrap();
        tx.execute(
            "INSERT INTO dan_completions (user_id, dan_number, group_size, count, completed_on)
             VALUES ('aiko', 1, 40, 40, ?1)",
            params![Utc::now().to_rfc3339()],
        )
        .unwrap();

        let during = phone_repo.read_user_rank_state("aiko").unwrap();
        assert_eq!(during.version, before.version);
        assert!(during.value.completions.is_empty());
        assert_eq!(during.value.previous_belt, None);

        tx.commit().unwrap();

        let after = phone_repo.read_user_rank_state("aiko").unwrap();
        assert_eq!(after.version, before.version + 1);
        assert!(after.value.has_completion(1));
        assert_eq!(after.value.previous_belt, Some(BeltColor::White));
    }

    #[test]
    fn coerce_handles_every_storage_class() {
        assert_eq!(coerce_check_ins(Value::Integer(7)), 7);
        assert_eq!(coerce_check_ins(Value::Integer(-7)), 0);
        assert_eq!(coerce_check_ins(Value::Real(12.9)), 12);
        assert_eq!(coerce_check_ins(Value::Text(" 41 ".into())), 41);
        assert_eq!(coerce_check_ins(Value::Text("abc".into())), 0);
        assert_eq!(coerce_check_ins(Value::Null), 0);
    }
}
