use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::BeltColor;

/// Number of Dan levels inside a single belt.
pub const BELT_DAN_LEVELS: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub dan_number: u8,
    /// Group size in effect when the Dan was earned; kept so that history
    /// survives a later belt change.
    pub group_size: u32,
    pub count: u32,
    pub completed_on: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn new(dan_number: u8, group_size: u32, completed_on: DateTime<Utc>) -> Self {
        Self {
            dan_number,
            group_size,
            count: group_size,
            completed_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRankState {
    pub belt: BeltColor,
    pub previous_belt: Option<BeltColor>,
    pub cumulative_check_ins: i64,
    pub completions: Vec<CompletionRecord>,
}

impl UserRankState {
    /// State of a freshly registered member.
    pub fn new(belt: BeltColor) -> Self {
        Self {
            belt,
            previous_belt: None,
            cumulative_check_ins: 0,
            completions: vec![],
        }
    }

    pub fn has_completion(&self, dan_number: u8) -> bool {
        self.completions.iter().any(|c| c.dan_number == dan_number)
    }

    /// Completions earned under the current belt's group size.
    pub fn completions_for_current_belt(&self) -> Vec<&CompletionRecord> {
        let size = self.belt.group_size();
        self.completions
            .iter()
            .filter(|c| c.group_size == size)
            .collect()
    }

    /// Insert keeping `completions` unique by Dan and ordered. Returns false
    /// if the Dan was already recorded.
    pub fn push_completion(&mut self, record: CompletionRecord) -> bool {
        if self.has_completion(record.dan_number) {
            return false;
        }
        self.completions.push(record);
        self.completions.sort_by_key(|c| c.dan_number);
        true
    }

    pub fn apply(&mut self, update: &RankUpdate) {
        if let Some(belt) = update.belt {
            self.belt = belt;
        }
        if let Some(prev) = update.previous_belt {
            self.previous_belt = Some(prev);
        }
        if let Some(n) = update.cumulative_check_ins {
            self.cumulative_check_ins = n;
        }
        if let Some(completions) = &update.completions {
            self.completions = completions.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankProgress {
    pub group_index: u64,
    pub current_dan: u8,
    pub group_size: u32,
    pub count_in_group: u32,
}

impl RankProgress {
    pub fn dan_name(&self) -> &'static str {
        dan_name(self.current_dan)
    }

    /// Fill of the current group, in [0, 1].
    pub fn ratio(&self) -> f64 {
        if self.group_size == 0 {
            0.0
        } else {
            (self.count_in_group as f64 / self.group_size as f64).min(1.0)
        }
    }
}

pub fn dan_name(dan_number: u8) -> &'static str {
    match dan_number {
        1 => "First Dan",
        2 => "Second Dan",
        3 => "Third Dan",
        _ => "Fourth Dan",
    }
}

/// Partial update of a stored member record. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankUpdate {
    pub belt: Option<BeltColor>,
    pub previous_belt: Option<BeltColor>,
    pub cumulative_check_ins: Option<i64>,
    pub completions: Option<Vec<CompletionRecord>>,
}

impl RankUpdate {
    pub fn is_empty(&self) -> bool {
        self.belt.is_none()
            && self.previous_belt.is_none()
            && self.cumulative_check_ins.is_none()
            && self.completions.is_none()
    }
}

/// A stored value together with the record version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}
