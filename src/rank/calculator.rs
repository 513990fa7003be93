use crate::models::{BeltColor, RankProgress, UserRankState, BELT_DAN_LEVELS};

/// Derive Dan progress from a belt and a lifetime check-in count.
///
/// Negative counts are treated as zero. Past the fourth group the Dan stays
/// capped at 4 while `count_in_group` keeps cycling through the group.
pub fn compute_rank_progress(belt: BeltColor, cumulative_check_ins: i64) -> RankProgress {
    let check_ins = cumulative_check_ins.max(0) as u64;
    let group_size = belt.group_size();
    let size = group_size as u64;

    let group_index = check_ins / size;
    let current_dan = group_index
        .saturating_add(1)
        .min(BELT_DAN_LEVELS as u64) as u8;

    let remainder = (check_ins % size) as u32;
    let count_in_group = if remainder == 0 && check_ins > 0 {
        group_size
    } else {
        remainder
    };

    RankProgress {
        group_index,
        current_dan,
        group_size,
        count_in_group,
    }
}

pub fn compute_for_state(state: &UserRankState) -> RankProgress {
    compute_rank_progress(state.belt, state.cumulative_check_ins)
}
