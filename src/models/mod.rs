pub mod belt;
pub mod rank;

pub use belt::BeltColor;
pub use rank::{
    dan_name, CompletionRecord, RankProgress, RankUpdate, UserRankState, Versioned,
    BELT_DAN_LEVELS,
};
