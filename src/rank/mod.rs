pub mod calculator;
pub mod sync;

pub use calculator::compute_for_state;
pub use sync::{synchronize, SyncOptions};
