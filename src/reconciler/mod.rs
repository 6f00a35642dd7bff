//! Chain reconciliation
//!
//! - `state`: the target-chain state machine and its filters
//! - `debounce`: single-slot cancellable scheduled task
//! - `switch`: the switch / add-chain / confirm protocol against a session

pub mod debounce;
pub mod state;
pub mod switch;

pub use debounce::ScheduledTask;
pub use state::{ChainReconciler, Phase, Verdict};
pub use switch::{switch_to, SwitchError, SwitchOutcome, SwitchPolicy};
