//! Interaction history: states, the per-episode chain, and the clock that
//! mints them.
//!
//! # Invariants
//!
//! - `episode_id` and `time_step` never decrease for one synchronization;
//!   `time_step` restarts at 1 after [`StateSynchronization::new_episode`].
//! - `state.is_final_state()` holds iff no successor is linked.
//! - Links are ids into the [`StateChain`], so pruning the chain releases
//!   history without touching the states that remain.

mod chain;
mod state;
mod synchronization;

pub use chain::{IterBack, StateChain};
pub use state::{EnvironmentSnapshot, State, StateId, StateKey};
pub use synchronization::{shared_synchronization, SharedStateSynchronization, StateSynchronization};
