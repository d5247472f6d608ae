//! The exploration policy: per-device state/action windows, the layered
//! selection strategy, N-step (Double-)SARSA updates, and the persisted
//! reuse model that steers exploration toward historically novel
//! activities.

pub mod agent;
pub mod alpha;
pub mod error;
pub mod persist;
pub mod reuse_model;

pub use agent::{Agent, AgentKind, ActionSlot};
pub use error::PersistenceError;
pub use reuse_model::ReuseModel;
