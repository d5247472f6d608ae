//! The tree rewriter that runs before every `State` is built:
//! resource-id de-obfuscation, black-region removal, tree pruning,
//! valid-text marking, custom-action injection, and input-text patching.

pub mod config;
pub mod custom_events;
pub mod error;
pub mod patch;
pub mod preference;
pub mod rewrite;

pub use preference::Preference;
