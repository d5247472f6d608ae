//! The facade a driver talks to: one `Model::step` call per UI snapshot,
//! wiring together the rewrite pass, the state-action graph, and a
//! per-device agent into the single `Operation` that crosses back out.

mod model;

pub use model::Model;
