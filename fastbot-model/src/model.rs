//! Per-step orchestration, grounded on `Model.h`/`Model.cpp` from the
//! retrieved original source. The original's `shared_ptr<Model>` singleton
//! plus a `shared_ptr<Graph>`/`Preference::inst()` pair collapses into one
//! plain owned struct: there is nothing here that needs to outlive a
//! single driver, so every field is owned outright instead of reference
//! counted.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;

use fastbot_agent::{Agent, AgentKind, PersistenceError, ReuseModel};
use fastbot_core::element::ElementTree;
use fastbot_core::state::WidgetOrder;
use fastbot_core::{ActionType, Graph, Operation, State, WidgetKeyMask};
use fastbot_pref::Preference;

const DEFAULT_BLOCK_THRESHOLD: u32 = 20;

pub struct Model {
    graph: Graph,
    preference: Preference,
    agents: HashMap<String, Agent>,
    default_agent_kind: AgentKind,
    block_threshold: u32,
    key_masks: HashMap<String, WidgetKeyMask>,
    drop_details_after_step: bool,
}

impl Model {
    pub fn new(preference: Preference) -> Self {
        Model {
            graph: Graph::new(),
            preference,
            agents: HashMap::new(),
            default_agent_kind: AgentKind::DoubleSarsa,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            key_masks: HashMap::new(),
            drop_details_after_step: true,
        }
    }

    pub fn with_default_agent_kind(mut self, kind: AgentKind) -> Self {
        self.default_agent_kind = kind;
        self
    }

    pub fn with_block_threshold(mut self, threshold: u32) -> Self {
        self.block_threshold = threshold;
        self
    }

    /// Memory optimization carried from the original's `DROP_DETAIL_AFTER_SATE`
    /// compile-time flag, turned into a runtime toggle: once an `Operation`
    /// has been emitted for a state, its widget text/class/resource-id/
    /// content-desc fields are no longer needed (the hash and action list
    /// already captured everything the agent reasons about).
    pub fn with_drop_details_after_step(mut self, drop: bool) -> Self {
        self.drop_details_after_step = drop;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn agent(&self, device_id: &str) -> Option<&Agent> {
        self.agents.get(device_id)
    }

    /// Dynamic-abstraction mask used when building every `State` for this
    /// activity; defaults to the always-include-text, never-include-index
    /// mask if never set.
    pub fn set_activity_key_mask(&mut self, activity: &str, mask: WidgetKeyMask) {
        self.key_masks.insert(activity.to_string(), mask);
    }

    pub fn get_activity_key_mask(&self, activity: &str) -> WidgetKeyMask {
        self.key_masks.get(activity).copied().unwrap_or_default()
    }

    pub fn save_reuse_model(&self, device_id: &str, path: &Path) -> Result<(), PersistenceError> {
        match self.agents.get(device_id) {
            Some(agent) => agent.reuse_model().save(path),
            None => Ok(()),
        }
    }

    /// Creates the device's agent (with `kind`) from a previously saved
    /// reuse model if one doesn't exist yet; a no-op if the device already
    /// has an agent, since loading into a live agent would discard
    /// whatever it has already learned this run.
    pub fn load_reuse_model(&mut self, device_id: &str, kind: AgentKind, path: &Path) -> Result<(), PersistenceError> {
        if self.agents.contains_key(device_id) {
            return Ok(());
        }
        let reuse_model = ReuseModel::load(path)?;
        let mut agent = Agent::with_reuse_model(kind, reuse_model);
        agent.set_block_threshold(self.block_threshold);
        self.agents.insert(device_id.to_string(), agent);
        Ok(())
    }

    /// One exploration step: rewrite `tree` in place, fold it into the
    /// graph, pick (or replay, or force-restart) an action, and return the
    /// `Operation` a driver should execute. Ordering follows the original's
    /// `getOperateOpt`: custom-action lookup and state construction happen
    /// unconditionally before the custom/blocked/model-driven branch picks
    /// what actually gets returned, so the graph keeps growing even while a
    /// scripted custom-event sequence or a forced restart is in flight.
    pub fn step(&mut self, device_id: &str, tree: &mut ElementTree, activity: &str, rng: &mut impl Rng) -> Operation {
        let custom = self.preference.try_custom_action(activity, tree, rng);

        self.preference.rewrite(tree, activity);

        if !self.agents.contains_key(device_id) {
            tracing::debug!(device_id, kind = ?self.default_agent_kind, "creating agent for new device");
            let mut agent = Agent::new(self.default_agent_kind);
            agent.set_block_threshold(self.block_threshold);
            self.agents.insert(device_id.to_string(), agent);
        }

        let mask = self.get_activity_key_mask(activity);
        let state = State::build_with_mask(tree, activity, &mask, WidgetOrder::Unordered);
        let hash = self.graph.add_state(state);

        let agent = self.agents.get_mut(device_id).expect("agent inserted above");
        agent.observe_new_state(hash);

        let op = if let Some(queued) = custom {
            tracing::debug!(device_id, activity, "following custom action");
            let mut op = Operation::new(queued.action_type, hash.to_string(), 0);
            if let Some(bounds) = queued.bounds {
                op = op.with_pos(bounds);
            }
            op
        } else if agent.current_state_block_times() > self.block_threshold {
            tracing::debug!(device_id, activity, block_times = agent.current_state_block_times(), "forcing restart");
            agent.reset_block_counter();
            Operation::new(ActionType::Restart, hash.to_string(), 0)
        } else {
            let slot = agent.resolve_new_action(&mut self.graph, rng);
            agent.update_strategy(&mut self.graph, rng);
            match slot {
                Some(slot) => {
                    if let Some(state) = self.graph.state_mut(slot.state_hash) {
                        if let Some(action) = state.actions.get_mut(slot.index) {
                            if action.action_type.is_model_act() {
                                action.record_visit();
                            }
                        }
                    }
                    agent.move_forward();
                    build_operation(&self.graph, slot)
                }
                None => {
                    tracing::warn!(device_id, activity, "agent resolved no action at all");
                    Operation::nop()
                }
            }
        };

        self.finish_operation(hash, op, rng)
    }

    fn finish_operation(&mut self, hash: u64, mut op: Operation, rng: &mut impl Rng) -> Operation {
        self.preference.patch_operate(&mut op, rng);
        if self.drop_details_after_step {
            if let Some(state) = self.graph.state_mut(hash) {
                if !state.has_no_detail() {
                    state.clear_details();
                }
            }
        }
        op
    }
}

fn build_operation(graph: &Graph, slot: fastbot_agent::ActionSlot) -> Operation {
    let Some(state) = graph.state(slot.state_hash) else {
        return Operation::nop();
    };
    let Some(action) = state.actions.get(slot.index) else {
        return Operation::nop();
    };

    let mut op = Operation::new(action.action_type, slot.state_hash.to_string(), action.id());
    if let Some(bounds) = state.resolved_bounds(slot.index) {
        op = op.with_pos(bounds);
    }
    let editable = action
        .target
        .and_then(|idx| state.widgets.get(idx))
        .map(|w| w.editable)
        .unwrap_or(false);
    op.with_editable(editable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastbot_core::rect::Rect;

    fn button_tree() -> ElementTree {
        let mut tree = ElementTree::new();
        let id = tree.push(None);
        let n = tree.get_mut(id);
        n.class_name = "android.widget.Button".into();
        n.clickable = true;
        n.enabled = true;
        n.bounds = Rect::new(0, 0, 100, 100);
        n.text = "Go".into();
        tree
    }

    #[test]
    fn step_grows_the_graph_and_returns_an_operation() {
        let mut model = Model::new(Preference::empty());
        let mut tree = button_tree();
        let mut rng = rand::thread_rng();

        let op = model.step("device-1", &mut tree, "com.example/.Main", &mut rng);
        assert!(!op.sid.is_empty());
        assert_eq!(model.graph().state_count(), 1);
        assert!(model.agent("device-1").is_some());
    }

    #[test]
    fn repeated_identical_snapshot_eventually_forces_a_restart() {
        let mut model = Model::new(Preference::empty()).with_block_threshold(2);
        let mut rng = rand::thread_rng();

        let mut saw_restart = false;
        for _ in 0..10 {
            let mut tree = button_tree();
            let op = model.step("device-1", &mut tree, "com.example/.Main", &mut rng);
            if op.act.0 == ActionType::Restart {
                saw_restart = true;
                break;
            }
        }
        assert!(saw_restart, "expected a forced restart after repeatedly landing on the same state");
    }

    #[test]
    fn per_activity_key_mask_is_stored_and_defaults_sensibly() {
        let mut model = Model::new(Preference::empty());
        assert!(model.get_activity_key_mask("com.example/.Main").include_text);
        let custom = WidgetKeyMask {
            include_text: false,
            include_content_desc: true,
            include_index: false,
            text_limit: 10,
        };
        model.set_activity_key_mask("com.example/.Main", custom);
        assert!(!model.get_activity_key_mask("com.example/.Main").include_text);
        assert!(model.get_activity_key_mask("com.example/.Other").include_text);
    }
}
