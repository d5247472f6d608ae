//! Per-device policy: state/action window, priority adjustment, the
//! layered selection strategy, and the N-step (Double-)SARSA update.
//! Grounded on `AbstractAgent.h/.cpp`, `ModelReusableAgent.h/.cpp` and
//! `DoubleSarsaAgent.h/.cpp` from the retrieved original source. The
//! original's class hierarchy (`AbstractAgent` base, two concrete
//! subclasses overriding a handful of virtuals) collapses here into one
//! `Agent` struct plus an `AgentKind` tag: the two subclasses differ only
//! in how many Q-functions they read/write and whether the bootstrap
//! value comes from the same or the other one, which is cheaper to
//! express as a branch than as a trait object.

use std::collections::{HashSet, VecDeque};

use rand::Rng;

use fastbot_core::{Action, ActionFilter, Graph, State};

use crate::reuse_model::ReuseModel;

const HISTORY_LEN: usize = 5;
const GAMMA: f64 = 0.8;
const ENTROPY_ALPHA: f64 = 0.1;
const EPSILON: f64 = 0.1;
/// Below this, a computed reuse-model probability is treated as "no signal"
/// rather than "genuinely zero", whether because the action has never been
/// recorded or because every activity it used to reach is now visited.
const REWARD_EPSILON: f64 = 1e-6;
const NEW_ACTION_REWARD: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentKind {
    /// Single Q-function, N-step SARSA.
    Reuse,
    /// Two Q-functions updated by independent coin flips, each
    /// bootstrapped from the other.
    DoubleSarsa,
}

/// A still-to-be-executed or already-executed action, addressed by the
/// state it belongs to plus its index in that state's action list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionSlot {
    pub state_hash: u64,
    pub index: usize,
}

#[derive(Clone, Copy, Debug)]
struct HistoryStep {
    slot: ActionSlot,
    reward: f64,
}

pub struct Agent {
    kind: AgentKind,
    last_state: Option<u64>,
    current_state: Option<u64>,
    new_state: Option<u64>,
    current_action: Option<ActionSlot>,
    new_action: Option<ActionSlot>,
    current_state_block_times: u32,
    block_threshold: u32,
    reuse_model: ReuseModel,
    history: VecDeque<HistoryStep>,
}

impl Agent {
    pub fn new(kind: AgentKind) -> Self {
        Agent {
            kind,
            last_state: None,
            current_state: None,
            new_state: None,
            current_action: None,
            new_action: None,
            current_state_block_times: 0,
            block_threshold: 20,
            reuse_model: ReuseModel::new(),
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn with_reuse_model(kind: AgentKind, reuse_model: ReuseModel) -> Self {
        Agent { reuse_model, ..Self::new(kind) }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn reuse_model(&self) -> &ReuseModel {
        &self.reuse_model
    }

    pub fn set_block_threshold(&mut self, threshold: u32) {
        self.block_threshold = threshold;
    }

    pub fn current_state_block_times(&self) -> u32 {
        self.current_state_block_times
    }

    /// Called right after `graph.add_state` resolves a state, whether it
    /// was new or a repeat. Tracks how long the walk has been stuck on
    /// the same state so the driver can force a restart.
    pub fn observe_new_state(&mut self, hash: u64) {
        if self.current_state == Some(hash) {
            self.current_state_block_times += 1;
        } else {
            self.current_state_block_times = 0;
        }
        self.new_state = Some(hash);
    }

    pub fn reset_block_counter(&mut self) {
        self.current_state_block_times = 0;
    }

    /// Runs the six-layer selection strategy against `new_state` and
    /// records the chosen action as `new_action`. Must run after
    /// `observe_new_state` and before `update_strategy`.
    pub fn resolve_new_action(&mut self, graph: &mut Graph, rng: &mut impl Rng) -> Option<ActionSlot> {
        let hash = self.new_state?;
        {
            let state = graph.state_mut(hash)?;
            adjust_actions(state);
        }
        let use_q1 = match self.kind {
            AgentKind::Reuse => true,
            AgentKind::DoubleSarsa => rng.gen_bool(0.5),
        };

        let slot = {
            let state = graph.state(hash)?;
            let visited = graph.visited_activities();
            select_layer1(state, &self.reuse_model, rng)
                .or_else(|| select_layer2(state, &self.reuse_model, visited, rng))
                .or_else(|| state.random_pick_unvisited())
                .or_else(|| select_layer4(state, &self.reuse_model, visited, use_q1, rng))
                .or_else(|| select_layer5(state, use_q1, rng))
                .or_else(|| state.random_pick(&fastbot_core::filter::ValidDatePriorityFilter, true))
                .map(|index| ActionSlot { state_hash: hash, index })
        };
        self.new_action = slot;
        slot
    }

    /// Reward/Q-update for the transition `current_state --current_action-->
    /// new_state`, bootstrapped from the just-selected `new_action`. Must
    /// run after `resolve_new_action` and before `move_forward`.
    pub fn update_strategy(&mut self, graph: &mut Graph, rng: &mut impl Rng) {
        let (Some(current_slot), Some(new_hash)) = (self.current_action, self.new_state) else {
            self.update_reuse_model(graph);
            return;
        };
        let visited = graph.visited_activities().clone();
        let Some(current_action) = get_action(graph, &current_slot).cloned() else {
            return;
        };
        let Some(new_state) = graph.state(new_hash) else {
            return;
        };

        let raw_first = self.reuse_model.p_new_activity(current_action.hash(), &visited);
        let raw_first = if raw_first.abs() < REWARD_EPSILON { NEW_ACTION_REWARD } else { raw_first };
        let first_term = raw_first / (1.0 + current_action.visit_count as f64).sqrt();
        let new_visits = graph.state_visit_count(new_hash);
        let second_term = state_expectation(new_state, &self.reuse_model, &visited) / (1.0 + new_visits as f64).sqrt();
        let reward = first_term + second_term;

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(HistoryStep { slot: current_slot, reward });

        self.n_step_update(graph, rng);
        self.update_reuse_model(graph);
    }

    fn update_reuse_model(&mut self, graph: &Graph) {
        let (Some(current_slot), Some(new_hash)) = (self.current_action, self.new_state) else {
            return;
        };
        if let Some(action) = get_action(graph, &current_slot) {
            if action.action_type.is_model_act() {
                if let Some(new_state) = graph.state(new_hash) {
                    self.reuse_model.record(action.hash(), &new_state.activity);
                }
            }
        }
    }

    /// Independent per-step N-step return with a fresh coin flip (for
    /// `DoubleSarsa`) at every history index: each action in the window
    /// independently picks which Q-function it updates and bootstraps
    /// from the other one, rather than one coin flip governing the whole
    /// window.
    fn n_step_update(&self, graph: &mut Graph, rng: &mut impl Rng) {
        let alpha = crate::alpha::decay(graph.total_distribution());
        let k = self.history.len();
        let steps: Vec<HistoryStep> = self.history.iter().copied().collect();

        for i in 0..k {
            let use_q1 = match self.kind {
                AgentKind::Reuse => true,
                AgentKind::DoubleSarsa => rng.gen_bool(0.5),
            };
            let bootstrap_use_q1 = match self.kind {
                AgentKind::Reuse => true,
                AgentKind::DoubleSarsa => !use_q1,
            };
            let bootstrap = self
                .new_action
                .map(|slot| get_q(graph, &slot, bootstrap_use_q1))
                .unwrap_or(0.0);

            let mut g = bootstrap;
            for j in (i..k).rev() {
                g = steps[j].reward + GAMMA * g;
            }

            let current_q = get_q(graph, &steps[i].slot, use_q1);
            let updated = current_q + alpha * (g - current_q);
            set_q(graph, &steps[i].slot, use_q1, updated);
        }
    }

    /// Shifts the three-slot state/action window by one step: `last`
    /// becomes the outgoing `current`, `current` becomes the just-observed
    /// `new_state`/`new_action`, and `new` is cleared for the next round.
    pub fn move_forward(&mut self) {
        self.last_state = self.current_state;
        self.current_state = self.new_state;
        self.current_action = self.new_action;
        self.new_state = None;
        self.new_action = None;
    }

    pub fn last_state(&self) -> Option<u64> {
        self.last_state
    }

    pub fn current_state(&self) -> Option<u64> {
        self.current_state
    }
}

fn get_action<'a>(graph: &'a Graph, slot: &ActionSlot) -> Option<&'a Action> {
    graph.state(slot.state_hash)?.actions.get(slot.index)
}

fn get_q(graph: &Graph, slot: &ActionSlot, use_q1: bool) -> f64 {
    get_action(graph, slot).map(|a| a.q(use_q1)).unwrap_or(0.0)
}

fn set_q(graph: &mut Graph, slot: &ActionSlot, use_q1: bool, value: f64) {
    if let Some(state) = graph.state_mut(slot.state_hash) {
        if let Some(action) = state.actions.get_mut(slot.index) {
            action.set_q(use_q1, value);
        }
    }
}

/// Adjusts every action's priority in place per the per-state rule:
/// actions with no target get a flat unvisited bonus; target-bearing
/// actions get an unvisited bonus and an unsaturated bonus scaled by
/// their own base priority, clamped at zero. Invalid (empty-bounds
/// target) actions are left untouched.
///
/// The per-action increments also sum into a state-level total priority
/// upstream, but nothing ever reads that total back, so it's write-only
/// bookkeeping and isn't reproduced here.
fn adjust_actions(state: &mut State) {
    let widgets = state.widgets.clone();
    let saturated: Vec<bool> = state.actions.iter().map(|a| state.is_saturated(a)).collect();
    for (action, is_saturated) in state.actions.iter_mut().zip(saturated) {
        let base = action.action_type.base_priority();
        if !action.action_type.requires_target() {
            action.priority = if action.visited { base } else { base + 5 };
            continue;
        }
        if !fastbot_core::action::is_valid(action, &widgets) {
            continue;
        }
        let mut adjusted = base;
        if !action.visited {
            adjusted += 20;
        }
        if !is_saturated {
            adjusted += 5 * base;
        }
        if adjusted < 0 {
            adjusted = 0;
        }
        action.priority = adjusted;
    }
}

fn state_expectation(state: &State, reuse: &ReuseModel, visited: &HashSet<String>) -> f64 {
    let mut total = 0.0;
    for action in &state.actions {
        if !reuse.contains(action.hash()) {
            total += 1.0;
        } else if action.visited {
            total += 0.5;
        }
    }
    for action in &state.actions {
        if action.action_type.requires_target() {
            total += reuse.p_new_activity(action.hash(), visited);
        }
    }
    total
}

/// `(0, 1]`, never `0`, so the Gumbel transform below never takes `ln(0)`.
fn open_unit_interval(rng: &mut impl Rng) -> f64 {
    1.0 - rng.gen::<f64>()
}

fn gumbel_perturb(q: f64, rng: &mut impl Rng) -> f64 {
    let u = open_unit_interval(rng);
    q - (-(u.ln())).ln()
}

struct UnperformedNotInReuseFilter<'a> {
    reuse: &'a ReuseModel,
}
impl ActionFilter for UnperformedNotInReuseFilter<'_> {
    fn include(&self, _state: &State, action: &Action) -> bool {
        action.action_type.is_model_act() && action.visit_count == 0 && !self.reuse.contains(action.hash())
    }
}

/// Layer 1: weighted-random pick among actions never performed anywhere
/// in the reuse model, so genuinely novel gestures get tried first.
fn select_layer1(state: &State, reuse: &ReuseModel, _rng: &mut impl Rng) -> Option<usize> {
    let filter = UnperformedNotInReuseFilter { reuse };
    state.random_pick(&filter, true)
}

/// Layer 2: among unperformed, reuse-model-known target actions, argmax a
/// Gumbel-perturbed score proportional to how often that action led
/// somewhere new.
fn select_layer2(state: &State, reuse: &ReuseModel, visited: &HashSet<String>, rng: &mut impl Rng) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, action) in state.actions.iter().enumerate() {
        if !action.action_type.requires_target() || action.visited {
            continue;
        }
        if !reuse.contains(action.hash()) {
            continue;
        }
        let p = reuse.p_new_activity(action.hash(), visited);
        let q = gumbel_perturb(10.0 * p, rng);
        if q > 1e-4 && best.map(|(_, bq)| q > bq).unwrap_or(true) {
            best = Some((i, q));
        }
    }
    best.map(|(i, _)| i)
}

/// Layer 4: return the first still-unexplored action immediately
/// (pure exploration); otherwise argmax a Gumbel-perturbed Q/reuse score.
fn select_layer4(state: &State, reuse: &ReuseModel, visited: &HashSet<String>, use_q1: bool, rng: &mut impl Rng) -> Option<usize> {
    for (i, action) in state.actions.iter().enumerate() {
        if !action.visited && !reuse.contains(action.hash()) {
            return Some(i);
        }
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, action) in state.actions.iter().enumerate() {
        let raw = if !action.visited && reuse.contains(action.hash()) {
            reuse.p_new_activity(action.hash(), visited)
        } else {
            action.q(use_q1)
        };
        let q = gumbel_perturb(raw / ENTROPY_ALPHA, rng);
        if best.map(|(_, bq)| q > bq).unwrap_or(true) {
            best = Some((i, q));
        }
    }
    best.map(|(i, _)| i)
}

/// Layer 5: epsilon-greedy over Q-weighted priority.
fn select_layer5(state: &State, use_q1: bool, rng: &mut impl Rng) -> Option<usize> {
    let filter = fastbot_core::filter::ValidValuePriorityFilter { use_q1 };
    if rng.gen_bool(1.0 - EPSILON) {
        state.greedy_pick_max_q(&filter)
    } else {
        state.random_pick(&filter, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastbot_core::element::ElementTree;
    use fastbot_core::rect::Rect;

    fn button_state(activity: &str) -> State {
        let mut tree = ElementTree::new();
        let id = tree.push(None);
        let n = tree.get_mut(id);
        n.class_name = "android.widget.Button".into();
        n.clickable = true;
        n.enabled = true;
        n.bounds = Rect::new(0, 0, 10, 10);
        State::build(&tree, activity)
    }

    #[test]
    fn move_forward_shifts_the_window() {
        let mut agent = Agent::new(AgentKind::Reuse);
        agent.observe_new_state(1);
        agent.new_action = Some(ActionSlot { state_hash: 1, index: 0 });
        agent.move_forward();
        assert_eq!(agent.current_state(), Some(1));
        assert_eq!(agent.new_state, None);

        agent.observe_new_state(2);
        agent.new_action = Some(ActionSlot { state_hash: 2, index: 0 });
        agent.move_forward();
        assert_eq!(agent.last_state(), Some(1));
        assert_eq!(agent.current_state(), Some(2));
    }

    #[test]
    fn block_counter_increments_only_on_repeat() {
        let mut agent = Agent::new(AgentKind::Reuse);
        agent.observe_new_state(1);
        agent.move_forward();
        agent.observe_new_state(1);
        assert_eq!(agent.current_state_block_times(), 1);
        agent.observe_new_state(1);
        assert_eq!(agent.current_state_block_times(), 2);
        agent.move_forward();
        agent.observe_new_state(9);
        assert_eq!(agent.current_state_block_times(), 0);
    }

    #[test]
    fn resolve_new_action_picks_something_on_a_fresh_state() {
        let mut graph = Graph::new();
        let hash = graph.add_state(button_state("com.example/.Main"));
        let mut agent = Agent::new(AgentKind::DoubleSarsa);
        agent.observe_new_state(hash);
        let mut rng = rand::thread_rng();
        let slot = agent.resolve_new_action(&mut graph, &mut rng);
        assert!(slot.is_some());
    }

    #[test]
    fn update_strategy_is_a_no_op_without_a_current_action() {
        let mut graph = Graph::new();
        let hash = graph.add_state(button_state("com.example/.Main"));
        let mut agent = Agent::new(AgentKind::Reuse);
        agent.observe_new_state(hash);
        let mut rng = rand::thread_rng();
        agent.resolve_new_action(&mut graph, &mut rng);
        agent.update_strategy(&mut graph, &mut rng);
        assert!(agent.history.is_empty());
    }

    #[test]
    fn update_strategy_records_a_reward_after_one_full_round() {
        let mut graph = Graph::new();
        let h1 = graph.add_state(button_state("com.example/.Main"));
        let mut agent = Agent::new(AgentKind::Reuse);
        let mut rng = rand::thread_rng();

        agent.observe_new_state(h1);
        agent.resolve_new_action(&mut graph, &mut rng);
        agent.move_forward();

        let h2 = graph.add_state(button_state("com.example/.Other"));
        agent.observe_new_state(h2);
        agent.resolve_new_action(&mut graph, &mut rng);
        agent.update_strategy(&mut graph, &mut rng);

        assert_eq!(agent.history.len(), 1);
    }
}
