//! Deduplicated state-action store, grounded on `Graph.h`/`Graph.cpp` from
//! the retrieved original source. States are keyed by their own hash in a
//! `HashMap` rather than a `std::set` + `Comparator`; listener callbacks
//! are threaded through via `mem::take` so the borrow checker sees no
//! aliasing between `self.listeners` and the state reference handed to
//! each listener.

use std::collections::{HashMap, HashSet};
use std::mem;

use crate::action::ActionType;
use crate::state::State;

pub const ACTION_TYPE_COUNT: usize = 16;

/// Per-action-type visit counter plus running total, used to assign
/// stable action ids.
#[derive(Default)]
struct ActionCounter {
    by_type: [u64; ACTION_TYPE_COUNT],
    total: u64,
}

impl ActionCounter {
    fn count(&mut self, action_type: ActionType) {
        self.by_type[action_type as usize] += 1;
        self.total += 1;
    }
}

/// Implemented by anything that needs to react when a (new or
/// pre-existing) state reaches the graph — the agent's state-window
/// update, primarily.
pub trait GraphListener {
    fn on_add_node(&mut self, state: &State);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ActivityDistribution {
    pub count: u64,
    pub share: f64,
}

pub struct Graph {
    states: HashMap<u64, State>,
    state_order: Vec<u64>,
    visited_activities: HashSet<String>,
    activity_distribution: HashMap<String, ActivityDistribution>,
    activity_state_count: HashMap<String, usize>,
    total_distribution: u64,
    action_ids: HashMap<u64, u64>,
    visited_action_hashes: HashSet<u64>,
    action_counter: ActionCounter,
    listeners: Vec<Box<dyn GraphListener>>,
    timestamp: u64,
    state_visits: HashMap<u64, u32>,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            states: HashMap::new(),
            state_order: Vec::new(),
            visited_activities: HashSet::new(),
            activity_distribution: HashMap::new(),
            activity_state_count: HashMap::new(),
            total_distribution: 0,
            action_ids: HashMap::new(),
            visited_action_hashes: HashSet::new(),
            action_counter: ActionCounter::default(),
            listeners: Vec::new(),
            timestamp: 0,
            state_visits: HashMap::new(),
        }
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn total_distribution(&self) -> u64 {
        self.total_distribution
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn visited_activities(&self) -> &HashSet<String> {
        &self.visited_activities
    }

    pub fn activity_distribution(&self) -> &HashMap<String, ActivityDistribution> {
        &self.activity_distribution
    }

    /// States in insertion order, for drivers that want to replay or dump
    /// the graph deterministically.
    pub fn ordered_state_hashes(&self) -> &[u64] {
        &self.state_order
    }

    pub fn state_count_by_activity(&self, activity: &str) -> usize {
        self.activity_state_count.get(activity).copied().unwrap_or(0)
    }

    pub fn add_listener(&mut self, listener: Box<dyn GraphListener>) {
        self.listeners.push(listener);
    }

    pub fn state(&self, hash: u64) -> Option<&State> {
        self.states.get(&hash)
    }

    pub fn state_mut(&mut self, hash: u64) -> Option<&mut State> {
        self.states.get_mut(&hash)
    }

    /// Deduplicate by hash, fan out listener notifications synchronously,
    /// update per-activity statistics and action visited/unvisited
    /// partitions. Returns the canonical state's hash: a pre-existing
    /// entry if one matched, otherwise the hash of the state just
    /// inserted.
    pub fn add_state(&mut self, mut state: State) -> u64 {
        let hash = state.hash();
        let activity = state.activity.clone();
        *self.state_visits.entry(hash).or_insert(0) += 1;

        if let Some(existing) = self.states.get_mut(&hash) {
            if existing.has_no_detail() {
                existing.fill_details(&state);
            }
        } else {
            self.state_order.push(hash);
            *self.activity_state_count.entry(activity.clone()).or_insert(0) += 1;
            self.index_actions(&mut state);
            self.states.insert(hash, state);
        }

        self.timestamp += 1;

        let mut listeners = mem::take(&mut self.listeners);
        if let Some(canonical) = self.states.get(&hash) {
            for listener in listeners.iter_mut() {
                listener.on_add_node(canonical);
            }
        }
        self.listeners = listeners;

        self.visited_activities.insert(activity.clone());
        self.total_distribution += 1;
        let entry = self.activity_distribution.entry(activity).or_default();
        entry.count += 1;
        entry.share = entry.count as f64 / self.total_distribution as f64;

        hash
    }

    fn index_actions(&mut self, state: &mut State) {
        for action in state.actions.iter_mut() {
            let ah = action.hash();
            let id = match self.action_ids.get(&ah) {
                Some(&id) => id,
                None => {
                    let id = self.action_counter.total;
                    self.action_counter.count(action.action_type);
                    self.action_ids.insert(ah, id);
                    id
                }
            };
            action.set_id(id);
            if action.visited {
                self.visited_action_hashes.insert(ah);
            }
        }
    }

    pub fn is_action_visited(&self, action_hash: u64) -> bool {
        self.visited_action_hashes.contains(&action_hash)
    }

    /// Number of times `add_state` has resolved to this hash, new or not.
    pub fn state_visit_count(&self, hash: u64) -> u32 {
        self.state_visits.get(&hash).copied().unwrap_or(0)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementTree;
    use crate::rect::Rect;

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
    fn identical_states_merge_to_one() {
        let mut g = Graph::new();
        let s1 = button_state("com.example/.Main");
        let s2 = button_state("com.example/.Main");
        let h1 = g.add_state(s1);
        let h2 = g.add_state(s2);
        assert_eq!(h1, h2);
        assert_eq!(g.state_count(), 1);
    }

    #[test]
    fn activity_shares_sum_to_one() {
        let mut g = Graph::new();
        for _ in 0..3 {
            let mut tree = ElementTree::new();
            let id = tree.push(None);
            tree.get_mut(id).class_name = format!("X{}", rand_suffix()).into();
            tree.get_mut(id).clickable = true;
            tree.get_mut(id).bounds = crate::rect::Rect::new(0, 0, 1, 1);
            let s = State::build(&tree, "A");
            g.add_state(s);
        }
        let mut tree = ElementTree::new();
        let id = tree.push(None);
        tree.get_mut(id).class_name = "Other".into();
        tree.get_mut(id).clickable = true;
        tree.get_mut(id).bounds = crate::rect::Rect::new(0, 0, 1, 1);
        g.add_state(State::build(&tree, "B"));

        assert_eq!(g.total_distribution(), 4);
        let a = g.activity_distribution()["A"].share;
        let b = g.activity_distribution()["B"].share;
        assert!((a - 0.75).abs() < 1e-9);
        assert!((b - 0.25).abs() < 1e-9);
    }

    fn rand_suffix() -> u32 {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}
