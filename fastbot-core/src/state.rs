//! Canonical, hash-identified screen snapshot, grounded on `State.h`/
//! `State.cpp` from the retrieved original source. Widgets are addressed
//! by index into `State::widgets` rather than `shared_ptr<Widget>`: a
//! State owns its widgets outright (spec ownership rule), so a plain
//! `Vec` plus `usize` index captures the same relationship without
//! reference counting.

use std::collections::HashMap;

use rand::Rng;

use crate::action::{Action, ActionType};
use crate::element::{ElementTree, NodeId};
use crate::filter::ActionFilter;
use crate::hash::{combine_ordered, combine_unordered, hash_str};
use crate::rect::Rect;
use crate::widget::{Widget, WidgetKeyMask};

/// Whether widget-set and activity combination order into the state hash
/// matters. Ordered folds sort by hash first, per the composite-hash
/// invariant ("must first sort widgets by hash to ensure determinism").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetOrder {
    Unordered,
    Ordered,
}

pub struct State {
    pub activity: String,
    pub root_bounds: Rect,
    pub widgets: Vec<Widget>,
    pub actions: Vec<Action>,
    /// Extra physical widgets sharing a composite hash with the
    /// representative kept in `widgets`, keyed by that hash.
    pub duplicates: HashMap<u64, Vec<Widget>>,
    pub back_action_index: usize,
    has_no_detail: bool,
    hash: u64,
}

impl State {
    /// Build a State from a normalized Element tree and an interned
    /// activity name.
    pub fn build(tree: &ElementTree, activity: &str) -> Self {
        Self::build_with_mask(tree, activity, &WidgetKeyMask::default(), WidgetOrder::Unordered)
    }

    pub fn build_with_mask(
        tree: &ElementTree,
        activity: &str,
        mask: &WidgetKeyMask,
        order: WidgetOrder,
    ) -> Self {
        let root_bounds = tree.root().map(|r| tree.get(r).bounds).unwrap_or_default();

        let mut raw_widgets = Vec::new();
        if let Some(root) = tree.root() {
            collect_widgets(tree, root, &mut raw_widgets);
        }

        let mut seen: HashMap<u64, usize> = HashMap::new();
        let mut widgets: Vec<Widget> = Vec::new();
        let mut duplicates: HashMap<u64, Vec<Widget>> = HashMap::new();

        for mut w in raw_widgets {
            let h = w.hash(mask);
            match seen.get(&h) {
                None => {
                    seen.insert(h, widgets.len());
                    widgets.push(w);
                }
                Some(_) => {
                    duplicates.entry(h).or_default().push(w.clone());
                    w.invalidate();
                }
            }
        }

        if order == WidgetOrder::Ordered {
            widgets.sort_by_key(|w| w.clone().hash(mask));
        }

        let widget_hashes: Vec<u64> = widgets.iter().cloned().map(|mut w| w.hash(mask)).collect();
        let widget_combine = match order {
            WidgetOrder::Unordered => combine_unordered(widget_hashes),
            WidgetOrder::Ordered => combine_ordered(widget_hashes),
        };
        let activity_hash = hash_str(activity);
        let hash = crate::hash::state_composite(activity_hash, widget_combine);

        let mut actions = Vec::new();
        for (idx, w) in widgets.iter().cloned().enumerate() {
            let target_hash = {
                let mut w2 = w.clone();
                w2.hash(mask)
            };
            for op in w.actions() {
                let action_type = operate_to_action_type(op);
                actions.push(Action::new(action_type, Some(idx), hash, target_hash));
            }
        }
        actions.push(Action::new(ActionType::Back, None, hash, 1));
        let back_action_index = actions.len() - 1;

        State {
            activity: activity.to_string(),
            root_bounds,
            widgets,
            actions,
            duplicates,
            back_action_index,
            has_no_detail: false,
            hash,
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn back_action(&self) -> &Action {
        &self.actions[self.back_action_index]
    }

    fn duplicates_for(&self, action: &Action) -> usize {
        match action.target {
            None => 0,
            Some(idx) => {
                let h = self.widgets.get(idx).map(|w| w.clone()).and_then(|mut w| {
                    let mask = WidgetKeyMask::default();
                    Some(w.hash(&mask))
                });
                h.and_then(|h| self.duplicates.get(&h)).map(|v| v.len()).unwrap_or(0)
            }
        }
    }

    /// Open Question decision: `visit_count > duplicates.len()` (strict),
    /// matching the original's literal comparison rather than its comment.
    pub fn is_saturated(&self, action: &Action) -> bool {
        if !action.action_type.requires_target() {
            return action.visited;
        }
        match action.target {
            None => action.visit_count >= 1,
            Some(_) => action.visit_count as usize > self.duplicates_for(action),
        }
    }

    pub fn action_target_is_empty(&self, action: &Action) -> bool {
        match action.target {
            None => false,
            Some(idx) => self.widgets.get(idx).map(|w| w.bounds.is_empty()).unwrap_or(true),
        }
    }

    pub fn count_priority(&self, filter: &dyn ActionFilter, include_back: bool) -> i32 {
        let mut total = 0;
        for action in &self.actions {
            if !include_back && action.is_back() {
                continue;
            }
            if filter.include(self, action) {
                total += filter.priority(self, action);
            }
        }
        total
    }

    fn pick_at(&self, filter: &dyn ActionFilter, include_back: bool, mut index: i32) -> Option<usize> {
        for (i, action) in self.actions.iter().enumerate() {
            if !include_back && action.is_back() {
                continue;
            }
            if filter.include(self, action) {
                let p = filter.priority(self, action);
                if p > index {
                    return Some(i);
                }
                index -= p;
            }
        }
        None
    }

    pub fn random_pick(&self, filter: &dyn ActionFilter, include_back: bool) -> Option<usize> {
        let total = self.count_priority(filter, include_back);
        if total <= 0 {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..total);
        self.pick_at(filter, include_back, index)
    }

    pub fn greedy_pick_max_q(&self, filter: &dyn ActionFilter) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for (i, action) in self.actions.iter().enumerate() {
            if !filter.include(self, action) {
                continue;
            }
            let p = filter.priority(self, action);
            if best.map(|(_, bp)| p > bp).unwrap_or(p > 0) {
                best = Some((i, p));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Shortcut with an "unvisited, enabled, valid" filter; falls back to
    /// BACK if nothing else matched and BACK itself qualifies.
    pub fn random_pick_unvisited(&self) -> Option<usize> {
        let filter = crate::filter::UnvisitedValidFilter;
        if let Some(idx) = self.random_pick(&filter, false) {
            return Some(idx);
        }
        if filter.include(self, self.back_action()) {
            return Some(self.back_action_index);
        }
        None
    }

    /// Bounds for the physical widget an action should act on right now:
    /// rotates across `visit_count mod (duplicates.len() + 1)` so repeated
    /// "same" actions touch distinct physical widgets in turn
    /// (`resolve_at` in the original). Idempotent within one visit since
    /// `visit_count` only changes on the next `record_visit`.
    pub fn resolved_bounds(&self, action_idx: usize) -> Option<Rect> {
        let target_idx = self.actions[action_idx].target?;
        let mut w = self.widgets[target_idx].clone();
        let h = w.hash(&WidgetKeyMask::default());
        match self.duplicates.get(&h) {
            None => Some(w.bounds),
            Some(dups) => {
                let total = dups.len() + 1;
                let visit = self.actions[action_idx].visit_count as usize % total;
                if visit == 0 {
                    Some(w.bounds)
                } else {
                    Some(dups[visit - 1].bounds)
                }
            }
        }
    }

    pub fn clear_details(&mut self) {
        for w in &mut self.widgets {
            w.text.clear();
            w.class_name.clear();
            w.resource_id.clear();
            w.content_desc.clear();
        }
        self.duplicates.clear();
        self.has_no_detail = true;
    }

    pub fn fill_details(&mut self, source: &State) {
        for (i, w) in self.widgets.iter_mut().enumerate() {
            if let Some(src) = source.widgets.get(i) {
                w.text = src.text.clone();
                w.class_name = src.class_name.clone();
                w.resource_id = src.resource_id.clone();
                w.content_desc = src.content_desc.clone();
            }
        }
        self.duplicates = source.duplicates.clone();
        self.has_no_detail = false;
    }

    pub fn has_no_detail(&self) -> bool {
        self.has_no_detail
    }
}

fn operate_to_action_type(op: crate::widget::OperateType) -> ActionType {
    use crate::widget::OperateType::*;
    match op {
        Click => ActionType::Click,
        LongClick => ActionType::LongClick,
        ScrollTopDown => ActionType::ScrollTopDown,
        ScrollBottomUp => ActionType::ScrollBottomUp,
        ScrollLeftRight => ActionType::ScrollLeftRight,
        ScrollRightLeft => ActionType::ScrollRightLeft,
    }
}

fn collect_widgets(tree: &ElementTree, id: NodeId, out: &mut Vec<Widget>) {
    if let Some(w) = Widget::from_element(tree, id) {
        out.push(w);
    }
    for c in tree.children(id) {
        collect_widgets(tree, c, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{EnableValidFilter, UnvisitedValidFilter};

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
    fn single_button_state_has_click_and_back() {
        let tree = button_tree();
        let state = State::build(&tree, "com.example/.Main");
        assert_eq!(state.actions.len(), 2);
        assert!(state.actions.iter().any(|a| a.action_type == ActionType::Click));
        assert!(state.actions.iter().any(|a| a.is_back()));
    }

    #[test]
    fn random_pick_unvisited_falls_back_to_back_when_everything_visited() {
        let tree = button_tree();
        let mut state = State::build(&tree, "com.example/.Main");
        for a in &mut state.actions {
            if !a.is_back() {
                a.record_visit();
            }
        }
        let idx = state.random_pick_unvisited();
        assert_eq!(idx, Some(state.back_action_index));
    }

    #[test]
    fn duplicate_widgets_are_deduplicated() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).class_name = "android.widget.FrameLayout".into();
        for i in 0..3 {
            let id = tree.push(Some(root));
            let n = tree.get_mut(id);
            n.class_name = "android.widget.Button".into();
            n.clickable = true;
            n.enabled = true;
            n.bounds = Rect::new(i * 10, 0, i * 10 + 5, 5);
        }
        let state = State::build(&tree, "com.example/.Main");
        let click_count = state.widgets.iter().filter(|w| w.class_name == "android.widget.Button").count();
        assert_eq!(click_count, 1);
        let total_dups: usize = state.duplicates.values().map(|v| v.len()).sum();
        assert_eq!(total_dups, 2);
    }

    #[test]
    fn saturation_is_strict_greater_than_duplicate_count() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).class_name = "android.widget.FrameLayout".into();
        for i in 0..3 {
            let id = tree.push(Some(root));
            let n = tree.get_mut(id);
            n.class_name = "android.widget.Button".into();
            n.clickable = true;
            n.enabled = true;
            n.bounds = Rect::new(i * 10, 0, i * 10 + 5, 5);
        }
        let mut state = State::build(&tree, "com.example/.Main");
        let click_idx = state.actions.iter().position(|a| a.action_type == ActionType::Click).unwrap();
        assert!(!state.is_saturated(&state.actions[click_idx]));
        state.actions[click_idx].visit_count = 2;
        assert!(!state.is_saturated(&state.actions[click_idx]));
        state.actions[click_idx].visit_count = 3;
        assert!(state.is_saturated(&state.actions[click_idx]));
    }

    #[test]
    fn filters_compose_with_count_priority() {
        let tree = button_tree();
        let state = State::build(&tree, "com.example/.Main");
        let f = EnableValidFilter;
        assert!(state.count_priority(&f, true) > 0);
        let _ = UnvisitedValidFilter;
    }
}
