//! Pluggable action predicates and priority projections, grounded on
//! `ActionFilter.h`/`ActionFilter.cpp` from the retrieved original source.
//! The original's class hierarchy (one struct per rule) maps cleanly onto
//! a trait plus small concrete implementors — no tagged-variant collapse
//! needed here, since the set of filters is genuinely open-ended at the
//! call site (agent selection strategies compose them freely).

use crate::action::{is_enabled, is_valid, Action, ActionType};
use crate::state::State;

pub trait ActionFilter {
    fn include(&self, state: &State, action: &Action) -> bool;

    fn priority(&self, _state: &State, action: &Action) -> i32 {
        action.priority
    }
}

pub struct AllFilter;
impl ActionFilter for AllFilter {
    fn include(&self, _state: &State, _action: &Action) -> bool {
        true
    }
}

pub struct TargetFilter;
impl ActionFilter for TargetFilter {
    fn include(&self, _state: &State, action: &Action) -> bool {
        action.action_type.requires_target()
    }
}

pub struct ValidFilter;
impl ActionFilter for ValidFilter {
    fn include(&self, state: &State, action: &Action) -> bool {
        is_valid(action, &state.widgets)
    }
}

pub struct EnableValidFilter;
impl ActionFilter for EnableValidFilter {
    fn include(&self, state: &State, action: &Action) -> bool {
        is_enabled(action, &state.widgets) && is_valid(action, &state.widgets)
    }
}

pub struct UnvisitedValidFilter;
impl ActionFilter for UnvisitedValidFilter {
    fn include(&self, state: &State, action: &Action) -> bool {
        is_enabled(action, &state.widgets) && is_valid(action, &state.widgets) && !action.visited
    }
}

/// Enabled, valid, and not saturated under the owning state's duplicate
/// counts (spec invariant 4).
pub struct UnSaturatedFilter;
impl ActionFilter for UnSaturatedFilter {
    fn include(&self, state: &State, action: &Action) -> bool {
        is_enabled(action, &state.widgets) && is_valid(action, &state.widgets) && !state.is_saturated(action)
    }
}

/// Boosts priority by the action's Q-value, scaled by 10 and rounded up,
/// for every non-BACK action.
pub struct ValidValuePriorityFilter {
    pub use_q1: bool,
}
impl ActionFilter for ValidValuePriorityFilter {
    fn include(&self, state: &State, action: &Action) -> bool {
        is_enabled(action, &state.widgets) && is_valid(action, &state.widgets)
    }

    fn priority(&self, _state: &State, action: &Action) -> i32 {
        let mut pri = action.priority;
        if !action.is_back() {
            pri += (10.0 * action.q(self.use_q1)).ceil() as i32;
        }
        pri
    }
}

/// System actions (START/RESTART/...) always pass; UI actions must be
/// enabled, valid, and target a non-empty widget.
pub struct ValidDatePriorityFilter;
impl ActionFilter for ValidDatePriorityFilter {
    fn include(&self, state: &State, action: &Action) -> bool {
        match action.action_type {
            ActionType::Start
            | ActionType::Restart
            | ActionType::CleanRestart
            | ActionType::Nop
            | ActionType::Activate
            | ActionType::Back => true,
            ActionType::Click
            | ActionType::LongClick
            | ActionType::ScrollBottomUp
            | ActionType::ScrollTopDown
            | ActionType::ScrollLeftRight
            | ActionType::ScrollRightLeft
            | ActionType::ScrollBottomUpN => {
                is_enabled(action, &state.widgets)
                    && is_valid(action, &state.widgets)
                    && !state.action_target_is_empty(action)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementTree;
    use crate::rect::Rect;
    use crate::state::State;

    fn one_button_state() -> State {
        let mut tree = ElementTree::new();
        let id = tree.push(None);
        let n = tree.get_mut(id);
        n.class_name = "android.widget.Button".into();
        n.clickable = true;
        n.bounds = Rect::new(0, 0, 10, 10);
        n.enabled = true;
        State::build(&tree, "com.example/.Main")
    }

    #[test]
    fn unvisited_filter_excludes_once_visited() {
        let mut state = one_button_state();
        let filter = UnvisitedValidFilter;
        let click_idx = state.actions.iter().position(|a| a.action_type == ActionType::Click).unwrap();
        assert!(filter.include(&state, &state.actions[click_idx]));
        state.actions[click_idx].record_visit();
        assert!(!filter.include(&state, &state.actions[click_idx]));
    }

    #[test]
    fn all_filter_always_includes() {
        let state = one_button_state();
        let filter = AllFilter;
        for a in &state.actions {
            assert!(filter.include(&state, a));
        }
    }
}
