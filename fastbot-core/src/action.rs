//! Gestures and their ownership relationship to a
//! [`State`](crate::state::State). Grounded on `Action.cpp` /
//! `ActivityNameAction.h` from the retrieved original source: priority by
//! action type, the `requires_target`/`is_model_act` range checks, and the
//! `0x9e3779b9`-seeded composite hash.

use crate::hash::hash_u64;
use crate::widget::Widget;

/// Stable wire order — appended to, never reordered, since it is
/// serialized by discriminant-adjacent JSON enum names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum ActionType {
    Nop = 0,
    Back,
    Feed,
    Click,
    LongClick,
    ScrollTopDown,
    ScrollBottomUp,
    ScrollLeftRight,
    ScrollRightLeft,
    ScrollBottomUpN,
    Start,
    Restart,
    CleanRestart,
    Activate,
    ShellEvent,
    Crash,
}

pub const ALL_ACTION_TYPES: [ActionType; 16] = [
    ActionType::Nop,
    ActionType::Back,
    ActionType::Feed,
    ActionType::Click,
    ActionType::LongClick,
    ActionType::ScrollTopDown,
    ActionType::ScrollBottomUp,
    ActionType::ScrollLeftRight,
    ActionType::ScrollRightLeft,
    ActionType::ScrollBottomUpN,
    ActionType::Start,
    ActionType::Restart,
    ActionType::CleanRestart,
    ActionType::Activate,
    ActionType::ShellEvent,
    ActionType::Crash,
];

impl ActionType {
    pub fn name(self) -> &'static str {
        match self {
            ActionType::Nop => "NOP",
            ActionType::Back => "BACK",
            ActionType::Feed => "FEED",
            ActionType::Click => "CLICK",
            ActionType::LongClick => "LONG_CLICK",
            ActionType::ScrollTopDown => "SCROLL_TOP_DOWN",
            ActionType::ScrollBottomUp => "SCROLL_BOTTOM_UP",
            ActionType::ScrollLeftRight => "SCROLL_LEFT_RIGHT",
            ActionType::ScrollRightLeft => "SCROLL_RIGHT_LEFT",
            ActionType::ScrollBottomUpN => "SCROLL_BOTTOM_UP_N",
            ActionType::Start => "START",
            ActionType::Restart => "RESTART",
            ActionType::CleanRestart => "CLEAN_RESTART",
            ActionType::Activate => "ACTIVATE",
            ActionType::ShellEvent => "SHELL_EVENT",
            ActionType::Crash => "CRASH",
        }
    }

    /// `CLICK..=SCROLL_BOTTOM_UP_N` need a target widget to resolve bounds.
    pub fn requires_target(self) -> bool {
        (ActionType::Click..=ActionType::ScrollBottomUpN).contains(&self)
    }

    /// `BACK..=SCROLL_BOTTOM_UP_N` are the actions the policy itself
    /// chooses, as opposed to lifecycle actions the driver or Preference
    /// injects (START/RESTART/SHELL_EVENT/...).
    pub fn is_model_act(self) -> bool {
        (ActionType::Back..=ActionType::ScrollBottomUpN).contains(&self)
    }

    pub fn can_start_test_app(self) -> bool {
        matches!(self, ActionType::Start | ActionType::Restart | ActionType::CleanRestart)
    }

    /// Base priority before the per-state adjustment rule runs.
    pub fn base_priority(self) -> i32 {
        match self {
            ActionType::Click => 4,
            ActionType::LongClick
            | ActionType::ScrollTopDown
            | ActionType::ScrollBottomUp
            | ActionType::ScrollLeftRight
            | ActionType::ScrollRightLeft => 2,
            _ => 1,
        }
    }
}

/// One candidate gesture against a particular state. Owned by the State
/// that produced it; `target` is an index into that State's widget list,
/// never a separate allocation, so there is no lifetime to manage.
#[derive(Clone, Debug)]
pub struct Action {
    pub action_type: ActionType,
    pub target: Option<usize>,
    pub priority: i32,
    pub q1: f64,
    pub q2: f64,
    pub visit_count: u32,
    pub visited: bool,
    id: u64,
    hash: u64,
}

impl Action {
    pub fn new(action_type: ActionType, target: Option<usize>, state_hash: u64, target_hash: u64) -> Self {
        let hashcode = hash_u64(action_type as u64);
        let combined = 0x9e3779b9u64
            .wrapping_add(hashcode.wrapping_shl(2))
            ^ (((state_hash.wrapping_shl(4)) ^ (target_hash.wrapping_shl(3))).wrapping_shl(1));
        Action {
            action_type,
            target,
            priority: action_type.base_priority(),
            q1: 0.0,
            q2: 0.0,
            visit_count: 0,
            visited: false,
            id: 0,
            hash: combined,
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn q(&self, use_q1: bool) -> f64 {
        if use_q1 {
            self.q1
        } else {
            self.q2
        }
    }

    pub fn set_q(&mut self, use_q1: bool, value: f64) {
        if use_q1 {
            self.q1 = value;
        } else {
            self.q2 = value;
        }
    }

    pub fn is_back(&self) -> bool {
        self.action_type == ActionType::Back
    }

    pub fn record_visit(&mut self) {
        self.visit_count += 1;
        self.visited = true;
    }
}

/// Resolve whether a target-bearing action is structurally valid (spec
/// boundary behavior: an action whose target's bounds are empty is
/// invalid).
pub fn is_valid(action: &Action, widgets: &[Widget]) -> bool {
    match action.target {
        None => true,
        Some(idx) => widgets.get(idx).map(|w| !w.bounds.is_empty()).unwrap_or(false),
    }
}

pub fn is_enabled(action: &Action, widgets: &[Widget]) -> bool {
    match action.target {
        None => true,
        Some(idx) => widgets.get(idx).map(|w| w.enabled).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_outranks_scroll_in_base_priority() {
        assert!(ActionType::Click.base_priority() > ActionType::ScrollTopDown.base_priority());
    }

    #[test]
    fn only_target_bearing_types_require_target() {
        assert!(ActionType::Click.requires_target());
        assert!(!ActionType::Back.requires_target());
        assert!(!ActionType::Start.requires_target());
    }

    #[test]
    fn hash_depends_on_type_and_state_and_target() {
        let a = Action::new(ActionType::Click, Some(0), 1, 2);
        let b = Action::new(ActionType::Click, Some(0), 1, 3);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn visit_marks_visited_and_increments_count() {
        let mut a = Action::new(ActionType::Back, None, 0, 0);
        assert!(!a.visited);
        a.record_visit();
        assert!(a.visited);
        assert_eq!(a.visit_count, 1);
    }
}
