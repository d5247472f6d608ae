//! Deterministic injection of scripted action sequences. `CustomEvent`
//! rules are config, loaded once; the queue and per-event remaining-times
//! counters are runtime state owned by the `Preference`.

use fastbot_core::element::{ElementTree, Xpath};
use fastbot_core::{ActionType, Rect};
use rand::Rng;

use crate::config::{CustomAction, CustomEvent};

/// One queued gesture, with bounds resolved against the tree it was
/// enqueued for — `None` bounds means the xpath never matched and the
/// driver should skip the step rather than act blind.
#[derive(Clone, Debug)]
pub struct QueuedAction {
    pub action_type: ActionType,
    pub bounds: Option<Rect>,
}

/// FIFO queue of pending custom actions plus the events' remaining
/// `times` counters. Owned by `Preference`; `times` is decremented in
/// place so events naturally stop firing once exhausted.
pub struct CustomEventState {
    events: Vec<CustomEvent>,
    remaining: Vec<u32>,
    queue: Vec<QueuedAction>,
}

impl CustomEventState {
    pub fn new(events: Vec<CustomEvent>) -> Self {
        let remaining = events.iter().map(|e| e.times).collect();
        CustomEventState {
            events,
            remaining,
            queue: Vec::new(),
        }
    }

    /// Pop the next queued action, if any.
    pub fn pop(&mut self) -> Option<QueuedAction> {
        if self.queue.is_empty() {
            return None;
        }
        Some(self.queue.remove(0))
    }

    pub fn is_queue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// When the queue is empty, scan events for `activity` and fire the
    /// first one whose remaining-times counter is positive and whose
    /// fresh uniform draw beats its probability.
    pub fn maybe_fire(&mut self, activity: &str, tree: &ElementTree, rng: &mut impl Rng) {
        if !self.queue.is_empty() {
            return;
        }
        for idx in 0..self.events.len() {
            if self.events[idx].activity != activity || self.remaining[idx] == 0 {
                continue;
            }
            let draw: f64 = rng.gen_range(0.0..1.0);
            if draw < self.events[idx].prob {
                self.remaining[idx] -= 1;
                for action in self.events[idx].actions.clone() {
                    self.queue.push(resolve_action(&action, tree));
                }
                return;
            }
        }
    }
}

fn resolve_action(action: &CustomAction, tree: &ElementTree) -> QueuedAction {
    let action_type = action.action_type().unwrap_or(ActionType::Nop);
    let bounds = match action.bounds {
        Some([l, t, r, b]) => Some(Rect::new(l, t, r, b)),
        None => action.xpath.as_deref().and_then(|x| {
            let xpath = Xpath::parse(x);
            let root = tree.root()?;
            first_xpath_match(tree, root, &xpath).map(|id| tree.get(id).bounds)
        }),
    };
    QueuedAction { action_type, bounds }
}

fn first_xpath_match(tree: &ElementTree, id: fastbot_core::element::NodeId, xpath: &Xpath) -> Option<fastbot_core::element::NodeId> {
    if tree.match_xpath(id, xpath) {
        return Some(id);
    }
    for c in tree.children(id).collect::<Vec<_>>() {
        if let Some(found) = first_xpath_match(tree, c, xpath) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn sample_tree() -> ElementTree {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).bounds = Rect::new(0, 0, 100, 100);
        tree.get_mut(root).class_name = "android.widget.Button".into();
        tree
    }

    #[test]
    fn certain_event_enqueues_and_decrements_times() {
        let event = CustomEvent {
            activity: "A".into(),
            prob: 1.0,
            times: 2,
            actions: vec![CustomAction {
                act: "CLICK".into(),
                xpath: None,
                bounds: Some([0, 0, 10, 10]),
            }],
        };
        let mut state = CustomEventState::new(vec![event]);
        let mut rng = StepRng::new(0, 1);
        let tree = sample_tree();
        state.maybe_fire("A", &tree, &mut rng);
        assert!(!state.is_queue_empty());
        let queued = state.pop().unwrap();
        assert_eq!(queued.action_type, ActionType::Click);
        assert_eq!(queued.bounds, Some(Rect::new(0, 0, 10, 10)));
    }

    #[test]
    fn event_for_other_activity_never_fires() {
        let event = CustomEvent {
            activity: "A".into(),
            prob: 1.0,
            times: 1,
            actions: vec![],
        };
        let mut state = CustomEventState::new(vec![event]);
        let mut rng = StepRng::new(0, 1);
        let tree = sample_tree();
        state.maybe_fire("B", &tree, &mut rng);
        assert!(state.is_queue_empty());
    }
}
