//! The two-pass tree rewrite that runs before every `State` is built:
//! black-widget removal, then a single normalization walk (resource-id
//! de-obfuscation, page-text caching, tree pruning, valid-text marking).

use std::collections::{HashSet, VecDeque};

use fastbot_core::element::{ElementTree, NodeId, Xpath};
use fastbot_core::Rect;

use crate::config::{BlackWidgetEntry, MappingTable, TreePruningRule, INVALID_PROPERTY};

/// A black rect remembered for `is_point_in_black_rects`, indexed by the
/// activity it was observed under.
#[derive(Clone, Debug)]
pub struct BlackRect {
    pub activity: String,
    pub rect: Rect,
}

/// Bounded history of recently seen node text, used to backfill empty
/// input fields. Trimmed from the front, matching the original's
/// `std::deque`.
#[derive(Default)]
pub struct PageTextCache {
    texts: VecDeque<String>,
}

const CACHE_HIGH_WATER: usize = 300;
const CACHE_TRIM: usize = 20;

impl PageTextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.texts.push_back(text.to_string());
        if self.texts.len() > CACHE_HIGH_WATER {
            for _ in 0..CACHE_TRIM {
                self.texts.pop_front();
            }
        }
    }

    pub fn sample(&self, rng: &mut impl rand::Rng) -> Option<&str> {
        if self.texts.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.texts.len());
        Some(self.texts[idx].as_str())
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

fn find_xpath_matches(tree: &ElementTree, start: NodeId, xpath: &Xpath) -> Vec<NodeId> {
    let mut out = Vec::new();
    find_xpath_into(tree, start, xpath, &mut out);
    out
}

fn find_xpath_into(tree: &ElementTree, id: NodeId, xpath: &Xpath, out: &mut Vec<NodeId>) {
    if tree.match_xpath(id, xpath) {
        out.push(id);
    }
    for c in tree.children(id).collect::<Vec<_>>() {
        find_xpath_into(tree, c, xpath, out);
    }
}

/// Relative bounds use `[0, 1.1]` on every coordinate; anything else is
/// already absolute pixels. This rule is occasionally wrong for very
/// tall/narrow absolute rects but is preserved verbatim as documented.
fn resolve_black_bounds(raw: [f64; 4], root: Rect) -> Rect {
    let relative = raw.iter().all(|&c| (0.0..=1.1).contains(&c));
    if relative {
        let w = root.width() as f64;
        let h = root.height() as f64;
        Rect::new(
            root.left + (raw[0] * w) as i32,
            root.top + (raw[1] * h) as i32,
            root.left + (raw[2] * w) as i32,
            root.top + (raw[3] * h) as i32,
        )
    } else {
        Rect::new(raw[0] as i32, raw[1] as i32, raw[2] as i32, raw[3] as i32)
    }
}

/// Deletes every element that matches a black-widget rule for `activity`,
/// returning the rects that were removed (for `is_point_in_black_rects`).
/// Two phases: xpath-only entries first, then bounds-bearing entries
/// resolved against the (now possibly smaller) tree's root size.
pub fn apply_black_widgets(tree: &mut ElementTree, activity: &str, entries: &[BlackWidgetEntry]) -> Vec<BlackRect> {
    let mut removed = Vec::new();
    let Some(root) = tree.root() else { return removed };

    for entry in entries.iter().filter(|e| e.activity == activity && e.xpath.is_some() && e.bounds.is_none()) {
        let xpath = Xpath::parse(entry.xpath.as_deref().unwrap_or(""));
        let Some(root) = tree.root() else { break };
        for id in find_xpath_matches(tree, root, &xpath) {
            let bounds = tree.get(id).bounds;
            tree.delete(id);
            removed.push(BlackRect { activity: activity.to_string(), rect: bounds });
        }
    }

    let root_bounds = tree.get(root).bounds;
    for entry in entries.iter().filter(|e| e.activity == activity && e.bounds.is_some()) {
        let rect = resolve_black_bounds(entry.bounds.unwrap(), root_bounds);
        let Some(root) = tree.root() else { break };
        let matches = tree.recursive_find(root, |n| rect.contains_point(n.bounds.center()));
        for id in matches {
            tree.delete(id);
            removed.push(BlackRect { activity: activity.to_string(), rect });
        }
    }

    removed
}

/// Single recursive walk applying resource-id de-obfuscation, page-text
/// caching, tree pruning, and valid-text marking.
pub fn normalize_pass(
    tree: &mut ElementTree,
    activity: &str,
    mapping: &MappingTable,
    pruning: &[TreePruningRule],
    valid_texts: &HashSet<String>,
    cache: &mut PageTextCache,
) {
    let Some(root) = tree.root() else { return };
    let all_ids = tree.recursive_find(root, |_| true);

    for id in all_ids {
        let resolved = mapping.resolve(&tree.get(id).resource_id).to_string();
        tree.get_mut(id).resource_id = resolved;

        cache.push(&tree.get(id).text);

        for rule in pruning.iter().filter(|r| r.activity == activity) {
            let xpath = Xpath::parse(&rule.xpath);
            if !tree.match_xpath(id, &xpath) {
                continue;
            }
            let node = tree.get_mut(id);
            if rule.resourceid != INVALID_PROPERTY {
                node.resource_id = rule.resourceid.clone();
            }
            if rule.text != INVALID_PROPERTY {
                node.text = rule.text.clone();
            }
            if rule.contentdesc != INVALID_PROPERTY {
                node.content_desc = rule.contentdesc.clone();
            }
            if rule.classname != INVALID_PROPERTY {
                node.class_name = rule.classname.clone();
            }
        }

        let node = tree.get(id);
        let matched = if valid_texts.contains(&node.text) {
            Some(node.text.clone())
        } else if valid_texts.contains(&node.content_desc) {
            Some(node.content_desc.clone())
        } else {
            None
        };
        if let Some(text) = matched {
            tree.get_mut(id).valid_text = Some(text);
            let parent_clickable = tree.parent(id).map(|p| tree.get(p).clickable).unwrap_or(true);
            if !parent_clickable {
                tree.get_mut(id).clickable = true;
            }
        }
    }
}

pub fn is_point_in_black_rects(rects: &[BlackRect], activity: &str, x: i32, y: i32) -> bool {
    rects
        .iter()
        .filter(|r| r.activity == activity)
        .any(|r| r.rect.contains_point(fastbot_core::Point::new(x, y)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_button(bounds: Rect) -> ElementTree {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).bounds = Rect::new(0, 0, 1000, 2000);
        let child = tree.push(Some(root));
        tree.get_mut(child).class_name = "android.widget.Button".into();
        tree.get_mut(child).bounds = bounds;
        tree
    }

    #[test]
    fn relative_bounds_map_against_root_size() {
        let tree = tree_with_button(Rect::new(400, 800, 600, 1000));
        let root = tree.get(tree.root().unwrap()).bounds;
        let rect = resolve_black_bounds([0.4, 0.4, 0.6, 0.5], root);
        assert_eq!(rect, Rect::new(400, 800, 600, 1000));
    }

    #[test]
    fn absolute_bounds_pass_through_unscaled() {
        let root = Rect::new(0, 0, 1000, 2000);
        let rect = resolve_black_bounds([0.0, 0.0, 1.0, 1800.0], root);
        assert_eq!(rect, Rect::new(0, 0, 1, 1800));
    }

    #[test]
    fn black_xpath_entry_deletes_matching_node_and_remembers_bounds() {
        let mut tree = tree_with_button(Rect::new(10, 10, 20, 20));
        let entries = vec![BlackWidgetEntry {
            activity: "A".into(),
            xpath: Some("android.widget.Button||||".into()),
            bounds: None,
        }];
        let removed = apply_black_widgets(&mut tree, "A", &entries);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].rect, Rect::new(10, 10, 20, 20));
        assert_eq!(tree.children(tree.root().unwrap()).count(), 0);
    }

    #[test]
    fn page_text_cache_trims_twenty_once_above_threshold() {
        let mut cache = PageTextCache::new();
        for i in 0..301 {
            cache.push(&format!("t{i}"));
        }
        assert_eq!(cache.len(), 281);
    }
}
