//! Parsed UI-tree node ([`Element`]) plus the arena ([`ElementTree`]) that
//! owns a whole snapshot. Nodes are addressed by [`NodeId`] rather than
//! `Rc`/`Weak`: Action↔State is a similar cycle risk, solved by
//! non-owning back-references, and the same trade-off applies to
//! Element↔parent. An index into a `Vec` sidesteps the liveness question
//! entirely — a dangling `NodeId` simply isn't produced, because nodes are
//! only ever tombstoned (see [`ElementTree::delete`]), never reallocated.

use std::cell::Cell;

use crate::hash::hash_str;
use crate::rect::Rect;

pub type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollType {
    Vertical,
    Horizontal,
    All,
    None,
}

/// Field-wise selector, used both for matching elements while rewriting
/// the tree and for tree-pruning / black-widget config rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Xpath {
    pub clazz: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
    /// `None` means "ignore index", matching the original's `index == -1`.
    pub index: Option<i32>,
    pub operation_and: bool,
}

impl Xpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the compact string form `class|resourceId|text|contentDesc|index`,
    /// the convenience constructor the original `Xpath(const std::string&)`
    /// exposes alongside field-by-field construction. Missing trailing
    /// fields are treated as empty/ignored.
    pub fn parse(s: &str) -> Self {
        let mut parts = s.split('|');
        let clazz = parts.next().unwrap_or("").to_string();
        let resource_id = parts.next().unwrap_or("").to_string();
        let text = parts.next().unwrap_or("").to_string();
        let content_desc = parts.next().unwrap_or("").to_string();
        let index = parts.next().and_then(|s| s.parse::<i32>().ok());
        Xpath {
            clazz,
            resource_id,
            text,
            content_desc,
            index,
            operation_and: true,
        }
    }
}

struct FieldMatch<'a> {
    selector: &'a str,
    actual: &'a str,
}

impl FieldMatch<'_> {
    fn matches(&self) -> Option<bool> {
        if self.selector.is_empty() {
            None
        } else {
            Some(self.selector == self.actual)
        }
    }
}

#[derive(Debug)]
pub struct ElementNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    alive: bool,

    pub class_name: String,
    pub resource_id: String,
    pub package_name: String,
    pub text: String,
    pub content_desc: String,
    pub valid_text: Option<String>,
    pub bounds: Rect,
    pub index: i32,

    pub enabled: bool,
    pub checked: bool,
    pub checkable: bool,
    pub clickable: bool,
    pub focusable: bool,
    pub focused: bool,
    pub scrollable: bool,
    pub long_clickable: bool,
    pub password: bool,
    pub selected: bool,
    pub editable: bool,

    cached_scroll_type: Cell<Option<ScrollType>>,
    cached_hash: Cell<Option<u64>>,
}

impl ElementNode {
    fn new() -> Self {
        ElementNode {
            parent: None,
            children: Vec::new(),
            alive: true,
            class_name: String::new(),
            resource_id: String::new(),
            package_name: String::new(),
            text: String::new(),
            content_desc: String::new(),
            valid_text: None,
            bounds: Rect::default(),
            index: 0,
            enabled: false,
            checked: false,
            checkable: false,
            clickable: false,
            focusable: false,
            focused: false,
            scrollable: false,
            long_clickable: false,
            password: false,
            selected: false,
            editable: false,
            cached_scroll_type: Cell::new(None),
            cached_hash: Cell::new(None),
        }
    }

    fn invalidate(&self) {
        self.cached_hash.set(None);
    }

    pub fn is_web_view(&self) -> bool {
        self.class_name.contains("WebView")
    }

    pub fn is_edit_text(&self) -> bool {
        self.class_name.contains("EditText") || self.editable
    }
}

/// A whole parsed UI-tree snapshot. Owns every node; nodes reference each
/// other only by [`NodeId`].
#[derive(Debug)]
pub struct ElementTree {
    nodes: Vec<ElementNode>,
    root: Option<NodeId>,
}

impl ElementTree {
    pub fn new() -> Self {
        ElementTree {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root.filter(|&id| self.nodes[id].alive)
    }

    pub fn get(&self, id: NodeId) -> &ElementNode {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut ElementNode {
        self.nodes[id].invalidate();
        &mut self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(move |&c| self.nodes[c].alive)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Allocate a new node as a child of `parent` (or as the root when
    /// `parent` is `None`). Returns its id.
    pub fn push(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ElementNode::new());
        self.nodes[id].parent = parent;
        match parent {
            Some(p) => {
                self.nodes[p].children.push(id);
                self.nodes[p].invalidate();
            }
            None => self.root = Some(id),
        }
        id
    }

    /// Remove `id` and its whole subtree from the tree. Deleting the root
    /// is a logged no-op, matching the original's guard against orphaning
    /// the snapshot.
    pub fn delete(&mut self, id: NodeId) {
        if Some(id) == self.root {
            tracing::warn!("ignoring attempt to delete the root element");
            return;
        }
        let Some(parent) = self.nodes[id].parent else {
            return;
        };
        self.nodes[parent].children.retain(|&c| c != id);
        self.nodes[parent].invalidate();
        self.tombstone_subtree(id);
    }

    fn tombstone_subtree(&mut self, id: NodeId) {
        self.nodes[id].alive = false;
        let children: Vec<NodeId> = self.nodes[id].children.clone();
        for c in children {
            self.tombstone_subtree(c);
        }
    }

    pub fn match_xpath(&self, id: NodeId, xpath: &Xpath) -> bool {
        let node = &self.nodes[id];
        let matches = [
            FieldMatch {
                selector: &xpath.clazz,
                actual: &node.class_name,
            }
            .matches(),
            FieldMatch {
                selector: &xpath.resource_id,
                actual: &node.resource_id,
            }
            .matches(),
            FieldMatch {
                selector: &xpath.text,
                actual: &node.text,
            }
            .matches(),
            FieldMatch {
                selector: &xpath.content_desc,
                actual: &node.content_desc,
            }
            .matches(),
        ];
        let index_match = xpath.index.map(|i| i == node.index);
        let all_checks = matches.into_iter().chain(std::iter::once(index_match));
        if xpath.operation_and {
            all_checks.flatten().all(|m| m)
        } else {
            all_checks.flatten().any(|m| m)
        }
    }

    /// Pre-order traversal collecting every node id for which `pred` holds.
    pub fn recursive_find(&self, start: NodeId, pred: impl Fn(&ElementNode) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.recursive_find_into(start, &pred, &mut out);
        out
    }

    fn recursive_find_into(&self, id: NodeId, pred: &impl Fn(&ElementNode) -> bool, out: &mut Vec<NodeId>) {
        if pred(&self.nodes[id]) {
            out.push(id);
        }
        for c in self.children(id).collect::<Vec<_>>() {
            self.recursive_find_into(c, pred, out);
        }
    }

    pub fn recursive_find_first(&self, start: NodeId, pred: impl Fn(&ElementNode) -> bool) -> Option<NodeId> {
        if pred(&self.nodes[start]) {
            return Some(start);
        }
        for c in self.children(start).collect::<Vec<_>>() {
            if let Some(found) = self.recursive_find_first(c, &pred) {
                return Some(found);
            }
        }
        None
    }

    pub fn scroll_type(&self, id: NodeId) -> ScrollType {
        let node = &self.nodes[id];
        if let Some(cached) = node.cached_scroll_type.get() {
            return cached;
        }
        let st = compute_scroll_type(&node.class_name);
        node.cached_scroll_type.set(Some(st));
        st
    }

    /// Cached recursive (or shallow) structural hash.
    pub fn hash(&self, id: NodeId, recursive: bool) -> u64 {
        let node = &self.nodes[id];
        if recursive {
            if let Some(h) = node.cached_hash.get() {
                return h;
            }
        }
        let h1 = hash_str(&node.resource_id).wrapping_mul(127).wrapping_shl(1);
        let h2 = hash_str(&node.class_name).wrapping_shl(2);
        let h3 = hash_str(&node.package_name).wrapping_shl(3);
        let h4 = hash_str(&node.text).wrapping_mul(256).wrapping_shl(4);
        let h5 = if node.content_desc.is_empty() {
            0
        } else {
            hash_str(&node.content_desc).wrapping_shl(5)
        };
        let h7 = (node.clickable as u64).wrapping_mul(64).wrapping_shl(6);
        let mut hashcode = h1 ^ h2 ^ h3 ^ h4 ^ h5 ^ h7;

        if recursive {
            for (i, c) in self.children(id).collect::<Vec<_>>().into_iter().enumerate() {
                let child_hash = self.hash(c, true).wrapping_shl(2);
                hashcode ^= child_hash;
                hashcode ^= 0x7398c_u64.wrapping_add((i as u64).wrapping_shl(8));
            }
            node.cached_hash.set(Some(hashcode));
        }
        hashcode
    }

    /// Post-parse normalization, applied once after the tree is built and
    /// before it reaches [`crate::state::State`] construction.
    pub fn normalize(&mut self, parent_click_propagates: bool) {
        let Some(root) = self.root() else { return };

        let any_clickable = self
            .recursive_find(root, |n| n.clickable)
            .first()
            .is_some();
        if !any_clickable {
            for id in self.recursive_find(root, |_| true) {
                self.get_mut(id).clickable = true;
            }
        }

        self.get_mut(root).scrollable = true;

        for id in self.recursive_find(root, |n| n.is_edit_text()) {
            let node = self.get_mut(id);
            node.enabled = true;
            node.clickable = true;
            node.long_clickable = true;
        }

        if parent_click_propagates {
            self.propagate_parent_click(root);
        }
    }

    fn propagate_parent_click(&mut self, id: NodeId) {
        let parent_clickable = self.nodes[id].clickable || self.nodes[id].long_clickable;
        for c in self.children(id).collect::<Vec<_>>() {
            if parent_clickable {
                self.get_mut(c).clickable = true;
            }
            self.propagate_parent_click(c);
        }
    }
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed lookup table mapping a class name to its [`ScrollType`]. Grid
/// views and scroll views carry their axis in the class name itself
/// (`HorizontalGridView`/`VerticalGridView`, `HorizontalScrollView`), so
/// those two families are gated on `"horizontal"`/`"vertical"` before
/// falling back to the axis-less default.
fn compute_scroll_type(class_name: &str) -> ScrollType {
    let lower = class_name.to_ascii_lowercase();
    let horizontal = lower.contains("horizontal");
    let vertical = lower.contains("vertical");

    if lower.contains("gridview") {
        if horizontal {
            ScrollType::Horizontal
        } else if vertical {
            ScrollType::Vertical
        } else {
            ScrollType::All
        }
    } else if lower.contains("recyclerview") || lower.contains("listview") || (lower.contains("scrollview") && !horizontal) {
        ScrollType::Vertical
    } else if lower.contains("viewpager") || (lower.contains("scrollview") && horizontal) {
        ScrollType::Horizontal
    } else {
        ScrollType::All
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tree: &mut ElementTree, parent: NodeId, class: &str, clickable: bool) -> NodeId {
        let id = tree.push(Some(parent));
        tree.get_mut(id).class_name = class.to_string();
        tree.get_mut(id).clickable = clickable;
        id
    }

    #[test]
    fn click_less_tree_becomes_all_clickable() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).class_name = "android.widget.FrameLayout".into();
        let child = leaf(&mut tree, root, "android.widget.Button", false);
        tree.normalize(false);
        assert!(tree.get(root).clickable);
        assert!(tree.get(child).clickable);
    }

    #[test]
    fn root_is_forced_scrollable() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        leaf(&mut tree, root, "android.widget.Button", true);
        tree.normalize(false);
        assert!(tree.get(root).scrollable);
    }

    #[test]
    fn delete_root_is_a_noop() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.delete(root);
        assert_eq!(tree.root(), Some(root));
    }

    #[test]
    fn delete_removes_subtree() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        let child = tree.push(Some(root));
        let grandchild = tree.push(Some(child));
        tree.delete(child);
        assert_eq!(tree.children(root).count(), 0);
        assert!(!tree.get(grandchild).alive);
    }

    #[test]
    fn hash_is_stable_until_mutation() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).class_name = "Foo".into();
        let h1 = tree.hash(root, true);
        let h2 = tree.hash(root, true);
        assert_eq!(h1, h2);
        tree.get_mut(root).class_name = "Bar".into();
        let h3 = tree.hash(root, true);
        assert_ne!(h1, h3);
    }

    #[test]
    fn xpath_and_requires_every_nonempty_field() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).class_name = "Foo".into();
        tree.get_mut(root).resource_id = "id/x".into();
        let mut xp = Xpath::new();
        xp.clazz = "Foo".into();
        xp.resource_id = "id/y".into();
        xp.operation_and = true;
        assert!(!tree.match_xpath(root, &xp));
        xp.operation_and = false;
        assert!(tree.match_xpath(root, &xp));
    }

    #[test]
    fn scroll_type_reads_the_axis_out_of_grid_and_scroll_view_class_names() {
        assert_eq!(compute_scroll_type("android.widget.ScrollView"), ScrollType::Vertical);
        assert_eq!(compute_scroll_type("android.widget.HorizontalScrollView"), ScrollType::Horizontal);
        assert_eq!(
            compute_scroll_type("android.support.v17.leanback.widget.HorizontalGridView"),
            ScrollType::Horizontal
        );
        assert_eq!(
            compute_scroll_type("android.support.v17.leanback.widget.VerticalGridView"),
            ScrollType::Vertical
        );
        assert_eq!(compute_scroll_type("android.widget.GridView"), ScrollType::All);
        assert_eq!(compute_scroll_type("androidx.recyclerview.widget.RecyclerView"), ScrollType::Vertical);
        assert_eq!(compute_scroll_type("android.support.v4.view.ViewPager"), ScrollType::Horizontal);
    }
}
