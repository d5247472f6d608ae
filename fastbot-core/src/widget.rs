//! Actionable projection of an [`Element`](crate::element::ElementNode) onto
//! a minimal record plus its derived action set and composite widget hash.
//! Grounded on `Widget.h`/`Widget.cpp` from the retrieved original source:
//! cached component hashes, a base composite always present,
//! text/content-desc/index mixed in conditionally.

use crate::element::{ElementNode, ElementTree, NodeId, ScrollType};
use crate::hash::{base_composite, hash_str, hash_u64};

/// A single bit of the original's `operateMask`, or-ed together into the
/// widget's derived action set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum OperateType {
    Click = 1,
    LongClick = 2,
    ScrollTopDown = 4,
    ScrollBottomUp = 8,
    ScrollLeftRight = 16,
    ScrollRightLeft = 32,
}

impl OperateType {
    pub fn bit(self) -> u32 {
        self as u32
    }
}

/// Which components feed the composite hash, beyond the always-present
/// base (class/resource-id/operate-mask/scroll-type). Mirrors the
/// original's `RichWidget` compile-time split, re-architected
/// as a runtime mode on the same type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WidgetKeyMask {
    pub include_text: bool,
    pub include_content_desc: bool,
    pub include_index: bool,
    /// Text is dropped from the hash when its un-normalized length exceeds
    /// this many bytes, even with `include_text` on.
    pub text_limit: usize,
}

impl Default for WidgetKeyMask {
    fn default() -> Self {
        WidgetKeyMask {
            include_text: true,
            include_content_desc: false,
            include_index: false,
            text_limit: 40,
        }
    }
}

/// Actionable projection of one Element. Owned by the [`crate::state::State`]
/// that produced it.
#[derive(Clone, Debug)]
pub struct Widget {
    pub class_name: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
    pub index: i32,
    pub bounds: crate::rect::Rect,
    pub operate_mask: u32,
    pub scroll_type: ScrollType,
    pub enabled: bool,
    pub editable: bool,
    pub checked: bool,

    /// `NodeId` of the source element, kept so the agent can re-derive
    /// bounds/target text after preference rewriting patches an action.
    pub source: NodeId,
    hash_cache: Option<u64>,
}

impl Widget {
    /// Build a Widget from an element that already has a non-empty
    /// derived action set. Returns `None` when the element contributes no
    /// action ("one Widget per node that has at least
    /// one derived action").
    pub fn from_element(tree: &ElementTree, id: NodeId) -> Option<Self> {
        let node = tree.get(id);
        let operate_mask = derive_operate_mask(node, tree.scroll_type(id));
        if operate_mask == 0 {
            return None;
        }
        Some(Widget {
            class_name: node.class_name.clone(),
            resource_id: node.resource_id.clone(),
            text: node.text.clone(),
            content_desc: node.content_desc.clone(),
            index: node.index,
            bounds: node.bounds,
            operate_mask,
            scroll_type: tree.scroll_type(id),
            enabled: node.enabled,
            editable: node.is_edit_text(),
            checked: node.checked,
            source: id,
            hash_cache: None,
        })
    }

    pub fn actions(&self) -> Vec<OperateType> {
        let mut out = Vec::new();
        for ty in [
            OperateType::Click,
            OperateType::LongClick,
            OperateType::ScrollTopDown,
            OperateType::ScrollBottomUp,
            OperateType::ScrollLeftRight,
            OperateType::ScrollRightLeft,
        ] {
            if self.operate_mask & ty.bit() != 0 {
                out.push(ty);
            }
        }
        out
    }

    fn component_hashes(&self) -> (u64, u64, u64, u64) {
        let h_class = hash_str(&self.class_name);
        let h_rid = hash_str(&self.resource_id);
        let h_op = hash_u64(self.operate_mask as u64);
        let h_scroll = hash_u64(self.scroll_type as u64);
        (h_class, h_rid, h_op, h_scroll)
    }

    /// Composite hash: base components always present, plus
    /// text/content-desc/index mixed in only when `mask` selects them.
    pub fn hash_with_mask(&self, mask: &WidgetKeyMask) -> u64 {
        let (h_class, h_rid, h_op, h_scroll) = self.component_hashes();
        let mut h = base_composite(h_class, h_rid, h_op, h_scroll);

        if mask.include_text && self.text.len() <= mask.text_limit {
            let normalized_text = normalize_text(&self.text);
            let truncated = truncate_utf8(&normalized_text, mask.text_limit);
            h ^= hash_str(truncated).wrapping_shl(5);
        }
        if mask.include_content_desc && !self.content_desc.is_empty() {
            h ^= hash_str(&self.content_desc).wrapping_shl(6);
        }
        if mask.include_index {
            h ^= hash_u64(self.index as u64).wrapping_shl(7);
        }
        h
    }

    /// Cached composite hash under the default mask, matching the
    /// original's eager-compute-on-construction cache. Invalidated by
    /// calling [`Widget::invalidate`].
    pub fn hash(&mut self, mask: &WidgetKeyMask) -> u64 {
        if let Some(h) = self.hash_cache {
            return h;
        }
        let h = self.hash_with_mask(mask);
        self.hash_cache = Some(h);
        h
    }

    pub fn invalidate(&mut self) {
        self.hash_cache = None;
    }
}

/// Strip digits and whitespace, then apply a UTF-8-safe truncation to
/// `WidgetKeyMask::text_limit` bytes: a cut that would bisect a
/// multi-byte character is pushed forward to the next boundary.
pub fn normalize_text(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_digit() && !c.is_whitespace()).collect()
}

/// UTF-8-safe truncation: never split a multi-byte character.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end += 1;
    }
    &s[..end.min(s.len())]
}

fn derive_operate_mask(node: &ElementNode, scroll_type: ScrollType) -> u32 {
    let mut mask = 0u32;
    if node.clickable || node.checkable {
        mask |= OperateType::Click.bit();
    }
    if node.long_clickable {
        mask |= OperateType::LongClick.bit();
    }
    if node.scrollable {
        match scroll_type {
            ScrollType::Vertical => {
                mask |= OperateType::ScrollTopDown.bit();
                mask |= OperateType::ScrollBottomUp.bit();
            }
            ScrollType::Horizontal => {
                mask |= OperateType::ScrollLeftRight.bit();
                mask |= OperateType::ScrollRightLeft.bit();
            }
            ScrollType::All => {
                mask |= OperateType::ScrollTopDown.bit();
                mask |= OperateType::ScrollBottomUp.bit();
                mask |= OperateType::ScrollLeftRight.bit();
                mask |= OperateType::ScrollRightLeft.bit();
            }
            ScrollType::None => {}
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementTree;

    fn clickable_button(tree: &mut ElementTree) -> NodeId {
        let id = tree.push(None);
        let n = tree.get_mut(id);
        n.class_name = "android.widget.Button".into();
        n.clickable = true;
        n.text = "Go".into();
        id
    }

    #[test]
    fn non_actionable_element_yields_no_widget() {
        let mut tree = ElementTree::new();
        let id = tree.push(None);
        tree.get_mut(id).class_name = "android.widget.TextView".into();
        assert!(Widget::from_element(&tree, id).is_none());
    }

    #[test]
    fn clickable_element_derives_click_action() {
        let mut tree = ElementTree::new();
        let id = clickable_button(&mut tree);
        let w = Widget::from_element(&tree, id).unwrap();
        assert_eq!(w.actions(), vec![OperateType::Click]);
    }

    #[test]
    fn vertical_scroll_derives_both_directions() {
        let mut tree = ElementTree::new();
        let id = tree.push(None);
        let n = tree.get_mut(id);
        n.class_name = "android.widget.ListView".into();
        n.scrollable = true;
        let w = Widget::from_element(&tree, id).unwrap();
        assert_eq!(
            w.actions(),
            vec![OperateType::ScrollTopDown, OperateType::ScrollBottomUp]
        );
    }

    #[test]
    fn text_over_limit_drops_from_hash() {
        let mut tree = ElementTree::new();
        let id = clickable_button(&mut tree);
        let base = Widget::from_element(&tree, id).unwrap();

        let mask_no_text = WidgetKeyMask {
            include_text: false,
            ..WidgetKeyMask::default()
        };
        let mask = WidgetKeyMask::default();

        let mut at_limit = base.clone();
        at_limit.text = "a".repeat(mask.text_limit);
        let mut over_limit = base.clone();
        over_limit.text = "a".repeat(mask.text_limit + 1);

        let baseline = base.hash_with_mask(&mask_no_text);
        assert_ne!(at_limit.hash_with_mask(&mask), baseline);
        assert_eq!(over_limit.hash_with_mask(&mask), baseline);
    }

    #[test]
    fn truncation_never_bisects_a_multibyte_char() {
        let s = "a\u{00e9}b";
        let cut = truncate_utf8(s, 2);
        assert!(s.is_char_boundary(cut.len()));
    }
}
