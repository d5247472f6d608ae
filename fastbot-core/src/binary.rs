//! Compact binary snapshot decoder. Byte-cursor style
//! follows `adamtc007-ob-poc/bpmn-lite/bpmn-lite-core/src/vm.rs`'s manual
//! opcode decoding: explicit offsets, `from_le_bytes`, no derive macros.

use crate::element::{ElementTree, NodeId};
use crate::error::ParseError;
use crate::rect::Rect;

const MAGIC: [u8; 4] = [0x46, 0x42, 0x00, 0x01];

const FLAG_CHECKABLE: u16 = 1;
const FLAG_CHECKED: u16 = 2;
const FLAG_CLICKABLE: u16 = 4;
const FLAG_ENABLED: u16 = 8;
const FLAG_FOCUSABLE: u16 = 16;
const FLAG_FOCUSED: u16 = 32;
const FLAG_SCROLLABLE: u16 = 64;
const FLAG_LONG_CLICKABLE: u16 = 128;
const FLAG_PASSWORD: u16 = 256;
const FLAG_SELECTED: u16 = 512;

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.pos + n > self.bytes.len() {
            return Err(ParseError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn i32le(&mut self) -> Result<i32, ParseError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i16le(&mut self) -> Result<i16, ParseError> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u16le(&mut self) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }
}

/// Parse a compact binary snapshot into an [`ElementTree`].
pub fn parse_binary(bytes: &[u8]) -> Result<ElementTree, ParseError> {
    if bytes.len() < 4 || bytes[0..4] != MAGIC {
        return Err(ParseError::BadMagic);
    }
    let mut cur = Cursor::new(&bytes[4..]);
    let mut tree = ElementTree::new();
    parse_node(&mut cur, &mut tree, None)?;
    Ok(tree)
}

fn parse_node(cur: &mut Cursor, tree: &mut ElementTree, parent: Option<NodeId>) -> Result<NodeId, ParseError> {
    let left = cur.i32le()?;
    let top = cur.i32le()?;
    let right = cur.i32le()?;
    let bottom = cur.i32le()?;
    let index = cur.i16le()?;
    let flags = cur.u16le()?;
    let num_strings = cur.u8()?;

    let id = tree.push(parent);
    {
        let node = tree.get_mut(id);
        node.bounds = Rect::new(left, top, right, bottom);
        node.index = index as i32;
        node.checkable = flags & FLAG_CHECKABLE != 0;
        node.checked = flags & FLAG_CHECKED != 0;
        node.clickable = flags & FLAG_CLICKABLE != 0;
        node.enabled = flags & FLAG_ENABLED != 0;
        node.focusable = flags & FLAG_FOCUSABLE != 0;
        node.focused = flags & FLAG_FOCUSED != 0;
        node.scrollable = flags & FLAG_SCROLLABLE != 0;
        node.long_clickable = flags & FLAG_LONG_CLICKABLE != 0;
        node.password = flags & FLAG_PASSWORD != 0;
        node.selected = flags & FLAG_SELECTED != 0;
    }

    for _ in 0..num_strings {
        let tag = cur.u8()?;
        let len = cur.u16le()? as usize;
        let bytes = cur.take(len)?;
        let s = String::from_utf8_lossy(bytes).into_owned();
        let node = tree.get_mut(id);
        match tag {
            0 => node.text = s,
            1 => node.resource_id = s,
            2 => node.class_name = s,
            3 => node.package_name = s,
            4 => node.content_desc = s,
            other => return Err(ParseError::Binary(format!("unknown string tag {other}"))),
        }
    }

    let num_children = cur.u16le()?;
    for _ in 0..num_children {
        parse_node(cur, tree, Some(id))?;
    }
    Ok(id)
}

/// Encode a subtree rooted at `id` into the compact binary format. The
/// inverse of [`parse_binary`].
pub fn serialize_binary(tree: &ElementTree, id: NodeId) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    write_node(tree, id, &mut out);
    out
}

fn write_node(tree: &ElementTree, id: NodeId, out: &mut Vec<u8>) {
    let n = tree.get(id);
    out.extend_from_slice(&n.bounds.left.to_le_bytes());
    out.extend_from_slice(&n.bounds.top.to_le_bytes());
    out.extend_from_slice(&n.bounds.right.to_le_bytes());
    out.extend_from_slice(&n.bounds.bottom.to_le_bytes());
    out.extend_from_slice(&(n.index as i16).to_le_bytes());

    let mut flags: u16 = 0;
    if n.checkable {
        flags |= FLAG_CHECKABLE;
    }
    if n.checked {
        flags |= FLAG_CHECKED;
    }
    if n.clickable {
        flags |= FLAG_CLICKABLE;
    }
    if n.enabled {
        flags |= FLAG_ENABLED;
    }
    if n.focusable {
        flags |= FLAG_FOCUSABLE;
    }
    if n.focused {
        flags |= FLAG_FOCUSED;
    }
    if n.scrollable {
        flags |= FLAG_SCROLLABLE;
    }
    if n.long_clickable {
        flags |= FLAG_LONG_CLICKABLE;
    }
    if n.password {
        flags |= FLAG_PASSWORD;
    }
    if n.selected {
        flags |= FLAG_SELECTED;
    }
    out.extend_from_slice(&flags.to_le_bytes());

    let strings: [(u8, &str); 5] = [
        (0, &n.text),
        (1, &n.resource_id),
        (2, &n.class_name),
        (3, &n.package_name),
        (4, &n.content_desc),
    ];
    let present: Vec<_> = strings.into_iter().filter(|(_, s)| !s.is_empty()).collect();
    out.push(present.len() as u8);
    for (tag, s) in present {
        out.push(tag);
        out.extend_from_slice(&(s.len() as u16).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    let children: Vec<NodeId> = tree.children(id).collect();
    out.extend_from_slice(&(children.len() as u16).to_le_bytes());
    for c in children {
        write_node(tree, c, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let err = parse_binary(&[0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ParseError::BadMagic));
    }

    #[test]
    fn round_trips_through_binary() {
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).class_name = "Root".into();
        tree.get_mut(root).text = "hi".into();
        tree.get_mut(root).clickable = true;
        let child = tree.push(Some(root));
        tree.get_mut(child).class_name = "Child".into();

        let bytes = serialize_binary(&tree, root);
        let tree2 = parse_binary(&bytes).unwrap();
        let root2 = tree2.root().unwrap();
        assert_eq!(tree2.get(root2).class_name, "Root");
        assert_eq!(tree2.get(root2).text, "hi");
        assert!(tree2.get(root2).clickable);
        assert_eq!(tree2.children(root2).count(), 1);
        assert_eq!(tree.hash(root, true), tree2.hash(root2, true));
    }
}
