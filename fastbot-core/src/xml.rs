//! UI-Automator-style XML snapshot parsing, grounded
//! on the streaming-reader idiom in
//! `examples/adamtc007-ob-poc/bpmn-lite/bpmn-lite-core/src/compiler/parser.rs`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::element::{ElementTree, NodeId};
use crate::error::ParseError;
use crate::rect::Rect;

/// Accepts both full attribute names and the short-name alias set from
/// the UI-Automator XML dialect.
fn canonical_attr(name: &str) -> &str {
    match name {
        "bnd" => "bounds",
        "idx" => "index",
        "t" => "text",
        "rid" => "resource-id",
        "cd" => "content-desc",
        "pkg" => "package",
        "clk" => "clickable",
        "lclk" => "long-clickable",
        "ck" => "checkable",
        "cked" => "checked",
        "en" => "enabled",
        "fcd" => "focused",
        "foc" => "focusable",
        "scl" => "scrollable",
        "pwd" => "password",
        "sel" => "selected",
        other => other,
    }
}

/// Parses `"[<l>,<t>][<r>,<b>]"`, optional signs and decimal digits.
fn parse_bounds(s: &str) -> Option<Rect> {
    let s = s.trim();
    let s = s.strip_prefix('[')?;
    let (first, rest) = s.split_once(']')?;
    let rest = rest.strip_prefix('[')?;
    let (second, _) = rest.split_once(']')?;
    let (l, t) = first.split_once(',')?;
    let (r, b) = second.split_once(',')?;
    Some(Rect::new(
        l.trim().parse().ok()?,
        t.trim().parse().ok()?,
        r.trim().parse().ok()?,
        b.trim().parse().ok()?,
    ))
}

fn parse_bool(s: &str) -> bool {
    matches!(s, "true" | "True" | "1")
}

fn apply_attr(tree: &mut ElementTree, id: NodeId, key: &str, value: &str) {
    let key = canonical_attr(key);
    let node = tree.get_mut(id);
    match key {
        "bounds" => {
            if let Some(r) = parse_bounds(value) {
                node.bounds = r;
            }
        }
        "index" => node.index = value.parse().unwrap_or(0),
        "text" => node.text = value.to_string(),
        "resource-id" => node.resource_id = value.to_string(),
        "content-desc" => node.content_desc = value.to_string(),
        "package" => node.package_name = value.to_string(),
        "class" => node.class_name = value.to_string(),
        "clickable" => node.clickable = parse_bool(value),
        "long-clickable" => node.long_clickable = parse_bool(value),
        "checkable" => node.checkable = parse_bool(value),
        "checked" => node.checked = parse_bool(value),
        "enabled" => node.enabled = parse_bool(value),
        "focused" => node.focused = parse_bool(value),
        "focusable" => node.focusable = parse_bool(value),
        "scrollable" => node.scrollable = parse_bool(value),
        "password" => node.password = parse_bool(value),
        "selected" => node.selected = parse_bool(value),
        _ => {}
    }
}

fn unescape_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn apply_attrs(tree: &mut ElementTree, id: NodeId, tag: &BytesStart) -> Result<(), ParseError> {
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
        let value = unescape_entities(&raw);
        apply_attr(tree, id, &key, &value);
    }
    Ok(())
}

/// Build an [`ElementTree`] from a `<hierarchy>` document.
pub fn parse_xml(xml: &str) -> Result<ElementTree, ParseError> {
    let mut reader = Reader::from_str(xml);

    let mut tree = ElementTree::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut buf = Vec::new();
    let mut saw_hierarchy_root = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::Xml(e.to_string()))?;
        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Start(tag) | Event::Empty(tag) => {
                let local = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
                if local == "hierarchy" {
                    saw_hierarchy_root = true;
                    continue;
                }
                let parent = stack.last().copied();
                let id = tree.push(parent);
                apply_attrs(&mut tree, id, &tag)?;
                if is_start {
                    stack.push(id);
                }
            }
            Event::End(tag) => {
                let local = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
                if local != "hierarchy" {
                    stack.pop();
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_hierarchy_root && tree.root().is_none() {
        return Err(ParseError::Xml("missing <hierarchy> root".into()));
    }
    Ok(tree)
}

/// Reserialize a tree back to `<hierarchy>` XML, used for the round-trip
/// by `fastbot-cli` when replaying captured
/// fixtures.
pub fn to_xml(tree: &ElementTree) -> String {
    let mut out = String::from("<hierarchy>");
    if let Some(root) = tree.root() {
        write_node(tree, root, &mut out);
    }
    out.push_str("</hierarchy>");
    out
}

fn write_node(tree: &ElementTree, id: NodeId, out: &mut String) {
    let n = tree.get(id);
    out.push_str("<node");
    out.push_str(&format!(" class=\"{}\"", escape(&n.class_name)));
    out.push_str(&format!(" resource-id=\"{}\"", escape(&n.resource_id)));
    out.push_str(&format!(" text=\"{}\"", escape(&n.text)));
    out.push_str(&format!(" content-desc=\"{}\"", escape(&n.content_desc)));
    out.push_str(&format!(" package=\"{}\"", escape(&n.package_name)));
    out.push_str(&format!(
        " bounds=\"[{},{}][{},{}]\"",
        n.bounds.left, n.bounds.top, n.bounds.right, n.bounds.bottom
    ));
    out.push_str(&format!(" index=\"{}\"", n.index));
    out.push_str(&format!(" clickable=\"{}\"", n.clickable));
    out.push_str(&format!(" long-clickable=\"{}\"", n.long_clickable));
    out.push_str(&format!(" checkable=\"{}\"", n.checkable));
    out.push_str(&format!(" checked=\"{}\"", n.checked));
    out.push_str(&format!(" enabled=\"{}\"", n.enabled));
    out.push_str(&format!(" scrollable=\"{}\"", n.scrollable));
    out.push_str(&format!(" focusable=\"{}\"", n.focusable));
    out.push_str(&format!(" focused=\"{}\"", n.focused));
    out.push_str(&format!(" password=\"{}\"", n.password));
    out.push_str(&format!(" selected=\"{}\"", n.selected));
    let children: Vec<NodeId> = tree.children(id).collect();
    if children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for c in children {
        write_node(tree, c, out);
    }
    out.push_str("</node>");
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_button() {
        let xml = r#"<hierarchy><node bounds="[0,0][100,100]" clickable="true" class="android.widget.Button" text="Go"/></hierarchy>"#;
        let tree = parse_xml(xml).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(tree.get(root).class_name, "android.widget.Button");
        assert_eq!(tree.get(root).bounds, Rect::new(0, 0, 100, 100));
        assert!(tree.get(root).clickable);
        assert_eq!(tree.get(root).text, "Go");
    }

    #[test]
    fn accepts_short_name_aliases() {
        let xml = r#"<hierarchy><node bnd="[1,2][3,4]" clk="true" t="hi"/></hierarchy>"#;
        let tree = parse_xml(xml).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(tree.get(root).bounds, Rect::new(1, 2, 3, 4));
        assert!(tree.get(root).clickable);
        assert_eq!(tree.get(root).text, "hi");
    }

    #[test]
    fn nested_children_preserve_order() {
        let xml = r#"<hierarchy><node class="Root"><node class="A"/><node class="B"/></node></hierarchy>"#;
        let tree = parse_xml(xml).unwrap();
        let root = tree.root().unwrap();
        let kids: Vec<_> = tree.children(root).map(|c| tree.get(c).class_name.clone()).collect();
        assert_eq!(kids, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn round_trips_through_xml() {
        let xml = r#"<hierarchy><node class="Root" text="hi"><node class="Child"/></node></hierarchy>"#;
        let tree = parse_xml(xml).unwrap();
        let regenerated = to_xml(&tree);
        let tree2 = parse_xml(&regenerated).unwrap();
        assert_eq!(tree.hash(tree.root().unwrap(), true), tree2.hash(tree2.root().unwrap(), true));
    }
}
