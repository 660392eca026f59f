//! Namespaces and small `roxmltree` helpers for WordprocessingML.

use roxmltree::Node;

pub const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const M: &str = "http://schemas.openxmlformats.org/officeDocument/2006/math";
pub const WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
pub const A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
pub const PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const V: &str = "urn:schemas-microsoft-com:vml";

/// Whether `node` is the element `{ns}name`.
pub fn is(node: Node, ns: &str, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(ns)
}

pub fn is_w(node: Node, name: &str) -> bool {
    is(node, W, name)
}

/// First child element `{ns}name`.
pub fn child<'a, 'i>(node: Node<'a, 'i>, ns: &str, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|c| is(*c, ns, name))
}

pub fn w_child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    child(node, W, name)
}

/// First descendant element `{ns}name` (including `node` itself).
pub fn descendant<'a, 'i>(node: Node<'a, 'i>, ns: &str, name: &str) -> Option<Node<'a, 'i>> {
    node.descendants().find(|c| is(*c, ns, name))
}

/// `w:val` style attribute in the main namespace.
pub fn w_attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((W, name))
}

/// `w:val` of the child `w:{name}`.
pub fn w_val<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    w_child(node, name).and_then(|c| w_attr(c, "val"))
}

/// OOXML on/off property: present without `w:val`, or with a truthy value.
pub fn toggle(node: Node, name: &str) -> Option<bool> {
    let prop = w_child(node, name)?;
    Some(match w_attr(prop, "val") {
        None => true,
        Some(v) => !matches!(v, "0" | "false" | "off" | "none"),
    })
}

pub fn parse(xml: &str) -> Result<roxmltree::Document<'_>, roxmltree::Error> {
    roxmltree::Document::parse_with_options(
        xml,
        roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        },
    )
}

/// Text of a block container: `w:t`, tabs and breaks of every paragraph,
/// paragraphs joined with newlines. Deleted text (`w:delText`) is excluded.
pub fn block_text(node: Node) -> String {
    let mut paragraphs = Vec::new();
    for p in node.descendants().filter(|n| is_w(*n, "p")) {
        // Nested paragraphs (text boxes) are reached on their own.
        paragraphs.push(paragraph_text(p));
    }
    paragraphs.join("\n").trim().to_string()
}

/// Plain text of one paragraph, skipping nested paragraphs.
pub fn paragraph_text(p: Node) -> String {
    let mut out = String::new();
    for node in p.descendants().skip(1) {
        if node
            .ancestors()
            .skip(1)
            .take_while(|a| *a != p)
            .any(|a| is_w(a, "p") || is_w(a, "del"))
        {
            continue;
        }
        if is_w(node, "t") {
            out.push_str(node.text().unwrap_or(""));
        } else if is_w(node, "tab") && node.parent().map(|r| is_w(r, "r")).unwrap_or(false) {
            out.push('\t');
        } else if is_w(node, "br") || is_w(node, "cr") {
            out.push('\n');
        }
    }
    out
}
