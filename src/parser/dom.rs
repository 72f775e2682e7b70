//! Best-effort markup tree for documents that may not be well formed.
//!
//! Generated quiz banks routinely arrive with missing end tags, stray
//! closing tags, bare ampersands, or prose glued around the markup. The
//! reader here never refuses a document: it keeps whatever tree it can
//! build, and `repair_markup` gives a second chance to input the lenient
//! pass could not use at all.

use std::sync::LazyLock;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

/// Synthetic element wrapped around repaired markup so that fragments
/// with no single root still parse.
const RECOVERY_ROOT: &str = "ROOT";

static PROLOG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<\?xml.*?\?>").unwrap());

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// An element with its original tag casing, attribute order, and children.
#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Attribute value by case-insensitive name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First element named `name` (case-insensitive), checking self before
    /// descendants in document order.
    pub fn find_named(&self, name: &str) -> Option<&Element> {
        if self.name.eq_ignore_ascii_case(name) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find_named(name))
    }

    /// Every descendant named `name` (case-insensitive) in document order,
    /// including matches nested inside other matches. Recovery from a
    /// missing end tag can leave one item inside another, and both must
    /// still be found.
    pub fn collect_named<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            if child.name.eq_ignore_ascii_case(name) {
                out.push(child);
            }
            child.collect_named(name, out);
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&mut out, &self.children);
        out
    }

    /// Serialization of the children only, original tag casing intact.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(&mut out, child);
        }
        out
    }

    /// Serialization including this element's own tags.
    pub fn outer_markup(&self) -> String {
        let mut out = String::new();
        write_element(&mut out, self);
        out
    }
}

fn collect_text(out: &mut String, children: &[Node]) {
    for child in children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(out, &el.children),
            Node::Comment(_) => {}
        }
    }
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Element(el) => write_element(out, el),
        Node::Text(text) => out.push_str(&partial_escape(text)),
        Node::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn write_element(out: &mut String, el: &Element) {
    out.push('<');
    out.push_str(&el.name);
    for (key, value) in &el.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        write_node(out, child);
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

/// Result of one lenient pass: the top-level forest plus the reader error
/// that stopped the pass early, if any. A partial forest is still usable.
#[derive(Debug)]
pub struct TreeBuild {
    pub roots: Vec<Node>,
    pub error: Option<String>,
}

/// Parse `xml` leniently into a forest. Mismatched end tags close the
/// nearest matching open element, stray end tags are dropped, elements
/// still open at the end of input are closed implicitly, and undecodable
/// entities fall back to their raw text.
pub fn build_tree(xml: &str) -> TreeBuild {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut roots: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut error = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(element_from_start(&e)),
            Ok(Event::Empty(e)) => {
                let el = element_from_start(&e);
                append(&mut roots, &mut stack, Node::Element(el));
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                append_text(&mut roots, &mut stack, &text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                append_text(&mut roots, &mut stack, &text);
            }
            Ok(Event::Comment(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                append(&mut roots, &mut stack, Node::Comment(text));
            }
            Ok(Event::End(e)) => close_element(&mut roots, &mut stack, e.name().as_ref()),
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, processing instructions, doctypes
            Err(e) => {
                error = Some(e.to_string());
                break;
            }
        }
        buf.clear();
    }

    // Whatever is still open closes implicitly, innermost first.
    while let Some(el) = stack.pop() {
        append(&mut roots, &mut stack, Node::Element(el));
    }

    TreeBuild { roots, error }
}

/// Second-chance rewrite for input the lenient pass choked on: drop the
/// prolog, escape markup characters that start neither a tag nor an
/// entity, and wrap everything in a synthetic root.
pub fn repair_markup(xml: &str) -> String {
    let stripped = PROLOG_RE.replace_all(xml, "");
    let escaped = escape_stray_markup(&stripped);
    format!("<{RECOVERY_ROOT}>{escaped}</{RECOVERY_ROOT}>")
}

fn element_from_start(e: &BytesStart) -> Element {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    // Malformed attributes are skipped rather than failing the element.
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.push((key, value));
    }
    Element {
        name,
        attrs,
        children: Vec::new(),
    }
}

fn append(roots: &mut Vec<Node>, stack: &mut [Element], node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn append_text(roots: &mut Vec<Node>, stack: &mut [Element], text: &str) {
    if text.is_empty() {
        return;
    }
    let children = match stack.last_mut() {
        Some(parent) => &mut parent.children,
        None => roots,
    };
    if let Some(Node::Text(prev)) = children.last_mut() {
        prev.push_str(text);
    } else {
        children.push(Node::Text(text.to_string()));
    }
}

fn close_element(roots: &mut Vec<Node>, stack: &mut Vec<Element>, name: &[u8]) {
    let name = String::from_utf8_lossy(name);
    let Some(pos) = stack
        .iter()
        .rposition(|el| el.name.eq_ignore_ascii_case(&name))
    else {
        return; // stray closing tag
    };
    while stack.len() > pos {
        if let Some(el) = stack.pop() {
            append(roots, stack, Node::Element(el));
        }
    }
}

fn escape_stray_markup(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.char_indices() {
        match ch {
            '<' if !starts_tag(bytes, i + 1) => out.push_str("&lt;"),
            '&' if !starts_entity(bytes, i + 1) => out.push_str("&amp;"),
            _ => out.push(ch),
        }
    }
    out
}

fn starts_tag(bytes: &[u8], at: usize) -> bool {
    matches!(
        bytes.get(at),
        Some(b) if b.is_ascii_alphabetic() || matches!(b, b'_' | b'/' | b'!' | b'?')
    )
}

fn starts_entity(bytes: &[u8], at: usize) -> bool {
    let mut rest = match bytes.get(at..) {
        Some(rest) => rest,
        None => return false,
    };
    if rest.first() == Some(&b'#') {
        rest = &rest[1..];
        if matches!(rest.first(), Some(b'x') | Some(b'X')) {
            rest = &rest[1..];
        }
        let digits = rest.iter().take_while(|b| b.is_ascii_alphanumeric()).count();
        return digits > 0 && rest.get(digits) == Some(&b';');
    }
    let name = rest.iter().take_while(|b| b.is_ascii_alphanumeric()).count();
    name > 0 && rest.get(name) == Some(&b';')
}

// ── Tests ──────────────────────────────────────────────────────────
