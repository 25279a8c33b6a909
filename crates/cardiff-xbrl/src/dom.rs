//! Tolerant document tree for XBRL and inline-XBRL input.
//!
//! Bulk accounts documents are frequently malformed: stray end tags,
//! unclosed presentational markup, HTML void elements and undeclared
//! entities all occur in the wild. This module builds a read-only element
//! arena from a `quick-xml` event stream in recovery mode, keeping
//! everything parsed up to the first unrecoverable reader error rather
//! than failing the document.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ExtractError, Result};

/// HTML elements that never carry content; treated as self-closing even
/// when the source omits the closing slash.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Local name of subtrees whose text is filtered from fact content.
const EXCLUDE_LOCAL_NAME: &str = "exclude";

/// A child slot of an element: either a nested element or a run of text.
#[derive(Debug)]
enum Child {
    Element(usize),
    Text(String),
}

/// One element of the parsed document.
#[derive(Debug)]
struct Element {
    local_name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Child>,
}

/// A parsed accounts document: a flat arena of elements in document order.
#[derive(Debug, Default)]
pub(crate) struct Document {
    elements: Vec<Element>,
    roots: Vec<usize>,
}

impl Document {
    /// Parse a byte buffer into a document tree.
    ///
    /// A UTF-8 byte-order mark or any other bytes before the first `<` are
    /// discarded. Mismatched and stray end tags are recovered from; a hard
    /// reader error mid-document keeps everything parsed so far. Only input
    /// yielding no elements at all is an error.
    pub(crate) fn parse(content: &[u8]) -> Result<Self> {
        let start = content
            .iter()
            .position(|&b| b == b'<')
            .ok_or_else(|| ExtractError::BadXml("no markup found".to_string()))?;

        let mut reader = Reader::from_reader(&content[start..]);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut doc = Self::default();
        // Indices of currently open elements, innermost last.
        let mut stack: Vec<usize> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let id = doc.push_element(e, &stack);
                    if !VOID_ELEMENTS.contains(&doc.elements[id].local_name.as_str()) {
                        stack.push(id);
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    doc.push_element(e, &stack);
                }
                Ok(Event::End(ref e)) => {
                    let local = local_name(&String::from_utf8_lossy(e.name().as_ref()));
                    // Close through to the innermost open element of the same
                    // name; an end tag that matches nothing is dropped.
                    if let Some(pos) = stack
                        .iter()
                        .rposition(|&id| doc.elements[id].local_name == local)
                    {
                        stack.truncate(pos);
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map(|t| t.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(e.as_ref()).into_owned());
                    doc.push_text(&stack, text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    doc.push_text(&stack, text);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    if doc.elements.is_empty() {
                        return Err(ExtractError::BadXml(err.to_string()));
                    }
                    log::warn!("recovered partial document after XML error: {err}");
                    break;
                }
            }
            buf.clear();
        }

        if doc.elements.is_empty() {
            return Err(ExtractError::BadXml("document has no elements".to_string()));
        }
        Ok(doc)
    }

    fn push_element(&mut self, start: &BytesStart<'_>, stack: &[usize]) -> usize {
        let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes().with_checks(false).flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            attrs.push((key, value));
        }

        let id = self.elements.len();
        self.elements.push(Element {
            local_name: local_name(&raw_name),
            attrs,
            children: Vec::new(),
        });
        match stack.last() {
            Some(&parent) => self.elements[parent].children.push(Child::Element(id)),
            None => self.roots.push(id),
        }
        id
    }

    fn push_text(&mut self, stack: &[usize], text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(&parent) = stack.last() {
            self.elements[parent].children.push(Child::Text(text));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.elements.len()
    }

    /// All element ids in document order.
    pub(crate) fn element_ids(&self) -> impl Iterator<Item = usize> + '_ {
        0..self.elements.len()
    }

    /// Namespace-stripped tag name of an element.
    pub(crate) fn local_name(&self, id: usize) -> &str {
        &self.elements[id].local_name
    }

    /// Attribute value by local attribute name (prefix-insensitive).
    ///
    /// `xmlns` declarations are not addressable through this lookup; use
    /// [`Document::root_namespaces`] for those.
    pub(crate) fn attr(&self, id: usize, name: &str) -> Option<&str> {
        self.elements[id]
            .attrs
            .iter()
            .find(|(key, _)| !key.starts_with("xmlns") && local_name(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements of an element, in document order.
    pub(crate) fn child_elements(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.elements[id].children.iter().filter_map(|child| match child {
            Child::Element(child_id) => Some(*child_id),
            Child::Text(_) => None,
        })
    }

    /// Concatenated text of the element and its descendants, in document
    /// order, with every `exclude` subtree contributing nothing.
    pub(crate) fn text(&self, id: usize) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: usize, out: &mut String) {
        for child in &self.elements[id].children {
            match child {
                Child::Text(text) => out.push_str(text),
                Child::Element(child_id) => {
                    if self.elements[*child_id].local_name != EXCLUDE_LOCAL_NAME {
                        self.collect_text(*child_id, out);
                    }
                }
            }
        }
    }

    /// First descendant element (document order) with local name `span`.
    pub(crate) fn first_span(&self, id: usize) -> Option<usize> {
        for child in &self.elements[id].children {
            if let Child::Element(child_id) = child {
                if self.elements[*child_id].local_name == "span" {
                    return Some(*child_id);
                }
                if let Some(found) = self.first_span(*child_id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Namespace URIs declared on the document root.
    pub(crate) fn root_namespaces(&self) -> Vec<&str> {
        let Some(&root) = self.roots.first() else {
            return Vec::new();
        };
        self.elements[root]
            .attrs
            .iter()
            .filter(|(key, _)| key == "xmlns" || key.starts_with("xmlns:"))
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

/// Strip any `prefix:` from a tag or attribute name.
fn local_name(raw: &str) -> String {
    match raw.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => raw.to_string(),
    }
}
