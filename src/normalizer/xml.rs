//! Minimal element tree over quick-xml events.
//!
//! Message payloads are small XML documents; a tree is easier to query
//! than a streaming reader. Text and CDATA content are concatenated into
//! the enclosing element's `text`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("{0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("Unexpected closing tag </{0}>")]
    UnexpectedEnd(String),

    #[error("Unclosed element <{0}>")]
    Unclosed(String),

    #[error("Document has no root element")]
    Empty,

    #[error("Elements nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Deepest element nesting `parse` accepts.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let mut node = XmlNode {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Default::default()
        };
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attrs.push((key, value));
        }
        Ok(node)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s XmlNode> + 's {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated path of child names.
    pub fn at(&self, path: &str) -> Option<&XmlNode> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |node, name| node.child(name))
    }

    /// Trimmed text at `path`, `None` when absent or blank.
    pub fn text_at(&self, path: &str) -> Option<&str> {
        self.at(path)
            .map(|n| n.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// First element named `name` in document order, including `self`.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            if node.name == name {
                return Some(node);
            }
            pending.extend(node.children.iter().rev());
        }
        None
    }
}

/// Parse a document and return its root element.
///
/// # Errors
///
/// Fails on malformed markup, mismatched or unclosed tags, documents
/// without an element, and nesting deeper than [`MAX_DEPTH`].
pub fn parse(xml: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep(MAX_DEPTH));
                }
                stack.push(XmlNode::from_start(&start)?);
            }
            Event::Empty(start) => {
                let node = XmlNode::from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => {
                        root.get_or_insert(node);
                    }
                }
            }
            Event::End(end) => {
                let Some(node) = stack.pop() else {
                    return Err(XmlError::UnexpectedEnd(
                        String::from_utf8_lossy(end.name().as_ref()).into_owned(),
                    ));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => {
                        root.get_or_insert(node);
                    }
                }
            }
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }
    root.ok_or(XmlError::Empty)
}
