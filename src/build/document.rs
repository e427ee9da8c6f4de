//! Project document tree
//!
//! The XML loader keeps elements, attributes and children in document
//! order. Flag aggregation and source enumeration depend on that order,
//! and include expansion splices subtrees in place.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::system::{self, Error};

/// One element of a project document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order
    pub attrs: Vec<(String, String)>,
    /// Text content, trimmed; CDATA sections are kept verbatim
    pub text: String,
    /// Child elements in document order
    pub children: Vec<Element>,
    /// 1-based line in the source file, for diagnostics
    pub line: u64,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child with the given name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Non-empty texts of all children with the given name, in order
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.children_named(name)
            .filter(|c| !c.text.is_empty())
            .map(|c| c.text.clone())
            .collect()
    }

    /// Serialize back to XML, for the `-x` dump
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out, 0);
        out
    }

    fn write_xml(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape_attr(v));
            out.push('"');
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push('>');
        out.push_str(&escape_text(&self.text));
        if !self.children.is_empty() {
            out.push('\n');
            for child in &self.children {
                child.write_xml(out, depth + 1);
            }
            for _ in 0..depth {
                out.push_str("  ");
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push_str(">\n");
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

/// Load an XML file into an element tree.
pub fn load<P>(path: P) -> Result<Element, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let text = system::read_file(path)?;
    parse(&text, &path.display().to_string())
}

/// Parse XML text into an element tree. `origin` names the source in
/// diagnostics.
pub fn parse(text: &str, origin: &str) -> Result<Element, Error> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let line = line_at(text, reader.buffer_position() as usize);
        match reader
            .read_event()
            .map_err(|e| Error::ParseXml(origin.to_string(), e.to_string()))?
        {
            Event::Start(e) => {
                let element = open_element(&e, line, origin)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = open_element(&e, line, origin)?;
                close_element(element, &mut stack, &mut root, origin)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    Error::ParseXml(origin.to_string(), "unexpected closing tag".to_string())
                })?;
                close_element(element, &mut stack, &mut root, origin)?;
            }
            Event::Text(e) => {
                let t = e
                    .unescape()
                    .map_err(|e| Error::ParseXml(origin.to_string(), e.to_string()))?;
                push_text(&mut stack, t.trim());
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                let t = String::from_utf8_lossy(&raw).into_owned();
                push_text(&mut stack, &t);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::ParseXml(
            origin.to_string(),
            "unclosed element at end of file".to_string(),
        ));
    }
    root.ok_or_else(|| Error::ParseXml(origin.to_string(), "no root element".to_string()))
}

fn open_element(
    e: &quick_xml::events::BytesStart<'_>,
    line: u64,
    origin: &str,
) -> Result<Element, Error> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::ParseXml(origin.to_string(), e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::ParseXml(origin.to_string(), e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        line,
        ..Default::default()
    })
}

fn close_element(
    element: Element,
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    origin: &str,
) -> Result<(), Error> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(Error::ParseXml(
                    origin.to_string(),
                    "content after the root element".to_string(),
                ));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(element) = stack.last_mut() {
        if !element.text.is_empty() {
            element.text.push(' ');
        }
        element.text.push_str(text);
    }
}

fn line_at(text: &str, pos: usize) -> u64 {
    let end = pos.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() as u64 + 1
}
