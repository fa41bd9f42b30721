use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{Error, Result};

/// One element of a parsed XML document.
///
/// The tree is owned top-down; navigate with [`XmlElement::element_at_path`] and
/// friends rather than by walking back to a parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified tag name, prefix included.
    pub name: String,

    /// Character data that sits directly inside this element, trimmed and
    /// concatenated across interleaved children. CDATA sections are included
    /// verbatim.
    pub text: String,

    /// Attributes with their values unescaped.
    pub attributes: BTreeMap<String, String>,

    /// Child elements in document order.
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Parse a complete document and return its root element.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| Error::Syntax { position: reader.buffer_position() as u64, source })?;

            match event {
                Event::Start(start) => {
                    let element = element_from_start(&start)
                        .map_err(|source| Error::Syntax { position: reader.buffer_position() as u64, source })?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start)
                        .map_err(|source| Error::Syntax { position: reader.buffer_position() as u64, source })?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(end) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::UnbalancedEnd(String::from_utf8_lossy(end.name().as_ref()).into_owned()))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|source| Error::Syntax { position: reader.buffer_position() as u64, source })?;
                        current.text.push_str(&text);
                    }
                }
                Event::CData(cdata) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&cdata));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.pop() {
            return Err(Error::Unclosed(open.name));
        }
        root.ok_or(Error::Empty)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// First element reached by following `path` (`/`-separated tag names)
    /// from this element. An empty path resolves to `self`.
    pub fn element_at_path(&self, path: &str) -> Option<&XmlElement> {
        self.elements_at_path(path).into_iter().next()
    }

    /// Every element reached by following `path`, across all branches, in
    /// document order.
    pub fn elements_at_path(&self, path: &str) -> Vec<&XmlElement> {
        let mut current = vec![self];
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|element| element.children.iter().filter(move |child| child.name == segment))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a XmlElement> + use<'a, 'n> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn child(&self, index: usize) -> Option<&XmlElement> { self.children.get(index) }

    pub fn attribute(&self, key: &str) -> Option<&str> { self.attributes.get(key).map(String::as_str) }

    /// Text of the first element at `path`, if any.
    pub fn text_at_path(&self, path: &str) -> Option<&str> {
        self.element_at_path(path).map(|element| element.text.as_str())
    }
}

impl FromStr for XmlElement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> { Self::parse(s.as_bytes()) }
}

fn element_from_start(start: &BytesStart<'_>) -> std::result::Result<XmlElement, quick_xml::Error> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.insert(key, value);
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        // Trailing top-level elements are not well-formed XML; keep the first root.
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Releases</title>
    <item id="1"><title>First &amp; best</title><size unit="MB">700</size></item>
    <item id="2"><title><![CDATA[Second <raw>]]></title></item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_builds_tree() {
        let root: XmlElement = FEED.parse().unwrap();

        assert_eq!(root.name, "rss");
        assert_eq!(root.attribute("version"), Some("2.0"));
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.child(0).unwrap().name, "channel");
        assert!(root.child(1).is_none());
    }

    #[test]
    fn test_text_is_unescaped_and_cdata_kept() {
        let root: XmlElement = FEED.parse().unwrap();
        let titles: Vec<_> = root
            .elements_at_path("channel/item/title")
            .into_iter()
            .map(|e| e.text.as_str())
            .collect();

        assert_eq!(titles, vec!["First & best", "Second <raw>"]);
    }

    #[test]
    fn test_element_at_path_returns_first_match() {
        let root: XmlElement = FEED.parse().unwrap();

        let item = root.element_at_path("channel/item").unwrap();
        assert_eq!(item.attribute("id"), Some("1"));
        assert_eq!(root.text_at_path("channel/item/size"), Some("700"));
        assert_eq!(root.element_at_path("channel/item/size").unwrap().attribute("unit"), Some("MB"));
    }

    #[test]
    fn test_empty_path_is_self_and_missing_path_is_none() {
        let root: XmlElement = FEED.parse().unwrap();

        assert_eq!(root.element_at_path("").unwrap().name, "rss");
        assert!(root.element_at_path("channel/missing/title").is_none());
        assert!(root.elements_at_path("nope").is_empty());
    }

    #[test]
    fn test_found_elements_outlive_path() {
        let root: XmlElement = FEED.parse().unwrap();
        let items = {
            let path = format!("{}/{}", "channel", "item");
            root.elements_at_path(&path)
        };
        assert_eq!(items.len(), 2);

        let sizes: Vec<&XmlElement> = {
            let name = String::from("size");
            items[0].children_named(&name).collect()
        };
        assert_eq!(sizes[0].text, "700");
    }

    #[test]
    fn test_self_closing_element() {
        let root: XmlElement = r#"<a><b flag="yes"/><b/></a>"#.parse().unwrap();

        assert_eq!(root.children_named("b").count(), 2);
        assert_eq!(root.child(0).unwrap().attribute("flag"), Some("yes"));
        assert!(root.child(1).unwrap().attributes.is_empty());
    }

    #[test]
    fn test_mismatched_tags_are_syntax_errors() {
        let err = XmlElement::parse(b"<a><b></a>").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn test_unclosed_document_is_rejected() {
        assert!(XmlElement::parse(b"<a><b>text</b>").is_err());
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(XmlElement::parse(b"").unwrap_err(), Error::Empty));
        assert!(matches!(XmlElement::parse(b"  \n ").unwrap_err(), Error::Empty));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, FEED).unwrap();

        let root = XmlElement::from_file(&path).unwrap();
        assert_eq!(root.text_at_path("channel/title"), Some("Releases"));

        assert!(matches!(XmlElement::from_file(dir.path().join("missing.xml")), Err(Error::Io(_))));
    }
}
