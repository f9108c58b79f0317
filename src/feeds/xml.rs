//! XML feed parsing: a small namespace-aware element tree plus the RSS, Atom
//! and generic-XML entry extractors built on it.
//!
//! The tree is built with `quick_xml::NsReader` so every element carries its
//! resolved namespace URI. Atom lookups are namespace-qualified; RSS and
//! generic XML match on local names only, since real-world RSS mixes in
//! `dc:`, `content:` and `media:` elements freely.

use crate::error::FormatError;
use crate::models::RawFeedEntry;
use crate::utils::collapse_whitespace;
use quick_xml::NsReader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use std::borrow::Cow;

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// One element of a parsed XML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Resolved namespace URI, if the element is in one.
    pub namespace: Option<String>,
    pub name: String,
    /// `(local name, value)` pairs.
    pub attributes: Vec<(String, String)>,
    /// Direct text content (text and CDATA of this element only).
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn open(ns: ResolveResult<'_>, start: &BytesStart<'_>) -> Result<Self, FormatError> {
        let namespace = match ns {
            ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
            _ => None,
        };
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| FormatError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(Cow::into_owned)
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            attributes.push((key, value));
        }
        Ok(Self {
            namespace,
            name,
            attributes,
            ..Default::default()
        })
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_ns(&self, namespace: &str, name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.name == name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed direct text, `None` when empty.
    pub fn text(&self) -> Option<String> {
        let text = collapse_whitespace(&self.text);
        if text.is_empty() { None } else { Some(text) }
    }

    /// Text of this element and all descendants, in document order.
    pub fn deep_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push(' ');
            out.push_str(&child.deep_text());
        }
        collapse_whitespace(&out)
    }

    /// First direct child whose local name matches one of `names`, tried in
    /// the order given.
    pub fn child_any(&self, names: &[&str]) -> Option<&XmlElement> {
        names
            .iter()
            .find_map(|name| self.children.iter().find(|c| c.is(name)))
    }

    pub fn child_ns(&self, namespace: &str, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is_ns(namespace, name))
    }

    /// All descendants (not including `self`) in document order.
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child);
            out.extend(child.descendants());
        }
        out
    }
}

/// Parse a complete XML document into its root element.
///
/// Fails on malformed markup or when the input holds no element at all (an
/// empty body, or JSON).
pub fn parse_document(bytes: &[u8]) -> Result<XmlElement, FormatError> {
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_resolved_event_into(&mut buf) {
            Ok((ns, Event::Start(e))) => stack.push(XmlElement::open(ns, &e)?),
            Ok((ns, Event::Empty(e))) => {
                let element = XmlElement::open(ns, &e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok((_, Event::End(_))) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| FormatError::Xml("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok((_, Event::Text(t))) => {
                if let Some(current) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&t);
                    match unescape(&raw) {
                        Ok(text) => current.text.push_str(&text),
                        Err(_) => current.text.push_str(&raw),
                    }
                }
            }
            Ok((_, Event::CData(c))) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok((_, Event::GeneralRef(r))) => {
                if let Some(current) = stack.last_mut() {
                    let name = String::from_utf8_lossy(&r);
                    current.text.push_str(&resolve_entity(&name));
                }
            }
            Ok((_, Event::Eof)) => break,
            Err(e) => return Err(FormatError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(FormatError::Xml("unexpected end of document".into()));
    }
    root.ok_or_else(|| FormatError::Xml("no root element".into()))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), FormatError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(FormatError::Xml("multiple root elements".into())),
    }
    Ok(())
}

/// Resolve `&name;`. Predefined and numeric references resolve; HTML
/// entities common in sloppy feeds map to their characters; anything else is
/// kept verbatim.
fn resolve_entity(name: &str) -> Cow<'static, str> {
    let reference = format!("&{name};");
    if let Ok(resolved) = unescape(&reference) {
        return Cow::Owned(resolved.into_owned());
    }
    match name {
        "nbsp" => Cow::Borrowed(" "),
        "mdash" => Cow::Borrowed("—"),
        "ndash" => Cow::Borrowed("–"),
        "hellip" => Cow::Borrowed("…"),
        "lsquo" | "rsquo" => Cow::Borrowed("'"),
        "ldquo" | "rdquo" => Cow::Borrowed("\""),
        _ => Cow::Owned(reference),
    }
}

/// Field names for one XML item shape, each tried in order.
struct ItemShape {
    item: &'static [&'static str],
    title: &'static [&'static str],
    link: &'static [&'static str],
    summary: &'static [&'static str],
    published: &'static [&'static str],
    category: &'static [&'static str],
}

const RSS_SHAPE: ItemShape = ItemShape {
    item: &["item"],
    title: &["title"],
    link: &["link"],
    summary: &["description"],
    published: &["pubDate", "date"],
    category: &["category"],
};

const GENERIC_SHAPE: ItemShape = ItemShape {
    item: &["item", "entry", "article"],
    title: &["title", "headline", "name"],
    link: &["link", "url", "guid", "id"],
    summary: &["description", "summary", "content", "encoded"],
    published: &["pubDate", "published", "date", "updated", "modified"],
    category: &["category", "section", "subject"],
};

fn extract_shape(root: &XmlElement, shape: &ItemShape) -> Vec<RawFeedEntry> {
    root.descendants()
        .into_iter()
        .filter(|el| shape.item.iter().any(|name| el.is(name)))
        .map(|item| RawFeedEntry {
            title: item
                .child_any(shape.title)
                .and_then(XmlElement::text)
                .unwrap_or_default(),
            link: item
                .child_any(shape.link)
                .and_then(|el| el.text().or_else(|| el.attr("href").map(str::to_string)))
                .unwrap_or_default(),
            raw_published: item.child_any(shape.published).and_then(XmlElement::text),
            raw_summary: item.child_any(shape.summary).and_then(XmlElement::text),
            raw_category: item
                .child_any(shape.category)
                .and_then(|el| el.text().or_else(|| el.attr("term").map(str::to_string))),
        })
        .collect()
}

/// Entries of an RSS 0.9x/2.0 document.
pub fn parse_rss(bytes: &[u8]) -> Result<Vec<RawFeedEntry>, FormatError> {
    let root = parse_document(bytes)?;
    Ok(extract_shape(&root, &RSS_SHAPE))
}

/// Entries of an arbitrary XML document that lists items.
pub fn parse_generic_xml(bytes: &[u8]) -> Result<Vec<RawFeedEntry>, FormatError> {
    let root = parse_document(bytes)?;
    Ok(extract_shape(&root, &GENERIC_SHAPE))
}

/// Entries of an Atom document, using namespace-qualified lookups.
pub fn parse_atom(bytes: &[u8]) -> Result<Vec<RawFeedEntry>, FormatError> {
    let root = parse_document(bytes)?;
    let entries = root
        .descendants()
        .into_iter()
        .filter(|el| el.is_ns(ATOM_NS, "entry"))
        .map(|entry| RawFeedEntry {
            title: entry
                .child_ns(ATOM_NS, "title")
                .map(XmlElement::deep_text)
                .unwrap_or_default(),
            link: atom_link(entry).unwrap_or_default(),
            raw_published: entry
                .child_ns(ATOM_NS, "published")
                .or_else(|| entry.child_ns(ATOM_NS, "updated"))
                .and_then(XmlElement::text),
            raw_summary: entry
                .child_ns(ATOM_NS, "summary")
                .or_else(|| entry.child_ns(ATOM_NS, "content"))
                .map(XmlElement::deep_text)
                .filter(|s| !s.is_empty()),
            raw_category: entry
                .child_ns(ATOM_NS, "category")
                .and_then(|el| el.attr("term").map(str::to_string)),
        })
        .collect();
    Ok(entries)
}

/// The `href` of the alternate link, or of the first link when none is
/// marked alternate.
fn atom_link(entry: &XmlElement) -> Option<String> {
    let links: Vec<&XmlElement> = entry
        .children
        .iter()
        .filter(|c| c.is_ns(ATOM_NS, "link"))
        .collect();
    links
        .iter()
        .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| l.attr("href"))
        .map(str::to_string)
}
