// src/format/xml_tree.rs
//! Minimal element tree over quick-xml, enough for TMX and TSX documents.

use crate::error::MapError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

fn xml_error(path: &Path, error: impl ToString) -> MapError {
    MapError::Xml {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parses an attribute, `Ok(None)` when it is absent.
    pub fn parse_attr<T: FromStr>(&self, key: &str) -> Result<Option<T>, MapError> {
        self.attr(key)
            .map(|raw| {
                raw.trim().parse().map_err(|_| MapError::InvalidValue {
                    context: format!("<{}>", self.name),
                    key: key.to_owned(),
                    value: raw.to_owned(),
                })
            })
            .transpose()
    }

    /// Tiled writes booleans as `0`/`1`; `true`/`false` is accepted too.
    pub fn bool_attr(&self, key: &str) -> Result<Option<bool>, MapError> {
        match self.attr(key) {
            None => Ok(None),
            Some("1") | Some("true") => Ok(Some(true)),
            Some("0") | Some("false") => Ok(Some(false)),
            Some(other) => Err(MapError::InvalidValue {
                context: format!("<{}>", self.name),
                key: key.to_owned(),
                value: other.to_owned(),
            }),
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Parses `text` and returns its root element.
    pub fn parse(path: &Path, text: &str) -> Result<XmlElement, MapError> {
        // Text is kept verbatim so string bodies keep their whitespace.
        let mut reader = Reader::from_str(text);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        loop {
            match reader.read_event().map_err(|e| xml_error(path, e))? {
                Event::Start(start) => stack.push(element_from(path, &start)?),
                Event::Empty(start) => {
                    let element = element_from(path, &start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| xml_error(path, "unbalanced closing tag"))?;
                    if !element.children.is_empty() && element.text.trim().is_empty() {
                        element.text.clear();
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&text.unescape().map_err(|e| xml_error(path, e))?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(xml_error(path, "unexpected end of document"));
        }
        root.ok_or_else(|| xml_error(path, "document has no root element"))
    }

    /// Serializes the tree behind an XML declaration.
    pub fn write(&self, path: &Path, indent: bool) -> Result<String, MapError> {
        let mut writer = if indent {
            Writer::new_with_indent(Vec::new(), b' ', 1)
        } else {
            Writer::new(Vec::new())
        };
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| xml_error(path, e))?;
        self.write_into(&mut writer)
            .map_err(|e| xml_error(path, e))?;

        let mut text =
            String::from_utf8(writer.into_inner()).map_err(|e| xml_error(path, e))?;
        text.push('\n');
        Ok(text)
    }

    fn write_into(&self, writer: &mut Writer<Vec<u8>>) -> std::io::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(into_io);
        }

        writer.write_event(Event::Start(start)).map_err(into_io)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(into_io)?;
        }
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(into_io)
    }
}

// Flattens writer errors into `std::io::Error`.
fn into_io<E: ToString>(error: E) -> std::io::Error {
    std::io::Error::other(error.to_string())
}

fn element_from(path: &Path, start: &BytesStart<'_>) -> Result<XmlElement, MapError> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| xml_error(path, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| xml_error(path, e))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_text() {
        let text = r#"<?xml version="1.0"?>
            <map width="2">
              <layer name="a &amp; b"><data encoding="csv">1,2,
3,4</data></layer>
              <objectgroup/>
            </map>"#;
        let root = XmlElement::parse(Path::new("m.tmx"), text).unwrap();
        assert_eq!(root.name, "map");
        assert_eq!(root.parse_attr::<usize>("width").unwrap(), Some(2));
        assert_eq!(root.children.len(), 2);

        let layer = root.child("layer").unwrap();
        assert_eq!(layer.attr("name"), Some("a & b"));
        assert_eq!(layer.child("data").unwrap().text, "1,2,\n3,4");
        assert!(root.child("objectgroup").unwrap().children.is_empty());
    }

    #[test]
    fn unbalanced_documents_are_errors() {
        let err = XmlElement::parse(Path::new("m.tmx"), "<map><layer></map>").unwrap_err();
        assert!(matches!(err, MapError::Xml { .. }));

        let err = XmlElement::parse(Path::new("m.tmx"), "<map>").unwrap_err();
        assert!(matches!(err, MapError::Xml { .. }));
    }

    #[test]
    fn invalid_attributes_name_the_element() {
        let root = XmlElement::parse(Path::new("m.tmx"), r#"<map width="wide" infinite="2"/>"#)
            .unwrap();
        let err = root.parse_attr::<usize>("width").unwrap_err();
        assert!(matches!(err, MapError::InvalidValue { ref context, .. } if context == "<map>"));
        assert!(root.bool_attr("infinite").is_err());
    }

    #[test]
    fn written_tree_reads_back() {
        let tree = XmlElement::new("tileset")
            .with_attr("name", "<terrain>")
            .with_child(XmlElement::new("image").with_attr("source", "a.png"))
            .with_child(XmlElement::new("data").with_text("1,2"));

        for indent in [true, false] {
            let text = tree.write(Path::new("t.tsx"), indent).unwrap();
            assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
            assert_eq!(XmlElement::parse(Path::new("t.tsx"), &text).unwrap(), tree);
        }
    }

    #[test]
    fn leaf_text_is_kept_verbatim() {
        let text = "<properties>\n  <property name=\"notes\">  two\nlines  </property>\n</properties>";
        let root = XmlElement::parse(Path::new("m.tmx"), text).unwrap();
        assert!(root.text.is_empty());
        assert_eq!(root.children[0].text, "  two\nlines  ");
    }
}
