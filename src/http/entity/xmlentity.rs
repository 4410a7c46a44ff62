//! XML document bodies.
//!
//! Documents are either built as an [`XmlElement`] tree or supplied as
//! text; both are checked with quick_xml before anything is sent.

use super::{BytesCursor, HttpEntity};
use crate::base::neterror::NetError;
use bytes::Bytes;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, element: XmlElement) -> Self {
        self.children.push(XmlNode::Element(element));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), NetError> {
        if self.name.is_empty() {
            return Err(NetError::InvalidArgument);
        }
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|_| NetError::InvalidContent);
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|_| NetError::InvalidContent)?;
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_to(writer)?,
                XmlNode::Text(t) => writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .map_err(|_| NetError::InvalidContent)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|_| NetError::InvalidContent)
    }
}

/// `text/xml` body holding a serialized document.
#[derive(Debug, Clone)]
pub struct XmlDomEntity {
    cursor: BytesCursor,
}

impl XmlDomEntity {
    /// Serializes `root` with a UTF-8 XML declaration.
    pub fn new(root: &XmlElement) -> Result<Self, NetError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|_| NetError::InvalidContent)?;
        root.write_to(&mut writer)?;
        Ok(Self {
            cursor: BytesCursor::new(Bytes::from(writer.into_inner())),
        })
    }

    /// Wraps an existing document. Fails with `InvalidArgument` unless it is
    /// well formed with a root element.
    pub fn from_document(xml: &str) -> Result<Self, NetError> {
        let mut reader = Reader::from_str(xml);
        let mut depth = 0usize;
        let mut roots = 0usize;
        loop {
            match reader.read_event() {
                Err(e) => {
                    tracing::debug!(error = %e, "rejecting malformed XML document");
                    return Err(NetError::InvalidArgument);
                }
                Ok(Event::Eof) => break,
                Ok(Event::Start(_)) => {
                    if depth == 0 {
                        roots += 1;
                    }
                    depth += 1;
                }
                Ok(Event::End(_)) => depth = depth.saturating_sub(1),
                Ok(Event::Empty(_)) if depth == 0 => roots += 1,
                Ok(_) => {}
            }
        }
        if depth != 0 || roots != 1 {
            return Err(NetError::InvalidArgument);
        }
        Ok(Self {
            cursor: BytesCursor::new(Bytes::copy_from_slice(xml.as_bytes())),
        })
    }
}

impl HttpEntity for XmlDomEntity {
    fn content_length(&self) -> i64 {
        self.cursor.len() as i64
    }

    fn content_type(&self) -> String {
        "text/xml; charset=UTF-8".to_string()
    }

    fn has_next_data(&mut self) -> Result<bool, NetError> {
        Ok(self.cursor.has_remaining())
    }

    fn next_data(&mut self, recommended_size: usize) -> Result<Bytes, NetError> {
        self.cursor.next(recommended_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::entity::read_to_end;

    #[test]
    fn test_serializes_tree() {
        let doc = XmlElement::new("order")
            .attr("id", "42")
            .child(XmlElement::new("item").text("tea & cake"))
            .child(XmlElement::new("gift"));
        let mut entity = XmlDomEntity::new(&doc).unwrap();
        let body = String::from_utf8(read_to_end(&mut entity, 8).unwrap()).unwrap();

        assert_eq!(
            body,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <order id=\"42\"><item>tea &amp; cake</item><gift/></order>"
        );
        assert_eq!(entity.content_type(), "text/xml; charset=UTF-8");
    }

    #[test]
    fn test_from_document() {
        let entity = XmlDomEntity::from_document("<a><b/></a>").unwrap();
        assert_eq!(entity.content_length(), 11);
    }

    #[test]
    fn test_malformed_document() {
        assert!(XmlDomEntity::from_document("<a><b></a>").is_err());
        assert!(XmlDomEntity::from_document("just text").is_err());
        assert!(XmlDomEntity::from_document("<a/><b/>").is_err());
    }
}
