//! Generic XML events and the tokenizer that produces them.
//!
//! The model builder never talks to an XML library directly. It consumes a
//! finite sequence of [`XmlEvent`]s from any [`XmlEventSource`]; the default
//! source wraps `quick-xml`.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, XmlError};

/// One attribute of a start element, already unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A tokenizer event in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartElement {
        name: String,
        attributes: Vec<Attribute>,
    },
    EndElement {
        name: String,
    },
    /// Non-whitespace character data.
    Text(String),
}

impl XmlEvent {
    /// Convenience constructor for tests and synthetic sources.
    pub fn start(name: &str, attributes: &[(&str, &str)]) -> Self {
        Self::StartElement {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| Attribute::new(*k, *v))
                .collect(),
        }
    }

    pub fn end(name: &str) -> Self {
        Self::EndElement {
            name: name.to_string(),
        }
    }
}

/// Produces a finite, restartable event sequence.
///
/// Calling [`events`](Self::events) twice yields the same sequence.
pub trait XmlEventSource {
    fn events(&self) -> Result<Vec<XmlEvent>>;
}

impl XmlEventSource for [XmlEvent] {
    fn events(&self) -> Result<Vec<XmlEvent>> {
        Ok(self.to_vec())
    }
}

impl XmlEventSource for Vec<XmlEvent> {
    fn events(&self) -> Result<Vec<XmlEvent>> {
        Ok(self.clone())
    }
}

/// Tokenizes an XML document held in memory.
#[derive(Debug, Clone, Copy)]
pub struct QuickXmlSource<'a> {
    text: &'a str,
}

impl<'a> QuickXmlSource<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }
}

impl XmlEventSource for QuickXmlSource<'_> {
    fn events(&self) -> Result<Vec<XmlEvent>> {
        let mut reader = Reader::from_str(self.text);
        reader.config_mut().trim_text(true);

        let mut events = Vec::new();
        let mut depth = 0usize;
        loop {
            let position = reader.buffer_position() as u64;
            let event = reader.read_event().map_err(|e| malformed(position, e))?;
            match event {
                Event::Start(e) => {
                    depth += 1;
                    events.push(XmlEvent::StartElement {
                        name: decode_name(e.name().as_ref()),
                        attributes: read_attributes(&e, position)?,
                    });
                }
                Event::Empty(e) => {
                    let name = decode_name(e.name().as_ref());
                    events.push(XmlEvent::StartElement {
                        name: name.clone(),
                        attributes: read_attributes(&e, position)?,
                    });
                    events.push(XmlEvent::EndElement { name });
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    events.push(XmlEvent::EndElement {
                        name: decode_name(e.name().as_ref()),
                    });
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| malformed(position, e))?;
                    if !text.trim().is_empty() {
                        events.push(XmlEvent::Text(text.into_owned()));
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    events.push(XmlEvent::Text(text));
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctype.
                _ => {}
            }
        }

        if depth != 0 {
            return Err(XmlError::Malformed {
                position: reader.buffer_position() as u64,
                detail: format!("{depth} element(s) left unclosed at end of document"),
            });
        }
        tracing::trace!(events = events.len(), "tokenized model description");
        Ok(events)
    }
}

fn read_attributes(
    start: &quick_xml::events::BytesStart<'_>,
    position: u64,
) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(position, e))?;
        let value = attr.unescape_value().map_err(|e| malformed(position, e))?;
        attributes.push(Attribute {
            name: decode_name(attr.key.as_ref()),
            value: value.into_owned(),
        });
    }
    Ok(attributes)
}

fn decode_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn malformed(position: u64, err: impl std::fmt::Display) -> XmlError {
    XmlError::Malformed {
        position,
        detail: err.to_string(),
    }
}
