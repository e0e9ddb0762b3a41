//! Streaming XML output.
//!
//! The emitter only needs a cursor-style writer; [`ElementWriter`] is that seam and
//! [`XmlElementWriter`] implements it on top of `quick-xml`.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{MappingError, MappingResult};

/// Cursor-style element writer.
pub trait ElementWriter {
    fn start_document(&mut self) -> MappingResult<()>;
    fn end_document(&mut self) -> MappingResult<()>;
    fn start_element(&mut self, name: &str) -> MappingResult<()>;
    /// Close the most recently opened element.
    fn end_element(&mut self) -> MappingResult<()>;
    /// Write escaped character data into the currently open element.
    fn write_text(&mut self, text: &str) -> MappingResult<()>;
}

/// Output options for [`XmlElementWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlWriterOptions {
    /// Write `<?xml version="1.0" encoding="UTF-8"?>` at document start.
    pub declaration: bool,
    /// Indent nested elements by this many spaces. `None` writes everything on one line.
    pub indent: Option<usize>,
}

impl Default for XmlWriterOptions {
    fn default() -> Self {
        Self {
            declaration: true,
            indent: None,
        }
    }
}

/// [`ElementWriter`] over any `io::Write`.
pub struct XmlElementWriter<W: Write> {
    writer: Writer<W>,
    open: Vec<String>,
    options: XmlWriterOptions,
}

impl<W: Write> XmlElementWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_options(inner, XmlWriterOptions::default())
    }

    pub fn with_options(inner: W, options: XmlWriterOptions) -> Self {
        let writer = match options.indent {
            Some(size) => Writer::new_with_indent(inner, b' ', size),
            None => Writer::new(inner),
        };
        Self {
            writer,
            open: Vec::new(),
            options,
        }
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write(&mut self, event: Event<'_>) -> MappingResult<()> {
        self.writer.write_event(event).map_err(xml_error)
    }
}

impl XmlElementWriter<Vec<u8>> {
    /// A writer into memory without the XML declaration, convenient for fragments.
    pub fn fragment() -> Self {
        Self::with_options(
            Vec::new(),
            XmlWriterOptions {
                declaration: false,
                indent: None,
            },
        )
    }

    /// Consume the writer and return the produced text.
    pub fn into_string(self) -> MappingResult<String> {
        String::from_utf8(self.into_inner()).map_err(xml_error)
    }
}

impl<W: Write> ElementWriter for XmlElementWriter<W> {
    fn start_document(&mut self) -> MappingResult<()> {
        if self.options.declaration {
            self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        }
        Ok(())
    }

    fn end_document(&mut self) -> MappingResult<()> {
        if !self.open.is_empty() {
            return Err(MappingError::Xml {
                message: format!("document ended with unclosed elements: {}", self.open.join("/")),
            });
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }

    fn start_element(&mut self, name: &str) -> MappingResult<()> {
        self.write(Event::Start(BytesStart::new(name)))?;
        self.open.push(name.to_string());
        Ok(())
    }

    fn end_element(&mut self) -> MappingResult<()> {
        let Some(name) = self.open.pop() else {
            return Err(MappingError::Xml {
                message: "end_element called with no open element".to_string(),
            });
        };
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn write_text(&mut self, text: &str) -> MappingResult<()> {
        if self.open.is_empty() {
            return Err(MappingError::Xml {
                message: format!("text '{text}' written outside of any element"),
            });
        }
        if text.is_empty() {
            return Ok(());
        }
        self.write(Event::Text(BytesText::new(text)))
    }
}

fn xml_error(err: impl std::fmt::Display) -> MappingError {
    MappingError::Xml {
        message: err.to_string(),
    }
}
