//! Response body renderers.
//!
//! A renderer knows its content type and how to serialize itself; the
//! context decides the status and where the bytes go.

use std::fmt;
use std::io::Write;

use serde::Serialize;

use crate::error::{Result, RouterError};
use crate::response::{APPLICATION_JSON, TEXT_HTML, TEXT_PLAIN};
use crate::template::Templates;

/// Something that can be written as a response body.
pub trait Render {
    /// Value of the `Content-Type` header.
    fn content_type(&self) -> &'static str;

    /// Appends the serialized body to `out`.
    ///
    /// # Errors
    ///
    /// Serialization or template failures.
    fn render(&self, out: &mut Vec<u8>) -> Result<()>;
}

/// Plain text.
#[derive(Debug, Clone, Copy)]
pub struct Text<'a>(pub &'a str);

impl Render for Text<'_> {
    fn content_type(&self) -> &'static str {
        TEXT_PLAIN
    }

    fn render(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(())
    }
}

/// Plain text produced by `format_args!`.
#[derive(Debug, Clone, Copy)]
pub struct Formatted<'a>(pub fmt::Arguments<'a>);

impl Render for Formatted<'_> {
    fn content_type(&self) -> &'static str {
        TEXT_PLAIN
    }

    fn render(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_fmt(self.0)?;
        Ok(())
    }
}

/// A literal HTML document or fragment.
#[derive(Debug, Clone, Copy)]
pub struct Html<'a>(pub &'a str);

impl Render for Html<'_> {
    fn content_type(&self) -> &'static str {
        TEXT_HTML
    }

    fn render(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(())
    }
}

/// Any serializable value, as JSON.
#[derive(Debug, Clone, Copy)]
pub struct Json<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + ?Sized> Render for Json<'_, T> {
    fn content_type(&self) -> &'static str {
        APPLICATION_JSON
    }

    fn render(&self, out: &mut Vec<u8>) -> Result<()> {
        serde_json::to_writer(out, self.0)?;
        Ok(())
    }
}

/// A named template from a [`Templates`] collection.
pub struct Template<'a> {
    /// Where the template lives.
    pub templates: &'a dyn Templates,
    /// Template name.
    pub name: &'a str,
    /// Context passed to the template.
    pub data: serde_json::Value,
}

impl Render for Template<'_> {
    fn content_type(&self) -> &'static str {
        TEXT_HTML
    }

    fn render(&self, out: &mut Vec<u8>) -> Result<()> {
        let html = self.templates.render(self.name, &self.data)?;
        out.extend_from_slice(html.as_bytes());
        Ok(())
    }
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Template`] renderer, serializing `data` up front.
///
/// # Errors
///
/// `data` cannot be represented as JSON.
pub fn template<'a, T: Serialize + ?Sized>(
    templates: &'a dyn Templates,
    name: &'a str,
    data: &T,
) -> Result<Template<'a>> {
    let data = serde_json::to_value(data).map_err(RouterError::from)?;
    Ok(Template {
        templates,
        name,
        data,
    })
}
