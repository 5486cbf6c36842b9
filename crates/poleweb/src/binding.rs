//! Request body binding.
//!
//! A [`Binder`] decodes one body format into a target type. Before decoding,
//! the field names present in the body are checked against a [`Schema`]:
//! required fields must be present (a JSON `null` counts as absent) and,
//! when the schema denies unknown fields, nothing outside the schema may
//! appear. Arrays of records are checked element by element.

use std::collections::BTreeSet;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A body that decoded but does not satisfy its schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is absent.
    #[error("field [{0}] is required")]
    MissingField(String),

    /// A field outside the schema is present.
    #[error("unknown field [{0}]")]
    UnknownField(String),
}

/// Errors raised while binding a request body.
#[derive(Debug, Error)]
pub enum BindError {
    /// The body is empty.
    #[error("request body is empty")]
    EmptyBody,

    /// No binder handles the request's content type.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Malformed JSON.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed XML.
    #[error("invalid XML body: {0}")]
    Xml(String),

    /// Malformed urlencoded form.
    #[error("invalid form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    /// The body violates its schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Field names a body is expected to carry.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    required: BTreeSet<String>,
    optional: BTreeSet<String>,
    deny_unknown: bool,
}

impl Schema {
    /// A schema with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds required fields.
    #[must_use]
    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Adds optional fields. Only meaningful together with
    /// [`Schema::deny_unknown_fields`].
    #[must_use]
    pub fn optional<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Rejects fields that are neither required nor optional.
    #[must_use]
    pub fn deny_unknown_fields(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    /// Checks one record's field names.
    ///
    /// # Errors
    ///
    /// The first missing required field, then the first unknown field.
    pub fn check(&self, present: &BTreeSet<String>) -> Result<(), ValidationError> {
        if let Some(missing) = self.required.iter().find(|f| !present.contains(*f)) {
            return Err(ValidationError::MissingField(missing.clone()));
        }
        if self.deny_unknown {
            if let Some(unknown) = present
                .iter()
                .find(|f| !self.required.contains(*f) && !self.optional.contains(*f))
            {
                return Err(ValidationError::UnknownField(unknown.clone()));
            }
        }
        Ok(())
    }
}

/// A body format.
pub trait Binder {
    /// Content types (lowercase, without parameters) this binder accepts.
    fn content_types(&self) -> &'static [&'static str];

    /// Field names present in each record of `body`.
    ///
    /// # Errors
    ///
    /// The body is malformed for this format.
    fn records(&self, body: &[u8]) -> Result<Vec<BTreeSet<String>>, BindError>;

    /// Decodes `body` into `T` without schema checks.
    ///
    /// # Errors
    ///
    /// The body is malformed or does not fit `T`.
    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, BindError>;

    /// True if this binder handles `content_type`.
    fn accepts(&self, content_type: &str) -> bool {
        self.content_types().contains(&content_type)
    }

    /// Checks `body` against `schema`, then decodes it.
    ///
    /// # Errors
    ///
    /// [`BindError::EmptyBody`], a format error, or a
    /// [`BindError::Validation`].
    fn bind<T: DeserializeOwned>(&self, body: &[u8], schema: &Schema) -> Result<T, BindError> {
        if body.is_empty() {
            return Err(BindError::EmptyBody);
        }
        for record in self.records(body)? {
            schema.check(&record)?;
        }
        self.decode(body)
    }
}

/// JSON bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBinder;

impl Binder for JsonBinder {
    fn content_types(&self) -> &'static [&'static str] {
        &["application/json"]
    }

    fn records(&self, body: &[u8]) -> Result<Vec<BTreeSet<String>>, BindError> {
        fn fields(value: &serde_json::Value) -> Option<BTreeSet<String>> {
            value.as_object().map(|object| {
                object
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, _)| k.clone())
                    .collect()
            })
        }

        let value: serde_json::Value = serde_json::from_slice(body)?;
        Ok(match &value {
            serde_json::Value::Array(items) => items.iter().filter_map(fields).collect(),
            other => fields(other).into_iter().collect(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, BindError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// XML bodies. The root element is the record; its direct children are the
/// fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlBinder;

impl Binder for XmlBinder {
    fn content_types(&self) -> &'static [&'static str] {
        &["application/xml", "text/xml"]
    }

    fn records(&self, body: &[u8]) -> Result<Vec<BTreeSet<String>>, BindError> {
        let mut reader = Reader::from_reader(body);
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut fields = BTreeSet::new();

        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| BindError::Xml(e.to_string()))?
            {
                Event::Start(e) => {
                    depth += 1;
                    if depth == 2 {
                        fields.insert(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    }
                }
                Event::Empty(e) => {
                    if depth == 1 {
                        fields.insert(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    }
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(vec![fields])
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, BindError> {
        quick_xml::de::from_reader(body).map_err(|e| BindError::Xml(e.to_string()))
    }
}

/// `application/x-www-form-urlencoded` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormBinder;

impl Binder for FormBinder {
    fn content_types(&self) -> &'static [&'static str] {
        &["application/x-www-form-urlencoded"]
    }

    fn records(&self, body: &[u8]) -> Result<Vec<BTreeSet<String>>, BindError> {
        Ok(vec![form_urlencoded::parse(body)
            .map(|(key, _)| key.into_owned())
            .collect()])
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, BindError> {
        Ok(serde_urlencoded::from_bytes(body)?)
    }
}
