//! The stored record model.
//!
//! A [`VectorRecord`] is one product entity: an opaque id, up to two
//! embeddings living in independent spaces (text and image), and metadata
//! that the engine passes through unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An independent embedding space for the same logical entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Natural-language text.
    Text,
    /// Image bytes.
    Image,
}

impl Modality {
    /// Both modalities, text first.
    pub const ALL: [Modality; 2] = [Modality::Text, Modality::Image];

    /// Lowercase name used in logs and serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured dimensionality per modality for one backend instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Text embedding length.
    pub text: usize,
    /// Image embedding length.
    pub image: usize,
}

impl Dimensions {
    /// Create a dimension pair.
    pub fn new(text: usize, image: usize) -> Self {
        Self { text, image }
    }

    /// The configured length for `modality`.
    pub fn for_modality(&self, modality: Modality) -> usize {
        match modality {
            Modality::Text => self.text,
            Modality::Image => self.image,
        }
    }

    /// Reject a vector whose length differs from the configured one.
    pub fn check(&self, modality: Modality, vector: &[f32]) -> Result<()> {
        let expected = self.for_modality(modality);
        if vector.len() != expected {
            return Err(Error::validation(format!(
                "{modality} embedding has {} dimensions, expected {expected}",
                vector.len()
            )));
        }
        Ok(())
    }
}

/// A scalar metadata value.
///
/// Variant order matters for untagged deserialization: integers are tried
/// before floats so `3` stays an `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Integral number.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Free text.
    Text(String),
}

impl MetadataValue {
    /// Borrow the string value, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Record metadata, ordered by key for stable serialization.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// One stored product entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Opaque unique identifier.
    pub id: String,
    /// Text embedding, if the product has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,
    /// Image embedding, if the product has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
    /// Pass-through metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Set by the backend on first write.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the backend on every write.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl VectorRecord {
    /// Create a record with no embeddings.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text_embedding: None,
            image_embedding: None,
            metadata: Metadata::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Set the text embedding.
    pub fn with_text_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.text_embedding = Some(embedding);
        self
    }

    /// Set the image embedding.
    pub fn with_image_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.image_embedding = Some(embedding);
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a single metadata entry.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The embedding stored for `modality`.
    pub fn embedding(&self, modality: Modality) -> Option<&[f32]> {
        match modality {
            Modality::Text => self.text_embedding.as_deref(),
            Modality::Image => self.image_embedding.as_deref(),
        }
    }

    /// Check the record against the configured dimensions.
    ///
    /// Fails with [`Error::Validation`] on an empty id, a record without any
    /// embedding, a wrong-length vector, or a non-finite number in an
    /// embedding or in the metadata.
    pub fn validate(&self, dimensions: &Dimensions) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("record id must not be empty"));
        }
        if self.text_embedding.is_none() && self.image_embedding.is_none() {
            return Err(Error::validation(format!(
                "record '{}' has neither a text nor an image embedding",
                self.id
            )));
        }
        for modality in Modality::ALL {
            if let Some(vector) = self.embedding(modality) {
                dimensions.check(modality, vector).map_err(|e| {
                    Error::validation(format!("record '{}': {e}", self.id))
                })?;
                if vector.iter().any(|x| !x.is_finite()) {
                    return Err(Error::validation(format!(
                        "record '{}': {modality} embedding contains non-finite values",
                        self.id
                    )));
                }
            }
        }
        if let Some((key, _)) = self
            .metadata
            .iter()
            .find(|(_, v)| matches!(v, MetadataValue::Float(x) if !x.is_finite()))
        {
            return Err(Error::validation(format!(
                "record '{}': metadata '{key}' is not a finite number",
                self.id
            )));
        }
        Ok(())
    }

    /// Apply write timestamps.
    ///
    /// `created_at` is inherited from the record being replaced, if any.
    pub fn stamp(&mut self, existing_created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.created_at = Some(existing_created_at.unwrap_or(now));
        self.updated_at = Some(now);
    }
}
