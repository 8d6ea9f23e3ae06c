//! Core types for Vitrine multi-modal product search.
//!
//! This crate holds what every other Vitrine crate agrees on:
//!
//! - [`Error`] and [`Result`]: the shared error taxonomy
//! - [`VectorRecord`]: one stored product with its text/image embeddings
//! - [`Modality`] and [`Dimensions`]: the two embedding spaces and their sizes

pub mod error;
pub mod record;

pub use error::{Error, Result};
pub use record::{Dimensions, Metadata, MetadataValue, Modality, VectorRecord};
