//! Per-document metadata side-table for a search index.
//!
//! A structure stores one or more named string attributes ("keys") for every
//! document in a dense id space, and optionally resolves attribute values back
//! to the document that holds them. Structures are written once through a
//! [`builder::MetaIndexBuilder`] and served read-only by a
//! [`reader::MetaIndex`].
//!
//! Format Overview
//!
//! <index path>/
//!     ├── <prefix>.properties          (flat key=value store: schema + registrations)
//!     ├── <prefix>.<structure>.docmeta (single blob, see below)
//!
//! <prefix>.<structure>.docmeta
//!     ├── magic
//!     ├── forward-<key>   (Arrow IPC file, one Binary column, one batch per block)
//!     ├── reverse-<key>   (optional Arrow IPC file, value -> document id)
//!     ├── resolution JSON (section name -> offset + size)
//!     ├── resolution length + magic

pub mod artifact;
pub mod builder;
pub mod error;
pub mod forward;
pub mod index;
pub mod layout;
pub mod reader;
pub mod registry;
pub mod reverse;
pub mod schema;
pub mod serializer;
pub mod stream;

/// Dense, 0-based document identifier assigned in append order.
pub type DocId = u32;

pub use builder::{BuilderOptions, BuilderState, MetaIndexBuilder};
pub use error::{MetaIndexError, MetaResult};
pub use index::IndexDirectory;
pub use reader::MetaIndex;
pub use registry::{Structure, StructureKind};
pub use schema::MetaSchema;
pub use stream::MetaIndexInputStream;
