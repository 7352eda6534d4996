// src/flowchart/mod.rs

//! Flowchart documents: the immutable graph a run traverses.
//!
//! - [`model`] is the JSON-backed data model (`nodes`, `connections`, `loops`).
//! - [`loader`] reads a document from disk.
//! - [`validate`] turns a raw document into a checked [`Flowchart`] and
//!   reports structural oddities (undeclared cycles, unreachable nodes).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_flowchart, parse_flowchart};
pub use model::{Connection, Flowchart, IncomingParam, Node, RawFlowchart};
pub use validate::analyze;
