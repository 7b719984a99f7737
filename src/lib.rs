//! # Nebula Memory
//!
//! A TLSF (two-level segregated fit) allocator over a caller-supplied byte
//! buffer, plus a schema-driven view runtime for reading and writing typed
//! records directly against that buffer without code generation.
//!
//! - [`tlsf`] — the allocator itself: bit utilities, block header codec,
//!   size-class mapping, and `TlsfAllocator`.
//! - [`registry`] — the debug-only allocation ownership tree.
//! - [`schema`] — the layout model a [`view::RecordView`] interprets.
//! - [`view`] — field accessors: primitives, bit-fields, nested structs,
//!   fixed arrays, and the dynamic string/array/map/set/sparse-set/union
//!   containers.
//! - [`inspector`] — a read-only tree walker over a root pointer + schema.
//! - [`error`] — the crate's error taxonomy.

pub mod error;
pub mod inspector;
pub mod registry;
pub mod schema;
pub mod tlsf;
pub mod view;

pub use error::{AllocError, AllocErrorKind, AllocResult, SchemaResolutionError, ViewError, ViewResult};
pub use registry::{AllocationRegistry, OwnerTypeId};
pub use schema::{SchemaLayout, SchemaRegistry};
pub use tlsf::{Pointer, TlsfAllocator};
pub use view::RecordView;
