//! Widget definition catalogue.
//!
//! Definitions are parsed from JSON catalogue files once and published as an
//! immutable snapshot; `reload` swaps the whole snapshot so readers observe
//! either the old or the new catalogue, never a mix.

mod entry;
mod store;

pub use entry::{CatalogEntry, VariantEntry};
pub use store::{CatalogError, DefinitionSnapshot, DefinitionStore, ReloadReport};
