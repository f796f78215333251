//! Turns widget query templates into store-ready requests.
//!
//! [`derive_bindings`] fills in the period and histogram bindings callers
//! leave out, [`render_queries`] substitutes `$name` placeholders, and
//! [`FilterComposer`] injects the runtime filters of the request.

mod compose;
mod derive;
mod substitute;

pub use compose::{BaseFilters, FilterComposer, BRANCH_ID_FIELD};
pub use derive::{derive_bindings, format_date};
pub use substitute::{check_declared, render_queries, substitute, RenderedQuery};
