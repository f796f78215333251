//! Outbound collaborators of the widget engine.
//!
//! Each collaborator is an async trait with an HTTP implementation; the
//! directory and branch services also come with TTL-caching wrappers.
//! [`QueryExecutor`] fans composed queries out to the analytics store.

mod analytics;
mod branches;
mod directory;
mod executor;
mod http;
mod retry;

pub use analytics::{
    AnalyticsStore, HttpAnalyticsStore, SearchOutcome, SearchRequest,
};
pub use branches::{BranchService, CachedBranchService, HttpBranchService};
pub use directory::{CachedOrganizationDirectory, HttpOrganizationDirectory, OrganizationDirectory};
pub use executor::{ExecutorConfig, QueryExecutor};
pub use http::{HttpServiceConfig, StoreError};
