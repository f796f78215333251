//! Shared data types for Beacon widget assembly.
//!
//! Definitions are read from catalogue files and never mutated; bindings, raw
//! results and outputs live for a single request.

pub mod bindings;
pub mod definition;
pub mod error;
pub mod organization;
pub mod output;
pub mod period;
pub mod raw;

pub use bindings::{names, BindingValue, Bindings, PlaceholderKind};
pub use definition::{
    ComparisonDefinition, DrillDown, PlaceholderDecl, QueryTemplate, RegionDefinition, RegionKind,
    RegionSpec, RuntimeFilter, SpecSource, WidgetDefinition,
};
pub use error::{ErrorBody, WidgetError, WidgetResult};
pub use organization::{ComponentRef, OrganizationNode};
pub use output::{
    CategoryRow, ComparisonNode, ComparisonOutput, ComparisonSection, HeaderValue, PointDate,
    RegionOutput, ResolvedSpec, SectionEntry, Series, SeriesPoint, SubHeader, SubHeaderEntry,
    WidgetOutput,
};
pub use period::{BucketInterval, PeriodDuration};
pub use raw::RawResults;
