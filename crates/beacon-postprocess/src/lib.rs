//! Post-processing of raw analytics results into widget payloads.
//!
//! [`ProcessorRegistry`] maps post-processor names to the built-in widget
//! families and the component comparison families.

pub mod aggregation;
pub mod comparison;
pub mod drilldown;
pub mod families;
pub mod numeric;
pub mod registry;
pub mod series;

pub use comparison::{assemble, ComparisonLayout, ComponentMetrics, MetricKind};
pub use registry::{ComparisonProcessor, PostProcessor, ProcessorRegistry};
