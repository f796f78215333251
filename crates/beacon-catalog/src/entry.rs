use std::collections::BTreeMap;
use std::sync::Arc;

use beacon_types::{Bindings, ComparisonDefinition, WidgetDefinition, WidgetError, WidgetResult};
use serde::Deserialize;

/// Definitions picked by the value of one binding (e.g. `duration`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantEntry<T> {
    pub variant_binding: String,
    pub variants: BTreeMap<String, T>,
    #[serde(default)]
    pub default_variant: Option<String>,
}

/// One catalogue entry as written in a definition file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CatalogEntry<T> {
    Variants(VariantEntry<T>),
    Single(T),
}

/// Access to the widget part of catalogue definitions.
pub(crate) trait CatalogDefinition {
    fn widget(&self) -> &WidgetDefinition;
    fn widget_mut(&mut self) -> &mut WidgetDefinition;
}

impl CatalogDefinition for WidgetDefinition {
    fn widget(&self) -> &WidgetDefinition {
        self
    }

    fn widget_mut(&mut self) -> &mut WidgetDefinition {
        self
    }
}

impl CatalogDefinition for ComparisonDefinition {
    fn widget(&self) -> &WidgetDefinition {
        &self.widget
    }

    fn widget_mut(&mut self) -> &mut WidgetDefinition {
        &mut self.widget
    }
}

/// Parsed entry with every definition frozen behind an `Arc`.
#[derive(Debug, Clone)]
pub(crate) enum ResolvedEntry<T> {
    Single(Arc<T>),
    Variants {
        binding: String,
        variants: BTreeMap<String, Arc<T>>,
        default_variant: Option<String>,
    },
}

impl<T: CatalogDefinition> ResolvedEntry<T> {
    /// Stamps ids onto definitions and validates them.
    pub(crate) fn from_entry(widget_id: &str, entry: CatalogEntry<T>) -> WidgetResult<Self> {
        match entry {
            CatalogEntry::Single(definition) => {
                Ok(Self::Single(Arc::new(prepare(widget_id, definition)?)))
            }
            CatalogEntry::Variants(entry) => {
                if entry.variants.is_empty() {
                    return Err(WidgetError::DefinitionInvalid {
                        widget_id: widget_id.to_string(),
                        reason: "variant entry declares no variants".to_string(),
                    });
                }
                if let Some(default_variant) = &entry.default_variant {
                    if !entry.variants.contains_key(default_variant) {
                        return Err(WidgetError::DefinitionInvalid {
                            widget_id: widget_id.to_string(),
                            reason: format!("default variant '{default_variant}' is not declared"),
                        });
                    }
                }
                let mut variants = BTreeMap::new();
                for (variant, definition) in entry.variants {
                    variants.insert(
                        variant.to_ascii_lowercase(),
                        Arc::new(prepare(widget_id, definition)?),
                    );
                }
                Ok(Self::Variants {
                    binding: entry.variant_binding,
                    variants,
                    default_variant: entry.default_variant.map(|value| value.to_ascii_lowercase()),
                })
            }
        }
    }

    pub(crate) fn select(&self, widget_id: &str, bindings: &Bindings) -> WidgetResult<Arc<T>> {
        match self {
            Self::Single(definition) => Ok(Arc::clone(definition)),
            Self::Variants {
                binding,
                variants,
                default_variant,
            } => {
                let selected = bindings
                    .text(binding)
                    .map(str::to_ascii_lowercase)
                    .and_then(|value| variants.get(&value))
                    .or_else(|| {
                        default_variant
                            .as_ref()
                            .and_then(|value| variants.get(value))
                    });
                selected
                    .cloned()
                    .ok_or_else(|| WidgetError::DefinitionNotFound {
                        widget_id: widget_id.to_string(),
                    })
            }
        }
    }

    pub(crate) fn definition_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Variants { variants, .. } => variants.len(),
        }
    }
}

fn prepare<T: CatalogDefinition>(widget_id: &str, mut definition: T) -> WidgetResult<T> {
    definition.widget_mut().id = widget_id.to_string();
    definition.widget().validate()?;
    Ok(definition)
}
