use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{run_guarded, CooperativeCancellationToken, GuardedCallError};
use beacon_store::{BranchService, OrganizationDirectory, StoreError};
use beacon_types::{names, Bindings, OrganizationNode, RawResults, WidgetError, WidgetResult};
use serde_json::{json, Value};
use thiserror::Error;

/// Failure reported by a function producer.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("binding '{0}' is required")]
    MissingBinding(&'static str),
    #[error(transparent)]
    Service(#[from] StoreError),
    /// Message shown to callers as is.
    #[error("{0}")]
    Failed(String),
}

/// A named producer whose output lands in the raw results under its name.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use beacon_core::CooperativeCancellationToken;
/// use beacon_engine::{FunctionError, WidgetFunction};
/// use beacon_types::Bindings;
/// use serde_json::{json, Value};
///
/// struct Constant;
///
/// #[async_trait]
/// impl WidgetFunction for Constant {
///     fn name(&self) -> &'static str {
///         "constant"
///     }
///
///     async fn call(
///         &self,
///         _widget_id: &str,
///         _bindings: &Bindings,
///         _token: &CooperativeCancellationToken,
///     ) -> Result<Value, FunctionError> {
///         Ok(json!({"header": {"value": 1}}))
///     }
/// }
///
/// assert_eq!(Constant.name(), "constant");
/// ```
#[async_trait]
pub trait WidgetFunction: Send + Sync {
    fn name(&self) -> &'static str;
    async fn call(
        &self,
        widget_id: &str,
        bindings: &Bindings,
        token: &CooperativeCancellationToken,
    ) -> Result<Value, FunctionError>;
}

/// Process-wide `name → function` table.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn WidgetFunction>>,
    call_timeout: Duration,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `orgSummary` and `branchAutomations` over the given services.
    pub fn with_builtins(
        directory: Arc<dyn OrganizationDirectory>,
        branches: Arc<dyn BranchService>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(OrgSummary::new(directory));
        registry.register(BranchAutomations::new(branches));
        registry
    }

    /// Per-call deadline; zero disables it.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn register<F>(&mut self, function: F)
    where
        F: WidgetFunction + 'static,
    {
        self.functions
            .insert(function.name().to_string(), Arc::new(function));
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Returns sorted registered function names.
    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    /// Runs `names` one after another and keys their output by name.
    ///
    /// The first failure aborts the remaining calls.
    #[tracing::instrument(skip(self, bindings, token))]
    pub async fn execute_all(
        &self,
        widget_id: &str,
        names: &[String],
        bindings: &Bindings,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<RawResults> {
        let mut results = RawResults::new();
        for name in names {
            let function = self
                .functions
                .get(name)
                .ok_or_else(|| WidgetError::Function {
                    name: name.clone(),
                    message: "function is not registered".to_string(),
                })?;
            let call = function.call(widget_id, bindings, token);
            let outcome = run_guarded(token, self.call_timeout, call)
                .await
                .map_err(|error| match error {
                    GuardedCallError::Cancelled => WidgetError::Cancelled,
                    GuardedCallError::TimedOut { timeout_ms } => WidgetError::Timeout { timeout_ms },
                })?;
            let payload = outcome.map_err(|error| function_error(name, error))?;
            tracing::debug!(function = %name, "function produced payload");
            results.insert(name.clone(), payload);
        }
        Ok(results)
    }
}

fn function_error(name: &str, error: FunctionError) -> WidgetError {
    match error {
        FunctionError::Service(StoreError::Cancelled) => WidgetError::Cancelled,
        FunctionError::Service(StoreError::TimedOut { timeout_ms }) => {
            WidgetError::Timeout { timeout_ms }
        }
        FunctionError::Service(error) => {
            tracing::warn!(function = name, error = %error, "function collaborator failed");
            WidgetError::Function {
                name: name.to_string(),
                message: "collaborator request failed".to_string(),
            }
        }
        other => {
            tracing::warn!(function = name, error = %other, "function failed");
            WidgetError::Function {
                name: name.to_string(),
                message: other.to_string(),
            }
        }
    }
}

fn required_text<'a>(bindings: &'a Bindings, name: &'static str) -> Result<&'a str, FunctionError> {
    bindings
        .text(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(FunctionError::MissingBinding(name))
}

/// Sub-organization and component counts of the `orgId` organization.
pub struct OrgSummary {
    directory: Arc<dyn OrganizationDirectory>,
}

impl OrgSummary {
    pub fn new(directory: Arc<dyn OrganizationDirectory>) -> Self {
        Self { directory }
    }
}

fn count_tree(node: &OrganizationNode) -> (u64, u64) {
    node.sub_orgs.iter().fold(
        (node.sub_orgs.len() as u64, node.components.len() as u64),
        |(sub_orgs, components), child| {
            let (child_sub_orgs, child_components) = count_tree(child);
            (sub_orgs + child_sub_orgs, components + child_components)
        },
    )
}

#[async_trait]
impl WidgetFunction for OrgSummary {
    fn name(&self) -> &'static str {
        "orgSummary"
    }

    async fn call(
        &self,
        _widget_id: &str,
        bindings: &Bindings,
        token: &CooperativeCancellationToken,
    ) -> Result<Value, FunctionError> {
        let org_id = required_text(bindings, names::ORG_ID)?;
        let tree = self.directory.get_organization(org_id, token).await?;
        let (sub_orgs, components) = count_tree(&tree);
        let mut rows: Vec<(&str, u64)> = tree
            .sub_orgs
            .iter()
            .map(|sub_org| (sub_org.name.as_str(), count_tree(sub_org).1))
            .collect();
        rows.sort_by_key(|(title, _)| title.to_lowercase());
        let breakdown: Vec<Value> = rows
            .into_iter()
            .map(|(title, value)| json!({"title": title, "value": value}))
            .collect();
        Ok(json!({
            "header": {"value": components},
            "subOrgCount": sub_orgs,
            "componentCount": components,
            "breakdown": breakdown,
        }))
    }
}

/// Automation ids and display name of the `branch` binding.
pub struct BranchAutomations {
    branches: Arc<dyn BranchService>,
}

impl BranchAutomations {
    pub fn new(branches: Arc<dyn BranchService>) -> Self {
        Self { branches }
    }
}

#[async_trait]
impl WidgetFunction for BranchAutomations {
    fn name(&self) -> &'static str {
        "branchAutomations"
    }

    async fn call(
        &self,
        _widget_id: &str,
        bindings: &Bindings,
        token: &CooperativeCancellationToken,
    ) -> Result<Value, FunctionError> {
        let branch_id = required_text(bindings, names::BRANCH)?;
        let automation_ids = self.branches.automations_for_branch(branch_id, token).await?;
        let branch_name = self.branches.branch_name_for_id(branch_id, token).await?;
        Ok(json!({
            "header": {"value": automation_ids.len()},
            "automationIds": automation_ids,
            "branchName": branch_name,
        }))
    }
}
