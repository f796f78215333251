use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_catalog::DefinitionStore;
use beacon_core::CooperativeCancellationToken;
use beacon_postprocess::ProcessorRegistry;
use beacon_query::{derive_bindings, render_queries, BaseFilters, FilterComposer};
use beacon_store::{
    BranchService, CachedBranchService, CachedOrganizationDirectory, HttpAnalyticsStore,
    HttpBranchService, HttpOrganizationDirectory, OrganizationDirectory, QueryExecutor,
};
use beacon_types::{
    names, Bindings, ComparisonOutput, OrganizationNode, RawResults, WidgetDefinition,
    WidgetError, WidgetOutput, WidgetResult,
};
use chrono::{DateTime, Utc};

use crate::builder::WidgetBuilder;
use crate::config::EngineConfig;
use crate::functions::{BranchAutomations, FunctionRegistry, OrgSummary};

const DIRECTORY_SERVICE: &str = "organization directory";

/// Entry point for `BuildWidget` and `BuildComparison`.
///
/// Every collaborator is shared and read-only; one `Engine` serves all
/// requests of a process.
#[derive(Clone)]
pub struct Engine {
    catalog: Arc<DefinitionStore>,
    composer: FilterComposer,
    executor: QueryExecutor,
    functions: FunctionRegistry,
    processors: ProcessorRegistry,
    directory: Option<Arc<dyn OrganizationDirectory>>,
}

impl Engine {
    /// Engine with the built-in post-processors and no functions.
    pub fn new(catalog: Arc<DefinitionStore>, composer: FilterComposer, executor: QueryExecutor) -> Self {
        Self {
            catalog,
            composer,
            executor,
            functions: FunctionRegistry::new(),
            processors: ProcessorRegistry::with_builtin_families(),
            directory: None,
        }
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_processors(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn OrganizationDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Wires HTTP collaborators and the catalogue described by `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let catalog = DefinitionStore::load_from_dir(&config.definitions_dir).with_context(|| {
            format!(
                "failed to load widget catalogue from {}",
                config.definitions_dir.display()
            )
        })?;
        let store = HttpAnalyticsStore::new(config.http_config(&config.store_url))
            .context("failed to build analytics store client")?;
        let executor = QueryExecutor::new(Arc::new(store), config.executor_config());
        let mut composer =
            FilterComposer::new(config.branch_id_aliases.iter().cloned(), config.time_zone()?);
        let mut functions = FunctionRegistry::new().with_call_timeout(config.call_timeout());

        let directory = match config.directory_url.as_deref() {
            Some(url) => {
                let http = HttpOrganizationDirectory::new(config.http_config(url))
                    .context("failed to build organization directory client")?;
                let cached: Arc<dyn OrganizationDirectory> = Arc::new(CachedOrganizationDirectory::new(
                    Arc::new(http),
                    Duration::from_millis(config.org_cache_ttl_ms),
                ));
                functions.register(OrgSummary::new(Arc::clone(&cached)));
                Some(cached)
            }
            None => None,
        };
        if let Some(url) = config.automations_url.as_deref() {
            let http = HttpBranchService::new(config.http_config(url))
                .context("failed to build automations service client")?;
            let cached: Arc<dyn BranchService> = Arc::new(CachedBranchService::new(
                Arc::new(http),
                Duration::from_millis(config.automation_cache_ttl_ms),
            ));
            functions.register(BranchAutomations::new(Arc::clone(&cached)));
            composer = composer.with_branch_service(cached);
        }

        let mut engine = Self::new(Arc::new(catalog), composer, executor).with_functions(functions);
        if let Some(directory) = directory {
            engine = engine.with_directory(directory);
        }
        tracing::debug!(
            functions = ?engine.functions.function_names(),
            processors = ?engine.processors.processor_names(),
            "engine ready"
        );
        Ok(engine)
    }

    pub fn catalog(&self) -> &DefinitionStore {
        &self.catalog
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub async fn build_widget(
        &self,
        widget_id: &str,
        bindings: Bindings,
        base_filters: &BaseFilters,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<WidgetOutput> {
        self.build_widget_at(widget_id, bindings, base_filters, Utc::now(), token)
            .await
    }

    /// [`Engine::build_widget`] with an explicit clock for SLA windows.
    #[tracing::instrument(skip(self, bindings, base_filters, token))]
    pub async fn build_widget_at(
        &self,
        widget_id: &str,
        bindings: Bindings,
        base_filters: &BaseFilters,
        now: DateTime<Utc>,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<WidgetOutput> {
        let definition = self.catalog.load(widget_id, &bindings)?;
        let bindings = derive_bindings(&bindings)?;
        let raw = self
            .collect_raw(&definition, &bindings, base_filters, now, token)
            .await?;
        let regions = WidgetBuilder::new(&definition, &raw, &bindings, &self.processors).finish()?;
        tracing::debug!(regions = regions.len(), "widget built");

        Ok(WidgetOutput {
            id: definition.id.clone(),
            title: definition.title.clone(),
            description: definition.description.clone(),
            regions,
        })
    }

    pub async fn build_comparison(
        &self,
        widget_id: &str,
        bindings: Bindings,
        base_filters: &BaseFilters,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<ComparisonOutput> {
        self.build_comparison_at(widget_id, bindings, base_filters, Utc::now(), token)
            .await
    }

    /// Builds the comparison tree for the organization named by `orgId`.
    #[tracing::instrument(skip(self, bindings, base_filters, token))]
    pub async fn build_comparison_at(
        &self,
        widget_id: &str,
        bindings: Bindings,
        base_filters: &BaseFilters,
        now: DateTime<Utc>,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<ComparisonOutput> {
        let definition = self.catalog.load_comparison(widget_id, &bindings)?;
        let bindings = derive_bindings(&bindings)?;
        let widget = &definition.widget;

        let (raw, tree) = tokio::try_join!(
            self.collect_raw(widget, &bindings, base_filters, now, token),
            self.organization(&bindings, token),
        )?;
        let root = self.processors.process_comparison(
            &definition.post_process_function_name,
            &definition.spec_key,
            &raw,
            &bindings,
            &tree,
        )?;
        let regions = WidgetBuilder::new(widget, &raw, &bindings, &self.processors).finish()?;
        tracing::debug!(
            nodes = root.children.len(),
            total_value = root.total_value,
            "comparison built"
        );

        Ok(ComparisonOutput {
            id: widget.id.clone(),
            title: widget.title.clone(),
            description: widget.description.clone(),
            regions,
            total_value: root.total_value,
            value_in_millis: root.value_in_millis,
            nodes: root.children,
        })
    }

    /// Renders, composes and runs the queries of `definition` alongside its
    /// functions.
    async fn collect_raw(
        &self,
        definition: &WidgetDefinition,
        bindings: &Bindings,
        base_filters: &BaseFilters,
        now: DateTime<Utc>,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<RawResults> {
        if token.is_cancelled() {
            return Err(WidgetError::Cancelled);
        }
        let rendered = render_queries(definition, bindings)?;
        let requests = self
            .composer
            .compose(definition, rendered, bindings, base_filters, now, token)
            .await?;
        let (mut raw, functions) = tokio::try_join!(
            self.executor.execute(requests, token),
            self.functions
                .execute_all(&definition.id, &definition.functions, bindings, token),
        )?;
        raw.extend(functions);
        for (key, reason) in raw.failures() {
            tracing::warn!(query = %key, reason = %reason, "query failed in analytics store");
        }
        Ok(raw)
    }

    async fn organization(
        &self,
        bindings: &Bindings,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<OrganizationNode> {
        let org_id = bindings
            .text(names::ORG_ID)
            .ok_or_else(|| WidgetError::PlaceholderUnbound {
                name: names::ORG_ID.to_string(),
            })?;
        let directory = self
            .directory
            .as_ref()
            .ok_or_else(|| WidgetError::ServiceUnavailable {
                service: DIRECTORY_SERVICE,
                detail: "no organization directory configured".to_string(),
            })?;
        directory
            .get_organization(org_id, token)
            .await
            .map_err(|error| {
                tracing::warn!(org_id, error = %error, "organization lookup failed");
                error.into_service_error(DIRECTORY_SERVICE)
            })
    }
}
