// src/state.rs

//! The application context.
//!
//! Everything that would otherwise be a process-wide singleton (settings, the
//! view catalog, the render-description cache, the renderer registry, the
//! expression host and the item graph) lives in one [`AppContext`] built at
//! startup and passed by reference to whatever needs it.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::core::cache::RenderDescriptionCache;
use crate::core::cascade::{Cascadable, StateLayer};
use crate::core::catalog::{CatalogResult, LoadMode, Origin, ViewCatalog, ViewRequest};
use crate::core::datasource::{CascadingDatasource, DATASOURCE_PROPERTIES};
use crate::core::diagnostics::Diagnostics;
use crate::core::functions::DefaultHost;
use crate::core::graph::{InMemoryGraph, ItemGraph};
use crate::core::interpolator::{ExpressionHost, Interpolator};
use crate::core::render_config::{CascadingRenderConfig, RENDER_CONFIG_PROPERTIES, RendererRegistry};
use crate::core::view::{CascadingView, EffectiveView, VIEW_PROPERTIES};
use crate::core::view_arguments::ViewArguments;
use crate::settings::Settings;

/// Session overrides for the three cascades of a view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewStates {
    /// Overrides of view properties.
    pub view: StateLayer,
    /// Overrides of datasource properties.
    pub datasource: StateLayer,
    /// Overrides of the active renderer's properties.
    pub renderer: StateLayer,
}

/// Everything a view resolution needs: settings, the catalog snapshot, the
/// item graph, the expression host and the shared render cache.
pub struct AppContext {
    settings: Settings,
    catalog: RwLock<Arc<ViewCatalog>>,
    render_cache: RenderDescriptionCache,
    renderers: RendererRegistry,
    host: Box<dyn ExpressionHost>,
    graph: Arc<dyn ItemGraph>,
    diagnostics: Diagnostics,
}

impl AppContext {
    /// A context using the default expression host and renderer registry.
    pub fn new(settings: Settings, catalog: ViewCatalog, graph: Arc<dyn ItemGraph>) -> Self {
        let diagnostics = Diagnostics::new(settings.diagnostics_capacity);
        Self {
            settings,
            catalog: RwLock::new(Arc::new(catalog)),
            render_cache: RenderDescriptionCache::new(),
            renderers: RendererRegistry::default(),
            host: Box::new(DefaultHost::new()),
            graph,
            diagnostics,
        }
    }

    /// Loads the default definitions from `defaults_dir` (if given) and the
    /// user definitions from every `catalog_dirs` entry.
    pub fn load(settings: Settings, defaults_dir: Option<&Path>, graph: Arc<dyn ItemGraph>) -> Result<Self> {
        let mode = if settings.strict_validation {
            LoadMode::Strict
        } else {
            LoadMode::Lenient
        };

        let mut catalog = match defaults_dir {
            Some(dir) => ViewCatalog::load_dir(dir, Origin::Default, mode)
                .with_context(|| format!("Failed to load default definitions from '{}'", dir.display()))?,
            None => ViewCatalog::empty(),
        };
        for dir in &settings.catalog_dirs {
            let user = ViewCatalog::load_dir(dir, Origin::User, mode)
                .with_context(|| format!("Failed to load user definitions from '{}'", dir.display()))?;
            catalog = catalog.merged(user);
        }

        Ok(Self::new(settings, catalog, graph))
    }

    /// A context over an empty in-memory graph, with default settings.
    pub fn in_memory(catalog: ViewCatalog) -> Self {
        Self::new(Settings::default(), catalog, Arc::new(InMemoryGraph::new()))
    }

    /// Replaces the expression host.
    pub fn with_host(mut self, host: Box<dyn ExpressionHost>) -> Self {
        self.host = host;
        self
    }

    /// Replaces the renderer registry.
    pub fn with_renderers(mut self, renderers: RendererRegistry) -> Self {
        self.renderers = renderers;
        self
    }

    /// Loaded settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The current catalog. Callers keep the snapshot they got even if the
    /// catalog is replaced afterwards.
    pub fn catalog(&self) -> Arc<ViewCatalog> {
        let guard = self.catalog.read().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&guard)
    }

    /// Swaps in a rebuilt catalog.
    pub fn replace_catalog(&self, catalog: ViewCatalog) {
        let mut guard = self.catalog.write().unwrap_or_else(|p| p.into_inner());
        log::info!("Replacing view catalog ({} -> {} definitions)", guard.len(), catalog.len());
        *guard = Arc::new(catalog);
    }

    /// The shared render cache.
    pub fn render_cache(&self) -> &RenderDescriptionCache {
        &self.render_cache
    }

    /// Registered renderer kinds.
    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    /// The item graph.
    pub fn graph(&self) -> &dyn ItemGraph {
        self.graph.as_ref()
    }

    /// Diagnostic history.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// An interpolator over the host and graph that records into the diagnostics.
    pub fn interpolator(&self) -> Interpolator<'_> {
        Interpolator::new(self.host.as_ref(), self.graph.as_ref()).with_diagnostics(&self.diagnostics)
    }

    /// Builds the view, datasource and render-config cascades for `request`.
    pub fn resolve_view(
        &self,
        request: &ViewRequest,
        states: &ViewStates,
        arguments: &ViewArguments,
    ) -> CatalogResult<ResolvedView<'_>> {
        let catalog = self.catalog();
        let view_stack = catalog.view_stack(request)?;

        let view = CascadingView::new(
            Cascadable::new(view_stack.clone(), VIEW_PROPERTIES, self.interpolator())
                .with_state(states.view.clone())
                .with_arguments(arguments.clone()),
            &self.settings.default_renderer,
        );

        let datasource = CascadingDatasource::new(
            Cascadable::new(catalog.datasource_stack(&view_stack)?, DATASOURCE_PROPERTIES, self.interpolator())
                .with_state(states.datasource.clone())
                .with_arguments(arguments.clone()),
        );

        let renderer = view.renderer_name();
        let render_config = CascadingRenderConfig::new(
            &renderer,
            Cascadable::new(
                catalog.renderer_stack(&renderer, &view_stack)?,
                RENDER_CONFIG_PROPERTIES,
                self.interpolator(),
            )
            .with_state(states.renderer.clone())
            .with_arguments(arguments.clone()),
            &self.render_cache,
            &self.renderers,
        );

        Ok(ResolvedView {
            view,
            datasource,
            render_config,
        })
    }
}

/// The three cascades of one view, resolved against one catalog snapshot.
pub struct ResolvedView<'a> {
    view: CascadingView<'a>,
    datasource: CascadingDatasource<'a>,
    render_config: CascadingRenderConfig<'a>,
}

impl<'a> ResolvedView<'a> {
    /// The view cascade.
    pub fn view(&self) -> &CascadingView<'a> {
        &self.view
    }

    /// The datasource cascade.
    pub fn datasource(&self) -> &CascadingDatasource<'a> {
        &self.datasource
    }

    /// The renderer cascade.
    pub fn render_config(&self) -> &CascadingRenderConfig<'a> {
        &self.render_config
    }

    /// The effective view, with the datasource descriptor.
    pub fn effective(&self) -> EffectiveView {
        self.view.effective(&self.datasource)
    }
}
