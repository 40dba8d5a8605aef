//! The caching agent: lifecycle plus request dispatch.
//!
//! Dispatch order for a `GET` request is precache, then the route table, then
//! the navigation fallback, then a plain network fetch that stores nothing.
//! Requests are only served while the agent is [`LifecycleState::Active`].

use std::sync::Arc;

use shelter_core::request::{canonicalize, resolve};
use shelter_core::{AppConfig, CacheStore, Destination, Error, RequestDescriptor};
use tokio::sync::{RwLock, broadcast};
use url::Url;

use crate::fetch::Fetcher;
use crate::lifecycle::{AgentMessage, Lifecycle, LifecycleState, sweep_buckets};
use crate::navigation::NavigationFallback;
use crate::plugins::{BroadcastUpdate, CacheUpdate, CacheableResponse, Expiration, PluginChain};
use crate::precache::{InstallReport, Precache};
use crate::routing::{Route, RoutePredicate, Router};
use crate::strategy::{AgentContext, CacheFirst, Handled, ResponseSource, StaleWhileRevalidate};

pub use shelter_core::config::{GOOGLE_FONTS_BUCKET, STATIC_ASSETS_BUCKET, TIMETABLE_DATA_BUCKET};

const GOOGLE_FONTS_ORIGINS: &[&str] = &["https://fonts.googleapis.com", "https://fonts.gstatic.com"];

pub struct Agent {
    ctx: AgentContext,
    precache: Precache,
    router: Router,
    navigation: Option<NavigationFallback>,
    updates: Option<BroadcastUpdate>,
    lifecycle: RwLock<Lifecycle>,
}

impl Agent {
    pub fn new(ctx: AgentContext, precache: Precache, router: Router) -> Self {
        Self { ctx, precache, router, navigation: None, updates: None, lifecycle: RwLock::new(Lifecycle::new()) }
    }

    pub fn with_navigation_fallback(mut self, navigation: NavigationFallback) -> Self {
        self.navigation = Some(navigation);
        self
    }

    pub fn with_updates(mut self, updates: BroadcastUpdate) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Build the agent for the application described by `config`.
    ///
    /// Registers, in order: images and fonts (cache-first with expiration),
    /// Google Fonts (stale-while-revalidate), and the timetable data endpoint
    /// (stale-while-revalidate with update broadcasts).
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` for an unusable scope, data URL or manifest entry
    /// - `InvalidInput` for a conflicting manifest, a precache bucket shared
    ///   with a route, or a navigation fallback that is not precached
    pub fn from_config(
        config: &AppConfig, store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, Error> {
        let scope = Url::parse(&config.scope).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.scope)))?;
        let precache = Precache::new(&config.precache_bucket, &config.precache, &scope)?;
        let data_url = canonicalize(&config.data_url)?;
        let updates = BroadcastUpdate::new(&config.broadcast_channel);

        let mut router = Router::new();
        router.register_route(Route::new(
            "static-assets",
            RoutePredicate::destinations([Destination::Image, Destination::Font]),
            CacheFirst::new(
                STATIC_ASSETS_BUCKET,
                PluginChain::new()
                    .with(Expiration::from(config.static_assets))
                    .with(CacheableResponse::ok_or_opaque()),
            ),
        ));
        router.register_route(Route::new(
            "google-fonts",
            RoutePredicate::origins(GOOGLE_FONTS_ORIGINS.iter().copied()),
            StaleWhileRevalidate::new(GOOGLE_FONTS_BUCKET, PluginChain::new()),
        ));
        router.register_route(Route::new(
            "timetable-data",
            RoutePredicate::ExactUrl(data_url),
            StaleWhileRevalidate::new(
                TIMETABLE_DATA_BUCKET,
                PluginChain::new()
                    .with(updates.clone())
                    .with(CacheableResponse::ok_or_opaque()),
            ),
        ));

        if router.cache_names().iter().any(|name| name == precache.bucket()) {
            return Err(Error::InvalidInput(format!("precache bucket {} is also a route bucket", precache.bucket())));
        }

        let shell_url = resolve(&config.navigation_fallback, &scope)?;
        let shell_key = precache
            .cache_key_for_url(&shell_url)
            .ok_or_else(|| Error::InvalidInput(format!("navigation fallback {shell_url} is not precached")))?
            .to_string();
        let navigation = NavigationFallback::new(precache.bucket(), shell_url, shell_key);

        Ok(Self::new(AgentContext::new(store, fetcher), precache, router)
            .with_navigation_fallback(navigation)
            .with_updates(updates))
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.ctx.store()
    }

    pub fn precache(&self) -> &Precache {
        &self.precache
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.read().await.state()
    }

    /// Buckets kept by activation: every route bucket plus the precache.
    pub fn whitelist(&self) -> Vec<String> {
        let mut names = self.router.cache_names();
        if !names.iter().any(|n| n == self.precache.bucket()) {
            names.push(self.precache.bucket().to_string());
        }
        names
    }

    /// Receiver for timetable update broadcasts, if the agent emits any.
    pub fn subscribe_updates(&self) -> Option<broadcast::Receiver<CacheUpdate>> {
        self.updates.as_ref().map(BroadcastUpdate::subscribe)
    }

    /// Precache the manifest and move to `Waiting`.
    ///
    /// If `SKIP_WAITING` arrived while installing, activation follows at once.
    ///
    /// # Errors
    ///
    /// `InstallFailed` (the agent becomes `Redundant`), or `InvalidState`
    /// when the agent was already installed.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.lifecycle.write().await.transition(LifecycleState::Installing)?;

        let result = self.precache.install(&self.ctx).await;

        let mut lifecycle = self.lifecycle.write().await;
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "install failed");
                lifecycle.transition(LifecycleState::Redundant)?;
                return Err(e);
            }
        };

        lifecycle.transition(LifecycleState::Waiting)?;
        if lifecycle.skip_waiting_requested() {
            tracing::info!("skip waiting requested during install");
            self.activate_locked(&mut lifecycle).await?;
        }

        Ok(report)
    }

    /// Activate a waiting agent. Returns the deleted buckets.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the agent is `Waiting`.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let mut lifecycle = self.lifecycle.write().await;
        self.activate_locked(&mut lifecycle).await
    }

    /// Handle a control message from the hosting page.
    ///
    /// `SKIP_WAITING` activates a waiting agent, or is remembered while the
    /// agent installs. Other messages are ignored. Returns the resulting state.
    pub async fn handle_message(&self, message: &serde_json::Value) -> Result<LifecycleState, Error> {
        let Some(message) = AgentMessage::parse(message) else {
            tracing::debug!(%message, "ignoring unknown message");
            return Ok(self.state().await);
        };

        let mut lifecycle = self.lifecycle.write().await;
        match (message, lifecycle.state()) {
            (AgentMessage::SkipWaiting, LifecycleState::Waiting) => {
                self.activate_locked(&mut lifecycle).await?;
            }
            (AgentMessage::SkipWaiting, LifecycleState::Parsed | LifecycleState::Installing) => {
                lifecycle.request_skip_waiting();
            }
            (AgentMessage::SkipWaiting, state) => {
                tracing::debug!(%state, "skip waiting has no effect");
            }
        }

        Ok(lifecycle.state())
    }

    /// The previous version released its clients; activate if waiting.
    pub async fn clients_released(&self) -> Result<Vec<String>, Error> {
        let mut lifecycle = self.lifecycle.write().await;
        if lifecycle.state() != LifecycleState::Waiting {
            return Ok(Vec::new());
        }
        self.activate_locked(&mut lifecycle).await
    }

    /// A newer version took over; stop serving.
    pub async fn replace(&self) -> Result<(), Error> {
        self.lifecycle.write().await.transition(LifecycleState::Redundant)
    }

    /// Runs with the lifecycle write lock held so no fetch is served while
    /// buckets are swept.
    async fn activate_locked(&self, lifecycle: &mut Lifecycle) -> Result<Vec<String>, Error> {
        lifecycle.transition(LifecycleState::Activating)?;

        let deleted = sweep_buckets(self.ctx.store(), &self.whitelist()).await;
        if let Err(e) = self.precache.cleanup(&self.ctx).await {
            tracing::warn!(error = %e, "failed to clean outdated precache entries");
        }

        lifecycle.transition(LifecycleState::Active)?;
        tracing::info!(deleted = ?deleted, "agent active");
        Ok(deleted)
    }

    /// Serve `request`.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the agent is active; otherwise whatever the
    /// handling route surfaces.
    pub async fn handle_fetch(&self, request: &RequestDescriptor) -> Result<Handled, Error> {
        // Held until the response is produced; lifecycle changes wait for it.
        let lifecycle = self.lifecycle.read().await;
        let state = lifecycle.state();
        if state != LifecycleState::Active {
            return Err(Error::InvalidState(format!("agent is {state}, not active")));
        }

        if request.method == "GET" {
            if let Some(result) = self.precache.handle(&self.ctx, request).await {
                return result;
            }

            if let Some(route) = self.router.find(request) {
                tracing::debug!(route = %route.name, url = %request.url, "route matched");
                return route.strategy.handle(&self.ctx, request).await;
            }

            if let Some(navigation) = &self.navigation
                && navigation.applies(request)
            {
                return navigation.handle(&self.ctx, request).await;
            }
        }

        tracing::debug!(method = %request.method, url = %request.url, "no route; passing through");
        let response = self.ctx.fetcher().fetch(request).await?;
        Ok(Handled::new(response, ResponseSource::Passthrough))
    }
}
