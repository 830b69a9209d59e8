//! The assembled application: shared services, the page pool and the
//! request pipeline
//!
//! `Application::handle` is synchronous. Page instances and the request's
//! environment never cross threads mid-request; the server runs each
//! request on the blocking pool.

use std::sync::Arc;

use anyhow::Context;

use crate::config::Config;
use crate::dispatch::{RequestContext, RequestPipeline, Response};
use crate::form::ClientDataEncoder;
use crate::link::{LinkSettings, LinkSource};
use crate::page::{ComponentRegistry, PageLoader, PagePool, PageRegistry, RequestPageCache};
use crate::request::{Request, RequestGlobals, Services};
use crate::server::ServerError;

pub struct Application {
    services: Arc<Services>,
    pool: PagePool,
    pipeline: RequestPipeline,
    default_locale: String,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("pages", &self.services.pages.names())
            .field("pipeline", &self.pipeline.dispatcher_names())
            .finish_non_exhaustive()
    }
}

impl Application {
    pub fn new(
        config: &Config,
        pages: PageRegistry,
        components: ComponentRegistry,
    ) -> anyhow::Result<Self> {
        let pages = Arc::new(pages);
        let index_page_name = config.links.index_page_name.clone();
        if !pages.contains(&index_page_name) {
            tracing::warn!(
                "Index page '{}' is not registered; requests for / will not be handled",
                index_page_name
            );
        }

        let link_settings = LinkSettings {
            context_path: config.context_path.clone(),
            index_page_name: index_page_name.clone(),
            force_absolute_uris: config.links.force_absolute_uris,
        };
        let services = Services {
            links: LinkSource::new(link_settings, pages.clone()),
            client_data: ClientDataEncoder::new(
                config.forms.hmac_passphrase.as_deref(),
                config.forms.compress_threshold,
            ),
            pages: pages.clone(),
            client_validation: config.forms.client_validation,
        };

        let pool = PagePool::new(
            PageLoader::new(pages, Arc::new(components)),
            config.pool.settings(),
        );
        let pipeline = RequestPipeline::standard(&index_page_name)
            .context("Failed to build request pipeline")?;

        tracing::debug!(
            pages = services.pages.len(),
            dispatchers = ?pipeline.dispatcher_names(),
            "Application assembled"
        );

        Ok(Self {
            services: Arc::new(services),
            pool,
            pipeline,
            default_locale: config.default_locale.clone(),
        })
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn dispatcher_names(&self) -> Vec<&'static str> {
        self.pipeline.dispatcher_names()
    }

    /// Run one request through the pipeline
    ///
    /// Pages checked out for the request go back to the pool before this
    /// returns, whether or not the request succeeded.
    pub fn handle(&self, request: Request) -> Result<Response, ServerError> {
        let uid = request.uid.clone();
        let globals = RequestGlobals::new(request, self.services.clone());
        let pages = RequestPageCache::new(&self.pool, &globals.request.locale);
        let mut cx = RequestContext::new(&globals, pages);

        let outcome = self.pipeline.dispatch(&mut cx);
        // Anything still pushed belongs to a failed render
        if outcome.is_ok() {
            if let Err(e) = cx.environment.ensure_balanced() {
                tracing::warn!(uid = %uid, "{}", e);
            }
        }
        drop(cx);

        match outcome {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(ServerError::NotFound(format!(
                "No page matches {}",
                globals.request.path
            ))),
            Err(e) => {
                let error = ServerError::from_pipeline(e);
                tracing::debug!(uid = %uid, path = %globals.request.path, status = %error.status(), "Request failed");
                Err(error)
            }
        }
    }
}
