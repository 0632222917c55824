use crate::configuration::Settings;
use crate::mcp::{self, Dispatcher, FileResultPersistence, FixtureDocument, ResultStore, SessionManager};
use crate::mcp::{FixtureError, ServerInfo};
use crate::routes;
use crate::telemetry::RedactedRootSpan;
use actix_web::{dev::Server, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error("failed to restore stored results: {0}")]
    Restore(#[source] std::io::Error),
}

/// Shared state handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub sessions: web::Data<SessionManager>,
    pub dispatcher: web::Data<Dispatcher>,
}

impl AppState {
    pub fn build(settings: &Settings) -> Result<Self, StartupError> {
        let fixture = match &settings.fixtures_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading fixture document");
                FixtureDocument::load(path)?
            }
            None => FixtureDocument::builtin()?,
        };

        let results = Arc::new(ResultStore::with_persistence(Arc::new(
            FileResultPersistence::new(settings.results_dir()),
        )));
        let restored = results.restore().map_err(StartupError::Restore)?;

        let dispatcher = Dispatcher::from_fixture(&fixture, results, settings.handler_timeout())?;
        tracing::info!(
            resources = dispatcher.catalog().resource_count(),
            prompts = dispatcher.catalog().prompt_count(),
            tools = dispatcher.tools().count(),
            restored_results = restored,
            "Registries loaded"
        );

        let sessions = SessionManager::new(
            settings.auth_token.clone(),
            Some(settings.sessions_dir()),
            ServerInfo {
                name: settings.server_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                environment: settings.environment.clone(),
            },
        );

        Ok(Self {
            sessions: web::Data::new(sessions),
            dispatcher: web::Data::new(dispatcher),
        })
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::<RedactedRootSpan>::new())
            .service(web::resource("/health_check").route(web::get().to(routes::health_check)))
            .service(web::resource("/mcp").route(web::get().to(mcp::mcp_websocket)))
            .app_data(state.sessions.clone())
            .app_data(state.dispatcher.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
