use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{info, warn};

use lunchbuddy::config::Config;
use lunchbuddy::http::{self, AppState};
use lunchbuddy::store::{MemoryStore, MongoStore, Store};
use lunchbuddy::telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init();

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let store: Arc<dyn Store> = match &config.mongodb_uri {
        Some(uri) => {
            let store = MongoStore::connect(uri, &config.mongodb_database)
                .await
                .map_err(std::io::Error::other)?;
            Arc::new(store)
        }
        None => {
            warn!("MONGODB_URI not set; data lives in memory and is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let state = web::Data::new(AppState::new(store, &config));
    let origins = config.cors_origins.clone();
    let api_prefix = config.api_prefix.clone();

    info!(addr = %config.bind_addr, "starting {}", config.project_name);
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&origins))
            .wrap(Logger::default())
            .app_data(state.clone())
            .service(http::health)
            .service(web::scope(&api_prefix).configure(http::configure))
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await
}

fn cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        return Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();
    }
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
}
