use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

mod api;
mod config;
mod errors;
mod models;
mod services;
mod state;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let state = match state::AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            error!("{}", errors::redact(&e.to_string(), &config.secrets()));
            std::process::exit(1);
        }
    };

    state.cache.spawn_pruner(config.cache_prune_interval);

    info!("Balance service listening on {}:{}", config.host, config.port);

    let origins = config.cors_origins.clone();
    let data = web::Data::new(state);

    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
            ])
            .supports_credentials();
        App::new()
            .app_data(data.clone())
            .app_data(web::JsonConfig::default().error_handler(api::json_error_handler))
            .configure(api::config)
            .wrap(cors)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
