use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use backend::config::AppConfig;
use backend::error::StartupError;
use backend::{configure_routes, AppContext};
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        StartupError::from(e)
    })?;
    log::info!(
        "Config: models={}, uploads={}, capture_features={}, max_upload_bytes={}",
        config.model_dir.display(),
        config.upload_dir.display(),
        config.capture_features,
        config.max_upload_bytes
    );

    let context = AppContext::initialize(&config).await.map_err(|e| {
        log::error!("Startup failed: {}", e);
        e
    })?;
    let context = web::Data::new(context);

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .app_data(context.clone())
            .configure(configure_routes)
    })
    .bind(bind_address)?
    .run()
    .await
}
