mod cache;
mod config;
mod consumer;
mod error;
mod handlers;
mod models;
mod routes;
mod source;
mod subscription;

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use crate::cache::AppointmentCache;
use crate::config::Config;
use crate::source::HttpAppointmentSource;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let source = HttpAppointmentSource::new(
        cfg.appointments_url.clone(),
        cfg.appointments_token.clone(),
        cfg.fetch_timeout,
    )?;
    let cache = web::Data::new(AppointmentCache::with_retry(Arc::new(source), cfg.retry));

    tracing::info!(
        "Listening on http://{}, serving appointments from {}",
        cfg.bind_addr,
        cfg.appointments_url
    );
    HttpServer::new(move || {
        App::new()
            .app_data(cache.clone())
            .configure(routes::init)
    })
    .bind(&cfg.bind_addr)?
    .run()
    .await?;
    Ok(())
}
