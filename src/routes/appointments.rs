use crate::cache::AppointmentCache;
use crate::handlers::appointments::{
    AppointmentsView, appointment_events, current_appointments, refresh_appointments,
};
use actix_web::{HttpResponse, Responder, get, http::header, post, web};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RefreshQuery {
    #[serde(default)]
    force: bool,
}

#[get("/")]
async fn current(cache: web::Data<AppointmentCache>) -> impl Responder {
    HttpResponse::Ok().json(current_appointments(&cache))
}

#[post("/refresh")]
async fn refresh(
    cache: web::Data<AppointmentCache>,
    query: web::Query<RefreshQuery>,
) -> impl Responder {
    match refresh_appointments(&cache, query.force).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => HttpResponse::ServiceUnavailable().json(AppointmentsView::stale(&cache, &e)),
    }
}

#[get("/stream")]
async fn stream(cache: web::Data<AppointmentCache>) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(appointment_events(cache.get_ref().clone()))
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(current).service(refresh).service(stream);
}
