use actix_web::{get, web, HttpResponse};
use serde_json::json;

use super::AppState;

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "active",
        "app_name": state.project_name,
        "vision": "Debt Simplification for Lunch Buddy",
    }))
}

#[get("/ping")]
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "ping": "pong from v1 router" }))
}
