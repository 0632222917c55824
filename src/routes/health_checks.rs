use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::mcp::SessionManager;

pub async fn health_check(sessions: web::Data<SessionManager>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "live_sessions": sessions.live_count(),
    }))
}
