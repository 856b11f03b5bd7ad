use actix_web::{middleware::Logger, web, App, HttpServer};
use clinic_whatsapp_core::browser::{SelectorFamilies, UIInteractionService};
use clinic_whatsapp_core::error::AppError;
use clinic_whatsapp_core::persistence::{InMemoryOutboundMessageStore, InMemoryPauseStateStore};
use clinic_whatsapp_core::{CoreConfig, LoggingNotifier, NetworkService, OperationCoordinator, SendOrchestrator, SessionManager, WhatsAppCore};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Thin demo binary: boots the CORE with in-memory collaborators and exposes
/// `/health` plus a pair of `/demo/*` routes. This is not the clinic HTTP
/// API (that surface is out of scope) - it exists only so the CORE can be
/// run and exercised locally.
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    dotenv::dotenv().ok();

    let cfg = Arc::new(CoreConfig::from_env());
    let families = Arc::new(SelectorFamilies::default());
    families.validate()?;

    let pause_store = Arc::new(InMemoryPauseStateStore::default());
    let outbound_store = Arc::new(InMemoryOutboundMessageStore::default());

    let sessions = Arc::new(SessionManager::new(cfg.clone(), families.clone()));
    let coordinator = Arc::new(OperationCoordinator::new(pause_store, outbound_store));
    let interaction = Arc::new(UIInteractionService::new((*families).clone()));
    let network = Arc::new(NetworkService::new(&cfg));
    let orchestrator = Arc::new(SendOrchestrator::new(cfg.clone(), coordinator, interaction, network));
    let core = Arc::new(WhatsAppCore::new(sessions, orchestrator, Arc::new(LoggingNotifier)));

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    log::info!("clinic-whatsapp-gateway starting on port {}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(core.clone()))
            .wrap(Logger::default())
            .route("/health", web::get().to(health_check))
            .route("/demo/check-number", web::post().to(demo_check_number))
            .route("/demo/send-message", web::post().to(demo_send_message))
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run()
    .await
    .map_err(|e| anyhow::anyhow!("server error: {}", e))
}

async fn health_check() -> actix_web::HttpResponse {
    actix_web::HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "clinic-whatsapp-gateway",
    }))
}

#[derive(Deserialize)]
struct CheckNumberRequest {
    moderator_id: String,
    phone: String,
}

async fn demo_check_number(
    core: web::Data<Arc<WhatsAppCore>>,
    body: web::Json<CheckNumberRequest>,
) -> Result<actix_web::HttpResponse, AppError> {
    let cancellation = CancellationToken::new();
    let result = core.check_whatsapp_number(&body.moderator_id, &body.phone, &cancellation).await;
    Ok(actix_web::HttpResponse::Ok().json(serde_json::json!({
        "result": format!("{:?}", result),
    })))
}

#[derive(Deserialize)]
struct SendMessageRequest {
    moderator_id: String,
    phone: String,
    message: String,
}

async fn demo_send_message(
    core: web::Data<Arc<WhatsAppCore>>,
    body: web::Json<SendMessageRequest>,
) -> Result<actix_web::HttpResponse, AppError> {
    let request_id = format!("demo_{}", uuid::Uuid::new_v4());
    log::info!("{} dispatching send for moderator {}", request_id, body.moderator_id);

    let cancellation = CancellationToken::new();
    let result = core
        .send_message_with_icon_type(&body.moderator_id, &body.phone, &body.message, &cancellation)
        .await;
    Ok(actix_web::HttpResponse::Ok().json(serde_json::json!({
        "request_id": request_id,
        "result": format!("{:?}", result),
    })))
}
