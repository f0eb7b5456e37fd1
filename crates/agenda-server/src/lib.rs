pub mod delivery;
pub mod engine;
pub mod error;
pub mod render;
pub mod scheduler;
pub mod sessions;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agenda_config::Config;
use agenda_contracts::{MessageContent, Subscriber, WebhookBody, WebhookEvent};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::delivery::{
    retry_policy, DeliveryGateway, Destination, LineMessagingApi, MessagingApi,
};
use crate::engine::{Engine, EngineSettings, Inbound};
use crate::scheduler::NotificationScheduler;
use crate::sessions::{spawn_reaper, RateLimiter, SessionStore};
use crate::store::{open_store, RecordStore};

pub const SIGNATURE_HEADER: &str = "x-line-signature";

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let store = open_store(&cfg)?;
    let api: Arc<dyn MessagingApi> = Arc::new(LineMessagingApi::new(&cfg)?);
    let state = AppState::new(cfg, store, api);

    spawn_reaper(
        Arc::clone(&state.sessions),
        Arc::clone(&state.limiter),
        Duration::from_secs(state.cfg.sessions.reaper_interval_secs.max(1)),
    );
    if state.cfg.scheduler.enabled {
        let scheduler = Arc::new(NotificationScheduler::from_config(
            &state.cfg,
            Arc::clone(&state.store),
            Arc::clone(&state.gateway),
        ));
        scheduler.spawn(Duration::from_secs(state.cfg.scheduler.interval_secs.max(1)));
        info!(
            interval_secs = state.cfg.scheduler.interval_secs,
            "Notification scheduler started"
        );
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, "Listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    let store = open_store(&cfg)?;
    let api: Arc<dyn MessagingApi> = Arc::new(LineMessagingApi::new(&cfg)?);
    Ok(build_app_with(cfg, store, api))
}

/// Router over caller-supplied backends. No background tasks are started.
pub fn build_app_with(
    cfg: Config,
    store: Arc<dyn RecordStore>,
    api: Arc<dyn MessagingApi>,
) -> Router {
    router(AppState::new(cfg, store, api))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/health", get(health))
        .route("/webhook", post(callback))
        .with_state(state)
}

#[derive(Clone)]
struct AppState {
    cfg: Arc<Config>,
    store: Arc<dyn RecordStore>,
    sessions: Arc<SessionStore>,
    limiter: Arc<RateLimiter>,
    engine: Arc<Engine>,
    gateway: Arc<DeliveryGateway>,
}

impl AppState {
    fn new(cfg: Config, store: Arc<dyn RecordStore>, api: Arc<dyn MessagingApi>) -> Self {
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(
            cfg.sessions.idle_ttl_secs,
        )));
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            cfg.sessions.rate_limit_window_ms,
        )));
        let engine = Arc::new(Engine::new(
            Arc::clone(&store),
            Arc::clone(&sessions),
            EngineSettings::from_config(&cfg),
        ));
        let gateway = Arc::new(DeliveryGateway::new(api, retry_policy(&cfg.delivery)));
        Self {
            cfg: Arc::new(cfg),
            store,
            sessions,
            limiter,
            engine,
            gateway,
        }
    }

    async fn process_event(&self, event: WebhookEvent) {
        let Some(user) = event.user_id().map(str::to_string) else {
            debug!("Event without a user id ignored");
            return;
        };
        let inbound = match &event {
            WebhookEvent::Message(message) => match &message.message {
                MessageContent::Text { text } => Inbound::Text(text.clone()),
                MessageContent::Unsupported => Inbound::Unsupported,
            },
            WebhookEvent::Postback(postback) => Inbound::Postback(postback.postback.data.clone()),
            WebhookEvent::Follow(_) => Inbound::Follow,
            WebhookEvent::Other => {
                debug!(user = %user, "Unhandled event type ignored");
                return;
            }
        };

        if matches!(inbound, Inbound::Postback(_)) && !self.limiter.allow(&user) {
            info!(user = %user, "Postback dropped by rate limiter");
            return;
        }

        let lock = self.sessions.user_lock(&user);
        let _guard = lock.lock().await;

        self.ensure_subscriber(&user).await;
        let replies = self.engine.respond(&user, inbound).await;

        match event.reply_token() {
            Some(token) => {
                let delivered = self
                    .gateway
                    .send(&Destination::Reply(token.to_string()), replies)
                    .await;
                if !delivered {
                    warn!(user = %user, "Reply could not be delivered");
                }
            }
            None => warn!(user = %user, "Event carried no reply token, replies dropped"),
        }
    }

    /// Write-once subscriber row. Failures never block the reply.
    async fn ensure_subscriber(&self, user: &str) {
        match self.store.get_subscriber(user).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let subscriber = Subscriber {
                    user_id: user.to_string(),
                    subscribed_at: self.engine.now(),
                };
                match self.store.insert_subscriber(subscriber).await {
                    Ok(()) => info!(user, "New subscriber recorded"),
                    Err(e) => warn!(user, error = %e, "Failed to record subscriber"),
                }
            }
            Err(e) => warn!(user, error = %e, "Subscriber lookup failed"),
        }
    }
}

/// Checks `X-Line-Signature`: base64 HMAC-SHA256 of the raw body keyed with
/// the channel secret, compared in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Signature for `body`, as the platform would compute it.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let request_id = Uuid::new_v4();
    async move {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(state.cfg.channel_secret(), &body, signature) {
            warn!(body_len = body.len(), "Rejected webhook with invalid signature");
            return (StatusCode::BAD_REQUEST, "Invalid signature");
        }

        // Anything past the signature check answers 200 so the platform
        // does not redeliver.
        let payload: WebhookBody = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Malformed webhook body");
                return (StatusCode::OK, "OK");
            }
        };
        info!(events = payload.events.len(), "Webhook accepted");
        for event in payload.events {
            state.process_event(event).await;
        }
        (StatusCode::OK, "OK")
    }
    .instrument(info_span!("webhook", %request_id))
    .await
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.cfg;
    Json(json!({
        "status": "healthy",
        "timestamp": state.engine.now().to_rfc3339(),
        "services": {
            "line_bot_api": !cfg.access_token().is_empty(),
            "record_store": state.store.kind(),
            "webhook_handler": !cfg.channel_secret().is_empty(),
            "scheduler": cfg.scheduler.enabled,
        },
        "environment": {
            "line_access_token": !cfg.access_token().is_empty(),
            "line_channel_secret": !cfg.channel_secret().is_empty(),
            "supabase_url": cfg.store.url.is_some(),
            "supabase_service_key": cfg.store.service_key.is_some(),
        }
    }))
}

fn ready(flag: bool) -> &'static str {
    if flag {
        "✅ Ready"
    } else {
        "❌ Not configured"
    }
}

async fn status_page(State(state): State<AppState>) -> String {
    let cfg = &state.cfg;
    let now = state.engine.now();
    format!(
        "🚀 LINE Agenda Bot\n\n\
         ⏰ Thai time: {}\n\n\
         🔧 Services:\n\
         • LINE Messaging API: {}\n\
         • Record store ({}): ✅ Ready\n\
         • Webhook signature: {}\n\
         • Reminder scheduler: {}\n\n\
         ✅ Features:\n\
         • เพิ่มกิจกรรม\n\
         • เพิ่มเบอร์โทร\n\
         • เพิ่มโน้ต\n\
         • ค้นหากิจกรรม เบอร์ และโน้ต\n\
         • ค้นหาตามวันที่\n\
         • ดูกิจกรรมทั้งหมด\n\n\
         🔗 Webhook: /webhook (POST)\n\
         💡 Usage: type 'สวัสดี' in LINE for the menu\n\
         🛡️ Delivery: {} attempts with backoff\n\
         🕒 Server time (UTC): {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        ready(!cfg.access_token().is_empty()),
        state.store.kind(),
        ready(!cfg.channel_secret().is_empty()),
        if cfg.scheduler.enabled { "✅ Enabled" } else { "⏸️ Disabled" },
        cfg.delivery.max_attempts,
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
    )
}
