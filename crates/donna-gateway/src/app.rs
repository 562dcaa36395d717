use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use rusqlite::Connection;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use donna_agent::LlmProvider;
use donna_core::DonnaConfig;
use donna_memory::{DailyContextStore, MemoryStore, OpenAiEmbedder};
use donna_postcall::{ConversationStore, PostCallOrchestrator};
use donna_scheduler::{ContextStash, ReminderStore, SchedulerEngine};
use donna_seniors::SeniorStore;
use donna_telephony::TwilioClient;

/// Shared application state accessible from all handlers. Stores that only
/// the scheduler and orchestrator touch live inside those components; the
/// gateway keeps what its handlers read.
pub struct AppState {
    pub config: DonnaConfig,
    pub seniors: Arc<SeniorStore>,
    pub stash: Arc<ContextStash>,
    pub provider: Arc<dyn LlmProvider>,
    pub orchestrator: Arc<PostCallOrchestrator>,
    pub engine: Arc<SchedulerEngine>,
    pub shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(config: DonnaConfig) -> anyhow::Result<Self> {
        // each subsystem gets its own connection onto the shared file
        if let Some(dir) = Path::new(&config.database.path).parent() {
            std::fs::create_dir_all(dir)?;
        }
        let open = || Connection::open(&config.database.path);

        let seniors = Arc::new(SeniorStore::new(open()?)?);
        let embedder = Arc::new(OpenAiEmbedder::new(config.embeddings.clone()));
        let memory = Arc::new(MemoryStore::new(open()?, embedder, config.memory.clone())?);
        let daily = Arc::new(DailyContextStore::new(open()?)?);
        let (reminders, deliveries) = ReminderStore::new(open()?)?;
        let (reminders, deliveries) = (Arc::new(reminders), Arc::new(deliveries));
        let conversations = Arc::new(ConversationStore::new(open()?)?);

        let stash = Arc::new(ContextStash::new());
        let twilio = Arc::new(TwilioClient::new(
            config.twilio.account_sid.clone(),
            config.twilio.auth_token.clone(),
            config.twilio.from_number.clone(),
        ));
        let provider = donna_agent::build_provider(&config.llm);

        let orchestrator = Arc::new(PostCallOrchestrator::new(
            Arc::clone(&conversations),
            Arc::clone(&provider),
            config.llm.model.clone(),
            Arc::clone(&memory),
            Arc::clone(&daily),
            Arc::clone(&deliveries),
            Arc::clone(&stash),
            Arc::clone(&seniors),
        ));

        let engine = Arc::new(SchedulerEngine::new(
            Arc::clone(&reminders),
            Arc::clone(&deliveries),
            Arc::clone(&seniors),
            Arc::clone(&memory),
            Arc::clone(&daily),
            Arc::clone(&twilio),
            Arc::clone(&stash),
            config.gateway.public_url.clone(),
            Duration::from_secs(config.scheduler.poll_interval_seconds),
        ));

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            seniors,
            stash,
            provider,
            orchestrator,
            engine,
            shutdown,
        })
    }
}

/// Start the reminder scheduler loop.
pub fn spawn_scheduler(state: Arc<AppState>) {
    let engine = Arc::clone(&state.engine);
    let rx = state.shutdown.subscribe();
    tokio::spawn(async move {
        engine.run(rx).await;
    });
    info!("scheduler spawned");
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Twilio webhooks (signature-validated)
        .route("/twilio/voice", post(crate::http::voice::inbound_voice))
        .route(
            "/twilio/voice/outbound",
            post(crate::http::voice::outbound_voice),
        )
        // Twilio media stream (WebSocket)
        .route("/twilio/media", get(crate::media::media_upgrade))
        // manual call trigger
        .route("/calls", post(crate::http::calls::manual_call))
        // health check
        .route("/health", get(crate::http::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
