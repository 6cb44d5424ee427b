//! # Interview Coach Backend - Main Application Entry Point
//!
//! Actix-web server hosting mock interviews over a WebSocket. A candidate
//! answers generated questions by voice or text; each answer is judged by an
//! external analysis service, combined with facial-expression insight from
//! the candidate's camera, and returned as one piece of unified feedback.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared application state and request metrics
//! - **session**: Per-interview state, question sequencing and the session table
//! - **analysis**: Answer judgments, affect insight and the feedback merge barrier
//! - **conversation**: Wire events and the interview state machine
//! - **audio**: Incremental buffering of spoken answers
//! - **transcription**: Partial/final speech-to-text on top of the transcription port
//! - **ports**: Traits for external services and their adapters
//! - **websocket**: The `/api/ws` interview connection
//! - **health**, **handlers**, **middleware**, **error**: HTTP surface

mod analysis;
mod audio;
mod config;
mod conversation;
mod error;
mod handlers;
mod health;
mod middleware;
mod ports;
mod session;
mod state;
mod transcription;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::{AffectBackend, AppConfig};
use conversation::ConversationOrchestrator;
use ports::{FacialAnalysisPort, HttpAnalysisService, QuestionBank, RuleBasedAffectAnalyzer};
use session::SessionStore;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::TranscriptionEngine;

/// Set once SIGINT or SIGTERM has been received.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting interview-coach-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let app_state = build_state(config.clone())?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/sessions/{id}", web::get().to(handlers::get_session)),
            )
            .route("/api/ws", web::get().to(websocket::interview_websocket))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Wires the ports into the orchestrator and transcription engine.
fn build_state(config: AppConfig) -> Result<AppState> {
    let services = &config.services;
    let service = Arc::new(
        HttpAnalysisService::new(&services.base_url, services.api_key(), services.connect_timeout())
            .context("Failed to build analysis service client")?,
    );

    let affect_analyzer: Arc<dyn FacialAnalysisPort> = match services.affect_backend {
        AffectBackend::Http => service.clone(),
        AffectBackend::Local => {
            info!("Using local rule-based affect analysis");
            Arc::new(RuleBasedAffectAnalyzer::new())
        }
    };

    let bank = QuestionBank::load(&config.questions.bank_path)
        .with_context(|| format!("Failed to load question bank from {}", config.questions.bank_path))?;

    let conversation = Arc::new(ConversationOrchestrator::new(
        SessionStore::new(config.performance.max_concurrent_sessions),
        Arc::new(bank),
        service.clone(),
        affect_analyzer,
        service.clone(),
    ));
    let transcription = Arc::new(TranscriptionEngine::new(service));

    info!("Analysis service: {}", services.base_url);
    Ok(AppState::new(config, conversation, transcription))
}

/// `RUST_LOG` controls the filter; defaults to
/// `interview_coach_backend=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_coach_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listens for SIGTERM and SIGINT and raises the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers, falling back to ctrl-c: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for ctrl-c: {}", e);
                    return;
                }
                SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
