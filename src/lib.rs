pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod models;
pub mod moderation;
pub mod notifier;
pub mod presence;
pub mod profanity;
pub mod retention;
pub mod routes;
pub mod seq;
pub mod spam;

use audit::AuditLog;
use config::ChatConfig;
use db::Db;
use hub::SessionHub;
use notifier::{Notifier, NoopNotifier, PushGateway};
use presence::TypingTracker;
use profanity::ProfanityFilter;
use rocket_cors::CorsOptions;
use seq::Sequencer;
use spam::SpamMonitor;
use std::env;
use std::sync::Arc;

/// Everything the dispatcher and routes need, wired once at startup.
pub struct Core {
    pub config: ChatConfig,
    pub db: Db,
    pub hub: SessionHub,
    pub typing: Arc<TypingTracker>,
    pub spam: SpamMonitor,
    pub profanity: ProfanityFilter,
    pub audit: AuditLog,
    pub notifier: Box<dyn Notifier>,
}

/// Build the core against a database path. The sequencer reconciles its
/// counters from the update log before anything else runs.
pub fn build_core(db_path: &str, config: ChatConfig) -> Arc<Core> {
    let notifier: Box<dyn Notifier> = match &config.push_gateway_url {
        Some(url) => Box::new(PushGateway::new(url.clone())),
        None => Box::new(NoopNotifier),
    };
    build_core_with_notifier(db_path, config, notifier)
}

pub fn build_core_with_notifier(
    db_path: &str,
    config: ChatConfig,
    notifier: Box<dyn Notifier>,
) -> Arc<Core> {
    // Ensure the data directories exist
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let uploads = std::path::Path::new(&config.data_dir).join("uploads").join("files");
    std::fs::create_dir_all(uploads.join("normal")).ok();
    std::fs::create_dir_all(uploads.join("encrypted")).ok();

    let db = Db::new(db_path);
    let sequencer = Arc::new(Sequencer::new(db.clone()));
    let hub = SessionHub::new(
        db.clone(),
        sequencer,
        config.flush_delay_ms,
        config.recent_sig_window,
    );
    let typing = Arc::new(TypingTracker::new(config.typing_ttl_secs));
    let spam = SpamMonitor::new(&config);
    let profanity = ProfanityFilter::new(&config.data_dir);
    let audit = AuditLog::new(&config.data_dir);

    Arc::new(Core { config, db, hub, typing, spam, profanity, audit, notifier })
}

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/chat.db".to_string());
    rocket_with_db(&db_path)
}

pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    build_rocket(db_path, ChatConfig::from_env())
}

pub fn rocket_with_db_and_config(db_path: &str, config: ChatConfig) -> rocket::Rocket<rocket::Build> {
    build_rocket(db_path, config)
}

fn build_rocket(db_path: &str, config: ChatConfig) -> rocket::Rocket<rocket::Build> {
    let core = build_core(db_path, config);

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    rocket::build()
        .manage(core.clone())
        .attach(cors)
        .register(
            "/",
            rocket::catchers![routes::not_found, routes::unauthorized],
        )
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::stats,
                routes::chat_ws,
                routes::register,
                routes::login,
                routes::logout,
                routes::change_password,
                routes::crypto_key_put,
                routes::crypto_key_get,
                routes::crypto_backup_put,
                routes::crypto_backup_get,
                routes::push_subscribe,
                routes::push_register_fcm,
                routes::get_file_normal,
                routes::get_file_encrypted,
                routes::blocklist_list,
                routes::blocklist_append,
                routes::blocklist_remove,
                routes::admin_suspend_user,
                routes::admin_unsuspend_user,
                routes::admin_delete_user,
                routes::admin_verify_toggle,
                routes::admin_clear_rate_limits,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Typing Sweeper", {
            let core = core.clone();
            move |_rocket| {
                Box::pin(async move {
                    presence::spawn_typing_sweeper(core.hub.clone(), core.typing.clone());
                    println!("⌨️  Typing sweeper started");
                })
            }
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("Update Log Retention", {
            let core = core.clone();
            move |_rocket| {
                Box::pin(async move {
                    retention::spawn_retention_task(
                        core.db.clone(),
                        core.config.update_log_retention_hours,
                    );
                    println!("🧹 Update log retention task started");
                })
            }
        }))
        .attach(rocket::fairing::AdHoc::on_response("Access Log", |req, res| {
            Box::pin(async move {
                let path = req.uri().path().to_string();
                // The WebSocket endpoint logs its own connect/disconnect pair.
                if path == "/chat/ws" {
                    return;
                }
                if let Some(core) = req.rocket().state::<Arc<Core>>() {
                    let ip = req
                        .headers()
                        .get_one("X-Forwarded-For")
                        .and_then(|s| s.split(',').next())
                        .map(|s| s.trim().to_string())
                        .or_else(|| req.remote().map(|r| r.ip().to_string()));
                    core.audit.access(audit::AccessEvent::HttpRequest {
                        method: req.method().as_str().to_string(),
                        path,
                        status: res.status().code,
                        user: None,
                        ip,
                    });
                }
            })
        }))
}
