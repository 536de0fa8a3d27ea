use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use translation_crowd::api::handlers::{
    handle_assign_next, handle_lock_task, handle_project_stats, handle_reconcile_locks,
    handle_recompute_all, handle_recompute_task, handle_score_label, handle_select_task,
    handle_submit_translation, handle_unlock_task,
};
use translation_crowd::config::EngineConfig;
use translation_crowd::engine::Engine;
use translation_crowd::store::memory::Store;
use translation_crowd::store::types::now_secs;
use translation_crowd::sweep::notifier::{NoopNotifier, Notifier, WebhookNotifier};
use translation_crowd::sweep::reminder::ReminderSweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--notify-url <url>] [--daily-hour <0-23>] [--sweep-interval-hours <n>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:6000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:6000 --notify-url http://127.0.0.1:7000",
            args[0]
        );
        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut notify_url: Option<String> = None;
    let mut daily_hour: u64 = 17;
    let mut sweep_interval_hours: u64 = 6;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--notify-url" => {
                notify_url = Some(args[i + 1].clone());
                i += 2;
            }
            "--daily-hour" => {
                daily_hour = args[i + 1].parse()?;
                i += 2;
            }
            "--sweep-interval-hours" => {
                sweep_interval_hours = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.expect("--bind is required");

    tracing::info!("Starting crowd translation node on {}", bind_addr);

    // 1. Store and engine:
    let store = Arc::new(Store::new());
    let config = EngineConfig::default();
    let engine = Engine::new(store.clone(), config.clone());

    // 2. Notification channel:
    let notifier: Arc<dyn Notifier> = match &notify_url {
        Some(url) => {
            tracing::info!("Delivering reminders via {}", url);
            Arc::new(WebhookNotifier::new(url))
        }
        None => {
            tracing::info!("No notify url configured, reminders are log-only");
            Arc::new(NoopNotifier)
        }
    };
    let sweep = Arc::new(ReminderSweep::new(
        store.clone(),
        engine.leases().clone(),
        engine.selector().clone(),
        notifier,
        config.reminder.clone(),
        config.rng_seed,
    ));

    // 3. Daily fixed-hour reminder job:
    let daily_sweep = sweep.clone();
    tokio::spawn(async move {
        loop {
            let wait = seconds_until_hour(daily_hour);
            tracing::info!("Next daily reminder sweep in {} seconds", wait);
            tokio::time::sleep(Duration::from_secs(wait)).await;
            if let Err(e) = daily_sweep.run().await {
                tracing::error!("Daily reminder sweep failed: {}", e);
            }
        }
    });

    // 4. Jittered interval reminder job:
    let interval_sweep = sweep.clone();
    tokio::spawn(async move {
        let base = sweep_interval_hours * 3600;
        loop {
            let jitter = rand::random::<u64>() % (base / 4 + 1);
            tokio::time::sleep(Duration::from_secs(base + jitter)).await;
            if let Err(e) = interval_sweep.run().await {
                tracing::error!("Interval reminder sweep failed: {}", e);
            }
        }
    });

    // 5. Periodic status recomputation (slow full sweep):
    let status_engine = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(6 * 3600));
        loop {
            interval.tick().await;
            match status_engine.recompute_all_task_statuses() {
                Ok(n) => tracing::info!("Periodic status recomputation covered {} tasks", n),
                Err(e) => tracing::error!("Periodic status recomputation failed: {}", e),
            }
        }
    });

    // 6. Stats reporter:
    let stats_store = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            tracing::info!(
                "Store stats: {} tasks, {} inputs, {} translations, {} labels, {} workers",
                stats_store.task_count(),
                stats_store.input_count(),
                stats_store.translation_count(),
                stats_store.label_count(),
                stats_store.worker_count()
            );
        }
    });

    // 7. HTTP router:
    let app = Router::new()
        .route("/task/select", post(handle_select_task))
        .route("/task/:id/lock", post(handle_lock_task))
        .route("/task/:id/unlock", post(handle_unlock_task))
        .route("/task/:id/assign", post(handle_assign_next))
        .route("/translation/submit", post(handle_submit_translation))
        .route("/label/score", post(handle_score_label))
        .route("/project/:id/stats", get(handle_project_stats))
        .route("/admin/reconcile_locks", post(handle_reconcile_locks))
        .route("/admin/recompute/:id", post(handle_recompute_task))
        .route("/admin/recompute_all", post(handle_recompute_all))
        .layer(Extension(engine.clone()));

    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Seconds until the next occurrence of `hour`:00 UTC.
fn seconds_until_hour(hour: u64) -> u64 {
    let now = now_secs();
    let day = 86_400;
    let today_mark = now - now % day + hour * 3_600;
    if today_mark > now {
        today_mark - now
    } else {
        today_mark + day - now
    }
}
