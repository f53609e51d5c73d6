use std::sync::Arc;

use tracing::info;

use turnero::agenda::{Agenda, AgendaChange};
use turnero::config::Config;
use turnero::store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    turnero::observability::init_logging();

    let config = Config::from_env()?;
    turnero::observability::init_metrics(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(Store::open(&config.journal_path())?);
    info!("turnero started");
    info!("  data_dir: {}", config.data_dir.display());
    info!(
        "  slots: every {} min, {}-day horizon",
        config.schedule.slot_minutes, config.schedule.horizon_days
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let now = chrono::Local::now().naive_local();
    if config.seed {
        turnero::seed::seed_catalog(&store, now).await?;
    }

    let compactor_store = store.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        turnero::compactor::run_compactor(compactor_store, threshold).await;
    });

    let mut agenda = Agenda::open(store.clone(), now.date()).await?;
    log_agenda(&agenda);

    // Graceful shutdown on SIGTERM/ctrl-c
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut day_check = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            change = agenda.refresh() => {
                let Some(change) = change else { break };
                if change == AgendaChange::Appointments {
                    log_agenda(&agenda);
                }
            }
            _ = day_check.tick() => {
                // Follow the calendar across midnight.
                let today = chrono::Local::now().date_naive();
                if today != agenda.day() {
                    agenda.select_day(today).await?;
                    log_agenda(&agenda);
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // Leave a compact journal for the next start.
    if let Err(e) = store.compact_journal().await {
        tracing::warn!("final compaction skipped: {e}");
    }
    info!("turnero stopped");
    Ok(())
}

fn log_agenda(agenda: &Agenda) {
    let summary = agenda.summary();
    info!(
        day = %agenda.day(),
        total = summary.total(),
        pending = summary.pending,
        confirmed = summary.confirmed,
        completed = summary.completed,
        cancelled = summary.cancelled,
        expected_revenue = summary.expected_revenue,
        "agenda"
    );
    for entry in agenda.entries() {
        info!(
            "  {}-{} {} | {} | {} ({})",
            entry.appointment.date.format("%H:%M"),
            entry.end.format("%H:%M"),
            entry.appointment.client_name,
            entry.service_name,
            entry.barber_name,
            entry.appointment.status
        );
    }
}
