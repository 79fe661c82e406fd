//! Headless vessel monitor

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use vessel_monitor::{
    aggregator::HourlyAggregator,
    config::AppConfig,
    dashboard::{format_position, DashboardStats, LiveReadings, PowerSourceStatus},
    errors::MonitorError,
    gateway::{HttpGateway, TelemetrySource},
    models::VesselId,
    polling::{DashboardPhase, DashboardSnapshot, PollingController},
    session::{
        AuthController, CredentialAuthenticator, FileSessionStore, InMemorySessionStore,
        InactivityTracker, SessionStore,
    },
    simulation::JitterSimulator,
};

#[tokio::main]
async fn main() -> Result<(), MonitorError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let store: Arc<dyn SessionStore> = match &config.session.path {
        Some(path) => Arc::new(FileSessionStore::open(path)?),
        None => Arc::new(InMemorySessionStore::new()),
    };
    let tracker = Arc::new(InactivityTracker::new(
        store.clone(),
        config.session.inactivity_timeout,
    ));
    let auth = AuthController::new(
        store,
        Arc::new(CredentialAuthenticator::new(config.session.users.clone())),
        tracker,
    );
    match auth.init() {
        Some(user) => info!(
            "Signed in as {} ({})",
            user.username,
            user.role.as_deref().unwrap_or("no role")
        ),
        None => info!("No active session"),
    }

    let gateway: Arc<dyn TelemetrySource> = Arc::new(HttpGateway::new(&config.backend)?);
    let simulator = config
        .simulation
        .enabled
        .then(|| JitterSimulator::from_config(&config.simulation));
    let controller = PollingController::new(gateway.clone(), config.polling.clone(), simulator);
    let aggregator = HourlyAggregator::new(gateway.clone(), config.dashboard.utc_offset()?);

    let guard = controller.start();

    tokio::select! {
        _ = run_monitor(
            controller.subscribe(),
            &aggregator,
            gateway.as_ref(),
            config.polling.recent_activity_limit,
        ) => {
            info!("Dashboard updates ended");
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    guard.stop();
    auth.shutdown();

    Ok(())
}

async fn run_monitor(
    mut updates: watch::Receiver<DashboardSnapshot>,
    aggregator: &HourlyAggregator,
    source: &dyn TelemetrySource,
    recent_limit: usize,
) {
    match source.recent_activity(recent_limit).await {
        Ok(records) => info!(
            "Recent activity: {} records, latest at {:?}",
            records.len(),
            records.first().map(|r| r.timestamp)
        ),
        Err(e) => warn!("Recent activity unavailable: {}", e),
    }

    let mut summarized: Option<VesselId> = None;
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        log_snapshot(&snapshot);

        let Some(selected) = &snapshot.selected else {
            continue;
        };
        if summarized.as_ref() == Some(&selected.id) {
            continue;
        }

        let summary = aggregator.aggregate(&selected.id, aggregator.today()).await;
        if summary.is_available() {
            info!(
                "{} today: average speed {} kn, busiest hour {}",
                selected.name,
                summary.average_speed,
                summary
                    .buckets
                    .iter()
                    .max_by_key(|b| b.samples)
                    .filter(|b| b.samples > 0)
                    .map(|b| b.label.as_str())
                    .unwrap_or("none")
            );
        } else {
            warn!("Hourly history for {} unavailable", selected.name);
        }
        summarized = Some(selected.id.clone());
    }
}

fn log_snapshot(snapshot: &DashboardSnapshot) {
    match snapshot.phase {
        DashboardPhase::Loading => info!("Loading vessel data"),
        DashboardPhase::Empty if snapshot.is_unavailable() => warn!(
            "Vessel data unavailable: {}",
            snapshot.last_error.as_deref().unwrap_or_default()
        ),
        DashboardPhase::Empty => info!("No vessels available"),
        DashboardPhase::Ready => {
            let Some(vessel) = &snapshot.selected else {
                return;
            };
            let stats = DashboardStats::from_vessels(snapshot.vessels.iter().map(|v| v.as_ref()));
            let readings = LiveReadings::from_vessel(vessel);
            let power = PowerSourceStatus::for_vessel(vessel);
            info!(
                "[{}/{} vessels, {} warning, {} critical{}] {} ({}) at {}: {:.1} kn, heading {:.0}, rpm {:.0}/{:.0}/{:.0}, fuel {:.1} L/h{}{}",
                stats.active_vessels,
                stats.total_vessels,
                stats.warning_count,
                stats.critical_count,
                if snapshot.refreshing { ", refreshing" } else { "" },
                vessel.name,
                vessel.vessel_type,
                format_position(vessel),
                readings.speed,
                readings.heading,
                readings.rpm_portside,
                readings.rpm_starboard,
                readings.rpm_center,
                readings.fuel_consumption,
                if power.alarm { ", ALARM" } else { "" },
                if power.blackout { ", BLACKOUT" } else { "" },
            );
        }
    }
}
