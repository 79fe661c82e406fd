//! Polling controller
//!
//! Keeps the dashboard's vessel list and selection in sync with the backend.
//! Two timers drive it: one re-fetches the vessel list, the other applies
//! synthetic jitter to the selected vessel. Every state change is published
//! as a [`DashboardSnapshot`] on a watch channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    config::{PollingConfig, RefreshMode},
    gateway::TelemetrySource,
    models::{Vessel, VesselId},
    simulation::JitterSimulator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardPhase {
    /// No poll has completed yet
    Loading,
    /// A vessel is selected
    Ready,
    /// The last poll returned no vessels or failed
    Empty,
}

/// What the presentation layer renders
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub phase: DashboardPhase,
    pub vessels: Vec<Arc<Vessel>>,
    pub selected: Option<Arc<Vessel>>,
    pub last_update: Option<DateTime<Utc>>,
    pub refreshing: bool,
    /// Reason of the last failed poll, cleared by the next successful one
    pub last_error: Option<String>,
}

impl DashboardSnapshot {
    /// Empty because the backend could not be reached, not because the fleet is empty
    pub fn is_unavailable(&self) -> bool {
        self.last_error.is_some()
    }
}

/// Result of a single vessel-list poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied { vessels: usize },
    Failed,
    /// A newer poll finished first
    Stale,
    /// The controller was stopped while the request was in flight
    Discarded,
}

/// Pick the selection for a freshly fetched list
///
/// Keeps the vessel with the previously selected identifier when it is still
/// listed, otherwise falls back to the first vessel. The returned `Arc` is the
/// list's own element.
pub fn reconcile_selection(
    previous: Option<&VesselId>,
    vessels: &[Arc<Vessel>],
) -> Option<Arc<Vessel>> {
    previous
        .and_then(|id| vessels.iter().find(|v| &v.id == id))
        .or_else(|| vessels.first())
        .cloned()
}

struct ControllerState {
    phase: DashboardPhase,
    vessels: Vec<Arc<Vessel>>,
    selected: Option<Arc<Vessel>>,
    last_update: Option<DateTime<Utc>>,
    refreshing: bool,
    last_error: Option<String>,
    applied_generation: u64,
    simulator: Option<JitterSimulator>,
}

impl ControllerState {
    fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            phase: self.phase,
            vessels: self.vessels.clone(),
            selected: self.selected.clone(),
            last_update: self.last_update,
            refreshing: self.refreshing,
            last_error: self.last_error.clone(),
        }
    }
}

struct Shared {
    source: Arc<dyn TelemetrySource>,
    config: PollingConfig,
    jitter_enabled: bool,
    state: Mutex<ControllerState>,
    mounted: AtomicBool,
    next_generation: AtomicU64,
    updates: watch::Sender<DashboardSnapshot>,
}

#[derive(Clone)]
pub struct PollingController {
    shared: Arc<Shared>,
}

impl PollingController {
    /// Create a controller; `simulator` of `None` disables live jitter
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        config: PollingConfig,
        simulator: Option<JitterSimulator>,
    ) -> Self {
        let jitter_enabled = simulator.is_some();
        let state = ControllerState {
            phase: DashboardPhase::Loading,
            vessels: Vec::new(),
            selected: None,
            last_update: None,
            refreshing: false,
            last_error: None,
            applied_generation: 0,
            simulator,
        };
        let (updates, _) = watch::channel(state.snapshot());

        Self {
            shared: Arc::new(Shared {
                source,
                config,
                jitter_enabled,
                state: Mutex::new(state),
                mounted: AtomicBool::new(true),
                next_generation: AtomicU64::new(0),
                updates,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Latest published state
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.shared.updates.borrow().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.mounted.load(Ordering::SeqCst)
    }

    fn publish(&self, state: &ControllerState) {
        self.shared.updates.send_replace(state.snapshot());
    }

    /// Fetch the vessel list once and apply it
    ///
    /// A failed fetch clears the list and the selection.
    pub async fn poll_once(&self) -> PollOutcome {
        let generation = self.shared.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.shared.source.fetch_vessels().await;

        let mut state = self.shared.state.lock().await;
        if !self.is_mounted() {
            debug!("Dropping vessel poll #{} after shutdown", generation);
            return PollOutcome::Discarded;
        }
        if generation <= state.applied_generation {
            debug!(
                "Dropping vessel poll #{}, #{} already applied",
                generation, state.applied_generation
            );
            return PollOutcome::Stale;
        }
        state.applied_generation = generation;

        let outcome = match result {
            Ok(vessels) => {
                let vessels: Vec<Arc<Vessel>> = vessels.into_iter().map(Arc::new).collect();
                let previous = state.selected.as_ref().map(|v| v.id.clone());
                state.selected = reconcile_selection(previous.as_ref(), &vessels);
                state.phase = if state.selected.is_some() {
                    DashboardPhase::Ready
                } else {
                    DashboardPhase::Empty
                };
                state.last_error = None;
                let count = vessels.len();
                state.vessels = vessels;
                debug!("Vessel poll #{} applied: {} vessels", generation, count);
                PollOutcome::Applied { vessels: count }
            }
            Err(e) => {
                error!("Vessel poll #{} failed: {}", generation, e);
                state.vessels.clear();
                state.selected = None;
                state.phase = DashboardPhase::Empty;
                state.last_error = Some(e.to_string());
                PollOutcome::Failed
            }
        };

        self.publish(&state);
        outcome
    }

    /// Apply one step of synthetic jitter to the selected vessel
    ///
    /// Stamps the update time whenever a vessel is selected; returns whether
    /// readings changed.
    pub async fn apply_jitter(&self) -> bool {
        let mut guard = self.shared.state.lock().await;
        if !self.is_mounted() {
            return false;
        }
        let state = &mut *guard;
        let Some(current) = state.selected.as_ref() else {
            return false;
        };

        let next = state
            .simulator
            .as_mut()
            .and_then(|simulator| simulator.perturb(current));
        let changed = next.is_some();
        if let Some(next) = next {
            state.selected = Some(Arc::new(next));
        }
        state.last_update = Some(Utc::now());

        self.publish(state);
        changed
    }

    /// Select a vessel from the current list
    pub async fn select_vessel(&self, id: &VesselId) -> bool {
        let mut state = self.shared.state.lock().await;
        let Some(vessel) = state.vessels.iter().find(|v| &v.id == id).cloned() else {
            debug!("Vessel {} is not listed", id);
            return false;
        };

        state.selected = Some(vessel);
        state.phase = DashboardPhase::Ready;
        self.publish(&state);
        true
    }

    /// User-triggered refresh
    ///
    /// Holds the refreshing flag for the configured delay, then stamps the
    /// update time. With [`RefreshMode::Refetch`] the vessel list is polled
    /// before the flag clears. Returns `false` if a refresh is already running
    /// or the controller was shut down meanwhile.
    pub async fn refresh(&self) -> bool {
        {
            let mut state = self.shared.state.lock().await;
            if state.refreshing {
                return false;
            }
            state.refreshing = true;
            self.publish(&state);
        }

        time::sleep(self.shared.config.refresh_delay).await;
        if self.shared.config.refresh_mode == RefreshMode::Refetch {
            self.poll_once().await;
        }

        let mut state = self.shared.state.lock().await;
        state.refreshing = false;
        if !self.is_mounted() {
            debug!("Dropping refresh after shutdown");
            return false;
        }
        state.last_update = Some(Utc::now());
        self.publish(&state);
        true
    }

    /// Start the poll and live-update timers
    ///
    /// The vessel list is fetched immediately and then every
    /// `vessel_interval`. The live-update timer applies jitter, if enabled,
    /// and stamps the update time every `jitter_interval`. Each poll runs as its own task, so slow responses
    /// may overlap; stale ones are dropped by generation.
    pub fn start(&self) -> PollingGuard {
        let mut tasks = Vec::with_capacity(2);

        let controller = self.clone();
        let period = self.shared.config.vessel_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !controller.is_mounted() {
                    break;
                }
                let poller = controller.clone();
                tokio::spawn(async move {
                    poller.poll_once().await;
                });
            }
        }));

        // Runs with jitter disabled too, to keep the update time ticking
        let controller = self.clone();
        let period = self.shared.config.jitter_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !controller.is_mounted() {
                    break;
                }
                controller.apply_jitter().await;
            }
        }));

        info!(
            "Polling started: vessels every {:?}, live update every {:?}, jitter {}",
            self.shared.config.vessel_interval,
            period,
            if self.shared.jitter_enabled { "on" } else { "off" }
        );

        PollingGuard {
            controller: self.clone(),
            tasks,
        }
    }

    /// Stop applying results; in-flight requests finish but are discarded
    pub fn shutdown(&self) {
        if self.shared.mounted.swap(false, Ordering::SeqCst) {
            info!("Polling controller shut down");
        }
    }
}

/// Stops the controller's timers when dropped
pub struct PollingGuard {
    controller: PollingController,
    tasks: Vec<JoinHandle<()>>,
}

impl PollingGuard {
    /// Shut the controller down and abort both timers
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PollingGuard {
    fn drop(&mut self) {
        self.controller.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
