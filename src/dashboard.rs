//! Values derived from vessels for display

use serde::Serialize;

use crate::models::{Vessel, VesselStatus};

/// Fleet counters shown on the overview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DashboardStats {
    pub total_vessels: usize,
    pub active_vessels: usize,
    pub warning_count: usize,
    pub critical_count: usize,
}

impl DashboardStats {
    pub fn from_vessels<'a>(vessels: impl IntoIterator<Item = &'a Vessel>) -> Self {
        vessels
            .into_iter()
            .fold(Self::default(), |mut stats, vessel| {
                stats.total_vessels += 1;
                match vessel.status() {
                    VesselStatus::Active => stats.active_vessels += 1,
                    VesselStatus::Warning => stats.warning_count += 1,
                    VesselStatus::Critical => stats.critical_count += 1,
                    VesselStatus::Other(_) => {}
                }
                stats
            })
    }
}

/// Power source and system status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerSourceStatus {
    pub ac_power: bool,
    pub dc_power: bool,
    pub backup_battery: bool,
    pub alarm: bool,
    pub blackout: bool,
}

impl PowerSourceStatus {
    /// The backend reports no power data, so supplies always read as on and
    /// alarm/blackout follow the vessel status.
    pub fn for_vessel(vessel: &Vessel) -> Self {
        let status = vessel.status();
        Self {
            ac_power: true,
            dc_power: true,
            backup_battery: true,
            alarm: matches!(status, VesselStatus::Warning | VesselStatus::Critical),
            blackout: status == VesselStatus::Critical,
        }
    }
}

/// Gauge values; missing readings show as zero
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveReadings {
    pub speed: f64,
    pub heading: f64,
    pub fuel_consumption: f64,
    pub rpm_portside: f64,
    pub rpm_starboard: f64,
    pub rpm_center: f64,
}

impl LiveReadings {
    pub fn from_vessel(vessel: &Vessel) -> Self {
        Self {
            speed: vessel.speed.unwrap_or(0.0),
            heading: vessel.heading.unwrap_or(0.0),
            fuel_consumption: vessel.fuel_consumption,
            rpm_portside: vessel.rpm_1.unwrap_or(0.0),
            rpm_starboard: vessel.rpm_2.unwrap_or(0.0),
            rpm_center: vessel.rpm_3.unwrap_or(0.0),
        }
    }
}

/// `"lat, lon"` with four decimals, or `"N/A"`
pub fn format_position(vessel: &Vessel) -> String {
    match (vessel.latitude, vessel.longitude) {
        (Some(lat), Some(lon)) => format!("{:.4}, {:.4}", lat, lon),
        _ => "N/A".to_string(),
    }
}
