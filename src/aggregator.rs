//! Hourly aggregation of vessel history for charts

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    gateway::{HistoryFilter, TelemetrySource},
    models::{HistoryRecord, VesselId},
};

pub const HOURS_PER_DAY: usize = 24;

/// One hour of a vessel-day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyBucket {
    /// `HH:00`
    pub label: String,
    pub speed: f64,
    /// Mean of the portside engine channel
    pub rpm: f64,
    /// Always zero, the backend reports no fuel history
    pub fuel: f64,
    pub samples: usize,
}

impl HourlyBucket {
    fn empty(hour: usize) -> Self {
        Self {
            label: format!("{:02}:00", hour),
            speed: 0.0,
            rpm: 0.0,
            fuel: 0.0,
            samples: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Availability {
    Available,
    Unavailable(String),
}

/// Chart data for one vessel on one calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlySummary {
    pub buckets: [HourlyBucket; HOURS_PER_DAY],
    /// Mean of the 24 bucket speeds, one decimal
    pub average_speed: String,
    pub availability: Availability,
}

impl HourlySummary {
    fn zeroed(availability: Availability) -> Self {
        Self::from_buckets(std::array::from_fn(HourlyBucket::empty), availability)
    }

    fn from_buckets(buckets: [HourlyBucket; HOURS_PER_DAY], availability: Availability) -> Self {
        let total: f64 = buckets.iter().map(|b| b.speed).sum();
        let average_speed = format!("{:.1}", total / HOURS_PER_DAY as f64);
        Self {
            buckets,
            average_speed,
            availability,
        }
    }

    pub fn hours(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.label.clone()).collect()
    }

    pub fn speed_series(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.speed).collect()
    }

    pub fn rpm_series(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.rpm).collect()
    }

    pub fn fuel_series(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.fuel).collect()
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }
}

/// First and last instant of `date` in the given offset
pub fn day_bounds(date: NaiveDate, offset: &FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = offset
        .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN).and_utc());
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

/// Bucket the records of one vessel-day into 24 hourly averages
///
/// Records of other vessels or outside the day are ignored, even if the
/// backend already filtered them.
pub fn bucket_hourly(
    records: &[HistoryRecord],
    vessel_id: &VesselId,
    date: NaiveDate,
    offset: &FixedOffset,
) -> HourlySummary {
    let (start, end) = day_bounds(date, offset);

    let mut day: Vec<&HistoryRecord> = records
        .iter()
        .filter(|r| &r.vessel_id == vessel_id && r.timestamp >= start && r.timestamp <= end)
        .collect();
    day.sort_by_key(|r| r.timestamp);

    let buckets = std::array::from_fn(|hour| {
        let hour_start = start + Duration::hours(hour as i64);
        let hour_end = hour_start + Duration::hours(1);
        let in_hour: Vec<&&HistoryRecord> = day
            .iter()
            .filter(|r| r.timestamp >= hour_start && r.timestamp < hour_end)
            .collect();

        let mut bucket = HourlyBucket::empty(hour);
        if !in_hour.is_empty() {
            let n = in_hour.len() as f64;
            bucket.speed = in_hour.iter().map(|r| r.speed).sum::<f64>() / n;
            bucket.rpm = in_hour.iter().map(|r| r.rpm_portside).sum::<f64>() / n;
            bucket.samples = in_hour.len();
        }
        bucket
    });

    HourlySummary::from_buckets(buckets, Availability::Available)
}

/// Builds [`HourlySummary`] values from a telemetry source
pub struct HourlyAggregator {
    source: Arc<dyn TelemetrySource>,
    offset: FixedOffset,
}

impl HourlyAggregator {
    pub fn new(source: Arc<dyn TelemetrySource>, offset: FixedOffset) -> Self {
        Self { source, offset }
    }

    /// Current calendar date in the aggregator's offset
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    /// Aggregate one vessel-day
    ///
    /// A failed fetch yields 24 zero buckets tagged `Unavailable`.
    pub async fn aggregate(&self, vessel_id: &VesselId, date: NaiveDate) -> HourlySummary {
        let filter = HistoryFilter::for_vessel_day(vessel_id.clone(), date);
        match self.source.fetch_history(&filter).await {
            Ok(records) => {
                let summary = bucket_hourly(&records, vessel_id, date, &self.offset);
                info!(
                    "Aggregated {} records for vessel {} on {}",
                    summary.buckets.iter().map(|b| b.samples).sum::<usize>(),
                    vessel_id,
                    date
                );
                summary
            }
            Err(e) => {
                warn!(
                    "History for vessel {} on {} unavailable: {}",
                    vessel_id, date, e
                );
                HourlySummary::zeroed(Availability::Unavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vessel: &str, timestamp: DateTime<Utc>, speed: f64, rpm: f64) -> HistoryRecord {
        HistoryRecord {
            id: format!("{}-{}", vessel, timestamp.timestamp()),
            vessel_id: VesselId::from(vessel),
            vessel_name: "KM Bahari".to_string(),
            vessel_type: "Tugboat".to_string(),
            timestamp,
            latitude: 0.0,
            longitude: 0.0,
            speed,
            heading: 0.0,
            rpm_portside: rpm,
            rpm_starboard: rpm + 100.0,
            rpm_center: rpm + 200.0,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn empty_day_has_24_zero_buckets() {
        let summary = bucket_hourly(&[], &VesselId::from("1"), date(), &utc());

        assert_eq!(summary.hours().len(), 24);
        assert_eq!(summary.speed_series(), vec![0.0; 24]);
        assert_eq!(summary.rpm_series(), vec![0.0; 24]);
        assert_eq!(summary.fuel_series(), vec![0.0; 24]);
        assert_eq!(summary.average_speed, "0.0");
        assert_eq!(summary.hours()[0], "00:00");
        assert_eq!(summary.hours()[23], "23:00");
        assert!(summary.is_available());
    }

    #[test]
    fn average_is_over_all_buckets() {
        let records = vec![record("1", at(9, 0), 10.0, 1200.0)];
        let summary = bucket_hourly(&records, &VesselId::from("1"), date(), &utc());

        assert_eq!(summary.buckets[9].speed, 10.0);
        assert_eq!(summary.buckets[9].rpm, 1200.0);
        assert_eq!(summary.average_speed, "0.4");
    }

    #[test]
    fn bucket_averages_portside_only() {
        let records = vec![
            record("1", at(14, 50), 12.0, 1000.0),
            record("1", at(14, 5), 8.0, 1400.0),
            record("1", at(15, 0), 6.0, 900.0),
        ];
        let summary = bucket_hourly(&records, &VesselId::from("1"), date(), &utc());

        assert_eq!(summary.buckets[14].speed, 10.0);
        assert_eq!(summary.buckets[14].rpm, 1200.0);
        assert_eq!(summary.buckets[14].samples, 2);
        assert_eq!(summary.buckets[15].speed, 6.0);
        assert_eq!(summary.buckets[14].fuel, 0.0);
    }

    #[test]
    fn filters_other_vessels_and_days() {
        let records = vec![
            record("2", at(10, 0), 30.0, 2000.0),
            record(
                "1",
                Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 59).unwrap(),
                30.0,
                2000.0,
            ),
            record(
                "1",
                Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
                30.0,
                2000.0,
            ),
            record("1", at(23, 59), 24.0, 1000.0),
        ];
        let summary = bucket_hourly(&records, &VesselId::from("1"), date(), &utc());

        let total: usize = summary.buckets.iter().map(|b| b.samples).sum();
        assert_eq!(total, 1);
        assert_eq!(summary.buckets[23].speed, 24.0);
        assert_eq!(summary.average_speed, "1.0");
    }

    #[test]
    fn day_follows_offset() {
        // 02:30 UTC is 09:30 at UTC+7
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let records = vec![record("1", at(2, 30), 5.0, 800.0)];
        let summary = bucket_hourly(&records, &VesselId::from("1"), date(), &offset);

        assert_eq!(summary.buckets[9].speed, 5.0);

        let (start, end) = day_bounds(date(), &offset);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 4, 30, 17, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1) - Duration::milliseconds(1));
    }
}
