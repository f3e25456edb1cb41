//! Energy integrator (C10): per-barcode trapezoidal Wh accumulation with a
//! gap policy that discards intervals spanning a disconnect during active
//! production.
//!
//! Grounded on `pytap/energy.py::accumulate_energy`. `readings_today` is a
//! `SPEC_FULL.md` addition absent from the reference implementation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Default maximum gap (seconds) trapezoidal integration will bridge.
pub const DEFAULT_GAP_THRESHOLD_SECONDS: i64 = 120;
/// Below this wattage, a gap is assumed to be nighttime silence, not a
/// disconnect during production.
pub const DEFAULT_LOW_POWER_THRESHOLD_W: f64 = 1.0;

/// Per-barcode energy accumulation state.
///
/// Field names follow this crate's own naming; `daily_wh`/`total_wh`
/// serialize under the `daily_energy_wh`/`total_energy_wh` keys the
/// persisted-document contract names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyAccumulator {
    #[serde(rename = "daily_energy_wh")]
    pub daily_wh: f64,
    #[serde(rename = "total_energy_wh")]
    pub total_wh: f64,
    pub daily_reset_date: Option<NaiveDate>,
    pub last_power_w: f64,
    pub last_reading_ts: Option<DateTime<Utc>>,
    pub readings_today: u64,
}

impl Default for EnergyAccumulator {
    fn default() -> Self {
        EnergyAccumulator {
            daily_wh: 0.0,
            total_wh: 0.0,
            daily_reset_date: None,
            last_power_w: 0.0,
            last_reading_ts: None,
            readings_today: 0,
        }
    }
}

/// Outcome of a single [`accumulate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyUpdate {
    pub increment_wh: f64,
    pub discarded_gap_during_production: bool,
}

/// Tunable thresholds for [`accumulate`], overridable per
/// [`crate::coordinator::CoordinatorConfig`].
#[derive(Debug, Clone, Copy)]
pub struct EnergyThresholds {
    pub gap_threshold_seconds: i64,
    pub low_power_threshold_w: f64,
}

impl Default for EnergyThresholds {
    fn default() -> Self {
        EnergyThresholds {
            gap_threshold_seconds: DEFAULT_GAP_THRESHOLD_SECONDS,
            low_power_threshold_w: DEFAULT_LOW_POWER_THRESHOLD_W,
        }
    }
}

/// Integrates one power reading into `acc`, mutating it in place.
///
/// Negative power is clamped to zero. A calendar-date change since the last
/// reset zeroes `daily_wh` and `readings_today` before integration.
pub fn accumulate(acc: &mut EnergyAccumulator, power_w: f64, now: DateTime<Utc>, thresholds: EnergyThresholds) -> EnergyUpdate {
    let power_w = power_w.max(0.0);
    let today = now.date_naive();

    if acc.daily_reset_date != Some(today) {
        acc.daily_wh = 0.0;
        acc.readings_today = 0;
        acc.daily_reset_date = Some(today);
    }

    let mut update = EnergyUpdate::default();

    let Some(last_ts) = acc.last_reading_ts else {
        acc.last_power_w = power_w;
        acc.last_reading_ts = Some(now);
        acc.readings_today += 1;
        return update;
    };

    let delta_seconds = (now - last_ts).num_milliseconds() as f64 / 1000.0;

    if delta_seconds <= 0.0 {
        // No forward interval to integrate over; update the baseline only.
        acc.last_power_w = power_w;
        acc.last_reading_ts = Some(now);
        return update;
    }

    let previous_power_w = acc.last_power_w.max(0.0);
    if delta_seconds <= thresholds.gap_threshold_seconds as f64 {
        let increment = ((previous_power_w + power_w) / 2.0) * (delta_seconds / 3600.0);
        acc.daily_wh += increment;
        acc.total_wh += increment;
        update.increment_wh = increment;
    } else if previous_power_w > thresholds.low_power_threshold_w || power_w > thresholds.low_power_threshold_w {
        update.discarded_gap_during_production = true;
    }

    acc.last_power_w = power_w;
    acc.last_reading_ts = Some(now);
    acc.readings_today += 1;

    update
}
