use chrono::{DateTime, Utc};
use num_derive::FromPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;

type Watts = f64;
type KWh = f64;
type Volts = f64;
type Amperes = f64;
type Hertz = f64;

/// Outcome of a successful login, returned by `/api/connect`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSummary {
    pub plant_name: Option<String>,
    pub plant_id: Option<String>,
    pub user_id: Option<String>,
    pub country: Option<String>,
    pub device_sn: Option<String>,
}

/// In-memory session state as shown by `/api/status`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub connected: bool,
    pub plant_name: Option<String>,
    pub device_sn: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_fetch: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridStatus {
    Connected,
    OffGrid,
}

/// Operating state reported by storage inverters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageStatus {
    Offline = -1,
    Standby = 0,
    Charging = 1,
    Discharging = 2,
    Fault = 3,
    Flash = 4,
    PvCharging = 5,
    AcCharging = 6,
    CombinedCharging = 7,
    CombinedChargingBypass = 8,
    PvChargingBypass = 9,
    AcChargingBypass = 10,
    Bypass = 11,
    PvChargingDischarging = 12,
    Unknown = 99,
}

impl StorageStatus {
    pub fn from_code(code: Option<i64>) -> Self {
        code.and_then(num::FromPrimitive::from_i64)
            .unwrap_or(StorageStatus::Unknown)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    pub id: Option<String>,
    pub name: Option<String>,
    pub device_sn: Option<String>,
    pub nominal_power: Watts,
    pub today_energy: KWh,
    pub total_energy: KWh,
    pub co2_saved: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PvString {
    pub voltage: Volts,
    pub current: Amperes,
    pub power: Watts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pv {
    pub power: Watts,
    pub pv1: PvString,
    pub pv2: PvString,
    pub today_energy: KWh,
    pub total_energy: KWh,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Battery {
    /// State of charge, percent
    pub soc: f64,
    pub voltage: Volts,
    pub current: Amperes,
    /// Positive while charging
    pub power: Watts,
    pub charge_power: Watts,
    pub discharge_power: Watts,
    pub charge_today: KWh,
    pub discharge_today: KWh,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    pub power: Watts,
    pub voltage: Volts,
    pub frequency: Hertz,
    pub percent: f64,
    pub today_energy: KWh,
    pub total_energy: KWh,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub status: GridStatus,
    pub voltage: Volts,
    pub frequency: Hertz,
    pub power: Watts,
    pub import_today: KWh,
    pub export_today: KWh,
    pub import_total: KWh,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inverter {
    pub status: StorageStatus,
    pub status_code: Option<i64>,
    pub temperature: f64,
    pub dc_temperature: f64,
    pub bus_voltage: Volts,
    pub ac_input_voltage: Volts,
    pub rated_power: Watts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Energy {
    pub pv_today: KWh,
    pub pv_total: KWh,
    pub load_today: KWh,
    pub load_total: KWh,
    pub charge_today: KWh,
    pub discharge_today: KWh,
    pub grid_import_today: KWh,
    pub grid_import_total: KWh,
    pub grid_export_today: KWh,
}

/// One normalized refresh of the dashboard data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub plant: Plant,
    pub pv: Pv,
    pub battery: Battery,
    pub load: Load,
    pub grid: Grid,
    pub inverter: Inverter,
    pub energy: Energy,
    /// Upstream source label -> error message for sources that failed this refresh
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub source_errors: BTreeMap<String, String>,
}
