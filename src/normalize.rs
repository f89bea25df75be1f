//! Mapping of raw upstream payloads into the dashboard [`Snapshot`].
//!
//! Upstream reports the same quantity under different keys depending on firmware and API
//! version. Every output field therefore lists its candidate `(source, key)` pairs in
//! priority order, and the first candidate holding a non-zero number wins.

use crate::model::{
    Battery, Energy, Grid, GridStatus, Inverter, Load, Plant, Pv, PvString, Snapshot,
    StorageStatus,
};
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// AC input below this while the grid side reports voltage means the inverter runs off-grid
const OFF_GRID_AC_VOLTAGE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Source {
    StorageDetail,
    EnergyOverview,
    StorageParams,
    PlantDetail,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::StorageDetail,
        Source::EnergyOverview,
        Source::StorageParams,
        Source::PlantDetail,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Source::StorageDetail => "storageDetail",
            Source::EnergyOverview => "energyOverview",
            Source::StorageParams => "storageParams",
            Source::PlantDetail => "plantDetail",
        }
    }
}

use self::Source::{EnergyOverview as O, PlantDetail as L, StorageDetail as D, StorageParams as P};

type Candidates<'a> = &'a [(Source, &'a str)];

/// Unwrapped upstream payloads of one refresh; failed sources are empty objects.
#[derive(Debug, Clone, Default)]
pub struct RawSources {
    pub storage_detail: Value,
    pub energy_overview: Value,
    pub storage_params: Value,
    pub plant_detail: Value,
    /// Source label -> error message
    pub errors: BTreeMap<String, String>,
}

impl RawSources {
    pub fn get(&self, source: Source) -> &Value {
        match source {
            Source::StorageDetail => &self.storage_detail,
            Source::EnergyOverview => &self.energy_overview,
            Source::StorageParams => &self.storage_params,
            Source::PlantDetail => &self.plant_detail,
        }
    }

    pub fn set(&mut self, source: Source, value: Value) {
        match source {
            Source::StorageDetail => self.storage_detail = value,
            Source::EnergyOverview => self.energy_overview = value,
            Source::StorageParams => self.storage_params = value,
            Source::PlantDetail => self.plant_detail = value,
        }
    }

    fn num(&self, candidates: Candidates) -> f64 {
        coalesce(
            candidates
                .iter()
                .map(|(source, key)| self.get(*source).get(*key)),
        )
    }

    /// First candidate parsing as an integer; zero counts.
    fn integer(&self, candidates: Candidates) -> Option<i64> {
        candidates
            .iter()
            .filter_map(|(source, key)| self.get(*source).get(*key))
            .find_map(|value| match value {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            })
    }

    fn text(&self, candidates: Candidates) -> Option<String> {
        candidates
            .iter()
            .filter_map(|(source, key)| self.get(*source).get(*key))
            .find_map(crate::api::response::json_string)
    }
}

/// First value that parses to a finite non-zero number, else `0.0`.
///
/// A genuine zero in an early candidate is skipped like a missing one.
pub fn coalesce<'a, I>(candidates: I) -> f64
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    candidates
        .into_iter()
        .flatten()
        .filter_map(parse_number)
        .find(|v| v.is_finite() && *v != 0.0)
        .unwrap_or(0.0)
}

pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float_prefix(s),
        _ => None,
    }
}

/// Parse the longest leading decimal number of `text` ("51.2V" -> 51.2), ignoring leading
/// whitespace.
fn parse_float_prefix(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut has_digits = int_end > end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        if has_digits || frac_end > end + 1 {
            has_digits = true;
            end = frac_end;
        }
    }
    if !has_digits {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    text[..end].parse::<f64>().ok()
}

fn pv_string(raw: &RawSources, n: u8) -> PvString {
    let (v, i, p) = (format!("vpv{}", n), format!("ipv{}", n), format!("ppv{}", n));
    let (vc, ic, pc) = (format!("vPv{}", n), format!("iPv{}", n), format!("pPv{}", n));

    PvString {
        voltage: raw.num(&[(D, v.as_str()), (D, vc.as_str()), (P, vc.as_str())]),
        current: raw.num(&[(D, i.as_str()), (D, ic.as_str()), (P, ic.as_str())]),
        power: raw.num(&[(D, p.as_str()), (D, pc.as_str()), (P, pc.as_str())]),
    }
}

fn grid_status(raw: &RawSources) -> GridStatus {
    let ac_voltage = raw.num(&[(D, "vAcInput"), (D, "vac")]);
    let grid_voltage = raw.num(&[(P, "vGrid"), (P, "gridVoltage")]);

    if ac_voltage < OFF_GRID_AC_VOLTAGE && grid_voltage > 0.0 {
        GridStatus::OffGrid
    } else {
        GridStatus::Connected
    }
}

/// Build the dashboard snapshot from one refresh worth of raw payloads.
pub fn normalize(raw: &RawSources, session: &Session, timestamp: DateTime<Utc>) -> Snapshot {
    let plant = Plant {
        id: session
            .plant_id
            .clone()
            .or_else(|| raw.text(&[(L, "plantId"), (L, "id")])),
        name: session
            .plant_name
            .clone()
            .or_else(|| raw.text(&[(L, "plantName")])),
        device_sn: session.device_sn.clone(),
        nominal_power: raw.num(&[(L, "nominalPower"), (L, "nominal_Power"), (P, "ratedPower")]),
        today_energy: raw.num(&[(L, "eToday"), (L, "todayEnergy"), (O, "epvToday")]),
        total_energy: raw.num(&[(L, "eTotal"), (L, "totalEnergy"), (O, "epvTotal")]),
        co2_saved: raw.num(&[(L, "co2"), (L, "Co2Reduction")]),
    };

    let pv1 = pv_string(raw, 1);
    let pv2 = pv_string(raw, 2);
    let pv_power = match raw.num(&[
        (D, "ppv"),
        (D, "pPv"),
        (P, "ppv"),
        (O, "ppv"),
        (D, "panelPower"),
    ]) {
        p if p != 0.0 => p,
        _ => pv1.power + pv2.power,
    };
    let pv = Pv {
        power: pv_power,
        pv1,
        pv2,
        today_energy: raw.num(&[(O, "epvToday"), (D, "epvToday"), (L, "eToday")]),
        total_energy: raw.num(&[(O, "epvTotal"), (D, "epvTotal"), (L, "eTotal")]),
    };

    let charge_power = raw.num(&[(D, "pCharge"), (D, "chargePower"), (P, "pCharge")]);
    let discharge_power = raw.num(&[(D, "pDischarge"), (D, "dischargePower"), (P, "pDischarge")]);
    let battery = Battery {
        soc: raw.num(&[(D, "capacity"), (D, "SOC"), (P, "capacity"), (O, "capacity")]),
        voltage: raw.num(&[(D, "vbat"), (D, "vBat"), (P, "vbat"), (P, "vBat")]),
        current: raw.num(&[(D, "ibat"), (D, "iBat"), (P, "iBat")]),
        power: match raw.num(&[(D, "pBat"), (D, "batPower")]) {
            p if p != 0.0 => p,
            _ => charge_power - discharge_power,
        },
        charge_power,
        discharge_power,
        charge_today: raw.num(&[(O, "eChargeToday"), (O, "echargeToday"), (D, "eChargeToday")]),
        discharge_today: raw.num(&[
            (O, "eDischargeToday"),
            (O, "edischargeToday"),
            (D, "eDischargeToday"),
        ]),
    };

    let load = Load {
        power: raw.num(&[
            (D, "outPutPower"),
            (D, "pLocalLoad"),
            (D, "pAcOutPut"),
            (P, "outPutPower"),
        ]),
        voltage: raw.num(&[(D, "outPutVolt"), (D, "vAcOutput"), (P, "outPutVolt")]),
        frequency: raw.num(&[(D, "freqOutPut"), (D, "fAcOutput"), (P, "freqOutPut")]),
        percent: raw.num(&[(D, "loadPercent"), (P, "loadPercent")]),
        today_energy: raw.num(&[(O, "useEnergyToday"), (O, "eUseToday"), (D, "eLocalLoadToday")]),
        total_energy: raw.num(&[(O, "useEnergyTotal"), (O, "eUseTotal"), (D, "eLocalLoadTotal")]),
    };

    let grid = Grid {
        status: grid_status(raw),
        voltage: raw.num(&[(P, "vGrid"), (D, "vGrid"), (D, "vAcInput"), (P, "gridVoltage")]),
        frequency: raw.num(&[(P, "freqGrid"), (D, "fGrid"), (D, "fAcInput")]),
        power: raw.num(&[(D, "pAcInPut"), (D, "pAcInput"), (D, "gridPower"), (D, "pToUser")]),
        import_today: raw.num(&[(O, "eToUserToday"), (O, "eGridToday"), (D, "eToUserToday")]),
        export_today: raw.num(&[(O, "eToGridToday"), (D, "eToGridToday")]),
        import_total: raw.num(&[(O, "eToUserTotal"), (D, "eToUserTotal")]),
    };

    let status_code = raw.integer(&[(D, "status"), (P, "status"), (D, "deviceStatus")]);
    let inverter = Inverter {
        status: StorageStatus::from_code(status_code),
        status_code,
        temperature: raw.num(&[(D, "invTemperature"), (D, "temperature"), (P, "invTemperature")]),
        dc_temperature: raw.num(&[(D, "dcDcTemperature"), (D, "dcTemperature")]),
        bus_voltage: raw.num(&[(D, "vBus"), (P, "vBus")]),
        ac_input_voltage: raw.num(&[(D, "vAcInput"), (D, "vac")]),
        rated_power: raw.num(&[(P, "ratedPower"), (L, "nominalPower")]),
    };

    let energy = Energy {
        pv_today: pv.today_energy,
        pv_total: pv.total_energy,
        load_today: load.today_energy,
        load_total: load.total_energy,
        charge_today: battery.charge_today,
        discharge_today: battery.discharge_today,
        grid_import_today: grid.import_today,
        grid_import_total: grid.import_total,
        grid_export_today: grid.export_today,
    };

    Snapshot {
        timestamp,
        plant,
        pv,
        battery,
        load,
        grid,
        inverter,
        energy,
        source_errors: raw.errors.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn raw(detail: Value, overview: Value, params: Value, plant: Value) -> RawSources {
        RawSources {
            storage_detail: detail,
            energy_overview: overview,
            storage_params: params,
            plant_detail: plant,
            errors: BTreeMap::new(),
        }
    }

    fn session() -> Session {
        Session {
            plant_id: Some("9001".to_string()),
            plant_name: Some("Home".to_string()),
            device_sn: Some("XYZ123".to_string()),
            ..Session::default()
        }
    }

    #[test]
    fn coalesce_first_non_zero_wins() {
        let values = [json!(0), json!(""), json!("12.5"), json!("7")];
        assert_eq!(12.5, coalesce(values.iter().map(Some)));
    }

    #[test]
    fn coalesce_defaults_to_zero() {
        let values = [json!(0), json!(""), json!("0.0"), json!(null), json!("n/a")];
        assert_eq!(0.0, coalesce(values.iter().map(Some)));
        assert_eq!(0.0, coalesce(vec![None, None]));
    }

    #[test]
    fn coalesce_skips_missing_and_accepts_numbers() {
        let values = [json!(-3.5)];
        assert_eq!(-3.5, coalesce(vec![None, values.first()]));
    }

    #[test]
    fn float_prefix_parsing() {
        assert_eq!(Some(51.2), parse_float_prefix("51.2"));
        assert_eq!(Some(51.2), parse_float_prefix("  51.2V"));
        assert_eq!(Some(-0.5), parse_float_prefix("-.5"));
        assert_eq!(Some(1500.0), parse_float_prefix("1.5e3kWh"));
        assert_eq!(Some(3.0), parse_float_prefix("3e"));
        assert_eq!(Some(7.0), parse_float_prefix("7."));
        assert_eq!(None, parse_float_prefix(""));
        assert_eq!(None, parse_float_prefix("."));
        assert_eq!(None, parse_float_prefix("kWh"));
    }

    #[test]
    fn battery_fields_from_storage_detail() {
        let raw = raw(
            json!({"capacity": "55", "vbat": "51.2", "pCharge": "800", "pDischarge": "0"}),
            json!({}),
            json!({}),
            json!({}),
        );
        let snapshot = normalize(&raw, &session(), Utc::now());

        assert_eq!(55.0, snapshot.battery.soc);
        assert_eq!(51.2, snapshot.battery.voltage);
        assert_eq!(800.0, snapshot.battery.power);
        assert_eq!(Some("Home".to_string()), snapshot.plant.name);
        assert_eq!(Some("9001".to_string()), snapshot.plant.id);
        assert_eq!(Some("XYZ123".to_string()), snapshot.plant.device_sn);
    }

    #[test]
    fn later_candidates_and_sources_fill_gaps() {
        let raw = raw(
            json!({"capacity": "0", "vBat": "0"}),
            json!({"capacity": 61}),
            json!({"vBat": "52.4", "ppv": "0"}),
            json!({}),
        );
        let snapshot = normalize(&raw, &session(), Utc::now());

        assert_eq!(61.0, snapshot.battery.soc);
        assert_eq!(52.4, snapshot.battery.voltage);
    }

    #[test]
    fn pv_power_falls_back_to_string_sum() {
        let raw = raw(
            json!({"ppv1": "1200", "ppv2": "300.5", "vpv1": "310"}),
            json!({}),
            json!({}),
            json!({}),
        );
        let snapshot = normalize(&raw, &session(), Utc::now());

        assert_eq!(1500.5, snapshot.pv.power);
        assert_eq!(310.0, snapshot.pv.pv1.voltage);
    }

    #[test]
    fn grid_status_derivation() {
        let off_grid = raw(json!({"vAcInput": "0"}), json!({}), json!({"vGrid": "230"}), json!({}));
        assert_eq!(
            GridStatus::OffGrid,
            normalize(&off_grid, &session(), Utc::now()).grid.status
        );

        let connected = raw(
            json!({"vAcInput": "229.8"}),
            json!({}),
            json!({"vGrid": "230"}),
            json!({}),
        );
        assert_eq!(
            GridStatus::Connected,
            normalize(&connected, &session(), Utc::now()).grid.status
        );

        let unknown = raw(json!({}), json!({}), json!({}), json!({}));
        assert_eq!(
            GridStatus::Connected,
            normalize(&unknown, &session(), Utc::now()).grid.status
        );
    }

    #[test]
    fn failed_source_only_zeroes_its_own_fields() {
        let mut raw = raw(
            json!({"capacity": "55", "ppv": "2100"}),
            json!({}),
            json!({}),
            json!({"eToday": "12.3", "eTotal": "4567"}),
        );
        raw.errors
            .insert("energyOverview".to_string(), "network error: timeout".to_string());
        let snapshot = normalize(&raw, &session(), Utc::now());

        assert_eq!(55.0, snapshot.battery.soc);
        assert_eq!(2100.0, snapshot.pv.power);
        assert_eq!(12.3, snapshot.plant.today_energy);
        /* plant detail also backs the PV daily yield */
        assert_eq!(12.3, snapshot.pv.today_energy);
        /* energy overview was the only source for these */
        assert_eq!(0.0, snapshot.battery.charge_today);
        assert_eq!(0.0, snapshot.energy.load_today);
        assert_eq!(
            Some(&"network error: timeout".to_string()),
            snapshot.source_errors.get("energyOverview")
        );
    }

    #[test]
    fn inverter_status_keeps_zero_code() {
        let raw = raw(
            json!({"status": "0", "invTemperature": "41.5"}),
            json!({}),
            json!({}),
            json!({}),
        );
        let snapshot = normalize(&raw, &session(), Utc::now());

        assert_eq!(Some(0), snapshot.inverter.status_code);
        assert_eq!(StorageStatus::Standby, snapshot.inverter.status);
        assert_eq!(41.5, snapshot.inverter.temperature);
    }

    #[test]
    fn serialized_shape() {
        let raw = raw(json!({"capacity": "55"}), json!({}), json!({}), json!({}));
        let value = serde_json::to_value(normalize(&raw, &session(), Utc::now())).unwrap();

        for section in &["plant", "pv", "battery", "load", "grid", "inverter", "energy"] {
            assert!(value.get(*section).is_some(), "missing {}", section);
        }
        assert!(value.get("timestamp").is_some());
        assert!(value.get("sourceErrors").is_none());
        assert_eq!(json!(55.0), value["battery"]["soc"]);
        assert_eq!(json!("connected"), value["grid"]["status"]);
    }
}
