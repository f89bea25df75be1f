use growatt_proxy::model::Snapshot;
use growatt_proxy::Error;
use prometheus::{Encoder, GaugeVec, TextEncoder};

lazy_static! {
    static ref PV_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("pv_power", "current PV production (in W)"),
        &["plant_id", "device_sn"],
    )
    .unwrap();
    static ref PV_TODAY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("pv_energy_today", "energy produced by PV in current day (in kWh)"),
        &["plant_id", "device_sn"],
    )
    .unwrap();
    static ref BATTERY_SOC_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("battery_soc", "battery state of charge (in %)"),
        &["plant_id", "device_sn"],
    )
    .unwrap();
    static ref BATTERY_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("battery_power", "battery power, positive while charging (in W)"),
        &["plant_id", "device_sn"],
    )
    .unwrap();
    static ref LOAD_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("load_power", "power drawn by local load (in W)"),
        &["plant_id", "device_sn"],
    )
    .unwrap();
    static ref GRID_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("grid_power", "power drawn from grid (in W)"),
        &["plant_id", "device_sn"],
    )
    .unwrap();
    static ref GRID_VOLTAGE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("grid_voltage", "grid voltage (in V)"),
        &["plant_id", "device_sn"],
    )
    .unwrap();
    static ref INVERTER_TEMPERATURE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("inverter_temperature", "inverter reported temperature"),
        &["plant_id", "device_sn"],
    )
    .unwrap();
}

/// Feed a freshly normalized `snapshot` to the Prometheus gauges.
pub fn record(snapshot: &Snapshot) {
    let plant_id = snapshot.plant.id.as_deref().unwrap_or_default();
    let device_sn = snapshot.plant.device_sn.as_deref().unwrap_or_default();
    let labels = [plant_id, device_sn];

    PV_POWER_GAUGE.with_label_values(&labels).set(snapshot.pv.power);
    PV_TODAY_GAUGE
        .with_label_values(&labels)
        .set(snapshot.pv.today_energy);
    BATTERY_SOC_GAUGE
        .with_label_values(&labels)
        .set(snapshot.battery.soc);
    BATTERY_POWER_GAUGE
        .with_label_values(&labels)
        .set(snapshot.battery.power);
    LOAD_POWER_GAUGE
        .with_label_values(&labels)
        .set(snapshot.load.power);
    GRID_POWER_GAUGE
        .with_label_values(&labels)
        .set(snapshot.grid.power);
    GRID_VOLTAGE_GAUGE
        .with_label_values(&labels)
        .set(snapshot.grid.voltage);
    INVERTER_TEMPERATURE_GAUGE
        .with_label_values(&labels)
        .set(snapshot.inverter.temperature);
}

/// Read metrics from Prometheus exporter registry.
pub fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Internal(format!("Error encoding metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
}
