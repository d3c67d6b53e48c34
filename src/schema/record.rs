// src/schema/record.rs

use serde::Serialize;

/// Numeric columns of the canonical schema, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    // supply / demand
    AreaDemand,
    Nuclear,
    Lng,
    Coal,
    Oil,
    OtherFire,
    Hydro,
    Geothermal,
    Biomass,
    SolarActual,
    SolarControl,
    WindActual,
    WindControl,
    PumpedStorage,
    Battery,
    Interconnection,
    Other,
    Total,
    // weather
    Temperature,
    Precipitation,
    SunshineDuration,
    WindSpeed,
    // market
    SystemPrice,
}

impl Metric {
    pub const COUNT: usize = 23;

    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::AreaDemand,
        Metric::Nuclear,
        Metric::Lng,
        Metric::Coal,
        Metric::Oil,
        Metric::OtherFire,
        Metric::Hydro,
        Metric::Geothermal,
        Metric::Biomass,
        Metric::SolarActual,
        Metric::SolarControl,
        Metric::WindActual,
        Metric::WindControl,
        Metric::PumpedStorage,
        Metric::Battery,
        Metric::Interconnection,
        Metric::Other,
        Metric::Total,
        Metric::Temperature,
        Metric::Precipitation,
        Metric::SunshineDuration,
        Metric::WindSpeed,
        Metric::SystemPrice,
    ];

    /// Column name in the store.
    pub fn column(self) -> &'static str {
        match self {
            Metric::AreaDemand => "area_demand",
            Metric::Nuclear => "nuclear",
            Metric::Lng => "lng",
            Metric::Coal => "coal",
            Metric::Oil => "oil",
            Metric::OtherFire => "other_fire",
            Metric::Hydro => "hydro",
            Metric::Geothermal => "geothermal",
            Metric::Biomass => "biomass",
            Metric::SolarActual => "solar_actual",
            Metric::SolarControl => "solar_control",
            Metric::WindActual => "wind_actual",
            Metric::WindControl => "wind_control",
            Metric::PumpedStorage => "pumped_storage",
            Metric::Battery => "battery",
            Metric::Interconnection => "interconnection",
            Metric::Other => "other",
            Metric::Total => "total",
            Metric::Temperature => "temperature",
            Metric::Precipitation => "precipitation",
            Metric::SunshineDuration => "sunshine_duration",
            Metric::WindSpeed => "wind_speed",
            Metric::SystemPrice => "system_price",
        }
    }

    /// Position in [`Metric::ALL`] and in [`CanonicalRecord::metrics`].
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One normalized half-hour observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub master_key: String,
    /// `YYYYMMDD`
    pub date: String,
    /// 1..=48
    pub slot: u8,
    pub metrics: [f64; Metric::COUNT],
    pub source_tag: String,
}

impl CanonicalRecord {
    pub fn metric(&self, m: Metric) -> f64 {
        self.metrics[m.index()]
    }
}
