// src/schema/aliases.rs
//
// Declarative label table. A new publisher whose headers are not covered
// needs an entry here and nothing else.

use once_cell::sync::Lazy;

use super::record::Metric;
use crate::process::utils::to_half_width;

/// A canonical target a raw column can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    Slot,
    Metric(Metric),
}

/// Known raw labels per field. Within a field, earlier aliases win.
pub const ALIASES: &[(Field, &[&str])] = &[
    (Field::Date, &["date", "日付", "年月日", "年月日時", "datetime"]),
    (Field::Slot, &["time", "slot", "時刻", "時刻コード", "時間帯", "コマ"]),
    (
        Field::Metric(Metric::AreaDemand),
        &["エリア需要", "area_demand", "需要実績", "実績(万kW)"],
    ),
    (Field::Metric(Metric::Nuclear), &["原子力", "nuclear"]),
    (Field::Metric(Metric::Lng), &["火力(LNG)", "LNG"]),
    (Field::Metric(Metric::Coal), &["火力(石炭)", "石炭", "coal"]),
    (Field::Metric(Metric::Oil), &["火力(石油)", "石油", "oil"]),
    (
        Field::Metric(Metric::OtherFire),
        &["火力(その他)", "other_fire"],
    ),
    (Field::Metric(Metric::Hydro), &["水力", "hydro"]),
    (Field::Metric(Metric::Geothermal), &["地熱", "geothermal"]),
    (Field::Metric(Metric::Biomass), &["バイオマス", "biomass"]),
    (
        Field::Metric(Metric::SolarActual),
        &["太陽光発電実績", "太陽光実績", "solar_actual"],
    ),
    (
        Field::Metric(Metric::SolarControl),
        &["太陽光出力制御量", "太陽光制御量", "solar_control"],
    ),
    (
        Field::Metric(Metric::WindActual),
        &["風力発電実績", "風力実績", "wind_actual"],
    ),
    (
        Field::Metric(Metric::WindControl),
        &["風力出力制御量", "風力制御量", "wind_control"],
    ),
    (Field::Metric(Metric::PumpedStorage), &["揚水", "pumped_storage"]),
    (Field::Metric(Metric::Battery), &["蓄電池", "battery"]),
    (Field::Metric(Metric::Interconnection), &["連系線", "interconnection"]),
    (Field::Metric(Metric::Other), &["その他", "other"]),
    (Field::Metric(Metric::Total), &["合計", "total"]),
    (Field::Metric(Metric::Temperature), &["気温", "temperature"]),
    (Field::Metric(Metric::Precipitation), &["降水量", "precipitation"]),
    (
        Field::Metric(Metric::SunshineDuration),
        &["日照時間", "sunshine_duration"],
    ),
    (Field::Metric(Metric::WindSpeed), &["風速", "wind_speed"]),
    (
        Field::Metric(Metric::SystemPrice),
        &["システムプライス", "system_price", "ap0_system"],
    ),
];

/// Labels carrying these fragments describe another column (quality flags,
/// homogeneity numbers, wind direction) and are never mapped.
pub const ANCILLARY_MARKERS: [&str; 4] = ["品質情報", "均質番号", "現象なし情報", "風向"];

/// Comparison form of a label: half-width, lowercase, without whitespace,
/// brackets, `_`, `・` or `:`.
pub fn fold(label: &str) -> String {
    to_half_width(label)
        .to_lowercase()
        .chars()
        .filter(|c| {
            !c.is_whitespace()
                && !matches!(
                    c,
                    '(' | ')' | '[' | ']' | '{' | '}' | '「' | '」' | '_' | '・' | ':'
                )
        })
        .collect()
}

pub fn is_ancillary(label: &str) -> bool {
    ANCILLARY_MARKERS.iter().any(|m| label.contains(m))
}

/// [`ALIASES`] with every alias pre-folded.
pub static FOLDED_ALIASES: Lazy<Vec<(Field, Vec<String>)>> = Lazy::new(|| {
    ALIASES
        .iter()
        .map(|(field, aliases)| (*field, aliases.iter().map(|a| fold(a)).collect()))
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_erases_width_case_and_punctuation() {
        assert_eq!(fold("火力（ＬＮＧ）"), fold("火力(lng)"));
        assert_eq!(fold("Area Demand"), "areademand");
        assert_eq!(fold("area_demand"), "areademand");
        assert_eq!(fold("年月日時_main"), "年月日時main");
    }

    #[test]
    fn every_metric_has_aliases() {
        for m in Metric::ALL {
            assert!(
                ALIASES.iter().any(|(f, a)| *f == Field::Metric(m) && !a.is_empty()),
                "{m:?} has no alias"
            );
        }
    }

    #[test]
    fn ancillary_labels() {
        assert!(is_ancillary("気温_degc_品質情報"));
        assert!(is_ancillary("風速_mps_風向"));
        assert!(!is_ancillary("気温_degc_main"));
    }
}
