// src/source/builtin.rs
//
// Descriptors for the publishers supported out of the box. All ten TSO areas
// share one physical table, so their master keys carry the area tag.

use super::{ContentKind, FallbackStrategy, ParseHints, SourceDescriptor};

pub const TSO_TABLE: &str = "tso_area_jukyu";
pub const JEPX_SPOT_TABLE: &str = "jepx_spot_price";

/// (id, locator template) for the monthly CSV publishers.
const TSO_MONTHLY: &[(&str, &str)] = &[
    (
        "hokkaido",
        "https://www.hepco.co.jp/network/con_service/public_document/supply_demand_results/csv/eria_jukyu_{yearMonth}_01.csv",
    ),
    (
        "tohoku",
        "https://setsuden.nw.tohoku-epco.co.jp/common/demand/eria_jukyu_{yearMonth}_02.csv",
    ),
    (
        "tepco",
        "https://www.tepco.co.jp/forecast/html/images/eria_jukyu_{yearMonth}_03.csv",
    ),
    (
        "hokuriku",
        "https://www.rikuden.co.jp/nw_jyukyuu/csv/area_{yearMonth}.csv",
    ),
    (
        "kansai",
        "https://www.kansai-td.co.jp/yamasou/juyo-jisseki/jisseki/ji_{yearMonth}.csv",
    ),
    (
        "chugoku",
        "https://www.energia.co.jp/nw/service/supply/juyo/sys/juyo-jisseki-{yearMonth}.csv",
    ),
    (
        "shikoku",
        "https://www.yonden.co.jp/nw/assets/renewable_energy/data/download_juyo/{yearMonth}_jukyu.csv",
    ),
    (
        "kyushu",
        "https://www.kyuden.co.jp/td_service_wheeling_rule-document_disclosure-area-performance_{yearMonth}.csv",
    ),
    (
        "okinawa",
        "https://www.okiden.co.jp/td-service/renewable-energy/supply_demand/csv/area_jokyo_{yearMonth}.csv",
    ),
];

// TSO files carry a title line above the real header.
fn tso_hints() -> ParseHints {
    ParseHints {
        header_rows: 1,
        skip_leading_rows: 1,
    }
}

/// Built-in descriptors. `year_window` feeds every year-search source.
pub fn descriptors(year_window: u32) -> Vec<SourceDescriptor> {
    let mut out: Vec<SourceDescriptor> = TSO_MONTHLY
        .iter()
        .map(|(id, template)| SourceDescriptor {
            id: (*id).to_string(),
            table: TSO_TABLE.to_string(),
            source_tag: None,
            tag_in_key: true,
            locator_template: (*template).to_string(),
            content_kind: ContentKind::Csv,
            fallback: FallbackStrategy::None,
            encoding: "shift_jis".to_string(),
            parse: tso_hints(),
        })
        .collect();

    // chubu publishes one archive per year with a CSV per month inside
    out.insert(
        3,
        SourceDescriptor {
            id: "chubu".to_string(),
            table: TSO_TABLE.to_string(),
            source_tag: None,
            tag_in_key: true,
            locator_template:
                "https://powergrid.chuden.co.jp/denki_yoho_content_data/eria_jukyu_{year}.zip"
                    .to_string(),
            content_kind: ContentKind::ArchiveOfCsv,
            fallback: FallbackStrategy::YearSearch {
                window: year_window,
            },
            encoding: "shift_jis".to_string(),
            parse: tso_hints(),
        },
    );

    out.push(SourceDescriptor {
        id: "jepx_spot".to_string(),
        table: JEPX_SPOT_TABLE.to_string(),
        source_tag: None,
        tag_in_key: false,
        locator_template: "https://www.jepx.jp/market/excel/spot_{year}.csv".to_string(),
        content_kind: ContentKind::Csv,
        fallback: FallbackStrategy::YearSearch {
            window: year_window,
        },
        encoding: "shift_jis".to_string(),
        parse: ParseHints {
            header_rows: 1,
            skip_leading_rows: 0,
        },
    });

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceRegistry;

    #[test]
    fn builtins_form_a_valid_registry() {
        let reg = SourceRegistry::new(descriptors(1)).unwrap();
        assert_eq!(reg.len(), 11);
        assert!(reg.shares_table("tepco"));
        assert!(reg.shares_table("chubu"));
        assert!(!reg.shares_table("jepx_spot"));

        let chubu = reg.get("chubu").unwrap();
        assert_eq!(chubu.content_kind, ContentKind::ArchiveOfCsv);
        assert_eq!(chubu.fallback, FallbackStrategy::YearSearch { window: 1 });
        assert!(reg.iter().filter(|s| s.table == TSO_TABLE).all(|s| s.tag_in_key));
        assert!(!reg.get("jepx_spot").unwrap().tag_in_key);
    }

    #[test]
    fn tso_order_follows_area_codes() {
        let ids: Vec<String> = descriptors(1).into_iter().map(|d| d.id).collect();
        assert_eq!(&ids[..4], &["hokkaido", "tohoku", "tepco", "chubu"]);
        assert_eq!(ids.last().map(String::as_str), Some("jepx_spot"));
    }
}
