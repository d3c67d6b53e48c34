// src/fetch/locator.rs
use chrono::{Datelike, Local};

use crate::error::{ErrorKind, Result};
use crate::source::{FallbackStrategy, Period, SourceDescriptor};

/// Largest accepted `YearSearch` window, in years each side.
pub const MAX_YEAR_WINDOW: u32 = 10;

/// Builds the ordered candidate list of download locators for a source and period.
#[derive(Debug, Clone, Copy)]
pub struct LocatorResolver {
    current_year: i32,
}

impl LocatorResolver {
    /// Pin the current year, e.g. in tests.
    pub fn new(current_year: i32) -> Self {
        Self { current_year }
    }

    pub fn for_today() -> Self {
        Self::new(Local::now().year())
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    /// Candidate locators in the order they should be tried.
    pub fn resolve(&self, source: &SourceDescriptor, period: Period) -> Result<Vec<String>> {
        let template = source.locator_template.trim();
        if template.is_empty() {
            return Err(self.fail(source, "empty locator template"));
        }

        let candidates = match &source.fallback {
            FallbackStrategy::None => vec![substitute(template, period, period.year, None)],
            FallbackStrategy::YearSearch { window } => {
                if !template.contains("{year}") {
                    return Err(self.fail(source, "year search needs a {year} placeholder"));
                }
                if *window > MAX_YEAR_WINDOW {
                    return Err(self.fail(
                        source,
                        &format!("year search window {window} exceeds {MAX_YEAR_WINDOW}"),
                    ));
                }
                self.search_years(period.year, *window)
                    .into_iter()
                    .map(|y| substitute(template, period, y, None))
                    .collect()
            }
            FallbackStrategy::VersionSuffixSearch { suffixes } => {
                if suffixes.is_empty() {
                    return Err(self.fail(source, "version search has no suffixes"));
                }
                if !template.contains("{version}") {
                    return Err(self.fail(source, "version search needs a {version} placeholder"));
                }
                suffixes
                    .iter()
                    .map(|v| substitute(template, period, period.year, Some(v)))
                    .collect()
            }
        };

        if let Some(bad) = candidates.iter().find(|c| c.contains('{') || c.contains('}')) {
            return Err(self.fail(source, &format!("unsubstituted placeholder in {bad}")));
        }
        Ok(candidates)
    }

    /// `year, year-1, year+1, …, ±window, current_year`, deduplicated and
    /// never past the current year.
    fn search_years(&self, year: i32, window: u32) -> Vec<i32> {
        let window = window as i32;
        let mut order = vec![year];
        for d in 1..=window {
            order.push(year - d);
            order.push(year + d);
        }
        order.push(self.current_year);

        let mut out = Vec::with_capacity(order.len());
        for y in order {
            if y <= self.current_year && !out.contains(&y) {
                out.push(y);
            }
        }
        out
    }

    fn fail(&self, source: &SourceDescriptor, why: &str) -> ErrorKind {
        ErrorKind::LocatorResolution(format!("{}: {why}", source.id))
    }
}

fn substitute(template: &str, period: Period, year: i32, version: Option<&str>) -> String {
    let mut out = template
        .replace("{yearMonth}", &period.year_month())
        .replace("{year}", &format!("{year:04}"))
        .replace("{month}", &format!("{:02}", period.month));
    if let Some(v) = version {
        out = out.replace("{version}", v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ContentKind, ParseHints};

    fn src(template: &str, fallback: FallbackStrategy) -> SourceDescriptor {
        SourceDescriptor {
            id: "t".into(),
            table: "t".into(),
            source_tag: None,
            tag_in_key: false,
            locator_template: template.into(),
            content_kind: ContentKind::Csv,
            fallback,
            encoding: "utf-8".into(),
            parse: ParseHints::default(),
        }
    }

    #[test]
    fn plain_substitution() {
        let r = LocatorResolver::new(2026);
        let s = src("https://x/{year}/{month}/f_{yearMonth}.csv", FallbackStrategy::None);
        let c = r.resolve(&s, Period::new(2024, 3).unwrap()).unwrap();
        assert_eq!(c, vec!["https://x/2024/03/f_202403.csv"]);
    }

    #[test]
    fn year_search_order_is_deterministic() {
        let r = LocatorResolver::new(2026);
        let s = src(
            "https://x/eria_jukyu_{year}.zip",
            FallbackStrategy::YearSearch { window: 1 },
        );
        let p = Period::new(2024, 3).unwrap();
        let years: Vec<String> = r
            .resolve(&s, p)
            .unwrap()
            .iter()
            .map(|u| u[u.len() - 8..u.len() - 4].to_string())
            .collect();
        assert_eq!(years, vec!["2024", "2023", "2025", "2026"]);
        assert_eq!(r.resolve(&s, p).unwrap(), r.resolve(&s, p).unwrap());
    }

    #[test]
    fn year_search_is_clamped_and_deduplicated() {
        let r = LocatorResolver::new(2025);
        let s = src("{year}", FallbackStrategy::YearSearch { window: 2 });
        let c = r.resolve(&s, Period::new(2025, 1).unwrap()).unwrap();
        assert_eq!(c, vec!["2025", "2024", "2023"]);
    }

    #[test]
    fn year_search_keeps_requested_month_tokens() {
        let r = LocatorResolver::new(2026);
        let s = src("{year}_{yearMonth}", FallbackStrategy::YearSearch { window: 1 });
        let c = r.resolve(&s, Period::new(2024, 3).unwrap()).unwrap();
        assert_eq!(c[1], "2023_202403");
    }

    #[test]
    fn version_suffixes() {
        let r = LocatorResolver::new(2026);
        let s = src(
            "https://x/eria_jukyu_{yearMonth}_{version}.csv",
            FallbackStrategy::VersionSuffixSearch {
                suffixes: vec!["01".into(), "02".into()],
            },
        );
        let c = r.resolve(&s, Period::new(2024, 4).unwrap()).unwrap();
        assert_eq!(
            c,
            vec![
                "https://x/eria_jukyu_202404_01.csv",
                "https://x/eria_jukyu_202404_02.csv"
            ]
        );
    }

    #[test]
    fn resolution_errors() {
        let r = LocatorResolver::new(2026);
        let p = Period::new(2024, 4).unwrap();
        let cases = [
            src("", FallbackStrategy::None),
            src("https://x/{day}.csv", FallbackStrategy::None),
            src("https://x/{version}.csv", FallbackStrategy::None),
            src("https://x/a.csv", FallbackStrategy::YearSearch { window: 1 }),
            src("https://x/{year}.csv", FallbackStrategy::YearSearch { window: 50_000 }),
            src(
                "https://x/{version}.csv",
                FallbackStrategy::VersionSuffixSearch { suffixes: vec![] },
            ),
            src(
                "https://x/a.csv",
                FallbackStrategy::VersionSuffixSearch {
                    suffixes: vec!["01".into()],
                },
            ),
        ];
        for s in &cases {
            let err = r.resolve(s, p).unwrap_err();
            assert!(err.is_fatal_to_source(), "{s:?}");
        }
    }
}
