// src/pipeline/mod.rs
//
// Source × Period driver. Each iteration runs fetch → decode → parse → map →
// write to completion; cancellation is only observed between iterations.

use anyhow::bail;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::duck::Store;
use crate::error::{ErrorKind, Result};
use crate::fetch::ContentFetcher;
use crate::process::{self, parser};
use crate::schema::map_table;
use crate::source::{Period, SourceDescriptor, SourceRegistry};

/// Report for one Source × Period batch. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionOutcome {
    pub source_id: String,
    pub period: Period,
    pub attempted: u64,
    /// `None` when the store could not report a count.
    pub inserted: Option<u64>,
    /// Rows whose master key already existed.
    pub conflicted: Option<u64>,
    pub dropped_rows: u64,
    pub duplicate_keys: u64,
    pub resolved_locator: Option<String>,
    pub archive_member: Option<String>,
    pub errors: Vec<(Period, ErrorKind)>,
}

impl IngestionOutcome {
    fn empty(source_id: &str, period: Period) -> Self {
        Self {
            source_id: source_id.to_string(),
            period,
            attempted: 0,
            inserted: None,
            conflicted: None,
            dropped_rows: 0,
            duplicate_keys: 0,
            resolved_locator: None,
            archive_member: None,
            errors: Vec::new(),
        }
    }

    fn failed(source_id: &str, period: Period, err: ErrorKind) -> Self {
        let mut o = Self::empty(source_id, period);
        o.errors.push((period, err));
        o
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-period control flow.
#[derive(Debug)]
pub enum PeriodOutcome {
    Ingested(IngestionOutcome),
    /// This period failed; continue with the next one.
    Skip(ErrorKind),
    /// Nothing else for this source can succeed.
    Fatal(ErrorKind),
}

impl PeriodOutcome {
    pub fn classify(result: Result<IngestionOutcome>) -> Self {
        match result {
            Ok(o) => PeriodOutcome::Ingested(o),
            Err(e) if e.is_fatal_to_source() => PeriodOutcome::Fatal(e),
            Err(e) => PeriodOutcome::Skip(e),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<IngestionOutcome>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn failed_periods(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    pub fn total_inserted(&self) -> u64 {
        self.outcomes.iter().filter_map(|o| o.inserted).sum()
    }

    /// Every period ingested and the run was not interrupted.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed_periods() == 0
    }
}

pub struct Pipeline<'a> {
    fetcher: ContentFetcher,
    store: &'a mut Store,
    registry: &'a SourceRegistry,
    cancel: Arc<AtomicBool>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        fetcher: ContentFetcher,
        store: &'a mut Store,
        registry: &'a SourceRegistry,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            fetcher,
            store,
            registry,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run every requested source over every period, sources outermost.
    pub async fn run(&mut self, source_ids: &[String], periods: &[Period]) -> anyhow::Result<RunSummary> {
        let mut sources: Vec<SourceDescriptor> = Vec::with_capacity(source_ids.len());
        for id in source_ids {
            match self.registry.get(id) {
                Some(s) => sources.push(s.clone()),
                None => bail!("unknown source {id:?}"),
            }
        }

        let mut summary = RunSummary::default();
        'sources: for source in &sources {
            for (i, &period) in periods.iter().enumerate() {
                if self.cancelled() {
                    warn!(source = %source.id, %period, "cancellation requested; stopping");
                    summary.cancelled = true;
                    break 'sources;
                }

                match PeriodOutcome::classify(self.run_period(source, period).await) {
                    PeriodOutcome::Ingested(o) => {
                        info!(
                            source = %source.id,
                            %period,
                            attempted = o.attempted,
                            inserted = ?o.inserted,
                            skipped = o.dropped_rows + o.duplicate_keys,
                            "period ingested"
                        );
                        summary.outcomes.push(o);
                    }
                    PeriodOutcome::Skip(e) => {
                        warn!(source = %source.id, %period, kind = e.name(), error = %e, "period skipped");
                        summary.outcomes.push(IngestionOutcome::failed(&source.id, period, e));
                    }
                    PeriodOutcome::Fatal(e) => {
                        let rest = &periods[i..];
                        error!(
                            source = %source.id,
                            %period,
                            kind = e.name(),
                            error = %e,
                            remaining = rest.len(),
                            "source abandoned"
                        );
                        for &p in rest {
                            summary
                                .outcomes
                                .push(IngestionOutcome::failed(&source.id, p, e.clone()));
                        }
                        continue 'sources;
                    }
                }
            }
        }

        info!(
            periods = summary.outcomes.len(),
            failed = summary.failed_periods(),
            inserted = summary.total_inserted(),
            cancelled = summary.cancelled,
            "run finished"
        );
        Ok(summary)
    }

    #[tracing::instrument(level = "info", skip_all, fields(source = %source.id, period = %period))]
    async fn run_period(
        &mut self,
        source: &SourceDescriptor,
        period: Period,
    ) -> Result<IngestionOutcome> {
        // ─── 1) fetch ───
        let fetched = self.fetcher.fetch(source, period).await?;

        // ─── 2) decode (+ extract) ───
        let payload = process::decode_payload(
            &fetched.raw_bytes,
            source.content_kind,
            &source.encoding,
            period,
        )?;
        drop(fetched.raw_bytes);

        // ─── 3) parse ───
        let table = parser::parse(&payload.text, source.parse)?;

        // ─── 4) map ───
        let batch = map_table(&table, source.tag(), source.tag_in_key)?;

        // ─── 5) write ───
        let report = self.store.ingest(&source.table, &batch.records)?;

        Ok(IngestionOutcome {
            source_id: source.id.clone(),
            period,
            attempted: report.attempted,
            inserted: report.inserted,
            conflicted: report.inserted.map(|n| report.attempted.saturating_sub(n)),
            dropped_rows: batch.dropped_rows as u64,
            duplicate_keys: batch.duplicate_keys as u64,
            resolved_locator: Some(fetched.resolved_locator),
            archive_member: payload.member,
            errors: Vec::new(),
        })
    }
}
