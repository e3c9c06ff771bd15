use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use dealmap_adapters::{fetch_month, normalize_record, ProviderContext, ProviderError, TradeProvider, TradeRequest};
use dealmap_core::{
    approximate_location, content_hash, merge_complex_attributes, AuditEvent, ComplexAttributes, ComplexUpsert,
    NormalizedDeal, NormalizedDealInsert, RawDealInsert, RawRecord, RegionMeta,
};
use dealmap_storage::DealStore;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::regions::RegionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionStats {
    pub region_code: String,
    pub seen: usize,
    pub rejected: usize,
    pub capped: usize,
    pub accepted: usize,
    pub complexes: usize,
    pub raw_inserted: usize,
    pub normalized_inserted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionFailure {
    pub region_code: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub regions_processed: usize,
    pub months: Vec<String>,
    pub deals_seen: usize,
    pub rejected: usize,
    pub capped: usize,
    pub raw_inserted: usize,
    pub normalized_inserted: usize,
    pub regions: Vec<RegionStats>,
    pub failures: Vec<RegionFailure>,
}

impl SyncRunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// `YYYYMM` keys for the `months` calendar months ending at `as_of`, newest first.
pub fn trailing_months(as_of: NaiveDate, months: u32) -> Vec<String> {
    let first = as_of.with_day(1).unwrap_or(as_of);
    (0..months)
        .filter_map(|i| first.checked_sub_months(Months::new(i)))
        .map(|d| d.format("%Y%m").to_string())
        .collect()
}

pub struct SyncPipeline {
    config: SyncConfig,
    registry: RegionRegistry,
    provider: Arc<dyn TradeProvider>,
    store: Arc<dyn DealStore>,
}

impl SyncPipeline {
    pub fn new(
        config: SyncConfig,
        registry: RegionRegistry,
        provider: Arc<dyn TradeProvider>,
        store: Arc<dyn DealStore>,
    ) -> Self {
        Self {
            config,
            registry,
            provider,
            store,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn region_codes(&self) -> Vec<String> {
        if self.config.regions.is_empty() {
            self.registry.default_regions.clone()
        } else {
            self.config.regions.clone()
        }
    }

    /// One full ingestion pass. A provider failure skips only the affected
    /// region; a store failure aborts the run.
    pub async fn run_once(&self, trigger: RunTrigger) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, ?trigger, dry_run = self.config.dry_run);
        let outcome = self.run_regions(run_id, trigger).instrument(span).await;
        if trigger == RunTrigger::Scheduled && !self.config.dry_run {
            self.record_run_audit(run_id, &outcome).await;
        }
        outcome
    }

    async fn run_regions(&self, run_id: Uuid, trigger: RunTrigger) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let as_of = self.config.as_of.unwrap_or_else(|| started_at.date_naive());
        let months = trailing_months(as_of, self.config.months);
        let ctx = ProviderContext { run_id };

        let mut regions = Vec::new();
        let mut failures = Vec::new();
        for code in self.region_codes() {
            let meta = self.registry.meta_or_fallback(&code);
            // The region row lands before the fetch so a failing region is
            // still known to the store.
            let region_id = if self.config.dry_run {
                None
            } else {
                let id = self
                    .store
                    .upsert_region(&meta)
                    .await
                    .with_context(|| format!("persisting region {code}"))?;
                Some(id)
            };
            let records = match self.fetch_region(&ctx, &code, &months).await {
                Ok(records) => records,
                Err(err) => {
                    warn!(region = %code, error = %err, "region fetch failed; skipping region");
                    failures.push(RegionFailure {
                        region_code: code,
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            let stats = self
                .ingest_region(&meta, region_id, &records)
                .await
                .with_context(|| format!("persisting region {code}"))?;
            info!(
                region = %code,
                fetched = stats.seen,
                rejected = stats.rejected,
                normalized = stats.accepted,
                raw_inserted = stats.raw_inserted,
                normalized_inserted = stats.normalized_inserted,
                "region ingested"
            );
            regions.push(stats);
        }

        let sum = |f: fn(&RegionStats) -> usize| regions.iter().map(f).sum::<usize>();
        let summary = SyncRunSummary {
            run_id,
            trigger,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.config.dry_run,
            regions_processed: regions.len(),
            months,
            deals_seen: sum(|s| s.seen),
            rejected: sum(|s| s.rejected),
            capped: sum(|s| s.capped),
            raw_inserted: sum(|s| s.raw_inserted),
            normalized_inserted: sum(|s| s.normalized_inserted),
            regions,
            failures,
        };
        info!(
            regions = summary.regions_processed,
            failures = summary.failures.len(),
            deals_seen = summary.deals_seen,
            raw_inserted = summary.raw_inserted,
            normalized_inserted = summary.normalized_inserted,
            "sync run finished"
        );
        Ok(summary)
    }

    async fn fetch_region(
        &self,
        ctx: &ProviderContext,
        region_code: &str,
        months: &[String],
    ) -> Result<Vec<RawRecord>, ProviderError> {
        let mut records = Vec::new();
        for ymd in months {
            let request = TradeRequest::new(region_code, ymd)?;
            records.extend(fetch_month(self.provider.as_ref(), ctx, &request).await?);
        }
        Ok(records)
    }

    async fn ingest_region(
        &self,
        meta: &RegionMeta,
        region_id: Option<i64>,
        records: &[RawRecord],
    ) -> Result<RegionStats> {
        let mut stats = RegionStats {
            region_code: meta.code.clone(),
            seen: records.len(),
            ..Default::default()
        };

        let mut deals: Vec<NormalizedDeal> = Vec::with_capacity(records.len());
        for raw in records {
            match normalize_record(raw, &meta.code) {
                Ok(deal) => deals.push(deal),
                Err(rejection) => {
                    stats.rejected += 1;
                    debug!(region = %meta.code, %rejection, "record rejected");
                }
            }
        }
        if deals.len() > self.config.max_per_region {
            stats.capped = deals.len() - self.config.max_per_region;
            deals.truncate(self.config.max_per_region);
        }
        stats.accepted = deals.len();

        let Some(region_id) = region_id else {
            return Ok(stats);
        };

        let mut attributes: HashMap<(String, String), ComplexAttributes> = HashMap::new();
        for deal in &deals {
            let incoming = ComplexAttributes {
                location: Some(approximate_location(meta.center, &deal.complex_name, &deal.neighborhood)),
                build_year: deal.build_year,
                total_units: None,
            };
            attributes
                .entry((deal.complex_name.clone(), deal.neighborhood.clone()))
                .and_modify(|existing| *existing = merge_complex_attributes(existing, &incoming))
                .or_insert(incoming);
        }

        let mut resolved: HashMap<(String, String), i64> = HashMap::new();
        for deal in &deals {
            let key = (deal.complex_name.clone(), deal.neighborhood.clone());
            let complex_id = match resolved.get(&key) {
                Some(id) => *id,
                None => {
                    let upsert = ComplexUpsert {
                        region_id,
                        region_code: meta.code.clone(),
                        name: deal.complex_name.clone(),
                        neighborhood: deal.neighborhood.clone(),
                        attributes: attributes.get(&key).copied().unwrap_or_default(),
                    };
                    let id = self.store.resolve_complex(&upsert).await?;
                    stats.complexes += 1;
                    resolved.insert(key, id);
                    id
                }
            };

            let raw = self
                .store
                .insert_raw_deal(&RawDealInsert {
                    source_name: self.provider.source_name().to_string(),
                    source_hash: content_hash(deal),
                    region_code: meta.code.clone(),
                    deal_ymd: deal.deal_ymd(),
                    payload: deal.payload(),
                    complex_id: Some(complex_id),
                })
                .await?;
            if raw.inserted {
                stats.raw_inserted += 1;
            }

            let inserted = self
                .store
                .insert_normalized_deal(&NormalizedDealInsert {
                    complex_id,
                    deal_date: deal.deal_date,
                    amount: deal.amount,
                    area_m2: deal.area_m2,
                    floor: deal.floor,
                    build_year: deal.build_year,
                    source_raw_id: Some(raw.id),
                })
                .await?;
            if inserted {
                stats.normalized_inserted += 1;
            }
        }

        Ok(stats)
    }

    async fn record_run_audit(&self, run_id: Uuid, outcome: &Result<SyncRunSummary>) {
        let event = match outcome {
            Ok(summary) => {
                let name = if summary.is_success() { "ingest_success" } else { "ingest_error" };
                AuditEvent::system(name, serde_json::to_value(summary).unwrap_or_default())
            }
            Err(err) => AuditEvent::system(
                "ingest_error",
                serde_json::json!({ "run_id": run_id, "error": format!("{err:#}") }),
            ),
        };
        if let Err(err) = self.store.record_audit(&event).await {
            warn!(%run_id, error = %err, event = %event.event_name, "failed to record ingestion audit event");
        }
    }
}
