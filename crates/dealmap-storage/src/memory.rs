use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dealmap_core::query::{
    compare_for_map, compare_ranked, deal_count_window_start, relevance_score, ComplexFacts, LatestDeal,
    MapComplex, MapQuery, RankedComplex, SearchPage, SearchQuery, SearchRow,
};
use dealmap_core::{
    area_centi, merge_complex_attributes, AuditEntry, AuditEvent, ComplexAttributes, ComplexUpsert,
    GeoPoint, NormalizedDealInsert, RawDealInsert, RegionMeta,
};
use tokio::sync::Mutex;

use crate::store::{
    DealStore, FreshnessReport, NormalizedFreshness, RawFreshness, RawInsert, StoreError, StoreResult,
    INGEST_EVENT_NAMES,
};

#[derive(Debug, Clone)]
struct RegionRow {
    id: i64,
    meta: RegionMeta,
}

#[derive(Debug, Clone)]
struct ComplexRow {
    id: i64,
    region_id: i64,
    name: String,
    neighborhood: String,
    attributes: ComplexAttributes,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RawRow {
    id: i64,
    source_hash: String,
    ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct NormalizedRow {
    id: i64,
    complex_id: i64,
    deal_date: NaiveDate,
    amount: i64,
    area_centi: i64,
    floor: Option<i32>,
    source_raw_id: Option<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct AuditRow {
    id: i64,
    event: AuditEvent,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    regions: Vec<RegionRow>,
    complexes: Vec<ComplexRow>,
    raw: Vec<RawRow>,
    normalized: Vec<NormalizedRow>,
    audit: Vec<AuditRow>,
}

impl MemoryState {
    fn region(&self, id: i64) -> Option<&RegionRow> {
        self.regions.iter().find(|r| r.id == id)
    }

    fn facts(&self, today: NaiveDate) -> Vec<(ComplexFacts, String)> {
        let window_start = deal_count_window_start(today);
        self.complexes
            .iter()
            .map(|c| {
                let deals = self.normalized.iter().filter(|d| d.complex_id == c.id);
                let latest = deals
                    .clone()
                    .max_by_key(|d| (d.deal_date, d.id))
                    .map(|d| LatestDeal {
                        deal_id: d.id,
                        deal_date: d.deal_date,
                        amount: d.amount,
                    });
                let deal_count_3m = deals.filter(|d| d.deal_date >= window_start).count() as i64;
                let (region_code, region_name) = self
                    .region(c.region_id)
                    .map(|r| (r.meta.code.clone(), r.meta.name.clone()))
                    .unwrap_or_default();
                (
                    ComplexFacts {
                        id: c.id,
                        name: c.name.clone(),
                        neighborhood: c.neighborhood.clone(),
                        region_code,
                        location: c.attributes.location,
                        latest,
                        deal_count_3m,
                    },
                    region_name,
                )
            })
            .collect()
    }
}

/// In-process [`DealStore`] with the same semantics as the Postgres backend.
#[derive(Debug)]
pub struct MemoryDealStore {
    state: Mutex<MemoryState>,
    available: AtomicBool,
}

impl Default for MemoryDealStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDealStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (every call returns `Unavailable`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()))
        }
    }

    pub async fn raw_count(&self) -> usize {
        self.state.lock().await.raw.len()
    }

    pub async fn normalized_count(&self) -> usize {
        self.state.lock().await.normalized.len()
    }

    pub async fn region_codes(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.regions.iter().map(|r| r.meta.code.clone()).collect()
    }

    pub async fn complex_count(&self) -> usize {
        self.state.lock().await.complexes.len()
    }

    pub async fn complex_attributes(&self, id: i64) -> Option<ComplexAttributes> {
        let state = self.state.lock().await;
        state.complexes.iter().find(|c| c.id == id).map(|c| c.attributes)
    }

    pub async fn complex_updated_at(&self, id: i64) -> Option<DateTime<Utc>> {
        let state = self.state.lock().await;
        state.complexes.iter().find(|c| c.id == id).map(|c| c.updated_at)
    }

    /// `source_raw_id` of every normalized row, in insert order.
    pub async fn normalized_raw_links(&self) -> Vec<Option<i64>> {
        let state = self.state.lock().await;
        state.normalized.iter().map(|n| n.source_raw_id).collect()
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        let state = self.state.lock().await;
        state.audit.iter().map(|a| a.event.clone()).collect()
    }
}

fn next_id(len: usize) -> i64 {
    len as i64 + 1
}

#[async_trait]
impl DealStore for MemoryDealStore {
    async fn upsert_region(&self, region: &RegionMeta) -> StoreResult<i64> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        if let Some(row) = state.regions.iter_mut().find(|r| r.meta.code == region.code) {
            row.meta.name = region.name.clone();
            return Ok(row.id);
        }
        let id = next_id(state.regions.len());
        state.regions.push(RegionRow {
            id,
            meta: region.clone(),
        });
        Ok(id)
    }

    async fn resolve_complex(&self, upsert: &ComplexUpsert) -> StoreResult<i64> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        if state.region(upsert.region_id).is_none() {
            return Err(StoreError::Query(format!("unknown region id {}", upsert.region_id)));
        }
        if let Some(row) = state.complexes.iter_mut().find(|c| {
            c.region_id == upsert.region_id && c.name == upsert.name && c.neighborhood == upsert.neighborhood
        }) {
            row.attributes = merge_complex_attributes(&row.attributes, &upsert.attributes);
            row.updated_at = Utc::now();
            return Ok(row.id);
        }
        let id = next_id(state.complexes.len());
        state.complexes.push(ComplexRow {
            id,
            region_id: upsert.region_id,
            name: upsert.name.clone(),
            neighborhood: upsert.neighborhood.clone(),
            attributes: upsert.attributes,
            updated_at: Utc::now(),
        });
        Ok(id)
    }

    async fn insert_raw_deal(&self, raw: &RawDealInsert) -> StoreResult<RawInsert> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        if let Some(existing) = state.raw.iter().find(|r| r.source_hash == raw.source_hash) {
            return Ok(RawInsert {
                id: existing.id,
                inserted: false,
            });
        }
        let id = next_id(state.raw.len());
        state.raw.push(RawRow {
            id,
            source_hash: raw.source_hash.clone(),
            ingested_at: Utc::now(),
        });
        Ok(RawInsert { id, inserted: true })
    }

    async fn insert_normalized_deal(&self, deal: &NormalizedDealInsert) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let centi = area_centi(deal.area_m2);
        let duplicate = state.normalized.iter().any(|n| {
            n.complex_id == deal.complex_id
                && n.deal_date == deal.deal_date
                && n.amount == deal.amount
                && n.area_centi == centi
                && n.floor == deal.floor
        });
        if duplicate {
            return Ok(false);
        }
        let id = next_id(state.normalized.len());
        state.normalized.push(NormalizedRow {
            id,
            complex_id: deal.complex_id,
            deal_date: deal.deal_date,
            amount: deal.amount,
            area_centi: centi,
            floor: deal.floor,
            source_raw_id: deal.source_raw_id,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn record_audit(&self, event: &AuditEvent) -> StoreResult<()> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let id = next_id(state.audit.len());
        state.audit.push(AuditRow {
            id,
            event: event.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn search_complexes(&self, query: &SearchQuery, today: NaiveDate) -> StoreResult<SearchPage> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        let text = query.filter.text.as_deref().unwrap_or_default();
        let mut ranked: Vec<(RankedComplex, String)> = state
            .facts(today)
            .into_iter()
            .filter(|(facts, _)| query.filter.matches(facts))
            .map(|(facts, region_name)| {
                let score = relevance_score(text, &facts, today);
                (RankedComplex { facts, score }, region_name)
            })
            .collect();
        ranked.sort_by(|(a, _), (b, _)| compare_ranked(query.sort, a, b));

        let total = ranked.len() as i64;
        let rows = ranked
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.size as usize)
            .map(|(r, region_name)| SearchRow {
                id: r.facts.id,
                name: r.facts.name,
                neighborhood: r.facts.neighborhood,
                region_code: r.facts.region_code,
                region_name,
                lat: r.facts.location.map(|p| p.lat),
                lng: r.facts.location.map(|p| p.lng),
                latest_deal_amount: r.facts.latest.map(|l| l.amount),
                latest_deal_date: r.facts.latest.map(|l| l.deal_date),
                deal_count_3m: r.facts.deal_count_3m,
                score: r.score,
            })
            .collect();
        Ok(SearchPage { rows, total })
    }

    async fn map_complexes(&self, query: &MapQuery) -> StoreResult<Vec<MapComplex>> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        let mut matched: Vec<(ComplexFacts, GeoPoint)> = state
            .facts(Utc::now().date_naive())
            .into_iter()
            .filter(|(facts, _)| query.filter.matches(facts))
            .filter_map(|(facts, _)| facts.location.map(|loc| (facts, loc)))
            .collect();
        matched.sort_by(|(a, _), (b, _)| compare_for_map(a, b));
        Ok(matched
            .into_iter()
            .take(query.limit as usize)
            .map(|(facts, loc)| MapComplex {
                id: facts.id,
                name: facts.name,
                neighborhood: facts.neighborhood,
                region_code: facts.region_code,
                lat: loc.lat,
                lng: loc.lng,
                latest_deal_amount: facts.latest.map(|l| l.amount),
                latest_deal_date: facts.latest.map(|l| l.deal_date),
            })
            .collect())
    }

    async fn data_freshness(&self, now: DateTime<Utc>) -> StoreResult<FreshnessReport> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        let since = now - Duration::hours(24);
        let mut runs: Vec<&AuditRow> = state
            .audit
            .iter()
            .filter(|a| INGEST_EVENT_NAMES.contains(&a.event.event_name.as_str()))
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        Ok(FreshnessReport {
            checked_at: now,
            raw: RawFreshness {
                last_ingested_at: state.raw.iter().map(|r| r.ingested_at).max(),
                count_24h: state.raw.iter().filter(|r| r.ingested_at >= since).count() as i64,
            },
            normalized: NormalizedFreshness {
                last_deal_date: state.normalized.iter().map(|n| n.deal_date).max(),
                count_24h: state.normalized.iter().filter(|n| n.created_at >= since).count() as i64,
            },
            recent_ingest_runs: runs
                .into_iter()
                .take(5)
                .map(|a| AuditEntry {
                    event: a.event.event_name.clone(),
                    at: a.created_at,
                    detail: a.event.detail.clone(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use dealmap_core::query::{MapParams, SearchParams};
    use dealmap_core::BoundingBox;

    fn gangnam() -> RegionMeta {
        RegionMeta {
            code: "11680".into(),
            province: "seoul".into(),
            slug: "gangnam".into(),
            name: "강남구".into(),
            center: GeoPoint::new(37.5172, 127.0473),
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    async fn seed_complex(store: &MemoryDealStore, region_id: i64, name: &str, dong: &str, loc: Option<GeoPoint>) -> i64 {
        store
            .resolve_complex(&ComplexUpsert {
                region_id,
                region_code: "11680".into(),
                name: name.into(),
                neighborhood: dong.into(),
                attributes: ComplexAttributes {
                    location: loc,
                    build_year: None,
                    total_units: None,
                },
            })
            .await
            .unwrap()
    }

    async fn seed_deal(store: &MemoryDealStore, complex_id: i64, days_ago: u64, amount: i64) {
        store
            .insert_normalized_deal(&NormalizedDealInsert {
                complex_id,
                deal_date: today() - chrono::Days::new(days_ago),
                amount,
                area_m2: 84.97,
                floor: Some(7),
                build_year: None,
                source_raw_id: None,
            })
            .await
            .unwrap();
    }

    fn raw(hash: &str) -> RawDealInsert {
        RawDealInsert {
            source_name: "molit".into(),
            source_hash: hash.into(),
            region_code: "11680".into(),
            deal_ymd: "20260814".into(),
            payload: serde_json::json!({}),
            complex_id: None,
        }
    }

    #[tokio::test]
    async fn raw_insert_is_idempotent_by_hash() {
        let store = MemoryDealStore::new();
        let first = store.insert_raw_deal(&raw("abc")).await.unwrap();
        assert!(first.inserted);
        let again = store.insert_raw_deal(&raw("abc")).await.unwrap();
        assert_eq!(again, RawInsert { id: first.id, inserted: false });
        assert!(store.insert_raw_deal(&raw("def")).await.unwrap().inserted);
        assert_eq!(store.raw_count().await, 1);
    }

    #[tokio::test]
    async fn normalized_insert_suppresses_functional_duplicates() {
        let store = MemoryDealStore::new();
        let region_id = store.upsert_region(&gangnam()).await.unwrap();
        let id = seed_complex(&store, region_id, "Test Tower", "Daechi", None).await;
        let deal = NormalizedDealInsert {
            complex_id: id,
            deal_date: today(),
            amount: 120000,
            area_m2: 59.991,
            floor: None,
            build_year: None,
            source_raw_id: Some(1),
        };
        assert!(store.insert_normalized_deal(&deal).await.unwrap());
        let via_other_raw = NormalizedDealInsert {
            area_m2: 59.99,
            source_raw_id: Some(2),
            ..deal.clone()
        };
        assert!(!store.insert_normalized_deal(&via_other_raw).await.unwrap());
        let other_floor = NormalizedDealInsert {
            floor: Some(3),
            ..deal
        };
        assert!(store.insert_normalized_deal(&other_floor).await.unwrap());
        assert_eq!(store.normalized_count().await, 2);
    }

    #[tokio::test]
    async fn complex_location_is_never_overwritten() {
        let store = MemoryDealStore::new();
        let region_id = store.upsert_region(&gangnam()).await.unwrap();
        let first = GeoPoint::new(37.51, 127.04);
        let id = seed_complex(&store, region_id, "Test Tower", "Daechi", Some(first)).await;
        let again = seed_complex(&store, region_id, "Test Tower", "Daechi", Some(GeoPoint::new(1.0, 1.0))).await;
        assert_eq!(id, again);
        assert_eq!(store.complex_attributes(id).await.unwrap().location, Some(first));

        let _ = seed_complex(&store, region_id, "Test Tower", "Daechi", None).await;
        assert_eq!(store.complex_attributes(id).await.unwrap().location, Some(first));
        assert_eq!(store.complex_count().await, 1);
    }

    #[tokio::test]
    async fn re_resolving_a_complex_touches_updated_at() {
        let store = MemoryDealStore::new();
        let region_id = store.upsert_region(&gangnam()).await.unwrap();
        let id = seed_complex(&store, region_id, "Test Tower", "Daechi", None).await;
        let first = store.complex_updated_at(id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _ = seed_complex(&store, region_id, "Test Tower", "Daechi", None).await;
        let second = store.complex_updated_at(id).await.unwrap();
        assert!(second > first);
        assert_eq!(store.complex_updated_at(id + 1).await, None);
    }

    #[tokio::test]
    async fn region_upsert_is_idempotent_and_corrects_name() {
        let store = MemoryDealStore::new();
        let id = store.upsert_region(&gangnam()).await.unwrap();
        let renamed = RegionMeta {
            name: "Gangnam-gu".into(),
            ..gangnam()
        };
        assert_eq!(store.upsert_region(&renamed).await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_tower_scenario_returns_single_row() {
        let store = MemoryDealStore::new();
        let region_id = store.upsert_region(&gangnam()).await.unwrap();
        let id = seed_complex(&store, region_id, "Test Tower", "Daechi", Some(GeoPoint::new(37.5, 127.05))).await;
        let other = seed_complex(&store, region_id, "Raemian", "Jamsil", Some(GeoPoint::new(37.51, 127.1))).await;
        seed_deal(&store, id, 1, 150000).await;
        seed_deal(&store, other, 2, 90000).await;

        let query = SearchParams {
            q: Some("Test Tower".into()),
            sort: Some("latest".into()),
            page: Some("1".into()),
            size: Some("20".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let page = store.search_complexes(&query, today()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].id, id);
        assert_eq!(page.rows[0].region_name, "강남구");
        assert_eq!(page.rows[0].score, 340);
    }

    #[tokio::test]
    async fn price_bound_excludes_complex_without_deals() {
        let store = MemoryDealStore::new();
        let region_id = store.upsert_region(&gangnam()).await.unwrap();
        let priced = seed_complex(&store, region_id, "Tower One", "Daechi", None).await;
        let _empty = seed_complex(&store, region_id, "Tower Two", "Daechi", None).await;
        seed_deal(&store, priced, 400, 9000).await;
        seed_deal(&store, priced, 3, 5000).await;

        let query = SearchParams {
            q: Some("tower".into()),
            min_price: Some("5000".into()),
            max_price: Some("5000".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let page = store.search_complexes(&query, today()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].id, priced);
        assert_eq!(page.rows[0].latest_deal_amount, Some(5000));
    }

    #[tokio::test]
    async fn pagination_reports_total_across_pages() {
        let store = MemoryDealStore::new();
        let region_id = store.upsert_region(&gangnam()).await.unwrap();
        for i in 0..5 {
            let id = seed_complex(&store, region_id, &format!("Tower {i}"), "Daechi", None).await;
            seed_deal(&store, id, i, 1000 * (i as i64 + 1)).await;
        }
        let query = SearchParams {
            q: Some("tower".into()),
            sort: Some("price_asc".into()),
            page: Some("2".into()),
            size: Some("2".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let page = store.search_complexes(&query, today()).await.unwrap();
        assert_eq!(page.total, 5);
        let amounts: Vec<_> = page.rows.iter().map(|r| r.latest_deal_amount).collect();
        assert_eq!(amounts, vec![Some(3000), Some(4000)]);

        let again = store.search_complexes(&query, today()).await.unwrap();
        assert_eq!(page, again);
    }

    #[tokio::test]
    async fn map_and_search_return_the_same_set() {
        let store = MemoryDealStore::new();
        let region_id = store.upsert_region(&gangnam()).await.unwrap();
        let fixtures = [
            ("래미안 대치", "대치동", Some(GeoPoint::new(37.50, 127.06)), Some(200000)),
            ("래미안 잠실", "잠실동", Some(GeoPoint::new(37.51, 127.10)), Some(180000)),
            ("래미안 외곽", "대치동", Some(GeoPoint::new(36.00, 126.00)), Some(150000)),
            ("래미안 무좌표", "대치동", None, Some(170000)),
            ("래미안 무거래", "대치동", Some(GeoPoint::new(37.49, 127.05)), None),
            ("자이", "대치동", Some(GeoPoint::new(37.50, 127.05)), Some(160000)),
        ];
        for (name, dong, loc, amount) in fixtures {
            let id = seed_complex(&store, region_id, name, dong, loc).await;
            if let Some(amount) = amount {
                seed_deal(&store, id, 10, amount).await;
            }
        }

        let bbox = BoundingBox { sw_lat: 37.40, sw_lng: 126.75, ne_lat: 37.70, ne_lng: 127.20 };
        let cases = [
            (Some("래미안"), None, None),
            (Some("대치"), Some("150000"), None),
            (Some("래미안"), Some("170000"), Some("190000")),
            (Some("없는단지"), None, None),
        ];
        for (q, min, max) in cases {
            let s = |v: f64| Some(v.to_string());
            let search = SearchParams {
                q: q.map(String::from),
                min_price: min.map(String::from),
                max_price: max.map(String::from),
                sw_lat: s(bbox.sw_lat),
                sw_lng: s(bbox.sw_lng),
                ne_lat: s(bbox.ne_lat),
                ne_lng: s(bbox.ne_lng),
                size: Some("50".into()),
                ..Default::default()
            }
            .validate()
            .unwrap();
            let map = MapParams {
                q: q.map(String::from),
                min_price: min.map(String::from),
                max_price: max.map(String::from),
                sw_lat: s(bbox.sw_lat),
                sw_lng: s(bbox.sw_lng),
                ne_lat: s(bbox.ne_lat),
                ne_lng: s(bbox.ne_lng),
                limit: Some("500".into()),
                ..Default::default()
            }
            .validate()
            .unwrap();

            let page = store.search_complexes(&search, today()).await.unwrap();
            assert!(page.total <= 50);
            let search_ids: BTreeSet<i64> = page.rows.iter().map(|r| r.id).collect();
            let map_ids: BTreeSet<i64> = store.map_complexes(&map).await.unwrap().iter().map(|m| m.id).collect();
            assert_eq!(search_ids, map_ids, "q={q:?} min={min:?} max={max:?}");
        }
    }

    #[tokio::test]
    async fn map_orders_by_latest_price_and_truncates() {
        let store = MemoryDealStore::new();
        let region_id = store.upsert_region(&gangnam()).await.unwrap();
        let mut ids = Vec::new();
        for (i, amount) in [50000, 90000, 70000].into_iter().enumerate() {
            let id = seed_complex(&store, region_id, &format!("C{i}"), "Daechi", Some(GeoPoint::new(37.5, 127.0))).await;
            seed_deal(&store, id, 5, amount).await;
            ids.push(id);
        }
        let query = MapParams {
            sw_lat: Some("37".into()),
            sw_lng: Some("126".into()),
            ne_lat: Some("38".into()),
            ne_lng: Some("128".into()),
            limit: Some("2".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let rows = store.map_complexes(&query).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn unavailable_store_reports_distinct_error() {
        let store = MemoryDealStore::new();
        store.set_available(false);
        let err = store.upsert_region(&gangnam()).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn freshness_lists_recent_ingest_events() {
        let store = MemoryDealStore::new();
        store.insert_raw_deal(&raw("a")).await.unwrap();
        store
            .record_audit(&AuditEvent::system("ingest_success", serde_json::json!({"n": 1})))
            .await
            .unwrap();
        store
            .record_audit(&AuditEvent {
                actor_type: "anonymous".into(),
                actor_id: None,
                target_type: "complex".into(),
                target_id: Some(1),
                event_name: "cta_click:favorite".into(),
                detail: serde_json::json!({}),
            })
            .await
            .unwrap();
        let report = store.data_freshness(Utc::now()).await.unwrap();
        assert_eq!(report.raw.count_24h, 1);
        assert!(report.raw.last_ingested_at.is_some());
        assert_eq!(report.normalized.count_24h, 0);
        assert_eq!(report.recent_ingest_runs.len(), 1);
        assert_eq!(report.recent_ingest_runs[0].event, "ingest_success");
    }
}
