use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use dealmap_core::query::{
    deal_count_window_start, like_pattern, ComplexFilter, MapComplex, MapQuery, SearchPage, SearchQuery,
    SearchRow, SortMode, SCORE_EXACT_NAME, SCORE_EXACT_NEIGHBORHOOD, SCORE_NAME_CONTAINS,
    SCORE_NEIGHBORHOOD_CONTAINS, SCORE_RECENT_30D, SCORE_RECENT_90D,
};
use dealmap_core::{AuditEntry, AuditEvent, ComplexUpsert, NormalizedDealInsert, RawDealInsert, RegionMeta};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use crate::store::{
    DealStore, FreshnessReport, NormalizedFreshness, RawFreshness, RawInsert, StoreError, StoreResult,
    INGEST_EVENT_NAMES,
};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// PostgreSQL + PostGIS backed [`DealStore`].
#[derive(Debug, Clone)]
pub struct PgDealStore {
    pool: PgPool,
}

impl PgDealStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = Self::pool_options()
            .connect(database_url)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self { pool })
    }

    /// Build a pool without touching the network; connection failures
    /// surface per call as [`StoreError::Unavailable`].
    pub fn connect_lazy(database_url: &str) -> StoreResult<Self> {
        let pool = Self::pool_options()
            .connect_lazy(database_url)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self { pool })
    }

    fn pool_options() -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Query(format!("migration failed: {err}")))
    }
}

/// Shared FROM/WHERE for search, search count and map. Every engine goes
/// through here so their result sets stay identical.
fn push_filtered_complexes(qb: &mut QueryBuilder<'static, Postgres>, filter: &ComplexFilter, window_start: NaiveDate) {
    qb.push(
        r#"
        SELECT c.id,
               c.name,
               c.neighborhood,
               r.code AS region_code,
               r.name AS region_name,
               ST_Y(c.location) AS lat,
               ST_X(c.location) AS lng,
               latest.deal_date AS latest_deal_date,
               latest.deal_amount AS latest_deal_amount,
               (SELECT COUNT(*)
                  FROM deal_normalized dc
                 WHERE dc.complex_id = c.id
                   AND dc.deal_date >= "#,
    );
    qb.push_bind(window_start);
    qb.push(
        r#") AS deal_count_3m
          FROM complex c
          JOIN region r ON r.id = c.region_id
          LEFT JOIN LATERAL (
                SELECT d.deal_date, d.deal_amount
                  FROM deal_normalized d
                 WHERE d.complex_id = c.id
                 ORDER BY d.deal_date DESC, d.id DESC
                 LIMIT 1
          ) latest ON TRUE
         WHERE TRUE"#,
    );

    if let Some(text) = &filter.text {
        let pattern = like_pattern(text);
        qb.push(" AND (c.name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(r" ESCAPE '\' OR c.neighborhood ILIKE ");
        qb.push_bind(pattern);
        qb.push(r" ESCAPE '\')");
    }
    if let Some(code) = &filter.region_code {
        qb.push(" AND r.code = ");
        qb.push_bind(code.clone());
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND latest.deal_amount >= ");
        qb.push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND latest.deal_amount <= ");
        qb.push_bind(max);
    }
    if let Some(bbox) = filter.bbox {
        qb.push(" AND c.location IS NOT NULL AND ST_Intersects(c.location, ST_MakeEnvelope(");
        qb.push_bind(bbox.sw_lng);
        qb.push(", ");
        qb.push_bind(bbox.sw_lat);
        qb.push(", ");
        qb.push_bind(bbox.ne_lng);
        qb.push(", ");
        qb.push_bind(bbox.ne_lat);
        qb.push(", 4326))");
    }
}

fn push_score(qb: &mut QueryBuilder<'static, Postgres>, text: &str, today: NaiveDate) {
    let pattern = like_pattern(text);
    qb.push("(CASE WHEN lower(base.name) = lower(");
    qb.push_bind(text.to_string());
    qb.push(format!(") THEN {SCORE_EXACT_NAME} WHEN lower(base.neighborhood) = lower("));
    qb.push_bind(text.to_string());
    qb.push(format!(") THEN {SCORE_EXACT_NEIGHBORHOOD} WHEN base.name ILIKE "));
    qb.push_bind(pattern.clone());
    qb.push(format!(r" ESCAPE '\' THEN {SCORE_NAME_CONTAINS} WHEN base.neighborhood ILIKE "));
    qb.push_bind(pattern);
    qb.push(format!(r" ESCAPE '\' THEN {SCORE_NEIGHBORHOOD_CONTAINS} ELSE 0 END"));
    qb.push(" + CASE WHEN base.latest_deal_date >= ");
    qb.push_bind(today - Days::new(30));
    qb.push(format!(" THEN {SCORE_RECENT_30D} WHEN base.latest_deal_date >= "));
    qb.push_bind(today - Days::new(90));
    qb.push(format!(" THEN {SCORE_RECENT_90D} ELSE 0 END)::INT4 AS score"));
}

fn order_clause(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Latest => "latest_deal_date DESC NULLS LAST",
        SortMode::PriceDesc => "latest_deal_amount DESC NULLS LAST",
        SortMode::PriceAsc => "latest_deal_amount ASC NULLS LAST",
        SortMode::DealCount => "deal_count_3m DESC",
    }
}

fn search_row(row: &PgRow) -> Result<SearchRow, sqlx::Error> {
    Ok(SearchRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        neighborhood: row.try_get("neighborhood")?,
        region_code: row.try_get("region_code")?,
        region_name: row.try_get("region_name")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        latest_deal_amount: row.try_get("latest_deal_amount")?,
        latest_deal_date: row.try_get("latest_deal_date")?,
        deal_count_3m: row.try_get("deal_count_3m")?,
        score: row.try_get("score")?,
    })
}

#[async_trait]
impl DealStore for PgDealStore {
    async fn upsert_region(&self, region: &RegionMeta) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO region (code, province, slug, name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(&region.code)
        .bind(&region.province)
        .bind(&region.slug)
        .bind(&region.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn resolve_complex(&self, upsert: &ComplexUpsert) -> StoreResult<i64> {
        let location = upsert.attributes.location;
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO complex (region_id, external_key, name, neighborhood, location, build_year, total_units)
            VALUES ($1, $2, $3, $4, ST_SetSRID(ST_MakePoint($5::FLOAT8, $6::FLOAT8), 4326), $7, $8)
            ON CONFLICT (region_id, name, neighborhood) DO UPDATE SET
                location    = COALESCE(complex.location, EXCLUDED.location),
                build_year  = COALESCE(complex.build_year, EXCLUDED.build_year),
                total_units = COALESCE(complex.total_units, EXCLUDED.total_units),
                updated_at  = NOW()
            RETURNING id
            "#,
        )
        .bind(upsert.region_id)
        .bind(upsert.external_key())
        .bind(&upsert.name)
        .bind(&upsert.neighborhood)
        .bind(location.map(|p| p.lng))
        .bind(location.map(|p| p.lat))
        .bind(upsert.attributes.build_year)
        .bind(upsert.attributes.total_units)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn insert_raw_deal(&self, raw: &RawDealInsert) -> StoreResult<RawInsert> {
        // The fallback SELECT reads the pre-insert snapshot, so it only finds
        // rows that already existed.
        let row = sqlx::query(
            r#"
            WITH ins AS (
                INSERT INTO deal_raw (source_name, source_record_hash, region_code, deal_ymd, payload_json, complex_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (source_record_hash) DO NOTHING
                RETURNING id
            )
            SELECT id, TRUE AS inserted FROM ins
            UNION ALL
            SELECT id, FALSE AS inserted
              FROM deal_raw
             WHERE source_record_hash = $2
               AND NOT EXISTS (SELECT 1 FROM ins)
            "#,
        )
        .bind(&raw.source_name)
        .bind(&raw.source_hash)
        .bind(&raw.region_code)
        .bind(&raw.deal_ymd)
        .bind(&raw.payload)
        .bind(raw.complex_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(RawInsert {
            id: row.try_get("id")?,
            inserted: row.try_get("inserted")?,
        })
    }

    async fn insert_normalized_deal(&self, deal: &NormalizedDealInsert) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO deal_normalized (complex_id, deal_date, deal_amount, area_m2, floor, build_year, source_raw_id)
            VALUES ($1, $2, $3, ROUND($4::NUMERIC, 2), $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(deal.complex_id)
        .bind(deal.deal_date)
        .bind(deal.amount)
        .bind(deal.area_m2)
        .bind(deal.floor)
        .bind(deal.build_year)
        .bind(deal.source_raw_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_audit(&self, event: &AuditEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (actor_type, actor_id, target_type, target_id, event_name, detail_json)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&event.actor_type)
        .bind(&event.actor_id)
        .bind(&event.target_type)
        .bind(event.target_id)
        .bind(&event.event_name)
        .bind(&event.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn search_complexes(&self, query: &SearchQuery, today: NaiveDate) -> StoreResult<SearchPage> {
        let window_start = deal_count_window_start(today);
        let text = query.filter.text.clone().unwrap_or_default();

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM (");
        push_filtered_complexes(&mut count_qb, &query.filter, window_start);
        count_qb.push(") base");
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new("SELECT * FROM (SELECT base.*, ");
        push_score(&mut qb, &text, today);
        qb.push(" FROM (");
        push_filtered_complexes(&mut qb, &query.filter, window_start);
        qb.push(") base) scored ORDER BY ");
        qb.push(order_clause(query.sort));
        qb.push(", score DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(query.size));
        qb.push(" OFFSET ");
        qb.push_bind(query.offset() as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let rows = rows.iter().map(search_row).collect::<Result<Vec<_>, _>>()?;
        debug!(total, returned = rows.len(), sort = query.sort.as_str(), "search executed");
        Ok(SearchPage { rows, total })
    }

    async fn map_complexes(&self, query: &MapQuery) -> StoreResult<Vec<MapComplex>> {
        let window_start = deal_count_window_start(Utc::now().date_naive());
        let mut qb = QueryBuilder::new("SELECT * FROM (");
        push_filtered_complexes(&mut qb, &query.filter, window_start);
        qb.push(") base WHERE lat IS NOT NULL ORDER BY latest_deal_amount DESC NULLS LAST, id DESC LIMIT ");
        qb.push_bind(i64::from(query.limit));

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(MapComplex {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                neighborhood: row.try_get("neighborhood")?,
                region_code: row.try_get("region_code")?,
                lat: row.try_get("lat")?,
                lng: row.try_get("lng")?,
                latest_deal_amount: row.try_get("latest_deal_amount")?,
                latest_deal_date: row.try_get("latest_deal_date")?,
            });
        }
        Ok(out)
    }

    async fn data_freshness(&self, now: DateTime<Utc>) -> StoreResult<FreshnessReport> {
        let since = now - chrono::Duration::hours(24);

        let raw = sqlx::query(
            r#"
            SELECT MAX(ingested_at) AS last_ingested_at,
                   COUNT(*) FILTER (WHERE ingested_at >= $1) AS count_24h
              FROM deal_raw
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let normalized = sqlx::query(
            r#"
            SELECT MAX(deal_date) AS last_deal_date,
                   COUNT(*) FILTER (WHERE created_at >= $1) AS count_24h
              FROM deal_normalized
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let event_names = INGEST_EVENT_NAMES.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let runs = sqlx::query(
            r#"
            SELECT event_name, created_at, detail_json
              FROM audit_log
             WHERE event_name = ANY($1)
             ORDER BY created_at DESC, id DESC
             LIMIT 5
            "#,
        )
        .bind(event_names)
        .fetch_all(&self.pool)
        .await?;

        let mut recent_ingest_runs = Vec::with_capacity(runs.len());
        for row in runs {
            recent_ingest_runs.push(AuditEntry {
                event: row.try_get("event_name")?,
                at: row.try_get("created_at")?,
                detail: row.try_get("detail_json")?,
            });
        }

        Ok(FreshnessReport {
            checked_at: now,
            raw: RawFreshness {
                last_ingested_at: raw.try_get("last_ingested_at")?,
                count_24h: raw.try_get("count_24h")?,
            },
            normalized: NormalizedFreshness {
                last_deal_date: normalized.try_get("last_deal_date")?,
                count_24h: normalized.try_get("count_24h")?,
            },
            recent_ingest_runs,
        })
    }
}
