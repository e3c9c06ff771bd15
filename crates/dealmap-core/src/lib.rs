//! Core domain model for dealmap: regions, complexes, deals, audit events,
//! and the pure helpers shared by ingestion and the query engines.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod query;

pub const CRATE_NAME: &str = "dealmap-core";

/// Source name stamped on every raw record pulled from the public trade API.
pub const MOLIT_SOURCE_NAME: &str = "molit";

/// Total width (degrees) of the pseudo-geocode jitter window around a region center.
pub const JITTER_SPAN_DEG: f64 = 0.1;

/// One upstream item as delivered by the provider: tag name -> text.
pub type RawRecord = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// South-west / north-east rectangle. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub sw_lat: f64,
    pub sw_lng: f64,
    pub ne_lat: f64,
    pub ne_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.sw_lat
            && point.lat <= self.ne_lat
            && point.lng >= self.sw_lng
            && point.lng <= self.ne_lng
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.sw_lat < self.ne_lat && self.sw_lng < self.ne_lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMeta {
    pub code: String,
    pub province: String,
    pub slug: String,
    pub name: String,
    pub center: GeoPoint,
}

impl RegionMeta {
    /// Metadata used for region codes missing from the catalog.
    pub fn fallback(code: &str) -> Self {
        Self {
            code: code.to_string(),
            province: "unknown".to_string(),
            slug: format!("code-{code}"),
            name: format!("지역 {code}"),
            center: GeoPoint::new(37.5665, 126.978),
        }
    }
}

/// Canonical trade produced by the record normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDeal {
    pub region_code: String,
    pub complex_name: String,
    pub neighborhood: String,
    pub deal_date: NaiveDate,
    pub amount: i64,
    pub area_m2: f64,
    pub floor: Option<i32>,
    pub build_year: Option<i32>,
}

impl NormalizedDeal {
    pub fn deal_ymd(&self) -> String {
        self.deal_date.format("%Y%m%d").to_string()
    }

    /// Payload archived alongside the raw record.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "region_code": self.region_code,
            "apt_name": self.complex_name,
            "legal_dong": self.neighborhood,
            "deal_ymd": self.deal_ymd(),
            "deal_amount": self.amount,
            "area_m2": self.area_m2,
            "floor": self.floor,
            "build_year": self.build_year,
        })
    }
}

/// Stable identity of a trade: sha256 over the business key, hex encoded.
pub fn content_hash(deal: &NormalizedDeal) -> String {
    let key = [
        deal.region_code.clone(),
        deal.complex_name.clone(),
        deal.neighborhood.clone(),
        deal.deal_date.format("%Y-%m-%d").to_string(),
        deal.amount.to_string(),
        deal.area_m2.to_string(),
        deal.floor.unwrap_or(0).to_string(),
    ]
    .join("|");
    sha256_hex(key.as_bytes())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Area rounded to the 0.01 m² precision the store keeps.
pub fn area_centi(area_m2: f64) -> i64 {
    (area_m2 * 100.0).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Lat,
    Lng,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Lat => "lat",
            Axis::Lng => "lng",
        }
    }
}

/// Deterministic offset in `[-JITTER_SPAN_DEG / 2, JITTER_SPAN_DEG / 2]`.
pub fn jitter_offset(name: &str, neighborhood: &str, axis: Axis) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("{name}|{neighborhood}|{}", axis.as_str()).as_bytes());
    let digest = hasher.finalize();
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (f64::from(n) / f64::from(u32::MAX) - 0.5) * JITTER_SPAN_DEG
}

/// Stand-in coordinate for a complex with no authoritative geocode.
pub fn approximate_location(center: GeoPoint, name: &str, neighborhood: &str) -> GeoPoint {
    GeoPoint {
        lat: center.lat + jitter_offset(name, neighborhood, Axis::Lat),
        lng: center.lng + jitter_offset(name, neighborhood, Axis::Lng),
    }
}

/// Complex attributes governed by the first-non-null-wins policy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComplexAttributes {
    pub location: Option<GeoPoint>,
    pub build_year: Option<i32>,
    pub total_units: Option<i32>,
}

/// Stored values are kept once set; incoming values only fill gaps.
pub fn merge_complex_attributes(
    existing: &ComplexAttributes,
    incoming: &ComplexAttributes,
) -> ComplexAttributes {
    ComplexAttributes {
        location: existing.location.or(incoming.location),
        build_year: existing.build_year.or(incoming.build_year),
        total_units: existing.total_units.or(incoming.total_units),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexUpsert {
    pub region_id: i64,
    pub region_code: String,
    pub name: String,
    pub neighborhood: String,
    pub attributes: ComplexAttributes,
}

impl ComplexUpsert {
    pub fn external_key(&self) -> String {
        format!("{}-{}", self.region_code, self.name)
            .chars()
            .take(120)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDealInsert {
    pub source_name: String,
    pub source_hash: String,
    pub region_code: String,
    pub deal_ymd: String,
    pub payload: serde_json::Value,
    pub complex_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDealInsert {
    pub complex_id: i64,
    pub deal_date: NaiveDate,
    pub amount: i64,
    pub area_m2: f64,
    pub floor: Option<i32>,
    pub build_year: Option<i32>,
    pub source_raw_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor_type: String,
    pub actor_id: Option<String>,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub event_name: String,
    pub detail: serde_json::Value,
}

impl AuditEvent {
    pub fn system(event_name: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            actor_type: "system".to_string(),
            actor_id: None,
            target_type: "pipeline".to_string(),
            target_id: None,
            event_name: event_name.into(),
            detail,
        }
    }
}

/// Audit row as read back for freshness reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: String,
    pub at: DateTime<Utc>,
    pub detail: serde_json::Value,
}
