//! Search / map query contract: raw parameter validation, the shared filter
//! predicate, relevance scoring and result ordering.
//!
//! Both query engines build their predicate from [`ComplexFilter`]; that is
//! what keeps the map view and the ranked search view set-equivalent.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BoundingBox, GeoPoint};

pub const MAX_QUERY_CHARS: usize = 80;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_MAP_LIMIT: u32 = 300;
pub const MAX_MAP_LIMIT: u32 = 500;

pub const SCORE_EXACT_NAME: i32 = 300;
pub const SCORE_EXACT_NEIGHBORHOOD: i32 = 250;
pub const SCORE_NAME_CONTAINS: i32 = 180;
pub const SCORE_NEIGHBORHOOD_CONTAINS: i32 = 140;
pub const SCORE_RECENT_30D: i32 = 40;
pub const SCORE_RECENT_90D: i32 = 20;

pub const DEAL_COUNT_WINDOW_MONTHS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{field}`: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Latest,
    PriceDesc,
    PriceAsc,
    DealCount,
}

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Latest => "latest",
            SortMode::PriceDesc => "price_desc",
            SortMode::PriceAsc => "price_asc",
            SortMode::DealCount => "deal_count",
        }
    }
}

impl FromStr for SortMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(SortMode::Latest),
            "price_desc" => Ok(SortMode::PriceDesc),
            "price_asc" => Ok(SortMode::PriceAsc),
            "deal_count" => Ok(SortMode::DealCount),
            other => Err(ValidationError::new(
                "sort",
                format!("unknown sort mode {other:?}; expected latest, price_desc, price_asc or deal_count"),
            )),
        }
    }
}

/// Raw `/api/search` query string. Every field stays a string until
/// [`SearchParams::validate`] so malformed input becomes a [`ValidationError`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub region: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sw_lat: Option<String>,
    pub sw_lng: Option<String>,
    pub ne_lat: Option<String>,
    pub ne_lng: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
}

/// Raw `/api/map/complexes` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapParams {
    pub q: Option<String>,
    pub region: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sw_lat: Option<String>,
    pub sw_lng: Option<String>,
    pub ne_lat: Option<String>,
    pub ne_lng: Option<String>,
    pub limit: Option<String>,
}

/// Predicate shared by both engines.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ComplexFilter {
    pub text: Option<String>,
    pub region_code: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub filter: ComplexFilter,
    pub sort: SortMode,
    pub page: u32,
    pub size: u32,
}

impl SearchQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapQuery {
    pub filter: ComplexFilter,
    pub limit: u32,
}

impl SearchParams {
    pub fn validate(&self) -> Result<SearchQuery, ValidationError> {
        let text = match parse_text(&self.q)? {
            Some(text) => text,
            None => return Err(ValidationError::new("q", "is required")),
        };
        let bbox = parse_bbox(
            [&self.sw_lat, &self.sw_lng, &self.ne_lat, &self.ne_lng],
            BboxRule::Optional,
        )?;
        let filter = ComplexFilter {
            text: Some(text),
            region_code: parse_region(&self.region)?,
            min_price: None,
            max_price: None,
            bbox,
        };
        let filter = with_price_bounds(filter, &self.min_price, &self.max_price)?;

        let sort = match non_empty(&self.sort) {
            Some(raw) => raw.parse()?,
            None => SortMode::default(),
        };
        let page = parse_number::<u32>("page", &self.page)?.unwrap_or(1);
        if page < 1 {
            return Err(ValidationError::new("page", "must be >= 1"));
        }
        let size = parse_number::<u32>("size", &self.size)?.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(ValidationError::new(
                "size",
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }

        Ok(SearchQuery {
            filter,
            sort,
            page,
            size,
        })
    }
}

impl MapParams {
    pub fn validate(&self) -> Result<MapQuery, ValidationError> {
        let bbox = parse_bbox(
            [&self.sw_lat, &self.sw_lng, &self.ne_lat, &self.ne_lng],
            BboxRule::Required,
        )?;
        let filter = ComplexFilter {
            text: parse_text(&self.q)?,
            region_code: parse_region(&self.region)?,
            min_price: None,
            max_price: None,
            bbox,
        };
        let filter = with_price_bounds(filter, &self.min_price, &self.max_price)?;

        let limit = parse_number::<u32>("limit", &self.limit)?.unwrap_or(DEFAULT_MAP_LIMIT);
        if !(1..=MAX_MAP_LIMIT).contains(&limit) {
            return Err(ValidationError::new(
                "limit",
                format!("must be between 1 and {MAX_MAP_LIMIT}"),
            ));
        }

        Ok(MapQuery { filter, limit })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BboxRule {
    /// Partial corners mean "no spatial filter".
    Optional,
    Required,
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number<T: FromStr>(field: &'static str, raw: &Option<String>) -> Result<Option<T>, ValidationError> {
    match non_empty(raw) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ValidationError::new(field, format!("{value:?} is not a valid number"))),
    }
}

fn parse_text(raw: &Option<String>) -> Result<Option<String>, ValidationError> {
    match non_empty(raw) {
        None => Ok(None),
        Some(text) if text.chars().count() > MAX_QUERY_CHARS => Err(ValidationError::new(
            "q",
            format!("must be at most {MAX_QUERY_CHARS} characters"),
        )),
        Some(text) => Ok(Some(text.to_string())),
    }
}

fn parse_region(raw: &Option<String>) -> Result<Option<String>, ValidationError> {
    match non_empty(raw) {
        None => Ok(None),
        Some(code) if code.len() == 5 && code.chars().all(|c| c.is_ascii_digit()) => {
            Ok(Some(code.to_string()))
        }
        Some(code) => Err(ValidationError::new(
            "region",
            format!("{code:?} is not a 5-digit region code"),
        )),
    }
}

fn with_price_bounds(
    mut filter: ComplexFilter,
    min_raw: &Option<String>,
    max_raw: &Option<String>,
) -> Result<ComplexFilter, ValidationError> {
    let min_price = parse_number::<i64>("min_price", min_raw)?;
    let max_price = parse_number::<i64>("max_price", max_raw)?;
    if min_price.is_some_and(|v| v < 0) {
        return Err(ValidationError::new("min_price", "must be >= 0"));
    }
    if max_price.is_some_and(|v| v < 0) {
        return Err(ValidationError::new("max_price", "must be >= 0"));
    }
    if let (Some(min), Some(max)) = (min_price, max_price) {
        if min > max {
            return Err(ValidationError::new("min_price", "must not exceed max_price"));
        }
    }
    filter.min_price = min_price;
    filter.max_price = max_price;
    Ok(filter)
}

fn parse_bbox(raw: [&Option<String>; 4], rule: BboxRule) -> Result<Option<BoundingBox>, ValidationError> {
    let sw_lat = parse_number::<f64>("sw_lat", raw[0])?;
    let sw_lng = parse_number::<f64>("sw_lng", raw[1])?;
    let ne_lat = parse_number::<f64>("ne_lat", raw[2])?;
    let ne_lng = parse_number::<f64>("ne_lng", raw[3])?;

    let (Some(sw_lat), Some(sw_lng), Some(ne_lat), Some(ne_lng)) = (sw_lat, sw_lng, ne_lat, ne_lng) else {
        return match rule {
            BboxRule::Optional => Ok(None),
            BboxRule::Required => Err(ValidationError::new(
                "bbox",
                "sw_lat, sw_lng, ne_lat and ne_lng are all required",
            )),
        };
    };

    for (field, value) in [("sw_lat", sw_lat), ("ne_lat", ne_lat)] {
        if !(-90.0..=90.0).contains(&value) {
            return Err(ValidationError::new(field, "must be between -90 and 90"));
        }
    }
    for (field, value) in [("sw_lng", sw_lng), ("ne_lng", ne_lng)] {
        if !(-180.0..=180.0).contains(&value) {
            return Err(ValidationError::new(field, "must be between -180 and 180"));
        }
    }

    let bbox = BoundingBox {
        sw_lat,
        sw_lng,
        ne_lat,
        ne_lng,
    };
    if bbox.is_degenerate() {
        return Err(ValidationError::new(
            "bbox",
            "south-west corner must be strictly below and left of the north-east corner",
        ));
    }
    Ok(Some(bbox))
}

/// Most recent normalized trade of a complex (max deal date, then max id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatestDeal {
    pub deal_id: i64,
    pub deal_date: NaiveDate,
    pub amount: i64,
}

/// Per-complex facts the predicate and the ranking look at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexFacts {
    pub id: i64,
    pub name: String,
    pub neighborhood: String,
    pub region_code: String,
    pub location: Option<GeoPoint>,
    pub latest: Option<LatestDeal>,
    pub deal_count_3m: i64,
}

impl ComplexFilter {
    pub fn matches(&self, facts: &ComplexFacts) -> bool {
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            if !facts.name.to_lowercase().contains(&needle)
                && !facts.neighborhood.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(code) = &self.region_code {
            if &facts.region_code != code {
                return false;
            }
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            let Some(latest) = facts.latest else {
                return false;
            };
            if self.min_price.is_some_and(|min| latest.amount < min) {
                return false;
            }
            if self.max_price.is_some_and(|max| latest.amount > max) {
                return false;
            }
        }
        if let Some(bbox) = &self.bbox {
            match &facts.location {
                Some(point) if bbox.contains(point) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Escape `%`, `_` and `\` and wrap in `%...%` for an `ILIKE ... ESCAPE '\'` clause.
pub fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

pub fn match_tier_score(query: &str, name: &str, neighborhood: &str) -> i32 {
    let q = query.to_lowercase();
    let name = name.to_lowercase();
    let neighborhood = neighborhood.to_lowercase();
    if name == q {
        SCORE_EXACT_NAME
    } else if neighborhood == q {
        SCORE_EXACT_NEIGHBORHOOD
    } else if name.contains(&q) {
        SCORE_NAME_CONTAINS
    } else if neighborhood.contains(&q) {
        SCORE_NEIGHBORHOOD_CONTAINS
    } else {
        0
    }
}

pub fn recency_score(latest_deal_date: Option<NaiveDate>, today: NaiveDate) -> i32 {
    let Some(date) = latest_deal_date else {
        return 0;
    };
    if date >= today - Days::new(30) {
        SCORE_RECENT_30D
    } else if date >= today - Days::new(90) {
        SCORE_RECENT_90D
    } else {
        0
    }
}

pub fn relevance_score(query: &str, facts: &ComplexFacts, today: NaiveDate) -> i32 {
    match_tier_score(query, &facts.name, &facts.neighborhood)
        + recency_score(facts.latest.map(|l| l.deal_date), today)
}

/// First day counted by the trailing deal-count sort key.
pub fn deal_count_window_start(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_months(Months::new(DEAL_COUNT_WINDOW_MONTHS))
        .unwrap_or(NaiveDate::MIN)
}

/// A complex with its computed relevance score, ready for ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedComplex {
    pub facts: ComplexFacts,
    pub score: i32,
}

fn desc_nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn asc_nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort key, then score desc, then id desc. Ids are unique so this is total.
pub fn compare_ranked(sort: SortMode, a: &RankedComplex, b: &RankedComplex) -> Ordering {
    let latest_date = |r: &RankedComplex| r.facts.latest.map(|l| l.deal_date);
    let latest_amount = |r: &RankedComplex| r.facts.latest.map(|l| l.amount);
    let primary = match sort {
        SortMode::Latest => desc_nulls_last(latest_date(a), latest_date(b)),
        SortMode::PriceDesc => desc_nulls_last(latest_amount(a), latest_amount(b)),
        SortMode::PriceAsc => asc_nulls_last(latest_amount(a), latest_amount(b)),
        SortMode::DealCount => b.facts.deal_count_3m.cmp(&a.facts.deal_count_3m),
    };
    primary
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| b.facts.id.cmp(&a.facts.id))
}

/// Map truncation order: latest price desc (nulls last), then id desc.
pub fn compare_for_map(a: &ComplexFacts, b: &ComplexFacts) -> Ordering {
    desc_nulls_last(a.latest.map(|l| l.amount), b.latest.map(|l| l.amount))
        .then_with(|| b.id.cmp(&a.id))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRow {
    pub id: i64,
    pub name: String,
    pub neighborhood: String,
    pub region_code: String,
    pub region_name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub latest_deal_amount: Option<i64>,
    pub latest_deal_date: Option<NaiveDate>,
    pub deal_count_3m: i64,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub rows: Vec<SearchRow>,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapComplex {
    pub id: i64,
    pub name: String,
    pub neighborhood: String,
    pub region_code: String,
    pub lat: f64,
    pub lng: f64,
    pub latest_deal_amount: Option<i64>,
    pub latest_deal_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(q: &str) -> SearchParams {
        SearchParams {
            q: Some(q.to_string()),
            ..Default::default()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn facts(id: i64, name: &str, latest: Option<(NaiveDate, i64)>) -> ComplexFacts {
        ComplexFacts {
            id,
            name: name.to_string(),
            neighborhood: "Daechi".to_string(),
            region_code: "11680".to_string(),
            location: Some(GeoPoint::new(37.5, 127.05)),
            latest: latest.map(|(deal_date, amount)| LatestDeal {
                deal_id: id * 10,
                deal_date,
                amount,
            }),
            deal_count_3m: 0,
        }
    }

    #[test]
    fn search_defaults_apply() {
        let query = params("Test Tower").validate().unwrap();
        assert_eq!(query.sort, SortMode::Latest);
        assert_eq!(query.page, 1);
        assert_eq!(query.size, DEFAULT_PAGE_SIZE);
        assert_eq!(query.offset(), 0);
        assert_eq!(query.filter.text.as_deref(), Some("Test Tower"));
        assert!(query.filter.bbox.is_none());
    }

    #[test]
    fn search_rejects_bad_input() {
        assert_eq!(SearchParams::default().validate().unwrap_err().field, "q");
        assert_eq!(params("   ").validate().unwrap_err().field, "q");
        assert_eq!(params(&"가".repeat(81)).validate().unwrap_err().field, "q");
        assert!(params(&"가".repeat(80)).validate().is_ok());

        let mut p = params("x");
        p.region = Some("1168".into());
        assert_eq!(p.validate().unwrap_err().field, "region");

        let mut p = params("x");
        p.size = Some("51".into());
        assert_eq!(p.validate().unwrap_err().field, "size");

        let mut p = params("x");
        p.page = Some("0".into());
        assert_eq!(p.validate().unwrap_err().field, "page");

        let mut p = params("x");
        p.min_price = Some("abc".into());
        assert_eq!(p.validate().unwrap_err().field, "min_price");

        let mut p = params("x");
        p.max_price = Some("-1".into());
        assert_eq!(p.validate().unwrap_err().field, "max_price");

        let mut p = params("x");
        p.sort = Some("random".into());
        assert_eq!(p.validate().unwrap_err().field, "sort");
    }

    #[test]
    fn partial_bbox_means_no_spatial_filter() {
        let mut p = params("x");
        p.sw_lat = Some("37.4".into());
        p.ne_lng = Some("127.2".into());
        assert!(p.validate().unwrap().filter.bbox.is_none());
    }

    #[test]
    fn inverted_bbox_is_rejected_by_both_engines() {
        let mut p = params("x");
        p.sw_lat = Some("40".into());
        p.sw_lng = Some("40".into());
        p.ne_lat = Some("10".into());
        p.ne_lng = Some("10".into());
        assert_eq!(p.validate().unwrap_err().field, "bbox");

        let m = MapParams {
            sw_lat: Some("40".into()),
            sw_lng: Some("40".into()),
            ne_lat: Some("10".into()),
            ne_lng: Some("10".into()),
            ..Default::default()
        };
        assert_eq!(m.validate().unwrap_err().field, "bbox");
    }

    #[test]
    fn map_requires_full_bbox_and_caps_limit() {
        let mut m = MapParams {
            sw_lat: Some("37.4".into()),
            sw_lng: Some("126.7".into()),
            ne_lat: Some("37.7".into()),
            ..Default::default()
        };
        assert_eq!(m.validate().unwrap_err().field, "bbox");

        m.ne_lng = Some("127.2".into());
        let query = m.validate().unwrap();
        assert_eq!(query.limit, DEFAULT_MAP_LIMIT);
        assert!(query.filter.text.is_none());

        m.limit = Some("501".into());
        assert_eq!(m.validate().unwrap_err().field, "limit");

        m.limit = Some("500".into());
        m.ne_lat = Some("91".into());
        assert_eq!(m.validate().unwrap_err().field, "ne_lat");
    }

    #[test]
    fn price_bounds_use_latest_deal_only() {
        let today = date(2026, 10, 19);
        let filter = ComplexFilter {
            min_price: Some(5000),
            max_price: Some(5000),
            ..Default::default()
        };
        assert!(filter.matches(&facts(1, "A", Some((today, 5000)))));
        assert!(!filter.matches(&facts(2, "B", Some((today, 5001)))));
        assert!(!filter.matches(&facts(3, "C", None)));
        assert!(ComplexFilter::default().matches(&facts(3, "C", None)));
    }

    #[test]
    fn text_match_is_case_insensitive_over_name_or_neighborhood() {
        let filter = ComplexFilter {
            text: Some("tower".into()),
            ..Default::default()
        };
        assert!(filter.matches(&facts(1, "Test Tower", None)));
        let by_dong = ComplexFilter {
            text: Some("daechi".into()),
            ..Default::default()
        };
        assert!(by_dong.matches(&facts(1, "Unrelated", None)));
        let miss = ComplexFilter {
            text: Some("jamsil".into()),
            ..Default::default()
        };
        assert!(!miss.matches(&facts(1, "Test Tower", None)));
    }

    #[test]
    fn bbox_filter_excludes_unlocated_complexes() {
        let filter = ComplexFilter {
            bbox: Some(BoundingBox { sw_lat: 37.0, sw_lng: 127.0, ne_lat: 38.0, ne_lng: 128.0 }),
            ..Default::default()
        };
        let mut f = facts(1, "A", None);
        assert!(filter.matches(&f));
        f.location = None;
        assert!(!filter.matches(&f));
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn score_tiers_and_recency() {
        let today = date(2026, 10, 19);
        assert_eq!(match_tier_score("test tower", "Test Tower", "Daechi"), SCORE_EXACT_NAME);
        assert_eq!(match_tier_score("daechi", "Test Tower", "Daechi"), SCORE_EXACT_NEIGHBORHOOD);
        assert_eq!(match_tier_score("tower", "Test Tower", "Daechi"), SCORE_NAME_CONTAINS);
        assert_eq!(match_tier_score("aech", "Test Tower", "Daechi"), SCORE_NEIGHBORHOOD_CONTAINS);
        assert_eq!(match_tier_score("zzz", "Test Tower", "Daechi"), 0);

        assert_eq!(recency_score(Some(date(2026, 9, 19)), today), SCORE_RECENT_30D);
        assert_eq!(recency_score(Some(date(2026, 8, 1)), today), SCORE_RECENT_90D);
        assert_eq!(recency_score(Some(date(2026, 1, 1)), today), 0);
        assert_eq!(recency_score(None, today), 0);
    }

    #[test]
    fn ordering_is_total_and_stable() {
        let today = date(2026, 10, 19);
        let rank = |f: ComplexFacts| RankedComplex {
            score: relevance_score("tower", &f, today),
            facts: f,
        };
        let rows = vec![
            rank(facts(1, "Tower A", Some((date(2026, 10, 1), 9000)))),
            rank(facts(2, "Tower B", Some((date(2026, 10, 1), 9000)))),
            rank(facts(3, "Tower", Some((date(2026, 10, 1), 9000)))),
            rank(facts(4, "Tower C", None)),
            rank(facts(5, "Tower D", Some((date(2025, 1, 1), 1000)))),
        ];

        for sort in [SortMode::Latest, SortMode::PriceDesc, SortMode::PriceAsc, SortMode::DealCount] {
            for a in &rows {
                for b in &rows {
                    let ord = compare_ranked(sort, a, b);
                    assert_eq!(ord == Ordering::Equal, a.facts.id == b.facts.id);
                    assert_eq!(ord.reverse(), compare_ranked(sort, b, a));
                }
            }
        }

        let mut latest = rows.clone();
        latest.sort_by(|a, b| compare_ranked(SortMode::Latest, a, b));
        let ids: Vec<i64> = latest.iter().map(|r| r.facts.id).collect();
        // exact name match wins the tie on date, then id desc; null date last
        assert_eq!(ids, vec![3, 2, 1, 5, 4]);

        let mut asc = rows.clone();
        asc.sort_by(|a, b| compare_ranked(SortMode::PriceAsc, a, b));
        assert_eq!(asc.first().map(|r| r.facts.id), Some(5));
        assert_eq!(asc.last().map(|r| r.facts.id), Some(4));
    }

    #[test]
    fn deal_count_window_is_three_months() {
        assert_eq!(deal_count_window_start(date(2026, 10, 19)), date(2026, 7, 19));
        assert_eq!(deal_count_window_start(date(2026, 5, 31)), date(2026, 2, 28));
    }
}
