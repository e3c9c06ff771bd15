//! Raw provider record -> [`NormalizedDeal`].
//!
//! The provider has shipped two tag vocabularies over time: English API names
//! and the older Korean ones. Every field is resolved through
//! [`FIELD_ALIASES`], primary name first.

use chrono::NaiveDate;
use dealmap_core::{area_centi, NormalizedDeal, RawRecord};
use thiserror::Error;

/// Largest area the store column holds, in hundredths of m² (`NUMERIC(8,2)`).
pub const MAX_AREA_CENTI: i64 = 99_999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealField {
    ComplexName,
    Neighborhood,
    Amount,
    Year,
    Month,
    Day,
    Area,
    Floor,
    BuildYear,
}

/// (field, primary tag, fallback tag)
pub const FIELD_ALIASES: [(DealField, &str, &str); 9] = [
    (DealField::ComplexName, "aptNm", "아파트"),
    (DealField::Neighborhood, "umdNm", "법정동"),
    (DealField::Amount, "dealAmount", "거래금액"),
    (DealField::Year, "dealYear", "년"),
    (DealField::Month, "dealMonth", "월"),
    (DealField::Day, "dealDay", "일"),
    (DealField::Area, "excluUseAr", "전용면적"),
    (DealField::Floor, "floor", "층"),
    (DealField::BuildYear, "buildYear", "건축년도"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("record has no complex name")]
    MissingComplexName,
    #[error("record has no valid deal date ({year}-{month}-{day})")]
    InvalidDate { year: u32, month: u32, day: u32 },
    #[error("record has no deal amount")]
    MissingAmount,
    #[error("record has no exclusive area")]
    MissingArea,
    #[error("exclusive area {centi} (1/100 m²) exceeds {MAX_AREA_CENTI}")]
    AreaOutOfRange { centi: i64 },
}

/// Trimmed value for `field`; an empty primary falls through to the fallback.
pub fn field_value(raw: &RawRecord, field: DealField) -> Option<&str> {
    let (_, primary, fallback) = *FIELD_ALIASES.iter().find(|(f, _, _)| *f == field)?;
    [primary, fallback]
        .into_iter()
        .filter_map(|key| raw.get(key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

fn strip(value: &str, keep: impl Fn(char) -> bool) -> String {
    value.chars().filter(|c| keep(*c)).collect()
}

fn digits<T: std::str::FromStr + Default>(raw: &RawRecord, field: DealField) -> T {
    field_value(raw, field)
        .map(|v| strip(v, |c| c.is_ascii_digit()))
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

fn area(raw: &RawRecord) -> f64 {
    field_value(raw, DealField::Area)
        .map(|v| strip(v, |c| c.is_ascii_digit() || c == '.'))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn floor(raw: &RawRecord) -> Option<i32> {
    field_value(raw, DealField::Floor)
        .map(|v| strip(v, |c| c.is_ascii_digit() || c == '-'))
        .and_then(|v| v.parse::<i32>().ok())
        .filter(|v| *v != 0)
}

pub fn normalize_record(raw: &RawRecord, region_code: &str) -> Result<NormalizedDeal, Rejection> {
    let complex_name = field_value(raw, DealField::ComplexName)
        .ok_or(Rejection::MissingComplexName)?
        .to_string();
    let neighborhood = field_value(raw, DealField::Neighborhood)
        .unwrap_or_default()
        .to_string();

    let year: u32 = digits(raw, DealField::Year);
    let month: u32 = digits(raw, DealField::Month);
    let day: u32 = digits(raw, DealField::Day);
    let deal_date = i32::try_from(year)
        .ok()
        .filter(|y| *y > 0)
        .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
        .ok_or(Rejection::InvalidDate { year, month, day })?;

    let amount: i64 = digits(raw, DealField::Amount);
    if amount == 0 {
        return Err(Rejection::MissingAmount);
    }
    let area_m2 = area(raw);
    if area_m2 == 0.0 {
        return Err(Rejection::MissingArea);
    }
    let centi = area_centi(area_m2);
    if centi > MAX_AREA_CENTI {
        return Err(Rejection::AreaOutOfRange { centi });
    }

    let build_year = Some(digits::<i32>(raw, DealField::BuildYear)).filter(|y| *y != 0);

    Ok(NormalizedDeal {
        region_code: region_code.to_string(),
        complex_name,
        neighborhood,
        deal_date,
        amount,
        area_m2,
        floor: floor(raw),
        build_year,
    })
}
