use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::errors::ServiceError;

const ROMAN_MONTHS: [&str; 12] = [
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
];

pub fn roman_month(month: u32) -> Option<&'static str> {
    ROMAN_MONTHS.get(month.checked_sub(1)? as usize).copied()
}

/// Calendar day in the business timezone plus its UTC start (inclusive) and end (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessDay {
    pub date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

pub fn business_day(now: DateTime<Utc>, utc_offset_hours: i32) -> Result<BusinessDay, ServiceError> {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
        ServiceError::InternalError(format!("invalid UTC offset {}", utc_offset_hours))
    })?;
    let date = now.with_timezone(&offset).date_naive();
    let local_midnight = date
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .ok_or_else(|| ServiceError::InternalError(format!("no local midnight for {}", date)))?;
    let starts_at = local_midnight.with_timezone(&Utc);

    Ok(BusinessDay {
        date,
        starts_at,
        ends_at: starts_at + Duration::days(1),
    })
}

/// `{seq:02}/{warehouse}/{DD}/{ROMAN_MONTH}/{series}/{YYYY}`
pub fn delivery_note_number(
    sequence: u64,
    primary_warehouse_id: i64,
    date: NaiveDate,
    series: &str,
) -> String {
    let month = roman_month(date.month()).unwrap_or("I");
    format!(
        "{:02}/{}/{:02}/{}/{}/{}",
        sequence,
        primary_warehouse_id,
        date.day(),
        month,
        series,
        date.year()
    )
}
