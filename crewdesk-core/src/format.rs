use chrono::{DateTime, Utc};

/// Human-friendly distance between `date` and `now`, counted in UTC
/// calendar days.
///
/// `"Today"`, `"Yesterday"`, `"N days ago"`, `"N weeks ago"`, `"N months ago"`,
/// `"N years ago"`. Dates on a later calendar day are rendered with
/// [`format_date`].
pub fn format_relative_date(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = now
        .date_naive()
        .signed_duration_since(date.date_naive())
        .num_days();
    match days {
        d if d < 0 => format_date(date),
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        d if d < 7 => format!("{d} days ago"),
        d if d < 30 => plural(d / 7, "week"),
        d if d < 365 => plural(d / 30, "month"),
        d => plural(d / 365, "year"),
    }
}

/// [`format_relative_date`] against the current clock.
pub fn format_relative_date_now(date: DateTime<Utc>) -> String {
    format_relative_date(date, Utc::now())
}

/// Relative date for an RFC 3339 timestamp as stored by the backend.
pub fn format_relative_timestamp(
    timestamp: &str,
    now: DateTime<Utc>,
) -> Result<String, chrono::ParseError> {
    let date = DateTime::parse_from_rfc3339(timestamp)?.with_timezone(&Utc);
    Ok(format_relative_date(date, now))
}

/// `"Mar 5, 2026"`.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%b %-d, %Y").to_string()
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}
