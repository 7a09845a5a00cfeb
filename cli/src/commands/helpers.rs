use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::config::Config;
use fitlog_core::auth::authenticate;
use fitlog_core::db::Database;
use fitlog_core::draft::DraftEntry;
use fitlog_core::models::User;

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(today()),
        Some(s) => match s.as_str() {
            "today" => Ok(today()),
            "yesterday" => Ok(today() - chrono::Duration::days(1)),
            "tomorrow" => Ok(today() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// The user behind the saved CLI session.
pub(crate) fn require_user(db: &Database, config: &Config) -> Result<User> {
    let Some(token) = config.load_session()? else {
        bail!("Not logged in. Run `fitlog login` first");
    };
    authenticate(db, &token)?.context("Session expired. Run `fitlog login` again")
}

/// Parse an entry spec of the form `NAME:SETSxREPS[@WEIGHT]`, e.g.
/// `Bench Press:4x8@185`. The name may itself contain colons; the last one
/// separates it from the numbers.
pub(crate) fn parse_entry_spec(spec: &str) -> Result<DraftEntry> {
    let Some((name, numbers)) = spec.rsplit_once(':') else {
        bail!("Invalid entry '{spec}'. Use NAME:SETSxREPS[@WEIGHT], e.g. 'Squat:5x5@225'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid entry '{spec}': missing exercise name");
    }

    let (volume, weight) = match numbers.split_once('@') {
        Some((v, w)) => {
            let w: f64 = w
                .trim()
                .parse()
                .with_context(|| format!("Invalid weight in '{spec}'"))?;
            (v, Some(w))
        }
        None => (numbers, None),
    };
    let Some((sets, reps)) = volume.to_lowercase().split_once('x').map(|(s, r)| {
        (s.trim().to_string(), r.trim().to_string())
    }) else {
        bail!("Invalid entry '{spec}'. Use NAME:SETSxREPS[@WEIGHT], e.g. 'Squat:5x5@225'");
    };
    let sets: i64 = sets
        .parse()
        .with_context(|| format!("Invalid sets in '{spec}'"))?;
    let reps: i64 = reps
        .parse()
        .with_context(|| format!("Invalid reps in '{spec}'"))?;

    Ok(DraftEntry {
        exercise: name.to_string(),
        sets: Some(sets),
        reps: Some(reps),
        weight,
    })
}

pub(crate) fn format_entry(sets: Option<i64>, reps: Option<i64>, weight: Option<f64>) -> String {
    let mut out = format!(
        "{}x{}",
        sets.map_or("-".into(), |v| v.to_string()),
        reps.map_or("-".into(), |v| v.to_string())
    );
    if let Some(w) = weight {
        out.push_str(&format!(" @ {}", format_number(w)));
    }
    out
}

/// `185` for whole numbers, `185.5` otherwise.
pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

pub(crate) fn opt_cell<T: ToString>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
