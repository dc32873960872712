//! Background busy blocks.
//!
//! Cron-driven obligations and external ICS calendars both reduce to the same
//! thing before modeling: absolute `[begin, end)` intervals during which no
//! task may be scheduled, sorted and sweep-merged into a minimal disjoint
//! cover. Merging is a correctness prerequisite for the raw calendar case,
//! where event lists can be large and overlapping.

use crate::SolveError;
use cascade_core::{Background, BackgroundCalendar, BackgroundTask};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::io::BufReader;
use std::str::FromStr;

/// An absolute busy interval, `[begin, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Block {
    pub fn duration(&self) -> Duration {
        self.end - self.begin
    }
}

/// Materialize all background sources into a disjoint, sorted block cover for
/// the given window.
pub fn background_blocks(
    bg: &BTreeMap<String, Background>,
    default_tz: Tz,
    window_start: DateTime<Tz>,
    window_end: DateTime<Tz>,
) -> Result<Vec<Block>, SolveError> {
    let mut blocks = Vec::new();
    for source in bg.values() {
        match source {
            Background::Task(task) => {
                blocks.extend(cron_blocks(task, default_tz, window_start, window_end)?);
            }
            Background::Calendar(calendar) => {
                blocks.extend(calendar_blocks(calendar, default_tz)?);
            }
        }
    }
    Ok(merge_blocks(blocks))
}

/// Sessions of a cron-driven background task. Enumeration starts a day before
/// the window so sessions straddling the window start are not missed; firings
/// are interpreted in the configuration's default timezone.
fn cron_blocks(
    task: &BackgroundTask,
    default_tz: Tz,
    window_start: DateTime<Tz>,
    window_end: DateTime<Tz>,
) -> Result<Vec<Block>, SolveError> {
    let schedule = cron::Schedule::from_str(&task.schedule).map_err(|e| {
        SolveError::Internal(format!("unvalidated cron expression {:?}: {e}", task.schedule))
    })?;

    let from = (window_start - Duration::days(1)).with_timezone(&default_tz);
    let mut blocks = Vec::new();
    for fire in schedule.after(&from) {
        if fire > window_end.with_timezone(&default_tz) {
            break;
        }
        let begin = fire.with_timezone(&Utc);
        blocks.push(Block {
            begin,
            end: begin + task.duration,
        });
    }
    Ok(blocks)
}

/// Events of an external ICS calendar, filtered by name.
fn calendar_blocks(
    calendar: &BackgroundCalendar,
    default_tz: Tz,
) -> Result<Vec<Block>, SolveError> {
    let raw = fetch_raw(&calendar.url)?;
    parse_calendar(&raw, calendar, default_tz)
}

fn fetch_raw(url: &str) -> Result<String, SolveError> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(std::fs::read_to_string(path)?);
    }

    tracing::info!(url, "downloading background calendar");
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| SolveError::CalendarFetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| SolveError::CalendarFetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    response.text().map_err(|e| SolveError::CalendarFetch {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn parse_calendar(
    raw: &str,
    calendar: &BackgroundCalendar,
    default_tz: Tz,
) -> Result<Vec<Block>, SolveError> {
    let parse_err = |message: String| SolveError::CalendarParse {
        url: calendar.url.clone(),
        message,
    };

    let mut blocks = Vec::new();
    for parsed in ical::IcalParser::new(BufReader::new(raw.as_bytes())) {
        let parsed = parsed.map_err(|e| parse_err(e.to_string()))?;
        for event in parsed.events {
            let mut summary = None;
            let mut begin = None;
            let mut end = None;
            for prop in &event.properties {
                match prop.name.as_str() {
                    "SUMMARY" => summary = prop.value.clone(),
                    "DTSTART" => begin = Some(ics_instant(prop, default_tz)?),
                    "DTEND" => end = Some(ics_instant(prop, default_tz)?),
                    _ => {}
                }
            }

            let name = summary.unwrap_or_default();
            if !calendar.matches(&name) {
                continue;
            }
            let (Some(begin), Some(end)) = (begin, end) else {
                return Err(parse_err(format!("event {name:?} lacks DTSTART/DTEND")));
            };
            if end > begin {
                blocks.push(Block { begin, end });
            }
        }
    }
    Ok(blocks)
}

/// Resolve an ICS date-time property to an instant. Handles the `Z` suffix
/// (UTC), `VALUE=DATE` all-day forms, and `TZID` parameters; floating times
/// fall back to the configured default timezone.
fn ics_instant(
    prop: &ical::property::Property,
    default_tz: Tz,
) -> Result<DateTime<Utc>, SolveError> {
    let bad = |message: String| SolveError::CalendarParse {
        url: String::new(),
        message,
    };
    let value = prop
        .value
        .as_deref()
        .ok_or_else(|| bad(format!("{} has no value", prop.name)))?;

    let tzid = prop.params.as_ref().and_then(|params| {
        params
            .iter()
            .find(|(name, _)| name == "TZID")
            .and_then(|(_, values)| values.first())
            .cloned()
    });
    let tz = match tzid {
        Some(name) => {
            Tz::from_str(&name).map_err(|_| bad(format!("unknown TZID {name:?}")))?
        }
        None => default_tz,
    };

    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
            .map_err(|e| bad(format!("bad UTC timestamp {value:?}: {e}")))?;
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Ok(local_instant(naive, tz));
    }

    // All-day events come as bare dates (VALUE=DATE).
    let date = NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|e| bad(format!("bad date-time {value:?}: {e}")))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| bad(format!("bad date {value:?}")))?;
    Ok(local_instant(midnight, tz))
}

fn local_instant(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        chrono::LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

/// Sort by begin and merge overlapping or touching intervals.
pub fn merge_blocks(mut blocks: Vec<Block>) -> Vec<Block> {
    blocks.sort_by_key(|b| (b.begin, b.end));
    let mut merged: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match merged.last_mut() {
            Some(last) if block.begin <= last.end => {
                last.end = last.end.max(block.end);
            }
            _ => merged.push(block),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc(s: &str) -> DateTime<Utc> {
        Utc.from_utc_datetime(&NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap())
    }

    fn block(begin: &str, end: &str) -> Block {
        Block {
            begin: utc(begin),
            end: utc(end),
        }
    }

    #[test]
    fn merge_overlapping_and_touching() {
        let merged = merge_blocks(vec![
            block("2025-06-01 10:00", "2025-06-01 11:00"),
            block("2025-06-01 10:30", "2025-06-01 11:30"),
            block("2025-06-01 11:30", "2025-06-01 12:00"),
            block("2025-06-01 14:00", "2025-06-01 15:00"),
        ]);
        assert_eq!(
            merged,
            vec![
                block("2025-06-01 10:00", "2025-06-01 12:00"),
                block("2025-06-01 14:00", "2025-06-01 15:00"),
            ]
        );
    }

    #[test]
    fn merge_keeps_disjoint_sorted() {
        let merged = merge_blocks(vec![
            block("2025-06-01 14:00", "2025-06-01 15:00"),
            block("2025-06-01 10:00", "2025-06-01 11:00"),
        ]);
        assert_eq!(merged[0].begin, utc("2025-06-01 10:00"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn cron_sessions_cover_window_and_backextend() {
        let tz = Tz::UTC;
        let task = BackgroundTask {
            // 23:00 daily, validated form with seconds field.
            schedule: "0 0 23 * * *".into(),
            duration: Duration::hours(8),
        };
        let start = tz.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap();
        let end = tz.with_ymd_and_hms(2025, 6, 3, 6, 0, 0).unwrap();
        let blocks = cron_blocks(&task, tz, start, end).unwrap();

        // The June 1st 23:00 session straddles the window start and must be
        // included; the June 2nd session fires inside the window.
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].begin, utc("2025-06-01 23:00"));
        assert_eq!(blocks[0].end, utc("2025-06-02 07:00"));
        assert_eq!(blocks[1].begin, utc("2025-06-02 23:00"));
    }

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Team Standup\r\n\
DTSTART:20250601T100000Z\r\n\
DTEND:20250601T101500Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Focus time\r\n\
DTSTART;TZID=Europe/London:20250601T120000\r\n\
DTEND;TZID=Europe/London:20250601T130000\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn calendar_events_parse_and_filter() {
        let calendar = BackgroundCalendar {
            url: "file:///feed.ics".into(),
            filter: ["standup".to_string()].into_iter().collect(),
            whitelist: true,
        };
        let blocks = parse_calendar(FEED, &calendar, Tz::UTC).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].begin, utc("2025-06-01 10:00"));
        assert_eq!(blocks[0].end, utc("2025-06-01 10:15"));
    }

    #[test]
    fn calendar_tzid_respected() {
        let calendar = BackgroundCalendar {
            url: "file:///feed.ics".into(),
            filter: Default::default(),
            whitelist: false,
        };
        let blocks = parse_calendar(FEED, &calendar, Tz::UTC).unwrap();
        assert_eq!(blocks.len(), 2);
        // London is UTC+1 on June 1st, so the 12:00 local event is 11:00 UTC.
        assert_eq!(blocks[1].begin, utc("2025-06-01 11:00"));
    }

    #[test]
    fn file_url_roundtrip() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FEED.as_bytes()).unwrap();
        let calendar = BackgroundCalendar {
            url: format!("file://{}", file.path().display()),
            filter: Default::default(),
            whitelist: false,
        };
        let blocks = calendar_blocks(&calendar, Tz::UTC).unwrap();
        assert_eq!(blocks.len(), 2);
    }
}
