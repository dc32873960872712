//! ICS calendar emission.
//!
//! One `VEVENT` per scheduled task. Timestamps are emitted in UTC
//! (`...T...Z` form) and text values are escaped per RFC 5545. `DTSTAMP` is
//! derived from the window start so output is deterministic for a given
//! schedule.

use crate::format_score;
use cascade_core::{RenderError, Renderer, Schedule, ScheduleEntry};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// ICS calendar renderer
#[derive(Clone, Debug)]
pub struct IcsRenderer {
    /// `PRODID` identifying the generator.
    pub prod_id: String,
    /// Domain suffix of generated `UID`s.
    pub uid_domain: String,
}

impl Default for IcsRenderer {
    fn default() -> Self {
        Self {
            prod_id: "-//cascade//scheduler//EN".into(),
            uid_domain: "cascade".into(),
        }
    }
}

impl IcsRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_event(&self, out: &mut String, id: &str, entry: &ScheduleEntry, stamp: &str) {
        out.push_str("BEGIN:VEVENT\r\n");
        out.push_str(&format!("UID:{}@{}\r\n", escape_text(id), self.uid_domain));
        out.push_str(&format!("DTSTAMP:{stamp}\r\n"));
        out.push_str(&format!("DTSTART:{}\r\n", format_utc(entry.start)));
        out.push_str(&format!("DTEND:{}\r\n", format_utc(entry.end)));
        out.push_str(&format!("SUMMARY:{}\r\n", escape_text(&entry.name)));
        out.push_str(&format!(
            "DESCRIPTION:Task ID: {}\\, Score: {}\r\n",
            escape_text(id),
            format_score(entry.utility),
        ));
        out.push_str("END:VEVENT\r\n");
    }
}

impl Renderer for IcsRenderer {
    type Output = String;

    fn render(&self, schedule: &Schedule) -> Result<String, RenderError> {
        let stamp = format_utc(schedule.window_start);
        let mut out = String::new();
        out.push_str("BEGIN:VCALENDAR\r\n");
        out.push_str("VERSION:2.0\r\n");
        out.push_str(&format!("PRODID:{}\r\n", self.prod_id));
        for (id, entry) in schedule.by_start() {
            if entry.is_scheduled() {
                self.push_event(&mut out, id, entry, &stamp);
            }
        }
        out.push_str("END:VCALENDAR\r\n");
        Ok(out)
    }
}

fn format_utc(ts: DateTime<Tz>) -> String {
    ts.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escape a text value per RFC 5545: backslash, semicolon, comma and
/// newlines.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::SLOT_MINUTES;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn sample() -> Schedule {
        let start = Tz::Europe__London
            .with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
            .unwrap();
        let mut entries = BTreeMap::new();
        entries.insert(
            "write-up".to_string(),
            ScheduleEntry {
                name: "Write; up, notes".into(),
                start,
                end: start + Duration::minutes(2 * SLOT_MINUTES),
                length_slots: 2,
                utility: 150,
                max_utility: 2,
            },
        );
        entries.insert(
            "skipped".to_string(),
            ScheduleEntry {
                name: "Skipped".into(),
                start,
                end: start,
                length_slots: 0,
                utility: 0,
                max_utility: 1,
            },
        );
        Schedule {
            objective: 0,
            entries,
            window_start: start,
            window_end: start + Duration::hours(1),
        }
    }

    #[test]
    fn only_scheduled_tasks_become_events() {
        let ics = IcsRenderer::new().render(&sample()).unwrap();
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        assert!(!ics.contains("Skipped"));
    }

    #[test]
    fn timestamps_are_utc() {
        let ics = IcsRenderer::new().render(&sample()).unwrap();
        // 09:00 London is 08:00 UTC in June.
        assert!(ics.contains("DTSTART:20250602T080000Z"));
        assert!(ics.contains("DTEND:20250602T081000Z"));
    }

    #[test]
    fn text_values_are_escaped() {
        let ics = IcsRenderer::new().render(&sample()).unwrap();
        assert!(ics.contains("SUMMARY:Write\\; up\\, notes"));
        assert!(ics.contains("DESCRIPTION:Task ID: write-up\\, Score: 1.5"));
    }

    #[test]
    fn calendar_is_wrapped() {
        let ics = IcsRenderer::new().render(&sample()).unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }
}
