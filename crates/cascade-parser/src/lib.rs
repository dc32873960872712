//! # cascade-parser
//!
//! YAML front end for cascade task files.
//!
//! This crate provides:
//! - The raw serde schema of the task file ([`raw`])
//! - Scalar validation: human-readable durations (`90m`, `1h30m`), `HH:MM`
//!   times, cron expressions, IANA timezone names, naive deadlines
//! - Conversion into the validated [`cascade_core::TaskAST`]
//!
//! ## Example
//!
//! ```rust
//! let input = r#"
//! config:
//!   default_tz: Europe/London
//! tasks:
//!   - name: Write report
//!     duration: 1h30m
//!   - name: Send report
//!     duration: 10m
//!     deps:
//!       after: [write-report]
//! "#;
//!
//! let ast = cascade_parser::parse_str(input).unwrap();
//! assert_eq!(ast.tasks().len(), 2);
//! ```

pub mod raw;

use cascade_core::{
    AstError, Background, BackgroundCalendar, BackgroundTask, CascadeConfig, Deadline,
    Dependencies, Status, Task, TaskAST, TaskKind,
};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use raw::{RawBackground, RawDocument, RawStatus, RawTask};

/// Parsing or scalar validation error
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid duration: {0} (expected e.g. `90m`, `1h30m`)")]
    InvalidDuration(String),

    #[error("Invalid time: {0} (expected HH:MM)")]
    InvalidTime(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid deadline: {0} (expected YYYY-MM-DD HH:MM[:SS])")]
    InvalidDeadline(String),

    #[error("Invalid url: {0} (expected http(s):// or file://)")]
    InvalidUrl(String),

    #[error(transparent)]
    Ast(#[from] AstError),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Parse and validate a task file from a string.
pub fn parse_str(input: &str) -> Result<TaskAST, ParseError> {
    let doc: RawDocument = serde_yaml::from_str(input)?;
    convert(doc)
}

/// Parse and validate a task file from a path.
pub fn parse_file(path: &Path) -> Result<TaskAST, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&content)
}

fn convert(doc: RawDocument) -> Result<TaskAST, ParseError> {
    let config = CascadeConfig {
        default_tz: parse_timezone(&doc.config.default_tz)?,
        log: doc.config.log,
        solver_timeout: doc.config.solver_timeout,
    };

    let mut bg = BTreeMap::new();
    for (id, source) in doc.bg {
        bg.insert(id, convert_background(source)?);
    }

    let tasks = doc
        .tasks
        .into_iter()
        .map(convert_task)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TaskAST::new(config, bg, tasks)?)
}

fn convert_background(source: RawBackground) -> Result<Background, ParseError> {
    match source {
        RawBackground::Task(task) => Ok(Background::Task(BackgroundTask {
            schedule: parse_cron(&task.schedule)?,
            duration: parse_duration(&task.duration)?,
        })),
        RawBackground::Calendar(calendar) => {
            check_url(&calendar.url)?;
            Ok(Background::Calendar(BackgroundCalendar {
                url: calendar.url,
                filter: calendar.filter,
                whitelist: calendar.whitelist,
            }))
        }
    }
}

fn convert_task(task: RawTask) -> Result<Task, ParseError> {
    match task {
        RawTask::Step(step) => {
            let kind = TaskKind::Step {
                status: match step.status {
                    RawStatus::Todo => Status::Todo,
                    RawStatus::Done => Status::Done,
                },
                duration: parse_duration(&step.duration)?,
                confidence: step.confidence,
            };
            Ok(Task {
                id: step
                    .id
                    .unwrap_or_else(|| cascade_core::slugify(&step.name)),
                name: step.name,
                desc: step.desc,
                tags: step.tags,
                deadline: convert_deadline(step.deadline.as_deref())?,
                timezone: step.timezone.as_deref().map(parse_timezone).transpose()?,
                priority: step.priority,
                deps: Dependencies {
                    before: step.deps.before,
                    after: step.deps.after,
                },
                kind,
            })
        }
        RawTask::Goal(goal) => {
            let kind = TaskKind::Goal {
                subtasks: goal.subtasks,
                implicit_deps_by_order: goal.implicit_deps_by_order,
            };
            Ok(Task {
                id: goal
                    .id
                    .unwrap_or_else(|| cascade_core::slugify(&goal.name)),
                name: goal.name,
                desc: goal.desc,
                tags: goal.tags,
                deadline: convert_deadline(goal.deadline.as_deref())?,
                timezone: goal.timezone.as_deref().map(parse_timezone).transpose()?,
                priority: goal.priority,
                deps: Dependencies {
                    before: goal.deps.before,
                    after: goal.deps.after,
                },
                kind,
            })
        }
    }
}

fn convert_deadline(deadline: Option<&str>) -> Result<Option<Deadline>, ParseError> {
    Ok(deadline
        .map(parse_deadline)
        .transpose()?
        .map(Deadline::Floating))
}

// =============================================================================
// Scalar Parsers
// =============================================================================

/// Parse a human-readable duration such as `90m`, `1h30m`, `1d2h` or `45s`.
/// Units are `d`, `h`, `m`, `s`; at least one component is required and the
/// total must be positive.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut seconds: i64 = 0;
    let mut digits = String::new();
    let mut components = 0;

    for c in compact.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: i64 = digits
            .parse()
            .map_err(|_| ParseError::InvalidDuration(input.to_string()))?;
        digits.clear();
        components += 1;
        seconds += match c {
            'd' => value * 24 * 60 * 60,
            'h' => value * 60 * 60,
            'm' => value * 60,
            's' => value,
            _ => return Err(ParseError::InvalidDuration(input.to_string())),
        };
    }

    if components == 0 || !digits.is_empty() || seconds <= 0 {
        return Err(ParseError::InvalidDuration(input.to_string()));
    }
    Ok(Duration::seconds(seconds))
}

/// Parse a time of day in `HH:MM` form.
pub fn parse_time(input: &str) -> Result<NaiveTime, ParseError> {
    NaiveTime::parse_from_str(input, "%H:%M")
        .map_err(|_| ParseError::InvalidTime(input.to_string()))
}

/// Validate a cron expression, returning its canonical form.
///
/// The `cron` crate wants a seconds field; the conventional five-field form
/// is accepted and normalized by prepending `0`.
pub fn parse_cron(input: &str) -> Result<String, ParseError> {
    let normalized = if input.split_whitespace().count() == 5 {
        format!("0 {}", input.trim())
    } else {
        input.trim().to_string()
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|_| ParseError::InvalidCron(input.to_string()))?;
    Ok(normalized)
}

/// Parse an IANA timezone name.
pub fn parse_timezone(input: &str) -> Result<Tz, ParseError> {
    Tz::from_str(input).map_err(|_| ParseError::InvalidTimezone(input.to_string()))
}

/// Parse a naive deadline timestamp.
pub fn parse_deadline(input: &str) -> Result<NaiveDateTime, ParseError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .ok_or_else(|| ParseError::InvalidDeadline(input.to_string()))
}

fn check_url(url: &str) -> Result<(), ParseError> {
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("file://") {
        Ok(())
    } else {
        Err(ParseError::InvalidUrl(url.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("1d 2h").unwrap(), Duration::hours(26));
        assert_eq!(parse_duration("45s").unwrap(), Duration::seconds(45));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("90").is_err());
        assert!(parse_duration("1x").is_err());
        assert!(parse_duration("0m").is_err());
    }

    #[test]
    fn times() {
        assert_eq!(
            parse_time("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert!(parse_time("9h30").is_err());
        assert!(parse_time("25:00").is_err());
    }

    #[test]
    fn cron_five_fields_normalized() {
        assert_eq!(parse_cron("0 23 * * *").unwrap(), "0 0 23 * * *");
        assert_eq!(parse_cron("0 0 23 * * *").unwrap(), "0 0 23 * * *");
        assert!(parse_cron("not a cron").is_err());
    }

    #[test]
    fn timezones() {
        assert_eq!(parse_timezone("Europe/London").unwrap(), Tz::Europe__London);
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn deadlines() {
        assert!(parse_deadline("2025-06-01 18:00").is_ok());
        assert!(parse_deadline("2025-06-01T18:00:30").is_ok());
        assert!(parse_deadline("tomorrow").is_err());
    }

    const SAMPLE: &str = r#"
config:
  default_tz: Europe/London
  solver_timeout: 60
bg:
  sleep:
    schedule: "0 23 * * *"
    duration: 8h
  work:
    url: "https://example.org/feed.ics"
    filter: [standup]
    whitelist: true
tasks:
  - name: Task A
    duration: 90m
    confidence: 4
    deadline: "2025-06-01 18:00"
  - name: Task B
    duration: 20m
    status: done
    deps:
      after: [task-a]
  - name: Goal A
    subtasks: [task-a, task-b]
    implicit_deps_by_order: true
    priority: 3
"#;

    #[test]
    fn full_document() {
        let ast = parse_str(SAMPLE).unwrap();
        assert_eq!(ast.config().default_tz, Tz::Europe__London);
        assert_eq!(ast.config().solver_timeout, 60);
        assert_eq!(ast.tasks().len(), 3);

        let a = ast.get("task-a").unwrap();
        assert!(a.is_step());
        assert_eq!(a.priority, 1);
        match &a.kind {
            TaskKind::Step {
                duration,
                confidence,
                status,
            } => {
                assert_eq!(*duration, Duration::minutes(90));
                assert_eq!(*confidence, 4);
                assert_eq!(*status, Status::Todo);
            }
            TaskKind::Goal { .. } => panic!("expected step"),
        }

        let goal = ast.get("goal-a").unwrap();
        assert!(goal.is_goal());
        assert_eq!(goal.priority, 3);

        // Implicit ordering injected at construction.
        assert!(ast.get("task-b").unwrap().deps.after.contains("task-a"));

        match &ast.background()["sleep"] {
            Background::Task(t) => {
                assert_eq!(t.schedule, "0 0 23 * * *");
                assert_eq!(t.duration, Duration::hours(8));
            }
            Background::Calendar(_) => panic!("expected cron task"),
        }
        match &ast.background()["work"] {
            Background::Calendar(c) => assert!(c.whitelist),
            Background::Task(_) => panic!("expected calendar"),
        }
    }

    #[test]
    fn goal_discriminated_by_subtasks() {
        let ast = parse_str(
            r#"
config: { default_tz: UTC }
tasks:
  - name: Leaf
    duration: 5m
  - name: Wrap
    subtasks: [leaf]
"#,
        )
        .unwrap();
        assert!(ast.get("leaf").unwrap().is_step());
        assert!(ast.get("wrap").unwrap().is_goal());
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = parse_str(
            r#"
config: { default_tz: UTC }
tasks:
  - name: Leaf
    duration: 5m
    nonsense: true
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Yaml(_)));
    }

    #[test]
    fn structural_validation_propagates() {
        let err = parse_str(
            r#"
config: { default_tz: UTC }
tasks:
  - name: A
    duration: 5m
    deps: { after: [b] }
  - name: B
    duration: 5m
    deps: { after: [a] }
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Ast(AstError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn bad_url_scheme_rejected() {
        let err = parse_str(
            r#"
config: { default_tz: UTC }
bg:
  cal:
    url: "ftp://example.org/feed.ics"
"#,
        )
        .unwrap_err();
        // The untagged enum surfaces scheme validation once the calendar
        // variant is chosen.
        assert!(matches!(err, ParseError::InvalidUrl(_)));
    }

    #[test]
    fn parse_file_roundtrip() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let ast = parse_file(file.path()).unwrap();
        assert_eq!(ast.tasks().len(), 3);
    }
}
