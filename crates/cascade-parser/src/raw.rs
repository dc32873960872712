//! Serde-facing schema of the task file.
//!
//! These types mirror the YAML shape one-to-one and stay string-typed where
//! the domain model wants validated values; conversion and validation happen
//! in the crate root. A task map is a goal exactly when it carries
//! `subtasks`, hence the untagged enum with the goal variant first.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDocument {
    pub config: RawConfig,
    #[serde(default)]
    pub bg: BTreeMap<String, RawBackground>,
    #[serde(default)]
    pub tasks: Vec<RawTask>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub default_tz: String,
    #[serde(default)]
    pub log: bool,
    #[serde(default = "default_solver_timeout")]
    pub solver_timeout: u64,
}

fn default_solver_timeout() -> u64 {
    120
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum RawBackground {
    Task(RawBackgroundTask),
    Calendar(RawBackgroundCalendar),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBackgroundTask {
    pub schedule: String,
    pub duration: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBackgroundCalendar {
    pub url: String,
    #[serde(default)]
    pub filter: BTreeSet<String>,
    #[serde(default)]
    pub whitelist: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum RawTask {
    Goal(RawGoal),
    Step(RawStep),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDeps {
    #[serde(default)]
    pub before: BTreeSet<String>,
    #[serde(default)]
    pub after: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RawStatus {
    #[default]
    Todo,
    Done,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStep {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub deps: RawDeps,
    #[serde(default)]
    pub status: RawStatus,
    pub duration: String,
    #[serde(default = "default_confidence")]
    pub confidence: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGoal {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub deps: RawDeps,
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub implicit_deps_by_order: bool,
}

fn default_priority() -> i64 {
    1
}

fn default_confidence() -> i64 {
    1
}
