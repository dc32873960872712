//! cascade CLI - Declarative TODO scheduling
//!
//! Command-line interface for scheduling task files and exploring them
//! interactively.

mod repl;

use anyhow::{Context, Result};
use cascade_core::{Renderer, Schedule, TaskAST};
use cascade_render::{IcsRenderer, TextRenderer};
use cascade_solver::ProcessedAST;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cascade")]
#[command(author, version, about = "Turns your TODO list into a well-scheduled calendar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule tasks between a start and an end time
    Schedule {
        /// Schedule start: `next_day`, `next_hour`, or a duration from now
        /// (e.g. `1h30m`)
        start: String,

        /// Schedule end as a duration from the start (e.g. `1d`)
        end: String,

        /// Path to the cascade task file
        #[arg(long)]
        path: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Rendered)]
        output: OutputFormat,
    },

    /// Start an interactive cascade session
    Repl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable schedule listing
    Rendered,
    /// ICS calendar
    Ics,
    /// Solve without printing
    No,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Schedule {
            start,
            end,
            path,
            output,
        } => cmd_schedule(&path, &start, &end, output),
        Commands::Repl => repl::run(),
    }
}

/// Schedule command: parse, compile, solve, print.
fn cmd_schedule(
    path: &std::path::Path,
    start_str: &str,
    end_str: &str,
    output: OutputFormat,
) -> Result<()> {
    let ast = cascade_parser::parse_file(path)
        .with_context(|| format!("Failed to load '{}'", path.display()))?;
    let processed = ProcessedAST::from_ast(&ast)?;

    let (start, end) = resolve_window(&ast, start_str, end_str)?;
    let solution = cascade_solver::schedule(&processed, start, end)?;

    print_schedule(&solution, output)
}

pub(crate) fn print_schedule(solution: &Schedule, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Rendered => print!("{}", TextRenderer::new().render(solution)?),
        OutputFormat::Ics => print!("{}", IcsRenderer::new().render(solution)?),
        OutputFormat::No => {}
    }
    Ok(())
}

/// Resolve the window expressions against the current time in the
/// configuration's default timezone.
pub(crate) fn resolve_window(
    ast: &TaskAST,
    start_str: &str,
    end_str: &str,
) -> Result<(DateTime<Tz>, DateTime<Tz>)> {
    let tz = ast.config().default_tz;
    let now = Utc::now().with_timezone(&tz);
    let start = resolve_start(now, start_str)?;
    let end = start + parse_relative(end_str)?;
    Ok((start, end))
}

fn resolve_start(now: DateTime<Tz>, start_str: &str) -> Result<DateTime<Tz>> {
    match start_str {
        "next_day" => {
            let midnight = (now.date_naive() + Duration::days(1)).and_time(NaiveTime::MIN);
            now.timezone()
                .from_local_datetime(&midnight)
                .earliest()
                .context("next_day falls into a timezone transition")
        }
        "next_hour" => {
            let local = now.naive_local();
            let next = local.date().and_time(NaiveTime::MIN)
                + Duration::hours(i64::from(local.hour()) + 1);
            now.timezone()
                .from_local_datetime(&next)
                .earliest()
                .context("next_hour falls into a timezone transition")
        }
        relative => Ok(now + parse_relative(relative)?),
    }
}

fn parse_relative(expr: &str) -> Result<Duration> {
    cascade_parser::parse_duration(expr)
        .with_context(|| format!("Failed to parse duration '{expr}'"))
}
