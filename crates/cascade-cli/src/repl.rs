//! Interactive cascade session.
//!
//! A line-oriented loop over stdin holding the loaded task file, its
//! processed form, the last schedule and a result cache keyed by source text
//! and resolved window. Errors are printed and the session continues; EOF or
//! `quit` ends it.

use crate::{print_schedule, resolve_window, OutputFormat};
use anyhow::{bail, Context, Result};
use cascade_core::{Schedule, TaskAST};
use cascade_solver::ProcessedAST;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Default)]
struct AppState {
    path: Option<PathBuf>,
    src_text: Option<String>,
    ast: Option<TaskAST>,
    processed: Option<ProcessedAST>,
    last_schedule: Option<Schedule>,
    /// Prior results keyed by `(source text, window start, window end)`.
    /// Results are immutable, so invalidation is purely by key miss.
    cache: HashMap<(String, String, String), Schedule>,
}

impl AppState {
    /// Load (or reload) a task file. Does not alter state on failure.
    fn import(&mut self, path: Option<PathBuf>) -> Result<()> {
        let path = match path.or_else(|| self.path.clone()) {
            Some(path) => path,
            None => bail!("No file loaded yet. Usage: import <file path>"),
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let ast = cascade_parser::parse_str(&text)?;
        let processed = ProcessedAST::from_ast(&ast)?;

        println!("Imported {} tasks from '{}'", ast.tasks().len(), path.display());
        self.path = Some(path);
        self.src_text = Some(text);
        self.ast = Some(ast);
        self.processed = Some(processed);
        Ok(())
    }

    fn handle_schedule(&mut self, start_str: &str, end_str: &str, output: OutputFormat) -> Result<()> {
        let (Some(ast), Some(processed), Some(src_text)) =
            (&self.ast, &self.processed, &self.src_text)
        else {
            bail!("No tasks loaded. Please import tasks first.");
        };

        let (start, end) = resolve_window(ast, start_str, end_str)?;
        let key = (src_text.clone(), start.to_rfc3339(), end.to_rfc3339());
        let solution = match self.cache.get(&key) {
            Some(hit) => hit.clone(),
            None => {
                let solution = cascade_solver::schedule(processed, start, end)?;
                self.cache.insert(key, solution.clone());
                solution
            }
        };

        print_schedule(&solution, output)?;
        self.last_schedule = Some(solution);
        Ok(())
    }

    fn handle_dev(&self, what: &str) -> Result<()> {
        let Some(ast) = &self.ast else {
            bail!("No tasks loaded. Please import tasks first.");
        };
        match what {
            "normalize_deps" => println!("{:#?}", ast.normalize_dependencies()),
            "propagate" => println!("{:#?}", ast.propagate_properties()?),
            "processed_ast" => println!("{:#?}", self.processed),
            other => bail!("Unknown dev command: {other}. Usage: dev [normalize_deps | propagate | processed_ast]"),
        }
        Ok(())
    }
}

fn handle_line(line: &str, state: &mut AppState) -> Result<bool> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((verb, args)) = parts.split_first() else {
        return Ok(true);
    };

    match *verb {
        "import" => match args {
            [] => state.import(None)?,
            [path] => state.import(Some(PathBuf::from(path)))?,
            _ => println!("Usage: import [file path]"),
        },
        "schedule" => match parse_schedule_args(args) {
            Some((start, end, output)) => state.handle_schedule(start, end, output)?,
            None => println!("Usage: schedule <start> <end> [--output rendered|ics|no]"),
        },
        "dev" => match args {
            [what] => state.handle_dev(what)?,
            _ => println!("Usage: dev [normalize_deps | propagate | processed_ast]"),
        },
        "quit" | "exit" => return Ok(false),
        other => println!("Unknown command: {other}"),
    }
    Ok(true)
}

fn parse_schedule_args<'a>(args: &[&'a str]) -> Option<(&'a str, &'a str, OutputFormat)> {
    match args {
        [start, end] => Some((start, end, OutputFormat::Rendered)),
        [start, end, "--output", format] => {
            let format = match *format {
                "rendered" => OutputFormat::Rendered,
                "ics" => OutputFormat::Ics,
                "no" => OutputFormat::No,
                _ => return None,
            };
            Some((start, end, format))
        }
        _ => None,
    }
}

pub fn run() -> Result<()> {
    let mut state = AppState::default();
    println!("Hello from cascade!");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match handle_line(&line, &mut state) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("{e:#}"),
        }
    }

    println!("Good bye!");
    Ok(())
}
