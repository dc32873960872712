//! Plain-text schedule listing.
//!
//! One header block with the window and totals, then one line per task in
//! start order. Unscheduled tasks are called out explicitly so a silent
//! drop is never mistaken for a placement.

use crate::{format_score, format_slots};
use cascade_core::{RenderError, Renderer, Schedule};

/// Plain-text schedule renderer
#[derive(Clone, Debug, Default)]
pub struct TextRenderer {
    /// Show task ids next to names.
    pub show_ids: bool,
}

impl TextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show task ids next to names.
    pub fn with_ids(mut self) -> Self {
        self.show_ids = true;
        self
    }

    fn label(&self, id: &str, name: &str) -> String {
        if self.show_ids {
            format!("\"{name}\" ({id})")
        } else {
            format!("\"{name}\"")
        }
    }
}

impl Renderer for TextRenderer {
    type Output = String;

    fn render(&self, schedule: &Schedule) -> Result<String, RenderError> {
        let mut out = String::new();

        out.push_str(&format!(
            "Schedule for {} → {}\n",
            schedule.window_start, schedule.window_end
        ));
        out.push_str(&format!(
            "Total utility: {}\n",
            format_score(schedule.total_utility())
        ));
        out.push_str(&format!(
            "Total length: {}\n",
            format_slots(schedule.total_length_slots())
        ));

        for (id, entry) in schedule.by_start() {
            if entry.is_scheduled() {
                out.push_str(&format!(
                    "Task {} scheduled at {} → {}. Length: {}, Utility: {}/{}\n",
                    self.label(id, &entry.name),
                    entry.start,
                    entry.end,
                    format_slots(entry.length_slots),
                    format_score(entry.utility),
                    entry.max_utility,
                ));
            } else {
                out.push_str(&format!(
                    "Task {} ({}) is not scheduled\n",
                    self.label(id, &entry.name),
                    id,
                ));
            }
        }

        Ok(out)
    }
}
