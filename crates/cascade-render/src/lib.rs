//! # cascade-render
//!
//! Rendering backends for cascade schedules.
//!
//! This crate provides:
//! - Plain-text schedule listings ([`TextRenderer`])
//! - ICS calendar emission ([`IcsRenderer`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use cascade_core::Renderer;
//! use cascade_render::{IcsRenderer, TextRenderer};
//!
//! println!("{}", TextRenderer::new().render(&schedule)?);
//! std::fs::write("schedule.ics", IcsRenderer::new().render(&schedule)?)?;
//! ```

pub mod ics;
pub mod text;

pub use ics::IcsRenderer;
pub use text::TextRenderer;

use cascade_core::{SLOT_MINUTES, YSCALE};

/// Format a utility score in priority points (the solver works in
/// `1 / YSCALE` units).
fn format_score(utility: i64) -> String {
    format!("{}", utility as f64 / YSCALE as f64)
}

/// Format a slot count as a compact duration (`"50m"`, `"1h30m"`).
fn format_slots(slots: i64) -> String {
    let minutes = slots * SLOT_MINUTES;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    match (hours, minutes) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h{m}m"),
    }
}
