//! TUI Widgets - UI Components
//!
//! Stateless renderers: each takes view models from the domain layer and
//! produces Ratatui primitives.

use ratatui::text::{Line, Span};

use super::state::TaskCardView;
use super::theme::{icons, DashboardTheme};
use crate::sync::UploadState;

/// Lines for one task card
pub fn card_lines<'a>(
    card: &'a TaskCardView,
    theme: &DashboardTheme,
    width: usize,
    selected: bool,
) -> Vec<Line<'a>> {
    let title_style = if selected {
        theme.selected()
    } else {
        theme.text()
    };

    let mut title = vec![Span::styled(
        format!("{} {}", icons::CARD, utils::truncate(&card.headline, width.saturating_sub(4))),
        title_style,
    )];
    if card.has_new_message {
        title.push(Span::raw(" "));
        title.push(Span::styled(icons::NEW_MESSAGE, theme.accent()));
    }

    let mut lines = vec![Line::from(title)];

    if !card.fbg.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("  FBG: {}", card.fbg),
            theme.dimmed(),
        )));
    }
    if let Some(assigned) = &card.assigned_to {
        lines.push(Line::from(Span::styled(
            format!("  Assigned: {}", assigned),
            theme.dimmed(),
        )));
    }

    let worker = match (&card.selected_worker, card.is_applying) {
        (Some(w), true) => Some(format!("  {} {} (assigning...)", icons::WORKER, w)),
        (Some(w), false) => Some(format!("  {} {}", icons::WORKER, w)),
        (None, _) => None,
    };
    if let Some(worker) = worker {
        lines.push(Line::from(Span::styled(worker, theme.accent())));
    }

    if card.upload != UploadState::Idle {
        lines.push(Line::from(Span::styled(
            format!("  {} {}", icons::UPLOAD, utils::upload_badge(&card.upload)),
            theme.upload_style(&card.upload),
        )));
    }

    lines
}

/// Common widget utilities
pub mod utils {
    use crate::sync::UploadState;

    /// Format seconds as M:SS
    pub fn format_countdown(secs: u64) -> String {
        format!("{}:{:02}", secs / 60, secs % 60)
    }

    /// Truncate string with ellipsis (char-safe)
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else if max_len <= 3 {
            s.chars().take(max_len).collect()
        } else {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{}...", head)
        }
    }

    pub fn upload_badge(state: &UploadState) -> String {
        match state {
            UploadState::Idle => String::new(),
            UploadState::Uploading => "Uploading...".to_string(),
            UploadState::Polling => "Processing...".to_string(),
            UploadState::Finished => "Uploaded".to_string(),
            UploadState::Failed { reason } => format!("Upload failed: {}", reason),
        }
    }
}
