//! Dashboard Theme - Visual Design System
//!
//! Violet/amber/cyan palette; one accent per board column.

use ratatui::style::{Color, Modifier, Style};

use crate::model::Column;
use crate::sync::UploadState;

/// Dashboard color palette
pub struct DashboardTheme {
    // Primary palette
    pub violet: Color,
    pub amber: Color,
    pub cyan: Color,
    pub white: Color,

    // Status colors
    pub success_green: Color,
    pub warning_orange: Color,
    pub error_red: Color,

    pub gray: Color,
}

impl Default for DashboardTheme {
    fn default() -> Self {
        Self {
            violet: Color::Rgb(138, 43, 226), // #8A2BE2
            amber: Color::Rgb(255, 191, 0),   // #FFBF00
            cyan: Color::Rgb(0, 255, 255),    // #00FFFF
            white: Color::Rgb(230, 237, 243), // #E6EDF3

            success_green: Color::Rgb(63, 185, 80),   // #3FB950
            warning_orange: Color::Rgb(210, 153, 34), // #D29922
            error_red: Color::Rgb(248, 81, 73),       // #F85149

            gray: Color::Rgb(128, 128, 128),
        }
    }
}

impl DashboardTheme {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Column Colors
    // ─────────────────────────────────────────────────────────────────────

    pub fn column_color(&self, column: Column) -> Color {
        match column {
            Column::New => self.amber,
            Column::Pending => self.violet,
            Column::InProgress => self.cyan,
        }
    }

    pub fn column_border(&self, column: Column, focused: bool) -> Style {
        let style = Style::default().fg(self.column_color(column));
        if focused {
            style.add_modifier(Modifier::BOLD)
        } else {
            style
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Styles
    // ─────────────────────────────────────────────────────────────────────

    pub fn text(&self) -> Style {
        Style::default().fg(self.white)
    }

    pub fn dimmed(&self) -> Style {
        Style::default().fg(self.gray)
    }

    pub fn header(&self) -> Style {
        Style::default().fg(self.violet).add_modifier(Modifier::BOLD)
    }

    pub fn accent(&self) -> Style {
        Style::default().fg(self.amber)
    }

    pub fn highlight(&self) -> Style {
        Style::default().fg(self.cyan).add_modifier(Modifier::BOLD)
    }

    pub fn success(&self) -> Style {
        Style::default().fg(self.success_green)
    }

    pub fn warning(&self) -> Style {
        Style::default().fg(self.warning_orange)
    }

    pub fn error(&self) -> Style {
        Style::default()
            .fg(self.error_red)
            .add_modifier(Modifier::BOLD)
    }

    /// Selected card
    pub fn selected(&self) -> Style {
        Style::default()
            .fg(self.white)
            .add_modifier(Modifier::REVERSED)
    }

    /// Notification banner
    pub fn banner(&self) -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(self.amber)
            .add_modifier(Modifier::BOLD)
    }

    pub fn upload_style(&self, state: &UploadState) -> Style {
        match state {
            UploadState::Idle => self.dimmed(),
            UploadState::Uploading | UploadState::Polling => self.warning(),
            UploadState::Finished => self.success(),
            UploadState::Failed { .. } => self.error(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Icons and Symbols
// ─────────────────────────────────────────────────────────────────────────────

/// UI Icons used throughout the TUI
pub mod icons {
    pub const APP: &str = "◉";
    pub const CARD: &str = "▣";
    pub const WORKER: &str = "◆";
    pub const NEW_MESSAGE: &str = "✉";
    pub const REFRESH: &str = "⟳";
    pub const UPLOAD: &str = "⇪";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_defaults() {
        let theme = DashboardTheme::new();
        assert_eq!(theme.violet, Color::Rgb(138, 43, 226));
        assert_eq!(theme.amber, Color::Rgb(255, 191, 0));
    }

    #[test]
    fn test_column_colors_distinct() {
        let theme = DashboardTheme::new();
        assert_ne!(
            theme.column_color(Column::New),
            theme.column_color(Column::Pending)
        );
        assert_eq!(theme.column_color(Column::InProgress), theme.cyan);
    }

    #[test]
    fn test_upload_styles() {
        let theme = DashboardTheme::new();
        assert_eq!(theme.upload_style(&UploadState::Finished), theme.success());
        assert_eq!(
            theme.upload_style(&UploadState::Failed {
                reason: "x".into()
            }),
            theme.error()
        );
    }
}
