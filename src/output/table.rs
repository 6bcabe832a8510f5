//! Table output formatting

use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Rows},
};

const EMPTY: &str = "No results found.";

/// Format data as a table
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return EMPTY.to_string();
    }

    let mut table = Table::new(data);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

/// Borderless table for reading in a terminal
pub fn format_pretty<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return EMPTY.to_string();
    }

    let mut table = Table::new(data);
    table.with(Style::blank());

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Tabled)]
    struct StoryRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "DESCRIPTION")]
        description: String,
    }

    fn rows() -> Vec<StoryRow> {
        vec![
            StoryRow {
                id: "story-1".to_string(),
                description: "Morning market".to_string(),
            },
            StoryRow {
                id: "temp-2".to_string(),
                description: "Written offline".to_string(),
            },
        ]
    }

    #[test]
    fn test_format_table_empty() {
        let items: Vec<StoryRow> = vec![];
        assert_eq!(format_table(&items), "No results found.");
        assert_eq!(format_pretty(&items), "No results found.");
    }

    #[test]
    fn test_format_table_rows() {
        let result = format_table(&rows());

        assert!(result.contains("ID"));
        assert!(result.contains("DESCRIPTION"));
        assert!(result.contains("Morning market"));
        assert!(result.contains("temp-2"));
    }

    #[test]
    fn test_format_table_uses_rounded_style() {
        let result = format_table(&rows());

        // Rounded style uses ╭ for top-left corner
        assert!(result.contains("╭"));
        assert!(result.contains("╰"));
    }

    #[test]
    fn test_format_pretty_has_no_borders() {
        let result = format_pretty(&rows());

        assert!(result.contains("Written offline"));
        assert!(!result.contains("╭"));
        assert!(!result.contains('|'));
    }
}
