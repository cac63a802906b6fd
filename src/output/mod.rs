mod formatter;
mod writer;

pub use formatter::*;
pub use writer::*;

/// Picks the formatter for an output format name, plain for anything unknown
pub fn create_formatter(format: &str, show_source: bool, color: bool) -> Box<dyn Formatter> {
    match format.to_lowercase().as_str() {
        "json" => Box::new(JsonFormatter::new()),
        _ => Box::new(PlainFormatter::new(show_source, color)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::DiscoveredName;

    fn discovered() -> DiscoveredName {
        DiscoveredName {
            name: "api.example.com".to_string(),
            domain: "example.com".to_string(),
            tag: "archive".to_string(),
            source: "WaybackCDX".to_string(),
        }
    }

    #[test]
    fn test_create_formatter_json_case_insensitive() {
        let line = create_formatter("JSON", false, false).format(&discovered());
        assert!(line.starts_with('{'));
    }

    #[test]
    fn test_create_formatter_default_for_unknown() {
        let line = create_formatter("unknown", false, false).format(&discovered());
        assert_eq!(line, "api.example.com\n");
    }
}
