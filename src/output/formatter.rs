/// Implements the line formats names are reported in
use crate::requests::DiscoveredName;
use colored::*;
use std::fmt;

/// Formatter trait for turning a discovered name into one output line
pub trait Formatter: fmt::Debug + Send + Sync {
    /// Format a discovered name, trailing newline included
    fn format(&self, name: &DiscoveredName) -> String;
}

/// Plain text formatter that outputs one name per line
#[derive(Debug, Clone)]
pub struct PlainFormatter {
    show_source: bool,
    color: bool,
}

impl PlainFormatter {
    pub fn new(show_source: bool, color: bool) -> Self {
        PlainFormatter { show_source, color }
    }
}

impl Formatter for PlainFormatter {
    fn format(&self, name: &DiscoveredName) -> String {
        if !self.show_source {
            return format!("{}\n", name.name);
        }

        let annotation = format!("[{}/{}]", name.tag, name.source);
        if self.color {
            format!("{} {}\n", name.name, annotation.cyan())
        } else {
            format!("{} {}\n", name.name, annotation)
        }
    }
}

/// JSON Lines formatter: one object per name
#[derive(Debug, Clone)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        JsonFormatter
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, name: &DiscoveredName) -> String {
        match serde_json::to_string(name) {
            Ok(json) => format!("{}\n", json),
            Err(_) => format!("{{\"name\":\"{}\"}}\n", name.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered() -> DiscoveredName {
        DiscoveredName {
            name: "www.example.com".to_string(),
            domain: "example.com".to_string(),
            tag: "archive".to_string(),
            source: "Wayback".to_string(),
        }
    }

    #[test]
    fn test_plain_formatter() {
        let formatter = PlainFormatter::new(false, true);
        assert_eq!(formatter.format(&discovered()), "www.example.com\n");
    }

    #[test]
    fn test_plain_formatter_with_source() {
        let formatter = PlainFormatter::new(true, false);
        assert_eq!(
            formatter.format(&discovered()),
            "www.example.com [archive/Wayback]\n"
        );

        // Colored output still carries the text; ANSI codes depend on the terminal
        let colored = PlainFormatter::new(true, true).format(&discovered());
        assert!(colored.starts_with("www.example.com "));
        assert!(colored.contains("archive/Wayback"));
    }

    #[test]
    fn test_json_formatter() {
        let line = JsonFormatter::new().format(&discovered());
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["name"], "www.example.com");
        assert_eq!(value["domain"], "example.com");
        assert_eq!(value["tag"], "archive");
        assert_eq!(value["source"], "Wayback");
    }
}
