use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::{create_formatter, Formatter};
use crate::requests::DiscoveredName;

/// Streams formatted names to stdout or a file as they are found
pub struct NameWriter {
    formatter: Box<dyn Formatter>,
    sink: Box<dyn Write + Send>,
    written: usize,
}

impl NameWriter {
    pub fn stdout(format: &str, show_source: bool) -> Self {
        NameWriter::new(
            create_formatter(format, show_source, true),
            Box::new(io::stdout()),
        )
    }

    pub fn file(path: &Path, format: &str, show_source: bool) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(NameWriter::new(
            create_formatter(format, show_source, false),
            Box::new(BufWriter::new(file)),
        ))
    }

    pub fn new(formatter: Box<dyn Formatter>, sink: Box<dyn Write + Send>) -> Self {
        NameWriter {
            formatter,
            sink,
            written: 0,
        }
    }

    pub fn write(&mut self, name: &DiscoveredName) -> Result<()> {
        let line = self.formatter.format(name);
        self.sink
            .write_all(line.as_bytes())
            .context("Failed to write output")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(&mut self) -> Result<()> {
        self.sink.flush().context("Failed to flush output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn name(n: &str) -> DiscoveredName {
        DiscoveredName {
            name: n.to_string(),
            domain: "example.com".to_string(),
            tag: "archive".to_string(),
            source: "LoCArchive".to_string(),
        }
    }

    #[test]
    fn test_writes_one_line_per_name() {
        let buf = SharedBuf::default();
        let mut writer = NameWriter::new(create_formatter("plain", false, false), Box::new(buf.clone()));
        writer.write(&name("a.example.com")).unwrap();
        writer.write(&name("b.example.com")).unwrap();
        writer.finish().unwrap();

        assert_eq!(writer.written(), 2);
        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "a.example.com\nb.example.com\n");
    }

    #[test]
    fn test_file_writer_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("names.jsonl");

        let mut writer = NameWriter::file(&path, "json", false).unwrap();
        writer.write(&name("a.example.com")).unwrap();
        writer.write(&name("b.example.com")).unwrap();
        writer.finish().unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["name"], "a.example.com");
        assert_eq!(first["source"], "LoCArchive");
    }

    #[test]
    fn test_file_writer_reports_bad_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("names.txt");
        assert!(NameWriter::file(&path, "plain", false).is_err());
    }
}
