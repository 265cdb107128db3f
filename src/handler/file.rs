//! The file handler.
//!
//! Appends or truncates a log file and writes one physical line per logical
//! line of each record, in the
//! `timestamp pid:tid@rank [L] logger file:func:line message` format. The
//! path `-` selects standard output instead of a file.

use crate::{
    error::Result,
    filter::FilterSet,
    handler::Handler,
    record::Record,
};
use std::{
    fs::OpenOptions,
    io,
    io::{BufWriter, Write},
};

/// How to open the log file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// Keep existing content, write at the end.
    Append,
    /// Discard existing content.
    Truncate,
}

/// Parameters of the file handler.
#[derive(Clone, Debug, PartialEq)]
pub struct FileConfig {
    /// Program basename, used to identify this sink in diagnostics.
    pub basename: String,
    /// Target path; `-` means standard output.
    pub path: String,
    pub open_mode: OpenMode,
}

enum FileSink {
    Stdout(io::Stdout),
    File(BufWriter<std::fs::File>),
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileSink::Stdout(out) => out.write(buf),
            FileSink::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileSink::Stdout(out) => out.flush(),
            FileSink::File(file) => file.flush(),
        }
    }
}

/// File sink.
pub struct FileHandler {
    name: String,
    filters: FilterSet,
    config: FileConfig,
    sink: Option<FileSink>,
}

impl FileHandler {
    pub fn new(name: impl Into<String>, filters: FilterSet, config: FileConfig) -> FileHandler {
        FileHandler {
            name: name.into(),
            filters,
            config,
            sink: None,
        }
    }

    pub fn basename(&self) -> &str {
        &self.config.basename
    }

    /// Strong drain: flush the buffer and push file content to storage.
    fn sync(&mut self) -> Result<()> {
        match self.sink.as_mut() {
            Some(FileSink::Stdout(out)) => out.flush()?,
            Some(FileSink::File(file)) => {
                file.flush()?;
                file.get_ref().sync_data()?;
            }
            None => {}
        }
        Ok(())
    }
}

impl Handler for FileHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn filters(&self) -> &FilterSet {
        &self.filters
    }

    fn init(&mut self) -> Result<()> {
        let sink = if self.config.path == "-" {
            FileSink::Stdout(io::stdout())
        } else {
            let mut options = OpenOptions::new();
            options.create(true).write(true);
            match self.config.open_mode {
                OpenMode::Append => options.append(true),
                OpenMode::Truncate => options.truncate(true),
            };
            FileSink::File(BufWriter::new(options.open(&self.config.path)?))
        };
        self.sink = Some(sink);
        Ok(())
    }

    fn process_log(&mut self, record: &Record) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            writeln!(sink, "{}", record)?;
        }
        Ok(())
    }

    fn process_implicit_flush(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    fn process_explicit_flush(&mut self) -> Result<()> {
        self.sync()
    }

    fn process_exit(&mut self) -> Result<()> {
        let result = self.sync();
        // Closes the file, also after a failed sync.
        self.sink = None;
        result
    }

    fn process_cfg(&mut self, filters: FilterSet) -> Result<()> {
        self.filters = filters;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use std::time::SystemTime;

    fn config(path: &str, mode: OpenMode) -> FileConfig {
        FileConfig {
            basename: "test".to_string(),
            path: path.to_string(),
            open_mode: mode,
        }
    }

    fn record(payload: &str) -> Record {
        Record::new(
            "a.b",
            payload,
            Level::Info,
            SystemTime::now(),
            10,
            11,
            0,
            "main.rs",
            "app",
            7,
        )
    }

    #[test]
    fn writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");
        let mut handler = FileHandler::new(
            "file:test",
            FilterSet::new(),
            config(path.to_str().unwrap(), OpenMode::Truncate),
        );
        handler.init().unwrap();
        handler.process_log(&record("hello 7")).unwrap();
        handler.process_explicit_flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[I] a.b main.rs:app:7 hello 7"));
        handler.process_exit().unwrap();
    }

    #[test]
    fn multi_line_payloads_become_physical_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");
        let mut handler = FileHandler::new(
            "file:test",
            FilterSet::new(),
            config(path.to_str().unwrap(), OpenMode::Truncate),
        );
        handler.init().unwrap();
        handler.process_log(&record("one\ntwo")).unwrap();
        handler.process_exit().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        for line in content.lines() {
            assert!(line.contains("[I] a.b"));
        }
    }

    #[test]
    fn append_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");
        std::fs::write(&path, "existing\n").unwrap();
        let mut handler = FileHandler::new(
            "file:test",
            FilterSet::new(),
            config(path.to_str().unwrap(), OpenMode::Append),
        );
        handler.init().unwrap();
        handler.process_log(&record("appended")).unwrap();
        handler.process_exit().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("existing\n"));
        assert!(content.lines().last().unwrap().ends_with("appended"));
    }

    #[test]
    fn truncate_discards_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");
        std::fs::write(&path, "existing\n").unwrap();
        let mut handler = FileHandler::new(
            "file:test",
            FilterSet::new(),
            config(path.to_str().unwrap(), OpenMode::Truncate),
        );
        handler.init().unwrap();
        handler.process_exit().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn init_failure_is_isolated_and_destroy_safe() {
        let mut handler = FileHandler::new(
            "file:test",
            FilterSet::new(),
            config("/nonexistent-dir/t.log", OpenMode::Append),
        );
        assert!(handler.init().is_err());
        // Exit after a failed init must be safe.
        handler.process_exit().unwrap();
    }
}
