use crate::domain::project::ensure_directory;
use crate::domain::{LasifError, LasifResult};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const RULE: &str = "--------------------------------------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    All,
    Selected(usize),
}

/// Header block written once per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LogHeader {
    pub title: String,
    pub event_scope: EventScope,
    pub origin_time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub components: Vec<String>,
    pub extra_lines: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl LogHeader {
    pub fn new(title: impl Into<String>, event_scope: EventScope) -> Self {
        Self {
            title: title.into(),
            event_scope,
            origin_time_range: None,
            components: Vec::new(),
            extra_lines: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn render(&self) -> String {
        let mut lines = vec![RULE.to_string(), self.title.clone()];
        lines.push(match self.event_scope {
            EventScope::All => "\tfor all events in the database".to_string(),
            EventScope::Selected(count) => format!("\tfor {} events in the database", count),
        });
        if let Some((first, last)) = self.origin_time_range {
            lines.push(format!(
                "\twith origin times from {} to {}",
                first.to_rfc3339_opts(SecondsFormat::Secs, true),
                last.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        if !self.components.is_empty() {
            lines.push("\tfor components:".to_string());
            lines.extend(self.components.iter().map(|component| format!("\t\t\t{}", component)));
        }
        lines.extend(self.extra_lines.iter().map(|line| format!("\t{}", line)));
        lines.push(format!(
            "\tstarted at {}",
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        lines.push(RULE.to_string());

        let mut rendered = lines.join("\n");
        rendered.push('\n');
        rendered
    }
}

/// Append-only text log of one workflow step.
#[derive(Debug, Clone)]
pub struct ProcessingLog {
    path: PathBuf,
}

impl ProcessingLog {
    pub fn open(path: impl AsRef<Path>) -> LasifResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            ensure_directory(parent, "IO.LOG_FOLDER")?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_header(&self, header: &LogHeader) -> LasifResult<()> {
        self.append(&header.render())
    }

    /// One line per processed item.
    pub fn record(&self, name: &str, result: &LasifResult<()>) -> LasifResult<()> {
        let line = match result {
            Ok(()) => format!("{} -- processed\n", name),
            Err(error) => format!("{} -- failed: {}\n", name, error.diagnostic_line()),
        };
        self.append(&line)
    }

    fn append(&self, content: &str) -> LasifResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        file.write_all(content.as_bytes())
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> LasifError {
        LasifError::io_system(
            "IO.PROCESSING_LOG",
            format!("failed to append to '{}': {}", self.path.display(), source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{EventScope, LogHeader, ProcessingLog};
    use crate::domain::LasifError;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn header_lists_scope_range_and_components() {
        let mut header = LogHeader::new("Processing info for iteration 1", EventScope::Selected(2));
        header.origin_time_range = Some((
            Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2011, 6, 30, 12, 0, 0).unwrap(),
        ));
        header.components = vec!["Z".to_string(), "R".to_string()];
        header.started_at = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();

        let rendered = header.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], lines[lines.len() - 1]);
        assert!(lines[0].chars().all(|c| c == '-'));
        assert_eq!(lines[1], "Processing info for iteration 1");
        assert_eq!(lines[2], "\tfor 2 events in the database");
        assert_eq!(
            lines[3],
            "\twith origin times from 2010-01-01T00:00:00Z to 2011-06-30T12:00:00Z"
        );
        assert_eq!(lines[4], "\tfor components:");
        assert_eq!(lines[5], "\t\t\tZ");
        assert_eq!(lines[6], "\t\t\tR");
        assert_eq!(lines[7], "\tstarted at 2024-02-03T04:05:06Z");
    }

    #[test]
    fn log_is_appended_across_invocations() {
        let temp = TempDir::new().expect("tempdir should be created");
        let log = ProcessingLog::open(temp.path().join("LOGS/DATA_PREPROCESSING/run.log"))
            .expect("log should open");

        log.write_header(&LogHeader::new("first", EventScope::All))
            .expect("header should be written");
        log.record("EV -- IU.ANMO", &Ok(())).expect("record should be written");
        log.record(
            "EV -- IU.COLA",
            &Err(LasifError::not_found("DATA.WAVEFORMS", "no data")),
        )
        .expect("record should be written");
        log.write_header(&LogHeader::new("second", EventScope::All))
            .expect("header should be written");

        let content = fs::read_to_string(log.path()).expect("log should be readable");
        assert!(content.contains("EV -- IU.ANMO -- processed\n"));
        assert!(content.contains("EV -- IU.COLA -- failed: ERROR: [DATA.WAVEFORMS] no data\n"));
        assert!(content.find("first").expect("first header") < content.find("second").expect("second header"));
    }
}
