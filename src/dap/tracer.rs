use anyhow::Context;
use serde_json::Value;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use strum_macros::Display;

/// Direction of a traced protocol message, as seen from the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Flow {
    #[strum(serialize = "<-")]
    Inbound,
    #[strum(serialize = "->")]
    Outbound,
}

/// Append-only log file shared by every session of an adapter process.
///
/// Protocol messages are written as `<- {json}` / `-> {json}`, adapter
/// notes as `# text`, one per line.
#[derive(Clone)]
pub struct FileTracer {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl FileTracer {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn note(&self, text: &str) {
        self.write(format_args!("# {text}"));
    }

    pub fn message(&self, flow: Flow, message: &Value) {
        self.write(format_args!("{flow} {message}"));
    }

    fn write(&self, line: fmt::Arguments) {
        if let Ok(mut file) = self.file.lock() {
            if let Err(err) = writeln!(file, "{line}") {
                log::debug!(target: "dap", "trace to {} failed: {err}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trace_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dap.log");

        let tracer = FileTracer::open(&path).unwrap();
        tracer.note("client connected");
        tracer.message(Flow::Inbound, &json!({"seq": 1}));
        tracer.clone().message(Flow::Outbound, &json!({"seq": 2}));

        let reopened = FileTracer::open(&path).unwrap();
        reopened.note("again");
        assert_eq!(reopened.path(), path);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "# client connected\n<- {\"seq\":1}\n-> {\"seq\":2}\n# again\n"
        );
    }
}
