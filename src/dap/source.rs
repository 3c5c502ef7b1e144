use crate::error::Error;
use std::path::{Path, PathBuf};

/// Text of a debugged file, one entry per line.
#[derive(Debug, Default, Clone)]
pub struct SourceLines(Vec<String>);

impl SourceLines {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ReadSource {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_text(&text))
    }

    pub fn from_text(text: &str) -> Self {
        Self(text.lines().map(ToString::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, line: usize) -> Option<&str> {
        self.0.get(line).map(String::as_str)
    }

    /// Trimmed text of a line, `None` past the end of file.
    pub fn trimmed(&self, line: usize) -> Option<&str> {
        self.get(line).map(str::trim)
    }
}

/// Client <-> adapter line numbering. The adapter counts from 0, clients
/// count from 1 unless they said otherwise in `initialize`.
#[derive(Debug, Clone, Copy)]
pub struct LineBase {
    start_at1: bool,
}

impl Default for LineBase {
    fn default() -> Self {
        Self { start_at1: true }
    }
}

impl LineBase {
    pub fn new(start_at1: bool) -> Self {
        Self { start_at1 }
    }

    fn offset(&self) -> i64 {
        i64::from(self.start_at1)
    }

    /// `None` when the client line is before the first line.
    pub fn to_internal(&self, client_line: i64) -> Option<usize> {
        client_line
            .checked_sub(self.offset())
            .and_then(|line| usize::try_from(line).ok())
    }

    pub fn to_client(&self, line: usize) -> i64 {
        i64::try_from(line)
            .unwrap_or(i64::MAX)
            .saturating_add(self.offset())
    }
}

/// Key under which breakpoints of a file are stored: the canonical path if
/// the file exists, the path as sent otherwise.
pub fn source_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_lines() {
        let src = SourceLines::from_text("start\r\n\n  lazy_bp  \nend\n");
        assert_eq!(src.len(), 4);
        assert_eq!(src.get(0), Some("start"));
        assert_eq!(src.get(1), Some(""));
        assert_eq!(src.trimmed(2), Some("lazy_bp"));
        assert_eq!(src.get(4), None);
    }

    #[test]
    fn test_line_base() {
        let one = LineBase::default();
        assert_eq!(one.to_internal(1), Some(0));
        assert_eq!(one.to_internal(0), None);
        assert_eq!(one.to_client(4), 5);

        let zero = LineBase::new(false);
        assert_eq!(zero.to_internal(0), Some(0));
        assert_eq!(zero.to_client(4), 4);
    }

    #[test]
    fn test_line_base_extremes() {
        let one = LineBase::default();
        assert_eq!(one.to_internal(i64::MIN), None);
        assert_eq!(one.to_internal(-1), None);
        assert_eq!(one.to_internal(i64::MAX), Some((i64::MAX - 1) as usize));
        assert_eq!(one.to_client(usize::MAX), i64::MAX);

        let zero = LineBase::new(false);
        assert_eq!(zero.to_internal(i64::MIN), None);
        assert_eq!(zero.to_client(usize::MAX), i64::MAX);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SourceLines::load(Path::new("/definitely/not/here.tab")).unwrap_err();
        assert!(matches!(err, Error::ReadSource { .. }));
    }
}
