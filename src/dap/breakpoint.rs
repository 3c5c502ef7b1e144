use crate::dap::source::{LineBase, SourceLines};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Marks a line whose breakpoint is accepted unverified and verified on first hit.
const LAZY_MARKER: &str = "lazy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub id: i64,
    pub verified: bool,
    /// Client-facing line number.
    pub line: i64,
}

/// Result of execution reaching a breakpoint line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointHit {
    pub id: i64,
    /// Set when this hit verified a lazy breakpoint.
    pub verified_now: Option<Breakpoint>,
}

/// Decide where a breakpoint requested at (zero-based) `line` actually sits
/// and whether it is verified.
///
/// Empty and `+` lines push the breakpoint one line down, then a `-` line
/// (checked at the possibly shifted position) pulls it one line up. A
/// breakpoint on a line mentioning `lazy` stays unverified, so does any
/// breakpoint outside the file.
pub fn place(lines: &SourceLines, line: usize) -> (usize, bool) {
    let Some(text) = lines.trimmed(line) else {
        return (line, false);
    };

    let mut line = line;
    if text.is_empty() || text.starts_with('+') {
        line += 1;
    }
    if lines.trimmed(line).is_some_and(|text| text.starts_with('-')) {
        line = line.saturating_sub(1);
    }

    let verified = lines
        .get(line)
        .is_some_and(|text| !text.contains(LAZY_MARKER));
    (line, verified)
}

/// Breakpoints of every source file, for one debug session.
#[derive(Debug)]
pub struct BreakpointTable {
    next_id: i64,
    by_source: HashMap<PathBuf, Vec<Breakpoint>>,
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self {
            next_id: Self::FIRST_ID,
            by_source: HashMap::new(),
        }
    }
}

impl BreakpointTable {
    pub const FIRST_ID: i64 = 1000;

    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Replace all breakpoints of `source` with ones at `client_lines`.
    /// Return the new breakpoints in request order.
    pub fn set(
        &mut self,
        source: PathBuf,
        lines: &SourceLines,
        client_lines: &[i64],
        base: LineBase,
    ) -> Vec<Breakpoint> {
        let mut breakpoints = Vec::with_capacity(client_lines.len());
        for &client_line in client_lines {
            let (line, verified) = match base.to_internal(client_line) {
                Some(line) => {
                    let (line, verified) = place(lines, line);
                    (base.to_client(line), verified)
                }
                None => (client_line, false),
            };
            breakpoints.push(Breakpoint {
                id: self.next_id(),
                verified,
                line,
            });
        }

        self.by_source.insert(source, breakpoints.clone());
        breakpoints
    }

    pub fn get(&self, source: &Path) -> &[Breakpoint] {
        self.by_source
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Register that execution reached `client_line` of `source`. Verifies
    /// the matching breakpoint if it was still unverified.
    pub fn hit(&mut self, source: &Path, client_line: i64) -> Option<BreakpointHit> {
        let bp = self
            .by_source
            .get_mut(source)?
            .iter_mut()
            .find(|bp| bp.line == client_line)?;

        let verified_now = (!bp.verified).then(|| {
            bp.verified = true;
            bp.clone()
        });
        Some(BreakpointHit {
            id: bp.id,
            verified_now,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scenario() -> SourceLines {
        SourceLines::from_text("start\n\nlazy_bp\nexception here\nend")
    }

    #[test]
    fn test_place_plain_line() {
        assert_eq!(place(&scenario(), 0), (0, true));
        assert_eq!(place(&scenario(), 3), (3, true));
    }

    #[test]
    fn test_place_pushes_down_empty_and_plus_lines() {
        let src = SourceLines::from_text("a\n\nb\n+ c\nd");
        assert_eq!(place(&src, 1), (2, true));
        assert_eq!(place(&src, 3), (4, true));
    }

    #[test]
    fn test_place_pulls_up_minus_lines() {
        let src = SourceLines::from_text("a\nb\n- c");
        assert_eq!(place(&src, 2), (1, true));
        let src = SourceLines::from_text("- first");
        assert_eq!(place(&src, 0), (0, true));
    }

    #[test]
    fn test_place_minus_is_checked_after_push_down() {
        let src = SourceLines::from_text("a\n+ b\n- c\nd");
        assert_eq!(place(&src, 1), (1, true));
    }

    #[test]
    fn test_place_lazy_and_out_of_range() {
        assert_eq!(place(&scenario(), 2), (2, false));
        assert_eq!(place(&scenario(), 1), (2, false));
        assert_eq!(place(&scenario(), 10), (10, false));
        assert_eq!(place(&SourceLines::from_text("a\n   "), 1), (2, false));
    }

    #[test]
    fn test_set_replaces_and_keeps_ids_growing() {
        let mut table = BreakpointTable::default();
        let src = scenario();
        let path = PathBuf::from("/prog.tab");

        let first = table.set(path.clone(), &src, &[1, 2, 3], LineBase::default());
        assert_eq!(
            first,
            vec![
                Breakpoint { id: 1000, verified: true, line: 1 },
                Breakpoint { id: 1001, verified: false, line: 3 },
                Breakpoint { id: 1002, verified: false, line: 3 },
            ]
        );

        let second = table.set(path.clone(), &src, &[1, 2, 3], LineBase::default());
        assert_eq!(second.iter().map(|bp| bp.id).collect::<Vec<_>>(), vec![1003, 1004, 1005]);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!((a.line, a.verified), (b.line, b.verified));
        }
        assert_eq!(table.get(&path), second.as_slice());

        let other = table.set(PathBuf::from("/other.tab"), &src, &[5], LineBase::default());
        assert_eq!(other[0].id, 1006);
        assert_eq!(table.get(&path).len(), 3);

        table.set(path.clone(), &src, &[], LineBase::default());
        assert!(table.get(&path).is_empty());
    }

    #[test]
    fn test_set_line_before_file_start() {
        let mut table = BreakpointTable::default();
        let bps = table.set(
            PathBuf::from("/prog.tab"),
            &scenario(),
            &[0],
            LineBase::default(),
        );
        assert_eq!(bps[0].line, 0);
        assert!(!bps[0].verified);
    }

    #[test]
    fn test_hit_verifies_lazy_breakpoint_once() {
        let mut table = BreakpointTable::default();
        let path = PathBuf::from("/prog.tab");
        table.set(path.clone(), &scenario(), &[3], LineBase::default());

        assert_eq!(table.hit(&path, 2), None);
        assert_eq!(table.hit(Path::new("/elsewhere.tab"), 3), None);

        let hit = table.hit(&path, 3).unwrap();
        assert_eq!(
            hit.verified_now,
            Some(Breakpoint { id: 1000, verified: true, line: 3 })
        );
        let again = table.hit(&path, 3).unwrap();
        assert_eq!(again.id, 1000);
        assert_eq!(again.verified_now, None);
    }
}
