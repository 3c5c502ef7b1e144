use itertools::Either;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Single execution position over the source lines.
///
/// `None` means execution has not reached any line yet, a forward scan
/// then starts at the first line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    line: Option<usize>,
}

impl Cursor {
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn set(&mut self, line: usize) {
        self.line = Some(line);
    }

    pub fn reset(&mut self) {
        self.line = None;
    }

    /// Lines a scan visits, in visiting order, for a file of `len` lines.
    /// The current line itself is never a candidate.
    pub fn candidates(&self, direction: Direction, len: usize) -> impl Iterator<Item = usize> {
        match direction {
            Direction::Forward => {
                let from = self.line.map_or(0, |line| line + 1);
                Either::Left(from..len)
            }
            Direction::Backward => {
                let to = self.line.unwrap_or(0).min(len);
                Either::Right((0..to).rev())
            }
        }
    }
}
