//! The concatenated program text and the per-file line tables used to map
//! byte offsets back to file, line and column.

use serde::{Deserialize, Serialize};

/// One named fragment of a [`SourceSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub filename: String,
    /// Offset of this fragment within the concatenated text.
    pub start: usize,
    pub len: usize,
    /// Offsets of each line start, relative to `start`.
    lines: Vec<usize>,
}

impl Source {
    fn new(filename: String, start: usize, text: &str) -> Self {
        let mut lines = vec![0];
        lines.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            filename,
            start,
            len: text.len(),
            lines,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A resolved source position. `line` and `column` are 1-based; every field
/// is negative when the position is not within the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub pos: i64,
    pub offset: i64,
    pub line: i64,
    pub column: i64,
}

impl Position {
    pub fn invalid() -> Self {
        Self {
            pos: -1,
            offset: -1,
            line: -1,
            column: -1,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.pos >= 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    pub text: String,
    pub sources: Vec<Source>,
}

impl SourceSet {
    /// Concatenates `(filename, text)` fragments in order. Fragments are
    /// separated by a newline so that no token spans two files.
    pub fn new<I, F, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = (F, T)>,
        F: Into<String>,
        T: AsRef<str>,
    {
        let mut set = SourceSet::default();
        for (filename, text) in fragments {
            set.push(filename.into(), text.as_ref());
        }
        set
    }

    /// A set holding a single unnamed query.
    pub fn from_query(text: &str) -> Self {
        Self::new([("", text)])
    }

    pub fn push(&mut self, filename: String, text: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        let start = self.text.len();
        self.text.push_str(text);
        self.sources.push(Source::new(filename, start, text));
    }

    /// The fragment containing byte `pos`. The end offset of the last
    /// fragment belongs to it so end-of-input errors still resolve.
    pub fn source_of(&self, pos: usize) -> Option<&Source> {
        let idx = self.sources.partition_point(|s| s.start <= pos);
        let src = self.sources.get(idx.checked_sub(1)?)?;
        (pos <= src.end()).then_some(src)
    }

    pub fn position(&self, pos: usize) -> Position {
        let Some(src) = self.source_of(pos) else {
            return Position::invalid();
        };
        let offset = pos - src.start;
        let line = src.lines.partition_point(|&l| l <= offset);
        let line_start = src.lines[line - 1];
        let column = self.text[src.start + line_start..pos].chars().count() + 1;
        Position {
            pos: pos as i64,
            offset: offset as i64,
            line: line as i64,
            column: column as i64,
        }
    }

    /// The full text of the line containing `pos`, without its newline.
    pub fn line_of(&self, pos: usize) -> Option<&str> {
        let src = self.source_of(pos)?;
        let offset = pos - src.start;
        let line = src.lines.partition_point(|&l| l <= offset);
        let begin = src.start + src.lines[line - 1];
        let end = src
            .lines
            .get(line)
            .map(|&next| src.start + next - 1)
            .unwrap_or(src.end());
        self.text.get(begin..end.max(begin))
    }

    /// Renders `msg` with the file, line and column of `pos`, the offending
    /// line, and a caret. When `end` is known the span is underlined with `~`.
    pub fn render(&self, msg: &str, pos: usize, end: Option<usize>) -> String {
        let p = self.position(pos);
        let (Some(src), Some(line)) = (self.source_of(pos), self.line_of(pos)) else {
            return msg.to_string();
        };
        let prefix = if src.filename.is_empty() {
            String::new()
        } else {
            format!("{}: ", src.filename)
        };
        let indent = " ".repeat((p.column - 1).max(0) as usize);
        let marker = match end {
            Some(end) if end > pos => {
                let line_end_col = line.chars().count() as i64 + 1;
                let width = (self.position(end).column.min(line_end_col) - p.column).max(1);
                "~".repeat(width as usize)
            }
            _ => "^".to_string(),
        };
        format!(
            "{msg} ({prefix}line {}, column {}):\n{line}\n{indent}{marker}",
            p.line, p.column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn positions_across_files() {
        let set = SourceSet::new([("a.zed", "const x = 1\nconst y = 2"), ("", "yield x")]);
        let src = set.source_of(0).unwrap();
        assert_eq!(src.filename, "a.zed");
        let p = set.position(12);
        assert_eq!((p.line, p.column, p.offset), (2, 1, 12));
        let q = set.position(set.text.len() - 1);
        assert_eq!(set.source_of(set.text.len() - 1).unwrap().filename, "");
        assert_eq!((q.line, q.column), (1, 7));
        assert_eq!(set.line_of(14), Some("const y = 2"));
        assert!(!set.position(10_000).is_valid());
    }

    #[test]
    fn renders_caret_and_span() {
        let set = SourceSet::from_query("head -1");
        assert_eq!(
            set.render("bad", 5, None),
            "bad (line 1, column 6):\nhead -1\n     ^"
        );
        assert_eq!(
            set.render("bad", 5, Some(7)),
            "bad (line 1, column 6):\nhead -1\n     ~~"
        );
    }

    proptest! {
        #[test]
        fn positions_are_in_bounds(text in "[a-z \\n]{0,64}", pos in 0usize..80) {
            let set = SourceSet::from_query(&text);
            let p = set.position(pos);
            if pos <= text.len() {
                prop_assert!(p.line >= 1 && p.column >= 1);
            } else {
                prop_assert!(!p.is_valid());
            }
        }
    }
}
