use crate::zedc::parser::Rule;
use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

/// Byte span `[first, last)` into the concatenated text of a
/// [`SourceSet`](super::source_set::SourceSet).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub first: usize,
    pub last: usize,
}

impl Loc {
    pub fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }

    /// Returns the byte range for use with ariadne.
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.first..self.last
    }

    /// The smallest span covering both.
    pub fn to(self, other: Loc) -> Loc {
        Loc::new(self.first.min(other.first), self.last.max(other.last))
    }
}

pub trait HasLoc {
    fn loc(&self) -> Loc;
}

impl<'a> HasLoc for Pair<'a, Rule> {
    fn loc(&self) -> Loc {
        let span = self.as_span();
        Loc::new(span.start(), span.end())
    }
}
