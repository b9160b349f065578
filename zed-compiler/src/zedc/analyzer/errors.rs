use crate::zedc::{
    eval::EvalError,
    parser::{
        ParserError,
        location::Loc,
        source_set::{Position, SourceSet},
    },
    zson::ZsonError,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Every failure a compilation can report. Variants carrying a `loc` point
/// into the [`SourceSet`] the query was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{msg}")]
    Lexical { msg: String, loc: Option<Loc> },
    #[error("{msg}")]
    Parse { msg: String, loc: Option<Loc> },
    /// Unknown identifier, function, aggregator or type name.
    #[error("{msg}")]
    Name { msg: String, loc: Option<Loc> },
    #[error("{msg}")]
    Type { msg: String, loc: Option<Loc> },
    /// Rename or grouping shapes that do not line up.
    #[error("{msg}")]
    Shape { msg: String, loc: Option<Loc> },
    #[error("{msg}")]
    Eval { msg: String, loc: Option<Loc> },
    /// Pool, branch, commit or metadata lookups against the catalog.
    #[error("{msg}")]
    Catalog { msg: String, loc: Option<Loc> },
    #[error("operator cycle found: {}", .path.join(" -> "))]
    Cycle { path: Vec<String>, loc: Option<Loc> },
    #[error("{msg}")]
    Unsupported { msg: String, loc: Option<Loc> },
    #[error("internal error: {msg}")]
    Internal { msg: String },
    #[error("compilation interrupted")]
    Interrupted,
    #[error("{0}")]
    Io(String),
}

macro_rules! constructors {
    ($($fn:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $fn(msg: impl Into<String>, loc: Loc) -> Self {
                CompileError::$variant {
                    msg: msg.into(),
                    loc: Some(loc),
                }
            }
        )*
    };
}

impl CompileError {
    constructors! {
        parse => Parse,
        name => Name,
        type_error => Type,
        shape => Shape,
        eval => Eval,
        catalog_at => Catalog,
        unsupported => Unsupported,
    }

    /// A catalog failure not tied to a place in the query.
    pub fn catalog(msg: impl Into<String>) -> Self {
        CompileError::Catalog {
            msg: msg.into(),
            loc: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal { msg: msg.into() }
    }

    pub fn loc(&self) -> Option<Loc> {
        match self {
            CompileError::Lexical { loc, .. }
            | CompileError::Parse { loc, .. }
            | CompileError::Name { loc, .. }
            | CompileError::Type { loc, .. }
            | CompileError::Shape { loc, .. }
            | CompileError::Eval { loc, .. }
            | CompileError::Catalog { loc, .. }
            | CompileError::Cycle { loc, .. }
            | CompileError::Unsupported { loc, .. } => *loc,
            CompileError::Internal { .. } | CompileError::Interrupted | CompileError::Io(_) => None,
        }
    }

    /// Attaches `at` unless the error already has a location.
    pub fn or_at(mut self, at: Loc) -> Self {
        match &mut self {
            CompileError::Lexical { loc, .. }
            | CompileError::Parse { loc, .. }
            | CompileError::Name { loc, .. }
            | CompileError::Type { loc, .. }
            | CompileError::Shape { loc, .. }
            | CompileError::Eval { loc, .. }
            | CompileError::Catalog { loc, .. }
            | CompileError::Cycle { loc, .. }
            | CompileError::Unsupported { loc, .. } => {
                loc.get_or_insert(at);
            }
            CompileError::Internal { .. } | CompileError::Interrupted | CompileError::Io(_) => {}
        }
        self
    }

    /// Prefixes the message, as in `head: ...`.
    pub fn context(self, prefix: &str) -> Self {
        let wrap = |msg: String| format!("{prefix}: {msg}");
        match self {
            CompileError::Lexical { msg, loc } => CompileError::Lexical { msg: wrap(msg), loc },
            CompileError::Parse { msg, loc } => CompileError::Parse { msg: wrap(msg), loc },
            CompileError::Name { msg, loc } => CompileError::Name { msg: wrap(msg), loc },
            CompileError::Type { msg, loc } => CompileError::Type { msg: wrap(msg), loc },
            CompileError::Shape { msg, loc } => CompileError::Shape { msg: wrap(msg), loc },
            CompileError::Eval { msg, loc } => CompileError::Eval { msg: wrap(msg), loc },
            CompileError::Catalog { msg, loc } => CompileError::Catalog { msg: wrap(msg), loc },
            CompileError::Unsupported { msg, loc } => {
                CompileError::Unsupported { msg: wrap(msg), loc }
            }
            other => other,
        }
    }

    /// Short name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::Lexical { .. } => "LexicalError",
            CompileError::Parse { .. } => "ParseError",
            CompileError::Name { .. } => "NameError",
            CompileError::Type { .. } => "TypeError",
            CompileError::Shape { .. } => "ShapeError",
            CompileError::Eval { .. } => "EvalError",
            CompileError::Catalog { .. } => "CatalogError",
            CompileError::Cycle { .. } => "CycleError",
            CompileError::Unsupported { .. } => "Unsupported",
            CompileError::Internal { .. } => "Internal",
            CompileError::Interrupted => "Interrupted",
            CompileError::Io(_) => "IoError",
        }
    }

    /// The wire form, when the error has a location inside `set`.
    pub fn localize(&self, set: &SourceSet) -> Option<LocalizedError> {
        let loc = self.loc()?;
        let src = set.source_of(loc.first)?;
        let close = if loc.is_empty() {
            Position::invalid()
        } else {
            set.position(loc.last)
        };
        Some(LocalizedError {
            filename: src.filename.clone(),
            line: set.line_of(loc.first).unwrap_or_default().to_string(),
            open: set.position(loc.first),
            close,
            error: self.to_string(),
        })
    }

    /// The message with file, line, column and a marker under the offending text.
    pub fn render(&self, set: &SourceSet) -> String {
        match self.loc() {
            Some(loc) => {
                let end = (!loc.is_empty()).then_some(loc.last);
                set.render(&self.to_string(), loc.first, end)
            }
            None => self.to_string(),
        }
    }
}

impl From<ParserError> for CompileError {
    fn from(e: ParserError) -> Self {
        match e {
            ParserError::ParseError { msg, loc } => CompileError::Parse {
                msg,
                loc: Some(loc),
            },
            ParserError::LexError(msg) => CompileError::Lexical { msg, loc: None },
        }
    }
}

impl From<ZsonError> for CompileError {
    fn from(e: ZsonError) -> Self {
        if e.is_lexical() {
            CompileError::Lexical {
                msg: e.to_string(),
                loc: None,
            }
        } else {
            CompileError::Type {
                msg: e.to_string(),
                loc: None,
            }
        }
    }
}

impl From<EvalError> for CompileError {
    fn from(e: EvalError) -> Self {
        CompileError::Eval {
            msg: e.to_string(),
            loc: None,
        }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e.to_string())
    }
}

/// The serialized form of a positional error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename = "LocalizedError")]
pub struct LocalizedError {
    pub filename: String,
    pub line: String,
    pub open: Position,
    pub close: Position,
    pub error: String,
}

/// Errors in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(pub Vec<CompileError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, e: CompileError) {
        self.0.push(e);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&CompileError> {
        self.0.first()
    }

    /// `Ok(v)` when nothing was reported.
    pub fn into_result<T>(self, v: T) -> Result<T, ErrorList> {
        if self.is_empty() { Ok(v) } else { Err(self) }
    }

    pub fn render(&self, set: &SourceSet) -> String {
        self.0
            .iter()
            .map(|e| e.render(set))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Display for ErrorList {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

impl From<CompileError> for ErrorList {
    fn from(e: CompileError) -> Self {
        ErrorList(vec![e])
    }
}

impl IntoIterator for ErrorList {
    type Item = CompileError;
    type IntoIter = std::vec::IntoIter<CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cycle_message_lists_the_path() {
        let e = CompileError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
            loc: None,
        };
        assert_eq!(e.to_string(), "operator cycle found: a -> b -> a");
        assert_eq!(e.kind(), "CycleError");
    }

    #[test]
    fn list_joins_with_newlines() {
        let mut list = ErrorList::new();
        list.push(CompileError::name("no such function", Loc::new(0, 1)));
        list.push(CompileError::internal("bad"));
        assert_eq!(list.to_string(), "no such function\ninternal error: bad");
    }

    #[test]
    fn localized_wire_form() {
        let set = SourceSet::new([("q.zed", "yield x\n| head -1")]);
        let e = CompileError::eval("head count must be a positive integer", Loc::new(10, 17));
        let wire = e.localize(&set).unwrap();
        assert_eq!(wire.line, "| head -1");
        assert_eq!((wire.open.line, wire.open.column), (2, 3));
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["kind"], "LocalizedError");
        assert_eq!(json["filename"], "q.zed");
        assert_eq!(json["error"], "head count must be a positive integer");
    }

    #[test]
    fn context_prefixes_and_keeps_location() {
        let e = CompileError::eval("boom", Loc::new(3, 4)).context("tail");
        assert_eq!(e.to_string(), "tail: boom");
        assert_eq!(e.loc(), Some(Loc::new(3, 4)));
        let e = CompileError::catalog("x").or_at(Loc::new(1, 2));
        assert_eq!(e.loc(), Some(Loc::new(1, 2)));
    }
}
