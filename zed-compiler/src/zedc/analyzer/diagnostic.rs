use crate::zedc::{
    analyzer::errors::CompileError,
    parser::{location::Loc, source_set::SourceSet},
};
use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};

/// A single diagnostic to be surfaced to a terminal or editor.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub location: Loc,
    pub message: String,
    pub hint: Option<String>,
    pub filepath: Option<String>,
    pub severity: DiagnosticSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Diagnostic {
    pub fn new(
        location: Loc,
        message: impl Into<String>,
        severity: DiagnosticSeverity,
        hint: Option<String>,
    ) -> Self {
        Self {
            location,
            message: message.into(),
            hint,
            filepath: None,
            severity,
        }
    }

    /// An error diagnostic for `e`, or `None` when it has no location.
    pub fn from_error(e: &CompileError, set: &SourceSet) -> Option<Self> {
        let location = e.loc()?;
        let filepath = set
            .source_of(location.first)
            .map(|s| s.filename.clone())
            .filter(|f| !f.is_empty());
        Some(Self {
            location,
            message: e.to_string(),
            hint: hint_for(e),
            filepath,
            severity: DiagnosticSeverity::Error,
        })
    }

    pub fn severity_str(&self) -> &'static str {
        match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Info => "info",
            DiagnosticSeverity::Hint => "hint",
        }
    }

    /// Renders the diagnostic against the fragment of `set` it points into.
    pub fn render(&self, set: &SourceSet) -> String {
        let Some(src) = set.source_of(self.location.first) else {
            return format!("{}: {}", self.severity_str(), self.message);
        };
        let text = &set.text[src.start..src.end()];
        let first = self.location.first - src.start;
        let last = self.location.last.clamp(self.location.first, src.end()) - src.start;
        let id = self
            .filepath
            .clone()
            .unwrap_or_else(|| "query".to_string());
        let kind = match self.severity {
            DiagnosticSeverity::Error => ReportKind::Error,
            DiagnosticSeverity::Warning => ReportKind::Warning,
            DiagnosticSeverity::Info | DiagnosticSeverity::Hint => ReportKind::Advice,
        };
        let mut report = Report::build(kind, (id.clone(), first..last))
            .with_config(
                Config::default()
                    .with_color(false)
                    .with_index_type(IndexType::Byte),
            )
            .with_message(&self.message)
            .with_label(Label::new((id.clone(), first..last)).with_message(&self.message));
        if let Some(hint) = &self.hint {
            report = report.with_help(hint);
        }
        let mut buf = Vec::new();
        if report
            .finish()
            .write((id, Source::from(text)), &mut buf)
            .is_err()
        {
            return format!("{}: {}", self.severity_str(), self.message);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn hint_for(e: &CompileError) -> Option<String> {
    let msg = e.to_string();
    let hint = match e {
        CompileError::Cycle { .. } => "an operator may not invoke itself, directly or indirectly",
        CompileError::Catalog { .. } if msg.contains("without a lake") => {
            "use `file` to read a local path"
        }
        CompileError::Unsupported { .. } if msg.contains("DISTINCT") => {
            "use `uniq` after a `sort` instead"
        }
        CompileError::Shape { .. } if msg.contains("GROUP BY") => {
            "every selected expression must be a GROUP BY key or an aggregation"
        }
        _ => return None,
    };
    Some(hint.to_string())
}
