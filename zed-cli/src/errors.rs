use color_eyre::owo_colors::OwoColorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use zed_compiler::zedc::{analyzer::errors::ErrorList, parser::source_set::SourceSet};

#[derive(Debug, Clone)]
pub enum CliErrorSeverity {
    Error,
    Warning,
}

impl CliErrorSeverity {
    pub fn label(&self) -> &'static str {
        match self {
            CliErrorSeverity::Error => "error",
            CliErrorSeverity::Warning => "warning",
        }
    }

    pub fn color_code<T: AsRef<str>>(&self, text: T) -> String {
        match self {
            CliErrorSeverity::Error => text.as_ref().red().bold().to_string(),
            CliErrorSeverity::Warning => text.as_ref().yellow().bold().to_string(),
        }
    }
}

/// A user-facing failure with optional context lines and a hint.
#[derive(Debug, Clone)]
pub struct CliError {
    pub severity: CliErrorSeverity,
    pub message: String,
    pub context: Option<String>,
    pub hint: Option<String>,
    pub file_path: Option<String>,
    pub caused_by: Option<String>,
}

impl CliError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            severity: CliErrorSeverity::Error,
            message: message.into(),
            context: None,
            hint: None,
            file_path: None,
            caused_by: None,
        }
    }

    pub fn warning<S: Into<String>>(message: S) -> Self {
        Self {
            severity: CliErrorSeverity::Warning,
            ..Self::new(message)
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_file_path<S: Into<String>>(mut self, file_path: S) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_caused_by<S: Into<String>>(mut self, caused_by: S) -> Self {
        self.caused_by = Some(caused_by.into());
        self
    }

    pub fn render(&self) -> String {
        let mut output = String::new();

        let header = format!("{}: {}", self.severity.label(), self.message);
        output.push_str(&self.severity.color_code(header));
        output.push('\n');

        if let Some(file_path) = &self.file_path {
            output.push_str(&format!("  {} {}\n", "-->".blue().bold(), file_path.bold()));
        }

        if let Some(context) = &self.context {
            output.push('\n');
            for line in context.lines() {
                output.push_str(&format!("   {} {}\n", "│".blue().bold(), line));
            }
        }

        if let Some(caused_by) = &self.caused_by {
            output.push('\n');
            output.push_str(&format!(
                "   {} {}: {}\n",
                "│".blue().bold(),
                "caused by".bold(),
                caused_by
            ));
        }

        if let Some(hint) = &self.hint {
            output.push('\n');
            output.push_str(&format!(
                "   {} {}: {}\n",
                "=".blue().bold(),
                "help".bold(),
                hint
            ));
        }

        output
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl std::error::Error for CliError {}

/// Compiler errors rendered against the text they were found in, one
/// located error per block.
pub fn compile_error(errors: &ErrorList, set: &SourceSet) -> CliError {
    let noun = if errors.len() == 1 { "error" } else { "errors" };
    CliError::new(format!("query failed with {} {noun}", errors.len()))
        .with_context(errors.render(set))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read zc.toml at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse zc.toml at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("pool name cannot be empty")]
    EmptyPoolName,
    #[error("pool '{name}' is defined more than once")]
    DuplicatePool { name: String },
    #[error("head pool '{name}' is not a configured pool")]
    UnknownHeadPool { name: String },
    #[error("parallelism must be at least 1")]
    ZeroParallelism,
    #[error("sort key field cannot be empty")]
    EmptySortKey,
}

impl ConfigError {
    pub fn to_cli_error(&self) -> CliError {
        match self {
            ConfigError::Read { path, source } => {
                CliError::new(format!("failed to read zc.toml at {}", path.display()))
                    .with_caused_by(source.to_string())
            }
            ConfigError::Parse { path, source } => {
                CliError::new(format!("failed to parse zc.toml at {}", path.display()))
                    .with_caused_by(source.to_string())
                    .with_hint("check the zc.toml file for syntax errors")
            }
            ConfigError::EmptyPoolName => config_error("pool name cannot be empty")
                .with_hint("give every [[lake.pools]] entry a non-empty name"),
            ConfigError::DuplicatePool { name } => {
                config_error(format!("pool '{name}' is defined more than once"))
            }
            ConfigError::UnknownHeadPool { name } => {
                config_error(format!("head pool '{name}' is not a configured pool"))
                    .with_hint("add the pool under [[lake.pools]] or remove [head]")
            }
            ConfigError::ZeroParallelism => config_error("parallelism must be at least 1"),
            ConfigError::EmptySortKey => config_error("sort key field cannot be empty"),
        }
    }
}

pub fn config_error<S: Into<String>>(message: S) -> CliError {
    CliError::new(message).with_file_path("zc.toml")
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                CliError::new("file or directory not found").with_caused_by(err.to_string())
            }
            std::io::ErrorKind::PermissionDenied => CliError::new("permission denied")
                .with_caused_by(err.to_string())
                .with_hint("check file permissions and try again"),
            _ => CliError::new("I/O operation failed").with_caused_by(err.to_string()),
        }
    }
}
