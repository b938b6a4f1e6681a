use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

#[derive(Debug)]
pub enum PruneError {
    /// Missing or malformed input.
    Config(String),
    /// No active gcloud account after the setup step.
    Auth(String),
    /// The Cloud SDK collaborator could not do what was asked.
    Sdk(String),
    Spawn {
        program: String,
        source: io::Error,
    },
    CommandFailed {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },
    Io(io::Error),
    Yaml(serde_yaml::Error),
    Json(serde_json::Error),
    Pattern(regex::Error),
}

impl PruneError {
    pub fn config(msg: impl Into<String>) -> Self {
        PruneError::Config(msg.into())
    }

    /// True when the program could not be started because it does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PruneError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

impl Display for PruneError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PruneError::Config(msg) => write!(f, "configuration error: {}", msg),
            PruneError::Auth(msg) => write!(f, "authentication error: {}", msg),
            PruneError::Sdk(msg) => write!(f, "cloud sdk error: {}", msg),
            PruneError::Spawn { program, source } => {
                write!(f, "unable to run {}: {}", program, source)
            }
            PruneError::CommandFailed {
                program,
                args,
                code,
                stderr,
            } => {
                let code = code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                write!(f, "`{} {}` failed ({})", program, args.join(" "), code)?;
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            PruneError::Io(e) => write!(f, "io error: {}", e),
            PruneError::Yaml(e) => write!(f, "invalid config file: {}", e),
            PruneError::Json(e) => write!(f, "json error: {}", e),
            PruneError::Pattern(e) => write!(f, "invalid pattern: {}", e),
        }
    }
}

impl Error for PruneError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PruneError::Spawn { source, .. } => Some(source),
            PruneError::Io(e) => Some(e),
            PruneError::Yaml(e) => Some(e),
            PruneError::Json(e) => Some(e),
            PruneError::Pattern(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PruneError {
    fn from(e: io::Error) -> Self {
        PruneError::Io(e)
    }
}

impl From<serde_yaml::Error> for PruneError {
    fn from(e: serde_yaml::Error) -> Self {
        PruneError::Yaml(e)
    }
}

impl From<serde_json::Error> for PruneError {
    fn from(e: serde_json::Error) -> Self {
        PruneError::Json(e)
    }
}

impl From<regex::Error> for PruneError {
    fn from(e: regex::Error) -> Self {
        PruneError::Pattern(e)
    }
}

pub type Result<T> = std::result::Result<T, PruneError>;
