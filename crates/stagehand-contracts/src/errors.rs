/// Every failure a workspace operation can report.
///
/// None of these end the session; the caller stores the message and the
/// workspace stays interactive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkspaceError {
    #[error("scene photo required")]
    MissingInput,
    #[error("edit instruction required")]
    EmptyPrompt,
    #[error("a generation is already in progress")]
    Busy,
    #[error("image fetch failed: {0}")]
    Fetch(String),
    #[error("not a displayable image: {0}")]
    InvalidImage(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("model returned text instead of an image: {0}")]
    ModelRefused(String),
    #[error("model returned no image")]
    NoOutput,
    #[error("no image to export")]
    NothingToExport,
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Where a front end should surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSurface {
    /// Next to the generate control.
    Inline,
    /// Next to the URL import field; history is untouched.
    ImportField,
    /// Top-level banner.
    Banner,
}

impl WorkspaceError {
    /// Stable tag used in event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkspaceError::MissingInput => "missing_input",
            WorkspaceError::EmptyPrompt => "empty_prompt",
            WorkspaceError::Busy => "busy",
            WorkspaceError::Fetch(_) => "fetch",
            WorkspaceError::InvalidImage(_) => "invalid_image",
            WorkspaceError::Configuration(_) => "configuration",
            WorkspaceError::ModelRefused(_) => "model_refused",
            WorkspaceError::NoOutput => "no_output",
            WorkspaceError::NothingToExport => "nothing_to_export",
            WorkspaceError::Transport(_) => "transport",
            WorkspaceError::Io(_) => "io",
        }
    }

    pub fn surface(&self) -> ErrorSurface {
        match self {
            WorkspaceError::Fetch(_) | WorkspaceError::InvalidImage(_) => {
                ErrorSurface::ImportField
            }
            WorkspaceError::Configuration(_) => ErrorSurface::Banner,
            _ => ErrorSurface::Inline,
        }
    }
}
