use serde::Serialize;

/// Coarse classification of a [`Failure`], used by the web layer to pick a
/// status code and by callers that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidFormat,
    MissingCredential,
    ServiceError,
    SynthesisError,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::InvalidFormat => "invalid_format",
            FailureKind::MissingCredential => "missing_credential",
            FailureKind::ServiceError => "service_error",
            FailureKind::SynthesisError => "synthesis_error",
        };
        f.write_str(s)
    }
}

/// Everything that can go wrong while turning an upload into a caption.
///
/// Each variant is terminal for the step that produced it. None of them are
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    #[error("invalid image: {0}")]
    InvalidFormat(String),
    #[error("no API key configured: set OPENROUTER_API_KEY")]
    MissingCredential,
    #[error("captioning service error: {0}")]
    Service(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::InvalidFormat(_) => FailureKind::InvalidFormat,
            Failure::MissingCredential => FailureKind::MissingCredential,
            Failure::Service(_) => FailureKind::ServiceError,
            Failure::Synthesis(_) => FailureKind::SynthesisError,
        }
    }
}
