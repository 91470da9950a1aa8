use crate::token::Span;
use serde::Serialize;
use std::{error, fmt, result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedSyntax,
    InferenceFailure,
    SemanticConflict,
    InputInvalid,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedSyntax => "unsupported_syntax",
            ErrorKind::InferenceFailure => "inference_failure",
            ErrorKind::SemanticConflict => "semantic_conflict",
            ErrorKind::InputInvalid => "input_invalid",
        }
    }
}

/// Conversion error. The first one raised aborts the whole file.
#[derive(Clone, Serialize)]
pub struct BuildError {
    pub kind: ErrorKind,
    pub message: String,
    pub source_span: Option<Span>,
    pub hint: String,
}

impl BuildError {
    pub fn new(kind: ErrorKind, message: String, span: Option<Span>, hint: &str) -> Self {
        Self {
            kind,
            message,
            source_span: span,
            hint: hint.to_string(),
        }
    }

    pub fn unsupported(message: String, span: Option<Span>, hint: &str) -> Self {
        Self::new(ErrorKind::UnsupportedSyntax, message, span, hint)
    }

    pub fn inference(message: String, span: Option<Span>, hint: &str) -> Self {
        Self::new(ErrorKind::InferenceFailure, message, span, hint)
    }

    pub fn conflict(message: String, span: Option<Span>, hint: &str) -> Self {
        Self::new(ErrorKind::SemanticConflict, message, span, hint)
    }

    pub fn invalid(message: String, span: Option<Span>, hint: &str) -> Self {
        Self::new(ErrorKind::InputInvalid, message, span, hint)
    }

    pub fn expected(span: Span, expected: &str, found: &str) -> Self {
        Self::invalid(
            format!("expected '{}', found '{}'", expected, found),
            Some(span),
            "Check the statement against the supported subset.",
        )
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_span {
            Some(span) => write!(
                f,
                "{}:{}: {}: {}",
                span.lineno,
                span.col,
                self.kind.as_str(),
                self.message
            ),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

impl fmt::Debug for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for BuildError {}

pub type Result<T> = result::Result<T, BuildError>;
