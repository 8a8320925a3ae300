//! Error types for statement parsing

use thiserror::Error;

use crate::ast::StatementKind;

/// Error that occurred during parsing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The leading keyword is not one the store understands
    #[error("Unsupported query: {statement}")]
    Unsupported { statement: String },

    /// The leading keyword was recognised but the table or field structure
    /// could not be extracted
    #[error("Malformed {kind} statement: {message}")]
    Malformed {
        kind: StatementKind,
        message: String,
    },
}

impl ParseError {
    pub(crate) fn unsupported(input: &str) -> Self {
        ParseError::Unsupported {
            statement: input.chars().take(40).collect(),
        }
    }

    /// The statement kind, when classification succeeded
    pub fn kind(&self) -> Option<StatementKind> {
        match self {
            ParseError::Unsupported { .. } => None,
            ParseError::Malformed { kind, .. } => Some(*kind),
        }
    }
}

/// Render a nom failure as a short message pointing at the offending input
pub(crate) fn nom_message(err: nom::Err<nom::error::Error<&str>>) -> String {
    match err {
        nom::Err::Incomplete(_) => "incomplete input".to_string(),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let near: String = e.input.chars().take(20).collect();
            if near.is_empty() {
                "unexpected end of input".to_string()
            } else {
                format!("unexpected input near {:?}", near)
            }
        }
    }
}
