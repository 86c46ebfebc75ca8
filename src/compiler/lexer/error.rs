use thiserror::Error;

use crate::compiler::tokens::DisplaySpan;

#[derive(Error, Debug, Clone)]
pub enum LexError {
    #[error("Unexpected character '{character}'")]
    UnexpectedCharacter { character: char, span: DisplaySpan },

    #[error("Unterminated string literal")]
    UnterminatedString { span: DisplaySpan },

    #[error("Invalid character literal")]
    InvalidChar { span: DisplaySpan },

    #[error("Unknown escape sequence '\\{escape}'")]
    UnknownEscape { escape: char, span: DisplaySpan },

    #[error("Invalid float '{value}'")]
    InvalidFloat {
        value: String,
        span: DisplaySpan,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("Invalid integer '{value}'")]
    InvalidInteger {
        value: String,
        span: DisplaySpan,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Non-decimal float")]
    NonDecimalFloat { span: DisplaySpan },
}

impl LexError {
    pub fn span(&self) -> &DisplaySpan {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::InvalidChar { span }
            | LexError::UnknownEscape { span, .. }
            | LexError::InvalidFloat { span, .. }
            | LexError::InvalidInteger { span, .. }
            | LexError::NonDecimalFloat { span } => span,
        }
    }
}
