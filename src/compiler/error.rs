use colored::Colorize;
use std::{fmt, path::PathBuf};
use thiserror::Error;

use crate::compiler::{lexer::LexError, parser::ParseError, tokens::DisplaySpan};

/// Represents the phase of compilation where an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerPhase {
    Lexing,
    Parsing,
    Validation,
    Lowering,
    Codegen,
    Driver,
}

impl fmt::Display for CompilerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompilerPhase::Lexing => "Lexing",
            CompilerPhase::Parsing => "Parsing",
            CompilerPhase::Validation => "Validation",
            CompilerPhase::Lowering => "Lowering",
            CompilerPhase::Codegen => "Code Generation",
            CompilerPhase::Driver => "Driver",
        })
    }
}

/// The kind of name a scope lookup was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    Variable,
    Function,
    Struct,
    Enum,
    TypeAlias,
    Macro,
    Trait,
    Field,
    Method,
    Parameter,
    Generic,
    Variant,
}

impl fmt::Display for SymbolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SymbolClass::Variable => "variable",
            SymbolClass::Function => "function",
            SymbolClass::Struct => "struct",
            SymbolClass::Enum => "enum",
            SymbolClass::TypeAlias => "type alias",
            SymbolClass::Macro => "macro",
            SymbolClass::Trait => "trait",
            SymbolClass::Field => "field",
            SymbolClass::Method => "method",
            SymbolClass::Parameter => "parameter",
            SymbolClass::Generic => "generic parameter",
            SymbolClass::Variant => "variant",
        })
    }
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{class} `{name}` is already declared in this scope")]
    DuplicateDeclaration {
        class: SymbolClass,
        name: String,
        span: Option<DisplaySpan>,
    },

    #[error("cannot find {class} `{name}` in this scope")]
    UnresolvedSymbol {
        class: SymbolClass,
        name: String,
        span: Option<DisplaySpan>,
    },

    #[error("unknown type `{name}`")]
    UnknownType { name: String, span: Option<DisplaySpan> },

    #[error("{what} expects {expected} argument(s) but {found} were supplied")]
    ArityMismatch {
        what: String,
        expected: usize,
        found: usize,
        span: Option<DisplaySpan>,
    },

    #[error("cannot cast `{from}` to `{to}`")]
    InvalidCast {
        from: String,
        to: String,
        span: Option<DisplaySpan>,
    },

    #[error("malformed invocation of macro `{name}`: {reason}")]
    MalformedMacroInvocation {
        name: String,
        reason: String,
        span: Option<DisplaySpan>,
    },

    #[error("internal compiler error: {what}")]
    InternalInvariantViolation { what: String, span: Option<DisplaySpan> },

    #[error("{what}")]
    Malformed { what: String, span: Option<DisplaySpan> },

    #[error("could not read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backend error: {message}")]
    Backend { message: String },
}

pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn span(&self) -> Option<&DisplaySpan> {
        match self {
            CompileError::Lex(e) => Some(e.span()),
            CompileError::Parse(e) => Some(e.span()),
            CompileError::DuplicateDeclaration { span, .. }
            | CompileError::UnresolvedSymbol { span, .. }
            | CompileError::UnknownType { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::InvalidCast { span, .. }
            | CompileError::MalformedMacroInvocation { span, .. }
            | CompileError::InternalInvariantViolation { span, .. }
            | CompileError::Malformed { span, .. } => span.as_ref(),
            CompileError::Io { .. } | CompileError::Backend { .. } => None,
        }
    }

    pub fn phase(&self) -> CompilerPhase {
        match self {
            CompileError::Lex(_) => CompilerPhase::Lexing,
            CompileError::Parse(_) => CompilerPhase::Parsing,
            CompileError::Malformed { .. } => CompilerPhase::Validation,
            CompileError::DuplicateDeclaration { .. }
            | CompileError::MalformedMacroInvocation { .. }
            | CompileError::Io { .. } => CompilerPhase::Lowering,
            CompileError::UnresolvedSymbol { .. }
            | CompileError::UnknownType { .. }
            | CompileError::ArityMismatch { .. }
            | CompileError::InvalidCast { .. }
            | CompileError::InternalInvariantViolation { .. }
            | CompileError::Backend { .. } => CompilerPhase::Codegen,
        }
    }

    pub fn internal(what: impl Into<String>, span: Option<DisplaySpan>) -> Self {
        CompileError::InternalInvariantViolation { what: what.into(), span }
    }

    pub fn backend(err: impl fmt::Debug) -> Self {
        CompileError::Backend {
            message: format!("{err:?}"),
        }
    }
}

/// `error[Phase]: message` followed by the offending source line.
pub fn render(err: &CompileError) -> String {
    let phase_str = format!("[{}]", err.phase()).dimmed();
    let mut out = format!("{}{}: {}", "error".red().bold(), phase_str, err.to_string().bright_white().bold());

    if let Some(span) = err.span() {
        out.push_str(&format!("\n {} {}", "-->".blue(), span));
        if let Some(snippet) = source_snippet(span) {
            out.push('\n');
            out.push_str(&snippet);
        }
    }
    out
}

pub fn report(err: &CompileError) {
    eprintln!("{}", render(err));
}

fn source_snippet(span: &DisplaySpan) -> Option<String> {
    let content = std::fs::read_to_string(&span.file).ok()?;
    let line = content.lines().nth(span.start.0.saturating_sub(1))?;

    let line_num = span.start.0.to_string();
    let padding = " ".repeat(line_num.len());
    let col_start = span.start.1.saturating_sub(1);

    let len = if span.end.0 == span.start.0 {
        span.end.1.saturating_sub(span.start.1).saturating_add(1).max(1)
    } else {
        line.len().saturating_sub(col_start).max(1)
    };

    Some(format!(
        "{} {}\n{} {} {}\n{} {} {}{}",
        padding,
        "|".blue(),
        line_num.blue(),
        "|".blue(),
        line,
        padding,
        "|".blue(),
        " ".repeat(col_start),
        "^".repeat(len).red().bold()
    ))
}
