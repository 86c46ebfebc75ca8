use string_interner::symbol::SymbolUsize;

use super::Interner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Fn,
    Let,
    Mut,
    Return,
    Break,
    If,
    Else,
    For,
    In,
    Match,
    Struct,
    Enum,
    Impl,
    Trait,
    Macro,
    Static,
    Type,
    SizeOf,
    SelfValue,
    SelfType,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Fn => "fn",
            Keyword::Let => "let",
            Keyword::Mut => "mut",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Match => "match",
            Keyword::Struct => "struct",
            Keyword::Enum => "enum",
            Keyword::Impl => "impl",
            Keyword::Trait => "trait",
            Keyword::Macro => "macro",
            Keyword::Static => "static",
            Keyword::Type => "type",
            Keyword::SizeOf => "sizeof",
            Keyword::SelfValue => "self",
            Keyword::SelfType => "Self",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punctuation {
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Comma,
    Dot,
    Colon,
    ColonColon,
    Semicolon,
    Arrow, // -> (return types, macro arms, match cases, deref member access)

    Plus,
    Minus, // Binop and Unary
    Star,  // Binop, deref and pointer types
    Slash,
    Percent,
    Eq,
    EqEq,
    NotEq,
    LessThan, // generics too
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,

    Amp,
    AmpAmp,
    PipePipe,
    Bang,

    Hash,
    HashHash,
    Dollar,
}

impl Punctuation {
    pub fn as_str(&self) -> &'static str {
        use Punctuation::*;
        match self {
            OpenParen => "(",
            CloseParen => ")",
            OpenBrace => "{",
            CloseBrace => "}",
            OpenBracket => "[",
            CloseBracket => "]",
            Comma => ",",
            Dot => ".",
            Colon => ":",
            ColonColon => "::",
            Semicolon => ";",
            Arrow => "->",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Eq => "=",
            EqEq => "==",
            NotEq => "!=",
            LessThan => "<",
            LessThanOrEq => "<=",
            GreaterThan => ">",
            GreaterThanOrEq => ">=",
            Amp => "&",
            AmpAmp => "&&",
            PipePipe => "||",
            Bang => "!",
            Hash => "#",
            HashHash => "##",
            Dollar => "$",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    CharLiteral(u8),
    StringLiteral(SymbolUsize),
    Keyword(Keyword),
    Punctuation(Punctuation),
    Identifier(SymbolUsize),
    Eof,
}

/// A span of text in a file. Start and end are inclusive `(line, col)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct Span {
    pub file: SymbolUsize,
    pub start: (usize, usize),
    pub end: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_punct(&self, punct: Punctuation) -> bool {
        self.kind == TokenKind::Punctuation(punct)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    /// Identifiers, keywords and integer literals can take part in `##` pasting.
    pub fn is_ident_like(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Identifier(_) | TokenKind::Keyword(_) | TokenKind::IntLiteral(_)
        )
    }

    /// Source-like text of the token, used by diagnostics and token pasting.
    pub fn text(&self, interner: &Interner) -> String {
        match self.kind {
            TokenKind::IntLiteral(n) => n.to_string(),
            TokenKind::FloatLiteral(f) => format!("{f:?}"),
            TokenKind::BoolLiteral(b) => b.to_string(),
            TokenKind::CharLiteral(c) => format!("'{}'", (c as char).escape_default()),
            TokenKind::StringLiteral(sym) => {
                format!("\"{}\"", interner.resolve(sym).unwrap_or_default().escape_default())
            }
            TokenKind::Keyword(kw) => kw.as_str().to_string(),
            TokenKind::Punctuation(p) => p.as_str().to_string(),
            TokenKind::Identifier(sym) => interner.resolve(sym).unwrap_or("<?>").to_string(),
            TokenKind::Eof => "<eof>".to_string(),
        }
    }
}

impl Span {
    pub fn new(file: SymbolUsize, start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            file,
            start: (start_line, start_col),
            end: (end_line, end_col),
        }
    }

    fn connect(&self, other: &Self) -> ((usize, usize), (usize, usize)) {
        let start = self.start.min(other.start);
        let end = self.end.max(other.end);
        (start, end)
    }

    pub fn connect_mut(&mut self, other: &Self) -> &mut Self {
        let (start, end) = self.connect(other);
        self.start = start;
        self.end = end;
        self
    }

    pub fn connect_new(&self, other: &Self) -> Self {
        let (start, end) = self.connect(other);
        Self {
            file: self.file,
            start,
            end,
        }
    }

    pub fn to_display(&self, interner: &Interner) -> DisplaySpan {
        DisplaySpan {
            file: interner.resolve(self.file).unwrap_or("<unknown>").to_string(),
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySpan {
    pub file: String,
    pub start: (usize, usize),
    pub end: (usize, usize),
}

impl std::fmt::Display for DisplaySpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start.0, self.start.1)
    }
}
