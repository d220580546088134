use std::fmt::Display;
use std::fmt::Formatter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Markers
    Eof,

    // Identifiers and keywords (keywords are recognized by lexeme)
    /// foo
    Identifier,

    // Literals
    /// 1.0
    FloatLiteral,
    /// 42
    Integer,
    /// "foo"
    String,
    /// 'a'
    Character,

    // Preprocessor
    /// A complete `#include ...` (or other non-pragma) line.
    Directive,
    /// `#pragma omp`
    PragmaOmp,
    /// The end of a `#pragma omp` line.
    PragmaEnd,

    // Punctuation
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// .
    Dot,
    /// ->
    Arrow,
    /// :
    Colon,
    /// ?
    Question,

    // Operators
    /// +
    Plus,
    /// ++
    PlusPlus,
    /// -
    Minus,
    /// --
    MinusMinus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// &
    Amp,
    /// &&
    AmpAmp,
    /// |
    Pipe,
    /// ||
    PipePipe,
    /// ^
    Caret,
    /// ~
    Tilde,
    /// !
    Exclamation,
    /// =
    Equal,
    /// ==
    EqualEqual,
    /// !=
    NotEqual,
    /// <
    Less,
    /// <=
    LessEqual,
    /// <<
    LessLess,
    /// >
    Greater,
    /// >=
    GreaterEqual,
    /// >>
    GreaterGreater,
    /// `+=`, `-=`, `<<=`, ...
    CompoundAssign,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Location {
    /// The line number of the token.
    line: usize,
    /// The column number of the token.
    column: usize,
    /// The character location in the raw source string.
    start: usize,
}

/// Displayed one-based, the way compiler diagnostics usually show locations.
impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

impl Location {
    pub fn new(line: usize, column: usize, start: usize) -> Self {
        Self {
            line,
            column,
            start,
        }
    }
    pub fn line(&self) -> usize {
        self.line
    }
    pub fn column(&self) -> usize {
        self.column
    }
    pub fn start(&self) -> usize {
        self.start
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// The kind of token, such as `foo` (Identifier) or `42` (Integer).
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, location: Location) -> Self {
        Self {
            kind,
            lexeme,
            location,
        }
    }
    pub fn is(&self, kind: TokenKind, lexeme: &str) -> bool {
        self.kind == kind && self.lexeme == lexeme
    }
    pub fn is_identifier(&self, lexeme: &str) -> bool {
        self.is(TokenKind::Identifier, lexeme)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} \"{}\" {}", self.kind, self.lexeme, self.location)
    }
}
