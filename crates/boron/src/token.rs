//! Token definitions shared by the lexer and parser.

use num_bigint::BigUint;
use strum::{Display, EnumString, IntoStaticStr};

use crate::{intern::StringId, span::Span};

/// Reserved words.
///
/// Primitive type names (`i32`, `bool`, ...) are deliberately not keywords;
/// they are ordinary identifiers predeclared in the root scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Fn,
    Extern,
    Inline,
    Export,
    Pub,
    Const,
    Var,
    Struct,
    Enum,
    Error,
    Type,
    If,
    Else,
    While,
    For,
    Switch,
    Break,
    Continue,
    Return,
    Defer,
    Errdefer,
    Maybedefer,
    Use,
    Noalias,
    Asm,
    True,
    False,
    Null,
    Undefined,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(StringId),
    /// `@name`, the compile-time intrinsic call prefix.
    Intrinsic(StringId),
    Keyword(Keyword),
    IntLit(BigUint),
    FloatLit(f64),
    /// String literal contents, escapes already processed.
    StrLit(StringId),
    CharLit(u8),
    /// `#name`, a declaration directive.
    Directive(StringId),

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Ellipsis,
    Arrow,
    FatArrow,

    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PercentPercent,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Question,
    QuestionQuestion,
    ShiftLeft,
    ShiftRight,
    EqEq,
    BangEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AmpAmp,
    PipePipe,

    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShiftLeftAssign,
    ShiftRightAssign,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}
