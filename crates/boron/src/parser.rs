//! Recursive-descent parser.
//!
//! Builds arena nodes directly; parse errors are fatal for the build, the
//! same contract as the lexer. Types are ordinary expressions here — the
//! analyzer decides whether an expression denotes a type.

use smallvec::SmallVec;

use crate::{
    ast::{Ast, BinOp, DeferKind, FieldInit, NodeId, NodeKind, PrefixOp},
    imports::ImportId,
    intern::{Interner, StringId},
    span::Span,
    token::{Keyword, Token, TokenKind},
};

/// A fatal parse error with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub span: Span,
    pub msg: String,
}

type ParseResult<T> = Result<T, ParseError>;

/// Parses one import's token stream, returning the `Root` node.
pub fn parse(
    tokens: &[Token],
    ast: &mut Ast,
    interner: &Interner,
    import: ImportId,
) -> ParseResult<NodeId> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        ast,
        interner,
        import,
    };
    parser.root()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ast: &'a mut Ast,
    interner: &'a Interner,
    import: ImportId,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn bump(&mut self) -> &Token {
        let token = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<Span> {
        if self.at(kind) {
            let span = self.peek_span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<(StringId, Span)> {
        match self.peek() {
            TokenKind::Ident(name) => {
                let name = *name;
                let span = self.peek_span();
                self.pos += 1;
                Ok((name, span))
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            span: self.peek_span(),
            msg: msg.into(),
        }
    }

    fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.ast.push(kind, span, self.import)
    }

    fn span_of(&self, node: NodeId) -> Span {
        self.ast.span(node)
    }

    // ===== top level =====

    fn root(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        let mut decls = Vec::new();
        while !self.at(&TokenKind::Eof) {
            decls.push(self.top_level_decl()?);
        }
        let span = start.to(self.peek_span());
        Ok(self.push(NodeKind::Root { decls }, span))
    }

    fn directives(&mut self) -> ParseResult<SmallVec<[NodeId; 1]>> {
        let mut out = SmallVec::new();
        while let TokenKind::Directive(name) = self.peek() {
            let name = *name;
            let span = self.peek_span();
            self.pos += 1;
            self.expect(&TokenKind::LParen, "'('")?;
            let arg = if self.at(&TokenKind::RParen) {
                None
            } else {
                Some(self.expr()?)
            };
            let end = self.expect(&TokenKind::RParen, "')'")?;
            out.push(self.push(NodeKind::Directive { name, arg }, span.to(end)));
        }
        Ok(out)
    }

    fn top_level_decl(&mut self) -> ParseResult<NodeId> {
        let directives = self.directives()?;
        let is_pub = self.eat_keyword(Keyword::Pub);
        let is_export = self.eat_keyword(Keyword::Export);

        match self.peek() {
            TokenKind::Keyword(Keyword::Extern | Keyword::Inline | Keyword::Fn) => {
                self.fn_decl(is_pub, is_export, directives)
            }
            TokenKind::Keyword(Keyword::Const | Keyword::Var) => {
                self.var_decl(is_pub, is_export, directives)
            }
            TokenKind::Keyword(Keyword::Struct) => self.container_decl(is_pub, directives, true),
            TokenKind::Keyword(Keyword::Enum) => self.container_decl(is_pub, directives, false),
            TokenKind::Keyword(Keyword::Error) => {
                let start = self.peek_span();
                self.pos += 1;
                let (name, _) = self.expect_ident("error value name")?;
                let end = self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(self.push(NodeKind::ErrorValueDecl { name, is_pub }, start.to(end)))
            }
            TokenKind::Keyword(Keyword::Type) => {
                let start = self.peek_span();
                self.pos += 1;
                let (name, _) = self.expect_ident("type name")?;
                self.expect(&TokenKind::Assign, "'='")?;
                let ty = self.expr()?;
                let end = self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(self.push(NodeKind::TypeAliasDecl { name, ty, is_pub }, start.to(end)))
            }
            TokenKind::Keyword(Keyword::Use) => {
                let start = self.peek_span();
                self.pos += 1;
                let expr = self.expr()?;
                let end = self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(self.push(NodeKind::UseDecl { expr, is_pub }, start.to(end)))
            }
            _ => Err(self.error("expected top-level declaration")),
        }
    }

    fn fn_decl(
        &mut self,
        is_pub: bool,
        is_export: bool,
        directives: SmallVec<[NodeId; 1]>,
    ) -> ParseResult<NodeId> {
        let start = self.peek_span();
        let is_extern = self.eat_keyword(Keyword::Extern);
        let is_inline = self.eat_keyword(Keyword::Inline);
        self.expect(&TokenKind::Keyword(Keyword::Fn), "'fn'")?;
        let (name, _) = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;

        let mut params = SmallVec::new();
        let mut is_var_args = false;
        while !self.at(&TokenKind::RParen) {
            if self.eat(&TokenKind::Ellipsis) {
                is_var_args = true;
                break;
            }
            let param_start = self.peek_span();
            let is_noalias = self.eat_keyword(Keyword::Noalias);
            let (param_name, _) = self.expect_ident("parameter name")?;
            self.expect(&TokenKind::Colon, "':'")?;
            let ty = self.expr()?;
            let span = param_start.to(self.span_of(ty));
            params.push(self.push(
                NodeKind::ParamDecl {
                    name: Some(param_name),
                    ty,
                    is_noalias,
                },
                span,
            ));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;

        let return_type = if self.eat(&TokenKind::Arrow) {
            Some(self.expr()?)
        } else {
            None
        };
        let proto_span = start.to(self.peek_span());
        let proto = self.push(
            NodeKind::FnProto {
                name,
                params,
                return_type,
                is_extern,
                is_inline,
                is_export,
                is_pub,
                is_var_args,
                directives,
            },
            proto_span,
        );

        if self.at(&TokenKind::LBrace) {
            let body = self.block()?;
            let span = start.to(self.span_of(body));
            Ok(self.push(NodeKind::FnDef { proto, body }, span))
        } else {
            let end = self.expect(&TokenKind::Semicolon, "';' or function body")?;
            Ok(self.push(NodeKind::FnDecl { proto }, start.to(end)))
        }
    }

    fn var_decl(
        &mut self,
        is_pub: bool,
        is_export: bool,
        directives: SmallVec<[NodeId; 1]>,
    ) -> ParseResult<NodeId> {
        let start = self.peek_span();
        let is_const = self.eat_keyword(Keyword::Const);
        if !is_const {
            self.expect(&TokenKind::Keyword(Keyword::Var), "'const' or 'var'")?;
        }
        let (name, _) = self.expect_ident("variable name")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.expr()?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        let end = self.expect(&TokenKind::Semicolon, "';'")?;
        Ok(self.push(
            NodeKind::VarDecl {
                name,
                is_const,
                is_pub,
                is_export,
                ty,
                init,
                directives,
            },
            start.to(end),
        ))
    }

    fn container_decl(
        &mut self,
        is_pub: bool,
        directives: SmallVec<[NodeId; 1]>,
        is_struct: bool,
    ) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.pos += 1;
        let (name, _) = self.expect_ident("container name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let field_start = self.peek_span();
            let (field_name, _) = self.expect_ident("field name")?;
            let ty = if self.eat(&TokenKind::Colon) {
                Some(self.expr()?)
            } else {
                None
            };
            if is_struct && ty.is_none() {
                return Err(self.error("struct field requires a type"));
            }
            let span = field_start.to(self.peek_span());
            fields.push(self.push(NodeKind::ContainerField { name: field_name, ty }, span));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?;
        let span = start.to(end);
        let kind = if is_struct {
            NodeKind::StructDecl {
                name,
                fields,
                is_pub,
                directives,
            }
        } else {
            NodeKind::EnumDecl {
                name,
                fields,
                is_pub,
                directives,
            }
        };
        Ok(self.push(kind, span))
    }

    // ===== statements =====

    fn block(&mut self) -> ParseResult<NodeId> {
        let start = self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            stmts.push(self.statement()?);
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(self.push(NodeKind::Block { stmts }, start.to(end)))
    }

    fn statement(&mut self) -> ParseResult<NodeId> {
        match self.peek() {
            TokenKind::Keyword(Keyword::Const | Keyword::Var) => {
                self.var_decl(false, false, SmallVec::new())
            }
            TokenKind::Keyword(Keyword::Defer) => self.defer_stmt(DeferKind::Unconditional),
            TokenKind::Keyword(Keyword::Errdefer) => self.defer_stmt(DeferKind::Error),
            TokenKind::Keyword(Keyword::Maybedefer) => self.defer_stmt(DeferKind::Maybe),
            TokenKind::Keyword(Keyword::Return) => {
                let start = self.peek_span();
                self.pos += 1;
                let value = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expr()?)
                };
                let end = self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(self.push(NodeKind::Return { value }, start.to(end)))
            }
            TokenKind::Keyword(Keyword::Break) => {
                let span = self.peek_span();
                self.pos += 1;
                let end = self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(self.push(NodeKind::Break, span.to(end)))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let span = self.peek_span();
                self.pos += 1;
                let end = self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(self.push(NodeKind::Continue, span.to(end)))
            }
            _ => {
                let expr = self.expr()?;
                // block-shaped expressions stand alone; everything else
                // needs a terminating semicolon
                if !self.block_shaped(expr) {
                    self.expect(&TokenKind::Semicolon, "';'")?;
                }
                Ok(expr)
            }
        }
    }

    fn block_shaped(&self, node: NodeId) -> bool {
        matches!(
            self.ast.kind(node),
            NodeKind::Block { .. }
                | NodeKind::If { .. }
                | NodeKind::IfMaybe { .. }
                | NodeKind::While { .. }
                | NodeKind::For { .. }
                | NodeKind::Switch { .. }
        )
    }

    fn defer_stmt(&mut self, kind: DeferKind) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.pos += 1;
        let body = self.expr()?;
        let end = self.expect(&TokenKind::Semicolon, "';'")?;
        Ok(self.push(NodeKind::Defer { kind, body }, start.to(end)))
    }

    // ===== expressions =====

    fn expr(&mut self) -> ParseResult<NodeId> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<NodeId> {
        let lhs = self.unwrap_expr()?;
        let op = match self.peek() {
            TokenKind::Assign => BinOp::Assign,
            TokenKind::PlusAssign => BinOp::AssignPlus,
            TokenKind::MinusAssign => BinOp::AssignMinus,
            TokenKind::StarAssign => BinOp::AssignTimes,
            TokenKind::SlashAssign => BinOp::AssignDiv,
            TokenKind::PercentAssign => BinOp::AssignMod,
            TokenKind::AmpAssign => BinOp::AssignBitAnd,
            TokenKind::PipeAssign => BinOp::AssignBitOr,
            TokenKind::CaretAssign => BinOp::AssignBitXor,
            TokenKind::ShiftLeftAssign => BinOp::AssignShl,
            TokenKind::ShiftRightAssign => BinOp::AssignShr,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.unwrap_expr()?;
        let span = self.span_of(lhs).to(self.span_of(rhs));
        Ok(self.push(NodeKind::BinOpExpr { op, lhs, rhs }, span))
    }

    /// `a %% b`, `a %% err => b`, `a ?? b` — lowest non-assignment level.
    fn unwrap_expr(&mut self) -> ParseResult<NodeId> {
        let mut lhs = self.bool_or()?;
        loop {
            if self.eat(&TokenKind::PercentPercent) {
                let (err_name, err_span) = if matches!(self.peek(), TokenKind::Ident(_))
                    && self.peek_at(1) == &TokenKind::FatArrow
                {
                    let (name, span) = self.expect_ident("error binding")?;
                    self.expect(&TokenKind::FatArrow, "'=>'")?;
                    (Some(name), span)
                } else {
                    (None, self.peek_span())
                };
                let fallback = self.bool_or()?;
                let span = self.span_of(lhs).to(self.span_of(fallback));
                lhs = self.push(
                    NodeKind::UnwrapErrExpr {
                        target: lhs,
                        err_name,
                        err_span,
                        fallback,
                    },
                    span,
                );
            } else if self.eat(&TokenKind::QuestionQuestion) {
                let rhs = self.bool_or()?;
                let span = self.span_of(lhs).to(self.span_of(rhs));
                lhs = self.push(
                    NodeKind::BinOpExpr {
                        op: BinOp::UnwrapMaybe,
                        lhs,
                        rhs,
                    },
                    span,
                );
            } else {
                return Ok(lhs);
            }
        }
    }

    fn binary_tier(
        &mut self,
        next: fn(&mut Self) -> ParseResult<NodeId>,
        match_op: fn(&TokenKind) -> Option<BinOp>,
    ) -> ParseResult<NodeId> {
        let mut lhs = next(self)?;
        while let Some(op) = match_op(self.peek()) {
            self.pos += 1;
            let rhs = next(self)?;
            let span = self.span_of(lhs).to(self.span_of(rhs));
            lhs = self.push(NodeKind::BinOpExpr { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn bool_or(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::bool_and, |t| {
            matches!(t, TokenKind::PipePipe).then_some(BinOp::BoolOr)
        })
    }

    fn bool_and(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::comparison, |t| {
            matches!(t, TokenKind::AmpAmp).then_some(BinOp::BoolAnd)
        })
    }

    fn comparison(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::bit_or, |t| match t {
            TokenKind::EqEq => Some(BinOp::CmpEq),
            TokenKind::BangEq => Some(BinOp::CmpNotEq),
            TokenKind::Lt => Some(BinOp::CmpLessThan),
            TokenKind::Gt => Some(BinOp::CmpGreaterThan),
            TokenKind::LtEq => Some(BinOp::CmpLessOrEq),
            TokenKind::GtEq => Some(BinOp::CmpGreaterOrEq),
            _ => None,
        })
    }

    fn bit_or(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::bit_xor, |t| {
            matches!(t, TokenKind::Pipe).then_some(BinOp::BinOr)
        })
    }

    fn bit_xor(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::bit_and, |t| {
            matches!(t, TokenKind::Caret).then_some(BinOp::BinXor)
        })
    }

    fn bit_and(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::shift, |t| {
            matches!(t, TokenKind::Ampersand).then_some(BinOp::BinAnd)
        })
    }

    fn shift(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::additive, |t| match t {
            TokenKind::ShiftLeft => Some(BinOp::BitShiftLeft),
            TokenKind::ShiftRight => Some(BinOp::BitShiftRight),
            _ => None,
        })
    }

    fn additive(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::multiplicative, |t| match t {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> ParseResult<NodeId> {
        self.binary_tier(Self::prefix, |t| match t {
            TokenKind::Star => Some(BinOp::Mult),
            TokenKind::Slash => Some(BinOp::Div),
            TokenKind::Percent => Some(BinOp::Mod),
            _ => None,
        })
    }

    fn prefix(&mut self) -> ParseResult<NodeId> {
        let span = self.peek_span();
        let op = match self.peek() {
            TokenKind::Minus => PrefixOp::Negation,
            TokenKind::Bang => PrefixOp::BoolNot,
            TokenKind::Tilde => PrefixOp::BinNot,
            TokenKind::Star => {
                // `*const T` / `*mut T` is a pointer type; anything else
                // after `*` is a dereference
                let next_is_qualifier = match self.peek_at(1) {
                    TokenKind::Keyword(Keyword::Const) => true,
                    TokenKind::Ident(name) => self.interner.get(*name) == "mut",
                    _ => false,
                };
                if next_is_qualifier {
                    return self.pointer_type();
                }
                PrefixOp::Dereference
            }
            TokenKind::Question => PrefixOp::MaybeType,
            TokenKind::Percent => PrefixOp::ErrorUnionType,
            TokenKind::PercentPercent => PrefixOp::UnwrapError,
            TokenKind::QuestionQuestion => PrefixOp::UnwrapMaybe,
            TokenKind::Ampersand => {
                self.pos += 1;
                let is_const = self.eat_keyword(Keyword::Const);
                let operand = self.prefix()?;
                let full = span.to(self.span_of(operand));
                return Ok(self.push(
                    NodeKind::PrefixOpExpr {
                        op: PrefixOp::AddressOf { is_const },
                        operand,
                    },
                    full,
                ));
            }
            _ => return self.postfix(),
        };
        self.pos += 1;
        let operand = self.prefix()?;
        let full = span.to(self.span_of(operand));
        Ok(self.push(NodeKind::PrefixOpExpr { op, operand }, full))
    }

    fn postfix(&mut self) -> ParseResult<NodeId> {
        let mut expr = self.primary()?;
        // struct-init braces only attach to a plain name path, so control
        // headers like `while (x) { ... }` never misparse
        let mut path_like = matches!(self.ast.kind(expr), NodeKind::Symbol(_));
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    while !self.at(&TokenKind::RParen) {
                        args.push(self.expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    let end = self.expect(&TokenKind::RParen, "')'")?;
                    let span = self.span_of(expr).to(end);
                    expr = self.push(NodeKind::Call { callee: expr, args }, span);
                    path_like = false;
                }
                TokenKind::LBracket => {
                    self.pos += 1;
                    let index = self.expr()?;
                    if self.eat(&TokenKind::Ellipsis) {
                        let end_expr = if self.at(&TokenKind::RBracket) {
                            None
                        } else {
                            Some(self.expr()?)
                        };
                        let end = self.expect(&TokenKind::RBracket, "']'")?;
                        let span = self.span_of(expr).to(end);
                        expr = self.push(
                            NodeKind::SliceExpr {
                                target: expr,
                                start: index,
                                end: end_expr,
                            },
                            span,
                        );
                    } else {
                        let end = self.expect(&TokenKind::RBracket, "']'")?;
                        let span = self.span_of(expr).to(end);
                        expr = self.push(
                            NodeKind::ArrayAccess {
                                target: expr,
                                index,
                            },
                            span,
                        );
                    }
                    path_like = false;
                }
                TokenKind::Dot => {
                    self.pos += 1;
                    let (name, name_span) = self.expect_ident("field name")?;
                    let span = self.span_of(expr).to(name_span);
                    expr = self.push(NodeKind::FieldAccess { target: expr, name }, span);
                }
                TokenKind::LBrace if path_like => {
                    expr = self.struct_init(expr)?;
                    path_like = false;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn struct_init(&mut self, ty: NodeId) -> ParseResult<NodeId> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let (name, name_span) = self.expect_ident("field name")?;
            self.expect(&TokenKind::Colon, "':'")?;
            let value = self.expr()?;
            fields.push(FieldInit {
                name,
                name_span,
                value,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?;
        let span = self.span_of(ty).to(end);
        Ok(self.push(NodeKind::StructInit { ty, fields }, span))
    }

    fn primary(&mut self) -> ParseResult<NodeId> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::IntLit(value) => {
                self.pos += 1;
                Ok(self.push(NodeKind::IntLit(value), span))
            }
            TokenKind::FloatLit(value) => {
                self.pos += 1;
                Ok(self.push(NodeKind::FloatLit(value), span))
            }
            TokenKind::StrLit(id) => {
                self.pos += 1;
                Ok(self.push(NodeKind::StrLit(id), span))
            }
            TokenKind::CharLit(byte) => {
                self.pos += 1;
                Ok(self.push(NodeKind::CharLit(byte), span))
            }
            TokenKind::Ident(name) => {
                self.pos += 1;
                Ok(self.push(NodeKind::Symbol(name), span))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.pos += 1;
                Ok(self.push(NodeKind::BoolLit(true), span))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.pos += 1;
                Ok(self.push(NodeKind::BoolLit(false), span))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.pos += 1;
                Ok(self.push(NodeKind::NullLit, span))
            }
            TokenKind::Keyword(Keyword::Undefined) => {
                self.pos += 1;
                Ok(self.push(NodeKind::UndefinedLit, span))
            }
            TokenKind::Keyword(Keyword::Error) => {
                self.pos += 1;
                Ok(self.push(NodeKind::PureErrorType, span))
            }
            TokenKind::Keyword(Keyword::If) => self.if_expr(),
            TokenKind::Keyword(Keyword::While) => self.while_expr(),
            TokenKind::Keyword(Keyword::For) => self.for_expr(),
            TokenKind::Keyword(Keyword::Switch) => self.switch_expr(),
            TokenKind::Keyword(Keyword::Asm) => {
                self.pos += 1;
                self.expect(&TokenKind::LParen, "'('")?;
                let template = match self.peek() {
                    TokenKind::StrLit(id) => {
                        let id = *id;
                        self.pos += 1;
                        id
                    }
                    _ => return Err(self.error("expected assembly template string")),
                };
                let end = self.expect(&TokenKind::RParen, "')'")?;
                Ok(self.push(NodeKind::Asm { template }, span.to(end)))
            }
            TokenKind::Intrinsic(name) => {
                self.pos += 1;
                self.expect(&TokenKind::LParen, "'('")?;
                let mut args = Vec::new();
                while !self.at(&TokenKind::RParen) {
                    args.push(self.expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(&TokenKind::RParen, "')'")?;
                Ok(self.push(NodeKind::IntrinsicCall { name, args }, span.to(end)))
            }
            TokenKind::LBrace => self.block(),
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => self.array_type_or_init(),
            _ => Err(self.error("expected expression")),
        }
    }

    fn pointer_type(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(&TokenKind::Star, "'*'")?;
        let is_const = if self.eat_keyword(Keyword::Const) {
            true
        } else {
            let (word, _) = self.expect_ident("'const' or 'mut'")?;
            if self.interner.get(word) != "mut" {
                return Err(self.error("expected 'const' or 'mut'"));
            }
            false
        };
        let child = self.prefix()?;
        let span = start.to(self.span_of(child));
        Ok(self.push(NodeKind::PointerType { is_const, child }, span))
    }

    /// `[N]T`, `[]T`, `[]const T`, and the init forms `[N]T{...}` / `[]T{...}`.
    fn array_type_or_init(&mut self) -> ParseResult<NodeId> {
        let start = self.expect(&TokenKind::LBracket, "'['")?;
        let size = if self.at(&TokenKind::RBracket) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(&TokenKind::RBracket, "']'")?;
        let is_const = size.is_none() && self.eat_keyword(Keyword::Const);
        let elem = self.prefix()?;
        let span = start.to(self.span_of(elem));
        let ty = self.push(
            NodeKind::ArrayType {
                size,
                is_const,
                elem,
            },
            span,
        );
        if self.at(&TokenKind::LBrace) {
            self.expect(&TokenKind::LBrace, "'{'")?;
            let mut elems = Vec::new();
            while !self.at(&TokenKind::RBrace) {
                elems.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            let end = self.expect(&TokenKind::RBrace, "'}'")?;
            let span = start.to(end);
            return Ok(self.push(NodeKind::ArrayInit { ty, elems }, span));
        }
        Ok(ty)
    }

    fn if_expr(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(&TokenKind::Keyword(Keyword::If), "'if'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let cond = self.expr()?;
        self.expect(&TokenKind::RParen, "')'")?;

        // `if (expr) |name| ...` binds the maybe payload
        if self.eat(&TokenKind::Pipe) {
            let (bind_name, bind_span) = self.expect_ident("capture name")?;
            self.expect(&TokenKind::Pipe, "'|'")?;
            let then_body = self.expr()?;
            let else_body = if self.eat_keyword(Keyword::Else) {
                Some(self.expr()?)
            } else {
                None
            };
            let end = else_body.unwrap_or(then_body);
            let span = start.to(self.span_of(end));
            return Ok(self.push(
                NodeKind::IfMaybe {
                    bind_name,
                    bind_span,
                    expr: cond,
                    then_body,
                    else_body,
                },
                span,
            ));
        }

        let then_body = self.expr()?;
        let else_body = if self.eat_keyword(Keyword::Else) {
            Some(self.expr()?)
        } else {
            None
        };
        let end = else_body.unwrap_or(then_body);
        let span = start.to(self.span_of(end));
        Ok(self.push(
            NodeKind::If {
                cond,
                then_body,
                else_body,
            },
            span,
        ))
    }

    fn while_expr(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(&TokenKind::Keyword(Keyword::While), "'while'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let cond = self.expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.expr()?;
        let span = start.to(self.span_of(body));
        Ok(self.push(NodeKind::While { cond, body }, span))
    }

    fn for_expr(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(&TokenKind::Keyword(Keyword::For), "'for'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let (elem_name, elem_span) = self.expect_ident("loop variable")?;
        let index_name = if self.eat(&TokenKind::Comma) {
            let (name, _) = self.expect_ident("index variable")?;
            Some(name)
        } else {
            None
        };
        self.expect(&TokenKind::Colon, "':'")?;
        let iterable = self.expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.expr()?;
        let span = start.to(self.span_of(body));
        Ok(self.push(
            NodeKind::For {
                elem_name,
                elem_span,
                index_name,
                iterable,
                body,
            },
            span,
        ))
    }

    fn switch_expr(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(&TokenKind::Keyword(Keyword::Switch), "'switch'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let target = self.expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut prongs = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let prong_start = self.peek_span();
            let mut items = SmallVec::new();
            let is_else = if self.eat_keyword(Keyword::Else) {
                true
            } else {
                loop {
                    let item = self.unwrap_expr()?;
                    let item = if self.eat(&TokenKind::Ellipsis) {
                        let end = self.unwrap_expr()?;
                        let span = self.span_of(item).to(self.span_of(end));
                        self.push(NodeKind::SwitchRange { start: item, end }, span)
                    } else {
                        item
                    };
                    items.push(item);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    // trailing comma before `=>` is not meaningful but a
                    // following `else` or `=>` ends the item list
                    if self.at(&TokenKind::FatArrow) {
                        break;
                    }
                }
                false
            };
            self.expect(&TokenKind::FatArrow, "'=>'")?;
            let (capture, capture_span) = if self.eat(&TokenKind::Pipe) {
                let (name, span) = self.expect_ident("capture name")?;
                self.expect(&TokenKind::Pipe, "'|'")?;
                (Some(name), span)
            } else {
                (None, self.peek_span())
            };
            let body = self.expr()?;
            let span = prong_start.to(self.span_of(body));
            prongs.push(self.push(
                NodeKind::SwitchProng {
                    items,
                    is_else,
                    capture,
                    capture_span,
                    body,
                },
                span,
            ));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(self.push(NodeKind::Switch { target, prongs }, start.to(end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{imports::ImportId, lexer::tokenize};

    fn parse_source(source: &str) -> (Ast, NodeId) {
        let mut interner = Interner::new();
        let tokens = tokenize(source, &mut interner).unwrap();
        let mut ast = Ast::new();
        let root = parse(&tokens, &mut ast, &interner, ImportId::for_tests()).unwrap();
        (ast, root)
    }

    fn root_decls(ast: &Ast, root: NodeId) -> &[NodeId] {
        match ast.kind(root) {
            NodeKind::Root { decls } => decls,
            other => panic!("expected root, got {other:?}"),
        }
    }

    #[test]
    fn fn_def_shape() {
        let (ast, root) = parse_source("fn add(a: i32, b: i32) -> i32 { return a + b; }");
        let decls = root_decls(&ast, root);
        assert_eq!(decls.len(), 1);
        let NodeKind::FnDef { proto, body } = ast.kind(decls[0]) else {
            panic!("expected fn def");
        };
        let NodeKind::FnProto {
            params,
            return_type,
            is_extern,
            ..
        } = ast.kind(*proto)
        else {
            panic!("expected proto");
        };
        assert_eq!(params.len(), 2);
        assert!(return_type.is_some());
        assert!(!is_extern);
        assert!(matches!(ast.kind(*body), NodeKind::Block { .. }));
    }

    #[test]
    fn extern_decl_without_body() {
        let (ast, root) = parse_source("extern fn puts(s: *const u8) -> i32;");
        let decls = root_decls(&ast, root);
        let NodeKind::FnDecl { proto } = ast.kind(decls[0]) else {
            panic!("expected fn decl");
        };
        let NodeKind::FnProto { is_extern, params, .. } = ast.kind(*proto) else {
            panic!("expected proto");
        };
        assert!(is_extern);
        let NodeKind::ParamDecl { ty, .. } = ast.kind(params[0]) else {
            panic!("expected param");
        };
        assert!(matches!(
            ast.kind(*ty),
            NodeKind::PointerType { is_const: true, .. }
        ));
    }

    #[test]
    fn error_unwrap_with_binding() {
        let (ast, root) = parse_source("fn f() -> i32 { return g() %% err => h(err); }");
        let decls = root_decls(&ast, root);
        let NodeKind::FnDef { body, .. } = ast.kind(decls[0]) else {
            panic!("expected fn def");
        };
        let NodeKind::Block { stmts } = ast.kind(*body) else {
            panic!("expected block");
        };
        let NodeKind::Return { value: Some(value) } = ast.kind(stmts[0]) else {
            panic!("expected return");
        };
        assert!(matches!(
            ast.kind(*value),
            NodeKind::UnwrapErrExpr { err_name: Some(_), .. }
        ));
    }

    #[test]
    fn precedence_mul_over_add() {
        let (ast, root) = parse_source("const x = 1 + 2 * 3;");
        let decls = root_decls(&ast, root);
        let NodeKind::VarDecl { init: Some(init), .. } = ast.kind(decls[0]) else {
            panic!("expected var decl");
        };
        let NodeKind::BinOpExpr { op, rhs, .. } = ast.kind(*init) else {
            panic!("expected binop");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(
            ast.kind(*rhs),
            NodeKind::BinOpExpr { op: BinOp::Mult, .. }
        ));
    }

    #[test]
    fn maybe_and_error_union_types() {
        let (ast, root) = parse_source("var x: ?*mut u8 = null; var y: %i32 = 0;");
        let decls = root_decls(&ast, root);
        let NodeKind::VarDecl { ty: Some(ty), .. } = ast.kind(decls[0]) else {
            panic!("expected var decl");
        };
        let NodeKind::PrefixOpExpr { op, operand } = ast.kind(*ty) else {
            panic!("expected prefix type");
        };
        assert_eq!(*op, PrefixOp::MaybeType);
        assert!(matches!(
            ast.kind(*operand),
            NodeKind::PointerType { is_const: false, .. }
        ));
        let NodeKind::VarDecl { ty: Some(ty), .. } = ast.kind(decls[1]) else {
            panic!("expected var decl");
        };
        assert!(matches!(
            ast.kind(*ty),
            NodeKind::PrefixOpExpr {
                op: PrefixOp::ErrorUnionType,
                ..
            }
        ));
    }

    #[test]
    fn array_init_and_slice_type() {
        let (ast, root) = parse_source("const xs = [3]i32{1, 2, 3}; var s: []const u8 = undefined;");
        let decls = root_decls(&ast, root);
        let NodeKind::VarDecl { init: Some(init), .. } = ast.kind(decls[0]) else {
            panic!("expected var decl");
        };
        let NodeKind::ArrayInit { elems, .. } = ast.kind(*init) else {
            panic!("expected array init");
        };
        assert_eq!(elems.len(), 3);
        let NodeKind::VarDecl { ty: Some(ty), .. } = ast.kind(decls[1]) else {
            panic!("expected var decl");
        };
        assert!(matches!(
            ast.kind(*ty),
            NodeKind::ArrayType {
                size: None,
                is_const: true,
                ..
            }
        ));
    }

    #[test]
    fn switch_prongs_and_ranges() {
        let (ast, root) = parse_source(
            "fn f(x: i32) -> i32 { return switch (x) { 0, 1 => 10, 2 ... 5 => |v| v, else => 0 }; }",
        );
        let decls = root_decls(&ast, root);
        let NodeKind::FnDef { body, .. } = ast.kind(decls[0]) else {
            panic!("expected fn def");
        };
        let NodeKind::Block { stmts } = ast.kind(*body) else {
            panic!("expected block");
        };
        let NodeKind::Return { value: Some(value) } = ast.kind(stmts[0]) else {
            panic!("expected return");
        };
        let NodeKind::Switch { prongs, .. } = ast.kind(*value) else {
            panic!("expected switch");
        };
        assert_eq!(prongs.len(), 3);
        let NodeKind::SwitchProng { items, .. } = ast.kind(prongs[0]) else {
            panic!("expected prong");
        };
        assert_eq!(items.len(), 2);
        let NodeKind::SwitchProng { items, capture, .. } = ast.kind(prongs[1]) else {
            panic!("expected prong");
        };
        assert!(matches!(ast.kind(items[0]), NodeKind::SwitchRange { .. }));
        assert!(capture.is_some());
        let NodeKind::SwitchProng { is_else, .. } = ast.kind(prongs[2]) else {
            panic!("expected prong");
        };
        assert!(is_else);
    }

    #[test]
    fn struct_init_only_after_path() {
        let (ast, root) = parse_source("fn f() { var p = Point { x: 1, y: 2 }; while (go()) { stop(); } }");
        let decls = root_decls(&ast, root);
        let NodeKind::FnDef { body, .. } = ast.kind(decls[0]) else {
            panic!("expected fn def");
        };
        let NodeKind::Block { stmts } = ast.kind(*body) else {
            panic!("expected block");
        };
        let NodeKind::VarDecl { init: Some(init), .. } = ast.kind(stmts[0]) else {
            panic!("expected var decl");
        };
        assert!(matches!(ast.kind(*init), NodeKind::StructInit { .. }));
        assert!(matches!(ast.kind(stmts[1]), NodeKind::While { .. }));
    }

    #[test]
    fn defer_kinds() {
        let (ast, root) = parse_source("fn f() { defer a(); errdefer b(); maybedefer c(); }");
        let decls = root_decls(&ast, root);
        let NodeKind::FnDef { body, .. } = ast.kind(decls[0]) else {
            panic!("expected fn def");
        };
        let NodeKind::Block { stmts } = ast.kind(*body) else {
            panic!("expected block");
        };
        let kinds: Vec<DeferKind> = stmts
            .iter()
            .map(|&stmt| match ast.kind(stmt) {
                NodeKind::Defer { kind, .. } => *kind,
                other => panic!("expected defer, got {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            [DeferKind::Unconditional, DeferKind::Error, DeferKind::Maybe]
        );
    }
}
