//! Parser (C6, the other half): hand-written recursive descent with
//! precedence climbing for expressions, consuming [`Token`]s from a
//! [`Lexer`] with a two-token lookahead buffer (needed only to disambiguate
//! a tuple's `key: value` entries from a bare positional expression that
//! happens to start with an identifier).

use crate::ast::{Ast, AssignOp, BinaryOp, DefModifiers, Literal, NodeId, NodeKind, Param, StringPart, UnaryOp};
use crate::lexer::{Keyword, Lexer, StringPartTok, Token, TokenKind};
use teascript_core::{SourceCursor, SourceLocation, TeaError};
use teascript_runtime::Dialect;

pub struct Parser {
    lexer: Lexer,
    cur: Token,
    next: Option<Token>,
    pub ast: Ast,
    dialect: Dialect,
    /// `##disable` / `##enable` toggle (§4.6 hash lines).
    disabled: bool,
}

fn is_stmt_end(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Newline | TokenKind::Comma | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof)
}

impl Parser {
    pub fn new(cursor: SourceCursor, dialect: Dialect) -> Result<Self, TeaError> {
        let mut lexer = Lexer::new(cursor);
        let cur = lexer.next_token()?;
        Ok(Parser { lexer, cur, next: None, ast: Ast::new(), dialect, disabled: false })
    }

    fn bump(&mut self) -> Result<Token, TeaError> {
        let new_cur = match self.next.take() {
            Some(t) => t,
            None => self.lexer.next_token()?,
        };
        Ok(std::mem::replace(&mut self.cur, new_cur))
    }

    fn peek2(&mut self) -> Result<&Token, TeaError> {
        if self.next.is_none() {
            self.next = Some(self.lexer.next_token()?);
        }
        Ok(self.next.as_ref().unwrap())
    }

    fn expect_ident(&mut self) -> Result<(String, SourceLocation), TeaError> {
        let loc = self.cur.loc;
        match self.cur.kind.clone() {
            TokenKind::Ident(name) => {
                self.bump()?;
                Ok((name, loc))
            }
            other => Err(TeaError::parsing(loc, format!("expected identifier, found {other:?}"))),
        }
    }

    fn expect(&mut self, matcher: impl Fn(&TokenKind) -> bool, what: &str) -> Result<(), TeaError> {
        if matcher(&self.cur.kind) {
            self.bump()?;
            Ok(())
        } else {
            Err(TeaError::parsing(self.cur.loc, format!("expected {what}, found {:?}", self.cur.kind)))
        }
    }

    /// Consumes `Newline`/`Comma`/`Semicolon` tokens (and any interleaved
    /// hash lines). Returns whether at least one separator token was
    /// actually consumed, so callers can enforce "one statement per line"
    /// (spec §4.5) at the point a new statement is about to start.
    fn skip_separators(&mut self) -> Result<bool, TeaError> {
        let mut saw_separator = false;
        loop {
            self.sync_hashlines()?;
            if matches!(self.cur.kind, TokenKind::Newline | TokenKind::Comma | TokenKind::Semicolon) {
                self.bump()?;
                saw_separator = true;
            } else {
                break;
            }
        }
        Ok(saw_separator)
    }

    /// Process `##` directives and the disabled-region skip (§4.6). Hash
    /// lines are honored even while disabled; everything else is consumed
    /// silently until re-enabled.
    fn sync_hashlines(&mut self) -> Result<(), TeaError> {
        loop {
            if let TokenKind::HashLine(text) = self.cur.kind.clone() {
                self.process_hashline(&text, self.cur.loc)?;
                self.bump()?;
                continue;
            }
            if self.disabled && !matches!(self.cur.kind, TokenKind::Eof) {
                self.bump()?;
                continue;
            }
            break;
        }
        Ok(())
    }

    fn process_hashline(&mut self, text: &str, loc: SourceLocation) -> Result<(), TeaError> {
        let mut parts = text.split_whitespace();
        match parts.next() {
            Some("disable") => self.disabled = true,
            Some("enable") => self.disabled = false,
            Some("minimum_version") => {
                if let Some(v) = parts.next() {
                    let nums: Vec<u32> = v.split('.').filter_map(|p| p.parse().ok()).collect();
                    if nums.len() == 3 {
                        let required = (nums[0] << 24) | (nums[1] << 16) | nums[2];
                        let have = (teascript_runtime::corelib::VERSION_MAJOR << 24)
                            | (teascript_runtime::corelib::VERSION_MINOR << 16)
                            | teascript_runtime::corelib::VERSION_PATCH;
                        if have < required {
                            return Err(TeaError::parsing(loc, format!("script requires core version {v} or newer")));
                        }
                    }
                }
            }
            // `enable_if`/`disable_if`/`tsvm_mode`/`tsvm` are accepted but not
            // further interpreted by this implementation.
            _ => {}
        }
        Ok(())
    }

    /// Parses the whole input as a program, appending statements to
    /// `self.ast.roots`.
    pub fn parse_program(&mut self) -> Result<(), TeaError> {
        self.skip_separators()?;
        while !matches!(self.cur.kind, TokenKind::Eof) {
            let stmt = self.parse_statement()?;
            self.ast.roots.push(stmt);
            let sep_loc = self.cur.loc;
            let had_separator = self.skip_separators()?;
            if !had_separator && !matches!(self.cur.kind, TokenKind::Eof) {
                return Err(TeaError::parsing(sep_loc, "expected a statement separator (newline, ',', or ';') before the next statement"));
            }
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        match self.cur.kind.clone() {
            TokenKind::Keyword(Keyword::Def) | TokenKind::Keyword(Keyword::Const) => self.parse_def(),
            TokenKind::Keyword(Keyword::Undef) => {
                self.bump()?;
                let (name, _) = self.expect_ident()?;
                Ok(self.ast.push(NodeKind::Undef(name), loc))
            }
            TokenKind::Keyword(Keyword::Debug) => {
                self.bump()?;
                let e = self.parse_expression()?;
                Ok(self.ast.push(NodeKind::Debug(e), loc))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::Repeat) => self.parse_repeat(),
            TokenKind::Keyword(Keyword::Forall) => self.parse_forall(),
            TokenKind::Keyword(Keyword::Func) => self.parse_funcdef(),
            TokenKind::Keyword(Keyword::Return) => {
                self.bump()?;
                let value = if is_stmt_end(&self.cur.kind) { None } else { Some(self.parse_expression()?) };
                Ok(self.ast.push(NodeKind::Return(value), loc))
            }
            TokenKind::Keyword(Keyword::Stop) => {
                self.bump()?;
                let label = self.try_parse_label()?;
                let with_expr = if matches!(self.cur.kind, TokenKind::Keyword(Keyword::With)) {
                    self.bump()?;
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                Ok(self.ast.push(NodeKind::Stop { label, with_expr }, loc))
            }
            TokenKind::Keyword(Keyword::Loop) => {
                self.bump()?;
                let label = self.try_parse_label()?;
                Ok(self.ast.push(NodeKind::Loop { label }, loc))
            }
            TokenKind::Keyword(Keyword::Suspend) => {
                self.bump()?;
                Ok(self.ast.push(NodeKind::Suspend, loc))
            }
            TokenKind::Keyword(Keyword::Yield) => {
                self.bump()?;
                let value = if is_stmt_end(&self.cur.kind) { None } else { Some(self.parse_expression()?) };
                Ok(self.ast.push(NodeKind::Yield(value), loc))
            }
            TokenKind::Ident(name) if name == "_Exit" => {
                self.bump()?;
                let e = self.parse_expression()?;
                Ok(self.ast.push(NodeKind::Exit(e), loc))
            }
            _ => self.parse_expression(),
        }
    }

    fn try_parse_label(&mut self) -> Result<Option<String>, TeaError> {
        if let TokenKind::Str(parts) = &self.cur.kind {
            if let [StringPartTok::Literal(s)] = parts.as_slice() {
                let label = s.clone();
                self.bump()?;
                return Ok(Some(label));
            }
        }
        Ok(None)
    }

    fn parse_def(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        let is_const = matches!(self.cur.kind, TokenKind::Keyword(Keyword::Const));
        self.bump()?;
        let (name, _) = self.expect_ident()?;
        let op = match self.cur.kind {
            TokenKind::Assign => {
                self.bump()?;
                AssignOp::Copy
            }
            TokenKind::AtEq => {
                self.bump()?;
                AssignOp::Shared
            }
            _ if self.dialect.declare_identifiers_without_assign_allowed => {
                return Ok(self.ast.push(NodeKind::Def { name, modifiers: DefModifiers { is_const }, op: AssignOp::Copy, value: None }, loc));
            }
            _ => return Err(TeaError::parsing(self.cur.loc, "expected ':=' or '@=' after variable name")),
        };
        let value = self.parse_expression()?;
        Ok(self.ast.push(NodeKind::Def { name, modifiers: DefModifiers { is_const }, op, value: Some(value) }, loc))
    }

    fn parse_if(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        self.bump()?;
        self.expect(|k| matches!(k, TokenKind::LParen), "'('")?;
        let cond = self.parse_expression()?;
        self.expect(|k| matches!(k, TokenKind::RParen), "')'")?;
        let then_branch = self.parse_block()?;
        self.skip_separators()?;
        let else_branch = if matches!(self.cur.kind, TokenKind::Keyword(Keyword::Else)) {
            self.bump()?;
            if matches!(self.cur.kind, TokenKind::Keyword(Keyword::If)) {
                Some(self.parse_if()?)
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(self.ast.push(NodeKind::If { cond, then_branch, else_branch }, loc))
    }

    fn parse_repeat(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        self.bump()?;
        let label = self.try_parse_label()?;
        let body = self.parse_block()?;
        Ok(self.ast.push(NodeKind::Repeat { label, body }, loc))
    }

    fn parse_forall(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        self.bump()?;
        let label = self.try_parse_label()?;
        self.expect(|k| matches!(k, TokenKind::LParen), "'('")?;
        let (binder, _) = self.expect_ident()?;
        self.expect(|k| matches!(k, TokenKind::Keyword(Keyword::In)), "'in'")?;
        let iterable = self.parse_expression()?;
        self.expect(|k| matches!(k, TokenKind::RParen), "')'")?;
        let body = self.parse_block()?;
        Ok(self.ast.push(NodeKind::Forall { label, binder, iterable, body }, loc))
    }

    fn parse_funcdef(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        self.bump()?;
        let (name, _) = self.expect_ident()?;
        self.expect(|k| matches!(k, TokenKind::LParen), "'('")?;
        let mut params = Vec::new();
        while !matches!(self.cur.kind, TokenKind::RParen) {
            params.push(self.parse_param()?);
            if matches!(self.cur.kind, TokenKind::Comma) {
                self.bump()?;
            }
        }
        self.bump()?; // ')'
        let body = self.parse_block()?;
        Ok(self.ast.push(NodeKind::FuncDef { name, params, body }, loc))
    }

    fn parse_param(&mut self) -> Result<Param, TeaError> {
        let loc = self.cur.loc;
        let mut explicit_const = None;
        if matches!(self.cur.kind, TokenKind::Keyword(Keyword::Const)) {
            explicit_const = Some(true);
            self.bump()?;
        } else if matches!(self.cur.kind, TokenKind::Keyword(Keyword::Def)) {
            explicit_const = Some(false);
            self.bump()?;
        }
        let (name, _) = self.expect_ident()?;
        let mut is_shared = self.dialect.parameters_are_default_shared;
        let mut is_auto = false;
        if matches!(self.cur.kind, TokenKind::AtEq) {
            self.bump()?;
            is_shared = true;
            is_auto = explicit_const.is_none() && self.dialect.shared_parameters_are_default_auto;
        }
        let is_const = explicit_const.unwrap_or(self.dialect.parameters_are_default_const);
        Ok(Param { name, is_const, is_shared, is_auto, loc })
    }

    fn parse_block(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        self.expect(|k| matches!(k, TokenKind::LBrace), "'{'")?;
        self.skip_separators()?;
        let mut stmts = Vec::new();
        while !matches!(self.cur.kind, TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
            let sep_loc = self.cur.loc;
            let had_separator = self.skip_separators()?;
            if !had_separator && !matches!(self.cur.kind, TokenKind::RBrace | TokenKind::Eof) {
                return Err(TeaError::parsing(sep_loc, "expected a statement separator (newline, ',', or ';') before the next statement"));
            }
        }
        self.expect(|k| matches!(k, TokenKind::RBrace), "'}'")?;
        Ok(self.ast.push(NodeKind::Block(stmts), loc))
    }

    pub fn parse_expression(&mut self) -> Result<NodeId, TeaError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        let target = self.parse_logical_or()?;
        let op = match self.cur.kind {
            TokenKind::Assign => AssignOp::Copy,
            TokenKind::AtEq => AssignOp::Shared,
            _ => return Ok(target),
        };
        self.bump()?;
        let value = self.parse_assignment()?;
        Ok(self.ast.push(NodeKind::Assign { target, op, value }, loc))
    }

    fn parse_logical_or(&mut self) -> Result<NodeId, TeaError> {
        let mut left = self.parse_logical_and()?;
        while matches!(self.cur.kind, TokenKind::Keyword(Keyword::Or)) {
            let loc = self.cur.loc;
            self.bump()?;
            let right = self.parse_logical_and()?;
            left = self.ast.push(NodeKind::Binary(BinaryOp::Or, left, right), loc);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<NodeId, TeaError> {
        let mut left = self.parse_equality()?;
        while matches!(self.cur.kind, TokenKind::Keyword(Keyword::And)) {
            let loc = self.cur.loc;
            self.bump()?;
            let right = self.parse_equality()?;
            left = self.ast.push(NodeKind::Binary(BinaryOp::And, left, right), loc);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<NodeId, TeaError> {
        let mut left = self.parse_bit()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::EqEq | TokenKind::Keyword(Keyword::Eq) => BinaryOp::Eq,
                TokenKind::NotEq | TokenKind::Keyword(Keyword::Ne) => BinaryOp::Ne,
                TokenKind::Lt | TokenKind::Keyword(Keyword::Lt) => BinaryOp::Lt,
                TokenKind::Le | TokenKind::Keyword(Keyword::Le) => BinaryOp::Le,
                TokenKind::Gt | TokenKind::Keyword(Keyword::Gt) => BinaryOp::Gt,
                TokenKind::Ge | TokenKind::Keyword(Keyword::Ge) => BinaryOp::Ge,
                TokenKind::AtAt => BinaryOp::SameCell,
                _ => break,
            };
            let loc = self.cur.loc;
            self.bump()?;
            let right = self.parse_bit()?;
            left = self.ast.push(NodeKind::Binary(op, left, right), loc);
        }
        Ok(left)
    }

    fn parse_bit(&mut self) -> Result<NodeId, TeaError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Keyword(Keyword::BitAnd) => BinaryOp::BitAnd,
                TokenKind::Keyword(Keyword::BitOr) => BinaryOp::BitOr,
                TokenKind::Keyword(Keyword::BitXor) => BinaryOp::BitXor,
                TokenKind::Keyword(Keyword::BitLsh) => BinaryOp::BitLsh,
                TokenKind::Keyword(Keyword::BitRsh) => BinaryOp::BitRsh,
                _ => break,
            };
            let loc = self.cur.loc;
            self.bump()?;
            let right = self.parse_additive()?;
            left = self.ast.push(NodeKind::Binary(op, left, right), loc);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<NodeId, TeaError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::Percent => BinaryOp::Concat,
                _ => break,
            };
            let loc = self.cur.loc;
            self.bump()?;
            let right = self.parse_multiplicative()?;
            left = self.ast.push(NodeKind::Binary(op, left, right), loc);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<NodeId, TeaError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Keyword(Keyword::Mod) => BinaryOp::Mod,
                _ => break,
            };
            let loc = self.cur.loc;
            self.bump()?;
            let right = self.parse_unary()?;
            left = self.ast.push(NodeKind::Binary(op, left, right), loc);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        match self.cur.kind {
            TokenKind::Minus => {
                self.bump()?;
                let e = self.parse_unary()?;
                Ok(self.ast.push(NodeKind::Unary(UnaryOp::Neg, e), loc))
            }
            TokenKind::Keyword(Keyword::Not) => {
                self.bump()?;
                let e = self.parse_unary()?;
                Ok(self.ast.push(NodeKind::Unary(UnaryOp::Not, e), loc))
            }
            TokenKind::Keyword(Keyword::BitNot) => {
                self.bump()?;
                let e = self.parse_unary()?;
                Ok(self.ast.push(NodeKind::Unary(UnaryOp::BitNot, e), loc))
            }
            TokenKind::Keyword(Keyword::Typeof) => {
                self.bump()?;
                let e = self.parse_unary()?;
                Ok(self.ast.push(NodeKind::Typeof(e), loc))
            }
            TokenKind::Keyword(Keyword::Typename) => {
                self.bump()?;
                let e = self.parse_unary()?;
                Ok(self.ast.push(NodeKind::Typename(e), loc))
            }
            TokenKind::Keyword(Keyword::IsDefined) => {
                self.bump()?;
                let (name, _) = self.expect_ident()?;
                Ok(self.ast.push(NodeKind::IsDefined(name), loc))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<NodeId, TeaError> {
        let mut node = self.parse_primary()?;
        loop {
            let loc = self.cur.loc;
            match self.cur.kind.clone() {
                TokenKind::Dot => {
                    self.bump()?;
                    let (name, _) = self.expect_ident()?;
                    node = self.ast.push(NodeKind::Dot { target: node, name }, loc);
                }
                TokenKind::LBracket => {
                    self.bump()?;
                    let index = self.parse_expression()?;
                    self.expect(|k| matches!(k, TokenKind::RBracket), "']'")?;
                    node = self.ast.push(NodeKind::Index { target: node, index }, loc);
                }
                TokenKind::LParen => {
                    self.bump()?;
                    let mut args = Vec::new();
                    while !matches!(self.cur.kind, TokenKind::RParen) {
                        args.push(self.parse_expression()?);
                        if matches!(self.cur.kind, TokenKind::Comma) {
                            self.bump()?;
                        }
                    }
                    self.bump()?; // ')'
                    node = self.ast.push(NodeKind::Call { callee: node, args }, loc);
                }
                TokenKind::Keyword(Keyword::As) => {
                    self.bump()?;
                    let (type_name, _) = self.expect_ident()?;
                    node = self.ast.push(NodeKind::As { expr: node, type_name }, loc);
                }
                TokenKind::Keyword(Keyword::Is) => {
                    self.bump()?;
                    let (type_name, _) = self.expect_ident()?;
                    node = self.ast.push(NodeKind::Is { expr: node, type_name }, loc);
                }
                TokenKind::Keyword(Keyword::Catch) => {
                    self.bump()?;
                    let binder = if matches!(self.cur.kind, TokenKind::LParen) {
                        self.bump()?;
                        let (id, _) = self.expect_ident()?;
                        self.expect(|k| matches!(k, TokenKind::RParen), "')'")?;
                        Some(id)
                    } else {
                        None
                    };
                    let handler = if matches!(self.cur.kind, TokenKind::LBrace) { self.parse_block()? } else { self.parse_expression()? };
                    node = self.ast.push(NodeKind::Catch { expr: node, binder, handler }, loc);
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_tuple_element(&mut self) -> Result<(Option<String>, NodeId), TeaError> {
        if let TokenKind::Ident(_) = self.cur.kind {
            if matches!(self.peek2()?.kind, TokenKind::Colon) {
                let (name, _) = self.expect_ident()?;
                self.bump()?; // ':'
                let value = self.parse_expression()?;
                return Ok((Some(name), value));
            }
        }
        Ok((None, self.parse_expression()?))
    }

    fn parse_primary(&mut self) -> Result<NodeId, TeaError> {
        let loc = self.cur.loc;
        match self.cur.kind.clone() {
            TokenKind::Int(n) => {
                self.bump()?;
                Ok(self.ast.push(NodeKind::Literal(Literal::I64(n)), loc))
            }
            TokenKind::UInt(n) => {
                self.bump()?;
                Ok(self.ast.push(NodeKind::Literal(Literal::U64(n)), loc))
            }
            TokenKind::Float(f) => {
                self.bump()?;
                Ok(self.ast.push(NodeKind::Literal(Literal::F64(f)), loc))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump()?;
                Ok(self.ast.push(NodeKind::Literal(Literal::Bool(true)), loc))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump()?;
                Ok(self.ast.push(NodeKind::Literal(Literal::Bool(false)), loc))
            }
            TokenKind::Str(parts) => {
                self.bump()?;
                let mut out = Vec::with_capacity(parts.len());
                for p in parts {
                    match p {
                        StringPartTok::Literal(s) => out.push(StringPart::Literal(s)),
                        StringPartTok::Expr(src) => {
                            let mut sub = Parser::new(SourceCursor::new(&src, loc.file_id), self.dialect)?;
                            let node = sub.parse_expression()?;
                            // Splice the sub-parser's arena nodes into ours by
                            // re-pushing each in order (small expressions; the
                            // index remap is a simple append-and-offset).
                            let offset = self.ast.len() as u32;
                            for i in 0..sub.ast.len() {
                                let n = sub.ast.get(NodeId(i as u32)).clone();
                                self.ast.push(remap_node(n.kind, offset), n.loc);
                            }
                            out.push(StringPart::Expr(NodeId(node.0 + offset)));
                        }
                    }
                }
                Ok(self.ast.push(NodeKind::StringLit(out), loc))
            }
            TokenKind::Ident(name) => {
                self.bump()?;
                Ok(self.ast.push(NodeKind::Identifier(name), loc))
            }
            TokenKind::LParen => {
                self.bump()?;
                if matches!(self.cur.kind, TokenKind::RParen) {
                    self.bump()?;
                    return Ok(self.ast.push(NodeKind::TupleLit(vec![]), loc));
                }
                let first = self.parse_tuple_element()?;
                if matches!(self.cur.kind, TokenKind::RParen) && first.0.is_none() {
                    self.bump()?;
                    return Ok(first.1);
                }
                let mut elems = vec![first];
                while matches!(self.cur.kind, TokenKind::Comma) {
                    self.bump()?;
                    if matches!(self.cur.kind, TokenKind::RParen) {
                        break;
                    }
                    elems.push(self.parse_tuple_element()?);
                }
                self.expect(|k| matches!(k, TokenKind::RParen), "')'")?;
                Ok(self.ast.push(NodeKind::TupleLit(elems), loc))
            }
            other => Err(TeaError::parsing(loc, format!("unexpected token {other:?}"))),
        }
    }
}

/// Shift every `NodeId` referenced inside a spliced sub-expression's kind by
/// `offset`, so it resolves correctly once appended to the parent arena.
fn remap_node(kind: NodeKind, offset: u32) -> NodeKind {
    let r = |id: NodeId| NodeId(id.0 + offset);
    match kind {
        NodeKind::Unary(op, a) => NodeKind::Unary(op, r(a)),
        NodeKind::Binary(op, a, b) => NodeKind::Binary(op, r(a), r(b)),
        NodeKind::Assign { target, op, value } => NodeKind::Assign { target: r(target), op, value: r(value) },
        NodeKind::Def { name, modifiers, op, value } => NodeKind::Def { name, modifiers, op, value: value.map(r) },
        NodeKind::Debug(a) => NodeKind::Debug(r(a)),
        NodeKind::Block(v) => NodeKind::Block(v.into_iter().map(r).collect()),
        NodeKind::If { cond, then_branch, else_branch } => NodeKind::If { cond: r(cond), then_branch: r(then_branch), else_branch: else_branch.map(r) },
        NodeKind::Repeat { label, body } => NodeKind::Repeat { label, body: r(body) },
        NodeKind::Forall { label, binder, iterable, body } => NodeKind::Forall { label, binder, iterable: r(iterable), body: r(body) },
        NodeKind::FuncDef { name, params, body } => NodeKind::FuncDef { name, params, body: r(body) },
        NodeKind::Return(a) => NodeKind::Return(a.map(r)),
        NodeKind::Stop { label, with_expr } => NodeKind::Stop { label, with_expr: with_expr.map(r) },
        NodeKind::Yield(a) => NodeKind::Yield(a.map(r)),
        NodeKind::Exit(a) => NodeKind::Exit(r(a)),
        NodeKind::Call { callee, args } => NodeKind::Call { callee: r(callee), args: args.into_iter().map(r).collect() },
        NodeKind::Dot { target, name } => NodeKind::Dot { target: r(target), name },
        NodeKind::Index { target, index } => NodeKind::Index { target: r(target), index: r(index) },
        NodeKind::TupleLit(elems) => NodeKind::TupleLit(elems.into_iter().map(|(k, v)| (k, r(v))).collect()),
        NodeKind::As { expr, type_name } => NodeKind::As { expr: r(expr), type_name },
        NodeKind::Is { expr, type_name } => NodeKind::Is { expr: r(expr), type_name },
        NodeKind::Typeof(a) => NodeKind::Typeof(r(a)),
        NodeKind::Typename(a) => NodeKind::Typename(r(a)),
        NodeKind::Catch { expr, binder, handler } => NodeKind::Catch { expr: r(expr), binder, handler: r(handler) },
        NodeKind::StringLit(parts) => NodeKind::StringLit(
            parts
                .into_iter()
                .map(|p| match p {
                    StringPart::Literal(s) => StringPart::Literal(s),
                    StringPart::Expr(id) => StringPart::Expr(r(id)),
                })
                .collect(),
        ),
        other @ (NodeKind::Literal(_) | NodeKind::Identifier(_) | NodeKind::Undef(_) | NodeKind::IsDefined(_) | NodeKind::Loop { .. } | NodeKind::Suspend) => other,
    }
}

/// Incremental/partial-parse front end (§4.6's `parse_partial` contract).
/// Internally re-parses the whole accumulated buffer on every call rather
/// than resuming mid-token; this preserves the *observable* contract (same
/// results, same errors, no re-lexing visible to the caller beyond the
/// extra CPU work) while avoiding genuinely incremental lexer/parser state.
pub struct PartialParser {
    buffer: String,
    file_id: u32,
    dialect: Dialect,
}

impl PartialParser {
    pub fn new(file_id: u32, dialect: Dialect) -> Self {
        PartialParser { buffer: String::new(), file_id, dialect }
    }

    fn trial_parse(&self) -> Result<(), TeaError> {
        let mut p = Parser::new(SourceCursor::new(&self.buffer, self.file_id), self.dialect)?;
        p.parse_program()
    }

    fn looks_unterminated(e: &TeaError) -> bool {
        e.message.contains("unterminated")
    }

    /// Accepts a whole-line fragment. Returns `Ok(())` whether the buffer is
    /// a complete parse or still has an open construct; only a genuine
    /// syntax error (not an "unterminated ..." one) is surfaced here.
    pub fn parse_partial(&mut self, chunk: &str) -> Result<(), TeaError> {
        self.buffer.push_str(chunk);
        match self.trial_parse() {
            Ok(()) => Ok(()),
            Err(e) if Self::looks_unterminated(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Finalizes the accumulated input, failing if anything is still open.
    pub fn parse_partial_end(mut self) -> Result<Ast, TeaError> {
        let mut p = Parser::new(SourceCursor::new(&self.buffer, self.file_id), self.dialect)?;
        p.parse_program()?;
        Ok(std::mem::take(&mut p.ast))
    }
}
