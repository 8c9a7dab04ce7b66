//! Lexer (C6, half of it): turns a [`SourceCursor`] into a stream of
//! [`Token`]s on demand — no token vector is materialized up front, so a
//! partial parse can hand the lexer a fresh cursor over each incoming chunk
//! while the parser's own state (open comments, open raw strings, pending
//! AST) persists across calls (§4.6).

use teascript_core::{SourceCursor, SourceLocation, TeaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Def,
    Const,
    Mutable,
    Undef,
    IsDefined,
    Debug,
    As,
    Is,
    In,
    If,
    Else,
    Stop,
    With,
    Loop,
    Repeat,
    Return,
    Forall,
    Func,
    Typeof,
    Typename,
    Suspend,
    Yield,
    And,
    Or,
    Not,
    Mod,
    BitNot,
    BitAnd,
    BitOr,
    BitXor,
    BitLsh,
    BitRsh,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    Eq,
    True,
    False,
    Catch,
}

fn keyword_of(ident: &str) -> Option<Keyword> {
    use Keyword::*;
    Some(match ident {
        "def" => Def,
        "const" => Const,
        "mutable" => Mutable,
        "undef" => Undef,
        "is_defined" => IsDefined,
        "debug" => Debug,
        "as" => As,
        "is" => Is,
        "in" => In,
        "if" => If,
        "else" => Else,
        "stop" => Stop,
        "with" => With,
        "loop" => Loop,
        "repeat" => Repeat,
        "return" => Return,
        "forall" => Forall,
        "func" => Func,
        "typeof" => Typeof,
        "typename" => Typename,
        "suspend" => Suspend,
        "yield" => Yield,
        "and" => And,
        "or" => Or,
        "not" => Not,
        "mod" => Mod,
        "bit_not" => BitNot,
        "bit_and" => BitAnd,
        "bit_or" => BitOr,
        "bit_xor" => BitXor,
        "bit_lsh" => BitLsh,
        "bit_rsh" => BitRsh,
        "lt" => Lt,
        "le" => Le,
        "gt" => Gt,
        "ge" => Ge,
        "ne" => Ne,
        "eq" => Eq,
        "true" => True,
        "false" => False,
        "catch" => Catch,
        _ => return None,
    })
}

#[derive(Debug, Clone)]
pub enum StringPartTok {
    Literal(String),
    /// Raw, unparsed source text of a `%( … )` embedded expression.
    Expr(String),
}

#[derive(Debug, Clone)]
pub enum TokenKind {
    Eof,
    Newline,
    Comma,
    Semicolon,
    Colon,
    Dot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    At,
    AtEq,
    AtAt,
    AtQuestion,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Ident(String),
    Keyword(Keyword),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(Vec<StringPartTok>),
    /// A `##…` directive line, raw text after the `##` to end of line.
    HashLine(String),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLocation,
}

pub struct Lexer {
    cursor: SourceCursor,
}

impl Lexer {
    pub fn new(cursor: SourceCursor) -> Self {
        Lexer { cursor }
    }

    fn here(&mut self) -> SourceLocation {
        SourceLocation::point(self.cursor.file_id(), self.cursor.line() as u32, self.cursor.col() as u32)
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(c) = self.cursor.current() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.cursor.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comments_and_space(&mut self) -> Result<(), TeaError> {
        loop {
            self.skip_inline_whitespace();
            match (self.cursor.current(), self.cursor.peek(1)) {
                (Some('/'), Some('/')) => {
                    self.cursor.scan_to_next_line();
                }
                (Some('/'), Some('*')) => {
                    let start = self.here();
                    self.cursor.advance_by(2);
                    let mut closed = false;
                    while !self.cursor.is_at_end() {
                        if self.cursor.current() == Some('*') && self.cursor.peek(1) == Some('/') {
                            self.cursor.advance_by(2);
                            closed = true;
                            break;
                        }
                        self.cursor.advance();
                    }
                    if !closed {
                        return Err(TeaError::parsing(start, "unterminated block comment"));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.cursor.current() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.cursor.advance();
            } else {
                break;
            }
        }
        s
    }

    fn read_number(&mut self) -> Result<TokenKind, TeaError> {
        let loc = self.here();
        let mut raw = String::new();
        if self.cursor.current() == Some('0') && matches!(self.cursor.peek(1), Some('x') | Some('X')) {
            raw.push(self.cursor.advance().unwrap());
            raw.push(self.cursor.advance().unwrap());
            while let Some(c) = self.cursor.current() {
                if c.is_ascii_hexdigit() {
                    raw.push(c);
                    self.cursor.advance();
                } else {
                    break;
                }
            }
            let n = i64::from_str_radix(&raw[2..], 16).map_err(|_| TeaError::parsing(loc, "invalid hex literal"))?;
            self.consume_int_suffix();
            return Ok(TokenKind::Int(n));
        }
        let mut is_float = false;
        while let Some(c) = self.cursor.current() {
            if c.is_ascii_digit() {
                raw.push(c);
                self.cursor.advance();
            } else if c == '.' && self.cursor.peek(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                is_float = true;
                raw.push(c);
                self.cursor.advance();
            } else if (c == 'e' || c == 'E') && !raw.is_empty() {
                is_float = true;
                raw.push(c);
                self.cursor.advance();
                if matches!(self.cursor.current(), Some('+') | Some('-')) {
                    raw.push(self.cursor.advance().unwrap());
                }
            } else {
                break;
            }
        }
        if !is_float {
            if let Some(suffix) = self.peek_suffix() {
                match suffix.as_str() {
                    "u8" | "u64" => {
                        self.consume_int_suffix();
                        let n: u64 = raw.parse().map_err(|_| TeaError::parsing(loc, "invalid integer literal"))?;
                        return Ok(TokenKind::UInt(n));
                    }
                    "i64" => {
                        self.consume_int_suffix();
                    }
                    "f64" => {
                        self.consume_int_suffix();
                        let n: f64 = raw.parse().map_err(|_| TeaError::parsing(loc, "invalid float literal"))?;
                        return Ok(TokenKind::Float(n));
                    }
                    _ => {}
                }
            }
            let n: i64 = raw.parse().map_err(|_| TeaError::parsing(loc, "invalid integer literal"))?;
            Ok(TokenKind::Int(n))
        } else {
            if self.peek_suffix().as_deref() == Some("f64") {
                self.consume_int_suffix();
            }
            let n: f64 = raw.parse().map_err(|_| TeaError::parsing(loc, "invalid float literal"))?;
            Ok(TokenKind::Float(n))
        }
    }

    fn peek_suffix(&self) -> Option<String> {
        let mut s = String::new();
        let mut i = 0isize;
        while let Some(c) = self.cursor.peek(i) {
            if c.is_alphanumeric() {
                s.push(c);
                i += 1;
            } else {
                break;
            }
        }
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    fn consume_int_suffix(&mut self) {
        while let Some(c) = self.cursor.current() {
            if c.is_alphanumeric() {
                self.cursor.advance();
            } else {
                break;
            }
        }
    }

    /// Reads a `"…"` or `"""…"""` string literal starting at the opening
    /// quote. Escapes: `\t \r \n \" \\ \%`. `%( expr )` segments are
    /// captured as raw, unparsed source (the parser re-lexes them).
    fn read_string(&mut self) -> Result<TokenKind, TeaError> {
        let start = self.here();
        let mut quote_run = 0;
        while self.cursor.current() == Some('"') {
            quote_run += 1;
            self.cursor.advance();
        }
        let triple = quote_run >= 3;
        // A lone `""` (quote_run == 2, not triple) is the empty string.
        if quote_run == 2 && !triple {
            return Ok(TokenKind::Str(vec![]));
        }

        let mut parts = Vec::new();
        let mut literal = String::new();
        loop {
            if self.cursor.is_at_end() {
                return Err(TeaError::parsing(start, "unterminated string literal"));
            }
            let c = self.cursor.current().unwrap();
            if !triple && c == '"' {
                self.cursor.advance();
                break;
            }
            if triple && c == '"' {
                let mut run = 0;
                let save = self.cursor.pos();
                while self.cursor.current() == Some('"') {
                    run += 1;
                    self.cursor.advance();
                }
                if run >= quote_run {
                    break;
                }
                // Not enough quotes to close: they were literal content.
                self.cursor.jump(save);
                literal.push(self.cursor.advance().unwrap());
                continue;
            }
            if !triple && c == '\\' {
                self.cursor.advance();
                let esc = self.cursor.advance().ok_or_else(|| TeaError::parsing(start, "unterminated escape"))?;
                literal.push(match esc {
                    't' => '\t',
                    'r' => '\r',
                    'n' => '\n',
                    '"' => '"',
                    '\\' => '\\',
                    '%' => '%',
                    other => return Err(TeaError::parsing(start, format!("unknown string escape '\\{other}'"))),
                });
                continue;
            }
            if !triple && c == '%' && self.cursor.peek(1) == Some('(') {
                if !literal.is_empty() {
                    parts.push(StringPartTok::Literal(std::mem::take(&mut literal)));
                }
                self.cursor.advance_by(2);
                let mut depth = 1;
                let mut expr_src = String::new();
                while depth > 0 {
                    let Some(c) = self.cursor.current() else {
                        return Err(TeaError::parsing(start, "unterminated %( ) interpolation"));
                    };
                    self.cursor.advance();
                    match c {
                        '(' => {
                            depth += 1;
                            expr_src.push(c);
                        }
                        ')' => {
                            depth -= 1;
                            if depth > 0 {
                                expr_src.push(c);
                            }
                        }
                        _ => expr_src.push(c),
                    }
                }
                parts.push(StringPartTok::Expr(expr_src));
                continue;
            }
            literal.push(c);
            self.cursor.advance();
        }
        if !literal.is_empty() || parts.is_empty() {
            parts.push(StringPartTok::Literal(literal));
        }
        Ok(TokenKind::Str(parts))
    }

    pub fn next_token(&mut self) -> Result<Token, TeaError> {
        self.skip_comments_and_space()?;
        let loc = self.here();
        if self.cursor.is_at_end() {
            return Ok(Token { kind: TokenKind::Eof, loc });
        }
        let c = self.cursor.current().unwrap();

        if c == '\n' {
            self.cursor.advance();
            return Ok(Token { kind: TokenKind::Newline, loc });
        }

        if c == '#' && self.cursor.peek(1) == Some('#') && loc.start_col == 1 {
            self.cursor.advance_by(2);
            let mut text = String::new();
            while let Some(c) = self.cursor.current() {
                if c == '\n' {
                    break;
                }
                text.push(c);
                self.cursor.advance();
            }
            return Ok(Token { kind: TokenKind::HashLine(text.trim().to_string()), loc });
        }

        if c.is_ascii_digit() {
            return Ok(Token { kind: self.read_number()?, loc });
        }
        if c == '"' {
            return Ok(Token { kind: self.read_string()?, loc });
        }
        if c.is_alphabetic() || c == '_' {
            let ident = self.read_ident();
            let kind = match keyword_of(&ident) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident(ident),
            };
            return Ok(Token { kind, loc });
        }

        macro_rules! two {
            ($second:expr, $then:expr, $else_:expr) => {{
                if self.cursor.peek(1) == Some($second) {
                    self.cursor.advance_by(2);
                    $then
                } else {
                    self.cursor.advance();
                    $else_
                }
            }};
        }

        let kind = match c {
            ',' => { self.cursor.advance(); TokenKind::Comma }
            ';' => { self.cursor.advance(); TokenKind::Semicolon }
            ':' => two!('=', TokenKind::Assign, TokenKind::Colon),
            '.' => { self.cursor.advance(); TokenKind::Dot }
            '(' => { self.cursor.advance(); TokenKind::LParen }
            ')' => { self.cursor.advance(); TokenKind::RParen }
            '{' => { self.cursor.advance(); TokenKind::LBrace }
            '}' => { self.cursor.advance(); TokenKind::RBrace }
            '[' => { self.cursor.advance(); TokenKind::LBracket }
            ']' => { self.cursor.advance(); TokenKind::RBracket }
            '+' => { self.cursor.advance(); TokenKind::Plus }
            '-' => { self.cursor.advance(); TokenKind::Minus }
            '*' => { self.cursor.advance(); TokenKind::Star }
            '/' => { self.cursor.advance(); TokenKind::Slash }
            '%' => { self.cursor.advance(); TokenKind::Percent }
            '=' => two!('=', TokenKind::EqEq, { return Err(TeaError::parsing(loc, "unexpected '='; did you mean ':=' or '=='?")); }),
            '!' => two!('=', TokenKind::NotEq, { return Err(TeaError::parsing(loc, "unexpected '!'")); }),
            '<' => two!('=', TokenKind::Le, TokenKind::Lt),
            '>' => two!('=', TokenKind::Ge, TokenKind::Gt),
            '@' => {
                if self.cursor.peek(1) == Some('=') {
                    self.cursor.advance_by(2);
                    TokenKind::AtEq
                } else if self.cursor.peek(1) == Some('@') {
                    self.cursor.advance_by(2);
                    TokenKind::AtAt
                } else if self.cursor.peek(1) == Some('?') {
                    self.cursor.advance_by(2);
                    TokenKind::AtQuestion
                } else {
                    self.cursor.advance();
                    TokenKind::At
                }
            }
            other => return Err(TeaError::parsing(loc, format!("unexpected character '{other}'"))),
        };
        Ok(Token { kind, loc })
    }
}
