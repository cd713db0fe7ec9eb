//! Lexer and recursive-descent parser for model formulas.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! formula := expr '~' expr
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | name | name '(' expr ')' | '(' expr ')'
//! ```

use crate::formula::FormulaError;
use crate::formula::expr::{BinOp, Expr, Func};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    Tilde,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Number(v) => format!("number {v}"),
            TokenKind::Ident(name) => format!("name '{name}'"),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Caret => "'^'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Tilde => "'~'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn tokenize(text: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        let simple = match ch {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '/' => Some(TokenKind::Slash),
            '^' => Some(TokenKind::Caret),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            '~' => Some(TokenKind::Tilde),
            _ => None,
        };
        if let Some(kind) = simple {
            tokens.push(Token { kind, pos });
            i += 1;
            continue;
        }

        if ch == '*' {
            let is_pow = matches!(chars.get(i + 1), Some((_, '*')));
            let kind = if is_pow { TokenKind::Caret } else { TokenKind::Star };
            tokens.push(Token { kind, pos });
            i += if is_pow { 2 } else { 1 };
            continue;
        }

        // `.x` is a name, `.5` a number.
        let dot_name = ch == '.'
            && chars
                .get(i + 1)
                .is_some_and(|&(_, c)| c.is_alphabetic() || matches!(c, '_' | '.'));

        if ch.is_ascii_digit() || (ch == '.' && !dot_name) {
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            // Optional exponent: e.g. `1e-3`, `2.5E4`.
            if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let end = chars.get(i).map_or(text.len(), |(p, _)| *p);
            let literal = &text[pos..end];
            let value: f64 = literal
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| FormulaError::InvalidNumber {
                    text: literal.to_string(),
                    pos,
                })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                pos,
            });
            continue;
        }

        if ch.is_alphabetic() || ch == '_' || dot_name {
            while i < chars.len() && (chars[i].1.is_alphanumeric() || matches!(chars[i].1, '_' | '.')) {
                i += 1;
            }
            let end = chars.get(i).map_or(text.len(), |(p, _)| *p);
            tokens.push(Token {
                kind: TokenKind::Ident(text[pos..end].to_string()),
                pos,
            });
            continue;
        }

        return Err(FormulaError::UnexpectedChar { ch, pos });
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.idx);
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(token: &Token) -> FormulaError {
        FormulaError::UnexpectedToken {
            found: token.kind.describe(),
            pos: token.pos,
        }
    }

    /// Parse one complete expression; trailing tokens are an error.
    fn parse_all(mut self) -> Result<Expr, FormulaError> {
        let expr = self.expr()?;
        match self.next() {
            None => Ok(expr),
            Some(token) => Err(Self::unexpected(token)),
        }
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.idx += 1;
            let rhs = self.term()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.idx += 1;
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.eat(&TokenKind::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if self.eat(&TokenKind::Caret) {
            let exponent = self.unary()?;
            return Ok(Expr::binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let token = self.next().ok_or(FormulaError::UnexpectedEnd)?;
        match &token.kind {
            TokenKind::Number(v) => Ok(Expr::Number(*v)),
            TokenKind::Ident(name) => {
                if !self.eat(&TokenKind::LParen) {
                    return Ok(Expr::Symbol(name.clone()));
                }
                let func =
                    Func::from_name(name).ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
                let arg = self.expr()?;
                self.close_paren()?;
                Ok(Expr::Call {
                    func,
                    arg: Box::new(arg),
                })
            }
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.close_paren()?;
                Ok(inner)
            }
            _ => Err(Self::unexpected(token)),
        }
    }

    fn close_paren(&mut self) -> Result<(), FormulaError> {
        match self.next() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => Ok(()),
            Some(token) => Err(Self::unexpected(token)),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}

/// Parse a standalone expression (no `~`).
pub fn parse_expr(text: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(text)?;
    if let Some(tilde) = tokens.iter().find(|t| t.kind == TokenKind::Tilde) {
        return Err(Parser::unexpected(tilde));
    }
    if tokens.is_empty() {
        return Err(FormulaError::UnexpectedEnd);
    }
    Parser::new(&tokens).parse_all()
}

/// Parse `response ~ predictor` into its two sides.
pub fn parse_formula(text: &str) -> Result<(Expr, Expr), FormulaError> {
    let tokens = tokenize(text)?;
    let tildes: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.kind == TokenKind::Tilde)
        .map(|(idx, _)| idx)
        .collect();
    let [split] = tildes.as_slice() else {
        return Err(FormulaError::Tilde);
    };

    let (lhs, rhs) = (&tokens[..*split], &tokens[split + 1..]);
    if lhs.is_empty() {
        return Err(FormulaError::MissingSide("response"));
    }
    if rhs.is_empty() {
        return Err(FormulaError::MissingSide("predictor"));
    }
    Ok((Parser::new(lhs).parse_all()?, Parser::new(rhs).parse_all()?))
}
