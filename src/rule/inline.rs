// Inline Expression Implementation
//
// Two small languages share one lexer here:
//  * data node declarations such as `ds_${0..1}.t_order_${[0, 1, 2, 3]}`, which
//    expand to the cartesian product of their placeholders, and
//  * algorithm expressions such as `t_order_${order_id % 4}`, which evaluate
//    arithmetic over sharding column values.
// Both `${...}` and `$->{...}` placeholders are accepted.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use crate::common::{ConfigError, DataNode, DataValue, ShardingError, ShardingResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Integer(i64),
    Float(f64),
    Text(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    DotDot,
}

fn inline_error(expression: &str, reason: impl Into<String>) -> ShardingError {
    ConfigError::InlineExpression {
        expression: expression.to_string(),
        reason: reason.into(),
    }
    .into()
}

struct Lexer<'a> {
    source: &'a str,
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer { source, input: source.chars().peekable() }
    }

    fn tokenize(mut self) -> ShardingResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&ch) = self.input.peek() {
            if ch.is_whitespace() {
                self.input.next();
                continue;
            }
            let token = match ch {
                '0'..='9' => self.read_number()?,
                '\'' | '"' => self.read_string(ch)?,
                c if c.is_alphabetic() || c == '_' => self.read_identifier(),
                '.' => {
                    self.input.next();
                    if self.input.next_if_eq(&'.').is_none() {
                        return Err(inline_error(self.source, "single '.' inside placeholder"));
                    }
                    Token::DotDot
                }
                _ => {
                    self.input.next();
                    match ch {
                        '+' => Token::Plus,
                        '-' => Token::Minus,
                        '*' => Token::Star,
                        '/' => Token::Slash,
                        '%' => Token::Percent,
                        '(' => Token::LeftParen,
                        ')' => Token::RightParen,
                        '[' => Token::LeftBracket,
                        ']' => Token::RightBracket,
                        ',' => Token::Comma,
                        other => return Err(inline_error(self.source, format!("unexpected character '{}'", other))),
                    }
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn read_number(&mut self) -> ShardingResult<Token> {
        let mut number = String::new();
        while let Some(&c) = self.input.peek() {
            if c.is_ascii_digit() {
                number.push(c);
                self.input.next();
            } else if c == '.' {
                // `0..3` is a range, `1.5` a float
                let mut lookahead = self.input.clone();
                lookahead.next();
                if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) && !number.contains('.') {
                    number.push('.');
                    self.input.next();
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        if number.contains('.') {
            number.parse::<f64>().map(Token::Float).map_err(|e| inline_error(self.source, e.to_string()))
        } else {
            number.parse::<i64>().map(Token::Integer).map_err(|e| inline_error(self.source, e.to_string()))
        }
    }

    fn read_string(&mut self, quote: char) -> ShardingResult<Token> {
        self.input.next();
        let mut text = String::new();
        for c in self.input.by_ref() {
            if c == quote {
                return Ok(Token::Text(text));
            }
            text.push(c);
        }
        Err(inline_error(self.source, "unterminated string literal"))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(&c) = self.input.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.input.next();
            } else {
                break;
            }
        }
        Token::Ident(ident)
    }
}

/// Piece of a template: literal text or the body of a placeholder
#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Placeholder(String),
}

/// Split `prefix_${body}_suffix` into pieces.
fn split_template(template: &str) -> ShardingResult<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('$') {
        let after = &rest[start + 1..];
        let open_len = if after.starts_with('{') {
            1
        } else if after.starts_with("->{") {
            3
        } else {
            return Err(inline_error(template, "'$' must start a placeholder"));
        };
        if start > 0 {
            pieces.push(Piece::Text(rest[..start].to_string()));
        }
        let body_start = start + 1 + open_len;
        let mut depth = 1;
        let mut end = None;
        for (offset, c) in rest[body_start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(body_start + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end.ok_or_else(|| inline_error(template, "unclosed placeholder"))?;
        pieces.push(Piece::Placeholder(rest[body_start..end].trim().to_string()));
        rest = &rest[end + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest.to_string()));
    }
    Ok(pieces)
}

/// Split on commas that sit outside placeholders.
fn split_top_level(expression: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in expression.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Values of one expansion placeholder: `a..b` or `[x, y, ...]`.
fn placeholder_values(template: &str, body: &str) -> ShardingResult<Vec<String>> {
    let tokens = Lexer::new(body).tokenize()?;
    match tokens.as_slice() {
        [Token::Integer(lo), Token::DotDot, Token::Integer(hi)] => {
            if lo > hi {
                return Err(inline_error(template, format!("empty range {}..{}", lo, hi)));
            }
            Ok((*lo..=*hi).map(|i| i.to_string()).collect())
        }
        [Token::LeftBracket, inner @ .., Token::RightBracket] => {
            let mut values = Vec::new();
            for (i, token) in inner.iter().enumerate() {
                let expect_value = i % 2 == 0;
                match (expect_value, token) {
                    (true, Token::Integer(v)) => values.push(v.to_string()),
                    (true, Token::Text(v)) | (true, Token::Ident(v)) => values.push(v.clone()),
                    (false, Token::Comma) => {}
                    _ => return Err(inline_error(template, format!("malformed list placeholder '{}'", body))),
                }
            }
            Ok(values)
        }
        [Token::Integer(v)] => Ok(vec![v.to_string()]),
        [Token::Text(v)] | [Token::Ident(v)] => Ok(vec![v.clone()]),
        _ => Err(inline_error(template, format!("unsupported placeholder '{}'", body))),
    }
}

/// Expand an inline declaration into every concrete string it denotes,
/// first placeholder outermost.
pub fn expand(expression: &str) -> ShardingResult<Vec<String>> {
    let mut result = Vec::new();
    for part in split_top_level(expression) {
        let mut partials = vec![String::new()];
        for piece in split_template(&part)? {
            match piece {
                Piece::Text(text) => partials.iter_mut().for_each(|p| p.push_str(&text)),
                Piece::Placeholder(body) => {
                    let values = placeholder_values(&part, &body)?;
                    partials = partials
                        .iter()
                        .flat_map(|prefix| values.iter().map(move |v| format!("{}{}", prefix, v)))
                        .collect();
                }
            }
        }
        result.extend(partials);
    }
    Ok(result)
}

/// Expand an actual-data-nodes declaration.
pub fn expand_data_nodes(expression: &str) -> ShardingResult<Vec<DataNode>> {
    let nodes = expand(expression)?
        .iter()
        .map(|text| DataNode::parse(text))
        .collect::<ShardingResult<Vec<_>>>()?;
    if nodes.is_empty() {
        return Err(inline_error(expression, "expression yields no data nodes"));
    }
    Ok(nodes)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    fn from_token(token: &Token) -> Option<Self> {
        match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Mod),
            _ => None,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(DataValue),
    Variable(String),
    Negate(Box<Expr>),
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
}

struct ExprParser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> ExprParser<'a> {
    fn parse(source: &'a str, body: &str) -> ShardingResult<Expr> {
        let mut parser = ExprParser { source, tokens: Lexer::new(body).tokenize()?, position: 0 };
        let expr = parser.parse_expression(0)?;
        if parser.position != parser.tokens.len() {
            return Err(inline_error(source, format!("trailing tokens in '{}'", body)));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn parse_expression(&mut self, precedence: u8) -> ShardingResult<Expr> {
        let mut left = self.parse_prefix()?;
        while let Some(op) = self.peek().and_then(BinaryOp::from_token) {
            if op.precedence() <= precedence {
                break;
            }
            self.advance();
            let right = self.parse_expression(op.precedence())?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> ShardingResult<Expr> {
        match self.advance() {
            Some(Token::Integer(i)) => Ok(Expr::Literal(DataValue::Integer(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(DataValue::Float(f))),
            Some(Token::Text(s)) => Ok(Expr::Literal(DataValue::Text(s))),
            Some(Token::Ident(name)) => Ok(Expr::Variable(name)),
            Some(Token::Minus) => Ok(Expr::Negate(Box::new(self.parse_expression(3)?))),
            Some(Token::LeftParen) => {
                let inner = self.parse_expression(0)?;
                match self.advance() {
                    Some(Token::RightParen) => Ok(inner),
                    _ => Err(inline_error(self.source, "missing ')'")),
                }
            }
            other => Err(inline_error(self.source, format!("unexpected token {:?}", other))),
        }
    }
}

fn evaluate(source: &str, expr: &Expr, variables: &HashMap<String, DataValue>) -> ShardingResult<DataValue> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Variable(name) => variables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| inline_error(source, format!("no value bound for '{}'", name))),
        Expr::Negate(inner) => match evaluate(source, inner, variables)? {
            DataValue::Integer(i) => Ok(DataValue::Integer(-i)),
            DataValue::Float(f) => Ok(DataValue::Float(-f)),
            other => Err(inline_error(source, format!("cannot negate {}", other.type_name()))),
        },
        Expr::Binary { op, left, right } => {
            let l = evaluate(source, left, variables)?;
            let r = evaluate(source, right, variables)?;
            apply(source, *op, &l, &r)
        }
    }
}

fn apply(source: &str, op: BinaryOp, left: &DataValue, right: &DataValue) -> ShardingResult<DataValue> {
    if op == BinaryOp::Add && (matches!(left, DataValue::Text(_)) || matches!(right, DataValue::Text(_))) {
        return Ok(DataValue::Text(format!("{}{}", left, right)));
    }
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        if !matches!(left, DataValue::Float(_)) && !matches!(right, DataValue::Float(_)) {
            let value = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => a.checked_div(b),
                // Non-negative so that suffixes always name an existing shard
                BinaryOp::Mod => a.checked_rem_euclid(b),
            };
            return value
                .map(DataValue::Integer)
                .ok_or_else(|| inline_error(source, format!("arithmetic error evaluating {} {:?} {}", a, op, b)));
        }
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(DataValue::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a.rem_euclid(b),
        })),
        _ => Err(inline_error(
            source,
            format!("cannot apply {:?} to {} and {}", op, left.type_name(), right.type_name()),
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expr),
}

/// Compiled algorithm expression such as `t_order_${order_id % 4}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineExpression {
    source: String,
    segments: Vec<Segment>,
}

impl InlineExpression {
    pub fn parse(source: &str) -> ShardingResult<Self> {
        let segments = split_template(source)?
            .into_iter()
            .map(|piece| match piece {
                Piece::Text(text) => Ok(Segment::Text(text)),
                Piece::Placeholder(body) => ExprParser::parse(source, &body).map(Segment::Expr),
            })
            .collect::<ShardingResult<Vec<_>>>()?;
        if !segments.iter().any(|s| matches!(s, Segment::Expr(_))) {
            return Err(inline_error(source, "algorithm expression has no placeholder"));
        }
        Ok(Self { source: source.to_string(), segments })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the target name for one set of column values.
    pub fn evaluate(&self, variables: &HashMap<String, DataValue>) -> ShardingResult<String> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Expr(expr) => {
                    let value = evaluate(&self.source, expr, variables)?;
                    rendered.push_str(&value.to_string());
                }
            }
        }
        Ok(rendered)
    }
}
