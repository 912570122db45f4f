//! Line-oriented expression interpreter behind `execute_code`
//!
//! One statement per line: `name = expr`, an augmented assignment such as
//! `total += 1`, or a bare expression. Values are ints, floats, strings and
//! `None`, with Python-flavoured arithmetic. `print(...)` writes to a
//! captured buffer that becomes the call's output. Variables persist between
//! runs; a failing line keeps what earlier lines assigned.

use std::collections::HashMap;
use std::fmt;

use crate::error::{HostError, HostResult};

/// Deepest bracket, unary or power nesting a line may use
pub const MAX_NESTING: usize = 64;

/// Longest line, in tokens
pub const MAX_LINE_TOKENS: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    None,
    Int(i64),
    Float(f64),
    Str(String),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::None => "NoneType",
            ScriptValue::Int(_) => "int",
            ScriptValue::Float(_) => "float",
            ScriptValue::Str(_) => "str",
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::None => f.write_str("None"),
            ScriptValue::Int(i) => write!(f, "{i}"),
            ScriptValue::Float(x) => f.write_str(&format_float(*x)),
            ScriptValue::Str(s) => f.write_str(s),
        }
    }
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        let text = if x > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else if x != 0.0 && (x.abs() >= 1e16 || x.abs() < 1e-4) {
        let text = format!("{x:e}");
        match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp:0>2}"),
            Some((mantissa, exp)) => format!("{mantissa}e-{:0>2}", &exp[1..]),
            None => text,
        }
    } else if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// Error raised while running one line
#[derive(Debug)]
struct Fault {
    kind: &'static str,
    message: String,
}

impl Fault {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn syntax(message: impl Into<String>) -> Self {
        Self::new("SyntaxError", message)
    }

    fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    fn name_error(name: &str) -> Self {
        Self::new("NameError", format!("name '{name}' is not defined"))
    }

    fn overflow() -> Self {
        Self::new("OverflowError", "integer result too large")
    }

    fn zero_division(message: &str) -> Self {
        Self::new("ZeroDivisionError", message)
    }
}

type Eval<T> = Result<T, Fault>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "**=", "//=", "**", "//", "+=", "-=", "*=", "/=", "%=", "+", "-", "*", "/", "%", "=", "(", ")", ",",
];

const AUGMENTED: &[&str] = &["+=", "-=", "*=", "/=", "//=", "%=", "**="];

fn tokenize(line: &str) -> Eval<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < line.len() {
        if tokens.len() > MAX_LINE_TOKENS {
            return Err(Fault::syntax(format!("line longer than {MAX_LINE_TOKENS} tokens")));
        }
        let rest = &line[pos..];
        let Some(c) = rest.chars().next() else { break };

        if c.is_whitespace() {
            pos += c.len_utf8();
        } else if c == '#' {
            break;
        } else if c.is_ascii_digit() || (c == '.' && rest[1..].starts_with(|n: char| n.is_ascii_digit())) {
            let (token, len) = number_token(rest)?;
            tokens.push(token);
            pos += len;
        } else if c == '"' || c == '\'' {
            let (text, len) = string_token(rest, c)?;
            tokens.push(Token::Str(text));
            pos += len;
        } else if c.is_alphabetic() || c == '_' {
            let len = rest
                .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            tokens.push(Token::Ident(rest[..len].to_string()));
            pos += len;
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            tokens.push(Token::Op(*op));
            pos += op.len();
        } else {
            return Err(Fault::syntax(format!("invalid character '{c}'")));
        }
    }
    Ok(tokens)
}

fn number_token(text: &str) -> Eval<(Token, usize)> {
    let bytes = text.as_bytes();
    let digits = |mut i: usize| {
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
            i += 1;
        }
        i
    };

    let mut end = digits(0);
    let mut is_float = false;
    if end < bytes.len() && bytes[end] == b'.' {
        is_float = true;
        end = digits(end + 1);
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            is_float = true;
            end = digits(exp);
        }
    }

    let literal: String = text[..end].chars().filter(|c| *c != '_').collect();
    let token = if is_float {
        Token::Float(
            literal
                .parse()
                .map_err(|_| Fault::syntax(format!("invalid number '{literal}'")))?,
        )
    } else {
        Token::Int(literal.parse().map_err(|_| Fault::overflow())?)
    };
    Ok((token, end))
}

fn string_token(text: &str, quote: char) -> Eval<(String, usize)> {
    let mut value = String::new();
    let mut chars = text.char_indices().skip(1);

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            c if c == quote => return Ok((value, i + c.len_utf8())),
            c => value.push(c),
        }
    }
    Err(Fault::syntax("unterminated string literal"))
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(ScriptValue),
    Name(String),
    Negate(Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn parse(tokens: &'a [Token]) -> Eval<Expr> {
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.sum()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(Fault::syntax(format!("unexpected {}", describe(token)))),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn eat_op(&mut self, candidates: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if candidates.contains(op) => {
                self.pos += 1;
                Some(*op)
            }
            _ => None,
        }
    }

    /// Parse one nesting level deeper, refusing past `MAX_NESTING`
    fn nested(&mut self, parse: fn(&mut Self) -> Eval<Expr>) -> Eval<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(Fault::syntax("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn sum(&mut self) -> Eval<Expr> {
        let mut left = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
        Ok(left)
    }

    fn term(&mut self) -> Eval<Expr> {
        let mut left = self.factor()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            left = Expr::Binary(op, Box::new(left), Box::new(self.factor()?));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Eval<Expr> {
        match self.eat_op(&["-", "+"]) {
            Some("-") => Ok(Expr::Negate(Box::new(self.nested(Self::factor)?))),
            Some(_) => self.nested(Self::factor),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Eval<Expr> {
        let base = self.primary()?;
        if self.eat_op(&["**"]).is_some() {
            // Right associative, and binds tighter than a unary minus on its left
            return Ok(Expr::Binary("**", Box::new(base), Box::new(self.nested(Self::factor)?)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Eval<Expr> {
        let Some(token) = self.peek() else {
            return Err(Fault::syntax("unexpected end of line"));
        };
        self.pos += 1;

        match token {
            Token::Int(i) => Ok(Expr::Literal(ScriptValue::Int(*i))),
            Token::Float(f) => Ok(Expr::Literal(ScriptValue::Float(*f))),
            Token::Str(s) => Ok(Expr::Literal(ScriptValue::Str(s.clone()))),
            Token::Op("(") => {
                let inner = self.nested(Self::sum)?;
                self.eat_op(&[")"]).ok_or_else(|| Fault::syntax("expected ')'"))?;
                Ok(inner)
            }
            Token::Ident(name) if name == "None" => Ok(Expr::Literal(ScriptValue::None)),
            Token::Ident(name) if self.eat_op(&["("]).is_some() => Ok(Expr::Call(name.clone(), self.arguments()?)),
            Token::Ident(name) => Ok(Expr::Name(name.clone())),
            Token::Op(op) => Err(Fault::syntax(format!("unexpected '{op}'"))),
        }
    }

    fn arguments(&mut self) -> Eval<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat_op(&[")"]).is_some() {
            return Ok(args);
        }
        loop {
            args.push(self.nested(Self::sum)?);
            match self.eat_op(&[",", ")"]) {
                Some(",") => {
                    if self.eat_op(&[")"]).is_some() {
                        return Ok(args);
                    }
                }
                Some(_) => return Ok(args),
                None => return Err(Fault::syntax("expected ',' or ')'")),
            }
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => format!("number {i}"),
        Token::Float(f) => format!("number {f}"),
        Token::Str(_) => "string".to_string(),
        Token::Ident(name) => format!("name '{name}'"),
        Token::Op(op) => format!("'{op}'"),
    }
}

/// Interpreter session with persistent variables
#[derive(Debug, Default)]
pub struct Interpreter {
    variables: HashMap<String, ScriptValue>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `source` line by line, returning everything it printed
    pub fn run(&mut self, source: &str) -> HostResult<String> {
        let mut output = String::new();
        for (index, line) in source.lines().enumerate() {
            self.run_line(line, &mut output).map_err(|fault| HostError::ScriptError {
                line: index + 1,
                kind: fault.kind.to_string(),
                message: fault.message,
            })?;
        }
        Ok(output)
    }

    pub fn variable(&self, name: &str) -> Option<&ScriptValue> {
        self.variables.get(name)
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }

    fn run_line(&mut self, line: &str, output: &mut String) -> Eval<()> {
        let tokens = tokenize(line)?;
        match tokens.as_slice() {
            [] => {}
            [Token::Ident(name), Token::Op("="), rest @ ..] => {
                let value = self.eval(&Parser::parse(rest)?, output)?;
                self.assign(name, value)?;
            }
            [Token::Ident(name), Token::Op(op), rest @ ..] if AUGMENTED.contains(op) => {
                let current = self.lookup(name)?;
                let value = self.eval(&Parser::parse(rest)?, output)?;
                let result = binary(&op[..op.len() - 1], current, value)?;
                self.assign(name, result)?;
            }
            _ => {
                self.eval(&Parser::parse(&tokens)?, output)?;
            }
        }
        Ok(())
    }

    fn assign(&mut self, name: &str, value: ScriptValue) -> Eval<()> {
        if name == "None" {
            return Err(Fault::syntax("cannot assign to None"));
        }
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Eval<ScriptValue> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| Fault::name_error(name))
    }

    fn eval(&self, expr: &Expr, output: &mut String) -> Eval<ScriptValue> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.lookup(name),
            Expr::Negate(inner) => match self.eval(inner, output)? {
                ScriptValue::Int(i) => i.checked_neg().map(ScriptValue::Int).ok_or_else(Fault::overflow),
                ScriptValue::Float(f) => Ok(ScriptValue::Float(-f)),
                other => Err(Fault::type_error(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, output)?;
                let right = self.eval(right, output)?;
                binary(op, left, right)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, output))
                    .collect::<Eval<Vec<_>>>()?;
                call_builtin(name, args, output)
            }
        }
    }
}

fn binary(op: &str, left: ScriptValue, right: ScriptValue) -> Eval<ScriptValue> {
    match (op, &left, &right) {
        ("+", ScriptValue::Str(a), ScriptValue::Str(b)) => Ok(ScriptValue::Str(format!("{a}{b}"))),
        ("*", ScriptValue::Str(s), ScriptValue::Int(n)) | ("*", ScriptValue::Int(n), ScriptValue::Str(s)) => {
            Ok(ScriptValue::Str(s.repeat(usize::try_from(*n).unwrap_or(0))))
        }
        (_, ScriptValue::Int(a), ScriptValue::Int(b)) => int_binary(op, *a, *b),
        (_, ScriptValue::Int(_) | ScriptValue::Float(_), ScriptValue::Int(_) | ScriptValue::Float(_)) => {
            float_binary(op, as_f64(&left), as_f64(&right))
        }
        _ => Err(Fault::type_error(format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn as_f64(value: &ScriptValue) -> f64 {
    match value {
        ScriptValue::Int(i) => *i as f64,
        ScriptValue::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn int_binary(op: &str, a: i64, b: i64) -> Eval<ScriptValue> {
    let int = |value: Option<i64>| value.map(ScriptValue::Int).ok_or_else(Fault::overflow);
    match op {
        "+" => int(a.checked_add(b)),
        "-" => int(a.checked_sub(b)),
        "*" => int(a.checked_mul(b)),
        "/" => float_binary(op, a as f64, b as f64),
        "//" | "%" if b == 0 => Err(Fault::zero_division("integer division or modulo by zero")),
        "//" => {
            let quotient = a.checked_div(b).ok_or_else(Fault::overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(ScriptValue::Int(if adjust { quotient - 1 } else { quotient }))
        }
        "%" => {
            let remainder = a.checked_rem(b).ok_or_else(Fault::overflow)?;
            let adjust = remainder != 0 && ((remainder < 0) != (b < 0));
            Ok(ScriptValue::Int(if adjust { remainder + b } else { remainder }))
        }
        "**" => match u32::try_from(b) {
            Ok(exp) => int(a.checked_pow(exp)),
            Err(_) if b < 0 => float_binary(op, a as f64, b as f64),
            Err(_) => Err(Fault::overflow()),
        },
        _ => Err(Fault::syntax(format!("unknown operator '{op}'"))),
    }
}

fn float_binary(op: &str, a: f64, b: f64) -> Eval<ScriptValue> {
    let value = match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" | "//" | "%" if b == 0.0 => return Err(Fault::zero_division("division by zero")),
        "/" => a / b,
        "//" => (a / b).floor(),
        "%" => a - b * (a / b).floor(),
        "**" if a == 0.0 && b < 0.0 => {
            return Err(Fault::zero_division("0.0 cannot be raised to a negative power"));
        }
        "**" => a.powf(b),
        _ => return Err(Fault::syntax(format!("unknown operator '{op}'"))),
    };
    Ok(ScriptValue::Float(value))
}

fn call_builtin(name: &str, args: Vec<ScriptValue>, output: &mut String) -> Eval<ScriptValue> {
    match (name, args.as_slice()) {
        ("print", _) => {
            let line: Vec<String> = args.iter().map(ToString::to_string).collect();
            output.push_str(&line.join(" "));
            output.push('\n');
            Ok(ScriptValue::None)
        }
        ("str", [value]) => Ok(ScriptValue::Str(value.to_string())),
        ("len", [ScriptValue::Str(s)]) => Ok(ScriptValue::Int(s.chars().count() as i64)),
        ("len", [other]) => Err(Fault::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
        ("str" | "len", _) => Err(Fault::type_error(format!(
            "{name}() takes exactly one argument ({} given)",
            args.len()
        ))),
        _ => Err(Fault::name_error(name)),
    }
}
