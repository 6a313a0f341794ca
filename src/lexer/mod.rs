//! Lexer for the supported C subset.
//!
//! Maps a character stream onto a token stream while tracking the file name,
//! line and column for diagnostics. The parser drives it through
//! [`Lexer::next`], [`Lexer::peek`] and [`Lexer::unget`]; the pushback buffer
//! holds exactly one token.
mod token;

pub use self::token::*;

use once_cell::sync::Lazy;
use std::{collections::HashMap, error::Error, fmt::Display};

static KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    let mut m = HashMap::new();

    m.insert("void", Keyword::Void);
    m.insert("char", Keyword::Char);
    m.insert("int", Keyword::Int);
    m.insert("float", Keyword::Float);
    m.insert("double", Keyword::Double);
    m.insert("for", Keyword::For);
    m.insert("do", Keyword::Do);
    m.insert("while", Keyword::While);
    m.insert("if", Keyword::If);
    m.insert("else", Keyword::Else);
    m.insert("return", Keyword::Return);

    m
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub position: (String, usize, usize),
}

pub type LexResult<T> = Result<T, LexError>;

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (file, line, col) = &self.position;
        write!(f, "{} ({}:{}:{})", self.message, file, line, col)
    }
}

impl Error for LexError {}

#[derive(Debug, Clone)]
pub struct Lexer {
    input: Vec<u8>,
    pos: usize,
    fname: String,
    line: usize,
    column: usize,
    prev_column: usize,
    untoken: Option<Token>,
}

impl Lexer {
    pub fn new(fname: impl Into<String>, input: &str) -> Self {
        Self {
            input: input.as_bytes().to_vec(),
            pos: 0,
            fname: fname.into(),
            line: 1,
            column: 0,
            prev_column: 0,
            untoken: None,
        }
    }

    pub fn fname(&self) -> &str {
        &self.fname
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Consume the next token, or `None` at end of input.
    pub fn next(&mut self) -> LexResult<Option<Token>> {
        if let Some(token) = self.untoken.take() {
            return Ok(Some(token));
        }
        self.lex_token()
    }

    /// Look at the next token without consuming it.
    pub fn peek(&mut self) -> LexResult<Option<Token>> {
        if self.untoken.is_none() {
            self.untoken = self.lex_token()?;
        }
        Ok(self.untoken.clone())
    }

    /// Push back one token. The buffer holds a single token; pushing twice is
    /// a contract violation.
    pub fn unget(&mut self, token: Token) {
        assert!(self.untoken.is_none(), "token pushback buffer is full");
        self.untoken = Some(token);
    }

    fn err(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            position: (self.fname.clone(), self.line, self.column),
        }
    }

    fn get_c(&mut self) -> Option<u8> {
        let c = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.prev_column = self.column;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn unget_c(&mut self) {
        assert!(self.pos > 0);
        self.pos -= 1;
        if self.input[self.pos] == b'\n' {
            self.line -= 1;
            self.column = self.prev_column;
        } else {
            self.column -= 1;
        }
    }

    fn expect_c(&mut self, expected: u8) -> bool {
        match self.get_c() {
            Some(c) if c == expected => true,
            Some(_) => {
                self.unget_c();
                false
            }
            None => false,
        }
    }

    fn eat_whitespace(&mut self) {
        while let Some(c) = self.get_c() {
            if !matches!(c, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r') {
                self.unget_c();
                return;
            }
        }
    }

    fn lex_token(&mut self) -> LexResult<Option<Token>> {
        self.eat_whitespace();

        let position = (self.line, self.column + 1);
        let Some(c) = self.get_c() else {
            return Ok(None);
        };

        let token = match c {
            b'\'' => self.lex_char(position)?,
            b'"' => self.lex_string(position)?,
            b'0'..=b'9' => self.lex_number(c, position)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_id(c, position),
            _ => self.lex_punct(c, position)?,
        };

        Ok(Some(token))
    }

    fn lex_punct(&mut self, c: u8, position: Position) -> LexResult<Token> {
        use Punct::*;

        let punct = match c {
            b'[' => LBracket,
            b']' => RBracket,
            b'(' => LParen,
            b')' => RParen,
            b'{' => LBrace,
            b'}' => RBrace,
            b'.' => Dot,
            b'~' => Tilde,
            b':' => Colon,
            b',' => Comma,
            b';' => Semicolon,
            b'?' => Question,

            b'+' => match self.get_c() {
                Some(b'+') => Inc,
                Some(b'=') => AddAssign,
                Some(_) => {
                    self.unget_c();
                    Plus
                }
                None => Plus,
            },
            b'-' => match self.get_c() {
                Some(b'-') => Dec,
                Some(b'=') => SubAssign,
                Some(b'>') => Arrow,
                Some(_) => {
                    self.unget_c();
                    Minus
                }
                None => Minus,
            },
            b'&' => match self.get_c() {
                Some(b'&') => LogAnd,
                Some(b'=') => AndAssign,
                Some(_) => {
                    self.unget_c();
                    Amp
                }
                None => Amp,
            },
            b'|' => match self.get_c() {
                Some(b'|') => LogOr,
                Some(b'=') => OrAssign,
                Some(_) => {
                    self.unget_c();
                    Pipe
                }
                None => Pipe,
            },
            b'*' => {
                if self.expect_c(b'=') {
                    MulAssign
                } else {
                    Star
                }
            }
            b'/' => {
                if self.expect_c(b'=') {
                    DivAssign
                } else {
                    Slash
                }
            }
            b'%' => {
                if self.expect_c(b'=') {
                    ModAssign
                } else {
                    Percent
                }
            }
            b'^' => {
                if self.expect_c(b'=') {
                    XorAssign
                } else {
                    Caret
                }
            }
            b'=' => {
                if self.expect_c(b'=') {
                    Eq
                } else {
                    Assign
                }
            }
            b'!' => {
                if self.expect_c(b'=') {
                    Ne
                } else {
                    Not
                }
            }
            b'<' => match self.get_c() {
                Some(b'=') => Le,
                Some(b'<') => {
                    if self.expect_c(b'=') {
                        ShlAssign
                    } else {
                        Shl
                    }
                }
                Some(_) => {
                    self.unget_c();
                    Lt
                }
                None => Lt,
            },
            b'>' => match self.get_c() {
                Some(b'=') => Ge,
                Some(b'>') => {
                    if self.expect_c(b'=') {
                        ShrAssign
                    } else {
                        Shr
                    }
                }
                Some(_) => {
                    self.unget_c();
                    Gt
                }
                None => Gt,
            },

            _ => return Err(self.err(format!("unknown character '{}'", c as char))),
        };

        Ok(Token::Punct { punct, position })
    }

    fn lex_escape(&mut self) -> LexResult<u8> {
        let Some(c) = self.get_c() else {
            return Err(self.err("unknown escape sequence at end of input"));
        };
        match c {
            b'\'' | b'"' | b'?' | b'\\' => Ok(c),
            b'a' => Ok(0x07),
            b'b' => Ok(0x08),
            b'f' => Ok(0x0c),
            b'n' => Ok(b'\n'),
            b'r' => Ok(b'\r'),
            b't' => Ok(b'\t'),
            b'v' => Ok(0x0b),
            _ => Err(self.err(format!("unknown escape sequence '\\{}'", c as char))),
        }
    }

    fn lex_char(&mut self, position: Position) -> LexResult<Token> {
        let Some(c) = self.get_c() else {
            return Err(self.err("missing terminating ' character"));
        };
        let value = if c == b'\\' { self.lex_escape()? } else { c };
        if self.get_c() != Some(b'\'') {
            return Err(self.err("missing terminating ' character"));
        }
        Ok(Token::CharLit { value, position })
    }

    fn lex_string(&mut self, position: Position) -> LexResult<Token> {
        let mut value = Vec::new();

        loop {
            match self.get_c() {
                Some(b'"') => break,
                Some(b'\\') => value.push(self.lex_escape()?),
                Some(c) => value.push(c),
                None => return Err(self.err("missing terminating \" character")),
            }
        }

        Ok(Token::Str {
            value: String::from_utf8_lossy(&value).into_owned(),
            position,
        })
    }

    fn lex_id(&mut self, c: u8, position: Position) -> Token {
        let mut name = vec![c];

        while let Some(c) = self.get_c() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                name.push(c);
            } else {
                self.unget_c();
                break;
            }
        }

        let name = String::from_utf8_lossy(&name).into_owned();
        match KEYWORDS.get(name.as_str()) {
            Some(&keyword) => Token::Keyword { keyword, position },
            None => Token::Id { name, position },
        }
    }

    /// Read a numeric literal. Only decimal int, float and double are
    /// supported; the raw text is kept, typing happens at parse time.
    fn lex_number(&mut self, c: u8, position: Position) -> LexResult<Token> {
        let mut text = vec![c];

        let mut c = self.get_c();
        while let Some(d) = c {
            if !d.is_ascii_digit() {
                break;
            }
            text.push(d);
            c = self.get_c();
        }
        if matches!(c, Some(b'f') | Some(b'F')) {
            return Err(self.err("invalid suffix \"f\" on integer constant"));
        }
        if c == Some(b'.') {
            text.push(b'.');
            c = self.get_c();
            if !matches!(c, Some(d) if d.is_ascii_digit()) {
                return Err(self.err("expected digit after '.'"));
            }
            while let Some(d) = c {
                if !d.is_ascii_digit() {
                    break;
                }
                text.push(d);
                c = self.get_c();
            }
        }
        if matches!(c, Some(b'e') | Some(b'E')) {
            text.push(c.unwrap());
            c = self.get_c();
            if matches!(c, Some(b'-') | Some(b'+')) {
                text.push(c.unwrap());
                c = self.get_c();
            }
            if !matches!(c, Some(d) if d.is_ascii_digit()) {
                return Err(self.err("expected digit after 'e' or 'E'"));
            }
            while let Some(d) = c {
                if !d.is_ascii_digit() {
                    break;
                }
                text.push(d);
                c = self.get_c();
            }
        }
        match c {
            Some(b'f') | Some(b'F') => text.push(c.unwrap()),
            Some(_) => self.unget_c(),
            None => {}
        }

        Ok(Token::Number {
            text: String::from_utf8_lossy(&text).into_owned(),
            position,
        })
    }
}
