use std::fmt;

use log::debug;

use crate::shell::source::ByteSource;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    Word(String),
    Semicolon,
    Pipe,
    And,
    Or,
    LeftParen,
    RightParen,
    LeftRedirect,  // <
    RightRedirect, // >
    Newline,
    Unknown(char),
}

impl TokenKind {
    /// Tokens that can close a command: a word or the end of a subshell.
    pub fn ends_command(&self) -> bool {
        matches!(self, TokenKind::Word(_) | TokenKind::RightParen)
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Semicolon | TokenKind::Pipe | TokenKind::And | TokenKind::Or
        )
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, TokenKind::LeftRedirect | TokenKind::RightRedirect)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(word) => write!(f, "{}", word),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::And => write!(f, "&&"),
            TokenKind::Or => write!(f, "||"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftRedirect => write!(f, "<"),
            TokenKind::RightRedirect => write!(f, ">"),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Unknown(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Self { kind, line }
    }
}

/// Characters allowed inside a word besides ASCII letters and digits.
const WORD_PUNCTUATION: &[u8] = b"!%+,-./:@^_";

pub fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || WORD_PUNCTUATION.contains(&byte)
}

pub struct Lexer<S: ByteSource> {
    source: S,
    peeked: Option<u8>,
    line: usize,
    // 文件开头的空行不产生 token，但仍然计入行号
    at_start: bool,
}

impl<S: ByteSource> Lexer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            peeked: None,
            line: 1,
            at_start: true,
        }
    }

    pub fn next_token(&mut self) -> Option<Token> {
        loop {
            let byte = self.read_byte()?;
            let line = self.line;

            let kind = match byte {
                b'#' => {
                    self.skip_comment();
                    continue;
                }
                b'\n' => {
                    self.line += 1;
                    if self.at_start {
                        continue;
                    }
                    TokenKind::Newline
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => continue,
                b'&' => {
                    if self.peek_byte() == Some(b'&') {
                        self.read_byte();
                        TokenKind::And
                    } else {
                        TokenKind::Unknown('&')
                    }
                }
                b'|' => {
                    if self.peek_byte() == Some(b'|') {
                        self.read_byte();
                        TokenKind::Or
                    } else {
                        TokenKind::Pipe
                    }
                }
                b';' => TokenKind::Semicolon,
                b'(' => TokenKind::LeftParen,
                b')' => TokenKind::RightParen,
                b'<' => TokenKind::LeftRedirect,
                b'>' => TokenKind::RightRedirect,
                b if is_word_byte(b) => self.read_word(b),
                other => TokenKind::Unknown(other as char),
            };

            self.at_start = false;
            return Some(Token::new(kind, line));
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.peeked.take().or_else(|| self.source.next_byte())
    }

    fn peek_byte(&mut self) -> Option<u8> {
        if self.peeked.is_none() {
            self.peeked = self.source.next_byte();
        }
        self.peeked
    }

    // 注释一直吃到行尾，换行符本身留给下一轮处理
    fn skip_comment(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b == b'\n' {
                break;
            }
            self.read_byte();
        }
    }

    fn read_word(&mut self, first: u8) -> TokenKind {
        let mut word = String::from(first as char);
        while let Some(b) = self.peek_byte() {
            if !is_word_byte(b) {
                break;
            }
            self.read_byte();
            word.push(b as char);
        }
        TokenKind::Word(word)
    }
}

impl<S: ByteSource> Iterator for Lexer<S> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Tokenizes a whole source. Never fails: bad characters become
/// `TokenKind::Unknown` and are reported by the validator.
pub fn tokenize<S: ByteSource>(source: S) -> Vec<Token> {
    let tokens: Vec<Token> = Lexer::new(source).collect();
    debug!("词法分析完成，共 {} 个 token", tokens.len());
    tokens
}
