//! Line tokenizer for the SBC textual form, modeled after the teacher's
//! SPIR-V assembly tokenizer (`spirq-spvasm::asm::tokenizer`) but scaled
//! down to the one-opcode-per-line grammar `co_<name> arg1 arg2 ...`.
use anyhow::{anyhow, Result};

#[derive(PartialEq, Clone, Debug)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    NewLine,
}

pub struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}
impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Tokenizer { src, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }
    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn read_string(&mut self) -> Result<Token> {
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some(c) => out.push(c),
                    None => return Err(anyhow!("unterminated escape in string literal")),
                },
                Some(c) => out.push(c),
                None => return Err(anyhow!("unterminated string literal")),
            }
        }
        Ok(Token::Str(out))
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.pos;
        if self.peek_char() == Some('-') {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' && !is_float {
                is_float = true;
                self.bump();
            } else if (c == 'e' || c == 'E') && !self.src[start..self.pos].is_empty() {
                is_float = true;
                self.bump();
                if matches!(self.peek_char(), Some('+') | Some('-')) {
                    self.bump();
                }
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            Ok(Token::Float(text.parse()?))
        } else {
            Ok(Token::Int(text.parse()?))
        }
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '[' || c == ']' {
                self.bump();
            } else {
                break;
            }
        }
        Token::Ident(self.src[start..self.pos].to_owned())
    }

    pub fn next(&mut self) -> Option<Result<Token>> {
        loop {
            match self.peek_char()? {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    continue;
                }
                '#' => {
                    self.skip_line_comment();
                    continue;
                }
                '\n' => {
                    self.bump();
                    return Some(Ok(Token::NewLine));
                }
                '"' => return Some(self.read_string()),
                c if c.is_ascii_digit() || (c == '-' && self.looks_like_number()) => {
                    return Some(self.read_number())
                }
                _ => return Some(Ok(self.read_ident())),
            }
        }
    }

    fn looks_like_number(&self) -> bool {
        self.src[self.pos..]
            .chars()
            .nth(1)
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token>;
    fn next(&mut self) -> Option<Self::Item> {
        Tokenizer::next(self)
    }
}
