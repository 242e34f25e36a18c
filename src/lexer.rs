//! # Lexer Module
//!
//! Tokenizes Emberscript source code into a stream of tokens.
//!
//! The scanner handles:
//! - Case-insensitive keywords (original lexemes are preserved for
//!   diagnostics)
//! - Identifiers, digit runs and double-quoted strings (no escapes)
//! - Operators, including `->` for explicit references
//! - Comments (from `;` to end of line)
//! - Significant newlines (statement terminators)
//!
//! Digit runs stay textual and `.` is its own token: whether `a.b` is a
//! member access or a floating-point literal is decided by the semantic
//! analyzer, not here.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::ErrorHandler;
use crate::token::{Token, TokenKind, TokenLoc};

/// Scanner state for tokenizing Emberscript source code
pub struct Lexer<'a> {
    /// Source code as character array
    input: Vec<char>,
    /// Current position in input
    position: usize,
    /// Current character
    current_char: Option<char>,
    /// Current line number
    line: u32,
    /// Current column number
    column: u32,
    /// Name of the compilation unit, copied into every token
    source_name: &'a str,
}

impl<'a> Lexer<'a> {
    /// Create a new scanner for the given source code
    pub fn new(input: &str, source_name: &'a str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();
        Lexer {
            input: chars,
            position: 0,
            current_char,
            line: 1,
            column: 1,
            source_name,
        }
    }

    fn loc(&self, line: u32, column: u32, literal: &str) -> TokenLoc {
        TokenLoc::new(line, column, self.source_name, literal)
    }

    /// Advance to the next character
    fn advance(&mut self) {
        if let Some('\n') = self.current_char {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    /// Peek at the next character without consuming
    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Skip whitespace (but NOT newlines - they terminate statements)
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char {
            if c == ' ' || c == '\t' || c == '\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Skip a comment (from `;` to end of line)
    fn skip_comment(&mut self) {
        while let Some(c) = self.current_char {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Read a string literal. Emberscript strings have no escape
    /// sequences; a backslash is just a character.
    fn read_string(&mut self, errors: &mut dyn ErrorHandler) -> Token {
        let line = self.line;
        let column = self.column;

        // Skip opening quote
        self.advance();

        let mut result = String::new();
        let mut terminated = false;

        while let Some(c) = self.current_char {
            if c == '"' {
                self.advance();
                terminated = true;
                break;
            } else if c == '\n' {
                break;
            } else {
                result.push(c);
                self.advance();
            }
        }

        let loc = self.loc(line, column, &result);
        if !terminated {
            errors.error("Unterminated string literal.", &loc);
        }
        Token::new(TokenKind::Str(result), loc)
    }

    /// Read a run of decimal digits. The value stays textual so the
    /// analyzer can stitch `a.b` back into a float when both sides are
    /// digit runs.
    fn read_number(&mut self) -> Token {
        let line = self.line;
        let column = self.column;
        let start = self.position;

        while let Some(c) = self.current_char {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        let loc = self.loc(line, column, &text);
        Token::new(TokenKind::Num(text), loc)
    }

    /// Read an identifier or keyword. Keywords match case-insensitively;
    /// the token location keeps the original spelling.
    fn read_identifier_or_keyword(&mut self) -> Token {
        let line = self.line;
        let column = self.column;
        let start = self.position;

        while let Some(c) = self.current_char {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        let lower = text.to_lowercase();
        let loc = self.loc(line, column, &text);

        match TokenKind::keyword(&lower) {
            Some(kind) => Token::new(kind, loc),
            None => Token::new(TokenKind::Name(text), loc),
        }
    }

    /// Emit a single-character operator token
    fn single(&mut self, kind: TokenKind, literal: &str) -> Token {
        let loc = self.loc(self.line, self.column, literal);
        self.advance();
        Token::new(kind, loc)
    }

    /// Get the next token from the input
    pub fn next_token(&mut self, errors: &mut dyn ErrorHandler) -> Token {
        self.skip_whitespace();

        match self.current_char {
            None => Token::new(TokenKind::Eof, self.loc(self.line, self.column, "")),

            Some('\n') => self.single(TokenKind::Newline, "\n"),

            Some(';') => {
                self.skip_comment();
                self.next_token(errors)
            }

            Some('"') => self.read_string(errors),

            Some(c) if c.is_ascii_digit() => self.read_number(),

            Some(c) if c.is_alphabetic() || c == '_' => self.read_identifier_or_keyword(),

            Some('=') => {
                let line = self.line;
                let column = self.column;
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::new(TokenKind::Eq, self.loc(line, column, "=="))
                } else {
                    // Lone `=` is accepted as the comparison operator; the
                    // legacy corpus is full of it.
                    Token::new(TokenKind::Eq, self.loc(line, column, "="))
                }
            }

            Some('!') => {
                let line = self.line;
                let column = self.column;
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::new(TokenKind::Neq, self.loc(line, column, "!="))
                } else {
                    let loc = self.loc(line, column, "!");
                    errors.error("Invalid character '!'.", &loc);
                    self.next_token(errors)
                }
            }

            Some('<') => {
                let line = self.line;
                let column = self.column;
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::new(TokenKind::Lte, self.loc(line, column, "<="))
                } else {
                    Token::new(TokenKind::Lt, self.loc(line, column, "<"))
                }
            }

            Some('>') => {
                let line = self.line;
                let column = self.column;
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::new(TokenKind::Gte, self.loc(line, column, ">="))
                } else {
                    Token::new(TokenKind::Gt, self.loc(line, column, ">"))
                }
            }

            Some('-') => {
                let line = self.line;
                let column = self.column;
                self.advance();
                if self.current_char == Some('>') {
                    self.advance();
                    Token::new(TokenKind::Arrow, self.loc(line, column, "->"))
                } else {
                    Token::new(TokenKind::Minus, self.loc(line, column, "-"))
                }
            }

            Some('+') => self.single(TokenKind::Plus, "+"),
            Some('*') => self.single(TokenKind::Star, "*"),
            Some('/') => self.single(TokenKind::Slash, "/"),
            Some('.') => self.single(TokenKind::Dot, "."),
            Some(',') => self.single(TokenKind::Comma, ","),
            Some('(') => self.single(TokenKind::LParen, "("),
            Some(')') => self.single(TokenKind::RParen, ")"),

            Some(c) => {
                let loc = self.loc(self.line, self.column, "");
                errors.error(&alloc::format!("Invalid character '{}'.", c), &loc);
                self.advance();
                self.next_token(errors)
            }
        }
    }

    /// Tokenize the entire input into a vector ending with `Eof`
    pub fn tokenize(&mut self, errors: &mut dyn ErrorHandler) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token(errors);
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);

            if is_eof {
                break;
            }
        }

        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorLog, WarningMode};
    use alloc::string::ToString;

    fn scan(source: &str) -> (Vec<Token>, ErrorLog) {
        let mut errors = ErrorLog::new(WarningMode::Normal);
        let tokens = Lexer::new(source, "test").tokenize(&mut errors);
        (tokens, errors)
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let (tokens, errors) = scan("Set SET set EndIf WHILE");
        assert!(errors.is_good());
        assert_eq!(tokens[0].kind, TokenKind::Set);
        assert_eq!(tokens[1].kind, TokenKind::Set);
        assert_eq!(tokens[2].kind, TokenKind::Set);
        assert_eq!(tokens[3].kind, TokenKind::EndIf);
        assert_eq!(tokens[4].kind, TokenKind::While);
        // Original casing survives in the lexeme
        assert_eq!(tokens[3].loc.literal, "EndIf");
    }

    #[test]
    fn test_numbers_stay_textual() {
        let (tokens, _) = scan("42 3.14");
        assert_eq!(tokens[0].kind, TokenKind::Num("42".to_string()));
        // `3.14` is three tokens; the analyzer reassembles the float
        assert_eq!(tokens[1].kind, TokenKind::Num("3".to_string()));
        assert_eq!(tokens[2].kind, TokenKind::Dot);
        assert_eq!(tokens[3].kind, TokenKind::Num("14".to_string()));
    }

    #[test]
    fn test_strings_no_escapes() {
        let (tokens, errors) = scan(r#""hello" "a\b""#);
        assert!(errors.is_good());
        assert_eq!(tokens[0].kind, TokenKind::Str("hello".to_string()));
        assert_eq!(tokens[1].kind, TokenKind::Str("a\\b".to_string()));
    }

    #[test]
    fn test_unterminated_string() {
        let (tokens, errors) = scan("\"oops\nset");
        assert!(!errors.is_good());
        assert_eq!(tokens[0].kind, TokenKind::Str("oops".to_string()));
        assert_eq!(tokens[1].kind, TokenKind::Newline);
        assert_eq!(tokens[2].kind, TokenKind::Set);
    }

    #[test]
    fn test_comments() {
        let (tokens, _) = scan("set x ; trailing words == != ->\nreturn");
        assert_eq!(tokens[0].kind, TokenKind::Set);
        assert_eq!(tokens[1].kind, TokenKind::Name("x".to_string()));
        assert_eq!(tokens[2].kind, TokenKind::Newline);
        assert_eq!(tokens[3].kind, TokenKind::Return);
    }

    #[test]
    fn test_operators() {
        let (tokens, _) = scan("== != < <= > >= + - * / . -> , ( ) =");
        let kinds: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            &kinds[..16],
            &[
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Lt,
                TokenKind::Lte,
                TokenKind::Gt,
                TokenKind::Gte,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Dot,
                TokenKind::Arrow,
                TokenKind::Comma,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Eq,
            ]
        );
    }

    #[test]
    fn test_minus_vs_arrow() {
        let (tokens, _) = scan("a -> b - c");
        assert_eq!(tokens[1].kind, TokenKind::Arrow);
        assert_eq!(tokens[3].kind, TokenKind::Minus);
    }

    #[test]
    fn test_positions() {
        let (tokens, _) = scan("set x\nto");
        assert_eq!((tokens[0].loc.line, tokens[0].loc.column), (1, 1));
        assert_eq!((tokens[1].loc.line, tokens[1].loc.column), (1, 5));
        assert_eq!((tokens[3].loc.line, tokens[3].loc.column), (2, 1));
        assert_eq!(tokens[0].loc.source, "test");
    }

    #[test]
    fn test_invalid_character() {
        let (tokens, errors) = scan("set @ x");
        assert!(!errors.is_good());
        assert_eq!(tokens[0].kind, TokenKind::Set);
        assert_eq!(tokens[1].kind, TokenKind::Name("x".to_string()));
    }

    #[test]
    fn test_identifier_with_digits_and_underscore() {
        let (tokens, _) = scan("_fGuard1 rat_cave_door");
        assert_eq!(tokens[0].kind, TokenKind::Name("_fGuard1".to_string()));
        assert_eq!(tokens[1].kind, TokenKind::Name("rat_cave_door".to_string()));
    }
}
