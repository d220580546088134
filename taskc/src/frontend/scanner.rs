use crate::frontend::token::Location;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use anyhow::Result;

pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    /// Whether the scanner is inside a `#pragma omp` line.
    in_pragma: bool,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Scanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 0,
            column: 0,
            in_pragma: false,
        }
    }
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }
    fn peek(&self) -> char {
        self.peek_n(0)
    }
    fn peek_next(&self) -> char {
        self.peek_n(1)
    }
    fn peek_n(&self, n: usize) -> char {
        match self.source.get(self.current + n) {
            Some(c) => *c,
            None => '\0',
        }
    }
    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }
    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }
    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = match kind {
            TokenKind::Eof | TokenKind::PragmaEnd => "".to_string(),
            _ => self.lexeme(),
        };
        let diff = lexeme.chars().count();
        let column = self.column.saturating_sub(diff);
        let location = Location::new(self.line, column, self.start);
        self.tokens.push(Token::new(kind, lexeme, location));
    }
    fn newline(&mut self) {
        if self.in_pragma {
            self.add_token(TokenKind::PragmaEnd);
            self.in_pragma = false;
        }
        self.line += 1;
        self.column = 0;
    }
    fn number(&mut self) -> Result<()> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let mut is_float = self.source[self.start] == '.';
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        // Integer and floating suffixes such as `10UL` or `1.0f`.
        while matches!(self.peek(), 'u' | 'U' | 'l' | 'L' | 'f' | 'F') {
            self.advance();
        }
        if is_float {
            self.add_token(TokenKind::FloatLiteral);
        } else {
            self.add_token(TokenKind::Integer)
        }
        Ok(())
    }
    fn is_identifier_start(c: char) -> bool {
        c.is_alphabetic() || c == '_'
    }
    fn is_identifier(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }
    fn identifier(&mut self) -> Result<()> {
        while Scanner::is_identifier(self.peek()) {
            self.advance();
        }
        self.add_token(TokenKind::Identifier);
        Ok(())
    }
    fn quoted(&mut self, quote: char, kind: TokenKind) -> Result<()> {
        while self.peek() != quote && self.peek() != '\n' && !self.is_at_end() {
            if self.peek() == '\\' {
                self.advance();
            }
            self.advance();
        }
        if self.peek() != quote {
            let location = Location::new(self.line, self.column, self.start);
            let source: String = self.source.iter().collect();
            let msg = format!("Unterminated literal starting with {quote}");
            return Err(anyhow::anyhow!(Self::error(&source, &location, &msg)));
        }
        self.advance();
        self.add_token(kind);
        Ok(())
    }
    fn line_comment(&mut self) {
        while self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
    }
    fn block_comment(&mut self) -> Result<()> {
        loop {
            if self.is_at_end() {
                return Err(anyhow::anyhow!("Unterminated block comment"));
            }
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            if self.advance() == '\n' {
                self.line += 1;
                self.column = 0;
            }
        }
    }
    /// Scan a preprocessor line.
    ///
    /// `#pragma omp` starts a pragma whose clauses are scanned as regular
    /// tokens until the end of the line. Every other line is kept verbatim.
    fn preprocessor(&mut self) -> Result<()> {
        let mut end = self.current;
        while end < self.source.len() && self.source[end] != '\n' {
            end += 1;
        }
        let line: String = self.source[self.start..end].iter().collect();
        let words = line[1..].split_whitespace().take(2).collect::<Vec<&str>>();
        if words.first() == Some(&"pragma") && words.get(1) == Some(&"omp") {
            while self.peek() != 'p' {
                self.advance();
            }
            // `pragma`
            for _ in 0..6 {
                self.advance();
            }
            while self.peek() != 'o' {
                self.advance();
            }
            // `omp`
            for _ in 0..3 {
                self.advance();
            }
            self.add_token(TokenKind::PragmaOmp);
            self.in_pragma = true;
        } else {
            while self.current < end {
                self.advance();
            }
            self.add_token(TokenKind::Directive);
        }
        Ok(())
    }
    fn either(&mut self, next: char, matched: TokenKind, otherwise: TokenKind) {
        let kind = if self.matches(next) { matched } else { otherwise };
        self.add_token(kind);
    }
    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LParen),
            ')' => self.add_token(TokenKind::RParen),
            '{' => self.add_token(TokenKind::LBrace),
            '}' => self.add_token(TokenKind::RBrace),
            '[' => self.add_token(TokenKind::LBracket),
            ']' => self.add_token(TokenKind::RBracket),
            ';' => self.add_token(TokenKind::Semicolon),
            ',' => self.add_token(TokenKind::Comma),
            ':' => self.add_token(TokenKind::Colon),
            '?' => self.add_token(TokenKind::Question),
            '~' => self.add_token(TokenKind::Tilde),
            '.' if self.peek().is_ascii_digit() => self.number()?,
            '.' => self.add_token(TokenKind::Dot),
            '+' => {
                if self.matches('+') {
                    self.add_token(TokenKind::PlusPlus);
                } else {
                    self.either('=', TokenKind::CompoundAssign, TokenKind::Plus);
                }
            }
            '-' => {
                if self.matches('-') {
                    self.add_token(TokenKind::MinusMinus);
                } else if self.matches('>') {
                    self.add_token(TokenKind::Arrow);
                } else {
                    self.either('=', TokenKind::CompoundAssign, TokenKind::Minus);
                }
            }
            '*' => self.either('=', TokenKind::CompoundAssign, TokenKind::Star),
            '%' => self.either('=', TokenKind::CompoundAssign, TokenKind::Percent),
            '^' => self.either('=', TokenKind::CompoundAssign, TokenKind::Caret),
            '&' => {
                if self.matches('&') {
                    self.add_token(TokenKind::AmpAmp);
                } else {
                    self.either('=', TokenKind::CompoundAssign, TokenKind::Amp);
                }
            }
            '|' => {
                if self.matches('|') {
                    self.add_token(TokenKind::PipePipe);
                } else {
                    self.either('=', TokenKind::CompoundAssign, TokenKind::Pipe);
                }
            }
            '!' => self.either('=', TokenKind::NotEqual, TokenKind::Exclamation),
            '=' => self.either('=', TokenKind::EqualEqual, TokenKind::Equal),
            '<' => {
                if self.matches('<') {
                    self.either('=', TokenKind::CompoundAssign, TokenKind::LessLess);
                } else {
                    self.either('=', TokenKind::LessEqual, TokenKind::Less);
                }
            }
            '>' => {
                if self.matches('>') {
                    self.either('=', TokenKind::CompoundAssign, TokenKind::GreaterGreater);
                } else {
                    self.either('=', TokenKind::GreaterEqual, TokenKind::Greater);
                }
            }
            '/' => {
                if self.matches('/') {
                    self.line_comment();
                } else if self.matches('*') {
                    self.block_comment()?;
                } else {
                    self.either('=', TokenKind::CompoundAssign, TokenKind::Slash);
                }
            }
            '#' if !self.in_pragma => self.preprocessor()?,
            '\\' if self.peek() == '\n' => {
                // Line continuation.
                self.advance();
                self.line += 1;
                self.column = 0;
            }
            ' ' | '\r' | '\t' => (),
            '\n' => self.newline(),
            '"' => self.quoted('"', TokenKind::String)?,
            '\'' => self.quoted('\'', TokenKind::Character)?,
            s if s.is_ascii_digit() => self.number()?,
            s if Scanner::is_identifier_start(s) => self.identifier()?,
            _ => {
                let column = if self.column == 0 { 0 } else { self.column - 1 };
                let location = Location::new(self.line, column, self.start);
                let source: String = self.source.iter().collect();
                return Err(anyhow::anyhow!(Self::error(
                    &source,
                    &location,
                    &format!("Scanning failed starting at: {}", c)
                )));
            }
        }
        Ok(())
    }
    fn scan_tokens(&mut self) -> Result<()> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.start = self.current;
        if self.in_pragma {
            self.add_token(TokenKind::PragmaEnd);
            self.in_pragma = false;
        }
        self.add_token(TokenKind::Eof);
        Ok(())
    }
    pub fn scan(src: &str) -> Result<Vec<Token>> {
        let mut scanner = Scanner::new(src);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }
    pub fn error(src: &str, loc: &Location, msg: &str) -> String {
        let lines = src.split('\n').collect::<Vec<&str>>();
        let n = loc.line().min(lines.len().saturating_sub(1));
        let prev_line = if n > 0 {
            let prev_n = n - 1;
            let prev = lines[prev_n];
            format!("\n{prev_n}  | {prev}")
        } else {
            "".to_string()
        };
        let line = lines.get(n).copied().unwrap_or("");
        let line_num_width = 4 + n.to_string().len();
        let err_indent = " ".repeat(loc.column() + line_num_width);
        format!("```{prev_line}\n{n}  | {line}\n{err_indent}^ {msg}\n```")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Scanner::scan(src)
            .unwrap()
            .iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_scanner() {
        let tokens = Scanner::scan("float a[100];").unwrap();
        assert_eq!(tokens.len(), 7);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].lexeme, "float");
        assert_eq!(tokens[2].kind, TokenKind::LBracket);
        assert_eq!(tokens[3].kind, TokenKind::Integer);
        assert_eq!(tokens[3].lexeme, "100");
        assert_eq!(tokens[3].location.column(), 8);
        assert_eq!(tokens[6].kind, TokenKind::Eof);

        let tokens = Scanner::scan("x += 4.5f; p->y").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::CompoundAssign);
        assert_eq!(tokens[1].lexeme, "+=");
        assert_eq!(tokens[2].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[2].lexeme, "4.5f");
        assert_eq!(tokens[5].kind, TokenKind::Arrow);

        assert_eq!(
            kinds("a <<= b >> c <= d"),
            vec![
                TokenKind::Identifier,
                TokenKind::CompoundAssign,
                TokenKind::Identifier,
                TokenKind::GreaterGreater,
                TokenKind::Identifier,
                TokenKind::LessEqual,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_strings() {
        let tokens = Scanner::scan("// a\n/* b\n c */ printf(\"%d\\n\", 'x');").unwrap();
        assert_eq!(tokens[0].lexeme, "printf");
        assert_eq!(tokens[0].location.line(), 2);
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].lexeme, "\"%d\\n\"");
        assert_eq!(tokens[4].kind, TokenKind::Character);
    }

    #[test]
    fn test_pragma() {
        let src = "#include <stdio.h>\n#pragma omp task shared(x) \\\n  if(n > 1)\nx = 1;";
        let tokens = Scanner::scan(src).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].lexeme, "#include <stdio.h>");
        assert_eq!(tokens[1].kind, TokenKind::PragmaOmp);
        assert_eq!(tokens[2].lexeme, "task");
        assert_eq!(tokens[3].lexeme, "shared");
        assert_eq!(tokens[7].lexeme, "if");
        let end = tokens
            .iter()
            .position(|token| token.kind == TokenKind::PragmaEnd)
            .unwrap();
        assert_eq!(tokens[end - 1].kind, TokenKind::RParen);
        assert_eq!(tokens[end + 1].lexeme, "x");
        assert_eq!(tokens[end + 1].location.line(), 3);
    }

    #[test]
    fn test_error() {
        let src = "int main() {\n  int x = 1 @ 2;\n}";
        let err = Scanner::scan(src).unwrap_err().to_string();
        let lines = err.split('\n').collect::<Vec<&str>>();
        assert_eq!(lines[0], "```");
        assert_eq!(lines[1], "0  | int main() {");
        assert_eq!(lines[2], "1  |   int x = 1 @ 2;");
        assert_eq!(lines[3], "                 ^ Scanning failed starting at: @");
        assert_eq!(lines[4], "```");
    }
}
