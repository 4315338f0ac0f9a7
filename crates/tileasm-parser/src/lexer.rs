//! Indentation-aware tokenizer.
//!
//! Produces `Newline` at the end of every logical line, `Indent`/`Dedent`
//! around nested blocks, and joins physical lines inside brackets or after
//! a trailing backslash. The first non-blank line sets the base
//! indentation, so kernels pasted with a uniform indent still tokenize.

use tileasm_ir::{CompileError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

// Longest spellings first.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "->", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=",
    "/=", "%=", "&=", "|=", "^=", "@=", "<<", ">>", ":=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

/// Splits `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        indents: Vec::new(),
        depth: 0,
        tokens: Vec::new(),
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    indents: Vec<usize>,
    /// Bracket nesting; newlines inside brackets are not significant.
    depth: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                self.indentation()?;
                continue;
            }
            let c = self.chars[self.pos];
            match c {
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.newline();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => {
                    while self.peek_at(0).is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\\' => {
                    let next = self.peek_at(1);
                    if next == Some('\n') {
                        self.pos += 2;
                        self.line += 1;
                    } else if next == Some('\r') && self.peek_at(2) == Some('\n') {
                        self.pos += 3;
                        self.line += 1;
                    } else {
                        return Err(self.error("unexpected character after line continuation"));
                    }
                }
                '\'' | '"' => {
                    let s = self.string(false)?;
                    self.push(TokenKind::Str(s));
                }
                c if c.is_ascii_digit() => self.number()?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.name_or_prefixed_string()?,
                _ => self.operator()?,
            }
        }

        self.newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    fn newline(&mut self) {
        let significant = self.tokens.last().is_some_and(|t| {
            !matches!(
                t.kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
            )
        });
        if significant {
            self.push(TokenKind::Newline);
        }
    }

    /// Measures leading whitespace and emits indentation tokens.
    /// Blank and comment-only lines are left to the main loop.
    fn indentation(&mut self) -> Result<()> {
        let mut col = 0usize;
        let mut end = self.pos;
        while let Some(&c) = self.chars.get(end) {
            match c {
                ' ' => col += 1,
                '\t' => col = (col / 8 + 1) * 8,
                '\x0c' => col = 0,
                _ => break,
            }
            end += 1;
        }
        match self.chars.get(end) {
            None | Some('\n' | '\r' | '#') => return Ok(()),
            _ => {}
        }
        self.pos = end;

        let Some(&top) = self.indents.last() else {
            self.indents.push(col);
            return Ok(());
        };
        if col > top {
            self.indents.push(col);
            self.push(TokenKind::Indent);
        } else if col < top {
            while self.indents.last().is_some_and(|&t| t > col) {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if self.indents.last() != Some(&col) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(())
    }

    fn name_or_prefixed_string(&mut self) -> Result<()> {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let is_prefix = word.len() <= 2 && word.chars().all(|c| "rRbBuUfF".contains(c));
        if is_prefix && matches!(self.peek_at(0), Some('\'' | '"')) {
            let raw = word.contains(['r', 'R']);
            let s = self.string(raw)?;
            self.push(TokenKind::Str(s));
        } else {
            self.push(TokenKind::Name(word));
        }
        Ok(())
    }

    fn string(&mut self, raw: bool) -> Result<String> {
        let start_line = self.line;
        let quote = self.chars[self.pos];
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let Some(c) = self.peek_at(0) else {
                return Err(CompileError::Syntax {
                    line: start_line,
                    message: "unterminated string literal".into(),
                });
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(out);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(out);
                }
                out.push(c);
                self.pos += 1;
                continue;
            }
            match c {
                '\\' => {
                    let Some(next) = self.peek_at(1) else {
                        self.pos += 1;
                        continue;
                    };
                    self.pos += 2;
                    if next == '\n' {
                        self.line += 1;
                        if raw {
                            out.push_str("\\\n");
                        }
                        continue;
                    }
                    if raw {
                        out.push('\\');
                        out.push(next);
                        continue;
                    }
                    match next {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(next),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                '\n' if !triple => {
                    return Err(CompileError::Syntax {
                        line: start_line,
                        message: "unterminated string literal".into(),
                    });
                }
                '\n' => {
                    out.push('\n');
                    self.line += 1;
                    self.pos += 1;
                }
                _ => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self) -> Result<()> {
        let start = self.pos;
        if self.peek_at(0) == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'))
        {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                _ => 2,
            };
            self.pos += 2;
            let digits_start = self.pos;
            while self
                .peek_at(0)
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|&&c| c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, radix)
                .map_err(|_| self.error(format!("invalid integer literal with radix {radix}: {digits}")))?;
            self.push(TokenKind::Int(value));
            return Ok(());
        }

        let mut is_float = false;
        self.digits();
        if self.peek_at(0) == Some('.') {
            is_float = true;
            self.pos += 1;
            self.digits();
        }
        if matches!(self.peek_at(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                self.digits();
            }
        }
        if matches!(self.peek_at(0), Some('j' | 'J')) {
            return Err(self.error("complex literals are not supported"));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("invalid float literal {text}")))?;
            self.push(TokenKind::Float(value));
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error(format!("integer literal {text} out of range")))?;
            self.push(TokenKind::Int(value));
        }
        Ok(())
    }

    fn digits(&mut self) {
        while self
            .peek_at(0)
            .is_some_and(|c| c.is_ascii_digit() || c == '_')
        {
            self.pos += 1;
        }
    }

    fn operator(&mut self) -> Result<()> {
        let rest = &self.chars[self.pos..];
        let op = OPERATORS.iter().copied().find(|op| {
            op.len() <= rest.len() && op.chars().zip(rest.iter()).all(|(a, &b)| a == b)
        });
        let Some(op) = op else {
            return Err(self.error(format!("unexpected character '{}'", self.chars[self.pos])));
        };
        match op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.pos += op.len();
        self.push(TokenKind::Op(op));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn name(s: &str) -> TokenKind {
        TokenKind::Name(s.into())
    }

    #[test]
    fn indentation_tokens() {
        let toks = kinds("def f():\n    x = 1\n    if x:\n        y = 2\n    z = 3\n");
        assert_eq!(
            toks,
            vec![
                name("def"),
                name("f"),
                TokenKind::Op("("),
                TokenKind::Op(")"),
                TokenKind::Op(":"),
                TokenKind::Newline,
                TokenKind::Indent,
                name("x"),
                TokenKind::Op("="),
                TokenKind::Int(1),
                TokenKind::Newline,
                name("if"),
                name("x"),
                TokenKind::Op(":"),
                TokenKind::Newline,
                TokenKind::Indent,
                name("y"),
                TokenKind::Op("="),
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Dedent,
                name("z"),
                TokenKind::Op("="),
                TokenKind::Int(3),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        let toks = kinds("x = 1\n\n   # note\n\ny = 2  # trailing\n");
        assert_eq!(
            toks,
            vec![
                name("x"),
                TokenKind::Op("="),
                TokenKind::Int(1),
                TokenKind::Newline,
                name("y"),
                TokenKind::Op("="),
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn brackets_join_lines() {
        let toks = kinds("f(a,\n  b)\n");
        assert_eq!(toks.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
        assert!(!toks.contains(&TokenKind::Indent));
    }

    #[test]
    fn base_indent_is_accepted() {
        let toks = kinds("    def f():\n        pass\n");
        assert_eq!(toks[0], name("def"));
        assert_eq!(toks.iter().filter(|k| **k == TokenKind::Indent).count(), 1);
    }

    #[test]
    fn strings_and_prefixes() {
        let toks = kinds("a = 'x\\ty'\nb = r\"\\d\"\nc = \"\"\"one\ntwo\"\"\"\n");
        assert!(toks.contains(&TokenKind::Str("x\ty".into())));
        assert!(toks.contains(&TokenKind::Str("\\d".into())));
        assert!(toks.contains(&TokenKind::Str("one\ntwo".into())));
    }

    #[test]
    fn numbers() {
        let toks = kinds("x = 0x10 + 1_000 + 2.5 + 1e3 + .5\n");
        assert!(toks.contains(&TokenKind::Int(16)));
        assert!(toks.contains(&TokenKind::Int(1000)));
        assert!(toks.contains(&TokenKind::Float(2.5)));
        assert!(toks.contains(&TokenKind::Float(1000.0)));
        assert!(toks.contains(&TokenKind::Float(0.5)));
    }

    #[test]
    fn longest_operator_wins() {
        let toks = kinds("a //= b ** c != d\n");
        assert!(toks.contains(&TokenKind::Op("//=")));
        assert!(toks.contains(&TokenKind::Op("**")));
        assert!(toks.contains(&TokenKind::Op("!=")));
    }

    #[test]
    fn bad_dedent_is_an_error() {
        let err = tokenize("if x:\n    a = 1\n  b = 2\n").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 3, .. }));
    }

    #[test]
    fn unterminated_string_reports_its_line() {
        let err = tokenize("x = 1\ny = 'abc\n").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 2, .. }));
    }
}
