//! Tokenizer for the restricted SELECT dialect.
//!
//! Comments are skipped, string literals are unescaped (`''` → `'`), and every
//! token keeps its byte span so callers can splice the original text.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword or identifier, original casing kept.
    Word(String),
    /// `"quoted"` identifier.
    QuotedIdent(String),
    /// `'string'` literal, unescaped.
    Str(String),
    Number(String),
    /// Comparison or arithmetic operator (`=`, `>=`, `<>`, `||`, ...).
    Op(String),
    Star,
    Comma,
    Dot,
    LParen,
    RParen,
    Semicolon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(word) if word.eq_ignore_ascii_case(keyword))
    }

    pub fn is_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|keyword| self.is_keyword(keyword))
    }

    /// Identifier text for bare or quoted identifiers.
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(word) | TokenKind::QuotedIdent(word) => Some(word),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated string literal at byte {0}")]
    UnterminatedString(usize),
    #[error("unterminated quoted identifier at byte {0}")]
    UnterminatedIdent(usize),
    #[error("unterminated block comment at byte {0}")]
    UnterminatedComment(usize),
    #[error("unexpected character '{ch}' at byte {at}")]
    UnexpectedChar { ch: char, at: usize },
}

pub fn tokenize(sql: &str) -> Result<Vec<Token>, LexError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = sql[pos..].chars().next().unwrap_or('\0');
        let start = pos;

        if ch.is_whitespace() {
            pos += ch.len_utf8();
            continue;
        }

        if sql[pos..].starts_with("--") {
            pos = sql[pos..].find('\n').map_or(bytes.len(), |offset| pos + offset + 1);
            continue;
        }

        if sql[pos..].starts_with("/*") {
            let Some(offset) = sql[pos + 2..].find("*/") else {
                return Err(LexError::UnterminatedComment(start));
            };
            pos = pos + 2 + offset + 2;
            continue;
        }

        let kind = match ch {
            '\'' => {
                let (value, end) = read_quoted(sql, pos, '\'')
                    .ok_or(LexError::UnterminatedString(start))?;
                pos = end;
                TokenKind::Str(value)
            }
            '"' => {
                let (value, end) = read_quoted(sql, pos, '"')
                    .ok_or(LexError::UnterminatedIdent(start))?;
                pos = end;
                TokenKind::QuotedIdent(value)
            }
            c if c.is_ascii_digit() => {
                pos = scan_while(sql, pos, |c| c.is_ascii_digit() || c == '.');
                TokenKind::Number(sql[start..pos].to_string())
            }
            c if c.is_alphabetic() || c == '_' => {
                pos = scan_while(sql, pos, |c| c.is_alphanumeric() || c == '_' || c == '$');
                TokenKind::Word(sql[start..pos].to_string())
            }
            '*' => {
                pos += 1;
                TokenKind::Star
            }
            ',' => {
                pos += 1;
                TokenKind::Comma
            }
            '.' => {
                pos += 1;
                TokenKind::Dot
            }
            '(' => {
                pos += 1;
                TokenKind::LParen
            }
            ')' => {
                pos += 1;
                TokenKind::RParen
            }
            ';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            '=' | '<' | '>' | '!' | '|' | ':' | '+' | '-' | '/' | '%' => {
                let two = sql.get(pos..pos + 2).unwrap_or("");
                let op = match two {
                    ">=" | "<=" | "<>" | "!=" | "||" | "::" => two,
                    _ => &sql[pos..pos + 1],
                };
                pos += op.len();
                TokenKind::Op(op.to_string())
            }
            other => return Err(LexError::UnexpectedChar { ch: other, at: start }),
        };

        tokens.push(Token {
            kind,
            span: start..pos,
        });
    }

    Ok(tokens)
}

fn scan_while(sql: &str, from: usize, keep: impl Fn(char) -> bool) -> usize {
    sql[from..]
        .char_indices()
        .find(|(_, c)| !keep(*c))
        .map_or(sql.len(), |(offset, _)| from + offset)
}

/// Read a `quote`-delimited run starting at `from`, doubling as escape.
/// Returns the unescaped content and the byte offset just past the closing quote.
fn read_quoted(sql: &str, from: usize, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = sql[from + 1..].char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if c == quote {
            if matches!(chars.peek(), Some((_, next)) if *next == quote) {
                chars.next();
                value.push(quote);
                continue;
            }
            return Some((value, from + 1 + offset + 1));
        }
        value.push(c);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql)
            .expect("sql should tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_simple_select() {
        assert_eq!(
            kinds("SELECT COUNT(*) FROM cuotas WHERE monto >= 10.5"),
            vec![
                TokenKind::Word("SELECT".into()),
                TokenKind::Word("COUNT".into()),
                TokenKind::LParen,
                TokenKind::Star,
                TokenKind::RParen,
                TokenKind::Word("FROM".into()),
                TokenKind::Word("cuotas".into()),
                TokenKind::Word("WHERE".into()),
                TokenKind::Word("monto".into()),
                TokenKind::Op(">=".into()),
                TokenKind::Number("10.5".into()),
            ]
        );
    }

    #[test]
    fn unescapes_doubled_quotes() {
        assert_eq!(
            kinds("nombre = 'O''Higgins'"),
            vec![
                TokenKind::Word("nombre".into()),
                TokenKind::Op("=".into()),
                TokenKind::Str("O'Higgins".into()),
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("SELECT /* hidden */ * -- trailing\nFROM pagos"),
            vec![
                TokenKind::Word("SELECT".into()),
                TokenKind::Star,
                TokenKind::Word("FROM".into()),
                TokenKind::Word("pagos".into()),
            ]
        );
    }

    #[test]
    fn spans_point_into_source() {
        let sql = "SELECT * FROM contratos WHERE estado = 'activo'";
        let tokens = tokenize(sql).expect("sql should tokenize");
        let literal = tokens.last().expect("at least one token");
        assert_eq!(&sql[literal.span.clone()], "'activo'");
    }

    #[test]
    fn keeps_non_ascii_words_and_literals() {
        assert_eq!(
            kinds("descripción = 'señal'"),
            vec![
                TokenKind::Word("descripción".into()),
                TokenKind::Op("=".into()),
                TokenKind::Str("señal".into()),
            ]
        );
    }

    #[test]
    fn reports_unterminated_input() {
        assert_eq!(tokenize("WHERE a = 'x"), Err(LexError::UnterminatedString(10)));
        assert_eq!(tokenize("SELECT /* x"), Err(LexError::UnterminatedComment(7)));
        assert!(matches!(
            tokenize("SELECT ? FROM t"),
            Err(LexError::UnexpectedChar { ch: '?', .. })
        ));
    }
}
