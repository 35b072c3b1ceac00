//! Parser for the restricted dialect:
//!
//! ```text
//! SELECT projection FROM table [WHERE p {AND p}] [ORDER BY ...] [LIMIT n] [;]
//! ```
//!
//! Joins, subqueries, set operations, GROUP BY/HAVING, DISTINCT, OFFSET/FETCH
//! and multiple statements are rejected with [`ParseError::Unsupported`]. WHERE terms that are not a
//! plain `field op literal` (OR groups, IN, BETWEEN, IS NULL) are dropped and
//! reported in `dropped_terms`. Parenthesized pure conjunctions are flattened.

use crate::model::{AggregateKind, Operator, ParsedStatement, Predicate, ProjectionItem};
use crate::restricted::lexer::{LexError, Token, TokenKind, tokenize};

/// Keywords that end the WHERE clause.
const CLAUSE_TERMINATORS: &[&str] = &["GROUP", "ORDER", "LIMIT", "OFFSET", "HAVING", "FETCH"];
const JOIN_KEYWORDS: &[&str] = &["JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL"];
pub(crate) const SET_OPERATIONS: &[&str] = &["UNION", "INTERSECT", "EXCEPT"];
/// Words that can follow the table name and are not an alias.
const RESERVED_AFTER_TABLE: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "LIMIT", "OFFSET", "HAVING", "FETCH", "JOIN", "INNER", "LEFT",
    "RIGHT", "FULL", "CROSS", "NATURAL", "UNION", "INTERSECT", "EXCEPT", "ON", "USING",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    Join,
    Subquery,
    SetOperation,
    GroupBy,
    Distinct,
    Offset,
    MultipleStatements,
    Expression,
}

impl std::fmt::Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Unsupported::Join => "joins",
            Unsupported::Subquery => "subqueries",
            Unsupported::SetOperation => "UNION/INTERSECT/EXCEPT",
            Unsupported::GroupBy => "GROUP BY/HAVING",
            Unsupported::Distinct => "SELECT DISTINCT",
            Unsupported::Offset => "OFFSET/FETCH",
            Unsupported::MultipleStatements => "multiple statements",
            Unsupported::Expression => "projection expressions",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("statement does not start with SELECT")]
    NotSelect,
    #[error("no FROM <table> clause found")]
    MissingTable,
    #[error("invalid LIMIT value")]
    InvalidLimit,
    #[error("table '{0}' is not queryable")]
    TableNotAllowed(String),
    #[error("unsupported construct: {0}")]
    Unsupported(Unsupported),
}

/// Parse restricted SELECT text into its structured form.
pub fn parse(sql: &str) -> Result<ParsedStatement, ParseError> {
    let mut tokens = tokenize(sql)?;
    if matches!(tokens.last(), Some(Token { kind: TokenKind::Semicolon, .. })) {
        tokens.pop();
    }
    if tokens.iter().any(|t| t.kind == TokenKind::Semicolon) {
        return Err(ParseError::Unsupported(Unsupported::MultipleStatements));
    }

    match tokens.first() {
        Some(first) if first.is_keyword("SELECT") => {}
        _ => return Err(ParseError::NotSelect),
    }
    if tokens.iter().any(|t| t.is_any_keyword(SET_OPERATIONS)) {
        return Err(ParseError::Unsupported(Unsupported::SetOperation));
    }
    if tokens.iter().skip(1).any(|t| t.is_keyword("SELECT")) {
        return Err(ParseError::Unsupported(Unsupported::Subquery));
    }

    let from = find_top_level(&tokens, 1, &["FROM"]).ok_or(ParseError::MissingTable)?;
    let (table, after_table) = parse_table(&tokens, from + 1)?;

    let projection_tokens = &tokens[1..from];
    let aggregate = detect_aggregate(projection_tokens);
    let projection = parse_projection(projection_tokens, &aggregate)?;

    let mut predicates = Vec::new();
    let mut dropped_terms = Vec::new();
    let mut cursor = after_table;

    if let Some(token) = tokens.get(cursor) {
        if token.is_keyword("WHERE") {
            let end = find_top_level(&tokens, cursor + 1, CLAUSE_TERMINATORS).unwrap_or(tokens.len());
            let mut terms = Vec::new();
            collect_terms(&tokens[cursor + 1..end], &mut terms);
            for term in terms {
                match parse_predicate(term) {
                    Some(predicate) => predicates.push(predicate),
                    None => dropped_terms.push(term_text(sql, term)),
                }
            }
            cursor = end;
        } else if !token.is_any_keyword(CLAUSE_TERMINATORS) {
            return Err(ParseError::Unsupported(Unsupported::Join));
        }
    }

    if find_top_level(&tokens, cursor, &["GROUP", "HAVING"]).is_some() {
        return Err(ParseError::Unsupported(Unsupported::GroupBy));
    }
    if find_top_level(&tokens, cursor, &["OFFSET", "FETCH"]).is_some() {
        return Err(ParseError::Unsupported(Unsupported::Offset));
    }

    let limit = match find_top_level(&tokens, cursor, &["LIMIT"]) {
        Some(idx) => parse_limit(tokens.get(idx + 1))?,
        None => None,
    };

    Ok(ParsedStatement {
        table,
        projection,
        predicates,
        limit,
        aggregate,
        dropped_terms,
    })
}

/// Identifier rule shared with the adapters: letters, digits, underscore,
/// not starting with a digit.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Aggregate classification, in priority order COUNT(*), COUNT(1), SUM(col),
/// AVG(col). Used on the projection tokens and by the validator on the
/// whole statement.
pub fn detect_aggregate(tokens: &[Token]) -> AggregateKind {
    if find_call(tokens, "COUNT", |arg| matches!(arg, [t] if t.kind == TokenKind::Star)).is_some() {
        return AggregateKind::Count;
    }
    if find_call(tokens, "COUNT", |arg| {
        matches!(arg, [t] if t.kind == TokenKind::Number("1".to_string()))
    })
    .is_some()
    {
        return AggregateKind::Count;
    }
    for (function, build) in [
        ("SUM", AggregateKind::Sum as fn(String) -> AggregateKind),
        ("AVG", AggregateKind::Avg as fn(String) -> AggregateKind),
    ] {
        if let Some(column) = find_call(tokens, function, column_argument).flatten() {
            return build(column);
        }
    }
    AggregateKind::None
}

/// Index of the first token at paren depth 0 (from `start`) matching one of `keywords`.
pub(crate) fn find_top_level(tokens: &[Token], start: usize, keywords: &[&str]) -> Option<usize> {
    let mut depth = 0_i32;
    for (idx, token) in tokens.iter().enumerate().skip(start) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            _ if depth == 0 && token.is_any_keyword(keywords) => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Parse `[schema.]table [[AS] alias]` starting at `idx`; returns the bare
/// table name and the index of the next token.
fn parse_table(tokens: &[Token], idx: usize) -> Result<(String, usize), ParseError> {
    let (name, mut next) = qualified_name(tokens, idx).ok_or(ParseError::MissingTable)?;
    if !is_identifier(&name) {
        return Err(ParseError::MissingTable);
    }

    if tokens.get(next).is_some_and(|t| t.is_keyword("AS")) {
        next += 1;
        if tokens.get(next).and_then(Token::ident).is_none() {
            return Err(ParseError::MissingTable);
        }
        next += 1;
    } else if let Some(token) = tokens.get(next) {
        if token.ident().is_some() && !token.is_any_keyword(RESERVED_AFTER_TABLE) {
            next += 1;
        }
    }

    match tokens.get(next) {
        Some(token) if token.kind == TokenKind::Comma || token.is_any_keyword(JOIN_KEYWORDS) => {
            Err(ParseError::Unsupported(Unsupported::Join))
        }
        Some(token) if token.kind == TokenKind::LParen => {
            Err(ParseError::Unsupported(Unsupported::Subquery))
        }
        _ => Ok((name, next)),
    }
}

/// `a`, `a.b` or `a.b.c` → last segment, plus the index after it.
fn qualified_name(tokens: &[Token], mut idx: usize) -> Option<(String, usize)> {
    let mut name = tokens.get(idx)?.ident()?.to_string();
    idx += 1;
    while matches!(tokens.get(idx), Some(t) if t.kind == TokenKind::Dot) {
        name = tokens.get(idx + 1)?.ident()?.to_string();
        idx += 2;
    }
    Some((name, idx))
}

fn parse_projection(
    tokens: &[Token],
    aggregate: &AggregateKind,
) -> Result<Vec<ProjectionItem>, ParseError> {
    let mut items = Vec::new();
    if tokens.first().is_some_and(|first| first.is_keyword("DISTINCT")) {
        return Err(ParseError::Unsupported(Unsupported::Distinct));
    }

    for item in split_top_level(tokens, |t| t.kind == TokenKind::Comma) {
        match item {
            [] => return Err(ParseError::Unsupported(Unsupported::Expression)),
            [star] if star.kind == TokenKind::Star => items.push(ProjectionItem::Wildcard),
            _ if is_call(item) && aggregate.is_aggregate() => {
                let kind = detect_aggregate(item);
                if !kind.is_aggregate() {
                    return Err(ParseError::Unsupported(Unsupported::Expression));
                }
                items.push(ProjectionItem::Aggregate(kind));
            }
            _ => {
                let (name, next) = qualified_name(item, 0)
                    .ok_or(ParseError::Unsupported(Unsupported::Expression))?;
                let alias_ok = match &item[next..] {
                    [] => true,
                    [alias] => alias.ident().is_some(),
                    [as_kw, alias] => as_kw.is_keyword("AS") && alias.ident().is_some(),
                    _ => false,
                };
                if !alias_ok || !is_identifier(&name) {
                    return Err(ParseError::Unsupported(Unsupported::Expression));
                }
                items.push(ProjectionItem::Column(name));
            }
        }
    }

    if aggregate.is_aggregate()
        && !items.iter().any(|item| matches!(item, ProjectionItem::Aggregate(_)))
    {
        items.push(ProjectionItem::Aggregate(aggregate.clone()));
    }
    Ok(items)
}

fn is_call(tokens: &[Token]) -> bool {
    matches!(tokens, [name, open, ..] if name.ident().is_some() && open.kind == TokenKind::LParen)
}

/// Find `FUNCTION ( args )` anywhere in `tokens` for which `accept(args)`
/// yields a value.
fn find_call<T>(
    tokens: &[Token],
    function: &str,
    accept: impl Fn(&[Token]) -> T,
) -> Option<T>
where
    T: CallMatch,
{
    for (idx, token) in tokens.iter().enumerate() {
        if !token.is_keyword(function) {
            continue;
        }
        if !matches!(tokens.get(idx + 1), Some(t) if t.kind == TokenKind::LParen) {
            continue;
        }
        let Some(close) = tokens[idx + 2..]
            .iter()
            .position(|t| t.kind == TokenKind::RParen)
            .map(|offset| idx + 2 + offset)
        else {
            continue;
        };
        let result = accept(&tokens[idx + 2..close]);
        if result.matched() {
            return Some(result);
        }
    }
    None
}

trait CallMatch {
    fn matched(&self) -> bool;
}

impl CallMatch for bool {
    fn matched(&self) -> bool {
        *self
    }
}

impl CallMatch for Option<String> {
    fn matched(&self) -> bool {
        self.is_some()
    }
}

fn column_argument(args: &[Token]) -> Option<String> {
    let (name, next) = qualified_name(args, 0)?;
    (next == args.len() && is_identifier(&name)).then_some(name)
}

fn split_top_level(tokens: &[Token], is_separator: impl Fn(&Token) -> bool) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0_i32;
    let mut start = 0;
    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            _ if depth == 0 && is_separator(token) => {
                parts.push(&tokens[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    parts
}

fn split_conjunction(tokens: &[Token]) -> Vec<&[Token]> {
    split_top_level(tokens, |t| t.is_keyword("AND"))
        .into_iter()
        .filter(|term| !term.is_empty())
        .collect()
}

/// Conjunction terms, descending into parenthesized groups that are
/// themselves pure conjunctions. Groups containing OR stay whole.
fn collect_terms<'a>(tokens: &'a [Token], out: &mut Vec<&'a [Token]>) {
    for term in split_conjunction(tokens) {
        match unwrap_group(term) {
            Some(inner) if find_top_level(inner, 0, &["OR"]).is_none() => {
                collect_terms(inner, out)
            }
            _ => out.push(term),
        }
    }
}

/// Inner tokens of `( ... )` when the first paren closes at the last token.
fn unwrap_group(term: &[Token]) -> Option<&[Token]> {
    let (first, last) = (term.first()?, term.last()?);
    if term.len() < 2 || first.kind != TokenKind::LParen || last.kind != TokenKind::RParen {
        return None;
    }
    let mut depth = 0_i32;
    for (idx, token) in term.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 && idx != term.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(&term[1..term.len() - 1])
}

/// `field op literal`, where the literal is a string, a (signed) number or a
/// bare word such as `true`.
fn parse_predicate(term: &[Token]) -> Option<Predicate> {
    let (field, next) = qualified_name(term, 0)?;
    if !is_identifier(&field) || term[0].is_any_keyword(&["NOT", "EXISTS"]) {
        return None;
    }

    let operator = match &term.get(next)?.kind {
        TokenKind::Op(symbol) => Operator::from_symbol(symbol)?,
        TokenKind::Word(word) => Operator::from_symbol(word)?,
        _ => return None,
    };

    let value = match &term[next + 1..] {
        [literal] => match &literal.kind {
            TokenKind::Str(text) | TokenKind::Number(text) => text.clone(),
            TokenKind::Word(word) if !word.eq_ignore_ascii_case("NULL") => word.clone(),
            _ => return None,
        },
        [sign, number] => match (&sign.kind, &number.kind) {
            (TokenKind::Op(op), TokenKind::Number(digits)) if op == "-" => format!("-{digits}"),
            _ => return None,
        },
        _ => return None,
    };

    Some(Predicate::new(field, operator, value))
}

fn parse_limit(token: Option<&Token>) -> Result<Option<u64>, ParseError> {
    match token.map(|t| &t.kind) {
        Some(TokenKind::Number(digits)) => digits
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ParseError::InvalidLimit),
        Some(TokenKind::Word(word)) if word.eq_ignore_ascii_case("ALL") => Ok(None),
        _ => Err(ParseError::InvalidLimit),
    }
}

fn term_text(sql: &str, term: &[Token]) -> String {
    match (term.first(), term.last()) {
        (Some(first), Some(last)) => sql[first.span.start..last.span.end].to_string(),
        _ => String::new(),
    }
}
