//! CSS capability: stylesheet text → typed tokens → text.
//!
//! Only the token kinds that matter for reference rewriting are modelled;
//! everything else is carried through as [`CssToken::Other`] with its exact
//! source text, so an untouched token stream serializes back byte-for-byte.
//!
//! [`rewrite_urls`] is the single url-rewrite pass shared by stylesheet
//! resources and inline `style` attributes / `<style>` elements.

use cssparser::{ParseError, Parser, ParserInput, SourcePosition, Token};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum CssToken {
    /// Unquoted `url(...)`. `raw` holds the original text until the value changes.
    Url { url: String, raw: Option<String> },
    /// Function name, without the opening parenthesis.
    Function(String),
    String {
        value: String,
        quote: char,
        raw: Option<String>,
    },
    CloseParen,
    Other(String),
}

impl CssToken {
    pub fn to_css(&self) -> String {
        match self {
            CssToken::Url { raw: Some(raw), .. } => raw.clone(),
            CssToken::Url { url, raw: None } => format!("url({})", url),
            CssToken::Function(name) => format!("{}(", name),
            CssToken::String { raw: Some(raw), .. } => raw.clone(),
            CssToken::String {
                value,
                quote,
                raw: None,
            } => {
                let mut out = String::with_capacity(value.len() + 2);
                out.push(*quote);
                for c in value.chars() {
                    if c == *quote || c == '\\' {
                        out.push('\\');
                    }
                    if c == '\n' {
                        out.push_str("\\a ");
                        continue;
                    }
                    out.push(c);
                }
                out.push(*quote);
                out
            }
            CssToken::CloseParen => ")".to_string(),
            CssToken::Other(text) => text.clone(),
        }
    }
}

pub fn serialize(tokens: &[CssToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        let _ = write!(out, "{}", token.to_css());
    }
    out
}

pub trait CssTokenizer {
    fn tokenize(&self, css: &str) -> Vec<CssToken>;
}

/// Rewrite every URL reference in `tokens`: bare url tokens and the first
/// string argument of a `url(` function. `rewrite` returns the replacement value, or
/// `None` to leave the reference alone.
///
/// Returns the original values of the references that were replaced, in order.
pub fn rewrite_urls<E>(
    tokens: &mut [CssToken],
    mut rewrite: impl FnMut(&str) -> Result<Option<String>, E>,
) -> Result<Vec<String>, E> {
    let mut replaced = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            CssToken::Url { url, .. } => {
                let original = url.clone();
                if let Some(new) = rewrite(&original)? {
                    tokens[i] = CssToken::Url {
                        url: new,
                        raw: None,
                    };
                    replaced.push(original);
                }
            }
            CssToken::Function(name) if name.eq_ignore_ascii_case("url") => {
                // Only the first string argument names the resource.
                let mut seen_string = false;
                i += 1;
                while i < tokens.len() && tokens[i] != CssToken::CloseParen {
                    if let CssToken::String { value, quote, .. } = &tokens[i]
                        && !seen_string
                    {
                        seen_string = true;
                        let original = value.clone();
                        let quote = *quote;
                        if let Some(new) = rewrite(&original)? {
                            tokens[i] = CssToken::String {
                                value: new,
                                quote,
                                raw: None,
                            };
                            replaced.push(original);
                        }
                    }
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    Ok(replaced)
}

/// Tokenizer backed by `cssparser`. Every source byte lands in exactly one
/// token, so the stream serializes back to the input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardTokenizer;

impl CssTokenizer for StandardTokenizer {
    fn tokenize(&self, css: &str) -> Vec<CssToken> {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut tokens = Vec::new();
        collect_tokens(&mut parser, &mut tokens);
        tokens
    }
}

fn collect_tokens(parser: &mut Parser<'_, '_>, tokens: &mut Vec<CssToken>) {
    loop {
        let start = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        let raw = parser.slice_from(start);
        match token {
            Token::UnquotedUrl(url) => tokens.push(CssToken::Url {
                url: (*url).to_owned(),
                raw: Some(raw.to_string()),
            }),
            Token::QuotedString(value) => tokens.push(CssToken::String {
                value: (*value).to_owned(),
                quote: raw.chars().next().unwrap_or('"'),
                raw: Some(raw.to_string()),
            }),
            Token::Function(_) => {
                let name = raw.strip_suffix('(').unwrap_or(raw);
                tokens.push(CssToken::Function(name.to_string()));
                collect_block(parser, tokens, true);
            }
            Token::ParenthesisBlock | Token::SquareBracketBlock | Token::CurlyBracketBlock => {
                push_other(tokens, raw);
                collect_block(parser, tokens, false);
            }
            Token::CloseParenthesis => tokens.push(CssToken::CloseParen),
            _ => push_other(tokens, raw),
        }
    }
}

/// Tokens of the block just opened, then its closing delimiter (absent when
/// the input ends first).
fn collect_block(parser: &mut Parser<'_, '_>, tokens: &mut Vec<CssToken>, function: bool) {
    let inner: Result<SourcePosition, ParseError<'_, ()>> = parser.parse_nested_block(|nested| {
        collect_tokens(nested, tokens);
        Ok(nested.position())
    });
    let Ok(inner_end) = inner else {
        return;
    };
    let closer = parser.slice_from(inner_end);
    match (closer.is_empty(), function) {
        (true, _) => {}
        (false, true) => tokens.push(CssToken::CloseParen),
        (false, false) => push_other(tokens, closer),
    }
}

fn push_other(tokens: &mut Vec<CssToken>, text: &str) {
    if let Some(CssToken::Other(previous)) = tokens.last_mut() {
        previous.push_str(text);
    } else {
        tokens.push(CssToken::Other(text.to_string()));
    }
}
