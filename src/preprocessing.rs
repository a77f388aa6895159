use anyhow::Result;
use regex::Regex;

use crate::vocab::Counter;

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Imaginary",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    Literal,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

/// Lexer for C source lines.
///
/// Whitespace and comments are dropped; everything else becomes a token.
/// Literals end on their line; an unmatched quote is a token of its own.
pub struct CTokenizer {
    lexer: Regex,
}

impl CTokenizer {
    pub fn new() -> Result<Self> {
        let lexer = Regex::new(
            r#"(?x)
              (?P<skip> \s+ | //[^\n]* | /\*(?s:.*?)\*/ )
            | (?P<literal> "(?:\\[^\r\n]|[^"\\\r\n])*" | '(?:\\[^\r\n]|[^'\\\r\n])*' )
            | (?P<number> 0[xX][0-9a-fA-F]+[uUlL]* | (?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?[uUlLfF]* )
            | (?P<word> [A-Za-z_][A-Za-z0-9_]* )
            | (?P<operator> <<= | >>= | \.\.\. | -> | \+\+ | -- | << | >> | <= | >= | == | != | && | \|\|
                          | [-+*/%&|^!=]= | \#\# | \S )
            "#,
        )?;
        Ok(Self { lexer })
    }

    pub fn lex<'a>(&self, source: &'a str) -> Vec<Token<'a>> {
        self.lexer
            .captures_iter(source)
            .filter_map(|caps| {
                let kind = if caps.name("skip").is_some() {
                    return None;
                } else if caps.name("literal").is_some() {
                    TokenKind::Literal
                } else if caps.name("number").is_some() {
                    TokenKind::Number
                } else if let Some(word) = caps.name("word") {
                    if C_KEYWORDS.contains(&word.as_str()) {
                        TokenKind::Keyword
                    } else {
                        TokenKind::Identifier
                    }
                } else {
                    TokenKind::Operator
                };
                caps.get(0).map(|m| Token {
                    kind,
                    text: m.as_str(),
                })
            })
            .collect()
    }

    /// Token texts of `source` plus the frequencies of its identifiers.
    pub fn tokenize(&self, source: &str) -> (Vec<String>, Counter) {
        let mut identifiers = Counter::new();
        let tokens = self
            .lex(source)
            .into_iter()
            .map(|token| {
                if token.kind == TokenKind::Identifier {
                    identifiers.add(token.text);
                }
                token.text.to_string()
            })
            .collect();
        (tokens, identifiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<String> {
        CTokenizer::new().unwrap().tokenize(source).0
    }

    #[test]
    fn splits_statements() {
        assert_eq!(
            texts("if (p->len >= 0x10UL) x += 2;"),
            ["if", "(", "p", "->", "len", ">=", "0x10UL", ")", "x", "+=", "2", ";"]
        );
    }

    #[test]
    fn drops_comments_and_whitespace() {
        assert_eq!(
            texts("a = b; // trailing\n/* block\n comment */ c++;"),
            ["a", "=", "b", ";", "c", "++", ";"]
        );
    }

    #[test]
    fn keeps_string_literals_whole() {
        assert_eq!(
            texts(r#"printk("a \"b\" c", 'x');"#),
            ["printk", "(", r#""a \"b\" c""#, ",", "'x'", ")", ";"]
        );
    }

    #[test]
    fn stray_quote_does_not_cross_lines() {
        let tokens = texts(" * it's new\n * more\n");
        assert_eq!(tokens, ["*", "it", "'", "s", "new", "*", "more"]);
        assert_eq!(texts("s = \"open\nx;"), ["s", "=", "\"", "open", "x", ";"]);
        assert!(tokens.iter().all(|t| !t.contains(['\n', '\r'])));
    }

    #[test]
    fn counts_identifiers_but_not_keywords() {
        let (_, identifiers) = CTokenizer::new()
            .unwrap()
            .tokenize("static int foo(int bar) { return foo(bar) + bar; }");
        assert_eq!(identifiers.get("foo"), 2);
        assert_eq!(identifiers.get("bar"), 3);
        assert_eq!(identifiers.get("int"), 0);
        assert_eq!(identifiers.get("return"), 0);
    }

    #[test]
    fn classifies_tokens() {
        let tokenizer = CTokenizer::new().unwrap();
        let kinds: Vec<TokenKind> = tokenizer.lex("while (n) n = 1.5e3;").iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            [
                TokenKind::Keyword,
                TokenKind::Operator,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Number,
                TokenKind::Operator,
            ]
        );
    }
}
