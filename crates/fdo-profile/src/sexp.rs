//! Minimal hand-rolled S-expression reader/writer for the textual profile
//! store (spec §4.7). Not a general Lisp reader — just enough nesting and
//! quoting to round-trip the decoded-profile schema in `store.rs`.

use crate::{ProfileError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub(crate) fn atom(s: impl Into<String>) -> Self {
        Sexp::Atom(s.into())
    }

    pub(crate) fn list(items: Vec<Sexp>) -> Self {
        Sexp::List(items)
    }

    pub(crate) fn as_atom(&self) -> Result<&str> {
        match self {
            Sexp::Atom(s) => Ok(s),
            Sexp::List(_) => Err(ProfileError::MalformedSexp {
                detail: "expected atom, found list".to_string(),
            }),
        }
    }

    pub(crate) fn as_list(&self) -> Result<&[Sexp]> {
        match self {
            Sexp::List(items) => Ok(items),
            Sexp::Atom(a) => Err(ProfileError::MalformedSexp {
                detail: format!("expected list, found atom `{a}`"),
            }),
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Sexp::Atom(s) => {
                if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '(' || c == ')' || c == '"') {
                    out.push('"');
                    for c in s.chars() {
                        if c == '"' || c == '\\' {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push('"');
                } else {
                    out.push_str(s);
                }
            }
            Sexp::List(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.render(out);
                }
                out.push(')');
            }
        }
    }

    pub(crate) fn to_text(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    pub(crate) fn parse(input: &str) -> Result<Sexp> {
        let tokens = tokenize(input)?;
        let mut pos = 0;
        let value = parse_one(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(ProfileError::MalformedSexp {
                detail: "trailing input after top-level expression".to_string(),
            });
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Atom(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => {
                            return Err(ProfileError::MalformedSexp {
                                detail: "unterminated quoted atom".to_string(),
                            })
                        }
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => s.push(escaped),
                            None => {
                                return Err(ProfileError::MalformedSexp {
                                    detail: "dangling escape at end of input".to_string(),
                                })
                            }
                        },
                        Some(other) => s.push(other),
                    }
                }
                tokens.push(Token::Atom(s));
            }
            _ => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    s.push(c);
                    chars.next();
                }
                tokens.push(Token::Atom(s));
            }
        }
    }
    Ok(tokens)
}

fn parse_one(tokens: &[Token], pos: &mut usize) -> Result<Sexp> {
    match tokens.get(*pos) {
        Some(Token::Atom(s)) => {
            *pos += 1;
            Ok(Sexp::Atom(s.clone()))
        }
        Some(Token::Open) => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos) {
                    Some(Token::Close) => {
                        *pos += 1;
                        break;
                    }
                    Some(_) => items.push(parse_one(tokens, pos)?),
                    None => {
                        return Err(ProfileError::MalformedSexp {
                            detail: "unterminated list".to_string(),
                        })
                    }
                }
            }
            Ok(Sexp::List(items))
        }
        Some(Token::Close) => Err(ProfileError::MalformedSexp {
            detail: "unexpected `)`".to_string(),
        }),
        None => Err(ProfileError::MalformedSexp {
            detail: "unexpected end of input".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_nested_list() {
        let s = Sexp::list(vec![
            Sexp::atom("addr2loc"),
            Sexp::list(vec![Sexp::atom("0x400500"), Sexp::atom("has spaces")]),
        ]);
        let text = s.to_text();
        let parsed = Sexp::parse(&text).unwrap();
        assert_eq!(s, parsed);
    }

    #[test]
    fn quotes_atoms_containing_parens() {
        let s = Sexp::atom("a(b)c");
        let text = s.to_text();
        assert_eq!(Sexp::parse(&text).unwrap(), s);
    }

    #[test]
    fn rejects_unterminated_list() {
        assert!(Sexp::parse("(a b").is_err());
    }
}
