//! Tokenizer for header lines.
//!
//! Header lines use a small subset of Python expression syntax:
//! identifiers, attribute access, calls, keyword arguments, tuples/lists,
//! quoted strings and numbers. An unquoted `#` starts a comment that runs to
//! the end of the physical line.

/// A lexical token of a header line.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Equals,
    Dot,
}

/// Split one header line into tokens.
pub fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while chars.next_if(|&(_, d)| d != '\n').is_some() {}
            }
            '(' | ')' | '[' | ']' | ',' | '=' | '.' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    '=' => Token::Equals,
                    _ => Token::Dot,
                });
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Str(lex_string(&mut chars, c, start)?));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let mut end = start;
                let mut first = true;
                while let Some(&(i, d)) = chars.peek() {
                    let sign_ok = first && (d == '-' || d == '+');
                    let exp_sign = (d == '-' || d == '+')
                        && line[..i].ends_with(|p: char| p == 'e' || p == 'E');
                    if d.is_ascii_alphanumeric() || d == '.' || d == '_' || sign_ok || exp_sign {
                        end = i + d.len_utf8();
                        chars.next();
                        first = false;
                    } else {
                        break;
                    }
                }
                tokens.push(lex_number(&line[start..end])?);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(line[start..end].to_string()));
            }
            other => return Err(format!("unexpected character `{}` at column {}", other, start + 1)),
        }
    }

    Ok(tokens)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, String> {
    let mut value = String::new();

    while let Some((_, c)) = chars.next() {
        match c {
            c if c == quote => return Ok(value),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, '0')) => value.push('\0'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '\'')) => value.push('\''),
                Some((_, '"')) => value.push('"'),
                // Python keeps unknown escapes verbatim
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            c => value.push(c),
        }
    }

    Err(format!("unterminated string starting at column {}", start + 1))
}

fn lex_number(text: &str) -> Result<Token, String> {
    let cleaned = text.replace('_', "");
    if let Ok(i) = cleaned.parse::<i64>() {
        return Ok(Token::Int(i));
    }
    cleaned
        .parse::<f64>()
        .map(Token::Float)
        .map_err(|_| format!("invalid number `{}`", text))
}
