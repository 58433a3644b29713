use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
}

/// A token with the byte offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Split formula text into tokens.
///
/// The whole input is scanned before anything else happens, so a character
/// outside the lexical set is reported even when the text would also fail
/// to parse or reference unknown names.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(position, ch)) = chars.peek() {
        if ch.is_ascii_whitespace() {
            chars.next();
            continue;
        }

        let token = match ch {
            '0'..='9' | '.' => {
                let mut raw = String::new();
                let mut seen_dot = false;
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_digit() {
                        raw.push(next);
                    } else if next == '.' && !seen_dot {
                        seen_dot = true;
                        raw.push(next);
                    } else {
                        break;
                    }
                    chars.next();
                }
                if raw == "." {
                    return Err(ExprError::Lex {
                        position,
                        found: '.',
                    });
                }
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| ExprError::parse(position, format!("invalid number '{raw}'")))?;
                Token::Number(value)
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut ident = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(ident)
            }
            '*' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '*'))) {
                    chars.next();
                    Token::StarStar
                } else {
                    Token::Star
                }
            }
            '+' | '-' | '/' | '%' | '(' | ')' | ',' => {
                chars.next();
                match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                }
            }
            other => {
                return Err(ExprError::Lex {
                    position,
                    found: other,
                })
            }
        };
        tokens.push(Spanned { token, position });
    }

    Ok(tokens)
}
