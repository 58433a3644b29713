use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ExprError;
use crate::functions::{Constant, Function};
use crate::token::{tokenize, Spanned, Token};

/// Resource limits applied while compiling an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum formula length in bytes.
    pub max_length: usize,
    /// Maximum nesting of parentheses, calls and unary operators.
    pub max_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_length: 4096,
            max_depth: 64,
        }
    }
}

/// Tokenize and parse formula text into a tree.
///
/// Grammar, lowest precedence first:
///
/// ```text
/// expr    := term (('+' | '-') term)*
/// term    := unary (('*' | '/' | '%') unary)*
/// unary   := ('-' | '+') unary | power
/// power   := primary ('**' unary)?
/// primary := number | constant | variable | function '(' args ')' | '(' expr ')'
/// ```
///
/// `**` binds tighter than a leading minus (`-2 ** 2` is `-4`) and is
/// right-associative.
pub fn parse(source: &str, limits: &ParseLimits) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    if source.len() > limits.max_length {
        return Err(ExprError::parse(
            limits.max_length,
            format!(
                "expression is {} bytes long, limit is {}",
                source.len(),
                limits.max_length
            ),
        ));
    }
    if tokens.is_empty() {
        return Err(ExprError::parse(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: source.len(),
        max_depth: limits.max_depth,
    };
    let expr = parser.parse_expr()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(ExprError::parse(extra.position, "unexpected token after expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    end: usize,
    max_depth: usize,
}

impl Parser {
    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.nested(Self::parse_add_sub)
    }

    fn parse_add_sub(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_mul_div()?;
        loop {
            let op = if self.consume(&Token::Plus) {
                BinaryOp::Add
            } else if self.consume(&Token::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_mul_div()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_mul_div(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = if self.consume(&Token::Star) {
                BinaryOp::Mul
            } else if self.consume(&Token::Slash) {
                BinaryOp::Div
            } else if self.consume(&Token::Percent) {
                BinaryOp::Rem
            } else {
                break;
            };
            let right = self.parse_unary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.consume(&Token::Plus) {
            return self.nested(Self::parse_unary);
        }
        if self.consume(&Token::Minus) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_pow()
    }

    fn parse_pow(&mut self) -> Result<Expr, ExprError> {
        let base = self.parse_primary()?;
        if self.consume(&Token::StarStar) {
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let Some(Spanned { token, position }) = self.next() else {
            return Err(ExprError::parse(self.end, "unexpected end of expression"));
        };
        match token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Ident(name) => {
                if self.consume(&Token::LParen) {
                    return self.parse_call(name, position);
                }
                if let Some(constant) = Constant::lookup(&name) {
                    return Ok(Expr::Constant(constant));
                }
                if Function::lookup(&name).is_some() {
                    return Err(ExprError::parse(
                        position,
                        format!("function '{name}' must be called with arguments"),
                    ));
                }
                Ok(Expr::Variable(name))
            }
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen, "expected ')'")?;
                Ok(expr)
            }
            _ => Err(ExprError::parse(position, "expected a number, name or '('")),
        }
    }

    fn parse_call(&mut self, name: String, position: usize) -> Result<Expr, ExprError> {
        let function = Function::lookup(&name).ok_or_else(|| ExprError::UnknownIdentifier {
            name: name.clone(),
        })?;

        let mut args = Vec::new();
        if !self.consume(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.consume(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen, "expected ',' or ')' in argument list")?;
                break;
            }
        }

        let arity = function.arity();
        if !arity.accepts(args.len()) {
            return Err(ExprError::parse(
                position,
                format!(
                    "function '{name}' takes {arity} argument(s), got {}",
                    args.len()
                ),
            ));
        }
        Ok(Expr::Call { function, args })
    }

    fn nested(
        &mut self,
        rule: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            let position = self.tokens.get(self.pos).map_or(self.end, |t| t.position);
            return Err(ExprError::parse(
                position,
                format!("expression nests deeper than {}", self.max_depth),
            ));
        }
        let result = rule(self);
        self.depth -= 1;
        result
    }

    fn expect(&mut self, expected: &Token, message: &str) -> Result<(), ExprError> {
        if self.consume(expected) {
            return Ok(());
        }
        let position = self.tokens.get(self.pos).map_or(self.end, |t| t.position);
        Err(ExprError::parse(position, message))
    }

    fn consume(&mut self, expected: &Token) -> bool {
        match self.tokens.get(self.pos) {
            Some(spanned) if &spanned.token == expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}
