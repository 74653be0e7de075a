use crate::error::{EvalFault, EvaluationError, ParseError};
use crate::traits::{Scalar, ScalarOde};
use log::debug;
use std::collections::HashMap;
use std::str::FromStr;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a bound variable (by index) onto the stack.
    /// For ODE right-hand sides, 0 = t and 1 = y.
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b). Fails if b is zero.
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes sin(a).
    Sin,
    /// Pops top value (a), pushes cos(a).
    Cos,
    /// Pops top value (a), pushes tan(a).
    Tan,
    /// Pops top value (a), pushes exp(a).
    Exp,
    /// Pops top value (a), pushes ln(a). Fails if a <= 0.
    Ln,
    /// Pops top value (a), pushes sqrt(a). Fails if a < 0.
    Sqrt,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
    /// Deepest stack the ops reach; used to size the evaluation buffer.
    pub max_depth: usize,
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Values of the bound variables (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Every intermediate result is checked, so a returned value is always finite.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        stack: &mut Vec<T>,
    ) -> Result<T, EvalFault> {
        stack.clear();

        for op in &bytecode.ops {
            let value = match *op {
                OpCode::LoadConst(val) => T::from_f64(val).ok_or(EvalFault::NonFinite)?,
                OpCode::LoadVar(idx) => *vars.get(idx).ok_or(EvalFault::MalformedBytecode)?,
                OpCode::Add => {
                    let (a, b) = pop_pair(stack)?;
                    a + b
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack)?;
                    a - b
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack)?;
                    a * b
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack)?;
                    if b.is_zero() {
                        return Err(EvalFault::DivisionByZero);
                    }
                    a / b
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack)?;
                    let value = a.powf(b);
                    if value.is_nan() {
                        return Err(domain("pow", a));
                    }
                    value
                }
                OpCode::Neg => -pop(stack)?,
                OpCode::Sin => pop(stack)?.sin(),
                OpCode::Cos => pop(stack)?.cos(),
                OpCode::Tan => pop(stack)?.tan(),
                OpCode::Exp => pop(stack)?.exp(),
                OpCode::Ln => {
                    let a = pop(stack)?;
                    if a <= T::zero() {
                        return Err(domain("log", a));
                    }
                    a.ln()
                }
                OpCode::Sqrt => {
                    let a = pop(stack)?;
                    if a < T::zero() {
                        return Err(domain("sqrt", a));
                    }
                    a.sqrt()
                }
            };

            if !value.is_finite() {
                return Err(EvalFault::NonFinite);
            }
            stack.push(value);
        }

        let result = pop(stack)?;
        if stack.is_empty() {
            Ok(result)
        } else {
            Err(EvalFault::MalformedBytecode)
        }
    }
}

fn pop<T>(stack: &mut Vec<T>) -> Result<T, EvalFault> {
    stack.pop().ok_or(EvalFault::MalformedBytecode)
}

fn pop_pair<T>(stack: &mut Vec<T>) -> Result<(T, T), EvalFault> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    Ok((a, b))
}

fn domain<T: Scalar>(function: &'static str, argument: T) -> EvalFault {
    EvalFault::Domain {
        function,
        argument: argument.to_f64().unwrap_or(f64::NAN),
    }
}

// --- AST & Compiler ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Abstract Syntax Tree nodes for expressions.
///
/// Names are kept as written, with their source position, and are resolved
/// against a symbol table by the `Compiler`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable { name: String, position: usize },
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Call {
        function: String,
        position: usize,
        arg: Box<Expr>,
    },
}

/// Functions callable from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
}

impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "exp" => Some(Function::Exp),
            "log" | "ln" => Some(Function::Ln),
            "sqrt" => Some(Function::Sqrt),
            _ => None,
        }
    }

    fn opcode(self) -> OpCode {
        match self {
            Function::Sin => OpCode::Sin,
            Function::Cos => OpCode::Cos,
            Function::Tan => OpCode::Tan,
            Function::Exp => OpCode::Exp,
            Function::Ln => OpCode::Ln,
            Function::Sqrt => OpCode::Sqrt,
        }
    }
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable names to indices and constant names to values; any other
/// name is rejected.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub const_map: HashMap<String, f64>,
}

impl Compiler {
    pub fn new(var_names: &[&str], constants: &[(&str, f64)]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        let const_map = constants
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        Self { var_map, const_map }
    }

    /// The symbol table of an ODE right-hand side: `t` and `y` bound at
    /// evaluation time, `e` fixed to Euler's number.
    pub fn for_scalar_ode() -> Self {
        Self::new(&["t", "y"], &[("e", std::f64::consts::E)])
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, ParseError> {
        let mut ops = Vec::new();
        let max_depth = self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops, max_depth })
    }

    /// Emits ops for `expr` and returns the stack depth they need.
    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<usize, ParseError> {
        match expr {
            Expr::Number(n) => {
                ops.push(OpCode::LoadConst(*n));
                Ok(1)
            }
            Expr::Variable { name, position } => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&value) = self.const_map.get(name) {
                    ops.push(OpCode::LoadConst(value));
                } else if Function::lookup(name).is_some() {
                    return Err(ParseError::MissingArgument {
                        name: name.clone(),
                        position: *position,
                    });
                } else {
                    return Err(ParseError::UnknownSymbol {
                        name: name.clone(),
                        position: *position,
                    });
                }
                Ok(1)
            }
            Expr::Binary(left, op, right) => {
                let left_depth = self.compile_recursive(left, ops)?;
                let right_depth = self.compile_recursive(right, ops)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Pow => OpCode::Pow,
                });
                Ok(left_depth.max(right_depth + 1))
            }
            Expr::Unary(UnaryOp::Neg, operand) => {
                let depth = self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
                Ok(depth)
            }
            Expr::Call {
                function,
                position,
                arg,
            } => {
                let func = Function::lookup(function).ok_or_else(|| {
                    ParseError::UnknownFunction {
                        name: function.clone(),
                        position: *position,
                    }
                })?;
                let depth = self.compile_recursive(arg, ops)?;
                ops.push(func.opcode());
                Ok(depth)
            }
        }
    }
}

// --- Tokenizer & Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let (expr, _) = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(extra) => Err(extra.unexpected()),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

/// A token with the character offset where it starts.
#[derive(Debug, Clone, PartialEq)]
struct Spanned {
    token: Token,
    position: usize,
}

impl Spanned {
    fn unexpected(&self) -> ParseError {
        let token = match &self.token {
            Token::Number(n) => n.to_string(),
            Token::Identifier(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::Caret => "^".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        };
        ParseError::UnexpectedToken {
            token,
            position: self.position,
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Scientific notation: the 'e' must be followed by a digit,
            // optionally signed, otherwise it is the constant.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal: String = chars[start..i].iter().collect();
            match literal.parse::<f64>() {
                Ok(value) if value.is_finite() => Token::Number(value),
                _ => {
                    return Err(ParseError::InvalidNumber {
                        literal,
                        position: start,
                    })
                }
            }
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            Token::Identifier(chars[start..i].iter().collect())
        } else {
            i += 1;
            match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' if chars.get(i) == Some(&'*') => {
                    i += 1;
                    Token::Caret
                }
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => {
                    return Err(ParseError::UnexpectedChar {
                        ch: c,
                        position: start,
                    })
                }
            }
        };

        tokens.push(Spanned {
            token,
            position: start,
        });
    }

    Ok(tokens)
}

/// Tallest expression tree the parser builds. Compiling, rendering and
/// dropping an `Expr` all recurse over it.
const MAX_NESTING: usize = 256;

/// A parsed subtree and its height.
type Parsed = (Expr, usize);

fn grow(height: usize, position: usize) -> Result<usize, ParseError> {
    if height >= MAX_NESTING {
        return Err(ParseError::TooDeep { position });
    }
    Ok(height + 1)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Open recursive descents (parentheses, calls, unary minus, exponents).
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|spanned| &spanned.token)
    }

    fn consume(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    /// Position of the next token, or the end of input.
    fn next_position(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(0, |spanned| spanned.position)
    }

    /// Runs `parse` one recursion level deeper, failing before the native
    /// stack can run out.
    fn descend(
        &mut self,
        position: usize,
        parse: impl FnOnce(&mut Self) -> Result<Parsed, ParseError>,
    ) -> Result<Parsed, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep { position });
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn parse_expression(&mut self) -> Result<Parsed, ParseError> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Parsed, ParseError> {
        let (mut left, mut height) = self.parse_factor()?;

        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let position = self.next_position();
            self.consume();
            let (right, right_height) = self.parse_factor()?;
            height = grow(height.max(right_height), position)?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok((left, height))
    }

    fn parse_factor(&mut self) -> Result<Parsed, ParseError> {
        let (mut left, mut height) = self.parse_power()?;

        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            let position = self.next_position();
            self.consume();
            let (right, right_height) = self.parse_power()?;
            height = grow(height.max(right_height), position)?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok((left, height))
    }

    /// Right-associative: `a ^ b ^ c` is `a ^ (b ^ c)`.
    fn parse_power(&mut self) -> Result<Parsed, ParseError> {
        let (base, base_height) = self.parse_unary()?;

        if let Some(Token::Caret) = self.peek_token() {
            let position = self.next_position();
            self.consume();
            let (exponent, exponent_height) = self.descend(position, Self::parse_power)?;
            let height = grow(base_height.max(exponent_height), position)?;
            return Ok((
                Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)),
                height,
            ));
        }
        Ok((base, base_height))
    }

    fn parse_unary(&mut self) -> Result<Parsed, ParseError> {
        if let Some(Token::Minus) = self.peek_token() {
            let position = self.next_position();
            self.consume();
            let (expr, height) = self.descend(position, Self::parse_unary)?;
            return Ok((Expr::Unary(UnaryOp::Neg, Box::new(expr)), grow(height, position)?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Parsed, ParseError> {
        let Some(spanned) = self.consume() else {
            return Err(ParseError::UnexpectedEnd {
                expected: "a number, symbol or '('",
            });
        };

        match spanned.token {
            Token::Number(n) => Ok((Expr::Number(n), 1)),
            Token::Identifier(name) => {
                if let Some(Token::LParen) = self.peek_token() {
                    let open = self.consume().map_or(spanned.position, |t| t.position);
                    let (arg, height) = self.descend(open, Self::parse_expression)?;
                    self.expect_close(open)?;
                    Ok((
                        Expr::Call {
                            function: name,
                            position: spanned.position,
                            arg: Box::new(arg),
                        },
                        grow(height, spanned.position)?,
                    ))
                } else {
                    Ok((
                        Expr::Variable {
                            name,
                            position: spanned.position,
                        },
                        1,
                    ))
                }
            }
            Token::LParen => {
                let (expr, height) = self.descend(spanned.position, Self::parse_expression)?;
                self.expect_close(spanned.position)?;
                // Grouping counts towards the limit so the descent stays bounded.
                Ok((expr, grow(height, spanned.position)?))
            }
            _ => Err(spanned.unexpected()),
        }
    }

    fn expect_close(&mut self, open: usize) -> Result<(), ParseError> {
        match self.consume() {
            Some(Spanned {
                token: Token::RParen,
                ..
            }) => Ok(()),
            Some(other) => Err(other.unexpected()),
            None => Err(ParseError::UnclosedParen { open }),
        }
    }
}

// --- Equation ---

/// A compiled ODE right-hand side f(t, y).
///
/// Immutable once built. Each evaluation uses its own stack, so an `Equation`
/// can be shared between threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    source: String,
    expr: Expr,
    bytecode: Bytecode,
}

impl Equation {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    pub fn evaluate(&self, t: f64, y: f64) -> Result<f64, EvaluationError> {
        let mut stack = Vec::with_capacity(self.bytecode.max_depth);
        VM::execute(&self.bytecode, &[t, y], &mut stack)
            .map_err(|fault| EvaluationError::at(t, y, fault))
    }
}

impl ScalarOde for Equation {
    fn derivative(&self, t: f64, y: f64) -> Result<f64, EvaluationError> {
        self.evaluate(t, y)
    }
}

impl FromStr for Equation {
    type Err = ParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        compile(source)
    }
}

/// Compiles `source` into an `Equation` over `t`, `y` and the constant `e`.
pub fn compile(source: &str) -> Result<Equation, ParseError> {
    let expr = parse(source)?;
    let bytecode = Compiler::for_scalar_ode().compile(&expr)?;
    debug!(
        "compiled equation {:?} into {} ops (stack depth {})",
        source,
        bytecode.ops.len(),
        bytecode.max_depth
    );
    Ok(Equation {
        source: source.to_string(),
        expr,
        bytecode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::E;

    fn eval(source: &str, t: f64, y: f64) -> f64 {
        compile(source)
            .expect("equation should compile")
            .evaluate(t, y)
            .expect("equation should evaluate")
    }

    #[test]
    fn evaluates_linear_right_hand_side() {
        assert_relative_eq!(eval("2 * t - 3 * y + 1", 1.0, 5.0), -12.0);
    }

    #[test]
    fn follows_conventional_precedence() {
        assert_eq!(eval("1 + 2 * 3", 0.0, 0.0), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0, 0.0), 9.0);
        assert_eq!(eval("8 / 4 / 2", 0.0, 0.0), 1.0);
        assert_eq!(eval("10 - 4 - 3", 0.0, 0.0), 3.0);
        assert_eq!(eval("2 ^ 3 ^ 2", 0.0, 0.0), 512.0);
        assert_eq!(eval("2 * 3 ^ 2", 0.0, 0.0), 18.0);
    }

    #[test]
    fn unary_minus_binds_tighter_than_power() {
        assert_eq!(eval("-t ^ 2", 3.0, 0.0), 9.0);
        assert_eq!(eval("-(t ^ 2)", 3.0, 0.0), -9.0);
        assert_eq!(eval("2 ^ -1", 0.0, 0.0), 0.5);
        assert_eq!(eval("--y", 0.0, 4.0), 4.0);
        assert_eq!(eval("t - -y", 1.0, 2.0), 3.0);
    }

    #[test]
    fn accepts_python_power_and_scientific_literals() {
        assert_eq!(eval("t ** 2", 3.0, 0.0), 9.0);
        assert_eq!(eval("1e3 + 2.5E-1", 0.0, 0.0), 1000.25);
        assert_eq!(eval(".5 + 1.", 0.0, 0.0), 1.5);
    }

    #[test]
    fn binds_e_to_eulers_number() {
        assert_eq!(eval("e", 0.0, 0.0), E);
        assert_relative_eq!(eval("2*e", 0.0, 0.0), 2.0 * E);
        assert_relative_eq!(eval("e^t", 2.0, 0.0), E.powi(2), max_relative = 1e-15);
    }

    #[test]
    fn evaluates_functions() {
        assert_relative_eq!(eval("sin(t) ^ 2 + cos(t) ^ 2", 0.7, 0.0), 1.0, epsilon = 1e-15);
        assert_relative_eq!(eval("tan(t)", 0.3, 0.0), 0.3_f64.tan());
        assert_relative_eq!(eval("log(exp(y))", 0.0, 1.25), 1.25, epsilon = 1e-15);
        assert_relative_eq!(eval("ln(e)", 0.0, 0.0), 1.0);
        assert_eq!(eval("sqrt(y)", 0.0, 16.0), 4.0);
        assert_relative_eq!(eval("-sin(t)", 1.0, 0.0), -(1.0_f64.sin()));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let equation = compile("sin(t * y) / (1 + y^2) - exp(-t)").expect("compile");
        let first = equation.evaluate(0.37, -1.9).expect("eval");
        let second = equation.evaluate(0.37, -1.9).expect("eval");
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn rejects_unknown_symbol() {
        let err = compile("t + unknown_symbol").expect_err("unknown symbol should fail");
        assert_eq!(
            err,
            ParseError::UnknownSymbol {
                name: "unknown_symbol".to_string(),
                position: 4,
            }
        );
        assert!(err.to_string().contains("unknown_symbol"));
    }

    #[test]
    fn rejects_unknown_function_and_bare_function_name() {
        assert!(matches!(
            compile("abs(t)"),
            Err(ParseError::UnknownFunction { ref name, position: 0 }) if name == "abs"
        ));
        assert!(matches!(
            compile("sin + 1"),
            Err(ParseError::MissingArgument { ref name, .. }) if name == "sin"
        ));
    }

    #[test]
    fn rejects_malformed_syntax() {
        assert_eq!(compile(""), Err(ParseError::Empty));
        assert_eq!(compile("   "), Err(ParseError::Empty));
        assert!(matches!(compile("1 +"), Err(ParseError::UnexpectedEnd { .. })));
        assert!(matches!(
            compile("(t + 1"),
            Err(ParseError::UnclosedParen { open: 0 })
        ));
        assert!(matches!(
            compile("t )"),
            Err(ParseError::UnexpectedToken { ref token, position: 2 }) if token == ")"
        ));
        assert!(matches!(
            compile("2 3"),
            Err(ParseError::UnexpectedToken { position: 2, .. })
        ));
        assert!(matches!(
            compile("t $ y"),
            Err(ParseError::UnexpectedChar { ch: '$', position: 2 })
        ));
        assert!(matches!(
            compile("1.2.3"),
            Err(ParseError::InvalidNumber { position: 0, .. })
        ));
        assert!(matches!(
            compile("* t"),
            Err(ParseError::UnexpectedToken { position: 0, .. })
        ));
    }

    #[test]
    fn reports_evaluation_faults_with_location() {
        let equation = compile("1 / (t - 1)").expect("compile");
        let err = equation.evaluate(1.0, 3.0).expect_err("division by zero");
        assert_eq!(err, EvaluationError::at(1.0, 3.0, EvalFault::DivisionByZero));

        let err = compile("log(y)").unwrap().evaluate(0.0, -2.0).unwrap_err();
        assert_eq!(
            err.fault,
            EvalFault::Domain {
                function: "log",
                argument: -2.0
            }
        );

        let err = compile("sqrt(t)").unwrap().evaluate(-1.0, 0.0).unwrap_err();
        assert!(matches!(err.fault, EvalFault::Domain { function: "sqrt", .. }));

        let err = compile("(-8) ^ (1/3)").unwrap().evaluate(0.0, 0.0).unwrap_err();
        assert!(matches!(err.fault, EvalFault::Domain { function: "pow", .. }));

        let err = compile("exp(y)").unwrap().evaluate(0.0, 1000.0).unwrap_err();
        assert_eq!(err.fault, EvalFault::NonFinite);
    }

    /// Deepest stack the ops actually reach when run.
    fn simulated_depth(ops: &[OpCode]) -> usize {
        let mut depth = 0_usize;
        let mut deepest = 0;
        for op in ops {
            match op {
                OpCode::LoadConst(_) | OpCode::LoadVar(_) => depth += 1,
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => depth -= 1,
                _ => {}
            }
            deepest = deepest.max(depth);
        }
        assert_eq!(depth, 1, "ops should leave exactly one value");
        deepest
    }

    #[test]
    fn compiler_tracks_stack_depth() {
        let expr = parse("t + y * (t - y)").expect("parse");
        let bytecode = Compiler::for_scalar_ode().compile(&expr).expect("compile");
        assert_eq!(bytecode.max_depth, 4);
        assert_eq!(
            bytecode.ops,
            vec![
                OpCode::LoadVar(0),
                OpCode::LoadVar(1),
                OpCode::LoadVar(0),
                OpCode::LoadVar(1),
                OpCode::Sub,
                OpCode::Mul,
                OpCode::Add,
            ]
        );
    }

    #[test]
    fn stack_depth_matches_execution() {
        for source in [
            "t",
            "t + y * (t - y)",
            "(t - y) * y + t",
            "2 ^ 3 ^ (t - 1) ^ y",
            "-sin(t * (y + (1 - t / (y ^ 2))))",
            "sqrt(t) + exp(y) * log(t + y) - 1 / (2 + t)",
        ] {
            let bytecode = compile(source).expect("compile").bytecode().clone();
            assert_eq!(bytecode.max_depth, simulated_depth(&bytecode.ops), "{source}");
        }
    }

    #[test]
    fn rejects_literals_that_overflow() {
        assert_eq!(
            compile("1e999 * 0 + t"),
            Err(ParseError::InvalidNumber {
                literal: "1e999".to_string(),
                position: 0,
            })
        );
        assert!(compile("1.7e308 + t").is_ok());
    }

    #[test]
    fn rejects_excessive_nesting_without_overflowing() {
        let nested = |depth: usize| format!("{}t{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(eval(&nested(100), 2.0, 0.0), 2.0);
        assert!(matches!(
            compile(&nested(20_000)),
            Err(ParseError::TooDeep { .. })
        ));

        assert!(matches!(
            compile(&format!("{}y", "-".repeat(20_000))),
            Err(ParseError::TooDeep { .. })
        ));
        assert!(matches!(
            compile(&format!("sin({}t{}", "sin(".repeat(20_000), ")".repeat(20_001))),
            Err(ParseError::TooDeep { .. })
        ));
        assert!(matches!(
            compile(&vec!["t"; 20_000].join(" ^ ")),
            Err(ParseError::TooDeep { .. })
        ));

        // Long flat chains build tall trees too.
        assert!(compile(&vec!["t"; 200].join(" + ")).is_ok());
        assert!(matches!(
            compile(&vec!["t"; 20_000].join(" + ")),
            Err(ParseError::TooDeep { .. })
        ));
        assert!(matches!(
            compile(&vec!["y"; 20_000].join(" * ")),
            Err(ParseError::TooDeep { .. })
        ));
    }

    #[test]
    fn vm_runs_over_other_scalars() {
        let expr = parse("t * t + 2").expect("parse");
        let bytecode = Compiler::for_scalar_ode().compile(&expr).expect("compile");
        let mut stack = Vec::new();
        let value = VM::execute(&bytecode, &[3.0_f32, 0.0_f32], &mut stack).expect("execute");
        assert_eq!(value, 11.0_f32);
    }

    #[test]
    fn vm_rejects_malformed_bytecode() {
        let bytecode = Bytecode {
            ops: vec![OpCode::LoadConst(1.0), OpCode::Add],
            max_depth: 1,
        };
        let mut stack = Vec::new();
        assert_eq!(
            VM::execute::<f64>(&bytecode, &[], &mut stack),
            Err(EvalFault::MalformedBytecode)
        );
    }

    #[test]
    fn equation_parses_from_str() {
        let equation: Equation = "y".parse().expect("parse");
        assert_eq!(equation.source(), "y");
        assert_eq!(equation.evaluate(0.0, 2.0), Ok(2.0));
    }
}
