//! Text renderings of a parsed equation: canonical infix (`Display`) and
//! LaTeX for typeset plot titles.

use crate::equation_engine::{BinaryOp, Equation, Expr, Function, UnaryOp};
use std::fmt;

const PREC_SUM: u8 = 1;
const PREC_PRODUCT: u8 = 2;
const PREC_POWER: u8 = 3;
const PREC_UNARY: u8 = 4;
const PREC_ATOM: u8 = 5;

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add | BinaryOp::Sub => PREC_SUM,
        BinaryOp::Mul | BinaryOp::Div => PREC_PRODUCT,
        BinaryOp::Pow => PREC_POWER,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Number(_) | Expr::Variable { .. } | Expr::Call { .. } => PREC_ATOM,
        Expr::Unary(..) => PREC_UNARY,
        Expr::Binary(_, op, _) => binary_precedence(*op),
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Pow => "^",
    }
}

fn write_grouped(f: &mut fmt::Formatter<'_>, expr: &Expr, grouped: bool) -> fmt::Result {
    if grouped {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

/// Canonical infix form. Parentheses are emitted only where needed for the
/// text to parse back into the same tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Variable { name, .. } => f.write_str(name),
            Expr::Unary(UnaryOp::Neg, operand) => {
                f.write_str("-")?;
                write_grouped(f, operand, precedence(operand) < PREC_UNARY)
            }
            Expr::Binary(left, op, right) => {
                let prec = binary_precedence(*op);
                // `^` groups to the right, everything else to the left.
                let (left_grouped, right_grouped) = if *op == BinaryOp::Pow {
                    (precedence(left) <= prec, precedence(right) < prec)
                } else {
                    (precedence(left) < prec, precedence(right) <= prec)
                };
                write_grouped(f, left, left_grouped)?;
                write!(f, " {} ", symbol(*op))?;
                write_grouped(f, right, right_grouped)
            }
            Expr::Call { function, arg, .. } => write!(f, "{function}({arg})"),
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.expr(), f)
    }
}

impl Expr {
    /// Renders the expression as LaTeX math (without delimiters).
    pub fn to_latex(&self) -> String {
        let mut out = String::new();
        latex_into(self, &mut out);
        out
    }
}

impl Equation {
    pub fn to_latex(&self) -> String {
        self.expr().to_latex()
    }
}

fn latex_grouped(expr: &Expr, grouped: bool, out: &mut String) {
    if grouped {
        out.push_str("\\left(");
        latex_into(expr, out);
        out.push_str("\\right)");
    } else {
        latex_into(expr, out);
    }
}

fn latex_into(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Number(n) => out.push_str(&n.to_string()),
        Expr::Variable { name, .. } => out.push_str(name),
        Expr::Unary(UnaryOp::Neg, operand) => {
            out.push('-');
            latex_grouped(operand, precedence(operand) == PREC_SUM, out);
        }
        Expr::Binary(left, BinaryOp::Div, right) => {
            out.push_str("\\frac{");
            latex_into(left, out);
            out.push_str("}{");
            latex_into(right, out);
            out.push('}');
        }
        Expr::Binary(base, BinaryOp::Pow, exponent) => {
            latex_grouped(base, precedence(base) < PREC_ATOM, out);
            out.push_str("^{");
            latex_into(exponent, out);
            out.push('}');
        }
        Expr::Binary(left, op, right) => {
            let prec = binary_precedence(*op);
            let right_is_negative = matches!(**right, Expr::Unary(..));
            latex_grouped(left, precedence(left) < prec, out);
            out.push_str(match op {
                BinaryOp::Add => " + ",
                BinaryOp::Sub => " - ",
                _ => " \\cdot ",
            });
            let right_grouped = right_is_negative
                || precedence(right) < prec
                || (*op == BinaryOp::Sub && precedence(right) == prec);
            latex_grouped(right, right_grouped, out);
        }
        Expr::Call { function, arg, .. } => match Function::lookup(function) {
            Some(Function::Exp) => {
                out.push_str("e^{");
                latex_into(arg, out);
                out.push('}');
            }
            Some(Function::Sqrt) => {
                out.push_str("\\sqrt{");
                latex_into(arg, out);
                out.push('}');
            }
            other => {
                out.push_str(match other {
                    Some(Function::Sin) => "\\sin",
                    Some(Function::Cos) => "\\cos",
                    Some(Function::Tan) => "\\tan",
                    Some(Function::Ln) => "\\ln",
                    _ => function.as_str(),
                });
                latex_grouped(arg, true, out);
            }
        },
    }
}
