use std::fmt;

use super::{BinaryOperator, BroadcastKind, Expr, MathFunction, Side, Symbol, UnaryOperator};

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "**",
            BinaryOperator::Inner => "inner",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for MathFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MathFunction::Exp => "exp",
            MathFunction::Log => "log",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Abs => "abs",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Symbol::Scalar(v) => write!(f, "{}", v),
            Symbol::Parameter(name) => write!(f, "{}", name),
            Symbol::FunctionParameter { name, argument } => write!(f, "{}({})", name, argument),
            Symbol::Variable(v) => write!(f, "{}", v.name()),
            Symbol::SpatialVariable(v) => write!(f, "{}", v.name()),
            Symbol::Time => write!(f, "t"),
            Symbol::Unary(op, child) => match op {
                UnaryOperator::Negate => write!(f, "-{}", child),
                UnaryOperator::Gradient => write!(f, "grad({})", child),
                UnaryOperator::Divergence => write!(f, "div({})", child),
                UnaryOperator::Average => write!(f, "average({})", child),
                UnaryOperator::Minimum => write!(f, "min({})", child),
                UnaryOperator::Maximum => write!(f, "max({})", child),
                UnaryOperator::BoundaryValue(Side::Left) => write!(f, "boundary_value({}, left)", child),
                UnaryOperator::BoundaryValue(Side::Right) => {
                    write!(f, "boundary_value({}, right)", child)
                }
            },
            Symbol::Function(func, child) => write!(f, "{}({})", func, child),
            Symbol::Binary(BinaryOperator::Inner, left, right) => {
                write!(f, "inner({}, {})", left, right)
            }
            Symbol::Binary(op, left, right) => write!(f, "({} {} {})", left, op, right),
            Symbol::Broadcast(kind, child) => {
                let name = match kind {
                    BroadcastKind::Full => "broadcast",
                    BroadcastKind::FullToEdges => "broadcast_to_edges",
                    BroadcastKind::Primary => "primary_broadcast",
                    BroadcastKind::Secondary => "secondary_broadcast",
                };
                write!(f, "{}({})", name, child)
            }
            Symbol::Concatenation(children) => {
                write!(f, "concatenation(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Symbol::Integral(child, var) => write!(f, "integral({} d{})", child, var.name()),
        }
    }
}
