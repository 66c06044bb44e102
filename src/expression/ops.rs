//! Binary construction and the arithmetic operator overloads.

use std::ops::{Add, Div, Mul, Neg, Sub};

use super::{BinaryOperator, Expr, Location, Shape, Symbol, UnaryOperator};
use crate::error::{ModelError, ModelResult};

fn binary_shape(op: BinaryOperator, left: &Expr, right: &Expr) -> ModelResult<Shape> {
    let l = left.shape()?;
    let r = right.shape()?;
    let domains = l.domains.combine(&r.domains)?;
    if op == BinaryOperator::Inner {
        return Ok(Shape { domains, location: Location::Nodes });
    }
    let location = match (l.domains.is_empty(), r.domains.is_empty()) {
        (true, true) => Location::Nodes,
        (true, false) => r.location,
        (false, true) => l.location,
        (false, false) if l.location == r.location => l.location,
        _ => {
            return Err(ModelError::domain(format!(
                "cannot combine '{}' on {:?} with '{}' on {:?}",
                left, l.location, right, r.location
            )))
        }
    };
    Ok(Shape { domains, location })
}

impl Expr {
    /// Builds a binary node; two scalars are folded into one.
    ///
    /// A domain mismatch does not fail here but is stored as the node's
    /// shape, see [`Expr::check`].
    pub fn binary(op: BinaryOperator, left: &Expr, right: &Expr) -> Expr {
        if let (Some(a), Some(b)) = (left.as_scalar(), right.as_scalar()) {
            let folded = match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply | BinaryOperator::Inner => a * b,
                BinaryOperator::Divide => a / b,
                BinaryOperator::Power => a.powf(b),
            };
            return Expr::scalar(folded);
        }
        let shape = binary_shape(op, left, right);
        Expr::make(Symbol::Binary(op, left.clone(), right.clone()), shape)
    }

    pub(crate) fn negate(child: &Expr) -> Expr {
        if let Some(v) = child.as_scalar() {
            return Expr::scalar(-v);
        }
        let shape = child.shape().cloned();
        Expr::make(Symbol::Unary(UnaryOperator::Negate, child.clone()), shape)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, &self, &rhs)
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, &self, rhs)
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, &rhs)
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, &self, &Expr::scalar(rhs))
            }
        }

        impl $trait<f64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self, &Expr::scalar(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, &Expr::scalar(self), &rhs)
            }
        }

        impl $trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, &Expr::scalar(self), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOperator::Add);
impl_binary_op!(Sub, sub, BinaryOperator::Subtract);
impl_binary_op!(Mul, mul, BinaryOperator::Multiply);
impl_binary_op!(Div, div, BinaryOperator::Divide);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::negate(&self)
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::negate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, Domains};
    use crate::expression::{grad, Variable};

    #[test]
    fn test_scalar_folding() {
        let e = Expr::scalar(2.0) * 3.0 + 1.0;
        assert_eq!(e.as_scalar(), Some(7.0));
        assert_eq!((-Expr::scalar(4.0)).as_scalar(), Some(-4.0));
        assert_eq!(Expr::scalar(2.0).pow(3.0).as_scalar(), Some(8.0));
        assert_eq!((1.0 - Expr::scalar(1e-4)).as_scalar(), Some(1.0 - 1e-4));
        assert_eq!((Expr::scalar(1.0) / 4.0).as_scalar(), Some(0.25));
        let inner = Expr::binary(BinaryOperator::Inner, &Expr::scalar(2.0), &Expr::scalar(-3.0));
        assert_eq!(inner.as_scalar(), Some(-6.0));
    }

    #[test]
    fn test_zero_product_is_not_simplified() {
        let x = Expr::from(Variable::new("x", Domains::new(vec![Domain::Separator])));
        let e = 0.0 * &x;
        assert!(e.as_scalar().is_none());
        assert_eq!(e.domains().unwrap().primary, vec![Domain::Separator]);
    }

    #[test]
    fn test_location_mismatch() {
        let x = Expr::from(Variable::new("x", Domains::new(vec![Domain::Separator])));
        let flux = grad(&x).unwrap();
        assert_eq!((&flux * 2.0).location().unwrap(), Location::InteriorEdges);
        assert!((&flux + &x).check().is_err());
        // inner moves edge values back to nodes
        let product = Expr::binary(BinaryOperator::Inner, &flux, &flux);
        assert_eq!(product.location().unwrap(), Location::Nodes);
    }
}
