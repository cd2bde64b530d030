//! Graph construction: every operator builds a new node that records its operands.
//!
//! Only addition, multiplication, power and the rectifier are primitive. The other
//! operators are compositions of them, so they never need backward rules of their own.

use std::{
    iter::Sum,
    ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};

use num_traits::AsPrimitive;

use crate::value::{expr_name, Op, Value};

impl Add for &Value {
    type Output = Value;
    fn add(self, rhs: Self) -> Self::Output {
        let name = expr_name(|| format!("({} + {})", self.describe(), rhs.describe()));
        Value::from_op(
            self.data() + rhs.data(),
            Op::Add(self.clone(), rhs.clone()),
            "+",
            name,
        )
    }
}

impl Mul for &Value {
    type Output = Value;
    fn mul(self, rhs: Self) -> Self::Output {
        let name = expr_name(|| format!("{} * {}", self.describe(), rhs.describe()));
        Value::from_op(
            self.data() * rhs.data(),
            Op::Mul(self.clone(), rhs.clone()),
            "*",
            name,
        )
    }
}

impl Neg for &Value {
    type Output = Value;
    fn neg(self) -> Self::Output {
        self * &Value::new(-1.)
    }
}

impl Sub for &Value {
    type Output = Value;
    fn sub(self, rhs: Self) -> Self::Output {
        self + &(-rhs)
    }
}

impl Div for &Value {
    type Output = Value;
    fn div(self, rhs: Self) -> Self::Output {
        self * &rhs.pow(-1)
    }
}

impl Value {
    /// Raises the node to a constant power. The exponent is not part of the graph.
    pub fn pow(&self, exponent: impl AsPrimitive<f64>) -> Value {
        let exponent: f64 = exponent.as_();
        let name = expr_name(|| format!("{}**{}", self.describe(), exponent));
        Value::from_op(
            self.data().powf(exponent),
            Op::Pow(self.clone(), exponent),
            format!("**{exponent}"),
            name,
        )
    }

    /// Raises the node to the power of another node. Both are operands, so the
    /// exponent receives `a^b * ln(a)` times the upstream gradient, which is NaN
    /// for a non-positive base.
    pub fn pow_value(&self, exponent: &Value) -> Value {
        let name = expr_name(|| format!("{}**{}", self.describe(), exponent.describe()));
        Value::from_op(
            self.data().powf(exponent.data()),
            Op::PowValue(self.clone(), exponent.clone()),
            "^",
            name,
        )
    }

    /// Rectified linear unit, `max(0, x)`.
    pub fn relu(&self) -> Value {
        let data = self.data();
        let name = expr_name(|| format!("relu({})", self.describe()));
        Value::from_op(
            if data > 0. { data } else { 0. },
            Op::Relu(self.clone()),
            "ReLU",
            name,
        )
    }
}

impl Neg for Value {
    type Output = Value;
    fn neg(self) -> Self::Output {
        -&self
    }
}

macro_rules! impl_owned_binop {
    ($trait:ident, $method:ident) => {
        impl $trait<Value> for Value {
            type Output = Value;
            fn $method(self, rhs: Value) -> Self::Output {
                (&self).$method(&rhs)
            }
        }

        impl $trait<&Value> for Value {
            type Output = Value;
            fn $method(self, rhs: &Value) -> Self::Output {
                (&self).$method(rhs)
            }
        }

        impl $trait<Value> for &Value {
            type Output = Value;
            fn $method(self, rhs: Value) -> Self::Output {
                self.$method(&rhs)
            }
        }
    };
}

impl_owned_binop!(Add, add);
impl_owned_binop!(Sub, sub);
impl_owned_binop!(Mul, mul);
impl_owned_binop!(Div, div);

/// Plain numbers on either side of an operator become fresh leaves.
macro_rules! impl_scalar_binop {
    ($trait:ident, $method:ident; $($t:ty),*) => {$(
        impl $trait<$t> for &Value {
            type Output = Value;
            fn $method(self, rhs: $t) -> Self::Output {
                self.$method(&Value::new(rhs))
            }
        }

        impl $trait<$t> for Value {
            type Output = Value;
            fn $method(self, rhs: $t) -> Self::Output {
                (&self).$method(&Value::new(rhs))
            }
        }

        impl $trait<&Value> for $t {
            type Output = Value;
            fn $method(self, rhs: &Value) -> Self::Output {
                (&Value::new(self)).$method(rhs)
            }
        }

        impl $trait<Value> for $t {
            type Output = Value;
            fn $method(self, rhs: Value) -> Self::Output {
                (&Value::new(self)).$method(&rhs)
            }
        }
    )*};
}

macro_rules! impl_scalar_binops {
    ($($t:ty),*) => {
        impl_scalar_binop!(Add, add; $($t),*);
        impl_scalar_binop!(Sub, sub; $($t),*);
        impl_scalar_binop!(Mul, mul; $($t),*);
        impl_scalar_binop!(Div, div; $($t),*);
    };
}

// One float and one integer type, so unsuffixed literals are never ambiguous.
// Other primitives go through `Value::new`.
impl_scalar_binops!(f64, i32);

// Compound assignment rebinds the handle to a new node. The old node and its
// operands are left untouched.
macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $op:ident; $($t:ty),*) => {
        impl $trait<Value> for Value {
            fn $method(&mut self, rhs: Value) {
                *self = (&*self).$op(&rhs);
            }
        }

        impl $trait<&Value> for Value {
            fn $method(&mut self, rhs: &Value) {
                *self = (&*self).$op(rhs);
            }
        }

        $(
            impl $trait<$t> for Value {
                fn $method(&mut self, rhs: $t) {
                    *self = (&*self).$op(rhs);
                }
            }
        )*
    };
}

impl_assign_op!(AddAssign, add_assign, add; f64, i32);
impl_assign_op!(SubAssign, sub_assign, sub; f64, i32);
impl_assign_op!(MulAssign, mul_assign, mul; f64, i32);
impl_assign_op!(DivAssign, div_assign, div; f64, i32);

impl Sum for Value {
    fn sum<I: Iterator<Item = Value>>(iter: I) -> Self {
        iter.fold(Value::new(0.), |acc, v| acc + v)
    }
}

impl<'a> Sum<&'a Value> for Value {
    fn sum<I: Iterator<Item = &'a Value>>(iter: I) -> Self {
        iter.fold(Value::new(0.), |acc, v| acc + v)
    }
}

#[cfg(test)]
use std::collections::HashSet;

#[test]
fn test_add() {
    let a = Value::new(1);
    let b = Value::new(2);
    let e = &a + &b;
    assert_eq!(e.data(), 3.);
    assert_eq!(e.op(), "+");
    let children: HashSet<_> = e.children().iter().cloned().collect();
    assert_eq!(children, HashSet::from([a.clone(), b.clone()]));
    // Operands are not modified.
    assert_eq!(a.data(), 1.);
    assert_eq!(b.data(), 2.);
}

#[test]
fn test_shared_operand_child() {
    let a = Value::new(1.);
    let c = &a + &a;
    assert_eq!(c.data(), 2.);
    assert_eq!(c.children(), &[a.clone()]);
}

#[test]
fn test_scalar_operands() {
    let a = Value::new(1);
    assert_eq!((&a + 1).data(), 2.);
    assert_eq!((&a + 1.).data(), 2.);
    assert_eq!((1 + &a).data(), 2.);
    assert_eq!((1. + &a).data(), 2.);
    assert_eq!((3 * &a).data(), (&a * 3).data());

    let f = &a + 1;
    assert_eq!(f.children().len(), 2);
    assert!(f.children().contains(&a));
}

#[test]
fn test_integer_literals() {
    let x = Value::new(-4.);
    let z = 2 * &x + 2 + &x;
    assert_eq!(z.data(), -10.);
    assert_eq!((10 - &x).data(), 14.);
    assert_eq!((&x / 2).data(), -2.);
    let mut y = x.clone();
    y += 1;
    y *= 2;
    assert_eq!(y.data(), -6.);
    assert_eq!((&x + Value::new(3u8)).data(), -1.);
}

#[test]
fn test_reflected_sub_div() {
    let a = Value::new(4.);
    assert_eq!((10 - &a).data(), 6.);
    assert_eq!((&a - 10).data(), -6.);
    assert_eq!((2. / &a).data(), 0.5);
    assert_eq!((&a / 2.).data(), 2.);
}

#[test]
fn test_neg_and_labels() {
    let a = Value::new(3.);
    let n = -&a;
    assert_eq!(n.data(), -3.);
    assert_eq!(n.op(), "*");
    let p = a.pow(2);
    assert_eq!(p.data(), 9.);
    assert_eq!(p.op(), "**2");
    assert_eq!(a.pow(0.5).op(), "**0.5");
    assert_eq!(a.relu().op(), "ReLU");
    assert_eq!(a.pow_value(&a).op(), "^");
    assert_eq!((&a - &a).op(), "+");
    assert_eq!((&a / &a).op(), "*");
}

#[test]
fn test_pow_value_forward() {
    let a = Value::new(2.);
    let b = Value::new(10.);
    let c = a.pow_value(&b);
    assert_eq!(c.data(), 1024.);
    assert_eq!(c.children(), &[a.clone(), b.clone()]);
    assert_eq!(a.pow_value(&a).children(), &[a.clone()]);
}

#[test]
fn test_relu_forward() {
    assert_eq!(Value::new(2.).relu().data(), 2.);
    assert_eq!(Value::new(-2.).relu().data(), 0.);
    assert_eq!(Value::new(f64::NAN).relu().data(), 0.);
}

#[test]
fn test_float_edge_values() {
    let a = Value::new(1.);
    let zero = Value::new(0.);
    assert_eq!((&a / &zero).data(), f64::INFINITY);
    assert!((&zero / &zero).data().is_nan());
    assert_eq!(zero.pow(-1).data(), f64::INFINITY);
    assert!(Value::new(-8.).pow(1. / 3.).data().is_nan());
}

#[test]
fn test_assign_rebinds() {
    let a = Value::new(2.);
    let mut x = a.clone();
    x += &a;
    x *= 3;
    x -= 1.;
    x /= Value::new(2);
    assert_eq!(x.data(), 5.5);
    assert_ne!(x, a);
    assert_eq!(a.data(), 2.);
}

#[test]
fn test_data_is_not_reactive() {
    let a = Value::new(2.);
    let b = &a * 3;
    a.set_data(10);
    assert_eq!(b.data(), 6.);
    assert_eq!(b.data(), 6.);
}

#[test]
fn test_sum() {
    let values = vec![Value::new(1), Value::new(2), Value::new(3)];
    let total: Value = values.iter().sum();
    assert_eq!(total.data(), 6.);
}

#[cfg(not(feature = "expr_name"))]
#[test]
fn test_derived_nodes_unnamed() {
    let a = Value::named("a", 1.);
    assert_eq!((&a + 1).name(), "");
}

#[cfg(feature = "expr_name")]
#[test]
fn test_expr_name() {
    let a = Value::named("a", 1.);
    let b = Value::named("b", 2.);
    assert_eq!((&a + &b).name(), "(a + b)");
    assert_eq!((&a * 2).name(), "a * 2");
    assert_eq!(a.pow(2).name(), "a**2");
    assert_eq!(b.relu().name(), "relu(b)");
    assert_eq!(a.pow_value(&b).name(), "a**b");
}
