//! Values and gradients checked against a reference autodiff computation of the
//! same expressions.

use approx::assert_abs_diff_eq;
use scalargrad::Value;

const TOL: f64 = 1e-6;

#[test]
fn sanity_check() {
    let x = Value::new(-4.);
    let z = 2 * &x + 2 + &x;
    let q = z.relu() + &z * &x;
    let h = (&z * &z).relu();
    let y = &h + &q + &q * &x;
    y.backward();

    assert_abs_diff_eq!(y.data(), -20., epsilon = TOL);
    assert_abs_diff_eq!(x.grad(), 46., epsilon = TOL);
}

#[test]
fn more_ops() {
    let a = Value::new(-4.);
    let b = Value::new(2.);
    let mut c = &a + &b;
    let mut d = &a * &b + b.pow(3);
    c += &c + 1;
    c += 1 + &c + (-&a);
    d += &d * 2 + (&b + &a).relu();
    d += 3 * &d + (&b - &a).relu();
    let e = &c - &d;
    let f = e.pow(2);
    let mut g = &f / 2.;
    g += 10. / &f;
    g.backward();

    assert_abs_diff_eq!(g.data(), 24.70408163265306, epsilon = TOL);
    assert_abs_diff_eq!(a.grad(), 138.83381924198252, epsilon = TOL);
    assert_abs_diff_eq!(b.grad(), 645.5772594752186, epsilon = TOL);
}

#[test]
fn repeated_backward_doubles() {
    let a = Value::new(-4.);
    let b = Value::new(2.);
    let y = (&a * &b + b.pow(3)).relu() + &a / &b;
    y.backward();
    let (ga, gb) = (a.grad(), b.grad());
    y.backward();
    assert_abs_diff_eq!(a.grad(), 2. * ga, epsilon = TOL);
    assert_abs_diff_eq!(b.grad(), 2. * gb, epsilon = TOL);
    assert_eq!(y.grad(), 1.);

    y.zero_grad();
    y.backward();
    assert_abs_diff_eq!(a.grad(), ga, epsilon = TOL);
    assert_abs_diff_eq!(b.grad(), gb, epsilon = TOL);
}

#[test]
fn division_by_zero_propagates() {
    let a = Value::new(1.);
    let b = Value::new(0.);
    let c = &a / &b;
    c.backward();
    assert_eq!(c.data(), f64::INFINITY);
    assert_eq!(a.grad(), f64::INFINITY);
    // -1 * 0^-2 * 1
    assert_eq!(b.grad(), f64::NEG_INFINITY);
}
