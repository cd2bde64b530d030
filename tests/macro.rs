use scalargrad_macro::scalargrad;

#[test]
fn builds_graph() {
    scalargrad! {{
        let x = 3.;
        let y = 2. * x + x.pow(2) - 1.;
    }}
    assert_eq!(y.data(), 14.);
    y.backward();
    assert_eq!(x.grad(), 8.);
    assert_eq!(x.name(), "x");
}

#[test]
fn negation_and_relu() {
    scalargrad! {{
        let a = 2.;
        let b = -a;
        let c = (b * a).relu() + (a - b).relu();
    }}
    assert_eq!(b.data(), -2.);
    assert_eq!(c.data(), 4.);
    c.backward();
    // Only a - b = 2a is active.
    assert_eq!(a.grad(), 2.);
}

#[test]
fn diamond() {
    scalargrad! {{
        let a = 1.;
        let b = 3.;
        let c = 5.;
        let ab = a + b;
        let ac = a + c;
        let abac = ab / ac;
    }}
    abac.backward();
    // (a + b) / (a + c) at a = 1: (c - b) / (a + c)^2
    assert!((a.grad() - 2. / 36.).abs() < 1e-12);
    assert!((abac.data() - 4. / 6.).abs() < 1e-12);
}
