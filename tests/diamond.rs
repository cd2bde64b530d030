use scalargrad::Value;

#[test]
fn diamond() {
    let a = Value::named("a", 1.);
    let b = Value::named("b", 3.);
    let c = Value::named("c", 5.);
    let ab = &a + &b;
    let ac = &a + &c;
    let abac = &ab + &ac;

    abac.backward();
    println!("abac: {abac:#?}");
    assert_eq!(a.grad(), 2.);
    assert_eq!(b.grad(), 1.);
    assert_eq!(c.grad(), 1.);
}

#[test]
fn shared_node_in_two_paths() {
    let x = Value::new(-4.);
    let z = 2 * &x + 2 + &x;
    let q = z.relu() + &z * &x;
    q.backward();
    assert_eq!(z.data(), -10.);
    assert_eq!(q.data(), 40.);
    // relu is inactive at z = -10, so only z * x contributes: 3x + z
    assert_eq!(x.grad(), -22.);
    assert_eq!(z.grad(), -4.);
}

#[test]
fn diamond_with_multiplication() {
    let a = Value::named("a", 2.);
    let left = &a * 3;
    let right = a.pow(2);
    let top = &left * &right;
    top.backward();
    // top = 3a^3
    assert_eq!(top.data(), 24.);
    assert_eq!(a.grad(), 36.);
    assert_eq!(left.grad(), 4.);
    assert_eq!(right.grad(), 6.);
}
