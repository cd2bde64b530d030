use scalargrad::Value;

fn main() -> std::io::Result<()> {
    let x = Value::named("x", -4.);
    let z = 2 * &x + 2 + &x;
    let q = z.relu() + &z * &x;
    let h = (&z * &z).relu();
    let y = &h + &q + &q * &x;
    println!("y: {}", y.data());

    y.backward();
    println!("dy/dx = {}", x.grad());
    println!("dy/dz = {}", z.grad());
    println!("dy/dq = {}", q.grad());

    y.dot(&mut std::io::stdout())
}
