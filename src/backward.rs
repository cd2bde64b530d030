//! Reverse-mode traversal over the graph reachable from a node.

use std::collections::HashSet;

use log::{debug, trace};

use crate::value::{Op, Value};

impl Value {
    /// Every node reachable from this one, each exactly once, with children
    /// listed before the nodes built from them. This node comes last.
    pub fn topological_order(&self) -> Vec<Value> {
        let mut visited = HashSet::new();
        let mut topo = vec![];
        // The flag marks a node whose children have already been pushed.
        let mut stack = vec![(self.clone(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                topo.push(node);
                continue;
            }
            if !visited.insert(node.id()) {
                continue;
            }
            stack.push((node.clone(), true));
            for child in node.children().iter().rev() {
                if !visited.contains(&child.id()) {
                    stack.push((child.clone(), false));
                }
            }
        }
        topo
    }

    /// Backpropagates from this node, adding d(self)/d(node) into the gradient of
    /// every reachable node. The gradient of this node itself is set to 1.
    ///
    /// Gradients are not cleared first: calling this twice adds the same
    /// contribution twice. Use [`Value::zero_grad`] between passes.
    pub fn backward(&self) {
        let topo = self.topological_order();
        debug!("backward from {:?} over {} nodes", self, topo.len());

        for node in &topo {
            node.0.upstream.set(0.);
        }
        self.0.upstream.set(1.);

        for node in topo.iter().rev() {
            trace!("propagate {:?}", node);
            node.propagate();
        }

        for node in &topo {
            if node != self {
                node.0.grad.set(node.grad() + node.0.upstream.get());
            }
        }
        self.0.grad.set(1.);
    }

    /// Resets the gradient of every node reachable from this one.
    pub fn zero_grad(&self) {
        let topo = self.topological_order();
        debug!("zero_grad over {} nodes", topo.len());
        for node in &topo {
            node.0.grad.set(0.);
        }
    }

    /// One local chain-rule step: adds this node's current `grad`, scaled by the
    /// local derivative, into the `grad` of each operand.
    ///
    /// Unlike [`Value::backward`] this neither visits other nodes nor seeds
    /// anything, so the caller decides the order and the starting gradient.
    pub fn backward_step(&self) {
        self.local_grads(self.grad(), |operand, grad| {
            operand.0.grad.set(operand.grad() + grad)
        });
    }

    fn propagate(&self) {
        self.local_grads(self.0.upstream.get(), |operand, grad| {
            operand.accumulate(grad)
        });
    }

    /// Chain rule for one node: scales `grad` by the local derivative with
    /// respect to each operand and hands the product to `sink`.
    fn local_grads(&self, grad: f64, mut sink: impl FnMut(&Value, f64)) {
        use Op::*;
        match &self.0.op {
            Leaf => (),
            Add(lhs, rhs) => {
                sink(lhs, grad);
                sink(rhs, grad);
            }
            Mul(lhs, rhs) => {
                sink(lhs, rhs.data() * grad);
                sink(rhs, lhs.data() * grad);
            }
            Pow(term, exponent) => sink(term, exponent * term.data().powf(exponent - 1.) * grad),
            PowValue(base, exponent) => {
                let (b, e) = (base.data(), exponent.data());
                sink(base, e * b.powf(e - 1.) * grad);
                sink(exponent, b.powf(e) * b.ln() * grad);
            }
            Relu(term) => sink(term, if term.data() > 0. { grad } else { 0. }),
        }
    }

    fn accumulate(&self, grad: f64) {
        let upstream = &self.0.upstream;
        upstream.set(upstream.get() + grad);
    }
}

#[cfg(test)]
use approx::assert_abs_diff_eq;

#[test]
fn test_add_backward() {
    let a = Value::new(1);
    let b = Value::new(1);
    let c = &a + &b;
    c.backward();
    assert_eq!(c.grad(), 1.);
    assert_eq!(a.grad(), 1.);
    assert_eq!(b.grad(), 1.);
}

#[test]
fn test_shared_operand_backward() {
    let a = Value::new(1.);
    let c = &a + &a;
    c.backward();
    assert_eq!(a.grad(), 2.);

    let a = Value::new(3.);
    let c = &a * &a;
    c.backward();
    assert_eq!(a.grad(), 6.);
}

#[test]
fn test_div_backward() {
    let a = Value::new(1);
    let b = Value::new(2.);
    let c = &a / &b;
    assert_eq!(c.data(), 0.5);
    c.backward();
    assert_eq!(a.grad(), 0.5);
    assert_eq!(b.grad(), -0.25);
}

#[test]
fn test_sub_neg_backward() {
    let a = Value::new(5.);
    let b = Value::new(3.);
    let c = &a - &b;
    c.backward();
    assert_eq!(c.data(), 2.);
    assert_eq!(a.grad(), 1.);
    assert_eq!(b.grad(), -1.);

    let a = Value::new(2.);
    let n = -&a;
    n.backward();
    assert_eq!(a.grad(), -1.);
}

#[test]
fn test_reflected_backward() {
    let a = Value::new(4.);
    let c = 2 / &a;
    c.backward();
    assert_eq!(a.grad(), -2. / 16.);

    let a = Value::new(4.);
    let c = 2 - &a;
    c.backward();
    assert_eq!(a.grad(), -1.);
}

#[test]
fn test_pow_backward() {
    let a = Value::new(2.);
    let b = a.pow(2);
    b.backward();
    assert_eq!(b.data(), 4.);
    assert_eq!(a.grad(), 4.);

    let a = Value::new(4.);
    let b = a.pow(0.5);
    b.backward();
    assert_abs_diff_eq!(a.grad(), 0.25, epsilon = 1e-12);
}

#[test]
fn test_relu_backward() {
    let a = Value::new(2.);
    let b = a.relu();
    b.backward();
    assert_eq!(a.grad(), 1.);

    let a = Value::new(-2.);
    let b = a.relu();
    b.backward();
    assert_eq!(b.data(), 0.);
    assert_eq!(a.grad(), 0.);
}

#[test]
fn test_leaf_backward() {
    let a = Value::new(7);
    a.backward();
    assert_eq!(a.grad(), 1.);
    assert_eq!(a.data(), 7.);
}

#[test]
fn test_labelled_node_does_not_propagate() {
    let a = Value::new(1);
    let b = Value::new(2);
    let c = Value::with_children(3, [a.clone(), b.clone()], "custom");
    c.backward();
    assert_eq!(c.grad(), 1.);
    assert_eq!(a.grad(), 0.);
    assert_eq!(b.grad(), 0.);
    assert_eq!(c.topological_order().len(), 3);
}

#[test]
fn test_topological_order() {
    let x = Value::new(-4.);
    let z = 2 * &x + 2 + &x;
    let q = z.relu() + &z * &x;
    let topo = q.topological_order();
    assert_eq!(topo.last(), Some(&q));

    let ids: HashSet<_> = topo.iter().cloned().collect();
    assert_eq!(ids.len(), topo.len());
    for (i, node) in topo.iter().enumerate() {
        for child in node.children() {
            let pos = topo.iter().position(|n| n == child).unwrap();
            assert!(pos < i);
        }
    }
}

#[test]
fn test_repeated_backward_accumulates() {
    let x = Value::new(3.);
    let y = Value::new(-1.5);
    let h = (&x * &y + &x).relu() + x.pow(3) / &y;
    h.backward();
    let single: Vec<(Value, f64)> = h
        .topological_order()
        .into_iter()
        .map(|node| {
            let grad = node.grad();
            (node, grad)
        })
        .collect();

    h.backward();
    for (node, grad) in &single {
        if node == &h {
            assert_eq!(node.grad(), 1.);
        } else {
            assert_abs_diff_eq!(node.grad(), 2. * grad, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_zero_grad() {
    let a = Value::new(2.);
    let b = Value::new(3.);
    let c = &a * &b + &a;
    c.backward();
    assert_eq!(a.grad(), 4.);
    c.zero_grad();
    assert_eq!(a.grad(), 0.);
    assert_eq!(b.grad(), 0.);
    assert_eq!(c.grad(), 0.);
    c.backward();
    assert_eq!(a.grad(), 4.);
    assert_eq!(b.grad(), 2.);
}

#[test]
fn test_forward_is_idempotent() {
    let a = Value::new(1.5);
    let b = (&a * 2 - 1).pow(2);
    let first = b.data();
    assert_eq!(b.data(), first);
    b.backward();
    assert_eq!(b.data(), first);
    assert_eq!(a.data(), 1.5);
}

#[test]
fn test_deep_chain_backward() {
    let x = Value::new(1.);
    let mut acc = Value::new(0.);
    for _ in 0..100_000 {
        acc += &x;
    }
    acc.backward();
    assert_eq!(acc.data(), 100_000.);
    assert_eq!(x.grad(), 100_000.);
}

#[test]
fn test_pow_value_backward() {
    let a = Value::new(2.);
    let b = Value::new(3.);
    let c = a.pow_value(&b);
    assert_eq!(c.data(), 8.);
    c.backward();
    assert_eq!(a.grad(), 12.);
    assert_abs_diff_eq!(b.grad(), 8. * 2f64.ln(), epsilon = 1e-12);
}

#[test]
fn test_pow_value_shared_operand() {
    // x^x, d/dx = x^x (ln x + 1)
    let x = Value::new(2.);
    let y = x.pow_value(&x);
    y.backward();
    assert_abs_diff_eq!(x.grad(), 4. * (2f64.ln() + 1.), epsilon = 1e-12);
}

#[test]
fn test_backward_step() {
    let a = Value::new(2.);
    let b = Value::new(-3.);
    let c = &a * &b;
    // Nothing is seeded, so a zero gradient propagates nothing.
    c.backward_step();
    assert_eq!(a.grad(), 0.);

    c.set_grad(2);
    c.backward_step();
    assert_eq!(a.grad(), -6.);
    assert_eq!(b.grad(), 4.);
    assert_eq!(c.grad(), 2.);

    // Only the direct operands are touched.
    let d = Value::new(1.);
    let e = &c + &d;
    e.set_grad(1);
    e.backward_step();
    assert_eq!(c.grad(), 3.);
    assert_eq!(d.grad(), 1.);
    assert_eq!(a.grad(), -6.);
}

#[test]
fn test_backward_steps_match_backward() {
    let x = Value::new(3.);
    let y = Value::new(-1.5);
    let h = (&x * &y + &x).relu() + x.pow(3) / &y + x.pow_value(&Value::new(0.5));
    h.backward();
    let expected = (x.grad(), y.grad());

    h.zero_grad();
    h.set_grad(1);
    for node in h.topological_order().iter().rev() {
        node.backward_step();
    }
    assert_abs_diff_eq!(x.grad(), expected.0, epsilon = 1e-12);
    assert_abs_diff_eq!(y.grad(), expected.1, epsilon = 1e-12);
}
