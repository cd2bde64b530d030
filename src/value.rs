use std::{
    cell::Cell,
    collections::HashSet,
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
    str::FromStr,
};

use num_traits::AsPrimitive;

use crate::error::ValueError;

/// The operation that produced a node, holding its operands.
/// The backward pass dispatches on this tag instead of a stored closure.
#[derive(Clone, Debug)]
pub(crate) enum Op {
    Leaf,
    Add(Value, Value),
    Mul(Value, Value),
    Pow(Value, f64),
    PowValue(Value, Value),
    Relu(Value),
}

impl Op {
    fn operands(&self) -> Vec<Value> {
        use Op::*;
        match self {
            Leaf => vec![],
            Add(lhs, rhs) | Mul(lhs, rhs) | PowValue(lhs, rhs) => vec![lhs.clone(), rhs.clone()],
            Pow(term, _) | Relu(term) => vec![term.clone()],
        }
    }
}

pub(crate) struct ValuePayload {
    name: String,
    label: String,
    pub(crate) op: Op,
    children: Vec<Value>,
    pub(crate) data: Cell<f64>,
    pub(crate) grad: Cell<f64>,
    /// Gradient contribution received during the backward pass in progress.
    pub(crate) upstream: Cell<f64>,
}

impl ValuePayload {
    fn new(name: String, label: String, op: Op, children: Vec<Value>, data: f64) -> Self {
        Self {
            name,
            label,
            op,
            children: dedup(children),
            data: Cell::new(data),
            grad: Cell::new(0.),
            upstream: Cell::new(0.),
        }
    }

    fn take_edges(&mut self) -> Vec<Value> {
        let mut edges = std::mem::take(&mut self.children);
        edges.extend(std::mem::replace(&mut self.op, Op::Leaf).operands());
        edges
    }
}

impl Drop for ValuePayload {
    // Long chains would otherwise be released recursively, one stack frame per node.
    fn drop(&mut self) {
        let mut stack = self.take_edges();
        while let Some(value) = stack.pop() {
            if let Ok(mut payload) = Rc::try_unwrap(value.0) {
                stack.extend(payload.take_edges());
            }
        }
    }
}

fn dedup(values: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.id()))
        .collect()
}

/// A scalar node in the computation graph.
///
/// The handle is reference counted: cloning it shares the node, and a node may be
/// an operand of any number of other nodes. Equality and hashing go by node
/// identity, never by `data`.
#[derive(Clone)]
pub struct Value(pub(crate) Rc<ValuePayload>);

impl Value {
    /// Creates a leaf node. Any primitive number is accepted and stored as `f64`.
    pub fn new(data: impl AsPrimitive<f64>) -> Value {
        Self::named("", data)
    }

    /// Creates a leaf node with a name used in `Debug` output and dot graphs.
    pub fn named(name: impl Into<String>, data: impl AsPrimitive<f64>) -> Value {
        Self::new_payload(ValuePayload::new(
            name.into(),
            String::new(),
            Op::Leaf,
            vec![],
            data.as_(),
        ))
    }

    /// Creates a node with an explicit set of children and operation label.
    ///
    /// The children take part in graph traversal, but the node has no
    /// backward rule of its own, so no gradient flows through it to them.
    pub fn with_children(
        data: impl AsPrimitive<f64>,
        children: impl IntoIterator<Item = Value>,
        op: impl Into<String>,
    ) -> Value {
        Self::new_payload(ValuePayload::new(
            String::new(),
            op.into(),
            Op::Leaf,
            children.into_iter().collect(),
            data.as_(),
        ))
    }

    pub(crate) fn from_op(data: f64, op: Op, label: impl Into<String>, name: String) -> Value {
        let children = op.operands();
        Self::new_payload(ValuePayload::new(name, label.into(), op, children, data))
    }

    fn new_payload(val: ValuePayload) -> Self {
        Self(Rc::new(val))
    }

    pub fn data(&self) -> f64 {
        self.0.data.get()
    }

    /// Overwrites the forward value. Nodes already derived from this one keep
    /// the value they computed at construction.
    pub fn set_data(&self, data: impl AsPrimitive<f64>) {
        self.0.data.set(data.as_());
    }

    pub fn grad(&self) -> f64 {
        self.0.grad.get()
    }

    pub fn set_grad(&self, grad: impl AsPrimitive<f64>) {
        self.0.grad.set(grad.as_());
    }

    /// The operands this node was built from, without duplicates.
    pub fn children(&self) -> &[Value] {
        &self.0.children
    }

    /// Label of the producing operation, empty for leaves.
    pub fn op(&self) -> &str {
        &self.0.label
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Short text for this node inside a derived expression name. Names longer
    /// than [`MAX_DESCRIBED_NAME`] are replaced by the data, so each derived name
    /// stays bounded however deep the graph is.
    pub(crate) fn describe(&self) -> String {
        if self.0.name.is_empty() || self.0.name.len() > MAX_DESCRIBED_NAME {
            self.data().to_string()
        } else {
            self.0.name.clone()
        }
    }
}

pub(crate) const MAX_DESCRIBED_NAME: usize = 64;

/// Builds the name of a derived node when the `expr_name` feature is enabled.
#[cfg(feature = "expr_name")]
pub(crate) fn expr_name(f: impl FnOnce() -> String) -> String {
    f()
}

#[cfg(not(feature = "expr_name"))]
pub(crate) fn expr_name(_f: impl FnOnce() -> String) -> String {
    String::new()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Value");
        if !self.0.name.is_empty() {
            s.field("name", &self.0.name);
        }
        s.field("data", &self.data())
            .field("grad", &self.grad())
            .field("op", &self.op())
            .finish()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value(data={}, grad={})", self.data(), self.grad())
    }
}

impl FromStr for Value {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = s
            .trim()
            .parse::<f64>()
            .map_err(|source| ValueError::InvalidNumber {
                input: s.to_string(),
                source,
            })?;
        Ok(Value::new(data))
    }
}

impl TryFrom<&str> for Value {
    type Error = ValueError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[test]
fn test_leaf() {
    let v = Value::new(42);
    assert_eq!(v.data(), 42.);
    assert_eq!(v.grad(), 0.);
    assert!(v.children().is_empty());
    assert_eq!(v.op(), "");
    assert_eq!(v.name(), "");

    let v = Value::new(2.5f32);
    assert_eq!(v.data(), 2.5);
    let v = Value::new(7u8);
    assert_eq!(v.data(), 7.);
}

#[test]
fn test_set_fields() {
    let v = Value::named("v", 42.);
    v.set_data(100);
    assert_eq!(v.data(), 100.);
    v.set_data(100.5);
    assert_eq!(v.data(), 100.5);
    v.set_grad(42);
    assert_eq!(v.grad(), 42.);
    v.set_grad(-0.5);
    assert_eq!(v.grad(), -0.5);
    assert_eq!(v.name(), "v");
}

#[test]
fn test_with_children() {
    let a = Value::new(1);
    let b = Value::new(2);
    let c = Value::with_children(3, [a.clone(), b.clone(), a.clone()], "Operation");
    assert_eq!(c.data(), 3.);
    assert_eq!(c.op(), "Operation");
    assert_eq!(c.children(), &[a.clone(), b.clone()]);

    let d = Value::with_children(4, vec![], "");
    assert_eq!(d.op(), "");
    assert!(d.children().is_empty());
}

#[test]
fn test_identity() {
    let a = Value::new(1.);
    let b = Value::new(1.);
    assert_ne!(a, b);
    assert_eq!(a, a.clone());

    let set: HashSet<Value> = [a.clone(), b.clone(), a.clone()].into_iter().collect();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&a));
    assert!(set.contains(&b));
}

#[test]
fn test_parse() {
    let v: Value = " 3.25 ".parse().unwrap();
    assert_eq!(v.data(), 3.25);
    let v = Value::try_from("42").unwrap();
    assert_eq!(v.data(), 42.);

    let err = "forty-two".parse::<Value>().unwrap_err();
    assert!(matches!(err, ValueError::InvalidNumber { ref input, .. } if input == "forty-two"));
}

#[test]
fn test_display() {
    let v = Value::new(1.5);
    v.set_grad(2);
    assert_eq!(v.to_string(), "Value(data=1.5, grad=2)");
    let v = Value::named("x", 1.);
    assert!(format!("{v:?}").contains("name: \"x\""));
}

#[test]
fn test_drop_deep_chain() {
    let mut v = Value::new(0.);
    for _ in 0..200_000 {
        v = &v + 1;
    }
    assert_eq!(v.data(), 200_000.);
    drop(v);
}

#[cfg(feature = "expr_name")]
#[test]
fn test_expr_name_bounded() {
    let x = Value::named("x", 1.);
    let mut acc = Value::named("acc", 0.);
    for _ in 0..1_000 {
        acc = &acc + &x;
        assert!(acc.name().len() <= 2 * MAX_DESCRIBED_NAME + 5);
    }
    assert!(acc.name().ends_with(" + x)"));
    assert!(acc.name().starts_with('('));
}
