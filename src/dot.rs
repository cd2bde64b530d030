use std::io::Write;

use crate::Value;

impl Value {
    /// Write graphviz dot file to the given writer.
    pub fn dot(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let topo = self.topological_order();
        writeln!(writer, "digraph G {{\nrankdir=\"LR\";")?;
        for node in &topo {
            writeln!(
                writer,
                "a{} [label=\"{} \\ndata:{}, grad:{}\"];",
                node.id(),
                escape(&node.dot_label()),
                node.data(),
                node.grad()
            )?;
        }
        for node in &topo {
            for child in node.children() {
                writeln!(writer, "a{} -> a{};", child.id(), node.id())?;
            }
        }
        writeln!(writer, "}}")?;
        Ok(())
    }

    fn dot_label(&self) -> String {
        match (self.name(), self.op()) {
            ("", "") => String::new(),
            (name, "") => name.to_string(),
            ("", op) => op.to_string(),
            (name, op) => format!("{name} ({op})"),
        }
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

#[test]
fn test_dot() {
    let a = Value::named("a", 1.);
    let b = Value::named("b", 3.);
    let ab = &a * &b;
    let abab = &ab + &ab;
    abab.backward();

    let mut buf = vec![];
    abab.dot(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("digraph G {"));
    assert!(text.trim_end().ends_with('}'));
    assert_eq!(text.matches(" -> ").count(), 3);
    assert_eq!(text.matches("[label=").count(), 4);
    assert!(text.contains("a \\ndata:1, grad:6"));
    assert!(text.contains(&format!("a{} -> a{};", a.id(), ab.id())));
}

#[test]
fn test_dot_escapes_names() {
    let a = Value::named("say \"hi\"", 1.);
    let mut buf = vec![];
    a.dot(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("say \\\"hi\\\""));
}
