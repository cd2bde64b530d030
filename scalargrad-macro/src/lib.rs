use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, spanned::Spanned, BinOp, Block, Expr, ExprLit, Ident, Pat, Stmt, UnOp,
};

/// Turns a block of `let` statements over numbers into `scalargrad::Value` nodes.
///
/// ```ignore
/// scalargrad! {{
///     let x = 3.;
///     let y = 2. * x + x.pow(2) - 1.;
/// }}
/// y.backward();
/// ```
///
/// Literal bindings become leaves named after the binding. Binary `+ - * /`,
/// unary `-`, parentheses and the `relu()` / `pow(n)` methods build graph nodes.
/// Anything else, including destructuring patterns and items, is a compile error.
#[proc_macro]
pub fn scalargrad(input: TokenStream) -> TokenStream {
    // Parse the input tokens into a syntax tree
    let input = parse_macro_input!(input as Block);

    let mut objs = vec![];

    for stmt in &input.stmts {
        traverse_stmt(stmt, &mut objs);
    }

    let expanded = quote! {
        #(#objs)*
    };

    TokenStream::from(expanded)
}

fn traverse_stmt(input: &Stmt, terms: &mut Vec<TokenStream2>) {
    match input {
        Stmt::Local(local) => {
            if let (Pat::Ident(id), Some(init)) = (&local.pat as &Pat, &local.init) {
                let name = id.ident.clone();
                let ex = &init.expr;
                let ts = match ex as &Expr {
                    Expr::Lit(ref lit) => quote! {
                        let #name = ::scalargrad::Value::named(stringify!(#name), #lit);
                    },
                    Expr::Path(path) => quote! {
                        let #name = #path.clone();
                    },
                    _ => {
                        if let Some(res) = traverse_expr(ex, terms) {
                            quote! {
                                let #name = #res;
                            }
                        } else {
                            unsupported(ex, "unsupported expression in scalargrad! block")
                        }
                    }
                };
                terms.push(ts);
            } else {
                terms.push(unsupported(
                    local,
                    "scalargrad! only supports `let name = expr;` bindings",
                ));
            }
        }
        Stmt::Expr(ex, _) => {
            if traverse_expr(ex, terms).is_none() {
                terms.push(unsupported(ex, "unsupported expression in scalargrad! block"));
            }
        }
        _ => terms.push(unsupported(input, "unsupported statement in scalargrad! block")),
    }
}

fn unsupported(node: &impl Spanned, message: &str) -> TokenStream2 {
    syn::Error::new(node.span(), message).to_compile_error()
}

fn var_name(terms: &[TokenStream2]) -> String {
    format!("_a{}", terms.len())
}

fn format_term(ex: &ExprLit, terms: &mut Vec<TokenStream2>) -> Ident {
    let name = Ident::new(&var_name(terms), ex.span());
    let ts = quote! {
        let #name = ::scalargrad::Value::named(stringify!(#ex), #ex);
    };
    terms.push(ts);
    name
}

fn traverse_expr(input: &Expr, terms: &mut Vec<TokenStream2>) -> Option<Ident> {
    match input {
        Expr::Binary(ex) => {
            let lhs = traverse_expr(&ex.left, terms);
            let rhs = traverse_expr(&ex.right, terms);
            if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                let name = Ident::new(&var_name(terms), ex.span());
                let binop = match ex.op {
                    BinOp::Add(_) => quote! { &#lhs + &#rhs },
                    BinOp::Sub(_) => quote! { &#lhs - &#rhs },
                    BinOp::Mul(_) => quote! { &#lhs * &#rhs },
                    BinOp::Div(_) => quote! { &#lhs / &#rhs },
                    _ => return None,
                };
                let ts = quote! {
                    let #name = #binop;
                };
                terms.push(ts);
                Some(name)
            } else {
                None
            }
        }
        Expr::Unary(ex) => {
            if !matches!(ex.op, UnOp::Neg(_)) {
                return None;
            }
            let term = traverse_expr(&ex.expr, terms)?;
            let name = Ident::new(&var_name(terms), ex.span());
            terms.push(quote! {
                let #name = -&#term;
            });
            Some(name)
        }
        Expr::Paren(ex) => traverse_expr(&ex.expr, terms),
        Expr::Lit(lit) => {
            let name = format_term(lit, terms);
            Some(name)
        }
        Expr::Path(path) => path.path.segments.last().map(|seg| seg.ident.clone()),
        Expr::MethodCall(call) => {
            let receiver = traverse_expr(&call.receiver, terms)?;
            let method = &call.method;
            let name = Ident::new(&var_name(terms), call.span());
            let ts = match (method.to_string().as_str(), call.args.len()) {
                ("relu", 0) => quote! {
                    let #name = #receiver.relu();
                },
                // The exponent is a plain number, not a node.
                ("pow", 1) => {
                    let exponent = &call.args[0];
                    quote! {
                        let #name = #receiver.pow(#exponent);
                    }
                }
                _ => return None,
            };
            terms.push(ts);
            Some(name)
        }
        _ => None,
    }
}

#[cfg(test)]
fn expand(stmt: Stmt) -> String {
    let mut terms = vec![];
    traverse_stmt(&stmt, &mut terms);
    quote! { #(#terms)* }.to_string()
}

#[test]
fn test_let_binding() {
    let out = expand(syn::parse_quote! { let x = 3.; });
    assert!(out.contains("Value :: named"));
    assert!(!out.contains("compile_error"));
}

#[test]
fn test_rejects_destructuring() {
    let out = expand(syn::parse_quote! { let (a, b) = (1., 2.); });
    assert!(out.contains("compile_error"));
    assert!(out.contains("only supports"));
}

#[test]
fn test_rejects_uninitialized_let() {
    let out = expand(syn::parse_quote! { let a; });
    assert!(out.contains("compile_error"));
}

#[test]
fn test_rejects_items() {
    let out = expand(syn::parse_quote! { fn f() {} });
    assert!(out.contains("compile_error"));
    assert!(out.contains("unsupported statement"));
}

#[test]
fn test_rejects_unknown_method() {
    let out = expand(syn::parse_quote! { let y = x.tanh(); });
    assert!(out.contains("compile_error"));
}
