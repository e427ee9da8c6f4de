//! `if` guard expressions
//!
//! Grammar, after substitution has already run on the attribute value:
//!
//! ```text
//! expr := term ( ";or;" term )*
//! term := atom ( ";and;" atom )*
//! atom := "(" expr ")" | value OP value | value
//! OP   := "==" | "!="
//! ```
//!
//! `;and;` binds tighter than `;or;`. A bare value is true iff it is
//! non-empty and not `"0"`. Comparisons are verbatim string compares;
//! whitespace is significant. There is no negation operator.

use crate::system::Error;

/// Evaluate a guard expression. `origin` names the element for
/// diagnostics.
pub fn eval(expr: &str, origin: &str) -> Result<bool, Error> {
    eval_expr(expr).map_err(|reason| {
        Error::IfSyntax(origin.to_string(), expr.to_string(), reason)
    })
}

fn eval_expr(expr: &str) -> Result<bool, String> {
    let mut result = false;
    for term in split_depth0(expr, ";or;")? {
        let value = eval_term(term)?;
        result = result || value;
    }
    Ok(result)
}

fn eval_term(term: &str) -> Result<bool, String> {
    let mut result = true;
    for atom in split_depth0(term, ";and;")? {
        let value = eval_atom(atom)?;
        result = result && value;
    }
    Ok(result)
}

fn eval_atom(atom: &str) -> Result<bool, String> {
    if let Some(inner) = atom.strip_prefix('(') {
        let inner = inner
            .strip_suffix(')')
            .ok_or_else(|| format!("unbalanced parentheses in `{atom}`"))?;
        return eval_expr(inner);
    }
    if atom.contains('(') || atom.contains(')') {
        return Err(format!("unexpected parenthesis in `{atom}`"));
    }
    let eq = atom.find("==");
    let ne = atom.find("!=");
    match (eq, ne) {
        (Some(e), Some(n)) if e < n => {
            let (lhs, rhs) = (&atom[..e], &atom[e + 2..]);
            Ok(lhs == rhs)
        }
        (Some(_), Some(n)) => {
            let (lhs, rhs) = (&atom[..n], &atom[n + 2..]);
            Ok(lhs != rhs)
        }
        (Some(e), None) => Ok(atom[..e] == atom[e + 2..]),
        (None, Some(n)) => Ok(atom[..n] != atom[n + 2..]),
        (None, None) => Ok(truthy(atom)),
    }
}

/// The bare-value rule: true iff non-empty and not `"0"`. Also used for
/// `<clean>`/`<prebuilds>` override elements.
pub fn truthy(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

/// Split at every occurrence of `sep` outside parentheses. Empty pieces
/// are kept: an empty atom is a falsy value, not a syntax error.
fn split_depth0<'a>(input: &'a str, sep: &str) -> Result<Vec<&'a str>, String> {
    let bytes = input.as_bytes();
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced parentheses".to_string());
                }
            }
            b';' if depth == 0 && input[i..].starts_with(sep) => {
                parts.push(&input[start..i]);
                i += sep.len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return Err("unbalanced parentheses".to_string());
    }
    parts.push(&input[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(expr: &str) -> bool {
        eval(expr, "test").unwrap()
    }

    #[test]
    fn truthiness() {
        assert!(ok("1"));
        assert!(ok("yes"));
        assert!(!ok("0"));
        assert!(!ok(""));
    }

    #[test]
    fn comparisons_are_verbatim() {
        assert!(ok("w32==w32"));
        assert!(!ok("w32==linux"));
        assert!(ok("w32!=linux"));
        // whitespace is significant
        assert!(!ok("w32 ==w32"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // parsed as 1 ;or; (0 ;and; 0)
        assert!(ok("1;or;0;and;0"));
        assert!(!ok("0;or;1;and;0"));
    }

    #[test]
    fn parentheses_group() {
        assert!(!ok("(1;or;0);and;0"));
        assert!(ok("(0;or;1);and;1"));
    }

    #[test]
    fn empty_operand_is_false() {
        // `({a};or;{b}==v);and;{c}` with a=1, b=x, c="" substitutes to:
        assert!(!ok("(1;or;x==v);and;"));
        assert!(ok("(1;or;x==v);and;1"));
    }

    #[test]
    fn earliest_operator_wins() {
        assert!(!ok("a==b!=c")); // "a" == "b!=c"
        assert!(ok("a!=b==c")); // "a" != "b==c"
    }

    #[test]
    fn malformed_expressions() {
        assert!(matches!(eval("(1", "t"), Err(Error::IfSyntax(..))));
        assert!(matches!(eval("1)", "t"), Err(Error::IfSyntax(..))));
        assert!(matches!(eval("a(b)c", "t"), Err(Error::IfSyntax(..))));
    }
}
