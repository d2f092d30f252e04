//! Expression evaluator.
//!
//! Evaluation is pure: it reads variables through [`EvalContext`] and never
//! mutates anything. The grammar has no calls, so nothing outside the value
//! model can be reached from a template.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{BinOp, Expr, LoopHead, UnaryOp};
use crate::error::EvalError;
use crate::value::{Context, Value};

/// Variable lookup used during evaluation.
pub trait EvalContext {
    fn get_var(&self, name: &str) -> Option<&Value>;
}

impl EvalContext for Context {
    fn get_var(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl EvalContext for HashMap<String, Value> {
    fn get_var(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Names bound for one loop iteration, in declaration order.
pub type Bindings = Vec<(String, Value)>;

/// Longest string `str * int` may build.
const MAX_REPEAT_LEN: usize = 1 << 24;

pub fn evaluate(expr: &Expr, ctx: &impl EvalContext) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Var(_) | Expr::Attribute(..) | Expr::Index(..) => {
            evaluate_ref(expr, ctx).map(Cow::into_owned)
        }

        Expr::List(items) => Ok(Value::List(evaluate_all(items, ctx)?)),

        Expr::Tuple(items) => Ok(Value::Tuple(evaluate_all(items, ctx)?)),

        Expr::Unary(op, inner) => {
            let value = evaluate(inner, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    Value::Int(n) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(EvalError::Overflow { op: "-" }),
                    Value::Float(x) => Ok(Value::Float(-x)),
                    other => Err(EvalError::BadOperand {
                        op: "-",
                        operand: other.type_name(),
                    }),
                },
            }
        }

        // Short-circuit
        Expr::BinOp(lhs, BinOp::And, rhs) => {
            if !evaluate(lhs, ctx)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(rhs, ctx)?.is_truthy()))
        }
        Expr::BinOp(lhs, BinOp::Or, rhs) => {
            if evaluate(lhs, ctx)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(rhs, ctx)?.is_truthy()))
        }

        Expr::BinOp(lhs, op, rhs) => {
            let l = evaluate(lhs, ctx)?;
            let r = evaluate(rhs, ctx)?;
            binary(*op, l, r)
        }
    }
}

/// Walks variable, attribute and index chains by reference, so only the
/// selected element is cloned.
fn evaluate_ref<'c, C: EvalContext>(
    expr: &Expr,
    ctx: &'c C,
) -> Result<Cow<'c, Value>, EvalError> {
    match expr {
        Expr::Var(name) => ctx
            .get_var(name)
            .map(Cow::Borrowed)
            .ok_or_else(|| EvalError::UndefinedVariable { name: name.clone() }),

        Expr::Attribute(obj, attr) => match evaluate_ref(obj, ctx)? {
            Cow::Borrowed(value) => attribute(value, attr).map(Cow::Borrowed),
            Cow::Owned(value) => attribute(&value, attr).map(|v| Cow::Owned(v.clone())),
        },

        Expr::Index(obj, idx) => {
            let container = evaluate_ref(obj, ctx)?;
            let index = evaluate(idx, ctx)?;
            match container {
                Cow::Borrowed(value) => index_value(value, &index),
                Cow::Owned(value) => {
                    index_value(&value, &index).map(|v| Cow::Owned(v.into_owned()))
                }
            }
        }

        other => evaluate(other, ctx).map(Cow::Owned),
    }
}

/// Evaluates a condition by truthiness.
pub fn evaluate_to_bool(expr: &Expr, ctx: &impl EvalContext) -> Result<bool, EvalError> {
    Ok(evaluate(expr, ctx)?.is_truthy())
}

/// Evaluates a loop header into one set of bindings per item.
///
/// The source is evaluated once. With a single target each item is bound
/// whole; with several, each item must be a list or tuple of matching length.
pub fn iterate(head: &LoopHead, ctx: &impl EvalContext) -> Result<Vec<Bindings>, EvalError> {
    let items = match evaluate(&head.iterable.expr, ctx)? {
        Value::List(items) | Value::Tuple(items) => items,
        Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
        Value::Map(map) => map.into_keys().map(Value::Str).collect(),
        other => {
            return Err(EvalError::NotIterable {
                ty: other.type_name(),
            })
        }
    };

    items
        .into_iter()
        .map(|item| unpack(&head.targets, item))
        .collect()
}

fn unpack(targets: &[String], item: Value) -> Result<Bindings, EvalError> {
    if let [name] = targets {
        return Ok(vec![(name.clone(), item)]);
    }
    let components = match item {
        Value::List(c) | Value::Tuple(c) => c,
        other => {
            return Err(EvalError::CannotUnpack {
                ty: other.type_name(),
                expected: targets.len(),
            })
        }
    };
    if components.len() != targets.len() {
        return Err(EvalError::UnpackArity {
            expected: targets.len(),
            actual: components.len(),
        });
    }
    Ok(targets.iter().cloned().zip(components).collect())
}

fn evaluate_all(items: &[Expr], ctx: &impl EvalContext) -> Result<Vec<Value>, EvalError> {
    items.iter().map(|item| evaluate(item, ctx)).collect()
}

fn mismatch(op: BinOp, l: &Value, r: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol(),
        left: l.type_name(),
        right: r.type_name(),
    }
}

fn binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::NotEq => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            let ordering = compare(&l, &r).ok_or_else(|| mismatch(op, &l, &r))?;
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::LtEq => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinOp::In => contains(&r, &l).map(Value::Bool).ok_or_else(|| mismatch(op, &l, &r)),
        BinOp::NotIn => contains(&r, &l)
            .map(|found| Value::Bool(!found))
            .ok_or_else(|| mismatch(op, &l, &r)),
        BinOp::Add => add(l, r),
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arithmetic(op, l, r),
        BinOp::And | BinOp::Or => unreachable!("boolean operators short-circuit in evaluate"),
    }
}

/// Equality never fails; values of unrelated types are simply unequal.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = (as_float(left)?, as_float(right)?);
            a.partial_cmp(&b)
        }
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

/// `needle in haystack`; `None` when the haystack type does not support it.
fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match (haystack, needle) {
        (Value::List(items) | Value::Tuple(items), _) => {
            Some(items.iter().any(|item| values_equal(item, needle)))
        }
        (Value::Str(s), Value::Str(sub)) => Some(s.contains(sub.as_str())),
        (Value::Map(map), Value::Str(key)) => Some(map.contains_key(key)),
        _ => None,
    }
}

fn add(l: Value, r: Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (Value::Tuple(mut a), Value::Tuple(b)) => {
            a.extend(b);
            Ok(Value::Tuple(a))
        }
        (l, r) => arithmetic(BinOp::Add, l, r),
    }
}

fn arithmetic(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) if op == BinOp::Mul => {
            repeat(s, *n)
        }
        _ => match (as_float(&l), as_float(&r)) {
            (Some(a), Some(b)) => float_arithmetic(op, a, b),
            _ => Err(mismatch(op, &l, &r)),
        },
    }
}

/// `str * int`; a negative count yields the empty string.
fn repeat(s: &str, n: i64) -> Result<Value, EvalError> {
    let count = usize::try_from(n).unwrap_or(0);
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::Str(s.repeat(count))),
        _ => Err(EvalError::TooLarge {
            op: "*",
            limit: MAX_REPEAT_LEN,
        }),
    }
}

fn int_arithmetic(op: BinOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let overflow = EvalError::Overflow { op: op.symbol() };
    match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).ok_or(overflow),
        BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or(overflow),
        BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or(overflow),
        BinOp::Div => float_arithmetic(op, a as f64, b as f64),
        BinOp::Rem => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            // Result takes the sign of the divisor.
            let r = a.checked_rem(b).ok_or(overflow)?;
            Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
        }
        _ => unreachable!("not an arithmetic operator"),
    }
}

fn float_arithmetic(op: BinOp, a: f64, b: f64) -> Result<Value, EvalError> {
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div | BinOp::Rem if b == 0.0 => Err(EvalError::DivisionByZero),
        BinOp::Div => Ok(Value::Float(a / b)),
        BinOp::Rem => {
            let r = a % b;
            Ok(Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
        }
        _ => unreachable!("not an arithmetic operator"),
    }
}

fn attribute<'v>(value: &'v Value, attr: &str) -> Result<&'v Value, EvalError> {
    match value {
        Value::Map(map) => map.get(attr).ok_or_else(|| EvalError::KeyNotFound {
            key: attr.to_string(),
        }),
        other => Err(EvalError::NoAttribute {
            ty: other.type_name(),
            attr: attr.to_string(),
        }),
    }
}

fn index_value<'v>(container: &'v Value, index: &Value) -> Result<Cow<'v, Value>, EvalError> {
    match (container, index) {
        (Value::List(items) | Value::Tuple(items), Value::Int(i)) => {
            let len = items.len();
            resolve_index(*i, len)
                .and_then(|at| items.get(at))
                .map(Cow::Borrowed)
                .ok_or(EvalError::IndexOutOfRange { index: *i, len })
        }
        (Value::Str(s), Value::Int(i)) => {
            let len = s.chars().count();
            resolve_index(*i, len)
                .and_then(|at| s.chars().nth(at))
                .map(|c| Cow::Owned(Value::Str(c.to_string())))
                .ok_or(EvalError::IndexOutOfRange { index: *i, len })
        }
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .map(Cow::Borrowed)
            .ok_or_else(|| EvalError::KeyNotFound { key: key.clone() }),
        (container, index) => Err(EvalError::TypeMismatch {
            op: "[]",
            left: container.type_name(),
            right: index.type_name(),
        }),
    }
}

/// Maps a possibly negative index onto `0..len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let at = if index < 0 { index + len } else { index };
    if (0..len).contains(&at) {
        usize::try_from(at).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;
    use crate::error::Position;
    use crate::parser::parse_expression;

    fn eval(src: &str, ctx: &Context) -> Result<Value, EvalError> {
        evaluate(&parse_expression(src).unwrap(), ctx)
    }

    fn ok(src: &str) -> Value {
        eval(src, &Context::new()).unwrap()
    }

    fn head(targets: &[&str], src: &str) -> LoopHead {
        LoopHead {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            iterable: Expression {
                source: src.to_string(),
                expr: parse_expression(src).unwrap(),
                position: Position::new(1, 0),
            },
        }
    }

    #[test]
    fn arithmetic() {
        assert_eq!(ok("1 + 2 * 3"), Value::Int(7));
        assert_eq!(ok("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(ok("7 / 2"), Value::Float(3.5));
        assert_eq!(ok("6 / 3"), Value::Float(2.0));
        assert_eq!(ok("1 + 0.5"), Value::Float(1.5));
        assert_eq!(ok("-7 % 3"), Value::Int(2));
        assert_eq!(ok("7 % -3"), Value::Int(-2));
        assert_eq!(ok("-(2 - 5)"), Value::Int(3));
        assert_eq!(ok("'ab' * 2"), Value::from("abab"));
        assert_eq!(ok("'a' + 'b'"), Value::from("ab"));
        assert_eq!(ok("[1] + [2]"), Value::from(vec![1, 2]));
    }

    #[test]
    fn comparisons_and_membership() {
        assert_eq!(ok("2 > 1"), Value::Bool(true));
        assert_eq!(ok("1 >= 1.5"), Value::Bool(false));
        assert_eq!(ok("'a' < 'b'"), Value::Bool(true));
        assert_eq!(ok("1 == 1.0"), Value::Bool(true));
        assert_eq!(ok("'1' == 1"), Value::Bool(false));
        assert_eq!(ok("(1, 'a') == (1, 'a')"), Value::Bool(true));
        assert_eq!(ok("[1] != (1,)"), Value::Bool(true));
        assert_eq!(ok("2 in [1, 2]"), Value::Bool(true));
        assert_eq!(ok("'ell' in 'hello'"), Value::Bool(true));
        assert_eq!(ok("3 not in (1, 2)"), Value::Bool(true));

        let ctx = Context::from_json(r#"{"m": {"b": 2, "a": 1}}"#).unwrap();
        assert_eq!(eval("'a' in m", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(eval("'z' not in m", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(
            eval("2 in m", &ctx),
            Err(EvalError::TypeMismatch {
                op: "in",
                left: "int",
                right: "map"
            })
        );
    }

    #[test]
    fn boolean_connectives_short_circuit() {
        assert_eq!(ok("false and missing"), Value::Bool(false));
        assert_eq!(ok("true or missing"), Value::Bool(true));
        assert_eq!(ok("not 0"), Value::Bool(true));
        assert_eq!(ok("1 and 'x'"), Value::Bool(true));
        assert!(matches!(
            eval("true and missing", &Context::new()),
            Err(EvalError::UndefinedVariable { name }) if name == "missing"
        ));
    }

    #[test]
    fn indexing_and_attributes() {
        let ctx = Context::from_json(r#"{"row": {"cells": [1, 2, 3]}, "name": "héllo"}"#).unwrap();
        assert_eq!(eval("row.cells[-1]", &ctx).unwrap(), Value::Int(3));
        assert_eq!(eval("row['cells'][0]", &ctx).unwrap(), Value::Int(1));
        assert_eq!(eval("name[1]", &ctx).unwrap(), Value::from("é"));
        assert_eq!(
            eval("row.cells[3]", &ctx),
            Err(EvalError::IndexOutOfRange { index: 3, len: 3 })
        );
        assert_eq!(
            eval("row.rows", &ctx),
            Err(EvalError::KeyNotFound { key: "rows".into() })
        );
        assert_eq!(
            eval("name.upper", &ctx),
            Err(EvalError::NoAttribute {
                ty: "str",
                attr: "upper".into()
            })
        );
    }

    #[test]
    fn failures() {
        let ctx = Context::new();
        assert_eq!(eval("1 / 0", &ctx), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1 % 0", &ctx), Err(EvalError::DivisionByZero));
        assert_eq!(
            eval("'a' - 1", &ctx),
            Err(EvalError::TypeMismatch {
                op: "-",
                left: "str",
                right: "int"
            })
        );
        assert_eq!(
            eval("1 < 'a'", &ctx),
            Err(EvalError::TypeMismatch {
                op: "<",
                left: "int",
                right: "str"
            })
        );
        assert_eq!(
            eval("-'a'", &ctx),
            Err(EvalError::BadOperand {
                op: "-",
                operand: "str"
            })
        );
        assert_eq!(
            eval("9223372036854775807 + 1", &ctx),
            Err(EvalError::Overflow { op: "+" })
        );
    }

    #[test]
    fn string_repetition_is_bounded() {
        let ctx = Context::new();
        assert_eq!(ok("'ab' * -3"), Value::from(""));
        assert_eq!(ok("'' * 9223372036854775807"), Value::from(""));
        assert_eq!(
            eval("'abc' * 9223372036854775807", &ctx),
            Err(EvalError::TooLarge {
                op: "*",
                limit: MAX_REPEAT_LEN
            })
        );
        assert_eq!(
            eval("10000000 * 'abcdefghij'", &ctx),
            Err(EvalError::TooLarge {
                op: "*",
                limit: MAX_REPEAT_LEN
            })
        );
        let long = eval("'x' * 1000", &ctx).unwrap();
        assert_eq!(long.to_string().len(), 1000);
    }

    #[test]
    fn projections_borrow_from_the_context() {
        let ctx = Context::from_json(r#"{"row": {"cells": [[1, 2], [3]]}}"#).unwrap();
        let expr = parse_expression("row.cells[0][1]").unwrap();
        let value = evaluate_ref(&expr, &ctx).unwrap();
        assert!(matches!(value, Cow::Borrowed(Value::Int(2))));

        let expr = parse_expression("[row.cells][0][-1]").unwrap();
        let value = evaluate_ref(&expr, &ctx).unwrap();
        assert!(matches!(value, Cow::Owned(_)));
        assert_eq!(value.into_owned(), Value::from(vec![3]));
    }

    #[test]
    fn iterate_destructures_tuples() {
        let ctx = Context::new().with("items", vec![("a", 1), ("b", 2)]);
        let bindings = iterate(&head(&["t", "c"], "items"), &ctx).unwrap();
        assert_eq!(
            bindings,
            vec![
                vec![("t".to_string(), Value::from("a")), ("c".to_string(), Value::Int(1))],
                vec![("t".to_string(), Value::from("b")), ("c".to_string(), Value::Int(2))],
            ]
        );
    }

    #[test]
    fn iterate_single_target_binds_whole_item() {
        let ctx = Context::new().with("items", vec![("a", 1)]);
        let bindings = iterate(&head(&["pair"], "items"), &ctx).unwrap();
        assert_eq!(bindings, vec![vec![("pair".to_string(), Value::from(("a", 1)))]]);

        let letters = iterate(&head(&["c"], "'ab'"), &ctx).unwrap();
        assert_eq!(letters.len(), 2);
    }

    #[test]
    fn iterate_map_yields_sorted_keys() {
        let ctx = Context::from_json(r#"{"m": {"b": 2, "a": 1}}"#).unwrap();
        let bindings = iterate(&head(&["k"], "m"), &ctx).unwrap();
        assert_eq!(
            bindings,
            vec![
                vec![("k".to_string(), Value::from("a"))],
                vec![("k".to_string(), Value::from("b"))],
            ]
        );
    }

    #[test]
    fn iterate_errors() {
        let ctx = Context::new().with("n", 3).with("items", vec![(1, 2, 3)]);
        assert_eq!(
            iterate(&head(&["x"], "n"), &ctx),
            Err(EvalError::NotIterable { ty: "int" })
        );
        assert_eq!(
            iterate(&head(&["a", "b"], "items"), &ctx),
            Err(EvalError::UnpackArity {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(
            iterate(&head(&["a", "b"], "[1]"), &ctx),
            Err(EvalError::CannotUnpack {
                ty: "int",
                expected: 2
            })
        );
    }
}
