//! Criteria interpreter
//!
//! Walks the AST against an owned JSON snapshot of the resource. The snapshot
//! is the only thing assignments can write to; it is dropped when evaluation
//! ends.
//!
//! Paths rooted at `resource` are read by reference and only the value they
//! land on is copied. Every step and every copied node is charged against
//! [`MAX_EVAL_COST`]; running out is an [`EvaluationError`].

use std::borrow::Cow;

use serde_json::{Map, Value};

use super::parser::{number, BinOp, Expr};
use super::MAX_EVAL_COST;
use crate::error::EvaluationError;

pub struct Interpreter {
    scope: Value,
    remaining: usize,
}

impl Interpreter {
    /// Bind `resource` to `snapshot`
    pub fn new(snapshot: Value) -> Self {
        Self {
            scope: snapshot,
            remaining: MAX_EVAL_COST,
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvaluationError> {
        spend(&mut self.remaining, 1)?;
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Resource | Expr::Member(..) | Expr::Index(..) => match self.path(expr)? {
                Some(steps) => {
                    let found = read(&self.scope, &steps);
                    let cost = weight(&found, self.remaining);
                    spend(&mut self.remaining, cost)?;
                    Ok(found.into_owned())
                }
                None => self.access(expr),
            },
            Expr::Call {
                target,
                method,
                args,
            } => {
                let target = self.eval(target)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call(&target, method, &args)
            }
            Expr::Not(operand) => Ok(Value::Bool(!truthy(&self.eval(operand)?))),
            Expr::Neg(operand) => match self.eval(operand)? {
                Value::Number(n) => Ok(number(-n.as_f64().unwrap_or(0.0))),
                other => Err(EvaluationError::new(format!(
                    "cannot negate {}",
                    type_name(&other)
                ))),
            },
            Expr::Binary(BinOp::And, left, right) => {
                let left = self.eval(left)?;
                if truthy(&left) {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Binary(BinOp::Or, left, right) => {
                let left = self.eval(left)?;
                if truthy(&left) {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(Value::Bool(compare(*op, &left, &right)))
            }
            Expr::Assign(target, value) => {
                let value = self.eval(value)?;
                let path = self.place(target)?;
                // the scope keeps one copy and the caller gets another
                let cost = weight(&value, self.remaining);
                spend(&mut self.remaining, cost)?;
                assign(&mut self.scope, &path, value.clone())?;
                Ok(value)
            }
        }
    }

    /// Steps of an access chain rooted at `resource`, or `None` when the
    /// chain starts from some other value
    fn path(&mut self, expr: &Expr) -> Result<Option<Vec<Step>>, EvaluationError> {
        match expr {
            Expr::Resource => Ok(Some(Vec::new())),
            Expr::Member(base, name) => Ok(self.path(base)?.map(|mut steps| {
                steps.push(Step::Member(name.clone()));
                steps
            })),
            Expr::Index(base, index) => {
                let Some(mut steps) = self.path(base)? else {
                    return Ok(None);
                };
                steps.push(Step::Element(self.eval(index)?));
                Ok(Some(steps))
            }
            _ => Ok(None),
        }
    }

    /// Member or index access on a computed value
    fn access(&mut self, expr: &Expr) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Member(base, name) => {
                let base = self.eval(base)?;
                Ok(member(&base, name).into_owned())
            }
            Expr::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                Ok(element(&base, &index).into_owned())
            }
            _ => Err(EvaluationError::new("invalid access")),
        }
    }

    /// Resolve an assignment target into a key path from the root
    fn place(&mut self, expr: &Expr) -> Result<Vec<Key>, EvaluationError> {
        match expr {
            Expr::Resource => Ok(Vec::new()),
            Expr::Member(base, name) => {
                let mut path = self.place(base)?;
                path.push(Key::Field(name.clone()));
                Ok(path)
            }
            Expr::Index(base, index) => {
                let mut path = self.place(base)?;
                let index = self.eval(index)?;
                path.push(match index {
                    Value::Number(ref n) => match n.as_u64() {
                        Some(i) => Key::Position(i as usize),
                        None => Key::Field(n.to_string()),
                    },
                    Value::String(s) => Key::Field(s),
                    other => Key::Field(display(&other)),
                });
                Ok(path)
            }
            _ => Err(EvaluationError::new("invalid assignment target")),
        }
    }
}

fn spend(remaining: &mut usize, cost: usize) -> Result<(), EvaluationError> {
    match remaining.checked_sub(cost) {
        Some(left) => {
            *remaining = left;
            Ok(())
        }
        None => Err(EvaluationError::new(format!(
            "criteria exceeds evaluation budget of {}",
            MAX_EVAL_COST
        ))),
    }
}

/// Count the nodes of `value`, giving up once past `limit`
fn weight(value: &Value, limit: usize) -> usize {
    let mut count = 0;
    let mut pending = vec![value];
    while let Some(next) = pending.pop() {
        count += 1;
        if count > limit {
            break;
        }
        match next {
            Value::Array(items) => pending.extend(items),
            Value::Object(map) => pending.extend(map.values()),
            _ => {}
        }
    }
    count
}

#[derive(Debug)]
enum Step {
    Member(String),
    Element(Value),
}

fn read<'v>(root: &'v Value, steps: &[Step]) -> Cow<'v, Value> {
    let mut current = Cow::Borrowed(root);
    for step in steps {
        current = match current {
            Cow::Borrowed(base) => step.apply(base),
            // computed values are scalars or null
            Cow::Owned(base) => Cow::Owned(step.apply(&base).into_owned()),
        };
    }
    current
}

impl Step {
    fn apply<'v>(&self, base: &'v Value) -> Cow<'v, Value> {
        match self {
            Step::Member(name) => member(base, name),
            Step::Element(index) => element(base, index),
        }
    }
}

#[derive(Debug, Clone)]
enum Key {
    Field(String),
    Position(usize),
}

fn assign(root: &mut Value, path: &[Key], value: Value) -> Result<(), EvaluationError> {
    let Some((last, parents)) = path.split_last() else {
        return Err(EvaluationError::new("invalid assignment target"));
    };

    let mut current = root;
    for key in parents {
        current = slot(current, key)?;
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
    }
    *slot(current, last)? = value;
    Ok(())
}

fn slot<'v>(container: &'v mut Value, key: &Key) -> Result<&'v mut Value, EvaluationError> {
    match (container, key) {
        (Value::Object(map), Key::Field(name)) => Ok(map.entry(name.clone()).or_insert(Value::Null)),
        (Value::Object(map), Key::Position(i)) => {
            Ok(map.entry(i.to_string()).or_insert(Value::Null))
        }
        (Value::Array(items), Key::Position(i)) => {
            if *i == items.len() {
                items.push(Value::Null);
            }
            let len = items.len();
            items.get_mut(*i).ok_or_else(|| {
                EvaluationError::new(format!("index {} out of bounds for length {}", i, len))
            })
        }
        (other, _) => Err(EvaluationError::new(format!(
            "cannot assign into {}",
            type_name(other)
        ))),
    }
}

fn member<'v>(base: &'v Value, name: &str) -> Cow<'v, Value> {
    match base {
        Value::Object(map) => map.get(name).map_or(Cow::Owned(Value::Null), Cow::Borrowed),
        Value::String(s) if name == "length" => Cow::Owned(Value::from(s.chars().count())),
        Value::Array(items) if name == "length" => Cow::Owned(Value::from(items.len())),
        _ => Cow::Owned(Value::Null),
    }
}

fn element<'v>(base: &'v Value, index: &Value) -> Cow<'v, Value> {
    let found = match (base, index) {
        (Value::Array(items), Value::Number(n)) => n.as_u64().and_then(|i| items.get(i as usize)),
        (Value::Object(map), Value::String(key)) => map.get(key),
        (Value::Object(map), Value::Number(n)) => map.get(&n.to_string()),
        (Value::String(_), Value::String(key)) | (Value::Array(_), Value::String(key)) => {
            return member(base, key)
        }
        _ => None,
    };
    found.map_or(Cow::Owned(Value::Null), Cow::Borrowed)
}

fn call(target: &Value, method: &str, args: &[Value]) -> Result<Value, EvaluationError> {
    let arity = |expected: usize| -> Result<(), EvaluationError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvaluationError::new(format!(
                "{}() takes {} argument(s), got {}",
                method,
                expected,
                args.len()
            )))
        }
    };
    let str_arg = |i: usize| string_arg(method, args, i);

    match (method, target) {
        ("startsWith", Value::String(s)) => {
            arity(1)?;
            Ok(Value::Bool(s.starts_with(str_arg(0)?)))
        }
        ("endsWith", Value::String(s)) => {
            arity(1)?;
            Ok(Value::Bool(s.ends_with(str_arg(0)?)))
        }
        ("contains" | "includes", Value::String(s)) => {
            arity(1)?;
            Ok(Value::Bool(s.contains(str_arg(0)?)))
        }
        ("contains" | "includes", Value::Array(items)) => {
            arity(1)?;
            Ok(Value::Bool(items.iter().any(|item| loose_eq(item, &args[0]))))
        }
        ("contains" | "includes", Value::Object(map)) => {
            arity(1)?;
            Ok(Value::Bool(map.contains_key(str_arg(0)?)))
        }
        ("toLowerCase", Value::String(s)) => {
            arity(0)?;
            Ok(Value::String(s.to_lowercase()))
        }
        ("toUpperCase", Value::String(s)) => {
            arity(0)?;
            Ok(Value::String(s.to_uppercase()))
        }
        ("trim", Value::String(s)) => {
            arity(0)?;
            Ok(Value::String(s.trim().to_string()))
        }
        ("length" | "size", Value::String(s)) => {
            arity(0)?;
            Ok(Value::from(s.chars().count()))
        }
        ("length" | "size", Value::Array(items)) => {
            arity(0)?;
            Ok(Value::from(items.len()))
        }
        ("length" | "size", Value::Object(map)) => {
            arity(0)?;
            Ok(Value::from(map.len()))
        }
        (method, other) => Err(EvaluationError::new(format!(
            "cannot call {}() on {}",
            method,
            type_name(other)
        ))),
    }
}

fn string_arg<'a>(method: &str, args: &'a [Value], i: usize) -> Result<&'a str, EvaluationError> {
    args[i].as_str().ok_or_else(|| {
        EvaluationError::new(format!(
            "{}() expects a string argument, got {}",
            method,
            type_name(&args[i])
        ))
    })
}

/// `null`, `false`, `0` and `""` are false; everything else is true
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> bool {
    match op {
        BinOp::Eq => loose_eq(left, right),
        BinOp::NotEq => !loose_eq(left, right),
        BinOp::StrictEq => strict_eq(left, right),
        BinOp::StrictNotEq => !strict_eq(left, right),
        BinOp::Lt => ordering(left, right).map(|o| o.is_lt()).unwrap_or(false),
        BinOp::Le => ordering(left, right).map(|o| o.is_le()).unwrap_or(false),
        BinOp::Gt => ordering(left, right).map(|o| o.is_gt()).unwrap_or(false),
        BinOp::Ge => ordering(left, right).map(|o| o.is_ge()).unwrap_or(false),
        BinOp::And | BinOp::Or => unreachable!("logical operators short-circuit in eval"),
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Equality with number/string and number/boolean coercion
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), Value::Number(_))
        | (Value::Number(_), Value::Bool(_)) => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => strict_eq(left, right),
    }
}

fn ordering(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => as_number(left)?.partial_cmp(&as_number(right)?),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::parser::parse;
    use serde_json::json;

    fn run(criteria: &str, snapshot: Value) -> Result<Value, EvaluationError> {
        let expr = parse(criteria)?;
        Interpreter::new(snapshot).eval(&expr)
    }

    fn vm() -> Value {
        json!({
            "hostName": "testIsAvailable_simple_pos",
            "cpuCount": 4,
            "memoryGb": 15.5,
            "powerState": "ON",
            "tags": ["prod", "web"],
            "customProperties": {"p1": "v1", "p2": "v2"}
        })
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run("resource.cpuCount == 4", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.cpuCount != 4", vm()).unwrap(), json!(false));
        assert_eq!(run("resource.cpuCount > 2", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.memoryGb <= 15.5", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.powerState < 'PA'", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.missing > 1", vm()).unwrap(), json!(false));
    }

    #[test]
    fn test_loose_and_strict_equality() {
        assert_eq!(run("resource.cpuCount == '4'", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.cpuCount === '4'", vm()).unwrap(), json!(false));
        assert_eq!(run("resource.cpuCount === 4", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.cpuCount !== 4.0", vm()).unwrap(), json!(false));
        assert_eq!(run("resource.missing == null", vm()).unwrap(), json!(true));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(run("resource.hostName.startsWith('test')", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.hostName.endsWith('_pos')", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.tags.includes('web')", vm()).unwrap(), json!(true));
        assert_eq!(run("resource.customProperties.contains('p3')", vm()).unwrap(), json!(false));
        assert_eq!(run("resource.powerState.toLowerCase()", vm()).unwrap(), json!("on"));
        assert_eq!(run("resource.tags.length", vm()).unwrap(), json!(2));
        assert_eq!(run("resource.customProperties.size()", vm()).unwrap(), json!(2));
        assert_eq!(run("'  x '.trim() == 'x'", vm()).unwrap(), json!(true));
    }

    #[test]
    fn test_helper_type_errors() {
        assert!(run("resource.cpuCount.startsWith('4')", vm()).is_err());
        assert!(run("resource.missing.startsWith('x')", vm()).is_err());
        assert!(run("resource.hostName.startsWith(4)", vm()).is_err());
        assert!(run("resource.hostName.startsWith()", vm()).is_err());
        assert!(run("-resource.hostName", vm()).is_err());
    }

    #[test]
    fn test_logical_short_circuit() {
        // right side would fail, but is never evaluated
        assert_eq!(
            run("resource.missing && resource.missing.startsWith('x')", vm()).unwrap(),
            json!(null)
        );
        assert_eq!(
            run("resource.cpuCount == 4 || resource.missing.startsWith('x')", vm()).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_index_access() {
        assert_eq!(run("resource.tags[1]", vm()).unwrap(), json!("web"));
        assert_eq!(run("resource['customProperties']['p2']", vm()).unwrap(), json!("v2"));
        assert_eq!(run("resource.tags[9]", vm()).unwrap(), json!(null));
    }

    #[test]
    fn test_assignment_writes_private_copy() {
        let original = vm();
        let expr = parse("resource.hostName = 'changed'").unwrap();
        let mut interpreter = Interpreter::new(original.clone());
        assert_eq!(interpreter.eval(&expr).unwrap(), json!("changed"));
        assert_eq!(
            interpreter.eval(&parse("resource.hostName").unwrap()).unwrap(),
            json!("changed")
        );
        assert_eq!(original["hostName"], "testIsAvailable_simple_pos");
    }

    #[test]
    fn test_assignment_creates_nested_fields() {
        let expr = parse("(resource.a.b = 1) && resource.a.b == 1").unwrap();
        assert_eq!(Interpreter::new(json!({})).eval(&expr).unwrap(), json!(true));

        let expr = parse("resource.tags[2] = 'new'").unwrap();
        assert!(Interpreter::new(vm()).eval(&expr).is_ok());

        let expr = parse("resource.tags[7] = 'far'").unwrap();
        assert!(Interpreter::new(vm()).eval(&expr).is_err());

        let expr = parse("resource.hostName.x = 1").unwrap();
        assert!(Interpreter::new(vm()).eval(&expr).is_err());
    }

    #[test]
    fn test_self_assignment_chain_runs_out_of_budget() {
        let chain = (0..25)
            .map(|i| format!("(resource.a{} = resource)", i))
            .collect::<Vec<_>>()
            .join(" && ");
        let err = run(&chain, vm()).unwrap_err();
        assert!(err.message.contains("evaluation budget"), "{}", err.message);

        // a couple of whole-resource copies are still fine
        assert_eq!(
            run("(resource.copy = resource) && resource.copy.cpuCount == 4", vm()).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_large_reads_are_charged() {
        let big = json!({ "items": vec![0; MAX_EVAL_COST] });
        assert!(run("resource.items.includes(1)", big.clone()).is_err());
        assert_eq!(run("resource.items.length > 0", big.clone()).unwrap(), json!(true));
        assert_eq!(run("resource.count == null", big).unwrap(), json!(true));
    }

    #[test]
    fn test_weight_stops_at_limit() {
        assert_eq!(weight(&json!(1), 10), 1);
        assert_eq!(weight(&vm(), 1000), 11);
        assert_eq!(weight(&json!([1, 2, 3, 4, 5]), 2), 3);
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("false")));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!({})));
    }
}
