use std::time::Duration;

use futures::{future, FutureExt};

use crate::{
    error::{make, ErrorKind, RuntimeError},
    interpret::Interpreter,
    suspend::Task,
    value::Value,
};

pub type NativeFn =
    for<'a> fn(&'a Interpreter, Vec<Value>) -> Task<'a, Result<Value, RuntimeError>>;

pub struct NativeFunc {
    pub name: &'static str,
    pub body: NativeFn,
}

/// Built-ins are resolved before host commands and user functions.
pub static BUILTINS: &[NativeFunc] = &[
    NativeFunc {
        name: "print",
        body: print,
    },
    NativeFunc {
        name: "len",
        body: len,
    },
    NativeFunc {
        name: "range",
        body: range,
    },
    NativeFunc {
        name: "sleep",
        body: sleep,
    },
];

pub fn lookup(name: &str) -> Option<&'static NativeFunc> {
    BUILTINS.iter().find(|f| f.name == name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|f| f.name)
}

fn ready<'a>(result: Result<Value, RuntimeError>) -> Task<'a, Result<Value, RuntimeError>> {
    future::ready(result).boxed_local()
}

fn print(interpreter: &Interpreter, args: Vec<Value>) -> Task<'_, Result<Value, RuntimeError>> {
    let text = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<String>>()
        .join(" ");
    interpreter.console().print(text);
    ready(Ok(Value::None))
}

fn len(_: &Interpreter, args: Vec<Value>) -> Task<'_, Result<Value, RuntimeError>> {
    let result = match args.as_slice() {
        [Value::List(items)] => Ok(Value::Number(items.borrow().len() as f64)),
        [Value::Str(s)] => Ok(Value::Number(s.chars().count() as f64)),
        [other] => Err(make(
            ErrorKind::TypeError,
            format!("object of type '{}' has no len()", other.type_name()),
        )),
        _ => Err(make(
            ErrorKind::ArgumentError,
            format!("len() takes exactly one argument ({} given)", args.len()),
        )),
    };
    ready(result)
}

fn range(_: &Interpreter, args: Vec<Value>) -> Task<'_, Result<Value, RuntimeError>> {
    ready(make_range(&args))
}

fn make_range(args: &[Value]) -> Result<Value, RuntimeError> {
    let bounds = args
        .iter()
        .map(Value::to_index)
        .collect::<Result<Vec<i64>, RuntimeError>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(make(
                ErrorKind::ArgumentError,
                format!("range expected 1 to 3 arguments, got {}", args.len()),
            ))
        }
    };
    if step == 0 {
        return Err(make(ErrorKind::ValueError, "range() arg 3 must not be zero"));
    }
    let mut items = vec![];
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        items.push(Value::Number(i as f64));
        // Stepping past the representable range ends the sequence
        let Some(next) = i.checked_add(step) else {
            break;
        };
        i = next;
    }
    Ok(Value::list(items))
}

/// Suspends through the driver's wait mechanism. Negative durations sleep
/// for zero seconds.
fn sleep(interpreter: &Interpreter, args: Vec<Value>) -> Task<'_, Result<Value, RuntimeError>> {
    let yielder = interpreter.yielder();
    async move {
        let [seconds] = args.as_slice() else {
            return Err(make(
                ErrorKind::ArgumentError,
                format!("sleep() takes exactly one argument ({} given)", args.len()),
            ));
        };
        let seconds = seconds.to_number()?.max(0.0);
        let duration = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        yielder.wait(duration).await;
        Ok(Value::None)
    }
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_of(args: &[f64]) -> Result<Value, RuntimeError> {
        make_range(&args.iter().map(|n| Value::Number(*n)).collect::<Vec<Value>>())
    }

    #[test]
    fn range_forms() {
        assert_eq!(range_of(&[3.0]).unwrap().to_string(), "[0, 1, 2]");
        assert_eq!(range_of(&[2.0, 5.0]).unwrap().to_string(), "[2, 3, 4]");
        assert_eq!(range_of(&[5.0, 0.0, -2.0]).unwrap().to_string(), "[5, 3, 1]");
        assert_eq!(range_of(&[3.0, 1.0]).unwrap().to_string(), "[]");
        assert_eq!(range_of(&[-2.0]).unwrap().to_string(), "[]");
    }

    #[test]
    fn range_errors() {
        assert_eq!(
            range_of(&[0.0, 3.0, 0.0]).unwrap_err().kind,
            ErrorKind::ValueError
        );
        assert_eq!(range_of(&[]).unwrap_err().kind, ErrorKind::ArgumentError);
        assert_eq!(range_of(&[1.5]).unwrap_err().kind, ErrorKind::TypeError);
    }

    #[test]
    fn range_extreme_bounds() {
        assert_eq!(
            range_of(&[0.0, 9e18, 5e18]).unwrap().to_string(),
            "[0, 5000000000000000000]"
        );
        assert_eq!(
            range_of(&[0.0, -9e18, -5e18]).unwrap().to_string(),
            "[0, -5000000000000000000]"
        );
        assert_eq!(range_of(&[1e19]).unwrap_err().kind, ErrorKind::ValueError);
        assert_eq!(range_of(&[-1e19, 0.0]).unwrap_err().kind, ErrorKind::ValueError);
        assert_eq!(range_of(&[f64::INFINITY]).unwrap_err().kind, ErrorKind::TypeError);
    }

    #[test]
    fn builtin_names() {
        assert_eq!(
            names().collect::<Vec<&str>>(),
            vec!["print", "len", "range", "sleep"]
        );
        assert!(lookup("print").is_some());
        assert!(lookup("move").is_none());
    }
}
