use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use crate::error::{make, ErrorKind, RuntimeError};

/// A runtime value. Lists are shared by reference, so cloning a
/// `Value::List` yields another handle onto the same sequence.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
}

type ListPtr = *const RefCell<Vec<Value>>;

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Str(_) => "str",
            Self::List(_) => "list",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
        }
    }

    /// Numeric coercion used by arithmetic. Booleans count as 0 and 1 and
    /// strings are accepted when their whole text parses as a number.
    pub fn to_number(&self) -> Result<f64, RuntimeError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Self::Str(s) => s.trim().parse::<f64>().map_err(|_| {
                make(
                    ErrorKind::TypeError,
                    format!("cannot convert {self:?} to a number"),
                )
            }),
            _ => Err(make(
                ErrorKind::TypeError,
                format!("cannot convert '{}' to a number", self.type_name()),
            )),
        }
    }

    /// Positions (indices, `pop` arguments, `range` bounds) must be integral
    /// numbers that fit in an `i64`.
    pub fn to_index(&self) -> Result<i64, RuntimeError> {
        match self {
            Self::Number(n) if n.fract() == 0.0 => {
                if (i64::MIN as f64..i64::MAX as f64).contains(n) {
                    Ok(*n as i64)
                } else {
                    Err(make(
                        ErrorKind::ValueError,
                        format!("integer {self} is too large to use as an index"),
                    ))
                }
            }
            _ => Err(make(
                ErrorKind::TypeError,
                format!("indices must be integers, not {self:?}"),
            )),
        }
    }

    /// The quoted form used inside lists and diagnostics.
    pub fn repr(&self) -> String {
        format!("{self:?}")
    }

    fn write_value(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        quoted: bool,
        seen: &mut Vec<ListPtr>,
    ) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Str(s) if quoted => write!(f, "'{s}'"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                let ptr = Rc::as_ptr(items);
                // A list that contains itself
                if seen.contains(&ptr) {
                    return f.write_str("[...]");
                }
                seen.push(ptr);
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_value(f, true, seen)?;
                }
                seen.pop();
                f.write_str("]")
            }
        }
    }
}

/// Integral values print without a fractional part, everything else uses
/// the shortest round-tripping form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        String::from(if n > 0.0 { "inf" } else { "-inf" })
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_value(f, false, &mut Vec::default())
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_value(f, true, &mut Vec::default())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, &mut Vec::default())
    }
}

impl Value {
    /// Element-wise equality. A pair of lists already being compared further
    /// up counts as equal, so self-containing lists terminate.
    fn equals(&self, other: &Self, seen: &mut Vec<(ListPtr, ListPtr)>) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let pair = (Rc::as_ptr(a), Rc::as_ptr(b));
                if seen.contains(&pair) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return false;
                }
                seen.push(pair);
                let equal = a.iter().zip(b.iter()).all(|(x, y)| x.equals(y, seen));
                seen.pop();
                equal
            }
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}
