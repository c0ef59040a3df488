use std::{cell::RefCell, cmp::Ordering, collections::HashMap, rc::Rc};

use futures::FutureExt;
use log::trace;
use stride_syntax::ast::{
    BinOp, Expr, ExprKind, FunctionDef, LogicalOp, Source, Stmt, StmtKind, UnaryOp,
};

use crate::{
    console::Console,
    environment::{Env, FrameGuard},
    error::{make, ErrorKind, RuntimeError},
    host::{Command, HostBridge},
    stdlib,
    suspend::{Task, Yielder},
    tracker::ExecutionTracker,
    value::Value,
};

/// How a statement finished. `return` unwinds through this rather than
/// through the error channel and is consumed at the call boundary.
#[derive(Debug, PartialEq)]
pub enum Flow {
    Next,
    Return(Value),
}

/// A tree-walking interpreter whose every statement and expression is a
/// suspendable [`Task`]. Clones share the same state, which lets
/// [`Interpreter::execute`] hand out a task that owns what it runs.
#[derive(Clone, Debug, Default)]
pub struct Interpreter {
    env: Rc<RefCell<Env>>,
    host: HostBridge,
    tracker: ExecutionTracker,
    console: Console,
    yielder: Yielder,
}

impl Interpreter {
    pub fn new(host: HostBridge, tracker: ExecutionTracker, console: Console) -> Self {
        Self {
            env: Rc::default(),
            host,
            tracker,
            console,
            yielder: Yielder::new(),
        }
    }

    pub fn yielder(&self) -> Yielder {
        self.yielder.clone()
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    pub fn host(&self) -> &HostBridge {
        &self.host
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.env.borrow().global(name)
    }

    pub fn globals(&self) -> HashMap<String, Value> {
        self.env.borrow().globals().clone()
    }

    /// Number of function frames currently active.
    pub fn frame_depth(&self) -> usize {
        self.env.borrow().depth()
    }

    /// Forgets every global and function.
    pub fn reset(&self) {
        self.env.borrow_mut().clear();
    }

    /// Runs `program` at the top level, suspending after every statement.
    pub fn execute(&self, program: Source) -> Task<'static, Result<(), RuntimeError>> {
        let this = self.clone();
        async move { this.exec_top_level(&program.items).await }.boxed_local()
    }

    async fn exec_top_level(&self, items: &[Stmt]) -> Result<(), RuntimeError> {
        for stmt in items {
            self.exec_stmt(stmt).await?;
            self.yielder.step().await;
        }
        Ok(())
    }

    pub fn exec_stmt<'a>(&'a self, stmt: &'a Stmt) -> Task<'a, Result<Flow, RuntimeError>> {
        async move {
            self.tracker.line(stmt.line);
            self.exec_stmt_kind(stmt)
                .await
                .map_err(|e| e.at(stmt.line))
        }
        .boxed_local()
    }

    async fn exec_stmt_kind(&self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval_expr(expr).await?;
            }
            StmtKind::Assign { name, value } => {
                let value = self.eval_expr(value).await?;
                self.env.borrow_mut().set(name, value);
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.eval_expr(condition).await?.is_truthy() {
                    return self.exec_block(then_body).await;
                } else if let Some(else_body) = else_body {
                    return self.exec_block(else_body).await;
                }
            }
            StmtKind::While { condition, body } => {
                while self.eval_expr(condition).await?.is_truthy() {
                    if let Flow::Return(value) = self.exec_block(body).await? {
                        return Ok(Flow::Return(value));
                    }
                    self.yielder.step().await;
                }
            }
            StmtKind::For {
                var,
                iterable,
                body,
            } => return self.exec_for_stmt(var, iterable, body).await,
            StmtKind::Function(def) => self.env.borrow_mut().define_function(def.clone()),
            StmtKind::Return(value) => {
                if self.frame_depth() == 0 {
                    return Err(make(ErrorKind::SyntaxError, "'return' outside function"));
                }
                let value = match value {
                    Some(expr) => self.eval_expr(expr).await?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Pass => {}
            StmtKind::Global(names) => {
                let mut env = self.env.borrow_mut();
                for name in names {
                    env.declare_global(name);
                }
            }
        }
        Ok(Flow::Next)
    }

    async fn exec_block(&self, items: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in items {
            if let Flow::Return(value) = self.exec_stmt(stmt).await? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    async fn exec_for_stmt(
        &self,
        var: &str,
        iterable: &Expr,
        body: &[Stmt],
    ) -> Result<Flow, RuntimeError> {
        let list = match self.eval_expr(iterable).await? {
            Value::List(items) => items,
            Value::Str(s) => Rc::new(RefCell::new(
                s.chars().map(|c| Value::Str(c.to_string())).collect(),
            )),
            other => {
                return Err(make(
                    ErrorKind::TypeError,
                    format!("'{}' object is not iterable", other.type_name()),
                ))
            }
        };
        // The length is read on every pass, so the body may grow or shrink
        // the list it walks
        let mut i = 0;
        loop {
            let Some(item) = list.borrow().get(i).cloned() else {
                break;
            };
            self.env.borrow_mut().set(var, item);
            if let Flow::Return(value) = self.exec_block(body).await? {
                return Ok(Flow::Return(value));
            }
            self.yielder.step().await;
            i += 1;
        }
        Ok(Flow::Next)
    }

    pub fn eval_expr<'a>(&'a self, expr: &'a Expr) -> Task<'a, Result<Value, RuntimeError>> {
        async move {
            self.eval_expr_kind(&expr.kind)
                .await
                .map_err(|e| e.at(expr.line))
        }
        .boxed_local()
    }

    async fn eval_expr_kind(&self, kind: &ExprKind) -> Result<Value, RuntimeError> {
        match kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Boolean(b) => Ok(Value::Bool(*b)),
            ExprKind::Name(name) => self.lookup(name),
            ExprKind::List(items) => Ok(Value::list(self.eval_args(items).await?)),
            ExprKind::Unary { op, expr } => {
                let value = self.eval_expr(expr).await?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Minus => Ok(Value::Number(-value.to_number()?)),
                }
            }
            ExprKind::Binary { lhs, op, rhs } => {
                let lhs = self.eval_expr(lhs).await?;
                let rhs = self.eval_expr(rhs).await?;
                binary(*op, &lhs, &rhs)
            }
            ExprKind::Logical { lhs, op, rhs } => {
                // Both operands are always evaluated
                let lhs = self.eval_expr(lhs).await?.is_truthy();
                let rhs = self.eval_expr(rhs).await?.is_truthy();
                Ok(Value::Bool(match op {
                    LogicalOp::And => lhs && rhs,
                    LogicalOp::Or => lhs || rhs,
                }))
            }
            ExprKind::Call { func, args } => self.eval_call(func, args).await,
            ExprKind::Attribute { name, .. } => Err(make(
                ErrorKind::AttributeError,
                format!("attribute '{name}' can only be used in a method call"),
            )),
            ExprKind::Index { object, index } => {
                let target = self.eval_expr(object).await?;
                let index = self.eval_expr(index).await?;
                index_value(&target, &index)
            }
            ExprKind::Slice { object, start, end } => {
                let target = self.eval_expr(object).await?;
                let start = match start {
                    Some(expr) => Some(self.eval_expr(expr).await?),
                    None => None,
                };
                let end = match end {
                    Some(expr) => Some(self.eval_expr(expr).await?),
                    None => None,
                };
                slice_value(&target, start.as_ref(), end.as_ref())
            }
        }
    }

    async fn eval_args(&self, args: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg).await?);
        }
        Ok(values)
    }

    async fn eval_call(&self, func: &Expr, args: &[Expr]) -> Result<Value, RuntimeError> {
        match &func.kind {
            ExprKind::Name(name) => {
                let args = self.eval_args(args).await?;
                self.call(name, args).await
            }
            ExprKind::Attribute { object, name } => {
                let target = self.eval_expr(object).await?;
                let args = self.eval_args(args).await?;
                call_method(&target, name, args)
            }
            _ => Err(make(
                ErrorKind::TypeError,
                format!("'{func}' is not callable"),
            )),
        }
    }

    /// Calls `name`, trying built-ins first, then host commands and finally
    /// user defined functions.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if let Some(builtin) = stdlib::lookup(name) {
            trace!("Calling built-in {name}");
            return (builtin.body)(self, args).await;
        }
        if let Some(command) = self.host.resolve(name) {
            trace!("Calling host command {name}");
            return match command {
                Command::Action(f) => {
                    f(args, self.yielder()).await?;
                    Ok(Value::None)
                }
                Command::Predicate(f) => Ok(Value::Bool(f(args, self.yielder()).await?)),
            };
        }
        let Some(def) = self.env.borrow().function(name) else {
            return Err(make(
                ErrorKind::NameError,
                format!("unknown function '{name}'"),
            ));
        };
        self.call_function(def, args).await
    }

    async fn call_function(
        &self,
        def: Rc<FunctionDef>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let arity = def.params.len();
        if args.len() != arity {
            return Err(make(
                ErrorKind::ArgumentError,
                format!(
                    "function '{}' expects {arity} argument{}, got {}",
                    def.name,
                    if arity == 1 { "" } else { "s" },
                    args.len()
                ),
            ));
        }
        trace!("Calling {}", def.name);
        let locals = def.params.iter().cloned().zip(args).collect();
        let _frame = FrameGuard::push(&self.env, locals)?;
        for stmt in &def.body {
            if let Flow::Return(value) = self.exec_stmt(stmt).await? {
                return Ok(value);
            }
            self.yielder.step().await;
        }
        Ok(Value::None)
    }

    fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        self.env.borrow().get(name)
    }
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    let value = match op {
        BinOp::Plus => match (lhs, rhs) {
            (Value::Str(_), _) | (_, Value::Str(_)) => Value::Str(format!("{lhs}{rhs}")),
            _ => Value::Number(lhs.to_number()? + rhs.to_number()?),
        },
        BinOp::Minus => Value::Number(lhs.to_number()? - rhs.to_number()?),
        BinOp::Star => Value::Number(lhs.to_number()? * rhs.to_number()?),
        // Division and remainder by zero follow IEEE 754 and yield inf or nan
        BinOp::Slash => Value::Number(lhs.to_number()? / rhs.to_number()?),
        BinOp::Percent => Value::Number(lhs.to_number()? % rhs.to_number()?),
        BinOp::Equal => Value::Bool(lhs == rhs),
        BinOp::NotEqual => Value::Bool(lhs != rhs),
        BinOp::Less | BinOp::LessEqual | BinOp::Greater | BinOp::GreaterEqual => {
            let ordering = match (lhs, rhs) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(make(
                        ErrorKind::TypeError,
                        format!(
                            "'{op}' not supported between '{}' and '{}'",
                            lhs.type_name(),
                            rhs.type_name()
                        ),
                    ))
                }
            };
            // Unordered (nan) comparisons are always false
            Value::Bool(ordering.map_or(false, |o| match op {
                BinOp::Less => o == Ordering::Less,
                BinOp::LessEqual => o != Ordering::Greater,
                BinOp::Greater => o == Ordering::Greater,
                _ => o != Ordering::Less,
            }))
        }
    };
    Ok(value)
}

/// Maps a possibly negative index onto `0..len`.
fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let index = if index < 0 { index + len as i64 } else { index };
    (0..len as i64).contains(&index).then_some(index as usize)
}

/// Like [`wrap_index`] but clamps into `0..=len` instead of failing.
fn clamp_index(index: i64, len: usize) -> usize {
    let index = if index < 0 { index + len as i64 } else { index };
    index.clamp(0, len as i64) as usize
}

fn index_value(target: &Value, index: &Value) -> Result<Value, RuntimeError> {
    let Value::List(items) = target else {
        return Err(make(
            ErrorKind::TypeError,
            format!("'{}' object is not subscriptable", target.type_name()),
        ));
    };
    let items = items.borrow();
    wrap_index(index.to_index()?, items.len())
        .map(|i| items[i].clone())
        .ok_or_else(|| make(ErrorKind::IndexError, "list index out of range"))
}

/// Slices always copy. Bounds default to the whole list and clamp instead
/// of failing.
fn slice_value(
    target: &Value,
    start: Option<&Value>,
    end: Option<&Value>,
) -> Result<Value, RuntimeError> {
    let Value::List(items) = target else {
        return Err(make(
            ErrorKind::TypeError,
            format!("'{}' object does not support slicing", target.type_name()),
        ));
    };
    let items = items.borrow();
    let len = items.len();
    let start = match start {
        Some(v) => clamp_index(v.to_index()?, len),
        None => 0,
    };
    let end = match end {
        Some(v) => clamp_index(v.to_index()?, len),
        None => len,
    };
    let slice = if start < end {
        items[start..end].to_vec()
    } else {
        vec![]
    };
    Ok(Value::list(slice))
}

fn check_arity(method: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min}")
    } else {
        format!("{min} to {max}")
    };
    Err(make(
        ErrorKind::ArgumentError,
        format!("{method}() takes {expected} arguments ({} given)", args.len()),
    ))
}

fn call_method(target: &Value, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let Value::List(list) = target else {
        return Err(make(
            ErrorKind::AttributeError,
            format!("'{}' object has no attribute '{method}'", target.type_name()),
        ));
    };
    match method {
        "append" => {
            check_arity(method, &args, 1, 1)?;
            list.borrow_mut().extend(args);
            Ok(Value::None)
        }
        "remove" => {
            check_arity(method, &args, 1, 1)?;
            let position = list.borrow().iter().position(|v| *v == args[0]);
            match position {
                Some(i) => {
                    list.borrow_mut().remove(i);
                    Ok(Value::None)
                }
                None => Err(make(
                    ErrorKind::ValueError,
                    "list.remove(x): x not in list",
                )),
            }
        }
        "pop" => {
            check_arity(method, &args, 0, 1)?;
            let mut items = list.borrow_mut();
            let index = match args.first() {
                Some(v) => v.to_index()?,
                None => -1,
            };
            match wrap_index(index, items.len()) {
                Some(i) => Ok(items.remove(i)),
                None => Err(make(ErrorKind::IndexError, "pop index out of range")),
            }
        }
        _ => Err(make(
            ErrorKind::AttributeError,
            format!("'list' object has no attribute '{method}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, console::MessageKind, driver::Driver, suspend::Signal};
    use futures::future;
    use std::{future::Future, task::Context, time::Duration};

    /// Runs `source` to the end, ignoring pacing, and returns what it
    /// printed.
    fn run_src(source: &str) -> Result<Vec<String>, RuntimeError> {
        let interpreter = Interpreter::default();
        run_on(&interpreter, source)?;
        Ok(printed(&interpreter))
    }

    fn run_on(interpreter: &Interpreter, source: &str) -> Result<(), RuntimeError> {
        let program = compile(source).unwrap();
        futures::executor::block_on(interpreter.execute(program))
    }

    fn printed(interpreter: &Interpreter) -> Vec<String> {
        interpreter
            .console()
            .messages()
            .into_iter()
            .filter(|m| m.kind == MessageKind::Print)
            .map(|m| m.text)
            .collect()
    }

    fn run_err(source: &str) -> RuntimeError {
        run_src(source).unwrap_err()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run_src("x = 1\ny = 2\nprint(x + y)").unwrap(), vec!["3"]);
        assert_eq!(run_src("x = 1 + 2 * 3\nprint(x)").unwrap(), vec!["7"]);
        assert_eq!(
            run_src("print(7 % 3, -7 % 3, 7 / 2, 2 - 5)").unwrap(),
            vec!["1 -1 3.5 -3"]
        );
    }

    #[test]
    fn division_by_zero_follows_floats() {
        assert_eq!(
            run_src("print(1 / 0, -1 / 0, 0 / 0, 5 % 0)").unwrap(),
            vec!["inf -inf nan nan"]
        );
    }

    #[test]
    fn string_coercion() {
        assert_eq!(run_src("print(1 + \"a\")").unwrap(), vec!["1a"]);
        assert_eq!(run_src("print('n' + 2.5)").unwrap(), vec!["n2.5"]);
        assert_eq!(run_src("print('2' * 3)").unwrap(), vec!["6"]);
        assert_eq!(run_src("print(True + 1)").unwrap(), vec!["2"]);
        assert_eq!(run_src("print('a' + [1, 'b'])").unwrap(), vec!["a[1, 'b']"]);
        assert_eq!(run_err("x = 'a' * 2").kind, ErrorKind::TypeError);
    }

    #[test]
    fn print_formats() {
        assert_eq!(
            run_src("print(True, False, [1, 'x', [2.5]], 'plain')").unwrap(),
            vec!["True False [1, 'x', [2.5]] plain"]
        );
        assert_eq!(run_src("print()").unwrap(), vec![""]);
        assert_eq!(run_src("print(print('a'))").unwrap(), vec!["a", "None"]);
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            run_src("print(1 < 2, 2 <= 2, 'b' > 'a', 'a' >= 'b', 1 == 1, 'a' != 'a')").unwrap(),
            vec!["True True True False True False"]
        );
        let err = run_err("x = 1 < 'a'");
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn list_equality() {
        assert_eq!(
            run_src("print([1, [2]] == [1, [2]], 1 == '1', [1] != [2])").unwrap(),
            vec!["True False True"]
        );
    }

    #[test]
    fn self_containing_lists_compare() {
        let source = "\
a = [1]
a.append(a)
b = [1]
b.append(b)
print(a == b, a != b)
c = [b]
c.remove(a)
print(len(c))
";
        assert_eq!(run_src(source).unwrap(), vec!["True False", "0"]);
    }

    #[test]
    fn logical_operators_are_eager() {
        assert_eq!(
            run_src("def t(x):\n    print(x)\n    return x\nr = t(0) and t(1)\nprint(r)")
                .unwrap(),
            vec!["0", "1", "False"]
        );
        assert_eq!(
            run_src("print(1 or 0, not [], not 'a')").unwrap(),
            vec!["True True False"]
        );
    }

    #[test]
    fn list_aliasing() {
        assert_eq!(
            run_src("a = [1, 2]\nb = a\nb.append(3)\nprint(len(a))").unwrap(),
            vec!["3"]
        );
        assert_eq!(
            run_src("def add(xs):\n    xs.append(0)\na = []\nadd(a)\nadd(a)\nprint(a)").unwrap(),
            vec!["[0, 0]"]
        );
    }

    #[test]
    fn slices_copy() {
        assert_eq!(
            run_src("a = [1, 2]\nb = a[:]\nb.append(3)\nprint(a, b)").unwrap(),
            vec!["[1, 2] [1, 2, 3]"]
        );
    }

    #[test]
    fn list_methods() {
        assert_eq!(
            run_src(
                "a = [1, 2, 3, 2]\na.remove(2)\nprint(a)\nprint(a.pop())\nprint(a.pop(0), a.pop(-1), a)"
            )
            .unwrap(),
            vec!["[1, 3, 2]", "2", "1 3 []"]
        );
        assert_eq!(run_err("a = [1]\na.remove(5)").kind, ErrorKind::ValueError);
        assert_eq!(run_err("a = []\na.pop()").kind, ErrorKind::IndexError);
        assert_eq!(run_err("a = [1]\na.pop(1)").kind, ErrorKind::IndexError);
        assert_eq!(run_err("a = [1]\na.pop(1, 2)").kind, ErrorKind::ArgumentError);
        assert_eq!(run_err("a = [1]\na.sort()").kind, ErrorKind::AttributeError);
        assert_eq!(run_err("s = 'ab'\ns.append(1)").kind, ErrorKind::AttributeError);
        assert_eq!(run_err("a = [1]\nb = a.append").kind, ErrorKind::AttributeError);
    }

    #[test]
    fn negative_indexing_and_slicing() {
        assert_eq!(
            run_src("a = [1, 2, 3, 4]\nprint(a[-1], a[1:-1], a[5:10], a[:2], a[-2:], a[3:1])")
                .unwrap(),
            vec!["4 [2, 3] [] [1, 2] [3, 4] []"]
        );
        assert_eq!(run_err("a = [1]\nprint(a[1])").kind, ErrorKind::IndexError);
        assert_eq!(run_err("a = [1]\nprint(a[-2])").kind, ErrorKind::IndexError);
        assert_eq!(run_err("s = 'abc'\nprint(s[0])").kind, ErrorKind::TypeError);
        assert_eq!(run_err("s = 'abc'\nprint(s[0:1])").kind, ErrorKind::TypeError);
        assert_eq!(run_err("a = [1]\nprint(a[0.5])").kind, ErrorKind::TypeError);
    }

    #[test]
    fn len_builtin() {
        assert_eq!(run_src("print(len('héllo'), len([]))").unwrap(), vec!["5 0"]);
        assert_eq!(run_err("len(1)").kind, ErrorKind::TypeError);
        assert_eq!(run_err("len()").kind, ErrorKind::ArgumentError);
    }

    #[test]
    fn control_flow() {
        let source = "\
total = 0
i = 0
while i < 5:
    if i % 2 == 0:
        total = total + i
    else:
        pass
    i = i + 1
print(total)
for n in range(3):
    print(n)
";
        assert_eq!(run_src(source).unwrap(), vec!["6", "0", "1", "2"]);
    }

    #[test]
    fn for_over_string() {
        assert_eq!(
            run_src("for c in \"ab\":\n    print(c)").unwrap(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn for_over_non_iterable() {
        let err = run_err("x = 1\nfor c in x:\n    pass");
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert_eq!(err.message, "'number' object is not iterable");
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn for_sees_appended_items() {
        assert_eq!(
            run_src("a = [1]\nfor x in a:\n    if x < 3:\n        a.append(x + 1)\nprint(a)")
                .unwrap(),
            vec!["[1, 2, 3]"]
        );
    }

    #[test]
    fn functions_and_return() {
        let source = "\
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)
print(fib(10))
def nothing():
    pass
print(nothing())
def early():
    for i in range(10):
        while True:
            return i
print(early())
";
        assert_eq!(run_src(source).unwrap(), vec!["55", "None", "0"]);
    }

    #[test]
    fn scoping_without_global() {
        assert_eq!(
            run_src("x = 1\ndef f():\n    x = 2\n    print(x)\nf()\nprint(x)").unwrap(),
            vec!["2", "1"]
        );
    }

    #[test]
    fn scoping_with_global() {
        assert_eq!(
            run_src("x = 1\ndef f():\n    global x\n    x = 2\nf()\nprint(x)").unwrap(),
            vec!["2"]
        );
    }

    #[test]
    fn locals_do_not_leak_between_calls() {
        let err = run_err("def f():\n    y = 1\nf()\nprint(y)");
        assert_eq!(err.kind, ErrorKind::NameError);
        assert_eq!(err.line, Some(4));
    }

    #[test]
    fn function_reads_globals() {
        assert_eq!(
            run_src("g = 5\ndef f():\n    return g * 2\nprint(f())").unwrap(),
            vec!["10"]
        );
    }

    #[test]
    fn call_errors() {
        let err = run_err("f()\ndef f():\n    pass");
        assert_eq!(err.kind, ErrorKind::NameError);
        assert_eq!(err.to_string(), "NameError: unknown function 'f' at line 1");

        let err = run_err("def f(a):\n    pass\nf(1, 2)");
        assert_eq!(err.kind, ErrorKind::ArgumentError);
        assert_eq!(err.message, "function 'f' expects 1 argument, got 2");

        let err = run_err("def f(a, b):\n    pass\nf(1)");
        assert_eq!(err.message, "function 'f' expects 2 arguments, got 1");

        assert_eq!(run_err("print(y)").to_string(), "NameError: name 'y' is not defined at line 1");
    }

    #[test]
    fn return_outside_function() {
        let err = run_err("x = 1\nif x:\n    return 2");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn error_unwinds_every_frame() {
        let interpreter = Interpreter::default();
        let err = run_on(
            &interpreter,
            "def a(n):\n    return b(n)\ndef b(n):\n    return c(n)\ndef c(n):\n    return n + []\na(1)",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert_eq!(err.line, Some(6));
        assert_eq!(interpreter.frame_depth(), 0);
    }

    #[test]
    fn deep_recursion_fails_cleanly() {
        let count = "\
def count(n):
    if n == 0:
        return 0
    return count(n - 1) + 1
";
        let interpreter = Interpreter::default();
        run_on(&interpreter, &format!("{count}print(count(20))")).unwrap();
        assert_eq!(printed(&interpreter), vec!["20"]);

        let err = run_on(&interpreter, &format!("{count}print(count(1000))")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionError);
        assert_eq!(err.message, "maximum recursion depth exceeded");
        assert_eq!(interpreter.frame_depth(), 0);

        let err = run_on(&interpreter, "def f(n):\n    return f(n + 1)\nf(0)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionError);
        assert_eq!(err.line, Some(2));
        assert_eq!(interpreter.frame_depth(), 0);

        // The interpreter stays usable afterwards
        run_on(&interpreter, "print(count(3))").unwrap();
        assert_eq!(printed(&interpreter).last().map(String::as_str), Some("3"));
    }

    #[test]
    fn line_events_precede_statements() {
        let interpreter = Interpreter::default();
        let lines = Rc::new(RefCell::new(vec![]));
        let sink = lines.clone();
        interpreter.tracker().subscribe(move |e| {
            if let crate::tracker::ExecutionEvent::Line(n) = e {
                sink.borrow_mut().push(n);
            }
        });
        run_on(&interpreter, "def f():\n    pass\nx = 1\nif x:\n    f()\n").unwrap();
        assert_eq!(*lines.borrow(), vec![1, 3, 4, 5, 2]);
    }

    #[test]
    fn step_signals() {
        let interpreter = Interpreter::default();
        let yielder = interpreter.yielder();
        let mut task = interpreter.execute(compile("i = 0\nwhile i < 2:\n    i = i + 1\nsleep(0.5)").unwrap());
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut signals = vec![];
        while task.as_mut().poll(&mut cx).is_pending() {
            signals.push(yielder.take());
        }
        assert_eq!(
            signals,
            vec![
                Some(Signal::Step),
                Some(Signal::Step),
                Some(Signal::Step),
                Some(Signal::Step),
                Some(Signal::Wait(Duration::from_millis(500))),
                Some(Signal::Step),
            ]
        );
    }

    #[test]
    fn sleep_arguments() {
        assert_eq!(run_err("sleep()").kind, ErrorKind::ArgumentError);
        assert_eq!(run_err("sleep('x')").kind, ErrorKind::TypeError);
        assert!(run_src("sleep(-1)").is_ok());
    }

    #[test]
    fn host_commands() {
        let moves = Rc::new(RefCell::new(vec![]));
        let log = moves.clone();
        let host = HostBridge::with_controller(
            crate::host::Controller::new("grid")
                .action("move", move |args, yielder| {
                    log.borrow_mut().push(args[0].to_string());
                    async move {
                        yielder.step().await;
                        Ok(())
                    }
                    .boxed_local()
                })
                .predicate("can_move", |args, _| {
                    future::ready(Ok(args[0] == Value::from("up"))).boxed_local()
                })
                .action("fail", |_, _| {
                    future::ready(Err(make(ErrorKind::CommandError, "blocked"))).boxed_local()
                }),
        );
        let interpreter = Interpreter::new(host, ExecutionTracker::new(), Console::default());
        run_on(
            &interpreter,
            "if can_move('up'):\n    move('up')\nif can_move('left'):\n    move('left')\nprint(move('down'))",
        )
        .unwrap();
        assert_eq!(*moves.borrow(), vec!["up", "down"]);
        assert_eq!(printed(&interpreter), vec!["None"]);

        let err = run_on(&interpreter, "fail()").unwrap_err();
        assert_eq!(err.to_string(), "CommandError: blocked at line 1");
    }

    #[test]
    fn builtins_shadow_host_and_user_functions() {
        let host = HostBridge::with_controller(crate::host::Controller::new("grid").action(
            "print",
            |_, _| future::ready(Err(make(ErrorKind::CommandError, "shadowed"))).boxed_local(),
        ));
        let interpreter = Interpreter::new(host, ExecutionTracker::new(), Console::default());
        run_on(&interpreter, "def len(x):\n    return 0\nprint(len('abc'))").unwrap();
        assert_eq!(printed(&interpreter), vec!["3"]);
    }

    #[test]
    fn cancellation_keeps_globals() {
        let interpreter = Interpreter::default();
        let mut driver = Driver::new(
            interpreter.execute(compile("i = 0\nwhile True:\n    i = i + 1\n").unwrap()),
            interpreter.yielder(),
            Default::default(),
        );
        for _ in 0..5 {
            driver.resume();
        }
        driver.cancel();
        assert_eq!(interpreter.global("i"), Some(Value::Number(4.0)));
        assert!(matches!(driver.resume(), crate::driver::Progress::Finished));
        assert_eq!(interpreter.frame_depth(), 0);
    }
}
