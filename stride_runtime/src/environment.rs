use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use log::debug;
use stride_syntax::ast::FunctionDef;

use crate::{
    error::{make, ErrorKind, RuntimeError},
    value::Value,
};

/// Deepest call nesting allowed. Every nested call is polled on the native
/// stack, so the limit keeps a run within a 2 MB thread stack.
pub const MAX_CALL_DEPTH: usize = 32;

/// One activation record. Keeping the `global` declarations next to the
/// locals means both are always pushed and popped together.
#[derive(Debug, Default)]
struct Frame {
    locals: HashMap<String, Value>,
    global_decls: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct Env {
    globals: HashMap<String, Value>,
    functions: HashMap<String, Rc<FunctionDef>>,
    frames: Vec<Frame>,
}

impl Env {
    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        debug!("Get {name}");
        if let Some(value) = self.frames.last().and_then(|frame| frame.locals.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            debug!("Get {name} from globals");
            return Ok(value.clone());
        }
        Err(make(
            ErrorKind::NameError,
            format!("name '{name}' is not defined"),
        ))
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.global_decls.contains(name) => {
                debug!("Set local {name} -> {value:?}");
                frame.locals.insert(name.to_string(), value);
            }
            _ => {
                debug!("Set global {name} -> {value:?}");
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Marks `name` as global in the innermost frame. Does nothing at the
    /// top level, where every write is global already.
    pub fn declare_global(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            debug!("Declare {name} global");
            frame.global_decls.insert(name.to_string());
        }
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub fn define_function(&mut self, def: Rc<FunctionDef>) {
        debug!("Define {}({})", def.name, def.params.join(", "));
        self.functions.insert(def.name.clone(), def);
    }

    pub fn function(&self, name: &str) -> Option<Rc<FunctionDef>> {
        self.functions.get(name).cloned()
    }

    pub fn push_frame(&mut self, locals: HashMap<String, Value>) -> Result<(), RuntimeError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(make(
                ErrorKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        self.frames.push(Frame {
            locals,
            global_decls: HashSet::default(),
        });
        debug!("Push frame, depth {}", self.frames.len());
        Ok(())
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
        debug!("Pop frame, depth {}", self.frames.len());
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Holds a frame on the shared environment for as long as it lives, so the
/// frame is released on every exit path, including a dropped task.
pub struct FrameGuard {
    env: Rc<RefCell<Env>>,
}

impl FrameGuard {
    pub fn push(
        env: &Rc<RefCell<Env>>,
        locals: HashMap<String, Value>,
    ) -> Result<Self, RuntimeError> {
        env.borrow_mut().push_frame(locals)?;
        Ok(Self { env: env.clone() })
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.env.borrow_mut().pop_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_writes_are_global() {
        let mut env = Env::default();
        env.set("x", 1.0.into());
        assert_eq!(env.get("x"), Ok(1.0.into()));
        assert_eq!(env.global("x"), Some(1.0.into()));
    }

    #[test]
    fn locals_shadow_globals() {
        let mut env = Env::default();
        env.set("x", 1.0.into());
        env.push_frame(HashMap::default()).unwrap();
        env.set("x", 2.0.into());
        assert_eq!(env.get("x"), Ok(2.0.into()));
        env.pop_frame();
        assert_eq!(env.get("x"), Ok(1.0.into()));
    }

    #[test]
    fn global_declaration_redirects_writes() {
        let mut env = Env::default();
        env.push_frame(HashMap::default()).unwrap();
        env.declare_global("x");
        env.set("x", 3.0.into());
        env.pop_frame();
        assert_eq!(env.global("x"), Some(3.0.into()));
    }

    #[test]
    fn declaration_outside_frame_is_ignored() {
        let mut env = Env::default();
        env.declare_global("x");
        env.push_frame(HashMap::default()).unwrap();
        env.set("x", 1.0.into());
        env.pop_frame();
        assert!(env.global("x").is_none());
    }

    #[test]
    fn undefined_name() {
        let err = Env::default().get("nope").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameError);
        assert_eq!(err.message, "name 'nope' is not defined");
    }

    #[test]
    fn guard_pops_on_drop() {
        let env = Rc::new(RefCell::new(Env::default()));
        {
            let _outer = FrameGuard::push(&env, HashMap::default()).unwrap();
            let _inner = FrameGuard::push(&env, HashMap::default()).unwrap();
            assert_eq!(env.borrow().depth(), 2);
        }
        assert_eq!(env.borrow().depth(), 0);
    }

    #[test]
    fn call_depth_is_bounded() {
        let env = Rc::new(RefCell::new(Env::default()));
        let guards = (0..MAX_CALL_DEPTH)
            .map(|_| FrameGuard::push(&env, HashMap::default()).unwrap())
            .collect::<Vec<FrameGuard>>();
        let err = FrameGuard::push(&env, HashMap::default()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::RecursionError);
        assert_eq!(env.borrow().depth(), MAX_CALL_DEPTH);
        drop(guards);
        assert_eq!(env.borrow().depth(), 0);
    }
}
