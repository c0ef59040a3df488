//! Bridge between scripts and the commands a host scene exposes.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use futures::FutureExt;
use log::info;

use crate::{
    error::RuntimeError,
    stdlib,
    suspend::{Task, Yielder},
    value::Value,
};

pub type ActionFn = Rc<dyn Fn(Vec<Value>, Yielder) -> Task<'static, Result<(), RuntimeError>>>;
pub type PredicateFn =
    Rc<dyn Fn(Vec<Value>, Yielder) -> Task<'static, Result<bool, RuntimeError>>>;
pub type ResetFn = Rc<dyn Fn(Yielder) -> Task<'static, ()>>;

/// A named set of scene commands. Actions run for their effect, predicates
/// answer with a boolean. Names are case sensitive.
#[derive(Clone)]
pub struct Controller {
    name: String,
    actions: HashMap<String, ActionFn>,
    predicates: HashMap<String, PredicateFn>,
    reset: Option<ResetFn>,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: HashMap::default(),
            predicates: HashMap::default(),
            reset: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>, Yielder) -> Task<'static, Result<(), RuntimeError>> + 'static,
    {
        self.actions.insert(name.to_string(), Rc::new(f));
        self
    }

    pub fn predicate<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>, Yielder) -> Task<'static, Result<bool, RuntimeError>> + 'static,
    {
        self.predicates.insert(name.to_string(), Rc::new(f));
        self
    }

    pub fn on_reset<F>(mut self, f: F) -> Self
    where
        F: Fn(Yielder) -> Task<'static, ()> + 'static,
    {
        self.reset = Some(Rc::new(f));
        self
    }

    /// Sorted names of every action and predicate.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .actions
            .keys()
            .chain(self.predicates.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.actions.contains_key(name) || self.predicates.contains_key(name)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("commands", &self.command_names())
            .field("reset", &self.reset.is_some())
            .finish()
    }
}

pub enum Command {
    Action(ActionFn),
    Predicate(PredicateFn),
}

/// The registration point injected into every interpreter. Clones share
/// the same registration.
#[derive(Clone, Debug, Default)]
pub struct HostBridge {
    controller: Rc<RefCell<Option<Rc<Controller>>>>,
}

impl HostBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controller(controller: Controller) -> Self {
        let bridge = Self::default();
        bridge.register(controller);
        bridge
    }

    /// Replaces any previously registered controller.
    pub fn register(&self, controller: Controller) {
        info!(
            "Registered controller {} with commands {:?}",
            controller.name,
            controller.command_names()
        );
        self.controller.replace(Some(Rc::new(controller)));
    }

    pub fn unregister(&self) -> Option<Rc<Controller>> {
        let previous = self.controller.take();
        if let Some(controller) = &previous {
            info!("Unregistered controller {}", controller.name);
        }
        previous
    }

    pub fn controller(&self) -> Option<Rc<Controller>> {
        self.controller.borrow().clone()
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.controller
            .borrow()
            .as_ref()
            .map_or(false, |c| c.has_command(name))
    }

    /// Built-in names followed by the registered commands. Informational
    /// only, e.g. for syntax highlighting.
    pub fn available_commands(&self) -> Vec<String> {
        let mut names: Vec<String> = stdlib::names().map(str::to_string).collect();
        if let Some(controller) = self.controller() {
            names.extend(controller.command_names());
        }
        names
    }

    /// Actions shadow predicates of the same name.
    pub fn resolve(&self, name: &str) -> Option<Command> {
        let controller = self.controller()?;
        if let Some(f) = controller.actions.get(name) {
            return Some(Command::Action(f.clone()));
        }
        controller
            .predicates
            .get(name)
            .map(|f| Command::Predicate(f.clone()))
    }

    /// Runs the controller's reset hook, or finishes at once without one.
    pub fn reset_scene(&self, yielder: Yielder) -> Task<'static, ()> {
        let reset = self.controller().and_then(|c| c.reset.clone());
        async move {
            if let Some(reset) = reset {
                reset(yielder).await;
            }
        }
        .boxed_local()
    }
}
