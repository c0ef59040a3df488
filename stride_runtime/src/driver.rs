use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
    thread,
    time::Duration,
};

use futures::task::noop_waker;
use log::{error, info, trace};

use crate::{
    error::RuntimeError,
    suspend::{Signal, Task, Yielder},
};

/// Steps shorter than this are paced by a single frame instead of a timer.
pub const MIN_STEP_DELAY: Duration = Duration::from_millis(10);

#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Pause after every step boundary
    pub step_delay: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(100),
        }
    }
}

/// What the host should do before resuming.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pause {
    /// Resume on the next frame
    Frame,
    Delay(Duration),
}

impl Pause {
    pub async fn wait(self) {
        match self {
            Self::Frame => tokio::task::yield_now().await,
            Self::Delay(duration) => tokio::time::sleep(duration).await,
        }
    }

    pub fn wait_blocking(self) {
        match self {
            Self::Frame => thread::yield_now(),
            Self::Delay(duration) => thread::sleep(duration),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Progress {
    Suspended(Pause),
    Completed,
    Failed(RuntimeError),
    /// Nothing left to drive, either already done or cancelled
    Finished,
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    Completed,
    Failed(RuntimeError),
    Cancelled,
}

/// Cooperative stop flag, checked before every step.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type ErrorCallback = Box<dyn FnOnce(&str)>;
type CompleteCallback = Box<dyn FnOnce()>;

/// Pumps a suspendable task one step at a time. Exactly one of the error
/// and completion callbacks fires, unless the driver is cancelled first, in
/// which case neither does.
pub struct Driver {
    task: Option<Task<'static, Result<(), RuntimeError>>>,
    yielder: Yielder,
    config: DriverConfig,
    on_error: Option<ErrorCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Driver {
    pub fn new(
        task: Task<'static, Result<(), RuntimeError>>,
        yielder: Yielder,
        config: DriverConfig,
    ) -> Self {
        Self {
            task: Some(task),
            yielder,
            config,
            on_error: None,
            on_complete: None,
        }
    }

    pub fn on_error(mut self, f: impl FnOnce(&str) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_none()
    }

    pub fn resume(&mut self) -> Progress {
        let Some(task) = self.task.as_mut() else {
            return Progress::Finished;
        };
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match task.as_mut().poll(&mut cx) {
            Poll::Pending => Progress::Suspended(self.pause_for(self.yielder.take())),
            Poll::Ready(result) => {
                self.task = None;
                let (on_error, on_complete) = (self.on_error.take(), self.on_complete.take());
                match result {
                    Ok(()) => {
                        info!("Execution completed");
                        if let Some(f) = on_complete {
                            f();
                        }
                        Progress::Completed
                    }
                    Err(e) => {
                        error!("Execution failed: {e}");
                        if let Some(f) = on_error {
                            f(&e.to_string());
                        }
                        Progress::Failed(e)
                    }
                }
            }
        }
    }

    fn pause_for(&self, signal: Option<Signal>) -> Pause {
        match signal {
            Some(Signal::Wait(duration)) => {
                trace!("Waiting {duration:?}");
                Pause::Delay(duration)
            }
            // A pending task that raised no signal is treated as a step
            Some(Signal::Step) | None if self.config.step_delay > MIN_STEP_DELAY => {
                Pause::Delay(self.config.step_delay)
            }
            Some(Signal::Step) | None => Pause::Frame,
        }
    }

    /// Drops the suspended chain without firing either callback.
    pub fn cancel(&mut self) {
        if self.task.take().is_some() {
            info!("Execution cancelled");
        }
        self.on_error = None;
        self.on_complete = None;
    }

    /// Runs to the end without pausing.
    pub fn drain(&mut self) -> Outcome {
        loop {
            match self.resume() {
                Progress::Suspended(_) => continue,
                Progress::Completed => return Outcome::Completed,
                Progress::Failed(e) => return Outcome::Failed(e),
                Progress::Finished => return Outcome::Cancelled,
            }
        }
    }

    /// Runs to the end on the current thread, sleeping through pauses.
    pub fn run_blocking(&mut self, cancel: &CancelToken) -> Outcome {
        loop {
            if cancel.is_cancelled() {
                self.cancel();
                return Outcome::Cancelled;
            }
            match self.resume() {
                Progress::Suspended(pause) => pause.wait_blocking(),
                Progress::Completed => return Outcome::Completed,
                Progress::Failed(e) => return Outcome::Failed(e),
                Progress::Finished => return Outcome::Cancelled,
            }
        }
    }

    /// Runs to the end on a tokio runtime, honouring pauses with timers.
    pub async fn run(&mut self, cancel: &CancelToken) -> Outcome {
        loop {
            if cancel.is_cancelled() {
                self.cancel();
                return Outcome::Cancelled;
            }
            match self.resume() {
                Progress::Suspended(pause) => pause.wait().await,
                Progress::Completed => return Outcome::Completed,
                Progress::Failed(e) => return Outcome::Failed(e),
                Progress::Finished => return Outcome::Cancelled,
            }
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("finished", &self.is_finished())
            .field("config", &self.config)
            .finish()
    }
}
