use std::{collections::BTreeMap, time::Duration};

use futures::FutureExt;
use log::{error, info, warn};

use crate::{
    compile,
    console::Console,
    driver::{CancelToken, Driver, DriverConfig, Outcome, Progress},
    host::HostBridge,
    interpret::Interpreter,
    suspend::Yielder,
    tracker::ExecutionTracker,
    ScriptError,
};

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Prefix for reported errors, `@<name>: <message>`
    pub name: String,
    pub step_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: "main_script.py".to_string(),
            step_delay: DriverConfig::default().step_delay,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunnerState {
    Reset,
    Running,
}

/// Owns one script's run lifecycle: compile, scene reset, paced execution,
/// error reporting and progress events.
#[derive(Debug)]
pub struct ScriptRunner {
    config: RunnerConfig,
    host: HostBridge,
    tracker: ExecutionTracker,
    console: Console,
    state: RunnerState,
    driver: Option<Driver>,
    interpreter: Option<Interpreter>,
    error_log: Vec<String>,
}

impl ScriptRunner {
    pub fn new(
        config: RunnerConfig,
        host: HostBridge,
        tracker: ExecutionTracker,
        console: Console,
    ) -> Self {
        Self {
            config,
            host,
            tracker,
            console,
            state: RunnerState::Reset,
            driver: None,
            interpreter: None,
            error_log: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunnerState::Running
    }

    /// The interpreter of the latest run, kept after it ends.
    pub fn interpreter(&self) -> Option<&Interpreter> {
        self.interpreter.as_ref()
    }

    pub fn error_log(&self) -> &[String] {
        &self.error_log
    }

    pub fn clear_error_log(&mut self) {
        self.error_log.clear();
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            step_delay: self.config.step_delay,
        }
    }

    /// Starts a fresh run of `source`, stopping any run in progress. The
    /// scene is reset before the first statement executes.
    pub fn run(&mut self, source: &str) -> Result<(), ScriptError> {
        self.stop();
        self.error_log.clear();
        let program = match compile(source) {
            Ok(program) => program,
            Err(e) => {
                self.report(&e.to_string());
                self.tracker.stopped();
                return Err(e);
            }
        };

        let interpreter = Interpreter::new(
            self.host.clone(),
            self.tracker.clone(),
            self.console.clone(),
        );
        let yielder = interpreter.yielder();
        let reset = self.host.reset_scene(yielder.clone());
        let execution = interpreter.execute(program);
        let task = async move {
            reset.await;
            execution.await
        }
        .boxed_local();

        self.driver = Some(Driver::new(task, yielder, self.driver_config()));
        self.interpreter = Some(interpreter);
        self.state = RunnerState::Running;
        info!("@{}: execution started", self.config.name);
        self.tracker.started();
        Ok(())
    }

    /// Advances the current run by one step.
    pub fn pump(&mut self) -> Progress {
        let Some(driver) = self.driver.as_mut() else {
            return Progress::Finished;
        };
        let progress = driver.resume();
        match &progress {
            Progress::Suspended(_) => {}
            Progress::Completed => {
                info!("@{}: execution completed", self.config.name);
                self.finish();
            }
            Progress::Failed(e) => {
                self.report(&e.to_string());
                self.finish();
            }
            Progress::Finished => self.finish(),
        }
        progress
    }

    /// Cancels the run in progress. Partial effects of the script persist.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        if let Some(mut driver) = self.driver.take() {
            driver.cancel();
        }
        self.report("Execution stopped by user");
        self.finish();
        true
    }

    /// Stops any run and hands back a driver for the host scene reset.
    pub fn reset(&mut self) -> Driver {
        self.stop();
        let yielder = Yielder::new();
        let reset = self.host.reset_scene(yielder.clone());
        let console = self.console.clone();
        Driver::new(
            async move {
                reset.await;
                Ok(())
            }
            .boxed_local(),
            yielder,
            self.driver_config(),
        )
        .on_complete(move || console.info("Script reset has been made"))
    }

    pub async fn run_to_end(&mut self, cancel: &CancelToken) -> Outcome {
        loop {
            if cancel.is_cancelled() {
                self.stop();
                return Outcome::Cancelled;
            }
            match self.pump() {
                Progress::Suspended(pause) => pause.wait().await,
                progress => return Self::outcome(progress),
            }
        }
    }

    pub fn run_blocking(&mut self, cancel: &CancelToken) -> Outcome {
        loop {
            if cancel.is_cancelled() {
                self.stop();
                return Outcome::Cancelled;
            }
            match self.pump() {
                Progress::Suspended(pause) => pause.wait_blocking(),
                progress => return Self::outcome(progress),
            }
        }
    }

    fn outcome(progress: Progress) -> Outcome {
        match progress {
            Progress::Completed => Outcome::Completed,
            Progress::Failed(e) => Outcome::Failed(e),
            Progress::Suspended(_) | Progress::Finished => Outcome::Cancelled,
        }
    }

    fn finish(&mut self) {
        self.driver = None;
        if self.is_running() {
            self.state = RunnerState::Reset;
            self.tracker.stopped();
        }
    }

    fn report(&mut self, message: &str) {
        let line = format!("@{}: {message}", self.config.name);
        error!("{line}");
        self.console.error(line.clone());
        self.error_log.push(line);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunnerId(usize);

/// Keeps at most one of its runners running at a time.
#[derive(Debug, Default)]
pub struct ScriptManager {
    runners: BTreeMap<RunnerId, ScriptRunner>,
    current: Option<RunnerId>,
    next_id: usize,
}

impl ScriptManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, runner: ScriptRunner) -> RunnerId {
        let id = RunnerId(self.next_id);
        self.next_id += 1;
        self.runners.insert(id, runner);
        id
    }

    pub fn runner(&self, id: RunnerId) -> Option<&ScriptRunner> {
        self.runners.get(&id)
    }

    pub fn runner_mut(&mut self, id: RunnerId) -> Option<&mut ScriptRunner> {
        self.runners.get_mut(&id)
    }

    /// Stops every runner, then starts `id` on `source`. Unknown ids are
    /// ignored.
    pub fn start(&mut self, id: RunnerId, source: &str) -> Result<(), ScriptError> {
        self.stop_all();
        let Some(runner) = self.runners.get_mut(&id) else {
            warn!("No runner registered as {id:?}");
            return Ok(());
        };
        runner.run(source)?;
        self.current = Some(id);
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for runner in self.runners.values_mut() {
            runner.stop();
        }
        self.current = None;
    }

    /// Stops everything and clears the error logs. Returns one scene reset
    /// driver per runner.
    pub fn reset_all(&mut self) -> Vec<Driver> {
        self.current = None;
        self.runners
            .values_mut()
            .map(|runner| {
                let driver = runner.reset();
                runner.clear_error_log();
                driver
            })
            .collect()
    }

    /// Advances the running script, forgetting it once it finishes.
    pub fn pump(&mut self) -> Option<Progress> {
        let id = self.current?;
        let Some(runner) = self.runners.get_mut(&id) else {
            self.current = None;
            return None;
        };
        let progress = runner.pump();
        if !matches!(progress, Progress::Suspended(_)) {
            self.current = None;
        }
        Some(progress)
    }

    pub fn current(&self) -> Option<RunnerId> {
        self.current
    }

    pub fn is_any_running(&self) -> bool {
        self.runners.values().any(ScriptRunner::is_running)
    }

    pub fn remove(&mut self, id: RunnerId) -> Option<ScriptRunner> {
        if self.current == Some(id) {
            self.current = None;
        }
        let mut runner = self.runners.remove(&id)?;
        runner.stop();
        Some(runner)
    }
}
