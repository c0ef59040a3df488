use std::{
    cell::Cell,
    env, fs,
    io::{self, Write},
    process,
    rc::Rc,
    time::Duration,
};

use futures::FutureExt;
use log::info;
use stride_runtime::{
    compile,
    console::{Console, ConsoleConfig},
    driver::{CancelToken, Driver, DriverConfig, Outcome},
    error::{make, ErrorKind, RuntimeError},
    host::{Controller, HostBridge},
    interpret::Interpreter,
    runner::{RunnerConfig, ScriptRunner},
    tracker::ExecutionTracker,
    value::Value,
};

const GRID_SIZE: i64 = 5;

struct Args {
    step_delay: Duration,
    file: Option<String>,
}

fn main() {
    pretty_env_logger::init();
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Usage: stride [--step-delay <seconds>] [FILE]");
            process::exit(2);
        }
    };
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            process::exit(1);
        }
    };
    let code = match &args.file {
        Some(path) => runtime.block_on(run_file(path, args.step_delay)),
        None => runtime.block_on(run_repl(args.step_delay)),
    };
    process::exit(code);
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args {
        step_delay: DriverConfig::default().step_delay,
        file: None,
    };
    while let Some(arg) = args.next() {
        if arg == "--step-delay" {
            let value = args.next().ok_or("Missing value for --step-delay")?;
            let secs = value
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite() && *s >= 0.0)
                .ok_or_else(|| format!("Invalid step delay '{value}'"))?;
            parsed.step_delay = Duration::from_secs_f64(secs);
        } else if parsed.file.is_none() {
            parsed.file = Some(arg);
        } else {
            return Err("Too many arguments".to_string());
        }
    }
    Ok(parsed)
}

fn console() -> Console {
    Console::new(ConsoleConfig {
        echo: true,
        ..ConsoleConfig::default()
    })
}

async fn run_file(path: &str, step_delay: Duration) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read {path}: {e}");
            return 1;
        }
    };
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let mut runner = ScriptRunner::new(
        RunnerConfig { name, step_delay },
        HostBridge::with_controller(grid_walker()),
        ExecutionTracker::new(),
        console(),
    );
    // Compile errors are already reported through the console
    if runner.run(&source).is_err() {
        return 1;
    }
    match runner.run_to_end(&CancelToken::new()).await {
        Outcome::Completed => 0,
        Outcome::Failed(_) | Outcome::Cancelled => 1,
    }
}

async fn run_repl(step_delay: Duration) -> i32 {
    let interpreter = Interpreter::new(
        HostBridge::with_controller(grid_walker()),
        ExecutionTracker::new(),
        console(),
    );
    let config = DriverConfig { step_delay };
    let (stdin, mut stdout) = (io::stdin(), io::stdout());
    let mut code = String::default();
    loop {
        print!("{}", if code.is_empty() { ">>> " } else { "... " });
        if stdout.flush().is_err() {
            return 1;
        }
        let mut line = String::default();
        // If zero bytes are read, then exit (usually triggered by Ctrl-D)
        match stdin.read_line(&mut line) {
            Ok(0) => return 0,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Failed to read line: {e}");
                return 1;
            }
        }
        if line.trim().is_empty() && code.is_empty() {
            continue;
        }
        let opens_block = line.trim_end().ends_with(':');
        let blank = line.trim().is_empty();
        code.push_str(&line);
        // Blocks run once they are closed by a blank line
        if (opens_block || code.lines().count() > 1) && !blank {
            continue;
        }
        let source = std::mem::take(&mut code);
        let program = match compile(&source) {
            Ok(program) => program,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        let mut driver = Driver::new(
            interpreter.execute(program),
            interpreter.yielder(),
            config.clone(),
        );
        if let Outcome::Failed(e) = driver.run(&CancelToken::new()).await {
            eprintln!("{e}");
        }
    }
}

fn direction(args: &[Value]) -> Result<(i64, i64), RuntimeError> {
    let [Value::Str(dir)] = args else {
        return Err(make(
            ErrorKind::ArgumentError,
            "expected one direction: 'up', 'down', 'left' or 'right'",
        ));
    };
    match dir.as_str() {
        "up" => Ok((0, -1)),
        "down" => Ok((0, 1)),
        "left" => Ok((-1, 0)),
        "right" => Ok((1, 0)),
        _ => Err(make(
            ErrorKind::ArgumentError,
            format!("unknown direction '{dir}'"),
        )),
    }
}

fn target(position: (i64, i64), args: &[Value]) -> Result<Option<(i64, i64)>, RuntimeError> {
    let (dx, dy) = direction(args)?;
    let (x, y) = (position.0 + dx, position.1 + dy);
    let inside = (0..GRID_SIZE).contains(&x) && (0..GRID_SIZE).contains(&y);
    Ok(inside.then_some((x, y)))
}

/// A walker on a square grid starting in the top-left corner.
fn grid_walker() -> Controller {
    let position = Rc::new(Cell::new((0, 0)));
    let (moving, probing, resetting) = (position.clone(), position.clone(), position);
    Controller::new("grid")
        .action("move", move |args, yielder| {
            let position = moving.clone();
            async move {
                let Some(next) = target(position.get(), &args)? else {
                    return Err(make(ErrorKind::CommandError, "the walker hit a wall"));
                };
                yielder.step().await;
                position.set(next);
                info!("Walker moved to {next:?}");
                Ok(())
            }
            .boxed_local()
        })
        .predicate("can_move", move |args, _| {
            let result = target(probing.get(), &args).map(|next| next.is_some());
            futures::future::ready(result).boxed_local()
        })
        .on_reset(move |_| {
            resetting.set((0, 0));
            info!("Walker returned to the origin");
            futures::future::ready(()).boxed_local()
        })
}
