use std::process::ExitCode;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use taskline_core::logging::init_tracing;
use taskline_core::models::CoreError;
use taskline_core::orchestration::{Hook, Operation, OrchestrationResult};
use taskline_core::plan::RunPlan;
use taskline_core::registry::OperationRegistry;

const USAGE: &str = "usage: taskline [--linger <ms>] <plan.json> | taskline --operations

Fire-and-forget tasks still running when the run resolves get up to
--linger milliseconds (default 2000) to finish; whatever is left after
that is cancelled when the process exits.";

const DEFAULT_LINGER: Duration = Duration::from_millis(2000);

#[derive(Debug, PartialEq, Eq)]
enum Command {
    ListOperations,
    Run { plan: String, linger: Duration },
}

fn parse_command(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    let mut linger = DEFAULT_LINGER;
    let mut plan = None;

    while let Some(argument) = args.next() {
        match argument.as_str() {
            "--operations" => return Ok(Command::ListOperations),
            "--linger" => {
                let raw = args
                    .next()
                    .ok_or_else(|| "--linger needs a value in milliseconds".to_string())?;
                let ms: u64 = raw
                    .parse()
                    .map_err(|_| format!("invalid --linger value '{raw}'"))?;
                linger = Duration::from_millis(ms);
            }
            _ if plan.is_none() => plan = Some(argument),
            _ => return Err(format!("unexpected argument '{argument}'")),
        }
    }

    plan.map(|plan| Command::Run { plan, linger })
        .ok_or_else(|| "missing plan file".to_string())
}

/// Waits until no spawned task is alive on the current runtime, or `linger`
/// has passed. Returns the number of tasks still alive.
async fn drain_detached(linger: Duration) -> usize {
    let metrics = tokio::runtime::Handle::current().metrics();
    let deadline = tokio::time::Instant::now() + linger;

    loop {
        let alive = metrics.num_alive_tasks();
        if alive == 0 || tokio::time::Instant::now() >= deadline {
            return alive;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[derive(Deserialize)]
struct SleepArgs {
    ms: u64,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Deserialize)]
struct MessageArgs {
    message: String,
}

fn parse_args<T: for<'de> Deserialize<'de>>(operation: &str, args: &Value) -> OrchestrationResult<T> {
    serde_json::from_value(args.clone()).map_err(|error| {
        CoreError::invalid_argument(format!("invalid arguments for '{operation}': {error}"))
    })
}

fn builtin_registry() -> OrchestrationResult<OperationRegistry> {
    let mut registry = OperationRegistry::new();

    registry.register("sleep", |args| {
        let SleepArgs { ms, label } = parse_args("sleep", args)?;
        Ok(Operation::future(move || async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            tracing::info!(ms, label = label.as_deref().unwrap_or("sleep"), "slept");
            Ok(())
        }))
    })?;

    registry.register("log", |args| {
        let MessageArgs { message } = parse_args("log", args)?;
        Ok(Operation::blocking(move || {
            tracing::info!(task_id = ?taskline_core::current_task_id(), "{message}");
            Ok(())
        }))
    })?;

    registry.register("fail", |args| {
        let MessageArgs { message } = parse_args("fail", args)?;
        Ok(Operation::future(move || async move {
            Err(CoreError::operation_failed(message))
        }))
    })?;

    Ok(registry)
}

async fn run_plan(raw: &str) -> Result<(), (ExitCode, CoreError)> {
    let registry = builtin_registry().map_err(|error| (ExitCode::from(2), error))?;
    let plan = RunPlan::from_json_str(raw).map_err(|error| (ExitCode::from(2), error))?;

    let mut handler = plan
        .handler()
        .initializer(Hook::blocking(|| {
            tracing::info!("run starting");
            Ok(())
        }))
        .finisher(Hook::blocking(|| {
            tracing::info!("run finished");
            Ok(())
        }));

    let handles = plan
        .load_into(&mut handler, &registry)
        .map_err(|error| (ExitCode::from(2), error))?;
    tracing::info!(tasks = handles.len(), slots = handler.queue().len(), "plan loaded");

    handler
        .run()
        .await
        .map(|_| ())
        .map_err(|error| (ExitCode::from(1), error))
}

fn main() -> ExitCode {
    init_tracing("info");

    let (plan_path, linger) = match parse_command(std::env::args().skip(1)) {
        Ok(Command::Run { plan, linger }) => (plan, linger),
        Ok(Command::ListOperations) => {
            return match builtin_registry() {
                Ok(registry) => {
                    for name in registry.names() {
                        println!("{name}");
                    }
                    ExitCode::SUCCESS
                }
                Err(error) => {
                    eprintln!("{error}");
                    ExitCode::from(2)
                }
            };
        }
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let raw = match std::fs::read_to_string(&plan_path) {
        Ok(raw) => raw,
        Err(error) => {
            eprintln!("failed to read plan '{plan_path}': {error}");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to create tokio runtime: {error}");
            return ExitCode::from(1);
        }
    };

    let (outcome, abandoned) = runtime.block_on(async {
        let outcome = run_plan(&raw).await;
        (outcome, drain_detached(linger).await)
    });
    if abandoned > 0 {
        tracing::warn!(abandoned, "fire-and-forget tasks still running at exit");
    }
    runtime.shutdown_timeout(linger);

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err((code, error)) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "run failed");
            code
        }
    }
}
