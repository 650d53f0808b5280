use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use hexicript::cli::{self, ConfigFile, CliArgs};
use hexicript::config::{self, EngineConfig};
use hexicript::console::ConsoleHost;
use hexicript::{Entity, EventKind, ExecutionContext, ExecutionResult, ScriptEngine, Value};

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("hexicript: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };

    // ── Config (before logging: the file may turn on debug) ──────────────────
    let config = load_config(&args.config);

    let level = if args.debug || config.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .format_timestamp(None)
        .init();

    let host = Arc::new(ConsoleHost::new());
    let actor: Option<Entity> = args.player.as_deref().map(|name| host.join(name));

    let engine = match ScriptEngine::new(config, host) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("hexicript: {e}");
            return ExitCode::FAILURE;
        }
    };

    let failed = run(&engine, &args, actor);

    if args.summary {
        for name in engine.script_names() {
            if let Ok(script) = engine.script(&name) {
                println!("{}", script.summary());
            }
        }
        let stats = engine.stats();
        println!(
            "{} scripts, {} executions, average {:?}",
            stats.scripts, stats.total_executions, stats.average_time
        );
    }

    engine.shutdown();
    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn load_config(choice: &ConfigFile) -> EngineConfig {
    let path = match choice {
        ConfigFile::Skip => return EngineConfig::default(),
        ConfigFile::Explicit(p) => Some(p.clone()),
        ConfigFile::Search => config::find_user_config(),
    };
    let Some(path) = path else {
        return EngineConfig::default();
    };
    match EngineConfig::load_file(&path) {
        Ok((config, errors)) => {
            for e in errors {
                eprintln!("hexicript: {}: {e}", path.display());
            }
            config
        }
        Err(e) => {
            eprintln!("hexicript: warning: {}: {e}", path.display());
            EngineConfig::default()
        }
    }
}

/// Load, then run whatever the arguments ask for.  Returns whether anything
/// failed.
fn run(engine: &ScriptEngine, args: &CliArgs, actor: Option<Entity>) -> bool {
    let mut failed = false;

    for path in script_files(&args.paths, &engine.config().script_extension) {
        match engine.load_file(&path) {
            Ok(script) => {
                for warning in script.warnings() {
                    eprintln!("hexicript: {}: {warning}", path.display());
                }
            }
            Err(e) => {
                eprintln!("hexicript: {e}");
                failed = true;
            }
        }
    }

    let triggered = args.code.is_some() || !args.events.is_empty() || !args.commands.is_empty();

    if let Some(code) = &args.code {
        match engine.execute_inline(code, actor.clone()) {
            Ok(result) => failed |= report("-c", &result),
            Err(e) => {
                eprintln!("hexicript: {e}");
                failed = true;
            }
        }
    }

    for event in &args.events {
        let kind = match event.parse::<EventKind>() {
            Ok(k) => k,
            Err(e) => {
                eprintln!("hexicript: {e}");
                failed = true;
                continue;
            }
        };
        match engine.dispatch_event(&kind, Value::default(), actor.clone()) {
            Ok(report) => {
                for error in &report.errors {
                    eprintln!("hexicript: {error}");
                }
                failed |= !report.errors.is_empty();
                if report.cancelled {
                    println!("event {kind} cancelled");
                }
            }
            Err(e) => {
                eprintln!("hexicript: {e}");
                failed = true;
            }
        }
    }

    for command in &args.commands {
        match engine.dispatch_command(command, actor.clone()) {
            Ok(Some(result)) => failed |= report(command, &result),
            Ok(None) => eprintln!("hexicript: no script handles {command}"),
            Err(e) => {
                eprintln!("hexicript: {e}");
                failed = true;
            }
        }
    }

    // Nothing to trigger: run every loaded script once from the top.
    if !triggered {
        for name in engine.script_names() {
            let mut ctx = ExecutionContext::new(actor.clone());
            match engine.execute_named(&name, &mut ctx) {
                Ok(result) => failed |= report(&name, &result),
                Err(e) => {
                    eprintln!("hexicript: {e}");
                    failed = true;
                }
            }
        }
    }

    failed
}

/// Print a non-success result.  Returns whether it was an error.
fn report(what: &str, result: &ExecutionResult) -> bool {
    if let Some(error) = result.describe_error() {
        eprintln!("hexicript: {what}: {error}");
        return true;
    }
    match result {
        ExecutionResult::Success { .. } => false,
        other => {
            println!("{what}: {other}");
            false
        }
    }
}

/// Expand directories into their script files, sorted by name.
fn script_files(paths: &[PathBuf], extension: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        match std::fs::read_dir(path) {
            Ok(entries) => {
                let mut found: Vec<PathBuf> = entries
                    .filter_map(Result::ok)
                    .map(|e| e.path())
                    .filter(|p| has_extension(p, extension))
                    .collect();
                found.sort();
                files.extend(found);
            }
            Err(e) => eprintln!("hexicript: {}: {e}", path.display()),
        }
    }
    files
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy() == extension.trim_start_matches('.'))
}
