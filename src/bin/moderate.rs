use anyhow::{Context, Result};
use mindgate_lib::services::{ConfigStore, ModerationConfig};
use mindgate_lib::{build_engine, init_logging};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read stdin failed")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("read {} failed", path))
}

fn load_config(args: &[String]) -> Result<ModerationConfig> {
    let store = match parse_arg_value(args, "--config") {
        Some(path) => ConfigStore::from_file(&PathBuf::from(path)),
        None => match ConfigStore::default_config_dir() {
            Some(dir) => ConfigStore::new(dir),
            None => return Ok(ModerationConfig::default().with_env_overrides()),
        },
    };
    let config = store
        .load()
        .with_context(|| format!("load {} failed", store.config_file().display()))?;
    Ok(config.with_env_overrides())
}

fn run(args: &[String]) -> Result<bool> {
    let path = &args[1];
    let content = read_input(path)?;
    let config = load_config(args)?;

    let engine = build_engine(&config)?;
    engine.warm_up().context("model loading failed")?;
    let record = engine.decide(&content).context("moderation failed")?;

    let json = if has_flag(args, "--pretty") {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    println!("{}", json);
    Ok(record.valid)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1].starts_with("--") {
        eprintln!(
            "Usage:\n  moderate <path|-> [--config <config.json>] [--pretty]\n\nExit codes: 0 allowed, 2 blocked, 1 engine failure.\nEnvironment: MINDGATE_INFERENCE_URL, MINDGATE_MODEL_DIR, MINDGATE_LOG_DIR, MINDGATE_DISABLE_FILE_LOG=1."
        );
        return ExitCode::from(1);
    }

    init_logging();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
