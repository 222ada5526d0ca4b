//! `tem` command line: replay edit scripts, inspect topics and rules, check submissions

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tem_core::{
    AnnotationSession, IncidentMetadata, MemoryTransport, SessionConfig, StaticOptionSource,
};
use tem_model::{AnnotationRecord, Category, DropdownOption, TaskId};
use tem_rules::{AnnotationEngine, ImpactRuleTable, TaxonomyCatalog};

fn cli() -> Command {
    let options = Arg::new("options")
        .long("options")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON file with the option lists: {\"threat\": [...], \"error\": [...], \"uas\": [...]}");
    let record = Arg::new("record")
        .long("record")
        .value_parser(value_parser!(PathBuf))
        .help("JSON file with an annotation record");
    let rules = Arg::new("rules")
        .long("rules")
        .value_parser(value_parser!(PathBuf))
        .help("YAML impact rule table (built-in table when omitted)");

    Command::new("tem")
        .version(env!("CARGO_PKG_VERSION"))
        .about("TEM annotation engine tools")
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level unless RUST_LOG is set"),
        )
        .subcommand(
            Command::new("replay")
                .about("Replay an edit script against a record and save it")
                .arg(options.clone())
                .arg(record.clone())
                .arg(rules.clone())
                .arg(
                    Arg::new("edits")
                        .long("edits")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON array of partial records, applied in order"),
                )
                .arg(
                    Arg::new("task")
                        .long("task")
                        .default_value("task-1")
                        .help("Task id of a new record when --record is omitted"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("YAML session configuration"),
                )
                .arg(
                    Arg::new("debounce-ms")
                        .long("debounce-ms")
                        .value_parser(value_parser!(u64))
                        .help("Override the debounce window"),
                )
                .arg(
                    Arg::new("gap-ms")
                        .long("gap-ms")
                        .default_value("0")
                        .value_parser(value_parser!(u64))
                        .help("Pause between edits"),
                ),
        )
        .subcommand(
            Command::new("topics")
                .about("Print the derived training topics of a record")
                .arg(options.clone())
                .arg(record.clone().required(true)),
        )
        .subcommand(
            Command::new("rules")
                .about("Print the management to impact rule table")
                .arg(rules.clone())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a record is ready for submission")
                .arg(options)
                .arg(record.required(true))
                .arg(rules),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    match matches.subcommand() {
        Some(("replay", args)) => replay(args).await,
        Some(("topics", args)) => topics(args),
        Some(("rules", args)) => rules(args),
        Some(("validate", args)) => {
            let ready = validate(args)?;
            std::process::exit(if ready { 0 } else { 1 });
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn replay(args: &ArgMatches) -> Result<()> {
    let options = read_options(required_path(args, "options")?)?;

    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::new(),
    };
    if let Some(debounce_ms) = args.get_one::<u64>("debounce-ms") {
        config = config.with_debounce_ms(*debounce_ms);
    }
    if let Some(path) = args.get_one::<PathBuf>("rules") {
        config = config.with_rules_path(path);
    }
    let gap = Duration::from_millis(args.get_one::<u64>("gap-ms").copied().unwrap_or(0));

    let edits = match read_json(required_path(args, "edits")?)? {
        Value::Array(edits) => edits,
        other => vec![other],
    };

    let transport = Arc::new(MemoryTransport::new());
    let mut session = match args.get_one::<PathBuf>("record") {
        Some(path) => {
            let engine = AnnotationEngine::new(
                Arc::new(TaxonomyCatalog::from_options(options)),
                Arc::new(load_rules(config.rules_path.as_deref())?),
            );
            AnnotationSession::start(
                engine,
                read_record(path)?,
                IncidentMetadata::default(),
                transport.clone(),
                &config,
            )?
        }
        None => {
            let task = args
                .get_one::<String>("task")
                .cloned()
                .unwrap_or_else(|| "task-1".to_string());
            AnnotationSession::open(
                TaskId::new(task),
                config,
                Arc::new(StaticOptionSource::new(options)),
                transport.clone(),
            )
            .await?
        }
    };

    for (index, edit) in edits.iter().enumerate() {
        let outcome = session
            .apply_json(edit)
            .with_context(|| format!("edit #{index}"))?;
        tracing::info!(index, changed = outcome.patch.len(), repaired = outcome.repaired, "edit applied");
        if !gap.is_zero() {
            tokio::time::sleep(gap).await;
        }
    }

    let outcome = session.save_now().await?;
    tracing::info!(?outcome, "final save");

    let report = json!({
        "record": session.record(),
        "status": session.status(),
        "topics": session.topics(),
        "history": session.status_history(),
        "save_calls": transport.save_calls().len(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    session.teardown().await;
    Ok(())
}

fn topics(args: &ArgMatches) -> Result<()> {
    let catalog = TaxonomyCatalog::from_options(read_options(required_path(args, "options")?)?);
    let engine = AnnotationEngine::new(Arc::new(catalog), Arc::new(ImpactRuleTable::builtin()));
    let loaded = engine.load(read_record(required_path(args, "record")?)?);
    println!("{}", serde_json::to_string_pretty(&loaded.topics)?);
    Ok(())
}

fn rules(args: &ArgMatches) -> Result<()> {
    let table = load_rules(args.get_one::<PathBuf>("rules").map(PathBuf::as_path))?;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        print!("{}", serde_yaml::to_string(&table)?);
    }
    Ok(())
}

fn validate(args: &ArgMatches) -> Result<bool> {
    let catalog = TaxonomyCatalog::from_options(read_options(required_path(args, "options")?)?);
    let rules = load_rules(args.get_one::<PathBuf>("rules").map(PathBuf::as_path))?;
    let engine = AnnotationEngine::new(Arc::new(catalog), Arc::new(rules));
    let loaded = engine.load(read_record(required_path(args, "record")?)?);

    match tem_rules::validate_submission(&loaded.record, engine.catalog(), engine.rules()) {
        Ok(()) => {
            println!("ready for submission");
            Ok(true)
        }
        Err(e) => {
            println!("not ready: {} field(s) missing", e.missing.len());
            for missing in &e.missing {
                println!("  - {missing}");
            }
            Ok(false)
        }
    }
}

fn required_path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("--{name} is required"))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn read_options(path: &Path) -> Result<HashMap<Category, Vec<DropdownOption>>> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("{} is not an option list document", path.display()))
}

fn read_record(path: &Path) -> Result<AnnotationRecord> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("{} is not an annotation record", path.display()))
}

fn load_rules(path: Option<&Path>) -> Result<ImpactRuleTable> {
    match path {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(ImpactRuleTable::from_yaml_str(&yaml)?)
        }
        None => Ok(ImpactRuleTable::builtin()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn replay_requires_options_and_edits() {
        assert!(cli().try_get_matches_from(["tem", "replay"]).is_err());
        let matches = cli()
            .try_get_matches_from([
                "tem", "-v", "replay", "--options", "o.json", "--edits", "e.json", "--gap-ms", "10",
            ])
            .unwrap();
        assert!(matches.get_flag("verbose"));
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "replay");
        assert_eq!(args.get_one::<u64>("gap-ms"), Some(&10));
        assert_eq!(args.get_one::<String>("task").map(String::as_str), Some("task-1"));
    }
}
