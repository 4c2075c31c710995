//! Dev slot sandbox CLI.
//!
//! Instruction sets are flat text files of labeled code fragments ("slots")
//! under a sandbox root. `slotrun run` executes a batch of slots and prints
//! a JSON report; the remaining subcommands administer sets, slots, and the
//! hash-sharded artifact store.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use slotrun::batch::{BatchErrorCode, BatchRequest, run_batch};
use slotrun::exec::process::ProcessStrategy;
use slotrun::exec::template::TemplateStrategy;
use slotrun::exit_codes;
use slotrun::io::config::{StrategyKind, load_config};
use slotrun::io::paths::SandboxPaths;
use slotrun::io::sets::SetStore;
use slotrun::io::shard::ShardStore;
use slotrun::logging;

#[derive(Parser)]
#[command(
    name = "slotrun",
    version,
    about = "Dev slot sandbox: batch-run labeled code fragments"
)]
struct Cli {
    /// Sandbox root directory (holds sets/, store/, slotrun.toml).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a batch of slots and print the JSON report.
    Run {
        /// Set name, with or without `.txt`.
        set: String,
        /// Identifier expression, e.g. `0,2-4,8`.
        ids: String,
        /// Call parameter, repeatable.
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// Administer instruction sets.
    #[command(subcommand)]
    Sets(SetsCommand),
    /// Administer slots within a set.
    #[command(subcommand)]
    Slots(SlotsCommand),
    /// Administer the artifact store.
    #[command(subcommand)]
    Store(StoreCommand),
}

#[derive(Subcommand)]
enum SetsCommand {
    /// List set file names.
    List,
    /// Create a set seeded with one empty slot.
    Create { name: String },
    /// Delete a set.
    Delete { name: String },
}

#[derive(Subcommand)]
enum SlotsCommand {
    /// List slot ids in a set.
    List { set: String },
    /// Print one slot's code.
    Show { set: String, id: u32 },
    /// Replace or add one slot. Reads code from stdin when absent.
    Save {
        set: String,
        id: u32,
        code: Option<String>,
    },
    /// Add an empty slot.
    Create { set: String, id: u32 },
    /// Delete one slot.
    Delete { set: String, id: u32 },
    /// Add every id an expression resolves to as empty slots.
    BulkCreate { set: String, ids: String },
    /// Delete every id an expression resolves to.
    BulkDelete { set: String, ids: String },
}

#[derive(Subcommand)]
enum StoreCommand {
    /// Pre-create the first shard level.
    Init,
    /// Move files into the store, deriving slugs from file names.
    Seed {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the sharded path for a slug without creating anything.
    Path { slug: String },
    /// Print the public URL for a slug.
    Url {
        slug: String,
        #[arg(long, default_value = "/store")]
        base: String,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let paths = SandboxPaths::new(&cli.root);
    let result = match cli.command {
        Command::Run { set, ids, params } => cmd_run(&paths, &set, &ids, &params),
        Command::Sets(command) => cmd_sets(&paths, command).map(|()| exit_codes::OK),
        Command::Slots(command) => cmd_slots(&paths, command).map(|()| exit_codes::OK),
        Command::Store(command) => cmd_store(&paths, command),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    }
}

/// Execute a batch with the configured strategy and print the report.
///
/// Batch-fatal errors print a JSON error document instead and map onto the
/// stable exit codes; per-slot failures are part of the report and exit OK.
fn cmd_run(paths: &SandboxPaths, set: &str, ids: &str, params: &[String]) -> Result<i32> {
    let request = BatchRequest {
        set: set.to_string(),
        ids: ids.to_string(),
        params: parse_params(params)?,
    };
    let config = load_config(&paths.config_path)?;
    let sets = SetStore::new(&paths.sets_dir);
    let store = ShardStore::new(&paths.store_dir);

    let outcome = match config.strategy {
        StrategyKind::Template => {
            let strategy = TemplateStrategy::new(config.template_fuel);
            run_batch(&sets, &store, &strategy, &config, &request)
        }
        StrategyKind::Process => {
            let strategy = ProcessStrategy::new(config.interpreter.clone());
            run_batch(&sets, &store, &strategy, &config, &request)
        }
    };

    match outcome {
        Ok(report) => {
            println!("{}", to_pretty_json(&report)?);
            Ok(exit_codes::OK)
        }
        Err(err) => {
            println!("{}", to_pretty_json(&err)?);
            Ok(match err.code {
                BatchErrorCode::UnknownSet => exit_codes::NOT_FOUND,
                BatchErrorCode::NoValidIds => exit_codes::INVALID,
                BatchErrorCode::Internal => exit_codes::FAULT,
            })
        }
    }
}

fn cmd_sets(paths: &SandboxPaths, command: SetsCommand) -> Result<()> {
    let sets = SetStore::new(&paths.sets_dir);
    match command {
        SetsCommand::List => {
            for name in sets.list()? {
                println!("{}", name);
            }
        }
        SetsCommand::Create { name } => {
            let file_name = sets.create(&name)?;
            println!("created {}", file_name);
        }
        SetsCommand::Delete { name } => {
            sets.delete(&name)?;
            println!("deleted {}", name);
        }
    }
    Ok(())
}

fn cmd_slots(paths: &SandboxPaths, command: SlotsCommand) -> Result<()> {
    let sets = SetStore::new(&paths.sets_dir);
    match command {
        SlotsCommand::List { set } => {
            for id in sets.slot_ids(&set)? {
                println!("{}", id);
            }
        }
        SlotsCommand::Show { set, id } => {
            println!("{}", sets.load_slot(&set, id)?);
        }
        SlotsCommand::Save { set, id, code } => {
            let code = match code {
                Some(code) => code,
                None => read_stdin()?,
            };
            sets.save_slot(&set, id, &code)?;
            println!("saved slot {} in {}", id, set);
        }
        SlotsCommand::Create { set, id } => {
            sets.create_slot(&set, id)?;
            println!("created slot {} in {}", id, set);
        }
        SlotsCommand::Delete { set, id } => {
            sets.delete_slot(&set, id)?;
            println!("deleted slot {} in {}", id, set);
        }
        SlotsCommand::BulkCreate { set, ids } => {
            let outcome = sets.bulk_create_slots(&set, &ids)?;
            println!(
                "created {:?} skipped {:?} in {}",
                outcome.created, outcome.skipped, set
            );
        }
        SlotsCommand::BulkDelete { set, ids } => {
            let outcome = sets.bulk_delete_slots(&set, &ids)?;
            println!(
                "deleted {:?} missing {:?} in {}",
                outcome.deleted, outcome.missing, set
            );
        }
    }
    Ok(())
}

/// Administer the artifact store.
///
/// `seed` ingests each file independently: a failure is reported on stderr
/// and the remaining files still land, with any failure turning the exit
/// code non-zero.
fn cmd_store(paths: &SandboxPaths, command: StoreCommand) -> Result<i32> {
    let store = ShardStore::new(&paths.store_dir);
    match command {
        StoreCommand::Init => {
            let created = store.init()?;
            println!("created {} shard dirs under {}", created, store.root().display());
        }
        StoreCommand::Seed { files } => {
            let mut failed = false;
            for file in &files {
                match store.ingest(file) {
                    Ok(artifact) => println!("{} -> {}", artifact.slug, artifact.path.display()),
                    Err(err) => {
                        eprintln!("{:#}", err);
                        failed = true;
                    }
                }
            }
            if failed {
                return Ok(exit_codes::INVALID);
            }
        }
        StoreCommand::Path { slug } => {
            println!("{}", store.locate(&slug, false)?.display());
        }
        StoreCommand::Url { slug, base } => {
            println!("{}", store.url_for(&slug, &base)?);
        }
    }
    Ok(exit_codes::OK)
}

/// Parse repeated `key=value` arguments into a parameter map.
fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("parameter '{}' is not key=value", entry);
        };
        if key.is_empty() {
            bail!("parameter '{}' has an empty key", entry);
        }
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

fn read_stdin() -> Result<String> {
    let mut code = String::new();
    std::io::stdin()
        .read_to_string(&mut code)
        .context("read code from stdin")?;
    Ok(code)
}

/// Serialize to pretty-printed JSON; `println!` supplies the newline.
fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize report")
}
