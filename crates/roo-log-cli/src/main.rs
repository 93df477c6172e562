use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use roo_log_api::{AddGoodRequest, RooLogApi};
use roo_log_reddit::{RedditAuthority, DEFAULT_BASE_URL};
use roo_log_store_sqlite::SqliteStore;
use serde_json::Value;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "roolog")]
#[command(about = "Switcharoo chain log maintenance CLI")]
struct Cli {
    #[arg(long, default_value = "./roo_log.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    Log {
        #[command(subcommand)]
        command: LogCommand,
    },
    Verify {
        #[command(subcommand)]
        command: VerifyCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    Backup(DbBackupArgs),
    Restore(DbRestoreArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct DbRestoreArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
enum LogCommand {
    AddGood(AddGoodArgs),
    AddLast(AddLastArgs),
    Show(ShowArgs),
    Export(ExportArgs),
    Import(ImportArgs),
}

#[derive(Debug, Args)]
struct AddGoodArgs {
    #[arg(long)]
    thread_id: String,
    #[arg(long)]
    comment_id: String,
    #[arg(long)]
    comment_url: String,
    #[arg(long)]
    submission_url: String,
    #[arg(long)]
    submission_id: String,
}

#[derive(Debug, Args)]
struct AddLastArgs {
    #[arg(long)]
    submission_url: String,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[arg(long, default_value_t = 0)]
    index: usize,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(long = "in")]
    input: PathBuf,
    #[arg(long, default_value_t = false)]
    enforce_limit: bool,
}

#[derive(Debug, Subcommand)]
enum VerifyCommand {
    Head(AuthorityArgs),
    Settled(AuthorityArgs),
}

#[derive(Debug, Args)]
struct AuthorityArgs {
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    api_base: String,
    #[arg(long, default_value = "roolog/0.1 (chain log maintenance)")]
    user_agent: String,
}

impl AuthorityArgs {
    fn authority(&self) -> RedditAuthority {
        RedditAuthority::new(self.api_base.clone(), self.user_agent.clone())
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = RooLogApi::new(cli.db.clone());
    match cli.command {
        Command::Db { command } => run_db(command, &cli.db, &api),
        Command::Log { command } => run_log(command, &api),
        Command::Verify { command } => run_verify(command, &api),
    }
}

fn run_db(command: DbCommand, db_path: &Path, api: &RooLogApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(serde_json::to_value(result)?)
        }
        DbCommand::Backup(args) => {
            let store = SqliteStore::open(db_path)?;
            store.backup_database(&args.out)?;
            emit_json(serde_json::json!({
                "backed_up_to": args.out.display().to_string()
            }))
        }
        DbCommand::Restore(args) => {
            let mut store = SqliteStore::open(db_path)?;
            store.restore_database(&args.input)?;
            emit_json(serde_json::json!({
                "restored_from": args.input.display().to_string()
            }))
        }
    }
}

fn run_log(command: LogCommand, api: &RooLogApi) -> Result<()> {
    match command {
        LogCommand::AddGood(args) => {
            let record = api.add_good(AddGoodRequest {
                thread_id: args.thread_id,
                comment_id: args.comment_id,
                comment_url: args.comment_url,
                submission_url: args.submission_url,
                submission_id: args.submission_id,
            })?;
            emit_json(serde_json::to_value(record)?)
        }
        LogCommand::AddLast(args) => {
            let url = api.add_last(args.submission_url)?;
            emit_json(serde_json::json!({ "submission_url": url }))
        }
        LogCommand::Show(args) => {
            let shown = api.show(args.index)?;
            emit_json(serde_json::to_value(shown)?)
        }
        LogCommand::Export(args) => {
            let exported = api.export_snapshot(&args.out)?;
            emit_json(serde_json::to_value(exported)?)
        }
        LogCommand::Import(args) => {
            let imported = api.import_snapshot(&args.input, args.enforce_limit)?;
            emit_json(serde_json::to_value(imported)?)
        }
    }
}

fn run_verify(command: VerifyCommand, api: &RooLogApi) -> Result<()> {
    match command {
        VerifyCommand::Head(args) => {
            let result = api.verify_head(&args.authority())?;
            emit_json(serde_json::to_value(result)?)
        }
        VerifyCommand::Settled(args) => {
            let result = api.verify_settled(&args.authority())?;
            emit_json(serde_json::to_value(result)?)
        }
    }
}
