use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use case_payment_orders_api::{
    CasePaymentOrderQuery, CasePaymentOrdersApi, CreateCasePaymentOrderRequest, ErrorReport,
    StaticIdentity, UpdateCasePaymentOrderRequest,
};
use case_payment_orders_core::ErrorKind;
use case_payment_orders_store_sqlite::DeleteRequest;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const LOG_ENV: &str = "CPO_LOG";

#[derive(Debug, Parser)]
#[command(name = "cpo")]
#[command(about = "Case Payment Orders CLI")]
struct Cli {
    #[arg(long, default_value = "./case_payment_orders.sqlite3")]
    db: PathBuf,

    /// Identity recorded as `created_by` on new orders.
    #[arg(long, default_value = "cpo-cli")]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Order {
        #[command(subcommand)]
        command: Box<OrderCommand>,
    },
    Uid {
        #[command(subcommand)]
        command: UidCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
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
enum OrderCommand {
    Create(OrderFieldArgs),
    Update(UpdateArgs),
    Get(IdArgs),
    Query(QueryArgs),
    Delete(KeyArgs),
    History(IdArgs),
}

#[derive(Debug, Args)]
struct OrderFieldArgs {
    #[arg(long)]
    case_id: String,
    #[arg(long)]
    order_reference: String,
    #[arg(long)]
    action: String,
    #[arg(long)]
    responsible_party: String,
    /// RFC3339 timestamp.
    #[arg(long, value_parser = parse_rfc3339)]
    effective_from: OffsetDateTime,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[arg(long)]
    id: String,
    #[command(flatten)]
    fields: OrderFieldArgs,
}

#[derive(Debug, Args)]
struct IdArgs {
    #[arg(long)]
    id: String,
}

/// Exactly one of `--id` or `--case-id` must be given, each repeatable.
#[derive(Debug, Args)]
struct KeyArgs {
    #[arg(long = "id")]
    ids: Vec<String>,
    #[arg(long = "case-id")]
    case_ids: Vec<String>,
}

#[derive(Debug, Args)]
struct QueryArgs {
    #[command(flatten)]
    keys: KeyArgs,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    size: Option<u32>,
}

#[derive(Debug, Subcommand)]
enum UidCommand {
    Generate(UidGenerateArgs),
}

#[derive(Debug, Args)]
struct UidGenerateArgs {
    #[arg(long, default_value_t = 1)]
    count: u32,
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

fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let value = serde_json::to_value(value).context("failed to serialize command output")?;
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn emit_error(err: &anyhow::Error) -> ExitCode {
    let report = ErrorReport::from_error(err);
    let body = serde_json::json!({
        "contract_version": CLI_CONTRACT_VERSION,
        "error": &report,
    });
    match serde_json::to_string_pretty(&body) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("{}: {}", report.kind.as_str(), report.message),
    }
    exit_code(report.kind)
}

fn exit_code(kind: ErrorKind) -> ExitCode {
    match kind {
        ErrorKind::Fatal => ExitCode::from(1),
        ErrorKind::Validation => ExitCode::from(2),
        ErrorKind::NotFound => ExitCode::from(3),
        ErrorKind::Conflict => ExitCode::from(4),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => emit_error(&err),
    }
}

fn run(cli: Cli) -> Result<()> {
    tracing::debug!(db = %cli.db.display(), actor = %cli.actor, "running cpo command");
    let api = CasePaymentOrdersApi::new(cli.db);
    match cli.command {
        Command::Db { command } => run_db(*command, &api),
        Command::Order { command } => run_order(*command, &api, &StaticIdentity::new(cli.actor)),
        Command::Uid { command } => run_uid(&command, &api),
    }
}

fn run_db(command: DbCommand, api: &CasePaymentOrdersApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(&serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty(),
            }))
        }
        DbCommand::Migrate(args) => emit_json(&api.migrate(args.dry_run)?),
        DbCommand::IntegrityCheck => {
            let report = api.integrity_check()?;
            let mut value = serde_json::to_value(&report)?;
            if let Value::Object(object) = &mut value {
                object.insert("consistent".to_string(), Value::Bool(report.is_consistent()));
            }
            emit_json(&value)
        }
        DbCommand::Backup(args) => emit_json(&api.backup(&args.out)?),
        DbCommand::Restore(args) => {
            let status = api.restore(&args.input)?;
            emit_json(&serde_json::json!({
                "restored_from": args.input.display().to_string(),
                "current_version": status.current_version,
                "up_to_date": status.pending_versions.is_empty(),
            }))
        }
    }
}

fn run_order(
    command: OrderCommand,
    api: &CasePaymentOrdersApi,
    identity: &StaticIdentity,
) -> Result<()> {
    match command {
        OrderCommand::Create(args) => emit_json(&api.create(&args.into_request(), identity)?),
        OrderCommand::Update(args) => emit_json(&api.update(&UpdateCasePaymentOrderRequest {
            id: args.id,
            order: args.fields.into_request(),
        })?),
        OrderCommand::Get(args) => emit_json(&api.get(&args.id)?),
        OrderCommand::Query(args) => emit_json(&api.query(&CasePaymentOrderQuery {
            ids: args.keys.ids,
            case_ids: args.keys.case_ids,
            page: args.page,
            size: args.size,
        })?),
        OrderCommand::Delete(args) => emit_json(&api.delete(&DeleteRequest {
            ids: args.ids,
            case_ids: args.case_ids,
        })?),
        OrderCommand::History(args) => {
            let revisions = api.history(&args.id)?;
            emit_json(&serde_json::json!({
                "id": args.id,
                "revisions": revisions,
            }))
        }
    }
}

fn run_uid(command: &UidCommand, api: &CasePaymentOrdersApi) -> Result<()> {
    match command {
        UidCommand::Generate(args) => {
            let case_ids = (0..args.count)
                .map(|_| api.generate_case_id().map(|case_id| case_id.to_string()))
                .collect::<Result<Vec<_>>>()?;
            emit_json(&serde_json::json!({ "case_ids": case_ids }))
        }
    }
}

impl OrderFieldArgs {
    fn into_request(self) -> CreateCasePaymentOrderRequest {
        CreateCasePaymentOrderRequest {
            effective_from: Some(self.effective_from),
            case_id: self.case_id,
            action: self.action,
            responsible_party: self.responsible_party,
            order_reference: self.order_reference,
        }
    }
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| format!("invalid RFC3339 timestamp `{value}`: {err}"))
}
