use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

use payflow_core::{Actor, RequestId, RequestType, Role};
use payflow_server::{ListParams, PageLimits, SqliteRepository, WorkflowService};

/// payflowctl: operator tool for the payflow request database
#[derive(Parser, Debug)]
#[command(name = "payflowctl")]
#[command(about = "Inspect and operate on payflow requests", long_about = None)]
struct Cli {
    /// Database file (defaults to $STATE_DIR/payflow.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(flatten)]
    actor: ActorArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Who the operation is performed as. Workflow rules apply as usual.
#[derive(Args, Debug)]
struct ActorArgs {
    #[arg(long, global = true, default_value_t = 0)]
    actor_id: i64,

    #[arg(long, global = true, default_value = "admin")]
    role: Role,

    #[arg(long, global = true)]
    team: Option<i64>,

    #[arg(long, global = true)]
    department: Option<i64>,
}

impl ActorArgs {
    fn actor(&self) -> Actor {
        let mut actor = Actor::new(self.actor_id, self.role);
        if let Some(team) = self.team {
            actor = actor.with_team(team);
        }
        if let Some(department) = self.department {
            actor = actor.with_department(department);
        }
        actor
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List requests visible to the actor
    List(ListArgs),
    /// Show one request with its payload
    Show(IdArgs),
    /// Show the status history of a request
    History(IdArgs),
    /// Move a request to a new status
    SetStatus(SetStatusArgs),
    /// Cancel a request
    Cancel(IdArgs),
    /// Delete an open request (admin only)
    Delete(IdArgs),
}

#[derive(Parser, Debug)]
struct ListArgs {
    /// Only requests in this status
    #[arg(long)]
    status: Option<String>,

    /// Only requests of this type
    #[arg(long = "type")]
    request_type: Option<RequestType>,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long)]
    page_size: Option<u32>,
}

#[derive(Parser, Debug)]
struct IdArgs {
    id: i64,
}

#[derive(Parser, Debug)]
struct SetStatusArgs {
    id: i64,

    /// Target status name, e.g. approved_by_teamlead
    status: String,
}

fn default_db_path() -> PathBuf {
    let state_dir = env::var("STATE_DIR").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(state_dir).join("payflow.db")
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

async fn run(service: &WorkflowService, actor: &Actor, command: Commands) -> Result<()> {
    match command {
        Commands::List(args) => {
            let params = ListParams {
                status: args.status,
                request_type: args.request_type,
                page: Some(args.page),
                page_size: args.page_size,
                ..ListParams::default()
            };
            print_json(&service.list_requests(actor, params).await?)
        }
        Commands::Show(args) => print_json(&service.get_request(actor, RequestId(args.id)).await?),
        Commands::History(args) => print_json(
            &service
                .get_status_history(actor, RequestId(args.id))
                .await?,
        ),
        Commands::SetStatus(args) => {
            let outcome = service
                .change_status(actor, RequestId(args.id), &args.status)
                .await?;
            print_json(&outcome)
        }
        Commands::Cancel(args) => {
            service.cancel_request(actor, RequestId(args.id)).await?;
            eprintln!("Request #{} cancelled", args.id);
            Ok(())
        }
        Commands::Delete(args) => {
            service.delete_request(actor, RequestId(args.id)).await?;
            eprintln!("Request #{} deleted", args.id);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::INFO)
        .init();

    let db_path = cli.db.unwrap_or_else(default_db_path);
    let repo = SqliteRepository::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let service = WorkflowService::new(Arc::new(repo), PageLimits::default());

    run(&service, &cli.actor.actor(), cli.command).await
}
