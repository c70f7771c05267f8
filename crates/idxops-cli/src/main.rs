//! 🚀 idxops-cli — the front door. Parses flags, loads config, opens a session,
//! runs exactly one subcommand, prints a table, and leaves.
//!
//! 🎬 *[narrator voice]* "It used to be a web page with a lot of buttons..."
//! 📦 Every button is a subcommand now. Every confirm dialog is a `--yes`. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use idxops::app_config::{ConfigFiles, load_config};
use idxops::common::{MigrationTask, TaskSource};
use idxops::migration::PlannedTask;
use idxops::progress;
use idxops::{OpsError, Session};

/// 🔗 Search-cluster alias/index housekeeping and MariaDB → MongoDB copies.
#[derive(Debug, Parser)]
#[command(name = "idxops", version, about)]
struct Cli {
    /// Main config file (TOML)
    #[arg(long, global = true, env = "IDXOPS_CONFIG_FILE", default_value = "idxops.toml")]
    config: PathBuf,

    /// Secrets file with [relational] and [document_store] credentials (TOML)
    #[arg(long, global = true, env = "IDXOPS_SECRETS_FILE")]
    secrets: Option<PathBuf>,

    /// Task schema file: task name → query/file, collection, schema, indexes (JSON or TOML)
    #[arg(long, global = true, env = "IDXOPS_TASKS_FILE")]
    tasks: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List indices, newest first
    Indices {
        /// Index pattern, e.g. `*products*`
        #[arg(long)]
        pattern: Option<String>,
    },
    /// List every alias and the indices behind it
    Aliases,
    /// Show the aliases pointing at one index
    IndexAliases { index: String },
    /// Indices nothing points at
    Orphans {
        /// Also count indices whose only alias is a dev alias
        #[arg(long)]
        include_dev: bool,
    },
    /// Other generations of the same index
    Siblings { index: String },
    /// Move aliases from one index to another in a single request
    Rebind {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Aliases to move; defaults to every alias currently on --from
        #[arg(long = "alias")]
        aliases: Vec<String>,
    },
    /// Delete indices (each on its own; failures do not stop the rest)
    Delete {
        #[arg(required = true)]
        indices: Vec<String>,
        /// Actually do it
        #[arg(long)]
        yes: bool,
    },
    /// List configured migration tasks
    Tasks,
    /// List destination databases (admin, config and local left out)
    Databases,
    /// Run migration tasks: configured ones by name, all of them, or one ad-hoc query/file
    Migrate {
        #[arg(long = "task")]
        task_names: Vec<String>,
        #[arg(long, conflicts_with = "task_names")]
        all: bool,
        /// Ad-hoc SQL query (needs --collection)
        #[arg(long, conflicts_with_all = ["task_names", "all", "file"])]
        query: Option<String>,
        /// Ad-hoc pre-uploaded JSON array file (needs --collection)
        #[arg(long, conflicts_with_all = ["task_names", "all"])]
        file: Option<PathBuf>,
        /// Destination database for the ad-hoc task (defaults to document_store.default_database)
        #[arg(long)]
        database: Option<String>,
        /// Destination collection for the ad-hoc task
        #[arg(long)]
        collection: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time, sniffing for connection trouble
        let mut the_vibes_are_giving_connection_issues = err
            .downcast_ref::<OpsError>()
            .is_some_and(OpsError::is_connectivity);
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like a service isn't reachable. \
                Check that the search cluster, MariaDB and MongoDB are actually up \
                and that the URLs and ports in your config point at them."
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_file = cli
        .config
        .try_exists()
        .context(format!("💀 could not check whether '{}' exists", cli.config.display()))?
        .then_some(cli.config.as_path());
    if config_file.is_none() {
        warn!(
            "⚠️ config file '{}' not found, running on IDXOPS_* env vars and defaults",
            cli.config.display()
        );
    }

    let app_config = load_config(ConfigFiles {
        config: config_file,
        secrets: cli.secrets.as_deref(),
        tasks: cli.tasks.as_deref(),
    })
    .context("💀 couldn't load the configuration. Check the files, the env, and the spelling of both.")?;

    let mut session = Session::open(app_config);
    let outcome = dispatch(&mut session, cli.command).await;
    session.close().await.context("💀 session did not close cleanly")?;
    outcome
}

async fn dispatch(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Indices { pattern } => {
            let indices = session.search()?.list_indices(pattern.as_deref()).await?;
            println!("{}", progress::list_table("index", &indices));
        }
        Command::Aliases => {
            let aliases = session.search()?.list_aliases().await?;
            println!("{}", progress::mapping_table("alias", "indices", &aliases));
        }
        Command::IndexAliases { index } => {
            let aliases = session.search()?.aliases_for_index(&index).await?;
            println!("{}", progress::list_table(&format!("aliases on {index}"), &aliases));
        }
        Command::Orphans { include_dev } => {
            let orphans = session.search()?.indices_without_alias(!include_dev).await?;
            println!("{}", progress::list_table("index without alias", &orphans));
        }
        Command::Siblings { index } => {
            let siblings = session.search()?.sibling_indices(&index).await?;
            println!("{}", progress::list_table(&format!("siblings of {index}"), &siblings));
        }
        Command::Rebind { from, to, aliases } => {
            let search = session.search()?;
            let aliases = if aliases.is_empty() {
                let current = search.aliases_for_index(&from).await?;
                info!("🔗 no --alias given, moving every alias on {}: {:?}", from, current);
                current
            } else {
                aliases
            };
            let outcome = search.rebind_alias(&from, &to, &aliases).await?;
            if !outcome.succeeded {
                anyhow::bail!(
                    "💀 cluster refused the alias batch ({}): {}",
                    outcome.status,
                    outcome.body
                );
            }
            println!("✅ moved {} alias(es) from {from} to {to}", aliases.len());
        }
        Command::Delete { indices, yes } => {
            if !yes {
                println!("{}", progress::list_table("would delete", &indices));
                return Err(OpsError::MissingPrerequisite(
                    "deleting indices needs --yes. nothing was deleted".into(),
                )
                .into());
            }
            let report = session.search()?.delete_indices(&indices).await?;
            println!("{}", progress::delete_table(&report));
            if !report.all_succeeded() {
                anyhow::bail!(
                    "💀 {} of {} deletion(s) failed; the rest went through",
                    report.failures.len(),
                    indices.len()
                );
            }
        }
        Command::Tasks => {
            let plan = session.config().planned_tasks();
            println!("{}", progress::tasks_table(&plan));
        }
        Command::Databases => {
            let databases = session.list_databases().await?;
            println!("{}", progress::list_table("database", &databases));
        }
        Command::Migrate {
            task_names,
            all,
            query,
            file,
            database,
            collection,
        } => {
            let plan = select_tasks(session, task_names, all, query, file, database, collection)?;
            let report = session.migrate(plan, true).await?;
            println!("{}", progress::batch_table(&report));
            let failed = report.failed().count();
            if failed > 0 {
                anyhow::bail!("💀 {} of {} task(s) failed", failed, report.results.len());
            }
        }
    }
    Ok(())
}

/// 🎯 Turn the migrate flags into a plan. Configured tasks that can't run
/// stay in the plan and fail on their own.
fn select_tasks(
    session: &Session,
    task_names: Vec<String>,
    all: bool,
    query: Option<String>,
    file: Option<PathBuf>,
    database: Option<String>,
    collection: Option<String>,
) -> Result<Vec<PlannedTask>> {
    let config = session.config();
    if all {
        return Ok(config.planned_tasks());
    }
    if !task_names.is_empty() {
        return Ok(task_names.iter().map(|name| config.planned_task(name)).collect());
    }

    let source = match (query, file) {
        (Some(query), _) => TaskSource::Query(query),
        (None, Some(file)) => TaskSource::File(file),
        (None, None) => {
            return Err(OpsError::MissingPrerequisite(
                "pick something to migrate: --task NAME, --all, --query or --file".into(),
            )
            .into());
        }
    };
    let collection = collection
        .ok_or_else(|| OpsError::MissingPrerequisite("an ad-hoc migration needs --collection".into()))?;
    let database = database
        .or_else(|| {
            config
                .document_store
                .as_ref()
                .and_then(|store| store.default_database.clone())
        })
        .ok_or_else(|| {
            OpsError::MissingPrerequisite(
                "no --database given and no document_store.default_database configured".into(),
            )
        })?;
    Ok(vec![
        MigrationTask {
            name: "adhoc".to_string(),
            source,
            database,
            collection,
            schema: None,
            indexes: Vec::new(),
        }
        .into(),
    ])
}
