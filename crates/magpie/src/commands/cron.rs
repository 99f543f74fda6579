//! `magpie cron`: manage scheduled messages.

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use console::style;

use magpie_scheduler::CronExpr;
use magpie_storage::{SqliteStorage, Storage};
use magpie_types::TaskRecord;

use super::Context;

#[derive(Args)]
pub struct CronArgs {
    #[command(subcommand)]
    pub command: CronCommand,
}

#[derive(Subcommand)]
pub enum CronCommand {
    /// Add a scheduled message
    Add {
        /// Unique task name
        name: String,
        /// Five-field cron expression, e.g. "0 9 * * *"
        expr: String,
        /// Message published when the task fires
        message: String,
        /// Chat the message is addressed to
        #[arg(long, default_value = "cron")]
        chat_id: String,
    },
    /// Remove a scheduled message by name
    Remove { name: String },
    /// List scheduled messages
    List,
}

pub async fn run(args: CronArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let db_path = super::database_path(&config);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let storage = SqliteStorage::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    match args.command {
        CronCommand::Add {
            name,
            expr,
            message,
            chat_id,
        } => {
            // Reject bad expressions before they reach the scheduler.
            CronExpr::parse(&expr)
                .with_context(|| format!("invalid cron expression '{}'", expr))?;

            let mut task = TaskRecord::new(&name, &expr, message);
            task.chat_id = chat_id;
            storage.create_task(&task)?;
            println!("added {} ({})", style(&name).green(), expr);
        }
        CronCommand::Remove { name } => {
            if !storage.delete_task(&name)? {
                bail!("no task named '{}'", name);
            }
            println!("removed {}", style(&name).green());
        }
        CronCommand::List => {
            let tasks = storage.list_tasks()?;
            if tasks.is_empty() {
                println!("no scheduled tasks");
                return Ok(());
            }
            for task in tasks {
                let status = if task.enabled { "" } else { " (disabled)" };
                println!(
                    "{}  {}  {}{}",
                    style(&task.name).bold(),
                    task.cron_expr,
                    task.message,
                    style(status).dim()
                );
            }
        }
    }

    Ok(())
}
