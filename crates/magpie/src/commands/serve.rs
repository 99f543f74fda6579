//! `magpie serve`: run the configured channels, worker, and scheduler.

use anyhow::Result;
use clap::Args;

use magpie_server::Server;

use super::Context;

#[derive(Args)]
pub struct ServeArgs {
    /// Override the bind address from the config
    #[arg(long)]
    pub bind: Option<String>,
}

pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let provider = super::build_provider(&config)?;
    let state = super::build_state(&config, provider)?;

    let bind = args.bind.unwrap_or_else(|| config.channels.bind.clone());

    // Background maintenance: history pruning and cron scheduling.
    tokio::spawn(magpie_memory::run_pruner(
        state.storage.clone(),
        config.memory.max_age_days,
        std::time::Duration::from_secs(3600),
        state.cancel.clone(),
    ));
    if config.scheduler.enabled {
        tokio::spawn(magpie_scheduler::run_scheduler(
            state.storage.clone(),
            state.bus.clone(),
            state.cancel.clone(),
        ));
    }

    let mut server = Server::new(state.clone());
    if config.channels.webhook.enabled {
        server = server.with_webhook(config.channels.webhook.path.clone());
    }

    // Ctrl-C winds down every turn and the listener.
    let cancel = state.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            cancel.cancel();
        }
    });

    server.run(&bind).await?;
    state.bus.close();
    Ok(())
}
