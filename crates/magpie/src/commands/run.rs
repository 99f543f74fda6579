//! `magpie run <message>`: one-shot turn against the configured agent.

use anyhow::{Result, bail};
use clap::Args;

use magpie_server::handle_inbound;
use magpie_types::{InboundMessage, OutboundKind, meta_keys};

use super::Context;

#[derive(Args)]
pub struct RunArgs {
    /// The message to send
    pub message: String,

    /// Chat id to attribute the message to
    #[arg(long, default_value = "cli")]
    pub chat_id: String,
}

pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let provider = super::build_provider(&config)?;
    let state = super::build_state(&config, provider)?;

    let stream_id = "cli-run";
    let mut rx = state.bus.subscribe_outbound(format!("rest_{}", stream_id));

    let inbound = InboundMessage::new("cli", &args.chat_id, whoami(), &args.message)
        .with_meta(meta_keys::STREAM_ID, stream_id);
    let turn = tokio::spawn(handle_inbound(state.clone(), inbound));

    let mut failed = None;
    while let Some(event) = rx.recv().await {
        if event.stream_id() != Some(stream_id) {
            continue;
        }
        match event.kind {
            OutboundKind::Chunk => {
                if let Some(content) = &event.content {
                    print!("{}", magpie_provider::strip_thinking(content));
                }
            }
            OutboundKind::Error => {
                failed = event.error;
            }
            OutboundKind::End => break,
            _ => {}
        }
    }
    println!();

    turn.await?;
    state.bus.close();

    if let Some(error) = failed {
        bail!("{}", error);
    }
    Ok(())
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "cli".to_string())
}
