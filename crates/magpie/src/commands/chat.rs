//! `magpie chat`: interactive REPL against the configured agent.

use anyhow::Result;
use clap::Args;
use console::style;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use magpie_server::handle_inbound;
use magpie_types::{InboundMessage, OutboundKind, meta_keys};

use super::Context;

#[derive(Args)]
pub struct ChatArgs {
    /// Chat id for the REPL session
    #[arg(long, default_value = "repl")]
    pub chat_id: String,

    /// Show the model's reasoning stream
    #[arg(long)]
    pub thinking: bool,
}

pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let provider = super::build_provider(&config)?;
    let state = super::build_state(&config, provider)?;

    println!(
        "{} Interactive chat, {} to exit.",
        style("magpie").cyan().bold(),
        style("Ctrl-D").dim()
    );

    let mut editor = DefaultEditor::new()?;
    let mut turn_counter = 0u64;

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(message);

        turn_counter += 1;
        let stream_id = format!("repl-{}", turn_counter);
        let mut rx = state.bus.subscribe_outbound(format!("rest_{}", stream_id));

        let inbound = InboundMessage::new("cli", &args.chat_id, "repl", message)
            .with_meta(meta_keys::STREAM_ID, stream_id.clone());
        let turn = tokio::spawn(handle_inbound(state.clone(), inbound));

        while let Some(event) = rx.recv().await {
            if event.stream_id() != Some(stream_id.as_str()) {
                continue;
            }
            match event.kind {
                OutboundKind::Thinking => {
                    if args.thinking
                        && let Some(thinking) = &event.thinking
                    {
                        print!("{}", style(thinking).dim());
                    }
                }
                OutboundKind::Chunk => {
                    if let Some(content) = &event.content {
                        print!("{}", magpie_provider::strip_thinking(content));
                    }
                }
                OutboundKind::ToolCall => {
                    if let Some(tool) = &event.tool_name {
                        println!("{}", style(format!("[tool: {}]", tool)).yellow().dim());
                    }
                }
                OutboundKind::Error => {
                    if let Some(error) = &event.error {
                        eprintln!("{}", style(error).red());
                    }
                }
                OutboundKind::End => break,
                _ => {}
            }
        }
        println!();

        turn.await?;
    }

    state.bus.close();
    println!("{}", style("bye").dim());
    Ok(())
}
