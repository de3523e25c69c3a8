//! Parley command-line entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, opens the messaging database, then dispatches to
//! the matching command handler on behalf of the `--as`/`--role` caller.

mod cli;
mod state;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;
use parley_observe::tracing_setup::{
    TracingOptions, init_tracing, shutdown_tracing, verbosity_directive,
};
use tracing_subscriber::EnvFilter;

use cli::{AuditCommand, Cli, Commands, ConversationCommand, MessageCommand, ModerateCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(TracingOptions {
        filter: EnvFilter::new(verbosity_directive(cli.verbose, cli.quiet)),
        format: cli.log_format,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let caller = cli.caller().context("run with --as <user> (or PARLEY_USER)")?;
    let json = cli.json;

    let state = AppState::init().await?;

    let result = match cli.command {
        Commands::Conversation { action } => match action {
            ConversationCommand::List {
                status,
                limit,
                cursor,
            } => cli::conversation::list(&state, &caller, status, limit, cursor, json).await,
            ConversationCommand::Show { id } => {
                cli::conversation::show(&state, &caller, &id, json).await
            }
            ConversationCommand::Open(args) => {
                cli::conversation::open(&state, &caller, args, json).await
            }
            ConversationCommand::Read { id } => {
                cli::conversation::mark_read(&state, &caller, &id, json).await
            }
            ConversationCommand::Pin { id, off } => {
                cli::conversation::pin(&state, &caller, &id, !off, json).await
            }
            ConversationCommand::Mute { id, off } => {
                cli::conversation::mute(&state, &caller, &id, !off, json).await
            }
            ConversationCommand::Archive { id } => {
                cli::moderation::archive(&state, &caller, &id, json).await
            }
        },

        Commands::Message { action } => match action {
            MessageCommand::List {
                conversation,
                limit,
                cursor,
                include_deleted,
            } => {
                cli::message::list(
                    &state,
                    &caller,
                    &conversation,
                    limit,
                    cursor,
                    include_deleted,
                    json,
                )
                .await
            }
            MessageCommand::Send(args) => cli::message::send(&state, &caller, args, json).await,
            MessageCommand::Read { id } => {
                cli::message::mark_read(&state, &caller, &id, json).await
            }
            MessageCommand::Delete { id, force } => {
                cli::message::delete(&state, &caller, &id, force, json).await
            }
        },

        Commands::Unread => cli::conversation::unread(&state, &caller, json).await,

        Commands::Moderate { action } => match action {
            ModerateCommand::Flag { id, reason } => {
                cli::moderation::flag(&state, &caller, &id, reason, json).await
            }
            ModerateCommand::Unflag { id, notes } => {
                cli::moderation::unflag(&state, &caller, &id, notes, json).await
            }
            ModerateCommand::Queue { limit } => {
                cli::moderation::queue(&state, &caller, limit, json).await
            }
        },

        Commands::Audit { action } => match action {
            AuditCommand::List {
                conversation,
                limit,
            } => cli::audit::list(&state, &caller, conversation.as_ref(), limit, json).await,
        },

        Commands::Completions { .. } => unreachable!("handled above"),
    };

    state.db_pool.close().await;
    shutdown_tracing();

    result
}
