//! CLI command definitions and dispatch for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (`parley conversation list`, `parley message send`). Every command
//! except `completions` runs as the caller named by `--as` and `--role`.

pub mod audit;
pub mod conversation;
pub mod message;
pub mod moderation;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use console::style;

use parley_observe::tracing_setup::LogFormat;
use parley_types::conversation::{ConversationContext, ConversationId, ConversationStatus};
use parley_types::identity::{Caller, Role};
use parley_types::message::{MessageId, MessageType};
use parley_types::page::Cursor;

/// Buyer/vendor messaging from the terminal.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Account id to act as.
    #[arg(long = "as", value_name = "USER", env = "PARLEY_USER", global = true)]
    pub user: Option<String>,

    /// Role of the acting account.
    #[arg(long, env = "PARLEY_ROLE", default_value = "buyer", global = true)]
    pub role: Role,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr.
    #[arg(long, default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    /// Export spans through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The acting caller, if `--as` was given.
    pub fn caller(&self) -> Option<Caller> {
        let user = self.user.as_deref()?.trim();
        (!user.is_empty()).then(|| Caller::new(user, self.role))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open, list and manage conversations.
    #[command(alias = "conv")]
    Conversation {
        #[command(subcommand)]
        action: ConversationCommand,
    },

    /// Send, list, read and delete messages.
    #[command(alias = "msg")]
    Message {
        #[command(subcommand)]
        action: MessageCommand,
    },

    /// Total unread messages across your conversations.
    Unread,

    /// Moderation actions (admin only, except flagging).
    #[command(alias = "mod")]
    Moderate {
        #[command(subcommand)]
        action: ModerateCommand,
    },

    /// Inspect the audit trail (admin only).
    Audit {
        #[command(subcommand)]
        action: AuditCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConversationCommand {
    /// List your conversations, most recently active first.
    #[command(alias = "ls")]
    List {
        /// Only conversations in this status.
        #[arg(long)]
        status: Option<ConversationStatus>,

        /// Page size.
        #[arg(short, long)]
        limit: Option<i64>,

        /// Continue after this cursor (from a previous page).
        #[arg(long)]
        cursor: Option<Cursor>,
    },

    /// Show one conversation.
    Show {
        id: ConversationId,
    },

    /// Open a conversation, or return the existing one for the same key.
    Open(OpenArgs),

    /// Mark every message from the other side as read.
    Read {
        id: ConversationId,
    },

    /// Pin a conversation on your side.
    Pin {
        id: ConversationId,

        /// Unpin instead.
        #[arg(long)]
        off: bool,
    },

    /// Mute a conversation on your side.
    Mute {
        id: ConversationId,

        /// Unmute instead.
        #[arg(long)]
        off: bool,
    },

    /// Archive a conversation.
    Archive {
        id: ConversationId,
    },
}

#[derive(Args)]
pub struct OpenArgs {
    /// Buyer account id. Defaults to you when acting as a buyer.
    #[arg(long)]
    pub buyer: Option<String>,

    /// Vendor account id. Defaults to you when acting as a vendor.
    #[arg(long)]
    pub vendor: Option<String>,

    /// What the conversation is about.
    #[arg(long, default_value = "general")]
    pub context: ConversationContext,

    #[arg(long)]
    pub product: Option<String>,

    #[arg(long)]
    pub order: Option<String>,

    #[arg(long)]
    pub dispute: Option<String>,
}

#[derive(Subcommand)]
pub enum MessageCommand {
    /// List messages in a conversation, newest first.
    #[command(alias = "ls")]
    List {
        conversation: ConversationId,

        /// Page size.
        #[arg(short, long)]
        limit: Option<i64>,

        /// Continue after this cursor (from a previous page).
        #[arg(long)]
        cursor: Option<Cursor>,

        /// Include deleted messages (admin only).
        #[arg(long)]
        include_deleted: bool,
    },

    /// Send a message.
    Send(SendArgs),

    /// Mark one message as read.
    Read {
        id: MessageId,
    },

    /// Delete a message.
    #[command(alias = "rm")]
    Delete {
        id: MessageId,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct SendArgs {
    pub conversation: ConversationId,

    /// Message body.
    pub content: String,

    /// Display name. Defaults to the account id.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long = "type", default_value = "text")]
    pub message_type: MessageType,

    #[arg(long)]
    pub attachment_url: Option<String>,

    #[arg(long)]
    pub attachment_name: Option<String>,
}

#[derive(Subcommand)]
pub enum ModerateCommand {
    /// Flag a conversation for review.
    Flag {
        id: ConversationId,

        #[arg(long)]
        reason: String,
    },

    /// Clear a flag after review.
    Unflag {
        id: ConversationId,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Flagged conversations awaiting review, most recent first.
    Queue {
        #[arg(short, long)]
        limit: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum AuditCommand {
    /// Recent audit entries, newest first.
    #[command(alias = "ls")]
    List {
        /// Only entries for this conversation.
        #[arg(long)]
        conversation: Option<ConversationId>,

        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

// --- Shared formatting helpers ---

pub(crate) fn status_cell(status: ConversationStatus) -> Cell {
    match status {
        ConversationStatus::Active => Cell::new("● active").fg(Color::Green),
        ConversationStatus::Flagged => Cell::new("⚑ flagged").fg(Color::Red),
        ConversationStatus::Archived => Cell::new("◌ archived").fg(Color::DarkGrey),
        ConversationStatus::Closed => Cell::new("○ closed").fg(Color::Yellow),
    }
}

pub(crate) fn format_status(status: ConversationStatus) -> String {
    match status {
        ConversationStatus::Active => format!("{}", style("● active").green()),
        ConversationStatus::Flagged => format!("{}", style("⚑ flagged").red()),
        ConversationStatus::Archived => format!("{}", style("◌ archived").dim()),
        ConversationStatus::Closed => format!("{}", style("○ closed").yellow()),
    }
}

pub(crate) fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let diff = Utc::now() - *dt;

    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{}m ago", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{}h ago", diff.num_hours())
    } else if diff.num_days() < 30 {
        format!("{}d ago", diff.num_days())
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}

/// Shorten to `max` characters, appending an ellipsis when cut.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

pub(crate) fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Print the continuation hint for a paged listing.
pub(crate) fn print_next_cursor(cursor: Option<&Cursor>) {
    if let Some(cursor) = cursor {
        println!(
            "  More available: {}",
            style(format!("--cursor {cursor}")).yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_caller_from_flags() {
        let cli = Cli::parse_from(["parley", "--as", "v1", "--role", "vendor", "unread"]);
        assert_eq!(cli.caller(), Some(Caller::vendor("v1")));
    }

    #[test]
    fn test_caller_requires_user() {
        let cli = Cli::parse_from(["parley", "--as", "  ", "unread"]);
        assert!(cli.caller().is_none());
    }

    #[test]
    fn test_parse_send() {
        let id = ConversationId::new();
        let id_arg = id.to_string();
        let cli = Cli::parse_from([
            "parley",
            "--as",
            "b1",
            "message",
            "send",
            id_arg.as_str(),
            "hello there",
            "--type",
            "image",
            "--attachment-url",
            "https://cdn.example/p.png",
        ]);
        match cli.command {
            Commands::Message {
                action: MessageCommand::Send(args),
            } => {
                assert_eq!(args.conversation, id);
                assert_eq!(args.content, "hello there");
                assert_eq!(args.message_type, MessageType::Image);
                assert_eq!(
                    args.attachment_url.as_deref(),
                    Some("https://cdn.example/p.png")
                );
            }
            _ => panic!("expected message send"),
        }
    }

    #[test]
    fn test_parse_list_cursor() {
        let cursor: Cursor = "2026-03-01T10:15:00.000042Z_0190e5a1-7c2b-7d3e-9f00-1234567890ab"
            .parse()
            .unwrap();
        let cursor_arg = cursor.to_string();
        let cli = Cli::parse_from([
            "parley",
            "--as",
            "b1",
            "conversation",
            "list",
            "--cursor",
            cursor_arg.as_str(),
        ]);
        match cli.command {
            Commands::Conversation {
                action: ConversationCommand::List { cursor: parsed, .. },
            } => assert_eq!(parsed, Some(cursor)),
            _ => panic!("expected conversation list"),
        }

        assert!(
            Cli::try_parse_from(["parley", "conversation", "list", "--cursor", "2026-03-01T10:15:00Z"])
                .is_err()
        );
    }

    #[test]
    fn test_parse_rejects_bad_role() {
        assert!(Cli::try_parse_from(["parley", "--role", "moderator", "unread"]).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
