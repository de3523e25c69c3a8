//! Conversation CLI commands: list, show, open, read, pin, mute, unread.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_core::service::conversation::ConversationListQuery;
use parley_types::conversation::{Conversation, ConversationId, ConversationStatus, NewConversation};
use parley_types::identity::{Caller, Party, Role};
use parley_types::page::{Cursor, PageRequest};

use super::{
    OpenArgs, format_relative_time, format_status, plural, print_next_cursor, status_cell,
    truncate,
};
use crate::state::AppState;

/// List the caller's conversations, one page at a time.
pub async fn list(
    state: &AppState,
    caller: &Caller,
    status: Option<ConversationStatus>,
    limit: Option<i64>,
    cursor: Option<Cursor>,
    json: bool,
) -> Result<()> {
    let query = ConversationListQuery {
        page: PageRequest { limit, cursor },
        status,
    };
    let page = state
        .messaging
        .list_conversations_for_user(caller, &query)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!();
        println!("  No conversations yet. Start one with:");
        println!(
            "    {}",
            style("parley conversation open --vendor <id>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("With").fg(Color::White),
        Cell::new("Context").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Unread").fg(Color::White),
        Cell::new("Last Message").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for conv in &page.items {
        let party = conv.party_of(caller);
        let with = match party {
            Some(p) => conv.participant(p.other()).to_string(),
            None => format!("{} / {}", conv.buyer_id, conv.vendor_id),
        };
        let marker = match party {
            Some(p) if conv.is_pinned(p) => "📌 ",
            _ => "",
        };
        let unread = match party {
            Some(p) => conv.unread_count(p).to_string(),
            None => "-".to_string(),
        };
        let preview = conv
            .last_message_content
            .as_deref()
            .map(|c| truncate(c, 40))
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(conv.id.to_string()).fg(Color::DarkGrey),
            Cell::new(format!("{marker}{with}")).fg(Color::Cyan),
            Cell::new(conv.context.to_string()),
            status_cell(conv.status),
            Cell::new(unread).fg(Color::Yellow),
            Cell::new(preview),
            Cell::new(format_relative_time(&conv.updated_at)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} conversation{}",
        style(page.items.len()).bold(),
        plural(page.items.len())
    );
    print_next_cursor(page.next_cursor.as_ref());
    println!();

    Ok(())
}

/// Show one conversation the caller can see.
pub async fn show(
    state: &AppState,
    caller: &Caller,
    id: &ConversationId,
    json: bool,
) -> Result<()> {
    let conv = state.messaging.get_conversation_for_user(id, caller).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conv)?);
        return Ok(());
    }

    print_conversation(&conv, caller);
    Ok(())
}

/// Open a conversation, reusing the existing one for the same key.
pub async fn open(state: &AppState, caller: &Caller, args: OpenArgs, json: bool) -> Result<()> {
    let buyer_id = match (args.buyer, caller.role) {
        (Some(b), _) => b,
        (None, Role::Buyer) => caller.user_id.clone(),
        (None, _) => bail!("--buyer is required unless acting as a buyer"),
    };
    let vendor_id = match (args.vendor, caller.role) {
        (Some(v), _) => v,
        (None, Role::Vendor) => caller.user_id.clone(),
        (None, _) => bail!("--vendor is required unless acting as a vendor"),
    };

    let input = NewConversation {
        buyer_id,
        vendor_id,
        context: args.context,
        product_id: args.product,
        order_id: args.order,
        dispute_id: args.dispute,
    };

    let conv = state
        .messaging
        .create_or_get_conversation(caller, input)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conv)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Conversation ready",
        style("✓").green().bold()
    );
    print_conversation(&conv, caller);
    Ok(())
}

/// Mark every message from the other side as read.
pub async fn mark_read(
    state: &AppState,
    caller: &Caller,
    id: &ConversationId,
    json: bool,
) -> Result<()> {
    let marked = state.messaging.mark_conversation_as_read(id, caller).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"conversation_id": id, "marked_read": marked})
        );
    } else {
        println!(
            "  {} Marked {} message{} as read.",
            style("✓").green().bold(),
            style(marked).bold(),
            plural(marked as usize)
        );
    }
    Ok(())
}

pub async fn pin(
    state: &AppState,
    caller: &Caller,
    id: &ConversationId,
    pinned: bool,
    json: bool,
) -> Result<()> {
    let conv = state.messaging.set_pinned(id, caller, pinned).await?;
    let verb = if pinned { "Pinned" } else { "Unpinned" };
    print_toggle(&conv, verb, json)
}

pub async fn mute(
    state: &AppState,
    caller: &Caller,
    id: &ConversationId,
    muted: bool,
    json: bool,
) -> Result<()> {
    let conv = state.messaging.set_muted(id, caller, muted).await?;
    let verb = if muted { "Muted" } else { "Unmuted" };
    print_toggle(&conv, verb, json)
}

/// Total unread messages for the caller.
pub async fn unread(state: &AppState, caller: &Caller, json: bool) -> Result<()> {
    let count = state.messaging.get_unread_count(caller).await?;

    if json {
        println!("{}", serde_json::json!({"user_id": caller.user_id, "unread": count}));
    } else if count == 0 {
        println!("  {} All caught up.", style("✓").green().bold());
    } else {
        println!(
            "  {} unread message{}",
            style(count).yellow().bold(),
            plural(count as usize)
        );
    }
    Ok(())
}

fn print_toggle(conv: &Conversation, verb: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(conv)?);
    } else {
        println!(
            "  {} {verb} conversation {}",
            style("✓").green().bold(),
            style(conv.id.to_string()).dim()
        );
    }
    Ok(())
}

fn print_conversation(conv: &Conversation, caller: &Caller) {
    println!();
    println!("  {}  {}", style("ID:").bold(), style(conv.id.to_string()).dim());
    println!("  {}  {}", style("Buyer:").bold(), style(&conv.buyer_id).cyan());
    println!("  {}  {}", style("Vendor:").bold(), style(&conv.vendor_id).cyan());
    println!("  {}  {}", style("Context:").bold(), conv.context);
    for (label, value) in [
        ("Product:", &conv.product_id),
        ("Order:", &conv.order_id),
        ("Dispute:", &conv.dispute_id),
    ] {
        if let Some(value) = value {
            println!("  {}  {}", style(label).bold(), value);
        }
    }
    println!("  {}  {}", style("Status:").bold(), format_status(conv.status));

    if let Some(party) = conv.party_of(caller) {
        println!(
            "  {}  {}",
            style("Unread:").bold(),
            style(conv.unread_count(party)).yellow()
        );
        let mut flags = Vec::new();
        if conv.is_pinned(party) {
            flags.push("pinned");
        }
        if conv.is_muted(party) {
            flags.push("muted");
        }
        if !flags.is_empty() {
            println!("  {}  {}", style("Flags:").bold(), flags.join(", "));
        }
    } else {
        println!(
            "  {}  buyer {} / vendor {}",
            style("Unread:").bold(),
            conv.unread_count(Party::Buyer),
            conv.unread_count(Party::Vendor)
        );
    }

    if let Some(reason) = &conv.flag_reason {
        println!("  {}  {}", style("Flag reason:").bold(), style(reason).red());
    }
    if let Some(notes) = &conv.moderator_notes {
        println!("  {}  {}", style("Moderator notes:").bold(), notes);
    }
    if let (Some(content), Some(at)) = (&conv.last_message_content, &conv.last_message_at) {
        println!(
            "  {}  {} {}",
            style("Last message:").bold(),
            truncate(content, 60),
            style(format!("({})", format_relative_time(at))).dim()
        );
    }
    println!(
        "  {}  {}",
        style("Created:").bold(),
        conv.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!();
}
