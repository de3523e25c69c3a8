//! Moderation CLI commands: flag, unflag, archive, review queue.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_types::conversation::{Conversation, ConversationId};
use parley_types::identity::Caller;

use super::{format_relative_time, format_status, plural, truncate};
use crate::state::AppState;

pub async fn flag(
    state: &AppState,
    caller: &Caller,
    id: &ConversationId,
    reason: String,
    json: bool,
) -> Result<()> {
    let conv = state.messaging.flag_conversation(id, caller, &reason).await?;
    print_transition(&conv, "Flagged", json)
}

pub async fn unflag(
    state: &AppState,
    caller: &Caller,
    id: &ConversationId,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let conv = state.messaging.unflag_conversation(id, caller, notes).await?;
    print_transition(&conv, "Unflagged", json)
}

pub async fn archive(
    state: &AppState,
    caller: &Caller,
    id: &ConversationId,
    json: bool,
) -> Result<()> {
    let conv = state.messaging.archive_conversation(id, caller).await?;
    print_transition(&conv, "Archived", json)
}

/// The flagged-conversation review queue.
pub async fn queue(
    state: &AppState,
    caller: &Caller,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let flagged = state
        .messaging
        .get_flagged_conversations(caller, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&flagged)?);
        return Ok(());
    }

    if flagged.is_empty() {
        println!();
        println!("  {} Review queue is empty.", style("✓").green().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Buyer").fg(Color::White),
        Cell::new("Vendor").fg(Color::White),
        Cell::new("Reason").fg(Color::White),
        Cell::new("Flagged By").fg(Color::White),
        Cell::new("Flagged").fg(Color::White),
    ]);

    for conv in &flagged {
        let flagged_at = conv
            .flagged_at
            .as_ref()
            .map(format_relative_time)
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(conv.id.to_string()).fg(Color::DarkGrey),
            Cell::new(&conv.buyer_id).fg(Color::Cyan),
            Cell::new(&conv.vendor_id).fg(Color::Cyan),
            Cell::new(truncate(conv.flag_reason.as_deref().unwrap_or(""), 50)).fg(Color::Red),
            Cell::new(conv.flagged_by.as_deref().unwrap_or("")),
            Cell::new(flagged_at).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} flagged conversation{}",
        style(flagged.len()).bold(),
        plural(flagged.len())
    );
    println!();

    Ok(())
}

fn print_transition(conv: &Conversation, verb: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(conv)?);
        return Ok(());
    }

    println!(
        "  {} {verb} {}  {}",
        style("✓").green().bold(),
        style(conv.id.to_string()).dim(),
        format_status(conv.status)
    );
    Ok(())
}
