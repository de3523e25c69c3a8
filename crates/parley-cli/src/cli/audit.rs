//! Audit trail CLI command.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_types::conversation::ConversationId;
use parley_types::identity::Caller;

use super::truncate;
use crate::state::AppState;

/// Recent audit entries, newest first. Admin only.
pub async fn list(
    state: &AppState,
    caller: &Caller,
    conversation: Option<&ConversationId>,
    limit: i64,
    json: bool,
) -> Result<()> {
    let entries = state
        .messaging
        .query_audit_logs(caller, conversation, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!("  No audit entries.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("When").fg(Color::White),
        Cell::new("Action").fg(Color::White),
        Cell::new("By").fg(Color::White),
        Cell::new("Conversation").fg(Color::White),
        Cell::new("Message").fg(Color::White),
        Cell::new("Details").fg(Color::White),
    ]);

    for entry in &entries {
        table.add_row(vec![
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
            Cell::new(entry.action.to_string()).fg(Color::Yellow),
            Cell::new(format!("{} ({})", entry.performed_by, entry.performed_by_role)),
            Cell::new(
                entry
                    .conversation_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            )
            .fg(Color::DarkGrey),
            Cell::new(entry.message_id.map(|id| id.to_string()).unwrap_or_default())
                .fg(Color::DarkGrey),
            Cell::new(truncate(entry.details.as_deref().unwrap_or(""), 50)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} entr{}",
        style(entries.len()).bold(),
        if entries.len() == 1 { "y" } else { "ies" }
    );
    println!();

    Ok(())
}
