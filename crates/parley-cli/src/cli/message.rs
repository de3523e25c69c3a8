//! Message CLI commands: list, send, read, delete.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use parley_core::service::message::MessageListQuery;
use parley_types::conversation::ConversationId;
use parley_types::identity::{Caller, Role};
use parley_types::message::{Message, MessageId, NewMessage};
use parley_types::page::{Cursor, PageRequest};

use super::{SendArgs, format_relative_time, plural, print_next_cursor, truncate};
use crate::state::AppState;

/// List messages in a conversation, newest first.
pub async fn list(
    state: &AppState,
    caller: &Caller,
    conversation: &ConversationId,
    limit: Option<i64>,
    cursor: Option<Cursor>,
    include_deleted: bool,
    json: bool,
) -> Result<()> {
    let query = MessageListQuery {
        page: PageRequest { limit, cursor },
        include_deleted,
    };
    let page = state
        .messaging
        .list_messages(conversation, caller, &query)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!();
        println!("  No messages yet.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("From").fg(Color::White),
        Cell::new("Message").fg(Color::White),
        Cell::new("Read").fg(Color::White),
        Cell::new("Sent").fg(Color::White),
    ]);

    for msg in &page.items {
        let from = match msg.sender_role {
            Role::Admin => Cell::new(format!("{} (admin)", msg.sender_name)).fg(Color::Magenta),
            _ if msg.sender_id == caller.user_id => Cell::new("you").fg(Color::Green),
            _ => Cell::new(&msg.sender_name).fg(Color::Cyan),
        };
        let body = if msg.is_deleted {
            Cell::new("(deleted)").fg(Color::DarkGrey)
        } else {
            Cell::new(message_body(msg))
        };
        let read = if msg.is_read {
            Cell::new("✓").fg(Color::Green)
        } else {
            Cell::new("·").fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(msg.id.to_string()).fg(Color::DarkGrey),
            from,
            body,
            read,
            Cell::new(format_relative_time(&msg.created_at)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} message{}",
        style(page.items.len()).bold(),
        plural(page.items.len())
    );
    print_next_cursor(page.next_cursor.as_ref());
    println!();

    Ok(())
}

/// Send a message as the caller.
pub async fn send(state: &AppState, caller: &Caller, args: SendArgs, json: bool) -> Result<()> {
    let input = NewMessage {
        conversation_id: args.conversation,
        sender_id: caller.user_id.clone(),
        sender_name: args.name.unwrap_or_else(|| caller.user_id.clone()),
        sender_role: caller.role,
        content: args.content,
        message_type: args.message_type,
        attachment_url: args.attachment_url,
        attachment_name: args.attachment_name,
    };

    let msg = state.messaging.create_message(input).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&msg)?);
        return Ok(());
    }

    println!(
        "  {} Sent {}",
        style("✓").green().bold(),
        style(msg.id.to_string()).dim()
    );
    Ok(())
}

/// Mark one message as read by the caller.
pub async fn mark_read(
    state: &AppState,
    caller: &Caller,
    id: &MessageId,
    json: bool,
) -> Result<()> {
    let msg = state.messaging.mark_message_as_read(id, caller).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&msg)?);
        return Ok(());
    }

    if msg.is_read {
        println!("  {} Message marked as read.", style("✓").green().bold());
    } else {
        println!("  {}", style("Nothing to mark: the message is not addressed to you.").dim());
    }
    Ok(())
}

/// Soft-delete a message, confirming first unless `force`.
pub async fn delete(
    state: &AppState,
    caller: &Caller,
    id: &MessageId,
    force: bool,
    json: bool,
) -> Result<()> {
    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete message {}? It stays visible to moderators.",
                style(id.to_string()).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let msg = state.messaging.soft_delete_message(id, caller).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"deleted": true, "message_id": msg.id})
        );
    } else {
        println!("  {} Message deleted.", style("✓").red().bold());
    }
    Ok(())
}

fn message_body(msg: &Message) -> String {
    let text = truncate(&msg.content, 60);
    match (&msg.attachment_name, &msg.attachment_url) {
        (Some(name), _) => format!("{text} 📎 {name}"),
        (None, Some(_)) => format!("{text} 📎"),
        (None, None) => text,
    }
}
