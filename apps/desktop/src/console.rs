use std::collections::HashMap;

use client_core::{PresentationNotifier, ScrollHint};
use shared::domain::{Chat, ChatId, Message};

/// Prints notifications as they reach the presentation boundary.
pub struct ConsoleNotifier;

impl PresentationNotifier for ConsoleNotifier {
    fn on_new_message(&self, chat_id: ChatId) {
        println!("* new message in chat {chat_id}");
    }

    fn on_chats_loaded(&self, chats: &HashMap<ChatId, Chat>) {
        println!("* {} chats loaded", chats.len());
    }

    fn on_history_refreshed(&self, chat_id: ChatId, messages: &[Message], scroll: ScrollHint) {
        let scroll = match scroll {
            ScrollHint::Bottom => "bottom",
            ScrollHint::Preserve => "preserve",
        };
        println!(
            "* chat {chat_id} history refreshed ({} messages, scroll={scroll})",
            messages.len()
        );
    }

    fn on_auth_state_changed(&self, success: bool) {
        if success {
            println!("* signed in");
        } else {
            println!("* sign-in failed");
        }
    }
}
