use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, warn};

use crate::config::Channels;
use crate::outbox::Announcement;

/// Delivers one announcement. The result is only logged, never retried.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, item: &Announcement) -> bool;
}

pub struct TelegramAnnouncer {
    bot: Bot,
    channels: Channels,
}

impl TelegramAnnouncer {
    pub fn new(bot: Bot, channels: Channels) -> Self {
        Self { bot, channels }
    }
}

#[async_trait]
impl Announcer for TelegramAnnouncer {
    async fn announce(&self, item: &Announcement) -> bool {
        let chats = self.channels.chats_for(item.class);
        if chats.is_empty() {
            debug!(class = ?item.class, "no chats subscribed");
            return true;
        }
        let text = render_message(item);
        let mut ok = true;
        for chat in chats {
            if let Err(err) = self.bot.send_message(ChatId(*chat), text.clone()).await {
                warn!(?err, chat, "telegram send failed");
                ok = false;
            }
        }
        ok
    }
}

/// Plain-text message: optional title line, body, then tags as hashtags.
pub fn render_message(item: &Announcement) -> String {
    let mut out = String::new();
    if let Some(title) = &item.title {
        out.push_str(title);
        out.push_str("\n\n");
    }
    out.push_str(&item.body);
    if !item.tags.is_empty() {
        let tags: Vec<String> = item.tags.iter().map(|t| format!("#{t}")).collect();
        out.push_str("\n\n");
        out.push_str(&tags.join(" "));
    }
    out
}
