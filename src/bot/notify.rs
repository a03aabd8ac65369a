use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ui::Notifier;

/// Envía los avisos de cada guild al último canal de texto donde se usó un comando
pub struct ChannelNotifier {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn bind(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }

    pub fn unbind(&self, guild_id: GuildId) {
        self.channels.remove(&guild_id);
    }

    fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).map(|c| *c)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, guild_id: GuildId, message: String) {
        let Some(channel_id) = self.channel(guild_id) else {
            debug!("Sin canal de avisos para {}: {}", guild_id, message);
            return;
        };

        if let Err(e) = channel_id.say(&self.http, message).await {
            warn!("⚠️ No se pudo enviar aviso a {}: {:?}", channel_id, e);
        }
    }
}
