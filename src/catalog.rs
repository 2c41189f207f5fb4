use crate::{
    error::{AppError, Result},
    types::PlatformOAuthConfig,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize)]
pub struct PlatformEntry {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub oauth: PlatformOAuthConfig,
}

/// OAuth descriptors of the platforms the dashboard can link.
#[derive(Debug, Clone, Default)]
pub struct PlatformCatalog {
    platforms: BTreeMap<String, PlatformEntry>,
}

fn descriptor(auth_url: &str, token_url: &str, scopes: &[&str]) -> PlatformOAuthConfig {
    PlatformOAuthConfig {
        auth_url: auth_url.to_string(),
        token_url: token_url.to_string(),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
        headers: HashMap::new(),
    }
}

impl PlatformCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::empty();

        catalog.insert(
            "twitch",
            "Twitch",
            descriptor(
                "https://id.twitch.tv/oauth2/authorize",
                "https://id.twitch.tv/oauth2/token",
                &[
                    "user:read:email",
                    "channel:read:stream_key",
                    "channel:manage:broadcast",
                    "chat:read",
                    "chat:edit",
                ],
            ),
        );
        // Google only issues refresh tokens for offline access with forced consent
        catalog.insert(
            "youtube",
            "YouTube",
            descriptor(
                "https://accounts.google.com/o/oauth2/v2/auth?access_type=offline&prompt=consent",
                "https://oauth2.googleapis.com/token",
                &[
                    "https://www.googleapis.com/auth/youtube",
                    "https://www.googleapis.com/auth/youtube.force-ssl",
                ],
            ),
        );
        catalog.insert(
            "discord",
            "Discord",
            descriptor(
                "https://discord.com/oauth2/authorize",
                "https://discord.com/api/oauth2/token",
                &["identify", "guilds", "webhook.incoming"],
            ),
        );
        catalog.insert(
            "kick",
            "Kick",
            descriptor(
                "https://id.kick.com/oauth/authorize",
                "https://id.kick.com/oauth/token",
                &["user:read", "channel:read", "channel:write", "chat:write"],
            ),
        );
        catalog.insert(
            "facebook",
            "Facebook Live",
            descriptor(
                "https://www.facebook.com/v19.0/dialog/oauth",
                "https://graph.facebook.com/v19.0/oauth/access_token",
                &["publish_video", "pages_show_list", "pages_manage_posts"],
            ),
        );

        catalog
    }

    pub fn insert(&mut self, id: &str, name: &str, oauth: PlatformOAuthConfig) {
        self.platforms.insert(
            id.to_string(),
            PlatformEntry {
                id: id.to_string(),
                name: name.to_string(),
                oauth,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&PlatformEntry> {
        self.platforms.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PlatformEntry> {
        self.platforms.get_mut(id)
    }

    pub fn oauth(&self, id: &str) -> Result<&PlatformOAuthConfig> {
        self.get(id)
            .map(|entry| &entry.oauth)
            .ok_or_else(|| AppError::UnknownPlatform(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.platforms.keys().map(String::as_str)
    }
}
