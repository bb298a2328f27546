//! Steam Web API client for fetching owned games.

use crate::library_sync::{ExternalGameEntry, ExternalLibraryFetcher};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const STEAM_API_BASE: &str = "https://api.steampowered.com";

pub struct SteamClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct OwnedGamesResponse {
    response: Option<OwnedGamesContainer>,
}

#[derive(Deserialize)]
struct OwnedGamesContainer {
    games: Option<Vec<SteamGame>>,
}

#[derive(Deserialize)]
struct SteamGame {
    appid: u64,
    name: Option<String>,
    img_icon_url: Option<String>,
}

impl SteamClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn owned_games_url(&self) -> String {
        format!("{}/IPlayerService/GetOwnedGames/v0001/", self.base_url)
    }
}

impl ExternalLibraryFetcher for SteamClient {
    fn fetch_library(&self, handle: &str) -> Result<Vec<ExternalGameEntry>> {
        debug!("Fetching owned games of steam user {}", handle);

        let response = self
            .client
            .get(self.owned_games_url())
            .query(&[
                ("key", self.api_key.as_str()),
                ("steamid", handle),
                ("format", "json"),
                ("include_appinfo", "1"),
            ])
            .send()
            .context("Steam API request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Steam API failed with status {}", response.status());
        }

        let body = response.text()?;
        parse_owned_games(&body)
    }
}

/// Parses a `GetOwnedGames` response body. A response without a `games` array
/// (private profile, no games) is an empty library.
pub fn parse_owned_games(body: &str) -> Result<Vec<ExternalGameEntry>> {
    let parsed: OwnedGamesResponse =
        serde_json::from_str(body).context("Invalid GetOwnedGames response")?;

    let games = parsed
        .response
        .and_then(|r| r.games)
        .unwrap_or_default();

    Ok(games
        .into_iter()
        .map(|g| ExternalGameEntry {
            id: g.appid.to_string(),
            name: g.name.unwrap_or_default(),
            icon: g.img_icon_url.unwrap_or_default(),
        })
        .collect())
}
