use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64_ENGINE, Engine};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{MetadataService, TrackRef};
use crate::error::{MusicError, MusicResult};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Deserialize)]
struct SpotifyToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: String,
    // Los episodios de podcast no traen artistas
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Deserialize)]
struct PlaylistPage {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

impl SpotifyTrack {
    fn into_ref(self) -> Option<TrackRef> {
        let primary_artist = self.artists.into_iter().next()?.name;
        Some(TrackRef {
            name: self.name,
            primary_artist,
        })
    }
}

impl PlaylistPage {
    // Las entradas sin track (episodios borrados, locales) se omiten
    fn into_refs(self) -> (Vec<TrackRef>, Option<String>) {
        let refs = self
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(SpotifyTrack::into_ref)
            .collect();
        (refs, self.next)
    }
}

/// Cliente de la Web API de Spotify (solo metadatos).
///
/// Uses the client-credentials flow. The token is cached until shortly
/// before it expires.
pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    token: Mutex<Option<(String, Instant)>>,
    max_tracks: usize,
}

impl SpotifyClient {
    pub fn new(client_id: Option<String>, client_secret: Option<String>, max_tracks: usize) -> Self {
        let credentials = match (client_id, client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        };

        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            credentials,
            token: Mutex::new(None),
            max_tracks,
        }
    }

    async fn access_token(&self) -> MusicResult<String> {
        let cached = self.token.lock().clone();
        if let Some((token, expires)) = cached {
            if Instant::now() < expires {
                return Ok(token);
            }
        }

        let (id, secret) = self
            .credentials
            .as_ref()
            .ok_or_else(|| MusicError::resolution("credenciales de Spotify no configuradas"))?;

        debug!("🔑 Solicitando token de Spotify");
        let auth_b64 = B64_ENGINE.encode(format!("{}:{}", id, secret));
        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", auth_b64))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(MusicError::resolution)?;

        if !response.status().is_success() {
            return Err(MusicError::resolution(format!(
                "credenciales de Spotify rechazadas ({})",
                response.status()
            )));
        }

        let token: SpotifyToken = response.json().await.map_err(MusicError::resolution)?;
        // Margen de un minuto antes de la expiración real
        let expires = Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60));
        *self.token.lock() = Some((token.access_token.clone(), expires));

        Ok(token.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> MusicResult<T> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(MusicError::resolution)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(MusicError::NotFound(url.to_string())),
            StatusCode::UNAUTHORIZED => {
                self.token.lock().take();
                Err(MusicError::resolution("token de Spotify inválido"))
            }
            status if !status.is_success() => {
                Err(MusicError::resolution(format!("Spotify respondió {}", status)))
            }
            _ => response.json().await.map_err(MusicError::resolution),
        }
    }
}

#[async_trait]
impl MetadataService for SpotifyClient {
    async fn lookup_track(&self, id: &str) -> MusicResult<TrackRef> {
        let track: SpotifyTrack = self.get_json(&format!("{}/tracks/{}", API_BASE, id)).await?;
        track
            .into_ref()
            .ok_or_else(|| MusicError::resolution(format!("track {} sin artista", id)))
    }

    async fn lookup_playlist_tracks(&self, id: &str) -> MusicResult<Vec<TrackRef>> {
        let mut tracks = Vec::new();
        let mut next = Some(format!("{}/playlists/{}/tracks?limit=100", API_BASE, id));

        while let Some(url) = next.take() {
            let page: PlaylistPage = self.get_json(&url).await?;
            let (refs, following) = page.into_refs();
            tracks.extend(refs);

            if tracks.len() >= self.max_tracks {
                tracks.truncate(self.max_tracks);
                break;
            }
            next = following;
        }

        info!("📋 Playlist de Spotify {}: {} canciones", id, tracks.len());
        Ok(tracks)
    }
}
