//! # Sources Module
//!
//! Resolución de canciones a partir de lo que escribe el usuario.
//!
//! Two external catalogs sit behind one capability, [`TrackResolver`]:
//!
//! - [`VideoHost`] (YouTube through `yt-dlp`) is the only stream source.
//! - [`MetadataService`] (Spotify Web API) is only used to identify tracks;
//!   a Spotify link is turned into a `"<name> <artist> official audio"`
//!   text search against the video host.
//!
//! Stream locators expire, so nothing resolved at enqueue time is kept
//! except the original query. [`TrackResolver::resolve_stream`] is called
//! again right before each playback start.

pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serenity::model::id::UserId;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{MusicError, MusicResult};

pub use spotify::SpotifyClient;
pub use youtube::YtDlpClient;

static YOUTUBE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("regex de YouTube válida")
});

/// Elemento devuelto por el servicio de vídeo
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedItem {
    pub stream_url: String,
    pub title: String,
    pub duration_secs: u64,
}

/// Referencia a una canción del servicio de metadatos
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRef {
    pub name: String,
    pub primary_artist: String,
}

impl TrackRef {
    /// Texto de búsqueda compuesto que se envía al servicio de vídeo.
    pub fn search_text(&self) -> String {
        format!("{} {} official audio", self.name, self.primary_artist)
    }
}

/// Video-hosting service: the only place audio streams come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoHost: Send + Sync {
    /// Extracts a direct link, or a `ytsearchN:` term, into playable items.
    async fn extract(&self, target: &str) -> MusicResult<Vec<ExtractedItem>>;
}

/// Metadata service: identification only, never a stream source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn lookup_track(&self, id: &str) -> MusicResult<TrackRef>;

    async fn lookup_playlist_tracks(&self, id: &str) -> MusicResult<Vec<TrackRef>>;
}

/// Descriptor inmutable de una canción en cola.
///
/// `id` is zero until the queue store accepts the track; the store uses it
/// to tell whether the head changed while it was being re-resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    id: u64,
    source_query: String,
    title: String,
    duration_secs: u64,
    requested_by: Option<UserId>,
    added_at: DateTime<Utc>,
}

impl TrackDescriptor {
    pub fn new(source_query: impl Into<String>, title: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            id: 0,
            source_query: source_query.into(),
            title: title.into(),
            duration_secs,
            requested_by: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }

    pub(crate) fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    // Getters
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn source_query(&self) -> &str {
        &self.source_query
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }
}

/// Stream recién resuelto, válido solo para el arranque inmediato.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub stream_url: String,
    pub title: String,
    pub duration_secs: u64,
}

impl From<ExtractedItem> for ResolvedStream {
    fn from(item: ExtractedItem) -> Self {
        Self {
            stream_url: item.stream_url,
            title: item.title,
            duration_secs: item.duration_secs,
        }
    }
}

/// Tipo de consulta detectado
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKind {
    VideoLink(String),
    SpotifyTrack(String),
    SpotifyPlaylist(String),
    UnsupportedSpotify(String),
    Search(String),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let query = query.trim();

        if YOUTUBE_LINK.is_match(query) {
            return Self::VideoLink(query.to_string());
        }

        if let Some(kind) = Self::classify_spotify(query) {
            return kind;
        }

        Self::Search(query.to_string())
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self, Self::SpotifyPlaylist(_))
    }

    fn classify_spotify(query: &str) -> Option<Self> {
        // spotify:track:<id>
        if let Some(rest) = query.strip_prefix("spotify:") {
            let mut parts = rest.splitn(2, ':');
            let kind = parts.next()?;
            let id = parts.next()?.to_string();
            return Some(Self::spotify_kind(kind, id, query));
        }

        let url = Url::parse(query).ok()?;
        if !url.host_str()?.ends_with("spotify.com") {
            return None;
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty() && !seg.starts_with("intl-")).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [kind, id, ..] => Some(Self::spotify_kind(kind, id.to_string(), query)),
            _ => Some(Self::UnsupportedSpotify(query.to_string())),
        }
    }

    fn spotify_kind(kind: &str, id: String, original: &str) -> Self {
        match kind {
            "track" => Self::SpotifyTrack(id),
            "playlist" => Self::SpotifyPlaylist(id),
            _ => Self::UnsupportedSpotify(original.to_string()),
        }
    }
}

/// Canción pendiente de resolver contra el servicio de vídeo
#[derive(Debug, Clone, PartialEq)]
pub enum PendingTrack {
    Link(String),
    Search(String),
}

impl PendingTrack {
    /// The query stored in the descriptor and re-resolved at play time.
    pub fn source_query(&self) -> &str {
        match self {
            Self::Link(q) | Self::Search(q) => q,
        }
    }

    fn extraction_target(&self) -> String {
        match self {
            Self::Link(url) => url.clone(),
            Self::Search(text) => format!("ytsearch1:{}", text),
        }
    }
}

/// Resultado de `resolve`: éxitos y fallos por canción
#[derive(Debug, Default)]
pub struct Resolution {
    pub tracks: Vec<TrackDescriptor>,
    pub failures: Vec<(String, MusicError)>,
}

/// Resolver de canciones sobre los dos catálogos externos.
pub struct TrackResolver {
    video: Arc<dyn VideoHost>,
    metadata: Arc<dyn MetadataService>,
    max_playlist_size: usize,
    lookup_timeout: Duration,
}

impl TrackResolver {
    pub fn new(
        video: Arc<dyn VideoHost>,
        metadata: Arc<dyn MetadataService>,
        max_playlist_size: usize,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            video,
            metadata,
            max_playlist_size,
            lookup_timeout,
        }
    }

    /// Resolves a user query into zero or more descriptors.
    ///
    /// A playlist entry that fails to resolve is recorded in
    /// [`Resolution::failures`] and does not abort the remaining entries.
    /// A single link or search fails as a whole.
    pub async fn resolve(&self, query: &str) -> MusicResult<Resolution> {
        let playlist = QueryKind::classify(query).is_playlist();
        let pending = self.plan(query).await?;
        let mut resolution = Resolution::default();

        for item in pending {
            match self.resolve_pending(&item).await {
                Ok(track) => resolution.tracks.push(track),
                Err(e) if !playlist => return Err(e),
                Err(e) => {
                    warn!("⚠️ No se pudo resolver '{}': {}", item.source_query(), e);
                    resolution.failures.push((item.source_query().to_string(), e));
                }
            }
        }

        Ok(resolution)
    }

    /// Metadata-only half of [`resolve`](Self::resolve): turns the query into
    /// the list of video-host lookups to perform.
    pub async fn plan(&self, query: &str) -> MusicResult<Vec<PendingTrack>> {
        match QueryKind::classify(query) {
            QueryKind::VideoLink(url) => Ok(vec![PendingTrack::Link(url)]),
            QueryKind::Search(text) => {
                if text.is_empty() {
                    return Err(MusicError::precondition("❌ Escribe algo para buscar."));
                }
                Ok(vec![PendingTrack::Search(text)])
            }
            QueryKind::SpotifyTrack(id) => {
                let track = self.bounded(self.metadata.lookup_track(&id)).await?;
                debug!("🟢 Spotify track {} -> {}", id, track.search_text());
                Ok(vec![PendingTrack::Search(track.search_text())])
            }
            QueryKind::SpotifyPlaylist(id) => {
                let tracks = self.bounded(self.metadata.lookup_playlist_tracks(&id)).await?;
                if tracks.len() > self.max_playlist_size {
                    info!(
                        "📋 Playlist {} recortada de {} a {} canciones",
                        id,
                        tracks.len(),
                        self.max_playlist_size
                    );
                }
                Ok(tracks
                    .iter()
                    .take(self.max_playlist_size)
                    .map(|t| PendingTrack::Search(t.search_text()))
                    .collect())
            }
            QueryKind::UnsupportedSpotify(link) => Err(MusicError::precondition(format!(
                "❌ Enlace de Spotify no soportado: {}",
                link
            ))),
        }
    }

    /// Resolves one planned lookup into a descriptor (title and duration).
    pub async fn resolve_pending(&self, pending: &PendingTrack) -> MusicResult<TrackDescriptor> {
        let item = self.first_item(&pending.extraction_target()).await?;
        Ok(TrackDescriptor::new(
            pending.source_query(),
            item.title,
            item.duration_secs,
        ))
    }

    /// Re-resolves a descriptor's original query into a fresh stream locator.
    pub async fn resolve_stream(&self, source_query: &str) -> MusicResult<ResolvedStream> {
        let pending = match QueryKind::classify(source_query) {
            QueryKind::VideoLink(url) => PendingTrack::Link(url),
            _ => PendingTrack::Search(source_query.to_string()),
        };

        let item = self.first_item(&pending.extraction_target()).await?;
        Ok(item.into())
    }

    /// First extracted item that carries a usable audio stream.
    async fn first_item(&self, target: &str) -> MusicResult<ExtractedItem> {
        let item = self
            .bounded(self.video.extract(target))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::resolution(format!("sin resultados para '{}'", target)))?;

        if item.stream_url.is_empty() {
            return Err(MusicError::resolution(format!(
                "sin stream de audio para '{}'",
                target
            )));
        }
        Ok(item)
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = MusicResult<T>>) -> MusicResult<T> {
        tokio::time::timeout(self.lookup_timeout, fut)
            .await
            .map_err(|_| {
                MusicError::resolution(format!(
                    "tiempo de espera agotado ({})",
                    humantime::format_duration(self.lookup_timeout)
                ))
            })?
    }
}
