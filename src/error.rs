use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Every error is scoped to a single guild; none of them is fatal to the
/// process. The Discord layer turns them into user-visible replies.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MusicError {
    /// An external lookup failed or returned nothing playable.
    #[error("Error de resolución: {0}")]
    Resolution(String),

    /// A direct link points at an item that is unavailable, region-locked or removed.
    #[error("Contenido no disponible: {0}")]
    NotFound(String),

    /// Voice connection or stream handoff failure.
    #[error("Error de transporte de voz: {0}")]
    Transport(String),

    /// The caller asked for something the current state does not allow.
    #[error("{0}")]
    Precondition(String),
}

impl MusicError {
    pub fn resolution(cause: impl std::fmt::Display) -> Self {
        Self::Resolution(cause.to_string())
    }

    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Lookups that found nothing playable, as opposed to voice or state errors.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_) | Self::NotFound(_))
    }
}

pub type MusicResult<T> = Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_displays_message_verbatim() {
        let err = MusicError::precondition("❌ ¡No se está reproduciendo nada!");
        assert_eq!(err.to_string(), "❌ ¡No se está reproduciendo nada!");
    }

    #[test]
    fn not_found_counts_as_resolution_failure() {
        assert!(MusicError::NotFound("video".into()).is_resolution());
        assert!(!MusicError::transport("socket").is_resolution());
    }
}
