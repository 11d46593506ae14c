use thiserror::Error;
use tracing::{
    debug,
    error,
};

/// Failure reported by the remote ledger service.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("ledger request failed: {0}")]
    Transport(String),
    #[error("ledger rejected the call ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid ledger response: {0}")]
    Decode(String),
}

/// Failure reported by the identity provider.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("identity provider unreachable: {0}")]
    Transport(String),
    #[error("login rejected by identity provider ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid identity provider response: {0}")]
    Decode(String),
    #[error("could not persist delegation: {0}")]
    Storage(String),
}

/// Everything that can end up on the error surface.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("Login failed: {0}")]
    AuthFailure(#[from] AuthError),
    // Displayed verbatim, the way the remote reported it.
    #[error("{0}")]
    CallFailure(#[from] RemoteError),
    #[error("Please log in first")]
    NotAuthenticated,
}

/// Holds the most recent failure for display. Cleared by the next successful
/// login, logout or wager call.
#[derive(Clone, Debug, Default)]
pub struct ErrorSurface {
    current: Option<GameError>,
}

impl ErrorSurface {
    pub fn present(&mut self, err: GameError) {
        error!(error = %err, "surfacing failure");
        self.current = Some(err);
    }

    pub fn clear(&mut self) {
        if self.current.take().is_some() {
            debug!("error surface cleared");
        }
    }

    pub fn current(&self) -> Option<&GameError> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn present__replaces_previous_error() {
        // given
        let mut surface = ErrorSurface::default();
        surface.present(GameError::NotAuthenticated);

        // when
        surface.present(GameError::CallFailure(RemoteError::Transport(
            "connection reset".to_string(),
        )));

        // then
        let expected = GameError::CallFailure(RemoteError::Transport(
            "connection reset".to_string(),
        ));
        assert_eq!(Some(&expected), surface.current());
    }

    #[test]
    fn clear__empties_surface() {
        // given
        let mut surface = ErrorSurface::default();
        surface.present(GameError::NotAuthenticated);

        // when
        surface.clear();

        // then
        assert_eq!(None, surface.current());
    }

    #[test]
    fn call_failure__displays_remote_message_verbatim() {
        let err = GameError::CallFailure(RemoteError::Rejected {
            status: 400,
            body: "Insufficient balance".to_string(),
        });

        assert_eq!(
            "ledger rejected the call (400): Insufficient balance",
            err.to_string()
        );
    }
}
