use crate::{
    errors::AuthError,
    identity::{
        Delegation,
        IdentityProvider,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

/// Authentication state as seen by the rest of the client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Delegation>,
    pub is_authenticated: bool,
}

/// Owns the login lifecycle against a single identity provider endpoint.
pub struct SessionManager<P> {
    provider: P,
    identity_provider_url: String,
    session: Session,
}

impl<P: IdentityProvider> SessionManager<P> {
    /// Restores a previously delegated identity, if the provider still holds
    /// one. Never fails: anything unusable means "not logged in".
    pub async fn init(provider: P, identity_provider_url: impl Into<String>) -> Self {
        let is_authenticated = provider.is_authenticated().await;
        let identity = if is_authenticated {
            provider.identity()
        } else {
            None
        };
        let session = Session {
            is_authenticated: identity.is_some(),
            identity,
        };
        match &session.identity {
            Some(d) => info!(principal = %d.principal, "restored delegated session"),
            None => info!("no delegated session to restore"),
        }
        Self {
            provider,
            identity_provider_url: identity_provider_url.into(),
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated
    }

    pub fn identity(&self) -> Option<&Delegation> {
        self.session.identity.as_ref()
    }

    pub fn identity_provider_url(&self) -> &str {
        &self.identity_provider_url
    }

    pub async fn login(&mut self) -> Result<&Delegation, AuthError> {
        match self.provider.login(&self.identity_provider_url).await {
            Ok(delegation) => {
                info!(principal = %delegation.principal, "login succeeded");
                self.session.is_authenticated = true;
                Ok(self.session.identity.insert(delegation))
            }
            Err(err) => {
                warn!(error = %err, "login failed");
                Err(err)
            }
        }
    }

    pub async fn logout(&mut self) {
        if !self.session.is_authenticated {
            debug!("logout requested without a session");
            return;
        }
        self.provider.logout().await;
        self.session = Session::default();
        info!("logged out");
    }
}
