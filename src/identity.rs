use crate::errors::AuthError;
use chrono::{
    DateTime,
    Utc,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::ErrorKind,
    path::{
        Path,
        PathBuf,
    },
};
use tracing::{
    info,
    warn,
};

pub const DEFAULT_IDENTITY_PROVIDER_URL: &str = "https://identity.ic0.app";
const DELEGATION_FILE: &str = "delegation.json";

/// Credential issued by the identity provider for the logged-in user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub principal: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Delegation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegation")
            .field("principal", &self.principal)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Delegation-based login as offered by an external identity provider.
///
/// `login` resolves exactly once, either with the issued delegation or with
/// the reason the provider refused it.
pub trait IdentityProvider {
    fn is_authenticated(&self) -> impl Future<Output = bool>;

    fn identity(&self) -> Option<Delegation>;

    fn login(
        &mut self,
        identity_provider_url: &str,
    ) -> impl Future<Output = Result<Delegation, AuthError>>;

    fn logout(&mut self) -> impl Future<Output = ()>;
}

/// Persists the last issued delegation so a restart can restore the session.
#[derive(Clone, Debug)]
pub struct DelegationStore {
    path: PathBuf,
}

impl DelegationStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(DELEGATION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Delegation>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).wrap_err_with(|| {
                    format!("Failed to read delegation {}", self.path.display())
                });
            }
        };
        let delegation = serde_json::from_str(&raw).wrap_err_with(|| {
            format!("Failed to parse delegation {}", self.path.display())
        })?;
        Ok(Some(delegation))
    }

    pub fn save(&self, delegation: &Delegation) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(delegation)
            .wrap_err("Failed to serialize delegation")?;
        fs::write(&self.path, json).wrap_err_with(|| {
            format!("Failed to write delegation {}", self.path.display())
        })
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).wrap_err_with(|| {
                format!("Failed to remove delegation {}", self.path.display())
            }),
        }
    }
}

/// Talks to an identity provider over HTTP and keeps the issued delegation
/// on disk.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    store: DelegationStore,
    delegation: Option<Delegation>,
    provider_url: String,
}

impl HttpIdentityProvider {
    /// Builds the client and restores any delegation left by a previous run.
    pub fn create(
        store: DelegationStore,
        provider_url: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for identity provider")?;
        let delegation = match store.load() {
            Ok(found) => found,
            Err(err) => {
                warn!(?err, "ignoring unreadable delegation");
                None
            }
        };
        Ok(Self {
            http,
            store,
            delegation,
            provider_url: provider_url.into(),
        })
    }

    fn endpoint(base_url: &str, path: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    }
}

impl IdentityProvider for HttpIdentityProvider {
    async fn is_authenticated(&self) -> bool {
        match &self.delegation {
            Some(d) if d.is_expired_at(Utc::now()) => {
                warn!(principal = %d.principal, "stored delegation expired");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn identity(&self) -> Option<Delegation> {
        self.delegation
            .clone()
            .filter(|d| !d.is_expired_at(Utc::now()))
    }

    async fn login(
        &mut self,
        identity_provider_url: &str,
    ) -> Result<Delegation, AuthError> {
        let url = Self::endpoint(identity_provider_url, "login");
        info!(%url, "starting delegation login");
        let res = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let dto: DelegationDto = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        let delegation = Delegation::from(dto);
        self.store
            .save(&delegation)
            .map_err(|e| AuthError::Storage(format!("{e:#}")))?;
        self.provider_url = identity_provider_url.to_string();
        self.delegation = Some(delegation.clone());
        Ok(delegation)
    }

    async fn logout(&mut self) {
        let Some(delegation) = self.delegation.take() else {
            return;
        };
        let url = Self::endpoint(&self.provider_url, "logout");
        match self
            .http
            .post(url)
            .bearer_auth(&delegation.token)
            .send()
            .await
        {
            Ok(res) if res.status().is_success() => {}
            Ok(res) => warn!(status = %res.status(), "provider logout not acknowledged"),
            Err(err) => warn!(?err, "provider logout failed"),
        }
        if let Err(err) = self.store.clear() {
            warn!(?err, "failed to remove stored delegation");
        }
    }
}

#[derive(Deserialize)]
struct DelegationDto {
    principal: String,
    token: String,
    expires_at: DateTime<Utc>,
}

impl From<DelegationDto> for Delegation {
    fn from(dto: DelegationDto) -> Self {
        Self {
            principal: dto.principal,
            token: dto.token,
            expires_at: dto.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::http_stub::{
        closed_url,
        serve_once,
    };
    use chrono::Duration;

    fn arb_delegation(expires_at: DateTime<Utc>) -> Delegation {
        Delegation {
            principal: "aaaaa-aa".to_string(),
            token: "secret-token".to_string(),
            expires_at,
        }
    }

    #[test]
    fn load__missing_file__returns_none() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::new(dir.path());

        // when
        let loaded = store.load().unwrap();

        // then
        assert_eq!(None, loaded);
    }

    #[test]
    fn save__then_load__restores_same_delegation() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::new(&dir.path().join("nested"));
        let delegation = arb_delegation(Utc::now() + Duration::hours(1));

        // when
        store.save(&delegation).unwrap();
        let loaded = store.load().unwrap();

        // then
        assert_eq!(Some(delegation), loaded);
    }

    #[test]
    fn clear__missing_file__is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::new(dir.path());

        store.clear().unwrap();
        store.clear().unwrap();

        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn create__expired_delegation__is_not_authenticated() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::new(dir.path());
        store
            .save(&arb_delegation(Utc::now() - Duration::minutes(5)))
            .unwrap();

        // when
        let provider =
            HttpIdentityProvider::create(store, DEFAULT_IDENTITY_PROVIDER_URL).unwrap();

        // then
        assert!(!provider.is_authenticated().await);
        assert_eq!(None, provider.identity());
    }

    #[tokio::test]
    async fn create__corrupt_delegation__is_not_fatal() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::new(dir.path());
        fs::write(store.path(), "{ not json").unwrap();

        // when
        let provider =
            HttpIdentityProvider::create(store, DEFAULT_IDENTITY_PROVIDER_URL).unwrap();

        // then
        assert!(!provider.is_authenticated().await);
    }

    #[tokio::test]
    async fn logout__without_delegation__keeps_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::new(dir.path());
        let mut provider =
            HttpIdentityProvider::create(store.clone(), DEFAULT_IDENTITY_PROVIDER_URL)
                .unwrap();

        provider.logout().await;

        assert!(!provider.is_authenticated().await);
        assert!(!store.path().exists());
    }

    #[test]
    fn debug__redacts_token() {
        let delegation = arb_delegation(Utc::now());

        let printed = format!("{delegation:?}");

        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("aaaaa-aa"));
    }

    fn provider_in(dir: &Path, url: &str) -> HttpIdentityProvider {
        HttpIdentityProvider::create(DelegationStore::new(dir), url).unwrap()
    }

    #[tokio::test]
    async fn login__ok_response__persists_delegation() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let stub = serve_once(
            200,
            r#"{ "principal": "2vxsx-fae", "token": "abc", "expires_at": "2099-01-01T00:00:00Z" }"#,
        )
        .await;
        let mut provider = provider_in(dir.path(), DEFAULT_IDENTITY_PROVIDER_URL);

        // when
        let delegation = provider.login(&stub.url).await.unwrap();

        // then
        assert_eq!("2vxsx-fae", delegation.principal);
        assert!(provider.is_authenticated().await);
        let stored = DelegationStore::new(dir.path()).load().unwrap();
        assert_eq!(Some(delegation), stored);
        assert!(stub.request.await.unwrap().starts_with("POST /login "));
    }

    #[tokio::test]
    async fn login__non_success_status__is_rejected_and_not_persisted() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let stub = serve_once(403, "delegation denied").await;
        let mut provider = provider_in(dir.path(), DEFAULT_IDENTITY_PROVIDER_URL);

        // when
        let result = provider.login(&stub.url).await;

        // then
        assert_eq!(
            Err(AuthError::Rejected {
                status: 403,
                body: "delegation denied".to_string(),
            }),
            result
        );
        assert!(!provider.is_authenticated().await);
        assert!(!dir.path().join(DELEGATION_FILE).exists());
    }

    #[tokio::test]
    async fn login__malformed_body__is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let stub = serve_once(200, r#"{ "principal": "2vxsx-fae" }"#).await;
        let mut provider = provider_in(dir.path(), DEFAULT_IDENTITY_PROVIDER_URL);

        let result = provider.login(&stub.url).await;

        assert!(matches!(result, Err(AuthError::Decode(_))), "{result:?}");
    }

    #[tokio::test]
    async fn login__nothing_listening__is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = closed_url().await;
        let mut provider = provider_in(dir.path(), &url);

        let result = provider.login(&url).await;

        assert!(matches!(result, Err(AuthError::Transport(_))), "{result:?}");
    }

    #[tokio::test]
    async fn logout__after_login__removes_delegation_file() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let login = serve_once(
            200,
            r#"{ "principal": "2vxsx-fae", "token": "abc", "expires_at": "2099-01-01T00:00:00Z" }"#,
        )
        .await;
        let mut provider = provider_in(dir.path(), &login.url);
        provider.login(&login.url).await.unwrap();
        let logout = serve_once(200, "").await;
        provider.provider_url = logout.url.clone();

        // when
        provider.logout().await;

        // then
        assert!(!provider.is_authenticated().await);
        assert!(!dir.path().join(DELEGATION_FILE).exists());
        let request = logout.request.await.unwrap().to_lowercase();
        assert!(request.starts_with("post /logout "));
        assert!(request.contains("authorization: bearer abc"));
    }
}
