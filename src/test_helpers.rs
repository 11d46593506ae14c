use crate::{
    errors::{
        AuthError,
        RemoteError,
    },
    identity::{
        Delegation,
        IdentityProvider,
    },
    ledger::LedgerService,
};
use chrono::{
    Duration as ChronoDuration,
    Utc,
};
use std::{
    collections::VecDeque,
    future::pending,
    io,
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
    },
    time::Duration,
};

pub fn arb_delegation(principal: &str) -> Delegation {
    Delegation {
        principal: principal.to_string(),
        token: format!("token-for-{principal}"),
        expires_at: Utc::now() + ChronoDuration::hours(8),
    }
}

/// Scripted answer for one `flip_coin` call.
#[derive(Clone, Debug)]
pub enum FakeFlip {
    After(Duration, Result<String, RemoteError>),
    Never,
}

impl FakeFlip {
    pub fn immediately(result: Result<String, RemoteError>) -> Self {
        Self::After(Duration::ZERO, result)
    }
}

/// In-memory ledger with scripted flip answers and call counters.
#[derive(Clone)]
pub struct FakeLedger {
    balance: Arc<AtomicU64>,
    flips: Arc<Mutex<VecDeque<FakeFlip>>>,
    bets: Arc<Mutex<Vec<u64>>>,
    balance_calls: Arc<AtomicUsize>,
}

impl FakeLedger {
    pub fn with_balance(balance: u64) -> Self {
        Self {
            balance: Arc::new(AtomicU64::new(balance)),
            flips: Arc::new(Mutex::new(VecDeque::new())),
            bets: Arc::new(Mutex::new(Vec::new())),
            balance_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_balance(&self, balance: u64) {
        self.balance.store(balance, Ordering::SeqCst);
    }

    pub fn script_flip(&self, flip: FakeFlip) {
        self.flips.lock().unwrap().push_back(flip);
    }

    /// Bets received by `flip_coin`, in call order.
    pub fn bets(&self) -> Vec<u64> {
        self.bets.lock().unwrap().clone()
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

impl LedgerService for FakeLedger {
    fn get_balance(
        &self,
        _caller: &Delegation,
    ) -> impl Future<Output = Result<u64, RemoteError>> + Send {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let balance = self.balance.load(Ordering::SeqCst);
        async move { Ok(balance) }
    }

    fn flip_coin(
        &self,
        _caller: &Delegation,
        bet_amount: u64,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send {
        self.bets.lock().unwrap().push(bet_amount);
        let scripted = self.flips.lock().unwrap().pop_front();
        async move {
            match scripted {
                Some(FakeFlip::After(delay, result)) => {
                    tokio::time::sleep(delay).await;
                    result
                }
                Some(FakeFlip::Never) => pending().await,
                None => Err(RemoteError::Transport(
                    "no scripted flip response".to_string(),
                )),
            }
        }
    }
}

/// Identity provider whose login answers are scripted by the test.
#[derive(Clone, Default)]
pub struct FakeIdentityProvider {
    delegation: Arc<Mutex<Option<Delegation>>>,
    logins: Arc<Mutex<VecDeque<Result<Delegation, AuthError>>>>,
    login_urls: Arc<Mutex<Vec<String>>>,
    logout_calls: Arc<AtomicUsize>,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that already holds a delegation from an earlier run.
    pub fn restored(delegation: Delegation) -> Self {
        let provider = Self::default();
        *provider.delegation.lock().unwrap() = Some(delegation);
        provider
    }

    pub fn script_login(&self, outcome: Result<Delegation, AuthError>) {
        self.logins.lock().unwrap().push_back(outcome);
    }

    pub fn login_urls(&self) -> Vec<String> {
        self.login_urls.lock().unwrap().clone()
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for FakeIdentityProvider {
    async fn is_authenticated(&self) -> bool {
        self.delegation.lock().unwrap().is_some()
    }

    fn identity(&self) -> Option<Delegation> {
        self.delegation.lock().unwrap().clone()
    }

    async fn login(
        &mut self,
        identity_provider_url: &str,
    ) -> Result<Delegation, AuthError> {
        self.login_urls
            .lock()
            .unwrap()
            .push(identity_provider_url.to_string());
        let outcome = self.logins.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AuthError::Transport("no scripted login response".to_string()))
        });
        if let Ok(delegation) = &outcome {
            *self.delegation.lock().unwrap() = Some(delegation.clone());
        }
        outcome
    }

    async fn logout(&mut self) {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        *self.delegation.lock().unwrap() = None;
    }
}

/// Collects formatted `tracing` output so tests can count emitted events.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Routes this thread's events into the capture until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Number of captured lines logged at `level`, e.g. "ERROR".
    pub fn count(&self, level: &str) -> usize {
        let buf = self.buf.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|line| line.split_whitespace().any(|word| word == level))
            .count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Answers exactly one HTTP request with a canned response, then closes.
#[cfg(test)]
pub mod http_stub {
    use tokio::{
        io::{
            AsyncReadExt,
            AsyncWriteExt,
        },
        net::{
            TcpListener,
            TcpStream,
        },
        task::JoinHandle,
    };

    pub struct StubServer {
        pub url: String,
        /// Raw request text, available once the response was sent.
        pub request: JoinHandle<String>,
    }

    pub async fn serve_once(status: u16, body: &str) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let request = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        StubServer {
            url: format!("http://{addr}"),
            request,
        }
    }

    /// A URL nothing listens on.
    pub async fn closed_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}
