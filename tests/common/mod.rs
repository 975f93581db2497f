#![allow(dead_code)]

use assetdesk::error::{EntitlementError, Result};
use assetdesk::notifications::ToastQueue;
use assetdesk::payment::{EntitlementBackend, SubscriptionState, SubscriptionStore};
use assetdesk::session::MemorySessionStorage;
use assetdesk::{LimitInfo, Subscription, SubscriptionSnapshot};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use url::Url;

/// Scripted stand-in for the organization status endpoints
pub struct MockBackend {
    status: Mutex<SubscriptionSnapshot>,
    granted_on_trial: Mutex<SubscriptionSnapshot>,
    fail_status: AtomicBool,
    fail_trial: AtomicBool,
    status_holds: Mutex<VecDeque<oneshot::Receiver<()>>>,
    trial_hold: Mutex<Option<oneshot::Receiver<()>>>,
    status_calls: AtomicUsize,
    trial_calls: AtomicUsize,
    organizations: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(status: SubscriptionSnapshot) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(status),
            granted_on_trial: Mutex::new(trial_snapshot()),
            fail_status: AtomicBool::new(false),
            fail_trial: AtomicBool::new(false),
            status_holds: Mutex::new(VecDeque::new()),
            trial_hold: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            trial_calls: AtomicUsize::new(0),
            organizations: Mutex::new(Vec::new()),
        })
    }

    /// Change what the next status fetches return
    pub fn set_status(&self, status: SubscriptionSnapshot) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_trial(&self, fail: bool) {
        self.fail_trial.store(fail, Ordering::SeqCst);
    }

    /// Hold the next status fetch until the returned sender fires.
    ///
    /// The response is captured when the request arrives, not when released.
    pub fn hold_next_status(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.status_holds.lock().unwrap().push_back(rx);
        tx
    }

    pub fn hold_next_trial(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.trial_hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn trial_calls(&self) -> usize {
        self.trial_calls.load(Ordering::SeqCst)
    }

    pub fn organizations(&self) -> Vec<String> {
        self.organizations.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntitlementBackend for MockBackend {
    async fn fetch_status(&self, organization_id: &str) -> Result<SubscriptionSnapshot> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.organizations.lock().unwrap().push(organization_id.to_string());

        let response = if self.fail_status.load(Ordering::SeqCst) {
            Err(EntitlementError::Status {
                status: 503,
                body: "maintenance".to_string(),
            })
        } else {
            Ok(self.status.lock().unwrap().clone())
        };

        let hold = self.status_holds.lock().unwrap().pop_front();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        response
    }

    async fn activate_free_trial(&self, _organization_id: &str) -> Result<()> {
        self.trial_calls.fetch_add(1, Ordering::SeqCst);

        let hold = self.trial_hold.lock().unwrap().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }

        if self.fail_trial.load(Ordering::SeqCst) {
            return Err(EntitlementError::Status {
                status: 409,
                body: "Trial already used".to_string(),
            });
        }

        let granted = self.granted_on_trial.lock().unwrap().clone();
        self.set_status(granted);
        Ok(())
    }
}

/// Store wired to a mock backend, an in-memory session and a toast queue
pub struct Harness {
    pub store: Arc<SubscriptionStore>,
    pub backend: Arc<MockBackend>,
    pub session: Arc<MemorySessionStorage>,
    pub toasts: Arc<ToastQueue>,
}

impl Harness {
    pub fn new(status: SubscriptionSnapshot) -> Self {
        Self::build(status, Arc::new(MemorySessionStorage::with_organization("org_1")))
    }

    pub fn without_organization(status: SubscriptionSnapshot) -> Self {
        Self::build(status, Arc::new(MemorySessionStorage::new()))
    }

    pub fn with_session(status: SubscriptionSnapshot, session: Arc<MemorySessionStorage>) -> Self {
        Self::build(status, session)
    }

    fn build(status: SubscriptionSnapshot, session: Arc<MemorySessionStorage>) -> Self {
        let backend = MockBackend::new(status);
        let toasts = Arc::new(ToastQueue::new());
        let store = Arc::new(SubscriptionStore::new(
            backend.clone(),
            session.clone(),
            toasts.clone(),
        ));
        Self {
            store,
            backend,
            session,
            toasts,
        }
    }
}

pub fn limits(entries: &[(&str, LimitInfo)]) -> HashMap<String, LimitInfo> {
    entries
        .iter()
        .map(|(name, info)| (name.to_string(), info.clone()))
        .collect()
}

pub fn active_snapshot() -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        subscription: Some(Subscription {
            id: Some("sub_1".to_string()),
            plan_name: Some("Business".to_string()),
            status: Some(SubscriptionState::Active),
            ..Default::default()
        }),
        limits: limits(&[
            ("staff", LimitInfo::bounded(5, 3, true)),
            ("assets", LimitInfo::unlimited(120)),
            ("clients", LimitInfo::bounded(10, 10, false)),
        ]),
    }
}

/// The "empty org" fixture: no plan, staff quota used up.
pub fn empty_org_snapshot() -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        subscription: None,
        limits: limits(&[("staff", LimitInfo::bounded(2, 2, false))]),
    }
}

pub fn trial_snapshot() -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        subscription: Some(Subscription {
            id: Some("sub_trial".to_string()),
            plan_name: Some("Free Trial".to_string()),
            status: Some(SubscriptionState::Trialing),
            is_trial: true,
            ..Default::default()
        }),
        limits: limits(&[
            ("staff", LimitInfo::bounded(5, 2, true)),
            ("assets", LimitInfo::bounded(50, 0, true)),
            ("clients", LimitInfo::bounded(5, 0, true)),
            ("vendors", LimitInfo::bounded(5, 0, true)),
        ]),
    }
}

/// Request line and headers as received by [`StubServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// One-connection-per-response HTTP/1.1 server on a loopback port.
///
/// Answers each incoming request with the next scripted `(status, body)`
/// pair, then stops accepting.
pub struct StubServer {
    pub base_url: Url,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                if let Some(request) = read_request(&mut socket).await {
                    recorded.lock().unwrap().push(request);
                }
                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: Url::parse(&format!("http://{}/api", address)).unwrap(),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    while !received.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        received.extend_from_slice(&chunk[..read]);
    }

    let text = String::from_utf8_lossy(&received).into_owned();
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    Some(RecordedRequest {
        method,
        path,
        headers,
    })
}

/// Helper to wait for async operations with timeout
pub async fn wait_for_condition<F>(condition: F, timeout_ms: u64) -> bool
where
    F: Fn() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    false
}
