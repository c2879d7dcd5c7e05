//! Authenticated request pipeline
//!
//! Every outbound call goes through `ApiClient::send`:
//! 1. Read the current credential and attach it as a bearer token
//! 2. Dispatch; anything other than 401 goes straight back to the caller
//! 3. On the first 401 for a request, spend its retry and wait on the
//!    single-flight refresh (joining one already in flight)
//! 4. Refresh succeeded: resend once with the new token
//! 5. Refresh failed, or the resend was rejected again: `SessionExpired`
//!
//! Only the refresh operation writes credentials; ordinary requests read.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use common::Secret;
use session_store::{CredentialStore, Scope};
use transport::{
    ApiResponse, OutboundRequest, RequestDescriptor, ResponseClass, Transport, classify_status,
};

use crate::envelope::RequestEnvelope;
use crate::error::{Error, Result};
use crate::metrics;
use crate::navigation::Navigator;
use crate::refresh::{
    Attachment, RefreshOutcome, RefreshSlot, SharedRefresh, Skip, request_new_token,
};

/// Default refresh endpoint.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Path of the credential refresh endpoint, relative to the transport's base URL.
    pub refresh_path: String,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
        }
    }
}

/// Cloneable handle to the shared pipeline.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
    config: ApiClientConfig,
    refresh: RefreshSlot,
}

/// What to do after a 401 on a first attempt.
enum Recovery {
    Wait {
        epoch: u64,
        outcome: SharedRefresh,
        started: bool,
    },
    /// The credential already changed since this request was sent.
    Replay,
    /// The credential was cleared since this request was sent.
    Expired,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
        config: ApiClientConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                navigator,
                config,
                refresh: RefreshSlot::default(),
            }),
        }
    }

    /// Credential store shared with the login flow.
    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }

    /// Whether a refresh operation is currently in flight.
    pub fn refresh_in_flight(&self) -> bool {
        self.inner.refresh.is_in_flight()
    }

    /// Send a request with the current credential attached.
    ///
    /// Returns the backend response for every status except 401, which is
    /// handled here. Errors are `Network` (no response) or `SessionExpired`.
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<ApiResponse> {
        let mut envelope = RequestEnvelope::new(descriptor);

        loop {
            let sent = self.inner.store.read().map(|c| c.access_token);
            let request = OutboundRequest::new(envelope.target().clone(), sent.clone());
            let response = self.inner.transport.execute(&request).await.map_err(|e| {
                debug!(request_id = %envelope.id(), error = %e, "request failed without response");
                Error::from(e)
            })?;

            if classify_status(response.status) != ResponseClass::Unauthorized {
                return Ok(response);
            }

            if !envelope.mark_retried() {
                warn!(
                    request_id = %envelope.id(),
                    path = %envelope.target().path,
                    "rejected again after refresh, giving up"
                );
                self.inner.reject_resend(sent.as_ref());
                return Err(Error::SessionExpired);
            }

            debug!(request_id = %envelope.id(), path = %envelope.target().path, "authorization failed");
            match self.inner.recover(sent.as_ref()).await {
                RefreshOutcome::Proceed => {
                    metrics::record_replay();
                    debug!(request_id = %envelope.id(), "replaying with refreshed credential");
                }
                RefreshOutcome::Abort => return Err(Error::SessionExpired),
            }
        }
    }

    /// GET `path` and decode a JSON body; non-success statuses become `Error::Http`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(RequestDescriptor::get(path)).await?;
        Ok(response.error_for_status()?.json()?)
    }

    /// POST a JSON body to `path` and decode the JSON reply.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let descriptor = RequestDescriptor::post(path).json(body)?;
        let response = self.send(descriptor).await?;
        Ok(response.error_for_status()?.json()?)
    }

    /// Store a credential obtained by the login flow.
    pub fn login(&self, token: &str, scope: Scope) {
        self.inner.store.write(token, scope);
        info!(%scope, "logged in");
    }

    /// Forget the current credential. No navigation is signalled.
    pub fn logout(&self) {
        self.inner.store.clear();
        info!("logged out");
    }
}

impl Inner {
    /// Attach to the refresh episode for a request that was sent with `sent`.
    async fn recover(self: &Arc<Self>, sent: Option<&Secret<String>>) -> RefreshOutcome {
        let recovery = self.attach(sent);
        match recovery {
            Recovery::Replay => RefreshOutcome::Proceed,
            Recovery::Expired => {
                metrics::record_session_expired("cleared");
                RefreshOutcome::Abort
            }
            Recovery::Wait {
                epoch,
                outcome,
                started,
            } => {
                if started {
                    info!(epoch, "starting credential refresh");
                } else {
                    debug!(epoch, "joining in-flight credential refresh");
                }
                outcome.await
            }
        }
    }

    fn attach(self: &Arc<Self>, sent: Option<&Secret<String>>) -> Recovery {
        let this = Arc::clone(self);
        let attachment = self.refresh.attach(
            || self.stale(sent),
            move |epoch| {
                let task = tokio::spawn(async move {
                    let refresh = AssertUnwindSafe(Arc::clone(&this).run_refresh(epoch));
                    match refresh.catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(epoch, "credential refresh panicked");
                            this.fail_refresh(epoch, "refresh_panicked");
                            RefreshOutcome::Abort
                        }
                    }
                });
                async move { task.await.unwrap_or(RefreshOutcome::Abort) }.boxed()
            },
        );
        match attachment {
            Attachment::Started { epoch, outcome } => Recovery::Wait {
                epoch,
                outcome,
                started: true,
            },
            Attachment::Joined { epoch, outcome } => Recovery::Wait {
                epoch,
                outcome,
                started: false,
            },
            Attachment::Skipped(Skip::Replay) => Recovery::Replay,
            Attachment::Skipped(Skip::Expired) => Recovery::Expired,
        }
    }

    /// Whether the credential moved on since a request was sent with `sent`.
    /// Called under the refresh slot lock with no refresh in flight.
    fn stale(&self, sent: Option<&Secret<String>>) -> Option<Skip> {
        match (self.store.read(), sent) {
            (Some(now), Some(then)) if now.access_token != *then => Some(Skip::Replay),
            (Some(_), None) => Some(Skip::Replay),
            (None, Some(_)) => Some(Skip::Expired),
            _ => None,
        }
    }

    /// The refresh operation itself. Runs as its own task so it settles even
    /// if every waiting caller is dropped.
    async fn run_refresh(self: Arc<Self>, epoch: u64) -> RefreshOutcome {
        let current = self.store.read();
        let scope = current.as_ref().map(|c| c.scope).unwrap_or(Scope::Durable);
        let result = request_new_token(
            self.transport.as_ref(),
            &self.config.refresh_path,
            current.map(|c| c.access_token),
        )
        .await;

        match result {
            Ok(token) => {
                self.refresh.settle(epoch, || self.store.write(token.expose(), scope));
                metrics::record_refresh("success");
                info!(epoch, %scope, "credential refreshed");
                RefreshOutcome::Proceed
            }
            Err(e) => {
                metrics::record_refresh("failure");
                warn!(epoch, error = %e, "credential refresh failed");
                self.fail_refresh(epoch, "refresh_failed");
                RefreshOutcome::Abort
            }
        }
    }

    /// Clear the credential and release the slot together, then send the
    /// user to the login surface.
    fn fail_refresh(&self, epoch: u64, reason: &'static str) {
        self.refresh.settle(epoch, || self.store.clear());
        self.session_expired(reason);
    }

    /// A resend was rejected again. Only the request still carrying the
    /// current credential ends the session; one whose credential was already
    /// replaced or cleared fails quietly.
    fn reject_resend(&self, sent: Option<&Secret<String>>) {
        let cleared = self.refresh.exclusive(|| match (self.store.read(), sent) {
            (Some(now), Some(then)) if now.access_token == *then => {
                self.store.clear();
                true
            }
            _ => false,
        });
        if cleared {
            self.session_expired("retry_rejected");
        } else {
            debug!("credential already replaced or cleared, not redirecting");
        }
    }

    fn session_expired(&self, reason: &'static str) {
        metrics::record_session_expired(reason);
        self.navigator.to_login();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::CountingNavigator;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use transport::StatusCode;

    /// In-memory backend: accepts exactly one token, issues `next_token` on refresh.
    struct FakeBackend {
        valid_token: parking_lot::Mutex<String>,
        next_token: String,
        refresh_status: StatusCode,
        refresh_delay: Duration,
        reject_everything: bool,
        refresh_calls: AtomicUsize,
        seen: parking_lot::Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeBackend {
        fn new(valid: &str, next: &str) -> Self {
            Self {
                valid_token: parking_lot::Mutex::new(valid.into()),
                next_token: next.into(),
                refresh_status: StatusCode::OK,
                refresh_delay: Duration::from_millis(50),
                reject_everything: false,
                refresh_calls: AtomicUsize::new(0),
                seen: parking_lot::Mutex::new(Vec::new()),
            }
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        fn tokens_for(&self, path: &str) -> Vec<Option<String>> {
            self.seen
                .lock()
                .iter()
                .filter(|(p, _)| p == path)
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    impl Transport for FakeBackend {
        fn execute<'a>(
            &'a self,
            request: &'a OutboundRequest,
        ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
            Box::pin(async move {
                let path = request.descriptor.path.clone();
                let bearer = request.bearer_token().map(str::to_owned);
                self.seen.lock().push((path.clone(), bearer.clone()));

                match path.as_str() {
                    "/auth/refresh" => {
                        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(self.refresh_delay).await;
                        if !self.refresh_status.is_success() {
                            return Ok(ApiResponse::new(self.refresh_status, "refresh rejected"));
                        }
                        *self.valid_token.lock() = self.next_token.clone();
                        let body = format!(r#"{{"access_token":"{}"}}"#, self.next_token);
                        Ok(ApiResponse::new(StatusCode::OK, body))
                    }
                    "/offline" => Err(transport::Error::Network("connection refused".into())),
                    "/slow" => Err(transport::Error::Timeout("30s elapsed".into())),
                    "/public" => Ok(ApiResponse::new(StatusCode::OK, "public")),
                    "/forbidden" => Ok(ApiResponse::new(StatusCode::FORBIDDEN, "nope")),
                    "/broken" => Ok(ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom")),
                    _ => {
                        let valid = self.valid_token.lock().clone();
                        if !self.reject_everything && bearer.as_deref() == Some(valid.as_str()) {
                            Ok(ApiResponse::new(StatusCode::OK, format!(r#"{{"path":"{path}"}}"#)))
                        } else {
                            Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "unauthorized"))
                        }
                    }
                }
            })
        }
    }

    struct Harness {
        client: ApiClient,
        backend: Arc<FakeBackend>,
        store: Arc<CredentialStore>,
        navigator: Arc<CountingNavigator>,
    }

    fn harness(backend: FakeBackend) -> Harness {
        let backend = Arc::new(backend);
        let store = Arc::new(CredentialStore::in_memory());
        let navigator = Arc::new(CountingNavigator::new());
        let client = ApiClient::new(
            backend.clone(),
            store.clone(),
            navigator.clone(),
            ApiClientConfig::default(),
        );
        Harness {
            client,
            backend,
            store,
            navigator,
        }
    }

    #[tokio::test]
    async fn attaches_current_credential() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);

        let resp = h.client.send(RequestDescriptor::get("/courses")).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(h.backend.tokens_for("/courses"), vec![Some("t1".to_string())]);
        assert_eq!(h.backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn sends_unauthenticated_without_credential() {
        let h = harness(FakeBackend::new("t1", "t2"));

        let resp = h.client.send(RequestDescriptor::get("/public")).await.unwrap();
        assert_eq!(resp.text(), "public");
        assert_eq!(h.backend.tokens_for("/public"), vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_then_replay_with_new_token() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);
        *h.backend.valid_token.lock() = "expired".into();

        let resp = h.client.send(RequestDescriptor::get("/me")).await.unwrap();

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(
            h.backend.tokens_for("/me"),
            vec![Some("t1".to_string()), Some("t2".to_string())]
        );
        let cred = h.store.read().unwrap();
        assert_eq!(cred.access_token.expose(), "t2");
        assert_eq!(cred.scope, Scope::Durable);
        assert!(!h.client.refresh_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_ephemeral_scope() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Ephemeral);
        *h.backend.valid_token.lock() = "expired".into();

        h.client.send(RequestDescriptor::get("/me")).await.unwrap();

        let cred = h.store.read().unwrap();
        assert_eq!(cred.scope, Scope::Ephemeral);
        assert!(h.store.scope_token(Scope::Durable).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn three_concurrent_401s_share_one_refresh() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);
        *h.backend.valid_token.lock() = "expired".into();

        let (a, b, c) = tokio::join!(
            h.client.send(RequestDescriptor::get("/a")),
            h.client.send(RequestDescriptor::get("/b")),
            h.client.send(RequestDescriptor::get("/c")),
        );

        assert_eq!(h.backend.refresh_calls(), 1);
        for resp in [a, b, c] {
            assert_eq!(resp.unwrap().status, StatusCode::OK);
        }
        for path in ["/a", "/b", "/c"] {
            assert_eq!(
                h.backend.tokens_for(path),
                vec![Some("t1".to_string()), Some("t2".to_string())],
                "{path}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn many_spawned_401s_share_one_refresh() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);
        *h.backend.valid_token.lock() = "expired".into();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let client = h.client.clone();
                tokio::spawn(async move { client.send(RequestDescriptor::get(format!("/r{i}"))).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().status, StatusCode::OK);
        }
        assert_eq!(h.backend.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_clears_store_and_navigates_once() {
        let mut backend = FakeBackend::new("expired", "t2");
        backend.refresh_status = StatusCode::UNAUTHORIZED;
        let h = harness(backend);
        h.store.write("t1", Scope::Durable);

        let (a, b, c) = tokio::join!(
            h.client.send(RequestDescriptor::get("/a")),
            h.client.send(RequestDescriptor::get("/b")),
            h.client.send(RequestDescriptor::get("/c")),
        );

        for result in [a, b, c] {
            assert!(matches!(result, Err(Error::SessionExpired)), "got {result:?}");
        }
        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(h.navigator.login_redirects(), 1);
        assert!(h.store.read().is_none());
        assert!(h.store.scope_token(Scope::Durable).is_none());
        assert!(h.store.scope_token(Scope::Ephemeral).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_server_error_fails_closed() {
        let mut backend = FakeBackend::new("expired", "t2");
        backend.refresh_status = StatusCode::SERVICE_UNAVAILABLE;
        let h = harness(backend);
        h.store.write("t1", Scope::Ephemeral);

        let result = h.client.send(RequestDescriptor::get("/me")).await;
        assert!(matches!(result, Err(Error::SessionExpired)));
        assert!(h.store.read().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_401_after_refresh_is_terminal() {
        let mut backend = FakeBackend::new("t1", "t2");
        backend.reject_everything = true;
        let h = harness(backend);
        h.store.write("t1", Scope::Durable);

        let result = h.client.send(RequestDescriptor::get("/me")).await;

        assert!(matches!(result, Err(Error::SessionExpired)), "got {result:?}");
        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(h.backend.tokens_for("/me").len(), 2);
        assert_eq!(h.navigator.login_redirects(), 1);
        assert!(h.store.read().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_rejected_resends_redirect_once() {
        let mut backend = FakeBackend::new("t1", "t2");
        backend.reject_everything = true;
        let h = harness(backend);
        h.store.write("t1", Scope::Durable);

        let (a, b, c) = tokio::join!(
            h.client.send(RequestDescriptor::get("/a")),
            h.client.send(RequestDescriptor::get("/b")),
            h.client.send(RequestDescriptor::get("/c")),
        );

        for result in [a, b, c] {
            assert!(matches!(result, Err(Error::SessionExpired)), "got {result:?}");
        }
        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(h.navigator.login_redirects(), 1);
        assert!(h.store.read().is_none());
    }

    #[tokio::test]
    async fn rejected_resend_with_old_token_keeps_newer_credential() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t3", Scope::Durable);

        let old: Secret<String> = "t2".into();
        h.client.inner.reject_resend(Some(&old));
        assert_eq!(h.store.read().unwrap().access_token.expose(), "t3");
        assert_eq!(h.navigator.login_redirects(), 0);

        let current: Secret<String> = "t3".into();
        h.client.inner.reject_resend(Some(&current));
        assert!(h.store.read().is_none());
        assert_eq!(h.navigator.login_redirects(), 1);

        // Already cleared: nothing left to expire
        h.client.inner.reject_resend(Some(&current));
        assert_eq!(h.navigator.login_redirects(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn late_401s_across_workers_never_start_a_second_refresh() {
        for _ in 0..20 {
            let mut backend = FakeBackend::new("t1", "t2");
            backend.refresh_delay = Duration::ZERO;
            let h = harness(backend);
            h.store.write("t1", Scope::Durable);
            *h.backend.valid_token.lock() = "expired".into();

            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let client = h.client.clone();
                    tokio::spawn(async move {
                        client.send(RequestDescriptor::get(format!("/r{i}"))).await
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.await.unwrap().unwrap().status, StatusCode::OK);
            }
            assert_eq!(h.backend.refresh_calls(), 1);
            assert_eq!(h.navigator.login_redirects(), 0);
            assert!(!h.client.refresh_in_flight());
        }
    }

    /// Refresh endpoint whose handler panics on its first call.
    struct PanicOnceBackend {
        valid_token: parking_lot::Mutex<String>,
        refresh_calls: AtomicUsize,
    }

    impl Transport for PanicOnceBackend {
        fn execute<'a>(
            &'a self,
            request: &'a OutboundRequest,
        ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
            Box::pin(async move {
                if request.descriptor.path == "/auth/refresh" {
                    if self.refresh_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("refresh handler bug");
                    }
                    *self.valid_token.lock() = "t2".into();
                    return Ok(ApiResponse::new(StatusCode::OK, r#"{"access_token":"t2"}"#));
                }
                let valid = self.valid_token.lock().clone();
                if request.bearer_token() == Some(valid.as_str()) {
                    Ok(ApiResponse::new(StatusCode::OK, "ok"))
                } else {
                    Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "unauthorized"))
                }
            })
        }
    }

    #[tokio::test]
    async fn panicked_refresh_releases_slot() {
        let backend = Arc::new(PanicOnceBackend {
            valid_token: parking_lot::Mutex::new("expired".into()),
            refresh_calls: AtomicUsize::new(0),
        });
        let store = Arc::new(CredentialStore::in_memory());
        let navigator = Arc::new(CountingNavigator::new());
        let client = ApiClient::new(
            backend.clone(),
            store.clone(),
            navigator.clone(),
            ApiClientConfig::default(),
        );
        store.write("t1", Scope::Durable);

        let result = client.send(RequestDescriptor::get("/me")).await;
        assert!(matches!(result, Err(Error::SessionExpired)), "got {result:?}");
        assert!(!client.refresh_in_flight());
        assert!(store.read().is_none());
        assert_eq!(navigator.login_redirects(), 1);

        // The next episode starts a fresh refresh instead of joining the dead one
        client.login("t1", Scope::Durable);
        let resp = client.send(RequestDescriptor::get("/me")).await.unwrap();
        assert_eq!(resp.text(), "ok");
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.read().unwrap().access_token.expose(), "t2");
    }

    #[tokio::test]
    async fn network_error_never_refreshes() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);

        let result = h.client.send(RequestDescriptor::get("/offline")).await;
        assert!(matches!(result, Err(Error::Network(_))), "got {result:?}");
        assert_eq!(h.backend.refresh_calls(), 0);
        assert!(h.store.read().is_some());
    }

    #[tokio::test]
    async fn transport_timeout_is_network_error() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);

        let result = h.client.send(RequestDescriptor::get("/slow")).await;
        assert!(matches!(result, Err(Error::Network(_))), "got {result:?}");
        assert_eq!(h.backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn other_error_statuses_pass_through() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);

        let forbidden = h.client.send(RequestDescriptor::get("/forbidden")).await.unwrap();
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        let broken = h.client.send(RequestDescriptor::get("/broken")).await.unwrap();
        assert_eq!(broken.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.backend.refresh_calls(), 0);
        assert_eq!(h.navigator.login_redirects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_episodes_each_refresh_once() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);
        *h.backend.valid_token.lock() = "expired".into();

        h.client.send(RequestDescriptor::get("/me")).await.unwrap();
        assert_eq!(h.backend.refresh_calls(), 1);

        // Backend rotates again; the next 401 starts a new episode
        *h.backend.valid_token.lock() = "rotated".into();
        h.client.send(RequestDescriptor::get("/me")).await.unwrap();
        assert_eq!(h.backend.refresh_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthenticated_401_refreshes_then_redirects() {
        let mut backend = FakeBackend::new("t1", "t2");
        backend.refresh_status = StatusCode::UNAUTHORIZED;
        let h = harness(backend);

        let result = h.client.send(RequestDescriptor::get("/me")).await;
        assert!(matches!(result, Err(Error::SessionExpired)));
        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(h.navigator.login_redirects(), 1);
    }

    /// Transport that swaps the stored credential while the first request is
    /// in flight, as a completed refresh from another call site would.
    struct RotatingBackend {
        store: Arc<CredentialStore>,
        calls: AtomicUsize,
    }

    impl Transport for RotatingBackend {
        fn execute<'a>(
            &'a self,
            request: &'a OutboundRequest,
        ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                assert_ne!(request.descriptor.path, "/auth/refresh", "no refresh expected");
                if request.bearer_token() == Some("t2") {
                    return Ok(ApiResponse::new(StatusCode::OK, "ok"));
                }
                self.store.write("t2", Scope::Durable);
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "stale"))
            })
        }
    }

    #[tokio::test]
    async fn stale_token_401_replays_without_refresh() {
        let store = Arc::new(CredentialStore::in_memory());
        store.write("t1", Scope::Durable);
        let backend = Arc::new(RotatingBackend {
            store: store.clone(),
            calls: AtomicUsize::new(0),
        });
        let client = ApiClient::new(
            backend.clone(),
            store,
            Arc::new(CountingNavigator::new()),
            ApiClientConfig::default(),
        );

        let resp = client.send(RequestDescriptor::get("/me")).await.unwrap();
        assert_eq!(resp.text(), "ok");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cleared_store_401_expires_without_refresh() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);

        // A 401 for a token that was cleared (logout, failed refresh) while
        // the request was in flight
        let sent: Secret<String> = "t1".into();
        h.client.logout();
        let outcome = h.client.inner.recover(Some(&sent)).await;

        assert_eq!(outcome, RefreshOutcome::Abort);
        assert_eq!(h.backend.refresh_calls(), 0);
        assert_eq!(h.navigator.login_redirects(), 0);
    }

    #[tokio::test]
    async fn get_json_maps_error_status() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.store.write("t1", Scope::Durable);

        #[derive(serde::Deserialize)]
        struct Echo {
            path: String,
        }
        let echo: Echo = h.client.get_json("/courses").await.unwrap();
        assert_eq!(echo.path, "/courses");

        let err = h.client.get_json::<Echo>("/forbidden").await.err().unwrap();
        assert!(matches!(err, Error::Http { status, .. } if status == StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn login_and_logout_manage_store() {
        let h = harness(FakeBackend::new("t1", "t2"));
        h.client.login("t1", Scope::Ephemeral);
        assert_eq!(h.store.read().unwrap().scope, Scope::Ephemeral);

        h.client.logout();
        assert!(h.store.read().is_none());
        assert_eq!(h.navigator.login_redirects(), 0);
    }
}
