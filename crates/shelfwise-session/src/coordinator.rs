use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use async_trait::async_trait;
use shelfwise_core::is_auth_endpoint;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::client::{ApiRequest, ApiResponse, HttpClient};
use crate::error::ApiError;

/// What the coordinator needs from the session it keeps alive.
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn refresh(&self) -> Result<(), ApiError>;
    async fn logout(&self);
}

type Outcome = Result<(), ApiError>;
type Waiter = oneshot::Sender<Outcome>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    queue: VecDeque<Waiter>,
}

/// Response pipeline that renews an expired access credential.
///
/// A 401 on any request other than the authentication endpoints starts one
/// refresh; 401s that arrive while it runs wait for its outcome instead of
/// starting another. Once it settles every waiting request is replayed (or
/// rejected with the refresh error) and the request that started it is
/// replayed (or rejected with its own 401 after a logout). Each request is
/// replayed at most once.
pub struct RefreshCoordinator {
    client: Arc<dyn HttpClient>,
    session: OnceLock<Weak<dyn SessionControl>>,
    state: Mutex<RefreshState>,
}

struct Attempt<'a> {
    request: &'a ApiRequest,
    retried: bool,
}

enum Turn<'a> {
    Lead(Flight<'a>),
    Wait(oneshot::Receiver<Outcome>),
}

impl RefreshCoordinator {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            session: OnceLock::new(),
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Binds the session to refresh. Only the first call takes effect.
    ///
    /// The session is held weakly so it may itself route requests through
    /// this coordinator.
    #[must_use]
    pub fn attach<S: SessionControl + 'static>(&self, session: &Arc<S>) -> bool {
        let weak: Weak<dyn SessionControl> = Arc::downgrade(session) as Weak<dyn SessionControl>;
        self.session.set(weak).is_ok()
    }

    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut attempt = Attempt {
            request,
            retried: false,
        };
        let outcome = self.client.execute(request).await;
        self.on_response(&mut attempt, outcome).await
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight
    }

    /// Requests currently waiting on the in-flight refresh.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    async fn on_response(
        &self,
        attempt: &mut Attempt<'_>,
        outcome: Result<ApiResponse, ApiError>,
    ) -> Result<ApiResponse, ApiError> {
        let err = match outcome {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        if !err.is_unauthorized() || attempt.retried {
            return Err(err);
        }
        let request = attempt.request;
        let path = request.path.as_str();
        if is_auth_endpoint(path) {
            debug!(path, "unauthorized on auth endpoint; not retrying");
            return Err(err);
        }
        let Some(session) = self.session.get().and_then(Weak::upgrade) else {
            debug!(path, "unauthorized with no session attached");
            return Err(err);
        };

        attempt.retried = true;
        match self.begin() {
            Turn::Wait(waiter) => {
                debug!(path, "refresh in flight; waiting");
                match waiter.await {
                    Ok(Ok(())) => self.replay(attempt).await,
                    Ok(Err(refresh_err)) => Err(refresh_err),
                    Err(_) => Err(ApiError::RefreshAbandoned),
                }
            }
            Turn::Lead(mut flight) => {
                info!(path, "access credential rejected; refreshing");
                match session.refresh().await {
                    Ok(()) => {
                        flight.settle(Ok(()));
                        drop(flight);
                        self.replay(attempt).await
                    }
                    Err(refresh_err) => {
                        warn!("refresh failed; logging out: {refresh_err}");
                        flight.reject_waiting(refresh_err);
                        session.logout().await;
                        drop(flight);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Flag check and set happen under one lock, before any await.
    fn begin(&self) -> Turn<'_> {
        let mut state = self.lock();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            return Turn::Wait(rx);
        }
        state.in_flight = true;
        Turn::Lead(Flight {
            state: &self.state,
            outcome: None,
        })
    }

    // Retried attempts never go back through the pipeline.
    async fn replay(&self, attempt: &Attempt<'_>) -> Result<ApiResponse, ApiError> {
        debug!(
            method = %attempt.request.method,
            path = %attempt.request.path,
            "replaying request"
        );
        let outcome = self.client.execute(attempt.request).await;
        if matches!(&outcome, Err(err) if err.is_unauthorized()) {
            warn!(path = %attempt.request.path, "replayed request unauthorized again");
        }
        outcome
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        lock_state(&self.state)
    }
}

#[async_trait]
impl HttpClient for RefreshCoordinator {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.send(request).await
    }

    fn clear_credentials(&self) {
        self.client.clear_credentials();
    }
}

/// Held by the refresh leader. Dropping it clears the in-flight flag and
/// settles every waiter, however the leader exits.
struct Flight<'a> {
    state: &'a Mutex<RefreshState>,
    outcome: Option<Outcome>,
}

impl Flight<'_> {
    fn settle(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }

    /// Rejects everyone queued so far; later arrivals are rejected on drop.
    fn reject_waiting(&mut self, err: ApiError) {
        let waiters = std::mem::take(&mut lock_state(self.state).queue);
        let outcome = Err(err);
        notify(waiters, &outcome);
        self.outcome = Some(outcome);
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let waiters = {
            let mut state = lock_state(self.state);
            state.in_flight = false;
            std::mem::take(&mut state.queue)
        };
        let outcome = self
            .outcome
            .take()
            .unwrap_or(Err(ApiError::RefreshAbandoned));
        notify(waiters, &outcome);
    }
}

fn notify(waiters: VecDeque<Waiter>, outcome: &Outcome) {
    for waiter in waiters {
        // A waiter whose caller gave up is simply skipped.
        let _ = waiter.send(outcome.clone());
    }
}

fn lock_state(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Backend {
        valid: AtomicBool,
        calls: Mutex<HashMap<String, usize>>,
        order: Mutex<Vec<String>>,
    }

    impl Backend {
        /// Paths in the order they reached the backend since the last call.
        fn take_order(&self) -> Vec<String> {
            std::mem::take(&mut *self.order.lock().expect("order"))
        }

        fn calls(&self, path: &str) -> usize {
            self.calls
                .lock()
                .expect("calls")
                .get(path)
                .copied()
                .unwrap_or_default()
        }
    }

    fn status(path: &str, code: u16) -> ApiError {
        ApiError::Status {
            status: StatusCode::from_u16(code).expect("status"),
            url: path.to_string(),
            body: String::new(),
        }
    }

    #[async_trait]
    impl HttpClient for Backend {
        async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
            *self
                .calls
                .lock()
                .expect("calls")
                .entry(request.path.clone())
                .or_default() += 1;
            self.order.lock().expect("order").push(request.path.clone());
            if request.path.starts_with("/api/broken/") {
                return Err(status(&request.path, 500));
            }
            let always_rejected =
                request.path.starts_with("/api/stale/") || is_auth_endpoint(&request.path);
            if always_rejected || !self.valid.load(Ordering::SeqCst) {
                return Err(status(&request.path, 401));
            }
            Ok(ApiResponse {
                status: StatusCode::OK,
                url: request.path.clone(),
                body: format!("{{\"path\":\"{}\"}}", request.path),
            })
        }
    }

    struct FakeSession {
        backend: Arc<Backend>,
        refreshes: AtomicUsize,
        logouts: AtomicUsize,
        gate: Mutex<Option<oneshot::Receiver<Outcome>>>,
        fallback: Outcome,
    }

    impl FakeSession {
        fn new(backend: &Arc<Backend>, fallback: Outcome) -> Arc<Self> {
            Arc::new(Self {
                backend: Arc::clone(backend),
                refreshes: AtomicUsize::new(0),
                logouts: AtomicUsize::new(0),
                gate: Mutex::new(None),
                fallback,
            })
        }

        /// The next refresh blocks until the returned sender fires.
        fn gate(&self) -> oneshot::Sender<Outcome> {
            let (tx, rx) = oneshot::channel();
            *self.gate.lock().expect("gate") = Some(rx);
            tx
        }

        fn refreshes(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }

        fn logouts(&self) -> usize {
            self.logouts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionControl for FakeSession {
        async fn refresh(&self) -> Result<(), ApiError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().expect("gate").take();
            let outcome = match gate {
                Some(rx) => rx.await.unwrap_or(Err(ApiError::RefreshAbandoned)),
                None => self.fallback.clone(),
            };
            if outcome.is_ok() {
                self.backend.valid.store(true, Ordering::SeqCst);
            }
            outcome
        }

        async fn logout(&self) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            self.backend.valid.store(false, Ordering::SeqCst);
        }
    }

    fn setup(fallback: Outcome) -> (Arc<Backend>, Arc<FakeSession>, RefreshCoordinator) {
        let backend = Arc::new(Backend::default());
        let session = FakeSession::new(&backend, fallback);
        let coordinator = RefreshCoordinator::new(backend.clone());
        assert!(coordinator.attach(&session));
        (backend, session, coordinator)
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        while !condition() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn successful_responses_pass_through() {
        let (backend, session, coordinator) = setup(Ok(()));
        backend.valid.store(true, Ordering::SeqCst);

        let response = coordinator
            .send(&ApiRequest::get("/api/items/"))
            .await
            .expect("response");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(session.refreshes(), 0);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let (backend, session, coordinator) = setup(Ok(()));

        let err = coordinator
            .send(&ApiRequest::get("/api/broken/"))
            .await
            .expect_err("server error");
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(session.refreshes(), 0);
        assert_eq!(backend.calls("/api/broken/"), 1);
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_and_request_replayed() {
        let (backend, session, coordinator) = setup(Ok(()));

        let response = coordinator
            .send(&ApiRequest::get("/api/items/"))
            .await
            .expect("replayed");
        assert_eq!(response.text(), "{\"path\":\"/api/items/\"}");
        assert_eq!(session.refreshes(), 1);
        assert_eq!(backend.calls("/api/items/"), 2);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn concurrent_failures_share_one_refresh() {
        let (backend, session, coordinator) = setup(Ok(()));
        let gate = session.gate();
        let done = AtomicUsize::new(0);
        let requests: Vec<ApiRequest> = (1..=3)
            .map(|id| ApiRequest::get(format!("/api/items/{id}/")))
            .collect();

        let run = |request: &ApiRequest| {
            let done = &done;
            let coordinator = &coordinator;
            let request = request.clone();
            async move {
                let outcome = coordinator.send(&request).await;
                done.fetch_add(1, Ordering::SeqCst);
                outcome
            }
        };

        let release = async {
            wait_until(|| coordinator.queued() == 2).await;
            assert!(coordinator.is_refreshing());
            assert_eq!(session.refreshes(), 1);
            assert_eq!(done.load(Ordering::SeqCst), 0);
            gate.send(Ok(())).expect("release refresh");
        };

        let (first, second, third, ()) = tokio::join!(
            run(&requests[0]),
            run(&requests[1]),
            run(&requests[2]),
            release
        );

        for outcome in [first, second, third] {
            assert_eq!(outcome.expect("replayed").status, StatusCode::OK);
        }
        assert_eq!(session.refreshes(), 1);
        assert_eq!(session.logouts(), 0);
        for request in &requests {
            assert_eq!(backend.calls(&request.path), 2);
        }
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.queued(), 0);
    }

    #[tokio::test]
    async fn refresh_failure_rejects_waiters_and_logs_out() {
        let (backend, session, coordinator) = setup(Ok(()));
        let gate = session.gate();
        let leader = ApiRequest::get("/api/items/1/");
        let second = ApiRequest::get("/api/items/2/");
        let third = ApiRequest::get("/api/items/3/");

        let release = async {
            wait_until(|| coordinator.queued() == 2).await;
            gate.send(Err(status(shelfwise_core::paths::TOKEN_REFRESH, 400)))
                .expect("fail refresh");
        };

        let (leader_outcome, second_outcome, third_outcome, ()) = tokio::join!(
            coordinator.send(&leader),
            coordinator.send(&second),
            coordinator.send(&third),
            release
        );

        let leader_err = leader_outcome.expect_err("leader rejected");
        assert_eq!(leader_err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(leader_err.to_string(), status("/api/items/1/", 401).to_string());
        for outcome in [second_outcome, third_outcome] {
            let err = outcome.expect_err("waiter rejected");
            assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        }
        assert_eq!(session.refreshes(), 1);
        assert_eq!(session.logouts(), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(backend.calls("/api/items/1/"), 1);
        assert_eq!(backend.calls("/api/items/2/"), 1);
    }

    #[tokio::test]
    async fn flag_resets_so_a_later_expiry_refreshes_again() {
        let (_backend, session, coordinator) =
            setup(Err(status(shelfwise_core::paths::TOKEN_REFRESH, 401)));

        for _ in 0..2 {
            let err = coordinator
                .send(&ApiRequest::get("/api/items/"))
                .await
                .expect_err("rejected");
            assert!(err.is_unauthorized());
            assert!(!coordinator.is_refreshing());
        }
        assert_eq!(session.refreshes(), 2);
        assert_eq!(session.logouts(), 2);
    }

    #[tokio::test]
    async fn replayed_request_is_never_retried_twice() {
        let (backend, session, coordinator) = setup(Ok(()));

        let err = coordinator
            .send(&ApiRequest::get("/api/stale/"))
            .await
            .expect_err("still unauthorized");
        assert!(err.is_unauthorized());
        assert_eq!(session.refreshes(), 1);
        assert_eq!(session.logouts(), 0);
        assert_eq!(backend.calls("/api/stale/"), 2);
    }

    #[tokio::test]
    async fn auth_endpoints_are_never_retried() {
        let (backend, session, coordinator) = setup(Ok(()));

        for path in [
            shelfwise_core::paths::TOKEN,
            shelfwise_core::paths::LOGOUT,
            shelfwise_core::paths::REGISTER,
        ] {
            let err = coordinator
                .send(&ApiRequest::post(path))
                .await
                .expect_err("rejected");
            assert!(err.is_unauthorized());
            assert_eq!(backend.calls(path), 1);
        }
        assert_eq!(session.refreshes(), 0);
        assert_eq!(coordinator.queued(), 0);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn detached_coordinator_passes_unauthorized_through() {
        let backend = Arc::new(Backend::default());
        let coordinator = RefreshCoordinator::new(backend.clone());

        let err = coordinator
            .send(&ApiRequest::get("/api/items/"))
            .await
            .expect_err("rejected");
        assert!(err.is_unauthorized());
        assert_eq!(backend.calls("/api/items/"), 1);
    }

    #[tokio::test]
    async fn dropped_leader_releases_waiters() {
        let (_backend, session, coordinator) = setup(Ok(()));
        let _gate = session.gate();
        let first = ApiRequest::get("/api/items/1/");
        let second = ApiRequest::get("/api/items/2/");

        let mut leader = Box::pin(coordinator.send(&first));
        tokio::select! {
            biased;
            _ = &mut leader => panic!("leader finished while refresh was gated"),
            () = wait_until(|| session.refreshes() == 1) => {}
        }

        let mut waiter = Box::pin(coordinator.send(&second));
        tokio::select! {
            biased;
            _ = &mut waiter => panic!("waiter finished before the refresh settled"),
            () = wait_until(|| coordinator.queued() == 1) => {}
        }

        drop(leader);
        assert!(!coordinator.is_refreshing());
        let err = waiter.await.expect_err("abandoned");
        assert!(matches!(err, ApiError::RefreshAbandoned));
    }

    struct Queued {
        backend: Arc<Backend>,
        session: Arc<FakeSession>,
        coordinator: Arc<RefreshCoordinator>,
        gate: oneshot::Sender<Outcome>,
        handles: Vec<tokio::task::JoinHandle<Result<ApiResponse, ApiError>>>,
        /// Request indices in the order their `send` returned.
        settled: Arc<Mutex<Vec<usize>>>,
    }

    /// Starts a leader and then `waiters` more requests, each queued only
    /// after the previous one, all held behind a gated refresh.
    async fn queue_behind_gated_refresh(waiters: usize) -> Queued {
        let (backend, session, coordinator) = setup(Ok(()));
        let coordinator = Arc::new(coordinator);
        let gate = session.gate();
        let settled = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for index in 0..=waiters {
            let task_coordinator = Arc::clone(&coordinator);
            let settled = Arc::clone(&settled);
            handles.push(tokio::spawn(async move {
                let request = ApiRequest::get(format!("/api/items/{index}/"));
                let outcome = task_coordinator.send(&request).await;
                settled.lock().expect("settled").push(index);
                outcome
            }));
            if index == 0 {
                wait_until(|| session.refreshes() == 1).await;
            } else {
                wait_until(|| coordinator.queued() == index).await;
            }
        }
        Queued {
            backend,
            session,
            coordinator,
            gate,
            handles,
            settled,
        }
    }

    #[tokio::test]
    async fn waiters_replay_in_arrival_order() {
        let Queued {
            backend,
            session,
            coordinator,
            gate,
            handles,
            settled,
        } = queue_behind_gated_refresh(3).await;
        backend.take_order();
        assert!(settled.lock().expect("settled").is_empty());

        gate.send(Ok(())).expect("release refresh");
        for handle in handles {
            let response = handle.await.expect("task").expect("replayed");
            assert_eq!(response.status, StatusCode::OK);
        }

        let expected: Vec<String> = (0..=3).map(|id| format!("/api/items/{id}/")).collect();
        assert_eq!(backend.take_order(), expected);
        assert_eq!(*settled.lock().expect("settled"), vec![0, 1, 2, 3]);
        assert_eq!(session.refreshes(), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn waiters_are_rejected_in_arrival_order() {
        let Queued {
            backend,
            session,
            coordinator,
            gate,
            handles,
            settled,
        } = queue_behind_gated_refresh(3).await;
        backend.take_order();

        gate.send(Err(status(shelfwise_core::paths::TOKEN_REFRESH, 400)))
            .expect("fail refresh");
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.expect("task").expect_err("rejected"));
        }

        assert!(outcomes[0].is_unauthorized());
        for err in &outcomes[1..] {
            assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        }
        assert_eq!(*settled.lock().expect("settled"), vec![0, 1, 2, 3]);
        assert!(backend.take_order().is_empty());
        assert_eq!(session.logouts(), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.queued(), 0);
    }

    #[tokio::test]
    async fn only_the_first_attach_takes_effect() {
        let (backend, first, coordinator) = setup(Ok(()));
        let second = FakeSession::new(&backend, Ok(()));
        assert!(!coordinator.attach(&second));

        coordinator
            .send(&ApiRequest::get("/api/items/"))
            .await
            .expect("replayed");
        assert_eq!(first.refreshes(), 1);
        assert_eq!(second.refreshes(), 0);
    }
}
