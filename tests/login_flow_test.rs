//! Login/Logout Flow Integration Tests

use anyhow::bail;
use async_trait::async_trait;
use session_gate::{
    auth::UserStore,
    device::DeviceDirectory,
    hooks::LoginHook,
    notifier::SessionChanged,
    registry::{ActiveSession, FileSessionStore},
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, SessionController, SessionError,
    WarningKey,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio_test::{assert_err, assert_ok};

struct Harness {
    controller: Arc<SessionController>,
    devices: Arc<DeviceDirectory>,
    events: broadcast::Receiver<SessionChanged>,
}

fn harness() -> Harness {
    let users = UserStore::new();
    for name in ["alice", "bob", "carol"] {
        users.add_user(name, &format!("{}-pw", name), true);
    }

    let devices = Arc::new(DeviceDirectory::new());
    devices.enroll("d1", "Depot tablet 1");
    devices.enroll("d2", "Depot tablet 2");
    devices.enroll("d3", "Field laptop");

    let controller = SessionController::new(
        Arc::new(users),
        devices.clone(),
        Arc::new(FileSessionStore::in_memory()),
    );
    let events = controller.notifier().subscribe();

    Harness {
        controller: Arc::new(controller),
        devices,
        events,
    }
}

fn login(user: &str, device: &str) -> LoginRequest {
    LoginRequest::new(user, &format!("{}-pw", user), device)
}

fn drain(events: &mut broadcast::Receiver<SessionChanged>) -> Vec<String> {
    let mut users = Vec::new();
    while let Ok(event) = events.try_recv() {
        users.push(event.user_name);
    }
    users
}

fn assert_registry_invariant(sessions: &[ActiveSession]) {
    let users: HashSet<_> = sessions.iter().map(|s| s.user_name.as_str()).collect();
    let devices: HashSet<_> = sessions.iter().map(|s| s.device_token.as_str()).collect();
    assert_eq!(users.len(), sessions.len(), "two sessions share a user");
    assert_eq!(devices.len(), sessions.len(), "two sessions share a device");
}

#[tokio::test]
async fn test_login_creates_session() {
    let mut h = harness();

    let response = assert_ok!(h.controller.login(login("alice", "d1")).await);
    assert!(response.succeeded);
    assert_eq!(response.device_token, "d1");
    assert_eq!(response.device_description.as_deref(), Some("Depot tablet 1"));
    assert!(response.warnings.is_empty());

    let session = h.controller.logged_in("alice").await.unwrap().unwrap();
    assert_eq!(session.device_token, "d1");
    assert_eq!(drain(&mut h.events), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_repeat_login_on_same_device_is_idempotent() {
    let h = harness();
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let counter = hook_calls.clone();
    h.controller.hooks().register_login_hook(
        "count",
        move |_: &LoginResponse| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );

    let first = h.controller.login(login("alice", "d1")).await.unwrap();
    let first_time = h.controller.logged_in("alice").await.unwrap().unwrap().login_time;
    let second = h.controller.login(login("alice", "d1")).await.unwrap();

    assert!(first.succeeded);
    assert!(second.succeeded);
    assert_eq!(second.device_description.as_deref(), Some("Depot tablet 1"));

    let sessions = h.controller.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].login_time, first_time);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_user_on_other_device_needs_accepted_warning() {
    let h = harness();
    h.controller.login(login("alice", "d1")).await.unwrap();

    let refused = h.controller.login(login("alice", "d2")).await.unwrap();
    assert!(!refused.succeeded);
    assert!(refused.has_warning(WarningKey::UserAlreadyLoggedOn));
    assert_eq!(
        refused.warnings["USER_ALREADY_LOGGED_ON"],
        "User alice is already logged in, on device Depot tablet 1"
    );
    assert_eq!(
        h.controller.logged_in("alice").await.unwrap().unwrap().device_token,
        "d1"
    );

    let accepted = h
        .controller
        .login(login("alice", "d2").accept(WarningKey::UserAlreadyLoggedOn))
        .await
        .unwrap();
    assert!(accepted.succeeded);
    assert!(accepted
        .accepted_warning_keys
        .contains(WarningKey::UserAlreadyLoggedOn.as_str()));

    let sessions = h.controller.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].device_token, "d2");
}

#[tokio::test]
async fn test_occupied_device_needs_accepted_warning() {
    let h = harness();
    h.controller.login(login("bob", "d1")).await.unwrap();

    let refused = h.controller.login(login("alice", "d1")).await.unwrap();
    assert!(!refused.succeeded);
    assert_eq!(
        refused.warnings["DEVICE_ALREADY_LOGGED_ON"],
        "User bob is currently logged into this device : Depot tablet 1"
    );
    assert!(h.controller.logged_in("alice").await.unwrap().is_none());

    let accepted = h
        .controller
        .login(login("alice", "d1").accept(WarningKey::DeviceAlreadyLoggedOn))
        .await
        .unwrap();
    assert!(accepted.succeeded);
    assert!(h.controller.logged_in("bob").await.unwrap().is_none());
    assert_eq!(
        h.controller.logged_in("alice").await.unwrap().unwrap().device_token,
        "d1"
    );
}

#[tokio::test]
async fn test_both_conflicts_resolve_together() {
    let h = harness();
    h.controller.login(login("alice", "d1")).await.unwrap();
    h.controller.login(login("bob", "d2")).await.unwrap();

    // Accepting only the user warning still stops at the occupied device,
    // and the staged eviction of alice's d1 session is discarded with it.
    let half = h
        .controller
        .login(login("alice", "d2").accept(WarningKey::UserAlreadyLoggedOn))
        .await
        .unwrap();
    assert!(!half.succeeded);
    assert!(half.has_warning(WarningKey::DeviceAlreadyLoggedOn));
    assert_eq!(h.controller.sessions().await.unwrap().len(), 2);

    let full = h
        .controller
        .login(
            login("alice", "d2")
                .accept(WarningKey::UserAlreadyLoggedOn)
                .accept(WarningKey::DeviceAlreadyLoggedOn),
        )
        .await
        .unwrap();
    assert!(full.succeeded);

    let sessions = h.controller.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].is("alice", "d2"));
}

#[tokio::test]
async fn test_session_on_unenrolled_device_is_evicted_without_warning() {
    let h = harness();
    h.controller.login(login("alice", "d1")).await.unwrap();
    assert!(h.devices.remove("d1"));

    let response = h.controller.login(login("alice", "d2")).await.unwrap();
    assert!(response.succeeded);
    assert!(response.warnings.is_empty());

    let sessions = h.controller.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].device_token, "d2");
}

#[tokio::test]
async fn test_failing_login_hook_rolls_back() {
    let mut h = harness();
    h.controller.hooks().register_login_hook(
        "vehicle-check",
        |response: &LoginResponse| -> anyhow::Result<()> {
            if response.user_name == "carol" {
                bail!("carol has no vehicle assigned");
            }
            Ok(())
        },
    );

    h.controller.login(login("alice", "d1")).await.unwrap();
    let before = h.controller.sessions().await.unwrap();
    drain(&mut h.events);

    let err = assert_err!(h.controller.login(login("carol", "d2")).await);
    match err {
        SessionError::Hook { source } => {
            assert_eq!(source.to_string(), "carol has no vehicle assigned")
        }
        other => panic!("expected hook error, got {:?}", other),
    }

    assert_eq!(h.controller.sessions().await.unwrap(), before);
    assert_eq!(drain(&mut h.events), vec!["carol".to_string()]);
}

/// Fails its first call after a delay, passes every later one
struct SlowFirstRejection {
    calls: AtomicUsize,
    entered: Arc<Notify>,
}

#[async_trait]
impl LoginHook for SlowFirstRejection {
    async fn after_login(&self, _: &LoginResponse) -> anyhow::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            bail!("vehicle service timed out");
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_login_during_failing_hook_waits_for_rollback() {
    let h = harness();
    let entered = Arc::new(Notify::new());
    h.controller.hooks().register_login_hook(
        "vehicle-check",
        SlowFirstRejection {
            calls: AtomicUsize::new(0),
            entered: entered.clone(),
        },
    );

    let controller = h.controller.clone();
    let first = tokio::spawn(async move { controller.login(login("alice", "d1")).await });

    entered.notified().await;
    let second = h.controller.login(login("alice", "d1")).await.unwrap();

    let first = first.await.unwrap();
    assert!(matches!(first, Err(SessionError::Hook { .. })));

    // The second login only succeeds once it has a session of its own.
    assert!(second.succeeded);
    let sessions = h.controller.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].is("alice", "d1"));
}

#[tokio::test]
async fn test_failed_hook_after_override_keeps_eviction() {
    let h = harness();
    h.controller.login(login("alice", "d1")).await.unwrap();
    h.controller.hooks().register_login_hook(
        "d2-blocked",
        |response: &LoginResponse| -> anyhow::Result<()> {
            if response.device_token == "d2" {
                bail!("d2 is out of service");
            }
            Ok(())
        },
    );

    let result = h
        .controller
        .login(login("alice", "d2").accept(WarningKey::UserAlreadyLoggedOn))
        .await;
    assert!(matches!(result, Err(SessionError::Hook { .. })));

    // Only the new row is rolled back; the evicted d1 session stays gone.
    assert!(h.controller.sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_credential_failures_change_nothing() {
    let mut h = harness();

    let bad_password = h
        .controller
        .login(LoginRequest::new("alice", "wrong", "d1"))
        .await;
    assert!(matches!(bad_password, Err(SessionError::Authentication)));

    let unknown = h.controller.login(login("mallory", "d1")).await;
    assert!(matches!(unknown, Err(SessionError::UserNotFound(name)) if name == "mallory"));

    let no_device = h.controller.login(login("alice", "")).await;
    assert!(matches!(no_device, Err(SessionError::MissingDeviceToken)));

    assert!(h.controller.sessions().await.unwrap().is_empty());
    assert_eq!(
        drain(&mut h.events),
        vec!["alice".to_string(), "mallory".to_string(), "alice".to_string()]
    );
}

#[tokio::test]
async fn test_logout_removes_exactly_that_session() {
    let mut h = harness();
    h.controller.login(login("alice", "d1")).await.unwrap();
    h.controller.login(login("bob", "d2")).await.unwrap();
    drain(&mut h.events);

    let response = h
        .controller
        .logout(LogoutRequest::new("alice", "d1"))
        .await
        .unwrap();
    assert!(response.succeeded);
    assert_eq!(response.device_description.as_deref(), Some("Depot tablet 1"));

    let sessions = h.controller.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].user_name, "bob");
    assert_eq!(drain(&mut h.events), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_logout_without_session_fails() {
    let mut h = harness();
    h.controller.login(login("alice", "d1")).await.unwrap();
    drain(&mut h.events);

    let err = h
        .controller
        .logout(LogoutRequest::new("alice", "d2"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotLoggedIn { .. }));
    assert!(h.controller.logged_in("alice").await.unwrap().is_some());
    assert_eq!(drain(&mut h.events), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_logout_hook_can_veto() {
    let h = harness();
    h.controller.login(login("alice", "d1")).await.unwrap();
    h.controller.hooks().register_logout_hook(
        "open-job",
        |response: &mut LogoutResponse| -> anyhow::Result<()> {
            response.add_warning("OPEN_JOB", "Job 42 is still open");
            Ok(())
        },
    );

    let response = h
        .controller
        .logout(LogoutRequest::new("alice", "d1"))
        .await
        .unwrap();
    assert!(!response.succeeded);
    assert_eq!(response.warnings["OPEN_JOB"], "Job 42 is still open");
    assert!(h.controller.logged_in("alice").await.unwrap().is_some());
}

#[tokio::test]
async fn test_logout_hook_error_is_absorbed() {
    let h = harness();
    h.controller.hooks().register_logout_hook(
        "sync",
        |_: &mut LogoutResponse| -> anyhow::Result<()> { bail!("sync service down") },
    );

    // No session exists, but the vetoed logout never reaches the delete.
    let response = h
        .controller
        .logout(LogoutRequest::new("alice", "d1"))
        .await
        .unwrap();
    assert!(!response.succeeded);
    assert_eq!(response.errors, vec!["sync service down".to_string()]);
}

#[tokio::test]
async fn test_concurrent_logins_keep_registry_invariant() {
    let h = harness();
    let mut tasks = Vec::new();

    for round in 0..10 {
        for user in ["alice", "bob", "carol"] {
            let controller = h.controller.clone();
            let device = ["d1", "d2", "d3"][(round + user.len()) % 3];
            tasks.push(tokio::spawn(async move {
                controller
                    .login(
                        login(user, device)
                            .accept(WarningKey::UserAlreadyLoggedOn)
                            .accept(WarningKey::DeviceAlreadyLoggedOn),
                    )
                    .await
            }));
        }
    }

    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert!(response.succeeded);
    }

    let sessions = h.controller.sessions().await.unwrap();
    assert!(!sessions.is_empty());
    assert_registry_invariant(&sessions);
}

#[tokio::test]
async fn test_concurrent_logins_to_one_device_admit_one_user() {
    let h = harness();
    let mut tasks = Vec::new();

    for user in ["alice", "bob", "carol"] {
        let controller = h.controller.clone();
        tasks.push(tokio::spawn(async move {
            controller.login(login(user, "d3")).await
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        if response.succeeded {
            admitted += 1;
        } else {
            assert!(response.has_warning(WarningKey::DeviceAlreadyLoggedOn));
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(h.controller.sessions().await.unwrap().len(), 1);
}
