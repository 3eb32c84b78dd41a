//! Integration tests for the session lifecycle against a mock API

use reqwest::Method;
use std::error::Error;
use std::time::Duration;
use telemetry_client::{ClientConfig, ClientError, SessionDialog, SessionPhase};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::mock_api::{
    config, mount_login, mount_logout, mount_resource, requests_to, LOGIN_PATH, LOGOUT_PATH,
    SESSION_COOKIE,
};

#[tokio::test]
async fn test_open_request_close() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server, 200).await;
    mount_resource(&server, "/dms-api/restricted/v1/sites").await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    session.open().await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Connected);

    let response = session
        .request(Method::GET, "restricted/v1/sites")
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.resource(), "restricted/v1/sites");
    let body: serde_json::Value = response.json().unwrap();
    assert!(body["data"].is_array());

    session.close().await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Disconnected);

    let logouts = requests_to(&server, LOGOUT_PATH).await;
    assert_eq!(logouts.len(), 1);
    let cookie = logouts[0].headers.get("cookie").unwrap();
    assert_eq!(cookie.to_str().unwrap(), SESSION_COOKIE);
}

#[tokio::test]
async fn test_login_sends_form_encoded_credentials() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    session.open().await.unwrap();

    let logins = requests_to(&server, LOGIN_PATH).await;
    assert_eq!(logins.len(), 1);
    let content_type = logins[0].headers.get("content-type").unwrap();
    assert_eq!(
        content_type.to_str().unwrap(),
        "application/x-www-form-urlencoded"
    );
    assert_eq!(
        String::from_utf8_lossy(&logins[0].body),
        "username=alice&password=hunter2"
    );
}

#[tokio::test]
async fn test_open_twice_is_rejected() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    session.open().await.unwrap();

    let err = session.open().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::InvalidState {
            operation: "open",
            phase: SessionPhase::Connected
        }
    ));
    // Still usable with the first token
    assert_eq!(session.phase(), SessionPhase::Connected);
    assert_eq!(requests_to(&server, LOGIN_PATH).await.len(), 1);
}

#[tokio::test]
async fn test_failed_login_leaves_no_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let err = session.open().await.unwrap_err();

    assert!(matches!(err, ClientError::SessionOpen(_)));
    let cause = err.source().unwrap().to_string();
    assert_eq!(cause, "connection failure: 401 Unauthorized");

    assert_eq!(session.phase(), SessionPhase::Disconnected);
    let err = session
        .request(Method::GET, "restricted/v1/sites")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidState { .. }));
}

#[tokio::test]
async fn test_login_without_cookie_is_open_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let err = session.open().await.unwrap_err();

    match err {
        ClientError::SessionOpen(cause) => assert!(matches!(*cause, ClientError::EmptyToken)),
        other => panic!("expected SessionOpen, got {other:?}"),
    }
    assert_eq!(session.phase(), SessionPhase::Disconnected);
}

#[tokio::test]
async fn test_open_can_be_retried_after_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_login(&server).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    assert!(session.open().await.is_err());
    session.open().await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Connected);
}

#[tokio::test]
async fn test_unreachable_server_is_open_failure() {
    // Nothing listens on the discard port
    let config = ClientConfig::new("http://127.0.0.1:9/dms-api");
    let session = SessionDialog::new(&config).unwrap();

    let err = session.open().await.unwrap_err();
    match err {
        ClientError::SessionOpen(cause) => {
            assert!(matches!(*cause, ClientError::Network(_)));
            let transport = cause.source().expect("network error keeps its cause");
            assert!(transport.downcast_ref::<reqwest::Error>().is_some());
        }
        other => panic!("expected SessionOpen, got {other:?}"),
    }
}

#[tokio::test]
async fn test_close_never_opened_is_close_failure() {
    let server = MockServer::start().await;
    mount_logout(&server, 200).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let err = session.close().await.unwrap_err();

    assert!(matches!(err, ClientError::SessionClose(_)));
    assert!(requests_to(&server, LOGOUT_PATH).await.is_empty());
}

#[tokio::test]
async fn test_failed_logout_still_discards_token() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server, 500).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    session.open().await.unwrap();

    let err = session.close().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionClose(_)));
    assert_eq!(session.phase(), SessionPhase::Disconnected);

    let err = session
        .request(Method::GET, "restricted/v1/sites")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidState { .. }));
}

#[tokio::test]
async fn test_non_success_status_is_connection_failure() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/dms-api/restricted/v1/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    session.open().await.unwrap();

    let err = session
        .request(Method::GET, "restricted/v1/missing")
        .await
        .unwrap_err();
    match err {
        ClientError::Connection { status, reason } => {
            assert_eq!(status, 404);
            assert_eq!(reason, "Not Found");
        }
        other => panic!("expected Connection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_scoped_logs_out_after_body_error() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server, 200).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let result: Result<(), _> = session
        .scoped(async { Err(ClientError::Validation("boom".to_string())) })
        .await;

    assert!(matches!(result, Err(ClientError::Validation(_))));
    assert_eq!(requests_to(&server, LOGOUT_PATH).await.len(), 1);
    assert_eq!(session.phase(), SessionPhase::Disconnected);
}

#[tokio::test]
async fn test_scoped_body_error_wins_over_logout_error() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server, 500).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let result: Result<(), _> = session
        .scoped(async { Err(ClientError::Validation("boom".to_string())) })
        .await;

    assert!(matches!(result, Err(ClientError::Validation(_))));
}

#[tokio::test]
async fn test_scoped_surfaces_logout_error_after_success() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server, 500).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let result = session.scoped(async { Ok(42) }).await;

    assert!(matches!(result, Err(ClientError::SessionClose(_))));
    assert_eq!(session.phase(), SessionPhase::Disconnected);
}

#[tokio::test]
async fn test_scoped_returns_body_value() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server, 200).await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let value = session.scoped(async { Ok("done") }).await.unwrap();

    assert_eq!(value, "done");
    assert_eq!(requests_to(&server, LOGIN_PATH).await.len(), 1);
    assert_eq!(requests_to(&server, LOGOUT_PATH).await.len(), 1);
}

#[tokio::test]
async fn test_dropped_open_returns_to_disconnected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "DMSSESSION=abc123; Path=/")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let result = tokio::time::timeout(Duration::from_millis(200), session.open()).await;

    assert!(result.is_err());
    assert_eq!(session.phase(), SessionPhase::Disconnected);
}

#[tokio::test]
async fn test_dropped_close_discards_token_and_allows_reopen() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path(LOGOUT_PATH))
        .and(header("cookie", SESSION_COOKIE))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    session.open().await.unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), session.close()).await;
    assert!(result.is_err());
    assert_eq!(session.phase(), SessionPhase::Disconnected);

    let err = session
        .request(Method::GET, "restricted/v1/sites")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidState { .. }));

    session.open().await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Connected);
    assert_eq!(requests_to(&server, LOGIN_PATH).await.len(), 2);
}

#[tokio::test]
async fn test_dropped_scope_logs_out_in_background() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/dms-api/restricted/v1/sites"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let session = SessionDialog::new(&config(&server)).unwrap();
    let scope = session.scoped(async {
        session
            .request(Method::GET, "restricted/v1/sites")
            .await
            .map(|_| ())
    });
    let result = tokio::time::timeout(Duration::from_millis(300), scope).await;

    assert!(result.is_err());
    assert_eq!(session.phase(), SessionPhase::Disconnected);

    let mut logouts = Vec::new();
    for _ in 0..40 {
        logouts = requests_to(&server, LOGOUT_PATH).await;
        if !logouts.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(logouts.len(), 1);
    let cookie = logouts[0].headers.get("cookie").unwrap();
    assert_eq!(cookie.to_str().unwrap(), SESSION_COOKIE);
}
