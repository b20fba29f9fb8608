//! Smart-HTTP fallback transport and transport error mapping, against
//! local HTTP servers.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::IntoResponse;
use common::{MirrorDir, RemoteRepo, fallback_only_git_server, is_fallback_request, serve};
use confmirror_core::{ConnectionProfile, MirrorError};
use confmirror_git::transport::{MAX_REDIRECTS, SmartAction, SmartHttpResponse};
use confmirror_git::{Attempt, Credentials, SmartHttpClient, SyncKind, TransportError, VersionedRepository};
use tokio_util::sync::CancellationToken;

/// Builds, uses and drops a client on a blocking thread.
///
/// The blocking client owns a runtime, which must not be dropped from an
/// async context.
async fn execute_with(
    credentials: Credentials,
    cancel: CancellationToken,
    action: SmartAction,
    base_url: String,
    body: &'static [u8],
) -> Result<SmartHttpResponse, TransportError> {
    tokio::task::spawn_blocking(move || {
        let client = SmartHttpClient::new(Duration::from_secs(5), credentials, cancel).unwrap();
        client.execute(action, &base_url, body)
    })
    .await
    .unwrap()
}

async fn execute(
    credentials: Credentials,
    action: SmartAction,
    base_url: String,
    body: &'static [u8],
) -> Result<SmartHttpResponse, TransportError> {
    execute_with(credentials, CancellationToken::new(), action, base_url, body).await
}

/// `/hops/{n}/repo/...` redirects to `/hops/{n-1}/repo/...` until `n` is zero.
fn redirect_chain() -> Router {
    Router::new().fallback(|uri: Uri| async move {
        let path = uri.path();
        let rest = path.strip_prefix("/hops/").unwrap_or_default();
        let (count, tail) = rest.split_once('/').unwrap_or(("0", ""));
        let count: u32 = count.parse().unwrap_or(0);

        if count == 0 {
            return (StatusCode::OK, "arrived").into_response();
        }

        let query = uri.query().map(|q| format!("?{}", q)).unwrap_or_default();
        let location = format!("/hops/{}/{}{}", count - 1, tail, query);
        (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
    })
}

fn fixed_status(status: StatusCode) -> Router {
    Router::new().fallback(move || async move { status })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_redirects_up_to_the_limit_are_followed() {
    let base = serve(redirect_chain()).await;
    let repo_url = format!("{}/hops/{}/repo.git", base, MAX_REDIRECTS);

    let response = execute(
        Credentials::Anonymous,
        SmartAction::UploadPackList,
        repo_url,
        b"",
    )
    .await
    .unwrap();

    assert_eq!(response.redirects, MAX_REDIRECTS);
    assert_eq!(response.body, b"arrived");
    assert!(
        response
            .final_url
            .ends_with("/hops/0/repo.git/info/refs?service=git-upload-pack")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sixth_redirect_is_rejected() {
    let base = serve(redirect_chain()).await;
    let repo_url = format!("{}/hops/{}/repo.git", base, MAX_REDIRECTS + 1);

    let err = execute(
        Credentials::Anonymous,
        SmartAction::UploadPackList,
        repo_url,
        b"",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TransportError::TooManyRedirects { limit: 5, .. }));
    assert!(matches!(
        MirrorError::from(err),
        MirrorError::TooManyRedirects { limit: 5, .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_codes_map_to_errors() {
    let cases = [
        (StatusCode::UNAUTHORIZED, "unauthorized"),
        (StatusCode::FORBIDDEN, "forbidden"),
        (StatusCode::NOT_FOUND, "not found"),
        (StatusCode::INTERNAL_SERVER_ERROR, "status"),
    ];

    for (status, expected) in cases {
        let base = serve(fixed_status(status)).await;
        let err = execute(
            Credentials::Anonymous,
            SmartAction::UploadPackList,
            format!("{}/cfg.git", base),
            b"",
        )
        .await
        .unwrap_err();

        let matched = match (&err, expected) {
            (TransportError::Unauthorized { .. }, "unauthorized") => true,
            (TransportError::Forbidden { .. }, "forbidden") => true,
            (TransportError::NotFound { .. }, "not found") => true,
            (TransportError::Status { status: 500, .. }, "status") => true,
            _ => false,
        };
        assert!(matched, "{} gave {:?}", status, err);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pack_request_sends_body_and_content_type() {
    let app = Router::new().fallback(|method: Method, headers: HeaderMap, body: Bytes| async move {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        format!("{} {}|{}", method, content_type, String::from_utf8_lossy(&body))
    });
    let base = serve(app).await;

    let response = execute(
        Credentials::Anonymous,
        SmartAction::UploadPack,
        format!("{}/cfg.git/", base),
        b"0009done\n",
    )
    .await
    .unwrap();

    assert_eq!(
        String::from_utf8(response.body).unwrap(),
        "POST application/x-git-upload-pack-request|0009done\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_basic_credentials_are_sent() {
    let app = Router::new().fallback(|headers: HeaderMap| async move {
        if headers.contains_key(header::AUTHORIZATION) {
            StatusCode::OK
        } else {
            StatusCode::UNAUTHORIZED
        }
    });
    let base = serve(app).await;
    let url = format!("{}/cfg.git", base);

    let err = execute(
        Credentials::Anonymous,
        SmartAction::UploadPackList,
        url.clone(),
        b"",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TransportError::Unauthorized { .. }));

    let credentials = Credentials::Basic {
        username: "svc".to_string(),
        secret: "token".to_string(),
    };
    execute(credentials, SmartAction::UploadPackList, url, b"")
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_large_body_is_received_whole() {
    let app = Router::new().fallback(|| async { vec![7u8; 100_003] });
    let base = serve(app).await;

    let response = execute(
        Credentials::Anonymous,
        SmartAction::UploadPackList,
        format!("{}/cfg.git", base),
        b"",
    )
    .await
    .unwrap();

    assert_eq!(response.bytes, 100_003);
    assert_eq!(response.body.len(), 100_003);
    assert!(response.body.iter().all(|b| *b == 7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_host_is_a_request_error() {
    let err = execute(
        Credentials::Anonymous,
        SmartAction::UploadPackList,
        "http://127.0.0.1:1/cfg.git".to_string(),
        b"",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TransportError::Request { .. }));
    assert!(matches!(MirrorError::from(err), MirrorError::Network(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_client_does_not_send() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = execute_with(
        Credentials::Anonymous,
        cancel,
        SmartAction::UploadPackList,
        "http://127.0.0.1:1/cfg.git".to_string(),
        b"",
    )
    .await
    .unwrap_err();

    assert_eq!(err, TransportError::Cancelled);
}

fn http_profile(remote_url: String, mirror: &MirrorDir) -> ConnectionProfile {
    ConnectionProfile::builder()
        .remote_url(remote_url)
        .local_path(mirror.path())
        .credentials("svc-config", "token")
        .clone_timeout(Duration::from_secs(60))
        .http_timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_against_rejecting_server_is_unauthorized() {
    let base = serve(fixed_status(StatusCode::UNAUTHORIZED)).await;
    let mirror = MirrorDir::new();
    let repository = VersionedRepository::new(http_profile(format!("{}/cfg.git", base), &mirror));

    let err = repository.sync().await.unwrap_err();

    assert!(err.is_auth_error(), "unexpected error: {:?}", err);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_against_missing_repository_tries_both_transports() {
    let agents = Arc::new(Mutex::new(Vec::<bool>::new()));
    let seen = Arc::clone(&agents);
    let app = Router::new().fallback(move |headers: HeaderMap| {
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().push(is_fallback_request(&headers));
            StatusCode::NOT_FOUND
        }
    });
    let base = serve(app).await;
    let mirror = MirrorDir::new();
    let repository = VersionedRepository::new(http_profile(format!("{}/gone.git", base), &mirror));

    let err = repository.sync().await.unwrap_err();

    assert!(
        matches!(err, MirrorError::RepositoryNotFound(_)),
        "unexpected error: {:?}",
        err
    );
    let agents = agents.lock().unwrap();
    assert!(agents.iter().any(|fallback| !fallback));
    assert!(agents.iter().any(|fallback| *fallback));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_against_unreachable_host_is_network_error() {
    let mirror = MirrorDir::new();
    let repository = VersionedRepository::new(http_profile(
        "http://127.0.0.1:1/cfg.git".to_string(),
        &mirror,
    ));

    let err = repository.sync().await.unwrap_err();

    assert!(matches!(err, MirrorError::Network(_)), "unexpected error: {:?}", err);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clone_succeeds_through_fallback_transport() {
    let remote = RemoteRepo::standard();
    let base = serve(fallback_only_git_server(remote.path().to_path_buf())).await;
    let mirror = MirrorDir::new();
    let repository = VersionedRepository::new(http_profile(format!("{}/cfg.git", base), &mirror));

    let report = repository.sync().await.unwrap();

    assert_eq!(report.kind, SyncKind::Cloned);
    assert_eq!(report.attempt, Attempt::Fallback);
    assert_eq!(
        repository.list_tag_names().await.unwrap(),
        vec!["v2.0", "v1.1", "v1.0"]
    );
    let files = repository.get_files_at_tag("v1.0", "ethernet").await.unwrap();
    assert_eq!(files[0].text().unwrap(), "type=x");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_fallback_keeps_native_error() {
    let remote = RemoteRepo::standard();
    let base = serve(fallback_only_git_server(remote.path().to_path_buf())).await;
    let mirror = MirrorDir::new();
    let profile = ConnectionProfile::builder()
        .remote_url(format!("{}/cfg.git", base))
        .local_path(mirror.path())
        .fallback_transport(false)
        .build()
        .unwrap();
    let repository = VersionedRepository::new(profile);

    let err = repository.sync().await.unwrap_err();

    assert!(matches!(err, MirrorError::Network(_)), "unexpected error: {:?}", err);
}
