#![allow(dead_code)]
//! Fixtures shared by the integration tests.
//!
//! Remote repositories are built with the `git` CLI at fixed dates so tag
//! order is deterministic.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use confmirror_core::ConnectionProfile;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

/// Commit dates of the standard fixture (seconds since the epoch, UTC).
pub const T1: i64 = 1_672_531_200; // 2023-01-01
pub const T2: i64 = 1_675_209_600; // 2023-02-01
pub const T3: i64 = 1_677_628_800; // 2023-03-01

/// A git repository on disk that plays the remote.
pub struct RemoteRepo {
    _temp: TempDir,
    path: PathBuf,
}

impl RemoteRepo {
    /// Creates an empty repository with a `main` branch.
    pub fn empty() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("remote");
        fs::create_dir_all(&path).expect("create remote dir");

        let repo = Self { _temp: temp, path };
        repo.git(&["-c", "init.defaultBranch=main", "init", "-q"], None);
        repo
    }

    /// Builds the standard fixture:
    ///
    /// - `v1.0` at T1: `block/ethernet.toml` = `type=x`, a BOM-prefixed
    ///   `config/App.toml`, `README.md`
    /// - `v1.1` (annotated) at T2: `block/ethernet.toml` = `type=y`
    /// - `v2.0` at T3: adds `firmware/sensor.json`
    /// - `treetag`: points at the tree of `v2.0`
    pub fn standard() -> Self {
        let repo = Self::empty();

        repo.write("README.md", b"# device configuration\n");
        repo.write("block/ethernet.toml", b"type=x");
        repo.write("config/App.toml", "\u{feff}name = \"app\"\n".as_bytes());
        repo.commit("initial blocks", T1);
        repo.tag("v1.0");

        repo.write("block/ethernet.toml", b"type=y");
        repo.commit("ethernet type y", T2);
        repo.annotated_tag("v1.1", T2);

        repo.write("firmware/sensor.json", b"{\"version\": 2}");
        repo.commit("sensor firmware", T3);
        repo.tag("v2.0");

        repo.git(&["tag", "treetag", "HEAD^{tree}"], None);
        repo
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The remote URL (a local path).
    pub fn url(&self) -> String {
        self.path.display().to_string()
    }

    pub fn write(&self, relative: &str, content: &[u8]) {
        let file = self.path.join(relative);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(file, content).expect("write file");
    }

    pub fn commit(&self, message: &str, at: i64) {
        self.git(&["add", "-A"], Some(at));
        self.git(&["commit", "-q", "-m", message], Some(at));
    }

    pub fn tag(&self, name: &str) {
        self.git(&["tag", name], None);
    }

    pub fn annotated_tag(&self, name: &str, at: i64) {
        self.git(&["tag", "-a", name, "-m", name], Some(at));
    }

    /// Runs `git` in the repository with a fixed identity.
    pub fn git(&self, args: &[&str], at: Option<i64>) {
        let mut command = Command::new("git");
        command
            .args([
                "-c",
                "user.name=Fixture",
                "-c",
                "user.email=fixture@example.com",
                "-c",
                "commit.gpgsign=false",
                "-c",
                "tag.gpgsign=false",
            ])
            .args(args)
            .current_dir(&self.path)
            .env("GIT_CONFIG_NOSYSTEM", "1");

        if let Some(at) = at {
            let date = format!("{} +0000", at);
            command
                .env("GIT_AUTHOR_DATE", &date)
                .env("GIT_COMMITTER_DATE", &date);
        }

        let output = command
            .output()
            .unwrap_or_else(|e| panic!("failed to run git {:?}: {}", args, e));
        if !output.status.success() {
            panic!(
                "git {:?} failed:\n{}",
                args,
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }
}

/// A fresh directory for a mirror; the mirror path itself does not exist.
pub struct MirrorDir {
    _temp: TempDir,
    path: PathBuf,
}

impl MirrorDir {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("mirrors").join("repo");
        Self { _temp: temp, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builds a profile for `remote_url` mirrored at `local`.
pub fn profile(remote_url: &str, local: &Path) -> ConnectionProfile {
    ConnectionProfile::builder()
        .remote_url(remote_url)
        .local_path(local)
        .clone_timeout(std::time::Duration::from_secs(30))
        .fetch_timeout(std::time::Duration::from_secs(30))
        .http_timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("valid profile")
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server");
    });
    format!("http://{}", addr)
}

/// A TCP server that accepts connections and never answers; returns its
/// base URL.
pub fn silent_server() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    format!("http://{}", addr)
}

/// True for requests sent by the fallback transport.
pub fn is_fallback_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|agent| agent.contains("confmirror"))
}

/// A smart-HTTP server for `repo` backed by `git upload-pack`.
///
/// Requests from the native transport get `502 Bad Gateway`, the way a
/// proxy that breaks the native TLS stack would fail them; only the
/// fallback transport gets through.
pub fn fallback_only_git_server(repo: PathBuf) -> Router {
    Router::new().fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
        let repo = repo.clone();
        async move {
            if !is_fallback_request(&headers) {
                return StatusCode::BAD_GATEWAY.into_response();
            }
            upload_pack(&repo, method, uri, body).await
        }
    })
}

async fn upload_pack(repo: &Path, method: Method, uri: Uri, body: Bytes) -> Response {
    let path = uri.path();

    if method == Method::GET && path.ends_with("/info/refs") {
        let output = run_upload_pack(repo, &["--advertise-refs"], &[]).await;
        let announce = "# service=git-upload-pack\n";
        let mut advert = format!("{:04x}{}0000", announce.len() + 4, announce).into_bytes();
        advert.extend_from_slice(&output);
        return (
            [(
                header::CONTENT_TYPE,
                "application/x-git-upload-pack-advertisement",
            )],
            advert,
        )
            .into_response();
    }

    if method == Method::POST && path.ends_with("/git-upload-pack") {
        let output = run_upload_pack(repo, &[], &body).await;
        return (
            [(header::CONTENT_TYPE, "application/x-git-upload-pack-result")],
            output,
        )
            .into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}

async fn run_upload_pack(repo: &Path, extra: &[&str], input: &[u8]) -> Vec<u8> {
    let mut child = tokio::process::Command::new("git")
        .arg("upload-pack")
        .arg("--stateless-rpc")
        .args(extra)
        .arg(repo)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn git upload-pack");

    let mut stdin = child.stdin.take().expect("stdin");
    stdin.write_all(input).await.expect("write request");
    drop(stdin);

    child
        .wait_with_output()
        .await
        .expect("git upload-pack")
        .stdout
}
