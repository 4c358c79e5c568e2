//! `RegistryClient` against a minimal in-process HTTP registry

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use stevedore_oci::{
    Descriptor, Digest, ImageIndex, ImageManifest, Platform, Reference, Registry, RegistryClient,
    RegistryError, media_types,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One request as the server saw it
#[derive(Debug, Clone)]
struct Request {
    path: String,
    authorization: Option<String>,
}

/// Canned response
struct Reply {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type", content_type.to_string())],
            body,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

type Handler = dyn Fn(&Request) -> Reply + Send + Sync;

struct TestRegistry {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl TestRegistry {
    /// Serve `handler` on an ephemeral port; the handler gets the bound address
    async fn start<F>(make_handler: impl FnOnce(SocketAddr) -> F) -> Self
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<Handler> = Arc::new(make_handler(addr));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler.as_ref(), &seen).await;
                });
            }
        });

        Self { addr, requests }
    }

    fn repository(&self, name: &str) -> String {
        format!("{}/{name}", self.addr)
    }

    fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.path.clone())
            .collect()
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: &Handler,
    seen: &Mutex<Vec<Request>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&head);
    let mut lines = head.lines();
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    let authorization = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        .map(|(_, value)| value.trim().to_string());

    let request = Request {
        path,
        authorization,
    };
    let reply = handler(&request);
    seen.lock().unwrap().push(request);

    let mut response = format!(
        "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");

    stream.write_all(response.as_bytes()).await?;
    stream.write_all(&reply.body).await?;
    stream.shutdown().await
}

fn client() -> RegistryClient {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    RegistryClient::with_client(http).plain_http(true)
}

fn manifest(layer: &[u8]) -> (ImageManifest, Vec<u8>) {
    let config = Descriptor::for_bytes(media_types::PACKAGE_CONFIG, b"{}");
    let layer = Descriptor::for_bytes(media_types::LAYER, layer);
    let manifest = ImageManifest::new(config, vec![layer]);
    let bytes = serde_json::to_vec(&manifest).unwrap();
    (manifest, bytes)
}

#[tokio::test]
async fn test_bearer_challenge_is_answered_and_token_reused() {
    let (expected, body) = manifest(b"layer");
    let layer = expected.layers[0].clone();

    let registry = TestRegistry::start(move |addr| {
        move |req: &Request| {
            if req.path.starts_with("/token") {
                return Reply::ok("application/json", br#"{"token":"abc"}"#.to_vec());
            }
            if req.authorization.as_deref() != Some("Bearer abc") {
                let mut reply = Reply::status(401);
                reply.headers.push((
                    "WWW-Authenticate",
                    format!(r#"Bearer realm="http://{addr}/token",service="test""#),
                ));
                return reply;
            }
            if req.path.contains("/blobs/") {
                Reply::ok("application/octet-stream", b"layer".to_vec())
            } else {
                Reply::ok(media_types::OCI_IMAGE_MANIFEST, body.clone())
            }
        }
    })
    .await;

    let client = client();
    let reference = Reference::new(&registry.repository("example/nginx"), "1.0.0").unwrap();
    let resolved = client
        .resolve(&reference, &Platform::new("amd64", "multi"))
        .await
        .unwrap();
    assert_eq!(resolved, expected);

    let blob = client.fetch_blob(&reference, &layer).await.unwrap();
    assert_eq!(blob, b"layer");

    let requests = registry.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].path, "/v2/example/nginx/manifests/1.0.0");
    assert!(requests[0].authorization.is_none());
    assert!(requests[1].path.starts_with("/token?"));
    assert!(requests[1].path.contains("service=test"));
    assert!(requests[1].path.contains("example%2Fnginx"));
    assert_eq!(requests[2].path, "/v2/example/nginx/manifests/1.0.0");
    assert_eq!(requests[2].authorization.as_deref(), Some("Bearer abc"));
    // the cached token goes out on the first blob request
    assert_eq!(requests[3].path, format!("/v2/example/nginx/blobs/{}", layer.digest));
    assert_eq!(requests[3].authorization.as_deref(), Some("Bearer abc"));
}

#[tokio::test]
async fn test_unauthorized_without_challenge_is_auth_error() {
    let registry = TestRegistry::start(|_| |_: &Request| Reply::status(401)).await;

    let reference = Reference::new(&registry.repository("example/nginx"), "1.0.0").unwrap();
    let err = client()
        .resolve(&reference, &Platform::new("amd64", "multi"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn test_index_selects_platform_and_fetches_by_digest() {
    let (amd, amd_bytes) = manifest(b"amd64 layer");
    let (arm, arm_bytes) = manifest(b"arm64 layer");
    let amd_entry = Descriptor::for_bytes(media_types::OCI_IMAGE_MANIFEST, &amd_bytes)
        .with_platform(Platform::new("amd64", "multi"));
    let arm_entry = Descriptor::for_bytes(media_types::OCI_IMAGE_MANIFEST, &arm_bytes)
        .with_platform(Platform::new("arm64", "multi"));
    let index = ImageIndex {
        schema_version: 2,
        media_type: Some(media_types::OCI_IMAGE_INDEX.to_string()),
        manifests: vec![amd_entry.clone(), arm_entry.clone()],
    };
    let index_bytes = serde_json::to_vec(&index).unwrap();

    let amd_path = format!("/v2/example/podinfo/manifests/{}", amd_entry.digest);
    let arm_path = format!("/v2/example/podinfo/manifests/{}", arm_entry.digest);
    let (served_amd, served_arm) = (amd_path.clone(), arm_path.clone());
    let registry = TestRegistry::start(move |_| {
        move |req: &Request| match req.path.as_str() {
            "/v2/example/podinfo/manifests/6.4.0" => {
                Reply::ok(media_types::OCI_IMAGE_INDEX, index_bytes.clone())
            }
            p if p == served_amd => Reply::ok(media_types::OCI_IMAGE_MANIFEST, amd_bytes.clone()),
            p if p == served_arm => Reply::ok(media_types::OCI_IMAGE_MANIFEST, arm_bytes.clone()),
            _ => Reply::status(404),
        }
    })
    .await;

    let client = client();
    let reference = Reference::new(&registry.repository("example/podinfo"), "6.4.0").unwrap();

    let resolved = client
        .resolve(&reference, &Platform::new("arm64", "linux"))
        .await
        .unwrap();
    assert_eq!(resolved, arm);
    assert_ne!(resolved, amd);
    assert_eq!(
        registry.paths(),
        vec!["/v2/example/podinfo/manifests/6.4.0".to_string(), arm_path]
    );

    let err = client
        .resolve(&reference, &Platform::new("s390x", "multi"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NoMatchingPlatform(_)), "got {err:?}");
}

#[tokio::test]
async fn test_pinned_manifest_with_wrong_bytes_is_digest_mismatch() {
    let (_, body) = manifest(b"served");
    let pinned = Digest::of(b"something else");

    let registry = TestRegistry::start(move |_| {
        move |_: &Request| Reply::ok(media_types::OCI_IMAGE_MANIFEST, body.clone())
    })
    .await;

    let reference =
        Reference::new(&registry.repository("example/nginx"), &pinned.to_string()).unwrap();
    let err = client()
        .resolve(&reference, &Platform::new("amd64", "multi"))
        .await
        .unwrap_err();

    match err {
        RegistryError::DigestMismatch { expected, .. } => assert_eq!(expected, pinned.to_string()),
        other => panic!("expected digest mismatch, got {other:?}"),
    }
    assert_eq!(
        registry.paths(),
        vec![format!("/v2/example/nginx/manifests/{pinned}")]
    );
}

#[tokio::test]
async fn test_index_entry_with_wrong_bytes_is_digest_mismatch() {
    let (_, real_bytes) = manifest(b"real");
    let (_, swapped_bytes) = manifest(b"swapped");
    let entry = Descriptor::for_bytes(media_types::OCI_IMAGE_MANIFEST, &real_bytes)
        .with_platform(Platform::new("amd64", "multi"));
    let index = ImageIndex {
        schema_version: 2,
        media_type: Some(media_types::OCI_IMAGE_INDEX.to_string()),
        manifests: vec![entry],
    };
    let index_bytes = serde_json::to_vec(&index).unwrap();

    let registry = TestRegistry::start(move |_| {
        move |req: &Request| {
            if req.path.ends_with("/manifests/latest") {
                Reply::ok(media_types::OCI_IMAGE_INDEX, index_bytes.clone())
            } else {
                Reply::ok(media_types::OCI_IMAGE_MANIFEST, swapped_bytes.clone())
            }
        }
    })
    .await;

    let reference = Reference::new(&registry.repository("example/nginx"), "latest").unwrap();
    let err = client()
        .resolve(&reference, &Platform::new("amd64", "multi"))
        .await
        .unwrap_err();
    assert!(err.is_integrity(), "got {err:?}");
}

#[tokio::test]
async fn test_missing_manifest_is_not_found() {
    let registry = TestRegistry::start(|_| |_: &Request| Reply::status(404)).await;

    let reference = Reference::new(&registry.repository("example/nginx"), "9.9.9").unwrap();
    let err = client()
        .resolve(&reference, &Platform::new("amd64", "multi"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)), "got {err:?}");
}
