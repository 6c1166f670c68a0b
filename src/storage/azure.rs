use async_trait::async_trait;
use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Body, Client, Method, Response, StatusCode, Url,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    credentials::{ConnectionString, Credential},
    error::Error,
    storage::{signature, BlobStore, PutBlob},
};

const API_VERSION: &str = "2021-08-06";

// Unreserved characters stay as is, everything else in a path segment is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub struct AzureStore {
    client: Client,
    connection: ConnectionString,
}

impl AzureStore {
    pub fn new(connection: ConnectionString) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, connection })
    }

    pub fn blob_url(&self, container: &str, key: &str) -> Url {
        let mut url = self.connection.blob_endpoint.clone();
        let mut path = url.path().trim_end_matches('/').to_owned();
        for segment in std::iter::once(container).chain(key.split('/')) {
            path.push('/');
            path.extend(utf8_percent_encode(segment, SEGMENT));
        }
        url.set_path(&path);
        if let Credential::Sas(query) = &self.connection.credential {
            url.set_query(Some(query));
        }
        url
    }

    fn headers(&self, blob: &PutBlob<'_>, request_id: &Uuid) -> Result<HeaderMap, Error> {
        let invalid = |reason: &str| Error::UploadFailed {
            key: blob.key.to_owned(),
            reason: reason.to_owned(),
        };

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            "x-ms-date",
            HeaderValue::from_str(&Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string())
                .map_err(|_| invalid("invalid date header"))?,
        );
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(
            "x-ms-client-request-id",
            HeaderValue::from_str(&request_id.to_string())
                .map_err(|_| invalid("invalid request id"))?,
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(blob.size));
        if let Some(content_type) = blob.content_type {
            headers.insert(
                "x-ms-blob-content-type",
                HeaderValue::from_str(content_type).map_err(|_| invalid("invalid content type"))?,
            );
        }
        if !blob.overwrite {
            headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        }
        Ok(headers)
    }
}

#[async_trait]
impl BlobStore for AzureStore {
    async fn upload(&self, blob: PutBlob<'_>) -> Result<(), Error> {
        let url = self.blob_url(blob.container, blob.key);
        let request_id = Uuid::new_v4();
        let mut headers = self.headers(&blob, &request_id)?;
        if let Credential::SharedKey(key) = &self.connection.credential {
            let authorization =
                signature::authorization(&Method::PUT, &url, &headers, &self.connection.account, key);
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&authorization).map_err(|_| Error::UploadFailed {
                    key: blob.key.to_owned(),
                    reason: "invalid authorization header".to_owned(),
                })?,
            );
        }

        log::debug!("PUT {} (request id {})", blob.key, request_id);
        let resp = self
            .client
            .put(url)
            .headers(headers)
            .body(Body::wrap_stream(ReaderStream::new(blob.body)))
            .send()
            .await
            .map_err(|err| Error::UploadFailed {
                key: blob.key.to_owned(),
                reason: format!("connection error: {}", err),
            })?;
        log::debug!("{} answered {} (request id {})", blob.key, resp.status(), request_id);

        check_response(blob.key, resp).await
    }
}

async fn check_response(key: &str, resp: Response) -> Result<(), Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }

    let code = resp
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if (status == StatusCode::CONFLICT && code.as_deref() == Some("BlobAlreadyExists"))
        || status == StatusCode::PRECONDITION_FAILED
    {
        return Err(Error::AlreadyExists {
            key: key.to_owned(),
        });
    }

    let body = resp.text().await.unwrap_or_default();
    log::debug!("{} error body: {}", key, body);
    Err(Error::UploadFailed {
        key: key.to_owned(),
        reason: match code {
            Some(code) => format!("{} ({})", status, code),
            None => status.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::{SocketAddr, TcpListener},
        sync::{Arc, Mutex},
    };

    use axum::{
        body::Bytes,
        http::{HeaderMap, StatusCode, Uri},
        response::IntoResponse,
        routing::put,
        Extension, Router,
    };
    use tokio::fs::File;

    use super::AzureStore;
    use crate::{
        credentials::ConnectionString,
        error::Error,
        storage::{BlobStore, PutBlob},
    };

    #[derive(Clone, Debug)]
    struct Received {
        headers: HashMap<String, String>,
        query: Option<String>,
        body: Vec<u8>,
    }

    type Blobs = Arc<Mutex<HashMap<String, Received>>>;

    async fn put_blob(
        Extension(blobs): Extension<Blobs>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        let headers = headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
            .collect::<HashMap<_, _>>();
        let mut blobs = blobs.lock().unwrap();
        if headers.get("if-none-match").map(String::as_str) == Some("*")
            && blobs.contains_key(uri.path())
        {
            return (StatusCode::CONFLICT, [("x-ms-error-code", "BlobAlreadyExists")]);
        }
        if uri.path().contains("forbidden") {
            return (
                StatusCode::FORBIDDEN,
                [("x-ms-error-code", "AuthenticationFailed")],
            );
        }
        blobs.insert(
            uri.path().to_owned(),
            Received {
                headers,
                query: uri.query().map(str::to_owned),
                body: body.to_vec(),
            },
        );
        (StatusCode::CREATED, [("x-ms-request-server-encrypted", "true")])
    }

    fn serve() -> (SocketAddr, Blobs) {
        let blobs = Blobs::default();
        let app = Router::new()
            .route("/*path", put(put_blob))
            .layer(Extension(blobs.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(app.into_make_service())
                .await
                .unwrap();
        });
        (addr, blobs)
    }

    fn azure_store(conn: &str) -> AzureStore {
        AzureStore::new(conn.parse::<ConnectionString>().unwrap()).unwrap()
    }

    async fn put_file(
        store: &AzureStore,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
        overwrite: bool,
    ) -> Result<(), Error> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        tokio::fs::write(&path, content).await.unwrap();
        store
            .upload(PutBlob {
                container: "$web",
                key,
                content_type,
                overwrite,
                size: content.len() as u64,
                body: File::open(&path).await.unwrap(),
            })
            .await
    }

    #[test]
    fn urls() {
        let store = azure_store("AccountName=acc;AccountKey=a2V5");
        assert_eq!(
            store.blob_url("$web", "css/site file.css").as_str(),
            "https://acc.blob.core.windows.net/%24web/css/site%20file.css"
        );

        let store = azure_store("UseDevelopmentStorage=true");
        assert_eq!(
            store.blob_url("$web", "index.html").as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/%24web/index.html"
        );

        let store = azure_store("BlobEndpoint=https://acc.blob.core.windows.net/;SharedAccessSignature=sv=1&sig=x");
        assert_eq!(
            store.blob_url("c", "a/b.txt").as_str(),
            "https://acc.blob.core.windows.net/c/a/b.txt?sv=1&sig=x"
        );
    }

    #[tokio::test]
    async fn shared_key_upload() {
        let (addr, blobs) = serve();
        let store = azure_store(&format!(
            "AccountName=acc;AccountKey=a2V5;BlobEndpoint=http://{}/acc",
            addr
        ));

        put_file(&store, "css/site.css", b"body {}", Some("text/css"), true)
            .await
            .unwrap();

        let blobs = blobs.lock().unwrap();
        let received = blobs.get("/acc/%24web/css/site.css").unwrap();
        assert_eq!(received.body, b"body {}");
        assert_eq!(received.query, None);
        assert_eq!(received.headers["x-ms-blob-type"], "BlockBlob");
        assert_eq!(received.headers["x-ms-blob-content-type"], "text/css");
        assert_eq!(received.headers["content-length"], "7");
        assert!(received.headers["authorization"].starts_with("SharedKey acc:"));
        assert!(!received.headers.contains_key("if-none-match"));
    }

    #[tokio::test]
    async fn sas_upload_without_content_type() {
        let (addr, blobs) = serve();
        let store = azure_store(&format!(
            "BlobEndpoint=http://{}/;SharedAccessSignature=sv=2021-08-06&sig=abc",
            addr
        ));

        put_file(&store, "LICENSE", b"MIT", None, true).await.unwrap();

        let blobs = blobs.lock().unwrap();
        let received = blobs.get("/%24web/LICENSE").unwrap();
        assert_eq!(received.query.as_deref(), Some("sv=2021-08-06&sig=abc"));
        assert!(!received.headers.contains_key("authorization"));
        assert!(!received.headers.contains_key("x-ms-blob-content-type"));
    }

    #[tokio::test]
    async fn overwrite() {
        let (addr, _) = serve();
        let store = azure_store(&format!("AccountName=acc;AccountKey=a2V5;BlobEndpoint=http://{}", addr));

        put_file(&store, "index.html", b"1", None, true).await.unwrap();
        put_file(&store, "index.html", b"2", None, true).await.unwrap();
        assert!(matches!(
            put_file(&store, "index.html", b"3", None, false).await,
            Err(Error::AlreadyExists { key }) if key == "index.html"
        ));
        put_file(&store, "new.html", b"4", None, false).await.unwrap();
    }

    #[tokio::test]
    async fn service_errors() {
        let (addr, _) = serve();
        let store = azure_store(&format!("AccountName=acc;AccountKey=a2V5;BlobEndpoint=http://{}", addr));

        match put_file(&store, "forbidden.txt", b"", None, true).await {
            Err(Error::UploadFailed { key, reason }) => {
                assert_eq!(key, "forbidden.txt");
                assert!(reason.contains("403"));
                assert!(reason.contains("AuthenticationFailed"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let store = azure_store(&format!("AccountName=acc;AccountKey=a2V5;BlobEndpoint=http://{}", addr));

        assert!(matches!(
            put_file(&store, "index.html", b"x", None, true).await,
            Err(Error::UploadFailed { .. })
        ));
    }
}
