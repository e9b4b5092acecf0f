//! Local ContentDirectory server: axum routes, SOAP action dispatch, the
//! media streaming route, and the presence beacon lifecycle.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::Router;
use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use rezoupnp::net::guess_local_ip;
use rezoupnp::soap::{SoapAction, build_soap_fault, build_soap_response, error_codes, parse_soap_action};
use rezoupnp::ssdp::{BeaconDevice, SsdpBeacon};

use crate::content::{ContentHandler, mime_for};
use crate::device::{
    CONNECTION_MANAGER_SCPD, CONNECTION_MANAGER_SERVICE_TYPE, CONTENT_DIRECTORY_SCPD,
    CONTENT_DIRECTORY_SERVICE_TYPE, MEDIA_SERVER_DEVICE_TYPE, SERVER_HEADER,
    device_description_xml,
};
use crate::errors::ServeError;
use crate::tags::TagReader;

#[derive(Debug, Clone)]
pub struct MediaServerConfig {
    /// Persistent device identity (`uuid:...`).
    pub udn: String,
    pub friendly_name: String,
    /// Storage root of the exported tree.
    pub root: PathBuf,
    pub port: u16,
    /// Whether to run the SSDP beacon (off in tests).
    pub advertise: bool,
}

pub struct ServerState {
    udn: String,
    friendly_name: String,
    content: ContentHandler,
    update_id: AtomicU32,
}

impl ServerState {
    pub fn new(config: &MediaServerConfig, tags: Arc<dyn TagReader>) -> Self {
        Self {
            udn: config.udn.clone(),
            friendly_name: config.friendly_name.clone(),
            content: ContentHandler::new(config.root.clone(), tags),
            update_id: AtomicU32::new(0),
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/device.xml", get(device_description))
        .route("/ContentDirectory.xml", get(|| async { xml(CONTENT_DIRECTORY_SCPD.to_string()) }))
        .route("/ConnectionManager.xml", get(|| async { xml(CONNECTION_MANAGER_SCPD.to_string()) }))
        .route("/control", post(control))
        .route("/media/{*path}", get(stream_media))
        .with_state(state)
}

fn xml(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, r#"text/xml; charset="utf-8""#)],
        body,
    )
        .into_response()
}

async fn device_description(State(state): State<Arc<ServerState>>) -> Response {
    xml(device_description_xml(&state.udn, &state.friendly_name))
}

async fn control(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let action = match parse_soap_action(&body) {
        Ok(action) => action,
        Err(err) => {
            debug!(error = %err, "Unparseable SOAP request");
            return fault_response(
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_ARGS,
                "Invalid Args",
            );
        }
    };

    // Resource URLs are derived from the host the client actually used,
    // so multi-homed or proxied access resolves correctly.
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("127.0.0.1");

    match handle_action(&state, &action, host).await {
        Ok(response_xml) => xml(response_xml),
        Err(ServeError::NotFound(id)) => {
            debug!(object_id = %id, "Browse of unknown object");
            fault_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::NO_SUCH_OBJECT,
                "No such object",
            )
        }
        Err(ServeError::InvalidObjectId(_)) => fault_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INVALID_ARGS,
            "Invalid Args",
        ),
        Err(err) => {
            warn!(action = %action.name, error = %err, "Action failed");
            fault_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::ACTION_FAILED,
                "Action Failed",
            )
        }
    }
}

/// Dispatches one parsed action. Split from the HTTP handler so the SOAP
/// surface is testable without sockets.
pub async fn handle_action(
    state: &ServerState,
    action: &SoapAction,
    host: &str,
) -> Result<String, ServeError> {
    match action.name.as_str() {
        "Browse" => {
            let object_id = action.arg("ObjectID").unwrap_or("0");
            let browse_flag = action.arg("BrowseFlag").unwrap_or("BrowseDirectChildren");

            let didl = match browse_flag {
                "BrowseMetadata" => state.content.browse_metadata(object_id)?,
                "BrowseDirectChildren" => {
                    state.content.browse_children(object_id, host).await?
                }
                other => {
                    return Err(ServeError::InvalidObjectId(format!(
                        "unsupported BrowseFlag {other}"
                    )));
                }
            };

            let count = (didl.containers.len() + didl.items.len()).to_string();
            let result = didl.to_xml()?;
            let update_id = state.update_id.load(Ordering::Relaxed).to_string();

            build_soap_response(
                CONTENT_DIRECTORY_SERVICE_TYPE,
                "Browse",
                &[
                    ("Result", result.as_str()),
                    ("NumberReturned", count.as_str()),
                    ("TotalMatches", count.as_str()),
                    ("UpdateID", update_id.as_str()),
                ],
            )
            .map_err(|err| ServeError::Tag(format!("response emit failed: {err}")))
        }
        // The update counter never changes: the exported tree has no
        // change notification source.
        "GetSystemUpdateID" => {
            let id = state.update_id.load(Ordering::Relaxed).to_string();
            build_soap_response(
                CONTENT_DIRECTORY_SERVICE_TYPE,
                "GetSystemUpdateID",
                &[("Id", id.as_str())],
            )
            .map_err(|err| ServeError::Tag(format!("response emit failed: {err}")))
        }
        "GetSearchCapabilities" => build_soap_response(
            CONTENT_DIRECTORY_SERVICE_TYPE,
            "GetSearchCapabilities",
            &[("SearchCaps", "")],
        )
        .map_err(|err| ServeError::Tag(format!("response emit failed: {err}"))),
        "GetSortCapabilities" => build_soap_response(
            CONTENT_DIRECTORY_SERVICE_TYPE,
            "GetSortCapabilities",
            &[("SortCaps", "")],
        )
        .map_err(|err| ServeError::Tag(format!("response emit failed: {err}"))),
        "GetProtocolInfo" => build_soap_response(
            CONNECTION_MANAGER_SERVICE_TYPE,
            "GetProtocolInfo",
            &[("Source", "http-get:*:audio/*:*"), ("Sink", "")],
        )
        .map_err(|err| ServeError::Tag(format!("response emit failed: {err}"))),
        other => {
            debug!(action = other, "Unknown action");
            Err(ServeError::InvalidObjectId(format!("unknown action {other}")))
        }
    }
}

fn fault_response(status: StatusCode, code: u32, description: &str) -> Response {
    let body = build_soap_fault("s:Client", "UPnPError", Some(code), Some(description))
        .unwrap_or_else(|_| description.to_string());
    (
        status,
        [(header::CONTENT_TYPE, r#"text/xml; charset="utf-8""#)],
        body,
    )
        .into_response()
}

async fn stream_media(
    State(state): State<Arc<ServerState>>,
    AxumPath(path): AxumPath<String>,
) -> Response {
    let file_path = match state.content.resolve_file(&path) {
        Ok(path) => path,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let file = match tokio::fs::File::open(&file_path).await {
        Ok(file) => file,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let mime = file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| mime_for(&e.to_ascii_lowercase()))
        .unwrap_or("application/octet-stream");

    (
        [(header::CONTENT_TYPE, mime)],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// Running local server: HTTP listener plus the presence beacon. Both stop
/// cleanly on shutdown; the beacon sends its byebye burst first.
pub struct LocalMediaServer {
    addr: SocketAddr,
    beacon: Option<SsdpBeacon>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LocalMediaServer {
    pub async fn start(
        config: MediaServerConfig,
        tags: Arc<dyn TagReader>,
    ) -> Result<Self, ServeError> {
        let state = Arc::new(ServerState::new(&config, tags));
        let app = router(state);

        let listener =
            tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.port))).await?;
        let addr = listener.local_addr()?;

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(err) = serve.await {
                warn!("Media server stopped with error: {}", err);
            }
        });

        let beacon = if config.advertise {
            match guess_local_ip() {
                Some(ip) => {
                    let device = BeaconDevice {
                        uuid: config.udn.clone(),
                        location: format!("http://{}:{}/device.xml", ip, addr.port()),
                        server: SERVER_HEADER.to_string(),
                        device_type: MEDIA_SERVER_DEVICE_TYPE.to_string(),
                        service_types: vec![
                            CONTENT_DIRECTORY_SERVICE_TYPE.to_string(),
                            CONNECTION_MANAGER_SERVICE_TYPE.to_string(),
                        ],
                    };
                    Some(SsdpBeacon::start(device)?)
                }
                None => {
                    warn!("No routable interface found; beacon disabled");
                    None
                }
            }
        } else {
            None
        };

        info!(addr = %addr, root = %config.root.display(), "Local media server started");

        Ok(Self {
            addr,
            beacon,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops the beacon (byebye burst) and the HTTP listener.
    pub async fn shutdown(self) {
        if let Some(beacon) = self.beacon {
            beacon.shutdown().await;
        }
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::LoftyTagReader;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn state_for(root: &TempDir) -> ServerState {
        ServerState::new(
            &MediaServerConfig {
                udn: "uuid:test".to_string(),
                friendly_name: "Test Shelf".to_string(),
                root: root.path().to_path_buf(),
                port: 0,
                advertise: false,
            },
            Arc::new(LoftyTagReader),
        )
    }

    fn browse_action(object_id: &str, flag: &str) -> SoapAction {
        let mut args = HashMap::new();
        args.insert("ObjectID".to_string(), object_id.to_string());
        args.insert("BrowseFlag".to_string(), flag.to_string());
        args.insert("Filter".to_string(), "*".to_string());
        SoapAction {
            name: "Browse".to_string(),
            args,
        }
    }

    #[tokio::test]
    async fn browse_children_counts_entries() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("albums")).unwrap();
        fs::write(root.path().join("a.mp3"), b"x").unwrap();
        fs::write(root.path().join("notes.txt"), b"x").unwrap();

        let state = state_for(&root);
        let response = handle_action(
            &state,
            &browse_action("0", "BrowseDirectChildren"),
            "10.0.0.5:8200",
        )
        .await
        .unwrap();

        assert!(response.contains("BrowseResponse"));
        assert!(response.contains("<NumberReturned>2</NumberReturned>"));
        assert!(response.contains("<TotalMatches>2</TotalMatches>"));
        // The DIDL payload is escaped inside Result.
        assert!(response.contains("&lt;DIDL-Lite"));
    }

    #[tokio::test]
    async fn browse_metadata_returns_container_record() {
        let root = TempDir::new().unwrap();
        let state = state_for(&root);

        let response = handle_action(
            &state,
            &browse_action("albums/jazz", "BrowseMetadata"),
            "h",
        )
        .await
        .unwrap();

        assert!(response.contains("<NumberReturned>1</NumberReturned>"));
        assert!(response.contains("albums/jazz"));
    }

    #[tokio::test]
    async fn update_counter_is_a_noop() {
        let root = TempDir::new().unwrap();
        let state = state_for(&root);

        let action = SoapAction {
            name: "GetSystemUpdateID".to_string(),
            args: HashMap::new(),
        };
        let first = handle_action(&state, &action, "h").await.unwrap();
        let second = handle_action(&state, &action, "h").await.unwrap();

        assert!(first.contains("<Id>0</Id>"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn capability_actions_return_empty_sets() {
        let root = TempDir::new().unwrap();
        let state = state_for(&root);

        let search = handle_action(
            &state,
            &SoapAction {
                name: "GetSearchCapabilities".to_string(),
                args: HashMap::new(),
            },
            "h",
        )
        .await
        .unwrap();
        assert!(search.contains("GetSearchCapabilitiesResponse"));

        let sort = handle_action(
            &state,
            &SoapAction {
                name: "GetSortCapabilities".to_string(),
                args: HashMap::new(),
            },
            "h",
        )
        .await
        .unwrap();
        assert!(sort.contains("GetSortCapabilitiesResponse"));
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let root = TempDir::new().unwrap();
        let state = state_for(&root);

        let err = handle_action(
            &state,
            &SoapAction {
                name: "DestroyObject".to_string(),
                args: HashMap::new(),
            },
            "h",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServeError::InvalidObjectId(_)));
    }
}
