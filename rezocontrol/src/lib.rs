//! # rezocontrol - UPnP/DLNA control point
//!
//! Discovers media renderers and content servers, keeps the device
//! directory, and normalizes three incompatible playback-control protocol
//! families behind one renderer facade. Remote browsing and every control
//! operation go through the async SOAP client in [`soap_client`].

pub mod avqueue_renderer;
pub mod avtransport_client;
pub mod discovery;
pub mod errors;
pub mod media_server;
pub mod model;
pub mod openhome_client;
pub mod openhome_renderer;
pub mod registry;
pub mod renderer;
pub mod rendering_control_client;
pub mod soap_client;
pub mod sonos_renderer;
pub mod time_utils;

pub use avtransport_client::{AvTransportClient, MediaInfo, PositionInfo, TransportInfo};
pub use discovery::{DESCRIPTION_TIMEOUT, DiscoveryManager, ICON_RECHECK_BACKOFF};
pub use errors::ControlError;
pub use media_server::{MediaBrowser, UpnpMediaServer, browse_recursive, sort_tracks};
pub use model::{
    BrowseEntry, DeviceRecord, Track, TrackInput, TransportState, TransportStatus,
};
pub use openhome_client::{OhPlaylistClient, decode_id_array, encode_id_array};
pub use registry::{DeviceRegistry, DeviceSeed, SharedDevice};
pub use renderer::{BackendKind, MusicRenderer, RendererBackend};
pub use rendering_control_client::RenderingControlClient;
pub use soap_client::{SOAP_TIMEOUT, invoke_action};
