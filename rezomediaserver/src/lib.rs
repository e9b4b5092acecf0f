//! # rezomediaserver - local ContentDirectory server
//!
//! Exposes a directory of local files as a minimal UPnP MediaServer:
//! device description, two static service capability documents, the
//! Browse action over the filesystem, a no-op update counter, and a media
//! streaming route. The server advertises itself over SSDP with one
//! identity persisted across restarts.

pub mod content;
pub mod device;
pub mod errors;
pub mod server;
pub mod tags;

pub use content::{AUDIO_EXTENSIONS, ContentHandler, normalize_object_id};
pub use device::{device_description_xml, SERVER_HEADER};
pub use errors::ServeError;
pub use server::{LocalMediaServer, MediaServerConfig, ServerState, handle_action, router};
pub use tags::{AudioTags, LoftyTagReader, TagReader};
