//! # rezoupnp - UPnP wire formats
//!
//! Wire-level building blocks shared by the control point and the local
//! media server: SOAP envelope construction and parsing, the lenient
//! response decoder, SSDP message handling, the presence beacon, and the
//! device-description fetcher.

pub mod description;
pub mod errors;
pub mod net;
pub mod soap;
pub mod ssdp;

pub use description::{
    Classification, DeviceDescription, ServiceDescription, classify, fetch_description,
    parse_description,
};
pub use errors::UpnpError;
