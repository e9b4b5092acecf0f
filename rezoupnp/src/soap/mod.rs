//! SOAP envelope handling for UPnP control.

mod builder;
mod decode;
mod fault;
mod parser;

pub use builder::{build_soap_request, build_soap_response};
pub use decode::{ActionResponse, decode_action_response, decode_json_response, sanitize_xml};
pub use fault::{SoapFault, UpnpFaultDetail, build_soap_fault, parse_soap_fault};
pub use parser::{SoapAction, parse_soap_action};

use xmltree::{Element, XMLNode};

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Standard UPnP error codes.
pub mod error_codes {
    pub const INVALID_ACTION: u32 = 401;
    pub const INVALID_ARGS: u32 = 402;
    pub const ACTION_FAILED: u32 = 501;
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: u32 = 602;
    pub const NO_SUCH_OBJECT: u32 = 701;
}

/// Finds the first direct child element whose name ends with `suffix`.
///
/// Matching on the suffix tolerates payloads where the namespace prefix
/// survived the sanitizing pass (pre-parsed structures, for instance).
pub(crate) fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}
