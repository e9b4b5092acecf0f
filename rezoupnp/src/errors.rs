use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpnpError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] xmltree::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Missing required device element: {0}")]
    MissingField(&'static str),

    #[error("Missing {0} element in SOAP body")]
    MissingElement(String),
}
