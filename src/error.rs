/// Errors produced by the proxy engine, HTTP message model and site explorer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("socket initialization failed: {0}")]
    SocketInit(#[source] std::io::Error),
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("dns lookup failed for host {0}")]
    Dns(String),
    #[error("connect to origin failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("response exceeded buffer capacity")]
    BufferFull,
    #[error("malformed start line")]
    BadStartLine,
    #[error("malformed header line")]
    BadHeaderLine,
    #[error("missing header/body terminator")]
    MissingTerminator,
    #[error("operator replacement failed validation")]
    BadReplacement,
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
