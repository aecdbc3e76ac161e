use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("read failed: {0}")]
    Read(String),
    #[error("read timed out")]
    ReadTimeout,
    #[error("write failed: {0}")]
    Write(String),
    #[error("write timed out")]
    WriteTimeout,
    #[error("timed out waiting for a connection from the pool")]
    PoolTimeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("local protocol violation: {0}")]
    LocalProtocol(String),
    #[error("remote protocol violation: {0}")]
    RemoteProtocol(String),
    #[error("proxy tunnel failed: {0}")]
    Proxy(String),
    #[error("{0}")]
    UnsupportedProtocol(String),
    #[error("connection not available")]
    ConnectionNotAvailable,
    #[error("{0}")]
    Runtime(String),
}

/// Error classification mirroring the variants, for callers that match
/// on failure class without caring about the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectError,
    ConnectTimeout,
    ReadError,
    ReadTimeout,
    WriteError,
    WriteTimeout,
    PoolTimeout,
    NetworkError,
    LocalProtocolError,
    RemoteProtocolError,
    ProxyError,
    UnsupportedProtocol,
    ConnectionNotAvailable,
    RuntimeError,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect(_) => ErrorKind::ConnectError,
            Error::ConnectTimeout => ErrorKind::ConnectTimeout,
            Error::Read(_) => ErrorKind::ReadError,
            Error::ReadTimeout => ErrorKind::ReadTimeout,
            Error::Write(_) => ErrorKind::WriteError,
            Error::WriteTimeout => ErrorKind::WriteTimeout,
            Error::PoolTimeout => ErrorKind::PoolTimeout,
            Error::Network(_) => ErrorKind::NetworkError,
            Error::LocalProtocol(_) => ErrorKind::LocalProtocolError,
            Error::RemoteProtocol(_) => ErrorKind::RemoteProtocolError,
            Error::Proxy(_) => ErrorKind::ProxyError,
            Error::UnsupportedProtocol(_) => ErrorKind::UnsupportedProtocol,
            Error::ConnectionNotAvailable => ErrorKind::ConnectionNotAvailable,
            Error::Runtime(_) => ErrorKind::RuntimeError,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::ConnectTimeout | Error::ReadTimeout | Error::WriteTimeout | Error::PoolTimeout
        )
    }

    pub(crate) fn is_connect(&self) -> bool {
        matches!(self, Error::Connect(_) | Error::ConnectTimeout)
    }
}
