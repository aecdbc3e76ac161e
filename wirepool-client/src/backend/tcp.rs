use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::{lookup_host, TcpSocket, TcpStream, UnixStream};

use wirepool_net::{build_connector, TlsClientConfig};

use super::{with_timeout, AsyncIo, NetworkBackend, NetworkStream, SocketOption, TlsParams, TlsUpgrader};
use crate::error::Error;

/// The default backend: TCP and unix-domain sockets via tokio, TLS via
/// openssl.
#[derive(Debug, Clone, Default)]
pub struct TokioBackend;

#[async_trait]
impl NetworkBackend for TokioBackend {
    async fn connect_tcp(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
        local_address: Option<&str>,
        socket_options: &[SocketOption],
    ) -> Result<NetworkStream, Error> {
        let connect = dial(host, port, local_address, socket_options);
        let stream = with_timeout(timeout, connect, || Error::ConnectTimeout).await??;
        Ok(NetworkStream::new(
            Box::new(stream),
            Some(Arc::new(OpensslUpgrader)),
        ))
    }

    async fn connect_unix_socket(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<NetworkStream, Error> {
        let connect = UnixStream::connect(path);
        let stream = with_timeout(timeout, connect, || Error::ConnectTimeout)
            .await?
            .map_err(|err| Error::Connect(err.to_string()))?;
        Ok(NetworkStream::new(
            Box::new(stream),
            Some(Arc::new(OpensslUpgrader)),
        ))
    }
}

async fn dial(
    host: &str,
    port: u16,
    local_address: Option<&str>,
    socket_options: &[SocketOption],
) -> Result<TcpStream, Error> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|err| Error::Connect(err.to_string()))?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        match dial_addr(addr, local_address, socket_options).await {
            Ok(stream) => return Ok(stream),
            Err(err) => last_error = Some(err),
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Connect(format!("no addresses for {host}"))))
}

async fn dial_addr(
    addr: SocketAddr,
    local_address: Option<&str>,
    socket_options: &[SocketOption],
) -> Result<TcpStream, Error> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(|err| Error::Connect(err.to_string()))?;

    for option in socket_options {
        if let SocketOption::ReuseAddress(enabled) = option {
            socket
                .set_reuseaddr(*enabled)
                .map_err(|err| Error::Connect(err.to_string()))?;
        }
    }

    if let Some(local) = local_address {
        let ip: IpAddr = local
            .parse()
            .map_err(|_| Error::Connect(format!("invalid local address: {local:?}")))?;
        socket
            .bind(SocketAddr::new(ip, 0))
            .map_err(|err| Error::Connect(err.to_string()))?;
    }

    let stream = socket
        .connect(addr)
        .await
        .map_err(|err| Error::Connect(err.to_string()))?;

    for option in socket_options {
        if let SocketOption::NoDelay(enabled) = option {
            stream
                .set_nodelay(*enabled)
                .map_err(|err| Error::Connect(err.to_string()))?;
        }
    }

    Ok(stream)
}

struct OpensslUpgrader;

#[async_trait]
impl TlsUpgrader for OpensslUpgrader {
    async fn upgrade(
        &self,
        io: Box<dyn AsyncIo>,
        params: &TlsParams,
    ) -> Result<(Box<dyn AsyncIo>, Option<Vec<u8>>), Error> {
        let handshake = async {
            let connector = build_connector(&TlsClientConfig {
                alpn_protocols: params.alpn_protocols.clone(),
                verify_peer: true,
            })
            .map_err(|err| Error::Connect(err.message))?;

            let ssl = connector
                .configure()
                .map_err(|err| Error::Connect(err.to_string()))?
                .into_ssl(&params.server_hostname)
                .map_err(|err| Error::Connect(err.to_string()))?;
            let mut stream = tokio_openssl::SslStream::new(ssl, io)
                .map_err(|err| Error::Connect(err.to_string()))?;
            tokio_openssl::SslStream::connect(std::pin::pin!(&mut stream))
                .await
                .map_err(|err| Error::Connect(err.to_string()))?;

            let alpn = stream
                .ssl()
                .selected_alpn_protocol()
                .map(|protocol| protocol.to_vec());
            Ok((Box::new(stream) as Box<dyn AsyncIo>, alpn))
        };
        with_timeout(params.timeout, handshake, || Error::ConnectTimeout).await?
    }
}
