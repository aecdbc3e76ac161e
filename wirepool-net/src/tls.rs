use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};

#[derive(Debug)]
pub struct TlsError {
    pub message: String,
}

impl TlsError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TlsClientConfig {
    pub alpn_protocols: Vec<Vec<u8>>,
    pub verify_peer: bool,
}

impl Default for TlsClientConfig {
    fn default() -> Self {
        Self {
            alpn_protocols: Vec::new(),
            verify_peer: true,
        }
    }
}

pub fn build_connector(config: &TlsClientConfig) -> Result<SslConnector, TlsError> {
    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|err| TlsError::new(err.to_string()))?;

    if !config.alpn_protocols.is_empty() {
        let encoded = encode_alpn_protocols(&config.alpn_protocols)?;
        builder
            .set_alpn_protos(&encoded)
            .map_err(|err| TlsError::new(err.to_string()))?;
    }
    if !config.verify_peer {
        builder.set_verify(SslVerifyMode::NONE);
    }

    Ok(builder.build())
}

/// ALPN protocol lists are wire-encoded as length-prefixed entries.
pub fn encode_alpn_protocols(protocols: &[Vec<u8>]) -> Result<Vec<u8>, TlsError> {
    let mut encoded = Vec::new();
    for protocol in protocols {
        if protocol.len() > u8::MAX as usize {
            return Err(TlsError::new("alpn protocol too long"));
        }
        encoded.push(protocol.len() as u8);
        encoded.extend_from_slice(protocol);
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::encode_alpn_protocols;

    #[test]
    fn alpn_entries_are_length_prefixed() {
        let encoded =
            encode_alpn_protocols(&[b"h2".to_vec(), b"http/1.1".to_vec()]).unwrap();
        assert_eq!(encoded, b"\x02h2\x08http/1.1");
    }

    #[test]
    fn oversized_alpn_entry_is_rejected() {
        let encoded = encode_alpn_protocols(&[vec![b'a'; 300]]);
        assert!(encoded.is_err());
    }
}
