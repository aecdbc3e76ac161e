use hpack::{Decoder, Encoder};

use super::types::{HeaderField, Http2Error, Http2ErrorKind};

pub struct HpackDecoder {
    inner: Decoder<'static>,
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: Decoder::new(),
        }
    }

    pub fn set_max_table_size(&mut self, size: u32) {
        self.inner.set_max_table_size(size as usize);
    }

    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>, Http2Error> {
        self.inner
            .decode(block)
            .map(|headers| {
                headers
                    .into_iter()
                    .map(|(name, value)| HeaderField { name, value })
                    .collect()
            })
            .map_err(|_err| Http2Error {
                kind: Http2ErrorKind::HpackDecode,
                offset: 0,
            })
    }
}

pub struct HpackEncoder {
    inner: Encoder<'static>,
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: Encoder::new(),
        }
    }

    pub fn encode(&mut self, headers: &[HeaderField]) -> Vec<u8> {
        self.inner.encode(
            headers
                .iter()
                .map(|header| (header.name.as_slice(), header.value.as_slice())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::HeaderField;
    use super::{HpackDecoder, HpackEncoder};

    #[test]
    fn encode_decode_round_trip() {
        let headers = vec![
            HeaderField {
                name: b":status".to_vec(),
                value: b"200".to_vec(),
            },
            HeaderField {
                name: b"content-type".to_vec(),
                value: b"text/plain".to_vec(),
            },
        ];

        let mut encoder = HpackEncoder::new();
        let block = encoder.encode(&headers);

        let mut decoder = HpackDecoder::new();
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(decoded, headers);
    }
}
