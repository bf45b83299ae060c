use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Re-encodes a byte stream in a declared charset into UTF-8.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
    /// The final flush happened; the decoder must not be used again.
    finished: bool,
}

impl Utf8Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            finished: false,
        }
    }

    /// Decode as much of `src` as possible. Malformed sequences become U+FFFD.
    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<BytesMut> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or_else(|| src.len() * 3 + 4);
        let mut out = vec![0u8; capacity];

        let (_result, read, written, _replaced) = self.decoder.decode_to_utf8(src, &mut out, last);
        src.advance(read);

        (written > 0).then(|| BytesMut::from(&out[..written]))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // A lone partial sequence stays buffered in the decoder until more
        // input arrives.
        Ok(self.transcode(src, false))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            buf.clear();
            return Ok(None);
        }
        self.finished = true;
        let out = self.transcode(buf, true);
        buf.clear();
        Ok(out)
    }
}
