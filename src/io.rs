//! Byte sources: local files, optional gzip/zstd decompression and
//! transcoding to UTF-8.
use crate::CsvResult;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::codec::Utf8Transcoder;

/// Buffer size used when reading from the underlying source.
pub const SOURCE_BUFFER_SIZE: usize = 1 << 20;

/// Describes where bytes come from and how they are encoded.
#[derive(Debug, Clone)]
pub struct SourceMeta {
    /// e.g. "application/gzip" or "text/csv; charset=windows-1252"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// Identifier reported in file info, usually the file name.
    pub name_hint: String,
    /// Character encoding of the decompressed bytes.
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

impl SourceMeta {
    /// Best-effort metadata from a path's extension.
    pub fn for_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let mut meta = SourceMeta {
            name_hint: name,
            ..Default::default()
        };

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        match ext {
            "gz" => {
                meta.content_type = "application/gzip".into();
                meta.content_encoding = "gzip".into();
            }
            "zst" => {
                meta.content_type = "application/zstd".into();
                meta.content_encoding = "zstd".into();
            }
            _ => {
                meta.content_type = "text/csv".into();
            }
        }
        meta
    }

    pub fn with_charset(mut self, charset: &'static encoding_rs::Encoding) -> Self {
        self.charset = charset;
        self
    }

    /// Charset named by a `charset=` parameter of the content type, if any.
    fn declared_charset(&self) -> Option<&'static encoding_rs::Encoding> {
        self.content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .and_then(|(_, value)| {
                encoding_rs::Encoding::for_label(value.trim().trim_matches('"').as_bytes())
            })
    }

    fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.mime();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || self.name_hint.ends_with(".gz")
    }

    fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.mime() == "application/zstd"
            || self.name_hint.ends_with(".zst")
    }

    /// Content type without parameters, lowercased.
    fn mime(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

/// From a generic AsyncRead, wrap with optional decompression and UTF-8 transcoding.
/// Returns the wrapped reader plus the normalized meta (charset resolved from
/// the content type when declared there).
pub fn build_source<R>(raw: R, meta: SourceMeta) -> (impl AsyncRead + Unpin + Send, SourceMeta)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut meta = meta;
    if let Some(charset) = meta.declared_charset() {
        meta.charset = charset;
    }

    let buf = BufReader::with_capacity(SOURCE_BUFFER_SIZE, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = if meta.is_gzip() {
        Box::new(GzipDecoder::new(buf))
    } else if meta.is_zstd() {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    // Only transcode when needed to avoid extra copies.
    let stream_reader: Box<dyn AsyncRead + Unpin + Send> = if meta.charset == encoding_rs::UTF_8 {
        Box::new(decompressed)
    } else {
        let framed = FramedRead::new(decompressed, Utf8Transcoder::new(meta.charset));
        Box::new(StreamReader::new(framed))
    };

    (stream_reader, meta)
}

/// Open a local file as a byte source in the given charset.
pub async fn source_from_path(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
) -> CsvResult<(impl AsyncRead + Unpin + Send, SourceMeta)> {
    let file = File::open(path).await?;
    Ok(build_source(file, SourceMeta::for_path(path).with_charset(charset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn meta_from_extension() {
        let meta = SourceMeta::for_path(&PathBuf::from("/tmp/data.csv.gz"));
        assert_eq!("data.csv.gz", meta.name_hint);
        assert!(meta.is_gzip());
        assert!(!meta.is_zstd());

        let meta = SourceMeta::for_path(&PathBuf::from("plain.csv"));
        assert_eq!("text/csv", meta.content_type);
        assert!(!meta.is_gzip());
    }

    #[test]
    fn charset_from_content_type() {
        let meta = SourceMeta {
            content_type: "text/csv; charset=\"ISO-8859-1\"".into(),
            ..Default::default()
        };
        assert_eq!(Some(encoding_rs::WINDOWS_1252), meta.declared_charset());
        assert_eq!("text/csv", meta.mime());
    }

    #[tokio::test]
    async fn transcodes_declared_charset() {
        use tokio::io::AsyncReadExt;

        let raw: &'static [u8] = b"name\ncaf\xe9\n";
        let meta = SourceMeta::default().with_charset(encoding_rs::WINDOWS_1252);
        let (mut reader, meta) = build_source(raw, meta);
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!("name\ncafé\n", out);
        assert_eq!("windows-1252", meta.charset.name());
    }

    #[tokio::test]
    async fn truncated_utf16_reads_to_end() {
        use tokio::io::AsyncReadExt;

        let raw: &'static [u8] = b"a\x00,\x00b\x00\n\x00c";
        let meta = SourceMeta::default().with_charset(encoding_rs::UTF_16LE);
        let (mut reader, _) = build_source(raw, meta);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!("a,b\n\u{fffd}", String::from_utf8(out).unwrap());
    }
}
