//! Playlist resolution: variant selection and segment list construction.

use m3u8_rs::{KeyMethod, MediaPlaylist, Playlist, VariantStream};
use url::Url;

use crate::error::TransferError;
use crate::http::HttpClient;

/// Encryption method declared by `#EXT-X-KEY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionMethod {
    Aes128,
    SampleAes,
    Other(String),
}

impl std::fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncryptionMethod::Aes128 => f.write_str("AES-128"),
            EncryptionMethod::SampleAes => f.write_str("SAMPLE-AES"),
            EncryptionMethod::Other(m) => f.write_str(m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encryption {
    pub method: EncryptionMethod,
    /// Absolute key URI.
    pub key_uri: Option<String>,
    /// Explicit IV, or one derived from the media sequence number for AES-128.
    pub iv: Option<[u8; 16]>,
}

/// One media segment in playlist order.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub duration: f32,
    /// Absolute segment URI.
    pub uri: String,
    pub encryption: Option<Encryption>,
}

pub fn parse(bytes: &[u8]) -> Result<Playlist, TransferError> {
    m3u8_rs::parse_playlist_res(bytes)
        .map_err(|e| TransferError::Playlist(format!("unparseable playlist: {:?}", e)))
}

/// Highest `BANDWIDTH`; the first one listed wins a tie.
pub fn select_variant(variants: &[VariantStream]) -> Option<&VariantStream> {
    variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .fold(None, |best: Option<&VariantStream>, v| match best {
            Some(b) if b.bandwidth >= v.bandwidth => Some(b),
            _ => Some(v),
        })
}

pub fn resolve(base: &Url, uri: &str) -> Result<Url, TransferError> {
    base.join(uri)
        .map_err(|e| TransferError::Playlist(format!("cannot resolve {} against {}: {}", uri, base, e)))
}

/// `0x`-prefixed 32-digit hex IV.
pub fn parse_iv(value: &str) -> Result<[u8; 16], TransferError> {
    let hex_str = value
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let mut iv = [0u8; 16];
    hex::decode_to_slice(hex_str, &mut iv)
        .map_err(|e| TransferError::Playlist(format!("bad IV {:?}: {}", value, e)))?;
    Ok(iv)
}

/// IV implied by a media sequence number when the key tag has none.
pub fn iv_from_sequence(sequence: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[8..].copy_from_slice(&sequence.to_be_bytes());
    iv
}

/// Builds the ordered segment list. A key tag applies to every following
/// segment until the next one.
pub fn segments(media: &MediaPlaylist, base: &Url) -> Result<Vec<Segment>, TransferError> {
    let mut current: Option<m3u8_rs::Key> = None;
    let mut out = Vec::with_capacity(media.segments.len());
    for (index, seg) in media.segments.iter().enumerate() {
        if let Some(key) = &seg.key {
            current = Some(key.clone());
        }
        let encryption = match &current {
            None => None,
            Some(key) => {
                let method = match &key.method {
                    KeyMethod::None => None,
                    KeyMethod::AES128 => Some(EncryptionMethod::Aes128),
                    KeyMethod::SampleAES => Some(EncryptionMethod::SampleAes),
                    KeyMethod::Other(m) => Some(EncryptionMethod::Other(m.clone())),
                };
                match method {
                    None => None,
                    Some(method) => {
                        let key_uri = match &key.uri {
                            Some(u) => Some(resolve(base, u)?.to_string()),
                            None => None,
                        };
                        let iv = match (&key.iv, &method) {
                            (Some(iv), _) => Some(parse_iv(iv)?),
                            (None, EncryptionMethod::Aes128) => {
                                Some(iv_from_sequence(media.media_sequence + index as u64))
                            }
                            (None, _) => None,
                        };
                        Some(Encryption {
                            method,
                            key_uri,
                            iv,
                        })
                    }
                }
            }
        };
        out.push(Segment {
            index,
            duration: seg.duration,
            uri: resolve(base, &seg.uri)?.to_string(),
            encryption,
        });
    }
    Ok(out)
}

/// Fetches `uri`; if it is a variant playlist, follows the best variant.
/// Returns the media playlist and the URL relative URIs resolve against.
pub async fn load_media(
    client: &HttpClient,
    uri: &str,
) -> Result<(MediaPlaylist, Url), TransferError> {
    let url = Url::parse(uri).map_err(|e| TransferError::invalid_uri(uri, e.to_string()))?;
    let body = client.fetch_bytes(url.as_str()).await?;
    match parse(&body)? {
        Playlist::MediaPlaylist(media) => Ok((media, url)),
        Playlist::MasterPlaylist(master) => {
            let best = select_variant(&master.variants).ok_or_else(|| {
                TransferError::Playlist(format!("variant playlist {} lists no streams", uri))
            })?;
            let variant_url = resolve(&url, &best.uri)?;
            tracing::info!(
                variants = master.variants.len(),
                bandwidth = best.bandwidth,
                uri = %variant_url,
                "selected variant"
            );
            let body = client.fetch_bytes(variant_url.as_str()).await?;
            match parse(&body)? {
                Playlist::MediaPlaylist(media) => Ok((media, variant_url)),
                Playlist::MasterPlaylist(_) => Err(TransferError::Playlist(format!(
                    "{} is another variant playlist",
                    variant_url
                ))),
            }
        }
    }
}
