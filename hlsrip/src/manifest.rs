use crate::error::ManifestError;
use log::{debug, warn};
use reqwest::Url;
use serde::{Serialize, Serializer};
use std::{fs, path::Path};

/// Ordered segment and key references of an HLS media playlist.
#[derive(Clone, Debug, Serialize)]
pub struct Manifest {
    segments: Vec<SegmentRef>,
    keys: Vec<KeyRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SegmentRef {
    /// Position in the playlist, which is also the position in the output.
    pub index: usize,
    #[serde(serialize_with = "serialize_url")]
    pub uri: Url,
}

#[derive(Clone, Debug, Serialize)]
pub struct KeyRef {
    #[serde(serialize_with = "serialize_url")]
    pub uri: Url,
    /// IV attribute as written in the playlist. Never applied, the key doubles as IV.
    pub iv: Option<String>,
}

impl Manifest {
    /// Reads a local playlist file.
    pub fn load(path: &Path, base_url: Option<&Url>) -> Result<Self, ManifestError> {
        let text = fs::read(path).map_err(|source| ManifestError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text, base_url)
    }

    /// Parses playlist text. Relative uris are joined onto `base_url`.
    pub fn parse(text: &[u8], base_url: Option<&Url>) -> Result<Self, ManifestError> {
        let m3u8 = match m3u8_rs::parse_playlist_res(text) {
            Ok(m3u8_rs::Playlist::MediaPlaylist(m3u8)) => m3u8,
            Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => return Err(ManifestError::MasterPlaylist),
            Err(_) => return Err(ManifestError::Parse),
        };

        let mut segments = Vec::with_capacity(m3u8.segments.len());
        let mut keys: Vec<KeyRef> = vec![];
        // first segment switched to clear by a METHOD=NONE tag
        let mut clear = None;

        for (index, segment) in m3u8.segments.iter().enumerate() {
            if segment.byte_range.is_some() {
                return Err(ManifestError::UnsupportedTag {
                    index,
                    tag: "EXT-X-BYTERANGE",
                });
            }

            if segment.map.is_some() {
                return Err(ManifestError::UnsupportedTag {
                    index,
                    tag: "EXT-X-MAP",
                });
            }

            if let Some(key) = &segment.key {
                match &key.method {
                    m3u8_rs::KeyMethod::None => {
                        clear.get_or_insert(index);
                    }
                    m3u8_rs::KeyMethod::AES128 => {
                        let uri = key.uri.as_ref().ok_or(ManifestError::MissingKeyUri)?;
                        let uri = resolve(base_url, uri)?;

                        if !keys.iter().any(|x| x.uri == uri) {
                            keys.push(KeyRef {
                                uri,
                                iv: key.iv.clone(),
                            });
                        }
                    }
                    m3u8_rs::KeyMethod::SampleAES => {
                        return Err(ManifestError::UnsupportedMethod("SAMPLE-AES".to_owned()));
                    }
                    m3u8_rs::KeyMethod::Other(x) => {
                        return Err(ManifestError::UnsupportedMethod(x.to_owned()));
                    }
                }
            }

            segments.push(SegmentRef {
                index,
                uri: resolve(base_url, &segment.uri)?,
            });
        }

        if segments.is_empty() {
            return Err(ManifestError::NoSegments);
        }

        if keys.is_empty() {
            return Err(ManifestError::NoKeys);
        }

        if let Some(index) = clear {
            return Err(ManifestError::MixedEncryption { index });
        }

        if keys.len() > 1 {
            warn!(
                "Playlist has {} keys, only the first one is used ({} ignored)",
                keys.len(),
                keys.len() - 1
            );
        }

        if keys[0].iv.is_some() {
            warn!("Ignoring IV attribute of the key tag, the key itself is used as IV");
        }

        debug!("Parsed {} segments", segments.len());
        Ok(Self { segments, keys })
    }

    pub fn segments(&self) -> &[SegmentRef] {
        &self.segments
    }

    pub fn keys(&self) -> &[KeyRef] {
        &self.keys
    }

    /// First key of the playlist, the one every segment is decrypted with.
    pub fn primary_key(&self) -> &KeyRef {
        &self.keys[0]
    }
}

fn resolve(base_url: Option<&Url>, uri: &str) -> Result<Url, ManifestError> {
    let url = match base_url {
        Some(base_url) => base_url.join(uri),
        None => uri.parse::<Url>(),
    };

    url.map_err(|x| ManifestError::InvalidUri {
        uri: uri.to_owned(),
        reason: if base_url.is_none() {
            format!("{x}, use a base url for relative uris")
        } else {
            x.to_string()
        },
    })
}

fn serialize_url<S: Serializer>(url: &Url, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(url.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"
#EXTINF:10.0,
seg-0.ts
#EXTINF:10.0,
https://cdn.example.com/seg-1.ts
#EXTINF:4.5,
seg-2.ts
#EXT-X-ENDLIST
";

    fn base() -> Url {
        "https://example.com/stream/uwu.m3u8".parse().unwrap()
    }

    #[test]
    fn keeps_playlist_order() {
        let manifest = Manifest::parse(PLAYLIST.as_bytes(), Some(&base())).unwrap();
        let uris = manifest
            .segments()
            .iter()
            .map(|x| (x.index, x.uri.as_str()))
            .collect::<Vec<_>>();

        assert_eq!(
            uris,
            [
                (0, "https://example.com/stream/seg-0.ts"),
                (1, "https://cdn.example.com/seg-1.ts"),
                (2, "https://example.com/stream/seg-2.ts"),
            ]
        );
        assert_eq!(
            manifest.primary_key().uri.as_str(),
            "https://example.com/stream/key.bin"
        );
    }

    #[test]
    fn relative_uri_without_base() {
        assert!(matches!(
            Manifest::parse(PLAYLIST.as_bytes(), None),
            Err(ManifestError::InvalidUri { .. })
        ));
    }

    #[test]
    fn missing_key() {
        let text = PLAYLIST.replace("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n", "");
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::NoKeys)
        ));
    }

    #[test]
    fn no_segments() {
        let text = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-ENDLIST\n";
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::NoSegments)
        ));
    }

    #[test]
    fn sample_aes_rejected() {
        let text = PLAYLIST.replace("METHOD=AES-128", "METHOD=SAMPLE-AES");
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn master_playlist_rejected() {
        let text = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1280x720
720p.m3u8
";
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::MasterPlaylist)
        ));
    }

    #[test]
    fn multiple_keys_keep_first() {
        let text = PLAYLIST.replace(
            "#EXTINF:4.5,",
            "#EXT-X-KEY:METHOD=AES-128,URI=\"key2.bin\",IV=0x0000000000000000000000000000000A\n#EXTINF:4.5,",
        );
        let manifest = Manifest::parse(text.as_bytes(), Some(&base())).unwrap();

        assert_eq!(manifest.keys().len(), 2);
        assert!(manifest.primary_key().uri.as_str().ends_with("/key.bin"));
        assert!(manifest.keys()[1].iv.is_some());
    }

    #[test]
    fn byte_range_rejected() {
        let text = PLAYLIST.replace("#EXTINF:4.5,", "#EXTINF:4.5,\n#EXT-X-BYTERANGE:1024@0");
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::UnsupportedTag {
                index: 2,
                tag: "EXT-X-BYTERANGE"
            })
        ));
    }

    #[test]
    fn init_segment_rejected() {
        let text = PLAYLIST.replace(
            "#EXT-X-KEY:",
            "#EXT-X-MAP:URI=\"init.mp4\"\n#EXT-X-KEY:",
        );
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::UnsupportedTag {
                index: 0,
                tag: "EXT-X-MAP"
            })
        ));
    }

    #[test]
    fn clear_segments_after_key() {
        let text = PLAYLIST.replace("#EXTINF:4.5,", "#EXT-X-KEY:METHOD=NONE\n#EXTINF:4.5,");
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::MixedEncryption { index: 2 })
        ));
    }

    #[test]
    fn clear_segments_before_key() {
        let text = PLAYLIST.replace(
            "#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXTINF:10.0,\nseg-0.ts\n",
            "#EXT-X-KEY:METHOD=NONE\n#EXTINF:10.0,\nseg-0.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n",
        );
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::MixedEncryption { index: 0 })
        ));
    }

    #[test]
    fn clear_playlist_has_no_keys() {
        let text = PLAYLIST.replace("METHOD=AES-128,URI=\"key.bin\"", "METHOD=NONE");
        assert!(matches!(
            Manifest::parse(text.as_bytes(), Some(&base())),
            Err(ManifestError::NoKeys)
        ));
    }

    #[test]
    fn unreadable_file() {
        assert!(matches!(
            Manifest::load(Path::new("does/not/exist.m3u8"), None),
            Err(ManifestError::Read { .. })
        ));
    }
}
