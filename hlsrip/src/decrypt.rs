use crate::{
    error::{Error, Result},
    fetch::RawSegment,
    key::KeyMaterial,
};
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use std::sync::Arc;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const BLOCK_SIZE: usize = 16;

/// Decrypted bytes of one segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlainSegment {
    pub index: usize,
    pub data: Vec<u8>,
}

/// AES-128-CBC decrypter for segments encrypted with the playlist key.
///
/// Every segment is an independent CBC unit starting from the same IV.
#[derive(Clone)]
pub struct Decryptor {
    key: Arc<KeyMaterial>,
}

impl Decryptor {
    pub fn new(key: Arc<KeyMaterial>) -> Self {
        Self { key }
    }

    pub fn decrypt(&self, segment: RawSegment) -> Result<PlainSegment> {
        let RawSegment { index, mut data } = segment;
        let len = data.len();

        Aes128CbcDec::new(self.key.key().into(), self.key.iv().into())
            .decrypt_padded_mut::<NoPadding>(&mut data)
            .map_err(|_| Error::Decrypt { index, len })?;

        if let Some(unpadded) = pkcs7_unpadded_len(&data) {
            data.truncate(unpadded);
        }

        Ok(PlainSegment { index, data })
    }
}

/// Length without PKCS#7 padding, `None` when the padding is absent or malformed.
fn pkcs7_unpadded_len(data: &[u8]) -> Option<usize> {
    let pad = *data.last()? as usize;

    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return None;
    }

    data[data.len() - pad..]
        .iter()
        .all(|x| *x as usize == pad)
        .then(|| data.len() - pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::{BlockEncryptMut, block_padding::Pkcs7};

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    const KEY: &[u8; 16] = b"0123456789abcdef";

    fn decryptor() -> Decryptor {
        Decryptor::new(Arc::new(KeyMaterial::new(*KEY)))
    }

    fn raw(index: usize, hex: &str) -> RawSegment {
        RawSegment {
            index,
            data: hex::decode(hex).unwrap(),
        }
    }

    #[test]
    fn known_ciphertext() {
        let plain = decryptor()
            .decrypt(raw(
                1,
                "d1b37e6d9e878fa681ff29467186e3354029d6588bfcf78b24d35e99c3b51fc9",
            ))
            .unwrap();

        assert_eq!(plain.index, 1);
        assert_eq!(plain.data, b"second segment, a bit longer");
    }

    #[test]
    fn full_padding_block_removed() {
        let plain = decryptor()
            .decrypt(raw(
                0,
                "dc005b3c6dafa994d520c97b213b2ed3fc6e841ec6c89fa9d595f19e58d2a298",
            ))
            .unwrap();

        assert_eq!(plain.data, b"first segment...");
    }

    #[test]
    fn unpadded_output_kept() {
        let plain = decryptor()
            .decrypt(raw(4, "cbbd6157f4ba7d2bedc56ad9a5efdd8a"))
            .unwrap();

        assert_eq!(plain.data, b"exactly16bytes!!");
    }

    #[test]
    fn segments_do_not_chain() {
        let mut buf = [0u8; 48];
        let msg = b"same plaintext in every segment";
        buf[..msg.len()].copy_from_slice(msg);
        let ct = Aes128CbcEnc::new(KEY.into(), KEY.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, msg.len())
            .unwrap()
            .to_vec();

        let decryptor = decryptor();

        for index in 0..3 {
            let plain = decryptor
                .decrypt(RawSegment {
                    index,
                    data: ct.clone(),
                })
                .unwrap();
            assert_eq!(plain.data, msg);
        }
    }

    #[test]
    fn partial_block_fails() {
        let error = decryptor()
            .decrypt(RawSegment {
                index: 7,
                data: vec![0; 20],
            })
            .unwrap_err();

        assert!(matches!(error, Error::Decrypt { index: 7, len: 20 }));
    }

    #[test]
    fn empty_segment() {
        let plain = decryptor()
            .decrypt(RawSegment {
                index: 0,
                data: vec![],
            })
            .unwrap();

        assert!(plain.data.is_empty());
    }

    #[test]
    fn pkcs7() {
        assert_eq!(pkcs7_unpadded_len(&[1, 2, 3, 2, 2]), Some(3));
        assert_eq!(pkcs7_unpadded_len(&[1, 2, 3, 1, 2]), None);
        assert_eq!(pkcs7_unpadded_len(&[1, 2, 0]), None);
        assert_eq!(pkcs7_unpadded_len(&[17; 17]), None);
        assert_eq!(pkcs7_unpadded_len(&[]), None);
    }
}
