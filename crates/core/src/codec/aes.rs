//! AES-CBC helpers for the standard security handler (R4-R6).

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

use crate::error::{PdfError, Result};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;
type Aes256CbcEnc = Encryptor<aes::Aes256>;

pub const AES_BLOCK: usize = 16;

fn check_shape(key: &[u8], iv: &[u8], data: &[u8]) -> Result<()> {
    if iv.len() != AES_BLOCK {
        return Err(PdfError::EncryptionError(format!(
            "AES IV must be 16 bytes, got {}",
            iv.len()
        )));
    }
    if !matches!(key.len(), 16 | 32) {
        return Err(PdfError::EncryptionError(format!(
            "AES key must be 16 or 32 bytes, got {}",
            key.len()
        )));
    }
    if data.len() % AES_BLOCK != 0 {
        return Err(PdfError::DecodeError(format!(
            "AES data length {} is not a multiple of 16",
            data.len()
        )));
    }
    Ok(())
}

/// AES-CBC decrypt without removing padding. Key is 16 or 32 bytes.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_shape(key, iv, data)?;
    let mut buf = data.to_vec();
    let result = if key.len() == 16 {
        Aes128CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(<[u8]>::len)
    } else {
        Aes256CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(<[u8]>::len)
    };
    result.map_err(|_| PdfError::DecodeError("AES block decryption failed".into()))?;
    Ok(buf)
}

/// AES-CBC encrypt without padding. Key is 16 or 32 bytes.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_shape(key, iv, data)?;
    let mut buf = data.to_vec();
    let len = data.len();
    let result = if key.len() == 16 {
        Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map(<[u8]>::len)
    } else {
        Aes256CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map(<[u8]>::len)
    };
    result.map_err(|_| PdfError::EncryptionError("AES block encryption failed".into()))?;
    Ok(buf)
}

/// Strip PKCS#7 padding; malformed padding leaves the data unchanged.
pub fn unpad_aes(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > AES_BLOCK || pad_len > data.len() {
        return data;
    }
    let start = data.len() - pad_len;
    if data[start..].iter().all(|&b| b as usize == pad_len) {
        &data[..start]
    } else {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_128_and_256() {
        let iv = [7u8; 16];
        let plain = [0x42u8; 32];
        for key in [&[1u8; 16][..], &[2u8; 32][..]] {
            let enc = aes_cbc_encrypt(key, &iv, &plain).unwrap();
            assert_ne!(enc, plain);
            assert_eq!(aes_cbc_decrypt(key, &iv, &enc).unwrap(), plain);
        }
    }

    #[test]
    fn bad_shapes_are_errors_not_panics() {
        assert!(aes_cbc_decrypt(&[0; 15], &[0; 16], &[0; 16]).is_err());
        assert!(aes_cbc_decrypt(&[0; 16], &[0; 8], &[0; 16]).is_err());
        assert!(aes_cbc_decrypt(&[0; 16], &[0; 16], &[0; 17]).is_err());
    }

    #[test]
    fn unpad_variants() {
        assert_eq!(unpad_aes(b"abc\x03\x03\x03"), b"abc");
        assert_eq!(unpad_aes(b"abc\x03\x02\x03"), b"abc\x03\x02\x03");
        assert_eq!(unpad_aes(b"abc\x00"), b"abc\x00");
        assert_eq!(unpad_aes(b""), b"");
    }
}
