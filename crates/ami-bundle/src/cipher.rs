//! AES-128-CBC encryption stage of the bundle pipeline.
//!
//! `ec2-ami-tools` encrypts via `openssl enc -e -aes-128-cbc -K key -iv iv`,
//! which pads with PKCS#7 (the docs say PKCS#5, but that is only defined for
//! 8-byte blocks). The final padded block is emitted on [`AesCbcWriter::finish`],
//! so the ciphertext length is always a positive multiple of 16, even for an
//! empty plaintext, which encrypts to a single all-padding block.

use std::io::{self, Write};

use aes::cipher::{generic_array::GenericArray, BlockEncryptMut, KeyIvInit};
use aes::Aes128;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

pub const BLOCK_SIZE: usize = 16;

/// An [`io::Write`] that AES-128-CBC-encrypts its input into a downstream
/// writer.
///
/// Partial trailing blocks are buffered between writes; the caller always
/// sees its full write count accepted. `finish` pads and flushes the final
/// block without closing the downstream writer, which is recovered with
/// [`AesCbcWriter::into_inner`].
pub struct AesCbcWriter<W> {
    inner: W,
    enc: Option<Aes128CbcEnc>,
    buf: [u8; BLOCK_SIZE],
    buf_len: usize,
}

impl<W: Write> AesCbcWriter<W> {
    pub fn new(inner: W, key: &[u8; 16], iv: &[u8; 16]) -> Self {
        Self {
            inner,
            enc: Some(Aes128CbcEnc::new(key.into(), iv.into())),
            buf: [0; BLOCK_SIZE],
            buf_len: 0,
        }
    }

    /// Emit the PKCS#7 padding block(s) and mark the writer closed.
    ///
    /// Exactly one padded block is written: N bytes of value N where
    /// N = 16 − buffered, or a full block of 16s when nothing is buffered.
    pub fn finish(&mut self) -> io::Result<()> {
        let Some(mut enc) = self.enc.take() else {
            return Err(already_closed());
        };

        let pad = (BLOCK_SIZE - self.buf_len) as u8;
        for slot in &mut self.buf[self.buf_len..] {
            *slot = pad;
        }
        let mut block = GenericArray::from(self.buf);
        enc.encrypt_block_mut(&mut block);
        self.buf_len = 0;
        self.inner.write_all(&block)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn already_closed() -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        "AES-128-CBC writer is already closed",
    )
}

impl<W: Write> Write for AesCbcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(enc) = self.enc.as_mut() else {
            return Err(already_closed());
        };

        let accepted = buf.len();
        let mut rest = buf;

        // Top up a partial block left over from the previous write.
        if self.buf_len > 0 {
            let take = rest.len().min(BLOCK_SIZE - self.buf_len);
            self.buf[self.buf_len..self.buf_len + take].copy_from_slice(&rest[..take]);
            self.buf_len += take;
            rest = &rest[take..];

            if self.buf_len == BLOCK_SIZE {
                let mut block = GenericArray::from(self.buf);
                enc.encrypt_block_mut(&mut block);
                self.buf_len = 0;
                self.inner.write_all(&block)?;
            }
        }

        // Encrypt whole blocks in one pass, buffering the ciphertext so the
        // downstream writer sees a single write per call.
        let whole = rest.len() / BLOCK_SIZE * BLOCK_SIZE;
        if whole > 0 {
            let mut ciphertext = rest[..whole].to_vec();
            for chunk in ciphertext.chunks_exact_mut(BLOCK_SIZE) {
                enc.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
            }
            self.inner.write_all(&ciphertext)?;
            rest = &rest[whole..];
        }

        // Buffer the tail. When `rest` is non-empty the block buffer is
        // empty: the top-up either flushed it or consumed all of `buf`.
        if !rest.is_empty() {
            self.buf[..rest.len()].copy_from_slice(rest);
            self.buf_len = rest.len();
        }

        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        // No partial-block flushing; only the downstream buffer is flushed.
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut};

    type Aes128CbcDec = cbc::Decryptor<Aes128>;

    // NIST SP 800-38A F.2.1 (CBC-AES128.Encrypt), first two blocks.
    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    const IV: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];
    const PT: [u8; 32] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
        0x2a, 0xae, 0x2d, 0x8a, 0x57, 0x1e, 0x03, 0xac, 0x9c, 0x9e, 0xb7, 0x6f, 0xac, 0x45, 0xaf,
        0x8e, 0x51,
    ];
    const CT: [u8; 32] = [
        0x76, 0x49, 0xab, 0xac, 0x81, 0x19, 0xb2, 0x46, 0xce, 0xe9, 0x8e, 0x9b, 0x12, 0xe9, 0x19,
        0x7d, 0x50, 0x86, 0xcb, 0x9b, 0x50, 0x72, 0x19, 0xee, 0x95, 0xdb, 0x11, 0x3a, 0x91, 0x76,
        0x78, 0xb2,
    ];

    fn encrypt_in_slices(data: &[u8], slice: usize) -> Vec<u8> {
        let mut w = AesCbcWriter::new(Vec::new(), &KEY, &IV);
        for piece in data.chunks(slice.max(1)) {
            assert_eq!(w.write(piece).unwrap(), piece.len());
        }
        w.finish().unwrap();
        w.into_inner()
    }

    #[test]
    fn matches_nist_cbc_vectors() {
        let out = encrypt_in_slices(&PT, PT.len());
        // Two data blocks, then one all-padding block.
        assert_eq!(out.len(), 48);
        assert_eq!(&out[..32], &CT);
    }

    #[test]
    fn write_granularity_does_not_change_ciphertext() {
        let whole = encrypt_in_slices(&PT, PT.len());
        for slice in [1, 3, 15, 16, 17, 31] {
            assert_eq!(encrypt_in_slices(&PT, slice), whole, "slice size {slice}");
        }
    }

    #[test]
    fn empty_plaintext_is_one_padding_block() {
        let mut w = AesCbcWriter::new(Vec::new(), &KEY, &IV);
        w.finish().unwrap();
        let out = w.into_inner();
        assert_eq!(out.len(), BLOCK_SIZE);
    }

    #[test]
    fn round_trips_through_pkcs7_decryption() {
        let data = b"an uneven amount of plaintext data.";
        let mut out = encrypt_in_slices(data, 7);

        let dec = Aes128CbcDec::new(&KEY.into(), &IV.into());
        let plain = dec.decrypt_padded_mut::<Pkcs7>(&mut out).unwrap();
        assert_eq!(plain, data);
    }

    #[test]
    fn use_after_finish_is_an_error() {
        let mut w = AesCbcWriter::new(Vec::new(), &KEY, &IV);
        w.finish().unwrap();
        assert!(w.write(b"x").is_err());
        assert!(w.finish().is_err());
    }
}
