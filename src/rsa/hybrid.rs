//! 混合加密: 用RSA保护随机会话值, 以SHA-512(会话值)的摘要字节作为密钥流
//!
//! 密文布局: `[2字节大端长度][RSA加密的会话值][明文 XOR 平铺的摘要]`
//!
//! (origin ⊕ keystream) ⊕ keystream = origin, RSA只加密短会话值,
//! 负载长度不受模数限制. 该方案仅提供机密性, 不含完整性校验:
//! 被掩码区域的比特翻转会静默得到错误明文, 而不是可检测的错误.

use crate::rsa::{PublicKey, RsaKey, SecretKey};
use crate::utils::BigUintExt;
use crate::{CipherError, Cryptor, Rand};
use num_bigint::BigUint;
use sha2::{Digest, Sha512};
use std::cell::RefCell;
use std::io::{ErrorKind, Read, Write};

/// 会话值长度前缀的字节数
const SESSION_LEN_BYTES: usize = 2;

/// 流式加解密的工作缓冲区大小
const CHUNK_SIZE: usize = 4096;

pub struct HybridCipher<R: Rand> {
    rng: RefCell<R>,
}

impl<R: Rand> HybridCipher<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: RefCell::new(rng),
        }
    }

    // 生成随机会话值, 返回(长度前缀+RSA加密的会话值, 密钥流摘要)
    fn new_session(&self, pk: &PublicKey) -> Result<(Vec<u8>, [u8; 64]), CipherError> {
        let session = {
            let mut rng = self.rng.borrow_mut();
            BigUintExt(pk.modulus()).gen_random(&mut *rng)
        };

        let protected = pk.rsaep(&session)?.to_bytes_be();
        if protected.len() > u16::MAX as usize {
            return Err(CipherError::Other(
                "hybrid: the modulus is too large for the session length prefix".to_string(),
            ));
        }

        let mut header = Vec::with_capacity(SESSION_LEN_BYTES + protected.len());
        header.extend_from_slice(&(protected.len() as u16).to_be_bytes());
        header.extend_from_slice(protected.as_slice());

        Ok((header, keystream_digest(&session)))
    }

    // 用私钥恢复会话值并重建密钥流摘要
    fn open_session(&self, sk: &SecretKey, protected: &[u8]) -> Result<[u8; 64], CipherError> {
        let protected = BigUint::from_bytes_be(protected);
        if &protected >= sk.public_key().modulus() {
            return Err(CipherError::MalformedCiphertext(
                "protected session value exceeds the modulus".to_string(),
            ));
        }

        let session = sk.rsadp(&protected)?;
        Ok(keystream_digest(&session))
    }

    fn secret_key<'a>(&self, key: &'a RsaKey) -> Result<&'a SecretKey, CipherError> {
        key.secret_key()
            .ok_or(CipherError::KeyCapability("hybrid decrypt requires a secret key"))
    }
}

impl<R: Rand> Default for HybridCipher<R> {
    fn default() -> Self {
        Self::new(R::default())
    }
}

impl<R: Rand> Cryptor for HybridCipher<R> {
    type Key = RsaKey;

    fn encrypt(&self, plaintext: &[u8], len: usize, key: &RsaKey) -> Result<Vec<u8>, CipherError> {
        if len > plaintext.len() {
            return Err(CipherError::Other(format!(
                "hybrid: encrypt length `{}` exceeds the plaintext length `{}`",
                len,
                plaintext.len()
            )));
        }

        let (header, digest) = self.new_session(key.public_key())?;

        let mut out = Vec::with_capacity(header.len() + len);
        out.extend_from_slice(header.as_slice());
        out.extend(
            plaintext[..len]
                .iter()
                .zip(digest.iter().cycle())
                .map(|(&x, &m)| x ^ m),
        );
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &RsaKey) -> Result<Vec<u8>, CipherError> {
        let sk = self.secret_key(key)?;

        if ciphertext.len() < SESSION_LEN_BYTES + 1 {
            return Err(CipherError::MalformedCiphertext(
                "cipher data shorter than the minimum header".to_string(),
            ));
        }

        let klen = u16::from_be_bytes([ciphertext[0], ciphertext[1]]) as usize;
        if klen == 0 || SESSION_LEN_BYTES + klen > ciphertext.len() {
            return Err(CipherError::MalformedCiphertext(format!(
                "protected session value length `{}` not match to cipher data length `{}`",
                klen,
                ciphertext.len()
            )));
        }

        let digest = self.open_session(sk, &ciphertext[SESSION_LEN_BYTES..SESSION_LEN_BYTES + klen])?;

        Ok(ciphertext[SESSION_LEN_BYTES + klen..]
            .iter()
            .zip(digest.iter().cycle())
            .map(|(&x, &m)| x ^ m)
            .collect())
    }

    fn encrypt_stream<IR: Read, OW: Write>(
        &self,
        input: &mut IR,
        key: &RsaKey,
        output: &mut OW,
    ) -> Result<usize, CipherError> {
        let (header, digest) = self.new_session(key.public_key())?;
        output.write_all(header.as_slice())?;

        let (mut buf, mut written, mut pos) = (vec![0u8; CHUNK_SIZE], header.len(), 0usize);
        loop {
            let len = match input.read(buf.as_mut_slice()) {
                Ok(0) => break,
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            // 密钥流偏移跨块累计, 与一次性加密的结果逐字节一致
            for x in buf[..len].iter_mut() {
                *x ^= digest[pos % digest.len()];
                pos += 1;
            }

            output.write_all(&buf[..len])?;
            written += len;
        }

        output.flush()?;
        Ok(written)
    }

    fn decrypt_stream<IR: Read, OW: Write>(
        &self,
        input: &mut IR,
        key: &RsaKey,
        output: &mut OW,
    ) -> Result<usize, CipherError> {
        let sk = self.secret_key(key)?;

        let mut prefix = [0u8; SESSION_LEN_BYTES];
        read_exact_or_malformed(input, &mut prefix)?;
        let klen = u16::from_be_bytes(prefix) as usize;
        if klen == 0 {
            return Err(CipherError::MalformedCiphertext(
                "empty protected session value".to_string(),
            ));
        }

        let mut protected = vec![0u8; klen];
        read_exact_or_malformed(input, protected.as_mut_slice())?;
        let digest = self.open_session(sk, protected.as_slice())?;

        let (mut buf, mut written, mut pos) = (vec![0u8; CHUNK_SIZE], 0usize, 0usize);
        loop {
            let len = match input.read(buf.as_mut_slice()) {
                Ok(0) => break,
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            for x in buf[..len].iter_mut() {
                *x ^= digest[pos % digest.len()];
                pos += 1;
            }

            output.write_all(&buf[..len])?;
            written += len;
        }

        output.flush()?;
        Ok(written)
    }

    /// 流式处理的工作块大小
    fn block_size(&self, _key: &RsaKey) -> usize {
        CHUNK_SIZE
    }
}

// 会话值的最小大端序列化是双方共同的摘要输入
fn keystream_digest(session: &BigUint) -> [u8; 64] {
    let mut digest = [0u8; 64];
    digest.copy_from_slice(Sha512::digest(session.to_bytes_be()).as_slice());
    digest
}

// 头部不足时按密文格式错误处理, 而不是IO错误
fn read_exact_or_malformed<IR: Read>(input: &mut IR, buf: &mut [u8]) -> Result<(), CipherError> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            CipherError::MalformedCiphertext(
                "cipher stream shorter than the minimum header".to_string(),
            )
        } else {
            CipherError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::rsa::{HybridCipher, RsaKey, SecretKey, F4};
    use crate::{CipherError, Cryptor, DefaultRand};

    fn keypair(bits_len: usize) -> (RsaKey, RsaKey) {
        let mut rng = DefaultRand::default();
        let sk = SecretKey::generate(bits_len, F4, &mut rng).unwrap();
        let secret = RsaKey::Secret(sk);
        let public = secret.to_public();
        (public, secret)
    }

    #[test]
    fn round_trip() {
        let (public, secret) = keypair(512);
        let cipher = HybridCipher::<DefaultRand>::default();

        for msg in [
            Vec::new(),
            vec![0u8],
            b"hello, world".to_vec(),
            vec![0xa5u8; 300],
        ] {
            let enc = cipher.encrypt(msg.as_slice(), msg.len(), &public).unwrap();
            let dec = cipher.decrypt(enc.as_slice(), &secret).unwrap();
            assert_eq!(dec, msg);
        }
    }

    #[test]
    fn partial_length_encrypt() {
        let (public, secret) = keypair(512);
        let cipher = HybridCipher::<DefaultRand>::default();

        let msg = b"the quick brown fox jumps over the lazy dog";
        let enc = cipher.encrypt(msg, 9, &public).unwrap();
        let dec = cipher.decrypt(enc.as_slice(), &secret).unwrap();
        assert_eq!(dec, &msg[..9]);

        assert!(cipher.encrypt(msg, msg.len() + 1, &public).is_err());
    }

    #[test]
    fn ciphertext_is_randomized() {
        let (public, secret) = keypair(512);
        let cipher = HybridCipher::<DefaultRand>::default();

        let msg = b"determinism check";
        let c1 = cipher.encrypt(msg, msg.len(), &public).unwrap();
        let c2 = cipher.encrypt(msg, msg.len(), &public).unwrap();
        assert_ne!(c1, c2, "session value must differ between calls");

        assert_eq!(cipher.decrypt(c1.as_slice(), &secret).unwrap(), msg);
        assert_eq!(cipher.decrypt(c2.as_slice(), &secret).unwrap(), msg);
    }

    #[test]
    fn public_key_cannot_decrypt() {
        let (public, _secret) = keypair(512);
        let cipher = HybridCipher::<DefaultRand>::default();

        let enc = cipher.encrypt(b"secret", 6, &public).unwrap();
        assert!(matches!(
            cipher.decrypt(enc.as_slice(), &public),
            Err(CipherError::KeyCapability(_))
        ));
    }

    #[test]
    fn reject_short_cipher_data() {
        let (_public, secret) = keypair(512);
        let cipher = HybridCipher::<DefaultRand>::default();

        for data in [&[][..], &[0u8][..], &[0u8, 1][..]] {
            assert!(matches!(
                cipher.decrypt(data, &secret),
                Err(CipherError::MalformedCiphertext(_))
            ));
        }

        // declared length exceeds the available bytes
        assert!(matches!(
            cipher.decrypt(&[0u8, 4, 1, 2], &secret),
            Err(CipherError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn wire_layout() {
        let (public, secret) = keypair(1024);
        let cipher = HybridCipher::<DefaultRand>::default();

        let msg = b"the quick brown fox";
        let enc = cipher.encrypt(msg, msg.len(), &public).unwrap();

        let klen = u16::from_be_bytes([enc[0], enc[1]]) as usize;
        assert_eq!(enc.len(), 2 + klen + msg.len());
        assert!(klen <= public.public_key().modulus_len());

        let dec = cipher.decrypt(enc.as_slice(), &secret).unwrap();
        assert_eq!(dec, msg);
    }

    #[test]
    fn stream_matches_in_memory() {
        let (public, secret) = keypair(512);
        let cipher = HybridCipher::<DefaultRand>::default();

        // 跨多个工作块的负载
        let msg = (0..10_000u32).map(|x| x as u8).collect::<Vec<_>>();

        let mut enc = Vec::new();
        let written = cipher
            .encrypt_stream(&mut msg.as_slice(), &public, &mut enc)
            .unwrap();
        assert_eq!(written, enc.len());

        // 流式密文可由一次性解密恢复
        assert_eq!(cipher.decrypt(enc.as_slice(), &secret).unwrap(), msg);

        // 一次性密文可由流式解密恢复
        let one_shot = cipher.encrypt(msg.as_slice(), msg.len(), &public).unwrap();
        let mut dec = Vec::new();
        let written = cipher
            .decrypt_stream(&mut one_shot.as_slice(), &secret, &mut dec)
            .unwrap();
        assert_eq!(written, dec.len());
        assert_eq!(dec, msg);
    }

    #[test]
    fn stream_rejects_truncated_header() {
        let (_public, secret) = keypair(512);
        let cipher = HybridCipher::<DefaultRand>::default();

        let mut out = Vec::new();
        assert!(matches!(
            cipher.decrypt_stream(&mut [0u8, 64, 1].as_slice(), &secret, &mut out),
            Err(CipherError::MalformedCiphertext(_))
        ));
        assert!(matches!(
            cipher.decrypt_stream(&mut [0u8].as_slice(), &secret, &mut out),
            Err(CipherError::MalformedCiphertext(_))
        ));
    }
}
