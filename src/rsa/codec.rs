//! 密钥的规范二进制编码
//!
//! 整体为一个DER SEQUENCE, 内容是依次排列的DER INTEGER:
//!
//! - Secret: (0, n, e, d, p, q, dp, dq, q_inv)
//! - Public: (1, n, e)
//!
//! INTEGER内容为最短的大端二进制补码; 所有域均非负, 最高位为1时
//! 编码端补一个前导零字节, 解码端按无符号解释将其剥除.

use crate::rsa::{PublicKey, RsaKey, SecretKey};
use crate::CipherError;
use num_bigint::BigUint;
use num_traits::{One, Zero};

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;

/// 编码`key`为规范二进制形式, 同一密钥的编码字节完全一致
pub fn encode(key: &RsaKey) -> Vec<u8> {
    let mut body = Vec::with_capacity(key.public_key().modulus_len() * 10);
    match key {
        RsaKey::Public(pk) => {
            put_integer(&mut body, &BigUint::one());
            put_integer(&mut body, pk.modulus());
            put_integer(&mut body, pk.exponent());
        }
        RsaKey::Secret(sk) => {
            put_integer(&mut body, &BigUint::zero());
            put_integer(&mut body, sk.public_key().modulus());
            put_integer(&mut body, sk.public_key().exponent());
            for field in sk.secret_fields() {
                put_integer(&mut body, field);
            }
        }
    }

    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(TAG_SEQUENCE);
    put_length(&mut out, body.len());
    out.extend_from_slice(body.as_slice());
    out
}

/// 从规范二进制形式解码密钥
pub fn decode(data: &[u8]) -> Result<RsaKey, CipherError> {
    let mut reader = Reader::new(data);

    if reader.take(1)?[0] != TAG_SEQUENCE {
        return Err(CipherError::MalformedKey("not a sequence".to_string()));
    }

    let len = reader.read_length()?;
    if reader.remaining() != len {
        return Err(CipherError::MalformedKey(format!(
            "sequence length `{}` not match to content length `{}`",
            len,
            reader.remaining()
        )));
    }

    let discriminator = reader.read_integer()?;
    let key = if discriminator.is_zero() {
        let n = reader.read_integer()?;
        let e = reader.read_integer()?;
        let d = reader.read_integer()?;
        let p = reader.read_integer()?;
        let q = reader.read_integer()?;
        let dp = reader.read_integer()?;
        let dq = reader.read_integer()?;
        let q_inv = reader.read_integer()?;
        RsaKey::Secret(SecretKey::new_uncheck(n, e, d, p, q, dp, dq, q_inv))
    } else if discriminator.is_one() {
        let n = reader.read_integer()?;
        let e = reader.read_integer()?;
        RsaKey::Public(PublicKey::new_uncheck(n, e))
    } else {
        return Err(CipherError::MalformedKey(format!(
            "unknown key discriminator `{}`",
            discriminator
        )));
    };

    if reader.remaining() != 0 {
        return Err(CipherError::MalformedKey(format!(
            "{} trailing bytes after the key fields",
            reader.remaining()
        )));
    }

    Ok(key)
}

fn put_integer(out: &mut Vec<u8>, value: &BigUint) {
    let bytes = value.to_bytes_be();
    let pad = (bytes[0] & 0x80) != 0;

    out.push(TAG_INTEGER);
    put_length(out, bytes.len() + pad as usize);
    if pad {
        out.push(0);
    }
    out.extend_from_slice(bytes.as_slice());
}

fn put_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|&&x| x == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CipherError> {
        if len > self.data.len() {
            return Err(CipherError::MalformedKey(format!(
                "need {} bytes but only {} remain",
                len,
                self.data.len()
            )));
        }

        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn read_length(&mut self) -> Result<usize, CipherError> {
        let first = self.take(1)?[0];
        if first < 0x80 {
            return Ok(first as usize);
        }

        let count = (first & 0x7f) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() {
            return Err(CipherError::MalformedKey(format!(
                "unsupported length encoding `{:#x}`",
                first
            )));
        }

        let mut len = 0usize;
        for &x in self.take(count)? {
            len = (len << 8) | x as usize;
        }
        Ok(len)
    }

    fn read_integer(&mut self) -> Result<BigUint, CipherError> {
        if self.take(1)?[0] != TAG_INTEGER {
            return Err(CipherError::MalformedKey(
                "expected an integer field".to_string(),
            ));
        }

        let len = self.read_length()?;
        if len == 0 {
            return Err(CipherError::MalformedKey("empty integer field".to_string()));
        }

        // 无符号解释, 前导零字节自然剥除
        Ok(BigUint::from_bytes_be(self.take(len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, encode};
    use crate::rsa::{PublicKey, RsaKey, SecretKey, F4};
    use crate::utils::BigUintExt;
    use crate::{CipherError, DefaultRand};
    use num_bigint::BigUint;

    // p=61, q=53: n=3233, e=17, d=2753
    fn tiny_secret_key() -> SecretKey {
        let (p, q) = (BigUint::from(61u32), BigUint::from(53u32));
        let (n, e, d) = (
            BigUint::from(3233u32),
            BigUint::from(17u32),
            BigUint::from(2753u32),
        );
        let one = BigUint::from(1u32);
        let (dp, dq) = (&d % (&p - &one), &d % (&q - &one));
        let q_inv = BigUintExt(&q).modinv(&p).unwrap();
        SecretKey::new_uncheck(n, e, d, p, q, dp, dq, q_inv)
    }

    #[test]
    fn public_key_wire_bytes() {
        let pk = PublicKey::new_uncheck(BigUint::from(3233u32), BigUint::from(17u32));
        let data = encode(&RsaKey::Public(pk));
        // SEQUENCE { INTEGER 1, INTEGER 0x0ca1, INTEGER 0x11 }
        assert_eq!(
            data,
            [0x30, 0x0a, 0x02, 0x01, 0x01, 0x02, 0x02, 0x0c, 0xa1, 0x02, 0x01, 0x11]
        );
    }

    #[test]
    fn high_bit_integer_padded() {
        let pk = PublicKey::new_uncheck(BigUint::from(0x80u32), BigUint::from(3u32));
        let key = RsaKey::Public(pk);
        let data = encode(&key);
        // n = 0x80 encoded as 02 02 00 80
        assert_eq!(
            data,
            [0x30, 0x0a, 0x02, 0x01, 0x01, 0x02, 0x02, 0x00, 0x80, 0x02, 0x01, 0x03]
        );
        assert_eq!(decode(data.as_slice()).unwrap(), key);
    }

    #[test]
    fn secret_key_round_trip() {
        let key = RsaKey::Secret(tiny_secret_key());
        let data = encode(&key);
        assert_eq!(decode(data.as_slice()).unwrap(), key);
    }

    #[test]
    fn generated_key_round_trip() {
        let mut rng = DefaultRand::default();
        let sk = SecretKey::generate(512, F4, &mut rng).unwrap();

        let secret = RsaKey::Secret(sk);
        let data = encode(&secret);
        assert_eq!(decode(data.as_slice()).unwrap(), secret);

        let public = secret.to_public();
        let data = encode(&public);
        assert_eq!(decode(data.as_slice()).unwrap(), public);
    }

    #[test]
    fn reject_malformed() {
        let key = RsaKey::Secret(tiny_secret_key());
        let data = encode(&key);

        // truncated final integer field
        let truncated = &data[..data.len() - 1];
        assert!(matches!(
            decode(truncated),
            Err(CipherError::MalformedKey(_))
        ));

        // trailing byte
        let mut trailing = data.clone();
        trailing.push(0);
        assert!(matches!(
            decode(trailing.as_slice()),
            Err(CipherError::MalformedKey(_))
        ));

        // wrong outer tag
        let mut wrong_tag = data.clone();
        wrong_tag[0] = 0x31;
        assert!(matches!(
            decode(wrong_tag.as_slice()),
            Err(CipherError::MalformedKey(_))
        ));

        // unknown discriminator
        let mut wrong_disc = data;
        wrong_disc[4] = 2;
        assert!(matches!(
            decode(wrong_disc.as_slice()),
            Err(CipherError::MalformedKey(_))
        ));

        assert!(matches!(decode(&[]), Err(CipherError::MalformedKey(_))));
    }
}
