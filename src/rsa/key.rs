use crate::utils::BigUintExt;
use crate::{CipherError, Rand};
use log::debug;
use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// RSA F4, 默认的公钥指数
pub const F4: u32 = 65537;

/// miller-rabin测试轮数, 出错概率至多$4^{-19}$
const PRIME_TEST_ROUNDS: usize = 19;

/// 密钥生成时素数抽取次数的上限
const MAX_PRIME_DRAWS: usize = 10_000;

#[derive(Clone, Debug, PartialOrd, PartialEq, Ord, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    // n = p * q
    n: BigUint,
    // public exponent, gcd(e, (p-1)(q-1)) = 1
    e: BigUint,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey {
    pk: PublicKey,
    // d * e = 1 % (p-1)(q-1)
    d: BigUint,
    // p > q
    p: BigUint,
    q: BigUint,
    // 预计算值, 加速私钥的计算
    // d % (p - 1)
    dp: BigUint,
    // d % (q - 1)
    dq: BigUint,
    // q^{-1} % p
    q_inv: BigUint,
}

/// 按能力区分的密钥: 公钥只能执行公钥运算, 私钥两者皆可
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsaKey {
    Public(PublicKey),
    Secret(SecretKey),
}

impl PublicKey {
    /// note: not to check the `n` and `exp` are right RSA parameters
    pub fn new_uncheck(n: BigUint, exp: BigUint) -> Self {
        Self { e: exp, n }
    }

    /// n
    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    /// e
    pub fn exponent(&self) -> &BigUint {
        &self.e
    }

    /// n的最小字节长度
    pub fn modulus_len(&self) -> usize {
        (self.n.bits() as usize + 7) >> 3
    }

    fn rsaep_uncheck(&self, m: &BigUint) -> BigUint {
        m.modpow(&self.e, &self.n)
    }

    /// RSAEP: RSA Encrypt primitive, $m^e \mod n, m \lt n$
    pub fn rsaep(&self, m: &BigUint) -> Result<BigUint, CipherError> {
        if m < &self.n {
            Ok(self.rsaep_uncheck(m))
        } else {
            Err(CipherError::Other(format!(
                "rsaep: invalid message that need less than {:#x}",
                self.n
            )))
        }
    }

    pub fn is_valid(&self) -> Result<(), CipherError> {
        if self.e < BigUint::from(3u8) || !(&self.e & BigUint::one()).is_one() {
            Err(CipherError::Other(format!(
                "rsa: public exponent {:#x} is not a small odd integer",
                self.e
            )))
        } else if self.e >= self.n {
            Err(CipherError::Other(
                "rsa: public exponent must be less than the modulus".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

impl SecretKey {
    /// note: not to check the parameters are consistent RSA parameters
    #[allow(clippy::too_many_arguments)]
    pub fn new_uncheck(
        n: BigUint,
        e: BigUint,
        d: BigUint,
        p: BigUint,
        q: BigUint,
        dp: BigUint,
        dq: BigUint,
        q_inv: BigUint,
    ) -> Self {
        Self {
            pk: PublicKey::new_uncheck(n, e),
            d,
            p,
            q,
            dp,
            dq,
            q_inv,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.pk
    }

    /// d
    pub fn exponent(&self) -> &BigUint {
        &self.d
    }

    // 私钥独有的域, 按编码顺序排列
    pub(crate) fn secret_fields(&self) -> [&BigUint; 6] {
        [&self.d, &self.p, &self.q, &self.dp, &self.dq, &self.q_inv]
    }

    // m1 = c^{dp} % p, m2 = c^{dq} % q
    // h = (m1 - m2) * q_inv % p
    // m = m2 + q * h
    fn rsadp_uncheck(&self, c: &BigUint) -> BigUint {
        let (m1, m2) = (c.modpow(&self.dp, &self.p), c.modpow(&self.dq, &self.q));
        // m2 < q < p, 故m1 + p - m2非负
        let h = ((m1 + &self.p - &m2) * &self.q_inv) % &self.p;
        m2 + &self.q * h
    }

    /// RSADP: RSA Decrypt primitive, $c^d \mod n, c \lt n$
    pub fn rsadp(&self, c: &BigUint) -> Result<BigUint, CipherError> {
        if c < &self.pk.n {
            Ok(self.rsadp_uncheck(c))
        } else {
            Err(CipherError::Other(format!(
                "rsadp: invalid cipher message {:#x} that need less than {:#x}",
                c, self.pk.n
            )))
        }
    }

    /// 检查各域是否构成一致的RSA私钥
    pub fn is_valid(&self) -> Result<(), CipherError> {
        let one = BigUint::one();
        if &self.p * &self.q != self.pk.n {
            return Err(CipherError::Other("rsa: invalid modulus".to_string()));
        }

        if self.p <= self.q {
            return Err(CipherError::Other(
                "rsa: prime factors out of order".to_string(),
            ));
        }

        let de = &self.d * &self.pk.e;
        for prime in [&self.p, &self.q] {
            if !(&de % (prime - &one)).is_one() {
                return Err(CipherError::Other("rsa: invalid exponent".to_string()));
            }
        }

        let (p1, q1) = (&self.p - &one, &self.q - &one);
        if &self.d % &p1 != self.dp
            || &self.d % &q1 != self.dq
            || !(&self.q * &self.q_inv % &self.p).is_one()
        {
            return Err(CipherError::Other(
                "rsa: inconsistent precomputed values".to_string(),
            ));
        }

        Ok(())
    }

    /// `generate` generates an RSA keypair whose modulus has exactly `bits_len`
    /// bits, with the public exponent `pub_exp`.
    ///
    /// 生成过程: 抽取`(bits_len+1)/2`位的素数p和剩余位长的素数q(p > q), 直到
    /// n = p*q达到目标位长且gcd(e, (p-1)(q-1)) = 1, 然后计算d及CRT预计算值.
    pub fn generate<R: Rand>(
        bits_len: usize,
        pub_exp: u32,
        rng: &mut R,
    ) -> Result<SecretKey, CipherError> {
        if pub_exp < 3 || pub_exp & 1 == 0 {
            return Err(CipherError::KeyGeneration(format!(
                "rsa: public exponent `{}` must be a small odd integer not less than 3",
                pub_exp
            )));
        }

        // 两个素数至少各需要8位才能保证乘积达到目标位长
        if bits_len < 16 {
            return Err(CipherError::KeyGeneration(format!(
                "rsa: modulus size `{}` is too small to admit two primes",
                bits_len
            )));
        }

        let e = BigUint::from(pub_exp);
        let one = BigUint::one();
        let p_bits = (bits_len + 1) >> 1;
        let q_bits = bits_len - p_bits;

        let mut draws = 0usize;
        let (p, q, n, d) = 'next_pair: loop {
            draws += 1;
            if draws > MAX_PRIME_DRAWS {
                return Err(CipherError::KeyGeneration(format!(
                    "rsa: no suitable prime pair within {} draws",
                    MAX_PRIME_DRAWS
                )));
            }

            let mut p = BigUintExt::<BigUint>::generate_prime(p_bits, PRIME_TEST_ROUNDS, rng)?;
            let (q, n) = loop {
                draws += 1;
                if draws > MAX_PRIME_DRAWS {
                    return Err(CipherError::KeyGeneration(format!(
                        "rsa: no suitable prime pair within {} draws",
                        MAX_PRIME_DRAWS
                    )));
                }

                let mut q = BigUintExt::<BigUint>::generate_prime(q_bits, PRIME_TEST_ROUNDS, rng)?;
                if p == q {
                    continue;
                }

                if p < q {
                    std::mem::swap(&mut p, &mut q);
                }

                let n = &p * &q;
                if n.bits() as usize >= bits_len {
                    break (q, n);
                }
            };

            let phi = (&p - &one) * (&q - &one);
            match BigUintExt(&e).modinv(&phi) {
                Some(d) => break (p, q, n, d),
                None => {
                    debug!("rsa: gcd(e, phi) != 1 after {} draws, redrawing the pair", draws);
                    continue 'next_pair;
                }
            }
        };

        let (p1, q1) = (&p - &one, &q - &one);
        let (dp, dq) = (&d % &p1, &d % &q1);
        let q_inv = BigUintExt(&q)
            .modinv(&p)
            .expect("p and q are distinct primes");

        Ok(SecretKey {
            pk: PublicKey::new_uncheck(n, e),
            d,
            p,
            q,
            dp,
            dq,
            q_inv,
        })
    }
}

impl RsaKey {
    /// 任意密钥都携带公钥部分
    pub fn public_key(&self) -> &PublicKey {
        match self {
            RsaKey::Public(pk) => pk,
            RsaKey::Secret(sk) => sk.public_key(),
        }
    }

    pub fn secret_key(&self) -> Option<&SecretKey> {
        match self {
            RsaKey::Public(_) => None,
            RsaKey::Secret(sk) => Some(sk),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, RsaKey::Secret(_))
    }

    /// 投影出(n, e)构成的公钥
    pub fn to_public(&self) -> RsaKey {
        RsaKey::Public(self.public_key().clone())
    }
}

impl From<PublicKey> for RsaKey {
    fn from(value: PublicKey) -> Self {
        RsaKey::Public(value)
    }
}

impl From<SecretKey> for RsaKey {
    fn from(value: SecretKey) -> Self {
        RsaKey::Secret(value)
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{n={:#x}, e={:#x}}}", self.n, self.e)
    }
}
