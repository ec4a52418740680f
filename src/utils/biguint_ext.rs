use crate::{CipherError, Rand};
use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{Euclid, One, Zero};
use std::borrow::Borrow;
use std::ops::Deref;

/// 素数搜索的候选数上限, 超过该值认为随机源异常
const PRIME_SEARCH_BOUND: usize = 10_000;

pub struct BigUintExt<T: Borrow<BigUint>>(pub T);

impl<T: Borrow<BigUint>> Deref for BigUintExt<T> {
    type Target = BigUint;
    fn deref(&self) -> &Self::Target {
        self.0.borrow()
    }
}

impl<T: Borrow<BigUint>> BigUintExt<T> {
    /// self * inv = 1 \mod modulus
    pub fn modinv(&self, modulus: &BigUint) -> Option<BigUint> {
        let (a, n) = (BigInt::from(self.deref() % modulus), BigInt::from(modulus.clone()));
        let g = a.extended_gcd(&n);
        g.gcd.is_one().then_some(
            g.x.rem_euclid(&n)
                .to_biguint()
                .expect("rem_euclid result is non-negative"),
        )
    }

    /// 生成[0..self)之间的均匀随机数
    pub fn gen_random<R: Rand>(&self, rng: &mut R) -> BigUint {
        let bits = self.bits() as usize;
        let mut buf = vec![0u8; (bits + 7) >> 3];
        let top = if bits & 7 == 0 { 8 } else { bits & 7 };

        loop {
            rng.rand(buf.as_mut_slice());
            // 清除大于bits的位, 提高采样接受率
            if top != 8 {
                if let Some(x) = buf.first_mut() {
                    *x &= (1u8 << top) - 1;
                }
            }

            let r = BigUint::from_bytes_be(buf.as_slice());
            if self.deref() > &r {
                return r;
            }
        }
    }

    /// probability prime test by trial division over small primes followed by
    /// the Miller-Rabin algorithm with `test_rounds` random bases.
    ///
    /// For any odd number greater than 2, the probability of a composite passing
    /// `test_rounds` rounds is at most $4^{-test\_rounds}$.
    pub fn probably_prime_test<Rng: Rand>(&self, test_rounds: usize, rng: &mut Rng) -> bool {
        const SMALL_PRIMES: [u32; 15] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47];

        let n = self.deref();
        if n < &BigUint::from(2u32) {
            return false;
        }

        for &p in SMALL_PRIMES.iter() {
            if (n % p).is_zero() {
                return n == &BigUint::from(p);
            }
        }

        self.miller_rabin(test_rounds.max(1), rng)
    }

    /// miller-rabin素数测试, self是不被任何小素数整除的奇数
    fn miller_rabin<Rng: Rand>(&self, test_rounds: usize, rng: &mut Rng) -> bool {
        let n = self.deref();
        let n_m1 = n - 1u32;
        let s = n_m1.trailing_zeros().unwrap_or(0);
        let r = &n_m1 >> s;
        let two = BigUint::from(2u32);

        'witness: for _ in 0..test_rounds {
            let a = loop {
                let a = BigUintExt(&n_m1).gen_random(rng);
                if a >= two {
                    break a;
                }
            };

            let mut y = a.modpow(&r, n);
            if y.is_one() || y == n_m1 {
                continue 'witness;
            }

            for _ in 1..s {
                y = (&y * &y) % n;
                if y == n_m1 {
                    continue 'witness;
                }
            }

            return false;
        }

        true
    }

    /// generate a number p with the bits length of `bits_len`, such that p is prime
    /// with high probability that is related to the number of `test_rounds`.
    ///
    /// The top two bits of every candidate are set so that the product of two
    /// generated primes never falls a bit short of the sum of their lengths.
    pub fn generate_prime<Rng: Rand>(
        bits_len: usize,
        test_rounds: usize,
        rng: &mut Rng,
    ) -> Result<BigUint, CipherError> {
        if bits_len < 2 {
            return Err(CipherError::KeyGeneration(
                "prime size must be at least 2-bits".to_string(),
            ));
        }

        let mut buf = vec![0u8; (bits_len + 7) >> 3];
        let top = if bits_len & 7 == 0 { 8 } else { bits_len & 7 };

        for _ in 0..PRIME_SEARCH_BOUND {
            rng.rand(buf.as_mut_slice());

            // 清除大于bits_len的位
            if top != 8 {
                if let Some(x) = buf.first_mut() {
                    *x &= (1u8 << top) - 1;
                }
            }

            if top >= 2 {
                if let Some(x) = buf.first_mut() {
                    *x |= 3 << (top - 2);
                }
            } else {
                // 最高位落在前一个字节边界上
                buf[0] |= 1;
                buf[1] |= 0x80;
            }

            // 奇数
            if let Some(x) = buf.last_mut() {
                *x |= 1;
            }

            let n = BigUintExt(BigUint::from_bytes_be(buf.as_slice()));
            if n.probably_prime_test(test_rounds, rng) {
                return Ok(n.0);
            }
        }

        Err(CipherError::KeyGeneration(format!(
            "no probable prime of {} bits found within {} candidates",
            bits_len, PRIME_SEARCH_BOUND
        )))
    }
}
