//! RSA
//!
//! - 随机选择两个质数$p$和$q$($p\neq q$), 则模数$n=p*q$;
//! - 选择与$(p-1)(q-1)$互质的奇数$e$作为公钥的指数部分;
//! - 私钥的指数部分$d$满足: $d*e \equiv 1 \mod (p-1)(q-1)$;
//!
//! 加密: $y = x ^ e \mod n$;
//!
//! 解密: $x = y ^ d \mod n$;

mod key;
pub use key::{PublicKey, RsaKey, SecretKey, F4};

pub mod codec;

mod hybrid;
pub use hybrid::HybridCipher;
