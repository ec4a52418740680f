mod error;
pub use error::CipherError;

pub mod rand;
pub use rand::{DefaultRand, Rand};

pub mod utils;

pub mod rsa;
pub use rsa::{HybridCipher, PublicKey, RsaKey, SecretKey, F4};

pub mod framed;
pub use framed::{read_frames, FramedCipherStream};

use std::io::{Read, Write};

/// 加解密的能力契约, 密钥随调用传入, 实现自身不持有密钥
pub trait Cryptor {
    type Key;

    /// 加密`plaintext`的前`len`字节, `len`不能超过`plaintext`的长度
    fn encrypt(&self, plaintext: &[u8], len: usize, key: &Self::Key)
        -> Result<Vec<u8>, CipherError>;

    fn decrypt(&self, ciphertext: &[u8], key: &Self::Key) -> Result<Vec<u8>, CipherError>;

    /// 流式加密, 按[`Cryptor::block_size`]分块处理, 不会缓存整个流.
    /// 返回写入到`output`的字节数
    fn encrypt_stream<IR: Read, OW: Write>(
        &self,
        input: &mut IR,
        key: &Self::Key,
        output: &mut OW,
    ) -> Result<usize, CipherError>;

    /// 流式解密, 返回写入到`output`的字节数
    fn decrypt_stream<IR: Read, OW: Write>(
        &self,
        input: &mut IR,
        key: &Self::Key,
        output: &mut OW,
    ) -> Result<usize, CipherError>;

    /// 一次处理的自然块大小, 默认为SHA-512的摘要字节长度
    fn block_size(&self, _key: &Self::Key) -> usize {
        64
    }
}
