use std::io;
use std::{error::Error, fmt::Display};

#[derive(Debug)]
pub enum CipherError {
    /// 密钥生成失败: 随机源耗尽或目标位长不可达
    KeyGeneration(String),

    /// 密钥编码数据不合法
    MalformedKey(String),

    /// 密钥不具备所请求操作的能力, 例如用公钥执行私钥运算
    KeyCapability(&'static str),

    /// 密文/帧数据不合法
    MalformedCiphertext(String),

    /// 底层字节流读写错误
    Io(io::Error),

    Other(String),
}

impl Display for CipherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyGeneration(s) => f.write_fmt(format_args!("Key generation failed: {s}")),
            Self::MalformedKey(s) => f.write_fmt(format_args!("Malformed key encoding: {s}")),
            Self::KeyCapability(s) => f.write_fmt(format_args!("Key capability mismatch: {s}")),
            Self::MalformedCiphertext(s) => {
                f.write_fmt(format_args!("Malformed cipher data: {s}"))
            }
            Self::Io(e) => f.write_fmt(format_args!("IO error: {e}")),
            Self::Other(s) => f.write_str(s.as_str()),
        }
    }
}

impl Error for CipherError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CipherError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
