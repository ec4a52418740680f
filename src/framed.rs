//! 帧化输出: 把任意写入切分为定长分组, 每组加密后以
//! `[4字节大端长度][密文]`的形式写入底层字节流.
//!
//! 与具体的加密算法无关, 任何[`Cryptor`]与密钥的组合都可使用.

use crate::{CipherError, Cryptor};
use std::io::{self, ErrorKind, Read, Write};

/// 帧长度前缀的字节数
const FRAME_LEN_BYTES: usize = 4;

/// 单写者的帧化加密输出流, 非空缓冲在[`FramedCipherStream::finish`]
/// 或drop时作为尾帧写出
pub struct FramedCipherStream<W: Write, C: Cryptor> {
    out: Option<W>,
    cryptor: C,
    key: C::Key,
    buf: Vec<u8>,
    cap: usize,
}

impl<W: Write, C: Cryptor> FramedCipherStream<W, C> {
    pub fn new(out: W, cryptor: C, key: C::Key) -> Self {
        let cap = cryptor.block_size(&key).max(1);
        Self {
            out: Some(out),
            cryptor,
            key,
            buf: Vec::with_capacity(cap),
            cap,
        }
    }

    fn write_out(&mut self) -> Result<(), CipherError> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let cipher = self.cryptor.encrypt(self.buf.as_slice(), self.buf.len(), &self.key)?;
        let out = self.out.as_mut().expect("sink is owned until finish");
        out.write_all(&(cipher.len() as u32).to_be_bytes())?;
        out.write_all(cipher.as_slice())?;
        self.buf.clear();
        Ok(())
    }

    /// 写出缓冲的残余数据并冲刷底层流, 归还底层流的所有权
    pub fn finish(mut self) -> Result<W, CipherError> {
        self.write_out()?;
        let mut out = self.out.take().expect("sink is owned until finish");
        out.flush()?;
        Ok(out)
    }
}

impl<W: Write, C: Cryptor> Write for FramedCipherStream<W, C> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;
        while consumed < data.len() {
            let take = (self.cap - self.buf.len()).min(data.len() - consumed);
            self.buf.extend_from_slice(&data[consumed..consumed + take]);
            consumed += take;

            if self.buf.len() == self.cap {
                self.write_out().map_err(into_io)?;
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_out().map_err(into_io)?;
        self.out.as_mut().expect("sink is owned until finish").flush()
    }
}

impl<W: Write, C: Cryptor> Drop for FramedCipherStream<W, C> {
    // finish未被调用时尽力写出残余数据, 错误只能忽略;
    // 底层流随self释放
    fn drop(&mut self) {
        if self.out.is_some() {
            let _ = self.write_out();
            if let Some(out) = self.out.as_mut() {
                let _ = out.flush();
            }
        }
    }
}

fn into_io(e: CipherError) -> io::Error {
    match e {
        CipherError::Io(e) => e,
        e => io::Error::new(ErrorKind::InvalidData, e),
    }
}

/// 逐帧读取并解密`input`直到流结束, 明文依次写入`output`, 返回明文字节数.
///
/// 帧边界处的流结束是正常结束; 长度前缀不完整或帧数据短于声明长度
/// 都按损坏的流处理.
pub fn read_frames<IR: Read, OW: Write, C: Cryptor>(
    input: &mut IR,
    cryptor: &C,
    key: &C::Key,
    output: &mut OW,
) -> Result<usize, CipherError> {
    let mut written = 0;
    loop {
        let mut prefix = [0u8; FRAME_LEN_BYTES];
        match read_full(input, &mut prefix)? {
            0 => break,
            FRAME_LEN_BYTES => {}
            _ => {
                return Err(CipherError::MalformedCiphertext(
                    "truncated frame length prefix".to_string(),
                ))
            }
        }

        let len = u32::from_be_bytes(prefix) as usize;
        let mut frame = vec![0u8; len];
        input.read_exact(frame.as_mut_slice()).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                CipherError::MalformedCiphertext(format!(
                    "frame shorter than its declared length `{}`",
                    len
                ))
            } else {
                CipherError::Io(e)
            }
        })?;

        let plain = cryptor.decrypt(frame.as_slice(), key)?;
        output.write_all(plain.as_slice())?;
        written += plain.len();
    }

    output.flush()?;
    Ok(written)
}

// 读满buf或到达流结束, 返回读到的字节数
fn read_full<IR: Read>(input: &mut IR, buf: &mut [u8]) -> Result<usize, CipherError> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(len) => filled += len,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
