use std::io::{self, BufReader, Read};

use log::warn;

/// Pull interface the lexer reads script text through.
///
/// `None` means end of input, or a read error that ends the input.
pub trait ByteSource {
    fn next_byte(&mut self) -> Option<u8>;
}

impl<F> ByteSource for F
where
    F: FnMut() -> Option<u8>,
{
    fn next_byte(&mut self) -> Option<u8> {
        self()
    }
}

/// Buffered source over any reader, e.g. a script file or stdin.
pub struct ReadSource<R: Read> {
    bytes: io::Bytes<BufReader<R>>,
}

impl<R: Read> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            bytes: BufReader::new(reader).bytes(),
        }
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn next_byte(&mut self) -> Option<u8> {
        match self.bytes.next()? {
            Ok(byte) => Some(byte),
            Err(e) => {
                warn!("读取脚本失败，按输入结束处理: {}", e);
                None
            }
        }
    }
}

/// In-memory script text.
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }
}

impl ByteSource for SliceSource<'_> {
    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(byte)
    }
}
