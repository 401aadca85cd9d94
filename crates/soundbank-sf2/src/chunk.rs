//! RIFF container walking.
//!
//! A RIFF file is a tree of chunks. Every chunk starts with a four-character
//! tag and a little-endian `u32` body size; `RIFF` and `LIST` chunks carry a
//! second tag (the *form type*) followed by nested chunks.
//!
//! ```text
//! RIFF <size> sfbk
//!   LIST <size> INFO   ...text chunks...
//!   LIST <size> sdta   smpl <size> <pcm>
//!   LIST <size> pdta   phdr pbag pmod pgen inst ibag imod igen shdr
//! ```
//!
//! The reader never copies: every [`Chunk`] borrows the caller's buffer.

use core::fmt;

use crate::error::{Result, Sf2Error};

/// A four-character chunk tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    /// Outer RIFF container.
    pub const RIFF: FourCc = FourCc(*b"RIFF");
    /// Nested list container.
    pub const LIST: FourCc = FourCc(*b"LIST");
    /// SoundFont bank form type.
    pub const SFBK: FourCc = FourCc(*b"sfbk");
    /// Informational text list.
    pub const INFO: FourCc = FourCc(*b"INFO");
    /// Sample data list.
    pub const SDTA: FourCc = FourCc(*b"sdta");
    /// Preset data list.
    pub const PDTA: FourCc = FourCc(*b"pdta");
    /// 16-bit PCM sample data.
    pub const SMPL: FourCc = FourCc(*b"smpl");
    /// Optional low byte extension of 24-bit samples.
    pub const SM24: FourCc = FourCc(*b"sm24");
    /// Preset headers.
    pub const PHDR: FourCc = FourCc(*b"phdr");
    /// Preset zones.
    pub const PBAG: FourCc = FourCc(*b"pbag");
    /// Preset modulators.
    pub const PMOD: FourCc = FourCc(*b"pmod");
    /// Preset generators.
    pub const PGEN: FourCc = FourCc(*b"pgen");
    /// Instrument headers.
    pub const INST: FourCc = FourCc(*b"inst");
    /// Instrument zones.
    pub const IBAG: FourCc = FourCc(*b"ibag");
    /// Instrument modulators.
    pub const IMOD: FourCc = FourCc(*b"imod");
    /// Instrument generators.
    pub const IGEN: FourCc = FourCc(*b"igen");
    /// Sample headers.
    pub const SHDR: FourCc = FourCc(*b"shdr");

    /// The tag as text, with non-ASCII bytes replaced.
    pub fn as_string(&self) -> String {
        self.0
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect()
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self.as_string())
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// One chunk: its tag and a borrowed view of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Chunk tag.
    pub id: FourCc,
    /// Chunk body (without the 8-byte header or pad byte).
    pub data: &'a [u8],
}

impl Chunk<'_> {
    /// Declared body size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Cursor over a sequence of sibling chunks.
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader over the body of `chunk`.
    pub fn nested(chunk: &Chunk<'a>) -> Self {
        Self::new(chunk.data)
    }

    /// Current byte offset from the start of this reader's buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True when all sibling chunks have been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a bare four-character tag (a form type).
    pub fn read_fourcc(&mut self) -> Result<FourCc> {
        let bytes = self.take(4)?;
        Ok(FourCc([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a form type and fail unless it equals `expected`.
    pub fn expect_fourcc(&mut self, expected: FourCc) -> Result<()> {
        let found = self.read_fourcc()?;
        if found != expected {
            return Err(Sf2Error::malformed(format!(
                "expected form type '{expected}', found '{found}'"
            )));
        }
        Ok(())
    }

    /// Read the next chunk and advance past its body (and pad byte, if any).
    pub fn read_chunk(&mut self) -> Result<Chunk<'a>> {
        let start = self.pos;
        let id = self.read_fourcc()?;
        let size_bytes = self.take(4)?;
        let size = u32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
            as usize;
        if size > self.remaining() {
            return Err(Sf2Error::malformed(format!(
                "chunk '{id}' at offset {start} declares {size} bytes but only {} remain",
                self.remaining()
            )));
        }
        let data = self.take(size)?;
        // RIFF pads odd-sized bodies to a word boundary.
        if size % 2 == 1 && self.remaining() > 0 {
            self.pos += 1;
        }
        Ok(Chunk { id, data })
    }

    /// Read the next chunk and fail unless its tag equals `expected`.
    pub fn expect_chunk(&mut self, expected: FourCc) -> Result<Chunk<'a>> {
        let chunk = self.read_chunk()?;
        if chunk.id != expected {
            return Err(Sf2Error::malformed(format!(
                "expected chunk '{expected}', found '{}'",
                chunk.id
            )));
        }
        Ok(chunk)
    }

    /// Read a `LIST` chunk of the given form type and return a reader over its children.
    pub fn read_list(&mut self, form: FourCc) -> Result<ChunkReader<'a>> {
        let list = self.expect_chunk(FourCc::LIST)?;
        let mut inner = ChunkReader::nested(&list);
        inner.expect_fourcc(form)?;
        Ok(inner)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Sf2Error::malformed(format!(
                "unexpected end of data at offset {} (wanted {len} bytes, {} remain)",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

/// Little-endian field reader for fixed-layout records.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Read `len` raw bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Sf2Error::malformed(format!(
                "record truncated at offset {} (wanted {len} bytes, {} remain)",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read an unsigned byte.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    /// Read a signed byte.
    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    /// Read a little-endian `u16`.
    pub fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian `i16`.
    pub fn i16(&mut self) -> Result<i16> {
        let b = self.bytes(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a fixed-width, NUL-padded ASCII name.
    pub fn name(&mut self, width: usize) -> Result<String> {
        let raw = self.bytes(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_bytes(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn reads_sibling_chunks() {
        let mut data = chunk_bytes(b"abcd", &[1, 2, 3, 4]);
        data.extend(chunk_bytes(b"efgh", &[5, 6]));

        let mut reader = ChunkReader::new(&data);
        let first = reader.read_chunk().unwrap();
        assert_eq!(first.id, FourCc(*b"abcd"));
        assert_eq!(first.data, &[1, 2, 3, 4]);

        let second = reader.read_chunk().unwrap();
        assert_eq!(second.id, FourCc(*b"efgh"));
        assert_eq!(second.size(), 2);
        assert!(reader.is_empty());
    }

    #[test]
    fn skips_pad_byte_after_odd_chunk() {
        let mut data = chunk_bytes(b"odd ", &[9, 9, 9]);
        data.extend(chunk_bytes(b"next", &[1, 1]));

        let mut reader = ChunkReader::new(&data);
        assert_eq!(reader.read_chunk().unwrap().size(), 3);
        assert_eq!(reader.read_chunk().unwrap().id, FourCc(*b"next"));
    }

    #[test]
    fn nested_reader_borrows_parent_body() {
        let inner = chunk_bytes(b"kid ", &[7, 7]);
        let mut body = b"form".to_vec();
        body.extend(&inner);
        let data = chunk_bytes(b"LIST", &body);

        let mut reader = ChunkReader::new(&data);
        let mut list = reader.read_list(FourCc(*b"form")).unwrap();
        let kid = list.read_chunk().unwrap();
        assert_eq!(kid.data, &[7, 7]);
        // The child's body points into the original buffer.
        let offset = kid.data.as_ptr() as usize - data.as_ptr() as usize;
        assert_eq!(offset, 8 + 4 + 8);
    }

    #[test]
    fn oversized_chunk_is_malformed() {
        let mut data = b"big ".to_vec();
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&[0; 10]);

        let err = ChunkReader::new(&data).read_chunk().unwrap_err();
        assert!(matches!(err, Sf2Error::MalformedContainer(_)), "got {err:?}");
    }

    #[test]
    fn unexpected_tag_is_malformed() {
        let data = chunk_bytes(b"RIFX", &[0; 4]);
        let err = ChunkReader::new(&data).expect_chunk(FourCc::RIFF).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("RIFF") && msg.contains("RIFX"), "got: {msg}");
    }

    #[test]
    fn truncated_header_is_malformed() {
        let err = ChunkReader::new(b"RIF").read_chunk().unwrap_err();
        assert!(matches!(err, Sf2Error::MalformedContainer(_)));
    }

    #[test]
    fn byte_reader_fields() {
        let mut data = b"Piano\0\0\0".to_vec();
        data.extend_from_slice(&0x1234u16.to_le_bytes());
        data.extend_from_slice(&(-5i16).to_le_bytes());
        data.extend_from_slice(&70_000u32.to_le_bytes());
        data.push(0xFE);

        let mut r = ByteReader::new(&data);
        assert_eq!(r.name(8).unwrap(), "Piano");
        assert_eq!(r.u16().unwrap(), 0x1234);
        assert_eq!(r.i16().unwrap(), -5);
        assert_eq!(r.u32().unwrap(), 70_000);
        assert_eq!(r.i8().unwrap(), -2);
        assert!(r.u8().is_err());
    }

    #[test]
    fn fourcc_display_replaces_binary() {
        assert_eq!(FourCc([b'a', 0, b'c', 0xFF]).to_string(), "a?c?");
    }
}
