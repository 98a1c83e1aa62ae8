// SPDX-License-Identifier: GPL-2.0-or-later
//
// DAT container codec.
//
// A container is a back-to-back run of chunks, each a 10-byte big-endian
// header followed by its compressed payload. The payload is a bitstream read
// from the last byte towards the first, and it rebuilds the output from the
// last byte towards the first as well. Opcodes either emit literal bytes or
// copy from bytes already produced (which sit at higher addresses).

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use byteorder::{BigEndian, ByteOrder};
use log::debug;
use memmap2::{Mmap, MmapOptions};

use crate::bits::{reverse_bits, reverse3, reverse8, reverse9, reverse10, reverse12};
use crate::error::{DatError, DatResult};

/// Size of a chunk header; `compressed_len` includes it.
pub const CHUNK_HEADER_LEN: u32 = 10;

const READ_BLOCK_LEN: usize = 4096;

/// Widest opcode: 3 tag bits, an 8-bit length and a 12-bit offset.
const MAX_OPCODE_BITS: u32 = 3 + 8 + 12;

/// Refills stop once more than this many bits are buffered.
const REFILL_LIMIT: u32 = 24;

const SHORT_LITERAL_MAX: usize = 8;
const LONG_LITERAL_MAX: usize = 255 + 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub initial_bit_count: u8,
    pub checksum: u8,
    pub decompressed_len: u32,
    pub compressed_len: u32,
    /// Absolute position of the first payload byte in the source.
    pub payload_offset: u64,
}

impl ChunkHeader {
    pub fn parse(bytes: &[u8; CHUNK_HEADER_LEN as usize], payload_offset: u64) -> DatResult<Self> {
        let initial_bit_count = bytes[0];
        let checksum = bytes[1];
        let decompressed_len = BigEndian::read_u32(&bytes[2..6]);
        let compressed_len = BigEndian::read_u32(&bytes[6..10]);

        if initial_bit_count > 8 || compressed_len < CHUNK_HEADER_LEN {
            return Err(DatError::InvalidHeader {
                initial_bit_count,
                compressed_len,
            });
        }

        Ok(ChunkHeader {
            initial_bit_count,
            checksum,
            decompressed_len,
            compressed_len,
            payload_offset,
        })
    }

    pub fn encode(&self) -> [u8; CHUNK_HEADER_LEN as usize] {
        let mut out = [0u8; CHUNK_HEADER_LEN as usize];
        out[0] = self.initial_bit_count;
        out[1] = self.checksum;
        BigEndian::write_u32(&mut out[2..6], self.decompressed_len);
        BigEndian::write_u32(&mut out[6..10], self.compressed_len);
        out
    }

    pub fn header_offset(&self) -> u64 {
        self.payload_offset - u64::from(CHUNK_HEADER_LEN)
    }

    pub fn payload_len(&self) -> u32 {
        self.compressed_len - CHUNK_HEADER_LEN
    }

    /// Position where the following chunk's header starts.
    pub fn next_offset(&self) -> u64 {
        self.payload_offset + u64::from(self.payload_len())
    }
}

/// Read and validate the chunk header stored at `position`.
pub fn read_chunk_header<R: Read + Seek>(reader: &mut R, position: u64) -> DatResult<ChunkHeader> {
    reader.seek(SeekFrom::Start(position))?;
    let mut raw = [0u8; CHUNK_HEADER_LEN as usize];
    reader.read_exact(&mut raw)?;
    ChunkHeader::parse(&raw, position + u64::from(CHUNK_HEADER_LEN))
}

/// Like [`read_chunk_header`], but returns `None` when `position` sits exactly
/// at the end of the source instead of reporting truncation.
pub fn next_chunk_header<R: Read + Seek>(
    reader: &mut R,
    position: u64,
) -> DatResult<Option<ChunkHeader>> {
    let end = reader.seek(SeekFrom::End(0))?;
    if position == end {
        return Ok(None);
    }
    if position > end || end - position < u64::from(CHUNK_HEADER_LEN) {
        return Err(DatError::TruncatedInput);
    }
    read_chunk_header(reader, position).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    Literal { len: u32 },
    Copy { len: u32, offset: u32 },
}

impl Opcode {
    /// Decode the opcode at the bottom of `bits`, returning it with its width in bits.
    fn decode(bits: u32) -> (Opcode, u32) {
        match bits & 0b11 {
            0b00 => (
                Opcode::Literal {
                    len: reverse3(bits >> 2) + 1,
                },
                2 + 3,
            ),
            0b10 => (
                Opcode::Copy {
                    len: 2,
                    offset: reverse8(bits >> 2) + 1,
                },
                2 + 8,
            ),
            _ => match bits & 0b111 {
                0b001 => (
                    Opcode::Copy {
                        len: 3,
                        offset: reverse9(bits >> 3) + 1,
                    },
                    3 + 9,
                ),
                0b101 => (
                    Opcode::Copy {
                        len: 4,
                        offset: reverse10(bits >> 3) + 1,
                    },
                    3 + 10,
                ),
                0b011 => (
                    Opcode::Copy {
                        len: reverse8(bits >> 3) + 1,
                        offset: reverse12(bits >> 11) + 1,
                    },
                    3 + 8 + 12,
                ),
                _ => (
                    Opcode::Literal {
                        len: reverse8(bits >> 3) + 9,
                    },
                    3 + 8,
                ),
            },
        }
    }
}

/// Pulls payload bytes from the back of a chunk into a little bit accumulator.
struct BitReader<'a, R> {
    reader: &'a mut R,
    block: &'a mut [u8],
    /// Unread bytes at the front of `block`.
    block_pos: usize,
    /// Payload bytes not yet loaded into `block`.
    remaining: u64,
    payload_offset: u64,
    bits: u32,
    bit_count: u32,
    checksum: u8,
}

impl<'a, R: Read + Seek> BitReader<'a, R> {
    fn new(reader: &'a mut R, block: &'a mut [u8], header: &ChunkHeader) -> Self {
        BitReader {
            reader,
            block,
            block_pos: 0,
            remaining: u64::from(header.payload_len()),
            payload_offset: header.payload_offset,
            bits: 0,
            bit_count: 0,
            checksum: header.checksum,
        }
    }

    fn refill(&mut self) -> DatResult<()> {
        debug_assert!(self.bit_count < REFILL_LIMIT);
        loop {
            if self.block_pos == 0 {
                if self.remaining == 0 {
                    if self.bit_count == 0 {
                        return Err(DatError::InvalidData("bitstream exhausted"));
                    }
                    return Ok(());
                }

                let len = self.remaining.min(READ_BLOCK_LEN as u64) as usize;
                self.remaining -= len as u64;
                self.reader
                    .seek(SeekFrom::Start(self.payload_offset + self.remaining))?;
                self.reader.read_exact(&mut self.block[..len])?;
                self.block_pos = len;
            }

            self.block_pos -= 1;
            let byte = self.block[self.block_pos];
            self.bits |= u32::from(byte) << self.bit_count;
            self.checksum ^= byte;
            self.bit_count += 8;

            if self.bit_count > REFILL_LIMIT {
                return Ok(());
            }
        }
    }

    fn ensure(&mut self, count: u32) -> DatResult<()> {
        if self.bit_count < count {
            self.refill()?;
        }
        Ok(())
    }

    fn consume(&mut self, count: u32) -> DatResult<()> {
        if count > self.bit_count {
            return Err(DatError::InvalidData("opcode runs past the end of the bitstream"));
        }
        self.bits >>= count;
        self.bit_count -= count;
        Ok(())
    }

    /// The first byte read only carries `initial_bit_count` meaningful bits;
    /// the rest pads the stream out to a byte boundary.
    fn discard_padding(&mut self, initial_bit_count: u32) -> DatResult<()> {
        self.refill()?;
        if self.bit_count < initial_bit_count {
            return Err(DatError::InvalidData("too few bits for the first byte"));
        }
        let kept = self.bits & (0xFF >> (8 - initial_bit_count));
        self.bits = (self.bits >> 8) << initial_bit_count | kept;
        self.bit_count -= 8 - initial_bit_count;
        Ok(())
    }

    fn finish(self) -> DatResult<()> {
        if self.remaining != 0 {
            return Err(DatError::InvalidData("payload blocks left unread"));
        }
        if self.block_pos != 0 {
            return Err(DatError::InvalidData("bytes left in the read-ahead block"));
        }
        if self.bit_count != 0 {
            return Err(DatError::InvalidData("bits left in the accumulator"));
        }
        if self.checksum != 0 {
            return Err(DatError::InvalidData("checksum mismatch"));
        }
        Ok(())
    }
}

/// Decompresses chunks one at a time. Keeps its read-ahead block between
/// calls, so a single instance can walk a whole container.
pub struct ChunkDecompressor {
    block: Box<[u8]>,
}

impl Default for ChunkDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecompressor {
    pub fn new() -> Self {
        ChunkDecompressor {
            block: vec![0u8; READ_BLOCK_LEN].into_boxed_slice(),
        }
    }

    pub fn decompress<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        header: &ChunkHeader,
    ) -> DatResult<Vec<u8>> {
        let mut data = vec![0u8; header.decompressed_len as usize];
        self.decompress_into(reader, header, &mut data)?;
        Ok(data)
    }

    pub fn decompress_into<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        header: &ChunkHeader,
        dest: &mut [u8],
    ) -> DatResult<()> {
        if dest.len() != header.decompressed_len as usize {
            return Err(DatError::DestinationLength {
                expected: header.decompressed_len,
                actual: dest.len(),
            });
        }

        let mut input = BitReader::new(reader, &mut self.block, header);
        input.discard_padding(u32::from(header.initial_bit_count))?;

        let total = dest.len();
        let mut out = total;

        while out > 0 {
            input.ensure(MAX_OPCODE_BITS)?;
            let (opcode, width) = Opcode::decode(input.bits);
            input.consume(width)?;

            match opcode {
                Opcode::Literal { len } => {
                    let len = len as usize;
                    if len > out {
                        return Err(DatError::InvalidData("literal run overflows the output"));
                    }
                    for _ in 0..len {
                        input.ensure(8)?;
                        out -= 1;
                        dest[out] = reverse8(input.bits) as u8;
                        input.consume(8)?;
                    }
                }
                Opcode::Copy { len, offset } => {
                    let (len, offset) = (len as usize, offset as usize);
                    if len > out {
                        return Err(DatError::InvalidData("copy overflows the output"));
                    }
                    if offset > total - out {
                        return Err(DatError::InvalidData(
                            "copy source lies beyond the decoded region",
                        ));
                    }
                    // Overlapping copies repeat the pattern on purpose.
                    for _ in 0..len {
                        out -= 1;
                        dest[out] = dest[out + offset];
                    }
                }
            }
        }

        input.finish()?;
        debug!(
            "decompressed chunk at {:#x}: {} -> {} bytes",
            header.header_offset(),
            header.compressed_len,
            header.decompressed_len
        );
        Ok(())
    }

    /// Decompress a chunk whose size is fixed by the asset kind.
    pub fn decompress_exact<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        header: &ChunkHeader,
        expected: u32,
    ) -> DatResult<Vec<u8>> {
        if header.decompressed_len != expected {
            return Err(DatError::UnexpectedLength {
                expected: expected.to_string(),
                actual: header.decompressed_len,
            });
        }
        self.decompress(reader, header)
    }

    /// Decompress a chunk, refusing anything larger than `limit` bytes.
    pub fn decompress_capped<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        header: &ChunkHeader,
        limit: u32,
    ) -> DatResult<Vec<u8>> {
        if header.decompressed_len > limit {
            return Err(DatError::UnexpectedLength {
                expected: format!("at most {limit}"),
                actual: header.decompressed_len,
            });
        }
        self.decompress(reader, header)
    }
}

/// Iterator over every chunk of a container, starting at a chunk boundary.
/// Ends cleanly when the source is exhausted; stops after the first error.
pub struct DatChunks<R> {
    reader: R,
    decompressor: ChunkDecompressor,
    position: u64,
    done: bool,
}

pub fn chunks<R: Read + Seek>(reader: R, start: u64) -> DatChunks<R> {
    DatChunks {
        reader,
        decompressor: ChunkDecompressor::new(),
        position: start,
        done: false,
    }
}

impl<R: Read + Seek> Iterator for DatChunks<R> {
    type Item = DatResult<(ChunkHeader, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let header = match next_chunk_header(&mut self.reader, self.position) {
            Ok(Some(header)) => header,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        self.position = header.next_offset();
        match self.decompressor.decompress(&mut self.reader, &header) {
            Ok(data) => Some(Ok((header, data))),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// A DAT container mapped from disk with its chunk headers indexed up front.
#[derive(Debug)]
pub struct DatFile {
    path: PathBuf,
    mmap: Mmap,
    headers: Vec<ChunkHeader>,
}

impl DatFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening DAT file at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping DAT file {}", path_buf.display()))?;

        let headers = index_headers(&mmap)
            .with_context(|| format!("indexing chunks of {}", path_buf.display()))?;

        Ok(DatFile {
            path: path_buf,
            mmap,
            headers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[ChunkHeader] {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// A seekable view positioned at the first chunk.
    pub fn cursor(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.mmap[..])
    }

    pub fn chunks(&self) -> DatChunks<Cursor<&[u8]>> {
        chunks(self.cursor(), 0)
    }

    pub fn decompress_chunk(&self, index: usize) -> Result<Vec<u8>> {
        let header = self.headers.get(index).with_context(|| {
            format!(
                "{} has {} chunks, no chunk {index}",
                self.path.display(),
                self.headers.len()
            )
        })?;
        let mut cursor = self.cursor();
        ChunkDecompressor::new()
            .decompress(&mut cursor, header)
            .with_context(|| format!("decompressing chunk {index} of {}", self.path.display()))
    }

    pub fn decompress_all(&self) -> Result<Vec<Vec<u8>>> {
        let mut cursor = self.cursor();
        let mut decompressor = ChunkDecompressor::new();
        let mut out = Vec::with_capacity(self.headers.len());
        for (index, header) in self.headers.iter().enumerate() {
            let data = decompressor
                .decompress(&mut cursor, header)
                .with_context(|| {
                    format!("decompressing chunk {index} of {}", self.path.display())
                })?;
            out.push(data);
        }
        Ok(out)
    }
}

fn index_headers(bytes: &[u8]) -> Result<Vec<ChunkHeader>> {
    let mut cursor = Cursor::new(bytes);
    let mut headers = Vec::new();
    let mut position = 0u64;

    while let Some(header) = next_chunk_header(&mut cursor, position)
        .with_context(|| format!("reading chunk header at {position:#x}"))?
    {
        ensure!(
            header.next_offset() <= bytes.len() as u64,
            "chunk {} payload extends beyond the file",
            headers.len()
        );
        position = header.next_offset();
        headers.push(header);
    }

    Ok(headers)
}

/// Accumulates opcodes in the order the decoder consumes them.
#[derive(Default)]
struct BitWriter {
    bits: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    fn push(&mut self, value: u32, count: u32) {
        for i in 0..count {
            if self.bit_len % 8 == 0 {
                self.bits.push(0);
            }
            if (value >> i) & 1 != 0 {
                if let Some(last) = self.bits.last_mut() {
                    *last |= 1 << (self.bit_len % 8);
                }
            }
            self.bit_len += 1;
        }
    }

    /// Fields are stored most-significant bit first.
    fn push_field(&mut self, value: u32, width: u32) {
        self.push(reverse_bits(value, width), width);
    }

    /// Emit `run` as literal opcodes; the decoder writes its last byte first.
    fn push_literal_run(&mut self, run: &[u8]) {
        let mut end = run.len();
        while end > 0 {
            let len = if end > SHORT_LITERAL_MAX {
                end.min(LONG_LITERAL_MAX)
            } else {
                end
            };
            if len > SHORT_LITERAL_MAX {
                self.push(0b111, 3);
                self.push_field((len - 9) as u32, 8);
            } else {
                self.push(0b00, 2);
                self.push_field((len - 1) as u32, 3);
            }
            for &byte in run[end - len..end].iter().rev() {
                self.push_field(u32::from(byte), 8);
            }
            end -= len;
        }
    }

    #[cfg(test)]
    fn push_copy(&mut self, len: usize, offset: usize) {
        debug_assert!((1..=256).contains(&len) && (1..=4096).contains(&offset));
        match (len, offset) {
            (2, offset) if offset <= 256 => {
                self.push(0b10, 2);
                self.push_field((offset - 1) as u32, 8);
            }
            (3, offset) if offset <= 512 => {
                self.push(0b001, 3);
                self.push_field((offset - 1) as u32, 9);
            }
            (4, offset) if offset <= 1024 => {
                self.push(0b101, 3);
                self.push_field((offset - 1) as u32, 10);
            }
            _ => {
                self.push(0b011, 3);
                self.push_field((len - 1) as u32, 8);
                self.push_field((offset - 1) as u32, 12);
            }
        }
    }

    fn bit(&self, index: usize) -> u8 {
        (self.bits[index / 8] >> (index % 8)) & 1
    }

    /// Lay the bitstream out back to front behind a header.
    fn finish(self, decompressed_len: u32) -> Vec<u8> {
        let initial_bit_count = self.bit_len % 8;
        let mut consumed = Vec::with_capacity(self.bit_len / 8 + 1);

        let mut first = 0u8;
        for i in 0..initial_bit_count {
            first |= self.bit(i) << i;
        }
        consumed.push(first);

        let mut index = initial_bit_count;
        while index < self.bit_len {
            let mut byte = 0u8;
            for i in 0..8 {
                byte |= self.bit(index + i) << i;
            }
            consumed.push(byte);
            index += 8;
        }

        consumed.reverse();
        let checksum = consumed.iter().fold(0u8, |acc, &b| acc ^ b);
        let header = ChunkHeader {
            initial_bit_count: initial_bit_count as u8,
            checksum,
            decompressed_len,
            compressed_len: consumed.len() as u32 + CHUNK_HEADER_LEN,
            payload_offset: u64::from(CHUNK_HEADER_LEN),
        };

        let mut out = Vec::with_capacity(consumed.len() + CHUNK_HEADER_LEN as usize);
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&consumed);
        out
    }
}

/// Pack `data` into a single chunk made only of literal runs.
///
/// The output round-trips through [`ChunkDecompressor`] but is larger than
/// the input; it exists for tooling that needs to write containers.
pub fn encode_stored_chunk(data: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::default();
    writer.push_literal_run(data);
    writer.finish(data.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: usize = 4096;
    const MAX_COPY: usize = 256;

    fn longest_match(data: &[u8], pos: usize) -> (usize, usize) {
        let max_offset = WINDOW.min(data.len() - pos);
        let max_len = MAX_COPY.min(pos);
        let mut best = (0, 0);
        for offset in 1..=max_offset {
            let mut len = 0;
            while len < max_len && data[pos - len - 1] == data[pos - len - 1 + offset] {
                len += 1;
            }
            if len > best.0 {
                best = (len, offset);
            }
        }
        best
    }

    /// Greedy reference encoder emitting every opcode form.
    fn encode_reference(data: &[u8]) -> Vec<u8> {
        let mut writer = BitWriter::default();
        let mut pos = data.len();
        let mut literal_end = data.len();

        while pos > 0 {
            let (len, offset) = longest_match(data, pos);
            if len >= 2 {
                writer.push_literal_run(&data[pos..literal_end]);
                writer.push_copy(len, offset);
                pos -= len;
                literal_end = pos;
            } else {
                pos -= 1;
            }
        }
        writer.push_literal_run(&data[..literal_end]);
        writer.finish(data.len() as u32)
    }

    fn decode(container: &[u8]) -> DatResult<Vec<u8>> {
        let mut cursor = Cursor::new(container);
        let header = read_chunk_header(&mut cursor, 0)?;
        ChunkDecompressor::new().decompress(&mut cursor, &header)
    }

    fn sample_data(len: usize) -> Vec<u8> {
        let mut state = 0x1234_5678u32;
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let value = (state >> 16) as u8;
            match value % 5 {
                0 => out.extend(std::iter::repeat(value).take((value % 40) as usize)),
                1 if out.len() > 300 => {
                    let start = out.len() - 300 + (value as usize % 200);
                    let chunk: Vec<u8> = out[start..start + 37].to_vec();
                    out.extend(chunk);
                }
                _ => out.push(value),
            }
        }
        out.truncate(len);
        out
    }

    #[test]
    fn parses_header_fields() {
        let raw = [3, 0xAA, 0, 0, 0x08, 0x00, 0, 0, 0, 0x20];
        let header = ChunkHeader::parse(&raw, 10).unwrap();
        assert_eq!(header.initial_bit_count, 3);
        assert_eq!(header.checksum, 0xAA);
        assert_eq!(header.decompressed_len, 2048);
        assert_eq!(header.compressed_len, 32);
        assert_eq!(header.payload_len(), 22);
        assert_eq!(header.next_offset(), 32);
        assert_eq!(header.encode(), raw);
    }

    #[test]
    fn rejects_invalid_headers() {
        let oversized_bits = [9, 0, 0, 0, 0, 1, 0, 0, 0, 11];
        assert!(matches!(
            ChunkHeader::parse(&oversized_bits, 10),
            Err(DatError::InvalidHeader { .. })
        ));
        let short_length = [0, 0, 0, 0, 0, 1, 0, 0, 0, 9];
        assert!(matches!(
            ChunkHeader::parse(&short_length, 10),
            Err(DatError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn decodes_opcode_table() {
        // Tag bits are read least-significant first; fields most-significant first.
        assert_eq!(
            Opcode::decode(0b110_00),
            (Opcode::Literal { len: 0b011 + 1 }, 5)
        );
        assert_eq!(
            Opcode::decode(0b0000_0001_10),
            (Opcode::Copy { len: 2, offset: 0x80 + 1 }, 10)
        );
        assert_eq!(
            Opcode::decode(0b1_0000_0000_001),
            (Opcode::Copy { len: 3, offset: 1 + 1 }, 12)
        );
        assert_eq!(
            Opcode::decode(0b10_0000_0000_101),
            (Opcode::Copy { len: 4, offset: 1 + 1 }, 13)
        );
        assert_eq!(
            Opcode::decode((0b1000_0000_0000 << 11) | (0b1000_0000 << 3) | 0b011),
            (Opcode::Copy { len: 1 + 1, offset: 1 + 1 }, 23)
        );
        assert_eq!(
            Opcode::decode((0b1111_1111 << 3) | 0b111),
            (Opcode::Literal { len: 255 + 9 }, 11)
        );
    }

    #[test]
    fn decodes_single_zero_literal() {
        // Literal tag (00), length field 000, byte 0x00: 13 zero bits, so five
        // meaningful bits in the first byte read and eight in the next.
        let mut container = vec![5, 0x00, 0, 0, 0, 1, 0, 0, 0, 12];
        container.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(decode(&container).unwrap(), vec![0x00]);
    }

    #[test]
    fn single_padding_byte_cannot_hold_an_opcode() {
        let container = [0, 0x00, 0, 0, 0, 1, 0, 0, 0, 11, 0x00];
        assert!(matches!(decode(&container), Err(DatError::InvalidData(_))));
    }

    #[test]
    fn overlapping_copy_repeats_pattern() {
        let mut writer = BitWriter::default();
        writer.push_literal_run(&[0xAB]);
        writer.push_copy(5, 1);
        let container = writer.finish(6);
        assert_eq!(decode(&container).unwrap(), vec![0xAB; 6]);

        let mut writer = BitWriter::default();
        writer.push_literal_run(&[0x01, 0x02]);
        writer.push_copy(4, 2);
        let container = writer.finish(6);
        assert_eq!(
            decode(&container).unwrap(),
            vec![0x01, 0x02, 0x01, 0x02, 0x01, 0x02]
        );
    }

    #[test]
    fn round_trips_reference_encoder() {
        for len in [1usize, 7, 9, 264, 265, 1000, 5000, 9000] {
            let data = sample_data(len);
            let container = encode_reference(&data);
            assert_eq!(decode(&container).unwrap(), data, "length {len}");
        }
    }

    #[test]
    fn round_trips_stored_chunks() {
        for len in [0usize, 1, 8, 9, 300, 4500] {
            let data = sample_data(len);
            let container = encode_stored_chunk(&data);
            assert_eq!(decode(&container).unwrap(), data, "length {len}");
        }
    }

    #[test]
    fn checksum_corruption_is_detected() {
        let data = sample_data(700);
        let mut container = encode_reference(&data);
        container[1] ^= 0x01;
        assert!(matches!(decode(&container), Err(DatError::InvalidData(_))));
    }

    #[test]
    fn truncated_payload_is_detected() {
        let data = sample_data(700);
        let mut container = encode_reference(&data);
        container.remove(CHUNK_HEADER_LEN as usize);
        let compressed_len = container.len() as u32;
        BigEndian::write_u32(&mut container[6..10], compressed_len);
        assert!(matches!(decode(&container), Err(DatError::InvalidData(_))));
    }

    #[test]
    fn trailing_opcode_is_detected() {
        let data = sample_data(700);
        let mut writer = BitWriter::default();
        writer.push_literal_run(&data);
        writer.push_copy(2, 1);
        let container = writer.finish(data.len() as u32);
        assert!(matches!(decode(&container), Err(DatError::InvalidData(_))));
    }

    #[test]
    fn copy_before_output_is_rejected() {
        let mut writer = BitWriter::default();
        writer.push_copy(2, 1);
        let container = writer.finish(2);
        assert!(matches!(decode(&container), Err(DatError::InvalidData(_))));
    }

    #[test]
    fn literal_overflow_is_rejected() {
        let mut writer = BitWriter::default();
        writer.push_literal_run(&[1, 2, 3]);
        let container = writer.finish(2);
        assert!(matches!(decode(&container), Err(DatError::InvalidData(_))));
    }

    #[test]
    fn missing_payload_reports_truncation() {
        let data = sample_data(64);
        let mut container = encode_stored_chunk(&data);
        container.truncate(container.len() - 3);
        assert!(matches!(decode(&container), Err(DatError::TruncatedInput)));
    }

    #[test]
    fn destination_length_must_match() {
        let container = encode_stored_chunk(&[1, 2, 3]);
        let mut cursor = Cursor::new(&container[..]);
        let header = read_chunk_header(&mut cursor, 0).unwrap();
        let mut dest = [0u8; 2];
        let result = ChunkDecompressor::new().decompress_into(&mut cursor, &header, &mut dest);
        assert!(matches!(
            result,
            Err(DatError::DestinationLength {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn walks_chunk_sequence_until_end_of_source() {
        let first = sample_data(500);
        let second = sample_data(2048);
        let mut container = encode_reference(&first);
        container.extend(encode_reference(&second));

        let mut cursor = Cursor::new(&container[..]);
        let decoded: Vec<Vec<u8>> = chunks(&mut cursor, 0)
            .map(|chunk| chunk.map(|(_, data)| data))
            .collect::<DatResult<_>>()
            .unwrap();
        assert_eq!(decoded, vec![first, second]);
    }

    #[test]
    fn partial_trailing_header_is_truncation() {
        let mut container = encode_stored_chunk(&[9, 9, 9]);
        container.extend_from_slice(&[0, 0, 0]);
        let mut cursor = Cursor::new(&container[..]);
        let results: Vec<_> = chunks(&mut cursor, 0).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DatError::TruncatedInput)));
    }

    #[test]
    fn opens_mapped_container() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let first = sample_data(1200);
        let second = sample_data(33);
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&encode_reference(&first)).unwrap();
        file.write_all(&encode_stored_chunk(&second)).unwrap();
        file.flush().unwrap();

        let dat = DatFile::open(file.path()).unwrap();
        assert_eq!(dat.headers().len(), 2);
        assert_eq!(dat.headers()[0].header_offset(), 0);
        assert_eq!(dat.headers()[1].header_offset(), dat.headers()[0].next_offset());
        assert_eq!(dat.decompress_chunk(1).unwrap(), second);
        assert_eq!(dat.decompress_all().unwrap(), vec![first.clone(), second]);
        assert!(dat.decompress_chunk(2).is_err());

        let walked: Vec<Vec<u8>> = dat.chunks().map(|chunk| chunk.unwrap().1).collect();
        assert_eq!(walked.len(), 2);
        assert_eq!(walked[0], first);
    }
}
