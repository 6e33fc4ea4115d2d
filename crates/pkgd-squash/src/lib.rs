//! A minimal read-only SquashFS superblock parser (§4.G step 4 of the
//! lazy package loader: "open the SquashFS superblock").
//!
//! This crate decodes only the fixed 96-byte superblock at the start of a
//! SquashFS image — magic/endianness, inode count, block size, and the six
//! on-disk table offsets. It does not decompress file data or walk the
//! directory/inode tables; translating a package-relative inode number into
//! file content remains the external kernel filesystem adapter's job once
//! it has been handed the superblock and a byte-range reader over the
//! image area.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

pub const SUPERBLOCK_LEN: usize = 96;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SuperblockError {
    #[error("superblock buffer is {0} bytes, expected {SUPERBLOCK_LEN}")]
    ShortBuffer(usize),
    #[error("invalid SquashFS magic (expected \"hsqs\" or \"sqsh\")")]
    BadMagic,
}

/// Byte order selected by the superblock's magic: `"hsqs"` is the
/// little-endian magic, `"sqsh"` the big-endian one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// The decoded fixed-size SquashFS superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub endianness: Endianness,
    pub magic: u32,
    pub inode_count: u32,
    pub mod_time: i32,
    pub block_size: u32,
    pub frag_count: u32,
    pub compression: u16,
    pub block_log: u16,
    pub flags: u16,
    pub id_count: u16,
    pub version_major: u16,
    pub version_minor: u16,
    pub root_inode: u64,
    pub bytes_used: u64,
    pub id_table_start: u64,
    pub xattr_id_table_start: u64,
    pub inode_table_start: u64,
    pub dir_table_start: u64,
    pub frag_table_start: u64,
    pub export_table_start: u64,
}

impl Superblock {
    /// Parses the 96-byte superblock, selecting byte order from the magic.
    pub fn parse(buf: &[u8]) -> Result<Self, SuperblockError> {
        if buf.len() != SUPERBLOCK_LEN {
            return Err(SuperblockError::ShortBuffer(buf.len()));
        }

        let endianness = match &buf[0..4] {
            b"hsqs" => Endianness::Little,
            b"sqsh" => Endianness::Big,
            _ => return Err(SuperblockError::BadMagic),
        };

        Ok(match endianness {
            Endianness::Little => parse_with::<LittleEndian>(buf, endianness),
            Endianness::Big => parse_with::<BigEndian>(buf, endianness),
        })
    }
}

fn parse_with<O: ByteOrder>(buf: &[u8], endianness: Endianness) -> Superblock {
    Superblock {
        endianness,
        magic: O::read_u32(&buf[0..4]),
        inode_count: O::read_u32(&buf[4..8]),
        mod_time: O::read_i32(&buf[8..12]),
        block_size: O::read_u32(&buf[12..16]),
        frag_count: O::read_u32(&buf[16..20]),
        compression: O::read_u16(&buf[20..22]),
        block_log: O::read_u16(&buf[22..24]),
        flags: O::read_u16(&buf[24..26]),
        id_count: O::read_u16(&buf[26..28]),
        version_major: O::read_u16(&buf[28..30]),
        version_minor: O::read_u16(&buf[30..32]),
        root_inode: O::read_u64(&buf[32..40]),
        bytes_used: O::read_u64(&buf[40..48]),
        id_table_start: O::read_u64(&buf[48..56]),
        xattr_id_table_start: O::read_u64(&buf[56..64]),
        inode_table_start: O::read_u64(&buf[64..72]),
        dir_table_start: O::read_u64(&buf[72..80]),
        frag_table_start: O::read_u64(&buf[80..88]),
        export_table_start: O::read_u64(&buf[88..96]),
    }
}

/// A positioned-read abstraction over a package's payload. Implemented by
/// `pkgd-loader`'s ranged-HTTP file so this crate never needs to know
/// whether bytes come from disk or network.
pub trait ReadAt {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize>;
}

#[derive(Debug, Error)]
pub enum SuperblockReadError {
    #[error("failed to read the superblock: {0}")]
    Io(std::io::Error),
    #[error("short read of the superblock ({0} of {SUPERBLOCK_LEN} bytes)")]
    ShortRead(usize),
    #[error(transparent)]
    Parse(#[from] SuperblockError),
}

/// Adds a fixed `base` byte offset to every read, so a SquashFS superblock
/// and its tables — addressed relative to the start of the image — land
/// inside the payload area of a package file that starts at `base`.
pub struct OffsetReader<R> {
    inner: R,
    base: u64,
}

impl<R: ReadAt> OffsetReader<R> {
    pub fn new(inner: R, base: u64) -> Self {
        Self { inner, base }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: ReadAt> ReadAt for OffsetReader<R> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        self.inner.read_at(buf, self.base + offset)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for std::sync::Arc<T> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

/// Reads and parses the superblock at the start of `reader`.
pub fn read_superblock<R: ReadAt>(reader: &R) -> Result<Superblock, SuperblockReadError> {
    let mut buf = [0u8; SUPERBLOCK_LEN];
    let n = reader
        .read_at(&mut buf, 0)
        .map_err(SuperblockReadError::Io)?;
    if n != SUPERBLOCK_LEN {
        return Err(SuperblockReadError::ShortRead(n));
    }
    Ok(Superblock::parse(&buf)?)
}
