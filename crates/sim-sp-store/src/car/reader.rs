//! Read-only CAR archive

use cid::Cid;
use parking_lot::Mutex;
use sim_sp_core::{SimSpError, SimSpResult};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{CarHeader, MAX_HEADER_LEN, V2_HEADER_LEN};
use crate::block::Block;
use crate::blockstore::Blockstore;

#[derive(Debug, Clone, Copy)]
struct BlockLocation {
    offset: u64,
    len: usize,
}

/// A CAR file opened read-only
///
/// Opening reads the header and indexes every section; block bytes stay on
/// disk and are read on demand. When a CID appears in more than one section
/// the first occurrence wins.
pub struct CarArchive {
    path: PathBuf,
    version: u64,
    roots: Vec<Cid>,
    index: HashMap<Cid, BlockLocation>,
    order: Vec<Cid>,
    file: Mutex<File>,
}

impl std::fmt::Debug for CarArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarArchive")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("roots", &self.roots)
            .field("blocks", &self.order.len())
            .finish()
    }
}

impl CarArchive {
    /// Open and index the archive at `path`
    pub fn open_read_only(path: impl AsRef<Path>) -> SimSpResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| SimSpError::archive(&path, format!("cannot open: {e}")))?;
        let file_len = file
            .metadata()
            .map_err(|e| SimSpError::archive(&path, format!("cannot stat: {e}")))?
            .len();
        let index_file = file
            .try_clone()
            .map_err(|e| SimSpError::archive(&path, format!("cannot open: {e}")))?;

        let mut reader = BufReader::new(index_file);
        let header = read_header(&mut reader, &path)?;

        let (roots, payload_end) = match header.version {
            1 => (header.roots, file_len),
            2 => {
                let (data_offset, data_size) = read_v2_header(&mut reader, &path)?;
                let data_end = data_offset
                    .checked_add(data_size)
                    .filter(|end| *end <= file_len)
                    .ok_or_else(|| SimSpError::archive(&path, "data section exceeds file"))?;
                reader
                    .seek(SeekFrom::Start(data_offset))
                    .map_err(|e| SimSpError::archive(&path, format!("cannot seek: {e}")))?;
                let inner = read_header(&mut reader, &path)?;
                if inner.version != 1 {
                    return Err(SimSpError::archive(
                        &path,
                        format!("unsupported inner CAR version {}", inner.version),
                    ));
                }
                (inner.roots, data_end)
            }
            other => {
                return Err(SimSpError::archive(
                    &path,
                    format!("unsupported CAR version {other}"),
                ))
            }
        };

        let (index, order) = index_sections(&mut reader, payload_end, &path)?;
        debug!(
            path = %path.display(),
            version = header.version,
            blocks = order.len(),
            "Indexed CAR archive"
        );

        Ok(Self {
            path,
            version: header.version,
            roots,
            index,
            order,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// CAR format version (1 or 2)
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    /// Number of distinct blocks
    pub fn block_count(&self) -> usize {
        self.order.len()
    }

    fn read_block(&self, location: BlockLocation) -> SimSpResult<Vec<u8>> {
        let mut buf = vec![0u8; location.len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(location.offset))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| SimSpError::archive(&self.path, format!("cannot read block: {e}")))?;
        Ok(buf)
    }
}

impl Blockstore for CarArchive {
    fn has(&self, cid: &Cid) -> SimSpResult<bool> {
        Ok(self.index.contains_key(cid))
    }

    fn get(&self, cid: &Cid) -> SimSpResult<Block> {
        let location = self
            .index
            .get(cid)
            .copied()
            .ok_or_else(|| SimSpError::not_found(format!("block {cid}")))?;
        Ok(Block::new(*cid, self.read_block(location)?))
    }

    fn get_size(&self, cid: &Cid) -> SimSpResult<usize> {
        self.index
            .get(cid)
            .map(|location| location.len)
            .ok_or_else(|| SimSpError::not_found(format!("block {cid}")))
    }

    fn all_keys(&self) -> SimSpResult<Vec<Cid>> {
        Ok(self.order.clone())
    }
}

fn read_varint<R: Read>(reader: &mut R, path: &Path) -> SimSpResult<u64> {
    unsigned_varint::io::read_u64(reader)
        .map_err(|e| SimSpError::archive(path, format!("invalid varint: {e}")))
}

fn read_header<R: Read>(reader: &mut R, path: &Path) -> SimSpResult<CarHeader> {
    let len = read_varint(reader, path)?;
    if len == 0 || len > MAX_HEADER_LEN {
        return Err(SimSpError::archive(path, format!("invalid header length {len}")));
    }
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|e| SimSpError::archive(path, format!("truncated header: {e}")))?;
    serde_ipld_dagcbor::from_slice(&buf)
        .map_err(|e| SimSpError::archive(path, format!("invalid header: {e}")))
}

fn read_v2_header<R: Read>(reader: &mut R, path: &Path) -> SimSpResult<(u64, u64)> {
    let mut buf = [0u8; V2_HEADER_LEN];
    reader
        .read_exact(&mut buf)
        .map_err(|e| SimSpError::archive(path, format!("truncated v2 header: {e}")))?;
    let le_u64 = |at: usize| {
        let mut word = [0u8; 8];
        word.copy_from_slice(&buf[at..at + 8]);
        u64::from_le_bytes(word)
    };
    // bytes 0..16 are the characteristics bitfield
    Ok((le_u64(16), le_u64(24)))
}

fn index_sections<R: Read + Seek>(
    reader: &mut BufReader<R>,
    end: u64,
    path: &Path,
) -> SimSpResult<(HashMap<Cid, BlockLocation>, Vec<Cid>)> {
    let position = |reader: &mut BufReader<R>| {
        reader
            .stream_position()
            .map_err(|e| SimSpError::archive(path, format!("cannot seek: {e}")))
    };

    let mut index = HashMap::new();
    let mut order = Vec::new();
    let mut pos = position(reader)?;

    while pos < end {
        let section_len = read_varint(reader, path)?;
        if section_len == 0 {
            // zero-length section marks padding at the end of the payload
            break;
        }
        let section_start = position(reader)?;
        let cid = Cid::read_bytes(&mut *reader)
            .map_err(|e| SimSpError::archive(path, format!("invalid CID at offset {section_start}: {e}")))?;
        let data_offset = position(reader)?;
        let cid_len = data_offset - section_start;
        let data_len = section_len.checked_sub(cid_len).ok_or_else(|| {
            SimSpError::archive(path, format!("section at offset {section_start} shorter than its CID"))
        })?;
        let section_end = data_offset
            .checked_add(data_len)
            .filter(|section_end| *section_end <= end)
            .ok_or_else(|| {
                SimSpError::archive(path, format!("truncated section at offset {section_start}"))
            })?;
        let len = usize::try_from(data_len)
            .map_err(|_| SimSpError::archive(path, "block too large"))?;

        if !index.contains_key(&cid) {
            index.insert(
                cid,
                BlockLocation {
                    offset: data_offset,
                    len,
                },
            );
            order.push(cid);
        }

        let skip = i64::try_from(data_len)
            .map_err(|_| SimSpError::archive(path, "block too large"))?;
        reader
            .seek_relative(skip)
            .map_err(|e| SimSpError::archive(path, format!("cannot seek: {e}")))?;
        pos = section_end;
    }

    Ok((index, order))
}
