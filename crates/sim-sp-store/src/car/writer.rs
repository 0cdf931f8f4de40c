//! CARv1 writer

use cid::Cid;
use sim_sp_core::{SimSpError, SimSpResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::CarHeader;
use crate::block::Block;

/// Streams a CARv1 archive into `W`
pub struct CarWriter<W: Write> {
    writer: W,
}

impl<W: Write> CarWriter<W> {
    /// Write the header naming `roots` and return a writer for sections
    pub fn new(mut writer: W, roots: &[Cid]) -> SimSpResult<Self> {
        let header = CarHeader {
            roots: roots.to_vec(),
            version: 1,
        };
        let encoded = serde_ipld_dagcbor::to_vec(&header)
            .map_err(|e| SimSpError::decode(format!("cannot encode CAR header: {e}")))?;
        write_varint(&mut writer, encoded.len() as u64)?;
        writer.write_all(&encoded).map_err(io_error)?;
        Ok(Self { writer })
    }

    /// Append one section
    pub fn write_block(&mut self, block: &Block) -> SimSpResult<()> {
        let cid = block.cid().to_bytes();
        write_varint(&mut self.writer, (cid.len() + block.len()) as u64)?;
        self.writer.write_all(&cid).map_err(io_error)?;
        self.writer.write_all(block.data()).map_err(io_error)?;
        Ok(())
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> SimSpResult<W> {
        self.writer.flush().map_err(io_error)?;
        Ok(self.writer)
    }
}

impl CarWriter<BufWriter<File>> {
    /// Write `blocks` as a complete archive at `path`
    pub fn write_file(path: impl AsRef<Path>, roots: &[Cid], blocks: &[Block]) -> SimSpResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SimSpError::storage(path, e))?;
        let mut writer = CarWriter::new(BufWriter::new(file), roots)?;
        for block in blocks {
            writer.write_block(block)?;
        }
        let file = writer
            .finish()?
            .into_inner()
            .map_err(|e| SimSpError::storage(path, e.into_error()))?;
        file.sync_all().map_err(|e| SimSpError::storage(path, e))
    }
}

fn write_varint<W: Write>(writer: &mut W, value: u64) -> SimSpResult<()> {
    let mut buf = unsigned_varint::encode::u64_buffer();
    writer
        .write_all(unsigned_varint::encode::u64(value, &mut buf))
        .map_err(io_error)
}

fn io_error(e: std::io::Error) -> SimSpError {
    SimSpError::transport(format!("CAR write failed: {e}"))
}
