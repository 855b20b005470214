//! Baseband file I/O (§6): the `FILE→...` ends of the pipeline, reading
//! or writing one of the raw interleaved I/Q formats.
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::error::{Error, Result};
use crate::stream::{ReadStream, WriteStream};
use crate::{BasebandFormat, Complex32};

/// Reads a baseband capture file and emits a complex sample stream.
pub struct FileSource {
    reader: BufReader<File>,
    format: BasebandFormat,
    dst: WriteStream<Complex32>,
    eof: bool,
}

impl FileSource {
    /// Open `path` for reading, decoding samples as `format`.
    pub fn new(
        path: impl AsRef<Path>,
        format: BasebandFormat,
    ) -> Result<(Self, ReadStream<Complex32>)> {
        let file = File::open(path)?;
        let (dst, dst_read) = WriteStream::new();
        Ok((
            Self {
                reader: BufReader::new(file),
                format,
                dst,
                eof: false,
            },
            dst_read,
        ))
    }
}

impl BlockName for FileSource {
    fn block_name(&self) -> &str {
        "FileSource"
    }
}

impl BlockEOF for FileSource {
    fn eof(&mut self) -> bool {
        self.eof
    }
}

impl Block for FileSource {
    fn work(&mut self) -> Result<BlockRet> {
        if self.eof {
            return Ok(BlockRet::EOF);
        }
        let mut w = self.dst.write_buf()?;
        if w.is_empty() {
            return Ok(BlockRet::OutputFull);
        }
        let bps = self.format.bytes_per_sample();
        let mut raw = vec![0u8; w.len() * bps];
        let mut got = 0usize;
        while got < raw.len() {
            match self.reader.read(&mut raw[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        let n = got / bps;
        for (i, out) in w.slice()[..n].iter_mut().enumerate() {
            *out = self.format.decode(&raw[i * bps..(i + 1) * bps]);
        }
        w.produce(n, &[]);
        if got < raw.len() {
            self.eof = true;
            self.dst.stop_writer();
        }
        Ok(BlockRet::Ok)
    }
}

/// Writes a complex sample stream to a baseband capture file.
pub struct FileSink {
    writer: BufWriter<File>,
    format: BasebandFormat,
    src: ReadStream<Complex32>,
}

impl FileSink {
    /// Create (truncating) `path` for writing, encoding samples as
    /// `format`.
    pub fn new(path: impl AsRef<Path>, format: BasebandFormat, src: ReadStream<Complex32>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            format,
            src,
        })
    }
}

impl BlockName for FileSink {
    fn block_name(&self) -> &str {
        "FileSink"
    }
}

impl BlockEOF for FileSink {}

impl Block for FileSink {
    fn work(&mut self) -> Result<BlockRet> {
        if self.src.eof() {
            self.writer.flush()?;
            return Ok(BlockRet::EOF);
        }
        let (r, _tags) = self.src.read_buf()?;
        if r.is_empty() {
            return Ok(BlockRet::Noop);
        }
        let n = r.len();
        let mut raw = Vec::with_capacity(n * self.format.bytes_per_sample());
        for &s in r.iter() {
            self.format.encode(s, &mut raw);
        }
        self.writer.write_all(&raw)?;
        r.consume(n);
        Ok(BlockRet::Ok)
    }
}
