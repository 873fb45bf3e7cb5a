//! Byte sources the decoder reads save sets from.
//!
//! The decoder only needs sequential block reads plus a rewind between
//! passes.  [`StreamSource`] adapts any `Read + Seek`; [`open_path`] picks
//! a plain file or a RAM-cached copy of it.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

pub trait ByteSource {
    fn tell(&mut self) -> io::Result<u64>;
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    /// Read up to `buf.len()` bytes; fewer only at end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn at_end(&mut self) -> io::Result<bool>;
    /// Total length in bytes.
    fn len(&mut self) -> io::Result<u64>;
}

impl<B: ByteSource + ?Sized> ByteSource for Box<B> {
    fn tell(&mut self) -> io::Result<u64>                { (**self).tell() }
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> { (**self).seek(pos) }
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> { (**self).read_chunk(buf) }
    fn at_end(&mut self) -> io::Result<bool>             { (**self).at_end() }
    fn len(&mut self) -> io::Result<u64>                 { (**self).len() }
}

/// [`ByteSource`] over any seekable reader.
pub struct StreamSource<R: Read + Seek> {
    inner: R,
    len:   u64,
}

impl<R: Read + Seek> StreamSource<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let start = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self { inner, len })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteSource for StreamSource<R> {
    fn tell(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn at_end(&mut self) -> io::Result<bool> {
        Ok(self.inner.stream_position()? >= self.len)
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }
}

/// Open a save set on disk.  With `ram_cache` the whole file is read into
/// memory first, which pays off for two-pass runs over slow media.
pub fn open_path<P: AsRef<Path>>(path: P, ram_cache: bool) -> io::Result<Box<dyn ByteSource>> {
    if ram_cache {
        let bytes = std::fs::read(path)?;
        Ok(Box::new(StreamSource::new(Cursor::new(bytes))?))
    } else {
        let file = BufReader::new(File::open(path)?);
        Ok(Box::new(StreamSource::new(file)?))
    }
}
