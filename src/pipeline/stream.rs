//! In-process stream links between pipeline stages
//!

use std::fs::File;
use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;
use simple_error::{SimpleResult, try_with};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reader which copies every byte read from `inner` to `copy`
///
pub struct TeeReader<R, W> {
    inner: R,
    copy: W,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    pub fn new(inner: R, copy: W) -> Self {
        Self { inner, copy }
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.copy.write_all(&buf[..n])?;
        Ok(n)
    }
}

/// True if `path` is a regular file starting with the gzip magic bytes
///
/// Named pipes are never opened here, since any bytes read from them would be lost to the consumer.
///
pub fn is_gzip_file(path: &Utf8Path) -> SimpleResult<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let mut file = try_with!(File::open(path), "Can't open input file '{path}'");
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(_) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(simple_error::SimpleError::with(
            &format!("Can't read input file '{path}'"),
            e,
        )),
    }
}

/// Wrap a compressed stream in a decompressor, optionally saving the compressed bytes to `copy`
///
/// Multi-member streams are supported, so this also decodes BGZF input.
///
pub fn get_decompressed_stream(
    compressed: Box<dyn Read + Send>,
    copy: Option<File>,
) -> Box<dyn Read + Send> {
    match copy {
        Some(copy) => Box::new(MultiGzDecoder::new(TeeReader::new(compressed, copy))),
        None => Box::new(MultiGzDecoder::new(compressed)),
    }
}

/// Copy `reader` to `writer` on a worker thread
///
pub fn spawn_copy_worker<W: Write + Send + 'static>(
    label: String,
    mut reader: Box<dyn Read + Send>,
    mut writer: W,
) -> JoinHandle<SimpleResult<()>> {
    thread::spawn(move || {
        try_with!(io::copy(&mut reader, &mut writer), "Stream copy failed in '{label}'");
        try_with!(writer.flush(), "Stream flush failed in '{label}'");
        Ok(())
    })
}

/// Decompress `source` into the named pipe `pipe` on a worker thread
///
/// Opening the pipe for writing blocks until its reader opens the other end.
///
pub fn spawn_pipe_feeder(
    label: String,
    source: &Utf8Path,
    pipe: &Utf8Path,
) -> JoinHandle<SimpleResult<()>> {
    let source = source.to_path_buf();
    let pipe = pipe.to_path_buf();
    thread::spawn(move || {
        let input = try_with!(File::open(&source), "Can't open input file '{source}'");
        let mut reader = MultiGzDecoder::new(input);
        let mut output = try_with!(
            std::fs::OpenOptions::new().write(true).open(&pipe),
            "Can't open named pipe '{pipe}'"
        );
        try_with!(
            io::copy(&mut reader, &mut output),
            "Decompression into named pipe failed in '{label}'"
        );
        Ok(())
    })
}
