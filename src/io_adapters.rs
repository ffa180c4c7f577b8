use parking_lot::Mutex;
use std::io::{Result as IoResult, Write};
use std::sync::Arc;

/// Where commands write their user-facing output.
///
/// Cloning shares the same sink, so a nested `run_command` writes to the
/// same place as its caller.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedWriter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// A writer backed by memory plus a handle to read what was written.
    pub fn with_buffer() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }
}

impl Write for SharedWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.inner.lock().write(data)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.lock().flush()
    }
}

/// Memory-backed writer for capturing command output.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
