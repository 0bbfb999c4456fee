use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::Result;

/// Line-oriented destination for user-facing text. Clones share the same
/// underlying writer and every write takes the lock, so status messages and
/// concurrently tailed log lines never interleave mid-line.
#[derive(Clone)]
pub struct Output {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Output {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Writes `text` as-is; callers include the trailing newline.
    pub fn write(&self, text: &str) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}
