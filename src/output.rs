use std::io::{self, Write};

/// Destination for `println`. Each call receives one line, newline included.
pub trait OutputSink {
    fn write(&mut self, line: &str);
}

pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write(&mut self, line: &str) {
        let mut stdout = io::stdout().lock();
        // A closed stdout (e.g. a broken pipe) must not abort evaluation
        let _ = stdout.write_all(line.as_bytes());
        let _ = stdout.flush();
    }
}

/// Collects output in memory; used by tests and embedders.
#[derive(Debug, Default)]
pub struct BufferSink {
    buffer: String,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &str {
        &self.buffer
    }
}

impl OutputSink for BufferSink {
    fn write(&mut self, line: &str) {
        self.buffer.push_str(line);
    }
}
