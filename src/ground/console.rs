use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, BufReader, Stdin};

/// Where operator-facing text goes.
pub trait Console: Send + Sync {
    fn show(&self, line: &str);
}

/// Prints to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn show(&self, line: &str) {
        println!("{line}");
    }
}

/// Source of completed operator lines.
pub trait OperatorInput {
    /// Wait for the next line, without its newline. `None` means input is exhausted.
    ///
    /// Implementations raise `typing` while a line is partially entered and lower it once the
    /// line is complete.
    fn next_line(&mut self, typing: &AtomicBool) -> impl Future<Output = io::Result<Option<String>>> + Send;
}

/// Reads operator lines byte by byte from any reader.
#[derive(Debug)]
pub struct ReaderInput<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> ReaderInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }
}

impl ReaderInput<Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin + Send> OperatorInput for ReaderInput<R> {
    async fn next_line(&mut self, typing: &AtomicBool) -> io::Result<Option<String>> {
        let mut line = Vec::new();
        let result = loop {
            let byte = match self.reader.read_u8().await {
                Ok(byte) => byte,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    break Ok((!line.is_empty()).then_some(()));
                }
                Err(e) => break Err(e),
            };
            if line.is_empty() {
                typing.store(true, Ordering::Relaxed);
            }
            if byte == b'\n' {
                break Ok(Some(()));
            }
            line.push(byte);
        };
        typing.store(false, Ordering::Relaxed);

        result.map(|done| done.map(|()| String::from_utf8_lossy(&line).into_owned()))
    }
}
