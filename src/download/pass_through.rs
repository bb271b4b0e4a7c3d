use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use log::debug;
use tokio::io::{AsyncRead, ReadBuf};

/// Minimum advance, in percentage points, between two progress reports.
const REPORT_STEP: f64 = 2.0;

/// Byte counters of a single transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    total: u64,
    length: Option<u64>,
    reported: f64,
}

impl Progress {
    /// An unknown or zero `length` disables percentage reporting.
    pub fn new(length: Option<u64>) -> Self {
        Self {
            total: 0,
            length: length.filter(|length| *length > 0),
            reported: 0.0,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn percentage(&self) -> Option<f64> {
        self.length
            .map(|length| (self.total as f64 * 100.0) / length as f64)
    }

    /// Records `read` more bytes and returns the decile to report, if the
    /// percentage moved far enough since the last report.
    pub fn advance(&mut self, read: u64) -> Option<u8> {
        self.total += read;
        let percentage = self.percentage()?;
        if percentage - self.reported <= REPORT_STEP {
            return None;
        }
        self.reported = percentage;
        Some((percentage / 10.0).min(9.0) as u8)
    }
}

/// Forwards reads to `inner` while writing progress digits to `sink`.
pub struct PassThrough<R, W> {
    inner: R,
    sink: W,
    progress: Progress,
}

impl<R, W> PassThrough<R, W> {
    pub fn new(inner: R, length: Option<u64>, sink: W) -> Self {
        Self {
            inner,
            sink,
            progress: Progress::new(length),
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn into_inner(self) -> (R, W) {
        (self.inner, self.sink)
    }
}

impl<R, W> AsyncRead for PassThrough<R, W>
where
    R: AsyncRead + Unpin,
    W: Write + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let read = buf.filled().len() - before;
        if read > 0 {
            if let Some(decile) = this.progress.advance(read as u64) {
                if let Err(err) = write!(this.sink, "{}", decile) {
                    debug!("unable to report progress: {}", err);
                }
            }
        }
        Poll::Ready(Ok(()))
    }
}
