use crate::error::RecordError;
use crate::layout::{RowContext, RowLayout, session_file_name};
use crate::queue::{LogQueue, LogRecord};
use gazex_core::Vec3;
use log::{debug, error, info};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub rows: u64,
    pub headers: u64,
    pub flushes: u64,
    pub lines_written: u64,
    /// Lines drained while the output was unavailable
    pub lines_discarded: u64,
}

/// Exclusive owner of a session's output stream.
///
/// Records queue up until the flush threshold is reached and are then
/// written oldest first. If the stream cannot be opened or a write fails the
/// recorder degrades: the failure is logged once, the queue keeps draining,
/// and nothing more reaches the sink. Dropping the recorder closes it.
pub struct SessionRecorder<W: Write = BufWriter<File>> {
    sink: Option<W>,
    queue: LogQueue,
    layout: RowLayout,
    context: RowContext,
    last_event: Duration,
    stats: RecorderStats,
    path: Option<PathBuf>,
    closed: bool,
}

impl SessionRecorder<BufWriter<File>> {
    /// Opens `<dir>/<PREFIX>_<timestamp>.csv`.
    pub fn try_create(
        dir: &Path,
        prefix: &str,
        layout: RowLayout,
        flush_threshold: usize,
    ) -> Result<Self, RecordError> {
        fs::create_dir_all(dir).map_err(|source| RecordError::OutputDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(session_file_name(prefix, &chrono::Local::now()));
        let file = File::create(&path).map_err(|source| RecordError::Open {
            path: path.clone(),
            source,
        })?;
        info!("Recording session to {}", path.display());

        let mut recorder = Self::with_sink(BufWriter::new(file), layout, flush_threshold);
        recorder.path = Some(path);
        Ok(recorder)
    }

    /// Like [`try_create`](Self::try_create), but an unavailable output
    /// yields a degraded recorder instead of an error.
    pub fn create(dir: &Path, prefix: &str, layout: RowLayout, flush_threshold: usize) -> Self {
        match Self::try_create(dir, prefix, layout.clone(), flush_threshold) {
            Ok(recorder) => recorder,
            Err(e) => {
                error!("{e}; session data will not be saved");
                Self::degraded(layout, flush_threshold)
            }
        }
    }
}

impl<W: Write> SessionRecorder<W> {
    pub fn with_sink(sink: W, layout: RowLayout, flush_threshold: usize) -> Self {
        Self::from_parts(Some(sink), layout, flush_threshold)
    }

    /// A recorder with no output; every write is a no-op.
    pub fn degraded(layout: RowLayout, flush_threshold: usize) -> Self {
        Self::from_parts(None, layout, flush_threshold)
    }

    fn from_parts(sink: Option<W>, layout: RowLayout, flush_threshold: usize) -> Self {
        Self {
            sink,
            queue: LogQueue::new(flush_threshold),
            layout,
            context: RowContext::default(),
            last_event: Duration::ZERO,
            stats: RecorderStats::default(),
            path: None,
            closed: false,
        }
    }

    /// Writes the fixed `<Label>,<x>,<y>,<z>` lines and the column header
    /// that open every session file.
    pub fn begin(&mut self, reference_points: &[(String, Vec3)], now: Duration) {
        for (label, point) in reference_points {
            self.record_header(&format!("{label},{point}"), now);
        }
        let header = self.layout.header();
        self.record_header(&header, now);
    }

    pub fn record_header(&mut self, text: &str, now: Duration) {
        if self.closed {
            debug!("Header after close ignored: {text}");
            return;
        }
        self.last_event = now;
        self.stats.headers += 1;
        self.enqueue(LogRecord::Header(text.to_owned()));
    }

    /// Restarts the time-since-last-event column without writing a line.
    pub fn mark_event(&mut self, now: Duration) {
        self.last_event = now;
    }

    pub fn record_row(&mut self, payload: &str) {
        if self.closed {
            return;
        }
        let line = self.layout.render_row(&self.context, payload);
        self.stats.rows += 1;
        self.enqueue(LogRecord::Data(line));
    }

    /// One gaze sample: `<time>,<since last event>,<x,y,z | None>`.
    pub fn record_frame(&mut self, now: Duration, point: Option<Vec3>) {
        let since = now.saturating_sub(self.last_event).as_secs_f32();
        let payload = match point {
            Some(p) => format!("{},{since},{p}", now.as_secs_f32()),
            None => format!("{},{since},None", now.as_secs_f32()),
        };
        self.record_row(&payload);
    }

    pub fn set_stimuli(&mut self, names: Option<String>) {
        self.context.stimuli = names;
    }

    pub fn set_trial_number(&mut self, number: usize) {
        self.context.trial_number = number;
    }

    pub fn set_event(&mut self, event: impl Into<String>) {
        self.context.event = event.into();
    }

    pub fn context(&self) -> &RowContext {
        &self.context
    }

    fn enqueue(&mut self, record: LogRecord) {
        if self.queue.push(record) {
            self.flush();
        }
    }

    /// Writes every queued record in order and empties the queue. Returns the
    /// number of records drained.
    pub fn flush(&mut self) -> usize {
        if self.queue.is_empty() {
            return 0;
        }
        let records: Vec<LogRecord> = self.queue.drain().collect();
        for record in &records {
            self.write_line(record.line());
        }
        self.stats.flushes += 1;
        debug!("Flushed {} records", records.len());
        records.len()
    }

    fn write_line(&mut self, line: &str) {
        let result = match self.sink.as_mut() {
            Some(sink) => writeln!(sink, "{line}"),
            None => {
                self.stats.lines_discarded += 1;
                return;
            }
        };
        match result {
            Ok(()) => self.stats.lines_written += 1,
            Err(e) => {
                self.stats.lines_discarded += 1;
                self.degrade(e);
            }
        }
    }

    fn degrade(&mut self, e: std::io::Error) {
        error!("Session output failed: {e}; further data will be discarded");
        self.sink = None;
    }

    /// Final flush, then releases the stream. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.flush();
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush() {
                self.degrade(e);
            }
        }
        self.closed = true;
        info!(
            "Session recorder closed: {} rows, {} lines written, {} discarded",
            self.stats.rows, self.stats.lines_written, self.stats.lines_discarded
        );
    }

    /// Closes the recorder and hands back the sink, if it is still healthy.
    pub fn into_sink(mut self) -> Option<W> {
        self.flush();
        let mut sink = self.sink.take();
        if let Some(w) = sink.as_mut() {
            if let Err(e) = w.flush() {
                self.degrade(e);
                sink = None;
            }
        }
        self.closed = true;
        sink
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    pub fn is_degraded(&self) -> bool {
        self.sink.is_none() && !self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }
}

impl<W: Write> Drop for SessionRecorder<W> {
    fn drop(&mut self) {
        self.close();
    }
}
