//! File sink - rotating, batched file output
//!
//! Writes messages to one file per resolved destination. Folders in the
//! configured path are created as needed, and the wildcard character `*`
//! in the path is replaced by the stream name, so a single sink can fan
//! out to one file per stream.
//!
//! # Architecture
//!
//! ```text
//! [ingest] -> resolve destination -> BatchBuffer -> flush -> DiskWriter
//!                  | (rotate)
//!                  +-> close old writer --(background)--> gzip
//!                  +-> open new file, update _current symlink
//!                  +-> prune retention  --(background)
//! ```
//!
//! The run loop is a single task selecting over the message channel, a
//! control channel and a flush tick; it is the only task touching the
//! destination maps. Per-destination work is guarded by one mutex per
//! destination, and background close/compress/prune tasks are tracked on
//! a `JoinSet` that shutdown drains.
//!
//! # Failure model
//!
//! The sink prefers fallback over data loss: a message that cannot be
//! written (directory, open or write failure) is handed to the spooling
//! producer via [`FallbackHandle`], the error is logged, and the next
//! message retries from scratch.

use std::collections::HashMap;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use rill_protocol::{FallbackHandle, Message, SinkLifecycle, StreamId, StreamRegistry};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::common::{FileSinkMetrics, MetricsSnapshot, SinkError};

/// Batch buffering of pending messages
pub mod batch;

/// Configuration surface
pub mod config;

/// Background gzip compression
pub mod compress;

/// Retention pruning
pub mod prune;

/// Rotation policy and naming
pub mod rotation;

/// Per-destination state
pub mod state;

/// Destination writer abstraction
pub mod writer;

#[cfg(test)]
pub(crate) mod testutil;

pub use writer::{DestinationWriter, DiskWriter};

use config::FileSinkConfig;
use prune::Pruner;
use rotation::RotationPolicy;
use state::DestinationState;

/// Control commands accepted by a running file sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCommand {
    /// Force every destination to rotate now
    Rotate,

    /// Flush everything and stop
    Shutdown,
}

/// Handle for controlling a running file sink
///
/// Obtained from [`FileSink::controller`] before the sink is consumed by
/// `run()`. The owning runtime calls these instead of registering
/// callbacks on the sink.
#[derive(Debug, Clone)]
pub struct SinkController {
    commands: mpsc::Sender<SinkCommand>,
}

impl SinkController {
    /// Ask the sink to rotate every destination
    ///
    /// Returns `false` if the sink has already stopped.
    pub async fn rotate(&self) -> bool {
        self.commands.send(SinkCommand::Rotate).await.is_ok()
    }

    /// Ask the sink to shut down
    pub async fn shutdown(&self) -> bool {
        self.commands.send(SinkCommand::Shutdown).await.is_ok()
    }
}

/// Rotating, batched file sink
///
/// Construct with [`FileSink::new`], then drive with [`FileSink::run`]
/// (typically spawned as a task). `run` returns a metrics snapshot once
/// the message channel closes or a shutdown command arrives.
pub struct FileSink {
    template: PathTemplate,
    configured_path: String,

    rotation: RotationPolicy,
    pruner: Pruner,

    batch_max: usize,
    batch_flush: usize,
    batch_timeout: Duration,
    flush_timeout: Option<Duration>,

    file_mode: u32,
    folder_mode: u32,
    overwrite: bool,

    /// Destination state per resolved base path
    files: HashMap<PathBuf, Arc<DestinationState>>,

    /// Destination state per stream; multiple streams may share a state
    files_by_stream: HashMap<StreamId, Arc<DestinationState>>,

    registry: Arc<dyn StreamRegistry>,
    fallback: FallbackHandle,

    receiver: Option<mpsc::Receiver<Message>>,
    commands: Option<mpsc::Receiver<SinkCommand>>,
    command_tx: mpsc::Sender<SinkCommand>,

    lifecycle: Arc<SinkLifecycle>,
    metrics: Arc<FileSinkMetrics>,

    /// Background close/compress/prune tasks, drained on shutdown
    tasks: JoinSet<()>,
}

impl FileSink {
    /// Create a file sink from a validated configuration
    ///
    /// `registry` resolves stream names for wildcard paths, `fallback`
    /// receives undeliverable messages, and `receiver` is the ingest
    /// channel. Configuration errors are returned here; the sink never
    /// starts half-configured.
    pub fn new(
        config: FileSinkConfig,
        registry: Arc<dyn StreamRegistry>,
        fallback: FallbackHandle,
        receiver: mpsc::Receiver<Message>,
    ) -> Result<Self, SinkError> {
        config.validate()?;

        let rotation = RotationPolicy::from_settings(&config.rotation)?;
        let pruner = Pruner::from_settings(&config.prune, rotation.size_bytes());
        let (command_tx, command_rx) = mpsc::channel(8);

        Ok(Self {
            template: PathTemplate::parse(&config.path),
            configured_path: config.path.clone(),
            rotation,
            pruner,
            batch_max: config.batch.max_count,
            batch_flush: config.flush_count(),
            batch_timeout: config.batch_timeout(),
            flush_timeout: config.flush_timeout(),
            file_mode: config.file_mode()?,
            folder_mode: config.folder_mode()?,
            overwrite: config.overwrite,
            files: HashMap::new(),
            files_by_stream: HashMap::new(),
            registry,
            fallback,
            receiver: Some(receiver),
            commands: Some(command_rx),
            command_tx,
            lifecycle: Arc::new(SinkLifecycle::new()),
            metrics: Arc::new(FileSinkMetrics::new()),
            tasks: JoinSet::new(),
        })
    }

    /// Get a control handle, valid after `run()` consumes the sink
    pub fn controller(&self) -> SinkController {
        SinkController {
            commands: self.command_tx.clone(),
        }
    }

    /// The sink's lifecycle flag
    pub fn lifecycle(&self) -> Arc<SinkLifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// Shared handle to the sink's metrics
    pub fn metrics(&self) -> Arc<FileSinkMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the sink until the ingest channel closes or shutdown is
    /// requested
    pub async fn run(mut self) -> MetricsSnapshot {
        let mut receiver = self.receiver.take().expect("file sink can only run once");
        let mut commands = self.commands.take().expect("file sink can only run once");

        tracing::info!(path = %self.configured_path, "file sink starting");

        let mut tick = tokio::time::interval(self.batch_timeout);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = receiver.recv() => match msg {
                    Some(msg) => self.write_message(msg),
                    None => break,
                },
                cmd = commands.recv() => match cmd {
                    Some(SinkCommand::Rotate) => self.rotate_all(),
                    Some(SinkCommand::Shutdown) | None => break,
                },
                _ = tick.tick() => self.flush_expired(),
            }
        }

        self.shutdown(receiver).await;

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            messages = snapshot.messages_written,
            bytes = snapshot.bytes_written,
            fallback = snapshot.messages_fallback,
            rotations = snapshot.rotations,
            "file sink stopped"
        );
        snapshot
    }

    /// Route one message to its destination
    fn write_message(&mut self, msg: Message) {
        let state = match self.resolve_destination(msg.stream(), false) {
            Ok(state) => state,
            Err(err) => {
                tracing::error!(stream = %msg.stream(), error = %err, "cannot write message");
                self.metrics.write_error();
                self.metrics.message_fallback();
                self.fallback.try_route(msg);
                return;
            }
        };

        state.append_or_flush(msg, &self.lifecycle, &self.fallback, &self.metrics);
    }

    /// Find or create the destination state for a stream, rotating the
    /// underlying file when the policy demands it
    fn resolve_destination(
        &mut self,
        stream: StreamId,
        force: bool,
    ) -> Result<Arc<DestinationState>, SinkError> {
        if let Some(state) = self.files_by_stream.get(&stream) {
            if !state.needs_rotate(&self.rotation, force) {
                return Ok(Arc::clone(state));
            }
        }

        let stream_name = if stream.is_wildcard() {
            rill_protocol::WILDCARD_STREAM_NAME.to_string()
        } else {
            self.registry.stream_name(stream)
        };
        let (dir, name, ext) = self.template.resolve(&stream_name);
        let base = dir.join(format!("{name}{ext}"));

        let state = match self.files.get(&base) {
            Some(existing) => {
                let existing = Arc::clone(existing);
                if !self.files_by_stream.contains_key(&stream) {
                    // Another stream already opened this destination;
                    // attach and re-check against its writer.
                    self.files_by_stream.insert(stream, Arc::clone(&existing));
                    if !existing.needs_rotate(&self.rotation, force) {
                        return Ok(existing);
                    }
                }
                existing
            }
            None => {
                let state = Arc::new(DestinationState::new(
                    base.clone(),
                    self.batch_max,
                    self.batch_flush,
                ));
                self.files.insert(base.clone(), Arc::clone(&state));
                self.files_by_stream.insert(stream, Arc::clone(&state));
                state
            }
        };

        create_dir_all_with_mode(&dir, self.folder_mode).map_err(|source| SinkError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let file_name = if self.rotation.enabled() {
            self.rotation
                .rotated_file_name(&dir, &name, &ext, Local::now())
        } else {
            format!("{name}{ext}")
        };
        let path = dir.join(&file_name);

        if let Some(old) = state.detach_writer() {
            let old_path = old.name().to_path_buf();
            tracing::info!(from = %old_path.display(), to = %path.display(), "rotating destination");
            self.metrics.rotation();
            // Close in the background; with compression enabled this is
            // where the gzip work happens.
            self.tasks.spawn(async move {
                if let Err(err) = old.close().await {
                    tracing::error!(path = %old_path.display(), error = %err, "failed to close rotated file");
                }
            });
        }

        let writer = DiskWriter::open(&path, self.file_mode, self.overwrite, self.rotation.compress())
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;
        state.install_writer(Box::new(writer));

        if self.rotation.enabled() {
            rotation::update_current_symlink(&dir, &name, &ext, &file_name);
        }

        if self.pruner.is_enabled() {
            let pruner = self.pruner.clone();
            let prune_base = base.clone();
            self.tasks.spawn(async move {
                pruner.prune(&prune_base);
            });
        }

        Ok(state)
    }

    /// Flush every destination whose batch passed a threshold
    fn flush_expired(&mut self) {
        for state in self.files.values() {
            if let Err(err) =
                state.flush_if_expired(self.batch_timeout, &self.fallback, &self.metrics)
            {
                tracing::error!(path = %state.key().display(), error = %err, "timed flush failed");
            }
        }
    }

    /// Force-rotate every known stream
    ///
    /// Per-destination failures are logged; the loop continues so one bad
    /// destination cannot block the rest.
    fn rotate_all(&mut self) {
        let streams: Vec<StreamId> = self.files_by_stream.keys().copied().collect();
        for stream in streams {
            if let Err(err) = self.resolve_destination(stream, true) {
                tracing::error!(stream = %stream, error = %err, "rotation failed");
            }
        }
    }

    /// Stop intake, flush and close every destination, await background
    /// work
    async fn shutdown(&mut self, mut receiver: mpsc::Receiver<Message>) {
        self.lifecycle.set_stopping();

        // Stop accepting and spool whatever is still queued; silent drops
        // are not an option here.
        receiver.close();
        while let Ok(msg) = receiver.try_recv() {
            self.metrics.message_fallback();
            self.fallback.try_route(msg);
        }

        let states: Vec<Arc<DestinationState>> = self.files.values().cloned().collect();
        let fallback = self.fallback.clone();
        let metrics = Arc::clone(&self.metrics);
        let close_all = async {
            for state in &states {
                if let Err(err) = state.close(&fallback, &metrics).await {
                    tracing::error!(path = %state.key().display(), error = %err, "failed to close destination");
                }
            }
        };

        match self.flush_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, close_all).await.is_err() {
                    tracing::warn!(timeout = ?limit, "shutdown flush aborted after timeout");
                }
            }
            None => close_all.await,
        }

        // Compressions and prunes already in flight complete before the
        // sink reports itself stopped.
        while self.tasks.join_next().await.is_some() {}

        self.lifecycle.set_stopped();
    }
}

/// Configured path split into directory, base name and extension, with
/// wildcard substitution
#[derive(Debug, Clone)]
struct PathTemplate {
    dir: String,
    name: String,
    ext: String,
    wildcard: bool,
}

impl PathTemplate {
    fn parse(path: &str) -> Self {
        let as_path = Path::new(path);
        let dir = match as_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.to_string_lossy().into_owned()
            }
            _ => ".".to_string(),
        };
        let file = as_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (name, ext) = match file.rfind('.') {
            Some(dot) if dot > 0 => (file[..dot].to_string(), file[dot..].to_string()),
            _ => (file, String::new()),
        };

        Self {
            dir,
            name,
            ext,
            wildcard: path.contains('*'),
        }
    }

    /// Directory, base name and extension with `*` replaced by the
    /// stream name
    fn resolve(&self, stream_name: &str) -> (PathBuf, String, String) {
        if self.wildcard {
            (
                PathBuf::from(self.dir.replace('*', stream_name)),
                self.name.replace('*', stream_name),
                self.ext.replace('*', stream_name),
            )
        } else {
            (
                PathBuf::from(&self.dir),
                self.name.clone(),
                self.ext.clone(),
            )
        }
    }
}

fn create_dir_all_with_mode(dir: &Path, mode: u32) -> io::Result<()> {
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(dir)
}
