//! Watch-mode invalidation.
//!
//! The session does not own a filesystem watcher; the host feeds it change
//! notifications and it decides what to recompile. Invalidation is shallow:
//! an updated styling module recompiles alone, an updated helper recompiles
//! its direct styling dependents. Transitive dependents recompile when their
//! own imports change on disk, which for styling graphs (flat by convention)
//! covers the practical cases without walking the full graph.
//!
//! A deleted module's artifacts and dependents are left untouched; dependent
//! modules will fail with an unresolved import on their next recompilation,
//! which is the diagnostic the author needs anyway.

use crate::error::Result;
use crate::vex::{write_artifacts, BuildEvent, Vex};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Bounded event queue. When the consumer falls behind, the oldest events are
/// dropped and counted rather than blocking the watch loop.
#[derive(Debug)]
pub struct EventBuffer {
    capacity: usize,
    events: VecDeque<BuildEvent>,
    dropped: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: BuildEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<BuildEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// A long-running incremental compilation session driven by filesystem
/// change notifications.
pub struct WatchSession {
    vex: Vex,
    buffer: EventBuffer,
    cancelled: Arc<AtomicBool>,
}

impl WatchSession {
    pub fn new(vex: Vex, event_capacity: usize) -> Self {
        Self {
            vex,
            buffer: EventBuffer::new(event_capacity),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag the host's watcher thread can flip to stop the session.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn drain_events(&mut self) -> Vec<BuildEvent> {
        self.buffer.drain()
    }

    pub fn into_inner(self) -> Vex {
        self.vex
    }

    /// Apply one filesystem change. Returns the styling modules that were
    /// recompiled. Compilation failures become `FileError` events; the
    /// session itself never halts on them.
    pub fn handle_change(&mut self, path: &Path, kind: ChangeKind) -> Result<Vec<PathBuf>> {
        if self.is_cancelled() {
            return Ok(Vec::new());
        }
        tracing::debug!(path = %path.display(), ?kind, "watch change");

        let targets = match kind {
            ChangeKind::Created => {
                self.vex.add_source(path)?;
                self.styling_targets(path)
            }
            ChangeKind::Updated => {
                self.vex.cache_mut().invalidate(path);
                self.vex.registry_mut().refresh(path)?;
                self.styling_targets(path)
            }
            ChangeKind::Deleted => {
                self.vex.cache_mut().invalidate(path);
                self.vex.registry_mut().remove(path);
                Vec::new()
            }
        };

        let mut recompiled = Vec::with_capacity(targets.len());
        for target in targets {
            if self.recompile(&target) {
                recompiled.push(target);
            }
        }
        Ok(recompiled)
    }

    /// A changed styling module recompiles alone; a changed helper recompiles
    /// its direct styling dependents.
    fn styling_targets(&self, path: &Path) -> Vec<PathBuf> {
        let is_styling = self
            .vex
            .registry()
            .get(path)
            .is_some_and(|f| f.is_styling);
        if is_styling {
            return vec![path.to_path_buf()];
        }
        self.vex
            .registry()
            .dependents(path)
            .into_iter()
            .filter(|dependent| {
                self.vex
                    .registry()
                    .get(dependent)
                    .is_some_and(|f| f.is_styling)
            })
            .collect()
    }

    fn recompile(&mut self, path: &Path) -> bool {
        let started = Instant::now();
        self.buffer.push(BuildEvent::FileStart {
            path: path.to_path_buf(),
        });
        match self.vex.compile_module(path).and_then(|result| {
            write_artifacts(&result)?;
            Ok(result)
        }) {
            Ok(result) => {
                self.buffer.push(BuildEvent::FileComplete {
                    path: path.to_path_buf(),
                    artifacts: result.artifacts().count(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "recompilation failed");
                self.buffer.push(BuildEvent::FileError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
                false
            }
        }
    }
}
