// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-run context threaded through the orchestrator: run log, progress sink,
// and the shutdown flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::progress::{BatchProgress, NoopProgress};
use crate::runlog::RunLog;

/// Shared shutdown request. Once set, no new task is submitted; tasks already
/// running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct RunContext {
    pub run_id: String,
    pub log: RunLog,
    pub progress: Arc<dyn BatchProgress>,
    pub cancel: CancelFlag,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, log: RunLog) -> Self {
        Self {
            run_id: run_id.into(),
            log,
            progress: Arc::new(NoopProgress),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn BatchProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}
