use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::error::{AssetKind, ImportError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImportState {
    Idle,
    Parsing,
    BuildingBuffers,
    BuildingMeshes,
    BuildingMaterialsTextures,
    BuildingNodes,
    BuildingAnimations,
    Complete,
    Failed,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportState::Complete | ImportState::Failed)
    }
}

/// What one import did, for instrumentation and tests.
#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub builds: HashMap<AssetKind, usize>,
    pub decodes: usize,
    /// Requests that wanted a texture in the color space it was not built with.
    pub color_space_conflicts: usize,
    pub stage_timings: Vec<(ImportState, Duration)>,
}

impl ImportStats {
    pub fn builds(&self, kind: AssetKind) -> usize {
        self.builds.get(&kind).copied().unwrap_or(0)
    }

    pub fn time_in(&self, state: ImportState) -> Duration {
        self.stage_timings
            .iter()
            .filter(|(stage, _)| *stage == state)
            .map(|(_, duration)| *duration)
            .sum()
    }
}

struct TrackerState {
    state: ImportState,
    entered: Instant,
    timings: Vec<(ImportState, Duration)>,
}

/// The current stage of an importer, with the time spent in every stage that has been left.
pub(crate) struct StateTracker {
    inner: Mutex<TrackerState>,
    verbose: bool,
}

impl StateTracker {
    pub fn new(verbose: bool) -> Self {
        Self {
            inner: Mutex::new(TrackerState {
                state: ImportState::Idle,
                entered: Instant::now(),
                timings: vec![],
            }),
            verbose,
        }
    }

    pub fn state(&self) -> ImportState {
        self.inner.lock().expect("Import State Lock").state
    }

    pub fn enter(&self, next: ImportState) {
        let mut inner = self.inner.lock().expect("Import State Lock");
        if inner.state == next {
            return;
        }

        let now = Instant::now();
        let left = inner.state;
        let spent = now.saturating_duration_since(inner.entered);
        if left != ImportState::Idle && !left.is_terminal() {
            inner.timings.push((left, spent));
            if self.verbose {
                info!("{:?} took {:?}", left, spent);
            }
        }

        debug!("Import state {:?} -> {:?}", left, next);
        inner.state = next;
        inner.entered = now;
    }

    pub fn timings(&self) -> Vec<(ImportState, Duration)> {
        self.inner.lock().expect("Import State Lock").timings.clone()
    }
}

/// Holding this means holding the importer. Released on every path out of a load, including errors
/// and dropped futures.
pub(crate) struct BusyGuard<'a> {
    flag: &'a Mutex<bool>,
}

impl<'a> BusyGuard<'a> {
    pub fn acquire(flag: &'a Mutex<bool>) -> Result<Self, ImportError> {
        let mut running = flag.lock().expect("Importer Busy Lock");
        if *running {
            return Err(ImportError::Concurrency);
        }
        *running = true;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock().expect("Importer Busy Lock") = false;
    }
}
