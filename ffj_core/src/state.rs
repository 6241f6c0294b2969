//! Durable batch progress.
//!
//! Progress is a single [`StageSnapshot`] naming the furthest stage completed.
//! Because stages complete strictly in pipeline order, the five legacy process
//! flags are derived from it: a flag is set iff its stage is at or before the
//! snapshot stage. That makes "a later flag set while an earlier one is clear"
//! unrepresentable.
//!
//! Snapshots are TOML encoded and carry a version and a monotonically
//! increasing sequence number. Each commit replaces the whole blob through
//! [`NvStore::store`], which is atomic.

use std::fmt;
use std::str::FromStr;

use ffj_traits::NvStore;
use serde::{Deserialize, Serialize};

use crate::error::{FfjError, Result};
use crate::hw_error::map_hw_error;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Ready,
    BananaAdded,
    MolassesAdded,
    Mixed,
    Sealed,
    Fermenting,
}

impl Stage {
    /// Stages with an action, in execution order.
    pub const PIPELINE: [Stage; 5] = [
        Stage::BananaAdded,
        Stage::MolassesAdded,
        Stage::Mixed,
        Stage::Sealed,
        Stage::Fermenting,
    ];

    pub fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::Ready => None,
            Stage::BananaAdded => Some(Stage::Ready),
            Stage::MolassesAdded => Some(Stage::BananaAdded),
            Stage::Mixed => Some(Stage::MolassesAdded),
            Stage::Sealed => Some(Stage::Mixed),
            Stage::Fermenting => Some(Stage::Sealed),
        }
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Ready => Some(Stage::BananaAdded),
            Stage::BananaAdded => Some(Stage::MolassesAdded),
            Stage::MolassesAdded => Some(Stage::Mixed),
            Stage::Mixed => Some(Stage::Sealed),
            Stage::Sealed => Some(Stage::Fermenting),
            Stage::Fermenting => None,
        }
    }

    pub fn flag(self) -> Option<ProcessFlag> {
        match self {
            Stage::Ready => None,
            Stage::BananaAdded => Some(ProcessFlag::BananaAdded),
            Stage::MolassesAdded => Some(ProcessFlag::MolassesAdded),
            Stage::Mixed => Some(ProcessFlag::MixtureMixed),
            Stage::Sealed => Some(ProcessFlag::MixtureSealed),
            Stage::Fermenting => Some(ProcessFlag::Fermenting),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Ready => "ready",
            Stage::BananaAdded => "banana_added",
            Stage::MolassesAdded => "molasses_added",
            Stage::Mixed => "mixed",
            Stage::Sealed => "sealed",
            Stage::Fermenting => "fermenting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = FfjError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        [Stage::Ready]
            .into_iter()
            .chain(Stage::PIPELINE)
            .find(|st| st.name() == norm)
            .ok_or_else(|| FfjError::Config(format!("unknown stage '{s}'")))
    }
}

/// Legacy boolean process markers, one per pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessFlag {
    Fermenting,
    BananaAdded,
    MolassesAdded,
    MixtureMixed,
    MixtureSealed,
}

impl ProcessFlag {
    pub const ALL: [ProcessFlag; 5] = [
        ProcessFlag::Fermenting,
        ProcessFlag::BananaAdded,
        ProcessFlag::MolassesAdded,
        ProcessFlag::MixtureMixed,
        ProcessFlag::MixtureSealed,
    ];

    /// Byte offset in the legacy flag layout.
    pub fn address(self) -> usize {
        match self {
            ProcessFlag::Fermenting => 0,
            ProcessFlag::BananaAdded => 1,
            ProcessFlag::MolassesAdded => 2,
            ProcessFlag::MixtureMixed => 3,
            ProcessFlag::MixtureSealed => 4,
        }
    }

    pub fn stage(self) -> Stage {
        match self {
            ProcessFlag::Fermenting => Stage::Fermenting,
            ProcessFlag::BananaAdded => Stage::BananaAdded,
            ProcessFlag::MolassesAdded => Stage::MolassesAdded,
            ProcessFlag::MixtureMixed => Stage::Mixed,
            ProcessFlag::MixtureSealed => Stage::Sealed,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessFlag::Fermenting => "fermenting",
            ProcessFlag::BananaAdded => "banana_added",
            ProcessFlag::MolassesAdded => "molasses_added",
            ProcessFlag::MixtureMixed => "mixture_mixed",
            ProcessFlag::MixtureSealed => "mixture_sealed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub version: u32,
    pub seq: u64,
    pub stage: Stage,
}

impl Default for StageSnapshot {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            seq: 0,
            stage: Stage::Ready,
        }
    }
}

impl StageSnapshot {
    pub const VERSION: u32 = 1;

    pub fn is_done(&self, stage: Stage) -> bool {
        stage <= self.stage
    }

    pub fn flag(&self, flag: ProcessFlag) -> bool {
        self.is_done(flag.stage())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let text = toml::to_string(self)
            .map_err(|e| FfjError::Persist(format!("encode snapshot: {e}")))?;
        Ok(text.into_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| FfjError::Persist(format!("snapshot is not utf-8: {e}")))?;
        let snap: StageSnapshot = toml::from_str(text)
            .map_err(|e| FfjError::Persist(format!("decode snapshot: {e}")))?;
        if snap.version != Self::VERSION {
            return Err(FfjError::Persist(format!(
                "unsupported snapshot version {} (expected {})",
                snap.version,
                Self::VERSION
            ))
            .into());
        }
        Ok(snap)
    }

    /// Import the legacy byte-per-flag layout (1 = set, anything else clear).
    ///
    /// Flags are read in pipeline order and the walk stops at the first clear
    /// one, so a stray later flag cannot skip a stage.
    pub fn from_legacy_flags(bytes: &[u8]) -> Self {
        let mut stage = Stage::Ready;
        for st in Stage::PIPELINE {
            let Some(flag) = st.flag() else { continue };
            if bytes.get(flag.address()).copied() == Some(1) {
                stage = st;
            } else {
                break;
            }
        }
        Self {
            version: Self::VERSION,
            seq: 0,
            stage,
        }
    }
}

/// Persistent owner of the current snapshot.
pub struct StageStore {
    backend: Box<dyn NvStore>,
    current: StageSnapshot,
}

impl fmt::Debug for StageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageStore")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl StageStore {
    /// Load the last committed snapshot. An empty store starts at `Ready`.
    pub fn open(mut backend: Box<dyn NvStore>) -> Result<Self> {
        let loaded = backend
            .load()
            .map_err(|e| FfjError::Persist(format!("load: {}", map_hw_error(&*e))))?;
        let current = match loaded {
            Some(bytes) => StageSnapshot::decode(&bytes)?,
            None => StageSnapshot::default(),
        };
        tracing::info!(stage = %current.stage, seq = current.seq, "progress loaded");
        Ok(Self { backend, current })
    }

    pub fn snapshot(&self) -> StageSnapshot {
        self.current
    }

    pub fn stage(&self) -> Stage {
        self.current.stage
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.current.is_done(stage)
    }

    pub fn flag(&self, flag: ProcessFlag) -> bool {
        self.current.flag(flag)
    }

    /// Record `stage` as completed. Only the immediate successor of the
    /// current stage is accepted.
    pub fn commit(&mut self, stage: Stage) -> Result<()> {
        if self.current.stage.next() != Some(stage) {
            return Err(FfjError::State(format!(
                "cannot record {stage} after {}",
                self.current.stage
            ))
            .into());
        }
        self.write(stage)
    }

    /// Set or clear one legacy flag, keeping the pipeline consistent.
    ///
    /// Setting requires the preceding stage to be done. Clearing rewinds to
    /// the stage before the flag, which also clears every later flag.
    pub fn set_flag(&mut self, flag: ProcessFlag, value: bool) -> Result<()> {
        let target = flag.stage();
        match (value, self.flag(flag)) {
            (true, true) | (false, false) => Ok(()),
            (true, false) => self.commit(target),
            (false, true) => {
                let back = target.predecessor().unwrap_or(Stage::Ready);
                self.write(back)
            }
        }
    }

    /// Maintenance reset: all flags clear.
    pub fn reset(&mut self) -> Result<()> {
        tracing::warn!(from = %self.current.stage, "progress reset");
        self.write(Stage::Ready)
    }

    fn write(&mut self, stage: Stage) -> Result<()> {
        let next = StageSnapshot {
            version: StageSnapshot::VERSION,
            seq: self.current.seq + 1,
            stage,
        };
        let bytes = next.encode()?;
        self.backend
            .store(&bytes)
            .map_err(|e| FfjError::Persist(format!("store: {}", map_hw_error(&*e))))?;
        self.current = next;
        tracing::info!(stage = %stage, seq = next.seq, "progress committed");
        Ok(())
    }
}
