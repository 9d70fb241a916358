//! Information about the current operation
//! that may be used by the controller's appendages.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

/// Operation context for one controller run
#[derive(Serialize, Deserialize, Clone, Debug)]
#[non_exhaustive]
pub struct OpCtx {
    /// Control tick period in milliseconds
    pub tick_ms: u64,

    /// A name for this op, used as the name of its log file
    /// and must be compatible with that use.
    pub op_name: String,

    /// A directory to place outputs.
    pub op_dir: PathBuf,

    /// Tick count after which the run stops even if tasks are still going
    pub max_ticks: Option<u64>,
}

impl OpCtx {
    pub fn new(tick_ms: u64) -> Self {
        Self {
            tick_ms,
            ..Self::default()
        }
    }

    pub fn with_op_name(mut self, op_name: &str) -> Self {
        self.op_name = op_name.to_owned();
        self
    }

    pub fn with_op_dir(mut self, op_dir: PathBuf) -> Self {
        self.op_dir = op_dir;
        self
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }
}

impl Default for OpCtx {
    fn default() -> Self {
        // Use current time with seconds as op name and use working directory as op dir,
        // replacing characters in the name that would be invalid on Windows.
        let op_name = DateTime::<Utc>::from(SystemTime::now())
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            .replace(":", "");
        Self {
            tick_ms: 10,
            op_name,
            op_dir: std::fs::canonicalize("./").unwrap_or_default(),
            max_ticks: None,
        }
    }
}
