use serde::{Deserialize, Serialize};

use crate::client::StatusColor;

/// Build verdict, ordered from least to most severe.
///
/// `Aborted` is only produced by cancelling a run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Success,
    Unstable,
    Failure,
    Aborted,
}

impl Verdict {
    /// Fold `other` into `self`, never lowering it.
    pub fn raise(&mut self, other: Verdict) {
        *self = combine(*self, other);
    }

    /// Process exit code for the CLI. 2 is reserved for setup errors.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Unstable => 3,
            Self::Aborted => 4,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Unstable => write!(f, "UNSTABLE"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// The more severe of two verdicts.
pub fn combine(a: Verdict, b: Verdict) -> Verdict {
    a.max(b)
}

/// Verdict for a scan that ended normally, from its status color.
pub fn judge_color(color: &StatusColor, unstable_preferred: bool) -> Verdict {
    match color {
        StatusColor::Green => Verdict::Success,
        StatusColor::Grey => Verdict::Unstable,
        StatusColor::Other(_) if unstable_preferred => Verdict::Unstable,
        StatusColor::Other(_) => Verdict::Failure,
    }
}
