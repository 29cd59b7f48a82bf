//! Per-stage outcome reported by every pipeline stage.
//!
//! Stages never return `Err` to the orchestrator. Every fault is folded into
//! one of three outcomes so the orchestrator can decide the final status from
//! the set of outcomes alone.

use serde::{Deserialize, Serialize};

/// Coarse classification of a [`StageOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Ok,
    Partial,
    Failed,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    /// Full success.
    Ok(T),
    /// A usable value with degraded parts, each described by a warning.
    Partial(T, Vec<String>),
    /// No usable value; carries the reason.
    Failed(String),
}

impl<T> StageOutcome<T> {
    /// Fold any error into `Failed`.
    pub fn from_result<E: std::fmt::Display>(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Ok(_) => OutcomeKind::Ok,
            Self::Partial(..) => OutcomeKind::Partial,
            Self::Failed(_) => OutcomeKind::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(v) | Self::Partial(v, _) => Some(v),
            Self::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ok(v) | Self::Partial(v, _) => Some(v),
            Self::Failed(_) => None,
        }
    }

    /// Failure reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Failed(r) => Some(r),
            _ => None,
        }
    }

    /// Warnings attached to a partial outcome.
    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Partial(_, w) => w,
            _ => &[],
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StageOutcome<U> {
        match self {
            Self::Ok(v) => StageOutcome::Ok(f(v)),
            Self::Partial(v, w) => StageOutcome::Partial(f(v), w),
            Self::Failed(r) => StageOutcome::Failed(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result() {
        let ok: StageOutcome<u8> = StageOutcome::from_result(Ok::<u8, String>(3));
        assert_eq!(ok, StageOutcome::Ok(3));

        let failed: StageOutcome<u8> =
            StageOutcome::from_result(Err::<u8, _>(crate::Error::Vision("denied".into())));
        assert_eq!(failed.reason(), Some("Vision error: denied"));
        assert!(failed.is_failed());
    }

    #[test]
    fn test_partial_keeps_value_and_warnings() {
        let outcome = StageOutcome::Partial(vec!["Bottle"], vec!["translation failed".into()]);
        assert_eq!(outcome.kind(), OutcomeKind::Partial);
        assert_eq!(outcome.value(), Some(&vec!["Bottle"]));
        assert_eq!(outcome.warnings().len(), 1);
        assert_eq!(outcome.into_value(), Some(vec!["Bottle"]));
    }

    #[test]
    fn test_map_preserves_kind() {
        let mapped = StageOutcome::Partial(2, vec!["w".into()]).map(|v| v * 10);
        assert_eq!(mapped, StageOutcome::Partial(20, vec!["w".into()]));

        let failed: StageOutcome<i32> = StageOutcome::Failed("boom".into());
        assert_eq!(failed.map(|v| v + 1).reason(), Some("boom"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(OutcomeKind::Ok.to_string(), "ok");
        assert_eq!(OutcomeKind::Partial.to_string(), "partial");
        assert_eq!(OutcomeKind::Failed.to_string(), "failed");
    }
}
