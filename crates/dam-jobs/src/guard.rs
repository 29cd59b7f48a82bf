//! Containment for calls into external collaborators.
//!
//! A stage call may return an error, overrun its deadline or panic. All three
//! are reduced to a reason string here so stages can fold them into
//! `StageOutcome::Failed` without any of them reaching the orchestrator.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use dam_core::Result;

/// Run `fut` with an optional deadline, catching panics.
pub(crate) async fn contained<T, F>(
    what: &str,
    deadline: Option<Duration>,
    fut: F,
) -> std::result::Result<T, String>
where
    F: Future<Output = Result<T>>,
{
    let caught = AssertUnwindSafe(fut).catch_unwind();
    let joined = match deadline {
        Some(limit) => match tokio::time::timeout(limit, caught).await {
            Ok(joined) => joined,
            Err(_) => return Err(format!("{} timed out after {}s", what, limit.as_secs())),
        },
        None => caught.await,
    };
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("{} panicked: {}", what, panic_message(&*payload))),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_core::Error;

    fn out_of_order() -> bool {
        true
    }

    #[tokio::test]
    async fn test_passes_value_through() {
        let out = contained("call", None, async { Ok::<_, Error>(7) }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn test_error_becomes_reason() {
        let out: std::result::Result<u8, String> =
            contained("call", None, async { Err::<u8, _>(Error::Vision("denied".into())) }).await;
        assert_eq!(out, Err("Vision error: denied".to_string()));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let out = contained("label detection", None, async {
            if out_of_order() {
                panic!("boom");
            }
            Ok::<u8, Error>(0)
        })
        .await;
        assert_eq!(out, Err("label detection panicked: boom".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let out: std::result::Result<u8, String> =
            contained("translation", Some(Duration::from_secs(30)), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<u8, Error>(1)
            })
            .await;
        assert_eq!(out, Err("translation timed out after 30s".to_string()));
    }
}
