//! The two-attempt policy for clone and fetch.

use confmirror_core::{MirrorError, Result};
use tracing::{info, warn};

use crate::transport::{Attempt, AttemptPlan, Route};

/// Both attempts of an operation failed (or the fallback was not possible).
#[derive(Debug)]
pub struct AttemptsExhausted {
    /// Why the primary attempt failed.
    pub primary: MirrorError,
    /// Why the fallback failed; `None` when it was not tried.
    pub fallback: Option<MirrorError>,
}

impl AttemptsExhausted {
    /// The error reported to the caller: the fallback's if it ran, else the
    /// primary's.
    pub fn into_error(self) -> MirrorError {
        self.fallback.unwrap_or(self.primary)
    }
}

/// Errors that another route cannot fix.
fn is_final(err: &MirrorError) -> bool {
    matches!(
        err,
        MirrorError::Cancelled
            | MirrorError::Filesystem { .. }
            | MirrorError::InvalidProfile(_)
            | MirrorError::Engine(_)
    )
}

/// Runs `run` on the primary route and, if it fails, once on the fallback.
///
/// Returns the attempt that succeeded.
pub fn run_attempts<F>(
    operation: &str,
    plan: &AttemptPlan,
    mut run: F,
) -> std::result::Result<Attempt, AttemptsExhausted>
where
    F: FnMut(Attempt, Route) -> Result<()>,
{
    info!("{}: primary attempt via {}", operation, plan.primary);
    let primary = match run(Attempt::Primary, plan.primary) {
        Ok(()) => return Ok(Attempt::Primary),
        Err(e) => e,
    };

    let fallback = match plan.fallback {
        Some(route) if !is_final(&primary) => route,
        _ => {
            warn!("{}: primary attempt failed, no fallback: {}", operation, primary);
            return Err(AttemptsExhausted {
                primary,
                fallback: None,
            });
        },
    };

    warn!(
        "{}: primary attempt failed ({}), retrying via {}",
        operation, primary, fallback
    );

    match run(Attempt::Fallback, fallback) {
        Ok(()) => {
            info!("{}: fallback attempt succeeded", operation);
            Ok(Attempt::Fallback)
        },
        Err(e) => {
            warn!("{}: fallback attempt failed: {}", operation, e);
            Err(AttemptsExhausted {
                primary,
                fallback: Some(e),
            })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialMode;

    fn plan(fallback: bool) -> AttemptPlan {
        AttemptPlan {
            primary: Route::Native(CredentialMode::Default),
            fallback: fallback.then_some(Route::Native(CredentialMode::Explicit)),
        }
    }

    #[test]
    fn test_primary_success_skips_fallback() {
        let mut calls = Vec::new();
        let outcome = run_attempts("fetch", &plan(true), |attempt, _| {
            calls.push(attempt);
            Ok(())
        });

        assert_eq!(outcome.unwrap(), Attempt::Primary);
        assert_eq!(calls, vec![Attempt::Primary]);
    }

    #[test]
    fn test_fallback_runs_with_its_own_route() {
        let mut routes = Vec::new();
        let outcome = run_attempts("fetch", &plan(true), |attempt, route| {
            routes.push(route);
            match attempt {
                Attempt::Primary => Err(MirrorError::Unauthorized("default".into())),
                Attempt::Fallback => Ok(()),
            }
        });

        assert_eq!(outcome.unwrap(), Attempt::Fallback);
        assert_eq!(
            routes,
            vec![
                Route::Native(CredentialMode::Default),
                Route::Native(CredentialMode::Explicit)
            ]
        );
    }

    #[test]
    fn test_both_failures_are_kept() {
        let outcome = run_attempts("clone", &plan(true), |attempt, _| match attempt {
            Attempt::Primary => Err(MirrorError::network("tls handshake")),
            Attempt::Fallback => Err(MirrorError::Forbidden("svc".into())),
        });

        let exhausted = outcome.unwrap_err();
        assert!(matches!(exhausted.primary, MirrorError::Network(_)));
        assert!(matches!(exhausted.fallback, Some(MirrorError::Forbidden(_))));
        assert!(matches!(exhausted.into_error(), MirrorError::Forbidden(_)));
    }

    #[test]
    fn test_cancellation_is_not_retried() {
        let mut calls = 0;
        let outcome = run_attempts("clone", &plan(true), |_, _| {
            calls += 1;
            Err(MirrorError::Cancelled)
        });

        assert_eq!(calls, 1);
        assert!(matches!(outcome.unwrap_err().into_error(), MirrorError::Cancelled));
    }

    #[test]
    fn test_local_state_failure_is_not_retried() {
        let mut calls = 0;
        let outcome = run_attempts("fetch", &plan(true), |_, _| {
            calls += 1;
            Err(MirrorError::engine("object is not a committish"))
        });

        assert_eq!(calls, 1);
        assert!(matches!(outcome.unwrap_err().into_error(), MirrorError::Engine(_)));
    }

    #[test]
    fn test_no_fallback_in_plan() {
        let outcome = run_attempts("fetch", &plan(false), |_, _| {
            Err(MirrorError::network("refused"))
        });

        let exhausted = outcome.unwrap_err();
        assert!(exhausted.fallback.is_none());
        assert!(matches!(exhausted.into_error(), MirrorError::Network(_)));
    }
}
