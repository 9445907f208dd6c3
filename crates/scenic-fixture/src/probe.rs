//! Bounded readiness probing.

use std::thread;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::ReadinessPolicy;
use crate::error::FixtureError;

/// Call `probe` until it succeeds or the policy's timeout elapses.
///
/// Returns the number of attempts made. The probe is always attempted at
/// least once, even with a zero timeout.
///
/// # Errors
///
/// Returns [`FixtureError::ReadinessTimeout`] carrying the last probe error
/// when the component never became ready.
pub fn wait_until_ready(
    policy: &ReadinessPolicy,
    component: &str,
    mut probe: impl FnMut() -> Result<(), String>,
) -> Result<u32, FixtureError> {
    let started = Instant::now();
    let mut attempts = 0_u32;
    loop {
        attempts = attempts.saturating_add(1);
        let last_error = match probe() {
            Ok(()) => {
                info!(component, attempts, elapsed = ?started.elapsed(), "component ready");
                return Ok(attempts);
            }
            Err(error) => error,
        };
        let elapsed = started.elapsed();
        let Some(remaining) = policy.timeout.checked_sub(elapsed).filter(|left| !left.is_zero())
        else {
            return Err(FixtureError::ReadinessTimeout {
                component: component.to_owned(),
                timeout: policy.timeout,
                attempts,
                last_error,
            });
        };
        debug!(component, attempts, error = %last_error, "component not ready yet");
        thread::sleep(policy.interval.min(remaining));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn policy(timeout_ms: u64) -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = wait_until_ready(&policy(1_000), "database", || {
            calls += 1;
            if calls < 3 {
                Err("connection refused".to_owned())
            } else {
                Ok(())
            }
        });
        assert_eq!(result.ok(), Some(3));
    }

    #[test]
    fn times_out_with_last_error() {
        let result = wait_until_ready(&policy(30), "database", || Err("still booting".to_owned()));
        let Err(FixtureError::ReadinessTimeout {
            component,
            attempts,
            last_error,
            ..
        }) = result
        else {
            panic!("probe should time out");
        };
        assert_eq!(component, "database");
        assert!(attempts >= 1);
        assert_eq!(last_error, "still booting");
    }

    #[test]
    fn zero_timeout_still_probes_once() {
        let mut calls = 0;
        let result = wait_until_ready(&policy(0), "application", || {
            calls += 1;
            Err("down".to_owned())
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
