//! Reset pulse generator

use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::hal::{GpioProvider, Level, LineId};
use crate::variant::ResetTiming;

/// Drive high, low, high on the reset line
///
/// The line must already be an output. Each hold is a thread sleep of at
/// least the configured time. `settle` only applies to variants with a
/// caller-supplied final hold. Returns the final hold that was used.
///
/// All three phases and holds run even when a level change fails, so the
/// line is not left parked low. The first failure is returned afterwards.
pub fn pulse_reset(
    gpio: &dyn GpioProvider,
    line: LineId,
    timing: &ResetTiming,
    settle: Option<Duration>,
) -> Result<Duration> {
    let settle = timing.settle_for(settle);

    let phases = [
        (Level::High, timing.high1),
        (Level::Low, timing.low),
        (Level::High, settle),
    ];
    let mut first_err = None;
    for (level, duration) in phases {
        if let Err(e) = gpio.set_level(line, level) {
            log::warn!("reset line {}: drive {:?} failed: {}", line, level, e);
            first_err.get_or_insert(e);
        }
        hold(duration);
    }
    if let Some(e) = first_err {
        return Err(e);
    }

    log::debug!(
        "reset line {}: pulse {:?}/{:?}/{:?}",
        line,
        timing.high1,
        timing.low,
        settle
    );
    Ok(settle)
}

fn hold(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::variant::Settle;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct Scope {
        edges: Mutex<Vec<(Level, Instant)>>,
        /// Level whose drive fails
        fail_on: Option<Level>,
    }

    impl GpioProvider for Scope {
        fn request(&self, _line: LineId, _label: &str) -> Result<()> {
            Ok(())
        }
        fn free(&self, _line: LineId) {}
        fn direction_output(&self, _line: LineId, _level: Level) -> Result<()> {
            Ok(())
        }
        fn direction_input(&self, _line: LineId) -> Result<()> {
            Ok(())
        }
        fn set_level(&self, line: LineId, level: Level) -> Result<()> {
            if line == 99 || self.fail_on == Some(level) {
                return Err(Error::LineFailed {
                    line,
                    op: "set",
                    reason: "gone".into(),
                });
            }
            self.edges.lock().unwrap().push((level, Instant::now()));
            Ok(())
        }
        fn level(&self, _line: LineId) -> Result<Level> {
            Ok(Level::High)
        }
    }

    #[test]
    fn test_pulse_shape_and_holds() {
        let scope = Scope::default();
        let timing = ResetTiming {
            high1: Duration::from_millis(2),
            low: Duration::from_millis(5),
            settle: Settle::Fixed(Duration::from_millis(3)),
        };
        let start = Instant::now();
        let settle = pulse_reset(&scope, 12, &timing, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(settle, Duration::from_millis(3));
        assert!(start.elapsed() >= Duration::from_millis(10));

        let edges = scope.edges.lock().unwrap();
        let levels: Vec<Level> = edges.iter().map(|(l, _)| *l).collect();
        assert_eq!(levels, vec![Level::High, Level::Low, Level::High]);
        assert!(edges[1].1 - edges[0].1 >= timing.high1);
        assert!(edges[2].1 - edges[1].1 >= timing.low);
    }

    #[test]
    fn test_caller_settle() {
        let scope = Scope::default();
        let timing = ResetTiming {
            high1: Duration::ZERO,
            low: Duration::from_millis(1),
            settle: Settle::Caller {
                default: Duration::from_millis(3),
            },
        };
        assert_eq!(
            pulse_reset(&scope, 5, &timing, Some(Duration::from_millis(7))).unwrap(),
            Duration::from_millis(7)
        );
        assert_eq!(
            pulse_reset(&scope, 5, &timing, None).unwrap(),
            Duration::from_millis(3)
        );
    }

    #[test]
    fn test_line_failure_propagates() {
        let timing = ResetTiming {
            high1: Duration::ZERO,
            low: Duration::ZERO,
            settle: Settle::Fixed(Duration::ZERO),
        };
        assert!(pulse_reset(&Scope::default(), 99, &timing, None).is_err());
    }

    #[test]
    fn test_failed_phase_does_not_stop_pulse() {
        let scope = Scope {
            fail_on: Some(Level::Low),
            ..Scope::default()
        };
        let timing = ResetTiming {
            high1: Duration::from_millis(1),
            low: Duration::from_millis(4),
            settle: Settle::Fixed(Duration::from_millis(2)),
        };
        let start = Instant::now();
        let err = pulse_reset(&scope, 12, &timing, None).unwrap_err();
        assert!(matches!(err, Error::LineFailed { line: 12, .. }));
        assert!(start.elapsed() >= Duration::from_millis(7));

        let levels: Vec<Level> = scope.edges.lock().unwrap().iter().map(|(l, _)| *l).collect();
        assert_eq!(levels, vec![Level::High, Level::High]);
    }
}
