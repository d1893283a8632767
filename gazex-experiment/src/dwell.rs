use std::time::Duration;

/// Continuous-gaze timer for one calibration target.
///
/// The first on-target frame starts the timer; completion is checked on the
/// frames after it. Any off-target frame before completion resets it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dwell {
    required: Duration,
    since: Option<Duration>,
    done: bool,
}

impl Dwell {
    pub fn new(required: Duration) -> Self {
        Self {
            required,
            since: None,
            done: false,
        }
    }

    /// Feeds one frame. Returns true on the single frame the dwell completes.
    pub fn observe(&mut self, on_target: bool, now: Duration) -> bool {
        if self.done {
            return false;
        }
        if !on_target {
            self.since = None;
            return false;
        }
        match self.since {
            None => {
                self.since = Some(now);
                false
            }
            Some(start) if now.saturating_sub(start) >= self.required => {
                self.done = true;
                true
            }
            Some(_) => false,
        }
    }

    pub fn reset(&mut self) {
        self.since = None;
        self.done = false;
    }

    /// Whether the subject is currently holding the target
    pub fn is_running(&self) -> bool {
        self.since.is_some() && !self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn since(&self) -> Option<Duration> {
        self.since
    }

    pub fn required(&self) -> Duration {
        self.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn completes_after_continuous_hold() {
        let mut dwell = Dwell::new(ms(1000));
        assert!(!dwell.observe(true, ms(100)));
        assert!(dwell.is_running());
        assert!(!dwell.observe(true, ms(1099)));
        assert!(dwell.observe(true, ms(1100)));
        assert!(dwell.is_done());
        assert!(!dwell.observe(true, ms(1200)));
    }

    #[test]
    fn single_look_away_restarts_the_timer() {
        let mut dwell = Dwell::new(ms(1000));
        dwell.observe(true, ms(0));
        dwell.observe(true, ms(900));
        dwell.observe(false, ms(950));
        assert_eq!(dwell.since(), None);
        assert!(!dwell.observe(true, ms(1000)));
        assert!(!dwell.observe(true, ms(1999)));
        assert!(dwell.observe(true, ms(2000)));
    }

    #[test]
    fn first_frame_never_completes_even_with_zero_dwell() {
        let mut dwell = Dwell::new(Duration::ZERO);
        assert!(!dwell.observe(true, ms(5)));
        assert!(dwell.observe(true, ms(5)));
    }

    #[test]
    fn completion_survives_look_away_until_reset() {
        let mut dwell = Dwell::new(ms(10));
        dwell.observe(true, ms(0));
        dwell.observe(true, ms(10));
        dwell.observe(false, ms(20));
        assert!(dwell.is_done());
        dwell.reset();
        assert!(!dwell.is_done());
        assert!(!dwell.is_running());
    }
}
