use common::{Error, Result, SlopeDirection, SlopeReading};

/// Snapshot of the detector after a successful update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeState {
    /// Latest indicator value.
    pub alma: f64,
    /// Fractional change over the lookback, e.g. 0.001 = +0.1%.
    pub slope: f64,
    /// Slope from the previous successful update (0.0 before the first).
    pub previous_slope: f64,
    pub direction: SlopeDirection,
    /// Sticky flag: set when a flip is detected, cleared by an agreeing
    /// non-flat reading or by `acknowledge_flip`.
    pub direction_changed: bool,
    /// True only when this particular update detected the flip.
    pub flipped: bool,
    /// Flips detected so far, including this one.
    pub flip_seq: u64,
}

impl SlopeState {
    pub fn reading(&self) -> SlopeReading {
        SlopeReading {
            alma: self.alma,
            slope: self.slope,
            direction: self.direction,
            direction_changed: self.direction_changed,
            flip_seq: self.flip_seq,
        }
    }
}

/// Tracks the percentage slope of an indicator series and detects flips
/// between positive and negative.
#[derive(Debug, Clone)]
pub struct SlopeDetector {
    pub lookback: usize,
    state: Option<SlopeState>,
    last_non_flat: Option<SlopeDirection>,
    flip_seq: u64,
}

impl SlopeDetector {
    pub fn new(lookback: usize) -> Self {
        assert!(lookback >= 1, "slope lookback must be >= 1");
        Self {
            lookback,
            state: None,
            last_non_flat: None,
            flip_seq: 0,
        }
    }

    pub fn state(&self) -> Option<&SlopeState> {
        self.state.as_ref()
    }

    /// Update from a full indicator series (oldest first, NaN = undefined).
    ///
    /// On `InsufficientData` or `DivisionByZero` the stored state is left
    /// untouched.
    pub fn update(&mut self, series: &[f64]) -> Result<SlopeState> {
        let need = self.lookback + 1;
        let defined = series.iter().filter(|v| !v.is_nan()).count();
        if series.len() < need {
            return Err(Error::InsufficientData { have: defined, need });
        }

        let latest = series[series.len() - 1];
        let reference = series[series.len() - 1 - self.lookback];
        if latest.is_nan() || reference.is_nan() {
            return Err(Error::InsufficientData { have: defined, need });
        }
        if reference == 0.0 {
            return Err(Error::DivisionByZero);
        }

        let slope = (latest - reference) / reference;
        let direction = SlopeDirection::of(slope);

        let (previous_slope, mut direction_changed) = match &self.state {
            Some(s) => (s.slope, s.direction_changed),
            None => (0.0, false),
        };

        let mut flipped = false;
        if !direction.is_flat() {
            if let Some(prev) = self.last_non_flat {
                flipped = prev != direction;
                direction_changed = flipped;
            }
            self.last_non_flat = Some(direction);
        }
        if flipped {
            self.flip_seq += 1;
        }

        let state = SlopeState {
            alma: latest,
            slope,
            previous_slope,
            direction,
            direction_changed,
            flipped,
            flip_seq: self.flip_seq,
        };
        self.state = Some(state);
        Ok(state)
    }

    /// Clear the sticky direction-changed flag once orders have acted on
    /// it. `flip_seq` must come from the reading the orders were based on;
    /// a flip detected since then stays flagged. Returns whether the flag
    /// was cleared.
    pub fn acknowledge_flip(&mut self, flip_seq: u64) -> bool {
        match self.state.as_mut() {
            Some(state) if state.flip_seq == flip_seq && state.direction_changed => {
                state.direction_changed = false;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_when_series_too_short() {
        let mut det = SlopeDetector::new(2);
        let err = det.update(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { need: 3, .. }));
        assert!(det.state().is_none());
    }

    #[test]
    fn insufficient_when_reference_undefined() {
        let mut det = SlopeDetector::new(2);
        let err = det.update(&[f64::NAN, 1.0, 2.0]).unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn division_by_zero_leaves_state_untouched() {
        let mut det = SlopeDetector::new(1);
        let first = det.update(&[1.0, 2.0]).unwrap();
        let err = det.update(&[0.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::DivisionByZero));
        assert!(err.is_insufficient_data());
        assert_eq!(det.state(), Some(&first));
    }

    #[test]
    fn percentage_slope() {
        let mut det = SlopeDetector::new(2);
        let s = det.update(&[100.0, 101.0, 102.0]).unwrap();
        assert!((s.slope - 0.02).abs() < 1e-12);
        assert_eq!(s.direction, SlopeDirection::Positive);
        assert_eq!(s.alma, 102.0);
    }

    #[test]
    fn zero_slope_is_flat() {
        let mut det = SlopeDetector::new(1);
        let s = det.update(&[5.0, 5.0]).unwrap();
        assert_eq!(s.direction, SlopeDirection::Flat);
        assert!(!s.direction_changed);
    }

    #[test]
    fn flip_flagged_on_sign_change() {
        let mut det = SlopeDetector::new(1);
        assert!(!det.update(&[1.0, 2.0]).unwrap().flipped);
        let s = det.update(&[2.0, 1.0]).unwrap();
        assert!(s.flipped);
        assert!(s.direction_changed);
        assert_eq!(s.previous_slope, 1.0);
    }

    #[test]
    fn agreeing_reading_clears_flag() {
        let mut det = SlopeDetector::new(1);
        det.update(&[1.0, 2.0]).unwrap();
        det.update(&[2.0, 1.0]).unwrap();
        let s = det.update(&[2.0, 1.0]).unwrap();
        assert!(!s.direction_changed);
    }

    #[test]
    fn flat_between_signs_flags_exactly_one_flip() {
        // directions: +, +, 0, -
        let mut det = SlopeDetector::new(1);
        let inputs: [&[f64]; 4] = [&[1.0, 2.0], &[1.0, 3.0], &[2.0, 2.0], &[3.0, 2.0]];
        let flips: Vec<bool> = inputs
            .iter()
            .map(|s| det.update(s).unwrap().flipped)
            .collect();
        assert_eq!(flips, vec![false, false, false, true]);
        assert_eq!(flips.iter().filter(|f| **f).count(), 1);
    }

    #[test]
    fn flat_reading_keeps_pending_flag_but_overwrites_previous_value() {
        let mut det = SlopeDetector::new(1);
        det.update(&[1.0, 2.0]).unwrap();
        det.update(&[2.0, 1.0]).unwrap();
        let s = det.update(&[4.0, 4.0]).unwrap();
        assert_eq!(s.direction, SlopeDirection::Flat);
        assert!(s.direction_changed);
        assert!(!s.flipped);
        assert!((s.previous_slope + 0.5).abs() < 1e-12);
        let next = det.update(&[4.0, 4.0]).unwrap();
        assert_eq!(next.previous_slope, 0.0);
    }

    #[test]
    fn acknowledge_clears_flag() {
        let mut det = SlopeDetector::new(1);
        det.update(&[1.0, 2.0]).unwrap();
        let s = det.update(&[2.0, 1.0]).unwrap();
        assert_eq!(s.flip_seq, 1);
        assert!(det.acknowledge_flip(s.flip_seq));
        assert!(!det.state().unwrap().direction_changed);
    }

    #[test]
    fn stale_acknowledge_keeps_newer_flip() {
        let mut det = SlopeDetector::new(1);
        let before = det.update(&[1.0, 2.0]).unwrap();
        assert_eq!(before.flip_seq, 0);

        // A flip lands after `before` was read
        let flip = det.update(&[2.0, 1.0]).unwrap();
        assert_eq!(flip.flip_seq, 1);

        assert!(!det.acknowledge_flip(before.flip_seq));
        assert!(det.state().unwrap().direction_changed);
    }
}
