// src/parameter.rs

/// A parameter that moves to new targets along linear ramps.
///
/// Ramps are counted in frames and advanced one sample at a time on the
/// audio thread. Setting a new target mid-ramp starts the next ramp from
/// the current value, so there is never a discontinuity.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl SmoothedParam {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Jump straight to `value`.
    #[inline]
    pub fn set(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Ramp linearly to `value` over `frames` samples.
    #[inline]
    pub fn ramp_to(&mut self, value: f32, frames: u32) {
        if frames == 0 {
            self.set(value);
            return;
        }
        self.target = value;
        self.step = (value - self.current) / frames as f32;
        self.remaining = frames;
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_reaches_target_exactly() {
        let mut p = SmoothedParam::new(0.0);
        p.ramp_to(1.0, 4);
        let values: Vec<f32> = (0..4).map(|_| p.next()).collect();
        assert_eq!(values, vec![0.25, 0.5, 0.75, 1.0]);
        assert!(!p.is_ramping());
        assert_eq!(p.next(), 1.0);
    }

    #[test]
    fn test_retarget_mid_ramp_is_continuous() {
        let mut p = SmoothedParam::new(0.0);
        p.ramp_to(1.0, 10);
        for _ in 0..5 {
            p.next();
        }
        let before = p.value();
        p.ramp_to(0.0, 10);
        let after = p.next();
        assert!((before - after).abs() <= 0.06);
    }

    #[test]
    fn test_zero_frame_ramp_snaps() {
        let mut p = SmoothedParam::new(0.3);
        p.ramp_to(0.9, 0);
        assert_eq!(p.value(), 0.9);
    }
}
