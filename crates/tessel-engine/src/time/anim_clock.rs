/// Shortest hold any frame is given, in milliseconds.
///
/// Zero, negative and NaN holds are raised to this so a playing clock always
/// terminates its catch-up loop.
pub const MIN_HOLD_MS: f64 = 1.0;

/// Converts a hold duration in seconds to clamped milliseconds.
#[inline]
pub fn hold_ms(secs: f64) -> f64 {
    // `f64::max` ignores NaN operands.
    (secs * 1000.0).max(MIN_HOLD_MS)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

/// Drift-free frame advance driven by elapsed milliseconds.
///
/// The remainder of each hold carries over into the next frame, and a single
/// large tick walks through as many frames as it covers.
#[derive(Debug, Clone, Default)]
pub struct AnimationClock {
    state: PlaybackState,
    timer_ms: f64,
}

impl AnimationClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Milliseconds accumulated into the current frame's hold.
    #[inline]
    pub fn timer_ms(&self) -> f64 {
        self.timer_ms
    }

    /// Starts playback from a zeroed timer.
    pub fn start(&mut self) {
        self.state = PlaybackState::Playing;
        self.timer_ms = 0.0;
    }

    /// Stops playback. Returns `true` if the clock was playing.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.is_playing();
        self.state = PlaybackState::Stopped;
        was_playing
    }

    /// Accumulates `elapsed_ms` and returns the frame to display.
    ///
    /// `holds_secs[i]` is the hold of frame `i` in seconds. A stopped clock or
    /// an empty hold list returns `frame` unchanged.
    pub fn tick(&mut self, elapsed_ms: f64, frame: usize, holds_secs: &[f64]) -> usize {
        if !self.is_playing() || holds_secs.is_empty() {
            return frame;
        }

        let count = holds_secs.len();
        let mut frame = frame % count;
        self.timer_ms += elapsed_ms.max(0.0);

        loop {
            let hold = hold_ms(holds_secs[frame]);
            if self.timer_ms < hold {
                break;
            }
            self.timer_ms -= hold;
            frame = (frame + 1) % count;
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing() -> AnimationClock {
        let mut c = AnimationClock::new();
        c.start();
        c
    }

    #[test]
    fn stopped_clock_does_not_advance() {
        let mut c = AnimationClock::new();
        assert_eq!(c.tick(10_000.0, 0, &[0.1, 0.1]), 0);
        assert_eq!(c.timer_ms(), 0.0);
    }

    #[test]
    fn exact_loop_returns_to_first_frame() {
        let mut c = playing();
        assert_eq!(c.tick(300.0, 0, &[0.1, 0.2]), 0);
        assert_eq!(c.timer_ms(), 0.0);
    }

    #[test]
    fn tick_sum_lands_on_next_frame_after_k() {
        let holds = [0.1, 0.25, 0.05, 0.4];
        for k in 0..holds.len() {
            let mut c = playing();
            let mut frame = 0;
            // Two ticks summing exactly to holds[0..=k].
            let total: f64 = holds[..=k].iter().map(|s| s * 1000.0).sum();
            frame = c.tick(total / 2.0, frame, &holds);
            frame = c.tick(total / 2.0, frame, &holds);
            assert_eq!(frame, (k + 1) % holds.len(), "k = {k}");
        }
    }

    #[test]
    fn remainder_carries_over() {
        let mut c = playing();
        let holds = [0.1, 0.1];
        assert_eq!(c.tick(150.0, 0, &holds), 1);
        assert_eq!(c.timer_ms(), 50.0);
        assert_eq!(c.tick(50.0, 1, &holds), 0);
    }

    #[test]
    fn large_delta_fast_forwards_through_many_frames() {
        let mut c = playing();
        let holds = [0.01; 5];
        assert_eq!(c.tick(70.0, 0, &holds), 2);
    }

    #[test]
    fn zero_and_negative_holds_terminate() {
        let mut c = playing();
        let holds = [0.0, -1.0, f64::NAN];
        let frame = c.tick(10.0, 0, &holds);
        assert!(frame < holds.len());
        assert!(c.timer_ms() < MIN_HOLD_MS);
    }

    #[test]
    fn start_resets_timer() {
        let mut c = playing();
        c.tick(50.0, 0, &[0.1]);
        assert!(c.stop());
        assert!(!c.stop());
        c.start();
        assert_eq!(c.timer_ms(), 0.0);
    }

    #[test]
    fn out_of_range_frame_is_wrapped_before_ticking() {
        let mut c = playing();
        assert_eq!(c.tick(0.0, 5, &[0.1, 0.1]), 1);
    }
}
