//! Gap-free playback scheduling for model audio.
//!
//! The scheduler owns the playback cursor: the time at which the next chunk
//! should start. Chunks are laid end to end in arrival order. While the cursor
//! is in the future the model is still speaking, and the capture path uses
//! that to mute the microphone (half-duplex turn taking).

/// Lead time added when the cursor has fallen behind the clock.
pub const PLAYBACK_LEAD_SECS: f64 = 0.05;

#[derive(Debug, Default, Clone)]
pub struct PlaybackScheduler {
    next_play_time: f64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether scheduled playback is still pending or running at `now`.
    pub fn is_speaking(&self, now: f64) -> bool {
        now < self.next_play_time
    }

    /// Reserve a slot for a chunk of `duration` seconds and return its start time.
    pub fn schedule(&mut self, duration: f64, now: f64) -> f64 {
        if self.next_play_time < now {
            self.next_play_time = now + PLAYBACK_LEAD_SECS;
        }
        let start = self.next_play_time;
        self.next_play_time += duration.max(0.0);
        start
    }

    pub fn next_play_time(&self) -> f64 {
        self.next_play_time
    }

    /// Forget pending playback, e.g. when the call ends.
    pub fn reset(&mut self) {
        self.next_play_time = 0.0;
    }
}
