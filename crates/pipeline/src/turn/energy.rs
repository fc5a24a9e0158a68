//! Peak-energy voice activity detector
//!
//! Counts consecutive loud and quiet frames. Speech is "heard" once
//! `min_speech_frames` loud frames arrive back to back; silence runs are
//! only counted after that.

/// Classification of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameActivity {
    Speech,
    Silence,
}

#[derive(Debug, Clone)]
pub struct EnergyDetector {
    threshold: u16,
    min_speech_frames: u32,
    speech_run: u32,
    silence_run: u32,
    heard_speech: bool,
}

impl EnergyDetector {
    pub fn new(threshold: u16, min_speech_frames: u32) -> Self {
        Self {
            threshold,
            min_speech_frames: min_speech_frames.max(1),
            speech_run: 0,
            silence_run: 0,
            heard_speech: false,
        }
    }

    pub fn is_loud(&self, peak: u16) -> bool {
        peak >= self.threshold
    }

    /// Update the runs with one frame's peak amplitude
    pub fn process(&mut self, peak: u16) -> FrameActivity {
        if self.is_loud(peak) {
            self.speech_run += 1;
            self.silence_run = 0;
            if self.speech_run >= self.min_speech_frames {
                self.heard_speech = true;
            }
            FrameActivity::Speech
        } else {
            self.speech_run = 0;
            if self.heard_speech {
                self.silence_run += 1;
            }
            FrameActivity::Silence
        }
    }

    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    /// Consecutive quiet frames since speech was heard
    pub fn silence_run(&self) -> u32 {
        self.silence_run
    }

    /// Accept speech reported by another detector
    pub fn mark_heard(&mut self) {
        self.heard_speech = true;
        self.silence_run = 0;
    }

    pub fn reset(&mut self) {
        self.speech_run = 0;
        self.silence_run = 0;
        self.heard_speech = false;
    }
}
