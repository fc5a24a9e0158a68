//! Turn/barge-in coordinator
//!
//! One instance per call, driven from the call's single event loop. Time is
//! passed in rather than read, so the owner decides which clock applies and
//! tests can script exact sequences.
//!
//! ```text
//! Idle -> CallerSpeaking -> CommitPending -> Idle
//!   \__________\________________\__ AssistantSpeaking (from any state)
//! ```
//!
//! Forwarding caller audio to the AI (and local echo) is allowed only in
//! `Idle` and `CallerSpeaking`.

use std::time::{Duration, Instant};

use call_bridge_config::{TurnConfig, VadSource};
use call_bridge_core::audio::telephony;

use super::energy::EnergyDetector;

/// Who holds the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Nobody is speaking
    #[default]
    Idle,
    /// Caller speech has been heard
    CallerSpeaking,
    /// Assistant audio is being produced
    AssistantSpeaking,
    /// Input committed, waiting for the response to start
    CommitPending,
}

impl TurnState {
    pub fn forwarding_allowed(&self) -> bool {
        matches!(self, TurnState::Idle | TurnState::CallerSpeaking)
    }
}

/// Configuration for the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Peak amplitude counted as speech
    pub energy_threshold: u16,
    /// Loud frames in a row before speech is heard
    pub min_speech_frames: u32,
    /// Quiet frames in a row that end an utterance
    pub silence_frames: u32,
    /// Least appended audio before a commit is worth sending
    pub min_commit_ms: u32,
    /// Auto-clear for a stuck AssistantSpeaking
    pub safety_timeout: Duration,
    /// Auto-clear for a commit nobody answered
    pub commit_timeout: Duration,
    pub echo_enabled: bool,
    pub vad_source: VadSource,
    /// Duration of one caller frame
    pub frame_ms: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&TurnConfig::default())
    }
}

impl From<&TurnConfig> for CoordinatorConfig {
    fn from(config: &TurnConfig) -> Self {
        Self {
            energy_threshold: config.energy_threshold,
            min_speech_frames: config.min_speech_frames,
            silence_frames: config.silence_frames,
            min_commit_ms: config.min_commit_ms,
            safety_timeout: Duration::from_millis(config.safety_timeout_ms),
            commit_timeout: Duration::from_millis(config.commit_timeout_ms),
            echo_enabled: config.echo_enabled,
            vad_source: config.vad_source,
            frame_ms: telephony::FRAME_MS,
        }
    }
}

/// What to do with one caller frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDecision {
    /// Append the frame to the AI input buffer
    pub forward: bool,
    /// Loop the frame back to the caller
    pub echo: bool,
    /// Commit the input buffer and request a response, after forwarding
    pub commit: bool,
}

/// Result of an expired deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineOutcome {
    /// AssistantSpeaking was cleared without an end-of-response event
    SafetyCleared,
    /// CommitPending expired without a response starting
    CommitExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineKind {
    Safety,
    Commit,
}

/// Per-call turn statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnCounters {
    pub local_commits: u64,
    pub server_commits: u64,
    pub responses: u64,
    pub barge_ins: u64,
    pub safety_clears: u64,
}

/// Floor-control state machine for one call
#[derive(Debug)]
pub struct TurnCoordinator {
    config: CoordinatorConfig,
    state: TurnState,
    detector: EnergyDetector,
    /// Audio forwarded since the last commit
    appended_ms: u32,
    /// Server VAD owns the current utterance
    server_tracking: bool,
    /// Caller spoke while the assistant held the floor
    barge_in_heard: bool,
    deadline: Option<(Instant, DeadlineKind)>,
    counters: TurnCounters,
}

impl TurnCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let detector = EnergyDetector::new(config.energy_threshold, config.min_speech_frames);
        Self {
            config,
            state: TurnState::Idle,
            detector,
            appended_ms: 0,
            server_tracking: false,
            barge_in_heard: false,
            deadline: None,
            counters: TurnCounters::default(),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn counters(&self) -> TurnCounters {
        self.counters
    }

    pub fn heard_speech(&self) -> bool {
        self.detector.heard_speech()
    }

    /// Next instant at which [`Self::on_deadline`] must be called
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|(at, _)| at)
    }

    /// Process one inbound caller frame given its peak amplitude
    pub fn on_caller_frame(&mut self, peak: u16, now: Instant) -> FrameDecision {
        match self.state {
            TurnState::AssistantSpeaking => {
                if self.detector.is_loud(peak) && !self.barge_in_heard {
                    self.barge_in_heard = true;
                    self.counters.barge_ins += 1;
                    tracing::debug!(peak, "Caller speech during assistant playback");
                }
                return FrameDecision::default();
            },
            TurnState::CommitPending => return FrameDecision::default(),
            TurnState::Idle | TurnState::CallerSpeaking => {},
        }

        self.appended_ms = self.appended_ms.saturating_add(self.config.frame_ms);
        self.detector.process(peak);
        if self.detector.heard_speech() && self.state == TurnState::Idle {
            self.state = TurnState::CallerSpeaking;
        }

        let commit = self.local_commit_due();
        if commit {
            self.counters.local_commits += 1;
            tracing::debug!(
                appended_ms = self.appended_ms,
                silence_frames = self.detector.silence_run(),
                "Local end of utterance, committing input"
            );
            self.enter_commit_pending(now);
        }

        FrameDecision {
            forward: true,
            echo: self.config.echo_enabled,
            commit,
        }
    }

    fn local_commit_due(&self) -> bool {
        self.config.vad_source.local_commits()
            && !(self.config.vad_source == VadSource::Hybrid && self.server_tracking)
            && self.state == TurnState::CallerSpeaking
            && self.detector.heard_speech()
            && self.detector.silence_run() >= self.config.silence_frames
            && self.appended_ms >= self.config.min_commit_ms
    }

    /// The AI transport detected caller speech.
    ///
    /// Returns true when this interrupts assistant playback.
    pub fn on_server_speech_started(&mut self) -> bool {
        if !self.config.vad_source.server_events() {
            return false;
        }
        match self.state {
            TurnState::AssistantSpeaking => {
                if !self.barge_in_heard {
                    self.barge_in_heard = true;
                    self.counters.barge_ins += 1;
                }
                true
            },
            TurnState::CommitPending => false,
            TurnState::Idle | TurnState::CallerSpeaking => {
                self.server_tracking = true;
                self.detector.mark_heard();
                self.state = TurnState::CallerSpeaking;
                false
            },
        }
    }

    /// The AI transport ended the caller's utterance and committed the buffer
    /// itself. Local counters are reset so no second commit goes out.
    pub fn on_server_committed(&mut self, now: Instant) {
        if !self.config.vad_source.server_events() {
            return;
        }
        if self.state.forwarding_allowed() && (self.server_tracking || self.detector.heard_speech())
        {
            self.counters.server_commits += 1;
            self.enter_commit_pending(now);
        }
    }

    /// A response began
    pub fn on_response_started(&mut self, now: Instant) {
        if self.state != TurnState::AssistantSpeaking {
            self.counters.responses += 1;
            self.enter_assistant_speaking();
        }
        self.arm(now + self.config.safety_timeout, DeadlineKind::Safety);
    }

    /// An assistant audio chunk arrived.
    ///
    /// Returns true for the chunk that took the floor.
    pub fn on_audio_delta(&mut self, now: Instant) -> bool {
        let first = self.state != TurnState::AssistantSpeaking;
        if first {
            self.counters.responses += 1;
            self.enter_assistant_speaking();
        }
        self.arm(now + self.config.safety_timeout, DeadlineKind::Safety);
        first
    }

    /// Explicit end of response. Returns false when already cleared.
    pub fn on_response_ended(&mut self) -> bool {
        match self.state {
            TurnState::AssistantSpeaking | TurnState::CommitPending => {
                self.release_floor();
                true
            },
            TurnState::Idle | TurnState::CallerSpeaking => false,
        }
    }

    /// The AI reported an error; do not wait for a response that will not come.
    pub fn on_response_error(&mut self) -> bool {
        self.on_response_ended()
    }

    /// Handle an expired deadline. Calling early or twice is harmless.
    pub fn on_deadline(&mut self, now: Instant) -> Option<DeadlineOutcome> {
        let (at, kind) = self.deadline?;
        if now < at {
            return None;
        }
        self.deadline = None;

        match (kind, self.state) {
            (DeadlineKind::Safety, TurnState::AssistantSpeaking) => {
                self.counters.safety_clears += 1;
                tracing::warn!(
                    timeout_ms = self.config.safety_timeout.as_millis() as u64,
                    "No end-of-response signal, clearing assistant floor"
                );
                self.release_floor();
                Some(DeadlineOutcome::SafetyCleared)
            },
            (DeadlineKind::Commit, TurnState::CommitPending) => {
                tracing::warn!(
                    timeout_ms = self.config.commit_timeout.as_millis() as u64,
                    "Commit was not answered, returning to idle"
                );
                self.release_floor();
                Some(DeadlineOutcome::CommitExpired)
            },
            _ => None,
        }
    }

    /// Return to the initial state, keeping counters
    pub fn reset(&mut self) {
        self.state = TurnState::Idle;
        self.deadline = None;
        self.barge_in_heard = false;
        self.reset_utterance();
    }

    fn enter_commit_pending(&mut self, now: Instant) {
        self.reset_utterance();
        self.state = TurnState::CommitPending;
        self.arm(now + self.config.commit_timeout, DeadlineKind::Commit);
    }

    fn enter_assistant_speaking(&mut self) {
        self.reset_utterance();
        self.state = TurnState::AssistantSpeaking;
    }

    fn release_floor(&mut self) {
        self.deadline = None;
        self.state = if self.barge_in_heard {
            TurnState::CallerSpeaking
        } else {
            TurnState::Idle
        };
        self.barge_in_heard = false;
        self.reset_utterance();
    }

    fn reset_utterance(&mut self) {
        self.detector.reset();
        self.appended_ms = 0;
        self.server_tracking = false;
    }

    fn arm(&mut self, at: Instant, kind: DeadlineKind) {
        self.deadline = Some((at, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOUD: u16 = 8000;
    const QUIET: u16 = 50;

    fn config(vad_source: VadSource) -> CoordinatorConfig {
        CoordinatorConfig {
            vad_source,
            ..CoordinatorConfig::default()
        }
    }

    fn feed(coordinator: &mut TurnCoordinator, peak: u16, frames: u32, now: &mut Instant) -> u32 {
        let mut commits = 0;
        for _ in 0..frames {
            *now += Duration::from_millis(20);
            if coordinator.on_caller_frame(peak, *now).commit {
                commits += 1;
            }
        }
        commits
    }

    #[test]
    fn test_speech_then_silence_commits_once() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Local));
        let mut now = Instant::now();

        assert_eq!(feed(&mut coordinator, LOUD, 10, &mut now), 0);
        assert_eq!(coordinator.state(), TurnState::CallerSpeaking);

        // One short of the threshold
        assert_eq!(feed(&mut coordinator, QUIET, 21, &mut now), 0);
        assert_eq!(feed(&mut coordinator, QUIET, 1, &mut now), 1);
        assert_eq!(coordinator.state(), TurnState::CommitPending);

        // Long tail of silence never commits again
        assert_eq!(feed(&mut coordinator, QUIET, 200, &mut now), 0);
        assert_eq!(coordinator.counters().local_commits, 1);
    }

    #[test]
    fn test_no_commit_while_assistant_speaking() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Local));
        let mut now = Instant::now();

        coordinator.on_response_started(now);
        let mut commits = feed(&mut coordinator, LOUD, 10, &mut now);
        // Keep the response alive through the sequence
        coordinator.on_audio_delta(now);
        commits += feed(&mut coordinator, QUIET, 30, &mut now);

        assert_eq!(commits, 0);
        assert_eq!(coordinator.state(), TurnState::AssistantSpeaking);
    }

    #[test]
    fn test_assistant_mid_utterance_discards_pending_commit() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Local));
        let mut now = Instant::now();

        feed(&mut coordinator, LOUD, 10, &mut now);
        coordinator.on_audio_delta(now);
        coordinator.on_response_ended();

        assert_eq!(feed(&mut coordinator, QUIET, 50, &mut now), 0);
    }

    #[test]
    fn test_silence_only_never_commits() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Hybrid));
        let mut now = Instant::now();

        // Five seconds of line noise
        assert_eq!(feed(&mut coordinator, QUIET, 250, &mut now), 0);
        assert!(!coordinator.heard_speech());
        assert_eq!(coordinator.state(), TurnState::Idle);
    }

    #[test]
    fn test_server_only_never_commits_locally() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Server));
        let mut now = Instant::now();
        feed(&mut coordinator, LOUD, 10, &mut now);
        assert_eq!(feed(&mut coordinator, QUIET, 50, &mut now), 0);
    }

    #[test]
    fn test_hybrid_defers_to_server_vad() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Hybrid));
        let mut now = Instant::now();

        feed(&mut coordinator, LOUD, 5, &mut now);
        assert!(!coordinator.on_server_speech_started());
        feed(&mut coordinator, LOUD, 5, &mut now);
        assert_eq!(feed(&mut coordinator, QUIET, 40, &mut now), 0);

        coordinator.on_server_committed(now);
        assert_eq!(coordinator.state(), TurnState::CommitPending);
        assert_eq!(coordinator.counters().server_commits, 1);
        assert_eq!(coordinator.counters().local_commits, 0);
    }

    #[test]
    fn test_response_cycle_resumes_forwarding() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Hybrid));
        let start = Instant::now();

        coordinator.on_response_started(start);
        for i in 0..10 {
            coordinator.on_audio_delta(start + Duration::from_millis(30 * i));
        }
        assert!(!coordinator
            .on_caller_frame(QUIET, start + Duration::from_millis(310))
            .forward);

        assert!(coordinator.on_response_ended());
        assert_eq!(coordinator.state(), TurnState::Idle);
        assert_eq!(coordinator.deadline(), None);

        // Duplicate end and a late deadline check are both no-ops
        assert!(!coordinator.on_response_ended());
        assert_eq!(coordinator.on_deadline(start + Duration::from_secs(5)), None);
        assert_eq!(coordinator.counters().safety_clears, 0);
        assert_eq!(coordinator.counters().responses, 1);

        let decision = coordinator.on_caller_frame(QUIET, start + Duration::from_secs(5));
        assert!(decision.forward);
    }

    #[test]
    fn test_safety_timeout_clears_once() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Hybrid));
        let start = Instant::now();

        coordinator.on_response_started(start);
        let deadline = coordinator.deadline().unwrap();
        assert_eq!(deadline, start + Duration::from_millis(800));

        assert_eq!(coordinator.on_deadline(start + Duration::from_millis(799)), None);
        assert_eq!(
            coordinator.on_deadline(deadline),
            Some(DeadlineOutcome::SafetyCleared)
        );
        assert_eq!(coordinator.state(), TurnState::Idle);
        assert_eq!(coordinator.on_deadline(deadline + Duration::from_secs(1)), None);
        assert_eq!(coordinator.counters().safety_clears, 1);

        // A late end-of-response is harmless
        assert!(!coordinator.on_response_ended());
    }

    #[test]
    fn test_barge_in_returns_floor_to_caller() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Hybrid));
        let now = Instant::now();

        coordinator.on_audio_delta(now);
        let decision = coordinator.on_caller_frame(LOUD, now);
        assert!(!decision.forward);
        assert_eq!(coordinator.counters().barge_ins, 1);

        assert!(coordinator.on_server_speech_started());
        coordinator.on_response_ended();
        assert_eq!(coordinator.state(), TurnState::CallerSpeaking);
        assert!(coordinator.on_caller_frame(LOUD, now).forward);
    }

    #[test]
    fn test_commit_timeout() {
        let mut coordinator = TurnCoordinator::new(config(VadSource::Local));
        let mut now = Instant::now();
        feed(&mut coordinator, LOUD, 5, &mut now);
        assert_eq!(feed(&mut coordinator, QUIET, 22, &mut now), 1);

        assert!(!coordinator.on_caller_frame(LOUD, now).forward);
        let outcome = coordinator.on_deadline(now + Duration::from_secs(2));
        assert_eq!(outcome, Some(DeadlineOutcome::CommitExpired));
        assert_eq!(coordinator.state(), TurnState::Idle);
    }

    #[test]
    fn test_echo_flag_follows_forwarding() {
        let mut coordinator = TurnCoordinator::new(CoordinatorConfig {
            echo_enabled: true,
            ..CoordinatorConfig::default()
        });
        let now = Instant::now();
        assert!(coordinator.on_caller_frame(QUIET, now).echo);

        coordinator.on_audio_delta(now);
        assert!(!coordinator.on_caller_frame(QUIET, now).echo);
    }
}
