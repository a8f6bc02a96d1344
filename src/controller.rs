//! The session state machine shared by every test kind.
//!
//! `Instructions -> Selecting -> Running -> Completed`, with `Selecting`
//! skipped for fixed-size pools. All mutation goes through the controller;
//! recorders and scorers get copies.

use chrono::{DateTime, Local};
use rand::Rng;

use crate::clock::{ClockSignal, Generation, PhaseClock};
use crate::error::{DrillError, InsufficientPool, Result};
use crate::kind::{Phase, PhaseSpec, PoolSizing, ResponseMode, TestConfig, TestKind, TimerScope};
use crate::recorder::AttemptRecord;
use crate::response::{score, AnswerKey, Response, ResponseSheet, Score};
use crate::source::select_subset;
use crate::stimulus::{Stimulus, StimulusPool};

#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Instructions,
    Selecting,
    Running,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub stimulus_index: usize,
    pub phase_index: usize,
    pub seconds_remaining: u32,
    pub responses: ResponseSheet,
    pub status: SessionStatus,
    /// Ticks consumed since the session started running
    pub elapsed_secs: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            stimulus_index: 0,
            phase_index: 0,
            seconds_remaining: 0,
            responses: ResponseSheet::new(),
            status: SessionStatus::Instructions,
            elapsed_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub kind: TestKind,
    pub stimuli: usize,
    pub elapsed_secs: u32,
    pub score: Option<Score>,
    pub completed_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PoolShortfall(InsufficientPool),
    StimulusShown { index: usize, stimulus_id: String },
    PhaseStarted { phase: Phase, seconds: u32 },
    Tick { remaining: u32 },
    PhaseExpired { phase: Phase },
    AttemptReady(AttemptRecord),
    SequenceComplete(SessionSummary),
}

pub struct SequenceController {
    config: TestConfig,
    user_id: String,
    loaded: StimulusPool,
    pool: StimulusPool,
    state: SessionState,
    clock: PhaseClock,
    generation: Option<Generation>,
    stimulus_started_at: u32,
    summary: Option<SessionSummary>,
}

impl std::fmt::Debug for SequenceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceController")
            .field("kind", &self.config.kind)
            .field("pool", &self.pool.len())
            .field("state", &self.state)
            .finish()
    }
}

impl SequenceController {
    pub fn new<U: Into<String>>(config: TestConfig, pool: StimulusPool, user_id: U) -> Result<Self> {
        config.validate()?;
        if pool.is_empty() {
            return Err(DrillError::EmptyPool(config.kind));
        }
        Ok(Self {
            config,
            user_id: user_id.into(),
            pool: pool.clone(),
            loaded: pool,
            state: SessionState::default(),
            clock: PhaseClock::new(),
            generation: None,
            stimulus_started_at: 0,
            summary: None,
        })
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn kind(&self) -> TestKind {
        self.config.kind
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Copy of the session state for collaborators that must not hold a reference
    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    /// Stimuli of the running session (the full loaded pool before selection)
    pub fn pool(&self) -> &StimulusPool {
        &self.pool
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn pool_choices(&self) -> Vec<usize> {
        match &self.config.sizing {
            PoolSizing::Fixed(n) => vec![*n],
            PoolSizing::Choice(choices) => choices.clone(),
        }
    }

    pub fn current_stimulus(&self) -> Option<&Stimulus> {
        match self.state.status {
            SessionStatus::Running => self.pool.get(self.state.stimulus_index),
            _ => None,
        }
    }

    pub fn current_phase(&self) -> Option<&PhaseSpec> {
        match self.state.status {
            SessionStatus::Running => self.config.phases.get(self.state.phase_index),
            _ => None,
        }
    }

    pub fn current_response(&self) -> Option<&Response> {
        self.current_stimulus()
            .and_then(|s| self.state.responses.get(s.id()))
    }

    /// Generation of the running phase, for timers driven from outside
    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    fn invalid(&self, action: &'static str) -> DrillError {
        DrillError::InvalidTransition {
            from: self.state.status.to_string(),
            action,
        }
    }

    /// Leave the instructions screen
    pub fn begin(&mut self) -> Result<Vec<SessionEvent>> {
        if self.state.status != SessionStatus::Instructions {
            return Err(self.invalid("begin"));
        }
        match self.config.sizing {
            PoolSizing::Fixed(n) => self.start_with(n, &mut rand::thread_rng()),
            PoolSizing::Choice(_) => {
                self.state.status = SessionStatus::Selecting;
                tracing::debug!(kind = %self.config.kind, "selecting pool size");
                Ok(Vec::new())
            }
        }
    }

    /// Freeze the pool size and start the first stimulus
    pub fn choose_count(&mut self, requested: usize) -> Result<Vec<SessionEvent>> {
        self.choose_count_with(requested, &mut rand::thread_rng())
    }

    pub fn choose_count_with<R: Rng + ?Sized>(
        &mut self,
        requested: usize,
        rng: &mut R,
    ) -> Result<Vec<SessionEvent>> {
        if self.state.status != SessionStatus::Selecting {
            return Err(self.invalid("choose a pool size"));
        }
        self.start_with(requested, rng)
    }

    fn start_with<R: Rng + ?Sized>(&mut self, requested: usize, rng: &mut R) -> Result<Vec<SessionEvent>> {
        if requested == 0 {
            return Err(DrillError::InvalidConfig("pool size must be positive".into()));
        }
        let mut events = Vec::new();
        let (pool, shortfall) = select_subset(&self.loaded, requested, rng);
        if let Some(shortfall) = shortfall {
            tracing::warn!(kind = %self.config.kind, %shortfall, "pool smaller than requested");
            events.push(SessionEvent::PoolShortfall(shortfall));
        }
        self.pool = pool;
        self.config.sizing = PoolSizing::Fixed(self.pool.len());
        self.state = SessionState {
            status: SessionStatus::Running,
            ..SessionState::default()
        };
        tracing::info!(
            kind = %self.config.kind,
            stimuli = self.pool.len(),
            planned_secs = self.config.planned_seconds(self.pool.len()),
            "session started"
        );
        self.show_stimulus(&mut events);
        self.start_phase(&mut events);
        Ok(events)
    }

    /// Advance the running phase by one second
    pub fn on_tick(&mut self) -> Vec<SessionEvent> {
        match self.generation {
            Some(generation) => self.on_clock_tick(generation),
            None => Vec::new(),
        }
    }

    /// Tick issued for `generation`; stale generations are dropped
    pub fn on_clock_tick(&mut self, generation: Generation) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state.status != SessionStatus::Running {
            return events;
        }
        match self.clock.tick(generation) {
            ClockSignal::Tick { remaining } => {
                self.state.elapsed_secs += 1;
                self.state.seconds_remaining = remaining;
                events.push(SessionEvent::Tick { remaining });
            }
            ClockSignal::Expired => {
                self.state.elapsed_secs += 1;
                self.state.seconds_remaining = 0;
                self.generation = None;
                let phase = self.config.phases[self.state.phase_index].phase;
                tracing::debug!(
                    stimulus = self.state.stimulus_index,
                    phase = %phase,
                    "phase expired"
                );
                events.push(SessionEvent::PhaseExpired { phase });
                self.phase_finished(&mut events);
            }
            ClockSignal::Ignored => {}
        }
        events
    }

    /// Record a response for the current stimulus
    pub fn answer(&mut self, response: Response) -> Result<()> {
        let id = self
            .current_stimulus()
            .map(|s| s.id().to_string())
            .ok_or_else(|| self.invalid("answer"))?;
        self.record(&id, response)
    }

    /// Store or overwrite the response for `stimulus_id`
    pub fn record(&mut self, stimulus_id: &str, response: Response) -> Result<()> {
        if self.state.status != SessionStatus::Running {
            return Err(self.invalid("record a response"));
        }
        let stimulus = self
            .pool
            .find(stimulus_id)
            .ok_or_else(|| DrillError::UnknownStimulus(stimulus_id.to_string()))?;

        match (self.config.mode, &response) {
            (ResponseMode::Offline, _) => return Err(DrillError::ResponseNotAccepted(self.config.kind)),
            (ResponseMode::Choice, Response::Choice(index)) => {
                let options = stimulus.as_question().map_or(0, |q| q.options.len());
                if *index >= options {
                    return Err(DrillError::InvalidChoice {
                        index: *index,
                        options,
                    });
                }
            }
            (ResponseMode::Story, Response::Story(_)) => {
                let current = self.pool.get(self.state.stimulus_index).map(Stimulus::id);
                let phase = self.config.phases[self.state.phase_index].phase;
                if current != Some(stimulus_id) || phase != Phase::Write {
                    return Err(DrillError::InvalidTransition {
                        from: format!("{phase} phase of {}", current.unwrap_or("?")),
                        action: "write a story",
                    });
                }
            }
            (ResponseMode::Choice, Response::Story(_)) | (ResponseMode::Story, Response::Choice(_)) => {
                return Err(DrillError::InvalidConfig(format!(
                    "{} does not take that kind of response",
                    self.config.kind
                )));
            }
        }

        self.state.responses.record(stimulus_id, response);
        Ok(())
    }

    /// Remove the response for the current stimulus (back to unanswered)
    pub fn clear_answer(&mut self) -> Result<()> {
        if self.config.mode == ResponseMode::Offline {
            return Err(DrillError::ResponseNotAccepted(self.config.kind));
        }
        let id = self
            .current_stimulus()
            .map(|s| s.id().to_string())
            .ok_or_else(|| self.invalid("clear an answer"))?;
        self.state.responses.clear(&id);
        Ok(())
    }

    /// Move to any stimulus while one clock covers the whole pool
    pub fn jump_to(&mut self, index: usize) -> Result<Vec<SessionEvent>> {
        if self.state.status != SessionStatus::Running {
            return Err(self.invalid("navigate"));
        }
        if self.config.scope != TimerScope::WholePool {
            return Err(DrillError::InvalidTransition {
                from: format!("a timed {} item", self.config.kind),
                action: "navigate",
            });
        }
        if index >= self.pool.len() {
            return Err(DrillError::UnknownStimulus(format!("index {index}")));
        }
        let mut events = Vec::new();
        if index != self.state.stimulus_index {
            self.state.stimulus_index = index;
            self.show_stimulus(&mut events);
        }
        Ok(events)
    }

    pub fn next(&mut self) -> Result<Vec<SessionEvent>> {
        let last = self.pool.len().saturating_sub(1);
        self.jump_to((self.state.stimulus_index + 1).min(last))
    }

    pub fn previous(&mut self) -> Result<Vec<SessionEvent>> {
        self.jump_to(self.state.stimulus_index.saturating_sub(1))
    }

    /// Submit before the clock runs out, where the test kind allows it
    pub fn submit(&mut self) -> Result<Vec<SessionEvent>> {
        if self.state.status != SessionStatus::Running {
            return Err(self.invalid("submit"));
        }
        let spec = self.config.phases[self.state.phase_index];
        let mut events = Vec::new();

        match self.config.scope {
            TimerScope::WholePool => {
                self.clock.cancel();
                self.generation = None;
                self.complete(&mut events);
            }
            TimerScope::PerStimulus => {
                let is_last_phase = self.state.phase_index + 1 == self.config.phases.len();
                if self.config.phases.len() < 2 || !is_last_phase {
                    return Err(DrillError::SubmitNotAllowed {
                        kind: self.config.kind,
                        phase: spec.phase,
                    });
                }
                if self.config.mode == ResponseMode::Story {
                    match self.current_response() {
                        Some(response) => response.validate_submission()?,
                        None => return Err(DrillError::EmptyResponse),
                    }
                }
                self.clock.cancel();
                self.generation = None;
                tracing::debug!(stimulus = self.state.stimulus_index, "submitted early");
                self.finish_stimulus(&mut events);
            }
        }
        Ok(events)
    }

    /// Discard the session. Nothing is persisted.
    pub fn abandon(&mut self) {
        if matches!(self.state.status, SessionStatus::Completed | SessionStatus::Abandoned) {
            return;
        }
        self.clock.cancel();
        self.generation = None;
        tracing::info!(
            kind = %self.config.kind,
            stimulus = self.state.stimulus_index,
            "session abandoned"
        );
        self.state.status = SessionStatus::Abandoned;
    }

    fn show_stimulus(&mut self, events: &mut Vec<SessionEvent>) {
        if let Some(stimulus) = self.pool.get(self.state.stimulus_index) {
            events.push(SessionEvent::StimulusShown {
                index: self.state.stimulus_index,
                stimulus_id: stimulus.id().to_string(),
            });
        }
    }

    fn start_phase(&mut self, events: &mut Vec<SessionEvent>) {
        let spec = self.config.phases[self.state.phase_index];
        self.generation = Some(self.clock.start(spec.seconds));
        self.state.seconds_remaining = spec.seconds;
        events.push(SessionEvent::PhaseStarted {
            phase: spec.phase,
            seconds: spec.seconds,
        });
    }

    fn phase_finished(&mut self, events: &mut Vec<SessionEvent>) {
        match self.config.scope {
            TimerScope::WholePool => self.complete(events),
            TimerScope::PerStimulus => {
                if self.state.phase_index + 1 < self.config.phases.len() {
                    self.state.phase_index += 1;
                    self.start_phase(events);
                } else {
                    self.finish_stimulus(events);
                }
            }
        }
    }

    fn finish_stimulus(&mut self, events: &mut Vec<SessionEvent>) {
        if self.config.mode == ResponseMode::Story {
            events.push(SessionEvent::AttemptReady(self.story_record()));
        }

        if self.state.stimulus_index + 1 < self.pool.len() {
            self.state.stimulus_index += 1;
            self.state.phase_index = 0;
            self.stimulus_started_at = self.state.elapsed_secs;
            self.show_stimulus(events);
            self.start_phase(events);
        } else {
            self.complete(events);
        }
    }

    fn story_record(&self) -> AttemptRecord {
        let stimulus_id = self
            .pool
            .get(self.state.stimulus_index)
            .map(|s| s.id().to_string());
        let story = stimulus_id
            .as_deref()
            .and_then(|id| self.state.responses.get(id))
            .and_then(Response::as_story)
            .unwrap_or_default()
            .to_string();

        AttemptRecord {
            user_id: self.user_id.clone(),
            test_type: self.config.kind,
            stimulus_id,
            response: Some(story),
            correct_answer: None,
            is_correct: None,
            score: None,
            time_taken_seconds: self.state.elapsed_secs - self.stimulus_started_at,
            completed_at: Local::now(),
        }
    }

    fn complete(&mut self, events: &mut Vec<SessionEvent>) {
        self.clock.cancel();
        self.generation = None;
        self.state.status = SessionStatus::Completed;

        let score = match self.config.mode {
            ResponseMode::Choice => Some(score(
                &self.pool,
                &self.state.responses,
                &AnswerKey::from_pool(&self.pool),
            )),
            _ => None,
        };

        let summary = SessionSummary {
            kind: self.config.kind,
            stimuli: self.pool.len(),
            elapsed_secs: self.state.elapsed_secs,
            score: score.clone(),
            completed_at: Local::now(),
        };

        if let Some(score) = score {
            events.push(SessionEvent::AttemptReady(AttemptRecord {
                user_id: self.user_id.clone(),
                test_type: self.config.kind,
                stimulus_id: None,
                response: None,
                correct_answer: None,
                is_correct: None,
                score: Some(score),
                time_taken_seconds: self.state.elapsed_secs,
                completed_at: summary.completed_at,
            }));
        }

        tracing::info!(
            kind = %summary.kind,
            stimuli = summary.stimuli,
            elapsed_secs = summary.elapsed_secs,
            score = ?summary.score.as_ref().map(|s| s.percentage),
            "session completed"
        );

        self.summary = Some(summary.clone());
        events.push(SessionEvent::SequenceComplete(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::{Picture, Question, Situation, Word};
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn words(n: usize) -> StimulusPool {
        let stimuli = (0..n)
            .map(|i| {
                Stimulus::Word(Word {
                    id: format!("w{i}"),
                    text: format!("word{i}"),
                })
            })
            .collect();
        StimulusPool::new(TestKind::Wat, stimuli).unwrap()
    }

    fn pictures(kind: TestKind, n: usize) -> StimulusPool {
        let stimuli = (0..n)
            .map(|i| {
                Stimulus::picture(Picture {
                    id: format!("p{i}"),
                    image_ref: format!("p{i}.jpg"),
                })
            })
            .collect();
        StimulusPool::new(kind, stimuli).unwrap()
    }

    fn questions(answers: &[usize]) -> StimulusPool {
        let stimuli = answers
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Stimulus::question(Question {
                    id: format!("q{i}"),
                    image_ref: None,
                    text: Some(format!("q{i}")),
                    options: ["a".into(), "b".into(), "c".into(), "d".into()],
                    correct_option_index: c,
                })
            })
            .collect();
        StimulusPool::new(TestKind::Oir, stimuli).unwrap()
    }

    /// Session over the whole pool, shuffled with a fixed seed
    fn running(config: TestConfig, pool: StimulusPool) -> SequenceController {
        let n = pool.len();
        let mut ctl = SequenceController::new(config.with_sizing(PoolSizing::Choice(vec![n])), pool, "u1").unwrap();
        ctl.begin().unwrap();
        ctl.choose_count_with(n, &mut StdRng::seed_from_u64(0)).unwrap();
        ctl
    }

    fn tick_n(ctl: &mut SequenceController, n: u32) -> Vec<SessionEvent> {
        (0..n).flat_map(|_| ctl.on_tick()).collect()
    }

    #[test]
    fn begins_in_instructions_then_selects() {
        let mut ctl = SequenceController::new(TestKind::Wat.config(), words(12), "u1").unwrap();
        assert_eq!(ctl.status(), SessionStatus::Instructions);
        assert!(ctl.current_stimulus().is_none());

        assert!(ctl.begin().unwrap().is_empty());
        assert_eq!(ctl.status(), SessionStatus::Selecting);
        assert_matches!(ctl.begin(), Err(DrillError::InvalidTransition { .. }));

        let events = ctl.choose_count(10).unwrap();
        assert_eq!(ctl.status(), SessionStatus::Running);
        assert_eq!(ctl.pool().len(), 10);
        assert_matches!(events[0], SessionEvent::StimulusShown { index: 0, .. });
        assert_eq!(events[1], SessionEvent::PhaseStarted { phase: Phase::Respond, seconds: 15 });
    }

    #[test]
    fn fixed_sizing_skips_selection() {
        let cfg = TestKind::Srt.config().with_sizing(PoolSizing::Fixed(2));
        let pool = StimulusPool::new(
            TestKind::Srt,
            (0..3)
                .map(|i| Stimulus::Situation(Situation { id: format!("s{i}"), text: "x".into() }))
                .collect(),
        )
        .unwrap();
        let mut ctl = SequenceController::new(cfg, pool, "u1").unwrap();
        ctl.begin().unwrap();
        assert_eq!(ctl.status(), SessionStatus::Running);
        assert_eq!(ctl.pool().len(), 2);
    }

    #[test]
    fn zero_count_is_rejected() {
        let mut ctl = SequenceController::new(TestKind::Wat.config(), words(3), "u1").unwrap();
        ctl.begin().unwrap();
        assert_matches!(ctl.choose_count(0), Err(DrillError::InvalidConfig(_)));
        assert_eq!(ctl.status(), SessionStatus::Selecting);
    }

    #[test]
    fn shortfall_is_reported_and_session_runs() {
        let mut ctl = SequenceController::new(TestKind::Ppdt.config(), pictures(TestKind::Ppdt, 6), "u1").unwrap();
        ctl.begin().unwrap();
        let events = ctl.choose_count(10).unwrap();
        assert_eq!(
            events[0],
            SessionEvent::PoolShortfall(InsufficientPool { requested: 10, available: 6 })
        );
        assert_eq!(ctl.pool().len(), 6);
        assert_eq!(ctl.config().sizing, PoolSizing::Fixed(6));
    }

    #[test]
    fn single_phase_advances_each_expiry() {
        let mut ctl = running(TestKind::Wat.config(), words(3));
        let events = tick_n(&mut ctl, 15);
        assert!(events.contains(&SessionEvent::PhaseExpired { phase: Phase::Respond }));
        assert_eq!(ctl.state().stimulus_index, 1);
        assert_eq!(ctl.state().seconds_remaining, 15);

        tick_n(&mut ctl, 30);
        assert_eq!(ctl.status(), SessionStatus::Completed);
        assert_eq!(ctl.state().elapsed_secs, 45);
        assert!(ctl.summary().unwrap().score.is_none());
    }

    #[test]
    fn offline_kinds_refuse_responses_and_early_submit() {
        let mut ctl = running(TestKind::Wat.config(), words(2));
        assert_matches!(
            ctl.answer(Response::Story("courage".into())),
            Err(DrillError::ResponseNotAccepted(TestKind::Wat))
        );
        assert_matches!(
            ctl.submit(),
            Err(DrillError::SubmitNotAllowed { kind: TestKind::Wat, phase: Phase::Respond })
        );
    }

    #[test]
    fn two_phase_view_then_write() {
        let cfg = TestKind::Tat.config()
            .with_phase_seconds(Phase::View, 2)
            .with_phase_seconds(Phase::Write, 3);
        let mut ctl = running(cfg, pictures(TestKind::Tat, 2));

        assert_matches!(ctl.submit(), Err(DrillError::SubmitNotAllowed { phase: Phase::View, .. }));
        assert_matches!(
            ctl.answer(Response::Story("too early".into())),
            Err(DrillError::InvalidTransition { .. })
        );

        let events = tick_n(&mut ctl, 2);
        assert!(events.contains(&SessionEvent::PhaseStarted { phase: Phase::Write, seconds: 3 }));
        assert_eq!(ctl.state().stimulus_index, 0);
        assert_eq!(ctl.current_phase().unwrap().phase, Phase::Write);
    }

    #[test]
    fn tat_early_submit_persists_story_and_advances() {
        let cfg = TestKind::Tat.config()
            .with_phase_seconds(Phase::View, 2)
            .with_phase_seconds(Phase::Write, 10);
        let mut ctl = running(cfg, pictures(TestKind::Tat, 2));
        tick_n(&mut ctl, 3);

        assert_matches!(ctl.submit(), Err(DrillError::EmptyResponse));
        ctl.answer(Response::Story("   ".into())).unwrap();
        assert_matches!(ctl.submit(), Err(DrillError::EmptyResponse));

        ctl.answer(Response::Story("A cadet finds a map".into())).unwrap();
        let first = ctl.current_stimulus().unwrap().id().to_string();
        let events = ctl.submit().unwrap();
        let record = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::AttemptReady(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(record.stimulus_id, Some(first));
        assert_eq!(record.response.as_deref(), Some("A cadet finds a map"));
        assert_eq!(record.time_taken_seconds, 3);
        assert_eq!(ctl.state().stimulus_index, 1);
        assert_eq!(ctl.current_phase().unwrap().phase, Phase::View);
    }

    #[test]
    fn ppdt_submit_advances_without_record() {
        let cfg = TestKind::Ppdt.config()
            .with_phase_seconds(Phase::View, 1)
            .with_phase_seconds(Phase::Write, 5);
        let mut ctl = running(cfg, pictures(TestKind::Ppdt, 1));
        ctl.on_tick();
        let events = ctl.submit().unwrap();
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::AttemptReady(_))));
        assert_eq!(ctl.status(), SessionStatus::Completed);
    }

    #[test]
    fn whole_pool_navigation_and_submit() {
        let mut ctl = running(TestKind::Oir.config(), questions(&[1, 1, 1]));
        ctl.answer(Response::Choice(1)).unwrap();
        ctl.next().unwrap();
        ctl.next().unwrap();
        assert!(ctl.next().unwrap().is_empty());
        assert_eq!(ctl.state().stimulus_index, 2);
        ctl.answer(Response::Choice(3)).unwrap();
        ctl.previous().unwrap();
        assert_eq!(ctl.state().stimulus_index, 1);
        assert_matches!(ctl.jump_to(7), Err(DrillError::UnknownStimulus(_)));
        assert_matches!(
            ctl.answer(Response::Choice(4)),
            Err(DrillError::InvalidChoice { index: 4, options: 4 })
        );

        tick_n(&mut ctl, 5);
        let events = ctl.submit().unwrap();
        let score = ctl.summary().unwrap().score.clone().unwrap();
        assert_eq!(score.correct_count, 1);
        assert_eq!(score.incorrect_count, 1);
        assert_eq!(score.unanswered_count, 1);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::AttemptReady(r) if r.score.is_some())));
        assert_eq!(ctl.state().elapsed_secs, 5);

        // no double submission
        assert_matches!(ctl.submit(), Err(DrillError::InvalidTransition { .. }));
        assert!(ctl.on_tick().is_empty());
    }

    #[test]
    fn whole_pool_expiry_completes_from_any_index() {
        let cfg = TestKind::Oir.config().with_phase_seconds(Phase::Answer, 4);
        let mut ctl = running(cfg, questions(&[0, 0, 0]));
        ctl.jump_to(1).unwrap();
        let events = tick_n(&mut ctl, 4);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::SequenceComplete(_))));
        assert_eq!(ctl.summary().unwrap().score.as_ref().unwrap().unanswered_count, 3);
    }

    #[test]
    fn navigation_is_refused_for_per_stimulus_kinds() {
        let mut ctl = running(TestKind::Wat.config(), words(3));
        assert_matches!(ctl.jump_to(2), Err(DrillError::InvalidTransition { .. }));
    }

    #[test]
    fn stale_generation_ticks_are_dropped() {
        let cfg = TestKind::Srt.config().with_phase_seconds(Phase::Respond, 2);
        let pool = StimulusPool::new(
            TestKind::Srt,
            (0..2)
                .map(|i| Stimulus::Situation(Situation { id: format!("s{i}"), text: "x".into() }))
                .collect(),
        )
        .unwrap();
        let mut ctl = running(cfg, pool);
        let first = ctl.generation().unwrap();
        tick_n(&mut ctl, 2);
        assert_eq!(ctl.state().stimulus_index, 1);

        assert!(ctl.on_clock_tick(first).is_empty());
        assert_eq!(ctl.state().seconds_remaining, 2);
    }

    #[test]
    fn abandon_stops_everything() {
        let mut ctl = running(TestKind::Wat.config(), words(2));
        ctl.on_tick();
        ctl.abandon();
        assert_eq!(ctl.status(), SessionStatus::Abandoned);
        assert!(ctl.on_tick().is_empty());
        assert!(ctl.summary().is_none());
        assert_matches!(ctl.submit(), Err(DrillError::InvalidTransition { .. }));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut ctl = running(TestKind::Oir.config(), questions(&[0, 1]));
        let before = ctl.snapshot();
        ctl.answer(Response::Choice(0)).unwrap();
        assert!(before.responses.is_empty());
        assert_eq!(ctl.state().responses.len(), 1);
    }
}
