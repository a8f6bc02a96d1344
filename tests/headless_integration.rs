use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use parade::kind::PoolSizing;
use parade::response::Response;
use parade::runtime::{DrillEvent, FixedTicker, Runner, TestEventSource};
use parade::stimulus::{Picture, Stimulus, StimulusPool, Word};
use parade::{SequenceController, SessionEvent, SessionStatus, TestKind};

fn word_pool(n: usize) -> StimulusPool {
    let words = (0..n)
        .map(|i| {
            Stimulus::Word(Word {
                id: format!("wat-{i:03}"),
                text: format!("word{i}"),
            })
        })
        .collect();
    StimulusPool::new(TestKind::Wat, words).unwrap()
}

// Headless run of a whole WAT session through Runner/TestEventSource, no TTY.
// Ten words at fifteen seconds each, nobody touches the keyboard.
#[test]
fn headless_wat_session_runs_to_completion_on_ticks() {
    let config = TestKind::Wat.config().with_sizing(PoolSizing::Fixed(10));
    let mut ctl = SequenceController::new(config, word_pool(10), "cadet").unwrap();
    ctl.begin().unwrap();
    assert_eq!(ctl.status(), SessionStatus::Running);

    let (_tx, rx) = mpsc::channel();
    let es = TestEventSource::new(rx);
    let ticker = FixedTicker::new(Duration::from_millis(1));
    let mut runner = Runner::new(es, ticker);

    let mut ticks = 0u32;
    let mut shown = 0usize;
    let mut summary = None;
    let mut records = 0usize;

    for _ in 0..1000u32 {
        if let DrillEvent::Tick = runner.step() {
            ticks += 1;
            for event in ctl.on_tick() {
                match event {
                    SessionEvent::StimulusShown { .. } => shown += 1,
                    SessionEvent::AttemptReady(_) => records += 1,
                    SessionEvent::SequenceComplete(s) => summary = Some(s),
                    _ => {}
                }
            }
        }
        if ctl.status() == SessionStatus::Completed {
            break;
        }
    }

    assert_eq!(ticks, 150);
    assert_eq!(shown, 9, "the first word is shown by begin()");
    assert_eq!(records, 0, "WAT answers stay on paper");
    let summary = summary.expect("session should complete");
    assert_eq!(summary.elapsed_secs, 150);
    assert_eq!(summary.stimuli, 10);
    assert!(summary.score.is_none());
    assert!(ctl.state().responses.is_empty());

    // the clock is dead after completion
    assert!(ctl.on_tick().is_empty());
}

// Keys and ticks interleaved on one channel, the way the terminal delivers them
#[test]
fn headless_tat_story_typed_between_ticks() {
    let pictures = vec![Stimulus::picture(Picture {
        id: "tat-01".into(),
        image_ref: "tat/tat-01.jpg".into(),
    })];
    let pool = StimulusPool::new(TestKind::Tat, pictures).unwrap();
    let config = TestKind::Tat
        .config()
        .with_sizing(PoolSizing::Fixed(1))
        .with_phase_seconds(parade::Phase::View, 2)
        .with_phase_seconds(parade::Phase::Write, 50);
    let mut ctl = SequenceController::new(config, pool, "cadet").unwrap();
    ctl.begin().unwrap();

    let (tx, rx) = mpsc::channel();
    let runner_source = TestEventSource::new(rx);
    let mut runner = Runner::new(runner_source, FixedTicker::new(Duration::from_millis(2)));

    let mut draft = String::new();
    let mut saved = None;
    let mut typed = false;

    for _ in 0..2000u32 {
        match runner.step() {
            DrillEvent::Tick => {
                for event in ctl.on_tick() {
                    if let SessionEvent::AttemptReady(record) = event {
                        saved = Some(record);
                    }
                }
            }
            DrillEvent::Key(key) => {
                if let KeyCode::Char(c) = key.code {
                    draft.push(c);
                    ctl.answer(Response::Story(draft.clone())).unwrap();
                } else if key.code == KeyCode::Tab {
                    for event in ctl.submit().unwrap() {
                        if let SessionEvent::AttemptReady(record) = event {
                            saved = Some(record);
                        }
                    }
                }
            }
            DrillEvent::Resize => {}
        }

        // once the write phase is up, type and submit
        if !typed && ctl.current_phase().map(|p| p.phase) == Some(parade::Phase::Write) {
            for c in "Brave".chars() {
                tx.send(DrillEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)))
                    .unwrap();
            }
            tx.send(DrillEvent::Key(KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE)))
                .unwrap();
            typed = true;
        }

        if ctl.status() == SessionStatus::Completed {
            break;
        }
    }

    assert_eq!(ctl.status(), SessionStatus::Completed);
    let record = saved.expect("story should be handed over for saving");
    assert_eq!(record.stimulus_id.as_deref(), Some("tat-01"));
    assert_eq!(record.response.as_deref(), Some("Brave"));
    assert!(ctl.summary().unwrap().elapsed_secs < 52);
}
