use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;
use webbrowser::Browser;

use parade::{
    kind::{Phase, ResponseMode, TimerScope},
    recorder::SaveStatus,
    response::{QuestionOutcome, Response},
    stimulus::Stimulus,
    SessionStatus,
};

use crate::{App, Notice};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

pub fn clock_text(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

impl Widget for &App<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        let kind = self.controller.kind();
        Paragraph::new(Line::from(vec![
            Span::styled(kind.to_string(), bold().fg(Color::Magenta)),
            Span::raw("  "),
            Span::styled(kind.title(), dim()),
        ]))
        .render(chunks[0], buf);

        match self.controller.status() {
            SessionStatus::Instructions => render_instructions(self, chunks[1], buf),
            SessionStatus::Selecting => render_selecting(self, chunks[1], buf),
            SessionStatus::Running => render_running(self, chunks[1], buf),
            SessionStatus::Completed | SessionStatus::Abandoned => {
                render_results(self, chunks[1], buf)
            }
        }

        if let Some(notice) = &self.notice {
            let (text, style) = match notice {
                Notice::Info(t) => (t, Style::default().fg(Color::Green)),
                Notice::Warning(t) => (t, Style::default().fg(Color::Yellow)),
                Notice::Error(t) => (t, bold().fg(Color::Red)),
            };
            Paragraph::new(Span::styled(text.as_str(), style)).render(chunks[2], buf);
        }

        Paragraph::new(Span::styled(key_hints(self), dim().add_modifier(Modifier::ITALIC)))
            .render(chunks[3], buf);
    }
}

fn key_hints(app: &App) -> String {
    let picture_hint = app
        .controller
        .current_stimulus()
        .filter(|s| s.image_url().is_some() && Browser::is_available())
        .map(|_| "  (ctrl+o) open picture")
        .unwrap_or("");

    match app.controller.status() {
        SessionStatus::Instructions => "(enter) begin  (esc) quit".into(),
        SessionStatus::Selecting => "(up/down) choose  (enter) start  (esc) quit".into(),
        SessionStatus::Running => match app.controller.config().mode {
            ResponseMode::Choice => format!(
                "(1-4) answer  (backspace) clear  (left/right) move  (tab) submit  (esc) quit{picture_hint}"
            ),
            ResponseMode::Story if app.is_writing() => {
                format!("type your story  (tab) submit  (esc) quit{picture_hint}")
            }
            ResponseMode::Story => format!("observe the picture  (esc) quit{picture_hint}"),
            ResponseMode::Offline if app.controller.config().phases.len() > 1 => {
                format!("write on your sheet  (tab) done writing  (esc) quit{picture_hint}")
            }
            ResponseMode::Offline => format!("write on your sheet  (esc) quit{picture_hint}"),
        },
        SessionStatus::Completed | SessionStatus::Abandoned => {
            if matches!(app.recorder.status(), SaveStatus::Failed(_)) {
                "(r) retry saving  (n) new session  (esc) quit".into()
            } else {
                "(n) new session  (esc) quit".into()
            }
        }
    }
}

fn render_instructions(app: &App, area: Rect, buf: &mut Buffer) {
    let config = app.controller.config();
    let phases = config
        .phases
        .iter()
        .map(|p| format!("{} {}", p.phase, clock_text(p.seconds)))
        .join(", then ");

    let timing = match config.scope {
        TimerScope::WholePool => format!("One clock for the whole test: {phases}."),
        TimerScope::PerStimulus => format!("Each item runs on its own clock: {phases}."),
    };
    let answering = match config.mode {
        ResponseMode::Choice => "Pick one option per question. Unanswered questions count as wrong.",
        ResponseMode::Story => "Watch the picture, then type a story when the write phase starts.",
        ResponseMode::Offline => "Keep pen and paper ready. Answers are written on your sheet.",
    };

    let lines = vec![
        Line::from(Span::styled(timing, bold())),
        Line::from(""),
        Line::from(answering),
        Line::from(""),
        Line::from(Span::styled(
            format!("{} items loaded.", app.loaded.len()),
            dim(),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Press Enter when you are ready.",
            bold().fg(Color::Yellow),
        )),
    ];

    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .render(area, buf);
}

fn render_selecting(app: &App, area: Rect, buf: &mut Buffer) {
    let available = app.loaded.len();
    let mut lines = vec![
        Line::from(Span::styled("How many items?", bold())),
        Line::from(""),
    ];
    for (i, count) in app.size_choices().into_iter().enumerate() {
        let marker = if i == app.selection { "> " } else { "  " };
        let style = if i == app.selection {
            bold().fg(Color::Green)
        } else {
            Style::default()
        };
        let mut label = format!("{marker}{count}");
        if count == available {
            label.push_str("  (all)");
        }
        lines.push(Line::from(Span::styled(label, style)));
    }
    Paragraph::new(lines).render(area, buf);
}

fn render_running(app: &App, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(area);

    let state = app.controller.state();
    let Some(phase) = app.controller.current_phase().copied() else {
        return;
    };

    Paragraph::new(Line::from(vec![
        Span::styled(
            format!("{}/{}", state.stimulus_index + 1, app.controller.pool().len()),
            bold(),
        ),
        Span::raw("  "),
        Span::styled(phase.phase.to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(clock_text(state.seconds_remaining), bold()),
    ]))
    .render(chunks[0], buf);

    let ratio = if phase.seconds == 0 {
        0.0
    } else {
        (state.seconds_remaining as f64 / phase.seconds as f64).clamp(0.0, 1.0)
    };
    let colour = if state.seconds_remaining <= 10 {
        Color::Red
    } else {
        Color::Green
    };
    Gauge::default()
        .gauge_style(Style::default().fg(colour))
        .ratio(ratio)
        .label("")
        .render(chunks[1], buf);

    let Some(stimulus) = app.controller.current_stimulus() else {
        return;
    };
    let body = chunks[3];

    match stimulus {
        Stimulus::Question { .. } => render_question(app, stimulus, body, buf),
        Stimulus::Picture { .. } if app.is_writing() => render_story(app, body, buf),
        Stimulus::Picture { .. } if phase.phase == Phase::Write => {
            Paragraph::new(vec![
                Line::from(Span::styled("Write your story on the sheet.", bold())),
                Line::from(Span::styled(
                    "Note the number of characters, their age, sex and mood, then the story.",
                    dim(),
                )),
            ])
            .wrap(Wrap { trim: true })
            .render(body, buf);
        }
        Stimulus::Picture { .. } => render_picture(stimulus, body, buf),
        Stimulus::Word(_) | Stimulus::Situation(_) => {
            let text = stimulus.text().unwrap_or_default();
            let max_width = body.width.max(1) as usize;
            let occupied = (text.width() as f64 / max_width as f64).ceil() as u16;
            let top = body.height.saturating_sub(occupied) / 2;
            let centred = Rect {
                y: body.y + top,
                height: body.height.saturating_sub(top),
                ..body
            };
            let style = if matches!(stimulus, Stimulus::Word(_)) {
                bold().fg(Color::Yellow)
            } else {
                bold()
            };
            Paragraph::new(Span::styled(text, style))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .render(centred, buf);
        }
    }
}

fn render_picture(stimulus: &Stimulus, area: Rect, buf: &mut Buffer) {
    let location = stimulus
        .image_url()
        .or(stimulus.image_ref())
        .unwrap_or_default();
    Paragraph::new(vec![
        Line::from(Span::styled(format!("Picture {}", stimulus.id()), bold())),
        Line::from(""),
        Line::from(Span::styled(location, Style::default().fg(Color::Cyan))),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .render(area, buf);
}

fn render_question(app: &App, stimulus: &Stimulus, area: Rect, buf: &mut Buffer) {
    let Some(question) = stimulus.as_question() else {
        return;
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(3)])
        .split(area);

    let selected = match app.controller.current_response() {
        Some(Response::Choice(i)) => Some(*i),
        _ => None,
    };

    let mut lines = Vec::new();
    if let Some(text) = &question.text {
        lines.push(Line::from(Span::styled(text.as_str(), bold())));
    }
    if let Some(location) = stimulus.image_url().or(question.image_ref.as_deref()) {
        lines.push(Line::from(Span::styled(
            format!("figure: {location}"),
            Style::default().fg(Color::Cyan),
        )));
    }
    lines.push(Line::from(""));
    for (i, option) in question.options.iter().enumerate() {
        let style = if selected == Some(i) {
            bold().fg(Color::Green)
        } else {
            Style::default()
        };
        let marker = if selected == Some(i) { "*" } else { " " };
        lines.push(Line::from(Span::styled(
            format!("{marker} {}. {option}", i + 1),
            style,
        )));
    }
    Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .render(chunks[0], buf);

    let state = app.controller.state();
    let strip: Vec<Span> = app
        .controller
        .pool()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut style = if state.responses.is_answered(s.id()) {
                Style::default().fg(Color::Green)
            } else {
                dim()
            };
            if i == state.stimulus_index {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Span::styled(format!(" {} ", i + 1), style)
        })
        .collect();
    Paragraph::new(Line::from(strip))
        .block(Block::default().borders(Borders::TOP).title(format!(
            "answered {}/{}",
            state.responses.len(),
            app.controller.pool().len()
        )))
        .wrap(Wrap { trim: false })
        .render(chunks[1], buf);
}

fn render_story(app: &App, area: Rect, buf: &mut Buffer) {
    let words = app.draft.split_whitespace().count();
    let mut lines: Vec<Line> = app.draft.split('\n').map(Line::from).collect();
    if let Some(last) = lines.last_mut() {
        last.push_span(Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)));
    }
    Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("your story ({words} words)")),
        )
        .wrap(Wrap { trim: false })
        .render(area, buf);
}

fn render_results(app: &App, area: Rect, buf: &mut Buffer) {
    let mut lines = Vec::new();

    let Some(summary) = app.controller.summary() else {
        lines.push(Line::from(Span::styled("Session abandoned.", bold().fg(Color::Yellow))));
        lines.push(Line::from("Nothing from this session was saved."));
        Paragraph::new(lines).render(area, buf);
        return;
    };

    lines.push(Line::from(Span::styled(
        format!(
            "Finished {} items in {}",
            summary.stimuli,
            clock_text(summary.elapsed_secs)
        ),
        bold(),
    )));
    lines.push(Line::from(""));

    if let Some(score) = &summary.score {
        let colour = match score.percentage {
            p if p >= 70 => Color::Green,
            p if p >= 40 => Color::Yellow,
            _ => Color::Red,
        };
        lines.push(Line::from(vec![
            Span::raw("score "),
            Span::styled(format!("{}%", score.percentage), bold().fg(colour)),
            Span::styled(
                format!("  ({}/{})", score.correct_count, score.total_count),
                dim(),
            ),
        ]));
        lines.push(Line::from(format!(
            "correct {}  incorrect {}  unanswered {}",
            score.correct_count, score.incorrect_count, score.unanswered_count
        )));
        let missed = score
            .breakdown
            .iter()
            .filter(|r| r.outcome == QuestionOutcome::Incorrect)
            .map(|r| {
                format!(
                    "{}: chose {}, answer {}",
                    r.stimulus_id,
                    r.selected.map_or(0, |i| i + 1),
                    r.correct_answer + 1
                )
            })
            .collect::<Vec<_>>();
        if !missed.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("missed", dim())));
            lines.extend(missed.into_iter().map(Line::from));
        }
        lines.push(Line::from(""));
    }

    let save_line = match app.recorder.status() {
        SaveStatus::Idle if app.controller.config().mode == ResponseMode::Offline => Span::styled(
            "Your answers are on your sheet; only the completion was logged.",
            dim(),
        ),
        SaveStatus::Idle => Span::raw(""),
        SaveStatus::Saving => Span::styled("saving...", Style::default().fg(Color::Yellow)),
        SaveStatus::Saved { ids } => Span::styled(
            format!("saved ({} record(s))", ids.len()),
            Style::default().fg(Color::Green),
        ),
        SaveStatus::Failed(failure) => Span::styled(
            format!("not saved: {}", failure.reason),
            bold().fg(Color::Red),
        ),
    };
    lines.push(Line::from(save_line));

    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .render(area, buf);
}
