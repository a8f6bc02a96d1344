mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use itertools::Itertools;
use parade::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    kind::{Phase, PoolSizing, ResponseMode, TestConfig, TestKind},
    logging,
    recorder::{load_attempts, AttemptRecord, AttemptRecorder, CompletionLog, SaveStatus},
    response::Response,
    runtime::{CrosstermEventSource, DrillEvent, FixedTicker, Runner},
    source::{resolve_images, seed_store, BundledSource, StimulusSource, StoreSource},
    stimulus::StimulusPool,
    store::{BlobStore, DocumentStore, LocalBlobStore, SqliteDocumentStore, UrlBlobStore},
    DrillError, SequenceController, SessionEvent, SessionStatus,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
};
use time_humanize::{Accuracy, HumanTime, Tense};
use webbrowser::Browser;

/// Upper bound for the OIR time limit, from the flag or the config file
const MAX_OIR_MINUTES: u32 = 600;

/// timed SSB psychological test drills in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Practice the timed SSB psychology tests (OIR, PPDT, TAT, WAT, SRT) with the real phase timings. Answers for WAT, SRT and PPDT go on paper; OIR is scored and TAT stories are saved."
)]
pub struct Cli {
    /// test to practice
    #[clap(short = 't', long, value_enum, default_value_t = TestKind::Wat)]
    test: TestKind,

    /// number of stimuli; skips the selection screen
    #[clap(short = 'n', long)]
    count: Option<usize>,

    /// OIR time limit in minutes
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..=MAX_OIR_MINUTES as i64))]
    minutes: Option<u32>,

    /// use the stimulus packs built into the binary instead of the database
    #[clap(long)]
    bundled: bool,

    /// path of the database holding stimuli and attempts
    #[clap(long)]
    db: Option<PathBuf>,

    /// import the built-in stimulus packs into the database and exit
    #[clap(long)]
    seed: bool,

    /// list recent attempts and completed sessions and exit
    #[clap(long)]
    history: bool,

    /// user id attached to saved attempts
    #[clap(long)]
    user: Option<String>,

    /// base URL or local directory that picture references resolve against
    #[clap(long)]
    images: Option<String>,
}

impl Cli {
    fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .or_else(AppDirs::db_path)
            .unwrap_or_else(|| PathBuf::from("parade.db"))
    }

    /// Test configuration with command line overrides applied
    fn test_config(&self, cfg: &Config) -> TestConfig {
        let mut test = self.test.config();
        if self.test == TestKind::Oir {
            let minutes = self
                .minutes
                .unwrap_or(cfg.oir_minutes)
                .clamp(1, MAX_OIR_MINUTES);
            test = test.with_phase_seconds(Phase::Answer, minutes * 60);
        }
        if let Some(count) = self.count {
            test = test.with_sizing(PoolSizing::Fixed(count.max(1)));
        }
        test
    }

    fn blob_store(&self, cfg: &Config) -> Option<Box<dyn BlobStore>> {
        let base = self.images.clone().or_else(|| cfg.blob_base_url.clone())?;
        let path = PathBuf::from(&base);
        if path.is_dir() {
            Some(Box::new(LocalBlobStore::new(path)))
        } else {
            Some(Box::new(UrlBlobStore::new(base)))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Warning(String),
    Error(String),
}

pub struct App<'a> {
    pub config: TestConfig,
    pub loaded: StimulusPool,
    pub user_id: String,
    pub preferred_count: Option<usize>,
    pub controller: SequenceController,
    pub recorder: AttemptRecorder<'a, dyn DocumentStore + 'a>,
    pub completion_log: Option<CompletionLog>,
    pub selection: usize,
    pub draft: String,
    pub notice: Option<Notice>,
    unsaved: Vec<AttemptRecord>,
}

impl<'a> App<'a> {
    pub fn new(
        config: TestConfig,
        loaded: StimulusPool,
        user_id: String,
        preferred_count: Option<usize>,
        store: &'a (dyn DocumentStore + 'a),
    ) -> Result<Self, DrillError> {
        let controller = SequenceController::new(config.clone(), loaded.clone(), user_id.clone())?;
        let mut app = Self {
            config,
            loaded,
            user_id,
            preferred_count,
            controller,
            recorder: AttemptRecorder::new(store),
            completion_log: AppDirs::completion_log_path().map(CompletionLog::new),
            selection: 0,
            draft: String::new(),
            notice: None,
            unsaved: Vec::new(),
        };
        app.selection = app.preferred_selection();
        Ok(app)
    }

    /// Throw away the current session and start over at the instructions
    pub fn reset(&mut self) -> Result<(), DrillError> {
        self.controller.abandon();
        self.controller = SequenceController::new(
            self.config.clone(),
            self.loaded.clone(),
            self.user_id.clone(),
        )?;
        self.selection = self.preferred_selection();
        self.draft.clear();
        self.notice = None;
        Ok(())
    }

    /// Pool sizes offered on the selection screen. Sizes above the loaded
    /// pool collapse into one entry for the whole pool.
    pub fn size_choices(&self) -> Vec<usize> {
        let available = self.loaded.len();
        let all = self.controller.pool_choices();
        let mut choices: Vec<usize> = all.iter().copied().filter(|&c| c <= available).collect();
        if all.iter().any(|&c| c > available) && !choices.contains(&available) {
            choices.push(available);
        }
        choices
    }

    fn preferred_selection(&self) -> usize {
        let choices = self.size_choices();
        self.preferred_count
            .map(|want| {
                choices
                    .iter()
                    .position(|&c| c >= want)
                    .unwrap_or(choices.len().saturating_sub(1))
            })
            .unwrap_or(0)
    }

    pub fn has_unsaved(&self) -> bool {
        !self.unsaved.is_empty()
    }

    pub fn is_writing(&self) -> bool {
        self.controller.config().mode == ResponseMode::Story
            && self.controller.current_phase().map(|p| p.phase) == Some(Phase::Write)
    }

    /// Returns true when a new phase started and the tick schedule should restart
    pub fn apply(&mut self, events: Vec<SessionEvent>) -> bool {
        let mut phase_started = false;
        for event in events {
            match event {
                SessionEvent::PoolShortfall(shortfall) => {
                    self.notice = Some(Notice::Warning(format!(
                        "{shortfall}; continuing with {}",
                        shortfall.available
                    )));
                }
                SessionEvent::StimulusShown { .. } => {
                    if self.controller.config().mode == ResponseMode::Story {
                        self.draft.clear();
                    }
                }
                SessionEvent::PhaseStarted { .. } => phase_started = true,
                SessionEvent::AttemptReady(record) => self.unsaved.push(record),
                SessionEvent::SequenceComplete(summary) => {
                    if let Some(log) = &self.completion_log {
                        if let Err(e) = log.append(&summary) {
                            tracing::warn!(error = %e, "completion log not written");
                            self.notice = Some(Notice::Error(format!(
                                "could not update the local completion log: {e}"
                            )));
                        }
                    }
                }
                SessionEvent::Tick { .. } | SessionEvent::PhaseExpired { .. } => {}
            }
        }
        phase_started
    }

    /// Hand queued attempt records to the recorder
    pub fn save_pending(&mut self) {
        let mut result = Ok(Vec::new());
        for record in self.unsaved.drain(..) {
            result = self.recorder.persist(record);
        }
        match result {
            Ok(ids) if !ids.is_empty() => {
                self.notice = Some(Notice::Info(format!("saved {} attempt(s)", ids.len())))
            }
            Ok(_) => {}
            Err(failure) => {
                self.notice = Some(Notice::Error(format!("{failure} (press r to retry)")));
            }
        }
    }

    pub fn retry_save(&mut self) {
        if !matches!(self.recorder.status(), SaveStatus::Failed(_)) {
            return;
        }
        match self.recorder.retry() {
            Ok(ids) => {
                self.notice = Some(Notice::Info(format!("saved {} attempt(s)", ids.len())))
            }
            Err(failure) => {
                self.notice = Some(Notice::Error(format!("{failure} (press r to retry)")))
            }
        }
    }

    fn open_picture(&mut self) {
        let Some(stimulus) = self.controller.current_stimulus() else {
            return;
        };
        let Some(url) = stimulus.image_url().map(str::to_string) else {
            let reference = stimulus.image_ref().unwrap_or("this item").to_string();
            self.notice = Some(Notice::Warning(format!(
                "no image location configured for {reference} (use --images)"
            )));
            return;
        };
        if !Browser::is_available() || webbrowser::open(&url).is_err() {
            self.notice = Some(Notice::Error(format!("could not open {url}")));
        }
    }

    /// Returns (quit, phase_started)
    pub fn on_key(&mut self, key: KeyEvent) -> (bool, bool) {
        if key.code == KeyCode::Esc
            || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
        {
            self.controller.abandon();
            return (true, false);
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('o') {
            self.open_picture();
            return (false, false);
        }

        let events = match self.controller.status() {
            SessionStatus::Instructions => match key.code {
                KeyCode::Enter => report(&mut self.notice, self.controller.begin()),
                _ => None,
            },
            SessionStatus::Selecting => self.on_selecting_key(key),
            SessionStatus::Running => self.on_running_key(key),
            SessionStatus::Completed | SessionStatus::Abandoned => {
                match key.code {
                    KeyCode::Char('r') => self.retry_save(),
                    KeyCode::Char('n') if !self.has_unsaved() => {
                        let reset = self.reset();
                        report(&mut self.notice, reset);
                    }
                    _ => {}
                }
                None
            }
        };

        let phase_started = events.map(|ev| self.apply(ev)).unwrap_or(false);
        (false, phase_started)
    }

    fn on_selecting_key(&mut self, key: KeyEvent) -> Option<Vec<SessionEvent>> {
        let choices = self.size_choices();
        match key.code {
            KeyCode::Up => {
                self.selection = self.selection.saturating_sub(1);
                None
            }
            KeyCode::Down => {
                self.selection = (self.selection + 1).min(choices.len().saturating_sub(1));
                None
            }
            KeyCode::Enter => {
                let count = *choices.get(self.selection)?;
                self.preferred_count = Some(count);
                report(&mut self.notice, self.controller.choose_count(count))
            }
            _ => None,
        }
    }

    fn on_running_key(&mut self, key: KeyEvent) -> Option<Vec<SessionEvent>> {
        if key.code == KeyCode::Tab {
            return report(&mut self.notice, self.controller.submit());
        }

        let mode = self.controller.config().mode;
        match mode {
            ResponseMode::Choice => match key.code {
                KeyCode::Char(c @ '1'..='4') => {
                    let index = c as usize - '1' as usize;
                    report(&mut self.notice, self.controller.answer(Response::Choice(index)));
                    None
                }
                KeyCode::Backspace => {
                    report(&mut self.notice, self.controller.clear_answer());
                    None
                }
                KeyCode::Right => report(&mut self.notice, self.controller.next()),
                KeyCode::Left => report(&mut self.notice, self.controller.previous()),
                KeyCode::Enter => report(&mut self.notice, self.controller.submit()),
                _ => None,
            },
            ResponseMode::Story if self.is_writing() => {
                match key.code {
                    KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                        self.draft.push(c)
                    }
                    KeyCode::Enter => self.draft.push('\n'),
                    KeyCode::Backspace => {
                        self.draft.pop();
                    }
                    _ => return None,
                }
                let story = Response::Story(self.draft.clone());
                report(&mut self.notice, self.controller.answer(story));
                None
            }
            _ => None,
        }
    }
}

/// Surface a refused action as a notice instead of aborting
fn report<T>(notice: &mut Option<Notice>, result: Result<T, DrillError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            *notice = Some(Notice::Warning(e.to_string()));
            None
        }
    }
}

/// Write the config; a failure comes back as a warning line for the user
fn save_config(store: &FileConfigStore, cfg: &Config) -> Option<String> {
    store.save(cfg).err().map(|e| {
        tracing::warn!(path = %store.path().display(), error = %e, "config not saved");
        format!("warning: could not save config to {}: {e}", store.path().display())
    })
}

fn load_pool(cli: &Cli, cfg: &Config, store: &SqliteDocumentStore) -> Result<StimulusPool, DrillError> {
    let pool = if cli.bundled {
        BundledSource.load_pool(cli.test)?
    } else {
        StoreSource::new(store).ordered_by("id").load_pool(cli.test)?
    };
    match cli.blob_store(cfg) {
        Some(blobs) => resolve_images(pool, blobs.as_ref()),
        None => Ok(pool),
    }
}

fn print_history(store: &SqliteDocumentStore, user_id: &str) -> Result<(), DrillError> {
    let attempts = load_attempts(store, user_id)?;
    println!("Saved attempts for {user_id}: {}", attempts.len());
    for record in attempts.iter().take(20) {
        let age = (chrono::Local::now() - record.completed_at)
            .to_std()
            .unwrap_or_default();
        let when = HumanTime::from(age).to_text_en(Accuracy::Rough, Tense::Past);
        let detail = match (&record.score, &record.stimulus_id) {
            (Some(score), _) => format!(
                "{}/{} correct ({}%), {} unanswered",
                score.correct_count, score.total_count, score.percentage, score.unanswered_count
            ),
            (None, Some(id)) => format!(
                "{id}: {} words",
                record.response.as_deref().unwrap_or("").split_whitespace().count()
            ),
            (None, None) => String::from("-"),
        };
        println!("  {:<5} {:<18} {}", record.test_type.to_string(), when, detail);
    }

    if let Some(log) = AppDirs::completion_log_path().map(CompletionLog::new) {
        let rows = log.read_all()?;
        let per_kind = rows
            .iter()
            .counts_by(|r| r.test_type)
            .into_iter()
            .sorted()
            .map(|(kind, n)| format!("{kind}: {n}"))
            .join(", ");
        println!("Completed sessions on this machine: {} ({})", rows.len(), per_kind);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let _guard = match AppDirs::log_dir().map(|dir| (logging::init(&dir), dir)) {
        Some((Ok(guard), _)) => Some(guard),
        Some((Err(e), dir)) => {
            eprintln!("warning: logging disabled, could not write to {}: {e}", dir.display());
            None
        }
        None => {
            eprintln!("warning: logging disabled, no state directory found");
            None
        }
    };

    let config_store = FileConfigStore::new();
    let mut cfg = config_store.load();
    if let Some(user) = &cli.user {
        cfg.user_id = user.clone();
    }
    if let Some(count) = cli.count {
        cfg.remember_count(cli.test, count);
    }
    if let Some(warning) = save_config(&config_store, &cfg) {
        eprintln!("{warning}");
    }

    let store = SqliteDocumentStore::open(cli.db_path())?;

    if cli.seed {
        let written = seed_store(&store)?;
        println!("seeded {written} stimuli into {}", cli.db_path().display());
        return Ok(());
    }

    if cli.history {
        print_history(&store, &cfg.user_id)?;
        return Ok(());
    }

    let pool = match load_pool(&cli, &cfg, &store) {
        Ok(pool) => pool,
        Err(DrillError::EmptyPool(kind)) => {
            eprintln!(
                "No {kind} stimuli available. Run `parade --seed` to import the built-in packs, or pass --bundled."
            );
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let mut app = App::new(
        cli.test_config(&cfg),
        pool,
        cfg.user_id.clone(),
        cfg.default_count(cli.test),
        &store,
    )?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    if let Some(count) = app.preferred_count {
        if cfg.default_count(cli.test) != Some(count) {
            cfg.remember_count(cli.test, count);
            if let Some(warning) = save_config(&config_store, &cfg) {
                eprintln!("{warning}");
            }
        }
    }

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let mut runner = Runner::new(CrosstermEventSource::new(), FixedTicker::seconds());

    terminal.draw(|f| ui(app, f))?;

    loop {
        let phase_started = match runner.step() {
            DrillEvent::Tick => {
                let events = app.controller.on_tick();
                if events.is_empty() {
                    continue;
                }
                app.apply(events)
            }
            DrillEvent::Resize => false,
            DrillEvent::Key(key) => {
                let (quit, phase_started) = app.on_key(key);
                if quit {
                    break;
                }
                phase_started
            }
        };

        if phase_started {
            runner.reset_schedule();
        }

        if app.has_unsaved() {
            // show the saving state before the write
            terminal.draw(|f| ui(app, f))?;
            app.save_pending();
        }

        terminal.draw(|f| ui(app, f))?;
    }

    if runner.drift_events() > 0 {
        tracing::info!(drift_events = runner.drift_events(), "session ended with late ticks");
    }

    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}
