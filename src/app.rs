use crate::audio::{self, AudioBackend};
use crate::config::Config;
use crate::input::{map_event, Control, InputHandler};
use crate::palette::Palette;
use crate::render::Renderer;
use crate::sim::{Grid, HeatSource};
use crate::term::{Surface, Terminal};
use anyhow::Result;
use crossterm::event::Event;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single wait for a key, so quit stays snappy at low frame rates.
const POLL_CAP: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reason {
    Quit,
    Interrupted,
    Failed,
}

impl Reason {
    pub(crate) fn status(self) -> u8 {
        match self {
            Reason::Quit | Reason::Interrupted => 0,
            Reason::Failed => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Running,
    ShuttingDown(Reason),
    Terminated(Reason),
}

/// Everything that has to be torn down on the way out.
///
/// Field order is drop order: audio goes quiet (and its thread is joined)
/// before the surface leaves full-screen mode, on unwinding too.
pub(crate) struct ShutdownContext<S: Surface> {
    pub(crate) audio: Box<dyn AudioBackend>,
    pub(crate) surface: S,
}

impl<S: Surface> ShutdownContext<S> {
    pub(crate) fn close(&mut self) -> Result<()> {
        self.audio.stop();
        self.surface.restore()
    }
}

pub(crate) struct App<S: Surface> {
    config: Config,
    grid: Grid,
    renderer: Renderer,
    input: InputHandler,
    ctx: ShutdownContext<S>,
    interrupted: Arc<AtomicBool>,
    size: (u16, u16),
    phase: Phase,
}

impl<S: Surface> App<S> {
    pub(crate) fn new(
        config: Config,
        ctx: ShutdownContext<S>,
        interrupted: Arc<AtomicBool>,
        rng: StdRng,
    ) -> Self {
        let renderer = Renderer::new(Palette::new(config.true_color), rng);
        let grid = Grid::new(HeatSource::from(&config));
        Self {
            config,
            grid,
            renderer,
            input: InputHandler::new(),
            ctx,
            interrupted,
            size: (0, 0),
            phase: Phase::Running,
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        debug!("surface {cols}x{rows}");
        self.size = (cols, rows);
        self.grid.resize(rows, cols);
    }

    /// One frame: render, then read keys until the frame deadline.
    fn tick(&mut self) -> Result<Phase> {
        let frame_start = Instant::now();

        let (cols, rows) = self.ctx.surface.size()?;
        if (cols, rows) != self.size {
            self.resize(cols, rows);
        }
        self.renderer
            .pass(&mut self.grid, &self.config, &mut self.ctx.surface)?;

        let deadline = frame_start + self.config.frame_interval();
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(Phase::ShuttingDown(Reason::Interrupted));
            }
            let wait = deadline.saturating_duration_since(Instant::now()).min(POLL_CAP);
            match self.ctx.surface.poll_event(wait)? {
                Some(Event::Resize(c, r)) => self.resize(c, r),
                Some(ev) => {
                    if let Some(action) = map_event(&ev) {
                        match self.input.apply(action, self.ctx.audio.as_mut()) {
                            Control::Continue => {}
                            Control::Quit => return Ok(Phase::ShuttingDown(Reason::Quit)),
                            Control::Interrupt => {
                                return Ok(Phase::ShuttingDown(Reason::Interrupted))
                            }
                        }
                    }
                }
                None => {}
            }
            if Instant::now() >= deadline {
                return Ok(Phase::Running);
            }
        }
    }

    /// Runs until quit, interrupt or failure. The shutdown context is closed
    /// on every path before this returns.
    pub(crate) fn run(&mut self) -> Result<Reason> {
        let mut failure = None;
        while self.phase == Phase::Running {
            self.phase = match self.tick() {
                Ok(p) => p,
                Err(e) => {
                    error!("render loop failed: {e:#}");
                    failure = Some(e);
                    Phase::ShuttingDown(Reason::Failed)
                }
            };
        }
        let reason = match self.phase {
            Phase::ShuttingDown(r) | Phase::Terminated(r) => r,
            Phase::Running => Reason::Failed,
        };

        let closed = self.ctx.close();
        self.phase = Phase::Terminated(reason);
        info!("shut down: {reason:?}");

        if let Some(e) = failure {
            if let Err(ce) = closed {
                warn!("terminal restore failed too: {ce:#}");
            }
            return Err(e);
        }
        closed?;
        Ok(reason)
    }
}

/// Wires the real terminal, the chosen audio backend and the OS interrupt
/// handler together and runs the fire.
pub(crate) fn run(config: Config) -> Result<Reason> {
    info!(
        "pyre: speed={} scale={} intensity={} offset={} height={}",
        config.speed, config.scale, config.start_intensity, config.start_offset, config.start_height
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            warn!("could not install interrupt handler: {e}");
        }
    }

    let rng = match config.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let audio = audio::select(config.audio, &config.sound);
    let surface = Terminal::begin()?;
    let mut app = App::new(config, ShutdownContext { audio, surface }, interrupted, rng);
    app.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudio;
    use crate::term::MemorySurface;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use crossterm::style::Color;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn fast() -> Config {
        Config {
            speed: 1000,
            seed: Some(5),
            ..Config::default()
        }
    }

    fn app_with<S: Surface>(surface: S, audio: Box<dyn AudioBackend>) -> App<S> {
        App::new(
            fast(),
            ShutdownContext { audio, surface },
            Arc::new(AtomicBool::new(false)),
            StdRng::seed_from_u64(5),
        )
    }

    type Journal = Rc<RefCell<Vec<&'static str>>>;

    struct JournalAudio(Journal);

    impl AudioBackend for JournalAudio {
        fn name(&self) -> &'static str {
            "journal"
        }
        fn play(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
        fn set_volume(&mut self, _volume: f32) {
            self.0.borrow_mut().push("volume");
        }
        fn stop(&mut self) {
            self.0.borrow_mut().push("audio stop");
        }
    }

    struct JournalSurface {
        inner: MemorySurface,
        journal: Journal,
        fail_refresh: bool,
    }

    impl Surface for JournalSurface {
        fn size(&mut self) -> Result<(u16, u16)> {
            self.inner.size()
        }
        fn put(&mut self, x: u16, y: u16, glyph: char, color: Color) {
            self.inner.put(x, y, glyph, color)
        }
        fn refresh(&mut self) -> Result<()> {
            if self.fail_refresh {
                anyhow::bail!("broken pipe");
            }
            self.inner.refresh()
        }
        fn poll_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
            self.inner.poll_event(timeout)
        }
        fn restore(&mut self) -> Result<()> {
            self.journal.borrow_mut().push("restore");
            self.inner.restore()
        }
    }

    #[test]
    fn quit_key_exits_cleanly_without_audio() {
        let audio = audio::select(crate::config::AudioChoice::Auto, Path::new("no-such.wav"));
        let surface = MemorySurface::new(20, 10).with_events([key(KeyCode::Char('q'))]);
        let mut app = app_with(surface, audio);

        let reason = app.run().unwrap();
        assert_eq!(reason, Reason::Quit);
        assert_eq!(reason.status(), 0);
        assert_eq!(app.phase, Phase::Terminated(Reason::Quit));
        assert_eq!(app.ctx.surface.refreshes, 1);
        assert_eq!(app.ctx.surface.restored, 1);
    }

    #[test]
    fn renders_frames_until_quit() {
        let mut surface = MemorySurface::new(12, 6);
        // five frames with nothing pressed, escape during the sixth
        surface.push_idle(5);
        surface.push_events([key(KeyCode::Esc)]);
        let mut app = app_with(surface, Box::new(NullAudio));
        assert_eq!(app.run().unwrap(), Reason::Quit);
        assert!(app.ctx.surface.refreshes > 1);
        assert_eq!(app.ctx.surface.refreshes, 6);
        assert_eq!(app.ctx.surface.frame.at(0, 5).map(|c| c.ch), Some('@'));
    }

    #[test]
    fn interrupt_flag_is_a_clean_exit() {
        let mut app = app_with(MemorySurface::new(8, 4), Box::new(NullAudio));
        app.interrupted.store(true, Ordering::SeqCst);
        let reason = app.run().unwrap();
        assert_eq!(reason, Reason::Interrupted);
        assert_eq!(reason.status(), 0);
        assert_eq!(app.ctx.surface.restored, 1);
    }

    #[test]
    fn ctrl_c_key_counts_as_interrupt() {
        let ctrl_c = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        let surface = MemorySurface::new(8, 4).with_events([ctrl_c]);
        let mut app = app_with(surface, Box::new(NullAudio));
        assert_eq!(app.run().unwrap(), Reason::Interrupted);
    }

    #[test]
    fn audio_stops_before_surface_restores() {
        let journal: Journal = Rc::default();
        let surface = JournalSurface {
            inner: MemorySurface::new(10, 5).with_events([
                key(KeyCode::Char('-')),
                key(KeyCode::Char('q')),
            ]),
            journal: journal.clone(),
            fail_refresh: false,
        };
        let mut app = app_with(surface, Box::new(JournalAudio(journal.clone())));
        app.run().unwrap();
        assert_eq!(*journal.borrow(), vec!["volume", "audio stop", "restore"]);
    }

    #[test]
    fn failure_still_restores_and_reports() {
        let journal: Journal = Rc::default();
        let surface = JournalSurface {
            inner: MemorySurface::new(10, 5),
            journal: journal.clone(),
            fail_refresh: true,
        };
        let mut app = app_with(surface, Box::new(JournalAudio(journal.clone())));
        let err = app.run().unwrap_err();
        assert!(err.to_string().contains("broken pipe"));
        assert_eq!(app.phase, Phase::Terminated(Reason::Failed));
        assert_eq!(Reason::Failed.status(), 1);
        assert_eq!(*journal.borrow(), vec!["audio stop", "restore"]);
    }

    #[test]
    fn resize_event_resets_the_grid() {
        let mut app = app_with(MemorySurface::new(10, 5), Box::new(NullAudio));
        assert_eq!(app.tick().unwrap(), Phase::Running);
        assert_eq!((app.grid.rows(), app.grid.cols()), (4, 9));

        app.ctx.surface.resize(30, 12);
        app.ctx.surface.push_events([Event::Resize(30, 12)]);
        app.tick().unwrap();
        // the event zeroed the field after this frame was drawn
        assert_eq!((app.grid.rows(), app.grid.cols()), (11, 29));
        assert!(app.grid.cells().iter().all(|&v| v == 0));
    }

    #[test]
    fn size_change_without_event_is_picked_up() {
        let mut app = app_with(MemorySurface::new(10, 5), Box::new(NullAudio));
        app.tick().unwrap();
        app.ctx.surface.resize(6, 3);
        app.tick().unwrap();
        assert_eq!((app.grid.rows(), app.grid.cols()), (2, 5));
    }

    #[test]
    fn zero_sized_surface_keeps_running() {
        let surface = MemorySurface::new(0, 0).with_events([key(KeyCode::Char('q'))]);
        let mut app = app_with(surface, Box::new(NullAudio));
        assert_eq!(app.run().unwrap(), Reason::Quit);
        assert_eq!(app.grid.rows() * app.grid.cols(), 0);
    }
}
