use anyhow::{Context, Result};
use crossterm::{
    cursor,
    event::{self, Event},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Stdout, Write};
use std::time::Duration;

/// What the fire draws on and reads keys from.
pub(crate) trait Surface {
    /// Current `(cols, rows)`.
    fn size(&mut self) -> Result<(u16, u16)>;
    fn put(&mut self, x: u16, y: u16, glyph: char, color: Color);
    fn refresh(&mut self) -> Result<()>;
    /// Waits at most `timeout` for one input event.
    fn poll_event(&mut self, timeout: Duration) -> Result<Option<Event>>;
    /// Leaves full-screen mode. Safe to call more than once.
    fn restore(&mut self) -> Result<()>;
}

/// One glyph as it lands on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
}

/// Row-major picture of the screen. A slot stays `None` until something is
/// drawn there, so blank margins are never written out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Frame {
    cols: u16,
    rows: u16,
    slots: Vec<Option<Cell>>,
}

impl Frame {
    pub(crate) fn blank(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            slots: vec![None; cols as usize * rows as usize],
        }
    }

    pub(crate) fn dims(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn slot(&self, x: u16, y: u16) -> Option<usize> {
        (x < self.cols && y < self.rows).then(|| y as usize * self.cols as usize + x as usize)
    }

    /// Off-frame positions are dropped.
    pub(crate) fn draw(&mut self, x: u16, y: u16, cell: Cell) {
        if let Some(i) = self.slot(x, y) {
            self.slots[i] = Some(cell);
        }
    }

    #[cfg(test)]
    pub(crate) fn at(&self, x: u16, y: u16) -> Option<Cell> {
        self.slot(x, y).and_then(|i| self.slots[i])
    }

    /// Drawn cells that differ from `shown`, or every drawn cell when `shown`
    /// is `None`. Both frames must have the same dimensions.
    fn changes<'a>(
        &'a self,
        shown: Option<&'a Frame>,
    ) -> impl Iterator<Item = (u16, u16, Cell)> + 'a {
        let cols = self.cols.max(1) as usize;
        self.slots.iter().enumerate().filter_map(move |(i, slot)| {
            let cell = (*slot)?;
            if shown.is_some_and(|s| s.slots[i] == Some(cell)) {
                return None;
            }
            Some(((i % cols) as u16, (i / cols) as u16, cell))
        })
    }
}

/* -----------------------------
   crossterm terminal
------------------------------ */

pub(crate) struct Terminal {
    out: Stdout,
    /// What the renderer has drawn so far.
    pending: Frame,
    /// What the terminal currently displays.
    shown: Frame,
    /// Set after a resize: clear and repaint everything.
    stale: bool,
    active: bool,
}

impl Terminal {
    pub(crate) fn begin() -> Result<Self> {
        terminal::enable_raw_mode().context("could not enable raw mode")?;
        let mut term = Self {
            out: io::stdout(),
            pending: Frame::blank(0, 0),
            shown: Frame::blank(0, 0),
            stale: true,
            active: true,
        };
        // from here on Drop restores the terminal if anything fails
        execute!(
            term.out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            Clear(ClearType::All)
        )?;
        term.size()?;
        Ok(term)
    }
}

impl Surface for Terminal {
    fn size(&mut self) -> Result<(u16, u16)> {
        let dims = terminal::size().context("could not query terminal size")?;
        if dims != self.pending.dims() {
            self.pending = Frame::blank(dims.0, dims.1);
            self.shown = Frame::blank(dims.0, dims.1);
            self.stale = true;
        }
        Ok(dims)
    }

    fn put(&mut self, x: u16, y: u16, glyph: char, color: Color) {
        self.pending.draw(x, y, Cell { ch: glyph, fg: color });
    }

    fn refresh(&mut self) -> Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;
        if self.stale {
            queue!(self.out, ResetColor, Clear(ClearType::All))?;
        }

        let shown = (!self.stale).then_some(&self.shown);
        let mut last_fg = None;
        for (x, y, c) in self.pending.changes(shown) {
            queue!(self.out, cursor::MoveTo(x, y))?;
            if last_fg != Some(c.fg) {
                queue!(self.out, SetForegroundColor(c.fg))?;
                last_fg = Some(c.fg);
            }
            queue!(self.out, Print(c.ch))?;
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.shown.clone_from(&self.pending);
        self.stale = false;
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        if event::poll(timeout)? {
            return Ok(Some(event::read()?));
        }
        Ok(None)
    }

    fn restore(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let shown = execute!(
            self.out,
            EndSynchronizedUpdate,
            ResetColor,
            cursor::Show,
            EnableLineWrap,
            LeaveAlternateScreen
        );
        // raw mode goes even if the escape sequences could not be written
        let raw = terminal::disable_raw_mode();
        shown?;
        raw?;
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/* -----------------------------
   In-memory surface for tests
------------------------------ */

/// Scripted input: each entry answers one poll. `None` is a poll that times
/// out with nothing pressed.
#[cfg(test)]
pub(crate) struct MemorySurface {
    pub(crate) frame: Frame,
    pub(crate) script: std::collections::VecDeque<Option<Event>>,
    pub(crate) refreshes: usize,
    pub(crate) restored: usize,
}

#[cfg(test)]
impl MemorySurface {
    pub(crate) fn new(cols: u16, rows: u16) -> Self {
        Self {
            frame: Frame::blank(cols, rows),
            script: Default::default(),
            refreshes: 0,
            restored: 0,
        }
    }

    pub(crate) fn with_events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.push_events(events);
        self
    }

    pub(crate) fn push_events(&mut self, events: impl IntoIterator<Item = Event>) {
        self.script.extend(events.into_iter().map(Some));
    }

    /// Queues `polls` empty polls.
    pub(crate) fn push_idle(&mut self, polls: usize) {
        self.script.extend(std::iter::repeat(None).take(polls));
    }

    pub(crate) fn resize(&mut self, cols: u16, rows: u16) {
        self.frame = Frame::blank(cols, rows);
    }
}

#[cfg(test)]
impl Surface for MemorySurface {
    fn size(&mut self) -> Result<(u16, u16)> {
        Ok(self.frame.dims())
    }

    fn put(&mut self, x: u16, y: u16, glyph: char, color: Color) {
        let (cols, rows) = self.frame.dims();
        assert!(x < cols && y < rows, "put outside surface: ({x}, {y})");
        self.frame.draw(x, y, Cell { ch: glyph, fg: color });
    }

    fn refresh(&mut self) -> Result<()> {
        self.refreshes += 1;
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        match self.script.pop_front() {
            Some(Some(ev)) => Ok(Some(ev)),
            _ => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn restore(&mut self) -> Result<()> {
        self.restored += 1;
        Ok(())
    }
}
