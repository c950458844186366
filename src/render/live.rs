//! Terminal live view, redrawn in place for every frame.

use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::Span;
use ratatui::widgets::canvas::{Canvas, Line as CanvasLine};
use ratatui::widgets::{Block, Paragraph};
use ratatui::{Frame, Terminal};

use super::{PlotFrame, RenderSink};
use crate::error::SpectrometerError;
use crate::processing::{ColorTable, Rgb};
use crate::protocol::WavelengthAxis;
use crate::service::StopToken;

const INPUT_POLL: Duration = Duration::from_millis(100);
const FOOTER: &str = "Press q to quit";
const WAITING_TITLE: &str = "Spectrometer | waiting for data";

/// Whether a key press should end the live session
pub fn is_quit(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn to_terminal_color(color: Rgb) -> Color {
    let (r, g, b) = color.to_rgb8();
    Color::Rgb(r, g, b)
}

struct InputThread {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl InputThread {
    fn spawn(stop: StopToken) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let is_active = active.clone();
        let handle = std::thread::spawn(move || {
            while is_active.load(Ordering::SeqCst) {
                match event::poll(INPUT_POLL) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::warn!("Terminal input unavailable: {}", e);
                        break;
                    }
                }
                match event::read() {
                    Ok(Event::Key(key)) if is_quit(&key) => {
                        tracing::info!("Quit requested from the live view");
                        stop.request();
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Failed to read terminal input: {}", e);
                        break;
                    }
                }
            }
        });
        Self { active, handle }
    }

    fn shutdown(self) {
        self.active.store(false, Ordering::SeqCst);
        if self.handle.join().is_err() {
            tracing::warn!("Terminal input thread panicked");
        }
    }
}

struct FrameData {
    values: Vec<u32>,
    title: String,
    title_color: Rgb,
}

/// Spectrum drawn on a terminal canvas
///
/// Each segment takes the color of its left pixel, the title is drawn in the
/// peak color. Quit keys set the shared [`StopToken`].
pub struct LiveView<B: Backend> {
    terminal: Terminal<B>,
    axis: WavelengthAxis,
    colors: ColorTable,
    y_max: u32,
    frame: Option<FrameData>,
    input: Option<InputThread>,
    raw_mode: bool,
    closed: bool,
}

impl LiveView<CrosstermBackend<Stdout>> {
    /// Take over the terminal and start listening for quit keys
    pub fn open(
        axis: WavelengthAxis,
        colors: ColorTable,
        y_max: u32,
        stop: StopToken,
    ) -> Result<Self, SpectrometerError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                let _ = disable_raw_mode();
                return Err(e.into());
            }
        };

        let mut view = Self::new(terminal, axis, colors, y_max);
        view.raw_mode = true;
        view.input = Some(InputThread::spawn(stop));
        view.draw()?;
        Ok(view)
    }
}

impl<B: Backend> LiveView<B> {
    /// Draw into an existing terminal without touching input or raw mode
    #[cfg(test)]
    pub fn with_terminal(
        terminal: Terminal<B>,
        axis: WavelengthAxis,
        colors: ColorTable,
        y_max: u32,
    ) -> Result<Self, SpectrometerError> {
        let mut view = Self::new(terminal, axis, colors, y_max);
        view.draw()?;
        Ok(view)
    }

    fn new(terminal: Terminal<B>, axis: WavelengthAxis, colors: ColorTable, y_max: u32) -> Self {
        assert_eq!(axis.len(), colors.len(), "axis and color table differ in length");
        Self {
            terminal,
            axis,
            colors,
            y_max,
            frame: None,
            input: None,
            raw_mode: false,
            closed: false,
        }
    }

    #[cfg(test)]
    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    fn draw(&mut self) -> Result<(), SpectrometerError> {
        let Self {
            terminal,
            axis,
            colors,
            y_max,
            frame,
            ..
        } = self;
        terminal.draw(|f| draw_spectrum(f, axis, colors, *y_max, frame.as_ref()))?;
        Ok(())
    }
}

fn draw_spectrum(
    f: &mut Frame,
    axis: &WavelengthAxis,
    colors: &ColorTable,
    y_max: u32,
    frame: Option<&FrameData>,
) {
    let [plot_area, footer_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(f.area());

    let title = match frame {
        Some(frame) => Span::styled(
            frame.title.clone(),
            Style::default().fg(to_terminal_color(frame.title_color)),
        ),
        None => Span::raw(WAITING_TITLE),
    };

    let x_min = axis.first().unwrap_or(0.0);
    let x_max = axis.last().unwrap_or(1.0);
    let points = axis.points();

    let canvas = Canvas::default()
        .block(Block::bordered().title(title))
        .marker(Marker::Braille)
        .x_bounds([x_min, x_max])
        .y_bounds([0.0, y_max.max(1) as f64])
        .paint(|ctx| {
            let Some(frame) = frame else {
                return;
            };
            for i in 1..frame.values.len().min(points.len()) {
                ctx.draw(&CanvasLine::new(
                    points[i - 1],
                    frame.values[i - 1] as f64,
                    points[i],
                    frame.values[i] as f64,
                    colors
                        .get(i - 1)
                        .map(to_terminal_color)
                        .unwrap_or(Color::White),
                ));
            }
        });

    f.render_widget(canvas, plot_area);
    f.render_widget(Paragraph::new(FOOTER), footer_area);
}

impl<B: Backend> RenderSink for LiveView<B> {
    fn update(&mut self, frame: &PlotFrame<'_>) -> Result<(), SpectrometerError> {
        self.frame = Some(FrameData {
            values: frame.vector.values().to_vec(),
            title: frame.title.clone(),
            title_color: frame.title_color,
        });
        self.draw()
    }

    fn save(&self, _path: &Path, _dpi: u32) -> Result<(), SpectrometerError> {
        Err(SpectrometerError::Render(
            "the terminal view cannot be saved as an image".to_string(),
        ))
    }

    fn close(&mut self) -> Result<(), SpectrometerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(input) = self.input.take() {
            input.shutdown();
        }
        if self.raw_mode {
            disable_raw_mode()?;
            execute!(io::stdout(), LeaveAlternateScreen)?;
        }
        self.terminal.show_cursor()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "terminal"
    }
}

impl<B: Backend> Drop for LiveView<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to restore the terminal: {}", e);
        }
    }
}
