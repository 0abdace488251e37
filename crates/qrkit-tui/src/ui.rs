//! UI rendering.

use crate::app::{App, DecodeState, InputMode, StatusLevel, View};
use crate::log_buffer::LogLevel;
use crate::theme::Palette;
use qrkit_core::display::truncate;
use qrkit_core::{GenerationView, ResultAction, ScanState, SymbolMatrix, TextTool};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
};

/// Render the entire UI.
pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::vertical([
        Constraint::Length(3), // Header
        Constraint::Length(3), // Tabs
        Constraint::Min(0),    // Content
        Constraint::Length(1), // Status line
    ])
    .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_tabs(frame, app, chunks[1]);
    render_content(frame, app, chunks[2]);
    render_status(frame, app, chunks[3]);

    if app.showing_help {
        render_help_modal(frame, app);
    }
}

fn block<'a>(p: &Palette, title: &'a str, focused: bool) -> Block<'a> {
    let border = if focused { p.accent } else { p.border };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title)
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let p = &app.palette;

    let mode = match app.input_mode {
        InputMode::Normal => Span::styled("NORMAL", Style::default().fg(p.muted)),
        InputMode::Editing => Span::styled("EDITING", Style::default().fg(p.warning).bold()),
    };

    let scan = match app.scan.state() {
        ScanState::Scanning => Span::styled(
            format!("{} camera live", app.spinner_char()),
            Style::default().fg(p.success),
        ),
        ScanState::Requesting => Span::styled("camera requested", Style::default().fg(p.warning)),
        ScanState::Idle | ScanState::Stopped => Span::styled("camera off", Style::default().fg(p.muted)),
    };

    let header_text = Line::from(vec![
        Span::styled("qrkit ", Style::default().fg(p.accent).bold()),
        Span::raw(env!("CARGO_PKG_VERSION")),
        Span::raw("  │  "),
        mode,
        Span::raw("  │  "),
        scan,
    ]);

    let header = Paragraph::new(header_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(p.border))
                .title(" QR Toolkit "),
        )
        .alignment(Alignment::Left);

    frame.render_widget(header, area);
}

/// Render the tab bar.
fn render_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let p = &app.palette;
    let titles: Vec<Line> = View::all()
        .iter()
        .enumerate()
        .map(|(i, v)| Line::from(format!("{} {}", i + 1, v.label())))
        .collect();

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(p.border)),
        )
        .select(app.current_view.index())
        .style(Style::default().fg(p.tab_inactive))
        .highlight_style(
            Style::default()
                .fg(p.tab_active)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_widget(tabs, area);
}

fn render_content(frame: &mut Frame, app: &mut App, area: Rect) {
    match app.current_view {
        View::Generate => render_generate(frame, app, area),
        View::Scan => render_scan(frame, app, area),
        View::Decode => render_decode(frame, app, area),
        View::Tools => render_tools(frame, app, area),
        View::Logs => render_logs(frame, app, area),
    }
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let p = &app.palette;
    let line = match &app.status {
        Some(status) => {
            let color = match status.level {
                StatusLevel::Info => p.primary,
                StatusLevel::Success => p.success,
                StatusLevel::Error => p.error,
            };
            Line::from(Span::styled(format!(" {}", status.text), Style::default().fg(color)))
        }
        None => Line::from(Span::styled(
            " Tab/1-5: switch  ?: help  q: quit",
            Style::default().fg(p.muted),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

/// Text field with a trailing cursor while editing.
fn input_line<'a>(p: &Palette, text: &'a str, editing: bool, placeholder: &'a str) -> Line<'a> {
    if text.is_empty() && !editing {
        return Line::from(Span::styled(placeholder, Style::default().fg(p.muted)));
    }
    let mut spans = vec![Span::raw(text)];
    if editing {
        spans.push(Span::styled("▏", Style::default().fg(p.accent)));
    }
    Line::from(spans)
}

fn action_line(p: &Palette, actions: &[ResultAction]) -> Line<'static> {
    let key_style = Style::default().fg(p.highlight).bold();
    let mut spans = Vec::new();
    for action in actions {
        spans.push(Span::styled(format!("{} ", action.key()), key_style));
        spans.push(Span::raw(format!("{}   ", action.label())));
    }
    Line::from(spans)
}

// ==================== Generate ====================

fn render_generate(frame: &mut Frame, app: &App, area: Rect) {
    let p = &app.palette;
    let editing = app.input_mode == InputMode::Editing;

    let columns =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).split(area);
    let left = Layout::vertical([
        Constraint::Min(5),    // Input
        Constraint::Length(7), // Options
    ])
    .split(columns[0]);

    let input = Paragraph::new(input_line(
        p,
        &app.generate_input,
        editing,
        "Press e to type the text to encode",
    ))
    .wrap(Wrap { trim: false })
    .block(block(p, " Text ", editing));
    frame.render_widget(input, left[0]);

    let key_style = Style::default().fg(p.highlight).bold();
    let options = vec![
        Line::from(vec![
            Span::styled("l ", key_style),
            Span::raw("Error correction: "),
            Span::styled(
                app.error_correction.to_string(),
                Style::default().fg(p.accent).bold(),
            ),
        ]),
        Line::from(vec![
            Span::styled("+/- ", key_style),
            Span::raw(format!("Size: {} px", app.render_options.size)),
        ]),
        Line::from(format!("Margin: {} modules", app.render_options.margin)),
        Line::from(format!("Characters: {}", app.generate_input.chars().count())),
        action_line(p, &app.current_actions()),
    ];
    frame.render_widget(
        Paragraph::new(options).block(block(p, " Options ", false)),
        left[1],
    );

    let preview_block = block(p, " Preview ", false);
    let inner = preview_block.inner(columns[1]);
    frame.render_widget(preview_block, columns[1]);

    let body: Vec<Line> = match app.generation_view() {
        GenerationView::Empty => vec![Line::from(Span::styled(
            "Nothing to encode yet",
            Style::default().fg(p.muted),
        ))],
        GenerationView::Pending => vec![Line::from(Span::styled(
            format!("{} Generating...", app.spinner_char()),
            Style::default().fg(p.warning),
        ))],
        GenerationView::Failed(err) => vec![Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(p.error),
        ))],
        GenerationView::Ready(image) => {
            let quiet = image.request.options().margin.min(4) as usize;
            let lines = render_qr_halfblock(&image.matrix, quiet, p);
            let needed_width = image.matrix.width + 2 * quiet;
            if needed_width > inner.width as usize || lines.len() > inner.height as usize {
                vec![
                    Line::from(Span::styled(
                        format!(
                            "Version with {} modules does not fit; enlarge the terminal",
                            image.matrix.width
                        ),
                        Style::default().fg(p.warning),
                    )),
                    Line::from(format!(
                        "Saved PNG will be {}x{} px",
                        image.image.width(),
                        image.image.height()
                    )),
                ]
            } else {
                lines
            }
        }
    };

    frame.render_widget(
        Paragraph::new(body).alignment(Alignment::Center),
        inner,
    );
}

/// Render a symbol with half-block characters, two module rows per line.
///
/// `quiet` light modules are added on each side. Colours come from the palette
/// so dark modules stay dark on any terminal background.
fn render_qr_halfblock(matrix: &SymbolMatrix, quiet: usize, p: &Palette) -> Vec<Line<'static>> {
    let width = matrix.width;
    let total = width + 2 * quiet;
    let dark = |x: usize, y: usize| {
        x >= quiet && y >= quiet && matrix.is_dark(x - quiet, y - quiet)
    };

    let mut result = Vec::with_capacity(total.div_ceil(2));
    for y in (0..total).step_by(2) {
        let spans: Vec<Span> = (0..total)
            .map(|x| {
                let top = dark(x, y);
                let bottom = y + 1 < total && dark(x, y + 1);
                let (ch, fg, bg) = match (top, bottom) {
                    (true, true) => ("█", p.qr_dark, p.qr_dark),
                    (true, false) => ("▀", p.qr_dark, p.qr_light),
                    (false, true) => ("▄", p.qr_dark, p.qr_light),
                    (false, false) => (" ", p.qr_light, p.qr_light),
                };
                Span::styled(ch, Style::default().fg(fg).bg(bg))
            })
            .collect();
        result.push(Line::from(spans));
    }
    result
}

// ==================== Scan ====================

fn render_scan(frame: &mut Frame, app: &App, area: Rect) {
    let p = &app.palette;
    let chunks = Layout::vertical([Constraint::Length(7), Constraint::Min(3)]).split(area);

    let state = app.scan.state();
    let state_style = match state {
        ScanState::Scanning => Style::default().fg(p.success).bold(),
        ScanState::Requesting => Style::default().fg(p.warning).bold(),
        ScanState::Idle | ScanState::Stopped => Style::default().fg(p.muted),
    };
    let resolution = app
        .scan
        .resolution()
        .map(|(w, h)| format!("{}x{}", w, h))
        .unwrap_or_else(|| "--".to_string());

    let key_style = Style::default().fg(p.highlight).bold();
    let camera = vec![
        Line::from(vec![
            Span::raw("State: "),
            Span::styled(state.label(), state_style),
            if state == ScanState::Scanning {
                Span::raw(format!(" {}", app.spinner_char()))
            } else {
                Span::raw("")
            },
        ]),
        Line::from(format!("Facing: {:?}", app.scan.facing())),
        Line::from(format!("Resolution: {}", resolution)),
        Line::from(format!("Frames sampled: {}", app.scan.frames_processed())),
        Line::from(vec![
            Span::styled("s ", key_style),
            Span::raw("start   "),
            Span::styled("x ", key_style),
            Span::raw("stop"),
        ]),
    ];
    frame.render_widget(
        Paragraph::new(camera).block(block(p, " Camera ", state.is_active())),
        chunks[0],
    );

    let mut result = Vec::new();
    if let Some(text) = &app.scan_result {
        result.push(Line::from(Span::styled(
            text.as_str(),
            Style::default().fg(p.fg).bold(),
        )));
        result.push(Line::from(""));
        result.push(action_line(p, &app.current_actions()));
    } else if let Some(err) = &app.scan_error {
        result.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(p.error),
        )));
    } else {
        result.push(Line::from(Span::styled(
            "No code scanned yet",
            Style::default().fg(p.muted),
        )));
    }
    frame.render_widget(
        Paragraph::new(result)
            .wrap(Wrap { trim: false })
            .block(block(p, " Result ", false)),
        chunks[1],
    );
}

// ==================== Decode ====================

fn render_decode(frame: &mut Frame, app: &App, area: Rect) {
    let p = &app.palette;
    let editing = app.input_mode == InputMode::Editing;
    let chunks = Layout::vertical([
        Constraint::Length(3), // Source
        Constraint::Length(4), // Hints
        Constraint::Min(3),    // Result
    ])
    .split(area);

    let input = Paragraph::new(input_line(
        p,
        &app.decode_input,
        editing,
        "Press e to type a path or URL, or drop an image here",
    ))
    .block(block(p, " Source ", editing));
    frame.render_widget(input, chunks[0]);

    let key_style = Style::default().fg(p.highlight).bold();
    let hints = vec![
        Line::from(vec![
            Span::styled("Enter ", key_style),
            Span::raw("decode source   "),
            Span::styled("p ", key_style),
            Span::raw("decode clipboard image"),
        ]),
        Line::from(Span::styled(
            "Accepts file paths, file:// URIs, http(s) image URLs and data:image URLs",
            Style::default().fg(p.muted),
        )),
    ];
    frame.render_widget(Paragraph::new(hints).block(block(p, " Help ", false)), chunks[1]);

    let body = match &app.decode_state {
        DecodeState::Idle => vec![Line::from(Span::styled(
            "Nothing decoded yet",
            Style::default().fg(p.muted),
        ))],
        DecodeState::Loading(label) => vec![Line::from(Span::styled(
            format!("{} Decoding {}...", app.spinner_char(), truncate(label, 60)),
            Style::default().fg(p.warning),
        ))],
        DecodeState::Done(text) => vec![
            Line::from(Span::styled(text.as_str(), Style::default().fg(p.fg).bold())),
            Line::from(""),
            action_line(p, &app.current_actions()),
        ],
        DecodeState::Failed(err) => vec![Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(p.error),
        ))],
    };
    frame.render_widget(
        Paragraph::new(body)
            .wrap(Wrap { trim: false })
            .block(block(p, " Result ", false)),
        chunks[2],
    );
}

// ==================== Tools ====================

fn render_tools(frame: &mut Frame, app: &App, area: Rect) {
    let p = &app.palette;
    let editing = app.input_mode == InputMode::Editing;
    let chunks = Layout::vertical([
        Constraint::Length(3),      // Tool selector
        Constraint::Percentage(45), // Input
        Constraint::Min(3),         // Output
        Constraint::Length(1),      // Stats
    ])
    .split(area);

    let titles: Vec<Line> = TextTool::all().iter().map(|t| Line::from(t.label())).collect();
    let selected = TextTool::all()
        .iter()
        .position(|t| *t == app.tool)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .block(block(p, " Tool (←/→) ", false))
        .select(selected)
        .style(Style::default().fg(p.tab_inactive))
        .highlight_style(Style::default().fg(p.tab_active).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, chunks[0]);

    let input = Paragraph::new(input_line(
        p,
        &app.tool_input,
        editing,
        "Press e to type, or paste text",
    ))
    .wrap(Wrap { trim: false })
    .block(block(p, " Input ", editing));
    frame.render_widget(input, chunks[1]);

    let output = match app.tool_output() {
        Ok(text) => Paragraph::new(text).style(Style::default().fg(p.fg)),
        Err(err) => Paragraph::new(err.to_string()).style(Style::default().fg(p.error)),
    };
    frame.render_widget(
        output
            .wrap(Wrap { trim: false })
            .block(block(p, " Output (y to copy) ", false)),
        chunks[2],
    );

    let stats = app.tool_stats();
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            format!(
                " {} chars  {} words  {} lines",
                stats.chars, stats.words, stats.lines
            ),
            Style::default().fg(p.muted),
        ))),
        chunks[3],
    );
}

// ==================== Logs ====================

fn render_logs(frame: &mut Frame, app: &App, area: Rect) {
    let p = &app.palette;
    let log_count = app.log_buffer.len();
    let visible_lines = area.height.saturating_sub(2) as usize;
    let scroll = app.log_scroll.min(log_count.saturating_sub(visible_lines));

    let mut lines: Vec<Line> = app
        .log_buffer
        .window(visible_lines, scroll)
        .into_iter()
        .map(|log| {
            let level_style = match log.level {
                LogLevel::Trace => Style::default().fg(p.muted),
                LogLevel::Debug => Style::default().fg(p.primary),
                LogLevel::Info => Style::default().fg(p.success),
                LogLevel::Warn => Style::default().fg(p.warning),
                LogLevel::Error => Style::default().fg(p.error),
            };

            // Shorten target if too long
            let target = if log.target.chars().count() > 20 {
                let tail: String = log.target.chars().rev().take(18).collect();
                format!("..{}", tail.chars().rev().collect::<String>())
            } else {
                log.target
            };

            Line::from(vec![
                Span::styled(format!("{:5} ", log.level.as_str()), level_style),
                Span::styled(format!("[{}] ", target), Style::default().fg(p.muted)),
                Span::raw(log.message),
            ])
        })
        .collect();

    while lines.len() < visible_lines {
        lines.insert(0, Line::from(""));
    }

    let scroll_info = if scroll > 0 {
        format!(" [↑{}]", scroll)
    } else {
        String::new()
    };

    let title = Line::from(vec![
        Span::raw(" Logs "),
        Span::styled(format!("({}) ", log_count), Style::default().fg(p.muted)),
        Span::styled(scroll_info, Style::default().fg(p.muted)),
        Span::raw(" │ ↑/↓ PgUp/PgDn End "),
    ]);

    let logs = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(p.border))
            .title(title),
    );
    frame.render_widget(logs, area);
}

// ==================== Help ====================

fn render_help_modal(frame: &mut Frame, app: &App) {
    let pal = &app.palette;
    let area = frame.area();

    let modal_width = 56.min(area.width.saturating_sub(4));
    let modal_height = 36.min(area.height.saturating_sub(4));
    let modal_x = (area.width.saturating_sub(modal_width)) / 2;
    let modal_y = (area.height.saturating_sub(modal_height)) / 2;
    let modal_area = Rect::new(modal_x, modal_y, modal_width, modal_height);

    frame.render_widget(Clear, modal_area);

    let key_style = Style::default().fg(pal.highlight).bold();
    let section_style = Style::default().fg(pal.primary).bold();
    let entry = |key: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<11}", key), key_style),
            Span::raw(desc),
        ])
    };

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled("  Global Keys", section_style)),
        entry("q / Ctrl+C", "Quit application"),
        entry("Tab", "Next tab"),
        entry("Shift+Tab", "Previous tab"),
        entry("1-5", "Jump to tab"),
        entry("T", "Toggle light/dark theme"),
        entry("e / Esc", "Start / stop editing"),
        entry("?", "Toggle this help"),
        Line::from(""),
        Line::from(Span::styled("  Generate Tab", section_style)),
        entry("l", "Cycle error correction level"),
        entry("+ / -", "Grow / shrink image size"),
        entry("y / c", "Copy text / copy image"),
        entry("s", "Save PNG to downloads"),
        entry("x", "Clear text"),
        Line::from(""),
        Line::from(Span::styled("  Scan Tab", section_style)),
        entry("s / Enter", "Start camera scan"),
        entry("x / Esc", "Stop scanning"),
        entry("y / o", "Copy result / open link"),
        Line::from(""),
        Line::from(Span::styled("  Decode Tab", section_style)),
        entry("Enter", "Decode path or URL"),
        entry("p", "Decode clipboard image"),
        entry("paste/drop", "Decode dropped file or URL"),
        Line::from(""),
        Line::from(Span::styled("  Tools Tab", section_style)),
        entry("← / →", "Previous / next tool"),
        entry("y", "Copy output"),
        Line::from(""),
        Line::from(Span::styled("  Logs", section_style)),
        entry("PgUp/PgDn", "Scroll logs up/down"),
        entry("End", "Jump to newest"),
    ];

    let help = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(pal.accent))
            .title(" Help (? or Esc to close) ")
            .style(Style::default().bg(pal.bg)),
    );
    frame.render_widget(help, modal_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(width: usize, dark: &[(usize, usize)]) -> SymbolMatrix {
        let mut modules = vec![false; width * width];
        for &(x, y) in dark {
            modules[y * width + x] = true;
        }
        SymbolMatrix { width, modules }
    }

    fn glyphs(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_halfblock_line_count_includes_quiet_zone() {
        let p = Palette::dark();
        let lines = render_qr_halfblock(&matrix(21, &[]), 4, &p);
        // 29 module rows, two per line.
        assert_eq!(lines.len(), 15);
        assert!(lines.iter().all(|l| l.spans.len() == 29));
    }

    #[test]
    fn test_halfblock_glyphs() {
        let p = Palette::light();
        // Top-left dark, below it light; next column light above dark.
        let lines = render_qr_halfblock(&matrix(2, &[(0, 0), (1, 1)]), 0, &p);
        assert_eq!(lines.len(), 1);
        assert_eq!(glyphs(&lines[0]), "▀▄");
    }

    #[test]
    fn test_halfblock_uses_palette_colors() {
        let p = Palette::dark();
        let lines = render_qr_halfblock(&matrix(1, &[(0, 0)]), 1, &p);
        let center = &lines[0].spans[1];
        assert_eq!(center.content.as_ref(), "▄");
        assert_eq!(center.style.fg, Some(p.qr_dark));
        assert_eq!(center.style.bg, Some(p.qr_light));
    }
}
