//! Terminal presentation of the session view

use crate::messages::{Presentation, SessionState, SessionView};
use std::fmt::Write as _;
use std::io::Write as _;
use tokio::sync::watch;

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const CURSOR: char = '|';

/// Turns a session view into text. One implementation per presentation.
pub trait Presenter {
    fn render(&self, view: &SessionView) -> String;
}

pub struct ModalPresenter;

pub struct InlinePresenter;

pub fn presenter_for(presentation: Presentation) -> Box<dyn Presenter> {
    match presentation {
        Presentation::Modal => Box::new(ModalPresenter),
        Presentation::Inline => Box::new(InlinePresenter),
    }
}

/// Block-character bars scaled to the loudest sample
pub fn bars(waveform: &[f32]) -> String {
    let peak = waveform.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return LEVELS[0].to_string().repeat(waveform.len());
    }

    waveform
        .iter()
        .map(|sample| {
            let index = ((sample / peak) * (LEVELS.len() - 1) as f32).round() as usize;
            LEVELS[index.min(LEVELS.len() - 1)]
        })
        .collect()
}

/// Bars with a cursor inserted after the played portion
pub fn progress_bars(waveform: &[f32], position: usize) -> String {
    let rendered: Vec<char> = bars(waveform).chars().collect();
    let split = position.min(rendered.len());

    let mut out: String = rendered[..split].iter().collect();
    out.push(CURSOR);
    out.extend(&rendered[split..]);
    out
}

fn status_line(view: &SessionView) -> String {
    match &view.state {
        SessionState::Idle => "● idle".to_string(),
        SessionState::Recording { paused: false } => "● REC".to_string(),
        SessionState::Recording { paused: true } => "● REC (paused)".to_string(),
        SessionState::Playing {
            target,
            paused,
            position,
        } => format!(
            "{} {} [{}/{}]",
            if *paused { "❚❚" } else { "▶" },
            target.name,
            position,
            view.waveform.len()
        ),
    }
}

fn playback_line(view: &SessionView) -> Option<String> {
    match &view.state {
        SessionState::Playing { position, .. } => Some(progress_bars(&view.waveform, *position)),
        _ => None,
    }
}

impl Presenter for ModalPresenter {
    fn render(&self, view: &SessionView) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", status_line(view));

        if let SessionState::Recording { .. } = view.state {
            let _ = writeln!(out, "{}", bars(&view.waveform));
        }

        let _ = writeln!(out);
        if view.recordings.is_empty() {
            let _ = writeln!(out, "  (no recordings yet)");
        }
        for (i, recording) in view.recordings.iter().enumerate() {
            let _ = writeln!(out, "  {:>2}. {}", i + 1, recording.name);
        }

        if view.modal_open {
            let name = view.selected.as_ref().map(|r| r.name.as_str()).unwrap_or("");
            let _ = writeln!(out);
            let _ = writeln!(out, "┌ {}", name);
            match playback_line(view) {
                Some(line) => {
                    let _ = writeln!(out, "│ {}", line);
                }
                None => {
                    let _ = writeln!(out, "│ (finished, 'toggle' to replay)");
                }
            }
            let _ = writeln!(out, "└ toggle · stop · close");
        }

        out
    }
}

impl Presenter for InlinePresenter {
    fn render(&self, view: &SessionView) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", status_line(view));

        if let SessionState::Recording { .. } = view.state {
            let _ = writeln!(out, "{}", bars(&view.waveform));
        }

        let _ = writeln!(out);
        if view.recordings.is_empty() {
            let _ = writeln!(out, "  (no recordings yet)");
        }
        for (i, recording) in view.recordings.iter().enumerate() {
            let is_selected = view.selected.as_ref() == Some(recording);
            let marker = if is_selected { '>' } else { ' ' };
            let _ = writeln!(out, "{} {:>2}. {}", marker, i + 1, recording.name);

            if is_selected {
                if let Some(line) = playback_line(view) {
                    let _ = writeln!(out, "       {}", line);
                }
            }
        }

        out
    }
}

/// Redraw the terminal whenever the session publishes a new view
pub async fn render_views(mut views: watch::Receiver<SessionView>, presenter: Box<dyn Presenter>) {
    loop {
        let frame = presenter.render(&views.borrow_and_update());
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\x1b[2J\x1b[H{}", frame);
        let _ = stdout.flush();
        drop(stdout);

        if views.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Recording;

    fn view_with(state: SessionState, presentation: Presentation) -> SessionView {
        let mut view = SessionView::idle(presentation);
        view.recordings = vec![
            Recording::from_path("/memos/b.wav"),
            Recording::from_path("/memos/a.wav"),
        ];
        view.state = state;
        view
    }

    #[test]
    fn test_bars_scale_to_peak() {
        assert_eq!(bars(&[0.0, 50.0, 100.0]), "▁▅█");
        assert_eq!(bars(&[0.0, 0.0]), "▁▁");
        assert_eq!(bars(&[]), "");
    }

    #[test]
    fn test_progress_cursor_position() {
        let waveform = [1.0; 4];
        assert_eq!(progress_bars(&waveform, 0), "|████");
        assert_eq!(progress_bars(&waveform, 2), "██|██");
        assert_eq!(progress_bars(&waveform, 9), "████|");
    }

    #[test]
    fn test_modal_panel_only_when_open() {
        let target = Recording::from_path("/memos/a.wav");
        let mut view = view_with(
            SessionState::Playing {
                target: target.clone(),
                paused: false,
                position: 1,
            },
            Presentation::Modal,
        );
        view.waveform = vec![1.0, 1.0];

        let closed = ModalPresenter.render(&view);
        assert!(!closed.contains('┌'));

        view.modal_open = true;
        view.selected = Some(target);
        let open = ModalPresenter.render(&view);
        assert!(open.contains("┌ a.wav"));
        assert!(open.contains("█|█"));
        assert!(open.contains("▶ a.wav [1/2]"));
    }

    #[test]
    fn test_inline_marks_selected_row() {
        let target = Recording::from_path("/memos/a.wav");
        let mut view = view_with(
            SessionState::Playing {
                target: target.clone(),
                paused: true,
                position: 0,
            },
            Presentation::Inline,
        );
        view.selected = Some(target);
        view.waveform = vec![1.0];

        let text = InlinePresenter.render(&view);
        assert!(text.contains(">  2. a.wav"));
        assert!(text.contains("   1. b.wav"));
        assert!(text.contains("|█"));
        assert!(text.starts_with("❚❚ a.wav"));
    }

    #[test]
    fn test_recording_shows_live_bars() {
        let mut view = view_with(SessionState::Recording { paused: false }, Presentation::Modal);
        view.waveform = vec![10.0, 110.0];
        let text = presenter_for(Presentation::Modal).render(&view);
        assert!(text.starts_with("● REC\n"));
        assert!(text.contains("▂█"));
    }
}
