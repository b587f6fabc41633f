use std::io::{self, IsTerminal, Write};
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

const TRANSFER_TEMPLATE: &str =
    "{spinner:.cyan} {msg:<9} [{bar:24.cyan/blue}] {bytes:>9}/{total_bytes:9} {bytes_per_sec}";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Tone {
    Step,
    Done,
    Warn,
    Fail,
}

impl Tone {
    fn badge(self) -> &'static str {
        match self {
            Self::Step => "==>",
            Self::Done => "ok:",
            Self::Warn => "warning:",
            Self::Fail => "error:",
        }
    }

    fn style(self) -> Style {
        let color = match self {
            Self::Step => AnsiColor::BrightBlue,
            Self::Done => AnsiColor::BrightGreen,
            Self::Warn => AnsiColor::BrightYellow,
            Self::Fail => AnsiColor::BrightRed,
        };
        Style::new()
            .fg_color(Some(color.into()))
            .effects(Effects::BOLD)
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct TransferProgress {
    style: OutputStyle,
    label: &'static str,
    total: u64,
    sent: u64,
    bar: Option<ProgressBar>,
    started_at: Instant,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn line(self, tone: Tone, message: &str) {
        println!("{}", render_line(self.style, tone, message));
    }

    pub(crate) fn step(self, message: &str) {
        self.line(Tone::Step, message);
    }

    pub(crate) fn done(self, message: &str) {
        self.line(Tone::Done, message);
    }

    pub(crate) fn warn(self, message: &str) {
        self.line(Tone::Warn, message);
    }

    pub(crate) fn fail(self, message: &str) {
        self.line(Tone::Fail, message);
    }

    pub(crate) fn echo<'a>(self, lines: impl IntoIterator<Item = &'a str>) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
    }

    pub(crate) fn tick(self) {
        print!(".");
        let _ = io::stdout().flush();
    }

    pub(crate) fn end_ticks(self) {
        println!();
    }

    pub(crate) fn transfer(self, label: &'static str, total: u64) -> TransferProgress {
        let bar = (self.style == OutputStyle::Rich).then(|| {
            let bar = ProgressBar::new(total.max(1));
            if let Ok(template) = ProgressStyle::with_template(TRANSFER_TEMPLATE) {
                bar.set_style(template.progress_chars("#>-"));
            }
            bar.set_message(label);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });

        TransferProgress {
            style: self.style,
            label,
            total,
            sent: 0,
            bar,
            started_at: Instant::now(),
        }
    }
}

impl TransferProgress {
    pub(crate) fn update(&mut self, sent: u64) {
        self.sent = sent;
        if let Some(bar) = &self.bar {
            bar.set_position(sent.min(self.total.max(1)));
        }
    }

    pub(crate) fn complete(mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        println!(
            "{}",
            render_transfer_summary(self.style, self.label, self.sent, self.started_at.elapsed())
        );
    }

    pub(crate) fn abandon(mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

pub(crate) fn render_line(style: OutputStyle, tone: Tone, message: &str) -> String {
    match (style, tone) {
        (OutputStyle::Plain, Tone::Step | Tone::Done) => message.to_string(),
        (OutputStyle::Plain, _) => format!("{} {message}", tone.badge()),
        (OutputStyle::Rich, _) => format!("{} {message}", paint(tone.style(), tone.badge())),
    }
}

pub(crate) fn render_transfer_summary(
    style: OutputStyle,
    label: &str,
    sent: u64,
    elapsed: Duration,
) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        (sent as f64 / secs) as u64
    } else {
        sent
    };
    let label = match style {
        OutputStyle::Plain => label.to_string(),
        OutputStyle::Rich => paint(Tone::Done.style(), label),
    };
    format!(
        "{label}: sent {} in {secs:.1}s ({}/s)",
        HumanBytes(sent),
        HumanBytes(rate)
    )
}

fn paint(style: Style, text: &str) -> String {
    format!("{}{text}{}", style.render(), style.render_reset())
}
