// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal output: colors, log formatting, and the logger itself.

use clap::{
    Args, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use dutest_runner::runner::STATUS_TARGET;
use owo_colors::{OwoColorize, Style, style};
use std::{fmt, sync::Once};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Log lines on this target are printed without a level heading.
pub(crate) const NO_HEADING_TARGET: &str = "dutest::no_heading";

/// The environment variable holding an explicit log filter.
const LOG_ENV: &str = "DUTEST_LOG";

/// Help output styles, matching Cargo's.
pub(crate) fn clap_styles() -> Styles {
    let heading = AnsiColor::Green.on_default().effects(Effects::BOLD);
    let literal = AnsiColor::Cyan.on_default().effects(Effects::BOLD);
    Styles::styled()
        .header(heading)
        .usage(heading)
        .literal(literal)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default().effects(Effects::BOLD))
        .valid(literal)
        .invalid(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
}

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Show debug output
    #[arg(long, short, global = true, env = "DUTEST_VERBOSE")]
    pub(crate) verbose: bool,

    /// When to use colors: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN",
        env = "DUTEST_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    pub(crate) fn init(self) -> OutputContext {
        let cx = OutputContext {
            verbose: self.verbose,
            color: self.color,
        };
        init_logger(cx);
        cx
    }
}

/// Output settings resolved from the command line.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) color: Color,
}

impl OutputContext {
    /// Returns the styles used for errors.
    pub fn stderr_styles(&self) -> StderrStyles {
        if self.color.should_colorize(supports_color::Stream::Stderr) {
            StderrStyles::colorized()
        } else {
            StderrStyles::default()
        }
    }

    pub(crate) fn stdout_styles(&self) -> StdoutStyles {
        if self.color.should_colorize(supports_color::Stream::Stdout) {
            StdoutStyles::colorized()
        } else {
            StdoutStyles::default()
        }
    }

    fn default_log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub(crate) enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

fn init_logger(cx: OutputContext) {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = match std::env::var(LOG_ENV) {
            Ok(filter) if !filter.is_empty() => filter
                .parse()
                .unwrap_or_else(|error| panic!("invalid {LOG_ENV} filter `{filter}`: {error}")),
            _ => Targets::new().with_default(cx.default_log_level()),
        };

        let headings = if cx.color.should_colorize(supports_color::Stream::Stderr) {
            LevelHeadings::colorized()
        } else {
            LevelHeadings::default()
        };
        let layer = tracing_subscriber::fmt::layer()
            .event_format(LogLineFormat { headings })
            .with_writer(std::io::stderr)
            .with_filter(filter);

        tracing_subscriber::registry().with(layer).init();
    });
}

/// Formats each event as `<level>: <message> <field>=<value>...`.
///
/// Status lines and lines on [`NO_HEADING_TARGET`] are printed bare.
struct LogLineFormat {
    headings: LevelHeadings,
}

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let bare = matches!(metadata.target(), STATUS_TARGET | NO_HEADING_TARGET);
        if !bare {
            let (label, style) = self.headings.get(*metadata.level());
            write!(writer, "{}: ", label.style(style))?;
        }

        let mut fields = FieldWriter {
            writer: &mut writer,
            result: Ok(()),
        };
        event.record(&mut fields);
        fields.result?;

        writeln!(writer)
    }
}

struct FieldWriter<'a, 'w> {
    writer: &'a mut Writer<'w>,
    result: fmt::Result,
}

impl Visit for FieldWriter<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if self.result.is_err() {
            return;
        }
        self.result = match field.name() {
            "message" => write!(self.writer, "{value:?}"),
            name => write!(self.writer, " {name}={value:?}"),
        };
    }
}

#[derive(Debug, Default)]
struct LevelHeadings {
    error: Style,
    warn: Style,
    info: Style,
    debug: Style,
    trace: Style,
}

impl LevelHeadings {
    fn colorized() -> Self {
        Self {
            error: style().red().bold(),
            warn: style().yellow().bold(),
            info: style().bold(),
            debug: style().bold(),
            trace: style().dimmed(),
        }
    }

    fn get(&self, level: Level) -> (&'static str, Style) {
        match level {
            Level::ERROR => ("error", self.error),
            Level::WARN => ("warning", self.warn),
            Level::INFO => ("info", self.info),
            Level::DEBUG => ("debug", self.debug),
            _ => ("trace", self.trace),
        }
    }
}

/// Styles for error output.
#[derive(Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
}

impl StderrStyles {
    fn colorized() -> Self {
        Self {
            bold: style().bold(),
        }
    }
}

/// Styles for results summaries.
#[derive(Clone, Debug, Default)]
pub(crate) struct StdoutStyles {
    pub(crate) pass: Style,
    pub(crate) fail: Style,
    pub(crate) skip: Style,
    pub(crate) count: Style,
}

impl StdoutStyles {
    fn colorized() -> Self {
        Self {
            pass: style().green().bold(),
            fail: style().red().bold(),
            skip: style().yellow().bold(),
            count: style().bold(),
        }
    }
}
