// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Human-readable rendering of [`ParseError`]s.

use std::cmp::min;
use std::ops::Range;

use ariadne::{CharSet, Config, Label, Report, ReportKind, Source};

use crate::errors::{ParseError, ParseErrorKind};

/// Verbosity levels for rendering diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticVerbosity {
    /// Single-line summary, plus the expected tokens for syntax errors.
    Summary,
    /// Summary with source context showing the error location.
    SourceContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticRenderOptions {
    pub verbosity: DiagnosticVerbosity,
    pub use_color: bool,
}

impl Default for DiagnosticRenderOptions {
    fn default() -> Self {
        Self {
            verbosity: DiagnosticVerbosity::Summary,
            use_color: false,
        }
    }
}

/// Format a [`ParseError`] according to the requested options.
///
/// Source context needs the original text. Without it, or when the error carries no span, the
/// summary form is used.
pub fn format_parse_error(
    error: &ParseError,
    source: Option<&str>,
    options: DiagnosticRenderOptions,
) -> String {
    let mut lines = vec![error.to_string()];
    if let ParseErrorKind::Syntax { expected, .. } = &error.kind {
        append_expected_tokens(&mut lines, expected);
    }

    if options.verbosity == DiagnosticVerbosity::Summary {
        return lines.join("\n");
    }
    let (Some(source), Some(span)) = (source, error.span) else {
        return lines.join("\n");
    };

    let span = clamp_span(source, span);
    let mut rendered = render_report(source, &error.kind.to_string(), span, options.use_color);
    for line in &lines[1..] {
        rendered.push_str(line);
        rendered.push('\n');
    }
    rendered
}

fn append_expected_tokens(lines: &mut Vec<String>, expected: &[String]) {
    match expected {
        [] => {}
        [only] => lines.push(format!("help: expected {only}")),
        many => lines.push(format!("help: expected one of {}", many.join(", "))),
    }
}

fn clamp_span(source: &str, (start, end): (usize, usize)) -> Range<usize> {
    let start = min(start, source.len());
    let end = min(end, source.len()).max(start);
    if start == end {
        // Point errors still deserve a visible marker.
        return start..min(source.len(), start + 1);
    }
    start..end
}

fn render_report(source: &str, summary: &str, span: Range<usize>, use_color: bool) -> String {
    let report = Report::build(ReportKind::Error, span.clone())
        .with_config(
            Config::default()
                .with_color(use_color)
                .with_char_set(CharSet::Ascii),
        )
        .with_message(summary.to_string())
        .with_label(Label::new(span).with_message("here"))
        .finish();

    let mut buffer = Vec::new();
    if report.write(Source::from(source), &mut buffer).is_err() {
        return summary.to_string();
    }
    String::from_utf8(buffer).unwrap_or_else(|_| summary.to_string())
}
