use std::fmt;

use ariadne::{Config, Label, Report, ReportKind, Source};

use super::ParseError;

/// Renders parse errors as plain-text ariadne reports, one after another.
pub fn render_errors<'code, T: fmt::Display + 'code>(
    errors: impl IntoIterator<Item = ParseError<'code, T>>,
    file_name: &str,
    source_code: &str,
) -> String {
    let mut rendered = String::new();
    for error in errors {
        let mut report_bytes = Vec::new();
        let written = Report::build(ReportKind::Error, (file_name, error.span().into_range()))
            .with_config(Config::default().with_color(false))
            .with_message(error.to_string())
            .with_label(
                Label::new((file_name, error.span().into_range()))
                    .with_message(error.reason().to_string()),
            )
            .finish()
            .write((file_name, Source::from(source_code)), &mut report_bytes);
        match written {
            Ok(()) => rendered.push_str(&String::from_utf8_lossy(&report_bytes)),
            Err(_) => rendered.push_str(&format!("{file_name}: {error}\n")),
        }
    }
    rendered
}
