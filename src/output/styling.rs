use std::fmt::Display;

use console::{style, StyledObject};

type Styled = StyledObject<String>;

fn paint(text: impl Display) -> Styled {
    style(text.to_string())
}

/// Counts, settings and staleness warnings.
pub fn bright_yellow(text: impl Display) -> Styled {
    paint(text).bright().yellow()
}

pub fn bright_green(text: impl Display) -> Styled {
    paint(text).bright().green()
}

/// Fetch failures and rejected input.
pub fn bright_red(text: impl Display) -> Styled {
    paint(text).bright().red()
}

/// Project and build identifiers.
pub fn cyan(text: impl Display) -> Styled {
    paint(text).cyan()
}

pub fn dim(text: impl Display) -> Styled {
    paint(text).dim()
}

pub fn bright(text: impl Display) -> Styled {
    paint(text).bright()
}

pub fn magenta_bold(text: impl Display) -> Styled {
    paint(text).magenta().bold()
}

/// Pass rate colored with the table thresholds: green above 80%, yellow from
/// 50%, red below. Builds without test results are dimmed.
pub fn pass_rate(rate: f64, total: u64) -> Styled {
    let text = format!("{rate:.2}% passed");
    if total == 0 {
        dim(text)
    } else if rate > 80.0 {
        bright_green(text)
    } else if rate >= 50.0 {
        bright_yellow(text)
    } else {
        bright_red(text)
    }
}
