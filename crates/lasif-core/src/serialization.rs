use crate::domain::{LasifError, LasifResult};
use std::fs;
use std::path::Path;

/// `%.<precision>f`.
pub fn format_fixed(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return non_finite(value).to_string();
    }
    format!("{value:.precision$}", precision = precision)
}

/// `%.<precision>e`: mantissa with `precision` decimals and a signed exponent
/// of at least two digits, e.g. `-1.500000e-03`.
pub fn format_scientific(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return non_finite(value).to_string();
    }
    let rendered = format!("{value:.precision$e}", precision = precision);
    let (mantissa, exponent) = split_exponent(&rendered);
    format!("{}e{}", mantissa, signed_exponent(exponent))
}

/// Shortest round-trip representation that always reads back as a float:
/// `1.0`, `0.25`, `1e-05`, `1.5e+16`.
pub fn format_float_repr(value: f64) -> String {
    if !value.is_finite() {
        return non_finite(value).to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let shortest = format!("{value:e}");
    let (mantissa, exponent) = split_exponent(&shortest);
    if (-4..16).contains(&exponent) {
        let positional = value.to_string();
        if positional.contains('.') {
            positional
        } else {
            format!("{}.0", positional)
        }
    } else {
        format!("{}e{}", mantissa, signed_exponent(exponent))
    }
}

/// Writes `content` verbatim, mapping failures onto an `IoSystem` error
/// tagged with `code`.
pub fn write_artifact(path: &Path, content: &str, code: &'static str) -> LasifResult<()> {
    fs::write(path, content).map_err(|source| {
        LasifError::io_system(
            code,
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}

fn split_exponent(rendered: &str) -> (&str, i32) {
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse().unwrap_or(0)),
        None => (rendered, 0),
    }
}

fn signed_exponent(exponent: i32) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}{:02}", sign, exponent.abs())
}

fn non_finite(value: f64) -> &'static str {
    if value.is_nan() {
        "nan"
    } else if value.is_sign_negative() {
        "-inf"
    } else {
        "inf"
    }
}
