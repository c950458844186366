use super::types::{RawAdcValue, RawLine, SampleVector};

/// Parse one comma-separated token into an ADC count.
///
/// Only plain ASCII digits are accepted; signs, decimals and any other
/// characters drop the token. Digit runs wider than `u32` saturate.
fn parse_token(token: &str) -> Option<RawAdcValue> {
    let token = token.trim();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(token.parse::<RawAdcValue>().unwrap_or(RawAdcValue::MAX))
}

/// Parse a text line of comma-separated ADC counts
///
/// Malformed tokens vanish instead of failing the line, so a line is accepted
/// only when exactly `expected_len` valid counts remain.
pub fn parse_samples(input: &str, expected_len: usize) -> Option<SampleVector> {
    let trimmed = input.trim();

    if trimmed.is_empty() || !trimmed.contains(',') {
        return None;
    }

    let values: Vec<RawAdcValue> = trimmed.split(',').filter_map(parse_token).collect();

    if values.len() != expected_len {
        return None;
    }

    Some(SampleVector::from_parsed(values))
}

/// Decode and parse a raw line from the byte stream
pub fn parse_line(line: &RawLine, expected_len: usize) -> Option<SampleVector> {
    parse_samples(&line.text(), expected_len)
}
