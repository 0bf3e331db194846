/// Round `value` to `places` decimal places, halves away from zero.
///
/// This is the single rounding rule used for every derived metric.
///
/// # Examples
///
/// ```
/// use shaker_core::formatting::round_to;
///
/// assert_eq!(round_to(51.416, 2), 51.42);
/// assert_eq!(round_to(2.5, 0), 3.0);
/// assert_eq!(round_to(-2.5, 0), -3.0);
/// ```
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Format a number with thousands separators and a fixed number of decimals.
///
/// # Examples
///
/// ```
/// use shaker_core::formatting::format_number;
///
/// assert_eq!(format_number(11437.0, 0), "11,437");
/// assert_eq!(format_number(1234.5, 1), "1,234.5");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let rounded = round_to(value.abs(), decimals);

    let text = format!("{:.prec$}", rounded, prec = decimals as usize);
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let grouped = group_thousands(int_part);
    let body = match frac_part {
        Some(f) => format!("{}.{}", grouped, f),
        None => grouped,
    };

    if negative && rounded != 0.0 {
        format!("-{}", body)
    } else {
        body
    }
}

/// Format a percentage with one decimal, e.g. `"64.3%"`.
pub fn format_percent(value: f64) -> String {
    format!("{}%", format_number(value, 1))
}

/// Size of a byte buffer in megabytes, rounded to 2 places.
pub fn size_mb(bytes: usize) -> f64 {
    round_to(bytes as f64 / (1024.0 * 1024.0), 2)
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
