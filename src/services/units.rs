use std::fmt::Display;

/// Formats a raw integer amount as a decimal string scaled by `10^decimals`,
/// trimming trailing zeros: `format_units(123456789, 6) == "123.456789"`.
pub fn format_units<T: Display>(amount: T, decimals: u32) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;

    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}
