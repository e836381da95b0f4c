//! JavaScript `Number.prototype.toString(radix)` for arbitrary doubles.
//!
//! The probes publish their hashes in this form, so the digits have to match
//! what a browser prints byte for byte, including the shortest-round-trip
//! fraction and the rounding carry.

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Binary exponent of `value` with the mantissa read as an integer.
fn exponent(value: f64) -> i32 {
    let biased = ((value.to_bits() >> 52) & 0x7ff) as i32;
    if biased == 0 {
        1 - 1075
    } else {
        biased - 1075
    }
}

fn next_double(value: f64) -> f64 {
    f64::from_bits(value.to_bits() + 1)
}

pub fn to_radix_string(value: f64, radix: u32) -> String {
    debug_assert!((2..=36).contains(&radix));
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-Infinity" } else { "Infinity" }.to_string();
    }

    let negative = value < 0.0;
    let value = value.abs();
    let radix_f = f64::from(radix);

    let mut integer = value.floor();
    let mut fraction = value - integer;
    let mut delta = (0.5 * (next_double(value) - value)).max(next_double(0.0));

    let mut fraction_digits: Vec<u32> = Vec::new();
    if fraction >= delta {
        loop {
            fraction *= radix_f;
            delta *= radix_f;
            let digit = fraction as u32;
            fraction_digits.push(digit);
            fraction -= f64::from(digit);

            if fraction > 0.5 || (fraction == 0.5 && digit & 1 == 1) {
                if fraction + delta > 1.0 {
                    // Round up, carrying through already written digits.
                    loop {
                        match fraction_digits.pop() {
                            None => {
                                integer += 1.0;
                                break;
                            }
                            Some(last) if last + 1 < radix => {
                                fraction_digits.push(last + 1);
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                    break;
                }
            }
            if fraction < delta {
                break;
            }
        }
    }

    // Digits below the double's precision print as zeros.
    let mut integer_digits: Vec<u32> = Vec::new();
    while exponent(integer / radix_f) > 0 {
        integer /= radix_f;
        integer_digits.push(0);
    }
    loop {
        let remainder = integer % radix_f;
        integer_digits.push(remainder as u32);
        integer = (integer - remainder) / radix_f;
        if integer <= 0.0 {
            break;
        }
    }

    let mut out = String::with_capacity(integer_digits.len() + fraction_digits.len() + 2);
    if negative {
        out.push('-');
    }
    out.extend(integer_digits.iter().rev().map(|d| DIGITS[*d as usize] as char));
    if !fraction_digits.is_empty() {
        out.push('.');
        out.extend(fraction_digits.iter().map(|d| DIGITS[*d as usize] as char));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers() {
        assert_eq!(to_radix_string(0.0, 36), "0");
        assert_eq!(to_radix_string(35.0, 36), "z");
        assert_eq!(to_radix_string(36.0, 36), "10");
        assert_eq!(to_radix_string(-97.0, 36), "-2p");
        assert_eq!(to_radix_string(255.0, 16), "ff");
    }

    #[test]
    fn fractions_match_browser_output() {
        assert_eq!(to_radix_string(0.5, 36), "0.i");
        assert_eq!(to_radix_string(0.1, 36), "0.3lllllllllm");
        assert_eq!(to_radix_string(1234.5678, 36), "ya.kfv9yqdpm");
        assert_eq!(to_radix_string(4409.123456, 36), "3eh.4fzyo82o");
    }

    #[test]
    fn huge_values_pad_with_zeros() {
        assert_eq!(to_radix_string(1e21, 36), "5v1j4f4ds7c000");
    }

    #[test]
    fn non_finite_values_are_spelled_out() {
        assert_eq!(to_radix_string(f64::INFINITY, 36), "Infinity");
        assert_eq!(to_radix_string(f64::NEG_INFINITY, 36), "-Infinity");
        assert_eq!(to_radix_string(f64::NAN, 36), "NaN");
    }
}
