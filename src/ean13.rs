// SPDX-License-Identifier: GPL-3.0-only

//! EAN-13 symbology tables
//!
//! Shared by the generator (digits to modules) and the scanline detector
//! (bar widths to digits). A symbol is 95 modules: start guard `101`, six
//! left digits in L or G code, centre guard `01010`, six right digits in R
//! code, end guard `101`. The first digit is not drawn; it selects the L/G
//! parity of the left half.

/// Total modules in a symbol
pub const SYMBOL_MODULES: usize = 95;

/// Digits in a complete number, check digit included
pub const DIGITS: usize = 13;

pub const START_GUARD: [bool; 3] = [true, false, true];
pub const CENTER_GUARD: [bool; 5] = [false, true, false, true, false];
pub const END_GUARD: [bool; 3] = [true, false, true];

/// L-code patterns, 7 bits, most significant bit drawn first
const L_CODES: [u8; 10] = [
    0b0001101, 0b0011001, 0b0010011, 0b0111101, 0b0100011, 0b0110001, 0b0101111, 0b0111011,
    0b0110111, 0b0001011,
];

/// Left-half parity per leading digit; bit 5 is the first left digit, 1 = G code
const PARITY: [u8; 10] = [
    0b000000, 0b001011, 0b001101, 0b001110, 0b010011, 0b011001, 0b011100, 0b010101, 0b010110,
    0b011010,
];

/// Which code set a digit was drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSet {
    L,
    G,
    R,
}

/// 7-bit pattern for `digit` in `set`
pub fn pattern(digit: u8, set: CodeSet) -> u8 {
    let l = L_CODES[digit as usize];
    match set {
        CodeSet::L => l,
        CodeSet::R => !l & 0x7f,
        CodeSet::G => reverse7(!l & 0x7f),
    }
}

fn reverse7(bits: u8) -> u8 {
    (0..7).fold(0, |acc, i| acc | (((bits >> i) & 1) << (6 - i)))
}

/// Run lengths of a 7-bit pattern; every digit has exactly four runs
pub fn run_widths(bits: u8) -> [u8; 4] {
    let mut widths = [0u8; 4];
    let mut run = 0;
    let mut previous = (bits >> 6) & 1;
    for i in (0..7).rev() {
        let bit = (bits >> i) & 1;
        if bit != previous {
            run += 1;
            previous = bit;
        }
        widths[run.min(3)] += 1;
    }
    widths
}

/// Check digit over the first twelve digits
pub fn check_digit(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .take(12)
        .enumerate()
        .map(|(i, &d)| if i % 2 == 0 { d as u32 } else { d as u32 * 3 })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Parity used for the left half when the number starts with `first`
pub fn left_sets(first: u8) -> [CodeSet; 6] {
    let parity = PARITY[first as usize];
    std::array::from_fn(|i| {
        if (parity >> (5 - i)) & 1 == 1 {
            CodeSet::G
        } else {
            CodeSet::L
        }
    })
}

/// Leading digit implied by the parity of the left half, if any
pub fn first_digit_for(sets: &[CodeSet; 6]) -> Option<u8> {
    (0..10u8).find(|&d| left_sets(d) == *sets)
}

/// Module sequence (true = bar) for thirteen digits
pub fn encode_modules(digits: &[u8; DIGITS]) -> Vec<bool> {
    fn push_bits(bits: u8, modules: &mut Vec<bool>) {
        for i in (0..7).rev() {
            modules.push((bits >> i) & 1 == 1);
        }
    }

    let mut modules = Vec::with_capacity(SYMBOL_MODULES);

    modules.extend_from_slice(&START_GUARD);
    for (digit, set) in digits[1..7].iter().zip(left_sets(digits[0])) {
        push_bits(pattern(*digit, set), &mut modules);
    }
    modules.extend_from_slice(&CENTER_GUARD);
    for digit in &digits[7..] {
        push_bits(pattern(*digit, CodeSet::R), &mut modules);
    }
    modules.extend_from_slice(&END_GUARD);

    debug_assert_eq!(modules.len(), SYMBOL_MODULES);
    modules
}

/// Best matching digit for four measured run widths
///
/// `left` selects L/G candidates, otherwise R. Returns the digit, its code
/// set and the match error (0 is perfect).
pub fn match_digit(widths: [f32; 4], left: bool) -> Option<(u8, CodeSet, f32)> {
    let total: f32 = widths.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let normalized = widths.map(|w| w * 7.0 / total);

    let sets: &[CodeSet] = if left {
        &[CodeSet::L, CodeSet::G]
    } else {
        &[CodeSet::R]
    };

    let mut best: Option<(u8, CodeSet, f32)> = None;
    for &set in sets {
        for digit in 0..10u8 {
            let expected = run_widths(pattern(digit, set));
            let error: f32 = normalized
                .iter()
                .zip(expected)
                .map(|(got, want)| (got - want as f32).abs())
                .sum();
            if best.is_none_or(|(_, _, e)| error < e) {
                best = Some((digit, set, error));
            }
        }
    }
    best
}

/// Parse a digit string into values, reporting the first non-digit
pub fn parse_digits(text: &str) -> Result<Vec<u8>, (usize, char)> {
    text.chars()
        .enumerate()
        .map(|(i, c)| c.to_digit(10).map(|d| d as u8).ok_or((i, c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_digit_known_values() {
        // 4006381333931 is a widely published sample
        let digits = parse_digits("400638133393").unwrap();
        assert_eq!(check_digit(&digits), 1);
        let digits = parse_digits("789123456789").unwrap();
        assert_eq!(check_digit(&digits), 5);
    }

    #[test]
    fn test_every_pattern_has_seven_modules_in_four_runs() {
        for digit in 0..10 {
            for set in [CodeSet::L, CodeSet::G, CodeSet::R] {
                let widths = run_widths(pattern(digit, set));
                assert_eq!(widths.iter().map(|&w| w as u32).sum::<u32>(), 7);
                assert!(widths.iter().all(|&w| w >= 1), "{digit} {set:?}");
            }
        }
    }

    #[test]
    fn test_g_code_is_mirrored_r_code() {
        assert_eq!(pattern(0, CodeSet::G), 0b0100111);
        assert_eq!(pattern(0, CodeSet::R), 0b1110010);
    }

    #[test]
    fn test_parity_identifies_first_digit() {
        for first in 0..10 {
            assert_eq!(first_digit_for(&left_sets(first)), Some(first));
        }
    }

    #[test]
    fn test_match_digit_exact_widths() {
        let widths = run_widths(pattern(7, CodeSet::G)).map(|w| w as f32 * 3.0);
        let (digit, set, error) = match_digit(widths, true).unwrap();
        assert_eq!((digit, set), (7, CodeSet::G));
        assert!(error < 0.001);
    }

    #[test]
    fn test_encode_length_and_guards() {
        let digits: [u8; 13] = [4, 0, 0, 6, 3, 8, 1, 3, 3, 3, 9, 3, 1];
        let modules = encode_modules(&digits);
        assert_eq!(modules.len(), SYMBOL_MODULES);
        assert_eq!(&modules[..3], &START_GUARD);
        assert_eq!(&modules[45..50], &CENTER_GUARD);
        assert_eq!(&modules[92..], &END_GUARD);
    }

    #[test]
    fn test_parse_digits_reports_position() {
        assert_eq!(parse_digits("12a4"), Err((2, 'a')));
    }
}
