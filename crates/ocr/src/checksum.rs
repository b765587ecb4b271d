/// ABN weighting per the ATO specification: subtract 1 from the leading
/// digit, weight, and check the sum modulo 89.
const ABN_WEIGHTS: [u64; 11] = [10, 1, 3, 5, 7, 9, 11, 13, 15, 17, 19];

/// ACN weighting per the ASIC specification: weight the first eight
/// digits, take the complement of the sum modulo 10, compare with the
/// ninth (check) digit.
const ACN_WEIGHTS: [u64; 8] = [8, 7, 6, 5, 4, 3, 2, 1];

fn digits_of(value: &str) -> Option<Vec<u64>> {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_digit(10).map(u64::from))
        .collect()
}

/// Validate an Australian Business Number. Accepts embedded whitespace
/// ("51 824 753 556"); any other non-digit, or a digit count other than
/// 11, fails.
pub fn abn_valid(value: &str) -> bool {
    let Some(digits) = digits_of(value) else {
        return false;
    };
    if digits.len() != 11 || digits[0] == 0 {
        return false;
    }

    let sum: u64 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            let d = if i == 0 { d - 1 } else { d };
            d * ABN_WEIGHTS[i]
        })
        .sum();
    sum % 89 == 0
}

/// Validate an Australian Company Number (9 digits, mod-10 complement).
pub fn acn_valid(value: &str) -> bool {
    let Some(digits) = digits_of(value) else {
        return false;
    };
    if digits.len() != 9 {
        return false;
    }

    let sum: u64 = digits[..8]
        .iter()
        .zip(ACN_WEIGHTS.iter())
        .map(|(&d, &w)| d * w)
        .sum();
    let complement = (10 - sum % 10) % 10;
    complement == digits[8]
}
