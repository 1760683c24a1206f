//! Prompt filters registered on every renderer.

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};

const ONES: [&str; 10] = [
    "", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];
const TEENS: [&str; 10] = [
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];
const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Uppercase the first character only; the rest is left untouched.
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// English cardinal for 0..=99. Anything else is returned as digits.
pub fn number_to_words(n: i64) -> String {
    match n {
        0 => "zero".to_string(),
        1..=9 => ONES[n as usize].to_string(),
        10..=19 => TEENS[(n - 10) as usize].to_string(),
        20..=99 => {
            let tens = TENS[(n / 10) as usize];
            match n % 10 {
                0 => tens.to_string(),
                ones => format!("{} {}", tens, ONES[ones as usize]),
            }
        }
        _ => n.to_string(),
    }
}

/// Naive English plural. `count == 1` leaves the word alone.
pub fn pluralize(word: &str, count: i64) -> String {
    if count == 1 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !["a", "e", "o", "u"].iter().any(|v| stem.ends_with(v)) {
            return format!("{}ies", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

pub(crate) fn capitalize_first_filter(value: String) -> String {
    capitalize_first(&value)
}

pub(crate) fn number_to_words_filter(value: Value) -> Result<String, Error> {
    let n = i64::try_from(value.clone()).map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("number_to_words expects an integer, got {}", value),
        )
    })?;
    Ok(number_to_words(n))
}

pub(crate) fn pluralize_filter(word: String, count: Option<i64>) -> String {
    pluralize(&word, count.unwrap_or(2))
}
