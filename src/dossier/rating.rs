// src/dossier/rating.rs
use crate::dataset::{Value, PLACEHOLDER};

const STAR: char = '★';

/// Map a free-form rating cell to a star string. The first of `5`, `4`, `3`
/// found anywhere in the text wins; anything else is the placeholder dash.
pub fn stars(value: &Value) -> String {
    stars_for(&value.search_text())
}

pub fn stars_for(text: &str) -> String {
    let count = ['5', '4', '3']
        .into_iter()
        .find(|d| text.contains(*d))
        .and_then(|d| d.to_digit(10));
    match count {
        Some(n) => std::iter::repeat(STAR).take(n as usize).collect(),
        None => PLACEHOLDER.to_string(),
    }
}
