// src/base/name.rs
//! Dataset names derived from body filenames.

use crate::error::{RepoError, Result};

const DIGIT_PREFIX: &str = "dataset_";

/// Derive a dataset name from a filename:
/// `"Ten Movies (2018).csv"` → `ten_movies_2018`, `"2018_winners.json"` →
/// `dataset_2018_winners`, `"TenMoviesAndLengths.csv"` → `ten_movies_and_lengths`.
pub fn infer_name(filename: &str) -> String {
    let base = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(filename);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };

    let mut out = String::with_capacity(stem.len());
    let mut prev: Option<char> = None;
    let mut pending_sep = false;
    for c in stem.chars() {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() || c == '-' {
            // camelCase boundary
            if c.is_ascii_uppercase() && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit()) {
                pending_sep = true;
            }
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
        prev = Some(c);
    }

    if out.is_empty() {
        return "dataset".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, DIGIT_PREFIX);
    }
    out
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

// Hard stop for name generation.
const MAX_SUFFIX: usize = 10_000;

/// First of `base_1`, `base_2`, ... for which `taken` is false.
pub fn generate_available_name(base: &str, taken: impl Fn(&str) -> Result<bool>) -> Result<String> {
    for n in 1..=MAX_SUFFIX {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(RepoError::NameCollision(base.to_string()))
}
