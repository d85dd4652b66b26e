//! Identifier normalization and case conversion.

use heck::{ToKebabCase, ToPascalCase, ToSnakeCase};

/// Normalize a raw JSON key into an identifier.
///
/// Latin diacritics are folded to ASCII, separators (whitespace, `-`, `.`)
/// become `_`, everything else outside `[A-Za-z0-9_]` is dropped. A leading
/// digit gets a `_` prefix. Returns `None` when nothing usable remains.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if c.is_whitespace() || c == '-' || c == '.' {
            out.push('_');
        } else if let Some(folded) = fold_diacritic(c) {
            out.push_str(folded);
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() || !trimmed.chars().any(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let mut ident = trimmed.to_string();
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    Some(ident)
}

fn fold_diacritic(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
        'æ' => "ae",
        'Æ' => "AE",
        'ç' => "c",
        'Ç' => "C",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'È' | 'É' | 'Ê' | 'Ë' => "E",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' => "I",
        'ñ' => "n",
        'Ñ' => "N",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "O",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' => "Y",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}

/// Class identifiers are PascalCase, `_`-prefixed when they would start
/// with a digit.
pub fn class_identifier(name: &str) -> String {
    let pascal = name.to_pascal_case();
    if pascal.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{pascal}")
    } else {
        pascal
    }
}

/// Property and method identifiers are snake_case.
pub fn member_identifier(name: &str) -> String {
    let snake = name.to_snake_case();
    if snake.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{snake}")
    } else {
        snake
    }
}

/// Namespace identifier derived from a project name: each `.`-separated
/// segment PascalCased, e.g. `acme.billing-api` -> `Acme.BillingApi`.
pub fn namespace_identifier(project_name: &str) -> String {
    project_name
        .split('.')
        .filter(|segment| !segment.to_pascal_case().is_empty())
        .map(class_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// English plural for REST collection names.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with('y')
        && !matches!(
            lower.chars().rev().nth(1),
            Some('a' | 'e' | 'i' | 'o' | 'u')
        )
        && word.len() > 1
    {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// Kebab-case plural route segment, e.g. `OrderLine` -> `order-lines`.
pub fn route_segment(name: &str) -> String {
    pluralize(&name.to_kebab_case())
}
