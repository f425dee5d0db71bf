//! Name-case conversions for plugin authors.
//!
//! Proto names arrive in the casing the schema author chose (`GetBook`,
//! `book_id`, `HTTPServer`); generators usually need to re-case them for the
//! target language. These helpers only touch ASCII, which is all the proto
//! grammar allows in identifiers.

/// Convert to `snake_case`. Acronym runs are kept together
/// (`HTTPServer` becomes `http_server`).
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_is_lower =
                i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let next_is_lower = chars
                .get(i + 1)
                .map_or(false, |n| n.is_ascii_lowercase());
            if i > 0 && chars[i - 1] != '_' && (prev_is_lower || next_is_lower) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert to `PascalCase`, splitting on underscores.
pub fn pascal_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for part in name.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    out
}

/// Convert to `camelCase`, splitting on underscores.
pub fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => pascal,
    }
}
