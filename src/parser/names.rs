use sqlparser::ast::{Ident, ObjectName};

/// Closing delimiter for an identifier opened by `open`, if `open` quotes.
fn closing_quote(open: char) -> Option<char> {
    match open {
        '"' => Some('"'),
        '`' => Some('`'),
        '[' => Some(']'),
        _ => None,
    }
}

fn strip_quotes(part: &str) -> &str {
    let mut chars = part.chars();
    match (chars.next().and_then(closing_quote), chars.next_back()) {
        (Some(close), Some(last)) if close == last => &part[1..part.len() - 1],
        _ => part,
    }
}

/// Split a dotted name into its unquoted parts.
///
/// Dots inside `"..."`, `` `...` `` or `[...]` do not split, so
/// `"my.db".[Orders]` yields `["my.db", "Orders"]`.
pub fn name_parts(name: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (idx, ch) in name.char_indices() {
        match quote {
            Some(close) if ch == close => quote = None,
            Some(_) => {}
            None if ch == '.' => {
                parts.push(strip_quotes(name[start..idx].trim()));
                start = idx + 1;
            }
            None => quote = closing_quote(ch),
        }
    }
    parts.push(strip_quotes(name[start..].trim()));
    parts
}

/// Lowercase, trimmed and unquoted form of one identifier.
pub fn normalize_identifier(ident: &str) -> String {
    strip_quotes(ident.trim()).to_ascii_lowercase()
}

/// Normalize a parsed identifier, ignoring its quote style.
pub fn normalize_ident(ident: &Ident) -> String {
    ident.value.to_ascii_lowercase()
}

/// Normalized last part of a possibly schema-qualified name.
///
/// `main.orders`, `"main"."Orders"` and `[Orders]` all become `orders`.
pub fn normalize_relation_name(name: &str) -> String {
    name_parts(name)
        .last()
        .map(|relation| relation.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Normalized relation of a parsed object name.
pub fn relation_of(name: &ObjectName) -> String {
    normalize_relation_name(&name.to_string())
}

/// `(qualifier, column)` of a column path such as `total`, `o.total` or
/// `main.orders.total`; the qualifier is the part right before the column.
pub fn qualified_column(path: &str) -> (Option<String>, String) {
    let parts = name_parts(path);
    match parts.as_slice() {
        [.., qualifier, column] => (
            Some(qualifier.to_ascii_lowercase()),
            column.to_ascii_lowercase(),
        ),
        _ => (None, normalize_identifier(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dots_inside_any_quote_style_do_not_split() {
        assert_eq!(name_parts(r#""my.db"."t.x""#), vec!["my.db", "t.x"]);
        assert_eq!(name_parts("`a.b`.[c.d]"), vec!["a.b", "c.d"]);
        assert_eq!(name_parts("orders"), vec!["orders"]);
    }

    #[test]
    fn relation_names_drop_schema_quotes_and_case() {
        assert_eq!(normalize_relation_name("main.orders"), "orders");
        assert_eq!(normalize_relation_name(r#""main"."Orders""#), "orders");
        assert_eq!(normalize_relation_name("`Orders`"), "orders");
        assert_eq!(normalize_relation_name("[Orders]"), "orders");
        assert_eq!(normalize_relation_name(" ORDERS "), "orders");
    }

    #[test]
    fn column_paths_keep_the_nearest_qualifier() {
        assert_eq!(qualified_column("Total"), (None, "total".to_string()));
        assert_eq!(
            qualified_column("o.total"),
            (Some("o".to_string()), "total".to_string())
        );
        assert_eq!(
            qualified_column(r#"main."Orders".total"#),
            (Some("orders".to_string()), "total".to_string())
        );
    }
}
