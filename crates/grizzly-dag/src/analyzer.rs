//! DependencyAnalyzer (C13): extracts candidate dependency names from SQL
//! text by scanning for identifiers following `FROM`/`JOIN`.
//!
//! Subquery analysis is out of scope; a `FROM (SELECT ...)` is scanned the
//! same as any other text, so a parenthesis following `FROM` simply yields
//! no identifier. Callers are expected to intersect the result with known
//! model/table/view names.

use std::collections::HashSet;

/// Scan `sql` case-insensitively and collect every identifier directly
/// following a `FROM` or `JOIN` token, at word boundaries.
#[must_use]
pub fn extract_references(sql: &str) -> HashSet<String> {
    let mut refs = HashSet::new();
    let tokens: Vec<&str> = sql.split(|c: char| c.is_whitespace()).collect();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
        if token.eq_ignore_ascii_case("from") || token.eq_ignore_ascii_case("join") {
            if let Some(next) = tokens.get(i + 1) {
                let ident = next.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '.');
                if !ident.is_empty() && ident.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') {
                    refs.insert(ident.to_owned());
                }
            }
        }
        i += 1;
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_from_and_join_targets() {
        let refs = extract_references("select * from orders o join customers c on o.customer_id = c.id");
        assert_eq!(refs, ["orders", "customers"].into_iter().map(str::to_owned).collect());
    }

    #[test]
    fn is_case_insensitive() {
        let refs = extract_references("SELECT * FROM Orders JOIN Customers ON 1=1");
        assert_eq!(refs, ["Orders", "Customers"].into_iter().map(str::to_owned).collect());
    }

    #[test]
    fn ignores_punctuation_around_identifiers() {
        let refs = extract_references("select * from (orders);");
        assert!(refs.is_empty(), "parenthesized subquery yields no bare identifier, by design");
    }

    #[test]
    fn handles_schema_qualified_names() {
        let refs = extract_references("select * from analytics.daily_metrics m");
        assert_eq!(refs, ["analytics.daily_metrics"].into_iter().map(str::to_owned).collect());
    }
}
