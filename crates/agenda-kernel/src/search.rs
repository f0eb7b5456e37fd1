/// Characters with meaning inside PostgREST filter expressions.
const RESERVED: [char; 6] = [',', '(', ')', '"', '\\', '*'];

/// Splits a free-text query into at most `max_terms` whitespace-separated
/// terms, each at least two characters long once reserved characters are
/// stripped. Duplicate terms are dropped.
pub fn split_terms(query: &str, max_terms: usize) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        if terms.len() >= max_terms {
            break;
        }
        let cleaned: String = raw.chars().filter(|c| !RESERVED.contains(c)).collect();
        if cleaned.chars().count() < 2 {
            continue;
        }
        if !terms.iter().any(|t| t.eq_ignore_ascii_case(&cleaned)) {
            terms.push(cleaned);
        }
    }
    terms
}

/// Case-insensitive OR match of `terms` against any of `fields`.
pub fn matches_any(terms: &[String], fields: &[&str]) -> bool {
    let haystacks: Vec<String> = fields.iter().map(|f| f.to_lowercase()).collect();
    terms.iter().any(|term| {
        let needle = term.to_lowercase();
        haystacks.iter().any(|h| h.contains(&needle))
    })
}
