//! Keyword-overlap highlight extraction.
//!
//! A highlight is the subset of query terms found verbatim in a matched
//! chunk, used as a quick relevance cue distinct from the full analysis.

/// Maximum number of highlight terms returned per chunk.
const MAX_HIGHLIGHTS: usize = 5;

/// Extract up to five query terms present in the chunk.
///
/// Both strings are tokenized on whitespace, case-insensitively, with
/// punctuation trimmed from token edges (so `"Python,"` matches `python`).
/// Matching terms are returned in chunk-order of first occurrence,
/// deduplicated and joined with `", "`. Returns an empty string when there
/// is no overlap. Pure function, no side effects.
pub fn extract_highlights(chunk: &str, query: &str) -> String {
    let query_terms: std::collections::HashSet<String> = query
        .split_whitespace()
        .filter_map(normalize_token)
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut highlights = Vec::new();

    for word in chunk.split_whitespace() {
        let Some(word) = normalize_token(word) else {
            continue;
        };
        if query_terms.contains(&word) && seen.insert(word.clone()) {
            highlights.push(word);
            if highlights.len() == MAX_HIGHLIGHTS {
                break;
            }
        }
    }

    highlights.join(", ")
}

/// Lowercase a whitespace token and trim non-alphanumeric edges.
/// Returns `None` for tokens that are pure punctuation.
fn normalize_token(word: &str) -> Option<String> {
    let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overlap_returns_empty() {
        assert_eq!(extract_highlights("graphic design portfolio", "rust compiler"), "");
    }

    #[test]
    fn test_case_insensitive_match() {
        let out = extract_highlights("Senior Python Developer", "python experience");
        assert_eq!(out, "python");
    }

    #[test]
    fn test_punctuation_trimmed_from_tokens() {
        let out = extract_highlights("5 years Python, Django, AWS", "Python backend experience");
        assert_eq!(out, "python");
    }

    #[test]
    fn test_chunk_order_of_first_occurrence() {
        let out = extract_highlights("django before python here", "python django");
        assert_eq!(out, "django, python");
    }

    #[test]
    fn test_deduplicates_repeated_terms() {
        let out = extract_highlights("python python python aws", "python aws");
        assert_eq!(out, "python, aws");
    }

    #[test]
    fn test_capped_at_five_terms() {
        let chunk = "a b c d e f g";
        let query = "a b c d e f g";
        let out = extract_highlights(chunk, query);
        assert_eq!(out, "a, b, c, d, e");
    }

    #[test]
    fn test_result_is_subset_of_query_terms() {
        let chunk = "Backend engineer with Python and Django experience.";
        let query = "Python backend experience";
        let out = extract_highlights(chunk, query);
        assert!(!out.is_empty());
        for term in out.split(", ") {
            assert!(
                query.to_lowercase().split_whitespace().any(|q| q == term),
                "unexpected term: {}",
                term
            );
        }
    }
}
