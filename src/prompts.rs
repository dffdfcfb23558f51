pub const AGE_ESTIMATE: &str = include_str!("../data/prompts/age_estimate.txt");

/// Normalize a prompt template for transport: trim the ends and collapse
/// every whitespace run (including line breaks) into a single space.
pub fn sanitize(template: &str) -> String {
    template.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize("  How old\n\tis  this?\n"), "How old is this?");
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize(" \n "), "");
    }

    #[test]
    fn test_age_prompt_is_single_line() {
        let prompt = sanitize(AGE_ESTIMATE);
        assert!(!prompt.is_empty());
        assert!(!prompt.contains('\n'));
        assert!(prompt.starts_with("Analyze this image and estimate the age of the person."));
        assert!(prompt.contains("facial features and skin texture"));
    }
}
