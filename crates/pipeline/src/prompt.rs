//! Prompt assembly
//!
//! Time-sensitive questions get web grounding: a trigger-word heuristic
//! decides, the search collaborator supplies ranked results, and the prompt
//! folds them in as numbered context lines.

use voiceloop_providers::SearchResult;

/// Utterances containing any of these go through web search.
const SEARCH_TRIGGERS: &[&str] = &[
    "latest", "today", "current", "news", "price", "weather", "score", "stock", "match", "who won",
];

/// Does this utterance want fresh information?
pub fn needs_search(utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    SEARCH_TRIGGERS.iter().any(|t| lowered.contains(t))
}

/// Fold ranked results into numbered context lines.
pub fn fold_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}: {}", i + 1, r.title, r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// User content for the generation prompt, optionally grounded.
pub fn build_user_content(utterance: &str, grounding: Option<&str>) -> String {
    match grounding {
        Some(context) if !context.is_empty() => format!(
            "Use the following web results as context:\n{context}\n\nQuestion: {utterance}"
        ),
        _ => utterance.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_words_are_detected() {
        assert!(needs_search("what's the weather like"));
        assert!(needs_search("Who won the match yesterday?"));
        assert!(needs_search("latest news on rust"));
        assert!(needs_search("GOLD PRICE today"));
    }

    #[test]
    fn plain_questions_skip_search() {
        assert!(!needs_search("tell me a joke"));
        assert!(!needs_search("how do I boil an egg"));
    }

    #[test]
    fn results_fold_numbered() {
        let results = vec![
            SearchResult {
                title: "Weather".to_string(),
                url: "https://w.example".to_string(),
                content: "Sunny, 21C".to_string(),
            },
            SearchResult {
                title: "Forecast".to_string(),
                url: String::new(),
                content: "Rain tomorrow".to_string(),
            },
        ];

        let folded = fold_results(&results);
        assert!(folded.starts_with("1. Weather: Sunny, 21C"));
        assert!(folded.contains("\n2. Forecast: Rain tomorrow"));
    }

    #[test]
    fn grounded_prompt_keeps_the_question() {
        let content = build_user_content("what's the weather", Some("1. W: sunny"));
        assert!(content.contains("1. W: sunny"));
        assert!(content.ends_with("Question: what's the weather"));

        let bare = build_user_content("what's the weather", None);
        assert_eq!(bare, "what's the weather");
    }
}
