//! Requirement complexity scoring and scope degradation.
//!
//! [`ComplexityClassifier::classify`] turns free text into a
//! [`ComplexityProfile`] that picks the generation strategy, and
//! [`ComplexityClassifier::degrade`] produces the narrower requirement
//! variants used on retries.

use std::sync::LazyLock;

use hive_types::{ComplexityLevel, ComplexityProfile, DegradationLevel, GenerationStrategy};
use regex::Regex;

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "multiple",
    "many",
    "various",
    "several",
    "complex",
    "advanced",
    "sophisticated",
    "comprehensive",
    "detailed",
];

const RELATIONSHIP_KEYWORDS: &[&str] = &[
    "relationship",
    "related",
    "linked",
    "connected",
    "belongs to",
    "has many",
    "many to many",
    "one to many",
    "foreign key",
];

const FEATURE_KEYWORDS: &[&str] = &[
    "search",
    "filter",
    "pagination",
    "sort",
    "export",
    "chart",
    "graph",
    "analytics",
    "dashboard",
    "report",
    "notification",
    "email",
    "authentication",
    "authorization",
];

/// Entity vocabulary: canonical name and a whole-word pattern.
const ENTITY_PATTERNS: &[(&str, &str)] = &[
    ("user", r"\b(user|users)\b"),
    ("post", r"\b(post|posts|article|articles)\b"),
    ("comment", r"\b(comment|comments)\b"),
    ("product", r"\b(product|products)\b"),
    ("order", r"\b(order|orders)\b"),
    ("category", r"\b(category|categories)\b"),
    ("workout", r"\b(workout|workouts)\b"),
    ("exercise", r"\b(exercise|exercises)\b"),
    ("session", r"\b(session|sessions)\b"),
    ("goal", r"\b(goal|goals)\b"),
    ("achievement", r"\b(achievement|achievements)\b"),
    ("routine", r"\b(routine|routines)\b"),
    ("set", r"\b(set|sets)\b"),
    ("rep", r"\b(rep|reps)\b"),
    ("progress", r"\b(progress|tracking)\b"),
];

static ENTITY_REGEXES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    ENTITY_PATTERNS
        .iter()
        .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (*name, re)))
        .collect()
});

/// (label, trigger substrings)
const CORE_FEATURES: &[(&str, &[&str])] = &[
    ("Create operations", &["create", "add"]),
    ("Read operations", &["read", "view", "list"]),
    ("Update operations", &["update", "edit", "modify"]),
    ("Delete operations", &["delete", "remove"]),
];

const ADVANCED_FEATURES: &[(&str, &[&str])] = &[
    ("Search functionality", &["search"]),
    ("Filtering", &["filter"]),
    ("Pagination", &["pagination", "page"]),
    ("Sorting", &["sort"]),
    ("Charts and analytics", &["chart", "graph", "analytics"]),
    ("Data export", &["export"]),
    ("Notifications", &["notification"]),
    ("Email integration", &["email"]),
];

const FULL_CRUD: &str = "Full CRUD operations";

/// Scores requirement text. Stateless; every method is a pure function of its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityClassifier;

impl ComplexityClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, requirement: &str) -> ComplexityProfile {
        let lower = requirement.to_lowercase();
        let word_count = requirement.split_whitespace().count();

        let complexity_hits = count_hits(&lower, COMPLEXITY_KEYWORDS);
        let relationship_hits = count_hits(&lower, RELATIONSHIP_KEYWORDS);
        let feature_hits = count_hits(&lower, FEATURE_KEYWORDS);

        let detected_entities = detect_entities(&lower);
        let estimated_unit_count = detected_entities.len().max(1);

        let raw = complexity_hits as f64 * 10.0
            + relationship_hits as f64 * 15.0
            + feature_hits as f64 * 8.0
            + estimated_unit_count as f64 * 12.0
            + word_count as f64 * 0.1;
        let score = raw.min(100.0) as u32;

        let level = ComplexityLevel::from_score(score);
        let strategy = match level {
            ComplexityLevel::Complex => GenerationStrategy::Chunked,
            _ => GenerationStrategy::SingleShot,
        };

        let core_features = matched_labels(&lower, CORE_FEATURES);
        let core_features = if core_features.is_empty() {
            vec![FULL_CRUD.to_string()]
        } else {
            core_features
        };
        let advanced_features = matched_labels(&lower, ADVANCED_FEATURES);
        let simplification_suggestions = suggestions(&lower, level, &advanced_features);

        ComplexityProfile {
            score,
            level,
            estimated_unit_count,
            detected_entities,
            core_features,
            advanced_features,
            strategy,
            word_count,
            has_relationships: relationship_hits > 0,
            has_advanced_features: feature_hits > 2,
            simplification_suggestions,
        }
    }

    /// Derive a narrower requirement. Higher levels never widen scope.
    pub fn degrade(&self, requirement: &str, level: DegradationLevel) -> String {
        let profile = self.classify(requirement);
        match level {
            DegradationLevel::Light => {
                let mut text = format!(
                    "{}\n\nNOTE: Focus on core operations first.",
                    requirement.trim_end()
                );
                if !profile.advanced_features.is_empty() {
                    let deferred: Vec<&str> = profile
                        .advanced_features
                        .iter()
                        .take(2)
                        .map(String::as_str)
                        .collect();
                    text.push_str(&format!(
                        " Advanced features ({}) can be added later.",
                        deferred.join(", ")
                    ));
                }
                text
            }
            DegradationLevel::Moderate => {
                let n = profile.estimated_unit_count;
                format!(
                    "Create a basic application with {n} main entities{} supporting {}. \
                     Include only basic relationships between entities. \
                     Defer advanced features for later implementation.",
                    entity_list(&profile.detected_entities, n),
                    profile.core_features.join(", ")
                )
            }
            DegradationLevel::Minimal => {
                let n = profile.estimated_unit_count;
                let m = n.saturating_sub(2).max(2).min(n);
                format!(
                    "Create a simple application with {m} core entities{}. \
                     Focus on basic create, read, update and delete operations only. \
                     No advanced features.",
                    entity_list(&profile.detected_entities, m)
                )
            }
        }
    }
}

fn count_hits(lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| lower.contains(*k)).count()
}

fn detect_entities(lower: &str) -> Vec<String> {
    ENTITY_REGEXES
        .iter()
        .filter(|(_, re)| re.is_match(lower))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn matched_labels(lower: &str, table: &[(&str, &[&str])]) -> Vec<String> {
    table
        .iter()
        .filter(|(_, triggers)| triggers.iter().any(|t| lower.contains(t)))
        .map(|(label, _)| label.to_string())
        .collect()
}

fn entity_list(entities: &[String], n: usize) -> String {
    if entities.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = entities.iter().take(n).map(String::as_str).collect();
    format!(" ({})", names.join(", "))
}

fn suggestions(lower: &str, level: ComplexityLevel, advanced: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    match level {
        ComplexityLevel::Complex => {
            out.push("Focus on core CRUD operations first".to_string());
            if !advanced.is_empty() {
                let first: Vec<&str> = advanced.iter().take(3).map(String::as_str).collect();
                out.push(format!("Defer advanced features: {}", first.join(", ")));
            }
            if lower.contains("chart") || lower.contains("graph") {
                out.push("Defer charts and analytics to a later phase".to_string());
            }
            if lower.contains("notification") || lower.contains("email") {
                out.push("Defer notifications and email to a later phase".to_string());
            }
            out.push("Reduce the number of entities by focusing on the main ones".to_string());
            out.push("Simplify relationships (start with one-to-many only)".to_string());
        }
        ComplexityLevel::Moderate if advanced.len() > 3 => {
            out.push("Consider implementing advanced features in a later phase".to_string());
        }
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classify(text: &str) -> ComplexityProfile {
        ComplexityClassifier::new().classify(text)
    }

    #[test]
    fn entity_vocabulary_compiles() {
        assert_eq!(ENTITY_REGEXES.len(), ENTITY_PATTERNS.len());
    }

    #[test]
    fn empty_requirement_is_simple() {
        let p = classify("");
        assert_eq!(p.level, ComplexityLevel::Simple);
        assert_eq!(p.strategy, GenerationStrategy::SingleShot);
        assert_eq!(p.estimated_unit_count, 1);
        assert_eq!(p.score, 12);
        assert_eq!(p.core_features, vec![FULL_CRUD.to_string()]);
        assert!(p.advanced_features.is_empty());
        assert_eq!(p.word_count, 0);
    }

    #[test]
    fn simple_blog_scores_low() {
        let p = classify("Create a simple blog with posts and comments");
        // 2 entities * 12 + 8 words * 0.1 = 24.8
        assert_eq!(p.score, 24);
        assert_eq!(p.level, ComplexityLevel::Simple);
        assert_eq!(p.strategy, GenerationStrategy::SingleShot);
        assert_eq!(p.estimated_unit_count, 2);
        assert_eq!(p.detected_entities, vec!["post", "comment"]);
        assert_eq!(p.core_features, vec!["Create operations"]);
    }

    #[test]
    fn entity_repetition_counts_once() {
        let p = classify("users users users user");
        assert_eq!(p.estimated_unit_count, 1);
        assert_eq!(p.detected_entities, vec!["user"]);
    }

    #[test]
    fn entity_patterns_match_whole_words_only() {
        // "report" must not count as "rep", "settings" not as "set"
        let p = classify("report settings");
        assert!(p.detected_entities.is_empty());
        assert_eq!(p.estimated_unit_count, 1);
    }

    #[test]
    fn complex_requirement_selects_chunked() {
        let p = classify(
            "Build a comprehensive fitness tracker with multiple users, workouts, exercises, \
             sessions, goals and achievements. Workouts have many exercises and each user \
             has many sessions. Include search, filter, charts, analytics dashboard, \
             email notifications and export.",
        );
        assert_eq!(p.level, ComplexityLevel::Complex);
        assert_eq!(p.strategy, GenerationStrategy::Chunked);
        assert_eq!(p.score, 100);
        assert!(p.has_relationships);
        assert!(p.has_advanced_features);
        assert!(p.estimated_unit_count >= 6);
        assert!(p
            .simplification_suggestions
            .iter()
            .any(|s| s.starts_with("Defer advanced features:")));
        assert!(p
            .simplification_suggestions
            .iter()
            .any(|s| s.contains("notifications")));
    }

    #[test]
    fn moderate_band() {
        // complex(10) + has many(15) + many(10) + user(12) = 47 + words
        let p = classify("complex users has many");
        assert_eq!(p.level, ComplexityLevel::Moderate);
        assert_eq!(p.strategy, GenerationStrategy::SingleShot);
        assert!(p.has_relationships);
        assert!(p.simplification_suggestions.is_empty());
    }

    #[test]
    fn feature_lists_do_not_affect_score() {
        // "page" is an advanced feature trigger but not a scoring keyword
        let a = classify("lorem lorem");
        let b = classify("lorem page");
        assert_eq!(a.score, b.score);
        assert_eq!(b.advanced_features, vec!["Pagination"]);
    }

    #[test]
    fn classify_is_deterministic() {
        let text = "An online store with products, orders and categories; search and sort";
        assert_eq!(classify(text), classify(text));
    }

    // --- degrade ---

    #[test]
    fn degrade_light_appends_note_and_keeps_original() {
        let c = ComplexityClassifier::new();
        let original = "A blog with posts, search, filter and export";
        let out = c.degrade(original, DegradationLevel::Light);
        assert!(out.starts_with(original));
        assert!(out.contains("Focus on core operations first"));
        assert!(out.contains("Search functionality, Filtering"));
        assert!(!out.contains("Data export"));
    }

    #[test]
    fn degrade_light_without_advanced_features_still_differs() {
        let c = ComplexityClassifier::new();
        let out = c.degrade("A todo list", DegradationLevel::Light);
        assert_ne!(out, "A todo list");
        assert!(!out.contains("can be added later"));
    }

    #[test]
    fn degrade_moderate_names_entities_and_core_features() {
        let c = ComplexityClassifier::new();
        let out = c.degrade(
            "Create a blog with users, posts and comments, with search",
            DegradationLevel::Moderate,
        );
        assert!(out.contains("3 main entities (user, post, comment)"));
        assert!(out.contains("Create operations"));
        assert!(!out.contains("search"));
    }

    #[test]
    fn degrade_minimal_reduces_entities_with_floor() {
        let c = ComplexityClassifier::new();
        let many = "users, posts, comments, products, orders and categories";
        let out = c.degrade(many, DegradationLevel::Minimal);
        assert!(out.contains("with 4 core entities (user, post, comment, product)"));
        assert!(out.contains("No advanced features."));

        let three = "users, posts and comments";
        let out = c.degrade(three, DegradationLevel::Minimal);
        assert!(out.contains("with 2 core entities (user, post)"));
    }

    #[test]
    fn degrade_minimal_never_exceeds_estimate() {
        let c = ComplexityClassifier::new();
        let out = c.degrade("a list of books", DegradationLevel::Minimal);
        assert!(out.contains("with 1 core entities."));
    }

    #[test]
    fn degradation_narrows_entity_count() {
        let c = ComplexityClassifier::new();
        let original = "users, posts, comments, products, orders, categories, goals";
        let moderate = classify(&c.degrade(original, DegradationLevel::Moderate));
        let minimal = classify(&c.degrade(original, DegradationLevel::Minimal));
        let base = classify(original);
        assert!(moderate.estimated_unit_count <= base.estimated_unit_count);
        assert!(minimal.estimated_unit_count <= moderate.estimated_unit_count);
        assert!(minimal.advanced_features.is_empty());
    }

    // --- properties ---

    fn all_keywords() -> Vec<&'static str> {
        COMPLEXITY_KEYWORDS
            .iter()
            .chain(RELATIONSHIP_KEYWORDS)
            .chain(FEATURE_KEYWORDS)
            .copied()
            .collect()
    }

    /// Render one slot per keyword: the keyword itself when selected, otherwise
    /// filler with the same number of words.
    fn render(selected: &[bool]) -> String {
        all_keywords()
            .iter()
            .zip(selected)
            .map(|(kw, on)| {
                if *on {
                    kw.to_string()
                } else {
                    vec!["lorem"; kw.split_whitespace().count()].join(" ")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    proptest! {
        #[test]
        fn score_is_monotonic_in_keywords(
            base in proptest::collection::vec(any::<bool>(), 32),
            extra in proptest::collection::vec(any::<bool>(), 32),
        ) {
            let n = all_keywords().len();
            let smaller: Vec<bool> = base.iter().take(n).copied().collect();
            let larger: Vec<bool> = smaller
                .iter()
                .zip(extra.iter())
                .map(|(a, b)| *a || *b)
                .collect();
            let s_text = render(&smaller);
            let l_text = render(&larger);
            prop_assert_eq!(
                s_text.split_whitespace().count(),
                l_text.split_whitespace().count()
            );
            prop_assert!(classify(&s_text).score <= classify(&l_text).score);
        }

        #[test]
        fn score_stays_in_range(text in ".{0,400}") {
            let p = classify(&text);
            prop_assert!(p.score <= 100);
            prop_assert!(p.estimated_unit_count >= 1);
        }
    }
}
