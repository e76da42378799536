//! Coverage analysis over the interview history
//!
//! Checks which profile dimensions the user has touched on and recommends
//! (never forces) wrapping up. The result is derived on demand and never
//! persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::CoverageConfig;
use crate::transcript::{user_turns, Turn};

const RECOMMEND_WRAP_UP: &str = "Consider wrapping up and summarizing profile";
const RECOMMEND_CONTINUE: &str = "Continue probing for missing dimensions";

/// A named topic and the keywords that count as mentioning it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub keywords: Vec<String>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// The four literary profile dimensions
    pub fn defaults() -> Vec<Dimension> {
        vec![
            Dimension::new("taste_anchors", &["book", "author", "story", "novel"]),
            Dimension::new("style_preference", &["prose", "writing", "style", "voice"]),
            Dimension::new("narrative_desire", &["wish", "want", "story", "plot"]),
            Dimension::new("consumption_habit", &["read", "time", "daily", "pages"]),
        ]
    }

    fn mentioned_in(&self, lowered: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()))
    }
}

/// Result of one coverage pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageReport {
    /// User-authored turns seen
    pub turn_count: usize,
    pub coverage: BTreeMap<String, bool>,
    pub coverage_ratio: f64,
    pub ready_for_summary: bool,
    pub recommendation: String,
}

impl CoverageReport {
    pub fn covered_count(&self) -> usize {
        self.coverage.values().filter(|c| **c).count()
    }

    pub fn missing(&self) -> Vec<&str> {
        self.coverage
            .iter()
            .filter(|(_, covered)| !**covered)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Advisory readiness check
#[derive(Debug, Clone)]
pub struct CoverageAnalyzer {
    dimensions: Vec<Dimension>,
    early_readiness_turns: u32,
    coverage_threshold: f64,
}

impl CoverageAnalyzer {
    pub fn new(
        dimensions: Vec<Dimension>,
        early_readiness_turns: u32,
        coverage_threshold: f64,
    ) -> Self {
        Self {
            dimensions,
            early_readiness_turns,
            coverage_threshold,
        }
    }

    pub fn from_config(config: &CoverageConfig) -> Self {
        Self::new(
            config.dimensions.clone(),
            config.early_readiness_turns,
            config.coverage_threshold,
        )
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn analyze(&self, history: &[Turn]) -> CoverageReport {
        let turn_count = user_turns(history);

        let lowered: Vec<String> = history
            .iter()
            .filter(|t| t.is_user())
            .map(|t| t.content.to_lowercase())
            .collect();

        let coverage: BTreeMap<String, bool> = self
            .dimensions
            .iter()
            .map(|dim| {
                let hit = lowered.iter().any(|text| dim.mentioned_in(text));
                (dim.name.clone(), hit)
            })
            .collect();

        let coverage_ratio = if coverage.is_empty() {
            0.0
        } else {
            coverage.values().filter(|c| **c).count() as f64 / coverage.len() as f64
        };

        let ready_for_summary = turn_count >= self.early_readiness_turns as usize
            && coverage_ratio >= self.coverage_threshold;

        let recommendation = if ready_for_summary {
            RECOMMEND_WRAP_UP
        } else {
            RECOMMEND_CONTINUE
        };

        CoverageReport {
            turn_count,
            coverage,
            coverage_ratio,
            ready_for_summary,
            recommendation: recommendation.to_string(),
        }
    }
}

impl Default for CoverageAnalyzer {
    fn default() -> Self {
        Self::from_config(&CoverageConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(user_lines: &[&str]) -> Vec<Turn> {
        user_lines
            .iter()
            .flat_map(|line| [Turn::user(*line), Turn::assistant("And then?")])
            .collect()
    }

    #[test]
    fn test_empty_history() {
        let report = CoverageAnalyzer::default().analyze(&[]);
        assert_eq!(report.turn_count, 0);
        assert_eq!(report.coverage_ratio, 0.0);
        assert!(!report.ready_for_summary);
        assert_eq!(report.recommendation, RECOMMEND_CONTINUE);
        assert_eq!(report.coverage.len(), 4);
    }

    #[test]
    fn test_case_insensitive_match() {
        let report = CoverageAnalyzer::default().analyze(&history(&["I loved that NOVEL"]));
        assert!(report.coverage["taste_anchors"]);
        assert!(!report.coverage["style_preference"]);
        assert_eq!(report.coverage_ratio, 0.25);
    }

    #[test]
    fn test_assistant_turns_do_not_count() {
        let turns = vec![
            Turn::user("hello"),
            Turn::assistant("Which book, author, prose style or plot do you read daily?"),
        ];
        let report = CoverageAnalyzer::default().analyze(&turns);
        assert_eq!(report.turn_count, 1);
        assert_eq!(report.covered_count(), 0);
    }

    #[test]
    fn test_match_does_not_span_turns() {
        let analyzer = CoverageAnalyzer::new(vec![Dimension::new("pages", &["pages"])], 0, 1.0);
        let report = analyzer.analyze(&history(&["pa", "ges"]));
        assert!(!report.coverage["pages"]);
    }

    #[test]
    fn test_ready_needs_turns_and_coverage() {
        let analyzer = CoverageAnalyzer::default();

        // Full coverage but only 4 turns
        let rich = [
            "My favourite book is Dune",
            "I like sparse prose",
            "I wish for more heist plots",
            "I read daily on the train",
        ];
        let report = analyzer.analyze(&history(&rich));
        assert_eq!(report.coverage_ratio, 1.0);
        assert!(!report.ready_for_summary);

        // 8 turns, full coverage
        let mut lines = rich.to_vec();
        lines.extend(["ok", "sure", "maybe", "fine"]);
        let report = analyzer.analyze(&history(&lines));
        assert_eq!(report.turn_count, 8);
        assert!(report.ready_for_summary);
        assert_eq!(report.recommendation, RECOMMEND_WRAP_UP);

        // 8 turns, half coverage
        let thin = ["a book", "prose", "ok", "sure", "maybe", "fine", "yes", "no"];
        let report = analyzer.analyze(&history(&thin));
        assert_eq!(report.coverage_ratio, 0.5);
        assert!(!report.ready_for_summary);
        assert_eq!(report.missing(), vec!["consumption_habit", "narrative_desire"]);
    }

    #[test]
    fn test_ratio_non_decreasing_as_history_grows() {
        let analyzer = CoverageAnalyzer::default();
        let lines = [
            "nothing much",
            "an author I like",
            "hmm",
            "the voice matters",
            "I want twists",
            "weekends only",
            "fifty pages a night",
        ];

        let mut previous = 0.0;
        for n in 0..=lines.len() {
            let ratio = analyzer.analyze(&history(&lines[..n])).coverage_ratio;
            assert!(ratio >= previous, "ratio regressed at {} turns", n);
            previous = ratio;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn test_zero_dimensions() {
        let analyzer = CoverageAnalyzer::new(Vec::new(), 0, 0.0);
        let report = analyzer.analyze(&history(&["anything"]));
        assert_eq!(report.coverage_ratio, 0.0);
        // threshold 0.0 and turn floor 0 are both met
        assert!(report.ready_for_summary);
    }
}
