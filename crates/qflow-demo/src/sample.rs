#![forbid(unsafe_code)]

//! Built-in 30-item sample: 24 single-choice statements followed by 6
//! dual-choice scenarios.

use qflow::JsonSource;
use serde_json::{Value, json};

const STATEMENTS: [(&str, &str); 24] = [
    ("I enjoy meeting new people.", "extraversion"),
    ("I keep my workspace tidy.", "conscientiousness"),
    ("I get stressed easily.", "neuroticism"),
    ("I like trying unfamiliar food.", "openness"),
    ("I go out of my way to help others.", "agreeableness"),
    ("I start conversations with strangers.", "extraversion"),
    ("I finish tasks ahead of deadlines.", "conscientiousness"),
    ("I worry about things that might go wrong.", "neuroticism"),
    ("I enjoy abstract ideas.", "openness"),
    ("I trust people until they give me a reason not to.", "agreeableness"),
    ("I feel energized after a party.", "extraversion"),
    ("I make plans and stick to them.", "conscientiousness"),
    ("My mood changes quickly.", "neuroticism"),
    ("I like art that challenges me.", "openness"),
    ("I avoid arguments when I can.", "agreeableness"),
    ("I speak up in group discussions.", "extraversion"),
    ("I pay attention to details.", "conscientiousness"),
    ("I feel anxious before big events.", "neuroticism"),
    ("I question established ways of doing things.", "openness"),
    ("I forgive people quickly.", "agreeableness"),
    ("I prefer busy places to quiet ones.", "extraversion"),
    ("I keep promises even when it costs me.", "conscientiousness"),
    ("Small setbacks ruin my day.", "neuroticism"),
    ("I daydream often.", "openness"),
];

const SCENARIOS: [(&str, &str, &str); 6] = [
    (
        "A colleague presents your idea as their own in a meeting.",
        "What do you feel first?",
        "What do you do?",
    ),
    (
        "A friend cancels plans with you at the last minute.",
        "What goes through your mind?",
        "How do you respond?",
    ),
    (
        "You are handed a project with no clear instructions.",
        "How does it feel?",
        "What is your first move?",
    ),
    (
        "A stranger asks you for directions in a hurry.",
        "What is your inner reaction?",
        "What do you do?",
    ),
    (
        "Your plans for the weekend fall through.",
        "How do you feel about it?",
        "How do you spend the time?",
    ),
    (
        "You receive blunt criticism on work you were proud of.",
        "What do you feel?",
        "What do you say?",
    ),
];

const AGREEMENT: [(&str, &str, f64); 4] = [
    ("A", "Strongly agree", 2.0),
    ("B", "Agree", 1.0),
    ("C", "Disagree", -1.0),
    ("D", "Strongly disagree", -2.0),
];

fn agreement_options(trait_key: &str) -> Value {
    Value::Array(
        AGREEMENT
            .iter()
            .map(|(value, label, weight)| {
                json!({ "value": value, "label": label, "scoring": { trait_key: weight } })
            })
            .collect(),
    )
}

/// The sample as a JSON array.
#[must_use]
pub fn sample_items() -> Value {
    let singles = STATEMENTS.iter().enumerate().map(|(i, (text, trait_key))| {
        json!({
            "id": format!("q{}", i + 1),
            "text": text,
            "options": agreement_options(trait_key),
        })
    });
    let duals = SCENARIOS.iter().enumerate().map(|(i, (scenario, inner, outer))| {
        json!({
            "id": format!("s{}", i + 1),
            "scenario": scenario,
            "inner_q": inner,
            "outer_q": outer,
            "options": {
                "inner": [
                    { "value": "A", "label": "Irritated", "scoring": { "neuroticism": 1.0 } },
                    { "value": "B", "label": "Curious", "scoring": { "openness": 1.0 } },
                    { "value": "C", "label": "Calm", "scoring": { "neuroticism": -1.0 } },
                    { "value": "D", "label": "Unsure", "scoring": { "neuroticism": 0.5 } },
                ],
                "outer": [
                    { "value": "A", "label": "Address it directly", "scoring": { "extraversion": 1.0 } },
                    { "value": "B", "label": "Make a plan", "scoring": { "conscientiousness": 1.0 } },
                    { "value": "C", "label": "Let it go", "scoring": { "agreeableness": 1.0 } },
                    { "value": "D", "label": "Ask someone for advice", "scoring": { "agreeableness": 0.5 } },
                ],
            },
        })
    });
    Value::Array(singles.chain(duals).collect())
}

/// The sample as a question source.
#[must_use]
pub fn sample_source() -> JsonSource {
    JsonSource::from_text(sample_items().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qflow::{ItemKind, QuestionSource};

    #[test]
    fn sample_has_thirty_items_singles_first() {
        let items = sample_source().load_items().unwrap();
        assert_eq!(items.len(), 30);
        assert!(items[..24].iter().all(|i| i.kind == ItemKind::SingleChoice));
        assert!(items[24..].iter().all(|i| i.kind == ItemKind::DualChoice));
        assert_eq!(items[24].id.as_str(), "s1");
    }
}
