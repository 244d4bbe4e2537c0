//! Markdown clean-up applied to assistant replies before they are stored.
//!
//! Models often run section headings into the previous sentence or forget the
//! blank lines the system prompt asks for. The passes below restore that
//! layout without touching the wording.

use once_cell::sync::Lazy;
use regex::{ Captures, Regex };

/// A bold span that closes a sentence and opens a heading on the same line.
static RUN_ON_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)([^\d\s][.!?])[ \t]*(\*\*[^*\n]+\*\*)([ \t]*)($|[\p{Lu}\d])").unwrap()
});

/// A bold span closing a line that has other text before it.
static TRAILING_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([^\n]*?\S)[ \t]*(\*\*[^*\n]+\*\*:?)[ \t]*$").unwrap()
});

/// A bold span opening a line that carries more text after it.
static LEADING_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(\*\*[^*\n]+\*\*:?)[ \t]*([^\s:])").unwrap()
});

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+\.|[*-])([ \t]|$)").unwrap());

static HEADING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\*[^*\n]+\*\*:?$").unwrap());

static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.[ \t]+\S").unwrap());

static BULLET_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[*-][ \t]+\S").unwrap());

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Line openings that mark the closing disclaimer paragraph.
const DISCLAIMER_LEAD_INS: [&str; 4] = [
    "*Please consult",
    "_Please consult",
    "This information",
    "*Disclaimer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Heading,
    Numbered,
    Bullet,
    Disclaimer,
    Indented,
    Text,
}

fn classify(line: &str) -> LineKind {
    if line.trim().is_empty() {
        return LineKind::Blank;
    }
    if line.starts_with(char::is_whitespace) {
        return LineKind::Indented;
    }
    let trimmed = line.trim_end();
    if HEADING_LINE.is_match(trimmed) {
        LineKind::Heading
    } else if NUMBERED_ITEM.is_match(trimmed) {
        LineKind::Numbered
    } else if BULLET_ITEM.is_match(trimmed) {
        LineKind::Bullet
    } else if DISCLAIMER_LEAD_INS.iter().any(|lead| trimmed.starts_with(lead)) {
        LineKind::Disclaimer
    } else {
        LineKind::Text
    }
}

/// Whether a blank line belongs between two adjacent non-blank lines.
fn needs_gap(prev: LineKind, next: LineKind) -> bool {
    use LineKind::*;
    match (prev, next) {
        (Blank, _) | (_, Blank) => false,
        (Heading, _) | (_, Heading) => true,
        (_, Disclaimer) => true,
        (Numbered, Numbered) | (Numbered, Indented) => false,
        (Numbered, _) => true,
        (Bullet, Bullet) | (Bullet, Numbered) | (Bullet, Indented) => false,
        (Bullet, _) => true,
        _ => false,
    }
}

fn split_headings(text: &str) -> String {
    let text = RUN_ON_HEADING.replace_all(text, "${1}\n\n${2}${3}${4}");
    let text = TRAILING_HEADING.replace_all(&text, split_trailing_heading);
    LEADING_HEADING.replace_all(&text, "${1}\n\n${2}").into_owned()
}

/// List items keep a bold span that ends them.
fn split_trailing_heading(caps: &Captures) -> String {
    let before = &caps[1];
    if LIST_MARKER.is_match(before.trim_start()) {
        return caps[0].to_string();
    }
    format!("{}\n\n{}", before, &caps[2])
}

fn space_blocks(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut prev = LineKind::Blank;

    for line in text.split('\n') {
        let kind = classify(line);
        if needs_gap(prev, kind) {
            out.push("");
        }
        out.push(if kind == LineKind::Blank { "" } else { line });
        prev = kind;
    }

    out.join("\n")
}

/// Normalizes raw model output into blank-line separated markdown.
///
/// Empty input comes back unchanged. Applying the function to its own output
/// is a no-op.
pub fn format_response(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // A split can expose another heading at a line edge, so repeat until stable.
    let mut text = text.trim().to_string();
    loop {
        let next = split_headings(&text);
        if next == text {
            break;
        }
        text = next;
    }

    let text = space_blocks(&text);
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_untouched() {
        assert_eq!(format_response(""), "");
    }

    #[test]
    fn whitespace_only_input_trims_to_empty() {
        assert_eq!(format_response("  \n  padded  \n "), "padded");
        assert_eq!(format_response(" \n\t"), "");
    }

    #[test]
    fn heading_line_gets_blank_lines_on_both_sides() {
        let out = format_response("Summary\n**Heading**\nBody text");
        assert_eq!(out, "Summary\n\n**Heading**\n\nBody text");
    }

    #[test]
    fn collapses_runs_of_newlines() {
        assert_eq!(format_response("A\n\n\n\nB"), "A\n\nB");
    }

    #[test]
    fn run_on_heading_moves_to_its_own_line() {
        let out = format_response("Stress is common. **Key Strategies** Breathe slowly.");
        assert_eq!(out, "Stress is common.\n\n**Key Strategies**\n\nBreathe slowly.");
    }

    #[test]
    fn heading_after_plain_words_is_split_off() {
        assert_eq!(
            format_response("Summary text **Heading**\nBody text"),
            "Summary text\n\n**Heading**\n\nBody text"
        );
    }

    #[test]
    fn heading_after_a_colon_is_split_off() {
        assert_eq!(
            format_response("Here are some tips:**Key Strategies**\n1. Breathe"),
            "Here are some tips:\n\n**Key Strategies**\n\n1. Breathe"
        );
    }

    #[test]
    fn leading_heading_with_lowercase_body_is_split() {
        assert_eq!(
            format_response("Summary\n**Heading** body in lowercase"),
            "Summary\n\n**Heading**\n\nbody in lowercase"
        );
        assert_eq!(
            format_response("**Deep Breathing**: Practice slowly."),
            "**Deep Breathing**:\n\nPractice slowly."
        );
    }

    #[test]
    fn leading_heading_before_a_dash_item_is_split() {
        assert_eq!(
            format_response("Intro\n**Key Points** - drink water"),
            "Intro\n\n**Key Points**\n\n- drink water"
        );
    }

    #[test]
    fn list_items_ending_in_bold_stay_whole() {
        let numbered = "1. **Hydration**\n2. Drink **water**";
        assert_eq!(format_response(numbered), numbered);
        assert_eq!(format_response("* **Tip**"), "* **Tip**");
    }

    #[test]
    fn stacked_headings_each_get_a_line() {
        let once = format_response("**Head**:**Head**:  indented**Head**");
        assert_eq!(once, "**Head**:\n\n**Head**:\n\nindented\n\n**Head**");
        assert_eq!(format_response(&once), once);
    }

    #[test]
    fn glued_heading_body_is_split() {
        assert_eq!(format_response("**Next Steps**Rest here"), "**Next Steps**\n\nRest here");
    }

    #[test]
    fn inline_emphasis_is_left_alone() {
        let text = "Use **gentle** stretches and drink water.";
        assert_eq!(format_response(text), text);
        let item = "1. **Deep Breathing**: Practice slow, deep breaths.";
        assert_eq!(format_response(item), item);
    }

    #[test]
    fn numbered_list_is_separated_from_following_text() {
        assert_eq!(format_response("1. First item\nAfter list"), "1. First item\n\nAfter list");
        assert_eq!(
            format_response("1. First\n2. Second\nDone"),
            "1. First\n2. Second\n\nDone"
        );
    }

    #[test]
    fn bullet_list_is_separated_from_following_text() {
        assert_eq!(format_response("* Apple\nPlain line"), "* Apple\n\nPlain line");
        assert_eq!(format_response("- Walk daily\nThat helps."), "- Walk daily\n\nThat helps.");
        let mixed = "* Apple\n* Banana\n1. One";
        assert_eq!(format_response(mixed), mixed);
    }

    #[test]
    fn indented_continuation_stays_attached() {
        let text = "1. Hydrate\n   with water, not soda";
        assert_eq!(format_response(text), text);
    }

    #[test]
    fn disclaimer_gets_its_own_paragraph() {
        assert_eq!(
            format_response(
                "Stay hydrated.\n*Please consult a healthcare professional for personalized advice.*"
            ),
            "Stay hydrated.\n\n*Please consult a healthcare professional for personalized advice.*"
        );
        assert_eq!(
            format_response("Rest well.\nThis information is not medical advice."),
            "Rest well.\n\nThis information is not medical advice."
        );
    }

    #[test]
    fn well_formatted_reply_is_a_fixed_point() {
        let reply = "Nervousness is common.\n\n**Understanding Nervousness**\n\nIt is natural.\n\n\
**Key Strategies**\n\n1. **Deep Breathing**: Breathe slowly.\n\n2. **Mindfulness**: Stay present.\n\n\
**Next Steps**\n\n- Practice regularly\n- Talk to a clinician if it persists\n\n\
*Please consult a healthcare professional for personalized advice.*";
        assert_eq!(format_response(reply), reply);
    }

    #[test]
    fn formatting_twice_matches_formatting_once() {
        let raw = "Headaches have many causes. **Common Triggers** Dehydration and stress.\n\
* Sleep loss\n* Skipped meals\nMost pass on their own.\n**When to Seek Care**\n\n\n\n\
1. Sudden severe pain\n2. Fever with stiff neck\nCall emergency services.\n\
*Please consult a healthcare professional for personalized advice.*";
        let once = format_response(raw);
        assert_eq!(format_response(&once), once);
        assert!(once.contains("causes.\n\n**Common Triggers**\n\nDehydration"));
        assert!(once.contains("* Skipped meals\n\nMost pass"));
        assert!(once.contains("neck\n\nCall emergency"));
        assert!(!once.contains("\n\n\n"));
    }
}
