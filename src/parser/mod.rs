//! Three-pass pipeline: raw text → boundary trim → lenient tree → records.

mod dom;
mod extract;

use crate::records::{QuizRecord, ANSWER_INDEX};
use dom::{Element, Node, TreeBuild};

const CONTAINER_NAME: &str = "QUIZ_BANK";
const ITEM_NAME: &str = "QUIZ_ITEM";
const TOPIC_ATTR: &str = "topic";

/// Which optional per-item fields the engine extracts. The same engine
/// serves plain banks and codebase banks; only this set differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionalFields {
    pub tag: bool,
    pub path: bool,
}

impl OptionalFields {
    /// Plain quiz banks: tag, no source path.
    pub fn standard() -> Self {
        Self {
            tag: true,
            path: false,
        }
    }

    /// Codebase quiz banks additionally carry a per-item `<PATH>`.
    pub fn codebase() -> Self {
        Self {
            tag: true,
            path: true,
        }
    }
}

impl Default for OptionalFields {
    fn default() -> Self {
        Self::standard()
    }
}

/// Call-scoped parameters for one parse. Chapter values are applied
/// uniformly to every record produced by the call.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub chapter_no: Option<String>,
    pub chapter_title: Option<String>,
    pub fields: OptionalFields,
}

/// What one parse call returns: accepted records in document order, the
/// number of rejected items, and every diagnostic line the run produced.
/// There is no other output channel.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub records: Vec<QuizRecord>,
    pub skipped: usize,
    pub diagnostics: Vec<String>,
}

/// Parse one quiz-bank document into records.
///
/// Never fails: unusable input produces an empty outcome whose diagnostics
/// say why. Item-level problems skip only the item concerned.
pub fn parse_quiz_bank(raw: &str, opts: &ParseOptions) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    if raw.trim().is_empty() {
        outcome
            .diagnostics
            .push("Input XML content was empty; nothing to parse.".to_string());
        return outcome;
    }

    let trimmed = trim_to_container(raw);
    let first = dom::build_tree(trimmed);

    // A clean first pass is authoritative. If the reader stopped early or
    // found no container, re-parse the repaired text and take whichever
    // pass can produce a container.
    let second: Option<TreeBuild> =
        if first.error.is_some() || resolve_container(&first.roots).is_none() {
            Some(dom::build_tree(&dom::repair_markup(trimmed)))
        } else {
            None
        };
    let container = match &second {
        Some(tree) => resolve_container(&tree.roots).or_else(|| resolve_container(&first.roots)),
        None => resolve_container(&first.roots),
    };

    match container {
        Some(container) => run_items(container, opts, &mut outcome),
        None => {
            let reason = second
                .as_ref()
                .and_then(|tree| tree.error.as_deref())
                .or(first.error.as_deref());
            outcome.diagnostics.push(match reason {
                Some(err) => format!("Failed to parse XML even after recovery attempts: {err}"),
                None => "Root <QUIZ_BANK> element not found after parsing.".to_string(),
            });
        }
    }
    outcome
}

/// Drop prose before the opening container tag and after its closing tag.
/// Missing markers leave the text untouched; recovery deals with the rest.
fn trim_to_container(raw: &str) -> &str {
    let open = format!("<{}", CONTAINER_NAME.to_ascii_lowercase());
    let close = format!("</{}>", CONTAINER_NAME.to_ascii_lowercase());
    let lower = raw.to_ascii_lowercase();
    let start = lower.find(&open).unwrap_or(0);
    let end = match lower[start..].find(&close) {
        Some(offset) => start + offset + close.len(),
        None => raw.len(),
    };
    &raw[start..end]
}

/// The container itself, or the first descendant so named when recovery
/// wrapped it (synthetic root, leading junk elements).
fn resolve_container(roots: &[Node]) -> Option<&Element> {
    roots
        .iter()
        .filter_map(Node::as_element)
        .find_map(|el| el.find_named(CONTAINER_NAME))
}

fn run_items(container: &Element, opts: &ParseOptions, outcome: &mut ParseOutcome) {
    let default_topic = container.attr(TOPIC_ATTR).unwrap_or("");

    let mut items = Vec::new();
    container.collect_named(ITEM_NAME, &mut items);
    if items.is_empty() {
        outcome
            .diagnostics
            .push("No <QUIZ_ITEM> elements found in the input.".to_string());
        push_summary(outcome);
        return;
    }

    let chapter_no = opts.chapter_no.clone().unwrap_or_default();
    let chapter_title = opts.chapter_title.clone().unwrap_or_default();

    for (index, item) in items.iter().enumerate() {
        match extract::extract_item(
            item,
            index,
            default_topic,
            &opts.fields,
            &mut outcome.diagnostics,
        ) {
            Ok(fields) => outcome.records.push(QuizRecord {
                text: fields.text,
                options: fields.options,
                answer_index: ANSWER_INDEX,
                topic: fields.topic,
                tag: fields.tag,
                path: fields.path,
                chapter_no: chapter_no.clone(),
                chapter_title: chapter_title.clone(),
            }),
            Err(err) => {
                outcome.skipped += 1;
                outcome.diagnostics.push(err.to_string());
            }
        }
    }
    push_summary(outcome);
}

fn push_summary(outcome: &mut ParseOutcome) {
    outcome
        .diagnostics
        .push(format!("Successfully parsed {} questions.", outcome.records.len()));
    outcome.diagnostics.push(format!(
        "Skipped {} questions due to errors (e.g., incorrect option count).",
        outcome.skipped
    ));
}

// ── Tests ──────────────────────────────────────────────────────────
