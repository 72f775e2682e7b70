//! Field extraction and validation for a single quiz item.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::dom::Element;
use super::OptionalFields;

const QUESTION_NAME: &str = "QUESTION";
const OPTION_PREFIX: &str = "OPTION";
const TOPIC_NAME: &str = "TOPIC";
const TAG_NAME: &str = "TAG";
const PATH_NAME: &str = "PATH";
const CORRECT_ATTR: &str = "correct";

/// An item must carry exactly this many option fields, numbered 1..=5.
pub(crate) const REQUIRED_OPTIONS: usize = 5;

const SNIPPET_LEN: usize = 70;

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Why an item was rejected. The display form is the diagnostic line.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum ItemError {
    #[error("Warning: QUIZ_ITEM index {index} has no QUESTION element. Skipping.")]
    MissingQuestion { index: usize },
    #[error(
        "Error: Expected 5 options but found {found} for question '{snippet}...'. Skipping this item."
    )]
    OptionCount { snippet: String, found: usize },
    #[error(
        "Error: Found 5 OPTION tags, but they are not exactly OPTION1-5 (found: {names}) for question '{snippet}...'. Skipping this item."
    )]
    OptionNumbering { snippet: String, names: String },
    #[error("Error processing question '{snippet}...': {reason}. Skipping this item.")]
    Unexpected { snippet: String, reason: String },
}

/// Extracted fields of one accepted item, before record assembly.
#[derive(Debug)]
pub(crate) struct ItemFields {
    pub text: String,
    pub options: [String; 5],
    pub topic: String,
    pub tag: String,
    pub path: String,
}

/// Validate one item and pull its fields out. Rejections come back as
/// `ItemError`; advisory findings (attribute mismatches, missing path) are
/// appended to `diagnostics` without failing the item.
pub(crate) fn extract_item(
    item: &Element,
    index: usize,
    default_topic: &str,
    fields: &OptionalFields,
    diagnostics: &mut Vec<String>,
) -> Result<ItemFields, ItemError> {
    let question = find_field(item, QUESTION_NAME)
        .ok_or(ItemError::MissingQuestion { index })?;
    let text = field_content(question);
    let snippet = snippet(&text);

    let option_tags: Vec<&Element> = item
        .child_elements()
        .filter(|el| starts_with_ci(&el.name, OPTION_PREFIX))
        .collect();
    if option_tags.len() != REQUIRED_OPTIONS {
        return Err(ItemError::OptionCount {
            snippet,
            found: option_tags.len(),
        });
    }

    // Five option tags must carry the ordinals 1-5, no duplicates, no gaps.
    let mut ordinals: Vec<u32> = option_tags
        .iter()
        .filter_map(|el| DIGITS_RE.find(&el.name))
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    ordinals.sort_unstable();
    if ordinals != [1, 2, 3, 4, 5] {
        let names = option_tags
            .iter()
            .map(|el| el.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ItemError::OptionNumbering { snippet, names });
    }

    let mut texts = Vec::with_capacity(REQUIRED_OPTIONS);
    for ordinal in 1..=REQUIRED_OPTIONS {
        let wanted = format!("{OPTION_PREFIX}{ordinal}");
        let option = item
            .child_elements()
            .find(|el| el.name.to_ascii_uppercase().contains(&wanted))
            .ok_or_else(|| ItemError::Unexpected {
                snippet: snippet.clone(),
                reason: format!("no option element matching {wanted}"),
            })?;
        check_correct_attr(option, ordinal, &snippet, diagnostics);
        texts.push(field_content(option));
    }
    let options: [String; 5] = texts.try_into().map_err(|_| ItemError::Unexpected {
        snippet: snippet.clone(),
        reason: "option extraction did not yield exactly 5 values".to_string(),
    })?;

    let topic = match find_field(item, TOPIC_NAME) {
        Some(el) => el.text_content().trim().to_string(),
        None => default_topic.to_string(),
    };

    let tag = if fields.tag {
        find_field(item, TAG_NAME)
            .map(|el| el.text_content().trim().to_string())
            .unwrap_or_default()
    } else {
        String::new()
    };

    let path = if fields.path {
        match find_field(item, PATH_NAME) {
            Some(el) => el.text_content().trim().to_string(),
            None => {
                diagnostics.push(format!(
                    "Warning: QUIZ_ITEM for question '{snippet}...' is missing the <PATH> element."
                ));
                String::new()
            }
        }
    } else {
        String::new()
    };

    Ok(ItemFields {
        text,
        options,
        topic,
        tag,
        path,
    })
}

/// The one field lookup every extraction goes through: first direct child
/// whose name equals `name`, ignoring case.
fn find_field<'a>(item: &'a Element, name: &str) -> Option<&'a Element> {
    item.child_elements()
        .find(|el| el.name.eq_ignore_ascii_case(name))
}

/// Inner content of a field with embedded markup kept intact. Falls back
/// to plain descendant text, then to the serialized child elements, so a
/// mangled field still yields whatever content it has.
fn field_content(field: &Element) -> String {
    let inner = field.inner_markup();
    let inner = inner.trim();
    if !inner.is_empty() {
        return inner.to_string();
    }
    let text = field.text_content();
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    field.child_elements().map(Element::outer_markup).collect()
}

/// Option 1 should declare correct="true", the rest correct="false". Only
/// worth a warning: the answer position is fixed by contract either way.
fn check_correct_attr(
    option: &Element,
    ordinal: usize,
    snippet: &str,
    diagnostics: &mut Vec<String>,
) {
    let expected = if ordinal == 1 { "true" } else { "false" };
    let matches = option
        .attr(CORRECT_ATTR)
        .is_some_and(|value| value.eq_ignore_ascii_case(expected));
    if !matches {
        diagnostics.push(format!(
            "Warning: OPTION{ordinal} for question '{snippet}...' is missing or incorrect correct='{expected}'."
        ));
    }
}

fn starts_with_ci(name: &str, prefix: &str) -> bool {
    name.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LEN).collect()
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::dom::{build_tree, Node};
    use super::*;

    fn item_from(xml: &str) -> Element {
        let tree = build_tree(xml);
        let el = tree
            .roots
            .iter()
            .filter_map(Node::as_element)
            .next()
            .expect("fixture has no element");
        el.clone()
    }

    fn options_block() -> String {
        (1..=5)
            .map(|n| {
                let correct = if n == 1 { "true" } else { "false" };
                format!("<OPTION{n} correct=\"{correct}\">choice {n}</OPTION{n}>")
            })
            .collect()
    }

    fn extract(
        item: &Element,
        fields: &OptionalFields,
    ) -> (Result<ItemFields, ItemError>, Vec<String>) {
        let mut diagnostics = Vec::new();
        let result = extract_item(item, 0, "Default", fields, &mut diagnostics);
        (result, diagnostics)
    }

    #[test]
    fn accepts_well_formed_item() {
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>{}<TOPIC>T</TOPIC><TAG>t1</TAG></QUIZ_ITEM>",
            options_block()
        ));
        let (result, diagnostics) = extract(&item, &OptionalFields::standard());
        let fields = result.unwrap();
        assert_eq!(fields.text, "Q?");
        assert_eq!(fields.options[0], "choice 1");
        assert_eq!(fields.options[4], "choice 5");
        assert_eq!(fields.topic, "T");
        assert_eq!(fields.tag, "t1");
        assert_eq!(fields.path, "");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn missing_question_is_rejected_with_index() {
        let item = item_from(&format!("<QUIZ_ITEM>{}</QUIZ_ITEM>", options_block()));
        let mut diagnostics = Vec::new();
        let err = extract_item(
            &item,
            3,
            "",
            &OptionalFields::standard(),
            &mut diagnostics,
        )
        .unwrap_err();
        assert_eq!(err, ItemError::MissingQuestion { index: 3 });
        assert!(err.to_string().contains("index 3"));
    }

    #[test]
    fn four_options_rejected_with_exact_count() {
        let item = item_from(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>\
             <OPTION1>a</OPTION1><OPTION2>b</OPTION2><OPTION3>c</OPTION3><OPTION4>d</OPTION4>\
             </QUIZ_ITEM>",
        );
        let (result, _) = extract(&item, &OptionalFields::standard());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Expected 5 options but found 4"));
    }

    #[test]
    fn six_options_rejected_with_exact_count() {
        let extra = format!("{}<OPTION6>f</OPTION6>", options_block());
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>{extra}</QUIZ_ITEM>"
        ));
        let (result, _) = extract(&item, &OptionalFields::standard());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Expected 5 options but found 6"));
    }

    #[test]
    fn duplicate_ordinal_rejected_listing_names() {
        let item = item_from(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>\
             <OPTION1>a</OPTION1><OPTION2>b</OPTION2><OPTION2>b2</OPTION2>\
             <OPTION4>d</OPTION4><OPTION5>e</OPTION5></QUIZ_ITEM>",
        );
        let (result, _) = extract(&item, &OptionalFields::standard());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("not exactly OPTION1-5"));
        assert!(message.contains("OPTION2, OPTION2"));
    }

    #[test]
    fn digitless_option_name_fails_numbering() {
        let item = item_from(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>\
             <OPTION1>a</OPTION1><OPTION2>b</OPTION2><OPTION3>c</OPTION3>\
             <OPTION4>d</OPTION4><OPTIONX>e</OPTIONX></QUIZ_ITEM>",
        );
        let (result, _) = extract(&item, &OptionalFields::standard());
        assert!(matches!(
            result.unwrap_err(),
            ItemError::OptionNumbering { .. }
        ));
    }

    #[test]
    fn mixed_case_names_and_values_accepted_without_warnings() {
        let item = item_from(
            "<quiz_item><question>Q?</question>\
             <option1 correct=\"True\">a</option1>\
             <Option2 correct=\"False\">b</Option2>\
             <OPTION3 correct=\"false\">c</OPTION3>\
             <oPtIoN4 correct=\"FALSE\">d</oPtIoN4>\
             <OPTION5 correct=\"false\">e</OPTION5>\
             <Topic>T</Topic></quiz_item>",
        );
        let (result, diagnostics) = extract(&item, &OptionalFields::standard());
        let fields = result.unwrap();
        assert_eq!(fields.options[0], "a");
        assert_eq!(fields.options[3], "d");
        assert_eq!(fields.topic, "T");
        assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");
    }

    #[test]
    fn wrong_correct_attrs_warn_but_do_not_reject() {
        let item = item_from(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>\
             <OPTION1 correct=\"false\">a</OPTION1>\
             <OPTION2 correct=\"true\">b</OPTION2>\
             <OPTION3 correct=\"false\">c</OPTION3>\
             <OPTION4>d</OPTION4>\
             <OPTION5 correct=\"false\">e</OPTION5></QUIZ_ITEM>",
        );
        let (result, diagnostics) = extract(&item, &OptionalFields::standard());
        assert!(result.is_ok());
        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics[0].contains("Warning: OPTION1"));
        assert!(diagnostics[0].contains("correct='true'"));
        assert!(diagnostics[1].contains("Warning: OPTION2"));
        assert!(diagnostics[1].contains("correct='false'"));
        assert!(diagnostics[2].contains("Warning: OPTION4"));
    }

    #[test]
    fn question_markup_is_preserved() {
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>What prints?\n\
             <pre><code class=\"language-python\">print(len(\"ab\"))</code></pre>\n\
             </QUESTION>{}</QUIZ_ITEM>",
            options_block()
        ));
        let (result, _) = extract(&item, &OptionalFields::standard());
        let fields = result.unwrap();
        assert!(fields.text.starts_with("What prints?"));
        assert!(fields
            .text
            .contains("<pre><code class=\"language-python\">print(len(\"ab\"))</code></pre>"));
        assert!(!fields.text.ends_with('\n'));
    }

    #[test]
    fn option_markup_is_preserved() {
        let item = item_from(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>\
             <OPTION1><code>Vec::new()</code></OPTION1>\
             <OPTION2>b</OPTION2><OPTION3>c</OPTION3><OPTION4>d</OPTION4><OPTION5>e</OPTION5>\
             </QUIZ_ITEM>",
        );
        let (result, _) = extract(&item, &OptionalFields::standard());
        assert_eq!(result.unwrap().options[0], "<code>Vec::new()</code>");
    }

    #[test]
    fn missing_topic_falls_back_to_default() {
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>{}</QUIZ_ITEM>",
            options_block()
        ));
        let (result, _) = extract(&item, &OptionalFields::standard());
        assert_eq!(result.unwrap().topic, "Default");
    }

    #[test]
    fn missing_path_warns_and_defaults_empty() {
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>{}</QUIZ_ITEM>",
            options_block()
        ));
        let (result, diagnostics) = extract(&item, &OptionalFields::codebase());
        assert_eq!(result.unwrap().path, "");
        assert!(diagnostics
            .iter()
            .any(|d| d.contains("missing the <PATH> element")));
    }

    #[test]
    fn path_content_is_trimmed() {
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>{}<PATH>  src/db/connect.py  </PATH></QUIZ_ITEM>",
            options_block()
        ));
        let (result, diagnostics) = extract(&item, &OptionalFields::codebase());
        assert_eq!(result.unwrap().path, "src/db/connect.py");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn path_ignored_when_fields_exclude_it() {
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>Q?</QUESTION>{}<PATH>src/app.py</PATH></QUIZ_ITEM>",
            options_block()
        ));
        let (result, diagnostics) = extract(&item, &OptionalFields::standard());
        assert_eq!(result.unwrap().path, "");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn empty_question_body_yields_empty_text() {
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>   </QUESTION>{}</QUIZ_ITEM>",
            options_block()
        ));
        let (result, _) = extract(&item, &OptionalFields::standard());
        assert_eq!(result.unwrap().text, "");
    }

    #[test]
    fn snippet_caps_diagnostic_length() {
        let long = "x".repeat(200);
        let item = item_from(&format!(
            "<QUIZ_ITEM><QUESTION>{long}</QUESTION><OPTION1>a</OPTION1></QUIZ_ITEM>"
        ));
        let (result, _) = extract(&item, &OptionalFields::standard());
        let message = result.unwrap_err().to_string();
        assert!(message.contains(&"x".repeat(70)));
        assert!(!message.contains(&"x".repeat(71)));
    }
}
