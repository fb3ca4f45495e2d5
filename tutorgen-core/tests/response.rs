use serde_yaml::Value;
use tutorgen_core::error::ParseError;
use tutorgen_core::response::{extract_yaml_block, parse_yaml, IndexRef};

#[test]
fn yaml_fence_is_preferred_over_other_fences() {
    let text = "Intro\n```python\nprint(1)\n```\nThen:\n```yaml\n- a: 1\n```\nBye";
    assert_eq!(extract_yaml_block(text), "- a: 1");
    assert_eq!(extract_yaml_block("```\nk: v\n```"), "k: v");
    assert_eq!(extract_yaml_block("  k: v  "), "k: v");
}

#[test]
fn index_references_in_all_their_spellings() {
    let cases = [
        (Value::Number(3u64.into()), Some(IndexRef::Index(3))),
        (Value::from("4"), Some(IndexRef::Index(4))),
        (Value::from("5 # src/lib.rs"), Some(IndexRef::Index(5))),
        (Value::from("Flow Engine"), Some(IndexRef::Name("Flow Engine".to_string()))),
        (Value::from(""), None),
        (Value::Bool(true), None),
    ];
    for (value, expected) in cases {
        assert_eq!(IndexRef::from_value(&value), expected, "value: {value:?}");
    }
}

#[test]
fn empty_answer_is_reported_as_empty() {
    assert_eq!(parse_yaml("```yaml\n```"), Err(ParseError::Empty));
}
