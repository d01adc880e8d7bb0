//! Tests for .RUL parsing and serialization

use rulepivot::{parse_rul, serialize_rul, ParseOptions, RuleError, RuleKind, Scope};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("Should read fixture")
}

#[test]
fn test_parse_board_rules() {
    let parsed = parse_rul(&fixture("board.RUL"), &ParseOptions::strict());
    assert!(parsed.is_clean(), "Unexpected errors: {:?}", parsed.errors);
    assert_eq!(parsed.rules.len(), 6);

    let names: Vec<&str> = parsed.rules.iter().map(|r| r.name()).collect();
    assert_eq!(
        names,
        vec!["HV_to_LV", "LV_to_GND", "Default", "NoShorts", "Unrouted", "Width"]
    );

    let hv = parsed.rules.get("HV_to_LV").unwrap();
    assert_eq!(hv.kind(), RuleKind::ElectricalClearance);
    assert_eq!(hv.comment.as_deref(), Some("Reinforced isolation"));
    assert_eq!(hv.scope(), (&Scope::net_class("HV"), &Scope::net_class("LV")));

    let width = parsed.rules.get("Width").unwrap();
    assert!(width.is_opaque());
    assert_eq!(width.priority, 6);
}

#[test]
fn test_round_trip_is_lossless() {
    let first = parse_rul(&fixture("board.RUL"), &ParseOptions::default());
    let text = serialize_rul(&first.rules);
    let second = parse_rul(&text, &ParseOptions::default());

    assert!(second.is_clean());
    assert_eq!(second.rules, first.rules, "Rules should survive a round trip");
    assert_eq!(serialize_rul(&second.rules), text, "Text should be stable");
}

#[test]
fn test_opaque_block_emitted_verbatim() {
    let source = fixture("board.RUL");
    let output = serialize_rul(&parse_rul(&source, &ParseOptions::default()).rules);

    let start = source.find("Rule\n{\n    Name = 'Width'").expect("Width block in fixture");
    let end = start + source[start..].find('}').unwrap() + 1;
    assert!(output.contains(&source[start..end]));
}

#[test]
fn test_every_board_block_reproduced() {
    let source = fixture("board.RUL");
    let output = serialize_rul(&parse_rul(&source, &ParseOptions::default()).rules);

    let blocks: Vec<&str> = source
        .split("\n\n")
        .filter(|chunk| chunk.trim_start().starts_with("Rule"))
        .map(str::trim)
        .collect();
    assert_eq!(blocks.len(), 6);
    for block in blocks {
        assert!(output.contains(block), "Block changed on output:\n{}", block);
    }

    let shorts = parse_rul(&source, &ParseOptions::default());
    let shorts = shorts.rules.get("NoShorts").unwrap();
    assert_eq!(shorts.kind(), RuleKind::ShortCircuit);
    assert!(shorts.extra_attributes.is_empty());
}

#[test]
fn test_malformed_blocks_do_not_stop_parsing() {
    let parsed = parse_rul(&fixture("broken.RUL"), &ParseOptions::default());

    assert_eq!(parsed.rules.len(), 1);
    let good = parsed.rules.get("Good").expect("Good rule survives");
    assert_eq!(good.min_clearance().unwrap().value, 10.0);
    assert_eq!(good.priority, 1);

    assert_eq!(parsed.errors.len(), 2);
    assert_eq!(
        parsed.errors[0],
        RuleError::MissingAttribute {
            rule: "NoValue".to_string(),
            attribute: "MinimumClearance".to_string(),
        }
    );
    assert!(parsed.errors.iter().all(RuleError::is_malformed));
    assert_eq!(parsed.errors[1].rule_name(), Some("Negative"));
}

#[test]
fn test_strict_names_drop_later_duplicate() {
    let block = |value: u32| {
        format!(
            "Rule\n{{\n    Name = 'Same'\n    RuleKind = 'Clearance'\n    MinimumClearance = {}\n}}\n",
            value
        )
    };
    let text = format!("{}\n{}", block(5), block(9));

    let strict = parse_rul(&text, &ParseOptions::strict());
    assert_eq!(strict.rules.len(), 1);
    assert_eq!(strict.rules.get("Same").unwrap().min_clearance().unwrap().value, 5.0);
    assert_eq!(
        strict.errors,
        vec![RuleError::DuplicateName {
            name: "Same".to_string()
        }]
    );

    let lenient = parse_rul(&text, &ParseOptions::default());
    assert!(lenient.is_clean());
    assert_eq!(lenient.rules.get("Same").unwrap().min_clearance().unwrap().value, 9.0);
}
