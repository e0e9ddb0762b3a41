use json_xml_mapping::convert::{convert_value, json::load_document_from_path, ConvertOptions};
use json_xml_mapping::rules::csv::read_rules_from_path;
use json_xml_mapping::rules::{build, BuildError, BuildWarning};
use json_xml_mapping::types::NodeKind;
use json_xml_mapping::xml::XmlWriterOptions;
use json_xml_mapping::MappingError;

fn bare() -> ConvertOptions {
    ConvertOptions {
        writer: XmlWriterOptions {
            declaration: false,
            indent: None,
        },
        ..Default::default()
    }
}

#[test]
fn csv_rules_build_the_company_tree() {
    let records = read_rules_from_path("tests/fixtures/company_rules.csv").unwrap();
    assert_eq!(records.len(), 11);
    assert_eq!(records[5].collector.as_deref(), Some("Yes"));
    assert_eq!(records[9].condition_path.as_deref(), Some("active"));

    let outcome = build(&records);
    assert!(outcome.is_clean(), "{:?} {:?}", outcome.errors, outcome.warnings);
    let tree = outcome.tree;
    assert_eq!(tree.len(), 11);

    let employees = tree.find("Employees").unwrap();
    assert_eq!(employees.kind, NodeKind::Collector);
    assert_eq!(employees.feed_paths.len(), 2);
    assert_eq!(employees.template().unwrap().tag, "Employee");

    let status = tree.find("Status").unwrap();
    assert!(status.is_derived());

    let tags = tree.find("Tags/Tag").unwrap();
    assert_eq!(tags.tag, "Tag");
    assert_eq!(tags.wrappers, vec!["Tags".to_string()]);
    assert!(tags.repeating);

    let company = &tree.roots()[0];
    let order = company.children.iter().map(|c| c.tag.as_str()).collect::<Vec<_>>();
    assert_eq!(order, ["CompanyName", "Offices", "Address", "Employees", "Tag"]);
}

#[test]
fn csv_rules_convert_the_company_document() {
    let tree = build(&read_rules_from_path("tests/fixtures/company_rules.csv").unwrap())
        .into_strict()
        .unwrap();
    let doc = load_document_from_path("tests/fixtures/company.json").unwrap();

    let xml = convert_value(&doc, &tree, &bare()).unwrap();
    let expected = std::fs::read_to_string("tests/fixtures/company.xml").unwrap();
    assert_eq!(xml, expected.trim_end());
}

#[test]
fn tree_display_shows_hierarchy_and_annotations() {
    let tree = build(&read_rules_from_path("tests/fixtures/company_rules.csv").unwrap()).tree;
    let shown = tree.to_string();
    assert!(shown.starts_with("Company\n  CompanyName\n"));
    assert!(shown.contains("  Employees [collector: $.engineering[*], $.sales[*]]\n"));
    assert!(shown.contains("      Status [derived: if active then 'Active']\n"));
}

#[test]
fn broken_rules_are_reported_without_losing_valid_ones() {
    let records = read_rules_from_path("tests/fixtures/broken_rules.csv").unwrap();
    let outcome = build(&records);

    assert_eq!(outcome.errors.len(), 3, "{:?}", outcome.errors);
    assert!(outcome.errors.iter().any(|e| matches!(
        e,
        BuildError::InvalidPath { output_path, path, line: Some(4), .. }
            if output_path == "Broken" && path == "$.a..b"
    )));
    assert!(outcome.errors.iter().any(|e| matches!(
        e,
        BuildError::UnresolvedParent { output_path, parent, .. } if output_path == "City" && parent == "Broken"
    )));
    assert!(outcome.errors.iter().any(|e| matches!(
        e,
        BuildError::UnresolvedParent { output_path, parent, .. } if output_path == "Orphan" && parent == "Missing"
    )));
    assert_eq!(
        outcome.warnings,
        vec![BuildWarning::InvalidOrder {
            output_path: "CompanyName".to_string(),
            raw: "first".to_string(),
        }]
    );

    let doc = load_document_from_path("tests/fixtures/company.json").unwrap();
    let xml = convert_value(&doc, &outcome.tree, &bare()).unwrap();
    assert_eq!(xml, "<Company><CompanyName>Acme</CompanyName></Company>");

    let err = outcome.into_strict().unwrap_err();
    assert!(matches!(err, MappingError::Build { count: 3, .. }));
}

#[test]
fn missing_rule_file_is_an_io_error() {
    let err = read_rules_from_path("tests/fixtures/does_not_exist.csv").unwrap_err();
    assert!(matches!(err, MappingError::Csv(_) | MappingError::Io(_)));
}
