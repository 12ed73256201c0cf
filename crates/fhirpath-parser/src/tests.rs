//! End-to-end lexer/parser tests, in the `expect_test` style used throughout this crate.

use expect_test::expect;

use crate::Parser;

fn parse(source: &str) -> String {
    let tree = Parser::new(source).parse();
    format!("{:#?}", tree.syntax())
}

#[test]
fn parses_simple_navigation() {
    expect![[r#"
        SOURCE_FILE@0..12
          INVOCATION_EXPR@0..12
            IDENTIFIER_EXPR@0..7
              NAME_REF@0..7
                IDENT@0..7 "Patient"
            DOT@7..8 "."
            NAME_REF@8..12
              IDENT@8..12 "name"
    "#]]
    .assert_eq(&parse("Patient.name"));
}

#[test]
fn parses_function_call_with_equality_argument() {
    let tree = Parser::new("Patient.name.where(use = 'official')").parse();
    assert_eq!(tree.errors().count(), 0);
}

#[test]
fn left_associative_additive_chain_nests_correctly() {
    let tree = Parser::new("1 + 2 + 3").parse();
    assert_eq!(tree.errors().count(), 0);
    let text = format!("{:#?}", tree.syntax());
    // outer ADDITIVE_EXPR should contain an inner ADDITIVE_EXPR as its first child
    let outer = text.find("ADDITIVE_EXPR").unwrap();
    let inner = text[outer + 1..].find("ADDITIVE_EXPR").unwrap();
    assert!(inner < text[outer + 1..].find("INT_NUMBER").unwrap());
}

#[test]
fn invalid_double_dot_reports_an_error() {
    // `Patient..name` is not valid FHIRPath navigation: `..` is not an operator.
    let tree = Parser::new("Patient..name").parse();
    assert!(tree.errors().count() >= 1);
}

#[test]
fn unclosed_parenthesis_still_produces_a_tree() {
    let tree = Parser::new("Patient.where(active = true").parse();
    assert!(tree.errors().count() >= 1);
    // The well-formed prefix should still be present in the tree.
    let text = format!("{:#?}", tree.syntax());
    assert!(text.contains("FUNCTION_CALL_EXPR"));
}

#[test]
fn quantity_literal_is_distinguished_from_plain_number() {
    let tree = Parser::new("4 days").parse();
    assert_eq!(tree.errors().count(), 0);
    let text = format!("{:#?}", tree.syntax());
    assert!(text.contains("QUANTITY_LITERAL"));
}

#[test]
fn type_operators_parse_a_type_specifier_not_an_expression() {
    let tree = Parser::new("value is FHIR.Quantity").parse();
    assert_eq!(tree.errors().count(), 0);
    let text = format!("{:#?}", tree.syntax());
    assert!(text.contains("TYPE_SPECIFIER"));
}

#[test]
fn keyword_can_be_used_as_a_plain_member_name() {
    // `day` is a calendar-duration keyword but also a legal property name.
    let tree = Parser::new("Patient.day").parse();
    assert_eq!(tree.errors().count(), 0);
}

#[test]
fn external_constant_and_special_variable_parse() {
    let tree = Parser::new("%resource.where($this.active)").parse();
    assert_eq!(tree.errors().count(), 0);
}

#[test]
fn recursion_limit_reports_a_limit_error_without_stack_overflow() {
    let mut source = String::new();
    for _ in 0..2000 {
        source.push_str("-");
    }
    source.push('1');
    let tree = Parser::new(&source).recursion_limit(200).parse();
    assert!(tree.errors().any(|e| e.message().contains("recursion limit")));
}
