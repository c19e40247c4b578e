//! End-to-end runs of grammar-defined languages through the language service.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use pretty_assertions::assert_eq;
use serde_json::json;
use workbench_core::{
    AglToken, ContextSpec, EditorOptions, EndPointIdentity, EventStatus, IssueKind,
    LanguageIdentity, LanguageService, LanguageServiceResponse, MatchableKind, PipelineEvent,
    ProcessOptions, ServiceConfig, Stage, StagePayload,
};
use workbench_grammar::language_registry;

const HELLO: &str = r#"
namespace test
grammar Test {
    skip leaf WS = "\s+" ;
    document = 'Hello' NAME ;
    leaf NAME = "[A-Za-z]+" ;
}
"#;

const DECLS: &str = r#"
namespace test
grammar Decls {
    skip leaf WS = "\s+" ;
    unit = declaration* ;
    declaration = typeDecl | varDecl ;
    typeDecl = 'type' NAME ';' ;
    varDecl = 'var' NAME ':' TYPE_REF ';' ;
    leaf NAME = "[A-Za-z]+" ;
    leaf TYPE_REF = "[A-Za-z]+" ;
}
"#;

const DECLS_XREF: &str = r#"
identify TypeDecl by name
references {
    in VarDecl { property type_ref refers-to TypeDecl }
}
"#;

struct Workbench {
    service: LanguageService,
}

impl Workbench {
    fn new() -> Self {
        let registry = language_registry().unwrap();
        Self {
            service: LanguageService::new(registry, ServiceConfig::default()),
        }
    }

    fn open(
        &self,
        session: &str,
        language: &LanguageIdentity,
        grammar: &str,
        cross_reference: Option<&str>,
    ) -> (EndPointIdentity, Receiver<LanguageServiceResponse>) {
        let endpoint = EndPointIdentity::new("editor", session);
        let (tx, rx) = mpsc::channel();
        self.service.add_response_listener(&endpoint, Arc::new(tx));
        self.service.create_processor(
            &endpoint,
            language,
            grammar,
            cross_reference,
            EditorOptions::default(),
        );
        (endpoint, rx)
    }
}

fn drain(rx: &Receiver<LanguageServiceResponse>) -> Vec<LanguageServiceResponse> {
    rx.try_iter().collect()
}

fn events(responses: &[LanguageServiceResponse]) -> Vec<PipelineEvent> {
    responses
        .iter()
        .filter_map(|r| r.stage_event().cloned())
        .collect()
}

fn final_event(responses: &[LanguageServiceResponse], stage: Stage) -> PipelineEvent {
    events(responses)
        .into_iter()
        .filter(|e| e.stage == stage && e.status != EventStatus::Start)
        .last()
        .unwrap()
}

fn created_ok(rx: &Receiver<LanguageServiceResponse>) {
    match &drain(rx)[..] {
        [LanguageServiceResponse::ProcessorCreate { status, issues, .. }] => {
            assert_eq!(*status, EventStatus::Success, "{issues:?}");
        }
        other => panic!("unexpected responses {other:?}"),
    }
}

#[test]
fn test_hello_world_end_to_end() {
    let wb = Workbench::new();
    let language = LanguageIdentity::new("test.Hello");
    let (ep, rx) = wb.open("hello", &language, HELLO, None);
    match &drain(&rx)[..] {
        [LanguageServiceResponse::ProcessorCreate {
            status, matchables, ..
        }] => {
            assert_eq!(*status, EventStatus::Success);
            let kinds: Vec<(&str, MatchableKind)> =
                matchables.iter().map(|m| (m.name.as_str(), m.kind)).collect();
            assert_eq!(
                kinds,
                vec![
                    ("WS", MatchableKind::Pattern),
                    ("NAME", MatchableKind::Pattern),
                    ("'Hello'", MatchableKind::Literal),
                ]
            );
        }
        other => panic!("unexpected responses {other:?}"),
    }

    wb.service
        .set_style(&ep, &language, "'Hello' { foreground: green; } NAME { foreground: blue; }");
    drain(&rx);

    wb.service
        .process(&ep, &language, "Hello World", &ProcessOptions::default())
        .unwrap();
    let responses = drain(&rx);

    let summary: Vec<(Stage, EventStatus)> =
        events(&responses).iter().map(|e| (e.stage, e.status)).collect();
    assert_eq!(
        summary,
        vec![
            (Stage::Parse, EventStatus::Start),
            (Stage::Parse, EventStatus::Success),
            (Stage::SyntaxAnalysis, EventStatus::Start),
            (Stage::SyntaxAnalysis, EventStatus::Success),
            (Stage::SemanticAnalysis, EventStatus::Start),
            (Stage::SemanticAnalysis, EventStatus::Success),
        ]
    );

    let line_tokens = responses
        .iter()
        .find_map(|r| match r {
            LanguageServiceResponse::LineTokens { line_tokens, .. } => Some(line_tokens.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        line_tokens,
        vec![vec![
            AglToken::new(vec!["wb_test_Hello-1".to_string()], 0, 5),
            AglToken::new(vec!["nostyle".to_string()], 5, 1),
            AglToken::new(vec!["wb_test_Hello-2".to_string()], 6, 5),
        ]]
    );

    let parse = final_event(&responses, Stage::Parse);
    let Some(StagePayload::Parse(tree)) = parse.payload else {
        panic!("parse tree missing");
    };
    assert_eq!(tree.non_skip_leaves().len(), 2);

    let syntax = final_event(&responses, Stage::SyntaxAnalysis);
    let Some(StagePayload::Syntax(asm)) = syntax.payload else {
        panic!("asm missing");
    };
    assert_eq!(asm.structure_count(), 1);
    assert_eq!(
        asm.roots[0].property("name").and_then(|v| v.as_str()),
        Some("World")
    );
}

#[test]
fn test_parse_error_is_reported_with_expected_terminals() {
    let wb = Workbench::new();
    let language = LanguageIdentity::new("test.Hello");
    let (ep, rx) = wb.open("hello", &language, HELLO, None);
    created_ok(&rx);

    wb.service
        .process(&ep, &language, "Hello 42", &ProcessOptions::default())
        .unwrap();
    let responses = drain(&rx);
    let parse = final_event(&responses, Stage::Parse);
    assert_eq!(parse.status, EventStatus::Failure);
    assert_eq!(parse.message, "Parse Failed");
    assert_eq!(parse.issues.len(), 1);
    assert_eq!(parse.issues[0].message, "Hello ^42");
    assert_eq!(parse.issues[0].data, Some(json!(["NAME"])));
    assert!(events(&responses).iter().all(|e| e.stage == Stage::Parse));
}

#[test]
fn test_grammar_errors_fail_processor_creation() {
    let wb = Workbench::new();
    let language = LanguageIdentity::new("test.Broken");
    let (_, rx) = wb.open("broken", &language, "namespace test grammar Broken { a = b ; }", None);
    match &drain(&rx)[..] {
        [LanguageServiceResponse::ProcessorCreate { status, issues, .. }] => {
            assert_eq!(*status, EventStatus::Failure);
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].kind, IssueKind::Error);
        }
        other => panic!("unexpected responses {other:?}"),
    }
}

#[test]
fn test_unresolved_references_are_semantic_issues() {
    let wb = Workbench::new();
    let language = LanguageIdentity::new("test.Decls");
    let (ep, rx) = wb.open("decls", &language, DECLS, Some(DECLS_XREF));
    created_ok(&rx);

    wb.service
        .process(
            &ep,
            &language,
            "type Int;\nvar x : Int;\nvar y : Real;",
            &ProcessOptions::default(),
        )
        .unwrap();
    let responses = drain(&rx);
    let semantic = final_event(&responses, Stage::SemanticAnalysis);
    assert_eq!(semantic.status, EventStatus::Success);
    let messages: Vec<&str> = semantic.issues.iter().map(|i| i.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["No target of type(s) [TypeDecl] found for referring value 'Real'"]
    );
}

#[test]
fn test_code_completion() {
    let wb = Workbench::new();
    let language = LanguageIdentity::new("test.Hello");
    let (ep, rx) = wb.open("hello", &language, HELLO, None);
    created_ok(&rx);

    wb.service
        .code_complete(&ep, &language, "", 0, &ProcessOptions::default())
        .unwrap();
    match &drain(&rx)[..] {
        [LanguageServiceResponse::CodeComplete { status, items, .. }] => {
            assert_eq!(*status, EventStatus::Success);
            let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
            assert_eq!(texts, vec!["Hello"]);
        }
        other => panic!("unexpected responses {other:?}"),
    }
}

#[test]
fn test_grammar_editor_reports_registered_languages() {
    let wb = Workbench::new();
    let hello = LanguageIdentity::new("test.Hello");
    let (_, rx) = wb.open("hello", &hello, HELLO, None);
    created_ok(&rx);

    let (ep, rx) = wb.open("grammar-editor", &LanguageIdentity::grammar(), "", None);
    created_ok(&rx);
    wb.service
        .process(&ep, &LanguageIdentity::grammar(), HELLO, &ProcessOptions::default())
        .unwrap();
    let responses = drain(&rx);
    let semantic = final_event(&responses, Stage::SemanticAnalysis);
    assert_eq!(semantic.status, EventStatus::Success);
    assert_eq!(semantic.issues.len(), 1);
    assert_eq!(semantic.issues[0].kind, IssueKind::Information);
    assert_eq!(
        semantic.issues[0].message,
        "Grammar 'test.Test' is registered as language 'test.Hello'"
    );
    let location = semantic.issues[0].location.unwrap();
    assert_eq!((location.line, location.column), (2, 8));
}

#[test]
fn test_cross_reference_editor_checks_against_type_model() {
    let wb = Workbench::new();
    let decls = LanguageIdentity::new("test.Decls");
    let (_, rx) = wb.open("decls", &decls, DECLS, None);
    created_ok(&rx);

    let xref = LanguageIdentity::cross_reference();
    let (ep, rx) = wb.open("xref-editor", &xref, "", None);
    created_ok(&rx);
    let options = ProcessOptions::default().with_context(ContextSpec::TypeModelReference(decls));
    wb.service
        .process(&ep, &xref, "identify Missing by name", &options)
        .unwrap();
    let responses = drain(&rx);
    let semantic = final_event(&responses, Stage::SemanticAnalysis);
    assert_eq!(semantic.status, EventStatus::Success);
    assert_eq!(
        semantic.issues[0].message,
        "Type 'Missing' not found in type model 'test.Decls'"
    );
    assert_eq!(semantic.issues[0].kind, IssueKind::Error);
}

#[test]
fn test_style_editor_highlights_keywords() {
    let wb = Workbench::new();
    let style = LanguageIdentity::style();
    let (ep, rx) = wb.open("style-editor", &style, "", None);
    created_ok(&rx);

    wb.service
        .process(&ep, &style, "NAME { foreground: blue; }", &ProcessOptions::default())
        .unwrap();
    let responses = drain(&rx);
    assert_eq!(
        final_event(&responses, Stage::SemanticAnalysis).status,
        EventStatus::Success
    );
    let tokens = responses
        .iter()
        .find_map(|r| match r {
            LanguageServiceResponse::LineTokens { line_tokens, .. } => Some(line_tokens.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!((tokens[0][0].position, tokens[0][0].length), (0, 4));
    assert_ne!(tokens[0][0].style_classes, vec!["nostyle".to_string()]);
}

#[test]
fn test_deeply_nested_sentence_fails_the_parse_and_endpoint_recovers() {
    let wb = Workbench::new();
    let language = LanguageIdentity::new("test.Sum");
    let grammar = r#"namespace test grammar Sum { expr = NAME '+' expr | NAME ; leaf NAME = "[a-z]+" ; }"#;
    let (ep, rx) = wb.open("sum", &language, grammar, None);
    created_ok(&rx);

    let deep = vec!["a"; 3000].join("+");
    wb.service
        .process(&ep, &language, &deep, &ProcessOptions::default())
        .unwrap();
    let responses = drain(&rx);
    let parse = final_event(&responses, Stage::Parse);
    assert_eq!(parse.status, EventStatus::Failure);
    assert!(
        parse
            .message
            .starts_with("Exception during 'Parse' - Rule nesting deeper than 256 levels"),
        "{}",
        parse.message
    );
    assert!(events(&responses).iter().all(|e| e.stage == Stage::Parse));

    wb.service
        .process(&ep, &language, "a+b+c", &ProcessOptions::default())
        .unwrap();
    let responses = drain(&rx);
    assert_eq!(final_event(&responses, Stage::Parse).status, EventStatus::Success);
}

#[test]
fn test_built_in_language_style_can_be_changed() {
    let wb = Workbench::new();
    let grammar = LanguageIdentity::grammar();
    let (ep, rx) = wb.open("grammar-editor", &grammar, "", None);
    created_ok(&rx);

    wb.service
        .set_style(&ep, &grammar, "'grammar' { foreground: red; }");
    match &drain(&rx)[..] {
        [LanguageServiceResponse::SetStyle {
            status,
            message,
            style_model,
            ..
        }] => {
            assert_eq!(*status, EventStatus::Success, "{message}");
            assert_eq!(style_model.as_ref().map(|m| m.rules.len()), Some(1));
        }
        other => panic!("unexpected responses {other:?}"),
    }
    assert_eq!(
        wb.service.registry().find(&grammar).unwrap().style_revision(),
        1
    );
}
