//! Framed requests in, framed responses out, through the real grammar languages.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::io::Cursor;
use workbench_core::{
    EditorOptions, EndPointIdentity, LanguageIdentity, LanguageService, LanguageServiceRequest,
    ProcessOptions, ServiceConfig,
};
use workbench_grammar::language_registry;
use workbench_service::{MessageCodec, serve};

const HELLO: &str = r#"
namespace test
grammar Test {
    skip leaf WS = "\s+" ;
    document = 'Hello' NAME ;
    leaf NAME = "[A-Za-z]+" ;
}
"#;

fn frames(requests: &[LanguageServiceRequest]) -> Vec<u8> {
    let codec = MessageCodec::default();
    let mut out = Vec::new();
    for request in requests {
        codec.write(&mut out, request).unwrap();
    }
    out
}

fn run(input: Vec<u8>) -> Vec<Value> {
    let service = LanguageService::new(language_registry().unwrap(), ServiceConfig::default());
    let codec = MessageCodec::default();
    let mut output = Vec::new();
    serve(service, &codec, Cursor::new(input), &mut output).unwrap();

    let mut reader = Cursor::new(output);
    let mut responses = Vec::new();
    while let Some(value) = codec.read::<_, Value>(&mut reader).unwrap() {
        responses.push(value);
    }
    responses
}

fn summary(responses: &[Value]) -> Vec<String> {
    responses
        .iter()
        .map(|r| match r["type"].as_str() {
            Some("Stage") => format!(
                "{} {}",
                r["event"]["stage"].as_str().unwrap_or_default(),
                r["event"]["status"].as_str().unwrap_or_default()
            ),
            Some(other) => format!("{other} {}", r["status"].as_str().unwrap_or_default()),
            None => "?".to_string(),
        })
        .collect()
}

#[test]
fn test_hello_world_over_the_wire() {
    let endpoint = EndPointIdentity::new("editor", "hello");
    let language = LanguageIdentity::new("test.Hello");
    let input = frames(&[
        LanguageServiceRequest::ProcessorCreate {
            endpoint: endpoint.clone(),
            language_id: language.clone(),
            grammar: HELLO.to_string(),
            cross_reference: None,
            editor_options: EditorOptions::default(),
        },
        LanguageServiceRequest::SetStyle {
            endpoint: endpoint.clone(),
            language_id: language.clone(),
            style: "'Hello' { foreground: green; }".to_string(),
        },
        LanguageServiceRequest::Process {
            endpoint: endpoint.clone(),
            language_id: language.clone(),
            text: "Hello World".to_string(),
            options: ProcessOptions::default(),
        },
        LanguageServiceRequest::ProcessorDelete {
            endpoint: endpoint.clone(),
        },
    ]);

    let responses = run(input);
    assert_eq!(
        summary(&responses),
        vec![
            "ProcessorCreate SUCCESS",
            "SetStyle SUCCESS",
            "parse START",
            "LineTokens SUCCESS",
            "parse SUCCESS",
            "syntaxAnalysis START",
            "syntaxAnalysis SUCCESS",
            "semanticAnalysis START",
            "semanticAnalysis SUCCESS",
            "ProcessorDelete SUCCESS",
        ]
    );

    let tokens = responses
        .iter()
        .find(|r| r["type"] == "LineTokens")
        .map(|r| r["lineTokens"].clone())
        .unwrap();
    assert_eq!(tokens[0][0]["styleClasses"], json!(["wb_test_Hello-1"]));
    assert_eq!(responses[0]["endpoint"], json!({"editorId": "editor", "sessionId": "hello"}));
}

#[test]
fn test_invalid_body_is_skipped() {
    let endpoint = EndPointIdentity::new("editor", "style");
    let mut input = b"Content-Length: 19\r\n\r\n{\"type\":\"Unknown\"}\n".to_vec();
    input.extend(frames(&[LanguageServiceRequest::ProcessorCreate {
        endpoint,
        language_id: LanguageIdentity::style(),
        grammar: String::new(),
        cross_reference: None,
        editor_options: EditorOptions::default(),
    }]));

    let responses = run(input);
    assert_eq!(summary(&responses), vec!["ProcessorCreate SUCCESS"]);
}

#[test]
fn test_process_for_unknown_language_fails_the_parse_stage() {
    let endpoint = EndPointIdentity::new("editor", "lost");
    let input = frames(&[LanguageServiceRequest::Process {
        endpoint,
        language_id: LanguageIdentity::new("test.Nowhere"),
        text: "anything".to_string(),
        options: ProcessOptions::default(),
    }]);

    let responses = run(input);
    assert_eq!(summary(&responses), vec!["parse START", "parse FAILURE"]);
}
