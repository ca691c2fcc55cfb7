// Protocol integration tests driving the refworker binary over stdin/stdout.
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

use serde_json::{Value, json};

fn cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_refworker"))
}

/// Feeds every line, closes stdin, and returns the decoded response lines.
fn exchange(args: &[&str], lines: &[String]) -> Vec<Value> {
    let mut child = cmd()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn worker");
    {
        let mut stdin = child.stdin.take().expect("stdin");
        for line in lines {
            stdin.write_all(line.as_bytes()).expect("write request");
            stdin.write_all(b"\n").expect("write newline");
        }
    }
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success(), "worker exited with {}", output.status);
    String::from_utf8(output.stdout)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("response json"))
        .collect()
}

fn requests(values: &[Value]) -> Vec<String> {
    values.iter().map(Value::to_string).collect()
}

#[test]
fn sqrt_call_returns_inline_value() {
    let responses = exchange(
        &[],
        &requests(&[json!({"id": "1", "type": "call", "target": "math", "method": "sqrt", "args": [16]})]),
    );
    assert_eq!(
        responses,
        vec![json!({"id": "1", "type": "value", "value": 4.0, "ref": null, "error": null})]
    );
}

#[test]
fn open_files_come_back_as_handles() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("greeting.txt");
    std::fs::write(&path, "hello\nworld\n").expect("seed file");
    let path = path.to_str().expect("utf8 path");

    let responses = exchange(
        &[],
        &requests(&[
            json!({"id": "open", "target": "io", "method": "open", "args": [path]}),
            json!({"id": "closed", "type": "getattr", "target": "ref:000001", "attr": "closed"}),
            json!({"id": "line", "type": "call", "target": "ref:000001", "method": "readline"}),
            json!({"id": "close", "type": "call", "target": "ref:000001", "method": "close"}),
            json!({"id": "again", "type": "call", "target": "ref:000001", "method": "read"}),
            json!({"id": "ping", "type": "ping"}),
        ]),
    );
    assert_eq!(responses.len(), 6);

    let opened = &responses[0];
    assert_eq!(opened["type"], json!("ref"));
    assert_eq!(opened["ref"], json!("ref:000001"));
    assert_eq!(opened["error"], Value::Null);
    assert_eq!(opened["value"]["__type__"], json!("io.TextFile"));
    assert!(
        opened["value"]["__repr__"]
            .as_str()
            .expect("repr")
            .contains("greeting.txt")
    );

    assert_eq!(responses[1]["value"], json!(false));
    assert_eq!(responses[2]["value"], json!("hello\n"));
    assert_eq!(responses[3]["type"], json!("none"));
    assert_eq!(responses[4]["type"], json!("error"));
    assert_eq!(responses[4]["error"]["type"], json!("ValueError"));
    assert_eq!(
        responses[5]["value"],
        json!({"status": "ok", "refs_count": 1})
    );
}

#[test]
fn getattr_on_unknown_handle_is_an_error() {
    let responses = exchange(
        &[],
        &requests(&[json!({"id": "2", "type": "getattr", "target": "ref:000001", "attr": "closed"})]),
    );
    let response = &responses[0];
    assert_eq!(response["id"], json!("2"));
    assert_eq!(response["type"], json!("error"));
    assert_eq!(response["value"], Value::Null);
    assert_eq!(response["error"]["type"], json!("UnknownReference"));
    assert!(
        response["error"]["traceback"]
            .as_str()
            .expect("traceback")
            .starts_with("Traceback")
    );
}

#[test]
fn release_reports_only_present_handles_and_never_reuses_ids() {
    let stringio = |id: &str| json!({"id": id, "target": "io", "method": "StringIO"});
    let responses = exchange(
        &[],
        &requests(&[
            stringio("a"),
            stringio("b"),
            json!({"id": "del", "type": "del", "refs": ["ref:000001", "ref:999999"]}),
            json!({"id": "del-again", "type": "del", "refs": ["ref:000001", 17]}),
            stringio("c"),
            json!({"id": "ping", "type": "ping"}),
        ]),
    );
    assert_eq!(
        responses[2]["value"],
        json!({"deleted": ["ref:000001"], "remaining": 1})
    );
    assert_eq!(responses[3]["type"], json!("value"));
    assert_eq!(responses[3]["value"], json!({"deleted": [], "remaining": 1}));
    assert_eq!(responses[4]["ref"], json!("ref:000003"));
    assert_eq!(responses[5]["value"]["refs_count"], json!(2));
}

#[test]
fn undecodable_lines_do_not_stop_the_loop() {
    let lines = vec![
        "{not json".to_string(),
        String::new(),
        json!({"id": 5, "type": "ping"}).to_string(),
    ];
    let responses = exchange(&[], &lines);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], json!("unknown"));
    assert_eq!(responses[0]["type"], json!("error"));
    assert_eq!(responses[0]["error"]["type"], json!("DecodeError"));
    assert_eq!(responses[1]["id"], json!("5"));
    assert_eq!(responses[1]["type"], json!("value"));
}

#[test]
fn failures_keep_category_message_and_request_id() {
    let responses = exchange(
        &[],
        &requests(&[
            json!({"id": "m", "target": "no.such.module"}),
            json!({"id": "a", "target": "math", "method": "nope"}),
            json!({"id": "z", "target": "operator", "method": "truediv", "args": [1, 0]}),
            json!({"id": "k", "target": "math", "method": "pow", "kwargs": {"x": 2, "z": 1}}),
        ]),
    );
    let categories: Vec<&Value> = responses.iter().map(|r| &r["error"]["type"]).collect();
    assert_eq!(
        categories,
        vec![
            &json!("ModuleNotFound"),
            &json!("AttributeError"),
            &json!("ZeroDivisionError"),
            &json!("TypeError"),
        ]
    );
    assert_eq!(responses[0]["error"]["message"], json!("No module named 'no'"));
    assert_eq!(responses[2]["id"], json!("z"));
    assert_eq!(responses[2]["error"]["message"], json!("division by zero"));
}

#[test]
fn unit_files_expose_bound_and_partial_definitions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let unit = temp.path().join("helpers.json");
    std::fs::write(
        &unit,
        r#"{
            "greeting": "hi",
            "root": {"$bind": "math.sqrt"},
            "cube": {"$partial": "math.pow", "kwargs": {"y": 3}}
        }"#,
    )
    .expect("write unit");
    let target = unit.to_str().expect("utf8 path");
    let missing = temp.path().join("missing.json");

    let responses = exchange(
        &[],
        &requests(&[
            json!({"id": "1", "target": target, "method": "root", "args": [81]}),
            json!({"id": "2", "target": target, "method": "cube", "args": [2]}),
            json!({"id": "3", "target": target, "method": "greeting"}),
            json!({"id": "4", "target": missing.to_str().expect("utf8"), "method": "x"}),
        ]),
    );
    assert_eq!(responses[0]["value"], json!(9.0));
    assert_eq!(responses[1]["value"], json!(8.0));
    assert_eq!(responses[2]["value"], json!("hi"));
    assert_eq!(responses[3]["error"]["type"], json!("ModuleNotFound"));
}

#[test]
fn handle_arguments_reach_native_functions() {
    let responses = exchange(
        &[],
        &requests(&[
            json!({"id": "buf", "target": "io", "method": "StringIO", "args": ["abc"]}),
            json!({"id": "len", "target": "builtins", "method": "list", "args": [{"__ref__": "ref:000001"}]}),
            json!({"id": "bad", "target": "builtins", "method": "repr", "args": [{"__ref__": "ref:000042"}]}),
        ]),
    );
    assert_eq!(responses[1]["value"], json!(["abc"]));
    assert_eq!(responses[2]["error"]["type"], json!("UnknownReference"));
}

#[test]
fn strict_types_flag_rejects_unknown_discriminators() {
    let request = requests(&[json!({"id": "x", "type": "invoke", "target": "math", "method": "sqrt", "args": [4]})]);
    let permissive = exchange(&[], &request);
    assert_eq!(permissive[0]["value"], json!(2.0));

    let strict = exchange(&["--strict-types"], &request);
    assert_eq!(strict[0]["id"], json!("x"));
    assert_eq!(strict[0]["error"]["type"], json!("UnsupportedOperation"));
}

#[test]
fn responses_are_flushed_per_request() {
    let mut child = cmd()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn worker");
    let mut stdin = child.stdin.take().expect("stdin");
    let mut stdout = BufReader::new(child.stdout.take().expect("stdout"));

    for id in ["first", "second"] {
        writeln!(stdin, "{}", json!({"id": id, "type": "ping"})).expect("write");
        stdin.flush().expect("flush");
        let mut line = String::new();
        stdout.read_line(&mut line).expect("read response");
        let response: Value = serde_json::from_str(&line).expect("json");
        assert_eq!(response["id"], json!(id));
    }

    drop(stdin);
    let status = child.wait().expect("wait");
    assert!(status.success());
}

#[test]
fn oversized_requests_fail_without_killing_the_worker() {
    let responses = exchange(
        &[],
        &requests(&[
            json!({"id": "s", "target": "operator", "method": "mul", "args": ["ab", i64::MAX]}),
            json!({"id": "l", "target": "operator", "method": "mul", "args": [[1], 1_000_000_000_000_000_000_i64]}),
            json!({"id": "t", "target": "time", "method": "sleep", "args": [1e30]}),
            json!({"id": "j", "target": "json", "method": "dumps", "args": [{"a": 1}], "kwargs": {"indent": i64::MAX}}),
            json!({"id": "buf", "target": "io", "method": "StringIO"}),
            json!({"id": "seek", "target": "ref:000001", "method": "seek", "args": [i64::MAX]}),
            json!({"id": "w", "target": "ref:000001", "method": "write", "args": ["x"]}),
            json!({"id": "ping", "type": "ping"}),
        ]),
    );
    assert_eq!(responses.len(), 8);
    let categories: Vec<&Value> = [0, 1, 2, 3, 6]
        .iter()
        .map(|&index| &responses[index]["error"]["type"])
        .collect();
    assert_eq!(
        categories,
        vec![
            &json!("MemoryError"),
            &json!("MemoryError"),
            &json!("OverflowError"),
            &json!("MemoryError"),
            &json!("MemoryError"),
        ]
    );
    assert_eq!(responses[7]["value"]["status"], json!("ok"));
}

#[test]
fn non_utf8_lines_are_decode_errors() {
    let mut child = cmd()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn worker");
    {
        let mut stdin = child.stdin.take().expect("stdin");
        stdin.write_all(b"\xff\xfe{}\n").expect("write bytes");
        writeln!(stdin, "{}", json!({"id": "after", "type": "ping"})).expect("write ping");
    }
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    let responses: Vec<Value> = String::from_utf8(output.stdout)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json"))
        .collect();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], json!("unknown"));
    assert_eq!(responses[0]["error"]["type"], json!("DecodeError"));
    assert_eq!(responses[1]["id"], json!("after"));
}

#[test]
fn large_integers_come_back_exactly() {
    let responses = exchange(
        &[],
        &[r#"{"id":"big","target":"builtins","method":"list","args":[[18446744073709551615]]}"#
            .to_string()],
    );
    assert_eq!(responses[0]["value"], json!([18446744073709551615u64]));
}

#[test]
fn repr_limit_flag_truncates_handle_descriptors() {
    let responses = exchange(
        &["--repr-limit", "12"],
        &requests(&[json!({"id": "b", "target": "io", "method": "StringIO", "args": ["text"]})]),
    );
    assert_eq!(responses[0]["type"], json!("ref"));
    assert_eq!(responses[0]["value"]["__repr__"], json!("<io.StringIO"));
}

#[test]
fn invalid_configuration_exits_with_usage_code() {
    let output = cmd()
        .args(["--repr-limit", "0"])
        .stdin(Stdio::null())
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--repr-limit must be greater than zero"));
}
