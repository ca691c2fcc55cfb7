//! Purpose: Run the worker protocol over line-delimited streams.
//! Exports: `serve`, `ServeSummary`.
//! Role: Transport Loop; bridges newline-delimited JSON lines to the dispatcher.
//! Invariants: Output only carries response envelopes, one JSON value per line, flushed each time.
//! Invariants: Input EOF ends the loop cleanly; undecodable lines never end it.
//! Invariants: Responses are written in exactly the order requests are read.
use std::io::{BufRead, Write};

use tracing::trace;

use crate::core::error::{Error, ErrorKind};
use crate::dispatch::{Dispatcher, RequestHandler};
use crate::protocol::Response;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub requests: u64,
    pub errors: u64,
    pub skipped_blank: u64,
}

pub fn serve<H, R, W>(
    dispatcher: &mut Dispatcher<H>,
    mut reader: R,
    mut writer: W,
) -> Result<ServeSummary, Error>
where
    H: RequestHandler,
    R: BufRead,
    W: Write,
{
    let mut summary = ServeSummary::default();
    let mut line: Vec<u8> = Vec::new();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read request")
                .with_source(err)
        })?;
        if read == 0 {
            writer.flush().map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to flush worker output")
                    .with_source(err)
            })?;
            return Ok(summary);
        }

        let message = trim_line_ending(&line);
        if message.iter().all(u8::is_ascii_whitespace) {
            summary.skipped_blank += 1;
            continue;
        }

        trace!(bytes = message.len(), "request line read");
        let response = dispatcher.dispatch_bytes(message);
        summary.requests += 1;
        if response.is_error() {
            summary.errors += 1;
        }
        write_response(&mut writer, &response)?;
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<(), Error> {
    serde_json::to_writer(&mut *writer, response).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode response")
            .with_source(err)
    })?;
    writer.write_all(b"\n").map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write response")
            .with_source(err)
    })?;
    writer.flush().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to flush response")
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{ServeSummary, serve};
    use crate::config::WorkerConfig;
    use crate::dispatch::Dispatcher;
    use crate::worker::Worker;
    use serde_json::{Value, json};
    use std::io::Cursor;

    fn run(input: &str) -> (Vec<Value>, ServeSummary) {
        run_bytes(input.as_bytes())
    }

    fn run_bytes(input: &[u8]) -> (Vec<Value>, ServeSummary) {
        let mut dispatcher = Dispatcher::new(Worker::new(&WorkerConfig::default()));
        let mut output = Vec::new();
        let summary = serve(&mut dispatcher, Cursor::new(input), &mut output).expect("serve");
        let text = String::from_utf8(output).expect("utf8");
        let responses = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("response json"))
            .collect();
        (responses, summary)
    }

    #[test]
    fn responses_follow_request_order_one_to_one() {
        let input = concat!(
            r#"{"id":"1","type":"call","target":"math","method":"sqrt","args":[16]}"#,
            "\n",
            "this is not json\n",
            "\n",
            r#"{"id":"3","type":"ping"}"#,
            "\r\n",
        );
        let (responses, summary) = run(input);
        assert_eq!(responses.len(), 3);
        assert_eq!(
            responses[0],
            json!({"id": "1", "type": "value", "value": 4.0, "ref": null, "error": null})
        );
        assert_eq!(responses[1]["id"], json!("unknown"));
        assert_eq!(responses[1]["error"]["type"], json!("DecodeError"));
        assert_eq!(responses[2]["value"], json!({"status": "ok", "refs_count": 0}));
        assert_eq!(
            summary,
            ServeSummary {
                requests: 3,
                errors: 1,
                skipped_blank: 1,
            }
        );
    }

    #[test]
    fn invalid_utf8_lines_get_a_decode_error_and_the_loop_continues() {
        let mut input = b"\xff\xfe{}\n".to_vec();
        input.extend_from_slice(b"\xff\n");
        input.extend_from_slice(br#"{"id":"after","type":"ping"}"#);
        input.push(b'\n');
        let (responses, summary) = run_bytes(&input);
        assert_eq!(responses.len(), 3);
        for response in &responses[..2] {
            assert_eq!(response["id"], json!("unknown"));
            assert_eq!(response["error"]["type"], json!("DecodeError"));
        }
        assert_eq!(responses[2]["id"], json!("after"));
        assert_eq!(responses[2]["type"], json!("value"));
        assert_eq!(summary.errors, 2);
    }

    #[test]
    fn empty_input_ends_cleanly() {
        let (responses, summary) = run("");
        assert!(responses.is_empty());
        assert_eq!(summary, ServeSummary::default());
    }

    #[test]
    fn final_line_without_newline_is_served() {
        let (responses, _) = run(r#"{"id":"9","type":"ping"}"#);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], json!("9"));
    }
}
