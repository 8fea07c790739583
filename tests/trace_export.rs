use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use userd::trace::Tracer;

/// Accepts one connection, answers 202 and returns the request line and body.
fn collector(listener: TcpListener) -> thread::JoinHandle<(String, String)> {
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        let mut reader = BufReader::new(stream);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    length = value.trim().parse().unwrap();
                }
            }
        }

        let mut body = vec![0; length];
        reader.read_exact(&mut body).unwrap();
        reader
            .get_mut()
            .write_all(b"HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .unwrap();

        (request_line, String::from_utf8(body).unwrap())
    })
}

#[test]
fn ended_spans_are_posted_to_the_zipkin_collector() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/api/v2/spans", listener.local_addr().unwrap());
    let received = collector(listener);

    let tracer = Tracer::zipkin("userd-test", "127.0.0.1:8080", &endpoint).unwrap();
    let root = tracer.start("users.get", None);
    root.tag("http.method", "GET");
    let child = tracer.start("users.get.handler", Some(&root));
    drop(child);
    drop(root);
    tracer.force_flush().unwrap();

    let (request_line, body) = received.join().unwrap();
    assert!(request_line.starts_with("POST /api/v2/spans"), "{request_line}");
    assert!(body.contains(r#""name":"users.get""#), "{body}");
    assert!(body.contains(r#""name":"users.get.handler""#), "{body}");
    assert!(body.contains(r#""serviceName":"userd-test""#), "{body}");
    assert!(body.contains(r#""http.method":"GET""#), "{body}");

    tracer.shutdown().unwrap();
}

#[test]
fn malformed_collector_endpoint_is_a_startup_error() {
    let err = Tracer::zipkin("userd-test", "127.0.0.1:8080", "not a uri").unwrap_err();
    assert!(err.to_string().starts_with("trace exporter:"), "{err}");
}
