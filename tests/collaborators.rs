//! Comment submission and server-side export against a local server

mod support;

use dashexport::comments::{CommentClient, CommentDraft};
use dashexport::download::ServerExportClient;
use dashexport::{Error, EXPORT_FILE_NAME};
use std::io::Read;
use std::sync::{Arc, Mutex};
use support::MemoryDelivery;
use tiny_http::{Header, Method, Response, Server};

#[derive(Clone, Copy)]
enum Mode {
    Healthy,
    Broken,
}

/// Requests seen by the server as "METHOD url body"
type Seen = Arc<Mutex<Vec<String>>>;

fn start_server(mode: Mode) -> (String, Seen) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let seen: Seen = Arc::default();
    let log = seen.clone();
    std::thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let method = request.method().clone();
            let url = request.url().to_string();
            log.lock().unwrap().push(format!("{} {} {}", method, url, body));

            let json = "Content-Type: application/json".parse::<Header>().unwrap();
            let response = match (mode, &method, url.as_str()) {
                (Mode::Broken, _, _) => {
                    Response::from_string(r#"{"error": "Failed to handle comments"}"#)
                        .with_status_code(500)
                        .with_header(json)
                }
                (Mode::Healthy, Method::Post, "/api/annotations") => {
                    Response::from_string(r#"{"message": "Comment added successfully", "id": 7}"#)
                        .with_status_code(201)
                        .with_header(json)
                }
                (Mode::Healthy, Method::Get, u) if u.starts_with("/api/annotations?") => {
                    Response::from_string(
                        r#"[{"id": 7, "chart_id": "line-chart", "page": "/fte", "text": "Check March",
                             "user": "Anonymous", "reason": null, "exclusion": null, "why": null,
                             "quick_fix": null, "to_do": null, "created_at": "2024-05-01T10:00:00"}]"#,
                    )
                    .with_header(json)
                }
                (Mode::Healthy, Method::Get, "/api/export_pdf") => {
                    Response::from_data(b"%PDF-1.3 server".to_vec())
                        .with_header("Content-Type: application/pdf".parse::<Header>().unwrap())
                }
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });
    (format!("http://{}", addr), seen)
}

#[tokio::test]
async fn invalid_comment_never_reaches_the_server() {
    let (base, seen) = start_server(Mode::Healthy);
    let client = CommentClient::new(base);

    let err = client
        .submit(CommentDraft::new("line-chart", "/fte", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidComment(_)));

    let long = CommentDraft::new("line-chart", "/fte", "x".repeat(501));
    assert!(client.submit(long).await.is_err());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn comment_is_posted_then_the_chart_list_refreshed() {
    let (base, seen) = start_server(Mode::Healthy);
    let client = CommentClient::new(format!("{}/", base));

    let outcome = client
        .submit(CommentDraft::new("line-chart", "/fte", "  Check March "))
        .await
        .unwrap();
    assert_eq!(outcome.receipt.id, 7);
    assert_eq!(outcome.comments.len(), 1);
    assert_eq!(outcome.comments[0].text, "Check March");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("POST /api/annotations "));
    assert!(seen[0].contains(r#""text":"Check March""#));
    assert!(seen[0].contains(r#""user":"Anonymous""#));
    assert!(seen[1].starts_with("GET /api/annotations?page=%2Ffte&chart_id=line-chart"));
}

#[tokio::test]
async fn server_rejection_carries_its_message_and_status() {
    let (base, _) = start_server(Mode::Broken);
    let err = CommentClient::new(base)
        .submit(CommentDraft::new("bar-chart", "/", "hello"))
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Failed to handle comments"), "{}", msg);
    assert!(msg.contains("500"), "{}", msg);
}

#[tokio::test]
async fn server_export_is_delivered_under_the_export_name() {
    let (base, _) = start_server(Mode::Healthy);
    let mut sink = MemoryDelivery::default();
    let size = ServerExportClient::new(base)
        .fetch_and_deliver(&mut sink)
        .await
        .unwrap();

    assert_eq!(size, 15);
    assert_eq!(sink.files[0].0, EXPORT_FILE_NAME);
    assert!(sink.files[0].1.starts_with(b"%PDF"));
}

#[tokio::test]
async fn failed_server_export_delivers_nothing() {
    let (base, _) = start_server(Mode::Broken);
    let mut sink = MemoryDelivery::default();
    let err = ServerExportClient::new(base)
        .fetch_and_deliver(&mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NetworkError(ref m) if m.starts_with("Failed to generate PDF")));
    assert!(sink.files.is_empty());
}
