//! Behaviour of one decoy exchange against an in-memory connection.

use std::sync::Arc;

use http_decoy::config::HandlerConfig;
use http_decoy::flow::ConnKey;
use http_decoy::http::response::{GENERIC_RESPONSE, WALLET_RESPONSE};
use http_decoy::http::{DecoyError, DecoyHandler, DecoyResponse, ParseError};
use http_decoy::observability::DecoyEvent;
use tracing::Level;

mod common;

use common::{MockConn, RecordingSink, StaticResolver};

fn handler(sink: &Arc<RecordingSink>, resolver: &Arc<StaticResolver>) -> DecoyHandler {
    DecoyHandler::new(resolver.clone(), sink.clone())
}

fn setup() -> (Arc<RecordingSink>, Arc<StaticResolver>) {
    (Arc::new(RecordingSink::default()), Arc::new(StaticResolver::new(8080)))
}

#[tokio::test]
async fn plain_get_gets_generic_response_and_one_info_event() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("GET /index.html?b=2&a=1 HTTP/1.1\r\nHost: decoy\r\n\r\n");

    let exchange = handler(&sink, &resolver).handle(conn).await.unwrap();

    assert_eq!(exchange.method, "GET");
    assert_eq!(exchange.response, DecoyResponse::Generic);
    assert_eq!(tap.written(), GENERIC_RESPONSE);
    assert_eq!(tap.closes(), 1);

    let infos = sink.at_level(Level::INFO);
    assert_eq!(infos.len(), 1);
    assert_eq!(sink.events().len(), 1);
    assert_eq!(
        infos[0],
        DecoyEvent::RequestHandled {
            method: "GET".into(),
            path: "/index.html".into(),
            query: "a=1&b=2".into(),
            dest_port: 8080,
            src_ip: "203.0.113.50".into(),
            src_port: "52344".into(),
        }
    );
    assert_eq!(infos[0].message(), "HTTP GET request handled: /index.html");
    assert_eq!(resolver.lookups(), vec![ConnKey::from_parts("203.0.113.50", "52344").unwrap()]);
}

#[tokio::test]
async fn wallet_probe_answered_regardless_of_method() {
    for method in ["GET", "POST", "PUT", "OPTIONS"] {
        let (sink, resolver) = setup();
        let raw = format!("{method} /api/wallet/balance HTTP/1.1\r\nHost: decoy\r\n\r\n");
        let (conn, tap) = MockConn::new(raw);

        let exchange = handler(&sink, &resolver).handle(conn).await.unwrap();

        assert_eq!(exchange.response, DecoyResponse::WalletProbe);
        assert_eq!(tap.written(), WALLET_RESPONSE);
        assert_eq!(
            tap.written(),
            b"HTTP/1.1 200 OK\r\nContent-Length:20\r\n\r\n[[\"\"]]\r\n\r\n"
        );
        assert_eq!(tap.closes(), 1);
        assert_eq!(
            sink.messages(),
            vec![
                format!("HTTP {method} request handled: /api/wallet/balance"),
                "HTTP wallet request".to_string(),
            ]
        );
        assert_eq!(sink.events()[1].field("handler").as_deref(), Some("http"));
    }
}

#[tokio::test]
async fn wallet_match_is_case_sensitive_on_raw_target() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("GET /Wallet HTTP/1.1\r\n\r\n");

    handler(&sink, &resolver).handle(conn).await.unwrap();

    assert_eq!(tap.written(), GENERIC_RESPONSE);
    assert!(!sink.events().contains(&DecoyEvent::WalletRequest));
}

#[tokio::test]
async fn declared_body_is_logged_as_lowercase_hex() {
    let (sink, resolver) = setup();
    let body = b"{\"jsonrpc\":\"2.0\",\"method\":\"eth_accounts\"}\xff";
    let mut raw = format!(
        "POST /rpc HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);
    let (conn, tap) = MockConn::new(raw);

    let exchange = handler(&sink, &resolver).handle(conn).await.unwrap();

    assert_eq!(exchange.body_len, body.len());
    assert_eq!(tap.written(), GENERIC_RESPONSE);
    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].message(), "HTTP body payload");
    let payload_hex = events[1].field("payload_hex").unwrap();
    assert_eq!(payload_hex, hex::encode(body));
    assert!(payload_hex.ends_with("ff"));
    assert_eq!(payload_hex, payload_hex.to_lowercase());
}

#[tokio::test]
async fn wallet_probe_with_body_logs_payload_then_wallet() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("POST /wallet HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi");

    handler(&sink, &resolver).handle(conn).await.unwrap();

    assert_eq!(tap.written(), WALLET_RESPONSE);
    assert_eq!(
        sink.messages(),
        vec![
            "HTTP POST request handled: /wallet",
            "HTTP body payload",
            "HTTP wallet request"
        ]
    );
    assert_eq!(sink.events()[1].field("payload_hex").as_deref(), Some("6869"));
}

#[tokio::test]
async fn short_body_is_body_read_error_and_still_closes() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("POST /upload HTTP/1.1\r\nContent-Length: 100\r\n\r\nonly-a-little");

    let err = handler(&sink, &resolver).handle(conn).await.unwrap_err();

    assert!(matches!(err, DecoyError::BodyRead(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    assert_eq!(tap.closes(), 1);
    assert!(tap.written().is_empty());

    let errors = sink.at_level(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field("handler").as_deref(), Some("http"));
    // The head was valid, so the primary event was already emitted.
    assert_eq!(sink.at_level(Level::INFO).len(), 1);
}

#[tokio::test]
async fn oversized_declared_body_is_refused() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("POST / HTTP/1.1\r\nContent-Length: 4096\r\n\r\n");
    let config = HandlerConfig {
        max_body_bytes: 1024,
        ..HandlerConfig::default()
    };

    let err = handler(&sink, &resolver)
        .with_config(config)
        .handle(conn)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DecoyError::BodyTooLarge {
            declared: 4096,
            limit: 1024
        }
    ));
    assert_eq!(err.outcome(), "body_read");
    assert_eq!(tap.closes(), 1);
    assert_eq!(sink.at_level(Level::ERROR).len(), 1);
}

#[tokio::test]
async fn unparsable_stream_is_framing_error_without_write() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("NOT A REQUEST\r\n\r\n");

    let err = handler(&sink, &resolver).handle(conn).await.unwrap_err();

    assert!(matches!(err, DecoyError::Framing(ParseError::Malformed(_))));
    assert!(tap.written().is_empty());
    assert_eq!(tap.closes(), 1);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level(), Level::ERROR);
    assert!(events[0].field("error").unwrap().starts_with("failed to read HTTP request"));
    assert!(resolver.lookups().is_empty());
}

#[tokio::test]
async fn empty_connection_is_framing_error() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new(Vec::<u8>::new());

    let err = handler(&sink, &resolver).handle(conn).await.unwrap_err();

    assert!(matches!(err, DecoyError::Framing(ParseError::ConnectionClosed)));
    assert_eq!(err.outcome(), "framing");
    assert_eq!(tap.closes(), 1);
}

#[tokio::test]
async fn unsplittable_remote_address_is_fatal() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("GET / HTTP/1.1\r\n\r\n");
    let conn = conn.with_remote("not-an-endpoint");

    let err = handler(&sink, &resolver).handle(conn).await.unwrap_err();

    assert!(matches!(err, DecoyError::Addressing(_)));
    assert!(tap.written().is_empty());
    assert_eq!(tap.closes(), 1);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level(), Level::ERROR);
    assert!(resolver.lookups().is_empty());
}

#[tokio::test]
async fn ipv6_peer_and_unknown_flow() {
    let sink = Arc::new(RecordingSink::default());
    let flows = Arc::new(http_decoy::FlowTable::new());
    let (conn, _tap) = MockConn::new("GET /.env HTTP/1.0\r\n\r\n");
    let conn = conn.with_remote("[2001:db8::7]:61000");

    DecoyHandler::new(flows, sink.clone()).handle(conn).await.unwrap();

    let events = sink.events();
    let event = &events[0];
    assert_eq!(event.field("src_ip").as_deref(), Some("2001:db8::7"));
    assert_eq!(event.field("src_port").as_deref(), Some("61000"));
    assert_eq!(event.field("dest_port").as_deref(), Some("0"));
}

#[tokio::test]
async fn write_failure_is_wrapped_and_logged() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("GET / HTTP/1.1\r\n\r\n");
    let conn = conn.failing_writes();

    let err = handler(&sink, &resolver).handle(conn).await.unwrap_err();

    assert!(matches!(err, DecoyError::Write(_)));
    assert!(err.to_string().starts_with("failed to send HTTP response"));
    assert_eq!(tap.closes(), 1);
    let errors = sink.at_level(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].field("error").unwrap().contains("peer went away"));
}

#[tokio::test]
async fn close_failure_is_logged_but_does_not_change_result() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new("GET / HTTP/1.1\r\n\r\n");
    let conn = conn.failing_close();

    let exchange = handler(&sink, &resolver).handle(conn).await.unwrap();
    assert_eq!(exchange.response, DecoyResponse::Generic);
    assert_eq!(tap.closes(), 1);
    assert_eq!(sink.at_level(Level::ERROR)[0].field("error").as_deref(), Some("close failed"));

    // An earlier failure is what the caller sees, not the close failure.
    let (sink, resolver) = setup();
    let (conn, _tap) = MockConn::new("garbage\r\n\r\n");
    let err = handler(&sink, &resolver)
        .handle(conn.failing_close())
        .await
        .unwrap_err();
    assert!(matches!(err, DecoyError::Framing(_)));
    assert_eq!(sink.at_level(Level::ERROR).len(), 2);
}

#[tokio::test]
async fn transfer_encoded_body_is_not_captured() {
    let (sink, resolver) = setup();
    let (conn, tap) = MockConn::new(
        "POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
    );

    let exchange = handler(&sink, &resolver).handle(conn).await.unwrap();

    assert_eq!(exchange.body_len, 0);
    assert_eq!(tap.written(), GENERIC_RESPONSE);
    assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn request_dump_is_debug_only() {
    let (sink, resolver) = setup();
    let (conn, _tap) = MockConn::new("GET /admin HTTP/1.1\r\nHost: decoy\r\nUser-Agent: zgrab\r\n\r\n");
    let config = HandlerConfig {
        dump_requests: true,
        ..HandlerConfig::default()
    };

    handler(&sink, &resolver).with_config(config).handle(conn).await.unwrap();

    assert_eq!(sink.at_level(Level::INFO).len(), 1);
    let dumps = sink.at_level(Level::DEBUG);
    assert_eq!(dumps.len(), 1);
    assert_eq!(
        dumps[0].field("dump").as_deref(),
        Some("GET /admin HTTP/1.1\nHost: decoy\nuser-agent: zgrab")
    );
}

#[tokio::test]
async fn post_dump_follows_body_and_includes_form() {
    let (sink, resolver) = setup();
    let (conn, _tap) = MockConn::new(
        "POST /wallet/login?r=1 HTTP/1.1\r\nHost: decoy\r\n\
         Content-Type: application/x-www-form-urlencoded\r\nContent-Length: 14\r\n\r\nuser=root&pw=x",
    );
    let config = HandlerConfig {
        dump_requests: true,
        ..HandlerConfig::default()
    };

    handler(&sink, &resolver).with_config(config).handle(conn).await.unwrap();

    assert_eq!(
        sink.messages(),
        vec![
            "HTTP POST request handled: /wallet/login",
            "HTTP body payload",
            "HTTP request dump",
            "HTTP wallet request",
        ]
    );
    let dump = sink.at_level(Level::DEBUG)[0].field("dump").unwrap();
    assert!(dump.starts_with("POST /wallet/login?r=1 HTTP/1.1\nHost: decoy\n"));
    assert!(dump.ends_with("content-type: application/x-www-form-urlencoded\n\n\npw=x&r=1&user=root"));
}
