// tests/integration/stream_commands_test.rs

//! End-to-end tests for the stream commands against a real server state.

use super::test_helpers::TestContext;
use bytes::Bytes;
use citrine::core::commands::command_trait::ExecutionContext;
use citrine::core::state::{ConnectionKind, SessionState};
use citrine::core::{CitrineError, Command, RespValue};
use std::time::Duration;

fn bulk(value: &str) -> RespValue {
    RespValue::BulkString(Bytes::copy_from_slice(value.as_bytes()))
}

#[tokio::test]
async fn test_xadd_explicit_id_replies_with_id() {
    let mut ctx = TestContext::new();
    let reply = ctx.execute(&["XADD", "s", "0-1", "a", "1"]).await.unwrap();
    assert_eq!(reply, bulk("0-1"));
}

#[tokio::test]
async fn test_xadd_rejects_non_increasing_id() {
    let mut ctx = TestContext::new();
    ctx.execute(&["XADD", "s", "0-1", "a", "1"]).await.unwrap();

    let err = ctx.execute(&["XADD", "s", "0-1", "a", "2"]).await.unwrap_err();
    assert!(matches!(err, CitrineError::InvalidStreamId(_)));
    assert!(err.to_string().contains("equal or smaller"));

    // The rejected append must not have mutated the stream.
    let reply = ctx.execute(&["XADD", "s", "0-2", "a", "2"]).await.unwrap();
    assert_eq!(reply, bulk("0-2"));
}

#[tokio::test]
async fn test_xadd_rejects_reserved_id() {
    let mut ctx = TestContext::new();
    let err = ctx.execute(&["XADD", "s", "0-0", "a", "1"]).await.unwrap_err();
    assert!(err.to_string().contains("greater than 0-0"));
}

#[tokio::test]
async fn test_xadd_auto_sequence_within_ms() {
    let mut ctx = TestContext::new();
    assert_eq!(
        ctx.execute(&["XADD", "s", "5-*", "a", "1"]).await.unwrap(),
        bulk("5-0")
    );
    assert_eq!(
        ctx.execute(&["XADD", "s", "5-*", "a", "2"]).await.unwrap(),
        bulk("5-1")
    );
}

#[tokio::test]
async fn test_xadd_auto_sequence_for_ms_zero_skips_reserved() {
    let mut ctx = TestContext::new();
    assert_eq!(
        ctx.execute(&["XADD", "s", "0-*", "a", "1"]).await.unwrap(),
        bulk("0-1")
    );
}

#[tokio::test]
async fn test_xadd_fully_auto_ids_increase() {
    let mut ctx = TestContext::new();
    let RespValue::BulkString(first) = ctx.execute(&["XADD", "s", "*", "a", "1"]).await.unwrap()
    else {
        panic!("expected bulk id");
    };
    let RespValue::BulkString(second) = ctx.execute(&["XADD", "s", "*", "a", "2"]).await.unwrap()
    else {
        panic!("expected bulk id");
    };
    let parse = |raw: &Bytes| -> (u64, u64) {
        let text = String::from_utf8(raw.to_vec()).unwrap();
        let (ms, seq) = text.split_once('-').unwrap();
        (ms.parse().unwrap(), seq.parse().unwrap())
    };
    assert!(parse(&second) > parse(&first));
}

#[tokio::test]
async fn test_xrange_full_range_in_insertion_order() {
    let mut ctx = TestContext::new();
    ctx.execute(&["XADD", "s", "1-1", "a", "1"]).await.unwrap();
    ctx.execute(&["XADD", "s", "1-2", "b", "2"]).await.unwrap();

    let reply = ctx.execute(&["XRANGE", "s", "-", "+"]).await.unwrap();
    assert_eq!(
        reply,
        RespValue::Array(vec![
            RespValue::Array(vec![
                bulk("1-1"),
                RespValue::Array(vec![bulk("a"), bulk("1")]),
            ]),
            RespValue::Array(vec![
                bulk("1-2"),
                RespValue::Array(vec![bulk("b"), bulk("2")]),
            ]),
        ])
    );
}

#[tokio::test]
async fn test_xrange_inclusive_bounds() {
    let mut ctx = TestContext::new();
    for seq in 1..=4 {
        let id = format!("1-{seq}");
        ctx.execute(&["XADD", "s", &id, "n", "v"]).await.unwrap();
    }

    let RespValue::Array(entries) = ctx.execute(&["XRANGE", "s", "1-2", "1-3"]).await.unwrap()
    else {
        panic!("expected array");
    };
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_xrange_missing_stream_is_empty() {
    let mut ctx = TestContext::new();
    let reply = ctx.execute(&["XRANGE", "ghost", "-", "+"]).await.unwrap();
    assert_eq!(reply, RespValue::Array(vec![]));
}

#[tokio::test]
async fn test_xread_returns_strictly_greater_entries() {
    let mut ctx = TestContext::new();
    ctx.execute(&["XADD", "s", "1-1", "a", "1"]).await.unwrap();
    ctx.execute(&["XADD", "s", "1-2", "b", "2"]).await.unwrap();

    let reply = ctx
        .execute(&["XREAD", "STREAMS", "s", "1-1"])
        .await
        .unwrap();
    assert_eq!(
        reply,
        RespValue::Array(vec![RespValue::Array(vec![
            bulk("s"),
            RespValue::Array(vec![RespValue::Array(vec![
                bulk("1-2"),
                RespValue::Array(vec![bulk("b"), bulk("2")]),
            ])]),
        ])])
    );
}

#[tokio::test]
async fn test_xread_without_new_entries_is_null() {
    let mut ctx = TestContext::new();
    ctx.execute(&["XADD", "s", "1-1", "a", "1"]).await.unwrap();
    let reply = ctx
        .execute(&["XREAD", "STREAMS", "s", "1-1"])
        .await
        .unwrap();
    assert_eq!(reply, RespValue::Null);
}

#[tokio::test]
async fn test_xread_block_times_out_to_null() {
    let mut ctx = TestContext::new();
    ctx.execute(&["XADD", "s", "1-1", "a", "1"]).await.unwrap();

    let start = std::time::Instant::now();
    let reply = ctx
        .execute(&["XREAD", "BLOCK", "100", "STREAMS", "s", "$"])
        .await
        .unwrap();
    assert_eq!(reply, RespValue::Null);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_xread_block_wakes_on_concurrent_xadd() {
    let mut ctx = TestContext::new();
    ctx.execute(&["XADD", "s", "1-1", "a", "1"]).await.unwrap();

    let writer_state = ctx.state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let frame = super::test_helpers::command_frame(&["XADD", "s", "2-1", "fresh", "v"]);
        let command = Command::try_from(frame).unwrap();
        let mut session = SessionState::new(ConnectionKind::Client);
        let mut ectx = ExecutionContext {
            state: &writer_state,
            session: &mut session,
        };
        command.execute(&mut ectx).await.unwrap();
    });

    let reply = ctx
        .execute(&["XREAD", "BLOCK", "2000", "STREAMS", "s", "$"])
        .await
        .unwrap();
    assert_eq!(
        reply,
        RespValue::Array(vec![RespValue::Array(vec![
            bulk("s"),
            RespValue::Array(vec![RespValue::Array(vec![
                bulk("2-1"),
                RespValue::Array(vec![bulk("fresh"), bulk("v")]),
            ])]),
        ])])
    );
}

#[tokio::test]
async fn test_xread_multiple_streams_reports_only_nonempty() {
    let mut ctx = TestContext::new();
    ctx.execute(&["XADD", "a", "1-1", "f", "1"]).await.unwrap();
    ctx.execute(&["XADD", "b", "1-1", "f", "1"]).await.unwrap();
    ctx.execute(&["XADD", "b", "1-2", "g", "2"]).await.unwrap();

    let RespValue::Array(streams) = ctx
        .execute(&["XREAD", "STREAMS", "a", "b", "1-1", "1-1"])
        .await
        .unwrap()
    else {
        panic!("expected array");
    };
    // Stream "a" has nothing past 1-1 and is omitted.
    assert_eq!(streams.len(), 1);
    let RespValue::Array(stream) = &streams[0] else {
        panic!("expected array");
    };
    assert_eq!(stream[0], bulk("b"));
}
