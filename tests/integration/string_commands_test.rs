// tests/integration/string_commands_test.rs

//! End-to-end tests for the string keyspace and introspection commands,
//! executed against a real server state.

use super::test_helpers::TestContext;
use bytes::Bytes;
use citrine::config::Config;
use citrine::core::{CitrineError, RespValue};
use std::time::Duration;

#[tokio::test]
async fn test_set_get_roundtrip() {
    let mut ctx = TestContext::new();

    let reply = ctx.execute(&["SET", "foo", "bar"]).await.unwrap();
    assert_eq!(reply, RespValue::SimpleString("OK".into()));

    let reply = ctx.execute(&["GET", "foo"]).await.unwrap();
    assert_eq!(reply, RespValue::BulkString(Bytes::from("bar")));
}

#[tokio::test]
async fn test_get_missing_key_is_null() {
    let mut ctx = TestContext::new();
    let reply = ctx.execute(&["GET", "nope"]).await.unwrap();
    assert_eq!(reply, RespValue::Null);
}

#[tokio::test]
async fn test_set_overwrites() {
    let mut ctx = TestContext::new();
    ctx.execute(&["SET", "k", "v1"]).await.unwrap();
    ctx.execute(&["SET", "k", "v2"]).await.unwrap();
    let reply = ctx.execute(&["GET", "k"]).await.unwrap();
    assert_eq!(reply, RespValue::BulkString(Bytes::from("v2")));
}

#[tokio::test]
async fn test_set_with_px_expires() {
    let mut ctx = TestContext::new();
    ctx.execute(&["SET", "k", "v", "PX", "60"]).await.unwrap();
    assert_eq!(
        ctx.execute(&["GET", "k"]).await.unwrap(),
        RespValue::BulkString(Bytes::from("v"))
    );

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(ctx.execute(&["GET", "k"]).await.unwrap(), RespValue::Null);
}

#[tokio::test]
async fn test_keys_star_lists_all() {
    let mut ctx = TestContext::new();
    ctx.execute(&["SET", "a", "1"]).await.unwrap();
    ctx.execute(&["SET", "b", "2"]).await.unwrap();

    let RespValue::Array(mut keys) = ctx.execute(&["KEYS", "*"]).await.unwrap() else {
        panic!("expected array");
    };
    keys.sort_by_key(|value| format!("{value:?}"));
    assert_eq!(
        keys,
        vec![
            RespValue::BulkString(Bytes::from("a")),
            RespValue::BulkString(Bytes::from("b")),
        ]
    );
}

#[tokio::test]
async fn test_config_get_dir_and_dbfilename() {
    let config = Config {
        dir: "/data/kv".to_string(),
        dbfilename: "dump.rdb".to_string(),
        ..Config::default()
    };
    let mut ctx = TestContext::with_config(config);

    let reply = ctx.execute(&["CONFIG", "GET", "dir"]).await.unwrap();
    assert_eq!(
        reply,
        RespValue::Array(vec![
            RespValue::BulkString(Bytes::from("dir")),
            RespValue::BulkString(Bytes::from("/data/kv")),
        ])
    );

    let reply = ctx.execute(&["CONFIG", "GET", "dbfilename"]).await.unwrap();
    assert_eq!(
        reply,
        RespValue::Array(vec![
            RespValue::BulkString(Bytes::from("dbfilename")),
            RespValue::BulkString(Bytes::from("dump.rdb")),
        ])
    );
}

#[tokio::test]
async fn test_info_replication_on_primary() {
    let mut ctx = TestContext::new();
    let RespValue::BulkString(info) = ctx.execute(&["INFO", "replication"]).await.unwrap() else {
        panic!("expected bulk string");
    };
    let text = String::from_utf8(info.to_vec()).unwrap();
    assert!(text.contains("role:master"));
    assert!(text.contains("master_replid:"));
    assert!(text.contains("master_repl_offset:0"));
}

#[tokio::test]
async fn test_info_replication_on_replica() {
    let config = Config {
        replica_of: Some(("127.0.0.1".to_string(), 1)),
        ..Config::default()
    };
    let mut ctx = TestContext::with_config(config);
    let RespValue::BulkString(info) = ctx.execute(&["INFO", "replication"]).await.unwrap() else {
        panic!("expected bulk string");
    };
    let text = String::from_utf8(info.to_vec()).unwrap();
    assert!(text.contains("role:slave"));
}

#[tokio::test]
async fn test_wait_rejected_on_replica() {
    let config = Config {
        replica_of: Some(("127.0.0.1".to_string(), 1)),
        ..Config::default()
    };
    let mut ctx = TestContext::with_config(config);
    let err = ctx.execute(&["WAIT", "1", "100"]).await.unwrap_err();
    assert!(matches!(err, CitrineError::RoleViolation(_)));
}

#[tokio::test]
async fn test_wait_zero_replicas_returns_zero_immediately() {
    let mut ctx = TestContext::new();
    let reply = ctx.execute(&["WAIT", "0", "1000"]).await.unwrap();
    assert_eq!(reply, RespValue::Integer(0));
}

#[tokio::test]
async fn test_wait_times_out_with_no_connected_replicas() {
    let mut ctx = TestContext::new();
    let start = std::time::Instant::now();
    let reply = ctx.execute(&["WAIT", "1", "100"]).await.unwrap();
    assert_eq!(reply, RespValue::Integer(0));
    assert!(start.elapsed() < Duration::from_millis(600));
}

#[tokio::test]
async fn test_unknown_command_is_rejected() {
    let mut ctx = TestContext::new();
    let err = ctx.execute(&["BOGUS", "x"]).await.unwrap_err();
    assert!(matches!(err, CitrineError::UnknownCommand(_)));
}
