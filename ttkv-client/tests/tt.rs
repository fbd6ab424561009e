//! TT engine integration tests against a scripted mock server.

mod common;

use bytes::Bytes;
use common::{exchange, MockServer, Wire};
use ttkv_client::{ClientConfig, ClientError, ExtLock, Key, SearchExpression, TtClient, Value};

#[test]
fn test_put_get_out_cycle() {
    let put_req = Wire::new().u8(0xC8).u8(0x10).u32(1).u32(1).raw(b"kv").build();
    let get_req = Wire::new().u8(0xC8).u8(0x30).framed(b"k").build();
    let get_reply = Wire::new().u8(0).framed(b"v").build();
    let vsiz_req = Wire::new().u8(0xC8).u8(0x38).framed(b"k").build();
    let vsiz_reply = Wire::new().u8(0).u32(1).build();
    let out_req = Wire::new().u8(0xC8).u8(0x20).framed(b"k").build();

    let server = MockServer::start(vec![vec![
        exchange(put_req, vec![0]),
        exchange(get_req.clone(), get_reply),
        exchange(vsiz_req, vsiz_reply),
        exchange(out_req, vec![0]),
        exchange(get_req, vec![1]),
    ]]);
    let client = TtClient::new(server.config());

    assert!(client.put("k", "v").unwrap());
    assert_eq!(client.get("k").unwrap(), Some(Value::Str("v".into())));
    assert_eq!(client.vsiz("k").unwrap(), Some(1));
    assert!(client.out("k").unwrap());
    assert_eq!(client.get("k").unwrap(), None);

    server.finish();
}

#[test]
fn test_mget_omits_misses() {
    let req = Wire::new()
        .u8(0xC8)
        .u8(0x31)
        .u32(2)
        .framed(b"k")
        .framed(b"missing")
        .build();
    let reply = Wire::new()
        .u8(0)
        .u32(1)
        .u32(1)
        .u32(1)
        .raw(b"kv")
        .build();

    let server = MockServer::start(vec![vec![exchange(req, reply)]]);
    let client = TtClient::new(server.config());

    let fetched = client.mget(["k", "missing"]).unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched.get(&Key::from("k")), Some(&Value::Str("v".into())));

    server.finish();
}

#[test]
fn test_putkeep_reports_existing_key() {
    let req = Wire::new().u8(0xC8).u8(0x11).u32(1).u32(1).raw(b"kv").build();

    let server = MockServer::start(vec![vec![exchange(req, vec![1])]]);
    let client = TtClient::new(server.config());

    assert!(!client.putkeep("k", "v").unwrap());

    server.finish();
}

#[test]
fn test_putshl_frames_width() {
    let req = Wire::new()
        .u8(0xC8)
        .u8(0x13)
        .u32(1) // klen
        .u32(3) // vlen
        .u32(10) // width
        .raw(b"kabc")
        .build();

    let server = MockServer::start(vec![vec![exchange(req, vec![0])]]);
    let client = TtClient::new(server.config());

    assert!(client
        .putshl("k", Bytes::from_static(b"abc"), 10)
        .unwrap());

    server.finish();
}

#[test]
fn test_putnr_sends_without_reading() {
    let putnr_req = Wire::new().u8(0xC8).u8(0x18).u32(1).u32(1).raw(b"kv").build();
    let get_req = Wire::new().u8(0xC8).u8(0x30).framed(b"k").build();
    let get_reply = Wire::new().u8(0).framed(b"v").build();

    let server = MockServer::start(vec![vec![
        exchange(putnr_req, Vec::new()),
        exchange(get_req, get_reply),
    ]]);
    let client = TtClient::new(server.config());

    client.putnr("k", "v").unwrap();
    assert_eq!(client.get("k").unwrap(), Some(Value::Str("v".into())));

    server.finish();
}

#[test]
fn test_key_iteration_ends_on_miss() {
    let iterinit_req = Wire::new().u8(0xC8).u8(0x50).build();
    let iternext_req = Wire::new().u8(0xC8).u8(0x51).build();

    let server = MockServer::start(vec![vec![
        exchange(iterinit_req, vec![0]),
        exchange(iternext_req.clone(), Wire::new().u8(0).framed(b"a").build()),
        exchange(iternext_req.clone(), Wire::new().u8(0).framed(b"b").build()),
        exchange(iternext_req.clone(), Wire::new().u8(0).framed(b"c").build()),
        exchange(iternext_req, vec![1]),
    ]]);
    let client = TtClient::new(server.config());

    let keys: Vec<Key> = client.keys().unwrap().map(|k| k.unwrap()).collect();
    assert_eq!(
        keys,
        vec![Key::from("a"), Key::from("b"), Key::from("c")]
    );

    server.finish();
}

#[test]
fn test_item_iteration_over_misc_cursor() {
    let iterinit_req = Wire::new()
        .u8(0xC8)
        .u8(0x90)
        .u32(8)
        .u32(0)
        .u32(0)
        .raw(b"iterinit")
        .build();
    let iternext_req = Wire::new()
        .u8(0xC8)
        .u8(0x90)
        .u32(8)
        .u32(0)
        .u32(0)
        .raw(b"iternext")
        .build();

    let server = MockServer::start(vec![vec![
        exchange(iterinit_req, Wire::new().u8(0).u32(0).build()),
        exchange(
            iternext_req.clone(),
            Wire::new().u8(0).u32(2).framed(b"a").framed(b"1").build(),
        ),
        exchange(iternext_req, vec![1]),
    ]]);
    let client = TtClient::new(server.config());

    let items: Vec<(Key, Value)> = client.items().unwrap().map(|kv| kv.unwrap()).collect();
    assert_eq!(items, vec![(Key::from("a"), Value::Str("1".into()))]);

    server.finish();
}

#[test]
fn test_fwmkeys() {
    let req = Wire::new()
        .u8(0xC8)
        .u8(0x58)
        .u32(1) // prefix length
        .u32(10) // max
        .raw(b"k")
        .build();
    let reply = Wire::new().u8(0).u32(2).framed(b"k1").framed(b"k2").build();

    let server = MockServer::start(vec![vec![exchange(req, reply)]]);
    let client = TtClient::new(server.config());

    let keys = client.fwmkeys("k", Some(10)).unwrap();
    assert_eq!(keys, vec![Key::from("k1"), Key::from("k2")]);

    server.finish();
}

#[test]
fn test_addint_and_adddouble() {
    let addint_req = Wire::new()
        .u8(0xC8)
        .u8(0x60)
        .u32(1)
        .i32(5)
        .raw(b"c")
        .build();
    let addint_reply = Wire::new().u8(0).i32(7).build();

    let adddouble_req = Wire::new()
        .u8(0xC8)
        .u8(0x61)
        .u32(1)
        .u64(2) // integer part
        .u64(500_000_000_000) // fractional part of 2.5 scaled by 1e12
        .raw(b"d")
        .build();
    let adddouble_reply = Wire::new().u8(0).u64(3).u64(0).build();

    let server = MockServer::start(vec![vec![
        exchange(addint_req, addint_reply),
        exchange(adddouble_req, adddouble_reply),
    ]]);
    let client = TtClient::new(server.config());

    assert_eq!(client.addint("c", 5).unwrap(), Some(7));
    assert_eq!(client.adddouble("d", 2.5).unwrap(), Some(3.0));

    server.finish();
}

#[test]
fn test_adddouble_rejects_negative_before_io() {
    // Unreachable endpoint: the argument check must fire before any
    // connection attempt.
    let client = TtClient::new(ClientConfig::new().with_host("127.0.0.1").with_port(9));

    let err = client.adddouble("d", -1.0).unwrap_err();
    assert!(matches!(err, ClientError::BadArgument(_)));
}

#[test]
fn test_ext_lock_modes_and_result() {
    let req = Wire::new()
        .u8(0xC8)
        .u8(0x68)
        .u32(4) // name length
        .u32(1) // record lock
        .u32(1) // klen
        .u32(2) // vlen
        .raw(b"procenv")
        .build();
    let reply = Wire::new().u8(0).framed(b"ok").build();

    let server = MockServer::start(vec![vec![exchange(req, reply)]]);
    let client = TtClient::new(server.config());

    let result = client
        .ext("proc", "e", Bytes::from_static(b"nv"), ExtLock::Record)
        .unwrap();
    assert_eq!(&result[..], b"ok");

    server.finish();
}

#[test]
fn test_ext_failure_is_script_error() {
    let req = Wire::new()
        .u8(0xC8)
        .u8(0x68)
        .u32(4)
        .u32(0)
        .u32(1)
        .u32(0)
        .raw(b"failk")
        .build();

    let server = MockServer::start(vec![vec![exchange(req, vec![1])]]);
    let client = TtClient::new(server.config());

    let err = client
        .ext("fail", "k", Bytes::new(), ExtLock::None)
        .unwrap_err();
    match err {
        ClientError::Script { name, status } => {
            assert_eq!(name, "fail");
            assert_eq!(status, 1);
        }
        other => panic!("expected script error, got {other:?}"),
    }

    server.finish();
}

#[test]
fn test_misc_flags_replication_log_skip() {
    let logged_req = Wire::new()
        .u8(0xC8)
        .u8(0x90)
        .u32(7)
        .u32(0) // update log
        .u32(1)
        .raw(b"outlist")
        .framed(b"k")
        .build();
    let unlogged_req = Wire::new()
        .u8(0xC8)
        .u8(0x90)
        .u32(7)
        .u32(1) // no-update-log bit
        .u32(1)
        .raw(b"outlist")
        .framed(b"k")
        .build();
    let empty_reply = Wire::new().u8(0).u32(0).build();

    let server = MockServer::start(vec![vec![
        exchange(logged_req, empty_reply.clone()),
        exchange(unlogged_req, empty_reply),
    ]]);
    let client = TtClient::new(server.config());

    assert!(client.misc("outlist", ["k"], true).unwrap().is_some());
    assert!(client.misc("outlist", ["k"], false).unwrap().is_some());

    server.finish();
}

#[test]
fn test_getlist_builds_map() {
    let req = Wire::new()
        .u8(0xC8)
        .u8(0x90)
        .u32(7)
        .u32(0)
        .u32(2)
        .raw(b"getlist")
        .framed(b"k1")
        .framed(b"k2")
        .build();
    let reply = Wire::new()
        .u8(0)
        .u32(4)
        .framed(b"k1")
        .framed(b"v1")
        .framed(b"k2")
        .framed(b"v2")
        .build();

    let server = MockServer::start(vec![vec![exchange(req, reply)]]);
    let client = TtClient::new(server.config());

    let fetched = client.getlist(["k1", "k2"]).unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched.get(&Key::from("v1".to_owned())), None);
    assert_eq!(
        fetched.get(&Key::from("k1")),
        Some(&Value::Str("v1".into()))
    );

    server.finish();
}

#[test]
fn test_rnum_size_stat() {
    let rnum_req = Wire::new().u8(0xC8).u8(0x80).build();
    let rnum_reply = Wire::new().u8(0).u64(3).build();
    let size_req = Wire::new().u8(0xC8).u8(0x81).build();
    let size_reply = Wire::new().u8(0).u64(4096).build();
    let stat_req = Wire::new().u8(0xC8).u8(0x88).build();
    let stat_reply = Wire::new().u8(0).framed(b"rnum\t3\nsize\t4096").build();

    let server = MockServer::start(vec![vec![
        exchange(rnum_req, rnum_reply),
        exchange(size_req, size_reply),
        exchange(stat_req, stat_reply),
    ]]);
    let client = TtClient::new(server.config());

    assert_eq!(client.rnum().unwrap(), 3);
    assert_eq!(client.size().unwrap(), 4096);
    assert_eq!(&client.stat().unwrap()[..], b"rnum\t3\nsize\t4096");

    server.finish();
}

#[test]
fn test_admin_ops_frame_replication_args() {
    let sync_req = Wire::new().u8(0xC8).u8(0x70).build();
    let vanish_req = Wire::new().u8(0xC8).u8(0x72).build();
    let copy_req = Wire::new().u8(0xC8).u8(0x73).framed(b"/tmp/backup.tch").build();
    let restore_req = Wire::new()
        .u8(0xC8)
        .u8(0x74)
        .u32(8) // path length
        .u64(1234) // timestamp
        .u32(0) // opts
        .raw(b"/tmp/log")
        .build();
    let setmst_req = Wire::new()
        .u8(0xC8)
        .u8(0x78)
        .u32(9) // host length
        .u32(1978) // port
        .u64(0) // timestamp
        .u32(0) // opts
        .raw(b"127.0.0.1")
        .build();

    let server = MockServer::start(vec![vec![
        exchange(sync_req, vec![0]),
        exchange(vanish_req, vec![0]),
        exchange(copy_req, vec![0]),
        exchange(restore_req, vec![0]),
        exchange(setmst_req, vec![0]),
    ]]);
    let client = TtClient::new(server.config());

    assert!(client.sync().unwrap());
    assert!(client.vanish().unwrap());
    assert!(client.copy("/tmp/backup.tch").unwrap());
    assert!(client.restore("/tmp/log", 1234, 0).unwrap());
    assert!(client.setmst("127.0.0.1", 1978, 0, 0).unwrap());

    server.finish();
}

#[test]
fn test_search_get_preserves_item_split() {
    let expr = SearchExpression::new(["addcond", "name", "0", "huey"]);
    assert_eq!(expr.as_bytes(), b"addcond\x00name\x000\x00huey");

    let req = Wire::new()
        .u8(0xC8)
        .u8(0x90)
        .u32(6)
        .u32(0)
        .u32(2)
        .raw(b"search")
        .framed(b"addcond\x00name\x000\x00huey")
        .framed(b"get")
        .build();
    let reply = Wire::new()
        .u8(0)
        .u32(1)
        .framed(b"\x00k1\x00name\x00huey")
        .build();

    let server = MockServer::start(vec![vec![exchange(req, reply)]]);
    let client = TtClient::new(server.config());

    let results = client.search_get(&[expr]).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, Key::from("k1"));
    // The remainder stays opaque, embedded NULs and all.
    assert_eq!(&results[0].1[..], b"name\x00huey");

    server.finish();
}

#[test]
fn test_search_count_parses_decimal() {
    let expr = SearchExpression::new(["addcond", "age", "9", "20"]);
    let req = Wire::new()
        .u8(0xC8)
        .u8(0x90)
        .u32(6)
        .u32(0)
        .u32(2)
        .raw(b"search")
        .framed(b"addcond\x00age\x009\x0020")
        .framed(b"count")
        .build();
    let reply = Wire::new().u8(0).u32(1).framed(b"17").build();

    let server = MockServer::start(vec![vec![exchange(req, reply)]]);
    let client = TtClient::new(server.config());

    assert_eq!(client.search_count(&[expr]).unwrap(), 17);

    server.finish();
}

#[test]
fn test_out_of_range_status_is_server_internal_and_evicts() {
    let get_req = Wire::new().u8(0xC8).u8(0x30).framed(b"k").build();
    let get_reply = Wire::new().u8(0).framed(b"v").build();

    let server = MockServer::start(vec![
        vec![exchange(get_req.clone(), vec![5])],
        vec![exchange(get_req, get_reply)],
    ]);
    let client = TtClient::new(server.config());

    let err = client.get("k").unwrap_err();
    assert!(matches!(err, ClientError::ServerInternal { status: 5 }));
    assert_eq!(client.pool().idle_count(), 0);

    assert_eq!(client.get("k").unwrap(), Some(Value::Str("v".into())));
    assert_eq!(client.pool().idle_count(), 1);

    server.finish();
}

#[test]
fn test_misc_miss_is_none() {
    let req = Wire::new()
        .u8(0xC8)
        .u8(0x90)
        .u32(6)
        .u32(0)
        .u32(0)
        .raw(b"genuid")
        .build();

    let server = MockServer::start(vec![vec![exchange(req, vec![1])]]);
    let client = TtClient::new(server.config());

    assert!(client.misc::<&[u8]>("genuid", [], true).unwrap().is_none());

    server.finish();
}
