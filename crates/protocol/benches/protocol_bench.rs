use bytes::BytesMut;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::io::Cursor;

use cachenode_protocol::{Message, Value};

fn set_message(value: Value) -> Message {
    Message::Set {
        key: "user:1234".into(),
        value,
        ttl: 60,
        node_id: Some("node-a".into()),
    }
}

fn bench_encode_ack(c: &mut Criterion) {
    let msg = Message::ack(true);

    c.bench_function("encode_ack", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(64);
            black_box(&msg).encode(&mut buf).unwrap();
            buf
        })
    });
}

fn bench_parse_ack(c: &mut Criterion) {
    let mut buf = BytesMut::new();
    Message::ack(true).encode(&mut buf).unwrap();
    let data = buf.freeze();

    c.bench_function("parse_ack", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(data.as_ref()));
            Message::parse(&mut cursor).unwrap()
        })
    });
}

fn bench_encode_set_1kb(c: &mut Criterion) {
    let msg = set_message(Value::String("x".repeat(1024)));

    c.bench_function("encode_set_1kb", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(2048);
            black_box(&msg).encode(&mut buf).unwrap();
            buf
        })
    });
}

fn bench_parse_set_1kb(c: &mut Criterion) {
    let mut buf = BytesMut::new();
    set_message(Value::String("x".repeat(1024)))
        .encode(&mut buf)
        .unwrap();
    let data = buf.freeze();

    c.bench_function("parse_set_1kb", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(data.as_ref()));
            Message::parse(&mut cursor).unwrap()
        })
    });
}

fn bench_parse_set_object(c: &mut Criterion) {
    let value: Value = serde_json::from_str(
        r#"{"name":"alice","roles":["admin","ops"],"quota":{"used":12,"max":100}}"#,
    )
    .unwrap();
    let mut buf = BytesMut::new();
    set_message(value).encode(&mut buf).unwrap();
    let data = buf.freeze();

    c.bench_function("parse_set_object", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(data.as_ref()));
            Message::parse(&mut cursor).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_ack,
    bench_parse_ack,
    bench_encode_set_1kb,
    bench_parse_set_1kb,
    bench_parse_set_object,
);
criterion_main!(benches);
