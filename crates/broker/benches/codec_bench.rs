use broker::{CreateCustomerResponse, MessageEnvelope, RateEmails};
use criterion::{Criterion, criterion_group, criterion_main};

fn rate_emails(recipients: usize) -> MessageEnvelope {
    MessageEnvelope::new(RateEmails {
        rate: 41.25,
        recipients: (0..recipients)
            .map(|i| format!("subscriber{i}@example.com"))
            .collect(),
    })
}

fn bench_encode_response(c: &mut Criterion) {
    let envelope = MessageEnvelope::new(CreateCustomerResponse::failed(
        "a@example.com",
        "store unavailable",
    ));

    c.bench_function("codec/encode_response", |b| {
        b.iter(|| envelope.encode().unwrap());
    });
}

fn bench_decode_response(c: &mut Criterion) {
    let bytes = MessageEnvelope::new(CreateCustomerResponse::succeeded("a@example.com"))
        .encode()
        .unwrap();

    c.bench_function("codec/decode_response", |b| {
        b.iter(|| MessageEnvelope::decode(&bytes).unwrap());
    });
}

fn bench_rate_emails_batch_100(c: &mut Criterion) {
    let envelope = rate_emails(100);
    let bytes = envelope.encode().unwrap();

    c.bench_function("codec/encode_rate_emails_100", |b| {
        b.iter(|| envelope.encode().unwrap());
    });
    c.bench_function("codec/decode_rate_emails_100", |b| {
        b.iter(|| MessageEnvelope::decode(&bytes).unwrap());
    });
}

fn bench_decode_unknown_kind(c: &mut Criterion) {
    let bytes = br#"{"type":"unknown","timestamp":"2024-06-01T10:00:00Z","payload":{}}"#;

    c.bench_function("codec/decode_unknown_kind", |b| {
        b.iter(|| MessageEnvelope::decode(bytes).unwrap_err());
    });
}

criterion_group!(
    benches,
    bench_encode_response,
    bench_decode_response,
    bench_rate_emails_batch_100,
    bench_decode_unknown_kind,
);
criterion_main!(benches);
