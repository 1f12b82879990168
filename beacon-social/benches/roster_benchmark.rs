use criterion::{criterion_group, criterion_main, Criterion};
use beacon_social::protocol::{Identity, LogRecord, LogRequest, MessageEnvelope};
use beacon_social::poll::Reconciler;
use beacon_social::roster::RosterStore;
use beacon_social::router::{MessageRouter, Watermark};
use beacon_social::storage::{scan_journal, JournalEntry};
use std::hint::black_box;

/// 100 senders, each with an announce and a message to `U.me`.
fn sample_log(count: usize) -> Vec<LogRecord> {
    (0..count)
        .map(|i| {
            let sender = format!("U.peer{}", i % 100);
            let payload = if i % 2 == 0 {
                "ONLINE".to_string()
            } else {
                MessageEnvelope::new("U.me", "hello").encode().unwrap()
            };
            LogRecord::new(sender, payload, i as u64 + 1)
        })
        .collect()
}

fn bench_apply_presence_repeat(c: &mut Criterion) {
    let mut roster = RosterStore::new();
    let id = Identity::from("U.peer");
    roster.apply_presence(&id, true, 0);

    c.bench_function("apply_presence_unchanged", |b| {
        b.iter(|| {
            black_box(roster.apply_presence(black_box(&id), true, 1));
        })
    });
}

fn bench_route_message(c: &mut Criterion) {
    let me = Identity::from("U.me");
    let record = LogRecord::new(
        "U.bob",
        MessageEnvelope::new("U.me", "hello").encode().unwrap(),
        10,
    );

    c.bench_function("route_addressed_message", |b| {
        b.iter(|| {
            black_box(MessageRouter::route(black_box(&record), &me, Watermark::new(5)));
        })
    });
}

fn bench_first_batch_1000(c: &mut Criterion) {
    let records = sample_log(1000);

    c.bench_function("process_first_batch_1000", |b| {
        b.iter(|| {
            let mut reconciler = Reconciler::new(Identity::from("U.me"));
            black_box(reconciler.process_batch(black_box(&records), 1));
        })
    });
}

fn bench_refetch_batch_1000(c: &mut Criterion) {
    let records = sample_log(1000);
    let mut reconciler = Reconciler::new(Identity::from("U.me"));
    reconciler.process_batch(&records, 1);

    // Steady state: every poll refetches the same log.
    c.bench_function("process_refetch_batch_1000", |b| {
        b.iter(|| {
            black_box(reconciler.process_batch(black_box(&records), 2));
        })
    });
}

fn bench_request_encode(c: &mut Criterion) {
    let request = LogRequest::Append {
        request_id: 1,
        agent: "lobby".into(),
        sender: Identity::from("U.me"),
        payload: MessageEnvelope::new("U.bob", "hello").encode().unwrap(),
    };

    c.bench_function("log_request_encode", |b| {
        b.iter(|| {
            black_box(request.encode().unwrap());
        })
    });
}

fn bench_journal_scan_1000(c: &mut Criterion) {
    let mut bytes = Vec::new();
    for (i, record) in sample_log(1000).into_iter().enumerate() {
        let entry = JournalEntry::new(
            i as u64,
            "lobby",
            record.sender,
            record.payload,
            record.timestamp,
        );
        bytes.extend(entry.to_frame().unwrap());
    }

    c.bench_function("journal_scan_1000", |b| {
        b.iter(|| {
            black_box(scan_journal(black_box(&bytes)));
        })
    });
}

criterion_group!(
    benches,
    bench_apply_presence_repeat,
    bench_route_message,
    bench_first_batch_1000,
    bench_refetch_batch_1000,
    bench_request_encode,
    bench_journal_scan_1000,
);
criterion_main!(benches);
