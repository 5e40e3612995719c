//! Criterion benchmarks for the text parsers in gamelink-core.
//!
//! Discovery on a busy LAN can hand the announcement parser several hundred
//! records at once, and the pairing scanner runs on every transcript line.
//!
//! Run with:
//! ```bash
//! cargo bench --package gamelink-core --bench parse_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gamelink_core::protocol::announcement::{parse_announcements, NoResolver};
use gamelink_core::protocol::pairing::classify_line;
use gamelink_core::protocol::pin::PinMessage;

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Builds `hosts` announced hosts with one IPv4 and two IPv6 records each.
fn make_records(hosts: usize) -> String {
    let mut out = String::new();
    for i in 0..hosts {
        let name = format!("Host\\032{i}");
        let hostname = format!("host-{i}.local");
        out.push_str(&format!(
            "=;eth0;IPv4;{name};_nvstream._tcp;local;{hostname};192.168.{}.{};47989;\"\"\n",
            i / 250,
            i % 250 + 1
        ));
        out.push_str(&format!(
            "=;eth0;IPv6;{name};_nvstream._tcp;local;{hostname};fe80::{:x};47989;\"\"\n",
            i + 1
        ));
        out.push_str(&format!(
            "=;eth0;IPv6;{name};_nvstream._tcp;local;{hostname};2001:db8::{:x};47989;\"\"\n",
            i + 1
        ));
    }
    out
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_parse_announcements(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_announcements");
    for hosts in [1usize, 16, 256] {
        let raw = make_records(hosts);
        group.bench_with_input(BenchmarkId::new("hosts", hosts), &raw, |b, raw| {
            b.iter(|| parse_announcements(black_box(raw), &NoResolver))
        });
    }
    group.finish();
}

fn bench_transcript_scan(c: &mut Criterion) {
    let lines = [
        "Searching for host 192.168.1.40...",
        "Please enter the following PIN on the target PC: 738291",
        "Executing request https://192.168.1.40:47984/pair?devicename=roth",
        "Successfully paired",
    ];
    c.bench_function("classify_transcript_lines", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(classify_line(black_box(line)));
            }
        })
    });
}

fn bench_pin_decode(c: &mut Criterion) {
    c.bench_function("pin_message_decode", |b| {
        b.iter(|| PinMessage::decode(black_box(b"I_HAVE_PIN Living Room PC")))
    });
}

criterion_group!(
    benches,
    bench_parse_announcements,
    bench_transcript_scan,
    bench_pin_decode
);
criterion_main!(benches);
