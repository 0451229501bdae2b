//! Criterion benchmarks for the Wake-on-LAN and switch-command codecs.
//!
//! Both encoders run on every rotation cycle or wake request, so they should
//! stay in the sub-microsecond range.
//!
//! Run with:
//! ```bash
//! cargo bench --package kvm-switch-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kvm_switch_core::{
    eligible_ports, encode_command, encode_magic_packet, encode_port, parse_command,
    select_next_port, MacAddress, PortNumber, Presence, PresenceState, Target, TargetId,
    ROTATION_POLICY,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const MAC_INPUTS: [(&str, &str); 3] = [
    ("colon", "00:1A:2B:3C:4D:5E"),
    ("hyphen", "00-1a-2b-3c-4d-5e"),
    ("bare", "001A2B3C4D5E"),
];

fn make_targets() -> Vec<Target> {
    PortNumber::all()
        .map(|port| {
            let id = format!("target-{port}");
            Target::new(TargetId::new(&*id), &*id, port).with_host_address(format!("10.0.0.{port}"))
        })
        .collect()
}

fn make_presence(targets: &[Target]) -> PresenceState {
    targets
        .iter()
        .map(|t| {
            let online = t.port_number().get() % 3 != 0;
            (t.id().clone(), Presence::from_probe(online))
        })
        .collect()
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_magic_packet(c: &mut Criterion) {
    let mut group = c.benchmark_group("magic_packet");
    for (name, input) in MAC_INPUTS {
        group.bench_with_input(BenchmarkId::new("encode", name), input, |b, mac| {
            b.iter(|| encode_magic_packet(black_box(mac)))
        });
    }
    let mac = MacAddress::new([0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E]);
    group.bench_function("from_parsed_address", |b| {
        b.iter(|| black_box(mac).magic_packet())
    });
    group.finish();
}

fn bench_switch_command(c: &mut Criterion) {
    let mut group = c.benchmark_group("switch_command");
    for port in [1u8, 9, 10] {
        let port = PortNumber::new(port).unwrap();
        group.bench_with_input(BenchmarkId::new("encode_port", port), &port, |b, p| {
            b.iter(|| encode_port(black_box(*p)))
        });
        let command = encode_port(port);
        group.bench_with_input(BenchmarkId::new("parse", port), &command, |b, cmd| {
            b.iter(|| parse_command(black_box(cmd)))
        });
    }
    let overridden = Target::new(TargetId::new("o"), "o", PortNumber::new(4).unwrap())
        .with_command_override("CUSTOM");
    group.bench_function("encode_command_override", |b| {
        b.iter(|| encode_command(black_box(&overridden)))
    });
    group.finish();
}

fn bench_rotation_selection(c: &mut Criterion) {
    let targets = make_targets();
    let presence = make_presence(&targets);
    let current = PortNumber::new(5).ok();

    c.bench_function("rotation/eligible_then_select", |b| {
        b.iter(|| {
            let eligible = eligible_ports(black_box(&targets), black_box(&presence), ROTATION_POLICY);
            select_next_port(&eligible, current)
        })
    });
}

criterion_group!(
    benches,
    bench_magic_packet,
    bench_switch_command,
    bench_rotation_selection
);
criterion_main!(benches);
