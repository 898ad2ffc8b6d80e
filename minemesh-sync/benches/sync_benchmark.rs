use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use minemesh_board::generate_board;
use minemesh_sync::protocol::{ChatText, SessionUpdate};
use minemesh_sync::{Envelope, MemoryNetwork, MemoryTransport, Payload, Peer, PeerConfig, PeerId, TransportEvent};
use tokio::sync::mpsc::UnboundedReceiver;

fn chat_envelope() -> Envelope {
    Envelope::new(
        PeerId::from("ws://10.0.0.2:9000"),
        17,
        Payload::Chat(ChatText {
            text: "gl hf".into(),
            timestamp: 1_718_000_000_000,
        }),
    )
}

fn board_envelope(width: u32, height: u32, bombs: u32) -> Envelope {
    Envelope::new(
        PeerId::from("ws://10.0.0.2:9000"),
        18,
        Payload::SessionUpdate(SessionUpdate {
            board: generate_board(width, height, bombs).unwrap(),
            timestamp: 1_718_000_000_000,
        }),
    )
}

fn bench_chat_codec(c: &mut Criterion) {
    let env = chat_envelope();
    let encoded = env.encode().unwrap();

    c.bench_function("chat_encode", |b| {
        b.iter(|| black_box(black_box(&env).encode().unwrap()))
    });
    c.bench_function("chat_decode", |b| {
        b.iter(|| black_box(Envelope::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_board_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("board_update");
    for (name, w, h, bombs) in [("beginner", 9, 9, 10), ("expert", 30, 16, 99), ("max", 50, 50, 875)] {
        let env = board_envelope(w, h, bombs);
        let encoded = env.encode().unwrap();
        group.bench_with_input(BenchmarkId::new("encode", name), &env, |b, env| {
            b.iter(|| black_box(env.encode().unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", name), &encoded, |b, bytes| {
            b.iter(|| black_box(Envelope::decode(bytes).unwrap()))
        });
    }
    group.finish();
}

type Node = (Peer<MemoryTransport>, UnboundedReceiver<TransportEvent>);

fn settle(nodes: &mut [Node]) {
    loop {
        let handled: usize = nodes.iter_mut().map(|(peer, events)| peer.pump(events)).sum();
        if handled == 0 {
            break;
        }
    }
}

fn bench_chat_fan_out(c: &mut Criterion) {
    let net = MemoryNetwork::new();
    let mut nodes: Vec<Node> = ["a", "b", "c"]
        .into_iter()
        .map(|id| {
            let (transport, events) = net.join(id);
            (Peer::new(transport, PeerConfig::default()).unwrap(), events)
        })
        .collect();
    for (from, to) in [(0, 1), (1, 2), (0, 2)] {
        let target = nodes[to].0.id().clone();
        nodes[from].0.connect(&target).unwrap();
        settle(&mut nodes);
    }

    c.bench_function("chat_fan_out_3_peers", |b| {
        b.iter(|| {
            nodes[0].0.post(black_box("ping"));
            settle(&mut nodes);
        })
    });
}

criterion_group!(benches, bench_chat_codec, bench_board_codec, bench_chat_fan_out);
criterion_main!(benches);
