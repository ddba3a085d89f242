//! Micro-benchmarks for RoutingTable operations: notice, closest and
//! set_node_dead on a full-width ring. Reports nanoseconds-per-operation.
//!
//! Run: `cargo bench --bench routing_table`

use std::time::Instant;

use chord_ring::{Id, Ring, RingPosition, RoutingTable, NBIT};

fn main() {
    println!("routing_table\n");

    let ring = Ring::new(NBIT as u8).unwrap();

    bench_notice(ring);
    bench_closest(ring);
    bench_set_node_dead(ring);
}

fn filled(ring: Ring, size: usize) -> RoutingTable {
    let mut table = RoutingTable::new(ring, Id::random());
    for _ in 0..size {
        table.notice(Id::random());
    }
    table
}

fn bench_notice(ring: Ring) {
    println!("notice");

    let ids: Vec<_> = (0..10_000).map(|_| Id::random()).collect();

    for size in [0, 100, 1000] {
        let mut table = filled(ring, size);

        let start = Instant::now();
        for id in &ids {
            table.notice(*id);
        }
        let per_op = start.elapsed().as_nanos() / ids.len() as u128;
        println!(
            "{size:>4} noticed: {per_op}ns/op (live wedges: {})",
            table.live_wedges()
        );
    }

    println!();
}

fn bench_closest(ring: Ring) {
    println!("closest");

    let targets: Vec<_> = (0..10_000)
        .map(|_| RingPosition(rand::random::<u32>()))
        .collect();

    for size in [10, 100, 1000] {
        let table = filled(ring, size);

        let start = Instant::now();
        for target in &targets {
            let _ = table.closest_preceding(*target);
            let _ = table.closest_succeeding(*target);
        }
        let per_op = start.elapsed().as_nanos() / (2 * targets.len() as u128);
        println!("{size:>4} noticed: {per_op}ns/op");
    }

    println!();
}

fn bench_set_node_dead(ring: Ring) {
    println!("set_node_dead");

    let mut table = RoutingTable::new(ring, Id::random());

    let ids: Vec<_> = (0..1000).map(|_| Id::random()).collect();
    for id in &ids {
        table.notice(*id);
    }

    let start = Instant::now();
    for id in &ids {
        table.set_node_dead(id);
    }
    let per_op = start.elapsed().as_nanos() / ids.len() as u128;
    println!("{per_op}ns/op ({} nodes)", ids.len());
    println!();
}
