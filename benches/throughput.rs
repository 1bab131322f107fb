//! Throughput of the six concurrency-control disciplines under an RMW
//! load, keeping a fixed number of transactions in flight.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempo::workload::{LoadGen, RmwLoadGen, RmwLoadGen2};
use tempo::{CcMode, ProcessorConfig, TxnProcessor};

const ACTIVE_TXNS: usize = 100;
const DB_SIZE: u64 = 10_000;

fn config() -> ProcessorConfig {
    ProcessorConfig {
        threads: 4,
        init_records: DB_SIZE,
    }
}

fn pipeline(engine: &TxnProcessor, load: &mut dyn LoadGen) {
    for _ in 0..ACTIVE_TXNS {
        engine.new_txn_request(load.next_txn()).unwrap();
    }
    for _ in 0..ACTIVE_TXNS {
        engine.get_txn_result().unwrap();
    }
}

fn low_contention_read_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("low_contention_read_write");
    group.throughput(Throughput::Elements(ACTIVE_TXNS as u64));
    for mode in CcMode::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &mode| {
            let engine = TxnProcessor::with_config(mode, config());
            let mut load = RmwLoadGen::new(DB_SIZE, 2, 3, 0.0);
            b.iter(|| pipeline(&engine, &mut load));
        });
    }
    group.finish();
}

fn high_contention_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("high_contention_mixed");
    group.throughput(Throughput::Elements(ACTIVE_TXNS as u64));
    for mode in CcMode::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &mode| {
            let engine = TxnProcessor::with_config(mode, config());
            // 80% long read-only transactions over a hot 50-key range,
            // 20% fast updates.
            let mut load = RmwLoadGen2::new(50, 30, 10, 0.0001);
            b.iter(|| pipeline(&engine, &mut load));
        });
    }
    group.finish();
}

criterion_group!(benches, low_contention_read_write, high_contention_mixed);
criterion_main!(benches);
