use chainvote_core::config::DEFAULT_CONTRACT_NAME;
use chainvote_core::{execute_block, ChainConfig, Ledger, LogicRegistry, Transaction};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const CANDIDATES: [&str; 4] = ["Dung", "Tuan", "Thanh", "Cuong"];

fn votes(ledger: &Ledger, count: usize) -> Vec<Transaction> {
    let address = ledger
        .directory()
        .resolve(DEFAULT_CONTRACT_NAME)
        .expect("default contract deployed")
        .to_string();
    (0..count)
        .map(|i| {
            Transaction::vote(format!("voter-{}", i), address.as_str(), CANDIDATES[i % 4])
                .expect("valid vote")
        })
        .collect()
}

fn bench_execute_block(c: &mut Criterion) {
    let ledger = Ledger::from_config(ChainConfig::default()).expect("default config");
    let logic = LogicRegistry::builtin();
    let parent = ledger.latest().contract_accounts().clone();

    let mut group = c.benchmark_group("execute_block");
    for count in [10usize, 100, 1000] {
        let txs = votes(&ledger, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &txs, |b, txs| {
            b.iter(|| execute_block(&logic, black_box(&parent), black_box(txs)))
        });
    }
    group.finish();
}

fn bench_state_hash(c: &mut Criterion) {
    let mut config = ChainConfig::default();
    config.limits.max_block_transactions = 500;
    let mut ledger = Ledger::from_config(config).expect("default config");
    for tx in votes(&ledger, 500) {
        ledger.submit(tx).expect("fresh transaction");
    }
    let mined = ledger.mine_block();
    let registry = mined.block.contract_accounts().clone();

    c.bench_function("state_hash_500_voters", |b| {
        b.iter(|| black_box(&registry).state_hash())
    });
}

criterion_group!(benches, bench_execute_block, bench_state_hash);
criterion_main!(benches);
