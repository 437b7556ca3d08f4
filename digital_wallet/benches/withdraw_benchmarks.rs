use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use digital_wallet::db::{MemoryWalletStore, RepositoryRegistry};
use digital_wallet::wallet::{Wallet, WalletConfig, WalletManager, WithdrawRequest};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

/// Helper to create a manager with one wallet holding a very large balance
fn setup_manager(rt: &Runtime, user_id: &str) -> WalletManager<MemoryWalletStore> {
    let store = MemoryWalletStore::new();
    let wallet = Wallet::new(user_id, Decimal::new(1_000_000_000_000, 2), "IDR");
    rt.block_on(store.wallets().create(&wallet)).unwrap();

    let config = WalletConfig {
        record_failed_attempts: false,
        ..WalletConfig::default()
    };
    WalletManager::new(store, config)
}

fn request(user_id: &str) -> WithdrawRequest {
    WithdrawRequest {
        user_id: user_id.to_string(),
        amount: Decimal::new(1, 2),
        description: None,
    }
}

/// Benchmark a single uncontended withdrawal
fn bench_withdraw_uncontended(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let manager = setup_manager(&rt, "bench_single");

    c.bench_function("withdraw_uncontended", |b| {
        b.to_async(&rt)
            .iter(|| async { manager.withdraw(request("bench_single")).await.unwrap() });
    });
}

/// Benchmark bursts of concurrent withdrawals against one wallet
fn bench_withdraw_contended(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let manager = setup_manager(&rt, "bench_burst");
    let mut group = c.benchmark_group("withdraw_contended");

    for tasks in [2usize, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| async {
                let handles: Vec<_> = (0..tasks)
                    .map(|_| {
                        let manager = manager.clone();
                        tokio::spawn(async move { manager.withdraw(request("bench_burst")).await })
                    })
                    .collect();
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark paging through a wallet's journal
fn bench_transaction_history(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let manager = setup_manager(&rt, "bench_history");
    rt.block_on(async {
        for _ in 0..500 {
            manager.withdraw(request("bench_history")).await.unwrap();
        }
    });

    c.bench_function("transaction_history_page", |b| {
        b.to_async(&rt).iter(|| async {
            manager
                .get_transaction_history("bench_history", Some(50), Some(100))
                .await
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_withdraw_uncontended,
    bench_withdraw_contended,
    bench_transaction_history
);
criterion_main!(benches);
