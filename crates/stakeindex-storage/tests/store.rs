//! Repository semantics of the in-memory backend, plus finalization on top
//! of it.

mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use stakeindex_core::{
    AccountStore, Amount, BatchSink, BlockStore, Bucket, BulkImporter, CanonicalStore, Canonicity,
    Finalizer, IndexerError, Percentage, RewardOwnerType, RewardStore, RewardsParams, StatsStore,
    TransactionStore, ValidatorStore,
};
use stakeindex_storage::InMemoryStorage;

use common::{account, block, data, time, transaction, validator, ALICE, BOB, CREATOR};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn units(value: rust_decimal::Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// Import every row of `data` and mark its block canonical.
async fn ingest(store: &InMemoryStorage, data: &stakeindex_core::Data) {
    let importer = BulkImporter::default();
    importer.import(store, std::slice::from_ref(&data.block)).await.unwrap();
    importer.import(store, std::slice::from_ref(&data.validator)).await.unwrap();
    importer.import(store, &data.accounts).await.unwrap();
    importer.import(store, &data.transactions).await.unwrap();
    store.mark_canonical(&data.block.hash).await.unwrap();
}

// ─── Canonicity ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn mark_canonical_missing_block_is_not_found() {
    let store = InMemoryStorage::new();
    let err = store.mark_canonical("3NKnope").await.unwrap_err();
    assert!(err.is_not_found());
    let err = store.switch_canonical(1, "3NKnope").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn mark_canonical_is_idempotent() {
    let store = InMemoryStorage::new();
    let d = data(3, "3NKa", "3NKp");
    ingest(&store, &d).await;

    let first = store.mark_canonical("3NKa").await.unwrap();
    let second = store.mark_canonical("3NKa").await.unwrap();
    assert_eq!(first, 2);
    assert_eq!(first, second);
    let txs = store.transactions_by_block("3NKa").await.unwrap();
    assert!(txs.iter().all(|t| t.canonicity == Canonicity::Canonical));
}

#[tokio::test]
async fn switch_canonical_keeps_one_block_per_height() {
    let store = InMemoryStorage::new();
    ingest(&store, &data(10, "3NKa", "3NKp")).await;
    let rival = data(10, "3NKb", "3NKp");
    let importer = BulkImporter::default();
    importer.import(&store, std::slice::from_ref(&rival.block)).await.unwrap();
    importer.import(&store, &rival.transactions).await.unwrap();

    // importing a rival never touches the current flags
    assert_eq!(store.canonical_block_at(10).await.unwrap().unwrap().hash, "3NKa");

    store.switch_canonical(10, "3NKb").await.unwrap();
    let blocks = store.blocks_at(10).await.unwrap();
    let canonical: Vec<_> = blocks.iter().filter(|b| b.canonicity.is_canonical()).collect();
    assert_eq!(canonical.len(), 1);
    assert_eq!(canonical[0].hash, "3NKb");

    let orphaned = store.mark_orphan(10).await.unwrap();
    assert_eq!(orphaned, 4);
    assert_eq!(store.last_canonical_height().await.unwrap(), None);
}

// ─── Upserts ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reimport_updates_without_duplicating() {
    let store = InMemoryStorage::new();
    let b = block(5, "3NKa", "3NKp", CREATOR);
    let mut tx = transaction("CkpX", &b);
    let t0 = Utc::now();
    store.write_batch(std::slice::from_ref(&tx), t0).await.unwrap();

    tx.memo = "second".into();
    let t1 = t0 + Duration::seconds(5);
    store.write_batch(std::slice::from_ref(&tx), t1).await.unwrap();

    assert_eq!(store.transaction_count().unwrap(), 1);
    let (created, updated) = store.transaction_stamps("CkpX", "3NKa").unwrap().unwrap();
    assert_eq!(created, t0);
    assert_eq!(updated, t1);
    assert_eq!(store.transactions_by_block("3NKa").await.unwrap()[0].memo, "second");

    // same command included by a competing block is a separate row
    let rival = block(5, "3NKb", "3NKp", CREATOR);
    store
        .write_batch(&[transaction("CkpX", &rival)], t1)
        .await
        .unwrap();
    assert_eq!(store.transaction_count().unwrap(), 2);
}

#[tokio::test]
async fn reimport_keeps_canonicity() {
    let store = InMemoryStorage::new();
    let d = data(4, "3NKa", "3NKp");
    ingest(&store, &d).await;
    store
        .write_batch(std::slice::from_ref(&d.block), Utc::now())
        .await
        .unwrap();
    let stored = store.block_by_hash("3NKa").await.unwrap().unwrap();
    assert_eq!(stored.canonicity, Canonicity::Canonical);
}

#[tokio::test]
async fn account_upsert_keeps_first_seen_and_weight() {
    let store = InMemoryStorage::new();
    let early = block(3, "3NKa", "3NKp", CREATOR);
    let late = block(9, "3NKb", "3NKp", CREATOR);

    store
        .write_batch(&[account(ALICE, CREATOR, 500, &early)], Utc::now())
        .await
        .unwrap();
    let weight: Percentage = "50".parse().unwrap();
    store
        .update_stake_weights(&[(ALICE.to_string(), weight)])
        .await
        .unwrap();
    store
        .write_batch(&[account(ALICE, BOB, 800, &late)], Utc::now())
        .await
        .unwrap();

    let stored = store.account(ALICE).await.unwrap().unwrap();
    assert_eq!(stored.start_height, 3);
    assert_eq!(stored.start_time, early.time);
    assert_eq!(stored.last_height, 9);
    assert_eq!(stored.balance, Amount::from_units(800));
    assert_eq!(stored.delegate.as_deref(), Some(BOB));
    assert_eq!(stored.stake_weight, Some(weight));

    assert!(store.delegators_of(CREATOR).await.unwrap().is_empty());
    assert_eq!(store.delegators_of(BOB).await.unwrap().len(), 1);
}

#[tokio::test]
async fn staking_update_requires_validator() {
    let store = InMemoryStorage::new();
    let err = store
        .update_validator_staking("B62qghost", Amount::ZERO, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::NotFound));
}

// ─── Finalization ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn finalize_splits_reward_across_delegators() {
    let store = InMemoryStorage::new();
    let d = data(2, "3NKa", "3NKp");
    ingest(&store, &d).await;

    let report = Finalizer::default()
        .finalize(&store, &d.block, None)
        .await
        .unwrap();
    assert_eq!(report.delegators, 3);
    assert_eq!(report.rewards, 3);
    assert_eq!(report.dust, Amount::ZERO);

    // 720 at 5% fee over 300/500/200: 36 + 205.2 to the validator
    let rewards = store.rewards_of("3NKa").unwrap();
    let amount_of = |owner: &str, kind| {
        rewards
            .iter()
            .find(|r| r.owner_account == owner && r.owner_type == kind)
            .map(|r| r.amount)
    };
    assert_eq!(amount_of(CREATOR, RewardOwnerType::Validator), Some(units(dec!(241.2))));
    assert_eq!(amount_of(ALICE, RewardOwnerType::Delegator), Some(units(dec!(342))));
    assert_eq!(amount_of(BOB, RewardOwnerType::Delegator), Some(units(dec!(136.8))));
    assert_eq!(amount_of(CREATOR, RewardOwnerType::Delegator), None);
    let total = Amount::checked_sum(rewards.iter().map(|r| r.amount)).unwrap();
    assert_eq!(total, d.block.coinbase);

    let v = store.validator(CREATOR).await.unwrap().unwrap();
    assert_eq!(v.stake, Amount::from_units(1000));
    assert_eq!(v.delegations_count, 2);
    assert_eq!(v.blocks_produced, 1);

    let alice = store.account(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.stake_weight, Some("50".parse().unwrap()));
}

#[tokio::test]
async fn finalize_twice_replaces_rows() {
    let store = InMemoryStorage::new();
    let d = data(2, "3NKa", "3NKp");
    ingest(&store, &d).await;
    let finalizer = Finalizer::default();

    finalizer.finalize(&store, &d.block, None).await.unwrap();
    let rewards = store.rewards_of("3NKa").unwrap();
    let chain = store.chain_stats(Bucket::Day, time(0), time(500)).await.unwrap();

    finalizer.finalize(&store, &d.block, None).await.unwrap();
    assert_eq!(store.rewards_of("3NKa").unwrap(), rewards);
    assert_eq!(
        store.chain_stats(Bucket::Day, time(0), time(500)).await.unwrap(),
        chain
    );
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].blocks_count, 1);
    assert_eq!(chain[0].payments_count, 1);
    assert_eq!(chain[0].transactions_volume, Amount::from_units(5));
    assert_eq!(chain[0].validators_count, 1);
}

#[tokio::test]
async fn producer_without_delegators_keeps_whole_reward() {
    let store = InMemoryStorage::new();
    let mut d = data(2, "3NKa", "3NKp");
    d.accounts.clear();
    ingest(&store, &d).await;

    let report = Finalizer::default()
        .finalize(&store, &d.block, None)
        .await
        .unwrap();
    assert_eq!(report.rewards, 1);
    let rewards = store.rewards_of("3NKa").unwrap();
    assert_eq!(rewards[0].owner_type, RewardOwnerType::Validator);
    assert_eq!(rewards[0].amount, d.block.coinbase);
}

#[tokio::test]
async fn validators_without_blocks_get_default_stats() {
    const OTHER: &str = "B62qother";
    let store = InMemoryStorage::new();
    let finalizer = Finalizer::default();

    // CREATOR produces in hour 0, OTHER in hour 1
    let d = data(2, "3NKa", "3NKp");
    ingest(&store, &d).await;
    finalizer.finalize(&store, &d.block, None).await.unwrap();

    let mut later = data(25, "3NKb", "3NKq");
    later.block.creator = OTHER.into();
    later.validator = validator(OTHER, &later.block);
    later.accounts.clear();
    ingest(&store, &later).await;
    let report = finalizer.finalize(&store, &later.block, None).await.unwrap();
    assert!(report.validator_stats >= 3);

    let hourly = store.validator_stats(CREATOR, Bucket::Hour).await.unwrap();
    assert_eq!(hourly.len(), 2);
    assert_eq!(hourly[0].blocks_produced_count, 1);
    assert_eq!(hourly[1].time, Bucket::Hour.floor(later.block.time));
    assert_eq!(hourly[1].blocks_produced_count, 0);
    assert_eq!(hourly[1].delegated_balance, Amount::from_units(1000));

    // day bucket: both already produced, nothing to default
    let err = store
        .find_validators_for_default_stats(Bucket::Day, later.block.time)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn stats_recompute_reflects_current_canonicity() {
    let store = InMemoryStorage::new();
    ingest(&store, &data(3, "3NKa", "3NKp")).await;
    let stat = store.create_chain_stats(Bucket::Hour, time(3)).await.unwrap();
    assert_eq!(stat.blocks_count, 1);
    assert_eq!(stat.time, time(0));

    store.mark_orphan(3).await.unwrap();
    let stat = store.create_chain_stats(Bucket::Hour, time(3)).await.unwrap();
    assert_eq!(stat.blocks_count, 0);
    assert_eq!(stat.transactions_count, 0);

    let stored = store.chain_stats(Bucket::Hour, time(0), time(20)).await.unwrap();
    assert_eq!(stored, vec![stat]);
}

// ─── Rewards summary ──────────────────────────────────────────────────────────

#[tokio::test]
async fn rewards_summary_groups_by_interval() {
    let store = InMemoryStorage::new();
    let finalizer = Finalizer::default();
    // heights 2 and 25 land in different hours of the same day
    for (h, hash, parent) in [(2, "3NKa", "3NKp"), (25, "3NKb", "3NKq")] {
        let d = data(h, hash, parent);
        ingest(&store, &d).await;
        finalizer.finalize(&store, &d.block, None).await.unwrap();
    }

    let params = |interval: &str, account: &str, owner: &str| RewardsParams {
        from: Some(time(0).date_naive()),
        to: Some(time(0).date_naive()),
        account_id: Some(account.into()),
        owner_type: owner.into(),
        interval: interval.into(),
    };

    let hourly = store
        .rewards_summary(&params("hourly", ALICE, "delegator").validate().unwrap())
        .await
        .unwrap();
    assert_eq!(hourly.len(), 2);
    assert!(hourly.iter().all(|s| s.amount == units(dec!(342))));

    let daily = store
        .rewards_summary(&params("daily", ALICE, "delegator").validate().unwrap())
        .await
        .unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].interval_start, time(0));
    assert_eq!(daily[0].amount, units(dec!(684)));

    let monthly = store
        .rewards_summary(&params("monthly", CREATOR, "validator").validate().unwrap())
        .await
        .unwrap();
    assert_eq!(monthly.len(), 1);
    assert_eq!(monthly[0].amount, units(dec!(482.4)));

    let none = store
        .rewards_summary(&params("daily", CREATOR, "delegator").validate().unwrap())
        .await
        .unwrap();
    assert!(none.is_empty());
}
