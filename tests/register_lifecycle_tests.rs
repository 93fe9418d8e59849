use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use sds_register::{
    AccountAddress, BlockHeader, BondStatus, CacheConfig, Coin, Context, Description,
    GenesisState, Ledger, MemoryLedger, MemoryStore, MetaNode, NetworkAddress, NodeKind, NodeType,
    RegisterError, RegisterKeeper, VoteOpinion,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DENOM: &str = "ustos";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn genesis_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn block(store: &MemoryStore, days: i64) -> Context<'_> {
    Context::new(
        store,
        BlockHeader {
            height: days + 1,
            time: genesis_time() + Duration::days(days),
        },
    )
}

fn addr(id: u8) -> NetworkAddress {
    NetworkAddress::new([id; 20])
}

fn owner(id: u8) -> AccountAddress {
    AccountAddress::new([id + 100; 20])
}

fn bonded_meta_node(id: u8, tokens: u128) -> MetaNode {
    let mut node = MetaNode::new(
        addr(id),
        vec![id],
        owner(id),
        None,
        Description::with_moniker(format!("meta-{}", id)),
        genesis_time(),
    )
    .unwrap();
    node.tokens = tokens;
    node.status = BondStatus::Bonded;
    node.suspended = false;
    node
}

/// Register with four bonded meta nodes of 100 tokens each at rate 10
struct TestChain {
    keeper: RegisterKeeper,
    ledger: Arc<MemoryLedger>,
    store: MemoryStore,
}

fn create_test_chain() -> TestChain {
    init_logging();

    let ledger = Arc::new(MemoryLedger::new());
    let keeper = RegisterKeeper::new(ledger.clone(), &CacheConfig::default());
    let store = MemoryStore::new();

    let genesis = GenesisState {
        meta_nodes: (1..=4).map(|id| bonded_meta_node(id, 100)).collect(),
        deposit_noz_rate: Decimal::from(10u32),
        ..GenesisState::default()
    };
    for node in &genesis.meta_nodes {
        ledger.mint(&node.owner_address, &Coin::new(DENOM, node.tokens));
    }
    keeper.init_genesis(&block(&store, 0), &genesis).unwrap();

    TestChain { keeper, ledger, store }
}

fn register_resource_node(chain: &TestChain, ctx: &Context<'_>, id: u8, deposit: u128) {
    chain.ledger.mint(&owner(id), &Coin::new(DENOM, deposit));
    chain
        .keeper
        .register_resource_node(
            ctx,
            addr(id),
            vec![id],
            owner(id),
            Description::with_moniker(format!("resource-{}", id)),
            NodeType::STORAGE | NodeType::DATABASE,
            Coin::new(DENOM, deposit),
        )
        .unwrap();
}

fn register_meta_node(chain: &TestChain, ctx: &Context<'_>, id: u8, deposit: u128) {
    chain.ledger.mint(&owner(id), &Coin::new(DENOM, deposit));
    chain
        .keeper
        .register_meta_node(
            ctx,
            addr(id),
            vec![id],
            owner(id),
            None,
            Description::with_moniker(format!("meta-{}", id)),
            Coin::new(DENOM, deposit),
        )
        .unwrap();
}

fn vote(chain: &TestChain, ctx: &Context<'_>, candidate: u8, voter: u8) -> Result<BondStatus, RegisterError> {
    chain.keeper.handle_vote_for_meta_node_registration(
        ctx,
        &addr(candidate),
        &owner(candidate),
        VoteOpinion::Approve,
        &addr(voter),
        &owner(voter),
    )
}

#[test]
fn test_meta_node_admission_by_majority() {
    let chain = create_test_chain();
    let ctx = block(&chain.store, 1);
    assert_eq!(chain.keeper.remaining_ozone_limit(&ctx).unwrap(), 40);

    register_meta_node(&chain, &ctx, 5, 100);
    let candidate = chain.keeper.get_meta_node(&ctx, &addr(5)).unwrap().unwrap();
    assert_eq!(candidate.status, BondStatus::Unbonded);
    assert!(candidate.suspended);
    assert_eq!(chain.keeper.pool_totals(&ctx).unwrap().meta_node_not_bonded, 100);

    // floor(2 * 4 / 3) + 1 = 3 approvals needed
    assert_eq!(vote(&chain, &ctx, 5, 1).unwrap(), BondStatus::Unbonded);
    assert_eq!(vote(&chain, &ctx, 5, 2).unwrap(), BondStatus::Unbonded);
    assert_eq!(vote(&chain, &ctx, 5, 3).unwrap(), BondStatus::Bonded);

    let admitted = chain.keeper.get_meta_node(&ctx, &addr(5)).unwrap().unwrap();
    assert_eq!(admitted.status, BondStatus::Bonded);
    assert!(!admitted.suspended);

    let totals = chain.keeper.pool_totals(&ctx).unwrap();
    assert_eq!(totals.meta_node_not_bonded, 0);
    assert_eq!(totals.meta_node_bonded, 500);
    assert_eq!(chain.keeper.remaining_ozone_limit(&ctx).unwrap(), 50);
    assert_eq!(chain.keeper.bonded_node_count(&ctx, NodeKind::Meta).unwrap(), 5);

    // The new node takes the last slot
    chain.keeper.begin_block(&ctx).unwrap();
    assert_eq!(chain.keeper.get_meta_node_index(&ctx, &addr(5)).unwrap(), 4);
}

#[test]
fn test_votes_after_pass_do_not_change_status() {
    let chain = create_test_chain();
    let ctx = block(&chain.store, 1);
    register_meta_node(&chain, &ctx, 5, 100);
    for voter in 1..=3 {
        vote(&chain, &ctx, 5, voter).unwrap();
    }
    let totals_before = chain.keeper.pool_totals(&ctx).unwrap();

    assert_eq!(vote(&chain, &ctx, 5, 4).unwrap(), BondStatus::Bonded);

    let pool = chain
        .keeper
        .get_registration_vote_pool(&ctx, &addr(5))
        .unwrap()
        .unwrap();
    assert!(pool.is_vote_passed);
    assert_eq!(pool.approve_list.len(), 4);
    assert_eq!(chain.keeper.pool_totals(&ctx).unwrap(), totals_before);
    assert_eq!(chain.keeper.bonded_node_count(&ctx, NodeKind::Meta).unwrap(), 5);
}

#[test]
fn test_duplicate_vote_leaves_pool_untouched() {
    let chain = create_test_chain();
    let ctx = block(&chain.store, 1);
    register_meta_node(&chain, &ctx, 5, 100);
    vote(&chain, &ctx, 5, 1).unwrap();

    let before = chain
        .keeper
        .get_registration_vote_pool(&ctx, &addr(5))
        .unwrap()
        .unwrap();

    let result = chain.keeper.handle_vote_for_meta_node_registration(
        &ctx,
        &addr(5),
        &owner(5),
        VoteOpinion::Reject,
        &addr(1),
        &owner(1),
    );
    assert!(matches!(result, Err(RegisterError::DuplicateVoting(_))));

    let after = chain
        .keeper
        .get_registration_vote_pool(&ctx, &addr(5))
        .unwrap()
        .unwrap();
    assert_eq!(after, before);
}

#[test]
fn test_vote_on_expired_pool() {
    let chain = create_test_chain();
    register_meta_node(&chain, &block(&chain.store, 1), 5, 100);

    let late = block(&chain.store, 30);
    let result = vote(&chain, &late, 5, 1);
    assert!(matches!(result, Err(RegisterError::VoteExpired(_))));
}

#[test]
fn test_resource_node_full_unbonding_lifecycle() {
    let chain = create_test_chain();
    let day0 = block(&chain.store, 0);
    register_resource_node(&chain, &day0, 20, 100);
    assert_eq!(chain.keeper.remaining_ozone_limit(&day0).unwrap(), 50);

    let outcome = chain
        .keeper
        .remove_resource_node(&day0, &addr(20), &owner(20))
        .unwrap();
    assert_eq!(outcome.ozone_limit_change, 10);
    assert_eq!(chain.keeper.remaining_ozone_limit(&day0).unwrap(), 40);

    let node = chain.keeper.get_resource_node(&day0, &addr(20)).unwrap().unwrap();
    assert_eq!(node.status, BondStatus::Unbonding);
    let unbonding = chain.keeper.get_unbonding_node(&day0, &addr(20)).unwrap().unwrap();
    assert_eq!(unbonding.entries.len(), 1);
    assert_eq!(unbonding.entries[0].balance, 100);

    // Young nodes wait out the threshold before the completion period
    let early = block(&chain.store, 100);
    chain.keeper.end_block(&early).unwrap();
    assert_eq!(chain.ledger.get_balance(&owner(20), DENOM).amount, 0);

    let matured = block(&chain.store, 200);
    assert!(chain.keeper.end_block(&matured).unwrap().is_empty());
    assert_eq!(chain.ledger.get_balance(&owner(20), DENOM).amount, 100);
    assert!(chain.keeper.get_resource_node(&matured, &addr(20)).unwrap().is_none());
    assert!(chain.keeper.get_unbonding_node(&matured, &addr(20)).unwrap().is_none());
    assert!(chain.keeper.get_all_unbonding_nodes(&matured).unwrap().is_empty());
    assert_eq!(chain.keeper.pool_totals(&matured).unwrap().resource_node_not_bonded, 0);
    assert_eq!(chain.keeper.bonded_node_count(&matured, NodeKind::Resource).unwrap(), 0);
}

#[test]
fn test_release_pays_outstanding_slashing_first() {
    let chain = create_test_chain();
    let day0 = block(&chain.store, 0);
    register_resource_node(&chain, &day0, 20, 100);
    chain.keeper.slash_resource_node(&day0, &addr(20), 30, false).unwrap();
    chain
        .keeper
        .remove_resource_node(&day0, &addr(20), &owner(20))
        .unwrap();

    let matured = block(&chain.store, 200);
    chain.keeper.end_block(&matured).unwrap();

    assert_eq!(chain.ledger.get_balance(&owner(20), DENOM).amount, 70);
    assert_eq!(chain.keeper.slashing_of(&matured, &owner(20)).unwrap(), 0);
    assert_eq!(chain.keeper.pool_totals(&matured).unwrap().total_slashed, 30);
}

#[test]
fn test_end_block_without_matured_entries_is_a_no_op() {
    let chain = create_test_chain();
    let day0 = block(&chain.store, 0);
    register_resource_node(&chain, &day0, 20, 100);
    chain
        .keeper
        .update_resource_node_deposit(&day0, &addr(20), &owner(20), -40)
        .unwrap();
    chain.keeper.begin_block(&day0).unwrap();

    let ctx = block(&chain.store, 10);
    let totals = chain.keeper.pool_totals(&ctx).unwrap();
    let ozone = chain.keeper.remaining_ozone_limit(&ctx).unwrap();
    let effective = chain.keeper.effective_total_deposit(&ctx).unwrap();
    let node = chain.keeper.get_resource_node(&ctx, &addr(20)).unwrap();
    let index = chain.keeper.get_meta_node_index(&ctx, &addr(3)).unwrap();

    for _ in 0..3 {
        assert!(chain.keeper.end_block(&ctx).unwrap().is_empty());
    }

    assert_eq!(chain.keeper.pool_totals(&ctx).unwrap(), totals);
    assert_eq!(chain.keeper.remaining_ozone_limit(&ctx).unwrap(), ozone);
    assert_eq!(chain.keeper.effective_total_deposit(&ctx).unwrap(), effective);
    assert_eq!(chain.keeper.get_resource_node(&ctx, &addr(20)).unwrap(), node);
    assert_eq!(chain.keeper.get_meta_node_index(&ctx, &addr(3)).unwrap(), index);
    assert!(ctx.events().events().is_empty());
}

#[test]
fn test_top_up_then_withdraw_restores_capacity() {
    let chain = create_test_chain();
    let day0 = block(&chain.store, 0);
    register_resource_node(&chain, &day0, 20, 100);
    let ozone = chain.keeper.remaining_ozone_limit(&day0).unwrap();
    let effective = chain.keeper.effective_total_deposit(&day0).unwrap();

    chain.ledger.mint(&owner(20), &Coin::new(DENOM, 50));
    let top_up = chain
        .keeper
        .update_resource_node_deposit(&day0, &addr(20), &owner(20), 50)
        .unwrap();
    assert_eq!(top_up.ozone_limit_change, 5);

    let withdraw = chain
        .keeper
        .update_resource_node_deposit(&day0, &addr(20), &owner(20), -50)
        .unwrap();
    assert_eq!(withdraw.ozone_limit_change, -5);

    assert_eq!(chain.keeper.remaining_ozone_limit(&day0).unwrap(), ozone);
    assert_eq!(chain.keeper.effective_total_deposit(&day0).unwrap(), effective);

    // Node stays bonded after a partial withdrawal
    let node = chain.keeper.get_resource_node(&day0, &addr(20)).unwrap().unwrap();
    assert_eq!(node.status, BondStatus::Bonded);
    assert_eq!(node.tokens, 150);

    let matured = block(&chain.store, 200);
    chain.keeper.end_block(&matured).unwrap();
    let node = chain.keeper.get_resource_node(&matured, &addr(20)).unwrap().unwrap();
    assert_eq!(node.tokens, 100);
    assert_eq!(node.status, BondStatus::Bonded);
    assert_eq!(chain.ledger.get_balance(&owner(20), DENOM).amount, 50);
}

#[test]
fn test_unadmitted_meta_node_withdraws_registration_deposit() {
    let chain = create_test_chain();
    let ctx = block(&chain.store, 1);
    register_meta_node(&chain, &ctx, 6, 80);
    assert_eq!(chain.ledger.get_balance(&owner(6), DENOM).amount, 0);

    let mature_time = chain
        .keeper
        .withdraw_meta_node_registration_deposit(&ctx, &addr(6), &owner(6))
        .unwrap();
    assert_eq!(mature_time, ctx.block_time());

    chain.keeper.end_block(&ctx).unwrap();
    assert_eq!(chain.ledger.get_balance(&owner(6), DENOM).amount, 80);
    assert!(chain.keeper.get_meta_node(&ctx, &addr(6)).unwrap().is_none());
    assert!(chain
        .keeper
        .get_registration_vote_pool(&ctx, &addr(6))
        .unwrap()
        .is_none());

    // Bonded nodes must unbond through removal instead
    let result = chain
        .keeper
        .withdraw_meta_node_registration_deposit(&ctx, &addr(1), &owner(1));
    assert!(matches!(result, Err(RegisterError::InvalidNodeStatus(_))));
}

#[test]
fn test_withdrawn_candidate_cannot_be_admitted() {
    let chain = create_test_chain();
    let ctx = block(&chain.store, 1);
    register_meta_node(&chain, &ctx, 5, 100);
    chain
        .keeper
        .withdraw_meta_node_registration_deposit(&ctx, &addr(5), &owner(5))
        .unwrap();

    for voter in 1..=3 {
        let result = vote(&chain, &ctx, 5, voter);
        assert!(matches!(result, Err(RegisterError::NoRegistrationVotePoolFound(_))));
    }
    chain.keeper.end_block(&ctx).unwrap();

    let bonded = chain
        .keeper
        .get_all_meta_nodes(&ctx)
        .unwrap()
        .into_iter()
        .filter(|node| node.status == BondStatus::Bonded)
        .count() as u64;
    assert_eq!(bonded, 4);
    assert_eq!(chain.keeper.bonded_node_count(&ctx, NodeKind::Meta).unwrap(), bonded);
    assert!(chain.keeper.get_meta_node(&ctx, &addr(5)).unwrap().is_none());
    assert_eq!(chain.ledger.get_balance(&owner(5), DENOM).amount, 100);
    assert_eq!(chain.keeper.pool_totals(&ctx).unwrap().meta_node_bonded, 400);
}

#[test]
fn test_deposit_never_negative() {
    let chain = create_test_chain();
    let day0 = block(&chain.store, 0);
    register_resource_node(&chain, &day0, 20, 100);

    let result = chain
        .keeper
        .update_resource_node_deposit(&day0, &addr(20), &owner(20), -101);
    assert!(matches!(result, Err(RegisterError::InsufficientBalance(_))));

    chain
        .keeper
        .update_resource_node_deposit(&day0, &addr(20), &owner(20), -60)
        .unwrap();
    let result = chain
        .keeper
        .update_resource_node_deposit(&day0, &addr(20), &owner(20), -60);
    assert!(matches!(result, Err(RegisterError::InsufficientBalance(_))));

    let node = chain.keeper.get_resource_node(&day0, &addr(20)).unwrap().unwrap();
    assert_eq!(node.tokens, 100);
}

#[test]
fn test_genesis_export_after_activity() {
    let chain = create_test_chain();
    let ctx = block(&chain.store, 1);
    register_resource_node(&chain, &ctx, 20, 100);
    chain.keeper.slash_resource_node(&ctx, &addr(20), 5, false).unwrap();

    let exported = chain.keeper.export_genesis(&ctx).unwrap();
    assert_eq!(exported.meta_nodes.len(), 4);
    assert_eq!(exported.resource_nodes.len(), 1);
    assert_eq!(exported.remaining_noz_limit, 50);
    assert_eq!(exported.slashing.len(), 1);

    let json = exported.to_json().unwrap();
    assert_eq!(GenesisState::from_json(&json).unwrap(), exported);
}
