use crate::fixtures::{ChainBuilder, TestChain};
use pegsign_core::domain::confirmation::{block_contribution, select_confirmed_blocks, ConfirmationParams};
use pegsign_core::foundation::{BlockHash, ProtocolVersion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn params(target: u128, max_confirmed: usize, version: ProtocolVersion) -> ConfirmationParams {
    ConfirmationParams { difficulty_target: target, max_confirmed, difficulty_cap: u128::MAX, version }
}

fn random_chain(rng: &mut StdRng) -> TestChain {
    let length: u64 = rng.gen_range(1..=40);
    let difficulties: Vec<u128> = (0..length).map(|_| rng.gen_range(1..=20)).collect();
    ChainBuilder::default().length(length).difficulties(difficulties).build()
}

#[test]
fn test_selection_when_random_chains_then_batches_are_contiguous_and_backed_by_work() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let chain = random_chain(&mut rng);
        let height = chain.blocks.len() as u64 - 1;
        let start = rng.gen_range(0..=height);
        let params = params(rng.gen_range(1..=60), rng.gen_range(1..=15), ProtocolVersion::V3);

        let batch = select_confirmed_blocks(chain.store.as_ref(), &chain.hash(start), &params).expect("select");
        assert!(batch.confirmed.len() <= params.max_confirmed);
        if batch.is_empty() {
            assert!(batch.proof.is_empty());
            continue;
        }

        let blocks: Vec<_> = batch.blocks().cloned().collect();
        for (offset, block) in blocks.iter().enumerate() {
            assert_eq!(block.number(), start + 1 + offset as u64, "heights strictly increase from the start block");
            assert_eq!(*block, *chain.block(block.number()));
        }
        for index in 0..batch.confirmed.len() {
            let work: u128 = blocks[index..].iter().map(|b| block_contribution(b, &params)).sum();
            assert!(work >= params.difficulty_target, "confirmed block {} lacks work", blocks[index].number());
        }
        if batch.confirmed.len() < params.max_confirmed {
            let pending: u128 = batch.proof.iter().map(|b| block_contribution(b, &params)).sum();
            assert!(pending < params.difficulty_target);
        }

        let again = select_confirmed_blocks(chain.store.as_ref(), &chain.hash(start), &params).expect("select again");
        assert_eq!(again, batch);
    }
}

#[test]
fn test_selection_when_chain_is_steady_then_oldest_blocks_confirm_first() {
    let chain = ChainBuilder::default().length(6).difficulty(5).build();
    let batch = select_confirmed_blocks(chain.store.as_ref(), &chain.hash(0), &params(10, 100, ProtocolVersion::V2)).expect("select");
    let confirmed: Vec<u64> = batch.confirmed.iter().map(|b| b.number()).collect();
    let proof: Vec<u64> = batch.proof.iter().map(|b| b.number()).collect();
    assert_eq!(confirmed, vec![1, 2, 3, 4, 5]);
    assert_eq!(proof, vec![6]);
    assert_eq!(batch.last_confirmed().map(|b| b.number()), Some(5));
}

#[test]
fn test_selection_when_max_reached_then_walk_stops() {
    let chain = ChainBuilder::default().length(20).difficulty(50).build();
    let batch = select_confirmed_blocks(chain.store.as_ref(), &chain.hash(3), &params(10, 4, ProtocolVersion::V2)).expect("select");
    assert_eq!(batch.confirmed.len(), 4);
    assert!(batch.proof.is_empty());
    assert_eq!(batch.last_confirmed().map(|b| b.number()), Some(7));
}

#[test]
fn test_selection_when_not_enough_work_then_batch_is_empty() {
    let chain = ChainBuilder::default().length(3).difficulty(1).build();
    let batch = select_confirmed_blocks(chain.store.as_ref(), &chain.hash(0), &params(100, 10, ProtocolVersion::V3)).expect("select");
    assert!(batch.is_empty());
    assert_eq!(batch.len(), 0);
}

#[test]
fn test_selection_when_start_is_tip_then_nothing_selected() {
    let chain = ChainBuilder::default().length(3).build();
    let batch = select_confirmed_blocks(chain.store.as_ref(), &chain.tip().hash(), &params(1, 10, ProtocolVersion::V3)).expect("select");
    assert!(batch.is_empty());
}

#[test]
fn test_selection_when_start_unknown_then_desync() {
    let chain = ChainBuilder::default().length(3).build();
    let err = select_confirmed_blocks(chain.store.as_ref(), &BlockHash::new([0xee; 32]), &params(1, 10, ProtocolVersion::V3))
        .expect_err("unknown start");
    assert!(err.is_chain_desync());
}

#[test]
fn test_contribution_when_cap_active_then_uncles_count_and_cap_applies() {
    let chain = ChainBuilder::default().length(3).difficulty(5).uncle_at(2).build();
    let with_uncle = chain.block(2);
    assert_eq!(with_uncle.uncles.len(), 1);

    let v3 = params(10, 10, ProtocolVersion::V3);
    assert_eq!(block_contribution(with_uncle, &v3), 5, "uncles are ignored before the cap version");

    let mut v4 = params(10, 10, ProtocolVersion::V4);
    assert_eq!(block_contribution(with_uncle, &v4), 10);
    v4.difficulty_cap = 7;
    assert_eq!(block_contribution(with_uncle, &v4), 7);
    assert_eq!(block_contribution(chain.block(1), &v4), 5);
}

#[test]
fn test_selection_when_cap_limits_big_block_then_more_blocks_are_needed() {
    let chain = ChainBuilder::default().length(4).difficulties([100, 1, 1, 1]).build();
    let uncapped = select_confirmed_blocks(chain.store.as_ref(), &chain.hash(0), &params(50, 10, ProtocolVersion::V3)).expect("select");
    assert_eq!(uncapped.confirmed.len(), 1);

    let mut capped = params(50, 10, ProtocolVersion::V4);
    capped.difficulty_cap = 20;
    let batch = select_confirmed_blocks(chain.store.as_ref(), &chain.hash(0), &capped).expect("select");
    assert!(batch.is_empty());
}
