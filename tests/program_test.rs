//! End-to-end runs through the Solana runtime with the native processor.
//!
//! Run with: `cargo test --test program_test`

use bounty_board::{
    constants::{AUTO_RELEASE_TIMEOUT, TASK_LEN},
    engine::TaskTerms,
    error::BountyError,
    pda, sdk,
    state::{Config, Task, TaskStatus},
};
use solana_program::{instruction::Instruction, pubkey::Pubkey};
use solana_program_test::{processor, ProgramTest, ProgramTestContext};
use solana_sdk::{
    clock::Clock,
    instruction::InstructionError,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::{Transaction, TransactionError},
};

const SOL: u64 = 1_000_000_000;

async fn start() -> ProgramTestContext {
    let mut pt = ProgramTest::new(
        "bounty_board",
        bounty_board::ID,
        processor!(bounty_board::processor::process_instruction),
    );
    pt.prefer_bpf(false);
    pt.start_with_context().await
}

async fn send(ctx: &mut ProgramTestContext, ix: Instruction, signer: &Keypair) -> Result<(), TransactionError> {
    let blockhash = ctx.banks_client.get_latest_blockhash().await.unwrap();
    let tx = Transaction::new_signed_with_payer(&[ix], Some(&ctx.payer.pubkey()), &[&ctx.payer, signer], blockhash);
    ctx.banks_client.process_transaction(tx).await.map_err(|e| e.unwrap())
}

async fn fund(ctx: &mut ProgramTestContext, lamports: u64) -> Keypair {
    let wallet = Keypair::new();
    let ix = system_instruction::transfer(&ctx.payer.pubkey(), &wallet.pubkey(), lamports);
    let blockhash = ctx.banks_client.get_latest_blockhash().await.unwrap();
    let tx = Transaction::new_signed_with_payer(&[ix], Some(&ctx.payer.pubkey()), &[&ctx.payer], blockhash);
    ctx.banks_client.process_transaction(tx).await.unwrap();
    wallet
}

async fn balance(ctx: &mut ProgramTestContext, key: &Pubkey) -> u64 {
    ctx.banks_client.get_balance(*key).await.unwrap()
}

async fn task(ctx: &mut ProgramTestContext, id: u64) -> Task {
    let key = pda::task_address(&bounty_board::ID, id).0;
    let account = ctx.banks_client.get_account(key).await.unwrap().unwrap();
    assert_eq!(account.owner, bounty_board::ID);
    assert_eq!(account.data.len(), TASK_LEN);
    Task::unpack(&account.data).unwrap()
}

async fn config(ctx: &mut ProgramTestContext) -> Config {
    let key = pda::config_address(&bounty_board::ID).0;
    let account = ctx.banks_client.get_account(key).await.unwrap().unwrap();
    Config::unpack(&account.data).unwrap()
}

fn custom(err: BountyError) -> Result<(), TransactionError> {
    Err(TransactionError::InstructionError(0, InstructionError::Custom(err as u32)))
}

/// Initialize, create, claim and submit. Returns (creator, claimer).
async fn submitted_task(ctx: &mut ProgramTestContext, bounty: u64) -> (Keypair, Keypair) {
    let pid = bounty_board::ID;
    let admin = fund(ctx, SOL).await;
    let creator = fund(ctx, 2 * SOL).await;
    let claimer = fund(ctx, SOL).await;

    send(ctx, sdk::initialize(&pid, &admin.pubkey(), 200, 100_000_000), &admin).await.unwrap();
    let terms = TaskTerms { bounty, description_hash: [7u8; 32], deadline: 0, tags: [0u8; 16] };
    send(ctx, sdk::create_task(&pid, &creator.pubkey(), 0, &terms), &creator).await.unwrap();
    send(ctx, sdk::claim_task(&pid, &claimer.pubkey(), 0), &claimer).await.unwrap();
    send(ctx, sdk::submit_work(&pid, &claimer.pubkey(), 0, [9u8; 32]), &claimer).await.unwrap();
    (creator, claimer)
}

#[tokio::test]
async fn approve_pays_claimer_and_treasury() {
    let mut ctx = start().await;
    let pid = bounty_board::ID;
    let (creator, claimer) = submitted_task(&mut ctx, 10_000_000).await;
    let treasury = pda::treasury_address(&pid).0;

    let claimer_before = balance(&mut ctx, &claimer.pubkey()).await;
    let treasury_before = balance(&mut ctx, &treasury).await;
    send(&mut ctx, sdk::approve_work(&pid, &creator.pubkey(), 0, &claimer.pubkey()), &creator).await.unwrap();

    assert_eq!(balance(&mut ctx, &claimer.pubkey()).await - claimer_before, 9_800_000);
    assert_eq!(balance(&mut ctx, &treasury).await - treasury_before, 200_000);
    let task = task(&mut ctx, 0).await;
    assert_eq!(task.status, TaskStatus::Completed);
    let config = config(&mut ctx).await;
    assert_eq!(config.total_completed, 1);
    assert_eq!(config.total_escrowed, 0);
}

#[tokio::test]
async fn claim_expired_waits_for_timeout() {
    let mut ctx = start().await;
    let pid = bounty_board::ID;
    let (_creator, claimer) = submitted_task(&mut ctx, 10_000_000).await;
    let submitted_at = task(&mut ctx, 0).await.submitted_at;
    assert_ne!(submitted_at, 0);

    let early = fund(&mut ctx, SOL).await;
    let res = send(&mut ctx, sdk::claim_expired(&pid, &early.pubkey(), 0, &claimer.pubkey()), &early).await;
    assert_eq!(res, custom(BountyError::DeadlineNotReached));

    let mut clock: Clock = ctx.banks_client.get_sysvar().await.unwrap();
    clock.unix_timestamp = submitted_at + AUTO_RELEASE_TIMEOUT;
    ctx.set_sysvar(&clock);

    let keeper = fund(&mut ctx, SOL).await;
    let claimer_before = balance(&mut ctx, &claimer.pubkey()).await;
    send(&mut ctx, sdk::claim_expired(&pid, &keeper.pubkey(), 0, &claimer.pubkey()), &keeper).await.unwrap();

    assert_eq!(balance(&mut ctx, &claimer.pubkey()).await - claimer_before, 9_800_000);
    assert_eq!(task(&mut ctx, 0).await.status, TaskStatus::Completed);
}

#[tokio::test]
async fn approve_by_stranger_is_unauthorized() {
    let mut ctx = start().await;
    let pid = bounty_board::ID;
    let (_creator, claimer) = submitted_task(&mut ctx, 10_000_000).await;
    let stranger = fund(&mut ctx, SOL).await;

    let res = send(&mut ctx, sdk::approve_work(&pid, &stranger.pubkey(), 0, &claimer.pubkey()), &stranger).await;
    assert_eq!(res, custom(BountyError::Unauthorized));
    assert_eq!(task(&mut ctx, 0).await.status, TaskStatus::Submitted);
}
