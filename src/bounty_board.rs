#![deny(unsafe_code)]

//! Bounty Board: single-file Solana program for escrowed task bounties.
//!
//! Creators lock a bounty in a task account, claimers submit proof of work,
//! and the program releases funds on approval, on the 48h auto-release, or on
//! admin dispute resolution. The same dispatcher runs on-chain (`entrypoint`)
//! and in-process (`host::Bank`).

use solana_program::declare_id;

declare_id!("GJgmGsoz1JaiPpKTTTeZD31TrxZqF7x7gtwuqhDJHHX1");

// 1. mod constants
pub mod constants {
    pub const CONFIG_SEED: &[u8] = b"config";
    pub const TREASURY_SEED: &[u8] = b"treasury";
    pub const TASK_SEED: &[u8] = b"task";

    pub const DISCRIMINATOR_LEN: usize = 8;
    pub const HASH_LEN: usize = 32;
    pub const TAGS_LEN: usize = 16;

    pub const CONFIG_LEN: usize = 112;
    /// Task records written before `submitted_at`/`claimed_at` existed.
    pub const TASK_LEN_V1: usize = 192;
    pub const TASK_LEN: usize = 208;
    pub const TREASURY_LEN: usize = 0;

    pub const TOTAL_BPS: u64 = 10_000;
    pub const MAX_FEE_BPS: u16 = 10_000;
    pub const DEFAULT_PROTOCOL_FEE_BPS: u16 = 200; // 2%
    pub const DEFAULT_DISPUTE_STAKE: u64 = 100_000_000; // 0.1 SOL
    pub const MIN_BOUNTY: u64 = 1;

    /// Seconds after submission before anyone may release the escrow.
    pub const AUTO_RELEASE_TIMEOUT: i64 = 48 * 60 * 60;
}

// 2. mod error
pub mod error {
    use num_derive::FromPrimitive;
    use solana_program::program_error::ProgramError;
    use thiserror::Error;

    #[derive(Clone, Copy, Debug, Eq, PartialEq, Error, FromPrimitive)]
    pub enum BountyError {
        #[error("signer or account owner is not authorized")]
        Unauthorized,
        #[error("operation is not valid for the task's current status")]
        InvalidState,
        #[error("insufficient funds")]
        InsufficientFunds,
        #[error("auto-release timeout has not elapsed")]
        DeadlineNotReached,
        #[error("account data is malformed")]
        MalformedAccount,
        #[error("unknown instruction")]
        UnknownInstruction,
        #[error("account already initialized")]
        AlreadyInitialized,
        #[error("config not initialized")]
        NotInitialized,
        #[error("bounty below minimum")]
        BountyTooSmall,
        #[error("protocol fee exceeds 10000 bps")]
        InvalidFee,
        #[error("proof hash is empty")]
        EmptyProof,
        #[error("task deadline has passed")]
        DeadlinePassed,
        #[error("dispute winner must be 0 (creator) or 1 (claimer)")]
        InvalidDisputeWinner,
        #[error("account address does not match its derivation")]
        InvalidAccountAddress,
        #[error("account not found")]
        AccountNotFound,
        #[error("arithmetic overflow")]
        Overflow,
    }

    impl From<BountyError> for ProgramError {
        fn from(e: BountyError) -> Self {
            ProgramError::Custom(e as u32)
        }
    }

    impl BountyError {
        /// Recovers the typed error from a `ProgramError::Custom` code.
        pub fn from_program_error(err: &ProgramError) -> Option<Self> {
            match err {
                ProgramError::Custom(code) => <Self as num_traits::FromPrimitive>::from_u32(*code),
                _ => None,
            }
        }
    }
}

// 3. mod pda
pub mod pda {
    use crate::constants::{CONFIG_SEED, TASK_SEED, TREASURY_SEED};
    use solana_program::pubkey::Pubkey;

    pub fn config_address(program_id: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[CONFIG_SEED], program_id)
    }

    pub fn treasury_address(program_id: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[TREASURY_SEED], program_id)
    }

    pub fn task_address(program_id: &Pubkey, task_id: u64) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[TASK_SEED, &task_id.to_le_bytes()], program_id)
    }
}

// 4. mod state (record codec)
pub mod state {
    use arrayref::{array_refs, mut_array_refs};
    use num_derive::FromPrimitive;
    use solana_program::pubkey::Pubkey;

    use crate::constants::*;
    use crate::error::BountyError;

    #[repr(u8)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum AccountKind {
        Config = 0,
        Task = 1,
    }

    impl AccountKind {
        pub fn discriminator(self) -> [u8; DISCRIMINATOR_LEN] {
            let mut disc = [0u8; DISCRIMINATOR_LEN];
            disc[0] = self as u8;
            disc
        }
    }

    #[repr(u8)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromPrimitive)]
    pub enum TaskStatus {
        Open = 0,
        Claimed = 1,
        Submitted = 2,
        Completed = 3,
        Cancelled = 4,
        Disputed = 5,
    }

    impl TaskStatus {
        pub const ALL: [TaskStatus; 6] = [
            TaskStatus::Open,
            TaskStatus::Claimed,
            TaskStatus::Submitted,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
            TaskStatus::Disputed,
        ];

        pub fn from_byte(b: u8) -> Option<Self> {
            <Self as num_traits::FromPrimitive>::from_u8(b)
        }

        pub fn is_terminal(self) -> bool {
            matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
        }

        /// Statuses whose bounty still counts toward `total_escrowed`.
        pub fn holds_escrow(self) -> bool {
            !self.is_terminal()
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Config {
        pub admin: Pubkey,
        pub protocol_fee_bps: u16,
        pub treasury: Pubkey,
        pub task_count: u64,
        pub total_escrowed: u64,
        pub total_completed: u64,
        pub dispute_stake: u64,
    }

    impl Config {
        pub fn unpack(data: &[u8]) -> Result<Self, BountyError> {
            let data: &[u8; CONFIG_LEN] = data.try_into().map_err(|_| BountyError::MalformedAccount)?;
            let (disc, admin, fee_bps, _pad, treasury, task_count, total_escrowed, total_completed, dispute_stake) =
                array_refs![data, 8, 32, 2, 6, 32, 8, 8, 8, 8];

            if *disc != AccountKind::Config.discriminator() {
                return Err(BountyError::MalformedAccount);
            }
            let protocol_fee_bps = u16::from_le_bytes(*fee_bps);
            if protocol_fee_bps > MAX_FEE_BPS {
                return Err(BountyError::MalformedAccount);
            }

            Ok(Config {
                admin: Pubkey::new_from_array(*admin),
                protocol_fee_bps,
                treasury: Pubkey::new_from_array(*treasury),
                task_count: u64::from_le_bytes(*task_count),
                total_escrowed: u64::from_le_bytes(*total_escrowed),
                total_completed: u64::from_le_bytes(*total_completed),
                dispute_stake: u64::from_le_bytes(*dispute_stake),
            })
        }

        pub fn pack(&self, dst: &mut [u8; CONFIG_LEN]) {
            let (disc, admin, fee_bps, pad, treasury, task_count, total_escrowed, total_completed, dispute_stake) =
                mut_array_refs![dst, 8, 32, 2, 6, 32, 8, 8, 8, 8];

            *disc = AccountKind::Config.discriminator();
            admin.copy_from_slice(self.admin.as_ref());
            *fee_bps = self.protocol_fee_bps.to_le_bytes();
            pad.fill(0);
            treasury.copy_from_slice(self.treasury.as_ref());
            *task_count = self.task_count.to_le_bytes();
            *total_escrowed = self.total_escrowed.to_le_bytes();
            *total_completed = self.total_completed.to_le_bytes();
            *dispute_stake = self.dispute_stake.to_le_bytes();
        }

        pub fn pack_into(&self, dst: &mut [u8]) -> Result<(), BountyError> {
            let dst: &mut [u8; CONFIG_LEN] = dst.try_into().map_err(|_| BountyError::MalformedAccount)?;
            self.pack(dst);
            Ok(())
        }

        pub fn to_bytes(&self) -> Vec<u8> {
            let mut out = [0u8; CONFIG_LEN];
            self.pack(&mut out);
            out.to_vec()
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Task {
        pub id: u64,
        pub creator: Pubkey,
        pub claimer: Option<Pubkey>,
        pub bounty: u64,
        pub description_hash: [u8; HASH_LEN],
        pub proof_hash: Option<[u8; HASH_LEN]>,
        pub status: TaskStatus,
        pub created_at: i64,
        pub deadline: i64,
        pub tags: [u8; TAGS_LEN],
        pub submitted_at: i64,
        pub claimed_at: i64,
    }

    impl Task {
        pub fn unpack(data: &[u8]) -> Result<Self, BountyError> {
            if data.len() != TASK_LEN && data.len() != TASK_LEN_V1 {
                return Err(BountyError::MalformedAccount);
            }
            let (head, tail) = data.split_at(TASK_LEN_V1);
            let head: &[u8; TASK_LEN_V1] = head.try_into().map_err(|_| BountyError::MalformedAccount)?;
            let (disc, id, creator, claimer, bounty, description_hash, proof_hash, status, _pad, created_at, deadline, tags) =
                array_refs![head, 8, 8, 32, 32, 8, 32, 32, 1, 7, 8, 8, 16];

            if *disc != AccountKind::Task.discriminator() {
                return Err(BountyError::MalformedAccount);
            }
            let status = TaskStatus::from_byte(status[0]).ok_or(BountyError::MalformedAccount)?;

            // Legacy records have no tail; their timestamps read as zero.
            let (submitted_at, claimed_at) = if tail.is_empty() {
                (0, 0)
            } else {
                let tail: &[u8; TASK_LEN - TASK_LEN_V1] =
                    tail.try_into().map_err(|_| BountyError::MalformedAccount)?;
                let (submitted_at, claimed_at) = array_refs![tail, 8, 8];
                (i64::from_le_bytes(*submitted_at), i64::from_le_bytes(*claimed_at))
            };

            let claimer = Pubkey::new_from_array(*claimer);
            let task = Task {
                id: u64::from_le_bytes(*id),
                creator: Pubkey::new_from_array(*creator),
                claimer: (claimer != Pubkey::default()).then_some(claimer),
                bounty: u64::from_le_bytes(*bounty),
                description_hash: *description_hash,
                proof_hash: (*proof_hash != [0u8; HASH_LEN]).then_some(*proof_hash),
                status,
                created_at: i64::from_le_bytes(*created_at),
                deadline: i64::from_le_bytes(*deadline),
                tags: *tags,
                submitted_at,
                claimed_at,
            };
            task.check_claimer()?;
            Ok(task)
        }

        fn pack_head(&self, head: &mut [u8; TASK_LEN_V1]) {
            let (disc, id, creator, claimer, bounty, description_hash, proof_hash, status, pad, created_at, deadline, tags) =
                mut_array_refs![head, 8, 8, 32, 32, 8, 32, 32, 1, 7, 8, 8, 16];

            *disc = AccountKind::Task.discriminator();
            *id = self.id.to_le_bytes();
            creator.copy_from_slice(self.creator.as_ref());
            *claimer = self.claimer.unwrap_or_default().to_bytes();
            *bounty = self.bounty.to_le_bytes();
            *description_hash = self.description_hash;
            *proof_hash = self.proof_hash.unwrap_or([0u8; HASH_LEN]);
            status[0] = self.status as u8;
            pad.fill(0);
            *created_at = self.created_at.to_le_bytes();
            *deadline = self.deadline.to_le_bytes();
            *tags = self.tags;
        }

        /// Current-width encoding.
        pub fn pack(&self, dst: &mut [u8; TASK_LEN]) {
            let (head, submitted_at, claimed_at) = mut_array_refs![dst, TASK_LEN_V1, 8, 8];
            self.pack_head(head);
            *submitted_at = self.submitted_at.to_le_bytes();
            *claimed_at = self.claimed_at.to_le_bytes();
        }

        /// Writes the record into `dst`, which must be one of the two task
        /// widths. The legacy width cannot carry timestamps.
        pub fn pack_into(&self, dst: &mut [u8]) -> Result<(), BountyError> {
            match dst.len() {
                TASK_LEN => {
                    let dst: &mut [u8; TASK_LEN] = dst.try_into().map_err(|_| BountyError::MalformedAccount)?;
                    self.pack(dst);
                }
                TASK_LEN_V1 if self.submitted_at == 0 && self.claimed_at == 0 => {
                    let dst: &mut [u8; TASK_LEN_V1] = dst.try_into().map_err(|_| BountyError::MalformedAccount)?;
                    self.pack_head(dst);
                }
                _ => return Err(BountyError::MalformedAccount),
            }
            Ok(())
        }

        pub fn to_bytes(&self) -> Vec<u8> {
            let mut out = [0u8; TASK_LEN];
            self.pack(&mut out);
            out.to_vec()
        }

        /// Open tasks have no claimer; Claimed through Completed must have one.
        /// Cancelled tasks may carry either (a creator-won dispute keeps it).
        pub fn check_claimer(&self) -> Result<(), BountyError> {
            let ok = match self.status {
                TaskStatus::Open => self.claimer.is_none(),
                TaskStatus::Claimed | TaskStatus::Submitted | TaskStatus::Disputed | TaskStatus::Completed => {
                    self.claimer.is_some()
                }
                TaskStatus::Cancelled => true,
            };
            if ok {
                Ok(())
            } else {
                Err(BountyError::MalformedAccount)
            }
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Record {
        Config(Config),
        Task(Task),
    }

    /// Decodes any protocol record by its discriminator.
    pub fn decode(data: &[u8]) -> Result<Record, BountyError> {
        let disc = data.get(..DISCRIMINATOR_LEN).ok_or(BountyError::MalformedAccount)?;
        if disc == AccountKind::Config.discriminator() {
            Config::unpack(data).map(Record::Config)
        } else if disc == AccountKind::Task.discriminator() {
            Task::unpack(data).map(Record::Task)
        } else {
            Err(BountyError::MalformedAccount)
        }
    }

    pub fn encode(record: &Record) -> Vec<u8> {
        match record {
            Record::Config(config) => config.to_bytes(),
            Record::Task(task) => task.to_bytes(),
        }
    }
}

// 5. mod ledger (config counters and fee policy)
pub mod ledger {
    use solana_program::pubkey::Pubkey;

    use crate::constants::{MAX_FEE_BPS, TOTAL_BPS};
    use crate::error::BountyError;
    use crate::state::Config;

    /// Split of a bounty between the claimer and the treasury.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct FeeSplit {
        pub net: u64,
        pub fee: u64,
    }

    /// `fee = bounty * fee_bps / 10_000`, truncating. `net + fee == bounty`.
    pub fn fee_split(bounty: u64, fee_bps: u16) -> Result<FeeSplit, BountyError> {
        if fee_bps > MAX_FEE_BPS {
            return Err(BountyError::InvalidFee);
        }
        let fee = (bounty as u128)
            .checked_mul(fee_bps as u128)
            .and_then(|v| v.checked_div(TOTAL_BPS as u128))
            .ok_or(BountyError::Overflow)?;
        let fee = u64::try_from(fee).map_err(|_| BountyError::Overflow)?;
        let net = bounty.checked_sub(fee).ok_or(BountyError::Overflow)?;
        Ok(FeeSplit { net, fee })
    }

    impl Config {
        pub fn new(admin: Pubkey, treasury: Pubkey, protocol_fee_bps: u16, dispute_stake: u64) -> Result<Self, BountyError> {
            if protocol_fee_bps > MAX_FEE_BPS {
                return Err(BountyError::InvalidFee);
            }
            Ok(Config {
                admin,
                protocol_fee_bps,
                treasury,
                task_count: 0,
                total_escrowed: 0,
                total_completed: 0,
                dispute_stake,
            })
        }

        pub fn fee_for(&self, bounty: u64) -> Result<FeeSplit, BountyError> {
            fee_split(bounty, self.protocol_fee_bps)
        }

        /// Reserves the next task id and adds `bounty` to the escrow total.
        pub fn open_escrow(&mut self, bounty: u64) -> Result<u64, BountyError> {
            let id = self.task_count;
            let task_count = id.checked_add(1).ok_or(BountyError::Overflow)?;
            let total_escrowed = self.total_escrowed.checked_add(bounty).ok_or(BountyError::Overflow)?;
            self.task_count = task_count;
            self.total_escrowed = total_escrowed;
            Ok(id)
        }

        /// Removes a settled bounty from the escrow total.
        pub fn close_escrow(&mut self, bounty: u64, completed: bool) -> Result<(), BountyError> {
            let total_escrowed = self.total_escrowed.checked_sub(bounty).ok_or(BountyError::Overflow)?;
            let total_completed = if completed {
                self.total_completed.checked_add(1).ok_or(BountyError::Overflow)?
            } else {
                self.total_completed
            };
            self.total_escrowed = total_escrowed;
            self.total_completed = total_completed;
            Ok(())
        }
    }
}

// 6. mod engine (task state machine)
pub mod engine {
    use solana_program::pubkey::Pubkey;

    use crate::constants::{AUTO_RELEASE_TIMEOUT, HASH_LEN, MIN_BOUNTY, TAGS_LEN};
    use crate::error::BountyError;
    use crate::state::{Config, Task, TaskStatus};

    /// Lamports leaving the task account after a transition.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Settlement {
        pub claimer: u64,
        pub creator: u64,
        pub treasury: u64,
    }

    impl Settlement {
        pub fn total(&self) -> Result<u64, BountyError> {
            self.claimer
                .checked_add(self.creator)
                .and_then(|v| v.checked_add(self.treasury))
                .ok_or(BountyError::Overflow)
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TaskTerms {
        pub bounty: u64,
        pub description_hash: [u8; HASH_LEN],
        pub deadline: i64,
        pub tags: [u8; TAGS_LEN],
    }

    #[repr(u8)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum DisputeWinner {
        Creator = 0,
        Claimer = 1,
    }

    impl TryFrom<u8> for DisputeWinner {
        type Error = BountyError;

        fn try_from(b: u8) -> Result<Self, Self::Error> {
            match b {
                0 => Ok(DisputeWinner::Creator),
                1 => Ok(DisputeWinner::Claimer),
                _ => Err(BountyError::InvalidDisputeWinner),
            }
        }
    }

    fn expect_status(task: &Task, status: TaskStatus) -> Result<(), BountyError> {
        if task.status != status {
            return Err(BountyError::InvalidState);
        }
        Ok(())
    }

    fn expect_creator(task: &Task, who: &Pubkey) -> Result<(), BountyError> {
        if task.creator != *who {
            return Err(BountyError::Unauthorized);
        }
        Ok(())
    }

    fn expect_claimer(task: &Task, who: &Pubkey) -> Result<(), BountyError> {
        if task.claimer != Some(*who) {
            return Err(BountyError::Unauthorized);
        }
        Ok(())
    }

    pub fn create_task(config: &mut Config, creator: Pubkey, terms: &TaskTerms, now: i64) -> Result<Task, BountyError> {
        if terms.bounty < MIN_BOUNTY {
            return Err(BountyError::BountyTooSmall);
        }
        let id = config.open_escrow(terms.bounty)?;
        Ok(Task {
            id,
            creator,
            claimer: None,
            bounty: terms.bounty,
            description_hash: terms.description_hash,
            proof_hash: None,
            status: TaskStatus::Open,
            created_at: now,
            deadline: terms.deadline,
            tags: terms.tags,
            submitted_at: 0,
            claimed_at: 0,
        })
    }

    pub fn claim_task(task: &mut Task, claimer: Pubkey, now: i64) -> Result<(), BountyError> {
        expect_status(task, TaskStatus::Open)?;
        if task.creator == claimer {
            return Err(BountyError::Unauthorized);
        }
        if task.deadline > 0 && now > task.deadline {
            return Err(BountyError::DeadlinePassed);
        }
        task.claimer = Some(claimer);
        task.claimed_at = now;
        task.status = TaskStatus::Claimed;
        Ok(())
    }

    pub fn submit_work(task: &mut Task, claimer: &Pubkey, proof_hash: [u8; HASH_LEN], now: i64) -> Result<(), BountyError> {
        expect_status(task, TaskStatus::Claimed)?;
        expect_claimer(task, claimer)?;
        if proof_hash == [0u8; HASH_LEN] {
            return Err(BountyError::EmptyProof);
        }
        task.proof_hash = Some(proof_hash);
        task.submitted_at = now;
        task.status = TaskStatus::Submitted;
        Ok(())
    }

    pub fn approve_work(config: &mut Config, task: &mut Task, creator: &Pubkey) -> Result<Settlement, BountyError> {
        expect_status(task, TaskStatus::Submitted)?;
        expect_creator(task, creator)?;
        complete(config, task, 0)
    }

    /// Sends the task back to `Claimed`. `submitted_at` is kept so the
    /// claimer can still dispute the rejection.
    pub fn reject_work(task: &mut Task, creator: &Pubkey) -> Result<(), BountyError> {
        expect_status(task, TaskStatus::Submitted)?;
        expect_creator(task, creator)?;
        task.proof_hash = None;
        task.status = TaskStatus::Claimed;
        Ok(())
    }

    /// Returns the stake the claimer must deposit into the task account.
    pub fn open_dispute(config: &Config, task: &mut Task, claimer: &Pubkey) -> Result<u64, BountyError> {
        expect_status(task, TaskStatus::Claimed)?;
        if task.submitted_at == 0 {
            return Err(BountyError::InvalidState);
        }
        expect_claimer(task, claimer)?;
        task.status = TaskStatus::Disputed;
        Ok(config.dispute_stake)
    }

    pub fn resolve_dispute(
        config: &mut Config,
        task: &mut Task,
        admin: &Pubkey,
        winner: DisputeWinner,
    ) -> Result<Settlement, BountyError> {
        if config.admin != *admin {
            return Err(BountyError::Unauthorized);
        }
        expect_status(task, TaskStatus::Disputed)?;
        let stake = config.dispute_stake;
        match winner {
            DisputeWinner::Claimer => complete(config, task, stake),
            DisputeWinner::Creator => {
                config.close_escrow(task.bounty, false)?;
                task.status = TaskStatus::Cancelled;
                Ok(Settlement { claimer: 0, creator: task.bounty, treasury: stake })
            }
        }
    }

    pub fn cancel_task(config: &mut Config, task: &mut Task, creator: &Pubkey) -> Result<Settlement, BountyError> {
        expect_status(task, TaskStatus::Open)?;
        expect_creator(task, creator)?;
        config.close_escrow(task.bounty, false)?;
        task.status = TaskStatus::Cancelled;
        Ok(Settlement { claimer: 0, creator: task.bounty, treasury: 0 })
    }

    /// Earliest time `claim_expired` succeeds, if the task was ever submitted.
    pub fn auto_release_at(task: &Task) -> Option<i64> {
        if task.submitted_at == 0 {
            return None;
        }
        task.submitted_at.checked_add(AUTO_RELEASE_TIMEOUT)
    }

    /// Permissionless payout of a submission the creator never reviewed.
    pub fn claim_expired(config: &mut Config, task: &mut Task, now: i64) -> Result<Settlement, BountyError> {
        expect_status(task, TaskStatus::Submitted)?;
        match auto_release_at(task) {
            Some(at) if now >= at => complete(config, task, 0),
            _ => Err(BountyError::DeadlineNotReached),
        }
    }

    /// Shared payout for approval, auto-release and a claimer-won dispute.
    /// `returned_stake` goes back to the claimer on top of the net bounty.
    fn complete(config: &mut Config, task: &mut Task, returned_stake: u64) -> Result<Settlement, BountyError> {
        if task.claimer.is_none() {
            return Err(BountyError::MalformedAccount);
        }
        let split = config.fee_for(task.bounty)?;
        let claimer = split.net.checked_add(returned_stake).ok_or(BountyError::Overflow)?;
        config.close_escrow(task.bounty, true)?;
        task.status = TaskStatus::Completed;
        Ok(Settlement { claimer, creator: 0, treasury: split.fee })
    }
}

// 7. mod ix
pub mod ix {
    use bytemuck::{Pod, Zeroable};
    use solana_program::program_error::ProgramError;

    use crate::constants::{HASH_LEN, TAGS_LEN};
    use crate::engine::DisputeWinner;
    use crate::error::BountyError;

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum BountyInstruction {
        Initialize { protocol_fee_bps: u16, dispute_stake: u64 },
        CreateTask { bounty: u64, description_hash: [u8; HASH_LEN], deadline: i64, tags: [u8; TAGS_LEN] },
        ClaimTask { task_id: u64 },
        SubmitWork { task_id: u64, proof_hash: [u8; HASH_LEN] },
        ApproveWork { task_id: u64 },
        RejectWork { task_id: u64 },
        Dispute { task_id: u64 },
        ResolveDispute { task_id: u64, winner: DisputeWinner },
        CancelTask { task_id: u64 },
        ClaimExpired { task_id: u64 },
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Pod, Zeroable)]
    pub struct InitializeArgs {
        pub protocol_fee_bps: [u8; 2],
        pub _padding: [u8; 6],
        pub dispute_stake: [u8; 8],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Pod, Zeroable)]
    pub struct CreateTaskArgs {
        pub bounty: [u8; 8],
        pub description_hash: [u8; HASH_LEN],
        pub deadline: [u8; 8],
        pub tags: [u8; TAGS_LEN],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Pod, Zeroable)]
    pub struct TaskIdArgs {
        pub task_id: [u8; 8],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Pod, Zeroable)]
    pub struct SubmitWorkArgs {
        pub task_id: [u8; 8],
        pub proof_hash: [u8; HASH_LEN],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Pod, Zeroable)]
    pub struct ResolveDisputeArgs {
        pub task_id: [u8; 8],
        pub winner: u8,
        pub _padding: [u8; 7],
    }

    fn args<T: Pod>(rest: &[u8]) -> Result<&T, ProgramError> {
        bytemuck::try_from_bytes::<T>(rest).map_err(|_| ProgramError::InvalidInstructionData)
    }

    fn task_id_of(rest: &[u8]) -> Result<u64, ProgramError> {
        Ok(u64::from_le_bytes(args::<TaskIdArgs>(rest)?.task_id))
    }

    impl BountyInstruction {
        pub fn decode(input: &[u8]) -> Result<Self, ProgramError> {
            let (&tag, rest) = input.split_first().ok_or(ProgramError::InvalidInstructionData)?;

            match tag {
                0 => {
                    let a = args::<InitializeArgs>(rest)?;
                    Ok(BountyInstruction::Initialize {
                        protocol_fee_bps: u16::from_le_bytes(a.protocol_fee_bps),
                        dispute_stake: u64::from_le_bytes(a.dispute_stake),
                    })
                }
                1 => {
                    let a = args::<CreateTaskArgs>(rest)?;
                    Ok(BountyInstruction::CreateTask {
                        bounty: u64::from_le_bytes(a.bounty),
                        description_hash: a.description_hash,
                        deadline: i64::from_le_bytes(a.deadline),
                        tags: a.tags,
                    })
                }
                2 => Ok(BountyInstruction::ClaimTask { task_id: task_id_of(rest)? }),
                3 => {
                    let a = args::<SubmitWorkArgs>(rest)?;
                    Ok(BountyInstruction::SubmitWork {
                        task_id: u64::from_le_bytes(a.task_id),
                        proof_hash: a.proof_hash,
                    })
                }
                4 => Ok(BountyInstruction::ApproveWork { task_id: task_id_of(rest)? }),
                5 => Ok(BountyInstruction::RejectWork { task_id: task_id_of(rest)? }),
                6 => Ok(BountyInstruction::Dispute { task_id: task_id_of(rest)? }),
                7 => {
                    let a = args::<ResolveDisputeArgs>(rest)?;
                    Ok(BountyInstruction::ResolveDispute {
                        task_id: u64::from_le_bytes(a.task_id),
                        winner: DisputeWinner::try_from(a.winner)?,
                    })
                }
                8 => Ok(BountyInstruction::CancelTask { task_id: task_id_of(rest)? }),
                9 => Ok(BountyInstruction::ClaimExpired { task_id: task_id_of(rest)? }),
                _ => Err(BountyError::UnknownInstruction.into()),
            }
        }

        pub fn tag(&self) -> u8 {
            match self {
                BountyInstruction::Initialize { .. } => 0,
                BountyInstruction::CreateTask { .. } => 1,
                BountyInstruction::ClaimTask { .. } => 2,
                BountyInstruction::SubmitWork { .. } => 3,
                BountyInstruction::ApproveWork { .. } => 4,
                BountyInstruction::RejectWork { .. } => 5,
                BountyInstruction::Dispute { .. } => 6,
                BountyInstruction::ResolveDispute { .. } => 7,
                BountyInstruction::CancelTask { .. } => 8,
                BountyInstruction::ClaimExpired { .. } => 9,
            }
        }

        pub fn task_id(&self) -> Option<u64> {
            match *self {
                BountyInstruction::Initialize { .. } | BountyInstruction::CreateTask { .. } => None,
                BountyInstruction::ClaimTask { task_id }
                | BountyInstruction::SubmitWork { task_id, .. }
                | BountyInstruction::ApproveWork { task_id }
                | BountyInstruction::RejectWork { task_id }
                | BountyInstruction::Dispute { task_id }
                | BountyInstruction::ResolveDispute { task_id, .. }
                | BountyInstruction::CancelTask { task_id }
                | BountyInstruction::ClaimExpired { task_id } => Some(task_id),
            }
        }

        pub fn encode(&self) -> Vec<u8> {
            let mut out = vec![self.tag()];
            match *self {
                BountyInstruction::Initialize { protocol_fee_bps, dispute_stake } => {
                    let a = InitializeArgs {
                        protocol_fee_bps: protocol_fee_bps.to_le_bytes(),
                        _padding: [0; 6],
                        dispute_stake: dispute_stake.to_le_bytes(),
                    };
                    out.extend_from_slice(bytemuck::bytes_of(&a));
                }
                BountyInstruction::CreateTask { bounty, description_hash, deadline, tags } => {
                    let a = CreateTaskArgs {
                        bounty: bounty.to_le_bytes(),
                        description_hash,
                        deadline: deadline.to_le_bytes(),
                        tags,
                    };
                    out.extend_from_slice(bytemuck::bytes_of(&a));
                }
                BountyInstruction::SubmitWork { task_id, proof_hash } => {
                    let a = SubmitWorkArgs { task_id: task_id.to_le_bytes(), proof_hash };
                    out.extend_from_slice(bytemuck::bytes_of(&a));
                }
                BountyInstruction::ResolveDispute { task_id, winner } => {
                    let a = ResolveDisputeArgs {
                        task_id: task_id.to_le_bytes(),
                        winner: winner as u8,
                        _padding: [0; 7],
                    };
                    out.extend_from_slice(bytemuck::bytes_of(&a));
                }
                BountyInstruction::ClaimTask { task_id }
                | BountyInstruction::ApproveWork { task_id }
                | BountyInstruction::RejectWork { task_id }
                | BountyInstruction::Dispute { task_id }
                | BountyInstruction::CancelTask { task_id }
                | BountyInstruction::ClaimExpired { task_id } => {
                    let a = TaskIdArgs { task_id: task_id.to_le_bytes() };
                    out.extend_from_slice(bytemuck::bytes_of(&a));
                }
            }
            out
        }
    }
}

// 8. mod accounts (validation and record I/O)
pub mod accounts {
    use solana_program::{account_info::AccountInfo, program_error::ProgramError, pubkey::Pubkey, system_program};

    use crate::error::BountyError;
    use crate::pda;
    use crate::state::{Config, Task};

    pub fn expect_len(accounts: &[AccountInfo], n: usize) -> Result<(), ProgramError> {
        if accounts.len() < n {
            return Err(ProgramError::NotEnoughAccountKeys);
        }
        Ok(())
    }

    pub fn expect_signer(ai: &AccountInfo) -> Result<(), ProgramError> {
        if !ai.is_signer {
            return Err(BountyError::Unauthorized.into());
        }
        Ok(())
    }

    pub fn expect_writable(ai: &AccountInfo) -> Result<(), ProgramError> {
        if !ai.is_writable {
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(())
    }

    pub fn expect_owner(ai: &AccountInfo, owner: &Pubkey) -> Result<(), ProgramError> {
        if ai.owner != owner {
            return Err(BountyError::Unauthorized.into());
        }
        Ok(())
    }

    pub fn expect_key(ai: &AccountInfo, expected: &Pubkey) -> Result<(), ProgramError> {
        if ai.key != expected {
            return Err(BountyError::InvalidAccountAddress.into());
        }
        Ok(())
    }

    pub fn expect_system_program(ai: &AccountInfo) -> Result<(), ProgramError> {
        if *ai.key != system_program::ID {
            return Err(ProgramError::IncorrectProgramId);
        }
        Ok(())
    }

    /// Wallet passed as a counterparty must be the one recorded on the task.
    pub fn expect_party(ai: &AccountInfo, recorded: Option<Pubkey>) -> Result<(), ProgramError> {
        if recorded != Some(*ai.key) {
            return Err(BountyError::InvalidAccountAddress.into());
        }
        Ok(())
    }

    pub fn is_initialized(ai: &AccountInfo, program_id: &Pubkey) -> bool {
        ai.owner == program_id && !ai.data_is_empty()
    }

    pub fn load_config(ai: &AccountInfo, program_id: &Pubkey) -> Result<Config, ProgramError> {
        expect_key(ai, &pda::config_address(program_id).0)?;
        if ai.owner != program_id && ai.data_is_empty() {
            return Err(BountyError::NotInitialized.into());
        }
        expect_owner(ai, program_id)?;
        let data = ai.try_borrow_data()?;
        Ok(Config::unpack(&data)?)
    }

    pub fn load_task(ai: &AccountInfo, program_id: &Pubkey, task_id: u64) -> Result<Task, ProgramError> {
        expect_key(ai, &pda::task_address(program_id, task_id).0)?;
        if ai.owner != program_id && ai.data_is_empty() {
            return Err(BountyError::AccountNotFound.into());
        }
        expect_owner(ai, program_id)?;
        let data = ai.try_borrow_data()?;
        let task = Task::unpack(&data)?;
        if task.id != task_id {
            return Err(BountyError::MalformedAccount.into());
        }
        Ok(task)
    }

    pub fn store_config(ai: &AccountInfo, config: &Config) -> Result<(), ProgramError> {
        let mut data = ai.try_borrow_mut_data()?;
        Ok(config.pack_into(&mut data)?)
    }

    pub fn store_task(ai: &AccountInfo, task: &Task) -> Result<(), ProgramError> {
        let mut data = ai.try_borrow_mut_data()?;
        Ok(task.pack_into(&mut data)?)
    }
}

// 9. mod runtime (what the executing environment provides)
pub mod runtime {
    use solana_program::{
        account_info::AccountInfo,
        entrypoint::ProgramResult,
        program::{invoke, invoke_signed},
        program_error::ProgramError,
        pubkey::Pubkey,
        system_instruction,
        sysvar::{clock::Clock, rent::Rent, Sysvar},
    };

    use crate::error::BountyError;

    /// Clock, rent and system-program services used by the processor.
    ///
    /// `Cluster` backs these with sysvars and CPIs; `host::Bank` backs them
    /// in-process so the same dispatcher runs off-chain.
    pub trait Runtime<'a> {
        fn unix_timestamp(&self) -> Result<i64, ProgramError>;

        fn minimum_balance(&self, data_len: usize) -> Result<u64, ProgramError>;

        /// Allocates `space` bytes at a PDA and assigns it to `owner`, with
        /// `payer` funding the rent. `seeds` include the bump.
        fn create_account(
            &self,
            payer: &AccountInfo<'a>,
            target: &AccountInfo<'a>,
            system: &AccountInfo<'a>,
            space: usize,
            owner: &Pubkey,
            seeds: &[&[u8]],
        ) -> ProgramResult;

        /// Moves lamports out of a system-owned wallet.
        fn deposit(
            &self,
            from: &AccountInfo<'a>,
            to: &AccountInfo<'a>,
            system: &AccountInfo<'a>,
            lamports: u64,
        ) -> ProgramResult;

        /// Grows or shrinks a program-owned account, topping up rent from `payer`.
        fn resize(
            &self,
            payer: &AccountInfo<'a>,
            target: &AccountInfo<'a>,
            system: &AccountInfo<'a>,
            new_len: usize,
        ) -> ProgramResult;
    }

    /// Debits a program-owned account directly.
    pub fn release(from: &AccountInfo, to: &AccountInfo, lamports: u64) -> ProgramResult {
        if lamports == 0 || from.key == to.key {
            return Ok(());
        }
        let from_balance = from.lamports().checked_sub(lamports).ok_or(BountyError::InsufficientFunds)?;
        let to_balance = to.lamports().checked_add(lamports).ok_or(BountyError::Overflow)?;
        **from.try_borrow_mut_lamports()? = from_balance;
        **to.try_borrow_mut_lamports()? = to_balance;
        Ok(())
    }

    pub struct Cluster;

    impl<'a> Runtime<'a> for Cluster {
        fn unix_timestamp(&self) -> Result<i64, ProgramError> {
            Ok(Clock::get()?.unix_timestamp)
        }

        fn minimum_balance(&self, data_len: usize) -> Result<u64, ProgramError> {
            Ok(Rent::get()?.minimum_balance(data_len))
        }

        fn create_account(
            &self,
            payer: &AccountInfo<'a>,
            target: &AccountInfo<'a>,
            system: &AccountInfo<'a>,
            space: usize,
            owner: &Pubkey,
            seeds: &[&[u8]],
        ) -> ProgramResult {
            let rent = self.minimum_balance(space)?;
            let current = target.lamports();
            if current == 0 {
                return invoke_signed(
                    &system_instruction::create_account(payer.key, target.key, rent, space as u64, owner),
                    &[payer.clone(), target.clone(), system.clone()],
                    &[seeds],
                );
            }

            // Someone pre-funded the address; create_account would fail on it.
            let shortfall = rent.saturating_sub(current);
            if shortfall > 0 {
                self.deposit(payer, target, system, shortfall)?;
            }
            if space > 0 {
                invoke_signed(
                    &system_instruction::allocate(target.key, space as u64),
                    &[target.clone(), system.clone()],
                    &[seeds],
                )?;
            }
            invoke_signed(
                &system_instruction::assign(target.key, owner),
                &[target.clone(), system.clone()],
                &[seeds],
            )
        }

        fn deposit(
            &self,
            from: &AccountInfo<'a>,
            to: &AccountInfo<'a>,
            system: &AccountInfo<'a>,
            lamports: u64,
        ) -> ProgramResult {
            if lamports == 0 {
                return Ok(());
            }
            invoke(
                &system_instruction::transfer(from.key, to.key, lamports),
                &[from.clone(), to.clone(), system.clone()],
            )
        }

        fn resize(
            &self,
            payer: &AccountInfo<'a>,
            target: &AccountInfo<'a>,
            system: &AccountInfo<'a>,
            new_len: usize,
        ) -> ProgramResult {
            let old_rent = self.minimum_balance(target.data_len())?;
            let new_rent = self.minimum_balance(new_len)?;
            self.deposit(payer, target, system, new_rent.saturating_sub(old_rent))?;
            target.realloc(new_len, true)
        }
    }
}

// 10. mod processor
pub mod processor {
    use solana_program::{account_info::AccountInfo, entrypoint::ProgramResult, msg, pubkey::Pubkey};

    use crate::{
        accounts,
        constants::{CONFIG_LEN, CONFIG_SEED, HASH_LEN, TAGS_LEN, TASK_LEN, TASK_SEED, TREASURY_LEN, TREASURY_SEED},
        engine::{self, DisputeWinner, TaskTerms},
        error::BountyError,
        ix::BountyInstruction,
        pda,
        runtime::{self, Cluster, Runtime},
        state::{Config, Task},
    };

    pub fn process_instruction<'a>(program_id: &Pubkey, accounts: &[AccountInfo<'a>], instruction_data: &[u8]) -> ProgramResult {
        process_with(program_id, accounts, instruction_data, &Cluster)
    }

    /// Decodes and executes one instruction against `rt`.
    pub fn process_with<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        instruction_data: &[u8],
        rt: &R,
    ) -> ProgramResult {
        let instruction = BountyInstruction::decode(instruction_data)?;

        match instruction {
            BountyInstruction::Initialize { protocol_fee_bps, dispute_stake } => {
                initialize(program_id, accounts, rt, protocol_fee_bps, dispute_stake)
            }
            BountyInstruction::CreateTask { bounty, description_hash, deadline, tags } => {
                create_task(program_id, accounts, rt, bounty, description_hash, deadline, tags)
            }
            BountyInstruction::ClaimTask { task_id } => claim_task(program_id, accounts, rt, task_id),
            BountyInstruction::SubmitWork { task_id, proof_hash } => {
                submit_work(program_id, accounts, rt, task_id, proof_hash)
            }
            BountyInstruction::ApproveWork { task_id } => approve_work(program_id, accounts, rt, task_id),
            BountyInstruction::RejectWork { task_id } => reject_work(program_id, accounts, rt, task_id),
            BountyInstruction::Dispute { task_id } => dispute(program_id, accounts, rt, task_id),
            BountyInstruction::ResolveDispute { task_id, winner } => {
                resolve_dispute(program_id, accounts, rt, task_id, winner)
            }
            BountyInstruction::CancelTask { task_id } => cancel_task(program_id, accounts, rt, task_id),
            BountyInstruction::ClaimExpired { task_id } => claim_expired(program_id, accounts, rt, task_id),
        }
    }

    fn expect_payer(ai: &AccountInfo) -> ProgramResult {
        accounts::expect_signer(ai)?;
        accounts::expect_writable(ai)
    }

    /// Writes the task back, migrating a legacy-width record first.
    fn persist_task<'a, R: Runtime<'a>>(
        rt: &R,
        payer: &AccountInfo<'a>,
        a_task: &AccountInfo<'a>,
        a_system: &AccountInfo<'a>,
        task: &Task,
    ) -> ProgramResult {
        if a_task.data_len() != TASK_LEN {
            rt.resize(payer, a_task, a_system, TASK_LEN)?;
            msg!("BountyBoard: task {} migrated to {} bytes", task.id, TASK_LEN);
        }
        accounts::store_task(a_task, task)
    }

    /// Pays out of the task account, never dipping below its rent floor.
    fn release_escrow<'a, R: Runtime<'a>>(
        rt: &R,
        a_task: &AccountInfo<'a>,
        payouts: &[(&AccountInfo<'a>, u64)],
    ) -> ProgramResult {
        let total = payouts
            .iter()
            .try_fold(0u64, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or(BountyError::Overflow)?;
        let floor = rt.minimum_balance(a_task.data_len())?;
        if a_task.lamports().saturating_sub(floor) < total {
            return Err(BountyError::InsufficientFunds.into());
        }
        for (to, amount) in payouts {
            accounts::expect_writable(to)?;
            runtime::release(a_task, to, *amount)?;
        }
        Ok(())
    }

    fn initialize<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        protocol_fee_bps: u16,
        dispute_stake: u64,
    ) -> ProgramResult {
        accounts::expect_len(accounts, 4)?;
        let a_admin = &accounts[0];
        let a_config = &accounts[1];
        let a_treasury = &accounts[2];
        let a_system = &accounts[3];

        expect_payer(a_admin)?;
        accounts::expect_writable(a_config)?;
        accounts::expect_writable(a_treasury)?;
        accounts::expect_system_program(a_system)?;

        let (config_key, config_bump) = pda::config_address(program_id);
        let (treasury_key, treasury_bump) = pda::treasury_address(program_id);
        accounts::expect_key(a_config, &config_key)?;
        accounts::expect_key(a_treasury, &treasury_key)?;

        if accounts::is_initialized(a_config, program_id) {
            return Err(BountyError::AlreadyInitialized.into());
        }
        let config = Config::new(*a_admin.key, treasury_key, protocol_fee_bps, dispute_stake)?;

        rt.create_account(a_admin, a_config, a_system, CONFIG_LEN, program_id, &[CONFIG_SEED, &[config_bump]])?;
        if a_treasury.owner != program_id {
            rt.create_account(
                a_admin,
                a_treasury,
                a_system,
                TREASURY_LEN,
                program_id,
                &[TREASURY_SEED, &[treasury_bump]],
            )?;
        }
        accounts::store_config(a_config, &config)?;

        msg!(
            "BountyBoard: initialized by {}, fee {} bps, dispute stake {} lamports",
            a_admin.key,
            protocol_fee_bps,
            dispute_stake
        );
        Ok(())
    }

    fn create_task<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        bounty: u64,
        description_hash: [u8; HASH_LEN],
        deadline: i64,
        tags: [u8; TAGS_LEN],
    ) -> ProgramResult {
        accounts::expect_len(accounts, 4)?;
        let a_creator = &accounts[0];
        let a_config = &accounts[1];
        let a_task = &accounts[2];
        let a_system = &accounts[3];

        expect_payer(a_creator)?;
        accounts::expect_writable(a_config)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let mut config = accounts::load_config(a_config, program_id)?;
        let (task_key, task_bump) = pda::task_address(program_id, config.task_count);
        accounts::expect_key(a_task, &task_key)?;
        if accounts::is_initialized(a_task, program_id) {
            return Err(BountyError::AlreadyInitialized.into());
        }

        let now = rt.unix_timestamp()?;
        let terms = TaskTerms { bounty, description_hash, deadline, tags };
        let task = engine::create_task(&mut config, *a_creator.key, &terms, now)?;

        let rent = rt.minimum_balance(TASK_LEN)?;
        let needed = rent.checked_add(task.bounty).ok_or(BountyError::Overflow)?;
        if a_creator.lamports() < needed {
            return Err(BountyError::InsufficientFunds.into());
        }

        let id_bytes = task.id.to_le_bytes();
        rt.create_account(a_creator, a_task, a_system, TASK_LEN, program_id, &[TASK_SEED, &id_bytes, &[task_bump]])?;
        rt.deposit(a_creator, a_task, a_system, task.bounty)?;
        accounts::store_task(a_task, &task)?;
        accounts::store_config(a_config, &config)?;

        msg!("BountyBoard: task {} created by {}, bounty {} lamports", task.id, a_creator.key, task.bounty);
        Ok(())
    }

    fn claim_task<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        task_id: u64,
    ) -> ProgramResult {
        accounts::expect_len(accounts, 3)?;
        let a_claimer = &accounts[0];
        let a_task = &accounts[1];
        let a_system = &accounts[2];

        expect_payer(a_claimer)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let mut task = accounts::load_task(a_task, program_id, task_id)?;
        let now = rt.unix_timestamp()?;
        engine::claim_task(&mut task, *a_claimer.key, now)?;
        persist_task(rt, a_claimer, a_task, a_system, &task)?;

        msg!("BountyBoard: task {} claimed by {}", task_id, a_claimer.key);
        Ok(())
    }

    fn submit_work<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        task_id: u64,
        proof_hash: [u8; HASH_LEN],
    ) -> ProgramResult {
        accounts::expect_len(accounts, 3)?;
        let a_claimer = &accounts[0];
        let a_task = &accounts[1];
        let a_system = &accounts[2];

        expect_payer(a_claimer)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let mut task = accounts::load_task(a_task, program_id, task_id)?;
        let now = rt.unix_timestamp()?;
        engine::submit_work(&mut task, a_claimer.key, proof_hash, now)?;
        persist_task(rt, a_claimer, a_task, a_system, &task)?;

        msg!("BountyBoard: work submitted for task {} at {}", task_id, now);
        Ok(())
    }

    fn approve_work<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        task_id: u64,
    ) -> ProgramResult {
        accounts::expect_len(accounts, 6)?;
        let a_creator = &accounts[0];
        let a_config = &accounts[1];
        let a_task = &accounts[2];
        let a_claimer = &accounts[3];
        let a_treasury = &accounts[4];
        let a_system = &accounts[5];

        expect_payer(a_creator)?;
        accounts::expect_writable(a_config)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let mut config = accounts::load_config(a_config, program_id)?;
        let mut task = accounts::load_task(a_task, program_id, task_id)?;
        let settlement = engine::approve_work(&mut config, &mut task, a_creator.key)?;
        accounts::expect_party(a_claimer, task.claimer)?;
        accounts::expect_key(a_treasury, &config.treasury)?;

        release_escrow(rt, a_task, &[(a_claimer, settlement.claimer), (a_treasury, settlement.treasury)])?;
        persist_task(rt, a_creator, a_task, a_system, &task)?;
        accounts::store_config(a_config, &config)?;

        msg!(
            "BountyBoard: task {} approved, {} lamports to claimer, {} fee",
            task_id,
            settlement.claimer,
            settlement.treasury
        );
        Ok(())
    }

    fn reject_work<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        task_id: u64,
    ) -> ProgramResult {
        accounts::expect_len(accounts, 3)?;
        let a_creator = &accounts[0];
        let a_task = &accounts[1];
        let a_system = &accounts[2];

        expect_payer(a_creator)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let mut task = accounts::load_task(a_task, program_id, task_id)?;
        engine::reject_work(&mut task, a_creator.key)?;
        persist_task(rt, a_creator, a_task, a_system, &task)?;

        msg!("BountyBoard: work rejected for task {}", task_id);
        Ok(())
    }

    fn dispute<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        task_id: u64,
    ) -> ProgramResult {
        accounts::expect_len(accounts, 4)?;
        let a_claimer = &accounts[0];
        let a_config = &accounts[1];
        let a_task = &accounts[2];
        let a_system = &accounts[3];

        expect_payer(a_claimer)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let config = accounts::load_config(a_config, program_id)?;
        let mut task = accounts::load_task(a_task, program_id, task_id)?;
        let stake = engine::open_dispute(&config, &mut task, a_claimer.key)?;
        if a_claimer.lamports() < stake {
            return Err(BountyError::InsufficientFunds.into());
        }

        rt.deposit(a_claimer, a_task, a_system, stake)?;
        persist_task(rt, a_claimer, a_task, a_system, &task)?;

        msg!("BountyBoard: task {} disputed by {}, stake {} lamports", task_id, a_claimer.key, stake);
        Ok(())
    }

    fn resolve_dispute<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        task_id: u64,
        winner: DisputeWinner,
    ) -> ProgramResult {
        accounts::expect_len(accounts, 7)?;
        let a_admin = &accounts[0];
        let a_config = &accounts[1];
        let a_task = &accounts[2];
        let a_claimer = &accounts[3];
        let a_creator = &accounts[4];
        let a_treasury = &accounts[5];
        let a_system = &accounts[6];

        expect_payer(a_admin)?;
        accounts::expect_writable(a_config)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let mut config = accounts::load_config(a_config, program_id)?;
        let mut task = accounts::load_task(a_task, program_id, task_id)?;
        let settlement = engine::resolve_dispute(&mut config, &mut task, a_admin.key, winner)?;
        accounts::expect_party(a_claimer, task.claimer)?;
        accounts::expect_party(a_creator, Some(task.creator))?;
        accounts::expect_key(a_treasury, &config.treasury)?;

        release_escrow(
            rt,
            a_task,
            &[
                (a_claimer, settlement.claimer),
                (a_creator, settlement.creator),
                (a_treasury, settlement.treasury),
            ],
        )?;
        persist_task(rt, a_admin, a_task, a_system, &task)?;
        accounts::store_config(a_config, &config)?;

        msg!("BountyBoard: dispute on task {} resolved, winner {:?}", task_id, winner);
        Ok(())
    }

    fn cancel_task<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        task_id: u64,
    ) -> ProgramResult {
        accounts::expect_len(accounts, 4)?;
        let a_creator = &accounts[0];
        let a_config = &accounts[1];
        let a_task = &accounts[2];
        let a_system = &accounts[3];

        expect_payer(a_creator)?;
        accounts::expect_writable(a_config)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let mut config = accounts::load_config(a_config, program_id)?;
        let mut task = accounts::load_task(a_task, program_id, task_id)?;
        let settlement = engine::cancel_task(&mut config, &mut task, a_creator.key)?;

        release_escrow(rt, a_task, &[(a_creator, settlement.creator)])?;
        persist_task(rt, a_creator, a_task, a_system, &task)?;
        accounts::store_config(a_config, &config)?;

        msg!("BountyBoard: task {} cancelled, {} lamports refunded", task_id, settlement.creator);
        Ok(())
    }

    fn claim_expired<'a, R: Runtime<'a>>(
        program_id: &Pubkey,
        accounts: &[AccountInfo<'a>],
        rt: &R,
        task_id: u64,
    ) -> ProgramResult {
        accounts::expect_len(accounts, 6)?;
        let a_caller = &accounts[0];
        let a_config = &accounts[1];
        let a_task = &accounts[2];
        let a_claimer = &accounts[3];
        let a_treasury = &accounts[4];
        let a_system = &accounts[5];

        expect_payer(a_caller)?;
        accounts::expect_writable(a_config)?;
        accounts::expect_writable(a_task)?;
        accounts::expect_system_program(a_system)?;

        let mut config = accounts::load_config(a_config, program_id)?;
        let mut task = accounts::load_task(a_task, program_id, task_id)?;
        let now = rt.unix_timestamp()?;
        let settlement = engine::claim_expired(&mut config, &mut task, now)?;
        accounts::expect_party(a_claimer, task.claimer)?;
        accounts::expect_key(a_treasury, &config.treasury)?;

        release_escrow(rt, a_task, &[(a_claimer, settlement.claimer), (a_treasury, settlement.treasury)])?;
        persist_task(rt, a_caller, a_task, a_system, &task)?;
        accounts::store_config(a_config, &config)?;

        msg!(
            "BountyBoard: task {} auto-released by {}, {} lamports to claimer",
            task_id,
            a_caller.key,
            settlement.claimer
        );
        Ok(())
    }
}

// 11. mod entrypoint
#[cfg(not(feature = "no-entrypoint"))]
pub mod entrypoint {
    use solana_program::{account_info::AccountInfo, entrypoint, entrypoint::ProgramResult, pubkey::Pubkey};

    use crate::processor;

    entrypoint!(process_instruction);

    fn process_instruction(program_id: &Pubkey, accounts: &[AccountInfo], instruction_data: &[u8]) -> ProgramResult {
        processor::process_instruction(program_id, accounts, instruction_data)
    }
}

// 12. mod sdk (instruction builders)
pub mod sdk {
    use solana_program::{
        instruction::{AccountMeta, Instruction},
        pubkey::Pubkey,
        system_program,
    };

    use crate::constants::HASH_LEN;
    use crate::engine::{DisputeWinner, TaskTerms};
    use crate::ix::BountyInstruction;
    use crate::pda;

    fn build(program_id: &Pubkey, ix: BountyInstruction, accounts: Vec<AccountMeta>) -> Instruction {
        Instruction { program_id: *program_id, accounts, data: ix.encode() }
    }

    fn config(program_id: &Pubkey, writable: bool) -> AccountMeta {
        let key = pda::config_address(program_id).0;
        if writable {
            AccountMeta::new(key, false)
        } else {
            AccountMeta::new_readonly(key, false)
        }
    }

    fn task(program_id: &Pubkey, task_id: u64) -> AccountMeta {
        AccountMeta::new(pda::task_address(program_id, task_id).0, false)
    }

    fn treasury(program_id: &Pubkey) -> AccountMeta {
        AccountMeta::new(pda::treasury_address(program_id).0, false)
    }

    fn system() -> AccountMeta {
        AccountMeta::new_readonly(system_program::ID, false)
    }

    pub fn initialize(program_id: &Pubkey, admin: &Pubkey, protocol_fee_bps: u16, dispute_stake: u64) -> Instruction {
        build(
            program_id,
            BountyInstruction::Initialize { protocol_fee_bps, dispute_stake },
            vec![AccountMeta::new(*admin, true), config(program_id, true), treasury(program_id), system()],
        )
    }

    /// `task_id` must be the config's current `task_count`.
    pub fn create_task(program_id: &Pubkey, creator: &Pubkey, task_id: u64, terms: &TaskTerms) -> Instruction {
        build(
            program_id,
            BountyInstruction::CreateTask {
                bounty: terms.bounty,
                description_hash: terms.description_hash,
                deadline: terms.deadline,
                tags: terms.tags,
            },
            vec![AccountMeta::new(*creator, true), config(program_id, true), task(program_id, task_id), system()],
        )
    }

    pub fn claim_task(program_id: &Pubkey, claimer: &Pubkey, task_id: u64) -> Instruction {
        build(
            program_id,
            BountyInstruction::ClaimTask { task_id },
            vec![AccountMeta::new(*claimer, true), task(program_id, task_id), system()],
        )
    }

    pub fn submit_work(program_id: &Pubkey, claimer: &Pubkey, task_id: u64, proof_hash: [u8; HASH_LEN]) -> Instruction {
        build(
            program_id,
            BountyInstruction::SubmitWork { task_id, proof_hash },
            vec![AccountMeta::new(*claimer, true), task(program_id, task_id), system()],
        )
    }

    pub fn approve_work(program_id: &Pubkey, creator: &Pubkey, task_id: u64, claimer: &Pubkey) -> Instruction {
        build(
            program_id,
            BountyInstruction::ApproveWork { task_id },
            vec![
                AccountMeta::new(*creator, true),
                config(program_id, true),
                task(program_id, task_id),
                AccountMeta::new(*claimer, false),
                treasury(program_id),
                system(),
            ],
        )
    }

    pub fn reject_work(program_id: &Pubkey, creator: &Pubkey, task_id: u64) -> Instruction {
        build(
            program_id,
            BountyInstruction::RejectWork { task_id },
            vec![AccountMeta::new(*creator, true), task(program_id, task_id), system()],
        )
    }

    pub fn dispute(program_id: &Pubkey, claimer: &Pubkey, task_id: u64) -> Instruction {
        build(
            program_id,
            BountyInstruction::Dispute { task_id },
            vec![AccountMeta::new(*claimer, true), config(program_id, false), task(program_id, task_id), system()],
        )
    }

    pub fn resolve_dispute(
        program_id: &Pubkey,
        admin: &Pubkey,
        task_id: u64,
        winner: DisputeWinner,
        claimer: &Pubkey,
        creator: &Pubkey,
    ) -> Instruction {
        build(
            program_id,
            BountyInstruction::ResolveDispute { task_id, winner },
            vec![
                AccountMeta::new(*admin, true),
                config(program_id, true),
                task(program_id, task_id),
                AccountMeta::new(*claimer, false),
                AccountMeta::new(*creator, false),
                treasury(program_id),
                system(),
            ],
        )
    }

    pub fn cancel_task(program_id: &Pubkey, creator: &Pubkey, task_id: u64) -> Instruction {
        build(
            program_id,
            BountyInstruction::CancelTask { task_id },
            vec![AccountMeta::new(*creator, true), config(program_id, true), task(program_id, task_id), system()],
        )
    }

    pub fn claim_expired(program_id: &Pubkey, caller: &Pubkey, task_id: u64, claimer: &Pubkey) -> Instruction {
        build(
            program_id,
            BountyInstruction::ClaimExpired { task_id },
            vec![
                AccountMeta::new(*caller, true),
                config(program_id, true),
                task(program_id, task_id),
                AccountMeta::new(*claimer, false),
                treasury(program_id),
                system(),
            ],
        )
    }
}

// 13. mod reader (read surface over persisted records)
pub mod reader {
    use solana_program::pubkey::Pubkey;

    use crate::constants::TAGS_LEN;
    use crate::error::BountyError;
    use crate::pda;
    use crate::state::{self, Config, Record, Task, TaskStatus};

    /// Anything that can hand out raw account bytes: an RPC cache, a test
    /// bank, a snapshot file.
    pub trait AccountSource {
        /// Data of `address` if it exists and is owned by the program.
        fn account_data(&self, address: &Pubkey) -> Option<Vec<u8>>;

        fn program_accounts(&self, program_id: &Pubkey) -> Vec<(Pubkey, Vec<u8>)>;
    }

    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct TaskFilter {
        pub status: Option<TaskStatus>,
        /// Matches tasks whose tag bytes contain this non-zero value.
        pub tag: Option<u8>,
    }

    impl TaskFilter {
        pub fn matches(&self, task: &Task) -> bool {
            if self.status.is_some_and(|s| s != task.status) {
                return false;
            }
            match self.tag {
                Some(tag) => tag != 0 && has_tag(&task.tags, tag),
                None => true,
            }
        }
    }

    fn has_tag(tags: &[u8; TAGS_LEN], tag: u8) -> bool {
        tags.iter().any(|t| *t == tag)
    }

    pub fn get_config<S: AccountSource + ?Sized>(source: &S, program_id: &Pubkey) -> Result<Config, BountyError> {
        let data = source
            .account_data(&pda::config_address(program_id).0)
            .ok_or(BountyError::NotInitialized)?;
        Config::unpack(&data)
    }

    pub fn get_task<S: AccountSource + ?Sized>(source: &S, program_id: &Pubkey, task_id: u64) -> Result<Task, BountyError> {
        let data = source
            .account_data(&pda::task_address(program_id, task_id).0)
            .ok_or(BountyError::AccountNotFound)?;
        let task = Task::unpack(&data)?;
        if task.id != task_id {
            return Err(BountyError::MalformedAccount);
        }
        Ok(task)
    }

    fn all_tasks<S: AccountSource + ?Sized>(source: &S, program_id: &Pubkey) -> Vec<Task> {
        source
            .program_accounts(program_id)
            .into_iter()
            .filter_map(|(_, data)| match state::decode(&data) {
                Ok(Record::Task(task)) => Some(task),
                _ => None,
            })
            .collect()
    }

    /// Tasks of both record widths, newest id first.
    pub fn list_tasks<S: AccountSource + ?Sized>(source: &S, program_id: &Pubkey, filter: &TaskFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> = all_tasks(source, program_id).into_iter().filter(|t| filter.matches(t)).collect();
        tasks.sort_by(|a, b| b.id.cmp(&a.id));
        tasks
    }

    /// Config counters recomputed from the task records.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct EscrowAudit {
        pub task_count: u64,
        pub tasks_found: u64,
        pub total_escrowed: u64,
        pub live_bounty: u128,
        pub total_completed: u64,
        pub completed_found: u64,
    }

    impl EscrowAudit {
        pub fn is_consistent(&self) -> bool {
            self.task_count == self.tasks_found
                && self.live_bounty == self.total_escrowed as u128
                && self.total_completed == self.completed_found
        }
    }

    pub fn audit<S: AccountSource + ?Sized>(source: &S, program_id: &Pubkey) -> Result<EscrowAudit, BountyError> {
        let config = get_config(source, program_id)?;
        let mut report = EscrowAudit {
            task_count: config.task_count,
            total_escrowed: config.total_escrowed,
            total_completed: config.total_completed,
            ..EscrowAudit::default()
        };
        for task in all_tasks(source, program_id) {
            report.tasks_found += 1;
            if task.status.holds_escrow() {
                report.live_bounty += task.bounty as u128;
            }
            if task.status == TaskStatus::Completed {
                report.completed_found += 1;
            }
        }
        Ok(report)
    }
}

// 14. mod host (in-process bank with per-account locking)
#[cfg(not(target_os = "solana"))]
pub mod host {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

    use solana_program::{
        account_info::AccountInfo, entrypoint::ProgramResult, instruction::Instruction, program_error::ProgramError,
        pubkey::Pubkey, rent::Rent, system_program,
    };
    use tracing::{debug, info, warn};

    use crate::constants::TASK_LEN;
    use crate::error::BountyError;
    use crate::processor;
    use crate::reader::AccountSource;
    use crate::runtime::{self, Runtime};

    const GENESIS_TIMESTAMP: i64 = 1_700_000_000;

    #[derive(Clone, Debug, Default, Eq, PartialEq)]
    pub struct StoredAccount {
        pub lamports: u64,
        pub owner: Pubkey,
        pub data: Vec<u8>,
    }

    /// In-memory account store that runs instructions the way a validator
    /// would: each addressed writable account is locked, the instruction runs
    /// against a private copy, and the copy is committed only on success.
    pub struct Bank {
        program_id: Pubkey,
        rent: Rent,
        accounts: RwLock<HashMap<Pubkey, Arc<StoredAccount>>>,
        locks: Mutex<HashMap<Pubkey, Arc<Mutex<()>>>>,
        clock: AtomicI64,
    }

    struct Slot {
        key: Pubkey,
        is_signer: bool,
        is_writable: bool,
        lamports: u64,
        owner: Pubkey,
        data: Vec<u8>,
    }

    impl Bank {
        pub fn new(program_id: Pubkey) -> Self {
            Bank {
                program_id,
                rent: Rent::default(),
                accounts: RwLock::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
                clock: AtomicI64::new(GENESIS_TIMESTAMP),
            }
        }

        pub fn rent(&self) -> &Rent {
            &self.rent
        }

        pub fn now(&self) -> i64 {
            self.clock.load(Ordering::SeqCst)
        }

        pub fn set_clock(&self, unix_timestamp: i64) {
            self.clock.store(unix_timestamp, Ordering::SeqCst);
        }

        pub fn advance_clock(&self, seconds: i64) -> i64 {
            self.clock.fetch_add(seconds, Ordering::SeqCst) + seconds
        }

        fn lock_for(&self, key: &Pubkey) -> Arc<Mutex<()>> {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(*key).or_default().clone()
        }

        /// Drops lock entries nobody holds or waits on. Callers must have
        /// released their own handles first.
        fn prune_locks<'k>(&self, keys: impl IntoIterator<Item = &'k Pubkey>) {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            for key in keys {
                if locks.get(key).is_some_and(|h| Arc::strong_count(h) == 1) {
                    locks.remove(key);
                }
            }
        }

        /// Per-account lock entries currently held or awaited.
        pub fn lock_count(&self) -> usize {
            self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Snapshot of one account. Never waits on an in-flight instruction.
        pub fn account(&self, key: &Pubkey) -> Option<Arc<StoredAccount>> {
            self.accounts.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
        }

        pub fn balance(&self, key: &Pubkey) -> u64 {
            self.account(key).map_or(0, |a| a.lamports)
        }

        /// Credits a system-owned wallet, creating it if needed.
        pub fn airdrop(&self, to: &Pubkey, lamports: u64) -> Result<u64, ProgramError> {
            let result = {
                let handle = self.lock_for(to);
                let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
                self.credit(to, lamports)
            };
            self.prune_locks([to]);
            result
        }

        fn credit(&self, to: &Pubkey, lamports: u64) -> Result<u64, ProgramError> {
            let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
            let mut account = accounts.get(to).map(|a| StoredAccount::clone(a)).unwrap_or_default();
            account.lamports = account.lamports.checked_add(lamports).ok_or(BountyError::Overflow)?;
            let balance = account.lamports;
            accounts.insert(*to, Arc::new(account));
            debug!(%to, lamports, balance, "airdrop");
            Ok(balance)
        }

        /// Installs raw account state, e.g. records written by an older program.
        pub fn add_account(&self, key: Pubkey, account: StoredAccount) {
            {
                let handle = self.lock_for(&key);
                let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
                self.accounts.write().unwrap_or_else(PoisonError::into_inner).insert(key, Arc::new(account));
            }
            self.prune_locks([&key]);
        }

        /// Executes one instruction atomically. `signers` are the keys that
        /// signed the enclosing transaction.
        pub fn process(&self, instruction: &Instruction, signers: &[Pubkey]) -> ProgramResult {
            let result = self.execute(instruction, signers);
            self.prune_locks(instruction.accounts.iter().map(|m| &m.pubkey));
            match &result {
                Ok(()) => info!(tag = instruction.data.first().copied(), "instruction processed"),
                Err(err) => warn!(tag = instruction.data.first().copied(), error = %err, "instruction rejected"),
            }
            result
        }

        fn execute(&self, instruction: &Instruction, signers: &[Pubkey]) -> ProgramResult {
            if instruction.program_id != self.program_id {
                return Err(ProgramError::IncorrectProgramId);
            }
            for meta in &instruction.accounts {
                if meta.is_signer && !signers.contains(&meta.pubkey) {
                    return Err(ProgramError::MissingRequiredSignature);
                }
            }

            let mut keys: Vec<Pubkey> = instruction.accounts.iter().map(|m| m.pubkey).collect();
            keys.sort();
            keys.dedup();

            // Writable accounts only, in sorted order. The system program is
            // addressed by nearly every instruction and is never written.
            let write_set: Vec<Pubkey> = keys
                .iter()
                .filter(|k| **k != system_program::ID)
                .filter(|k| instruction.accounts.iter().any(|m| m.pubkey == **k && m.is_writable))
                .copied()
                .collect();
            let handles: Vec<Arc<Mutex<()>>> = write_set.iter().map(|k| self.lock_for(k)).collect();
            let _guards: Vec<MutexGuard<()>> = handles
                .iter()
                .map(|h| h.lock().unwrap_or_else(PoisonError::into_inner))
                .collect();
            debug!(locked = write_set.len(), "account locks acquired");

            let mut slots: Vec<Slot> = {
                let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
                keys.iter()
                    .map(|key| {
                        let stored = accounts.get(key).cloned().unwrap_or_default();
                        let metas = instruction.accounts.iter().filter(|m| m.pubkey == *key);
                        let (is_signer, is_writable) =
                            metas.fold((false, false), |(s, w), m| (s || m.is_signer, w || m.is_writable));
                        Slot {
                            key: *key,
                            is_signer,
                            is_writable,
                            lamports: stored.lamports,
                            owner: stored.owner,
                            data: stored.data.clone(),
                        }
                    })
                    .collect()
            };
            let lamports_before = slots.iter().try_fold(0u128, |acc, s| acc.checked_add(s.lamports as u128));

            let mut spare = [[0u8; TASK_LEN]; 2];
            let runtime = HostRuntime {
                now: self.now(),
                rent: self.rent.clone(),
                spare: RefCell::new(spare.iter_mut().map(|b| b.as_mut_slice()).collect()),
                assigned: RefCell::new(Vec::new()),
            };

            let unique: Vec<AccountInfo> = slots
                .iter_mut()
                .map(|slot| {
                    let Slot { key, is_signer, is_writable, lamports, owner, data } = slot;
                    AccountInfo::new(key, *is_signer, *is_writable, lamports, data.as_mut_slice(), owner, false, 0)
                })
                .collect();
            let infos = instruction
                .accounts
                .iter()
                .map(|m| {
                    keys.binary_search(&m.pubkey)
                        .map(|i| unique[i].clone())
                        .map_err(|_| ProgramError::NotEnoughAccountKeys)
                })
                .collect::<Result<Vec<_>, _>>()?;

            processor::process_with(&self.program_id, &infos, &instruction.data, &runtime)?;

            let mut committed = Vec::with_capacity(unique.len());
            let mut lamports_after = Some(0u128);
            for info in &unique {
                let lamports = info.lamports();
                lamports_after = lamports_after.and_then(|acc| acc.checked_add(lamports as u128));
                if !info.is_writable || *info.key == system_program::ID {
                    continue;
                }
                let owner = runtime.owner_of(info.key).unwrap_or(*info.owner);
                let data = info.try_borrow_data()?.to_vec();
                committed.push((*info.key, StoredAccount { lamports, owner, data }));
            }
            if lamports_before.is_none() || lamports_before != lamports_after {
                return Err(ProgramError::InvalidAccountData);
            }

            let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
            for (key, account) in committed {
                if account.lamports == 0 && account.data.is_empty() {
                    accounts.remove(&key);
                } else {
                    accounts.insert(key, Arc::new(account));
                }
            }
            debug!(accounts = unique.len(), "committed");
            Ok(())
        }
    }

    impl AccountSource for Bank {
        fn account_data(&self, address: &Pubkey) -> Option<Vec<u8>> {
            self.account(address)
                .filter(|a| a.owner == self.program_id)
                .map(|a| a.data.clone())
        }

        fn program_accounts(&self, program_id: &Pubkey) -> Vec<(Pubkey, Vec<u8>)> {
            let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
            accounts
                .iter()
                .filter(|(_, a)| a.owner == *program_id)
                .map(|(k, a)| (*k, a.data.clone()))
                .collect()
        }
    }

    /// Runtime services for one instruction. Account creation and resizing
    /// swap in pre-allocated buffers; ownership changes are applied at commit.
    struct HostRuntime<'a> {
        now: i64,
        rent: Rent,
        spare: RefCell<Vec<&'a mut [u8]>>,
        assigned: RefCell<Vec<(Pubkey, Pubkey)>>,
    }

    impl<'a> HostRuntime<'a> {
        fn take_buffer(&self, len: usize) -> Result<&'a mut [u8], ProgramError> {
            let buffer = self.spare.borrow_mut().pop().ok_or(ProgramError::AccountDataTooSmall)?;
            if buffer.len() < len {
                return Err(ProgramError::InvalidRealloc);
            }
            let (head, _) = buffer.split_at_mut(len);
            head.fill(0);
            Ok(head)
        }

        fn owner_of(&self, key: &Pubkey) -> Option<Pubkey> {
            self.assigned.borrow().iter().rev().find(|(k, _)| k == key).map(|(_, owner)| *owner)
        }
    }

    impl<'a> Runtime<'a> for HostRuntime<'a> {
        fn unix_timestamp(&self) -> Result<i64, ProgramError> {
            Ok(self.now)
        }

        fn minimum_balance(&self, data_len: usize) -> Result<u64, ProgramError> {
            Ok(self.rent.minimum_balance(data_len))
        }

        fn create_account(
            &self,
            payer: &AccountInfo<'a>,
            target: &AccountInfo<'a>,
            system: &AccountInfo<'a>,
            space: usize,
            owner: &Pubkey,
            seeds: &[&[u8]],
        ) -> ProgramResult {
            let derived = Pubkey::create_program_address(seeds, owner).map_err(|_| ProgramError::InvalidSeeds)?;
            if derived != *target.key {
                return Err(ProgramError::InvalidSeeds);
            }
            if *target.owner != system_program::ID || !target.data_is_empty() || self.owner_of(target.key).is_some() {
                return Err(ProgramError::AccountAlreadyInitialized);
            }

            let rent = self.minimum_balance(space)?;
            self.deposit(payer, target, system, rent.saturating_sub(target.lamports()))?;
            if space > 0 {
                let buffer = self.take_buffer(space)?;
                *target.try_borrow_mut_data()? = buffer;
            }
            self.assigned.borrow_mut().push((*target.key, *owner));
            debug!(account = %target.key, space, rent, "account created");
            Ok(())
        }

        fn deposit(
            &self,
            from: &AccountInfo<'a>,
            to: &AccountInfo<'a>,
            _system: &AccountInfo<'a>,
            lamports: u64,
        ) -> ProgramResult {
            if lamports == 0 {
                return Ok(());
            }
            if !from.is_signer {
                return Err(ProgramError::MissingRequiredSignature);
            }
            if *from.owner != system_program::ID || self.owner_of(from.key).is_some() {
                return Err(ProgramError::InvalidAccountOwner);
            }
            runtime::release(from, to, lamports)
        }

        fn resize(
            &self,
            payer: &AccountInfo<'a>,
            target: &AccountInfo<'a>,
            system: &AccountInfo<'a>,
            new_len: usize,
        ) -> ProgramResult {
            let old_rent = self.minimum_balance(target.data_len())?;
            let new_rent = self.minimum_balance(new_len)?;
            self.deposit(payer, target, system, new_rent.saturating_sub(old_rent))?;

            let buffer = self.take_buffer(new_len)?;
            {
                let old = target.try_borrow_data()?;
                let n = old.len().min(new_len);
                buffer[..n].copy_from_slice(&old[..n]);
            }
            *target.try_borrow_mut_data()? = buffer;
            debug!(account = %target.key, new_len, "account resized");
            Ok(())
        }
    }
}
