//! Error types for the Ebb ledger.
use thiserror::Error;

use crate::types::{AccountId, Role, Week};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("account already has an active lock")] AlreadyLocked,
    #[error("amount too small: {amount} < {min}")] AmountTooSmall { amount: u64, min: u64 },
    #[error("duration out of range: {weeks} not in [{min}, {max}]")] DurationOutOfRange { weeks: u16, min: u16, max: u16 },
    #[error("zero amount")] ZeroAmount,
    #[error("duration must increase: current {current}, requested {requested}")] DurationNotIncreased { current: u16, requested: u16 },
    #[error("no active lock")] NoActiveLock,
    #[error("lock expired at week {unlock_week}")] LockExpired { unlock_week: Week },
    #[error("lock active until week {unlock_week}")] LockNotExpired { unlock_week: Week },
    #[error("lock is auto-locked")] AutoLocked,
    #[error("lock is not auto-locked")] NotAutoLocked,
    #[error("no penalty receiver configured")] NoPenaltyReceiver,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("week index {0} exceeds horizon")] WeekOverflow(u64),
    #[error("timestamp {timestamp} precedes epoch start {epoch_start}")] BeforeEpoch { timestamp: u64, epoch_start: u64 },
    #[error("arithmetic overflow")] Overflow,
    #[error("clock regressed: week {week} is behind frontier {frontier}")] ClockRegressed { week: Week, frontier: Week },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u64, need: u64 },
    #[error("transfer rejected: {0}")] Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    #[error("withdrawal exceeds reservoir: have {available}, requested {requested}")] InsufficientReserve { available: u64, requested: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{caller} lacks role {role:?}")] Unauthorized { caller: AccountId, role: Role },
}

/// Coarse classification of an [`EbbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: amount, duration, or duplicate lock.
    Validation,
    /// Operation does not apply to the position in its current state.
    State,
    /// Week horizon or integer overflow. Fatal.
    Arithmetic,
    /// Token transfer failed; nothing was mutated.
    External,
    Unauthorized,
    Storage,
}

#[derive(Error, Debug)]
pub enum EbbError {
    #[error(transparent)] Lock(#[from] LockError),
    #[error(transparent)] Arithmetic(#[from] ArithmeticError),
    #[error(transparent)] Transfer(#[from] TransferError),
    #[error(transparent)] Reward(#[from] RewardError),
    #[error(transparent)] Auth(#[from] AuthError),
    #[error("storage: {0}")] Storage(String),
}

impl EbbError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Lock(
                LockError::AlreadyLocked
                | LockError::AmountTooSmall { .. }
                | LockError::DurationOutOfRange { .. }
                | LockError::ZeroAmount
                | LockError::DurationNotIncreased { .. },
            ) => ErrorKind::Validation,
            Self::Lock(_) => ErrorKind::State,
            Self::Arithmetic(_) => ErrorKind::Arithmetic,
            Self::Transfer(_) => ErrorKind::External,
            Self::Reward(_) => ErrorKind::State,
            Self::Auth(_) => ErrorKind::Unauthorized,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}
