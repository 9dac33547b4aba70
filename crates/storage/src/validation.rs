//! Semantic transaction validation.
//!
//! This is critical for consensus: it defines the validation rules for a
//! transaction against the ledger, and is run on every transaction received.
//! Cheap, frequent failures come first. A transaction that reaches this code
//! is already known to be well-formed (signature and field ranges checked).

use crate::{records, StorageError, Store};
use isaac_types::{Account, Amount, AmountError, Operation, OperationKind, Transaction, BASE_FEE};

/// Semantic rejection reasons, in the order they are checked.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("source account does not exist")]
    SourceNotFound,
    #[error("invalid sequence id: account is at {expected}, transaction says {got}")]
    InvalidSequenceId { expected: u64, got: u64 },
    #[error("no balance snapshot at sequence {0}")]
    SnapshotNotFound(u64),
    #[error("insufficient balance at sequence: needs {needed}, has {available}")]
    ExcessAbilityToPay { needed: Amount, available: Amount },
    #[error("target account already exists")]
    TargetExists,
    #[error("target account does not exist")]
    TargetNotFound,
    #[error("frozen account cannot receive payment")]
    FrozenReceiver,
    #[error("unfreezing was not requested")]
    UnfreezingNotRequested,
    #[error("unfreezing period has not elapsed")]
    UnfreezingNotExpired,
    #[error("frozen account creation must fund whole units")]
    FrozenCreationNotWholeUnit,
    #[error("frozen account must withdraw its whole balance minus the base fee")]
    FrozenMustWithdrawAll,
    #[error("unfreeze request already received")]
    UnfreezeAlreadyRequested,
    #[error("unfreeze request from a non-frozen account")]
    UnfreezeFromInvalidAccount,
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Validate the entirety of a transaction against the ledger.
///
/// On a per-operation failure the transaction's history marker is removed, so
/// a corrected resubmission is not mistaken for a duplicate. Sequence and
/// balance failures keep the marker.
pub fn validate_tx(
    store: &dyn Store,
    tx: &Transaction,
    unfreezing_period: u64,
) -> Result<(), ValidationError> {
    let source = records::get_account(store, tx.source())?.ok_or(ValidationError::SourceNotFound)?;

    if !tx.is_valid_sequence_id(source.sequence_id) {
        return Err(ValidationError::InvalidSequenceId {
            expected: source.sequence_id,
            got: tx.sequence_id(),
        });
    }

    let snapshot = records::get_account_snapshot(store, tx.source(), tx.sequence_id())?
        .ok_or(ValidationError::SnapshotNotFound(tx.sequence_id()))?;

    let needed = tx.total_amount(true)?;
    if snapshot.balance < needed {
        return Err(ValidationError::ExcessAbilityToPay {
            needed,
            available: snapshot.balance,
        });
    }

    for op in tx.operations() {
        if let Err(e) = validate_op(store, &source, op, unfreezing_period) {
            records::delete_transaction_history(store, &tx.hash())?;
            return Err(e);
        }
    }

    Ok(())
}

/// Validate a single operation against the ledger and its source account.
pub fn validate_op(
    store: &dyn Store,
    source: &Account,
    op: &Operation,
    unfreezing_period: u64,
) -> Result<(), ValidationError> {
    match op {
        Operation::CreateAccount {
            target,
            amount,
            linked,
        } => {
            if records::exists_account(store, target)? {
                return Err(ValidationError::TargetExists);
            }
            if source.is_frozen() {
                check_unfreezing(store, source, unfreezing_period)?;
                // Frozen accounts may only be funded in whole units.
                if linked.is_some() && !amount.is_whole_unit() {
                    return Err(ValidationError::FrozenCreationNotWholeUnit);
                }
            }
        }
        Operation::Payment { target, amount } => {
            let receiver =
                records::get_account(store, target)?.ok_or(ValidationError::TargetNotFound)?;
            if receiver.is_frozen() {
                return Err(ValidationError::FrozenReceiver);
            }
            if source.is_frozen() {
                // A frozen withdrawal drains everything but the base fee.
                let expected = source.balance.sub(BASE_FEE)?;
                if *amount != expected {
                    return Err(ValidationError::FrozenMustWithdrawAll);
                }
                check_unfreezing(store, source, unfreezing_period)?;
            }
        }
        Operation::UnfreezeRequest => {
            if !source.is_frozen() {
                return Err(ValidationError::UnfreezeFromInvalidAccount);
            }
            let latest = records::latest_operation_by_source(store, &source.address)?;
            if latest.map(|op| op.kind) == Some(OperationKind::UnfreezeRequest) {
                return Err(ValidationError::UnfreezeAlreadyRequested);
            }
        }
        Operation::CongressVoting | Operation::CongressVotingResult => {}
    }
    Ok(())
}

/// An unfreezing withdrawal needs a prior unfreeze request, aged at least the
/// unfreezing period in block heights.
fn check_unfreezing(
    store: &dyn Store,
    source: &Account,
    unfreezing_period: u64,
) -> Result<(), ValidationError> {
    let latest = records::latest_operation_by_source(store, &source.address)?
        .ok_or(ValidationError::UnfreezingNotRequested)?;
    if latest.kind != OperationKind::UnfreezeRequest {
        return Err(ValidationError::UnfreezingNotRequested);
    }
    let height = records::latest_block(store)?.map(|b| b.height).unwrap_or(0);
    if height.saturating_sub(latest.block_height) < unfreezing_period {
        return Err(ValidationError::UnfreezingNotExpired);
    }
    Ok(())
}
