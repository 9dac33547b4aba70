//! Block application.
//!
//! The ledger is only ever mutated here: genesis creation and the atomic
//! application of a decided block. Everything a block implies (account debits
//! and credits, sequence bumps, balance snapshots, transaction and operation
//! records, history markers) lands in one storage batch.

use crate::{records, Batch, StorageError, Store};
use isaac_types::{Account, AccountSnapshot, Address, AmountError, Block, Operation, Transaction};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("chain already has a genesis block")]
    GenesisExists,
    #[error("chain has no genesis block")]
    EmptyChain,
    #[error("expected height {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },
    #[error("previous hash does not match the block at height {0}")]
    PrevHashMismatch(u64),
    #[error("transaction set does not match the block body")]
    TransactionMismatch,
    #[error("account {0} does not exist")]
    AccountNotFound(Address),
    #[error("account {0} already exists")]
    AccountExists(Address),
}

/// Working set of accounts touched while applying one block.
///
/// Reads fall through to storage; writes stay here until the batch is built,
/// so a transaction can pay an account created earlier in the same block.
struct AccountOverlay<'a> {
    store: &'a dyn Store,
    touched: HashMap<Address, Account>,
}

impl<'a> AccountOverlay<'a> {
    fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            touched: HashMap::new(),
        }
    }

    fn get(&mut self, address: &Address) -> Result<Option<Account>, LedgerError> {
        if let Some(account) = self.touched.get(address) {
            return Ok(Some(account.clone()));
        }
        Ok(records::get_account(self.store, address)?)
    }

    fn exists(&mut self, address: &Address) -> Result<bool, LedgerError> {
        if self.touched.contains_key(address) {
            return Ok(true);
        }
        Ok(records::exists_account(self.store, address)?)
    }

    fn set(&mut self, account: Account) {
        self.touched.insert(account.address.clone(), account);
    }

    /// Flush every touched account and its balance snapshot into the batch.
    fn flush(self, batch: &mut Batch) -> Result<(), StorageError> {
        for account in self.touched.values() {
            batch.put_json(crate::keys::account(&account.address), account)?;
            let snapshot = AccountSnapshot {
                address: account.address.clone(),
                sequence_id: account.sequence_id,
                balance: account.balance,
            };
            batch.put_json(
                crate::keys::account_snapshot(&account.address, account.sequence_id),
                &snapshot,
            )?;
        }
        Ok(())
    }
}

/// Create the genesis block and the initial account set.
///
/// Fails if the chain already has any block.
pub fn make_genesis(
    store: &dyn Store,
    accounts: &[Account],
    proposer: Address,
    confirmed: String,
) -> Result<Block, LedgerError> {
    if records::latest_block(store)?.is_some() {
        return Err(LedgerError::GenesisExists);
    }
    let block = Block::genesis(proposer, confirmed)?;

    let mut batch = Batch::new();
    records::batch_block(&mut batch, &block)?;
    for account in accounts {
        batch.put_json(crate::keys::account(&account.address), account)?;
        let snapshot = AccountSnapshot {
            address: account.address.clone(),
            sequence_id: account.sequence_id,
            balance: account.balance,
        };
        batch.put_json(
            crate::keys::account_snapshot(&account.address, account.sequence_id),
            &snapshot,
        )?;
    }
    store.write(batch)?;

    info!(hash = %block.hash, accounts = accounts.len(), "created genesis block");
    Ok(block)
}

/// Height of the highest persisted block.
pub fn latest_height(store: &dyn Store) -> Result<u64, LedgerError> {
    Ok(records::latest_block(store)?
        .map(|b| b.height)
        .unwrap_or(0))
}

/// Apply a decided block atomically.
///
/// `transactions` must carry the full body of every hash the block lists, in
/// the same order. Fees are burned: sources are debited amount plus fee and
/// nothing is credited back.
pub fn apply_block(
    store: &dyn Store,
    block: &Block,
    transactions: &[Transaction],
) -> Result<(), LedgerError> {
    let latest = records::latest_block(store)?.ok_or(LedgerError::EmptyChain)?;
    if block.height != latest.height + 1 {
        return Err(LedgerError::HeightMismatch {
            expected: latest.height + 1,
            got: block.height,
        });
    }
    if block.prev_hash != latest.hash {
        return Err(LedgerError::PrevHashMismatch(latest.height));
    }
    if transactions.len() != block.transactions.len()
        || transactions
            .iter()
            .zip(&block.transactions)
            .any(|(tx, hash)| tx.hash() != *hash)
    {
        return Err(LedgerError::TransactionMismatch);
    }

    let mut batch = Batch::new();
    let mut overlay = AccountOverlay::new(store);
    records::batch_block(&mut batch, block)?;

    for tx in transactions {
        apply_transaction(&mut overlay, &mut batch, tx, block.height)?;
    }
    overlay.flush(&mut batch)?;

    store.write(batch)?;
    debug!(height = block.height, hash = %block.hash, txs = transactions.len(), "applied block");
    Ok(())
}

fn apply_transaction(
    overlay: &mut AccountOverlay<'_>,
    batch: &mut Batch,
    tx: &Transaction,
    height: u64,
) -> Result<(), LedgerError> {
    let mut source = overlay
        .get(tx.source())?
        .ok_or_else(|| LedgerError::AccountNotFound(tx.source().clone()))?;

    source.balance = source.balance.sub(tx.total_amount(true)?)?;
    source.sequence_id = tx.sequence_id() + 1;

    for (index, op) in tx.operations().iter().enumerate() {
        match op {
            Operation::CreateAccount {
                target,
                amount,
                linked,
            } => {
                if overlay.exists(target)? {
                    return Err(LedgerError::AccountExists(target.clone()));
                }
                let created = match linked {
                    Some(linked) => {
                        Account::new_linked(target.clone(), *amount, linked.clone())
                    }
                    None => Account::new(target.clone(), *amount),
                };
                overlay.set(created);
            }
            Operation::Payment { target, amount } => {
                let mut account = overlay
                    .get(target)?
                    .ok_or_else(|| LedgerError::AccountNotFound(target.clone()))?;
                account.balance = account.balance.add(*amount)?;
                overlay.set(account);
            }
            // Intent-only operations: the record below is their whole effect.
            Operation::UnfreezeRequest
            | Operation::CongressVoting
            | Operation::CongressVotingResult => {}
        }

        let record =
            records::BlockOperation::from_operation(op, tx.source(), tx.hash(), height);
        records::batch_block_operation(batch, &record, index)?;
    }

    overlay.set(source);

    let record = records::BlockTransaction {
        hash: tx.hash(),
        block_height: height,
        transaction: tx.clone(),
    };
    records::batch_block_transaction(batch, &record)?;
    // Confirm keeps the submission timestamp of the existing marker, if the
    // transaction came through the ingress chain at all.
    let submitted_at = records::get_transaction_history(overlay.store, &tx.hash())?
        .map(|existing| existing.submitted_at)
        .unwrap_or_else(records::unix_millis);
    batch.put_json(
        crate::keys::transaction_history(&tx.hash()),
        &records::TransactionHistory {
            hash: tx.hash(),
            status: records::HistoryStatus::Confirmed,
            submitted_at,
        },
    )?;
    records::delete_pooled_transaction(batch, &tx.hash());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use isaac_types::{
        Amount, Hash, KeyPair, Operation, ProposerTransaction, TransactionBody, BASE_FEE,
    };

    const NETWORK_ID: &[u8] = b"test-network";

    fn keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed([seed; 32])
    }

    fn genesis_with(store: &MemoryStore, accounts: &[Account]) -> Block {
        make_genesis(store, accounts, keypair(99).address(), "t0".into()).unwrap()
    }

    fn payment_tx(from: &KeyPair, to: &Address, amount: u64, sequence_id: u64) -> Transaction {
        Transaction::create(
            TransactionBody {
                source: from.address(),
                fee: BASE_FEE,
                sequence_id,
                operations: vec![Operation::Payment {
                    target: to.clone(),
                    amount: Amount::new(amount),
                }],
            },
            from,
            NETWORK_ID,
        )
        .unwrap()
    }

    fn next_block(prev: &Block, txs: &[Transaction]) -> Block {
        let hashes: Vec<_> = txs.iter().map(|t| t.hash()).collect();
        let ptx = ProposerTransaction::collect(
            keypair(99).address(),
            txs.iter().map(|t| t.fee()),
            txs.len() as u64,
            prev.height + 1,
        )
        .unwrap();
        Block::new(
            prev.height + 1,
            prev.hash,
            keypair(99).address(),
            hashes,
            Some(ptx),
            prev.total_txs + txs.len() as u64,
            "t1".into(),
        )
        .unwrap()
    }

    #[test]
    fn genesis_is_unique() {
        let store = MemoryStore::new();
        genesis_with(&store, &[]);
        assert!(matches!(
            make_genesis(&store, &[], keypair(99).address(), "t".into()),
            Err(LedgerError::GenesisExists)
        ));
    }

    #[test]
    fn payment_moves_funds_and_burns_fee() {
        let store = MemoryStore::new();
        let alice = keypair(1);
        let bob = keypair(2);
        let genesis = genesis_with(
            &store,
            &[
                Account::new(alice.address(), Amount::new(1_000_000)),
                Account::new(bob.address(), Amount::new(0)),
            ],
        );

        let tx = payment_tx(&alice, &bob.address(), 100, 0);
        let block = next_block(&genesis, std::slice::from_ref(&tx));
        apply_block(&store, &block, &[tx.clone()]).unwrap();

        let a = records::get_account(&store, &alice.address()).unwrap().unwrap();
        let b = records::get_account(&store, &bob.address()).unwrap().unwrap();
        assert_eq!(a.balance, Amount::new(1_000_000 - 100 - BASE_FEE.raw()));
        assert_eq!(a.sequence_id, 1);
        assert_eq!(b.balance, Amount::new(100));

        // Snapshot at the new sequence reflects the post-apply balance.
        let snap = records::get_account_snapshot(&store, &alice.address(), 1)
            .unwrap()
            .unwrap();
        assert_eq!(snap.balance, a.balance);

        // Records and history landed in the same batch.
        assert!(records::exists_block_transaction(&store, &tx.hash()).unwrap());
        assert_eq!(
            records::get_transaction_history(&store, &tx.hash())
                .unwrap()
                .unwrap()
                .status,
            records::HistoryStatus::Confirmed
        );
    }

    #[test]
    fn create_account_in_block() {
        let store = MemoryStore::new();
        let alice = keypair(1);
        let fresh = keypair(3).address();
        let genesis = genesis_with(
            &store,
            &[Account::new(alice.address(), Amount::new(1_000_000))],
        );

        let tx = Transaction::create(
            TransactionBody {
                source: alice.address(),
                fee: BASE_FEE,
                sequence_id: 0,
                operations: vec![Operation::CreateAccount {
                    target: fresh.clone(),
                    amount: Amount::new(50_000),
                    linked: None,
                }],
            },
            &alice,
            NETWORK_ID,
        )
        .unwrap();
        let block = next_block(&genesis, std::slice::from_ref(&tx));
        apply_block(&store, &block, &[tx]).unwrap();

        let created = records::get_account(&store, &fresh).unwrap().unwrap();
        assert_eq!(created.balance, Amount::new(50_000));
        assert_eq!(created.sequence_id, 0);
        assert!(!created.is_frozen());
        assert!(records::get_account_snapshot(&store, &fresh, 0).unwrap().is_some());
    }

    #[test]
    fn rejects_wrong_height_and_parent() {
        let store = MemoryStore::new();
        let genesis = genesis_with(&store, &[]);

        let skip = Block::new(
            5,
            genesis.hash,
            keypair(99).address(),
            vec![],
            None,
            0,
            "t".into(),
        )
        .unwrap();
        assert!(matches!(
            apply_block(&store, &skip, &[]),
            Err(LedgerError::HeightMismatch { expected: 2, got: 5 })
        ));

        let orphan = Block::new(
            2,
            Hash::from_bytes(b"unrelated"),
            keypair(99).address(),
            vec![],
            None,
            0,
            "t".into(),
        )
        .unwrap();
        assert!(matches!(
            apply_block(&store, &orphan, &[]),
            Err(LedgerError::PrevHashMismatch(1))
        ));
    }

    #[test]
    fn rejects_mismatched_transaction_set() {
        let store = MemoryStore::new();
        let alice = keypair(1);
        let bob = keypair(2);
        let genesis = genesis_with(
            &store,
            &[
                Account::new(alice.address(), Amount::new(1_000_000)),
                Account::new(bob.address(), Amount::new(0)),
            ],
        );
        let tx = payment_tx(&alice, &bob.address(), 100, 0);
        let block = next_block(&genesis, std::slice::from_ref(&tx));
        assert!(matches!(
            apply_block(&store, &block, &[]),
            Err(LedgerError::TransactionMismatch)
        ));
    }
}
