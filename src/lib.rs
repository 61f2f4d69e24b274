//! Share asset contract.
//!
//! A ledger contract that keeps single-field `{"value": ...}` records in a
//! key-value world state:
//!
//! * [`contracts`] — the [`ShareAssetStore`] CRUD operations and the
//!   transaction table hosts dispatch through.
//! * [`ledger`] — the [`StateStore`] seam with in-memory and file backends.
//! * [`tx`] — per-transaction context and the executor that commits write
//!   sets for submit transactions.
//! * [`config`] and [`logging`] — ambient setup used by the `share-asset` CLI.

pub mod config;
pub mod contracts;
pub mod ledger;
pub mod logging;
pub mod tx;

pub use contracts::{ContractError, ShareAsset, ShareAssetStore};
pub use ledger::{FileState, MemoryState, StateError, StateStore};
pub use tx::{Executor, TxOutcome, TxReceipt};
