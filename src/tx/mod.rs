use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::contracts::registry::{self, TransactionKind};
use crate::contracts::{ContractError, ShareAssetStore};
use crate::ledger::{check_key, StateError, StateStore};

pub const NONCE_LEN: usize = 24;

/// Transaction id: hex SHA-256 over `nonce || creator`.
pub fn transaction_id(nonce: &[u8], creator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(creator.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    Put {
        key: String,
        #[serde(with = "serde_bytes")]
        value: Vec<u8>,
    },
    Delete {
        key: String,
    },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxOutcome {
    Committed {
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
        writes: Vec<WriteOp>,
    },
    Evaluated {
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_id: String,
    pub function: String,
    pub args: Vec<String>,
    pub outcome: TxOutcome,
}

impl TxReceipt {
    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, TxOutcome::Rejected { .. })
    }

    /// Response payload, if the transaction produced one.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.outcome {
            TxOutcome::Committed { payload, .. } | TxOutcome::Evaluated { payload } => {
                Some(payload.as_slice())
            }
            TxOutcome::Rejected { .. } => None,
        }
    }
}

/// State view for a single transaction.
///
/// Reads go to committed state and are recorded in the read set; writes are
/// buffered in the write set and only reach the backing store through
/// [`TxContext::commit`]. A transaction therefore never observes its own
/// pending writes.
pub struct TxContext<'a> {
    tx_id: String,
    state: &'a dyn StateStore,
    reads: Mutex<BTreeSet<String>>,
    writes: Mutex<BTreeMap<String, WriteOp>>,
}

impl<'a> TxContext<'a> {
    pub fn new(tx_id: String, state: &'a dyn StateStore) -> Self {
        Self {
            tx_id,
            state,
            reads: Mutex::new(BTreeSet::new()),
            writes: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub async fn read_set(&self) -> Vec<String> {
        self.reads.lock().await.iter().cloned().collect()
    }

    pub async fn write_set(&self) -> Vec<WriteOp> {
        self.writes.lock().await.values().cloned().collect()
    }

    /// Applies the write set to the backing store in key order.
    pub async fn commit(self) -> Result<Vec<WriteOp>, StateError> {
        let writes: Vec<WriteOp> = self.writes.into_inner().into_values().collect();
        for write in &writes {
            match write {
                WriteOp::Put { key, value } => self.state.put(key, value.clone()).await?,
                WriteOp::Delete { key } => self.state.delete(key).await?,
            }
        }
        Ok(writes)
    }
}

#[async_trait]
impl<'a> StateStore for TxContext<'a> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        self.reads.lock().await.insert(key.to_string());
        self.state.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StateError> {
        check_key(key)?;
        self.writes.lock().await.insert(
            key.to_string(),
            WriteOp::Put {
                key: key.to_string(),
                value,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        check_key(key)?;
        self.writes.lock().await.insert(
            key.to_string(),
            WriteOp::Delete {
                key: key.to_string(),
            },
        );
        Ok(())
    }
}

/// Runs contract functions against a backing state, one transaction each.
pub struct Executor<S> {
    state: S,
    creator: String,
}

impl<S: StateStore> Executor<S> {
    pub fn new(state: S, creator: impl Into<String>) -> Self {
        Self {
            state,
            creator: creator.into(),
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Submits or evaluates `function` according to its registered kind.
    pub async fn execute(&self, function: &str, args: &[String]) -> TxReceipt {
        match registry::lookup(function).map(|def| def.kind) {
            Some(TransactionKind::Submit) => self.submit(function, args).await,
            _ => self.evaluate(function, args).await,
        }
    }

    pub async fn submit(&self, function: &str, args: &[String]) -> TxReceipt {
        self.run(function, args, true).await
    }

    pub async fn evaluate(&self, function: &str, args: &[String]) -> TxReceipt {
        self.run(function, args, false).await
    }

    async fn run(&self, function: &str, args: &[String], commit: bool) -> TxReceipt {
        let tx_id = transaction_id(&fresh_nonce(), &self.creator);
        let ctx = TxContext::new(tx_id.clone(), &self.state);
        let result = {
            let store = ShareAssetStore::new(&ctx);
            registry::dispatch(&store, function, args).await
        };

        let outcome = match result {
            Err(err) => rejected(&tx_id, function, &err),
            Ok(payload) if !commit => {
                tracing::debug!(tx_id = %tx_id, function, "transaction evaluated");
                TxOutcome::Evaluated { payload }
            }
            Ok(payload) => match ctx.commit().await {
                Ok(writes) => {
                    tracing::info!(
                        tx_id = %tx_id,
                        function,
                        writes = writes.len(),
                        "transaction committed"
                    );
                    TxOutcome::Committed { payload, writes }
                }
                Err(err) => rejected(&tx_id, function, &ContractError::State(err)),
            },
        };

        TxReceipt {
            tx_id,
            function: function.to_string(),
            args: args.to_vec(),
            outcome,
        }
    }
}

fn rejected(tx_id: &str, function: &str, err: &ContractError) -> TxOutcome {
    tracing::warn!(tx_id, function, error = %err, "transaction rejected");
    TxOutcome::Rejected {
        reason: err.to_string(),
    }
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
