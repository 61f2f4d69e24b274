//! Transaction table for the share asset contract.
//!
//! Every callable function is listed once in [`TRANSACTIONS`] with its kind,
//! parameter names and return type. [`dispatch`] maps a function name and
//! string arguments onto a [`ShareAssetStore`] call; [`ContractMetadata`]
//! renders the same table (plus the [`ShareAsset`] schema) for hosts that
//! ask the contract to describe itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ContractError, ShareAsset, ShareAssetStore};
use crate::ledger::StateStore;

pub const CONTRACT_NAME: &str = "ShareAssetContract";
pub const METADATA_FUNCTION: &str = "org.hyperledger.fabric:GetMetadata";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Endorsed and committed; may write.
    Submit,
    /// Simulated only; results are never committed.
    Evaluate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Exists,
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionDef {
    pub name: &'static str,
    pub kind: TransactionKind,
    pub operation: Operation,
    pub params: &'static [&'static str],
    pub returns: Option<&'static str>,
}

pub const TRANSACTIONS: &[TransactionDef] = &[
    TransactionDef {
        name: "shareAssetExists",
        kind: TransactionKind::Evaluate,
        operation: Operation::Exists,
        params: &["shareAssetId"],
        returns: Some("boolean"),
    },
    TransactionDef {
        name: "createShareAsset",
        kind: TransactionKind::Submit,
        operation: Operation::Create,
        params: &["shareAssetId", "value"],
        returns: None,
    },
    TransactionDef {
        name: "readShareAsset",
        kind: TransactionKind::Evaluate,
        operation: Operation::Read,
        params: &["shareAssetId"],
        returns: Some("ShareAsset"),
    },
    TransactionDef {
        name: "updateShareAsset",
        kind: TransactionKind::Submit,
        operation: Operation::Update,
        params: &["shareAssetId", "newValue"],
        returns: None,
    },
    TransactionDef {
        name: "deleteShareAsset",
        kind: TransactionKind::Submit,
        operation: Operation::Delete,
        params: &["shareAssetId"],
        returns: None,
    },
];

pub fn lookup(name: &str) -> Option<&'static TransactionDef> {
    TRANSACTIONS.iter().find(|def| def.name == name)
}

/// Runs `function` against `store` and returns the response payload.
///
/// `shareAssetExists` answers `true`/`false`, `readShareAsset` the record
/// JSON, submit functions an empty payload.
pub async fn dispatch<S: StateStore>(
    store: &ShareAssetStore<S>,
    function: &str,
    args: &[String],
) -> Result<Vec<u8>, ContractError> {
    if function == METADATA_FUNCTION {
        check_arity(function, 0, args)?;
        return serde_json::to_vec(&ContractMetadata::describe()).map_err(ContractError::Encoding);
    }
    let def = lookup(function).ok_or_else(|| ContractError::UnknownTransaction {
        name: function.to_string(),
    })?;
    check_arity(def.name, def.params.len(), args)?;

    match def.operation {
        Operation::Exists => {
            let exists = store.exists(&args[0]).await?;
            Ok(exists.to_string().into_bytes())
        }
        Operation::Create => {
            store.create(&args[0], &args[1]).await?;
            Ok(Vec::new())
        }
        Operation::Read => store.read(&args[0]).await?.to_bytes(),
        Operation::Update => {
            store.update(&args[0], &args[1]).await?;
            Ok(Vec::new())
        }
        Operation::Delete => {
            store.delete(&args[0]).await?;
            Ok(Vec::new())
        }
    }
}

fn check_arity(name: &str, expected: usize, args: &[String]) -> Result<(), ContractError> {
    if args.len() != expected {
        return Err(ContractError::ArgumentCount {
            name: name.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeSchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl TypeSchema {
    fn for_type(name: &str) -> Self {
        match name {
            "string" | "boolean" | "number" => Self {
                kind: Some(name.to_string()),
                reference: None,
            },
            other => Self {
                kind: None,
                reference: Some(format!("#/components/schemas/{other}")),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectSchema {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, TypeSchema>,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

impl ShareAsset {
    /// Schema descriptor for the stored record shape.
    pub fn schema() -> ObjectSchema {
        let mut properties = BTreeMap::new();
        properties.insert("value".to_string(), TypeSchema::for_type("string"));
        ObjectSchema {
            id: "ShareAsset".to_string(),
            kind: "object".to_string(),
            properties,
            required: vec!["value".to_string()],
            additional_properties: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterMetadata {
    pub name: String,
    pub schema: TypeSchema,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionMetadata {
    pub name: String,
    pub tag: Vec<TransactionKind>,
    pub parameters: Vec<ParameterMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<TypeSchema>,
}

impl From<&TransactionDef> for TransactionMetadata {
    fn from(def: &TransactionDef) -> Self {
        Self {
            name: def.name.to_string(),
            tag: vec![def.kind],
            parameters: def
                .params
                .iter()
                .map(|param| ParameterMetadata {
                    name: param.to_string(),
                    schema: TypeSchema::for_type("string"),
                })
                .collect(),
            returns: def.returns.map(TypeSchema::for_type),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractInfo {
    pub title: String,
    pub description: String,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractDescriptor {
    pub name: String,
    pub info: ContractInfo,
    pub transactions: Vec<TransactionMetadata>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Components {
    pub schemas: BTreeMap<String, ObjectSchema>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractMetadata {
    pub contracts: BTreeMap<String, ContractDescriptor>,
    pub components: Components,
}

impl ContractMetadata {
    pub fn describe() -> Self {
        let descriptor = ContractDescriptor {
            name: CONTRACT_NAME.to_string(),
            info: ContractInfo {
                title: CONTRACT_NAME.to_string(),
                description: "Create, read, update and delete share assets".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            transactions: TRANSACTIONS.iter().map(TransactionMetadata::from).collect(),
        };
        let mut contracts = BTreeMap::new();
        contracts.insert(CONTRACT_NAME.to_string(), descriptor);
        let mut schemas = BTreeMap::new();
        schemas.insert("ShareAsset".to_string(), ShareAsset::schema());
        Self {
            contracts,
            components: Components { schemas },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryState;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn table_names_are_unique() {
        for (idx, def) in TRANSACTIONS.iter().enumerate() {
            assert!(TRANSACTIONS[idx + 1..].iter().all(|other| other.name != def.name));
        }
        assert_eq!(lookup("readShareAsset").unwrap().kind, TransactionKind::Evaluate);
        assert_eq!(lookup("createShareAsset").unwrap().kind, TransactionKind::Submit);
        assert!(lookup("transferShareAsset").is_none());
    }

    #[tokio::test]
    async fn dispatch_runs_crud_by_name() {
        let store = ShareAssetStore::new(MemoryState::new());

        let payload = dispatch(&store, "shareAssetExists", &args(&["1001"])).await.unwrap();
        assert_eq!(payload, b"false");

        let payload = dispatch(&store, "createShareAsset", &args(&["1001", "A"])).await.unwrap();
        assert!(payload.is_empty());

        let payload = dispatch(&store, "readShareAsset", &args(&["1001"])).await.unwrap();
        assert_eq!(payload, br#"{"value":"A"}"#);

        dispatch(&store, "updateShareAsset", &args(&["1001", "C"])).await.unwrap();
        let payload = dispatch(&store, "readShareAsset", &args(&["1001"])).await.unwrap();
        assert_eq!(payload, br#"{"value":"C"}"#);

        dispatch(&store, "deleteShareAsset", &args(&["1001"])).await.unwrap();
        let payload = dispatch(&store, "shareAssetExists", &args(&["1001"])).await.unwrap();
        assert_eq!(payload, b"false");
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_function() {
        let store = ShareAssetStore::new(MemoryState::new());
        let err = dispatch(&store, "burnShareAsset", &[]).await.unwrap_err();
        assert!(matches!(err, ContractError::UnknownTransaction { name } if name == "burnShareAsset"));
    }

    #[tokio::test]
    async fn dispatch_checks_argument_count() {
        let store = ShareAssetStore::new(MemoryState::new());
        let err = dispatch(&store, "createShareAsset", &args(&["1001"])).await.unwrap_err();
        match err {
            ContractError::ArgumentCount {
                name,
                expected,
                actual,
            } => {
                assert_eq!(name, "createShareAsset");
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(store.state().is_empty().await);
    }

    #[tokio::test]
    async fn metadata_function_describes_contract() {
        let store = ShareAssetStore::new(MemoryState::new());
        let payload = dispatch(&store, METADATA_FUNCTION, &[]).await.unwrap();
        let metadata: ContractMetadata = serde_json::from_slice(&payload).unwrap();
        assert_eq!(metadata, ContractMetadata::describe());
    }

    #[test]
    fn metadata_json_shape() {
        let json = serde_json::to_value(ContractMetadata::describe()).unwrap();
        let contract = &json["contracts"][CONTRACT_NAME];
        assert_eq!(contract["info"]["title"], CONTRACT_NAME);

        let txs = contract["transactions"].as_array().unwrap();
        assert_eq!(txs.len(), 5);
        assert_eq!(txs[0]["name"], "shareAssetExists");
        assert_eq!(txs[0]["tag"][0], "evaluate");
        assert_eq!(txs[0]["returns"]["type"], "boolean");
        assert_eq!(txs[1]["tag"][0], "submit");
        assert_eq!(txs[1]["parameters"][1]["name"], "value");
        assert!(txs[1].get("returns").is_none());
        assert_eq!(txs[2]["returns"]["$ref"], "#/components/schemas/ShareAsset");

        let schema = &json["components"]["schemas"]["ShareAsset"];
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["value"]["type"], "string");
        assert_eq!(schema["required"][0], "value");
        assert_eq!(schema["additionalProperties"], false);
    }
}
