//! Registry persistence: contract addresses, nodes and trusted members.

use rusqlite::Connection;

use rpool_ledger::ContractRegistry;

use crate::keys::{decode_address, encode_address, names, StorageKey};
use crate::store;
use crate::{DbError, Result};

const NODE: &str = "node";
const TRUSTED: &str = "trusted";

/// Write every contract and node.
pub fn save(conn: &Connection, registry: &ContractRegistry) -> Result<()> {
    for (name, address) in registry.contracts() {
        let key = StorageKey::new(names::REGISTRY_CONTRACT).param(name);
        store::put(conn, &key, &encode_address(address))?;
    }
    for node in registry.nodes() {
        let key = StorageKey::new(names::REGISTRY_NODE).param(encode_address(node));
        let role = if registry.is_trusted(node) { TRUSTED } else { NODE };
        store::put(conn, &key, role)?;
    }
    Ok(())
}

/// Rebuild the registry.
pub fn load(conn: &Connection) -> Result<ContractRegistry> {
    let mut registry = ContractRegistry::new();
    for (params, value) in store::entries(conn, names::REGISTRY_CONTRACT)? {
        let [name] = store::params::<1>(names::REGISTRY_CONTRACT, params)?;
        registry
            .register_contract(&name, decode_address(&value)?)
            .map_err(|e| DbError::Corrupt(e.to_string()))?;
    }
    for (params, value) in store::entries(conn, names::REGISTRY_NODE)? {
        let [node] = store::params::<1>(names::REGISTRY_NODE, params)?;
        let node = decode_address(&node)?;
        registry
            .register_node(node)
            .map_err(|e| DbError::Corrupt(e.to_string()))?;
        match value.as_str() {
            TRUSTED => registry
                .set_trusted(node, true)
                .map_err(|e| DbError::Corrupt(e.to_string()))?,
            NODE => {}
            other => {
                return Err(DbError::Corrupt(format!("node {node} has role '{other}'")));
            }
        }
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpool_types::derive_address;

    #[test]
    fn test_save_load() {
        let conn = crate::open_memory().expect("open test db");
        let mut registry = ContractRegistry::new();
        registry
            .register_contract("rewards_pool", derive_address("rewards_pool-v2"))
            .expect("pool");
        let a = derive_address("node-a");
        let b = derive_address("node-b");
        registry.register_node(a).expect("a");
        registry.register_node(b).expect("b");
        registry.set_trusted(b, true).expect("trust");

        save(&conn, &registry).expect("save");
        let loaded = load(&conn).expect("load");

        assert!(loaded.is_latest("rewards_pool", &derive_address("rewards_pool-v2")));
        assert!(loaded.is_node(&a));
        assert!(!loaded.is_trusted(&a));
        assert!(loaded.is_trusted(&b));
        assert_eq!(loaded.trusted_count(), 1);
    }
}
