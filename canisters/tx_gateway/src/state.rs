use std::collections::BTreeSet;

use candid::{CandidType, Principal};
use serde::{Deserialize, Serialize};

use crate::error::{TxError, TxResult};
use crate::rpc::{EvmRpcCanister, DEFAULT_RESPONSE_ESTIMATE, DEFAULT_RPC_CYCLES};

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub chain_id: Option<u64>,
    pub rpc_canister: Option<Principal>,
    pub rpc_cycles: u128,
    pub max_response_bytes: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            chain_id: None,
            rpc_canister: None,
            rpc_cycles: DEFAULT_RPC_CYCLES,
            max_response_bytes: DEFAULT_RESPONSE_ESTIMATE,
        }
    }
}

#[derive(Clone, Debug, Default, CandidType, Deserialize, Serialize)]
pub struct GatewayState {
    pub admins: BTreeSet<Principal>,
    pub config: GatewayConfig,
}

#[derive(Clone, Debug, Default, CandidType, Deserialize)]
pub struct InitArgs {
    pub admins: Vec<Principal>,
    pub chain_id: Option<u64>,
    pub rpc_canister: Option<Principal>,
    pub rpc_cycles: Option<u128>,
    pub max_response_bytes: Option<u64>,
}

impl GatewayState {
    /// The installing principal is always an admin.
    pub fn from_init(args: InitArgs, installer: Principal) -> Self {
        let mut admins: BTreeSet<Principal> = args.admins.into_iter().collect();
        admins.insert(installer);
        let defaults = GatewayConfig::default();
        Self {
            admins,
            config: GatewayConfig {
                chain_id: args.chain_id,
                rpc_canister: args.rpc_canister,
                rpc_cycles: args.rpc_cycles.unwrap_or(defaults.rpc_cycles),
                max_response_bytes: args
                    .max_response_bytes
                    .unwrap_or(defaults.max_response_bytes),
            },
        }
    }

    pub fn ensure_admin(&self, caller: &Principal) -> TxResult<()> {
        if self.admins.contains(caller) {
            Ok(())
        } else {
            Err(TxError::NotAuthorized)
        }
    }

    pub fn chain_id(&self) -> TxResult<u64> {
        self.config
            .chain_id
            .ok_or_else(|| TxError::ConfigurationMissing {
                field: "chain_id".into(),
            })
    }

    pub fn transport(&self) -> TxResult<EvmRpcCanister> {
        let canister = self
            .config
            .rpc_canister
            .ok_or_else(|| TxError::ConfigurationMissing {
                field: "rpc_canister".into(),
            })?;
        Ok(EvmRpcCanister {
            cycles: self.config.rpc_cycles,
            max_response_bytes: self.config.max_response_bytes,
            ..EvmRpcCanister::new(canister, self.chain_id()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(byte: u8) -> Principal {
        Principal::from_slice(&[byte; 10])
    }

    #[test]
    fn init_defaults() {
        let state = GatewayState::from_init(InitArgs::default(), principal(1));
        assert!(state.ensure_admin(&principal(1)).is_ok());
        assert_eq!(state.ensure_admin(&principal(2)), Err(TxError::NotAuthorized));
        assert_eq!(state.config.rpc_cycles, DEFAULT_RPC_CYCLES);
        assert_eq!(state.config.max_response_bytes, DEFAULT_RESPONSE_ESTIMATE);
        assert_eq!(
            state.chain_id(),
            Err(TxError::ConfigurationMissing {
                field: "chain_id".into()
            })
        );
    }

    #[test]
    fn transport_requires_rpc_target_and_chain() {
        let mut state = GatewayState::from_init(
            InitArgs {
                admins: vec![principal(3)],
                chain_id: Some(137),
                ..Default::default()
            },
            principal(1),
        );
        assert!(state.ensure_admin(&principal(3)).is_ok());
        assert!(matches!(
            state.transport(),
            Err(TxError::ConfigurationMissing { .. })
        ));

        state.config.rpc_canister = Some(principal(9));
        let transport = state.transport().unwrap();
        assert_eq!(transport.chain_id, 137);
        assert_eq!(transport.canister, principal(9));
    }
}
