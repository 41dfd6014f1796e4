//! Mock JSON-RPC node for integration testing
//!
//! Provides a wiremock-based server answering the handful of `eth_*`
//! methods the synchronizer uses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, U256};
use serde_json::{json, Value};
use wiremock::{matchers::method, Mock, MockServer, Request, Respond, ResponseTemplate};

/// Chain state served by the mock node
#[derive(Debug, Clone)]
pub struct NodeState {
    pub chain_id: u64,
    pub accounts: Vec<Address>,
    pub balance: U256,
    /// Deployed bytecode by address
    pub code: HashMap<Address, Bytes>,
    /// Answer of every `isOperational()` call
    pub operational: bool,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            accounts: Vec::new(),
            balance: U256::ZERO,
            code: HashMap::new(),
            operational: true,
        }
    }
}

impl NodeState {
    pub fn with_contracts(mut self, addresses: &[Address]) -> Self {
        for address in addresses {
            self.code.insert(*address, Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]));
        }
        self
    }
}

struct RpcResponder {
    state: Arc<Mutex<NodeState>>,
}

impl RpcResponder {
    fn result(&self, method: &str, params: &Value) -> Result<Value, (i64, String)> {
        let state = self.state.lock().unwrap();
        match method {
            "eth_chainId" => Ok(json!(format!("0x{:x}", state.chain_id))),
            "eth_accounts" | "eth_requestAccounts" => Ok(json!(state.accounts)),
            "eth_getBalance" => Ok(json!(state.balance)),
            "eth_blockNumber" => Ok(json!("0x1")),
            "eth_getCode" => {
                let address: Address = serde_json::from_value(params[0].clone())
                    .map_err(|e| (-32602, e.to_string()))?;
                let code = state.code.get(&address).cloned().unwrap_or_default();
                Ok(json!(code))
            }
            "eth_call" => {
                let mut word = [0u8; 32];
                word[31] = u8::from(state.operational);
                Ok(json!(Bytes::copy_from_slice(&word)))
            }
            "eth_newFilter" => Ok(json!("0x1")),
            "eth_getFilterChanges" => Ok(json!([])),
            "eth_uninstallFilter" => Ok(json!(true)),
            other => Err((-32601, format!("method {} not supported", other))),
        }
    }
}

impl Respond for RpcResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let id = body["id"].clone();
        let method = body["method"].as_str().unwrap_or_default();

        let response = match self.result(method, &body["params"]) {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, message)) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": message }
            }),
        };
        ResponseTemplate::new(200).set_body_json(response)
    }
}

/// Mock node server
pub struct MockRpcNode {
    server: MockServer,
    state: Arc<Mutex<NodeState>>,
}

impl MockRpcNode {
    pub async fn start(state: NodeState) -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(state));

        Mock::given(method("POST"))
            .respond_with(RpcResponder {
                state: Arc::clone(&state),
            })
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn set_operational(&self, operational: bool) {
        self.state.lock().unwrap().operational = operational;
    }

    /// Number of requests received for `rpc_method`
    pub async fn calls(&self, rpc_method: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .filter(|body| body["method"] == rpc_method)
            .count()
    }
}
