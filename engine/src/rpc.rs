//! JSON-RPC 2.0 client for the daemon, on top of an SCGI transport.

use crate::error::RpcError;
use crate::scgi::{transport_from_url, Transport};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const HASH_NOT_FOUND: &str = "invalid parameters: info-hash not found";

/// A single method call with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub params: Vec<JsonValue>,
}

impl Call {
    pub fn new(method: impl Into<String>, params: Vec<JsonValue>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Request/response access to the daemon's command interface.
pub trait RpcClient: Send + Sync {
    fn call(&self, method: &str, params: Vec<JsonValue>) -> Result<JsonValue, RpcError>;

    /// Several calls in one round-trip, results in call order.
    fn multicall(&self, calls: &[Call]) -> Result<Vec<JsonValue>, RpcError> {
        calls
            .iter()
            .map(|call| self.call(&call.method, call.params.clone()))
            .collect()
    }

    fn url(&self) -> &str;
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [JsonValue],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: Option<JsonValue>,
    result: Option<JsonValue>,
    error: Option<ErrorObject>,
}

impl ErrorObject {
    fn into_error(self) -> RpcError {
        match (self.code, self.message) {
            (_, Some(message)) if message == HASH_NOT_FOUND => RpcError::HashNotFound(message),
            (Some(code), Some(message)) => RpcError::Fault { code, message },
            (code, message) => RpcError::Fault {
                code: code.unwrap_or(-500),
                message: message.unwrap_or_else(|| "Received error without message".to_string()),
            },
        }
    }
}

fn response_id(response: &Response) -> Option<u64> {
    match &response.id {
        Some(JsonValue::Number(n)) => n.as_u64(),
        Some(JsonValue::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// The daemon wants at least one parameter, even for argument-less commands.
fn non_empty(params: &[JsonValue]) -> Vec<JsonValue> {
    if params.is_empty() {
        vec![JsonValue::String(String::new())]
    } else {
        params.to_vec()
    }
}

pub struct JsonRpcClient {
    transport: Box<dyn Transport>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn connect(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let headers = vec![("CONTENT_TYPE".to_string(), "application/json".to_string())];
        Ok(Self::new(transport_from_url(url, headers, timeout)?))
    }

    fn send<T: Serialize + ?Sized>(&self, request: &T) -> Result<Vec<u8>, RpcError> {
        let body = serde_json::to_vec(request)?;
        self.transport.request(&body)
    }
}

impl RpcClient for JsonRpcClient {
    fn call(&self, method: &str, params: Vec<JsonValue>) -> Result<JsonValue, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = non_empty(&params);
        debug!("method '{}', params {:?}", method, params);

        let raw = self.send(&Request {
            jsonrpc: "2.0",
            method,
            params: &params,
            id,
        })?;
        let response: Response = serde_json::from_slice(&raw)?;

        if response_id(&response) != Some(id) {
            return Err(RpcError::protocol(format!(
                "RPC IDs do not match: sent={} received={:?}",
                id, response.id
            )));
        }
        if let Some(error) = response.error {
            return Err(error.into_error());
        }
        response
            .result
            .ok_or_else(|| RpcError::protocol(format!("Result not found in response to '{}'", method)))
    }

    /// Sent as a JSON-RPC batch, since the daemon has no `system.multicall` of its own here.
    fn multicall(&self, calls: &[Call]) -> Result<Vec<JsonValue>, RpcError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let params: Vec<Vec<JsonValue>> = calls.iter().map(|c| non_empty(&c.params)).collect();
        let batch: Vec<Request> = calls
            .iter()
            .zip(&params)
            .enumerate()
            .map(|(index, (call, params))| Request {
                jsonrpc: "2.0",
                method: &call.method,
                params,
                id: index as u64,
            })
            .collect();
        debug!("batch of {} calls", batch.len());

        let raw = self.send(&batch)?;
        let mut responses: Vec<Response> = serde_json::from_slice(&raw)?;
        if responses.len() != calls.len() {
            return Err(RpcError::protocol(format!(
                "Sent {} calls but got {} results",
                calls.len(),
                responses.len()
            )));
        }
        responses.sort_by_key(|r| response_id(r).unwrap_or(u64::MAX));

        let mut results = Vec::with_capacity(responses.len());
        let mut faults = Vec::new();
        for (index, response) in responses.into_iter().enumerate() {
            if response_id(&response) != Some(index as u64) {
                return Err(RpcError::protocol(format!(
                    "Missing result for call #{} in batch",
                    index
                )));
            }
            match (response.error, response.result) {
                (Some(error), _) => faults.push(error.into_error()),
                (None, Some(result)) => results.push(result),
                (None, None) => {
                    return Err(RpcError::protocol(format!(
                        "Result not found for call #{} in batch",
                        index
                    )))
                }
            }
        }

        match faults.len() {
            0 => Ok(results),
            1 => Err(faults.remove(0)),
            _ => {
                let mut messages: Vec<String> = faults.iter().map(ToString::to_string).collect();
                messages.dedup();
                Err(RpcError::Fault {
                    code: -500,
                    message: format!("Errors in JSON-RPC batch call: {}", messages.join("; ")),
                })
            }
        }
    }

    fn url(&self) -> &str {
        self.transport.url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned response bodies and records what was sent.
    struct Canned {
        responses: Mutex<Vec<JsonValue>>,
        sent: Mutex<Vec<JsonValue>>,
    }

    impl Canned {
        fn new(responses: Vec<JsonValue>) -> Self {
            Self {
                responses: Mutex::new(responses),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for Canned {
        fn request(&self, body: &[u8]) -> Result<Vec<u8>, RpcError> {
            self.sent.lock().unwrap().push(serde_json::from_slice(body).unwrap());
            let response = self.responses.lock().unwrap().remove(0);
            Ok(serde_json::to_vec(&response).unwrap())
        }

        fn url(&self) -> &str {
            "scgi://canned:1"
        }
    }

    fn client(responses: Vec<JsonValue>) -> JsonRpcClient {
        JsonRpcClient::new(Box::new(Canned::new(responses)))
    }

    #[test]
    fn test_call_sends_empty_param_and_returns_result() {
        let rpc = client(vec![json!({"jsonrpc": "2.0", "id": 1, "result": "0.9.8"})]);
        assert_eq!(rpc.call("system.client_version", vec![]).unwrap(), json!("0.9.8"));
    }

    #[test]
    fn test_call_errors() {
        let rpc = client(vec![
            json!({"jsonrpc": "2.0", "id": 7, "result": 1}),
            json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32602, "message": HASH_NOT_FOUND}}),
            json!({"jsonrpc": "2.0", "id": 3, "error": {"code": -506, "message": "Method not defined"}}),
            json!({"jsonrpc": "2.0", "id": 4}),
        ]);
        assert!(matches!(rpc.call("d.name", vec![]), Err(RpcError::Protocol(_))));
        assert!(matches!(rpc.call("d.name", vec![json!("ABC")]), Err(RpcError::HashNotFound(_))));
        assert!(matches!(
            rpc.call("d.bogus", vec![json!("ABC")]),
            Err(RpcError::Fault { code: -506, .. })
        ));
        assert!(matches!(rpc.call("d.name", vec![]), Err(RpcError::Protocol(_))));
    }

    #[test]
    fn test_multicall_reorders_batch_results() {
        let rpc = client(vec![json!([
            {"jsonrpc": "2.0", "id": 1, "result": "session"},
            {"jsonrpc": "2.0", "id": 0, "result": "0.9.8"},
        ])]);
        let results = rpc
            .multicall(&[
                Call::new("system.client_version", vec![]),
                Call::new("session.name", vec![]),
            ])
            .unwrap();
        assert_eq!(results, vec![json!("0.9.8"), json!("session")]);
    }

    #[test]
    fn test_multicall_fault() {
        let rpc = client(vec![json!([
            {"jsonrpc": "2.0", "id": 0, "result": "ok"},
            {"jsonrpc": "2.0", "id": 1, "error": {"code": -501, "message": "bad"}},
        ])]);
        let calls = [Call::new("a", vec![]), Call::new("b", vec![])];
        assert!(matches!(rpc.multicall(&calls), Err(RpcError::Fault { code: -501, .. })));
    }
}
