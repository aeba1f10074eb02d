use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{ActionHandle, ResultItem};
use crate::router::Query;

pub const HOST_METHOD_PREFIX: &str = "Host.";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("method '{0}' is not a host method")]
    NotHostMethod(String),
    #[error("unknown host method '{0}'")]
    UnknownMethod(String),
    #[error("invalid parameters for '{method}': {reason}")]
    InvalidParameters { method: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

impl RpcRequest {
    pub fn new(method: &str, parameters: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOperation {
    ChangeQuery { query: String },
    ShowMessage { title: String, subtitle: String },
    ReloadSources,
    HideApp,
    ShowApp,
}

type OperationParser = fn(&[Value]) -> Result<HostOperation, String>;

const HOST_OPERATIONS: &[(&str, OperationParser)] = &[
    ("ChangeQuery", parse_change_query),
    ("ShowMessage", parse_show_message),
    ("ReloadSources", parse_reload_sources),
    ("HideApp", parse_hide_app),
    ("ShowApp", parse_show_app),
];

pub fn host_method_names() -> impl Iterator<Item = &'static str> {
    HOST_OPERATIONS.iter().map(|(name, _)| *name)
}

pub fn decode_host_request(request: &RpcRequest) -> Result<HostOperation, RpcError> {
    let name = request
        .method
        .strip_prefix(HOST_METHOD_PREFIX)
        .ok_or_else(|| RpcError::NotHostMethod(request.method.clone()))?;

    let (_, parser) = HOST_OPERATIONS
        .iter()
        .find(|(known, _)| *known == name)
        .ok_or_else(|| RpcError::UnknownMethod(request.method.clone()))?;

    parser(&request.parameters).map_err(|reason| RpcError::InvalidParameters {
        method: request.method.clone(),
        reason,
    })
}

pub fn decode_host_json(payload: &str) -> Result<HostOperation, RpcError> {
    let request: RpcRequest = serde_json::from_str(payload)?;
    decode_host_request(&request)
}

pub fn encode_query_request(query: &Query) -> Result<String, RpcError> {
    let request = RpcRequest::new("query", vec![Value::String(query.raw.clone())]);
    Ok(serde_json::to_string(&request)?)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RpcResult {
    pub title: String,
    pub sub_title: String,
    pub icon_path: String,
    pub score: i64,
    pub history_key: Option<String>,
    pub action: Option<RpcRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RpcQueryResponse {
    #[serde(default)]
    pub result: Vec<RpcResult>,
}

pub fn decode_query_response(payload: &str) -> Result<Vec<ResultItem>, RpcError> {
    let response: RpcQueryResponse = serde_json::from_str(payload)?;
    response
        .result
        .into_iter()
        .filter(|result| !result.title.trim().is_empty())
        .map(into_result_item)
        .collect()
}

fn into_result_item(result: RpcResult) -> Result<ResultItem, RpcError> {
    let action = match result.action {
        None => ActionHandle::None,
        Some(request) if request.method.starts_with(HOST_METHOD_PREFIX) => {
            match decode_host_request(&request)? {
                HostOperation::ChangeQuery { query } => ActionHandle::ChangeQuery { query },
                _ => ActionHandle::Custom(serde_json::to_string(&request)?),
            }
        }
        Some(request) => ActionHandle::Custom(serde_json::to_string(&request)?),
    };

    let mut item = ResultItem::from_owned(result.title, result.sub_title)
        .with_score(result.score)
        .with_icon(&result.icon_path)
        .with_action(action);
    item.history_key = result.history_key;
    Ok(item)
}

fn parse_change_query(params: &[Value]) -> Result<HostOperation, String> {
    let query = string_param(params, 0, "query")?;
    Ok(HostOperation::ChangeQuery { query })
}

fn parse_show_message(params: &[Value]) -> Result<HostOperation, String> {
    let title = string_param(params, 0, "title")?;
    let subtitle = match params.get(1) {
        None | Some(Value::Null) => String::new(),
        Some(_) => string_param(params, 1, "subtitle")?,
    };
    Ok(HostOperation::ShowMessage { title, subtitle })
}

fn parse_reload_sources(_: &[Value]) -> Result<HostOperation, String> {
    Ok(HostOperation::ReloadSources)
}

fn parse_hide_app(_: &[Value]) -> Result<HostOperation, String> {
    Ok(HostOperation::HideApp)
}

fn parse_show_app(_: &[Value]) -> Result<HostOperation, String> {
    Ok(HostOperation::ShowApp)
}

fn string_param(params: &[Value], index: usize, name: &str) -> Result<String, String> {
    match params.get(index) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(format!("{name} must be a string, got {other}")),
        None => Err(format!("missing {name}")),
    }
}
