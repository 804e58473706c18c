//! http sync between working copies and a pin server

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};

pub use client::Client;
pub use server::{Server, ServerConfig};

/// `meta` part of a pin upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMeta {
    pub version: String,
}

/// body of a create-project request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
}

/// project record as served by `GET /projects/{project}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub project: String,
    /// rfc 3339 timestamp
    pub last_modified: String,
}
