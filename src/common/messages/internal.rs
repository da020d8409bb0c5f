use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcMessage {
    #[serde(rename = "t", with = "serde_bytes")]
    pub transaction_id: Vec<u8>,

    #[serde(rename = "v", default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub version: Option<Vec<u8>>,

    #[serde(flatten)]
    pub variant: KrpcMessageVariant,
}

impl KrpcMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<KrpcMessage, serde_bencode::Error> {
        serde_bencode::from_bytes(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "y")]
pub enum KrpcMessageVariant {
    #[serde(rename = "q")]
    Request(KrpcRequestSpecific),

    #[serde(rename = "r")]
    Response(KrpcResponseSpecific),

    #[serde(rename = "e")]
    Error(KrpcErrorSpecific),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "q")]
pub enum KrpcRequestSpecific {
    #[serde(rename = "ping")]
    Ping {
        #[serde(rename = "a")]
        arguments: KrpcPingArguments,
    },

    #[serde(rename = "find_node")]
    FindNode {
        #[serde(rename = "a")]
        arguments: KrpcFindNodeRequestArguments,
    },

    #[serde(rename = "get")]
    Get {
        #[serde(rename = "a")]
        arguments: KrpcGetRequestArguments,
    },

    #[serde(rename = "put")]
    Put {
        #[serde(rename = "a")]
        arguments: KrpcPutRequestArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)] // Order matters, from most to least detailed.
pub enum KrpcResponseSpecific {
    GetMutable {
        #[serde(rename = "r")]
        arguments: KrpcGetMutableResponseArguments,
    },

    GetImmutable {
        #[serde(rename = "r")]
        arguments: KrpcGetImmutableResponseArguments,
    },

    NoValues {
        #[serde(rename = "r")]
        arguments: KrpcNoValuesResponseArguments,
    },

    FindNode {
        #[serde(rename = "r")]
        arguments: KrpcFindNodeResponseArguments,
    },

    Ping {
        #[serde(rename = "r")]
        arguments: KrpcPingArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcErrorSpecific {
    #[serde(rename = "e")]
    pub error_info: (i32, String),
}

// === PING ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcPingArguments {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
}

// === FIND NODE ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcFindNodeRequestArguments {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub target: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcFindNodeResponseArguments {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub nodes: Vec<u8>,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub nodes6: Option<Vec<u8>>,
}

// === GET ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcGetRequestArguments {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub target: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcNoValuesResponseArguments {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub token: Vec<u8>,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<u8>>,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub nodes6: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcGetImmutableResponseArguments {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub token: Vec<u8>,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<u8>>,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub nodes6: Option<Vec<u8>>,

    pub v: Bytes,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcGetMutableResponseArguments {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub token: Vec<u8>,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<u8>>,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub nodes6: Option<Vec<u8>>,

    pub v: Bytes,

    #[serde(with = "serde_bytes")]
    pub k: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,

    pub seq: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<Bytes>,
}

// === PUT ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KrpcPutRequestArguments {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub target: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub token: Vec<u8>,

    pub v: Bytes,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub k: Option<Vec<u8>>,

    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub sig: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<Bytes>,
}
