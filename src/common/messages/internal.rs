use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingMessage {
    #[serde(rename = "t", with = "serde_bytes")]
    pub transaction_id: [u8; 4],

    #[serde(flatten)]
    pub variant: RingMessageVariant,
}

impl RingMessage {
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<RingMessage, serde_bencode::Error> {
        let obj = serde_bencode::from_bytes(bytes.as_ref())?;
        Ok(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "y")]
pub enum RingMessageVariant {
    #[serde(rename = "q")]
    Request(RingRequestSpecific),

    #[serde(rename = "r")]
    Response(RingResponseSpecific),

    #[serde(rename = "e")]
    Error(RingErrorSpecific),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "q")]
pub enum RingRequestSpecific {
    #[serde(rename = "get_successor")]
    GetSuccessor {
        #[serde(rename = "a")]
        arguments: RingIdArguments,
    },

    #[serde(rename = "get_predecessor")]
    GetPredecessor {
        #[serde(rename = "a")]
        arguments: RingIdArguments,
    },

    #[serde(rename = "find_closest_successor")]
    FindClosestSuccessor {
        #[serde(rename = "a")]
        arguments: RingTargetArguments,
    },

    #[serde(rename = "find_closest_predecessor")]
    FindClosestPredecessor {
        #[serde(rename = "a")]
        arguments: RingTargetArguments,
    },

    #[serde(rename = "notify")]
    Notify {
        #[serde(rename = "a")]
        arguments: RingNotifyArguments,
    },

    #[serde(rename = "alert")]
    Alert {
        #[serde(rename = "a")]
        arguments: RingNodeArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)] // Order matters, from most to least detailed.
pub enum RingResponseSpecific {
    FindClosest {
        #[serde(rename = "r")]
        arguments: RingFindClosestResponseArguments,
    },

    Neighbor {
        #[serde(rename = "r")]
        arguments: RingNodeArguments,
    },

    Ack {
        #[serde(rename = "r")]
        arguments: RingIdArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingErrorSpecific {
    #[serde(rename = "e")]
    pub error_info: (i32, String),
}

// === Arguments ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingIdArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingTargetArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],

    pub target: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingNodeArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],

    /// Compact node: 20 bytes id followed by 6 (IPv4) or 18 (IPv6) address bytes.
    #[serde(with = "serde_bytes")]
    pub node: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingNotifyArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],

    /// 0 for predecessor, 1 for successor.
    pub role: u8,

    #[serde(with = "serde_bytes")]
    pub node: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingFindClosestResponseArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],

    #[serde(with = "serde_bytes")]
    pub node: Vec<u8>,

    #[serde(with = "serde_bytes")]
    pub successor: Vec<u8>,
}
