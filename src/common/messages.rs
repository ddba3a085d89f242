//! Serialize and deserialize ring maintenance messages.

mod internal;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::common::{Id, Node, RingPosition, Status, ID_SIZE};
use crate::{Error, Result};

#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub transaction_id: u32,

    pub message_type: MessageType,
}

#[derive(Debug, PartialEq, Clone)]
pub enum MessageType {
    Request(RequestSpecific),

    Response(ResponseSpecific),

    Error(ErrorSpecific),
}

#[derive(Debug, PartialEq, Clone)]
pub struct ErrorSpecific {
    pub status: Status,
    pub description: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct RequestSpecific {
    pub requester_id: Id,
    pub request_type: RequestTypeSpecific,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum RequestTypeSpecific {
    GetSuccessor,
    GetPredecessor,
    FindClosestSuccessor { target: RingPosition },
    FindClosestPredecessor { target: RingPosition },
    /// The sender claims to be our `role`.
    Notify { role: Role, node: Node },
    /// The sender knows a `candidate` that may be closer than our current entries.
    Alert { candidate: Node },
}

impl RequestTypeSpecific {
    pub fn name(&self) -> &'static str {
        match self {
            RequestTypeSpecific::GetSuccessor => "get_successor",
            RequestTypeSpecific::GetPredecessor => "get_predecessor",
            RequestTypeSpecific::FindClosestSuccessor { .. } => "find_closest_successor",
            RequestTypeSpecific::FindClosestPredecessor { .. } => "find_closest_predecessor",
            RequestTypeSpecific::Notify { .. } => "notify",
            RequestTypeSpecific::Alert { .. } => "alert",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
/// Role claimed by a notifying node, relative to the notified one.
pub enum Role {
    Predecessor,
    Successor,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ResponseSpecific {
    /// Answer to `get_successor` and `get_predecessor`.
    Neighbor { responder_id: Id, node: Node },
    /// Answer to `find_closest_*`: the closest node the responder knows and that
    /// node's immediate successor.
    FindClosest {
        responder_id: Id,
        node: Node,
        successor: Node,
    },
    Ack { responder_id: Id },
}

impl ResponseSpecific {
    pub fn responder_id(&self) -> Id {
        match self {
            ResponseSpecific::Neighbor { responder_id, .. } => *responder_id,
            ResponseSpecific::FindClosest { responder_id, .. } => *responder_id,
            ResponseSpecific::Ack { responder_id } => *responder_id,
        }
    }
}

impl Message {
    fn into_serde_message(self) -> internal::RingMessage {
        internal::RingMessage {
            transaction_id: self.transaction_id.to_be_bytes(),
            variant: match self.message_type {
                MessageType::Request(RequestSpecific {
                    requester_id,
                    request_type,
                }) => {
                    let id = requester_id.0;

                    internal::RingMessageVariant::Request(match request_type {
                        RequestTypeSpecific::GetSuccessor => {
                            internal::RingRequestSpecific::GetSuccessor {
                                arguments: internal::RingIdArguments { id },
                            }
                        }
                        RequestTypeSpecific::GetPredecessor => {
                            internal::RingRequestSpecific::GetPredecessor {
                                arguments: internal::RingIdArguments { id },
                            }
                        }
                        RequestTypeSpecific::FindClosestSuccessor { target } => {
                            internal::RingRequestSpecific::FindClosestSuccessor {
                                arguments: internal::RingTargetArguments {
                                    id,
                                    target: target.0,
                                },
                            }
                        }
                        RequestTypeSpecific::FindClosestPredecessor { target } => {
                            internal::RingRequestSpecific::FindClosestPredecessor {
                                arguments: internal::RingTargetArguments {
                                    id,
                                    target: target.0,
                                },
                            }
                        }
                        RequestTypeSpecific::Notify { role, node } => {
                            internal::RingRequestSpecific::Notify {
                                arguments: internal::RingNotifyArguments {
                                    id,
                                    role: match role {
                                        Role::Predecessor => 0,
                                        Role::Successor => 1,
                                    },
                                    node: node_to_bytes(&node),
                                },
                            }
                        }
                        RequestTypeSpecific::Alert { candidate } => {
                            internal::RingRequestSpecific::Alert {
                                arguments: internal::RingNodeArguments {
                                    id,
                                    node: node_to_bytes(&candidate),
                                },
                            }
                        }
                    })
                }

                MessageType::Response(res) => internal::RingMessageVariant::Response(match res {
                    ResponseSpecific::Neighbor { responder_id, node } => {
                        internal::RingResponseSpecific::Neighbor {
                            arguments: internal::RingNodeArguments {
                                id: responder_id.0,
                                node: node_to_bytes(&node),
                            },
                        }
                    }
                    ResponseSpecific::FindClosest {
                        responder_id,
                        node,
                        successor,
                    } => internal::RingResponseSpecific::FindClosest {
                        arguments: internal::RingFindClosestResponseArguments {
                            id: responder_id.0,
                            node: node_to_bytes(&node),
                            successor: node_to_bytes(&successor),
                        },
                    },
                    ResponseSpecific::Ack { responder_id } => internal::RingResponseSpecific::Ack {
                        arguments: internal::RingIdArguments {
                            id: responder_id.0,
                        },
                    },
                }),

                MessageType::Error(err) => {
                    internal::RingMessageVariant::Error(internal::RingErrorSpecific {
                        error_info: (err.status.code(), err.description),
                    })
                }
            },
        }
    }

    fn from_serde_message(msg: internal::RingMessage) -> Result<Message> {
        Ok(Message {
            transaction_id: u32::from_be_bytes(msg.transaction_id),
            message_type: match msg.variant {
                internal::RingMessageVariant::Request(req_variant) => {
                    MessageType::Request(match req_variant {
                        internal::RingRequestSpecific::GetSuccessor { arguments } => {
                            RequestSpecific {
                                requester_id: Id(arguments.id),
                                request_type: RequestTypeSpecific::GetSuccessor,
                            }
                        }
                        internal::RingRequestSpecific::GetPredecessor { arguments } => {
                            RequestSpecific {
                                requester_id: Id(arguments.id),
                                request_type: RequestTypeSpecific::GetPredecessor,
                            }
                        }
                        internal::RingRequestSpecific::FindClosestSuccessor { arguments } => {
                            RequestSpecific {
                                requester_id: Id(arguments.id),
                                request_type: RequestTypeSpecific::FindClosestSuccessor {
                                    target: RingPosition(arguments.target),
                                },
                            }
                        }
                        internal::RingRequestSpecific::FindClosestPredecessor { arguments } => {
                            RequestSpecific {
                                requester_id: Id(arguments.id),
                                request_type: RequestTypeSpecific::FindClosestPredecessor {
                                    target: RingPosition(arguments.target),
                                },
                            }
                        }
                        internal::RingRequestSpecific::Notify { arguments } => RequestSpecific {
                            requester_id: Id(arguments.id),
                            request_type: RequestTypeSpecific::Notify {
                                role: match arguments.role {
                                    0 => Role::Predecessor,
                                    1 => Role::Successor,
                                    _ => return Err(Error::InvalidMessage("unknown notify role")),
                                },
                                node: bytes_to_node(&arguments.node)?,
                            },
                        },
                        internal::RingRequestSpecific::Alert { arguments } => RequestSpecific {
                            requester_id: Id(arguments.id),
                            request_type: RequestTypeSpecific::Alert {
                                candidate: bytes_to_node(&arguments.node)?,
                            },
                        },
                    })
                }

                internal::RingMessageVariant::Response(res_variant) => {
                    MessageType::Response(match res_variant {
                        internal::RingResponseSpecific::FindClosest { arguments } => {
                            ResponseSpecific::FindClosest {
                                responder_id: Id(arguments.id),
                                node: bytes_to_node(&arguments.node)?,
                                successor: bytes_to_node(&arguments.successor)?,
                            }
                        }
                        internal::RingResponseSpecific::Neighbor { arguments } => {
                            ResponseSpecific::Neighbor {
                                responder_id: Id(arguments.id),
                                node: bytes_to_node(&arguments.node)?,
                            }
                        }
                        internal::RingResponseSpecific::Ack { arguments } => {
                            ResponseSpecific::Ack {
                                responder_id: Id(arguments.id),
                            }
                        }
                    })
                }

                internal::RingMessageVariant::Error(err) => MessageType::Error(ErrorSpecific {
                    status: Status::from_code(err.error_info.0),
                    description: err.error_info.1,
                }),
            },
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.clone().into_serde_message().to_bytes()?)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_serde_message(internal::RingMessage::from_bytes(bytes)?)
    }

    /// Return the Id of the sender of the Message, if it is not an error message.
    pub fn get_author_id(&self) -> Option<Id> {
        match &self.message_type {
            MessageType::Request(request) => Some(request.requester_id),
            MessageType::Response(response) => Some(response.responder_id()),
            MessageType::Error(_) => None,
        }
    }
}

fn bytes_to_sockaddr<T: AsRef<[u8]>>(bytes: T) -> Result<SocketAddr> {
    let bytes = bytes.as_ref();

    match bytes.len() {
        6 => {
            let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
            let port = u16::from_be_bytes([bytes[4], bytes[5]]);

            Ok(SocketAddr::new(IpAddr::V4(ip), port))
        }
        18 => {
            let mut octets = [0; 16];
            octets.copy_from_slice(&bytes[..16]);
            let port = u16::from_be_bytes([bytes[16], bytes[17]]);

            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => Err(Error::InvalidMessage("wrong number of bytes for address")),
    }
}

pub fn sockaddr_to_bytes(sockaddr: &SocketAddr) -> Vec<u8> {
    let mut bytes = match sockaddr.ip() {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };

    bytes.extend(sockaddr.port().to_be_bytes());

    bytes
}

fn node_to_bytes(node: &Node) -> Vec<u8> {
    let mut bytes = node.id.to_vec();
    bytes.append(&mut sockaddr_to_bytes(&node.address));
    bytes
}

fn bytes_to_node<T: AsRef<[u8]>>(bytes: T) -> Result<Node> {
    let bytes = bytes.as_ref();

    if bytes.len() < ID_SIZE {
        return Err(Error::InvalidMessage("compact node too short"));
    }

    let id = Id::from_bytes(&bytes[..ID_SIZE])?;
    let address = bytes_to_sockaddr(&bytes[ID_SIZE..])?;

    Ok(Node::new(id, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(address: &str) -> Node {
        Node::new(Id::random(), address.parse().unwrap())
    }

    #[test]
    fn test_find_closest_predecessor_request() {
        let original_msg = Message {
            transaction_id: 258,
            message_type: MessageType::Request(RequestSpecific {
                requester_id: Id::random(),
                request_type: RequestTypeSpecific::FindClosestPredecessor {
                    target: RingPosition(u32::MAX),
                },
            }),
        };

        let bytes = original_msg.to_bytes().unwrap();
        let parsed_msg = Message::from_bytes(bytes).unwrap();

        assert_eq!(parsed_msg, original_msg);
    }

    #[test]
    fn test_notify_request() {
        let original_msg = Message {
            transaction_id: 7,
            message_type: MessageType::Request(RequestSpecific {
                requester_id: Id::random(),
                request_type: RequestTypeSpecific::Notify {
                    role: Role::Successor,
                    node: node("[2001:db8::1]:6881"),
                },
            }),
        };

        let bytes = original_msg.to_bytes().unwrap();
        let parsed_msg = Message::from_bytes(bytes).unwrap();

        assert_eq!(parsed_msg, original_msg);
    }

    #[test]
    fn test_responses_are_told_apart() {
        let responder_id = Id::random();

        let find_closest = Message {
            transaction_id: 1,
            message_type: MessageType::Response(ResponseSpecific::FindClosest {
                responder_id,
                node: node("10.0.0.1:1000"),
                successor: node("10.0.0.2:1000"),
            }),
        };
        let neighbor = Message {
            transaction_id: 2,
            message_type: MessageType::Response(ResponseSpecific::Neighbor {
                responder_id,
                node: node("10.0.0.3:1000"),
            }),
        };
        let ack = Message {
            transaction_id: 3,
            message_type: MessageType::Response(ResponseSpecific::Ack { responder_id }),
        };

        for original_msg in [find_closest, neighbor, ack] {
            let parsed_msg = Message::from_bytes(original_msg.to_bytes().unwrap()).unwrap();

            assert_eq!(parsed_msg, original_msg);
            assert_eq!(parsed_msg.get_author_id(), Some(responder_id));
        }
    }

    #[test]
    fn test_error_message() {
        let original_msg = Message {
            transaction_id: 9,
            message_type: MessageType::Error(ErrorSpecific {
                status: Status::ProtocolError,
                description: "Unknown procedure".to_string(),
            }),
        };

        let parsed_msg = Message::from_bytes(original_msg.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed_msg, original_msg);
        assert_eq!(parsed_msg.get_author_id(), None);
    }

    #[test]
    fn test_reject_garbage() {
        assert!(Message::from_bytes(b"d1:y1:qe").is_err());
        assert!(bytes_to_node([0u8; 25]).is_err());
        assert!(bytes_to_sockaddr([0u8; 7]).is_err());
    }
}
