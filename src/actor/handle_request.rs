use std::net::SocketAddr;

use tracing::{debug, trace};

use crate::common::{
    ErrorSpecific, MessageType, Node, RequestSpecific, RequestTypeSpecific, ResponseSpecific,
    Role, Side, Status,
};

use super::handle_response::observed;
use super::Actor;

impl Actor {
    /// Answer an inbound request from another node.
    ///
    /// Requesters are remembered as locations, but only enter the routing table
    /// through an explicit `notify` or a response.
    pub(super) fn handle_request(
        &mut self,
        from: SocketAddr,
        transaction_id: u32,
        request: RequestSpecific,
    ) {
        let requester = Node::new(request.requester_id, from);

        trace!(?requester, request = request.request_type.name(), "Handling request");

        if requester.id != self.me.id {
            self.locations.resolve(requester, requester.id);
            self.locations.mark_alive(&requester.id);
        }

        let message = match self.answer(requester, request.request_type) {
            Ok(response) => MessageType::Response(response),
            Err(error) => {
                debug!(?requester, ?error, "Rejected request");
                MessageType::Error(error)
            }
        };

        self.transport.reply(from, transaction_id, message);
    }

    fn answer(
        &mut self,
        requester: Node,
        request_type: RequestTypeSpecific,
    ) -> Result<ResponseSpecific, ErrorSpecific> {
        let responder_id = self.me.id;
        let ring = *self.routing_table.ring();

        Ok(match request_type {
            RequestTypeSpecific::GetSuccessor => ResponseSpecific::Neighbor {
                responder_id,
                node: self.successor_node(),
            },
            RequestTypeSpecific::GetPredecessor => ResponseSpecific::Neighbor {
                responder_id,
                node: self.predecessor_node(),
            },
            RequestTypeSpecific::FindClosestPredecessor { target }
            | RequestTypeSpecific::FindClosestSuccessor { target }
                if u64::from(target.0) >= ring.size() =>
            {
                return Err(ErrorSpecific {
                    status: Status::ProtocolError,
                    description: format!("Target {target} is outside a {} bits ring", ring.bits()),
                });
            }
            RequestTypeSpecific::FindClosestPredecessor { target } => {
                let closest = self.routing_table.closest_preceding(target);

                ResponseSpecific::FindClosest {
                    responder_id,
                    node: self.node_of(&closest).unwrap_or(self.me),
                    successor: self.successor_node(),
                }
            }
            RequestTypeSpecific::FindClosestSuccessor { target } => {
                let closest = self.routing_table.closest_succeeding(target);

                ResponseSpecific::FindClosest {
                    responder_id,
                    node: self.node_of(&closest).unwrap_or(self.me),
                    successor: self.successor_node(),
                }
            }
            RequestTypeSpecific::Notify { role, node } => {
                if let Some(node) = observed(node, requester).filter(|n| n.id != self.me.id) {
                    self.locations.resolve(node, requester.id);

                    if self.locations.is_alive(&node.id) {
                        let side = match role {
                            Role::Predecessor => Side::Predecessor,
                            Role::Successor => Side::Successor,
                        };

                        if self.routing_table.notice_side(side, node.id) {
                            debug!(?node, %side, "Adopted notifying node");
                        }
                    }
                }

                ResponseSpecific::Ack { responder_id }
            }
            RequestTypeSpecific::Alert { candidate } => {
                self.learn_node(candidate, requester);

                ResponseSpecific::Ack { responder_id }
            }
        })
    }
}
