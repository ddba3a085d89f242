use tracing::{debug, trace};

use crate::common::{Failure, Node, RequestTypeSpecific, ResponseSpecific, Side};
use crate::core::lookup::{ClosestReply, LookupStep};
use crate::core::stabilization::Probe;

use super::locations::{Completion, LocationRegistry};
use super::{Actor, Purpose, QueryId, QueryOutcome};

impl Actor {
    /// Handle the outcome of a remote call: learn from it, then hand it to
    /// whatever made the call.
    pub(super) fn handle_completion(&mut self, completion: Completion<Purpose>) {
        let Completion {
            token,
            id,
            request,
            result,
        } = completion;

        match &result {
            Ok(response) => self.learn(response),
            Err(failure @ (Failure::Timeout | Failure::Unreachable)) => {
                debug!(?id, request = request.name(), ?failure, "Node failed to answer");

                self.routing_table.set_node_dead(&id);
            }
            Err(Failure::ProtocolError) => {
                debug!(?id, request = request.name(), "Protocol error");
            }
        }

        match token {
            Purpose::Lookup(query) => self.on_lookup_reply(query, request, result),
            Purpose::Neighbor(query) => {
                let outcome = result.and_then(|response| match response {
                    ResponseSpecific::Neighbor { node, .. } => Ok(node),
                    _ => Err(Failure::ProtocolError),
                });

                self.done_queries
                    .push((query, QueryOutcome::Neighbor(outcome)));
            }
            Purpose::Probe(probe) => {
                if let Ok(response) = result {
                    self.on_probe_reply(probe, response);
                }
            }
            Purpose::Notify | Purpose::Alert => {}
        }
    }

    /// Offer a node reported by `sender` to the routing table, unless it is known dead.
    pub(super) fn learn_node(&mut self, node: Node, sender: Node) {
        if node.id == self.me.id {
            return;
        }

        let Some(node) = observed(node, sender) else {
            trace!(?node, ?sender, "Ignored node reported without a reachable address");
            return;
        };

        self.locations.resolve(node, sender.id);

        if self.locations.is_alive(&node.id) {
            self.routing_table.notice(node.id);
        } else {
            trace!(?node, ?sender, "Ignored node known to be dead");
        }
    }

    // === Private Methods ===

    /// The responder is alive, and so are probably the nodes it reports.
    fn learn(&mut self, response: &ResponseSpecific) {
        let responder_id = response.responder_id();

        // Only answers from the address on record complete a call.
        let Some(responder) = self.node_of(&responder_id) else {
            return;
        };

        if responder_id != self.me.id {
            self.routing_table.notice(responder_id);
        }

        let reported = match response {
            ResponseSpecific::Neighbor { node, .. } => [Some(*node), None],
            ResponseSpecific::FindClosest {
                node, successor, ..
            } => [Some(*node), Some(*successor)],
            ResponseSpecific::Ack { .. } => [None, None],
        };

        for node in reported.into_iter().flatten() {
            self.learn_node(node, responder);
        }
    }

    fn on_lookup_reply(
        &mut self,
        query: QueryId,
        request: RequestTypeSpecific,
        result: Result<ResponseSpecific, Failure>,
    ) {
        let Some(pending) = self.lookups.get_mut(&query) else {
            return;
        };

        let step = match (request, result) {
            (RequestTypeSpecific::GetPredecessor, Err(failure)) => {
                debug!(?failure, "Lookup hint did not answer");
                pending.lookup.on_hint_failed()
            }
            (_, Err(failure)) => LookupStep::Failed(failure),
            (
                RequestTypeSpecific::FindClosestPredecessor { .. },
                Ok(ResponseSpecific::FindClosest {
                    node, successor, ..
                }),
            ) => pending.lookup.on_closest(ClosestReply {
                node: known(&self.locations, node),
                successor: known(&self.locations, successor),
            }),
            (RequestTypeSpecific::GetSuccessor, Ok(ResponseSpecific::Neighbor { node, .. })) => {
                pending.lookup.on_successor(known(&self.locations, node))
            }
            (RequestTypeSpecific::GetPredecessor, Ok(ResponseSpecific::Neighbor { node, .. })) => {
                pending.lookup.on_hint_predecessor(known(&self.locations, node))
            }
            (_, Ok(response)) => {
                debug!(?request, ?response, "Unexpected response to a lookup step");
                LookupStep::Failed(Failure::ProtocolError)
            }
        };

        self.advance(query, step);
    }

    /// Compare what a probed wedge entry reports with what we know, and tell it about
    /// a strictly better neighbour if we know one.
    fn on_probe_reply(&mut self, probe: Probe, response: ResponseSpecific) {
        let Probe::Neighbor { side, node, .. } = probe else {
            return;
        };
        let ResponseSpecific::Neighbor {
            node: reported, ..
        } = response
        else {
            return;
        };

        let ring = *self.routing_table.ring();
        let probed = ring.position(&node);
        let reported_position = ring.position(&reported.id);

        let candidate = match side {
            Side::Successor => self.routing_table.closest_preceding(probed),
            Side::Predecessor => self.routing_table.closest_succeeding(ring.add(probed, 1)),
        };

        if candidate == node || candidate == reported.id {
            return;
        }

        let candidate_position = ring.position(&candidate);

        let better = match side {
            Side::Successor => ring.between(reported_position, candidate_position, probed),
            Side::Predecessor => ring.between(probed, candidate_position, reported_position),
        };

        if !better {
            return;
        }

        let Some(candidate) = self.node_of(&candidate) else {
            return;
        };

        debug!(
            probed = ?node,
            ?reported,
            ?candidate,
            %side,
            "Alerting node of a closer neighbour"
        );

        self.call(
            node,
            RequestTypeSpecific::Alert { candidate },
            Purpose::Alert,
        );
    }
}

/// `node` as reported by `sender`, with the address `sender` was actually reached at
/// if it is reporting itself.
///
/// Nodes bound to an unspecified address advertise it, and nobody else can use it.
pub(super) fn observed(node: Node, sender: Node) -> Option<Node> {
    if node.id == sender.id {
        return Some(sender);
    }

    if node.address.ip().is_unspecified() {
        return None;
    }

    Some(node)
}

/// `node` with the address on record, if any.
fn known(locations: &LocationRegistry<Purpose>, node: Node) -> Node {
    locations.get(&node.id).map_or(node, |location| location.node())
}
