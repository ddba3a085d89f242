//! AsyncChord node.

use crate::actor::Info;
use crate::chord::{ActorMessage, Chord, ChordWasShutdown, LookupError};
use crate::common::{Node, RingPosition};
use crate::core::join::{JoinError, JoinReport};
use crate::core::lookup::LookupResponse;

impl Chord {
    /// Return an async version of the Chord node.
    pub fn as_async(self) -> AsyncChord {
        AsyncChord(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the Chord node.
pub struct AsyncChord(Chord);

impl AsyncChord {
    // === Getters ===

    /// Information and statistics about this [Chord] node.
    pub async fn info(&self) -> Result<Info, ChordWasShutdown> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0
             .0
            .send(ActorMessage::Info(sender))
            .map_err(|_| ChordWasShutdown)?;

        receiver.recv_async().await.map_err(|_| ChordWasShutdown)
    }

    // === Public Methods ===

    /// Shutdown the actor thread loop.
    pub async fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0 .0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv_async().await;
    }

    /// Async version of [Chord::find_successor].
    pub async fn find_successor(&self, target: RingPosition) -> Result<LookupResponse, LookupError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::FindSuccessor(target, sender))
            .map_err(|_| ChordWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| ChordWasShutdown)??)
    }

    /// Async version of [Chord::find_predecessor].
    pub async fn find_predecessor(
        &self,
        target: RingPosition,
    ) -> Result<LookupResponse, LookupError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::FindPredecessor(target, sender))
            .map_err(|_| ChordWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| ChordWasShutdown)??)
    }

    /// Async version of [Chord::get_successor].
    pub async fn get_successor(&self, node: Node) -> Result<Node, LookupError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::GetSuccessor(node, sender))
            .map_err(|_| ChordWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| ChordWasShutdown)??)
    }

    /// Async version of [Chord::get_predecessor].
    pub async fn get_predecessor(&self, node: Node) -> Result<Node, LookupError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::GetPredecessor(node, sender))
            .map_err(|_| ChordWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| ChordWasShutdown)??)
    }

    /// Async version of [Chord::join].
    pub async fn join(&self, bootstrap: Node) -> Result<JoinReport, JoinError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::Join(bootstrap, sender))
            .map_err(|_| JoinError::Shutdown)?;

        receiver.recv_async().await.map_err(|_| JoinError::Shutdown)?
    }

    /// Async version of [Chord::joined].
    pub async fn joined(&self) -> Result<JoinReport, JoinError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::Joined(sender))
            .map_err(|_| JoinError::Shutdown)?;

        receiver.recv_async().await.map_err(|_| JoinError::Shutdown)?
    }

    /// Async version of [Chord::stabilize].
    pub async fn stabilize(&self) -> Result<(), ChordWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::Stabilize(sender))
            .map_err(|_| ChordWasShutdown)?;

        receiver.recv_async().await.map_err(|_| ChordWasShutdown)
    }
}
