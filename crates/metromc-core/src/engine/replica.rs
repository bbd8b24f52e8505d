//! Point-to-point transport between replicas of a parallel-tempering run.
//!
//! Every exchange is symmetric: both partners send first and then block on the receive, so a
//! round completes only when both directions have arrived. Any failure is fatal for the run.

use crate::core::models::particle::Particle;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReplicaError {
    #[error("Replica {partner} disconnected")]
    Disconnected { partner: usize },

    #[error("Timed out after {timeout:?} waiting for replica {partner}")]
    Timeout { partner: usize, timeout: Duration },

    #[error("Replica {partner} sent an unusable volume of {volume}")]
    VolumeOutOfRange { partner: usize, volume: f64 },

    #[error("Replica {partner} sent {received} particles, expected {expected}")]
    ParticleCountMismatch {
        partner: usize,
        expected: usize,
        received: usize,
    },

    #[error("Unexpected message from replica {partner}")]
    UnexpectedMessage { partner: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaPayload {
    pub particles: Vec<Particle>,
    pub volume: f64,
}

pub trait ReplicaTransport: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sends `payload` to `partner` and returns the partner's payload.
    fn exchange_configuration(
        &mut self,
        partner: usize,
        payload: ReplicaPayload,
    ) -> Result<ReplicaPayload, ReplicaError>;

    /// Sends `value` to `partner` and returns the partner's value.
    fn exchange_scalar(&mut self, partner: usize, value: f64) -> Result<f64, ReplicaError>;
}

#[derive(Debug)]
enum Message {
    Configuration(ReplicaPayload),
    Scalar(f64),
}

/// In-process transport over `std::sync::mpsc` channels, one per ordered pair of replicas.
pub struct ChannelTransport {
    rank: usize,
    size: usize,
    outgoing: Vec<Option<Sender<Message>>>,
    incoming: Vec<Option<Receiver<Message>>>,
    timeout: Option<Duration>,
}

impl ChannelTransport {
    /// Fully connected mesh of `size` endpoints; endpoint `k` has rank `k`.
    pub fn mesh(size: usize, timeout: Option<Duration>) -> Vec<ChannelTransport> {
        let mut endpoints: Vec<ChannelTransport> = (0..size)
            .map(|rank| ChannelTransport {
                rank,
                size,
                outgoing: (0..size).map(|_| None).collect(),
                incoming: (0..size).map(|_| None).collect(),
                timeout,
            })
            .collect();
        for from in 0..size {
            for to in (0..size).filter(|&to| to != from) {
                let (tx, rx) = mpsc::channel();
                endpoints[from].outgoing[to] = Some(tx);
                endpoints[to].incoming[from] = Some(rx);
            }
        }
        endpoints
    }

    fn send(&self, partner: usize, message: Message) -> Result<(), ReplicaError> {
        self.outgoing
            .get(partner)
            .and_then(Option::as_ref)
            .ok_or(ReplicaError::Disconnected { partner })?
            .send(message)
            .map_err(|_| ReplicaError::Disconnected { partner })
    }

    fn receive(&self, partner: usize) -> Result<Message, ReplicaError> {
        let rx = self
            .incoming
            .get(partner)
            .and_then(Option::as_ref)
            .ok_or(ReplicaError::Disconnected { partner })?;
        match self.timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => ReplicaError::Timeout { partner, timeout },
                RecvTimeoutError::Disconnected => ReplicaError::Disconnected { partner },
            }),
            None => rx.recv().map_err(|_| ReplicaError::Disconnected { partner }),
        }
    }
}

impl ReplicaTransport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn exchange_configuration(
        &mut self,
        partner: usize,
        payload: ReplicaPayload,
    ) -> Result<ReplicaPayload, ReplicaError> {
        self.send(partner, Message::Configuration(payload))?;
        match self.receive(partner)? {
            Message::Configuration(received) => Ok(received),
            Message::Scalar(_) => Err(ReplicaError::UnexpectedMessage { partner }),
        }
    }

    fn exchange_scalar(&mut self, partner: usize, value: f64) -> Result<f64, ReplicaError> {
        self.send(partner, Message::Scalar(value))?;
        match self.receive(partner)? {
            Message::Scalar(received) => Ok(received),
            Message::Configuration(_) => Err(ReplicaError::UnexpectedMessage { partner }),
        }
    }
}
