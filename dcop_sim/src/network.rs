//! Simulated message delivery.
//!
//! Two transports, same guarantee: per-link FIFO and exactly-once delivery.
//! - [`LinkRouter`]: synchronous router used by `SimWorld`; cross-link
//!   interleaving is either global send order or seeded random
//! - [`ChannelTransport`]: one tokio mpsc inbox per agent, used by the
//!   actor runtime

use async_trait::async_trait;
use dcop_env::{AgentId, EnvError, Envelope, NetworkTransport, Recipient};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

/// How the router interleaves messages on different links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryOrder {
    /// Global send order
    #[default]
    Fifo,
    /// A random non-empty link at every step
    Shuffled,
}

impl std::str::FromStr for DeliveryOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fifo" => Ok(DeliveryOrder::Fifo),
            "shuffled" | "shuffle" | "random" => Ok(DeliveryOrder::Shuffled),
            _ => Err(format!("Unknown delivery order: {}", s)),
        }
    }
}

/// A message waiting in the router.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlight<M> {
    /// Global send sequence number
    pub seq: u64,
    pub from: AgentId,
    pub to: AgentId,
    pub body: M,
}

/// Central router holding one FIFO queue per (sender, receiver) link.
#[derive(Debug)]
pub struct LinkRouter<M> {
    order: DeliveryOrder,
    links: BTreeMap<(AgentId, AgentId), VecDeque<InFlight<M>>>,
    next_seq: u64,
    pending: usize,
}

impl<M: Clone> LinkRouter<M> {
    /// Creates an empty router.
    pub fn new(order: DeliveryOrder) -> Self {
        Self {
            order,
            links: BTreeMap::new(),
            next_seq: 0,
            pending: 0,
        }
    }

    /// Queues one point-to-point message.
    pub fn push(&mut self, from: AgentId, to: AgentId, body: M) {
        let msg = InFlight {
            seq: self.next_seq,
            from,
            to,
            body,
        };
        self.next_seq += 1;
        self.pending += 1;
        self.links.entry((from, to)).or_default().push_back(msg);
    }

    /// Queues an envelope, fanning broadcasts out to `n` agents.
    pub fn push_envelope(&mut self, envelope: Envelope<M>, n: usize) {
        let from = envelope.from;
        for (to, body) in envelope.fan_out(n) {
            self.push(from, to, body);
        }
    }

    /// Takes the next message to deliver.
    ///
    /// Only link heads are candidates, so per-link order always holds.
    pub fn pop<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<InFlight<M>> {
        let link = match self.order {
            DeliveryOrder::Fifo => self
                .links
                .iter()
                .filter_map(|(link, q)| q.front().map(|m| (m.seq, *link)))
                .min()
                .map(|(_, link)| link)?,
            DeliveryOrder::Shuffled => {
                let live: Vec<(AgentId, AgentId)> = self
                    .links
                    .iter()
                    .filter(|(_, q)| !q.is_empty())
                    .map(|(link, _)| *link)
                    .collect();
                if live.is_empty() {
                    return None;
                }
                live[rng.gen_range(0..live.len())]
            }
        };

        let queue = self.links.get_mut(&link)?;
        let msg = queue.pop_front()?;
        if queue.is_empty() {
            self.links.remove(&link);
        }
        self.pending -= 1;
        Some(msg)
    }

    /// Number of undelivered messages.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Returns true when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }
}

/// Network interface of one actor: its own inbox plus senders to all peers.
pub struct ChannelTransport<M> {
    /// This agent's id
    local_id: AgentId,

    /// Senders into every agent's inbox, indexed by id
    peers: Arc<Vec<mpsc::UnboundedSender<Envelope<M>>>>,

    /// Receiver for incoming envelopes (behind tokio mutex for async)
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope<M>>>,
}

impl<M: Send + 'static> ChannelTransport<M> {
    /// Builds a fully connected mesh of `n` transports.
    pub fn mesh(n: usize) -> Vec<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..n).map(|_| mpsc::unbounded_channel()).unzip();
        let peers = Arc::new(senders);

        receivers
            .into_iter()
            .enumerate()
            .map(|(i, rx)| Self {
                local_id: AgentId(i),
                peers: Arc::clone(&peers),
                inbox: tokio::sync::Mutex::new(rx),
            })
            .collect()
    }

    /// Number of agents in the mesh.
    pub fn agents(&self) -> usize {
        self.peers.len()
    }

    /// Sends every recipient of `envelope` its copy.
    pub async fn deliver(&self, envelope: Envelope<M>) -> Result<usize, EnvError>
    where
        M: Clone,
    {
        let from = envelope.from;
        let copies = envelope.fan_out(self.agents());
        let count = copies.len();
        for (to, body) in copies {
            self.send(to, Envelope::new(from, Recipient::Agent(to), body))
                .await?;
        }
        Ok(count)
    }
}

#[async_trait]
impl<M: Send + 'static> NetworkTransport<M> for ChannelTransport<M> {
    async fn send(&self, target: AgentId, envelope: Envelope<M>) -> Result<(), EnvError> {
        let peer = self
            .peers
            .get(target.0)
            .ok_or(EnvError::UnknownAgent(target))?;
        peer.send(envelope)
            .map_err(|_| EnvError::closed(format!("inbox of {} dropped", target)))
    }

    async fn recv(&self) -> Option<Envelope<M>> {
        let mut rx = self.inbox.lock().await;
        rx.recv().await
    }

    fn local_id(&self) -> AgentId {
        self.local_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn drain(router: &mut LinkRouter<u32>, seed: u64) -> Vec<(AgentId, AgentId, u32)> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        std::iter::from_fn(|| router.pop(&mut rng).map(|m| (m.from, m.to, m.body))).collect()
    }

    fn loaded(order: DeliveryOrder) -> LinkRouter<u32> {
        let mut router = LinkRouter::new(order);
        for i in 0..20 {
            router.push(AgentId(0), AgentId(1), i);
            router.push(AgentId(2), AgentId(1), 100 + i);
            router.push(AgentId(0), AgentId(2), 200 + i);
        }
        router
    }

    #[test]
    fn test_fifo_is_global_send_order() {
        let mut router = loaded(DeliveryOrder::Fifo);
        let bodies: Vec<u32> = drain(&mut router, 0).into_iter().map(|m| m.2).collect();
        assert_eq!(&bodies[..4], &[0, 100, 200, 1]);
        assert!(router.is_empty());
    }

    #[test]
    fn test_shuffled_keeps_per_link_order() {
        let mut router = loaded(DeliveryOrder::Shuffled);
        assert_eq!(router.pending(), 60);
        let delivered = drain(&mut router, 3);
        assert_eq!(delivered.len(), 60);

        for link in [(0, 1), (2, 1), (0, 2)] {
            let seq: Vec<u32> = delivered
                .iter()
                .filter(|m| (m.0 .0, m.1 .0) == link)
                .map(|m| m.2)
                .collect();
            let mut sorted = seq.clone();
            sorted.sort_unstable();
            assert_eq!(seq, sorted);
        }
    }

    #[test]
    fn test_shuffled_is_seeded() {
        let a = drain(&mut loaded(DeliveryOrder::Shuffled), 9);
        let b = drain(&mut loaded(DeliveryOrder::Shuffled), 9);
        assert_eq!(a, b);
        assert_ne!(a, drain(&mut loaded(DeliveryOrder::Fifo), 9));
    }

    #[test]
    fn test_broadcast_fan_out() {
        let mut router = LinkRouter::new(DeliveryOrder::Fifo);
        router.push_envelope(Envelope::new(AgentId(1), Recipient::Broadcast, 7u32), 4);
        let targets: Vec<AgentId> = drain(&mut router, 0).into_iter().map(|m| m.1).collect();
        assert_eq!(targets, vec![AgentId(0), AgentId(2), AgentId(3)]);
    }

    #[tokio::test]
    async fn test_channel_mesh_delivers_in_link_order() {
        let mesh = ChannelTransport::<u32>::mesh(3);
        for i in 0..5 {
            let env = Envelope::new(AgentId(0), Recipient::Agent(AgentId(2)), i);
            mesh[0].send(AgentId(2), env).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(mesh[2].recv().await.unwrap().body, i);
        }
        assert_eq!(mesh[2].local_id(), AgentId(2));
        assert!(matches!(
            mesh[0].send(AgentId(9), Envelope::new(AgentId(0), Recipient::Broadcast, 0)).await,
            Err(EnvError::UnknownAgent(AgentId(9)))
        ));
    }

    #[tokio::test]
    async fn test_channel_broadcast_skips_sender() {
        let mesh = ChannelTransport::<u32>::mesh(3);
        let sent = mesh[1]
            .deliver(Envelope::new(AgentId(1), Recipient::Broadcast, 5))
            .await
            .unwrap();
        assert_eq!(sent, 2);
        assert_eq!(mesh[0].recv().await.unwrap().body, 5);
        assert_eq!(mesh[2].recv().await.unwrap().from, AgentId(1));
    }
}
