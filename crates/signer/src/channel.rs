//! In-process signer mux backed by tokio channels.
//!
//! Outbound events fan out over a broadcast channel that peer workers (or
//! tests) subscribe to; inbound signatures are buffered on an unbounded
//! queue that [`SignerMux::get_sigs`] drains without blocking.

use std::sync::Mutex;

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::{InputSig, SigBags, SignerError, SignerMux};

/// One outbound announcement to the signer quorum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerEvent {
    /// The next commitment root to sign for.
    NewHash([u8; 32]),

    /// A serialised unsigned transaction awaiting signatures.
    NewTx(Vec<u8>),

    /// The previous attestation has confirmed under this root.
    ConfirmedHash([u8; 32]),
}

/// One inbound signature for a transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigMessage {
    /// Input the signature applies to.
    pub input_index: u32,

    /// DER-encoded signature bytes, sighash byte included.
    pub sig: Vec<u8>,
}

/// Channel-backed [`SignerMux`].
#[derive(Debug)]
pub struct ChannelMux {
    events: broadcast::Sender<SignerEvent>,
    // keeps the broadcast channel open while no peer is subscribed
    _keepalive: broadcast::Receiver<SignerEvent>,
    sig_tx: mpsc::UnboundedSender<SigMessage>,
    sig_rx: Mutex<mpsc::UnboundedReceiver<SigMessage>>,
}

impl ChannelMux {
    /// Creates a mux whose broadcast side buffers up to `capacity` events
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (events, keepalive) = broadcast::channel(capacity);
        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        ChannelMux {
            events,
            _keepalive: keepalive,
            sig_tx,
            sig_rx: Mutex::new(sig_rx),
        }
    }

    /// Subscribes a peer worker to the outbound event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SignerEvent> {
        self.events.subscribe()
    }

    /// Returns a sender peers use to deliver signatures.
    pub fn sig_sender(&self) -> mpsc::UnboundedSender<SigMessage> {
        self.sig_tx.clone()
    }

    fn publish(&self, event: SignerEvent) -> Result<(), SignerError> {
        self.events
            .send(event)
            .map(|_| ())
            .map_err(|_| SignerError::TransportClosed)
    }

    fn discard_pending_sigs(&self) {
        let mut queue = self.sig_rx.lock().expect("sig queue lock poisoned");
        let mut discarded = 0usize;
        while queue.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "dropped signatures for a stale announcement");
        }
    }
}

impl SignerMux for ChannelMux {
    fn send_new_hash(&self, root: [u8; 32]) -> Result<(), SignerError> {
        self.publish(SignerEvent::NewHash(root))
    }

    fn send_new_tx(&self, tx: Vec<u8>) -> Result<(), SignerError> {
        // peers discard older unsigned-tx announcements, so any queued
        // signatures are stale by definition
        self.discard_pending_sigs();
        self.publish(SignerEvent::NewTx(tx))
    }

    fn send_confirmed_hash(&self, root: [u8; 32]) -> Result<(), SignerError> {
        self.publish(SignerEvent::ConfirmedHash(root))
    }

    fn get_sigs(&self) -> SigBags {
        let mut queue = self.sig_rx.lock().expect("sig queue lock poisoned");
        let mut bags = SigBags::new();
        while let Ok(message) = queue.try_recv() {
            bags.entry(message.input_index)
                .or_default()
                .push(InputSig(message.sig));
        }
        bags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_fan_out_to_subscribers() {
        let mux = ChannelMux::new(16);
        let mut peer_a = mux.subscribe();
        let mut peer_b = mux.subscribe();

        mux.send_new_hash([7; 32]).unwrap();
        mux.send_confirmed_hash([9; 32]).unwrap();

        for peer in [&mut peer_a, &mut peer_b] {
            assert_eq!(peer.recv().await.unwrap(), SignerEvent::NewHash([7; 32]));
            assert_eq!(
                peer.recv().await.unwrap(),
                SignerEvent::ConfirmedHash([9; 32])
            );
        }
    }

    #[tokio::test]
    async fn sigs_grouped_by_input() {
        let mux = ChannelMux::new(16);
        let sigs = mux.sig_sender();

        sigs.send(SigMessage {
            input_index: 0,
            sig: vec![1],
        })
        .unwrap();
        sigs.send(SigMessage {
            input_index: 1,
            sig: vec![2],
        })
        .unwrap();
        sigs.send(SigMessage {
            input_index: 0,
            sig: vec![3],
        })
        .unwrap();

        let bags = mux.get_sigs();
        assert_eq!(bags[&0], vec![InputSig(vec![1]), InputSig(vec![3])]);
        assert_eq!(bags[&1], vec![InputSig(vec![2])]);

        // the queue was drained
        assert!(mux.get_sigs().is_empty());
    }

    #[tokio::test]
    async fn new_tx_discards_stale_sigs() {
        let mux = ChannelMux::new(16);
        let sigs = mux.sig_sender();

        sigs.send(SigMessage {
            input_index: 0,
            sig: vec![1],
        })
        .unwrap();
        mux.send_new_tx(vec![0xca, 0xfe]).unwrap();

        sigs.send(SigMessage {
            input_index: 0,
            sig: vec![2],
        })
        .unwrap();

        let bags = mux.get_sigs();
        assert_eq!(bags[&0], vec![InputSig(vec![2])]);
    }
}
