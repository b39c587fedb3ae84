//! Networked signer mux.
//!
//! Maintains one connection per configured peer. Outbound announcements are
//! written as `topic(u8) || len(u32be) || payload` frames; peers stream back
//! `input_index(u32be) || len(u32be) || signature` frames which land on the
//! shared signature queue. Workers reconnect on failure.

use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::sleep,
};
use tracing::{info, warn};

use crate::{
    channel::{ChannelMux, SigMessage, SignerEvent},
    SigBags, SignerError, SignerMux,
};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const EVENT_BUFFER: usize = 64;
const MAX_SIG_LEN: u32 = 1024;

/// TCP-backed [`SignerMux`].
///
/// Must be created from within a tokio runtime; peer workers are spawned on
/// it and aborted when the mux is dropped.
#[derive(Debug)]
pub struct TcpMux {
    mux: ChannelMux,
    workers: Vec<JoinHandle<()>>,
}

impl TcpMux {
    /// Spawns one worker per peer address.
    pub fn connect(peers: &[String]) -> Self {
        let mux = ChannelMux::new(EVENT_BUFFER);
        let workers = peers
            .iter()
            .map(|peer| {
                let events = mux.subscribe();
                let sigs = mux.sig_sender();
                let peer = peer.clone();
                tokio::spawn(peer_loop(peer, events, sigs))
            })
            .collect();
        TcpMux { mux, workers }
    }
}

impl SignerMux for TcpMux {
    fn send_new_hash(&self, root: [u8; 32]) -> Result<(), SignerError> {
        self.mux.send_new_hash(root)
    }

    fn send_new_tx(&self, tx: Vec<u8>) -> Result<(), SignerError> {
        self.mux.send_new_tx(tx)
    }

    fn send_confirmed_hash(&self, root: [u8; 32]) -> Result<(), SignerError> {
        self.mux.send_confirmed_hash(root)
    }

    fn get_sigs(&self) -> SigBags {
        self.mux.get_sigs()
    }
}

impl Drop for TcpMux {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn peer_loop(
    peer: String,
    mut events: broadcast::Receiver<SignerEvent>,
    sigs: mpsc::UnboundedSender<SigMessage>,
) {
    loop {
        match TcpStream::connect(&peer).await {
            Ok(stream) => {
                info!(%peer, "connected to signer peer");
                if let Err(e) = run_peer(stream, &mut events, &sigs).await {
                    warn!(%peer, %e, "signer peer connection lost");
                }
            }
            Err(e) => {
                warn!(%peer, %e, "could not reach signer peer");
            }
        }
        sleep(RECONNECT_DELAY).await;
    }
}

async fn run_peer(
    stream: TcpStream,
    events: &mut broadcast::Receiver<SignerEvent>,
    sigs: &mpsc::UnboundedSender<SigMessage>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut read_task = tokio::spawn(read_loop(reader, sigs.clone()));

    let result = loop {
        tokio::select! {
            read_result = &mut read_task => {
                return read_result.unwrap_or(Ok(()));
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(e) = write_event(&mut writer, &event).await {
                        break Err(e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "peer writer lagged behind announcements");
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
        }
    };
    read_task.abort();
    result
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    sigs: mpsc::UnboundedSender<SigMessage>,
) -> std::io::Result<()> {
    loop {
        let input_index = reader.read_u32().await?;
        let len = reader.read_u32().await?;
        if len > MAX_SIG_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "signature frame too large",
            ));
        }
        let mut sig = vec![0u8; len as usize];
        reader.read_exact(&mut sig).await?;
        if sigs.send(SigMessage { input_index, sig }).is_err() {
            return Ok(());
        }
    }
}

async fn write_event(writer: &mut OwnedWriteHalf, event: &SignerEvent) -> std::io::Result<()> {
    let (topic, payload): (u8, &[u8]) = match event {
        SignerEvent::NewHash(root) => (0, root),
        SignerEvent::NewTx(tx) => (1, tx),
        SignerEvent::ConfirmedHash(root) => (2, root),
    };
    writer.write_u8(topic).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}
