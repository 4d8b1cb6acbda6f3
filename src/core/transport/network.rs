use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Address, Frame};
use crate::error::TransportError;

/// Something frames can be pushed to.
///
/// Components never hold a raw channel for a peer, only this capability. The
/// coordinator keeps one per registered worker and workers keep one for the
/// coordinator.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// The address frames pushed here are delivered to.
    fn address(&self) -> Address;

    /// Largest frame payload this endpoint accepts.
    fn max_frame_bytes(&self) -> usize;

    /// Pushes one frame without waiting for delivery.
    fn push(&self, frame: Frame) -> Result<(), TransportError>;

    /// Resolves once the receiving side has gone away.
    async fn closed(&self);

    fn is_closed(&self) -> bool;
}

/// [`Endpoint`] backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    address: Address,
    max_frame_bytes: usize,
    tx: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl Endpoint for ChannelEndpoint {
    fn address(&self) -> Address {
        self.address
    }

    fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    fn push(&self, frame: Frame) -> Result<(), TransportError> {
        if frame.payload_len() > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                size: frame.payload_len(),
                limit: self.max_frame_bytes,
            });
        }
        self.tx
            .send(frame)
            .map_err(|_| TransportError::EndpointClosed(self.address))
    }

    async fn closed(&self) {
        self.tx.closed().await
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The messaging substrate: an address directory of frame channels with a
/// fixed per-frame size ceiling.
#[derive(Clone)]
pub struct Network {
    routes: Arc<RwLock<HashMap<Address, mpsc::UnboundedSender<Frame>>>>,
    max_frame_bytes: usize,
}

impl Network {
    pub fn new(max_frame_bytes: usize) -> Self {
        Network {
            routes: Arc::new(RwLock::new(HashMap::new())),
            max_frame_bytes,
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Binds `address` and returns the inbound frame stream for it.
    ///
    /// An address whose previous receiver was dropped can be bound again.
    pub fn bind(&self, address: Address) -> Result<mpsc::UnboundedReceiver<Frame>, TransportError> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = routes.get(&address) {
            if !existing.is_closed() {
                return Err(TransportError::AddressInUse(address));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        routes.insert(address, tx);
        log::debug!("Bound endpoint {}", address);
        Ok(rx)
    }

    /// Looks up a delivery capability for `address`.
    pub fn resolve(&self, address: Address) -> Result<Arc<dyn Endpoint>, TransportError> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let tx = routes
            .get(&address)
            .cloned()
            .ok_or(TransportError::UnknownAddress(address))?;
        Ok(Arc::new(ChannelEndpoint {
            address,
            max_frame_bytes: self.max_frame_bytes,
            tx,
        }))
    }

    pub fn unbind(&self, address: Address) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        routes.remove(&address).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn frame(sender: Address, recipient: Address, payload: Vec<u8>) -> Frame {
        Frame {
            message_id: Uuid::new_v4(),
            sequence: 0,
            total: 1,
            sender,
            recipient,
            payload,
        }
    }

    #[tokio::test]
    async fn test_bind_resolve_and_push() {
        let network = Network::new(16);
        let addr = Address::random();
        let mut rx = network.bind(addr).unwrap();

        let endpoint = network.resolve(addr).unwrap();
        assert_eq!(endpoint.address(), addr);
        assert_eq!(endpoint.max_frame_bytes(), 16);

        endpoint
            .push(frame(Address::random(), addr, b"hello".to_vec()))
            .unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload, b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_push_rejects_oversized_frame() {
        let network = Network::new(4);
        let addr = Address::random();
        let _rx = network.bind(addr).unwrap();
        let endpoint = network.resolve(addr).unwrap();

        let err = endpoint
            .push(frame(Address::random(), addr, vec![0u8; 5]))
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::FrameTooLarge { size: 5, limit: 4 }
        ));
    }

    #[tokio::test]
    async fn test_bind_twice_fails_while_alive() {
        let network = Network::new(8);
        let addr = Address::random();
        let rx = network.bind(addr).unwrap();
        assert!(matches!(
            network.bind(addr),
            Err(TransportError::AddressInUse(_))
        ));

        drop(rx);
        assert!(network.bind(addr).is_ok());
    }

    #[tokio::test]
    async fn test_resolve_unknown_address() {
        let network = Network::new(8);
        assert!(matches!(
            network.resolve(Address::random()),
            Err(TransportError::UnknownAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_resolves_when_receiver_dropped() {
        let network = Network::new(8);
        let addr = Address::random();
        let rx = network.bind(addr).unwrap();
        let endpoint = network.resolve(addr).unwrap();
        assert!(!endpoint.is_closed());

        drop(rx);
        endpoint.closed().await;
        assert!(endpoint.is_closed());
        assert!(matches!(
            endpoint.push(frame(Address::random(), addr, vec![1])),
            Err(TransportError::EndpointClosed(_))
        ));
    }

    #[test]
    fn test_unbind() {
        let network = Network::new(8);
        let addr = Address::random();
        let _rx = network.bind(addr).unwrap();
        assert!(network.unbind(addr));
        assert!(!network.unbind(addr));
    }
}
