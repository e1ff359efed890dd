//! Async runtime for one peer
//!
//! [`AggregationService`] drives an [`EpochProtocol`] with three tasks:
//! the inbound message loop, the dissemination ticker and the sampling
//! ticker. All of them go through one lock, so the protocol never sees two
//! callbacks at once.

use crate::epoch::EpochProtocol;
use crate::memory::Inbox;
use crate::measurements::MeasurementSnapshot;
use crate::protocol::{Envelope, Outbound};
use crate::ticker::JitteredTicker;
use crate::transport::{PeerSampler, Transport};
use murmur_core::{AggregateFunction, AggregationKind, Payload, PeerHandle, Value};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct AggregationService {
    handle: PeerHandle,
    protocol: Arc<Mutex<EpochProtocol>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl AggregationService {
    /// Start the three background tasks
    pub fn spawn(
        protocol: EpochProtocol,
        transport: Arc<dyn Transport>,
        inbox: Inbox,
        sampler: Box<dyn PeerSampler>,
    ) -> Self {
        let handle = protocol.handle().clone();
        let dissemination = JitteredTicker::new(protocol.config().dissemination_interval());
        let sampling = JitteredTicker::new(protocol.config().sampling_interval());
        let protocol = Arc::new(Mutex::new(protocol));
        let (shutdown, _) = watch::channel(false);

        let tasks = vec![
            tokio::spawn(inbound_loop(
                protocol.clone(),
                transport.clone(),
                inbox,
                shutdown.subscribe(),
            )),
            tokio::spawn(dissemination_loop(
                protocol.clone(),
                transport,
                dissemination,
                shutdown.subscribe(),
            )),
            tokio::spawn(sampling_loop(
                protocol.clone(),
                sampler,
                sampling,
                shutdown.subscribe(),
            )),
        ];
        info!(peer = %handle, "Aggregation service started");

        Self {
            handle,
            protocol,
            shutdown,
            tasks,
        }
    }

    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }

    pub async fn request_aggregation(
        &self,
        kind: AggregationKind,
        possible: Vec<Value>,
        selected: Value,
    ) {
        self.protocol
            .lock()
            .await
            .request_aggregation(kind, possible, selected);
    }

    pub async fn change_selected_value(&self, value: Value) {
        self.protocol.lock().await.change_selected_value(value);
    }

    pub async fn is_active(&self) -> bool {
        self.protocol.lock().await.is_active()
    }

    pub async fn epoch(&self) -> u64 {
        self.protocol.lock().await.epoch()
    }

    pub async fn get_aggregate(&self, function: AggregateFunction) -> Option<Payload> {
        self.protocol.lock().await.get_aggregate(function)
    }

    pub async fn take_snapshot(&self) -> MeasurementSnapshot {
        self.protocol.lock().await.take_snapshot()
    }

    /// Stop every task and wait for them to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        futures::future::join_all(self.tasks).await;
        info!(peer = %self.handle, "Aggregation service stopped");
    }
}

fn dispatch(transport: &dyn Transport, outbound: Outbound) {
    let kind = outbound.envelope.kind();
    let bytes = match outbound.envelope.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(to = %outbound.to, error = %e, "Cannot encode envelope");
            return;
        }
    };
    if let Err(e) = transport.send(&outbound.to, bytes) {
        debug!(to = %outbound.to, kind = %kind, error = %e, "Send failed");
    }
}

async fn inbound_loop(
    protocol: Arc<Mutex<EpochProtocol>>,
    transport: Arc<dyn Transport>,
    mut inbox: Inbox,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let bytes = tokio::select! {
            _ = shutdown.changed() => break,
            received = inbox.recv() => match received {
                Some(bytes) => bytes,
                None => break,
            },
        };

        let envelope = match Envelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "Ignoring undecodable message");
                continue;
            }
        };

        let reply = protocol.lock().await.handle_message(envelope);
        if let Some(reply) = reply {
            dispatch(transport.as_ref(), reply);
        }
    }
}

async fn dissemination_loop(
    protocol: Arc<Mutex<EpochProtocol>>,
    transport: Arc<dyn Transport>,
    mut ticker: JitteredTicker,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let pushes = protocol.lock().await.disseminate();
        for push in pushes {
            dispatch(transport.as_ref(), push);
        }
    }
}

async fn sampling_loop(
    protocol: Arc<Mutex<EpochProtocol>>,
    mut sampler: Box<dyn PeerSampler>,
    mut ticker: JitteredTicker,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        protocol.lock().await.sample_from(sampler.as_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::memory::{DirectorySampler, LinkModel, MemoryNetwork};
    use std::time::Duration;
    use tokio::time;

    async fn start(network: &Arc<MemoryNetwork>, name: &str, value: f64) -> AggregationService {
        let handle = PeerHandle::from(name);
        let inbox = network.register(handle.clone());
        let protocol = EpochProtocol::new(handle.clone(), test_config()).unwrap();
        let sampler = DirectorySampler::new(network.clone(), handle);
        let service =
            AggregationService::spawn(protocol, network.clone(), inbox, Box::new(sampler));
        let value = Value::scalar(value);
        service
            .request_aggregation(AggregationKind::Scalar, vec![value.clone()], value)
            .await;
        service
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_peers_converge() {
        let network = Arc::new(MemoryNetwork::new(LinkModel::lossless(Duration::from_millis(10))));
        let a = start(&network, "a", 1.0).await;
        let b = start(&network, "b", 3.0).await;

        time::sleep(Duration::from_secs(30)).await;

        for service in [&a, &b] {
            assert_eq!(
                service.get_aggregate(AggregateFunction::Count).await,
                Some(Payload::Scalar(2.0))
            );
            assert_eq!(
                service.get_aggregate(AggregateFunction::Sum).await,
                Some(Payload::Scalar(4.0))
            );
        }

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_is_ignored() {
        let network = Arc::new(MemoryNetwork::new(LinkModel::lossless(Duration::ZERO)));
        let a = start(&network, "a", 1.0).await;
        network.send(&PeerHandle::from("a"), vec![0xde, 0xad]).unwrap();
        time::sleep(Duration::from_secs(1)).await;

        assert!(a.is_active().await);
        assert_eq!(a.epoch().await, 0);
        a.shutdown().await;
    }
}
