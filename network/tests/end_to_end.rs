use murmur_consistency::{FilterParams, FilterRoles};
use murmur_core::{
    AggregateFunction, AggregationKind, FilterKind, HashKind, Payload, PeerHandle, Value,
};
use murmur_network::{
    AggregationService, DirectorySampler, EpochProtocol, LinkModel, MemoryNetwork, ProtocolConfig,
    SelectionPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

fn config() -> ProtocolConfig {
    let params = |kind| FilterParams {
        kind,
        hash: HashKind::Triple,
        size: 4096,
        hash_count: 4,
    };
    ProtocolConfig {
        dissemination_interval_ms: 500,
        sampling_interval_ms: 500,
        sessions_per_interval: 2,
        sample_size: 3,
        unexploited_capacity: 16,
        outdated_capacity: 16,
        exploited_capacity: 16,
        policy: SelectionPolicy::Random,
        filters: FilterRoles {
            value_membership: params(FilterKind::Counting),
            collector_contact: params(FilterKind::Simple),
            source_contact: params(FilterKind::Simple),
            aggregate_membership: params(FilterKind::Counting),
        },
    }
}

fn spawn_peers(network: &Arc<MemoryNetwork>, n: usize) -> Vec<AggregationService> {
    (0..n)
        .map(|i| {
            let handle = PeerHandle::new(format!("10.0.0.{}", i));
            let inbox = network.register(handle.clone());
            let protocol = EpochProtocol::new(handle.clone(), config()).unwrap();
            let sampler = DirectorySampler::new(network.clone(), handle);
            AggregationService::spawn(protocol, network.clone(), inbox, Box::new(sampler))
        })
        .collect()
}

fn spawn_seeded_peers(
    network: &Arc<MemoryNetwork>,
    n: usize,
    seed: u64,
) -> Vec<AggregationService> {
    (0..n)
        .map(|i| {
            let handle = PeerHandle::new(format!("10.0.1.{}", i));
            let inbox = network.register(handle.clone());
            let peer_seed = seed + i as u64;
            let protocol = EpochProtocol::with_seed(handle.clone(), config(), peer_seed).unwrap();
            let sampler = DirectorySampler::with_seed(network.clone(), handle, peer_seed);
            AggregationService::spawn(protocol, network.clone(), inbox, Box::new(sampler))
        })
        .collect()
}

async fn scalar(service: &AggregationService, function: AggregateFunction) -> f64 {
    match service.get_aggregate(function).await {
        Some(Payload::Scalar(v)) => v,
        other => panic!("expected scalar, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_peers_converge_over_memory_network() {
    let link = LinkModel {
        min_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(50),
        loss: 0.0,
    };
    let network = Arc::new(MemoryNetwork::new(link));
    let services = spawn_peers(&network, 8);

    for (i, service) in services.iter().enumerate() {
        assert!(!service.is_active().await);
        let value = Value::scalar(i as f64 * 2.0);
        service
            .request_aggregation(AggregationKind::Scalar, vec![value.clone()], value)
            .await;
    }

    time::sleep(Duration::from_secs(120)).await;

    for service in &services {
        assert_eq!(scalar(service, AggregateFunction::Count).await, 8.0);
        assert_eq!(scalar(service, AggregateFunction::Sum).await, 56.0);
        assert_eq!(scalar(service, AggregateFunction::Avg).await, 7.0);
    }

    let snapshot = services[0].take_snapshot().await;
    assert!(snapshot.active);
    assert!(snapshot.sent.total() > 0);
    assert!(snapshot.outcomes.first >= 1);

    for service in services {
        service.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_restart_reconverges() {
    let network = Arc::new(MemoryNetwork::new(LinkModel::lossless(Duration::from_millis(10))));
    let services = spawn_peers(&network, 5);

    for service in &services {
        let value = Value::vector(vec![1.0, 2.0]);
        service
            .request_aggregation(AggregationKind::Vector, vec![value.clone()], value)
            .await;
    }
    time::sleep(Duration::from_secs(60)).await;

    for service in &services {
        let value = Value::vector(vec![3.0, 4.0]);
        service
            .request_aggregation(AggregationKind::Vector, vec![value.clone()], value)
            .await;
    }
    time::sleep(Duration::from_secs(60)).await;

    for service in &services {
        assert_eq!(service.epoch().await, 1);
        assert_eq!(
            service.get_aggregate(AggregateFunction::Sum).await,
            Some(Payload::Vector(vec![15.0, 20.0]))
        );
    }

    for service in services {
        service.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_partial_loss_never_double_counts() {
    let link = LinkModel {
        min_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(50),
        loss: 0.3,
    };
    let network = Arc::new(MemoryNetwork::with_seed(link, 21));
    let n = 8;
    let services = spawn_seeded_peers(&network, n, 300);

    // Values 1..=8, so every estimate must stay within [1, 8]
    for (i, service) in services.iter().enumerate() {
        let value = Value::scalar((i + 1) as f64);
        service
            .request_aggregation(AggregationKind::Scalar, vec![value.clone()], value)
            .await;
    }

    let mut unsuccessful = 0;
    for _ in 0..24 {
        time::sleep(Duration::from_secs(5)).await;
        for service in &services {
            let count = scalar(service, AggregateFunction::Count).await;
            assert!((1.0..=n as f64).contains(&count), "count {}", count);
            assert!(scalar(service, AggregateFunction::Sum).await <= 36.0);
            for function in [
                AggregateFunction::Avg,
                AggregateFunction::Min,
                AggregateFunction::Max,
            ] {
                let v = scalar(service, function).await;
                assert!((1.0..=8.0).contains(&v), "{} = {}", function.name(), v);
            }
            unsuccessful += service.take_snapshot().await.outcomes.unsuccessful;
        }
    }

    assert!(network.lost_count() > 0);
    // Lost acknowledgements leave contact histories disagreeing
    assert!(unsuccessful > 0);

    for service in services {
        service.shutdown().await;
    }
}
