//! Compile-time prelude coverage test.
use headroom::prelude::*;
use std::time::Duration;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let config = GateConfig::builder()
        .threshold_percent(90.0)
        .freeze_policy(FreezePolicy::Minutes)
        .build()
        .expect("valid config");
    let _cache: DecayingCache<ResourceKey> =
        DecayingCache::new(8, DecayConfig::new(1.0, Duration::from_secs(1), 0.0).unwrap())
            .expect("valid cache");
    let gate = UsageGate::new(config).expect("valid gate");

    let layer = UsageGateLayer::new(gate, |_req: &()| vec![ResourceKey::app_usage()]);
    let mut svc =
        layer.layer(service_fn(|_req: ()| async { Ok::<_, std::io::Error>(UsageReport::new()) }));
    svc.call(()).await.expect("service call failed");
    let _ = presets::conservative();
    let _ = UsageCategory::Pages;
}
