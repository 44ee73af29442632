//! Tower middleware that puts a [`UsageGate`] in front of a service.
//!
//! Each request is mapped to the resource keys it will consume, waits for
//! admission, runs, and if the response carries usage data it is fed back
//! through [`UsageGate::report_and_wake`]. Broken usage data is logged and the
//! response still goes to the caller.

use crate::gate::UsageGate;
use crate::key::ResourceKey;
use crate::report::UsageReport;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Responses that can carry a server usage snapshot.
pub trait ReportsUsage {
    fn usage_report(&self) -> Option<UsageReport>;
}

impl ReportsUsage for UsageReport {
    fn usage_report(&self) -> Option<UsageReport> {
        Some(self.clone())
    }
}

impl<T: ReportsUsage, E> ReportsUsage for Result<T, E> {
    fn usage_report(&self) -> Option<UsageReport> {
        self.as_ref().ok().and_then(ReportsUsage::usage_report)
    }
}

/// A layer that gates requests on reported usage.
pub struct UsageGateLayer<F> {
    gate: UsageGate,
    keys: Arc<F>,
}

impl<F> UsageGateLayer<F> {
    /// `keys` maps a request to the resource keys it consumes.
    pub fn new(gate: UsageGate, keys: F) -> Self {
        Self { gate, keys: Arc::new(keys) }
    }
}

impl<F> Clone for UsageGateLayer<F> {
    fn clone(&self) -> Self {
        Self { gate: self.gate.clone(), keys: self.keys.clone() }
    }
}

impl<F> std::fmt::Debug for UsageGateLayer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageGateLayer").field("gate", &self.gate).finish_non_exhaustive()
    }
}

impl<S, F> Layer<S> for UsageGateLayer<F> {
    type Service = UsageGateService<S, F>;

    fn layer(&self, service: S) -> Self::Service {
        UsageGateService { inner: service, gate: self.gate.clone(), keys: self.keys.clone() }
    }
}

/// Middleware service produced by [`UsageGateLayer`].
pub struct UsageGateService<S, F> {
    inner: S,
    gate: UsageGate,
    keys: Arc<F>,
}

impl<S: Clone, F> Clone for UsageGateService<S, F> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), gate: self.gate.clone(), keys: self.keys.clone() }
    }
}

impl<S: std::fmt::Debug, F> std::fmt::Debug for UsageGateService<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageGateService")
            .field("inner", &self.inner)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl<S, F, Req> Service<Req> for UsageGateService<S, F>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: ReportsUsage,
    F: Fn(&Req) -> Vec<ResourceKey> + Send + Sync + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let keys = (self.keys)(&req);
        let gate = self.gate.clone();
        // Take the instance that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            gate.acquire(&keys).await;
            let response = inner.call(req).await?;
            if let Some(report) = response.usage_report() {
                if let Err(error) = gate.report_and_wake(&report) {
                    tracing::warn!(
                        target: "headroom::middleware",
                        error = %error,
                        "ignoring bad usage data on response"
                    );
                }
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Debug, Clone)]
    struct Reply {
        headers: Vec<(String, String)>,
    }

    impl ReportsUsage for Reply {
        fn usage_report(&self) -> Option<UsageReport> {
            Some(UsageReport::from_headers(self.headers.iter().map(|(k, v)| (k, v.clone()))))
        }
    }

    fn reply(pct: u32) -> Reply {
        let body = serde_json::json!({
            "act_9": [{
                "type": "ads_insights",
                "call_count": pct,
                "total_cputime": 0,
                "total_time": 0,
                "estimated_time_to_regain_access": 0,
            }]
        });
        Reply { headers: vec![("x-business-use-case-usage".into(), body.to_string())] }
    }

    fn keys_for(entity: &&'static str) -> Vec<ResourceKey> {
        vec![ResourceKey::usage(*entity, "ads_insights")]
    }

    #[tokio::test]
    async fn response_usage_is_fed_back() {
        let cfg = GateConfig::builder().threshold_percent(50.0).build().unwrap();
        let gate = UsageGate::new(cfg).unwrap();
        let svc =
            tower::service_fn(|_req: &'static str| async { Ok::<_, std::io::Error>(reply(70)) });
        let svc = UsageGateLayer::new(gate.clone(), keys_for).layer(svc);

        svc.clone().oneshot("act_9").await.unwrap();
        let key = ResourceKey::usage("act_9", "ads_insights");
        assert_eq!(gate.usage(&key), Some(70.0));

        let blocked = gate.acquire_timeout(&[key], Duration::from_millis(20)).await;
        assert!(blocked.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn bad_usage_data_does_not_fail_the_call() {
        let gate = UsageGate::new(GateConfig::default()).unwrap();
        let svc = tower::service_fn(|_req: &'static str| async {
            let headers = vec![("x-app-usage".into(), "garbage".into())];
            Ok::<_, std::io::Error>(Reply { headers })
        });
        let svc = UsageGateLayer::new(gate.clone(), keys_for).layer(svc);

        let reply = svc.oneshot("act_9").await.unwrap();
        assert_eq!(reply.headers.len(), 1);
        assert_eq!(gate.usage(&ResourceKey::app_usage()), None);
    }

    #[tokio::test]
    async fn inner_errors_pass_through() {
        let gate = UsageGate::new(GateConfig::default()).unwrap();
        let svc = tower::service_fn(|_req: &'static str| async {
            Err::<Reply, _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        });
        let svc = UsageGateLayer::new(gate, keys_for).layer(svc);

        let err = svc.oneshot("act_9").await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
