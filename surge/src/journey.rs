use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use surge_core::{
    Hooks, HttpClient, HttpMetrics, HttpRequest, HttpResponse, MetricKind, SharedValue, VuContext,
};

/// Pause between requests within one iteration.
const PAUSE_BETWEEN: Duration = Duration::from_millis(100);
/// Pause at the end of every iteration.
const PAUSE_ITERATION: Duration = Duration::from_secs(1);

const TEST_DATA: &str = concat!(
    r#"{"id":1,"name":"Test User","email":"test@example.com","#,
    r#""message":"This is a test message for load testing"}"#,
);

pub type IterationFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// The built-in request journey every VU runs against the target: a handful
/// of GET/POST requests with checks, short pauses in between and a longer
/// pause at the end of the iteration.
#[derive(Debug, Clone)]
pub struct Journey {
    base_url: Arc<str>,
    client: Arc<HttpClient>,
}

impl Journey {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: Arc::from(base_url.trim_end_matches('/')),
            client: Arc::new(HttpClient::default()),
        }
    }

    pub fn iteration_fn(
        self,
    ) -> impl Fn(VuContext) -> IterationFuture + Clone + Send + Sync + 'static {
        move |ctx| {
            let journey = self.clone();
            Box::pin(async move { journey.run_once(ctx).await })
        }
    }

    async fn run_once(&self, ctx: VuContext) -> Result<(), String> {
        let metrics = HttpMetrics::new(ctx.registry());
        let errors = ctx.metric(MetricKind::Rate, "errors");
        let tags: Vec<(String, String)> = ctx.tags().to_vec();

        // A failed request is a failed check, never a fatal error; the
        // iteration carries on to the next request regardless.

        // 1: simple GET
        let res = self.client.get(&format!("{}/", self.base_url)).await;
        metrics.record_result("GET", "/", &res, &tags);
        let ok = match &res {
            Ok(res) => ctx.check(res, &[
                ("GET / status is 200", &|r: &HttpResponse| r.status == 200),
                ("GET / response time < 200ms", &|r: &HttpResponse| {
                    r.elapsed_ms() < 200.0
                }),
            ]),
            Err(_) => ctx.record_check("GET / status is 200", false),
        };
        errors.add_bool_with_tags(!ok, &tags);

        tokio::time::sleep(PAUSE_BETWEEN).await;

        // 2: JSON GET
        let res = self.client.get(&format!("{}/json", self.base_url)).await;
        metrics.record_result("GET", "/json", &res, &tags);
        let ok = match &res {
            Ok(res) => ctx.check(res, &[
                ("GET /json status is 200", &|r: &HttpResponse| {
                    r.status == 200
                }),
                ("GET /json has valid JSON", &|r: &HttpResponse| {
                    serde_json::from_slice::<serde_json::Value>(&r.body).is_ok()
                }),
            ]),
            Err(_) => ctx.record_check("GET /json status is 200", false),
        };
        errors.add_bool_with_tags(!ok, &tags);

        tokio::time::sleep(PAUSE_BETWEEN).await;

        // 3: JSON POST
        let req = HttpRequest::post(
            format!("{}/json", self.base_url),
            Bytes::from_static(TEST_DATA.as_bytes()),
        )
        .with_header("Content-Type", "application/json");
        let res = self.client.request(req).await;
        metrics.record_result("POST", "/json", &res, &tags);
        let ok = match &res {
            Ok(res) => ctx.check(res, &[
                ("POST /json status is 200", &|r: &HttpResponse| {
                    r.status == 200
                }),
                ("POST /json response time < 300ms", &|r: &HttpResponse| {
                    r.elapsed_ms() < 300.0
                }),
            ]),
            Err(_) => ctx.record_check("POST /json status is 200", false),
        };
        errors.add_bool_with_tags(!ok, &tags);

        tokio::time::sleep(PAUSE_BETWEEN).await;

        // 4: path parameter
        let res = self
            .client
            .get(&format!("{}/user/123", self.base_url))
            .await;
        metrics.record_result("GET", "/user/123", &res, &tags);
        let ok = match &res {
            Ok(res) => ctx.check(res, &[(
                "GET /user/:id status is 200",
                &|r: &HttpResponse| r.status == 200,
            )]),
            Err(_) => ctx.record_check("GET /user/:id status is 200", false),
        };
        errors.add_bool_with_tags(!ok, &tags);

        tokio::time::sleep(PAUSE_BETWEEN).await;

        // 5: query parameter
        let res = self
            .client
            .get(&format!("{}/query?name=test", self.base_url))
            .await;
        metrics.record_result("GET", "/query", &res, &tags);
        let ok = match &res {
            Ok(res) => ctx.check(res, &[(
                "GET /query status is 200",
                &|r: &HttpResponse| r.status == 200,
            )]),
            Err(_) => ctx.record_check("GET /query status is 200", false),
        };
        errors.add_bool_with_tags(!ok, &tags);

        tokio::time::sleep(PAUSE_ITERATION).await;
        Ok(())
    }
}

/// Once-per-run hooks: setup publishes the target base URL to every
/// iteration, teardown just logs completion.
pub fn hooks(base_url: &str) -> Hooks {
    let url = base_url.to_string();
    Hooks {
        setup: Some(Box::new(move || {
            Box::pin(async move {
                tracing::info!(base_url = %url, "starting load test");
                let mut data = HashMap::new();
                data.insert(
                    Arc::<str>::from("base_url"),
                    SharedValue::String(Arc::from(url.as_str())),
                );
                Ok(Arc::new(SharedValue::Object(data)))
            })
        })),
        teardown: Some(Box::new(|_shared| {
            Box::pin(async move {
                tracing::info!("load test completed");
                Ok(())
            })
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge_core::{Executor, Registry, RunPlan, ScenarioSpec, ThresholdSpec, run_plan};
    use surge_testserver::TestServer;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn journey_round_trip_against_the_testserver() {
        let server = TestServer::start()
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let base_url = server.base_url();

        let plan = RunPlan {
            scenarios: vec![ScenarioSpec {
                name: "smoke".to_string(),
                executor: Executor::ConstantVus {
                    vus: 1,
                    duration: Duration::from_millis(100),
                },
                tags: Vec::new(),
            }],
            thresholds: vec![ThresholdSpec {
                metric: "errors".to_string(),
                expressions: vec!["rate<0.1".to_string()],
            }],
        };

        let registry = Arc::new(Registry::default());
        let journey = Journey::new(&base_url);
        let report = run_plan(
            plan,
            registry,
            journey.iteration_fn(),
            hooks(&base_url),
            None,
        )
        .await
        .unwrap_or_else(|e| panic!("{e}"));

        // One iteration (the gate closes while it is in flight) hitting all
        // five routes, with every check green against the local target.
        assert_eq!(report.totals.iterations, 1);
        assert_eq!(server.stats().requests_total(), 5);
        assert_eq!(server.stats().json_posts_total(), 1);
        assert_eq!(report.totals.checks_failed, 0);
        assert!(report.totals.checks_total >= 8);
        assert!(report.thresholds_passed());

        server.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn journey_records_failed_checks_when_the_target_is_down() {
        // Nothing is listening here; every request fails as a check, not as
        // a fatal error.
        let journey = Journey::new("http://127.0.0.1:1");

        let plan = RunPlan {
            scenarios: vec![ScenarioSpec {
                name: "dark".to_string(),
                executor: Executor::ConstantVus {
                    vus: 1,
                    duration: Duration::from_millis(50),
                },
                tags: Vec::new(),
            }],
            thresholds: vec![ThresholdSpec {
                metric: "errors".to_string(),
                expressions: vec!["rate<0.1".to_string()],
            }],
        };

        let registry = Arc::new(Registry::default());
        let report = run_plan(
            plan,
            registry,
            journey.iteration_fn(),
            Hooks::default(),
            None,
        )
        .await
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(report.totals.iterations, 1);
        assert!(report.totals.checks_failed > 0);
        assert!(!report.thresholds_passed());
    }
}
