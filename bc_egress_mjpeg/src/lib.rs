//! MJPEG-over-HTTP Egress Transport: serves
//! `multipart/x-mixed-replace` to any number of concurrent viewers off
//! the Frame Broker's Latest-Frame Slot. Grounded on
//! `gl_stream::mjpeg::{StreamManager, MjpegStream, mjpeg_stream_handler}`,
//! generalized from that module's broadcast-channel relay to the
//! slot-snapshot model (see `/root/crate/DESIGN.md`).

pub mod metrics;
pub mod viewer;

pub use metrics::MjpegMetrics;
pub use viewer::{ViewerGuard, ViewerRegistry};

use actix_web::{web, App, HttpResponse, HttpServer};
use bc_broker::LifecycleController;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=boundary";

/// Default concurrent-connection ceiling (spec §4.4.1). Unlike the
/// original's hardcoded `MHD_OPTION_CONNECTION_LIMIT, 1`, this is a
/// generous default rather than a structural constraint of the slot
/// design, which supports an arbitrary number of readers.
pub const DEFAULT_MAX_VIEWERS: usize = 100;

#[derive(Clone)]
pub struct MjpegState {
    lifecycle: Arc<LifecycleController>,
    registry: Arc<ViewerRegistry>,
    metrics: MjpegMetrics,
    max_viewers: usize,
}

impl MjpegState {
    pub fn new(lifecycle: Arc<LifecycleController>) -> Self {
        Self {
            lifecycle,
            registry: Arc::new(ViewerRegistry::new()),
            metrics: MjpegMetrics::new(),
            max_viewers: DEFAULT_MAX_VIEWERS,
        }
    }

    pub fn with_max_viewers(mut self, max_viewers: usize) -> Self {
        self.max_viewers = max_viewers;
        self
    }

    pub fn metrics(&self) -> &MjpegMetrics {
        &self.metrics
    }
}

/// `GET /`: register a viewer and stream frames to it until the client
/// disconnects (actix drops the response body future, which drops the
/// `ViewerGuard`, which deregisters and notifies the Lifecycle
/// Controller).
async fn mjpeg_handler(state: web::Data<MjpegState>) -> HttpResponse {
    if state.registry.len() >= state.max_viewers {
        return HttpResponse::ServiceUnavailable().finish();
    }

    let guard = ViewerGuard::register(
        state.registry.clone(),
        state.lifecycle.clone(),
        state.metrics.clone(),
    );
    let slot = state.lifecycle.broker().slot_handle();
    let cancel = CancellationToken::new();
    let metrics = state.metrics.clone();

    let body = viewer::mjpeg_body(slot, metrics, cancel);
    let body = GuardedStream {
        guard: Some(guard),
        inner: Box::pin(body),
    };

    // Spec §4.6/§6 require strict HTTP/1.0-compatible framing: some
    // video clients choke on chunked transfer-encoding for multipart
    // responses. `force_close` tells actix this body is terminated by
    // closing the connection rather than by a chunked trailer, even
    // when the client negotiated HTTP/1.1.
    HttpResponse::Ok()
        .content_type(CONTENT_TYPE)
        .force_close()
        .streaming(body)
}

/// Anything other than `GET /` is not part of this service's surface
/// (spec §4.6).
async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().finish()
}

/// Wraps the body stream so the `ViewerGuard` lives exactly as long as
/// the response body does, including when actix drops it early on
/// client disconnect.
struct GuardedStream<T> {
    guard: Option<ViewerGuard>,
    inner: std::pin::Pin<Box<dyn futures_util::Stream<Item = T>>>,
}

impl<T> futures_util::Stream for GuardedStream<T> {
    type Item = T;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(mjpeg_handler))
        .default_service(web::route().to(not_found));
}

/// Runs the MJPEG-HTTP egress until `cancel` fires. Grounded on the
/// teacher's `app/src/main.rs` `HttpServer::bind(...).run()` +
/// `tokio::select!`-against-shutdown idiom.
pub async fn serve(
    bind_addr: std::net::SocketAddr,
    state: MjpegState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    info!(%bind_addr, "mjpeg egress listening");
    let data = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure_routes)
    })
    .bind(bind_addr)?
    .run();

    let handle = server.handle();
    tokio::select! {
        result = server => result,
        _ = cancel.cancelled() => {
            handle.stop(true).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use bc_broker::{BrokerMetrics, FrameBroker};
    use bc_source::{fake::FakeFrameSource, FrameSource};
    use std::sync::Arc;

    async fn test_state() -> MjpegState {
        let source: Arc<dyn FrameSource> = Arc::new(FakeFrameSource::new());
        source.connect(CancellationToken::new()).await.unwrap();
        let broker = Arc::new(FrameBroker::new(source.clone(), BrokerMetrics::new()));
        let lifecycle = Arc::new(LifecycleController::new(source, broker));
        MjpegState::new(lifecycle)
    }

    #[actix_web::test]
    async fn unknown_route_returns_404() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/not-a-route").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn root_returns_multipart_content_type() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let content_type = resp
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(content_type, CONTENT_TYPE);
    }

    #[actix_web::test]
    async fn root_forces_connection_close_instead_of_chunked_framing() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.response().head().connection_type(),
            actix_web::http::ConnectionType::Close
        );
    }
}
