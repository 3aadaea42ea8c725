#![allow(dead_code)]
pub mod memory_sink;
pub mod mock_transport;
pub mod test_metrics;

use logroute::{config::LoggerConfig, core::MailTransport, LogRouter};
use memory_sink::CountingSinkFactory;
use mock_transport::RecordingTransport;
use std::sync::Arc;

/// A router backed by in-memory sinks and a recording transport.
pub struct TestRouter {
    pub router: LogRouter,
    pub factory: Arc<CountingSinkFactory>,
    pub transport: Arc<RecordingTransport>,
}

/// Builds a router whose defaults point at `/tmp/logroute-test`, with fakes
/// for the sink factory and the mail transport.
pub fn create_test_router() -> TestRouter {
    create_test_router_with(Arc::new(CountingSinkFactory::new()))
}

pub fn create_test_router_with(factory: Arc<CountingSinkFactory>) -> TestRouter {
    let transport = Arc::new(RecordingTransport::new());
    let router = LogRouter::builder(LoggerConfig::new().log_path("/tmp/logroute-test"))
        .sink_factory(factory.clone())
        .transport(transport.clone() as Arc<dyn MailTransport>)
        .build()
        .expect("defaults should build");
    TestRouter {
        router,
        factory,
        transport,
    }
}
