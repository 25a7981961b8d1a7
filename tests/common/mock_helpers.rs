//! Mock construction helpers

use flowhook::listener::{ObserverBridge, ObserverSender};
use flowhook::run::FlowRun;

mockall::mock! {
    /// Pipeline run whose stop and describe calls are scripted per test
    pub Run {}

    impl FlowRun for Run {
        fn is_stopped(&self) -> bool;
        fn request_stop(&self, message: &str);
        fn describe(&self) -> String;
    }
}

/// Create an observer bridge with a small buffer
pub fn create_test_bridge() -> (ObserverBridge, ObserverSender) {
    ObserverBridge::with_capacity(16)
}
