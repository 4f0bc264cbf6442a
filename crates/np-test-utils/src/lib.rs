// np-test-utils: WebSocket test doubles for the relay proxy suite.

pub mod mock_relay;
pub mod mock_ws_client;

pub use mock_relay::MockRelay;
pub use mock_ws_client::MockWsClient;
